use super::Chatter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An inbound chat message
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatMessage {
    pub id: String,
    pub channel: String,
    pub author: Chatter,
    pub text: String,
    /// Set by the transport when the message is the bot's own output
    pub echo: bool,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(channel: impl Into<String>, author: Chatter, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            channel: normalize_channel(&channel.into()),
            author,
            text: text.into(),
            echo: false,
            timestamp: Utc::now(),
        }
    }

    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }
}

/// Someone followed a channel
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FollowEvent {
    pub channel: String,
    pub follower: Chatter,
    pub timestamp: DateTime<Utc>,
}

impl FollowEvent {
    pub fn new(channel: impl Into<String>, follower: Chatter) -> Self {
        Self {
            channel: normalize_channel(&channel.into()),
            follower,
            timestamp: Utc::now(),
        }
    }
}

/// Events emitted by a chat transport, in arrival order
#[derive(Debug, Clone)]
pub enum ChatEvent {
    Ready,
    Message(ChatMessage),
    Follow(FollowEvent),
    Disconnected(String),
}

/// Channel names are compared without the leading `#` and case-insensitively
pub fn normalize_channel(name: &str) -> String {
    name.trim().trim_start_matches('#').to_lowercase()
}
