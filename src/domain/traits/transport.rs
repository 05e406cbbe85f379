use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::application::errors::TransportError;
use crate::domain::entities::ChatEvent;

/// Stream of inbound transport events
pub type EventStream = mpsc::UnboundedReceiver<ChatEvent>;

/// Chat transport - abstraction for live-chat platform connections
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Connect and start delivering events. Called once per worker run.
    async fn connect(&self) -> Result<EventStream, TransportError>;

    /// Send a message to a channel
    async fn send(&self, channel: &str, text: &str) -> Result<(), TransportError>;

    /// Channels the transport is currently joined to, normalized
    fn connected_channels(&self) -> Vec<String>;

    /// Get bot info
    fn bot_info(&self) -> BotInfo;

    /// Handle for pushing synthetic events, if the transport supports it
    fn injector(&self) -> Option<ChatInjector> {
        None
    }
}

/// Bot information
#[derive(Debug, Clone)]
pub struct BotInfo {
    pub id: String,
    pub name: String,
}

/// Pushes events into a transport's event stream
#[derive(Debug, Clone)]
pub struct ChatInjector {
    sender: mpsc::UnboundedSender<ChatEvent>,
}

impl ChatInjector {
    pub fn new(sender: mpsc::UnboundedSender<ChatEvent>) -> Self {
        Self { sender }
    }

    pub fn inject(&self, event: ChatEvent) -> Result<(), TransportError> {
        self.sender
            .send(event)
            .map_err(|_| TransportError::Disconnected("event stream closed".to_string()))
    }
}
