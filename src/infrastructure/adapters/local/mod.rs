//! Local transport for development and testing
//!
//! Nothing leaves the process: sent messages are recorded, traced and
//! echoed back as inbound messages flagged `echo`, the way a live chat
//! service reflects the bot's own output. Chat and follow events can be
//! injected through [`ChatInjector`].

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;

use crate::application::errors::TransportError;
use crate::domain::entities::{normalize_channel, ChatEvent, ChatMessage, Chatter};
use crate::domain::traits::{BotInfo, ChatInjector, ChatTransport, EventStream};

/// A message the bot sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub channel: String,
    pub text: String,
}

#[derive(Default)]
struct State {
    connected: bool,
    events: Option<mpsc::UnboundedSender<ChatEvent>>,
    sent: Vec<SentMessage>,
    failing: HashSet<String>,
}

pub struct LocalTransport {
    info: BotInfo,
    channels: Vec<String>,
    state: Mutex<State>,
}

impl LocalTransport {
    pub fn new(bot_name: impl Into<String>, channels: Vec<String>) -> Self {
        let name = bot_name.into();
        let mut joined: Vec<String> = Vec::new();
        for channel in channels.iter().map(|c| normalize_channel(c)) {
            if !channel.is_empty() && !joined.contains(&channel) {
                joined.push(channel);
            }
        }
        Self {
            info: BotInfo {
                id: name.clone(),
                name,
            },
            channels: joined,
            state: Mutex::new(State::default()),
        }
    }

    pub fn with_bot_id(mut self, id: impl Into<String>) -> Self {
        self.info.id = id.into();
        self
    }

    /// Everything sent so far, oldest first
    pub fn sent(&self) -> Vec<SentMessage> {
        self.state().sent.clone()
    }

    /// Sent messages, clearing the record
    pub fn take_sent(&self) -> Vec<SentMessage> {
        std::mem::take(&mut self.state().sent)
    }

    /// Make every later send to `channel` fail
    pub fn fail_sends_to(&self, channel: &str) {
        self.state().failing.insert(normalize_channel(channel));
    }

    /// Close the event stream as if the connection dropped
    pub fn disconnect(&self, reason: &str) {
        let mut state = self.state();
        if let Some(events) = state.events.take() {
            let _ = events.send(ChatEvent::Disconnected(reason.to_string()));
        }
        state.connected = false;
    }

    fn state(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl ChatTransport for LocalTransport {
    async fn connect(&self) -> Result<EventStream, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(ChatEvent::Ready)
            .map_err(|_| TransportError::Connect("event stream closed".to_string()))?;

        let mut state = self.state();
        state.connected = true;
        state.events = Some(tx);
        tracing::info!(
            "Local transport connected as {} to {} channel(s)",
            self.info.name,
            self.channels.len()
        );
        Ok(rx)
    }

    async fn send(&self, channel: &str, text: &str) -> Result<(), TransportError> {
        let channel = normalize_channel(channel);
        let mut state = self.state();

        if !state.connected || !self.channels.contains(&channel) {
            return Err(TransportError::Send {
                channel,
                reason: "not joined".to_string(),
            });
        }
        if state.failing.contains(&channel) {
            return Err(TransportError::Send {
                channel,
                reason: "rejected by server".to_string(),
            });
        }

        tracing::info!("[#{}] {}: {}", channel, self.info.name, text);
        state.sent.push(SentMessage {
            channel: channel.clone(),
            text: text.to_string(),
        });
        if let Some(events) = &state.events {
            let echo = ChatMessage::new(channel, Chatter::new(&self.info.name), text).with_echo(true);
            let _ = events.send(ChatEvent::Message(echo));
        }
        Ok(())
    }

    fn connected_channels(&self) -> Vec<String> {
        if self.state().connected {
            self.channels.clone()
        } else {
            Vec::new()
        }
    }

    fn bot_info(&self) -> BotInfo {
        self.info.clone()
    }

    fn injector(&self) -> Option<ChatInjector> {
        self.state().events.clone().map(ChatInjector::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sends_are_recorded_and_echoed() {
        let transport = LocalTransport::new("elchbot", vec!["#Elch".into(), "elch".into()]);
        assert!(transport.connected_channels().is_empty());

        let mut events = transport.connect().await.unwrap();
        assert!(matches!(events.recv().await, Some(ChatEvent::Ready)));
        assert_eq!(transport.connected_channels(), vec!["elch"]);

        transport.send("#elch", "hello").await.unwrap();
        assert_eq!(
            transport.sent(),
            vec![SentMessage {
                channel: "elch".into(),
                text: "hello".into()
            }]
        );
        match events.recv().await {
            Some(ChatEvent::Message(msg)) => {
                assert!(msg.echo);
                assert_eq!(msg.author.name, "elchbot");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_and_failing_channels_error() {
        let transport = LocalTransport::new("elchbot", vec!["a".into(), "b".into()]);
        let _events = transport.connect().await.unwrap();
        transport.fail_sends_to("b");

        assert!(transport.send("c", "x").await.is_err());
        assert!(transport.send("b", "x").await.is_err());
        assert!(transport.send("a", "x").await.is_ok());
        assert_eq!(transport.take_sent().len(), 1);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn injector_feeds_the_event_stream() {
        let transport = LocalTransport::new("elchbot", vec!["elch".into()]);
        assert!(transport.injector().is_none());
        let mut events = transport.connect().await.unwrap();
        let _ = events.recv().await;

        let msg = ChatMessage::new("elch", Chatter::new("alice"), "!ping");
        transport.injector().unwrap().inject(ChatEvent::Message(msg)).unwrap();
        assert!(matches!(events.recv().await, Some(ChatEvent::Message(m)) if m.text == "!ping"));

        transport.disconnect("bye");
        assert!(matches!(events.recv().await, Some(ChatEvent::Disconnected(_))));
        assert!(events.recv().await.is_none());
    }
}
