use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use super::{Chatter, FollowEvent};
use crate::application::errors::{CommandError, TransportError};
use crate::domain::traits::ChatTransport;

/// Result of a command or follow handler
pub type HandlerResult = Result<(), CommandError>;

/// Capability that runs a chat command
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, ctx: Invocation) -> HandlerResult;
}

/// Capability that reacts to follow events
#[async_trait]
pub trait FollowHandler: Send + Sync {
    async fn on_follow(&self, event: FollowEvent) -> HandlerResult;
}

/// Adapts an async closure into a [`CommandHandler`] or [`FollowHandler`]
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> CommandHandler for FnHandler<F>
where
    F: Fn(Invocation) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn handle(&self, ctx: Invocation) -> HandlerResult {
        (self.0)(ctx).await
    }
}

#[async_trait]
impl<F, Fut> FollowHandler for FnHandler<F>
where
    F: Fn(FollowEvent) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn on_follow(&self, event: FollowEvent) -> HandlerResult {
        (self.0)(event).await
    }
}

/// Sends text back to the channel a command came from
#[derive(Clone)]
pub struct Responder {
    transport: Arc<dyn ChatTransport>,
    channel: String,
}

impl Responder {
    pub fn new(transport: Arc<dyn ChatTransport>, channel: impl Into<String>) -> Self {
        Self {
            transport,
            channel: channel.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub async fn send(&self, text: &str) -> Result<(), TransportError> {
        self.transport.send(&self.channel, text).await
    }
}

/// Everything a handler knows about one command invocation
#[derive(Clone)]
pub struct Invocation {
    pub author: Chatter,
    pub channel: String,
    /// The name the command was invoked with (primary name or alias)
    pub command: String,
    /// Raw text after the command token
    pub args: String,
    pub responder: Responder,
}

impl Invocation {
    pub async fn reply(&self, text: impl AsRef<str>) -> Result<(), TransportError> {
        self.responder.send(text.as_ref()).await
    }

    pub fn arg_list(&self) -> Vec<&str> {
        self.args.split_whitespace().collect()
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("author", &self.author.name)
            .field("channel", &self.channel)
            .field("command", &self.command)
            .field("args", &self.args)
            .finish()
    }
}

/// A command a module asks the registrar to register
pub struct Command {
    pub name: String,
    pub description: Option<String>,
    pub aliases: Vec<String>,
    pub usage: Option<String>,
    pub handler: Option<Arc<dyn CommandHandler>>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            aliases: Vec::new(),
            usage: None,
            handler: None,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self
    }

    pub fn with_handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handler = Some(Arc::new(FnHandler(handler)));
        self
    }

    /// Primary name followed by every alias
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_lists_primary_then_aliases() {
        let cmd = Command::new("dice").with_aliases(["roll", "d"]);
        let names: Vec<&str> = cmd.names().collect();
        assert_eq!(names, vec!["dice", "roll", "d"]);
        assert!(cmd.handler.is_none());
    }

    #[test]
    fn with_handler_sets_handler() {
        let cmd = Command::new("ping").with_handler(|_ctx| async { Ok(()) });
        assert!(cmd.handler.is_some());
    }
}
