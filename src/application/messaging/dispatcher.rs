//! Command dispatcher - routes chat messages to registered command handlers

use std::sync::Arc;

use super::middleware::{MiddlewareChain, MiddlewareError};
use super::parser::CommandParser;
use crate::application::errors::CommandError;
use crate::application::services::ActiveUsers;
use crate::domain::entities::{ChatMessage, FollowEvent, Invocation, Responder, Role};
use crate::domain::traits::ChatTransport;
use crate::infrastructure::plugins::registry::panic_message;
use crate::infrastructure::plugins::SharedCommandTable;

/// What happened to one inbound message
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The bot's own message
    Echo,
    NotCommand,
    UnknownCommand(String),
    Denied(MiddlewareError),
    Invoked,
    /// The handler returned an error or panicked
    Failed(CommandError),
}

impl DispatchOutcome {
    pub fn is_invoked(&self) -> bool {
        matches!(self, DispatchOutcome::Invoked | DispatchOutcome::Failed(_))
    }
}

/// Routes messages through the middleware chain to handlers
///
/// Lookups use a snapshot of the command table taken when the message
/// arrives, so a reload never affects an invocation already under way.
pub struct CommandDispatcher {
    parser: CommandParser,
    table: SharedCommandTable,
    middleware: MiddlewareChain,
    active_users: Arc<ActiveUsers>,
    transport: Arc<dyn ChatTransport>,
    bot_name: String,
    owner_id: Option<String>,
}

impl CommandDispatcher {
    pub fn new(
        prefix: impl Into<String>,
        table: SharedCommandTable,
        active_users: Arc<ActiveUsers>,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        let bot_name = transport.bot_info().name;
        Self {
            parser: CommandParser::new(prefix),
            table,
            middleware: MiddlewareChain::new(),
            active_users,
            transport,
            bot_name,
            owner_id: None,
        }
    }

    pub fn with_middleware(mut self, middleware: MiddlewareChain) -> Self {
        self.middleware = middleware;
        self
    }

    /// Chatters with this id are treated as the channel owner
    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        let owner_id = owner_id.into();
        self.owner_id = (!owner_id.is_empty()).then_some(owner_id);
        self
    }

    /// Handle one inbound message. At most one handler runs per message.
    pub async fn dispatch(&self, message: ChatMessage) -> DispatchOutcome {
        if message.echo || message.author.name.eq_ignore_ascii_case(&self.bot_name) {
            return DispatchOutcome::Echo;
        }

        self.active_users.register(&message.author.name);

        let Some(parsed) = self.parser.parse(&message.text) else {
            return DispatchOutcome::NotCommand;
        };

        let table = self.table.snapshot();
        let Some(entry) = table.get(parsed.name) else {
            tracing::debug!("Unknown command {:?} from {}", parsed.name, message.author.name);
            return DispatchOutcome::UnknownCommand(parsed.name.to_string());
        };

        let mut author = message.author.clone();
        if self.owner_id.as_deref() == Some(author.id.as_str()) {
            author.role = Role::Owner;
        }

        let invocation = Invocation {
            author,
            channel: message.channel.clone(),
            command: parsed.name.to_string(),
            args: parsed.args.to_string(),
            responder: Responder::new(self.transport.clone(), message.channel.clone()),
        };

        if let Err(e) = self.middleware.run(&invocation, &entry) {
            tracing::info!(
                "Denied {} for {} in #{}: {}",
                invocation.command,
                invocation.author.name,
                invocation.channel,
                e
            );
            return DispatchOutcome::Denied(e);
        }

        let command = invocation.command.clone();
        let module = entry.module.clone();
        let task = tokio::spawn(async move {
            // keeps the entry, and with it the module's library, alive
            let entry = entry;
            entry.handler.handle(invocation).await
        });

        let error = match task.await {
            Ok(Ok(())) => return DispatchOutcome::Invoked,
            Ok(Err(e)) => e,
            Err(join) if join.is_panic() => CommandError::Panicked(panic_message(join.into_panic().as_ref())),
            Err(join) => CommandError::ExecutionFailed(join.to_string()),
        };

        tracing::error!(
            module = %module,
            "DispatchHandlerError: {} failed: {}",
            command,
            error
        );
        DispatchOutcome::Failed(error)
    }

    /// Deliver a follow event to every listener. Returns how many succeeded.
    pub async fn dispatch_follow(&self, event: FollowEvent) -> usize {
        let table = self.table.snapshot();
        let mut tasks = Vec::new();
        for listener in table.follow_handlers() {
            let listener = listener.clone();
            let event = event.clone();
            let module = listener.module.clone();
            tasks.push((
                module,
                tokio::spawn(async move { listener.handler.on_follow(event).await }),
            ));
        }

        let mut delivered = 0;
        for (module, task) in tasks {
            match task.await {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => tracing::error!(module = %module, "Follow listener failed: {}", e),
                Err(e) => tracing::error!(module = %module, "Follow listener aborted: {}", e),
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Chatter;
    use crate::domain::entities::FnHandler;
    use crate::infrastructure::adapters::LocalTransport;
    use crate::infrastructure::config::CommandPolicy;
    use crate::infrastructure::plugins::{CommandEntry, CommandTable, FollowEntry};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        dispatcher: CommandDispatcher,
        transport: Arc<LocalTransport>,
        active: Arc<ActiveUsers>,
        calls: Arc<AtomicUsize>,
    }

    async fn fixture() -> Fixture {
        let transport = Arc::new(LocalTransport::new("elchbot", vec!["elch".into()]));
        let _events = transport.connect().await.unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let ping = CommandEntry::new(
            "ping",
            "ping",
            Arc::new(FnHandler(move |ctx: Invocation| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    ctx.reply("pong").await?;
                    Ok::<(), CommandError>(())
                }
            })),
        );
        let fail = CommandEntry::new(
            "fail",
            "broken",
            Arc::new(FnHandler(|_: Invocation| async {
                Err::<(), _>(CommandError::ExecutionFailed("nope".into()))
            })),
        );
        let panics = CommandEntry::new(
            "panic",
            "broken",
            Arc::new(FnHandler(|_: Invocation| async {
                if true {
                    panic!("kaboom");
                }
                Ok::<(), CommandError>(())
            })),
        );

        let table = SharedCommandTable::new();
        table.replace(CommandTable::default().with_registrations(vec![ping, fail, panics], Vec::new()));

        let active = Arc::new(ActiveUsers::new());
        let dispatcher = CommandDispatcher::new("!", table, active.clone(), transport.clone());
        Fixture {
            dispatcher,
            transport,
            active,
            calls,
        }
    }

    fn message(author: &str, text: &str) -> ChatMessage {
        ChatMessage::new("elch", Chatter::new(author), text)
    }

    #[tokio::test]
    async fn command_is_invoked_once_and_replies() {
        let f = fixture().await;
        let outcome = f.dispatcher.dispatch(message("alice", "!ping")).await;

        assert!(matches!(outcome, DispatchOutcome::Invoked));
        assert_eq!(f.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.transport.sent()[0].text, "pong");
        assert!(f.active.contains("alice"));
    }

    #[tokio::test]
    async fn every_non_echo_author_becomes_active() {
        let f = fixture().await;
        assert!(matches!(
            f.dispatcher.dispatch(message("bob", "hello there")).await,
            DispatchOutcome::NotCommand
        ));
        assert!(matches!(
            f.dispatcher.dispatch(message("carol", "!nope")).await,
            DispatchOutcome::UnknownCommand(name) if name == "nope"
        ));
        assert!(matches!(
            f.dispatcher.dispatch(message("ElchBot", "!ping")).await,
            DispatchOutcome::Echo
        ));
        assert!(matches!(
            f.dispatcher.dispatch(message("dave", "!ping").with_echo(true)).await,
            DispatchOutcome::Echo
        ));

        assert_eq!(f.active.snapshot(), vec!["bob", "carol"]);
        assert_eq!(f.calls.load(Ordering::SeqCst), 0);
        assert!(f.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn lookup_is_case_sensitive() {
        let f = fixture().await;
        assert!(matches!(
            f.dispatcher.dispatch(message("alice", "!PING")).await,
            DispatchOutcome::UnknownCommand(_)
        ));
    }

    #[tokio::test]
    async fn handler_errors_and_panics_are_contained() {
        let f = fixture().await;
        assert!(matches!(
            f.dispatcher.dispatch(message("alice", "!fail")).await,
            DispatchOutcome::Failed(CommandError::ExecutionFailed(_))
        ));
        assert!(matches!(
            f.dispatcher.dispatch(message("alice", "!panic")).await,
            DispatchOutcome::Failed(CommandError::Panicked(msg)) if msg.contains("kaboom")
        ));
        assert!(f.transport.sent().is_empty());
        // still serving afterwards
        assert!(f.dispatcher.dispatch(message("alice", "!ping")).await.is_invoked());
    }

    #[tokio::test]
    async fn middleware_denial_skips_the_handler() {
        let f = fixture().await;
        let policies = BTreeMap::from([(
            "ping".to_string(),
            CommandPolicy {
                permission: Role::Owner,
                ..CommandPolicy::default()
            },
        )]);
        let dispatcher = f
            .dispatcher
            .with_middleware(MiddlewareChain::from_policies(&policies))
            .with_owner("elch");

        assert!(matches!(
            dispatcher.dispatch(message("alice", "!ping")).await,
            DispatchOutcome::Denied(MiddlewareError::PermissionDenied { .. })
        ));
        assert!(dispatcher.dispatch(message("elch", "!ping")).await.is_invoked());
        assert_eq!(f.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn follow_listeners_are_isolated() {
        let transport = Arc::new(LocalTransport::new("elchbot", vec!["elch".into()]));
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let good = FollowEntry::new(
            "good",
            Arc::new(FnHandler(move |_: FollowEvent| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), CommandError>(())
                }
            })),
            None,
        );
        let bad = FollowEntry::new(
            "bad",
            Arc::new(FnHandler(|_: FollowEvent| async {
                Err::<(), _>(CommandError::ExecutionFailed("down".into()))
            })),
            None,
        );
        let table = SharedCommandTable::new();
        table.replace(CommandTable::default().with_registrations(Vec::new(), vec![bad, good]));

        let dispatcher = CommandDispatcher::new("!", table, Arc::new(ActiveUsers::new()), transport);
        let delivered = dispatcher
            .dispatch_follow(FollowEvent::new("elch", Chatter::new("newbie")))
            .await;
        assert_eq!(delivered, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
