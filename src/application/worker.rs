//! Worker - the chat-connection side of the bot
//!
//! Owns the transport, the ledger, the module registry and the dispatcher.
//! Chat events and operator control messages are handled concurrently on
//! one runtime until a shutdown is requested.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::application::errors::{BotError, ChannelError};
use crate::application::lifecycle::CancelToken;
use crate::application::messaging::{CommandDispatcher, MiddlewareChain};
use crate::application::services::{ActiveUsers, ControlService};
use crate::domain::entities::ChatEvent;
use crate::domain::traits::{ChatTransport, EventStream, Ledger};
use crate::infrastructure::adapters::LocalTransport;
use crate::infrastructure::channel::{CommandReceiver, WorkerEndpoints};
use crate::infrastructure::config::Config;
use crate::infrastructure::database::SqliteLedger;
use crate::infrastructure::logging::{worker_subscriber, LogLevel, LogSink};
use crate::infrastructure::plugins::{ModuleCatalog, ModuleRegistry, SharedCommandTable};
use crate::plugins::{builtin, ModuleEnv};

pub struct Worker {
    config: Config,
    logs: LogSink,
    transport: Arc<dyn ChatTransport>,
    ledger: Arc<dyn Ledger>,
    active_users: Arc<ActiveUsers>,
    registry: Arc<ModuleRegistry>,
    dispatcher: Arc<CommandDispatcher>,
    started_at: Instant,
}

impl Worker {
    /// Worker with the SQLite ledger from the config, the local transport
    /// and the built-in module catalog
    pub fn open(config: Config, logs: LogSink) -> Result<Self, BotError> {
        let ledger = Arc::new(SqliteLedger::open(&config.storage.database)?);
        let transport = Arc::new(
            LocalTransport::new(&config.bot.name, config.channel_list()).with_bot_id(&config.bot.id),
        );
        Ok(Self::new(config, logs, transport, ledger, builtin::catalog()))
    }

    pub fn new(
        config: Config,
        logs: LogSink,
        transport: Arc<dyn ChatTransport>,
        ledger: Arc<dyn Ledger>,
        catalog: ModuleCatalog,
    ) -> Self {
        let started_at = Instant::now();
        let active_users = Arc::new(ActiveUsers::new());
        let commands = SharedCommandTable::new();

        let env = ModuleEnv {
            module: String::new(),
            logs: logs.clone(),
            ledger: ledger.clone(),
            active_users: active_users.clone(),
            transport: transport.clone(),
            commands: commands.clone(),
            settings: serde_yaml::Mapping::new(),
            rewards: config.rewards.clone(),
            prefix: config.bot.prefix.clone(),
            started_at,
        };
        let registry = Arc::new(ModuleRegistry::new(&config.modules.directory, catalog, env));

        let dispatcher = CommandDispatcher::new(
            &config.bot.prefix,
            commands,
            active_users.clone(),
            transport.clone(),
        )
        .with_middleware(MiddlewareChain::from_policies(&config.commands))
        .with_owner(&config.bot.owner_id);

        Self {
            config,
            logs,
            transport,
            ledger,
            active_users,
            registry,
            dispatcher: Arc::new(dispatcher),
            started_at,
        }
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<CommandDispatcher> {
        &self.dispatcher
    }

    pub fn transport(&self) -> &Arc<dyn ChatTransport> {
        &self.transport
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    pub fn active_users(&self) -> &Arc<ActiveUsers> {
        &self.active_users
    }

    /// Load modules, connect and serve until `shutdown` is cancelled or the
    /// operator asks to stop. Modules are cleaned up before returning.
    pub async fn run(self, commands: CommandReceiver, shutdown: CancelToken) -> Result<(), BotError> {
        self.logs.info(format!("Starting {}", self.config.bot.name));
        self.registry.load_all()?;

        let events = match self.transport.connect().await {
            Ok(events) => events,
            Err(e) => {
                self.logs.log(LogLevel::Fatal, format!("Could not connect: {}", e));
                self.registry.unload_all();
                return Err(e.into());
            }
        };

        let control = Arc::new(
            ControlService::new(
                self.registry.clone(),
                self.transport.clone(),
                self.ledger.clone(),
                self.active_users.clone(),
                self.logs.clone(),
            )
            .with_started_at(self.started_at),
        );
        let poll = self.config.console.poll_interval();
        let control_token = shutdown.clone();
        let control_task = tokio::spawn(async move { control.run(commands, poll, control_token).await });

        self.event_loop(events, &shutdown).await;
        shutdown.cancel();

        let grace = self.config.console.shutdown_grace();
        if tokio::time::timeout(grace, control_task).await.is_err() {
            tracing::warn!("Control loop did not stop within {:?}", grace);
        }

        self.registry.unload_all();
        self.logs.info("Worker stopped");
        Ok(())
    }

    async fn event_loop(&self, mut events: EventStream, shutdown: &CancelToken) {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => return,
                event = events.recv() => event,
            };

            match event {
                Some(ChatEvent::Ready) => {
                    let channels = self.transport.connected_channels();
                    self.logs.success(format!(
                        "Connected as {} to {} channel(s): {}",
                        self.transport.bot_info().name,
                        channels.len(),
                        channels.join(", ")
                    ));
                }
                Some(ChatEvent::Message(message)) => {
                    let dispatcher = self.dispatcher.clone();
                    tokio::spawn(async move {
                        dispatcher.dispatch(message).await;
                    });
                }
                Some(ChatEvent::Follow(event)) => {
                    let dispatcher = self.dispatcher.clone();
                    tokio::spawn(async move {
                        dispatcher.dispatch_follow(event).await;
                    });
                }
                Some(ChatEvent::Disconnected(reason)) => {
                    self.logs.warning(format!("Disconnected from chat: {}", reason));
                }
                None => {
                    self.logs.warning("Chat event stream closed, waiting for shutdown");
                    shutdown.cancelled().await;
                    return;
                }
            }
        }
    }
}

/// Run a worker on the calling thread until it stops
///
/// Builds a current-thread runtime, routes this thread's `tracing` output
/// into the log channel and serves until shutdown. Used by the in-process
/// console mode.
pub fn run_in_thread(config: Config, endpoints: WorkerEndpoints) -> Result<(), BotError> {
    let WorkerEndpoints { commands, logs } = endpoints;
    let _tracing = tracing::subscriber::set_default(worker_subscriber(logs.clone()));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(ChannelError::Io)?;
    let grace = config.console.shutdown_grace();

    let result = runtime.block_on(async move {
        let worker = Worker::open(config, logs.clone())?;
        worker.run(commands, CancelToken::new()).await
    });
    runtime.shutdown_timeout(grace.max(Duration::from_millis(100)));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::channel::{command_channel, ControlMessage};
    use crate::infrastructure::logging::log_channel;

    #[tokio::test]
    async fn shutdown_message_stops_the_worker_and_unloads_modules() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.modules.directory = dir.path().join("modules");
        config.channels = vec!["elch".into()];

        let (sink, _logs) = log_channel();
        let transport = Arc::new(LocalTransport::new("elchbot", config.channel_list()));
        let worker = Worker::new(
            config,
            sink,
            transport,
            Arc::new(SqliteLedger::in_memory().unwrap()),
            builtin::catalog(),
        );
        let registry = worker.registry().clone();

        let (tx, rx) = command_channel();
        tx.send(ControlMessage::Shutdown).unwrap();
        tokio::time::timeout(Duration::from_secs(5), worker.run(rx, CancelToken::new()))
            .await
            .unwrap()
            .unwrap();

        assert!(dir.path().join("modules").join("dice.yaml").exists());
        assert_eq!(registry.loaded_count(), 0);
        assert!(registry.commands().snapshot().is_empty());
    }
}
