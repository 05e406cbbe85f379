//! Executes operator control messages inside the worker

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::application::errors::ControlError;
use crate::application::lifecycle::CancelToken;
use crate::application::services::ActiveUsers;
use crate::domain::entities::{normalize_channel, ChatEvent, ChatMessage, Chatter, ModuleState};
use crate::domain::traits::{ChatTransport, Ledger};
use crate::infrastructure::channel::{CommandReceiver, ControlMessage, PointsAction};
use crate::infrastructure::logging::LogSink;
use crate::infrastructure::plugins::ModuleRegistry;
use crate::plugins::builtin::uptime::format_uptime;

/// What the control loop does after a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlow {
    Continue,
    Shutdown,
}

/// Service answering console requests with log lines
pub struct ControlService {
    registry: Arc<ModuleRegistry>,
    transport: Arc<dyn ChatTransport>,
    ledger: Arc<dyn Ledger>,
    active_users: Arc<ActiveUsers>,
    logs: LogSink,
    started_at: Instant,
}

impl ControlService {
    pub fn new(
        registry: Arc<ModuleRegistry>,
        transport: Arc<dyn ChatTransport>,
        ledger: Arc<dyn Ledger>,
        active_users: Arc<ActiveUsers>,
        logs: LogSink,
    ) -> Self {
        Self {
            registry,
            transport,
            ledger,
            active_users,
            logs,
            started_at: Instant::now(),
        }
    }

    pub fn with_started_at(mut self, started_at: Instant) -> Self {
        self.started_at = started_at;
        self
    }

    /// Poll the command channel until shutdown
    ///
    /// The channel is polled rather than awaited so that a cancelled token
    /// is noticed within one poll interval. A closed channel counts as a
    /// shutdown request.
    pub async fn run(&self, mut commands: CommandReceiver, poll: Duration, shutdown: CancelToken) {
        while !shutdown.is_cancelled() {
            match commands.try_recv() {
                Ok(Some(message)) => {
                    if self.handle(message).await == ControlFlow::Shutdown {
                        shutdown.cancel();
                    }
                }
                Ok(None) => {
                    tokio::select! {
                        _ = shutdown.cancelled() => {}
                        _ = tokio::time::sleep(poll) => {}
                    }
                }
                Err(_) => {
                    tracing::warn!("Command channel closed, shutting down");
                    shutdown.cancel();
                }
            }
        }
        tracing::debug!("Control loop stopped");
    }

    pub async fn handle(&self, message: ControlMessage) -> ControlFlow {
        tracing::debug!("Control message: {:?}", message);
        match message {
            ControlMessage::ListModules => self.list_modules(),
            ControlMessage::ReloadModule { name } => self.registry_op("Reloaded", &name, |r, n| r.reload(n)),
            ControlMessage::LoadModule { name } => self.registry_op("Loaded", &name, |r, n| r.load(n)),
            ControlMessage::UnloadModule { name } => self.registry_op("Unloaded", &name, |r, n| r.unload(n)),
            ControlMessage::Broadcast { text, channel } => self.broadcast(&text, channel.as_deref()).await,
            ControlMessage::Status => self.status(),
            ControlMessage::ListChannels => self.list_channels(),
            ControlMessage::Points { action } => self.points(action).await,
            ControlMessage::SimulateChat { author, text, channel } => {
                self.simulate_chat(&author, &text, channel.as_deref())
            }
            ControlMessage::Shutdown => {
                self.logs.warning("Shutdown requested");
                return ControlFlow::Shutdown;
            }
        }
        ControlFlow::Continue
    }

    fn list_modules(&self) {
        let modules = self.registry.list();
        if modules.is_empty() {
            self.logs.info("No modules found");
            return;
        }
        self.logs.info(format!("Modules ({}):", modules.len()));
        for module in modules {
            self.logs.info(format!(
                "  {} [{}] {} commands",
                module.name, module.state, module.command_count
            ));
        }
    }

    fn registry_op<F>(&self, verb: &str, name: &str, op: F)
    where
        F: FnOnce(&ModuleRegistry, &str) -> Result<(), crate::application::errors::ModuleError>,
    {
        let name = name.trim();
        if name.is_empty() {
            self.logs.error(ControlError::Usage("module name required".into()).to_string());
            return;
        }
        match op(&self.registry, name) {
            // a disabled manifest loads as a no-op
            Ok(()) if verb != "Unloaded" && self.registry.state_of(name) != Some(ModuleState::Loaded) => {
                self.logs.warning(format!("Module {} is disabled", name))
            }
            Ok(()) => self.logs.success(format!("{} module {}", verb, name)),
            Err(e) => self.logs.error(e.to_string()),
        }
    }

    /// Send to one connected channel, or to all of them
    async fn broadcast(&self, text: &str, channel: Option<&str>) {
        let connected = self.transport.connected_channels();
        let targets = match channel {
            Some(channel) => {
                let channel = normalize_channel(channel);
                if !connected.contains(&channel) {
                    self.logs.error(ControlError::ChannelTargetNotFound(channel).to_string());
                    return;
                }
                vec![channel]
            }
            None => connected,
        };

        if targets.is_empty() {
            self.logs.warning("Not connected to any channel");
            return;
        }
        for target in targets {
            match self.transport.send(&target, text).await {
                Ok(()) => self.logs.success(format!("Sent to #{}: {}", target, text)),
                Err(e) => self.logs.error(format!("Broadcast failed: {}", e)),
            }
        }
    }

    fn status(&self) {
        self.logs.info(format!(
            "Uptime: {} | Channels: {} | Modules loaded: {} | Active users: {}",
            format_uptime(self.started_at.elapsed()),
            self.transport.connected_channels().len(),
            self.registry.loaded_count(),
            self.active_users.len()
        ));
    }

    fn list_channels(&self) {
        let channels = self.transport.connected_channels();
        if channels.is_empty() {
            self.logs.info("Not connected to any channel");
            return;
        }
        let names: Vec<String> = channels.iter().map(|c| format!("#{}", c)).collect();
        self.logs.info(format!("Connected channels: {}", names.join(", ")));
    }

    async fn points(&self, action: PointsAction) {
        let result = match &action {
            PointsAction::See { user } => self
                .ledger
                .get(user)
                .await
                .map(|points| format!("{} has {} Elchcoins", user, points)),
            PointsAction::Add { user, amount } => self
                .ledger
                .add(user, *amount)
                .await
                .map(|points| format!("Added {} Elchcoins to {} (now {})", amount, user, points)),
            PointsAction::Remove { user, amount } => self
                .ledger
                .subtract(user, *amount)
                .await
                .map(|points| format!("Removed {} Elchcoins from {} (now {})", amount, user, points)),
            PointsAction::Reset { user } => self
                .ledger
                .reset(user)
                .await
                .map(|()| format!("Reset Elchcoins of {}", user)),
            PointsAction::Top { limit } => self.ledger.top(*limit).await.map(|top| {
                if top.is_empty() {
                    return "No points awarded yet.".to_string();
                }
                let ranking: Vec<String> = top
                    .iter()
                    .enumerate()
                    .map(|(i, (user, points))| format!("{}. {}: {}", i + 1, user, points))
                    .collect();
                ranking.join(" | ")
            }),
        };

        match result {
            Ok(line) => self.logs.success(line),
            Err(e) => self.logs.error(format!("Points {:?} failed: {}", action, e)),
        }
    }

    fn simulate_chat(&self, author: &str, text: &str, channel: Option<&str>) {
        let Some(injector) = self.transport.injector() else {
            self.logs.error("This transport does not accept simulated chat");
            return;
        };

        let channel = match channel {
            Some(channel) => normalize_channel(channel),
            None => match self.transport.connected_channels().into_iter().next() {
                Some(channel) => channel,
                None => {
                    self.logs.error("Not connected to any channel");
                    return;
                }
            },
        };

        let message = ChatMessage::new(channel, Chatter::new(author), text);
        if let Err(e) = injector.inject(ChatEvent::Message(message)) {
            self.logs.error(format!("Simulated chat failed: {}", e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::adapters::LocalTransport;
    use crate::infrastructure::channel::command_channel;
    use crate::infrastructure::config::RewardsConfig;
    use crate::infrastructure::database::SqliteLedger;
    use crate::infrastructure::logging::{log_channel, LogLevel, LogMessage, LogReceiver};
    use crate::infrastructure::plugins::SharedCommandTable;
    use crate::plugins::builtin;
    use crate::plugins::ModuleEnv;

    struct Harness {
        service: ControlService,
        transport: Arc<LocalTransport>,
        logs: LogReceiver,
        _dir: tempfile::TempDir,
    }

    async fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ping.yaml"), "").unwrap();
        std::fs::write(dir.path().join("dice.yaml"), "").unwrap();

        let (sink, logs) = log_channel();
        let transport = Arc::new(LocalTransport::new("elchbot", vec!["elch".into(), "foo".into()]));
        let _events = transport.connect().await.unwrap();
        let ledger: Arc<dyn Ledger> = Arc::new(SqliteLedger::in_memory().unwrap());
        let active = Arc::new(ActiveUsers::new());

        let env = ModuleEnv {
            module: String::new(),
            logs: sink.clone(),
            ledger: ledger.clone(),
            active_users: active.clone(),
            transport: transport.clone(),
            commands: SharedCommandTable::new(),
            settings: serde_yaml::Mapping::new(),
            rewards: RewardsConfig::default(),
            prefix: "!".into(),
            started_at: Instant::now(),
        };
        let registry = Arc::new(ModuleRegistry::new(dir.path(), builtin::catalog(), env));
        registry.load_all().unwrap();

        let service = ControlService::new(registry, transport.clone(), ledger, active, sink);
        Harness {
            service,
            transport,
            logs,
            _dir: dir,
        }
    }

    fn drain(logs: &mut LogReceiver) -> Vec<LogMessage> {
        let mut lines = Vec::new();
        while let Ok(line) = logs.try_recv() {
            lines.push(line);
        }
        lines
    }

    fn texts(lines: &[LogMessage]) -> Vec<&str> {
        lines.iter().map(|l| l.text.as_str()).collect()
    }

    #[tokio::test]
    async fn broadcast_reaches_every_connected_channel() {
        let mut h = harness().await;
        h.service
            .handle(ControlMessage::Broadcast { text: "hello".into(), channel: None })
            .await;

        let sent: Vec<String> = h.transport.sent().into_iter().map(|m| m.channel).collect();
        assert_eq!(sent, vec!["elch", "foo"]);
        drain(&mut h.logs);
    }

    #[tokio::test]
    async fn targeted_broadcast_checks_the_channel() {
        let mut h = harness().await;
        h.service
            .handle(ControlMessage::Broadcast { text: "hi".into(), channel: Some("#foo".into()) })
            .await;
        let sent = h.transport.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].channel, "foo");

        drain(&mut h.logs);
        h.service
            .handle(ControlMessage::Broadcast { text: "hi".into(), channel: Some("bar".into()) })
            .await;
        assert!(h.transport.sent().is_empty());
        let lines = drain(&mut h.logs);
        assert!(lines
            .iter()
            .any(|l| l.level == LogLevel::Error && l.text == "Channel #bar not found"));
    }

    #[tokio::test]
    async fn points_actions_report_balances() {
        let mut h = harness().await;
        drain(&mut h.logs);

        let add = PointsAction::Add { user: "alice".into(), amount: 50 };
        h.service.handle(ControlMessage::Points { action: add }).await;
        let see = PointsAction::See { user: "alice".into() };
        h.service.handle(ControlMessage::Points { action: see.clone() }).await;
        let remove = PointsAction::Remove { user: "alice".into(), amount: 1000 };
        h.service.handle(ControlMessage::Points { action: remove }).await;
        h.service.handle(ControlMessage::Points { action: see }).await;

        let lines = drain(&mut h.logs);
        assert_eq!(
            texts(&lines),
            vec![
                "Added 50 Elchcoins to alice (now 50)",
                "alice has 50 Elchcoins",
                "Removed 1000 Elchcoins from alice (now 0)",
                "alice has 0 Elchcoins",
            ]
        );
    }

    #[tokio::test]
    async fn module_operations_log_their_outcome() {
        let mut h = harness().await;
        drain(&mut h.logs);

        h.service.handle(ControlMessage::ReloadModule { name: "dice".into() }).await;
        h.service.handle(ControlMessage::ReloadModule { name: "nope".into() }).await;
        h.service.handle(ControlMessage::ListModules).await;

        let lines = drain(&mut h.logs);
        assert!(lines.iter().any(|l| l.level == LogLevel::Success && l.text == "Reloaded module dice"));
        assert!(lines.iter().any(|l| l.level == LogLevel::Error && l.text.contains("nope")));
        assert!(lines.iter().any(|l| l.text == "  dice [loaded] 1 commands"));
    }

    #[tokio::test]
    async fn reload_into_a_disabled_manifest_is_reported() {
        let mut h = harness().await;
        drain(&mut h.logs);

        std::fs::write(h._dir.path().join("dice.yaml"), "enabled: false\n").unwrap();
        h.service.handle(ControlMessage::ReloadModule { name: "dice".into() }).await;

        let lines = drain(&mut h.logs);
        assert!(lines
            .iter()
            .any(|l| l.level == LogLevel::Warning && l.text == "Module dice is disabled"));
        assert!(!lines.iter().any(|l| l.text == "Reloaded module dice"));
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let h = harness().await;
        let (tx, rx) = command_channel();
        tx.send(ControlMessage::Status).unwrap();
        tx.send(ControlMessage::Shutdown).unwrap();

        let token = CancelToken::new();
        tokio::time::timeout(
            Duration::from_secs(1),
            h.service.run(rx, Duration::from_millis(5), token.clone()),
        )
        .await
        .unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn closed_channel_counts_as_shutdown() {
        let h = harness().await;
        let (tx, rx) = command_channel();
        drop(tx);

        let token = CancelToken::new();
        tokio::time::timeout(
            Duration::from_secs(1),
            h.service.run(rx, Duration::from_millis(5), token.clone()),
        )
        .await
        .unwrap();
        assert!(token.is_cancelled());
    }
}
