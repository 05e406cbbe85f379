//! Command channel between the operator console and the worker
//!
//! Both the command channel and the log channel are in-memory unbounded
//! queues. When console and worker run as separate OS processes the queues
//! are bridged over the worker's stdin/stdout with the [`wire`] codec; the
//! same-process mode hands the queue endpoints over directly.

pub mod process;
pub mod wire;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::application::errors::ChannelError;
use crate::infrastructure::logging::{log_channel, LogReceiver, LogSink};

/// Instruction from the console to the worker
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlMessage {
    ListModules,
    ReloadModule { name: String },
    LoadModule { name: String },
    UnloadModule { name: String },
    Broadcast { text: String, channel: Option<String> },
    Status,
    ListChannels,
    Points { action: PointsAction },
    /// Feed a chat line into a transport that supports injection
    SimulateChat { author: String, text: String, channel: Option<String> },
    Shutdown,
}

/// Ledger administration relayed from the console
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PointsAction {
    See { user: String },
    Add { user: String, amount: u64 },
    Remove { user: String, amount: u64 },
    Reset { user: String },
    Top { limit: usize },
}

/// Create the command channel
pub fn command_channel() -> (CommandSender, CommandReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CommandSender { tx }, CommandReceiver { rx })
}

/// Producer side of the command channel
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<ControlMessage>,
}

impl CommandSender {
    pub fn send(&self, message: ControlMessage) -> Result<(), ChannelError> {
        self.tx.send(message).map_err(|_| ChannelError::Closed)
    }
}

/// Consumer side of the command channel
#[derive(Debug)]
pub struct CommandReceiver {
    rx: mpsc::UnboundedReceiver<ControlMessage>,
}

impl CommandReceiver {
    /// Non-blocking poll. `Ok(None)` means nothing queued right now.
    pub fn try_recv(&mut self) -> Result<Option<ControlMessage>, ChannelError> {
        match self.rx.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(ChannelError::Closed),
        }
    }

    pub async fn recv(&mut self) -> Option<ControlMessage> {
        self.rx.recv().await
    }

    pub fn into_inner(self) -> mpsc::UnboundedReceiver<ControlMessage> {
        self.rx
    }
}

/// Console-facing ends of both channels
#[derive(Debug)]
pub struct ConsoleEndpoints {
    pub commands: CommandSender,
    pub logs: LogReceiver,
}

/// Worker-facing ends of both channels
#[derive(Debug)]
pub struct WorkerEndpoints {
    pub commands: CommandReceiver,
    pub logs: LogSink,
}

/// Both channels wired together inside one process
pub fn local_endpoints() -> (ConsoleEndpoints, WorkerEndpoints) {
    let (cmd_tx, cmd_rx) = command_channel();
    let (log_sink, log_rx) = log_channel();
    (
        ConsoleEndpoints {
            commands: cmd_tx,
            logs: log_rx,
        },
        WorkerEndpoints {
            commands: cmd_rx,
            logs: log_sink,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_channel_is_fifo() {
        let (tx, mut rx) = command_channel();
        tx.send(ControlMessage::ListModules).unwrap();
        tx.send(ControlMessage::ReloadModule { name: "dice".into() }).unwrap();
        tx.send(ControlMessage::Shutdown).unwrap();

        assert_eq!(rx.try_recv().unwrap(), Some(ControlMessage::ListModules));
        assert_eq!(
            rx.try_recv().unwrap(),
            Some(ControlMessage::ReloadModule { name: "dice".into() })
        );
        assert_eq!(rx.try_recv().unwrap(), Some(ControlMessage::Shutdown));
        assert_eq!(rx.try_recv().unwrap(), None);
    }

    #[test]
    fn closed_producer_is_reported() {
        let (tx, mut rx) = command_channel();
        drop(tx);
        assert!(matches!(rx.try_recv(), Err(ChannelError::Closed)));
    }

    #[test]
    fn local_endpoints_are_connected() {
        let (mut console, mut worker) = local_endpoints();
        console.commands.send(ControlMessage::Status).unwrap();
        worker.logs.info("ready");

        assert_eq!(worker.commands.try_recv().unwrap(), Some(ControlMessage::Status));
        assert_eq!(console.logs.try_recv().unwrap().text, "ready");
    }
}
