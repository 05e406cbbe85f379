//! Worker child process and the stdio bridges on both sides of it

use std::ffi::OsString;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::wire::{read_frames, write_frames};
use super::{command_channel, ConsoleEndpoints, ControlMessage, WorkerEndpoints};
use crate::application::errors::ChannelError;
use crate::infrastructure::logging::{log_channel, LogLevel, LogMessage};

/// How the worker process ended
#[derive(Debug)]
pub enum WorkerExit {
    Exited(ExitStatus),
    /// Still running after the grace period
    Killed,
}

/// Handle to a spawned `worker` child, owned by the console
pub struct WorkerProcess {
    child: Child,
    bridges: Vec<JoinHandle<()>>,
}

impl WorkerProcess {
    /// Spawn `program args..` with piped stdin/stdout and bridge them to the
    /// command and log channels.
    pub fn spawn(program: &Path, args: &[OsString]) -> Result<(Self, ConsoleEndpoints), ChannelError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take().ok_or(ChannelError::Closed)?;
        let stdout = child.stdout.take().ok_or(ChannelError::Closed)?;

        let (commands, command_rx) = command_channel();
        let (log_sink, logs) = log_channel();

        let writer = tokio::spawn(async move {
            if let Err(e) = write_frames(command_rx.into_inner(), stdin, None).await {
                tracing::debug!("Command bridge closed: {}", e);
            }
        });

        let reader = tokio::spawn(async move {
            let result = read_frames(
                stdout,
                |message: LogMessage| {
                    log_sink.push(message);
                    Ok(())
                },
                |line, _| Some(LogMessage::new(LogLevel::Raw, line)),
            )
            .await;
            if let Err(e) = result {
                log_sink.error(format!("Log bridge failed: {}", e));
            }
        });

        tracing::debug!("Spawned worker process {:?}", child.id());

        Ok((
            Self {
                child,
                bridges: vec![writer, reader],
            },
            ConsoleEndpoints { commands, logs },
        ))
    }

    /// Wait for the worker to exit on its own, killing it after `grace`
    pub async fn wait_or_kill(mut self, grace: Duration) -> Result<WorkerExit, ChannelError> {
        let exit = match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => WorkerExit::Exited(status?),
            Err(_) => {
                tracing::warn!("Worker did not stop within {:?}, killing it", grace);
                self.child.kill().await?;
                WorkerExit::Killed
            }
        };

        for bridge in self.bridges {
            bridge.abort();
        }
        Ok(exit)
    }
}

/// Stdio bridge tasks running inside the worker process
pub struct StdioBridge {
    stop_logs: oneshot::Sender<()>,
    log_writer: JoinHandle<()>,
    command_reader: JoinHandle<()>,
}

impl StdioBridge {
    /// Flush every queued log line to stdout and stop the bridge
    pub async fn finish(self, timeout: Duration) {
        let _ = self.stop_logs.send(());
        if tokio::time::timeout(timeout, self.log_writer).await.is_err() {
            tracing::debug!("Log writer did not finish in time");
        }
        self.command_reader.abort();
    }
}

/// Worker endpoints bridged over the process's own stdin and stdout
pub fn stdio_endpoints() -> (WorkerEndpoints, StdioBridge) {
    bridge_endpoints(tokio::io::stdin(), tokio::io::stdout())
}

/// Worker endpoints bridged over an arbitrary byte stream pair
pub fn bridge_endpoints<R, W>(input: R, output: W) -> (WorkerEndpoints, StdioBridge)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (command_tx, commands) = command_channel();
    let (logs, log_rx) = log_channel();
    let (stop_logs, stop_rx) = oneshot::channel();

    let log_writer = tokio::spawn(async move {
        // stdout is gone, nothing left to report to
        let _ = write_frames(log_rx, output, Some(stop_rx)).await;
    });

    let reader_logs = logs.clone();
    let command_reader = tokio::spawn(async move {
        let result = read_frames(
            input,
            |message: ControlMessage| command_tx.send(message),
            |line, e| {
                reader_logs.error(format!("Dropping undecodable control frame {:?}: {}", line, e));
                None
            },
        )
        .await;
        if let Err(e) = result {
            reader_logs.error(format!("Command bridge failed: {}", e));
        }
        // command_tx drops here, the worker sees the channel as closed
    });

    (
        WorkerEndpoints { commands, logs },
        StdioBridge {
            stop_logs,
            log_writer,
            command_reader,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::channel::wire::{decode, encode};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn bridged_worker_sees_commands_and_emits_logs() {
        let (mut console_out, worker_in) = tokio::io::duplex(256);
        let (worker_out, console_in) = tokio::io::duplex(256);

        let (mut worker, bridge) = bridge_endpoints(worker_in, worker_out);

        console_out
            .write_all(encode(&ControlMessage::ListChannels).unwrap().as_bytes())
            .await
            .unwrap();
        console_out.write_all(b"garbage\n").await.unwrap();
        console_out
            .write_all(encode(&ControlMessage::Shutdown).unwrap().as_bytes())
            .await
            .unwrap();
        drop(console_out);

        let mut received = Vec::new();
        loop {
            match worker.commands.recv().await {
                Some(msg) => received.push(msg),
                None => break,
            }
        }
        assert_eq!(received, vec![ControlMessage::ListChannels, ControlMessage::Shutdown]);

        worker.logs.success("done");
        drop(worker);
        bridge.finish(Duration::from_secs(1)).await;

        let mut lines = BufReader::new(console_in).lines();
        let first: LogMessage = decode(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(first.level, LogLevel::Error);
        assert!(first.text.contains("garbage"));
        let second: LogMessage = decode(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(second, LogMessage::new(LogLevel::Success, "done"));
    }
}
