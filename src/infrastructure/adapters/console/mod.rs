//! Operator console - the process the operator types into
//!
//! Reads lines from stdin on a plain thread, turns them into control
//! messages for the worker and renders the worker's log channel above the
//! prompt. Ctrl+C and end of input behave like `exit`.

pub mod input;
pub mod render;

use std::io::{self, BufRead, Write};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::application::errors::ChannelError;
use crate::infrastructure::channel::{ConsoleEndpoints, ControlMessage};
use crate::infrastructure::logging::{LogLevel, LogMessage};

pub use input::{parse_line, ConsoleAction};
pub use render::Renderer;

/// Operator lines read on a background thread. The receiver yields `None`
/// once stdin reaches end of input.
pub fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

pub struct Console<W: Write> {
    endpoints: ConsoleEndpoints,
    renderer: Renderer<W>,
    grace: Duration,
}

impl<W: Write> Console<W> {
    pub fn new(endpoints: ConsoleEndpoints, renderer: Renderer<W>, grace: Duration) -> Self {
        Self {
            endpoints,
            renderer,
            grace,
        }
    }

    /// Serve the operator until `exit`, Ctrl+C, end of input or the worker
    /// going away. After asking the worker to shut down, keeps rendering its
    /// last lines for up to the grace period.
    pub async fn run(mut self, mut lines: mpsc::UnboundedReceiver<String>) -> Result<W, ChannelError> {
        self.renderer.banner(env!("CARGO_PKG_VERSION"))?;

        loop {
            tokio::select! {
                line = lines.recv() => {
                    let Some(line) = line else { break };
                    if !self.handle_line(&line)? {
                        break;
                    }
                }
                message = self.endpoints.logs.recv() => match message {
                    Some(message) => self.renderer.line(&message)?,
                    None => {
                        self.renderer.error("Worker stopped")?;
                        return Ok(self.renderer.into_inner());
                    }
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        self.shutdown().await?;
        Ok(self.renderer.into_inner())
    }

    /// Returns false when the operator asked to exit
    fn handle_line(&mut self, line: &str) -> Result<bool, ChannelError> {
        match parse_line(line) {
            Ok(ConsoleAction::Control(message)) => {
                if self.endpoints.commands.send(message).is_err() {
                    self.renderer.error("Worker is not listening")?;
                }
            }
            Ok(ConsoleAction::Help) => self.renderer.help()?,
            Ok(ConsoleAction::Clear) => self.renderer.clear()?,
            Ok(ConsoleAction::Nothing) => self.renderer.prompt()?,
            Ok(ConsoleAction::Exit) => return Ok(false),
            Err(e) => self.renderer.error(e.to_string())?,
        }
        Ok(true)
    }

    async fn shutdown(&mut self) -> Result<(), ChannelError> {
        self.renderer
            .line(&LogMessage::new(LogLevel::Warning, "Stopping bot..."))?;
        // worker already gone when this fails
        let _ = self.endpoints.commands.send(ControlMessage::Shutdown);

        let deadline = tokio::time::Instant::now() + self.grace;
        loop {
            match tokio::time::timeout_at(deadline, self.endpoints.logs.recv()).await {
                Ok(Some(message)) => self.renderer.line(&message)?,
                Ok(None) => break,
                Err(_) => {
                    tracing::debug!("Worker still logging after {:?}", self.grace);
                    break;
                }
            }
        }
        self.renderer.newline()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::channel::local_endpoints;

    #[tokio::test]
    async fn lines_become_control_messages_and_exit_sends_shutdown() {
        let (console_side, mut worker_side) = local_endpoints();
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send("modules".to_string()).unwrap();
        tx.send("bogus".to_string()).unwrap();
        tx.send("exit".to_string()).unwrap();

        worker_side.logs.success("Reloaded module dice");

        let console = Console::new(console_side, Renderer::new(Vec::new()), Duration::from_millis(200));
        let out = console.run(rx).await.unwrap();
        let out = String::from_utf8(out).unwrap();

        assert_eq!(worker_side.commands.try_recv().unwrap(), Some(ControlMessage::ListModules));
        assert_eq!(worker_side.commands.try_recv().unwrap(), Some(ControlMessage::Shutdown));
        assert!(out.contains("Unknown command 'bogus'"));
        assert!(out.contains("Stopping bot..."));
    }
}
