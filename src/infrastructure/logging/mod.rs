//! Log channel - status lines flowing from the worker to the operator console
//!
//! Any component in the worker pushes [`LogMessage`]s through a cloneable
//! [`LogSink`]. Pushing never blocks: the queue is unbounded and a closed
//! consumer simply drops the line. The sink also implements
//! [`MakeWriter`] so the worker's `tracing` output lands on the same queue.

use serde::{Deserialize, Serialize};
use std::io;
use tokio::sync::mpsc;
use tracing::{Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Success,
    Warning,
    Error,
    Fatal,
    /// Unstructured text, rendered verbatim
    Raw,
}

impl From<&Level> for LogLevel {
    fn from(level: &Level) -> Self {
        match *level {
            Level::ERROR => LogLevel::Error,
            Level::WARN => LogLevel::Warning,
            Level::INFO => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }
}

/// One formatted status line
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LogMessage {
    pub level: LogLevel,
    pub text: String,
}

impl LogMessage {
    pub fn new(level: LogLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }
}

pub type LogReceiver = mpsc::UnboundedReceiver<LogMessage>;

/// Create a connected log sink and its single consumer
pub fn log_channel() -> (LogSink, LogReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (LogSink { tx }, rx)
}

/// Producer side of the log channel
#[derive(Debug, Clone)]
pub struct LogSink {
    tx: mpsc::UnboundedSender<LogMessage>,
}

impl LogSink {
    /// A sink whose consumer is already gone; every push is dropped
    pub fn discard() -> Self {
        log_channel().0
    }

    pub fn push(&self, message: LogMessage) {
        // A gone console must never stall the worker
        let _ = self.tx.send(message);
    }

    pub fn log(&self, level: LogLevel, text: impl Into<String>) {
        self.push(LogMessage::new(level, text));
    }

    pub fn info(&self, text: impl Into<String>) {
        self.log(LogLevel::Info, text);
    }

    pub fn success(&self, text: impl Into<String>) {
        self.log(LogLevel::Success, text);
    }

    pub fn warning(&self, text: impl Into<String>) {
        self.log(LogLevel::Warning, text);
    }

    pub fn error(&self, text: impl Into<String>) {
        self.log(LogLevel::Error, text);
    }
}

/// Buffers one formatted tracing event and pushes it when dropped
pub struct LineWriter {
    sink: LogSink,
    level: LogLevel,
    buf: Vec<u8>,
}

impl io::Write for LineWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for LineWriter {
    fn drop(&mut self) {
        let text = String::from_utf8_lossy(&self.buf);
        let text = text.trim_end();
        if !text.is_empty() {
            self.sink.log(self.level, text);
        }
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = LineWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LineWriter {
            sink: self.clone(),
            level: LogLevel::Info,
            buf: Vec::new(),
        }
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        LineWriter {
            sink: self.clone(),
            level: LogLevel::from(meta.level()),
            buf: Vec::new(),
        }
    }
}

/// `tracing` subscriber for the worker: every event becomes a log line
///
/// `RUST_LOG` overrides the default `info` filter.
pub fn worker_subscriber(sink: LogSink) -> impl tracing::Subscriber + Send + Sync {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false)
        .without_time()
        .with_writer(sink)
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn messages_arrive_in_push_order() {
        let (sink, mut rx) = log_channel();
        sink.info("one");
        sink.success("two");
        sink.error("three");

        assert_eq!(rx.try_recv().unwrap(), LogMessage::new(LogLevel::Info, "one"));
        assert_eq!(rx.try_recv().unwrap(), LogMessage::new(LogLevel::Success, "two"));
        assert_eq!(rx.try_recv().unwrap(), LogMessage::new(LogLevel::Error, "three"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn push_after_consumer_dropped_does_not_panic() {
        let sink = LogSink::discard();
        sink.warning("nobody listens");
    }

    #[test]
    fn line_writer_pushes_one_message_per_event() {
        let (sink, mut rx) = log_channel();
        {
            let mut writer = sink.make_writer();
            write!(writer, "hello ").unwrap();
            writeln!(writer, "world").unwrap();
        }
        assert_eq!(rx.try_recv().unwrap().text, "hello world");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn tracing_events_keep_their_level() {
        let (sink, mut rx) = log_channel();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_target(false)
            .without_time()
            .with_writer(sink)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!("disk almost full");
        });

        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.level, LogLevel::Warning);
        assert!(msg.text.contains("disk almost full"));
    }
}
