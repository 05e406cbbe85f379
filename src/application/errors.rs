//! Application layer errors

use thiserror::Error;

/// General bot errors
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("Module error: {0}")]
    Module(#[from] ModuleError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Control error: {0}")]
    Control(#[from] ControlError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors returned by command handlers
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Handler panicked: {0}")]
    Panicked(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Module registry errors
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("Failed to load module: {0}")]
    Load(String),

    #[error("Module '{0}' has no setup capability")]
    MissingSetup(String),

    #[error("Setup of module '{module}' failed: {reason}")]
    Setup { module: String, reason: String },

    #[error("Command name '{name}' is already registered by module '{owner}'")]
    DuplicateCommandName { name: String, owner: String },

    #[error("Module '{0}' not found")]
    NotFound(String),

    #[error("Module '{0}' is not loaded")]
    NotLoaded(String),

    #[error("Module '{0}' is already loaded")]
    AlreadyLoaded(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid amount: {0}")]
    InvalidAmount(u64),

    #[error("Storage task failed: {0}")]
    TaskJoin(String),

    #[error("Lock poisoned")]
    Poisoned,
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Chat transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Failed to send to #{channel}: {reason}")]
    Send { channel: String, reason: String },

    #[error("Disconnected: {0}")]
    Disconnected(String),
}

/// Command/log channel errors
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Channel closed")]
    Closed,

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while executing operator control messages
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Channel #{0} not found")]
    ChannelTargetNotFound(String),

    #[error("Usage: {0}")]
    Usage(String),

    #[error("Unknown command '{0}', type 'help' for a list")]
    UnknownCommand(String),
}
