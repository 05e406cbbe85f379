//! Infrastructure layer - External concerns
//!
//! This layer contains:
//! - Adapters: Operator console and chat transports
//! - Channel: Command and log channels between console and worker
//! - Config: Configuration loading
//! - Database: SQLite points ledger
//! - Logging: Log channel and tracing integration
//! - Plugins: Module registry, loader and command table

pub mod adapters;
pub mod channel;
pub mod config;
pub mod database;
pub mod logging;
pub mod plugins;
