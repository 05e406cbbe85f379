//! elchbot - a chat bot with hot-reloadable command modules and an
//! Elchcoins ledger, driven from an operator console.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod plugins;
