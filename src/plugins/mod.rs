//! Command modules
//!
//! `trait_def` holds the contract every module implements; `builtin` holds
//! the modules shipped with the bot.

pub mod builtin;
pub mod trait_def;

pub use trait_def::{CommandModule, ModuleEnv, Registrar};
