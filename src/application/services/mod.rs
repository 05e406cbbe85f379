//! Application services

pub mod active_users;
pub mod control_service;

pub use active_users::ActiveUsers;
pub use control_service::{ControlFlow, ControlService};
