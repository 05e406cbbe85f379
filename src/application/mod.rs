//! Application layer - Use cases and business logic
//!
//! This layer contains:
//! - Errors: Domain-specific errors
//! - Messaging: Command parsing, middleware, dispatching
//! - Services: Active users and the control channel handler
//! - Worker: The chat-connection process tying it all together

pub mod errors;
pub mod lifecycle;
pub mod messaging;
pub mod services;
pub mod worker;
