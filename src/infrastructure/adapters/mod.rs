//! Adapters - the operator console and chat transports

pub mod console;
pub mod local;

pub use local::LocalTransport;
