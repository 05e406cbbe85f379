//! Domain layer - Core business logic
//!
//! This layer contains:
//! - Entities: Core business objects (Chatter, ChatMessage, Command, Module state)
//! - Traits: Abstractions for infrastructure (ChatTransport, Ledger)

pub mod entities;
pub mod traits;
