//! Domain traits - Abstractions for infrastructure implementations

pub mod transport;
pub mod ledger;

pub use transport::{BotInfo, ChatInjector, ChatTransport, EventStream};
pub use ledger::Ledger;
