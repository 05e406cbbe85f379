//! Chat message handling - parsing, middleware, dispatching

pub mod dispatcher;
pub mod middleware;
pub mod parser;

pub use dispatcher::{CommandDispatcher, DispatchOutcome};
pub use middleware::{
    CooldownMiddleware, LoggingMiddleware, Middleware, MiddlewareChain, MiddlewareError,
    PolicyMiddleware, UsageLimitMiddleware,
};
pub use parser::{CommandParser, ParsedCommand};
