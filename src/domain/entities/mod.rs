//! Domain entities - Core business objects

pub mod user;
pub mod message;
pub mod command;
pub mod module;

pub use user::{Chatter, Role};
pub use message::{normalize_channel, ChatEvent, ChatMessage, FollowEvent};
pub use command::{
    Command, CommandHandler, FnHandler, FollowHandler, HandlerResult, Invocation, Responder,
};
pub use module::{ModuleInfo, ModuleState};
