use serde::{Deserialize, Serialize};
use std::fmt;

/// Registration state of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ModuleState {
    Unloaded,
    Loaded,
    Failed,
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModuleState::Unloaded => "unloaded",
            ModuleState::Loaded => "loaded",
            ModuleState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Row returned by the registry's `list`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ModuleInfo {
    pub name: String,
    pub state: ModuleState,
    pub command_count: usize,
}
