//! Module contract - what a command module implements and what it is given

use libloading::Library;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use crate::application::errors::ModuleError;
use crate::application::services::ActiveUsers;
use crate::domain::entities::{Command, FnHandler, FollowEvent, FollowHandler, HandlerResult};
use crate::domain::traits::{ChatTransport, Ledger};
use crate::infrastructure::config::RewardsConfig;
use crate::infrastructure::logging::LogSink;
use crate::infrastructure::plugins::table::{CommandEntry, CommandTable, FollowEntry, SharedCommandTable};

/// A loadable unit of chat commands
///
/// `setup` registers everything the module offers. `cleanup` runs before
/// the module is unloaded or reloaded and must stop any background work
/// the module started.
pub trait CommandModule: Send + Sync {
    fn setup(&mut self, registrar: &mut Registrar<'_>, env: &ModuleEnv) -> Result<(), ModuleError>;

    fn cleanup(&mut self, _env: &ModuleEnv) -> Result<(), ModuleError> {
        Ok(())
    }
}

/// Services available to a module
#[derive(Clone)]
pub struct ModuleEnv {
    /// Name of the module this env was built for
    pub module: String,
    pub logs: LogSink,
    pub ledger: Arc<dyn Ledger>,
    pub active_users: Arc<ActiveUsers>,
    pub transport: Arc<dyn ChatTransport>,
    /// Read-only view of the current command table
    pub commands: SharedCommandTable,
    /// `settings:` mapping from the module manifest
    pub settings: serde_yaml::Mapping,
    pub rewards: RewardsConfig,
    pub prefix: String,
    pub started_at: Instant,
}

impl ModuleEnv {
    /// Copy of this env for one module
    pub fn for_module(&self, module: &str, settings: serde_yaml::Mapping) -> Self {
        Self {
            module: module.to_string(),
            settings,
            ..self.clone()
        }
    }

    /// Typed lookup in the module's settings
    pub fn setting<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.settings
            .get(key)
            .and_then(|value| serde_yaml::from_value(value.clone()).ok())
    }
}

/// Collects a module's registrations during `setup`
///
/// Nothing becomes reachable until the registry publishes the whole set.
/// Any rejected name fails the module, even if `setup` ignores the error.
pub struct Registrar<'a> {
    module: &'a str,
    table: &'a CommandTable,
    names: HashSet<String>,
    commands: Vec<CommandEntry>,
    follow: Vec<Arc<dyn FollowHandler>>,
    rejected: Option<ModuleError>,
}

impl<'a> Registrar<'a> {
    pub(crate) fn new(module: &'a str, table: &'a CommandTable) -> Self {
        Self {
            module,
            table,
            names: HashSet::new(),
            commands: Vec::new(),
            follow: Vec::new(),
            rejected: None,
        }
    }

    pub fn module(&self) -> &str {
        self.module
    }

    /// Register a command under its name and every alias
    pub fn register(&mut self, command: Command) -> Result<(), ModuleError> {
        let result = self.check(&command);
        if let Err(e) = &result {
            if self.rejected.is_none() {
                self.rejected = Some(clone_error(e));
            }
            return result;
        }

        let Command {
            name,
            description,
            aliases,
            usage,
            handler,
        } = command;
        let handler = handler.ok_or_else(|| ModuleError::Setup {
            module: self.module.to_string(),
            reason: format!("command '{}' has no handler", name),
        })?;

        for n in std::iter::once(&name).chain(aliases.iter()) {
            self.names.insert(n.clone());
        }
        let mut entry = CommandEntry::new(name, self.module, handler);
        entry.aliases = aliases;
        entry.description = description;
        entry.usage = usage;
        self.commands.push(entry);
        Ok(())
    }

    /// Register a listener for follow events
    pub fn on_follow(&mut self, handler: Arc<dyn FollowHandler>) {
        self.follow.push(handler);
    }

    /// Register an async closure as follow listener
    pub fn on_follow_fn<F, Fut>(&mut self, handler: F)
    where
        F: Fn(FollowEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.on_follow(Arc::new(FnHandler(handler)));
    }

    fn check(&self, command: &Command) -> Result<(), ModuleError> {
        if command.handler.is_none() {
            return Err(ModuleError::Setup {
                module: self.module.to_string(),
                reason: format!("command '{}' has no handler", command.name),
            });
        }

        let mut seen = HashSet::new();
        for name in command.names() {
            if name.is_empty() || name.chars().any(char::is_whitespace) {
                return Err(ModuleError::Setup {
                    module: self.module.to_string(),
                    reason: format!("invalid command name {:?}", name),
                });
            }
            if let Some(owner) = self.table.owner_of(name) {
                return Err(ModuleError::DuplicateCommandName {
                    name: name.to_string(),
                    owner: owner.to_string(),
                });
            }
            if self.names.contains(name) || !seen.insert(name) {
                return Err(ModuleError::DuplicateCommandName {
                    name: name.to_string(),
                    owner: self.module.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Registrations ready to publish, or the first rejection
    pub(crate) fn finish(
        self,
        library: Option<Arc<Library>>,
    ) -> Result<(Vec<CommandEntry>, Vec<FollowEntry>), ModuleError> {
        if let Some(e) = self.rejected {
            return Err(e);
        }
        let commands = self
            .commands
            .into_iter()
            .map(|entry| entry.with_library(library.clone()))
            .collect();
        let follow = self
            .follow
            .into_iter()
            .map(|handler| FollowEntry::new(self.module, handler, library.clone()))
            .collect();
        Ok((commands, follow))
    }
}

fn clone_error(e: &ModuleError) -> ModuleError {
    match e {
        ModuleError::DuplicateCommandName { name, owner } => ModuleError::DuplicateCommandName {
            name: name.clone(),
            owner: owner.clone(),
        },
        ModuleError::Setup { module, reason } => ModuleError::Setup {
            module: module.clone(),
            reason: reason.clone(),
        },
        other => ModuleError::Internal(other.to_string()),
    }
}

/// Export a module from a shared library
///
/// ```ignore
/// struct Hello;
/// impl elchbot::plugins::CommandModule for Hello { /* ... */ }
/// elchbot::export_module!(Hello);
/// ```
///
/// The library must be built with the same compiler and `elchbot` version
/// as the host.
#[macro_export]
macro_rules! export_module {
    ($module:expr) => {
        #[no_mangle]
        pub extern "C" fn elchbot_module_create() -> *mut Box<dyn $crate::plugins::CommandModule> {
            let module: Box<dyn $crate::plugins::CommandModule> = Box::new($module);
            Box::into_raw(Box::new(module))
        }
    };
}
