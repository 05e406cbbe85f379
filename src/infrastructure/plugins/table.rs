//! Command table - the published set of registrations from loaded modules
//!
//! The table is immutable once built. Loading or unloading a module builds a
//! new table and swaps the shared pointer, so dispatch always works on a
//! consistent snapshot and an in-flight invocation keeps its handler alive.

use libloading::Library;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::domain::entities::{CommandHandler, FollowHandler};

/// A registered command
pub struct CommandEntry {
    pub name: String,
    pub aliases: Vec<String>,
    pub description: Option<String>,
    pub usage: Option<String>,
    /// Name of the module that registered the command
    pub module: String,
    pub handler: Arc<dyn CommandHandler>,
    // Declared after the handler: the library must outlive code loaded from it
    _library: Option<Arc<Library>>,
}

impl CommandEntry {
    pub fn new(
        name: impl Into<String>,
        module: impl Into<String>,
        handler: Arc<dyn CommandHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            description: None,
            usage: None,
            module: module.into(),
            handler,
            _library: None,
        }
    }

    pub(crate) fn with_library(mut self, library: Option<Arc<Library>>) -> Self {
        self._library = library;
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

impl fmt::Debug for CommandEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandEntry")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("module", &self.module)
            .finish()
    }
}

/// A registered follow listener
pub struct FollowEntry {
    pub module: String,
    pub handler: Arc<dyn FollowHandler>,
    _library: Option<Arc<Library>>,
}

impl FollowEntry {
    pub(crate) fn new(
        module: impl Into<String>,
        handler: Arc<dyn FollowHandler>,
        library: Option<Arc<Library>>,
    ) -> Self {
        Self {
            module: module.into(),
            handler,
            _library: library,
        }
    }
}

/// Snapshot of every reachable command and follow listener
#[derive(Default, Clone)]
pub struct CommandTable {
    by_name: HashMap<String, Arc<CommandEntry>>,
    commands: Vec<Arc<CommandEntry>>,
    follow: Vec<Arc<FollowEntry>>,
}

impl CommandTable {
    /// Case-sensitive lookup by primary name or alias
    pub fn get(&self, name: &str) -> Option<Arc<CommandEntry>> {
        self.by_name.get(name).cloned()
    }

    /// Module owning `name`, if any
    pub fn owner_of(&self, name: &str) -> Option<&str> {
        self.by_name.get(name).map(|entry| entry.module.as_str())
    }

    /// Commands in registration order
    pub fn commands(&self) -> impl Iterator<Item = &Arc<CommandEntry>> {
        self.commands.iter()
    }

    pub fn follow_handlers(&self) -> impl Iterator<Item = &Arc<FollowEntry>> {
        self.follow.iter()
    }

    pub fn command_count(&self, module: &str) -> usize {
        self.commands.iter().filter(|c| c.module == module).count()
    }

    /// Number of commands, aliases not counted
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// New table with `commands` and `follow` added. Callers have already
    /// checked the names for collisions.
    pub(crate) fn with_registrations(
        &self,
        commands: Vec<CommandEntry>,
        follow: Vec<FollowEntry>,
    ) -> Self {
        let mut table = self.clone();
        for entry in commands {
            let entry = Arc::new(entry);
            for name in entry.names() {
                table.by_name.insert(name.to_string(), entry.clone());
            }
            table.commands.push(entry);
        }
        table.follow.extend(follow.into_iter().map(Arc::new));
        table
    }

    /// New table without anything owned by `module`
    pub(crate) fn without_module(&self, module: &str) -> Self {
        Self {
            by_name: self
                .by_name
                .iter()
                .filter(|(_, entry)| entry.module != module)
                .map(|(name, entry)| (name.clone(), entry.clone()))
                .collect(),
            commands: self
                .commands
                .iter()
                .filter(|entry| entry.module != module)
                .cloned()
                .collect(),
            follow: self
                .follow
                .iter()
                .filter(|entry| entry.module != module)
                .cloned()
                .collect(),
        }
    }
}

/// Shared pointer to the current table
#[derive(Clone, Default)]
pub struct SharedCommandTable {
    current: Arc<RwLock<Arc<CommandTable>>>,
}

impl SharedCommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The table as of now. Later swaps do not affect the returned snapshot.
    pub fn snapshot(&self) -> Arc<CommandTable> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub(crate) fn replace(&self, table: CommandTable) {
        let table = Arc::new(table);
        match self.current.write() {
            Ok(mut guard) => *guard = table,
            Err(poisoned) => *poisoned.into_inner() = table,
        }
    }
}
