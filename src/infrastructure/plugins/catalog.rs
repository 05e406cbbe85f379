//! Catalog of modules compiled into the binary

use std::fmt;
use std::sync::Arc;

use crate::plugins::CommandModule;

pub type ModuleFactory = Arc<dyn Fn() -> Box<dyn CommandModule> + Send + Sync>;

struct CatalogEntry {
    name: String,
    description: String,
    factory: ModuleFactory,
}

/// Factories keyed by stable module id, in registration order
#[derive(Clone, Default)]
pub struct ModuleCatalog {
    entries: Vec<Arc<CatalogEntry>>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module, replacing an earlier entry of the same name
    pub fn with<M, F>(mut self, name: &str, description: &str, factory: F) -> Self
    where
        M: CommandModule + 'static,
        F: Fn() -> M + Send + Sync + 'static,
    {
        self.entries.retain(|e| e.name != name);
        self.entries.push(Arc::new(CatalogEntry {
            name: name.to_string(),
            description: description.to_string(),
            factory: Arc::new(move || Box::new(factory()) as Box<dyn CommandModule>),
        }));
        self
    }

    /// Fresh instance of `name`
    pub fn create(&self, name: &str) -> Option<Box<dyn CommandModule>> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| (e.factory)())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// `(name, description)` pairs
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|e| (e.name.as_str(), e.description.as_str()))
    }
}

impl fmt::Debug for ModuleCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| &e.name))
            .finish()
    }
}
