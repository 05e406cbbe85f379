//! Module loader - resolves a manifest to a module instance
//!
//! A manifest naming a `library` is loaded from that shared library; every
//! other manifest resolves to the built-in catalog entry of the same name.

use libloading::{Library, Symbol};
use std::path::Path;
use std::sync::Arc;

use super::catalog::ModuleCatalog;
use super::manifest::ModuleManifest;
use crate::application::errors::ModuleError;
use crate::plugins::CommandModule;

/// Symbol every module library must export, see [`crate::export_module!`]
pub const CREATE_SYMBOL: &[u8] = b"elchbot_module_create";

/// Signature of [`CREATE_SYMBOL`]
pub type ModuleCreateFn = unsafe extern "C" fn() -> *mut Box<dyn CommandModule>;

/// A resolved module and the library its code lives in
pub struct ResolvedModule {
    // Dropped before `library`
    pub module: Box<dyn CommandModule>,
    pub library: Option<Arc<Library>>,
}

pub struct ModuleLoader {
    catalog: ModuleCatalog,
}

impl ModuleLoader {
    pub fn new(catalog: ModuleCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &ModuleCatalog {
        &self.catalog
    }

    pub fn resolve(&self, name: &str, manifest: &ModuleManifest) -> Result<ResolvedModule, ModuleError> {
        match &manifest.library {
            Some(path) => load_library(name, path),
            None => self
                .catalog
                .create(name)
                .map(|module| ResolvedModule {
                    module,
                    library: None,
                })
                .ok_or_else(|| ModuleError::MissingSetup(name.to_string())),
        }
    }
}

/// Open a shared library and construct the module it exports
pub fn load_library(name: &str, path: &Path) -> Result<ResolvedModule, ModuleError> {
    if !path.exists() {
        return Err(ModuleError::Load(format!("Library not found: {}", path.display())));
    }

    let library = unsafe {
        Library::new(path).map_err(|e| ModuleError::Load(format!("Failed to load library: {}", e)))?
    };

    let module = {
        let create: Symbol<ModuleCreateFn> = unsafe {
            library.get(CREATE_SYMBOL).map_err(|e| {
                tracing::debug!("{} has no create symbol: {}", path.display(), e);
                ModuleError::MissingSetup(name.to_string())
            })?
        };

        let raw = unsafe { create() };
        if raw.is_null() {
            return Err(ModuleError::Load(format!("{} returned no module", path.display())));
        }
        unsafe { *Box::from_raw(raw) }
    };

    tracing::debug!("Loaded module library {}", path.display());

    Ok(ResolvedModule {
        module,
        library: Some(Arc::new(library)),
    })
}
