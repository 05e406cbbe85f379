//! Module registry - owns module lifecycle and the published command table

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::catalog::ModuleCatalog;
use super::loader::{ModuleLoader, ResolvedModule};
use super::manifest::ModuleManifest;
use super::table::SharedCommandTable;
use crate::application::errors::ModuleError;
use crate::domain::entities::{ModuleInfo, ModuleState};
use crate::plugins::{ModuleEnv, Registrar};

const MANIFEST_EXT: &str = "yaml";

struct ModuleSlot {
    name: String,
    state: ModuleState,
    instance: Option<LoadedModule>,
}

struct LoadedModule {
    // Dropped before `library`
    module: Box<dyn crate::plugins::CommandModule>,
    env: ModuleEnv,
    library: Option<std::sync::Arc<libloading::Library>>,
}

/// Registry for command modules found in one directory
///
/// All lifecycle operations are serialized by the slot lock. Command
/// registrations are published by swapping the shared table, which is
/// never held across a handler call.
pub struct ModuleRegistry {
    directory: PathBuf,
    loader: ModuleLoader,
    env: ModuleEnv,
    table: SharedCommandTable,
    slots: Mutex<Vec<ModuleSlot>>,
}

impl ModuleRegistry {
    /// `env` is the template every module's env is derived from; its
    /// command table is the one the registry publishes to.
    pub fn new(directory: impl Into<PathBuf>, catalog: ModuleCatalog, env: ModuleEnv) -> Self {
        Self {
            directory: directory.into(),
            loader: ModuleLoader::new(catalog),
            table: env.commands.clone(),
            env,
            slots: Mutex::new(Vec::new()),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn commands(&self) -> SharedCommandTable {
        self.table.clone()
    }

    /// Module ids in the directory, one per `*.yaml` manifest. Hidden files
    /// and stems starting with `_` are skipped. An unreadable directory
    /// yields nothing.
    pub fn discover(&self) -> impl Iterator<Item = String> {
        let entries = match std::fs::read_dir(&self.directory) {
            Ok(entries) => Some(entries),
            Err(e) => {
                tracing::warn!("Cannot read module directory {}: {}", self.directory.display(), e);
                None
            }
        };

        entries.into_iter().flatten().filter_map(|entry| {
            let path = entry.ok()?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(MANIFEST_EXT) {
                return None;
            }
            let stem = path.file_stem()?.to_str()?;
            if stem.is_empty() || stem.starts_with('.') || stem.starts_with('_') {
                return None;
            }
            Some(stem.to_string())
        })
    }

    /// Load one module by id
    pub fn load(&self, name: &str) -> Result<(), ModuleError> {
        let mut slots = self.lock_slots()?;
        if let Some(slot) = slots.iter().find(|s| s.name == name) {
            if slot.state == ModuleState::Loaded {
                return Err(ModuleError::AlreadyLoaded(name.to_string()));
            }
        }
        self.load_locked(&mut slots, name)
    }

    /// Clean up, drop and load `name` again from scratch
    pub fn reload(&self, name: &str) -> Result<(), ModuleError> {
        let mut slots = self.lock_slots()?;
        self.unload_locked(&mut slots, name)?;
        if !self.manifest_path(name).is_file() {
            if let Some(slot) = slots.iter_mut().find(|s| s.name == name) {
                slot.state = ModuleState::Failed;
            }
            tracing::error!(module = %name, "Failed to reload module {}: manifest is gone", name);
            return Err(ModuleError::NotFound(name.to_string()));
        }
        self.load_locked(&mut slots, name)
    }

    pub fn unload(&self, name: &str) -> Result<(), ModuleError> {
        let mut slots = self.lock_slots()?;
        self.unload_locked(&mut slots, name)
    }

    /// `(name, state, command_count)` in the order modules were first seen
    pub fn list(&self) -> Vec<ModuleInfo> {
        let table = self.table.snapshot();
        match self.lock_slots() {
            Ok(slots) => slots
                .iter()
                .map(|slot| ModuleInfo {
                    name: slot.name.clone(),
                    state: slot.state,
                    command_count: table.command_count(&slot.name),
                })
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn loaded_count(&self) -> usize {
        self.list()
            .iter()
            .filter(|m| m.state == ModuleState::Loaded)
            .count()
    }

    /// Load every discovered module, seeding the directory with the
    /// built-in modules when it does not exist. Returns how many loaded.
    pub fn load_all(&self) -> Result<usize, ModuleError> {
        if !self.directory.exists() {
            self.seed_directory()?;
        }

        let mut names: Vec<String> = self.discover().collect();
        names.sort();

        let mut loaded = 0;
        for name in names {
            match self.load(&name) {
                Ok(()) => {
                    if self.state_of(&name) == Some(ModuleState::Loaded) {
                        loaded += 1;
                    }
                }
                Err(ModuleError::AlreadyLoaded(_)) => loaded += 1,
                // already logged by load
                Err(_) => {}
            }
        }

        tracing::info!("Loaded {} modules", loaded);
        Ok(loaded)
    }

    /// Clean up every loaded module, last loaded first
    pub fn unload_all(&self) {
        let mut slots = match self.lock_slots() {
            Ok(slots) => slots,
            Err(e) => {
                tracing::error!("Cannot unload modules: {}", e);
                return;
            }
        };
        let loaded: Vec<String> = slots
            .iter()
            .rev()
            .filter(|s| s.state == ModuleState::Loaded)
            .map(|s| s.name.clone())
            .collect();
        for name in loaded {
            if let Err(e) = self.unload_locked(&mut slots, &name) {
                tracing::warn!("Unloading module {} failed: {}", name, e);
            }
        }
    }

    pub fn state_of(&self, name: &str) -> Option<ModuleState> {
        self.lock_slots()
            .ok()?
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.state)
    }

    fn seed_directory(&self) -> Result<(), ModuleError> {
        std::fs::create_dir_all(&self.directory).map_err(|e| {
            ModuleError::Load(format!(
                "Failed to create module directory {}: {}",
                self.directory.display(),
                e
            ))
        })?;
        for (name, description) in self.loader.catalog().entries() {
            let path = self.manifest_path(name);
            std::fs::write(&path, ModuleManifest::seed(description))
                .map_err(|e| ModuleError::Load(format!("Failed to write {}: {}", path.display(), e)))?;
        }
        tracing::info!("Created module directory {}", self.directory.display());
        Ok(())
    }

    fn manifest_path(&self, name: &str) -> PathBuf {
        self.directory.join(format!("{}.{}", name, MANIFEST_EXT))
    }

    fn lock_slots(&self) -> Result<MutexGuard<'_, Vec<ModuleSlot>>, ModuleError> {
        self.slots
            .lock()
            .map_err(|_| ModuleError::Internal("Lock poisoned".to_string()))
    }

    fn load_locked(&self, slots: &mut Vec<ModuleSlot>, name: &str) -> Result<(), ModuleError> {
        let path = self.manifest_path(name);
        if !path.is_file() {
            return Err(ModuleError::NotFound(name.to_string()));
        }

        let index = match slots.iter().position(|s| s.name == name) {
            Some(index) => index,
            None => {
                slots.push(ModuleSlot {
                    name: name.to_string(),
                    state: ModuleState::Unloaded,
                    instance: None,
                });
                slots.len() - 1
            }
        };

        match self.try_load(name, &path) {
            Ok(Some(instance)) => {
                slots[index].state = ModuleState::Loaded;
                slots[index].instance = Some(instance);
                tracing::info!(module = %name, "Loaded module {}", name);
                Ok(())
            }
            Ok(None) => {
                slots[index].state = ModuleState::Unloaded;
                tracing::info!(module = %name, "Module {} is disabled", name);
                Ok(())
            }
            Err(e) => {
                slots[index].state = ModuleState::Failed;
                tracing::error!(module = %name, "Failed to load module {}: {}", name, e);
                Err(e)
            }
        }
    }

    /// Resolve, set up and publish one module. `Ok(None)` for a disabled one.
    fn try_load(&self, name: &str, path: &Path) -> Result<Option<LoadedModule>, ModuleError> {
        let manifest = ModuleManifest::from_file(path)?;
        if !manifest.enabled {
            return Ok(None);
        }

        let ResolvedModule {
            mut module,
            library,
        } = self.loader.resolve(name, &manifest)?;
        let env = self.env.for_module(name, manifest.settings);

        let table = self.table.snapshot();
        let mut registrar = Registrar::new(name, &table);

        let setup = catch_unwind(AssertUnwindSafe(|| module.setup(&mut registrar, &env)));
        let registrations = match setup {
            Ok(Ok(())) => registrar.finish(library.clone()),
            Ok(Err(e)) => Err(e),
            Err(panic) => Err(ModuleError::Setup {
                module: name.to_string(),
                reason: format!("setup panicked: {}", panic_message(panic.as_ref())),
            }),
        };

        match registrations {
            Ok((commands, follow)) => {
                self.table.replace(table.with_registrations(commands, follow));
                Ok(Some(LoadedModule {
                    module,
                    env,
                    library,
                }))
            }
            Err(e) => {
                run_cleanup(name, &mut module, &env);
                drop(module);
                drop(library);
                Err(e)
            }
        }
    }

    fn unload_locked(&self, slots: &mut [ModuleSlot], name: &str) -> Result<(), ModuleError> {
        let slot = slots
            .iter_mut()
            .find(|s| s.name == name)
            .filter(|s| s.state == ModuleState::Loaded)
            .ok_or_else(|| ModuleError::NotLoaded(name.to_string()))?;

        if let Some(mut instance) = slot.instance.take() {
            run_cleanup(name, &mut instance.module, &instance.env);
            self.table.replace(self.table.snapshot().without_module(name));
            // Library handle goes last, after the table no longer refers to it
            let LoadedModule { module, library, .. } = instance;
            drop(module);
            drop(library);
        } else {
            self.table.replace(self.table.snapshot().without_module(name));
        }

        slot.state = ModuleState::Unloaded;
        tracing::info!(module = %name, "Unloaded module {}", name);
        Ok(())
    }
}

/// Best-effort cleanup: errors and panics are logged, never propagated
fn run_cleanup(name: &str, module: &mut Box<dyn crate::plugins::CommandModule>, env: &ModuleEnv) {
    match catch_unwind(AssertUnwindSafe(|| module.cleanup(env))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(module = %name, "Cleanup of module {} failed: {}", name, e),
        Err(panic) => tracing::warn!(
            module = %name,
            "Cleanup of module {} panicked: {}",
            name,
            panic_message(panic.as_ref())
        ),
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
