//! Module system for elchbot
//!
//! Modules are described by `<name>.yaml` manifests in the module directory.
//! A manifest either names a shared library exporting `elchbot_module_create`
//! or refers to a module compiled into the binary.

pub mod catalog;
pub mod loader;
pub mod manifest;
pub mod registry;
pub mod table;

pub use catalog::{ModuleCatalog, ModuleFactory};
pub use loader::ModuleLoader;
pub use manifest::ModuleManifest;
pub use registry::ModuleRegistry;
pub use table::{CommandEntry, CommandTable, FollowEntry, SharedCommandTable};
