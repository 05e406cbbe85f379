//! Module manifest - `<modules-dir>/<name>.yaml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::application::errors::ModuleError;

/// Module metadata. Every field is optional; an empty file is valid.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ModuleManifest {
    pub description: Option<String>,

    /// Disabled modules are discovered but stay unloaded
    pub enabled: bool,

    /// Shared library exporting `elchbot_module_create`. Relative paths are
    /// resolved against the manifest's directory. Without it the module is
    /// looked up in the built-in catalog.
    pub library: Option<PathBuf>,

    /// Free-form settings handed to the module
    pub settings: serde_yaml::Mapping,
}

impl Default for ModuleManifest {
    fn default() -> Self {
        Self {
            description: None,
            enabled: true,
            library: None,
            settings: serde_yaml::Mapping::new(),
        }
    }
}

impl ModuleManifest {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ModuleError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ModuleError::Load(format!("Failed to read manifest {}: {}", path.display(), e)))?;

        let mut manifest = Self::parse(&content)
            .map_err(|e| ModuleError::Load(format!("Failed to parse manifest {}: {}", path.display(), e)))?;

        if let (Some(library), Some(dir)) = (&manifest.library, path.parent()) {
            if library.is_relative() {
                manifest.library = Some(dir.join(library));
            }
        }
        Ok(manifest)
    }

    pub fn parse(content: &str) -> Result<Self, serde_yaml::Error> {
        let has_content = content.lines().any(|line| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#') && line != "---"
        });
        if !has_content {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// File written when seeding a fresh module directory
    pub fn seed(description: &str) -> String {
        format!("description: {:?}\nenabled: true\n", description)
    }
}
