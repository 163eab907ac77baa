//! Module manifest and catalog documents.
//!
//! A manifest is the sidecar data file shipped next to a module; a catalog
//! lists many modules by URL. Both are parsed as data only.

use serde::{Deserialize, Serialize};
use tether_core::{ModuleId, ModuleMetadata};
use tether_settings::SettingsDefinitions;

/// Sidecar manifest describing one module.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleManifest {
    /// Derived from the module URL when absent.
    #[serde(default)]
    pub id: Option<ModuleId>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub build: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub required_dependencies: Vec<ModuleId>,
    #[serde(default)]
    pub optional_dependencies: Vec<ModuleId>,
    /// Key into the engine's factory table.
    pub entry: String,
    /// Settings defined for the module once it registers.
    #[serde(default)]
    pub settings: SettingsDefinitions,
}

impl ModuleManifest {
    pub fn parse(source: &str) -> anyhow::Result<Self> {
        let manifest: Self = serde_json::from_str(source)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validate the manifest for required fields.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Module manifest missing 'name'");
        }
        if self.entry.trim().is_empty() {
            anyhow::bail!("Module manifest missing 'entry'");
        }
        if matches!(&self.id, Some(id) if id.as_str().is_empty()) {
            anyhow::bail!("Module manifest has an empty 'id'");
        }
        Ok(())
    }

    pub fn module_id(&self, url: &str) -> ModuleId {
        self.id.clone().unwrap_or_else(|| ModuleId::from_url(url))
    }

    pub fn into_metadata(self, url: &str) -> ModuleMetadata {
        ModuleMetadata {
            id: self.module_id(url),
            name: self.name,
            description: self.description,
            authors: self.authors,
            build: self.build,
            url: Some(url.to_string()),
            tags: self.tags,
            required_dependencies: self.required_dependencies,
            optional_dependencies: self.optional_dependencies,
        }
    }
}

/// One module listed in a catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: ModuleId,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub build: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub required_dependencies: Vec<ModuleId>,
    #[serde(default)]
    pub optional_dependencies: Vec<ModuleId>,
    #[serde(default = "default_enabled")]
    pub enabled_by_default: bool,
}

fn default_enabled() -> bool {
    true
}

/// Remote module descriptor document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub modules: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn parse(source: &str) -> anyhow::Result<Self> {
        let catalog: Self = serde_json::from_str(source)?;
        for entry in &catalog.modules {
            if entry.url.trim().is_empty() {
                anyhow::bail!("Catalog entry '{}' missing 'url'", entry.id);
            }
        }
        Ok(catalog)
    }
}
