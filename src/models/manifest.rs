use crate::error::{ModelSyncError, Result};
use crate::models::asset::Assets;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Access to the declared assets of a project
///
/// Operations receive the store explicitly and read-modify-write it once per
/// command.
pub trait ManifestStore: Send {
    /// Load every configured asset
    fn load_assets(&self) -> Result<Assets>;

    /// Replace the configured assets
    fn save_assets(&mut self, assets: &Assets) -> Result<()>;
}

/// Manifest file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub models: Assets,
    pub last_updated: String,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            models: Assets::default(),
            last_updated: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl Manifest {
    /// Load manifest from file, empty if it doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;

        serde_json::from_str(&content)
            .map_err(|e| ModelSyncError::Manifest(format!("Failed to parse manifest: {e}")))
    }

    /// Save manifest to file atomically (tmp + rename)
    pub fn save(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = path.with_extension("tmp");
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ModelSyncError::Manifest(format!("Failed to serialize manifest: {e}")))?;

        fs::write(&tmp_path, content)?;

        // Atomic rename
        fs::rename(&tmp_path, path)?;

        Ok(())
    }

    /// Replace every asset
    pub fn set_models(&mut self, models: Assets) {
        self.models = models;
        self.last_updated = chrono::Utc::now().to_rfc3339();
    }

    /// Check that asset names and tokenizer classes are unique
    pub fn validate(&self) -> Result<()> {
        let mut names = std::collections::HashSet::new();
        for asset in &self.models {
            if !names.insert(asset.name.as_str()) {
                return Err(ModelSyncError::Manifest(format!(
                    "Model '{}' is declared more than once",
                    asset.name
                )));
            }
            let mut classes = std::collections::HashSet::new();
            for tokenizer in &asset.tokenizers {
                if !classes.insert(tokenizer.class.as_str()) {
                    return Err(ModelSyncError::Manifest(format!(
                        "Tokenizer '{}' is declared more than once for model '{}'",
                        tokenizer.class, asset.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Manifest kept in a JSON file
#[derive(Debug, Clone)]
pub struct FileManifestStore {
    path: PathBuf,
}

impl FileManifestStore {
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ManifestStore for FileManifestStore {
    fn load_assets(&self) -> Result<Assets> {
        let manifest = Manifest::load(&self.path)?;
        manifest.validate()?;
        Ok(manifest.models)
    }

    fn save_assets(&mut self, assets: &Assets) -> Result<()> {
        let mut manifest = Manifest::load(&self.path)?;
        manifest.set_models(assets.clone());
        manifest.save(&self.path)
    }
}
