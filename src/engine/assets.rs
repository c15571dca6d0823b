use crate::engine::Engine;
use crate::error::{ModelSyncError, Result};
use crate::fetch::FetchArgs;
use crate::models::asset::{dedup_names, names_difference};
use crate::models::{disk, Asset, Assets, Tokenizer, DEFAULT_TOKENIZER};

/// How a new asset is recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddMode {
    /// Download the files and mark the asset as part of the binary
    #[default]
    Download,
    /// Only ask the script for the configuration, nothing is downloaded
    ConfigurationOnly,
}

/// Outcome of removing assets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalReport {
    pub removed: Vec<String>,
    pub not_found: Vec<String>,
    pub failed: Vec<String>,
}

impl Engine {
    /// Add a model to the manifest
    ///
    /// # Errors
    /// - Returns [`ModelSyncError::AlreadyConfigured`] if the name is taken
    /// - Returns error if the script fails, the manifest is untouched then
    pub async fn add_asset(&mut self, asset: Asset, mode: AddMode, overwrite: bool) -> Result<Asset> {
        let mut assets = self.store.load_assets()?;
        if assets.contains_name(&asset.name) {
            return Err(ModelSyncError::AlreadyConfigured(asset.name));
        }

        let mut asset = asset;
        asset.resolve_paths(&self.download_root);

        let args = FetchArgs {
            only_configuration: mode == AddMode::ConfigurationOnly,
            overwrite,
            ..self.model_args(&asset)
        };
        let outcome = self.fetch(args).await?;
        asset.apply_fetch(&outcome);

        if asset.module.supports_tokenizers() && asset.tokenizers.is_empty() {
            asset.tokenizers.upsert(Tokenizer {
                path: asset.tokenizer_path(&self.download_root, DEFAULT_TOKENIZER),
                ..Tokenizer::new(DEFAULT_TOKENIZER)
            });
        }

        let download = mode == AddMode::Download;
        asset.add_to_binary = download;
        asset.is_downloaded = download;

        assets.upsert(asset.clone());
        self.save(&assets)?;
        tracing::info!("Model '{}' added to the manifest", asset.name);
        Ok(asset)
    }

    /// Delete models from disk and manifest
    ///
    /// Without names the user picks among the configured models. Unknown
    /// names are reported, not fatal. A model whose files could not be
    /// deleted stays in the manifest.
    ///
    /// # Errors
    /// - Returns error if the manifest cannot be read or written
    pub fn remove_assets(&mut self, names: &[String]) -> Result<RemovalReport> {
        let assets = self.store.load_assets()?;
        if assets.is_empty() {
            return Err(ModelSyncError::NoModels);
        }

        let requested = if names.is_empty() {
            self.prompt.multiselect(
                "Please select the model(s) to be deleted",
                &assets.names(),
                false,
                true,
            )
        } else {
            dedup_names(names)
        };
        if requested.is_empty() {
            tracing::info!("No selected models to remove");
            return Ok(RemovalReport::default());
        }

        self.remove_selected(&assets, &requested)
    }

    /// Delete every model from disk and manifest
    ///
    /// # Errors
    /// - Returns error if the manifest cannot be read or written
    pub fn remove_all_assets(&mut self) -> Result<RemovalReport> {
        let assets = self.store.load_assets()?;
        if assets.is_empty() {
            return Err(ModelSyncError::NoModels);
        }
        self.remove_selected(&assets, &assets.names())
    }

    fn remove_selected(&mut self, assets: &Assets, requested: &[String]) -> Result<RemovalReport> {
        let mut report = RemovalReport {
            not_found: names_difference(requested, &assets.names()),
            ..RemovalReport::default()
        };
        if !report.not_found.is_empty() {
            tracing::warn!(
                "Those models are not configured and will be ignored: {}",
                report.not_found.join(", ")
            );
        }

        for asset in assets.by_names(requested).iter() {
            let path = asset.base_path(&self.download_root);
            match disk::remove_with_empty_parents(&path, &self.download_root) {
                Ok(true) => {
                    tracing::info!("Removed model '{}'", asset.name);
                    report.removed.push(asset.name.clone());
                }
                Ok(false) => {
                    tracing::warn!(
                        "Model '{}' was not found at {}, removing it from the manifest only",
                        asset.name,
                        path.display()
                    );
                    report.removed.push(asset.name.clone());
                }
                Err(e) => {
                    tracing::warn!("Failed to remove model '{}': {e}", asset.name);
                    report.failed.push(asset.name.clone());
                }
            }
        }

        if !report.removed.is_empty() {
            let removed = assets.by_names(&report.removed);
            self.save(&assets.difference(&removed))?;
        }
        Ok(report)
    }
}
