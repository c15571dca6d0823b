//! Operations keeping the manifest and the download directory in sync
//!
//! Every operation loads the manifest through the store it was given, works
//! on that snapshot, runs fetches one at a time through the [`Supervisor`]
//! and writes the manifest back through the same store.

pub mod assets;
pub mod tidy;
pub mod tokenizer;

use crate::config::schema::Config;
use crate::error::{ModelSyncError, Result};
use crate::fetch::protocol::{FetchArgs, FetchOutcome};
use crate::fetch::{ScriptFetcher, Supervisor};
use crate::models::{Asset, Assets, FileManifestStore, ManifestStore};
use crate::ui::{self, Prompt, TerminalPrompt};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use assets::{AddMode, RemovalReport};
pub use tidy::TidyReport;
pub use tokenizer::TokenizerReport;

/// Hint printed when the script asks for a manual add
const MANUAL_ADD_HINT: &str =
    "Run 'modelsync model add <name> --module <module> --class <class>' to add the model manually.";

/// Owner of everything a command needs: manifest, fetcher and prompts
pub struct Engine {
    store: Box<dyn ManifestStore>,
    supervisor: Supervisor,
    prompt: Box<dyn Prompt>,
    download_root: PathBuf,
}

impl Engine {
    #[must_use]
    pub fn new(
        store: Box<dyn ManifestStore>,
        supervisor: Supervisor,
        prompt: Box<dyn Prompt>,
        download_root: PathBuf,
    ) -> Self {
        Self {
            store,
            supervisor,
            prompt,
            download_root,
        }
    }

    /// Create engine from config, with terminal prompts and OS signals
    ///
    /// # Errors
    /// - Returns error if python or the download script cannot be found
    pub fn from_config(config: &Config, project_dir: &Path) -> Result<Self> {
        let fetcher = ScriptFetcher::from_config(config, project_dir)?;
        tracing::debug!(
            "Using {} to run {}",
            fetcher.interpreter().display(),
            fetcher.script().display()
        );

        Ok(Self::new(
            Box::new(FileManifestStore::new(config.manifest_path(project_dir))),
            Supervisor::with_os_signals(Arc::new(fetcher)),
            Box::new(TerminalPrompt),
            config.download_dir(project_dir),
        ))
    }

    /// Write one asset back, keeping its position in the manifest
    fn persist(&mut self, asset: &Asset) -> Result<()> {
        let mut assets = self.store.load_assets()?;
        assets.upsert(asset.clone());
        self.store.save_assets(&assets)
    }

    fn save(&mut self, assets: &Assets) -> Result<()> {
        self.store.save_assets(assets)
    }

    /// Fetch arguments describing the model part of `asset`
    fn model_args(&self, asset: &Asset) -> FetchArgs {
        FetchArgs {
            download_path: self.download_root.clone(),
            model_name: asset.name.clone(),
            model_module: asset.module.to_string(),
            model_class: asset.class.clone(),
            model_options: asset.options.clone(),
            ..FetchArgs::default()
        }
    }

    /// Fetch arguments for a single tokenizer of `asset`
    fn tokenizer_args(
        &self,
        asset: &Asset,
        class: &str,
        options: &BTreeMap<String, String>,
    ) -> FetchArgs {
        FetchArgs {
            tokenizer_class: class.to_string(),
            tokenizer_options: options.clone(),
            skip_model: true,
            skip_tokenizer: false,
            ..self.model_args(asset)
        }
    }

    /// Run one fetch through the supervisor with a progress spinner
    async fn fetch(&self, args: FetchArgs) -> Result<FetchOutcome> {
        let item = args.describe();
        let only_configuration = args.only_configuration;
        let action = if only_configuration {
            "Getting configuration for"
        } else {
            "Downloading"
        };

        tracing::debug!("{action} {item}");
        let bar = ui::spinner(format!("{action} {item}..."));

        let result = self.supervisor.run(args).await;
        match &result {
            Ok(_) => {
                let done = if only_configuration {
                    "got configuration for"
                } else {
                    "downloaded"
                };
                bar.finish_with_message(format!("✓ Successfully {done} {item}"));
            }
            Err(e) => {
                bar.abandon_with_message(format!("✗ {item}: {e}"));
                if e.needs_manual_add() {
                    tracing::info!("{MANUAL_ADD_HINT}");
                }
            }
        }
        result
    }
}

/// Look up a model that may carry tokenizers
fn transformers_asset(assets: &Assets, name: &str) -> Result<Asset> {
    let asset = assets
        .find(name)
        .ok_or_else(|| ModelSyncError::NotConfigured(name.to_string()))?;

    if !asset.module.supports_tokenizers() {
        return Err(ModelSyncError::UnsupportedModule {
            asset: asset.name.clone(),
            module: asset.module.to_string(),
        });
    }

    Ok(asset.clone())
}
