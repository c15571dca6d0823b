use crate::engine::{transformers_asset, Engine};
use crate::error::{ModelSyncError, Result};
use crate::models::asset::{dedup_names, Asset, Tokenizer, Tokenizers, DEFAULT_TOKENIZER};
use crate::models::disk;
use std::collections::BTreeMap;

/// Outcome of a tokenizer operation that did not fail
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenizerReport {
    pub asset: String,
    /// Tokenizers added, removed or updated
    pub processed: Vec<String>,
    /// Requested names that are not configured for the model
    pub ignored: Vec<String>,
}

/// Per-tokenizer bookkeeping of one operation
#[derive(Debug, Default)]
struct Progress {
    processed: Vec<String>,
    failed: Vec<String>,
    conflicts: Vec<String>,
    ignored: Vec<String>,
}

impl Progress {
    /// Report when nothing failed, otherwise one error naming every failure
    fn finish(self, asset: &str) -> Result<TokenizerReport> {
        if !self.failed.is_empty() {
            let mut failed = self.failed;
            failed.extend(self.conflicts);
            return Err(ModelSyncError::TokenizerFailures {
                asset: asset.to_string(),
                failed,
            });
        }
        if !self.conflicts.is_empty() {
            return Err(ModelSyncError::AlreadyDownloaded {
                asset: asset.to_string(),
                tokenizers: self.conflicts,
            });
        }
        Ok(TokenizerReport {
            asset: asset.to_string(),
            processed: self.processed,
            ignored: self.ignored,
        })
    }
}

/// Split requested names into configured and unknown ones
fn partition_configured(asset: &Asset, names: &[String]) -> (Vec<String>, Vec<String>) {
    let configured = asset.tokenizers.map();
    let (valid, invalid): (Vec<String>, Vec<String>) = dedup_names(names)
        .into_iter()
        .partition(|name| configured.contains_key(name.as_str()));

    if !invalid.is_empty() {
        tracing::warn!(
            "Those tokenizers are not configured for '{}' and will be ignored: {}",
            asset.name,
            invalid.join(", ")
        );
    }
    (valid, invalid)
}

impl Engine {
    /// Download new tokenizers for a transformers model
    ///
    /// Without a model name the user picks one of the transformers models.
    /// Without tokenizer names the default `AutoTokenizer` is added. A
    /// tokenizer that is already configured is rejected without running the
    /// script.
    ///
    /// # Errors
    /// - Returns error if the model is not configured or is not a transformers model
    /// - Returns [`ModelSyncError::AlreadyDownloaded`] if only conflicts prevented the add
    /// - Returns [`ModelSyncError::TokenizerFailures`] naming every tokenizer that failed
    pub async fn add_tokenizers(
        &mut self,
        model: Option<&str>,
        classes: &[String],
        options: &BTreeMap<String, String>,
    ) -> Result<TokenizerReport> {
        let assets = self.store.load_assets()?;

        let model_name = if let Some(name) = model {
            name.to_string()
        } else {
            let candidates = assets.transformers().names();
            if candidates.is_empty() {
                return Err(ModelSyncError::NoModels);
            }
            self.prompt
                .select("Please select the model to add tokenizers to", &candidates)
                .ok_or(ModelSyncError::MissingArgument("model name"))?
        };
        let mut asset = transformers_asset(&assets, &model_name)?;

        let requested = if classes.is_empty() {
            vec![DEFAULT_TOKENIZER.to_string()]
        } else {
            dedup_names(classes)
        };

        let wanted = Tokenizers(requested.iter().map(Tokenizer::new).collect());
        let conflicts = wanted.union(&asset.tokenizers).names();
        if !conflicts.is_empty() {
            tracing::warn!(
                "Tokenizer(s) already downloaded for '{}': {}",
                asset.name,
                conflicts.join(", ")
            );
        }

        let mut progress = Progress::default();
        for class in wanted.difference(&asset.tokenizers).names() {
            let args = self.tokenizer_args(&asset, &class, options);
            match self.fetch(args).await {
                Ok(outcome) => {
                    asset.apply_fetch(&outcome);
                    if !asset.tokenizers.contains_class(&class) {
                        asset.tokenizers.upsert(Tokenizer {
                            path: asset.tokenizer_path(&self.download_root, &class),
                            class: class.clone(),
                            options: options.clone(),
                        });
                    }
                    self.persist(&asset)?;
                    progress.processed.push(class);
                }
                Err(e @ ModelSyncError::Cancelled(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!("Tokenizer '{class}' couldn't be downloaded: {e}");
                    progress.failed.push(class);
                }
            }
        }

        progress.conflicts = conflicts;
        progress.finish(&asset.name)
    }

    /// Delete tokenizers of a transformers model from disk and manifest
    ///
    /// Without tokenizer names the user picks among the configured ones;
    /// picking nothing is a no-op. A tokenizer whose files could not be
    /// deleted stays configured and is reported as failed.
    ///
    /// # Errors
    /// - Returns error if no model is given, or it is missing or not a transformers model
    /// - Returns [`ModelSyncError::TokenizerFailures`] naming every tokenizer that failed
    pub fn remove_tokenizers(
        &mut self,
        model: Option<&str>,
        classes: &[String],
    ) -> Result<TokenizerReport> {
        let model_name = model.ok_or(ModelSyncError::MissingArgument("model name"))?;
        let assets = self.store.load_assets()?;
        let mut asset = transformers_asset(&assets, model_name)?;

        let requested = if classes.is_empty() {
            let available = asset.tokenizers.names();
            if available.is_empty() {
                tracing::info!("Model '{}' has no tokenizers configured", asset.name);
                return Progress::default().finish(&asset.name);
            }
            self.prompt.multiselect(
                "Please select the tokenizer(s) to be deleted",
                &available,
                false,
                true,
            )
        } else {
            classes.to_vec()
        };

        let (valid, ignored) = partition_configured(&asset, &requested);
        let mut progress = Progress {
            ignored,
            ..Progress::default()
        };
        if valid.is_empty() {
            tracing::info!("No selected tokenizers to remove");
            return progress.finish(&asset.name);
        }

        for class in valid {
            let path = asset.tokenizer_path(&self.download_root, &class);
            match disk::remove_with_empty_parents(&path, &self.download_root) {
                Ok(true) => {
                    tracing::info!("Removed tokenizer '{class}' of '{}'", asset.name);
                }
                Ok(false) => {
                    tracing::warn!(
                        "Tokenizer '{class}' was not found at {}, removing it from the manifest only",
                        path.display()
                    );
                }
                Err(e) => {
                    tracing::warn!("Failed to remove tokenizer '{class}': {e}");
                    progress.failed.push(class);
                    continue;
                }
            }
            asset.tokenizers.remove(&class);
            progress.processed.push(class);
        }

        if !progress.processed.is_empty() {
            self.persist(&asset)?;
        }
        progress.finish(&asset.name)
    }

    /// Download again existing tokenizers of a transformers model
    ///
    /// Without tokenizer names the user picks among the configured ones, all
    /// of them by default. The persisted set is `(current - updated) +
    /// updated`, so running the same update twice ends in the same state.
    ///
    /// # Errors
    /// - Returns error if no model is given, or it is missing or not a transformers model
    /// - Returns [`ModelSyncError::TokenizerFailures`] naming every tokenizer that failed
    pub async fn update_tokenizers(
        &mut self,
        model: Option<&str>,
        classes: &[String],
    ) -> Result<TokenizerReport> {
        let model_name = model.ok_or(ModelSyncError::MissingArgument("model name"))?;
        let assets = self.store.load_assets()?;
        let mut asset = transformers_asset(&assets, model_name)?;

        let mut progress = Progress::default();
        let selected = if classes.is_empty() {
            let available = asset.tokenizers.names();
            if available.is_empty() {
                Vec::new()
            } else {
                self.prompt.multiselect(
                    "Please select the tokenizer(s) to be updated",
                    &available,
                    true,
                    true,
                )
            }
        } else {
            let (valid, ignored) = partition_configured(&asset, classes);
            progress.ignored = ignored;
            valid
        };

        if selected.is_empty() {
            tracing::info!("No selected tokenizers to update");
            return progress.finish(&asset.name);
        }

        let mut updated = Tokenizers::default();
        let mut cancelled = None;
        for tokenizer in asset.tokenizers.with_classes(&selected).iter() {
            let args = self.tokenizer_args(&asset, &tokenizer.class, &tokenizer.options);
            match self.fetch(args).await {
                Ok(outcome) => {
                    let fresh = outcome
                        .fetched()
                        .and_then(|f| f.tokenizer.as_ref())
                        .filter(|t| !t.is_empty() && t.class == tokenizer.class)
                        .map_or_else(|| tokenizer.clone(), Tokenizer::from);
                    updated.upsert(fresh);
                    progress.processed.push(tokenizer.class.clone());
                }
                Err(e @ ModelSyncError::Cancelled(_)) => {
                    cancelled = Some(e);
                    break;
                }
                Err(e) => {
                    tracing::warn!("Tokenizer '{}' couldn't be updated: {e}", tokenizer.class);
                    progress.failed.push(tokenizer.class.clone());
                }
            }
        }

        if !updated.is_empty() {
            asset.tokenizers = asset.tokenizers.merge_updated(&updated);
            self.persist(&asset)?;
        }
        if let Some(e) = cancelled {
            return Err(e);
        }
        progress.finish(&asset.name)
    }
}
