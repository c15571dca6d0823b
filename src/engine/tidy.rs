use crate::engine::Engine;
use crate::error::{ModelSyncError, Result};
use crate::fetch::FetchArgs;
use crate::models::asset::names_difference;
use crate::models::disk;

/// What a tidy run changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TidyReport {
    /// Assets downloaded during this run
    pub materialized: Vec<String>,
    /// Assets whose download failed
    pub failed: Vec<String>,
    /// Assets left alone because overwriting was declined
    pub skipped: Vec<String>,
    /// Directories of assets missing from the manifest that were deleted
    pub removed_orphans: Vec<String>,
    /// Orphans kept on disk for manual reconciliation
    pub retained_orphans: Vec<String>,
    /// Orphans whose deletion failed
    pub failed_removals: Vec<String>,
}

impl TidyReport {
    /// Whether the run found nothing to do
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.materialized.is_empty()
            && self.failed.is_empty()
            && self.skipped.is_empty()
            && self.removed_orphans.is_empty()
            && self.retained_orphans.is_empty()
            && self.failed_removals.is_empty()
    }
}

impl Engine {
    /// Bring the download directory in line with the manifest
    ///
    /// Every asset flagged `add_to_binary` whose files are missing gets
    /// downloaded, one at a time; a failure is recorded and the next asset is
    /// tried. Directories of assets that are not in the manifest are then
    /// deleted if the user agrees.
    ///
    /// # Errors
    /// - Returns error if the manifest cannot be read or written
    /// - Returns error if the download directory cannot be listed
    /// - Returns [`ModelSyncError::Cancelled`] after saving the progress made so far
    pub async fn tidy(&mut self) -> Result<TidyReport> {
        let mut report = TidyReport::default();
        self.materialize_missing(&mut report).await?;
        self.clean_orphans(&mut report)?;
        Ok(report)
    }

    async fn materialize_missing(&mut self, report: &mut TidyReport) -> Result<()> {
        let mut assets = self.store.load_assets()?;
        let mut changed = false;

        for index in 0..assets.0.len() {
            let asset = &assets.0[index];
            if !asset.add_to_binary {
                continue;
            }

            let mut probe = asset.clone();
            probe.resolve_paths(&self.download_root);
            if disk::path_exists(&probe.path)? {
                continue;
            }

            let base = probe.base_path(&self.download_root);
            let occupied = disk::path_exists(&base)?;
            if occupied {
                let question = format!(
                    "Directory {} already exists, overwrite it with a fresh download of '{}'?",
                    base.display(),
                    probe.name
                );
                if !self.prompt.confirm(&question) {
                    tracing::info!("Skipping '{}'", probe.name);
                    report.skipped.push(probe.name);
                    continue;
                }
            }

            // only reached for an occupied base once the user agreed
            let args = FetchArgs {
                overwrite: occupied,
                ..self.model_args(&probe)
            };
            match self.fetch(args).await {
                Ok(outcome) => {
                    let asset = &mut assets.0[index];
                    asset.apply_fetch(&outcome);
                    if asset.path.as_os_str().is_empty() || outcome.fetched().is_none() {
                        asset.path.clone_from(&probe.path);
                    }
                    asset.is_downloaded = true;
                    report.materialized.push(asset.name.clone());
                    changed = true;
                }
                Err(e @ ModelSyncError::Cancelled(_)) => {
                    if changed {
                        self.save(&assets)?;
                    }
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!("Model '{}' couldn't be downloaded: {e}", probe.name);
                    let asset = &mut assets.0[index];
                    if asset.is_downloaded {
                        asset.is_downloaded = false;
                        changed = true;
                    }
                    report.failed.push(probe.name);
                }
            }
        }

        if changed {
            self.save(&assets)?;
        }
        Ok(())
    }

    fn clean_orphans(&mut self, report: &mut TidyReport) -> Result<()> {
        let declared = self.store.load_assets()?.names();
        let on_disk = disk::downloaded_asset_names(&self.download_root, &declared)?;
        let orphans = names_difference(&on_disk, &declared);
        if orphans.is_empty() {
            return Ok(());
        }

        let question = format!(
            "Those models are not in the manifest: {}. Delete them?",
            orphans.join(", ")
        );
        if !self.prompt.confirm(&question) {
            tracing::info!("Keeping models missing from the manifest");
            report.retained_orphans = orphans;
            return Ok(());
        }

        for name in orphans {
            let path = self.download_root.join(&name);
            match disk::remove_with_empty_parents(&path, &self.download_root) {
                Ok(_) => {
                    tracing::info!("Removed '{name}'");
                    report.removed_orphans.push(name);
                }
                Err(e) => {
                    tracing::warn!("Failed to remove '{name}': {e}");
                    report.failed_removals.push(name);
                }
            }
        }
        Ok(())
    }
}
