//! Filesystem queries over the download directory
//!
//! Assets live at `<root>/<name>` where names are usually `owner/model`, so an
//! asset directory sits one or two levels below the root.

use crate::error::Result;
use std::fs;
use std::path::Path;

/// Whether `path` exists, failing only on I/O errors
pub fn path_exists(path: &Path) -> Result<bool> {
    Ok(path.try_exists()?)
}

/// Whether `dir` is a directory without entries
pub fn is_empty_dir(dir: &Path) -> Result<bool> {
    Ok(fs::read_dir(dir)?.next().is_none())
}

/// Remove `path` recursively, then every parent left empty
///
/// Parents are removed from the deepest one upward and the walk stops at the
/// first non-empty directory or at `root`, which is never removed. Returns
/// `false` when there was nothing to remove. Only failing to remove `path`
/// itself is an error; a failed parent cleanup is logged.
pub fn remove_with_empty_parents(path: &Path, root: &Path) -> Result<bool> {
    if !path_exists(path)? {
        return Ok(false);
    }

    if path.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }

    if let Err(e) = prune_empty_parents(path, root) {
        tracing::warn!(
            "Removed {} but could not clean up its empty parent directories: {e}",
            path.display()
        );
    }

    Ok(true)
}

fn prune_empty_parents(path: &Path, root: &Path) -> Result<()> {
    let mut current = path.parent();
    while let Some(dir) = current {
        if dir == root || !dir.starts_with(root) {
            break;
        }
        if !is_empty_dir(dir)? {
            break;
        }
        tracing::debug!("Removing empty directory {}", dir.display());
        fs::remove_dir(dir)?;
        current = dir.parent();
    }
    Ok(())
}

/// Names of the assets found under the download root, sorted
///
/// A first level directory is an asset when it is declared in `declared`,
/// holds files directly, or holds a `model` directory. Otherwise it is an
/// owner directory and each of its subdirectories is an asset.
pub fn downloaded_asset_names(root: &Path, declared: &[String]) -> Result<Vec<String>> {
    let mut names = Vec::new();
    if !path_exists(root)? {
        return Ok(names);
    }

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let owner = entry.file_name().to_string_lossy().into_owned();
        let owner_path = entry.path();

        if declared.iter().any(|d| d == &owner) || looks_like_asset(&owner_path)? {
            names.push(owner);
            continue;
        }

        for sub in fs::read_dir(&owner_path)? {
            let sub = sub?;
            if sub.file_type()?.is_dir() {
                names.push(format!("{owner}/{}", sub.file_name().to_string_lossy()));
            }
        }
    }

    names.sort();
    Ok(names)
}

fn looks_like_asset(dir: &Path) -> Result<bool> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() || entry.file_name() == "model" {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_remove_cascades_to_empty_parents() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("models");
        let model_dir = root.join("org/model");
        fs::create_dir_all(model_dir.join("model")).unwrap();
        fs::write(model_dir.join("model/weights.bin"), "w").unwrap();

        assert!(remove_with_empty_parents(&model_dir, &root).unwrap());
        assert!(!root.join("org").exists());
        assert!(root.exists());
    }

    #[test]
    fn test_remove_stops_at_non_empty_parent() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("models");
        fs::create_dir_all(root.join("org/first")).unwrap();
        fs::create_dir_all(root.join("org/second")).unwrap();

        assert!(remove_with_empty_parents(&root.join("org/first"), &root).unwrap());
        assert!(!root.join("org/first").exists());
        assert!(root.join("org/second").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_parent_cleanup_still_counts_as_removed() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("models");
        let elsewhere = temp_dir.path().join("elsewhere");
        fs::create_dir_all(elsewhere.join("model")).unwrap();
        fs::create_dir_all(&root).unwrap();
        // rmdir refuses a symlink, so the parent walk fails after the removal
        std::os::unix::fs::symlink(&elsewhere, root.join("linked")).unwrap();

        let removed = remove_with_empty_parents(&root.join("linked/model"), &root).unwrap();

        assert!(removed);
        assert!(!elsewhere.join("model").exists());
        assert!(root.join("linked").exists());
    }

    #[test]
    fn test_remove_missing_path() {
        let temp_dir = TempDir::new().unwrap();
        let removed =
            remove_with_empty_parents(&temp_dir.path().join("nope"), temp_dir.path()).unwrap();
        assert!(!removed);
    }

    #[test]
    fn test_downloaded_asset_names() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("org/model-a/model")).unwrap();
        fs::create_dir_all(root.join("org/model-b")).unwrap();
        fs::create_dir_all(root.join("gpt2/model")).unwrap();
        fs::create_dir_all(root.join("gpt2/AutoTokenizer")).unwrap();
        fs::create_dir_all(root.join("declared/nested")).unwrap();
        fs::write(root.join("stray.txt"), "x").unwrap();

        let names = downloaded_asset_names(root, &["declared".to_string()]).unwrap();
        assert_eq!(names, vec!["declared", "gpt2", "org/model-a", "org/model-b"]);
    }

    #[test]
    fn test_downloaded_asset_names_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let names = downloaded_asset_names(&temp_dir.path().join("models"), &[]).unwrap();
        assert!(names.is_empty());
    }
}
