use crate::error::{ModelSyncError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the project configuration file
pub const CONFIG_FILE_NAME: &str = "modelsync.toml";

/// Main configuration structure
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub python: PythonConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct PathsConfig {
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    #[serde(default = "default_manifest")]
    pub manifest: PathBuf,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct PythonConfig {
    pub executable: Option<PathBuf>,
    #[serde(default = "default_venv")]
    pub venv: PathBuf,
    #[serde(default = "default_script")]
    pub script: PathBuf,
}

// Default value functions
fn default_download_dir() -> PathBuf {
    PathBuf::from("models")
}
fn default_manifest() -> PathBuf {
    PathBuf::from("models.json")
}
fn default_venv() -> PathBuf {
    PathBuf::from(".venv")
}
fn default_script() -> PathBuf {
    PathBuf::from("download.py")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            manifest: default_manifest(),
        }
    }
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            executable: None,
            venv: default_venv(),
            script: default_script(),
        }
    }
}

impl Config {
    /// Load config from `<project_dir>/modelsync.toml`
    ///
    /// Falls back to defaults if the file doesn't exist. Partial configs are
    /// merged with defaults.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            tracing::debug!("No {} found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        Self::from_toml(&content)
            .map_err(|e| ModelSyncError::Config(format!("{}: {e}", path.display())))
    }

    /// Parse config from a TOML string
    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Save config atomically (tmp + rename)
    pub fn save(&self, project_dir: &Path) -> Result<()> {
        let path = project_dir.join(CONFIG_FILE_NAME);
        let toml_str = toml::to_string_pretty(self)
            .map_err(|e| ModelSyncError::Config(format!("Failed to serialize config: {e}")))?;

        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, toml_str)?;
        fs::rename(&tmp_path, &path)?;

        Ok(())
    }

    /// Directory the models are downloaded into
    #[must_use]
    pub fn download_dir(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.paths.download_dir)
    }

    /// Manifest file path
    #[must_use]
    pub fn manifest_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.paths.manifest)
    }
}

impl PythonConfig {
    /// Download script path
    #[must_use]
    pub fn script_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.script)
    }

    /// Find the python interpreter to run the script with
    ///
    /// Order: configured executable, the project virtual environment, then
    /// `python3` or `python` from `PATH`.
    pub fn resolve_interpreter(&self, project_dir: &Path) -> Result<PathBuf> {
        if let Some(executable) = &self.executable {
            return which::which(project_dir.join(executable))
                .or_else(|_| which::which(executable))
                .map_err(|e| {
                    ModelSyncError::Config(format!(
                        "Python executable '{}' not usable: {e}",
                        executable.display()
                    ))
                });
        }

        let venv_python = venv_executable(&project_dir.join(&self.venv), "python");
        if venv_python.exists() {
            return Ok(venv_python);
        }

        which::which("python3")
            .or_else(|_| which::which("python"))
            .map_err(|_| {
                ModelSyncError::Config(
                    "Python not found in the virtual environment nor in PATH".to_string(),
                )
            })
    }
}

/// Path of an executable inside a virtual environment
#[must_use]
pub fn venv_executable(venv: &Path, name: &str) -> PathBuf {
    if cfg!(windows) {
        venv.join("Scripts").join(format!("{name}.exe"))
    } else {
        venv.join("bin").join(name)
    }
}
