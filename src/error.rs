use crate::fetch::supervisor::StopSignal;
use thiserror::Error;

/// Main error type for modelsync
#[derive(Error, Debug)]
pub enum ModelSyncError {
    #[error("Model '{0}' is not configured\n\nTroubleshooting:\n- List configured models in the manifest (models.json)\n- Add it first: modelsync model add {0} --module <module>")]
    NotConfigured(String),

    #[error("Model '{0}' is already configured\n\nTroubleshooting:\n- Remove it first: modelsync model remove {0}\n- Or refresh its files: modelsync tidy")]
    AlreadyConfigured(String),

    #[error("No models configured\n\nTroubleshooting:\n- Add one first: modelsync model add <name> --module <module>")]
    NoModels,

    #[error("Model '{asset}' uses module '{module}': only transformers models have tokenizers")]
    UnsupportedModule { asset: String, module: String },

    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("The following tokenizer(s) of '{asset}' are already downloaded: {}", .tokenizers.join(", "))]
    AlreadyDownloaded {
        asset: String,
        tokenizers: Vec<String>,
    },

    #[error("Download script failed{}: {message}", exit_code_suffix(.exit_code))]
    Invocation {
        message: String,
        exit_code: Option<i32>,
    },

    #[error("Could not decode download script output: {0}\n\nTroubleshooting:\n- Make sure the script prints a single JSON object on stdout\n- Diagnostics belong on stderr")]
    Decode(String),

    #[error("Download cancelled ({0})")]
    Cancelled(StopSignal),

    #[error("The following tokenizer(s) of '{asset}' couldn't be processed: {}", .failed.join(", "))]
    TokenizerFailures { asset: String, failed: Vec<String> },

    #[error("Config error: {0}\n\nTroubleshooting:\n- Check config file: ./modelsync.toml\n- Is the python virtual environment created (.venv)?\n- Run with RUST_LOG=debug for more details")]
    Config(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ModelSyncError {
    /// Exit code the fetch script uses to ask for a manual single-model add
    pub const MANUAL_ADD_EXIT_CODE: i32 = 2;

    /// Whether the script asked the caller to fall back to a manual add
    #[must_use]
    pub fn needs_manual_add(&self) -> bool {
        matches!(
            self,
            Self::Invocation {
                exit_code: Some(Self::MANUAL_ADD_EXIT_CODE),
                ..
            }
        )
    }
}

fn exit_code_suffix(exit_code: &Option<i32>) -> String {
    exit_code.map_or_else(String::new, |code| format!(" (exit code {code})"))
}

pub type Result<T> = std::result::Result<T, ModelSyncError>;
