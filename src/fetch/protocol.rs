//! Wire contract of the download script
//!
//! The script is called as
//! `download.py --emf-client <download path> <name> <module> [flags...]` and
//! prints a JSON object describing what it fetched on stdout. Diagnostics go
//! to stderr and a nonzero exit code signals failure.

use crate::error::{ModelSyncError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

pub const TAG_CLIENT: &str = "--emf-client";
pub const TAG_MODEL_CLASS: &str = "--model-class";
pub const TAG_MODEL_OPTIONS: &str = "--model-options";
pub const TAG_TOKENIZER_CLASS: &str = "--tokenizer-class";
pub const TAG_TOKENIZER_OPTIONS: &str = "--tokenizer-options";
pub const TAG_OVERWRITE: &str = "--overwrite";
pub const TAG_ONLY_CONFIGURATION: &str = "--only-configuration";
pub const TAG_SKIP: &str = "--skip";

/// Arguments of a single fetch request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchArgs {
    pub download_path: PathBuf,
    pub model_name: String,
    pub model_module: String,
    pub model_class: String,
    pub model_options: BTreeMap<String, String>,
    pub tokenizer_class: String,
    pub tokenizer_options: BTreeMap<String, String>,
    pub skip_model: bool,
    pub skip_tokenizer: bool,
    pub only_configuration: bool,
    pub overwrite: bool,
}

impl FetchArgs {
    /// Part of the model the script is told to leave alone
    #[must_use]
    pub const fn skip(&self) -> Option<&'static str> {
        if self.skip_model {
            Some("model")
        } else if self.skip_tokenizer {
            Some("tokenizer")
        } else {
            None
        }
    }

    /// Short description used in progress messages
    #[must_use]
    pub fn describe(&self) -> String {
        if self.skip_model {
            format!(
                "tokenizer '{}' for model '{}'",
                self.tokenizer_class, self.model_name
            )
        } else {
            format!("model '{}'", self.model_name)
        }
    }
}

/// Render options as the `key=value` list the script expects
#[must_use]
pub fn options_to_args(options: &BTreeMap<String, String>) -> Vec<String> {
    options.iter().map(|(k, v)| format!("{k}={v}")).collect()
}

/// Build the argument vector passed to the script
///
/// Mandatory positional arguments always come first. Optional flags are only
/// emitted when their value is set, since the script tells "not provided"
/// apart from "provided empty".
#[must_use]
pub fn build_args(args: &FetchArgs) -> Vec<String> {
    let mut cmd_args = vec![
        TAG_CLIENT.to_string(),
        args.download_path.to_string_lossy().into_owned(),
        args.model_name.clone(),
        args.model_module.clone(),
    ];

    if !args.model_class.is_empty() {
        cmd_args.push(TAG_MODEL_CLASS.to_string());
        cmd_args.push(args.model_class.clone());
    }
    if !args.model_options.is_empty() {
        cmd_args.push(TAG_MODEL_OPTIONS.to_string());
        cmd_args.extend(options_to_args(&args.model_options));
    }

    if !args.tokenizer_class.is_empty() {
        cmd_args.push(TAG_TOKENIZER_CLASS.to_string());
        cmd_args.push(args.tokenizer_class.clone());
    }
    if !args.tokenizer_options.is_empty() {
        cmd_args.push(TAG_TOKENIZER_OPTIONS.to_string());
        cmd_args.extend(options_to_args(&args.tokenizer_options));
    }

    if args.overwrite {
        cmd_args.push(TAG_OVERWRITE.to_string());
    }
    if args.only_configuration {
        cmd_args.push(TAG_ONLY_CONFIGURATION.to_string());
    }
    if let Some(skip) = args.skip() {
        cmd_args.push(TAG_SKIP.to_string());
        cmd_args.push(skip.to_string());
    }

    cmd_args
}

/// Tokenizer part of the script payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedTokenizer {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub class: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

impl FetchedTokenizer {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.path.is_empty() && self.class.is_empty()
    }
}

/// Script payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedAsset {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub module: String,
    #[serde(default)]
    pub class: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer: Option<FetchedTokenizer>,
}

impl FetchedAsset {
    /// No model field was reported
    #[must_use]
    pub fn is_model_empty(&self) -> bool {
        self.path.is_empty() && self.module.is_empty() && self.class.is_empty()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.is_model_empty() && self.tokenizer.as_ref().map_or(true, FetchedTokenizer::is_empty)
    }
}

/// Decoded result of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The script printed nothing
    Absent,
    /// The script printed a payload with every field blank
    Empty,
    Populated(FetchedAsset),
}

impl FetchOutcome {
    #[must_use]
    pub const fn fetched(&self) -> Option<&FetchedAsset> {
        match self {
            Self::Populated(fetched) => Some(fetched),
            Self::Absent | Self::Empty => None,
        }
    }
}

/// How the script process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Code(i32),
    /// Killed by a signal, no exit code available
    Signaled,
}

impl ExitStatus {
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self, Self::Code(0))
    }

    #[must_use]
    pub const fn code(self) -> Option<i32> {
        match self {
            Self::Code(code) => Some(code),
            Self::Signaled => None,
        }
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        status.code().map_or(Self::Signaled, Self::Code)
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "exit status {code}"),
            Self::Signaled => f.write_str("terminated by signal"),
        }
    }
}

/// Turn the captured output of a finished run into an outcome
///
/// On failure stderr is the authoritative message when the script wrote one.
pub fn decode_output(status: ExitStatus, stdout: &[u8], stderr: &[u8]) -> Result<FetchOutcome> {
    if !status.success() {
        let diagnostic = String::from_utf8_lossy(stderr).trim().to_string();
        let message = if diagnostic.is_empty() {
            format!("download script ended with {status}")
        } else {
            diagnostic
        };
        return Err(ModelSyncError::Invocation {
            message,
            exit_code: status.code(),
        });
    }

    if stdout.iter().all(u8::is_ascii_whitespace) {
        return Ok(FetchOutcome::Absent);
    }

    let fetched: FetchedAsset =
        serde_json::from_slice(stdout).map_err(|e| ModelSyncError::Decode(e.to_string()))?;

    if fetched.is_empty() {
        Ok(FetchOutcome::Empty)
    } else {
        Ok(FetchOutcome::Populated(fetched))
    }
}
