use crate::config::schema::Config;
use crate::error::{ModelSyncError, Result};
use crate::fetch::protocol::{build_args, decode_output, FetchArgs, FetchOutcome};
use crate::fetch::supervisor::StopSignal;
use crate::fetch::Fetcher;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Fetcher running the python download script of the project
#[derive(Debug, Clone)]
pub struct ScriptFetcher {
    interpreter: PathBuf,
    script: PathBuf,
}

impl ScriptFetcher {
    /// Create a fetcher from explicit interpreter and script paths
    #[must_use]
    pub const fn new(interpreter: PathBuf, script: PathBuf) -> Self {
        Self {
            interpreter,
            script,
        }
    }

    /// Create a fetcher from config
    ///
    /// # Errors
    /// - Returns error if no python interpreter can be found
    /// - Returns error if the download script does not exist
    pub fn from_config(config: &Config, project_dir: &Path) -> Result<Self> {
        let interpreter = config.python.resolve_interpreter(project_dir)?;
        let script = config.python.script_path(project_dir);

        if !script.exists() {
            return Err(ModelSyncError::Config(format!(
                "Missing download script '{}'",
                script.display()
            )));
        }

        Ok(Self::new(interpreter, script))
    }

    #[must_use]
    pub fn interpreter(&self) -> &Path {
        &self.interpreter
    }

    #[must_use]
    pub fn script(&self) -> &Path {
        &self.script
    }
}

#[async_trait]
impl Fetcher for ScriptFetcher {
    async fn fetch(&self, args: &FetchArgs, cancel: CancellationToken) -> Result<FetchOutcome> {
        let cmd_args = build_args(args);
        tracing::debug!(
            "Running {} {} {:?}",
            self.interpreter.display(),
            self.script.display(),
            cmd_args
        );

        let child = Command::new(&self.interpreter)
            .arg(&self.script)
            .args(&cmd_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ModelSyncError::Invocation {
                message: format!(
                    "Failed to spawn {}: {e}",
                    self.interpreter.display()
                ),
                exit_code: None,
            })?;

        // Dropping the pending wait drops the child, which kills it
        let output = tokio::select! {
            output = child.wait_with_output() => output?,
            () = cancel.cancelled() => {
                tracing::debug!("Fetch of {} cancelled, stopping script", args.describe());
                return Err(ModelSyncError::Cancelled(StopSignal::Interrupt));
            }
        };

        decode_output(output.status.into(), &output.stdout, &output.stderr)
    }

    fn fetcher_name(&self) -> &str {
        "script"
    }
}
