//! Runs one fetch at a time, racing it against interrupt and terminate
//! signals.
//!
//! The fetch runs on its own task and reports back over a oneshot channel.
//! Whichever comes first, the report or a stop signal, decides the outcome.
//! On a signal the fetch is told to stop through its cancellation token and
//! the caller gets [`ModelSyncError::Cancelled`] right away, without waiting
//! for the task to wind down. Files the script already wrote stay on disk.

use crate::error::{ModelSyncError, Result};
use crate::fetch::protocol::{FetchArgs, FetchOutcome};
use crate::fetch::Fetcher;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Signal asking the current command to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => f.write_str("interrupted"),
            Self::Terminate => f.write_str("terminated"),
        }
    }
}

/// Source of stop requests
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Wait for the next stop request
    async fn recv(&self) -> StopSignal;
}

/// Stop requests coming from the operating system (SIGINT, SIGTERM)
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSignals;

#[async_trait]
impl SignalSource for OsSignals {
    async fn recv(&self) -> StopSignal {
        wait_for_stop().await
    }
}

#[cfg(unix)]
async fn wait_for_stop() -> StopSignal {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => Some(stream),
        Err(e) => {
            tracing::warn!("Could not listen for SIGTERM: {e}");
            None
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => StopSignal::Interrupt,
            Err(e) => {
                tracing::warn!("Could not listen for SIGINT: {e}");
                std::future::pending().await
            }
        },
        Some(()) = async {
            match terminate.as_mut() {
                Some(stream) => stream.recv().await,
                None => std::future::pending().await,
            }
        } => StopSignal::Terminate,
    }
}

#[cfg(not(unix))]
async fn wait_for_stop() -> StopSignal {
    match tokio::signal::ctrl_c().await {
        Ok(()) => StopSignal::Interrupt,
        Err(e) => {
            tracing::warn!("Could not listen for Ctrl-C: {e}");
            std::future::pending().await
        }
    }
}

/// First event seen while a fetch is running
enum Marker {
    Finished(Result<FetchOutcome>),
    Stop(StopSignal),
}

/// Runs fetches so that a stop signal always ends the wait
#[derive(Clone)]
pub struct Supervisor {
    fetcher: Arc<dyn Fetcher>,
    signals: Arc<dyn SignalSource>,
}

impl Supervisor {
    #[must_use]
    pub fn new(fetcher: Arc<dyn Fetcher>, signals: Arc<dyn SignalSource>) -> Self {
        Self { fetcher, signals }
    }

    /// Supervisor listening to the operating system signals
    #[must_use]
    pub fn with_os_signals(fetcher: Arc<dyn Fetcher>) -> Self {
        Self::new(fetcher, Arc::new(OsSignals))
    }

    #[must_use]
    pub fn fetcher_name(&self) -> &str {
        self.fetcher.fetcher_name()
    }

    /// Run a single fetch
    ///
    /// # Errors
    /// - Returns the fetch error unchanged if the fetch finished first
    /// - Returns [`ModelSyncError::Cancelled`] if a stop signal came first
    pub async fn run(&self, args: FetchArgs) -> Result<FetchOutcome> {
        let token = CancellationToken::new();
        // Released on every exit path, a no-op once the fetch is done
        let _guard = token.clone().drop_guard();

        let (done_tx, done_rx) = oneshot::channel();
        let fetcher = Arc::clone(&self.fetcher);
        let worker_token = token.child_token();
        tokio::spawn(async move {
            let result = fetcher.fetch(&args, worker_token).await;
            done_tx.send(result).ok();
        });

        let marker = tokio::select! {
            finished = done_rx => Marker::Finished(finished.unwrap_or_else(|_| {
                Err(ModelSyncError::Invocation {
                    message: "fetch task stopped before reporting a result".to_string(),
                    exit_code: None,
                })
            })),
            signal = self.signals.recv() => Marker::Stop(signal),
        };

        match marker {
            Marker::Finished(result) => result,
            Marker::Stop(signal) => {
                token.cancel();
                tracing::error!("Download cancelled manually ({signal})");
                tracing::warn!(
                    "Partial files may have been downloaded. Remove the related model directory \
                     or the cache if you want to clean them up."
                );
                Err(ModelSyncError::Cancelled(signal))
            }
        }
    }
}
