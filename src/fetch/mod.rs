pub mod protocol;
pub mod script;
pub mod supervisor;

use crate::error::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use protocol::{build_args, FetchArgs, FetchOutcome, FetchedAsset, FetchedTokenizer};
pub use script::ScriptFetcher;
pub use supervisor::{OsSignals, SignalSource, StopSignal, Supervisor};

/// Unified interface for whatever materializes assets on disk
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Run one fetch request
    ///
    /// # Arguments
    /// * `args` - What to fetch and where to put it
    /// * `cancel` - Cancelled when the caller gave up on this request; the
    ///   implementation should stop its work as soon as it notices
    async fn fetch(&self, args: &FetchArgs, cancel: CancellationToken) -> Result<FetchOutcome>;

    /// Get fetcher name for logging/debugging
    fn fetcher_name(&self) -> &str;
}
