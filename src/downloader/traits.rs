// Executor trait - the single-URL seam the batch executor drives

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::errors::YtDlpError;

/// Anything that can run the single-URL download path
#[async_trait]
pub trait UrlExecutor: Send + Sync {
    /// Name of the executor (for logging)
    fn name(&self) -> &'static str;

    /// Run one input to completion
    async fn execute(&self, url: &str, cancel: &CancellationToken) -> Result<(), YtDlpError>;
}
