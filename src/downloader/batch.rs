// Batch executor - runs the single-URL path over many inputs
//
// Failures are isolated per item; only cancellation ends a batch early.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::errors::YtDlpError;
use super::traits::UrlExecutor;

pub const DEFAULT_CONCURRENCY: usize = 3;

/// Per-item outcome of a batch, in input order
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, YtDlpError)>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(&mut self, url: String, result: Result<(), YtDlpError>) {
        match result {
            Ok(()) => self.succeeded.push(url),
            Err(e) => {
                tracing::error!("[Batch] Skipping URL {} due to error: {}", url, e);
                self.failed.push((url, e));
            }
        }
    }
}

/// Run every input one after another
pub async fn run_sequential<E>(
    executor: &E,
    urls: &[String],
    cancel: &CancellationToken,
) -> Result<BatchReport, YtDlpError>
where
    E: UrlExecutor + ?Sized,
{
    if urls.is_empty() {
        tracing::error!("[Batch] No URLs provided for batch download");
        return Err(YtDlpError::EmptyBatch);
    }

    tracing::info!("[Batch] {} sequential items via {}", urls.len(), executor.name());
    let mut report = BatchReport::default();

    for url in urls {
        match executor.execute(url, cancel).await {
            Err(e) if e.is_cancelled() => {
                tracing::warn!("[Batch] Cancelled at {}", url);
                return Err(e);
            }
            result => report.record(url.clone(), result),
        }
    }

    Ok(report)
}

/// Run inputs concurrently, at most `max_concurrency` in flight.
///
/// Each item holds an admission permit for the duration of its run and gives
/// it back whatever the outcome; a failing item never cancels its siblings.
pub async fn run_bounded(
    executor: Arc<dyn UrlExecutor>,
    urls: &[String],
    max_concurrency: usize,
    cancel: &CancellationToken,
) -> Result<BatchReport, YtDlpError> {
    if urls.is_empty() {
        tracing::error!("[Batch] No URLs provided for batch download");
        return Err(YtDlpError::EmptyBatch);
    }
    if max_concurrency == 0 {
        return Err(YtDlpError::InvalidArgument {
            field: "Max concurrency",
            reason: "must be at least 1".to_string(),
        });
    }

    tracing::info!(
        "[Batch] {} items via {}, max {} concurrent",
        urls.len(),
        executor.name(),
        max_concurrency
    );

    let gate = Arc::new(Semaphore::new(max_concurrency));
    let mut tasks = JoinSet::new();

    for (index, url) in urls.iter().enumerate() {
        let gate = Arc::clone(&gate);
        let executor = Arc::clone(&executor);
        let cancel = cancel.clone();
        let url = url.clone();

        tasks.spawn(async move {
            let permit = tokio::select! {
                permit = gate.acquire_owned() => permit,
                _ = cancel.cancelled() => return (index, Err(YtDlpError::Cancelled)),
            };
            let result = match permit {
                Ok(_permit) => executor.execute(&url, &cancel).await,
                Err(e) => Err(YtDlpError::Process(format!("admission gate closed: {}", e))),
            };
            (index, result)
        });
    }

    let mut results: Vec<Option<Result<(), YtDlpError>>> = urls.iter().map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => results[index] = Some(result),
            Err(e) => tracing::error!("[Batch] item task failed: {}", e),
        }
    }

    let mut report = BatchReport::default();
    let mut cancelled = false;
    for (url, result) in urls.iter().zip(results) {
        let result = result.unwrap_or_else(|| Err(YtDlpError::Process("item task panicked".to_string())));
        if matches!(result, Err(YtDlpError::Cancelled)) {
            cancelled = true;
        }
        report.record(url.clone(), result);
    }

    if cancelled {
        tracing::warn!("[Batch] Cancelled after {} completed items", report.succeeded.len());
        return Err(YtDlpError::Cancelled);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeExecutor {
        in_flight: AtomicUsize,
        max_seen: AtomicUsize,
        started: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
        cancel_on: Option<&'static str>,
    }

    #[async_trait]
    impl UrlExecutor for FakeExecutor {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn execute(&self, url: &str, cancel: &CancellationToken) -> Result<(), YtDlpError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            self.started.lock().unwrap().push(url.to_string());

            if self.cancel_on == Some(url) {
                cancel.cancel();
            }
            let result = tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(30)) => {
                    if self.fail_on == Some(url) {
                        Err(YtDlpError::CommandFailed { code: Some(1), stderr: "boom".to_string() })
                    } else {
                        Ok(())
                    }
                }
                _ = cancel.cancelled() => Err(YtDlpError::Cancelled),
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    fn urls(n: usize) -> Vec<String> {
        (1..=n).map(|i| i.to_string()).collect()
    }

    #[tokio::test]
    async fn test_bounded_respects_limit_and_isolates_failure() {
        let executor = Arc::new(FakeExecutor {
            fail_on: Some("4"),
            ..Default::default()
        });

        let report = run_bounded(executor.clone(), &urls(10), 3, &CancellationToken::new())
            .await
            .unwrap();

        assert!(executor.max_seen.load(Ordering::SeqCst) <= 3);
        assert_eq!(executor.started.lock().unwrap().len(), 10);
        assert_eq!(report.total(), 10);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "4");
        assert_eq!(report.succeeded, vec!["1", "2", "3", "5", "6", "7", "8", "9", "10"]);
    }

    #[tokio::test]
    async fn test_bounded_single_slot_is_serial() {
        let executor = Arc::new(FakeExecutor::default());
        let report = run_bounded(executor.clone(), &urls(4), 1, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(executor.max_seen.load(Ordering::SeqCst), 1);
        assert!(report.all_succeeded());
    }

    #[tokio::test]
    async fn test_bounded_rejects_empty_and_zero() {
        let executor: Arc<dyn UrlExecutor> = Arc::new(FakeExecutor::default());
        let cancel = CancellationToken::new();
        assert!(matches!(
            run_bounded(executor.clone(), &[], 3, &cancel).await,
            Err(YtDlpError::EmptyBatch)
        ));
        assert!(matches!(
            run_bounded(executor, &urls(2), 0, &cancel).await,
            Err(YtDlpError::InvalidArgument { .. })
        ));
    }

    #[tokio::test]
    async fn test_bounded_cancellation_propagates() {
        let executor = Arc::new(FakeExecutor {
            cancel_on: Some("2"),
            ..Default::default()
        });
        let result = run_bounded(executor, &urls(10), 2, &CancellationToken::new()).await;
        assert!(matches!(result, Err(YtDlpError::Cancelled)));
    }

    #[tokio::test]
    async fn test_sequential_continues_past_failure() {
        let executor = FakeExecutor {
            fail_on: Some("2"),
            ..Default::default()
        };
        let report = run_sequential(&executor, &urls(4), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(executor.max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(report.succeeded, vec!["1", "3", "4"]);
        assert_eq!(report.failed.len(), 1);
    }

    #[tokio::test]
    async fn test_sequential_stops_on_cancel() {
        let executor = FakeExecutor {
            cancel_on: Some("2"),
            ..Default::default()
        };
        let result = run_sequential(&executor, &urls(5), &CancellationToken::new()).await;
        assert!(matches!(result, Err(YtDlpError::Cancelled)));
        assert_eq!(*executor.started.lock().unwrap(), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_sequential_empty_batch() {
        let executor = FakeExecutor::default();
        let result = run_sequential(&executor, &[], &CancellationToken::new()).await;
        assert!(matches!(result, Err(YtDlpError::EmptyBatch)));
    }
}
