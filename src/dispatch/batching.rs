//! Batching decorator for report consumers.
//!
//! Coalesces single reports into batches for a slower inner consumer.
//!
//! ```text
//! consume(reports) ──▶ unbounded channel ──▶ accumulator task
//!                                               │
//!          ACCUMULATING ── count reached / timer fired ──▶ FLUSHING ──┐
//!               ▲                                                    │
//!               └────────────────────────────────────────────────────┘
//!          ACCUMULATING ── close() ──▶ final flush, task exits
//! ```
//!
//! The batch timer starts when the first report of a batch arrives. A batch
//! is never flushed empty.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::adapter::{ConsumerError, PrefixAndHandler, ReportConsumer};
use crate::config::BatchSettings;
use crate::control::ReportRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchingConfig {
    pub max_batch_count: usize,
    pub batch_timeout: Duration,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            max_batch_count: 50,
            batch_timeout: Duration::from_secs(60),
        }
    }
}

impl From<BatchSettings> for BatchingConfig {
    fn from(settings: BatchSettings) -> Self {
        Self {
            max_batch_count: settings.max_batch_count.max(1),
            batch_timeout: settings.batch_timeout(),
        }
    }
}

pub struct BatchingConsumer {
    name: String,
    inner: Arc<dyn ReportConsumer>,
    tx: Mutex<Option<mpsc::UnboundedSender<Arc<ReportRequest>>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BatchingConsumer {
    /// Wraps `inner` and spawns the accumulator. Must be called within a
    /// tokio runtime.
    pub fn new(inner: Arc<dyn ReportConsumer>, config: BatchingConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(accumulate(inner.clone(), rx, config));
        tracing::debug!(
            consumer = inner.name(),
            max_batch_count = config.max_batch_count,
            batch_timeout_ms = config.batch_timeout.as_millis() as u64,
            "Batching enabled"
        );
        Self {
            name: inner.name().to_string(),
            inner,
            tx: Mutex::new(Some(tx)),
            task: Mutex::new(Some(task)),
        }
    }

    /// Flushes any partial batch and waits for the accumulator to exit.
    pub async fn close(&self) {
        drop(self.tx.lock().unwrap_or_else(PoisonError::into_inner).take());
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(consumer = %self.name, error = %e, "Batch accumulator panicked");
            }
        }
    }
}

impl ReportConsumer for BatchingConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    fn consume(&self, reports: &[Arc<ReportRequest>]) -> Result<(), ConsumerError> {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            return Err(ConsumerError::Consume(format!("{}: batcher is closed", self.name)));
        };
        for report in reports {
            tx.send(report.clone())
                .map_err(|_| ConsumerError::Consume(format!("{}: batcher is closed", self.name)))?;
        }
        Ok(())
    }

    fn prefix_and_handler(&self) -> Option<PrefixAndHandler> {
        self.inner.prefix_and_handler()
    }
}

async fn accumulate(
    inner: Arc<dyn ReportConsumer>,
    mut rx: mpsc::UnboundedReceiver<Arc<ReportRequest>>,
    config: BatchingConfig,
) {
    let mut batch = Vec::with_capacity(config.max_batch_count);
    loop {
        let Some(first) = rx.recv().await else {
            break;
        };
        batch.push(first);

        let timer = tokio::time::sleep(config.batch_timeout);
        tokio::pin!(timer);

        while batch.len() < config.max_batch_count {
            tokio::select! {
                item = rx.recv() => match item {
                    Some(report) => batch.push(report),
                    None => {
                        flush(inner.as_ref(), &mut batch);
                        return;
                    }
                },
                _ = &mut timer => break,
            }
        }
        flush(inner.as_ref(), &mut batch);
    }
    flush(inner.as_ref(), &mut batch);
}

fn flush(inner: &dyn ReportConsumer, batch: &mut Vec<Arc<ReportRequest>>) {
    if batch.is_empty() {
        return;
    }
    if let Err(e) = inner.consume(batch) {
        tracing::warn!(consumer = inner.name(), size = batch.len(), error = %e, "Batch flush failed");
    }
    batch.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        flushes: Mutex<Vec<usize>>,
    }

    impl Recorder {
        fn flushes(&self) -> Vec<usize> {
            self.flushes.lock().unwrap().clone()
        }
    }

    impl ReportConsumer for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn consume(&self, reports: &[Arc<ReportRequest>]) -> Result<(), ConsumerError> {
            self.flushes.lock().unwrap().push(reports.len());
            Ok(())
        }
    }

    fn report() -> Arc<ReportRequest> {
        Arc::new(ReportRequest {
            service_name: "svc1".into(),
            operations: Vec::new(),
        })
    }

    fn batcher(max: usize, timeout_ms: u64) -> (BatchingConsumer, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let consumer = BatchingConsumer::new(
            recorder.clone(),
            BatchingConfig {
                max_batch_count: max,
                batch_timeout: Duration::from_millis(timeout_ms),
            },
        );
        (consumer, recorder)
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_of_one_flushes_every_item() {
        let (consumer, recorder) = batcher(1, 1_000);
        for _ in 0..3 {
            consumer.consume(&[report()]).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(recorder.flushes(), vec![1, 1, 1]);
        consumer.close().await;
        assert_eq!(recorder.flushes(), vec![1, 1, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_burst_flushes_once() {
        let (consumer, recorder) = batcher(4, 1_000);
        for _ in 0..4 {
            consumer.consume(&[report()]).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(recorder.flushes(), vec![4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_batch_flushes_on_timeout() {
        let (consumer, recorder) = batcher(4, 1_000);
        consumer.consume(&[report(), report()]).unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(recorder.flushes().is_empty());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(recorder.flushes(), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_without_items_never_flushes() {
        let (consumer, recorder) = batcher(4, 1_000);
        consumer.close().await;
        assert!(recorder.flushes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_flushes_partial_batch() {
        let (consumer, recorder) = batcher(10, 60_000);
        consumer.consume(&[report(), report(), report()]).unwrap();
        consumer.close().await;
        assert_eq!(recorder.flushes(), vec![3]);
        assert!(consumer.consume(&[report()]).is_err());
    }

    #[test]
    fn test_default_config() {
        let config = BatchingConfig::default();
        assert_eq!(config.max_batch_count, 50);
        assert_eq!(config.batch_timeout, Duration::from_secs(60));
    }
}
