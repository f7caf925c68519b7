//! Report fan-out worker pool.
//!
//! # Responsibilities
//! - Build the enabled report consumers, wrapping some in the batching decorator
//! - Run N workers that drain the shared report queue
//! - Deliver every report to every consumer, in configuration order
//!
//! # Data Flow
//! ```text
//! Controller::report ──▶ bounded mpsc (Arc<ReportRequest>)
//!                              │  (one receiver, shared by workers)
//!          ┌───────────────────┼───────────────────┐
//!       worker 0            worker 1    ...     worker n-1
//!          │ consume(&[msg]) on each consumer in order
//!          ▼
//!    prometheus, statsd, BatchingConsumer(log), ...
//! ```
//!
//! # Design Decisions
//! - The receiver sits behind an async mutex; a message is taken by exactly
//!   one worker
//! - A failing consumer is logged and does not affect the others
//! - Workers exit when every sender of the queue has been dropped

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::adapter::{PrefixAndHandler, Registries, ReportConsumer};
use crate::config::GatewayConfig;
use crate::control::ReportRequest;
use crate::dispatch::batching::BatchingConsumer;
use crate::observability::metrics;

pub type ReportReceiver = mpsc::Receiver<Arc<ReportRequest>>;

pub struct ReportConsumerManager {
    rx: Arc<Mutex<ReportReceiver>>,
    consumers: Vec<Arc<dyn ReportConsumer>>,
    batchers: Vec<Arc<BatchingConsumer>>,
}

impl ReportConsumerManager {
    /// Builds each named consumer from `registries`.
    ///
    /// Unknown kinds and failed builds are logged and left out. Names listed
    /// under `reports.batching` are wrapped in a [`BatchingConsumer`], which
    /// needs a running tokio runtime.
    pub fn new(
        rx: ReportReceiver,
        registries: &Registries,
        names: &[String],
        config: &GatewayConfig,
    ) -> Self {
        let mut consumers: Vec<Arc<dyn ReportConsumer>> = Vec::new();
        let mut batchers = Vec::new();

        for name in names {
            let Some(builder) = registries.consumers.get(name) else {
                tracing::warn!(consumer = %name, "Report consumer is not registered");
                continue;
            };
            let consumer = match builder.build_consumer(config) {
                Ok(consumer) => consumer,
                Err(e) => {
                    tracing::error!(consumer = %name, error = %e, "Report consumer build failed");
                    continue;
                }
            };

            match config.reports.batching.get(name) {
                Some(settings) => {
                    let batcher = Arc::new(BatchingConsumer::new(consumer, (*settings).into()));
                    batchers.push(batcher.clone());
                    consumers.push(batcher);
                }
                None => consumers.push(consumer),
            }
            tracing::info!(consumer = %name, "Report consumer enabled");
        }

        Self {
            rx: Arc::new(Mutex::new(rx)),
            consumers,
            batchers,
        }
    }

    /// A manager over already-built consumers.
    pub fn with_consumers(rx: ReportReceiver, consumers: Vec<Arc<dyn ReportConsumer>>) -> Self {
        Self {
            rx: Arc::new(Mutex::new(rx)),
            consumers,
            batchers: Vec::new(),
        }
    }

    pub fn consumer_names(&self) -> Vec<String> {
        self.consumers.iter().map(|c| c.name().to_string()).collect()
    }

    /// Spawns `workers` tasks draining the queue.
    pub fn start(&self, workers: usize) -> Vec<JoinHandle<()>> {
        (0..workers)
            .map(|worker| {
                let rx = self.rx.clone();
                let consumers = self.consumers.clone();
                tokio::spawn(async move {
                    tracing::debug!(worker, "Report worker started");
                    loop {
                        let next = rx.lock().await.recv().await;
                        let Some(report) = next else {
                            break;
                        };
                        deliver(&consumers, &report);
                    }
                    tracing::debug!(worker, "Report worker stopped");
                })
            })
            .collect()
    }

    /// HTTP sub-endpoints exposed by the consumers.
    pub fn prefix_and_handlers(&self) -> Vec<PrefixAndHandler> {
        self.consumers
            .iter()
            .filter_map(|c| c.prefix_and_handler())
            .collect()
    }

    /// Flushes and stops every batching decorator.
    pub async fn close(&self) {
        for batcher in &self.batchers {
            batcher.close().await;
        }
    }
}

fn deliver(consumers: &[Arc<dyn ReportConsumer>], report: &Arc<ReportRequest>) {
    for consumer in consumers {
        let result = consumer.consume(std::slice::from_ref(report));
        if let Err(e) = &result {
            tracing::warn!(consumer = consumer.name(), error = %e, "Report consumer failed");
        }
        metrics::record_report_consumed(consumer.name(), result.is_ok());
    }
}
