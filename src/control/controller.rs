//! Request controller.
//!
//! Checks run inline against the checker manager. Reports are only
//! enqueued; delivery happens on the consumer workers, so the caller's
//! latency does not depend on exporter health.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::control::{CheckRequest, CheckResponse, ReportRequest, ReportResponse};
use crate::dispatch::{CheckerManager, ReportReceiver};
use crate::observability::metrics;

pub type ReportSender = mpsc::Sender<Arc<ReportRequest>>;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("report queue is closed")]
    QueueClosed,
}

/// The shared report queue. A full queue blocks `Controller::report`.
pub fn report_queue(capacity: usize) -> (ReportSender, ReportReceiver) {
    mpsc::channel(capacity.max(1))
}

#[derive(Clone)]
pub struct Controller {
    checker_manager: Arc<CheckerManager>,
    report_tx: ReportSender,
}

impl Controller {
    pub fn new(checker_manager: Arc<CheckerManager>, report_tx: ReportSender) -> Self {
        Self {
            checker_manager,
            report_tx,
        }
    }

    pub fn check(&self, request: &CheckRequest) -> CheckResponse {
        let response = self.checker_manager.check(request);
        tracing::debug!(
            service = %request.service_name,
            consumer = %request.consumer_id(),
            denials = response.check_errors.len(),
            "Check handled"
        );
        response
    }

    /// Enqueues `request` for the report consumers.
    pub async fn report(&self, request: ReportRequest) -> Result<ReportResponse, ControllerError> {
        self.report_tx
            .send(Arc::new(request))
            .await
            .map_err(|_| ControllerError::QueueClosed)?;
        metrics::record_report_enqueued();
        Ok(ReportResponse {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::services::ServicesConfig;
    use crate::control::Operation;

    fn controller(capacity: usize) -> (Controller, ReportReceiver) {
        let manager = Arc::new(CheckerManager::new(Arc::new(ServicesConfig::default())));
        let (tx, rx) = report_queue(capacity);
        (Controller::new(manager, tx), rx)
    }

    #[test]
    fn test_check_without_bindings_passes() {
        let (controller, _rx) = controller(4);
        let request = CheckRequest {
            service_name: "svc1".into(),
            operation: Operation {
                operation_id: "op-7".into(),
                ..Operation::default()
            },
        };
        let response = controller.check(&request);
        assert_eq!(response.operation_id, "op-7");
        assert!(response.check_errors.is_empty());
    }

    #[tokio::test]
    async fn test_report_enqueues_same_message() {
        let (controller, mut rx) = controller(4);
        let request = ReportRequest {
            service_name: "svc1".into(),
            ..ReportRequest::default()
        };
        controller.report(request.clone()).await.unwrap();
        assert_eq!(*rx.recv().await.unwrap(), request);
    }

    #[tokio::test]
    async fn test_report_fails_when_queue_closed() {
        let (controller, rx) = controller(4);
        drop(rx);
        assert!(matches!(
            controller.report(ReportRequest::default()).await,
            Err(ControllerError::QueueClosed)
        ));
    }

    #[tokio::test]
    async fn test_full_queue_applies_backpressure() {
        let (controller, mut rx) = controller(1);
        controller.report(ReportRequest::default()).await.unwrap();

        let blocked = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            controller.report(ReportRequest::default()),
        )
        .await;
        assert!(blocked.is_err());

        rx.recv().await.unwrap();
        controller.report(ReportRequest::default()).await.unwrap();
    }
}
