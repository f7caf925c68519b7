//! `log` report consumer: writes reports to the process log.
//!
//! One `tracing` event per operation under the `mixgate::report` target, plus
//! one per log entry carrying its payload. Routing to files or collectors is
//! left to the subscriber.

use std::sync::Arc;

use crate::adapter::{ConsumerBuilder, ConsumerError, ReportConsumer};
use crate::config::GatewayConfig;
use crate::control::{LogEntry, Operation, ReportRequest};

pub const NAME: &str = "log";

pub struct LogSinkConsumer;

impl LogSinkConsumer {
    fn log_operation(service: &str, operation: &Operation) {
        let metrics: Vec<&str> = operation
            .metric_value_sets
            .iter()
            .map(|set| set.metric_name.as_str())
            .collect();
        tracing::info!(
            target: "mixgate::report",
            service = %service,
            operation_id = %operation.operation_id,
            operation_name = %operation.operation_name,
            consumer_id = %operation.consumer_id,
            start_time = operation.start_time.as_deref().unwrap_or_default(),
            end_time = operation.end_time.as_deref().unwrap_or_default(),
            metrics = ?metrics,
            "Operation reported"
        );
        for entry in &operation.log_entries {
            Self::log_entry(service, &operation.operation_id, entry);
        }
    }

    fn log_entry(service: &str, operation_id: &str, entry: &LogEntry) {
        let payload = match (&entry.struct_payload, &entry.text_payload) {
            (Some(fields), _) => serde_json::Value::Object(fields.clone()).to_string(),
            (None, Some(text)) => text.clone(),
            (None, None) => String::new(),
        };
        match entry.severity.to_ascii_uppercase().as_str() {
            "ERROR" | "CRITICAL" | "ALERT" | "EMERGENCY" => tracing::error!(
                target: "mixgate::report",
                service = %service, operation_id = %operation_id, log = %entry.name, payload = %payload,
                "Log entry"
            ),
            "WARNING" => tracing::warn!(
                target: "mixgate::report",
                service = %service, operation_id = %operation_id, log = %entry.name, payload = %payload,
                "Log entry"
            ),
            _ => tracing::info!(
                target: "mixgate::report",
                service = %service, operation_id = %operation_id, log = %entry.name, payload = %payload,
                "Log entry"
            ),
        }
    }
}

impl ReportConsumer for LogSinkConsumer {
    fn name(&self) -> &str {
        NAME
    }

    fn consume(&self, reports: &[Arc<ReportRequest>]) -> Result<(), ConsumerError> {
        for report in reports {
            for operation in &report.operations {
                Self::log_operation(&report.service_name, operation);
            }
        }
        Ok(())
    }
}

pub struct LogSinkBuilder;

impl ConsumerBuilder for LogSinkBuilder {
    fn build_consumer(&self, _config: &GatewayConfig) -> Result<Arc<dyn ReportConsumer>, ConsumerError> {
        Ok(Arc::new(LogSinkConsumer))
    }
}
