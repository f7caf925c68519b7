//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (batching entries name enabled consumers)
//! - Validate value ranges (workers > 0, intervals > 0, address parses)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::GatewayConfig;

/// One semantic problem in the gateway settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.request_timeout_secs", "must be at least 1"));
    }

    let reports = &config.reports;
    if reports.workers == 0 {
        errors.push(ValidationError::new("reports.workers", "must be at least 1"));
    }
    if reports.queue_capacity == 0 {
        errors.push(ValidationError::new("reports.queue_capacity", "must be at least 1"));
    }
    for (name, batch) in &reports.batching {
        if !reports.consumers.iter().any(|c| c == name) {
            errors.push(ValidationError::new(
                format!("reports.batching.{name}"),
                "names a consumer that is not enabled",
            ));
        }
        if batch.max_batch_count == 0 {
            errors.push(ValidationError::new(
                format!("reports.batching.{name}.max_batch_count"),
                "must be at least 1",
            ));
        }
        if batch.batch_timeout_ms == 0 {
            errors.push(ValidationError::new(
                format!("reports.batching.{name}.batch_timeout_ms"),
                "must be at least 1",
            ));
        }
    }

    if config.services.source.trim().is_empty() {
        errors.push(ValidationError::new("services.source", "must not be empty"));
    }
    if config.services.poll_interval_secs == 0 {
        errors.push(ValidationError::new("services.poll_interval_secs", "must be at least 1"));
    }
    if config.services.fetch_timeout_secs == 0 {
        errors.push(ValidationError::new("services.fetch_timeout_secs", "must be at least 1"));
    }

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::BatchSettings;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_all_errors_are_reported() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "nope".into();
        config.reports.workers = 0;
        config.reports.batching.insert(
            "cloudwatch".into(),
            BatchSettings {
                max_batch_count: 0,
                batch_timeout_ms: 10,
            },
        );
        config.services.source = String::new();
        config.observability.metrics_address = "localhost".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "reports.workers",
                "reports.batching.cloudwatch",
                "reports.batching.cloudwatch.max_batch_count",
                "services.source",
                "observability.metrics_address",
            ]
        );
    }

    #[test]
    fn test_metrics_address_ignored_when_disabled() {
        let mut config = GatewayConfig::default();
        config.observability.metrics_enabled = false;
        config.observability.metrics_address = String::new();
        assert!(validate_config(&config).is_ok());
    }
}
