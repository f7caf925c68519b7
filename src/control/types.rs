//! Check and report request/response types.
//!
//! Shaped after the service-control API: a check asks whether one operation may
//! proceed, a report carries the telemetry of completed operations. The
//! transport serializes these as camelCase JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::control::labels::CALLER_IP;

/// Admission check for a single operation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CheckRequest {
    /// The destination service being called.
    pub service_name: String,
    pub operation: Operation,
}

impl CheckRequest {
    /// Identity of the calling service, used as the resolution source.
    pub fn consumer_id(&self) -> &str {
        &self.operation.consumer_id
    }

    /// Caller IP address label, if the frontend supplied one.
    pub fn caller_ip(&self) -> Option<&str> {
        self.operation.labels.get(CALLER_IP).map(String::as_str)
    }
}

/// Result of a check. An empty `check_errors` list means the operation may proceed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CheckResponse {
    pub operation_id: String,
    pub check_errors: Vec<CheckError>,
}

/// A single policy denial.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckError {
    pub code: CheckErrorCode,
    #[serde(default)]
    pub detail: String,
}

impl CheckError {
    pub fn new(code: CheckErrorCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }

    /// Generic denial carrying the message of a checker that failed outright.
    pub fn permission_denied(detail: impl Into<String>) -> Self {
        Self::new(CheckErrorCode::PermissionDenied, detail)
    }
}

/// Denial reasons understood by API frontends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckErrorCode {
    NotFound,
    PermissionDenied,
    ResourceExhausted,
    BudgetExceeded,
    ServiceNotActivated,
    ClientAppBlocked,
    IpAddressBlocked,
    RefererBlocked,
    ApiKeyInvalid,
}

impl CheckErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckErrorCode::NotFound => "NOT_FOUND",
            CheckErrorCode::PermissionDenied => "PERMISSION_DENIED",
            CheckErrorCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            CheckErrorCode::BudgetExceeded => "BUDGET_EXCEEDED",
            CheckErrorCode::ServiceNotActivated => "SERVICE_NOT_ACTIVATED",
            CheckErrorCode::ClientAppBlocked => "CLIENT_APP_BLOCKED",
            CheckErrorCode::IpAddressBlocked => "IP_ADDRESS_BLOCKED",
            CheckErrorCode::RefererBlocked => "REFERER_BLOCKED",
            CheckErrorCode::ApiKeyInvalid => "API_KEY_INVALID",
        }
    }
}

/// Usage report for one or more completed operations.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReportRequest {
    pub service_name: String,
    pub operations: Vec<Operation>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReportResponse {}

/// One API operation as seen by the frontend.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Operation {
    pub operation_id: String,
    pub operation_name: String,
    pub consumer_id: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub metric_value_sets: Vec<MetricValueSet>,
    pub log_entries: Vec<LogEntry>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MetricValueSet {
    pub metric_name: String,
    pub metric_values: Vec<MetricValue>,
}

/// A single metric sample. Exactly one of the value fields is expected to be set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MetricValue {
    pub labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub int64_value: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub double_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bool_value: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution_value: Option<Distribution>,
}

impl MetricValue {
    pub fn int64(value: i64) -> Self {
        Self {
            int64_value: Some(value),
            ..Self::default()
        }
    }

    pub fn distribution(value: Distribution) -> Self {
        Self {
            distribution_value: Some(value),
            ..Self::default()
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Histogram-style distribution of observed values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Distribution {
    pub count: i64,
    pub mean: f64,
    pub minimum: f64,
    pub maximum: f64,
    pub bucket_counts: Vec<i64>,
    pub exponential_buckets: Option<ExponentialBuckets>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExponentialBuckets {
    pub num_finite_buckets: i32,
    pub growth_factor: f64,
    pub scale: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LogEntry {
    pub name: String,
    pub severity: String,
    pub text_payload: Option<String>,
    pub struct_payload: Option<serde_json::Map<String, serde_json::Value>>,
}
