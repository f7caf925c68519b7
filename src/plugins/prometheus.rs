//! `prometheus` report consumer: turns reports into scrapeable series.
//!
//! # Responsibilities
//! - Request counts become counters, latency and size distributions become
//!   histograms with the well-known exponential buckets
//! - Latency and size fields of structured log entries become summaries
//! - Serve the exposition text at `GET /metrics`
//!
//! # Design Decisions
//! - The consumer owns its recorder; nothing is installed globally, so the
//!   gateway's own metrics never end up on this endpoint
//! - Label names are the well-known label keys made Prometheus-safe
//!   (`cloud.googleapis.com/location` → `cloud_googleapis_com_location`);
//!   absent labels are rendered as `unknown` to keep cardinality fixed

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::routing::get;
use metrics::{counter, describe_counter, describe_histogram, histogram, Label};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

use crate::adapter::{ConsumerBuilder, ConsumerError, PrefixAndHandler, ReportConsumer};
use crate::config::GatewayConfig;
use crate::control::labels::{
    self, CLOUD_SERVICE, CONSUMER_ID, MONITORED_RESOURCE_LABELS, PRODUCER_BACKEND_LATENCIES,
    PRODUCER_REQUEST_COUNT, PRODUCER_REQUEST_COUNT_BY_CONSUMER, PRODUCER_REQUEST_SIZES,
    PRODUCER_TOTAL_LATENCIES, SIZE_DISTRIBUTION, TIME_DISTRIBUTION,
};
use crate::control::{LogEntry, MetricValue, MetricValueSet, ReportRequest};

pub const NAME: &str = "prometheus";
pub const METRICS_PREFIX: &str = "/metrics";

const MISSING_LABEL_VALUE: &str = "unknown";

/// Log entry payload field → summary name.
const LOG_SUMMARIES: [(&str, &str); 3] = [
    ("request_latency_in_ms", "http_request_duration_microseconds"),
    ("request_size", "http_request_size_bytes"),
    ("response_size", "http_response_size_bytes"),
];

/// `cloud.googleapis.com/location` → `cloud_googleapis_com_location`.
pub fn prometheus_safe_name(name: &str) -> String {
    name.trim_start_matches('/').replace(['/', '.'], "_")
}

pub struct PrometheusConsumer {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
}

impl PrometheusConsumer {
    pub fn new() -> Result<Self, ConsumerError> {
        let mut builder = PrometheusBuilder::new();
        for (metric, layout) in [
            (PRODUCER_TOTAL_LATENCIES, TIME_DISTRIBUTION),
            (PRODUCER_BACKEND_LATENCIES, TIME_DISTRIBUTION),
            (PRODUCER_REQUEST_SIZES, SIZE_DISTRIBUTION),
        ] {
            builder = builder
                .set_buckets_for_metric(Matcher::Full(prometheus_safe_name(metric)), &layout.bounds())
                .map_err(|e| ConsumerError::Build(format!("prometheus buckets: {e}")))?;
        }
        let recorder = builder.build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            describe_counter!(prometheus_safe_name(PRODUCER_REQUEST_COUNT), "Request Count");
            describe_counter!(
                prometheus_safe_name(PRODUCER_REQUEST_COUNT_BY_CONSUMER),
                "Request Count By Consumer"
            );
            describe_histogram!(prometheus_safe_name(PRODUCER_TOTAL_LATENCIES), "Total Latency");
            describe_histogram!(prometheus_safe_name(PRODUCER_BACKEND_LATENCIES), "Backend Latency");
            describe_histogram!(prometheus_safe_name(PRODUCER_REQUEST_SIZES), "Request Size");
        });

        Ok(Self { recorder, handle })
    }

    /// Current exposition text.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    fn process_set(&self, set: &MetricValueSet, defaults: &BTreeMap<String, String>) {
        let name = prometheus_safe_name(&set.metric_name);
        for value in &set.metric_values {
            let merged = merged_labels(defaults, value);
            match set.metric_name.as_str() {
                PRODUCER_REQUEST_COUNT | PRODUCER_REQUEST_COUNT_BY_CONSUMER => {
                    let mut series = resource_labels(&merged);
                    for key in labels::per_metric_labels(&set.metric_name) {
                        let key = prometheus_safe_name(key);
                        let value = merged.get(&key).cloned().unwrap_or_else(|| MISSING_LABEL_VALUE.into());
                        series.push(Label::new(key, value));
                    }
                    let count = value.int64_value.unwrap_or_default().max(0) as u64;
                    counter!(name.clone(), series).increment(count);
                }
                PRODUCER_TOTAL_LATENCIES | PRODUCER_BACKEND_LATENCIES | PRODUCER_REQUEST_SIZES => {
                    let Some(dist) = &value.distribution_value else {
                        continue;
                    };
                    let Some(layout) = labels::distribution_for(&set.metric_name) else {
                        continue;
                    };
                    let Some(samples) = layout.samples(dist) else {
                        tracing::warn!(metric = %set.metric_name, "Distribution buckets do not match");
                        continue;
                    };
                    let hist = histogram!(name.clone(), resource_labels(&merged));
                    for sample in samples {
                        hist.record(sample);
                    }
                }
                _ => {}
            }
        }
    }

    fn process_log_entry(&self, entry: &LogEntry) {
        let Some(fields) = &entry.struct_payload else {
            return;
        };
        let field_str = |k: &str| {
            fields
                .get(k)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        let series = vec![
            Label::new("api_method", field_str("api_method")),
            Label::new("service", field_str("api_name")),
        ];
        for (field, summary) in LOG_SUMMARIES {
            if let Some(v) = fields.get(field).and_then(|v| v.as_f64()) {
                histogram!(summary, series.clone()).record(v);
            }
        }
    }
}

/// Operation labels overlaid with the metric value's own labels, keys made safe.
fn merged_labels(defaults: &BTreeMap<String, String>, value: &MetricValue) -> BTreeMap<String, String> {
    let mut merged = BTreeMap::new();
    for key in MONITORED_RESOURCE_LABELS {
        merged.insert(prometheus_safe_name(key), MISSING_LABEL_VALUE.to_string());
    }
    for (k, v) in defaults.iter().chain(value.labels.iter()) {
        merged.insert(prometheus_safe_name(k), v.clone());
    }
    merged
}

fn resource_labels(merged: &BTreeMap<String, String>) -> Vec<Label> {
    MONITORED_RESOURCE_LABELS
        .iter()
        .map(|key| {
            let key = prometheus_safe_name(key);
            let value = merged.get(&key).cloned().unwrap_or_else(|| MISSING_LABEL_VALUE.into());
            Label::new(key, value)
        })
        .collect()
}

impl ReportConsumer for PrometheusConsumer {
    fn name(&self) -> &str {
        NAME
    }

    fn consume(&self, reports: &[Arc<ReportRequest>]) -> Result<(), ConsumerError> {
        metrics::with_local_recorder(&self.recorder, || {
            for report in reports {
                for operation in &report.operations {
                    let mut defaults = operation.labels.clone();
                    defaults.insert(CLOUD_SERVICE.to_string(), report.service_name.clone());
                    defaults.insert(CONSUMER_ID.to_string(), operation.consumer_id.clone());

                    for set in &operation.metric_value_sets {
                        self.process_set(set, &defaults);
                    }
                    for entry in &operation.log_entries {
                        self.process_log_entry(entry);
                    }
                    tracing::debug!(entries = operation.log_entries.len(), "Processed log entries");
                }
            }
        });
        Ok(())
    }

    fn prefix_and_handler(&self) -> Option<PrefixAndHandler> {
        let handle = self.handle.clone();
        Some(PrefixAndHandler {
            prefix: METRICS_PREFIX.to_string(),
            handler: get(move || {
                let handle = handle.clone();
                async move { handle.render() }
            }),
        })
    }
}

pub struct PrometheusConsumerBuilder;

impl ConsumerBuilder for PrometheusConsumerBuilder {
    fn build_consumer(&self, _config: &GatewayConfig) -> Result<Arc<dyn ReportConsumer>, ConsumerError> {
        Ok(Arc::new(PrometheusConsumer::new()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::labels::{API_METHOD, CLOUD_LOCATION, RESPONSE_CODE};
    use crate::control::{Distribution, ExponentialBuckets, Operation};

    fn report() -> ReportRequest {
        let mut labels = BTreeMap::new();
        labels.insert(CLOUD_LOCATION.to_string(), "us-central1".to_string());
        labels.insert(API_METHOD.to_string(), "ListShelves".to_string());

        let mut payload = serde_json::Map::new();
        payload.insert("api_method".into(), "ListShelves".into());
        payload.insert("api_name".into(), "bookstore".into());
        payload.insert("request_latency_in_ms".into(), 12.5.into());

        ReportRequest {
            service_name: "svc1".into(),
            operations: vec![Operation {
                consumer_id: "project:c1".into(),
                labels,
                metric_value_sets: vec![
                    MetricValueSet {
                        metric_name: PRODUCER_REQUEST_COUNT.into(),
                        metric_values: vec![MetricValue::int64(5).with_label(RESPONSE_CODE, "200")],
                    },
                    MetricValueSet {
                        metric_name: PRODUCER_REQUEST_SIZES.into(),
                        metric_values: vec![MetricValue::distribution(Distribution {
                            count: 3,
                            bucket_counts: vec![0, 3],
                            exponential_buckets: Some(ExponentialBuckets {
                                num_finite_buckets: 8,
                                growth_factor: 10.0,
                                scale: 1.0,
                            }),
                            ..Distribution::default()
                        })],
                    },
                ],
                log_entries: vec![LogEntry {
                    name: "endpoints_log".into(),
                    struct_payload: Some(payload),
                    ..LogEntry::default()
                }],
                ..Operation::default()
            }],
        }
    }

    #[test]
    fn test_safe_names() {
        assert_eq!(prometheus_safe_name("/response_code"), "response_code");
        assert_eq!(
            prometheus_safe_name(CLOUD_LOCATION),
            "cloud_googleapis_com_location"
        );
    }

    #[test]
    fn test_consume_renders_counters_histograms_and_summaries() {
        let consumer = PrometheusConsumer::new().unwrap();
        consumer.consume(&[Arc::new(report())]).unwrap();
        let text = consumer.render();

        let count = prometheus_safe_name(PRODUCER_REQUEST_COUNT);
        let count_line = text
            .lines()
            .find(|l| l.starts_with(&format!("{count}{{")))
            .expect("request count series");
        assert!(count_line.contains("cloud_googleapis_com_service=\"svc1\""));
        assert!(count_line.contains("response_code=\"200\""));
        assert!(count_line.contains("protocol=\"unknown\""));
        assert!(count_line.ends_with(" 5"));

        let sizes = prometheus_safe_name(PRODUCER_REQUEST_SIZES);
        assert!(text.contains(&format!("{sizes}_bucket")));
        assert!(text.contains(&format!("{sizes}_count")));

        assert!(text.contains("http_request_duration_microseconds"));
    }

    #[test]
    fn test_exposes_metrics_endpoint() {
        let consumer = PrometheusConsumer::new().unwrap();
        let ph = consumer.prefix_and_handler().unwrap();
        assert_eq!(ph.prefix, "/metrics");
    }

    #[test]
    fn test_consumers_do_not_share_series() {
        let a = PrometheusConsumer::new().unwrap();
        let b = PrometheusConsumer::new().unwrap();
        a.consume(&[Arc::new(report())]).unwrap();
        let count = prometheus_safe_name(PRODUCER_REQUEST_COUNT);
        assert!(!b.render().lines().any(|l| l.starts_with(&format!("{count}{{"))));
    }
}
