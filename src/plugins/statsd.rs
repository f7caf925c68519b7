//! `statsd` report consumer: pushes counters and timings over UDP.
//!
//! Metric names are `<prefix>.<api version>.<location>.<method>.<metric>.<labels>`
//! with empty pieces dropped and the well-known domains shortened
//! (`serviceruntime.googleapis.com/api/producer/request_count` becomes
//! `service.api.producer.request_count`).

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::adapter::{ConsumerBuilder, ConsumerError, ReportConsumer};
use crate::config::GatewayConfig;
use crate::control::labels::{self, API_METHOD, API_VERSION, CLOUD_LOCATION, CLOUD_SERVICE, CONSUMER_ID};
use crate::control::{MetricValueSet, ReportRequest};

pub const NAME: &str = "statsd";

/// Datagrams waiting for the sender task.
const SEND_QUEUE_CAPACITY: usize = 4096;

/// Formats lines on the report worker and hands them to a sender task that
/// owns the socket. The task exits once the consumer is dropped.
pub struct StatsdConsumer {
    lines: mpsc::Sender<String>,
    prefix: String,
}

impl StatsdConsumer {
    /// Binds an ephemeral local socket, connects it to `address` and spawns
    /// the sender task on the current runtime.
    pub fn connect(address: &str, prefix: &str) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

        let socket = std::net::UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(address)?;
        socket.set_nonblocking(true)?;
        let socket = {
            let _guard = runtime.enter();
            UdpSocket::from_std(socket)?
        };

        let (tx, rx) = mpsc::channel(SEND_QUEUE_CAPACITY);
        runtime.spawn(send_loop(socket, rx));
        Ok(Self {
            lines: tx,
            prefix: prefix.trim_matches('.').to_string(),
        })
    }

    fn send(&self, line: &str) -> Result<(), ConsumerError> {
        let payload = if self.prefix.is_empty() {
            line.to_string()
        } else {
            format!("{}.{line}", self.prefix)
        };
        self.lines
            .try_send(payload)
            .map_err(|e| ConsumerError::Consume(format!("statsd queue: {e}")))
    }
}

async fn send_loop(socket: UdpSocket, mut lines: mpsc::Receiver<String>) {
    while let Some(line) = lines.recv().await {
        if let Err(e) = socket.send(line.as_bytes()).await {
            tracing::error!(error = %e, "Could not write statsd metric");
        }
    }
    tracing::debug!("Statsd sender stopped");
}

impl ReportConsumer for StatsdConsumer {
    fn name(&self) -> &str {
        NAME
    }

    fn consume(&self, reports: &[Arc<ReportRequest>]) -> Result<(), ConsumerError> {
        let mut first_error = None;
        for report in reports {
            for line in report_lines(report) {
                if let Err(e) = self.send(&line) {
                    tracing::warn!(error = %e, "Dropped statsd metric");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// All statsd lines for one report, without the configured prefix.
pub fn report_lines(report: &ReportRequest) -> Vec<String> {
    let mut lines = Vec::new();
    for operation in &report.operations {
        let mut defaults = operation.labels.clone();
        defaults.insert(CLOUD_SERVICE.to_string(), report.service_name.clone());
        defaults.insert(CONSUMER_ID.to_string(), operation.consumer_id.clone());

        let prefix = resource_prefix(&defaults);
        for set in &operation.metric_value_sets {
            metric_set_lines(set, &prefix, &mut lines);
        }
    }
    lines
}

fn metric_set_lines(set: &MetricValueSet, prefix: &str, lines: &mut Vec<String>) {
    for value in &set.metric_values {
        if let Some(count) = value.int64_value {
            let suffix = metric_suffix(&set.metric_name, &value.labels);
            let name = metric_name(prefix, &set.metric_name, &suffix);
            lines.push(format!("{name}:{count}|c"));
        } else if let Some(dist) = &value.distribution_value {
            let name = metric_name(prefix, &set.metric_name, "");
            let Some(layout) = labels::distribution_for(&set.metric_name) else {
                tracing::warn!(metric = %set.metric_name, "Unknown metric for distribution");
                continue;
            };
            let Some(samples) = layout.samples(dist) else {
                tracing::warn!(metric = %set.metric_name, "Distribution buckets do not match");
                continue;
            };
            // statsd timings are whole milliseconds
            for sample in samples {
                lines.push(format!("{name}:{}|ms", (sample * 1000.0) as i64));
            }
        }
    }
}

fn resource_prefix(labels: &BTreeMap<String, String>) -> String {
    join_pieces(
        [API_VERSION, CLOUD_LOCATION, API_METHOD]
            .iter()
            .filter_map(|k| labels.get(*k).map(String::as_str)),
    )
}

fn metric_suffix(metric: &str, labels: &BTreeMap<String, String>) -> String {
    join_pieces(
        labels::per_metric_labels(metric)
            .iter()
            .filter_map(|k| labels.get(*k).map(String::as_str)),
    )
}

fn metric_name(prefix: &str, name: &str, suffix: &str) -> String {
    let name = name
        .replace("serviceruntime.googleapis.com", "service")
        .replace("cloud.googleapis.com", "cloud")
        .replace('/', ".");
    join_pieces([prefix, name.as_str(), suffix].into_iter())
}

fn join_pieces<'a>(pieces: impl Iterator<Item = &'a str>) -> String {
    pieces
        .collect::<Vec<_>>()
        .join(".")
        .trim_matches('.')
        .to_string()
}

pub struct StatsdBuilder;

impl ConsumerBuilder for StatsdBuilder {
    fn build_consumer(&self, config: &GatewayConfig) -> Result<Arc<dyn ReportConsumer>, ConsumerError> {
        let consumer = StatsdConsumer::connect(&config.statsd.address, &config.statsd.prefix)
            .map_err(|e| ConsumerError::Build(format!("statsd {}: {e}", config.statsd.address)))?;
        tracing::info!(address = %config.statsd.address, "Statsd consumer connected");
        Ok(Arc::new(consumer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::control::labels::{PRODUCER_REQUEST_COUNT, PRODUCER_TOTAL_LATENCIES, RESPONSE_CODE, TIME_DISTRIBUTION};
    use crate::control::{Distribution, ExponentialBuckets, MetricValue, Operation};

    fn sample_report() -> ReportRequest {
        let mut labels = BTreeMap::new();
        labels.insert(API_VERSION.to_string(), "v1".to_string());
        labels.insert(API_METHOD.to_string(), "ListShelves".to_string());

        let latency = Distribution {
            count: 2,
            minimum: 0.002,
            maximum: 0.02,
            bucket_counts: vec![0, 0, 0, 0, 2, 0, 0, 0, 0],
            exponential_buckets: Some(ExponentialBuckets {
                num_finite_buckets: TIME_DISTRIBUTION.num_buckets,
                growth_factor: TIME_DISTRIBUTION.growth_factor,
                scale: TIME_DISTRIBUTION.start_value,
            }),
            ..Distribution::default()
        };

        ReportRequest {
            service_name: "svc1".into(),
            operations: vec![Operation {
                consumer_id: "project:c1".into(),
                labels,
                metric_value_sets: vec![
                    MetricValueSet {
                        metric_name: PRODUCER_REQUEST_COUNT.into(),
                        metric_values: vec![MetricValue::int64(1).with_label(RESPONSE_CODE, "200")],
                    },
                    MetricValueSet {
                        metric_name: PRODUCER_TOTAL_LATENCIES.into(),
                        metric_values: vec![MetricValue::distribution(latency)],
                    },
                ],
                ..Operation::default()
            }],
        }
    }

    #[test]
    fn test_report_lines() {
        let lines = report_lines(&sample_report());
        assert_eq!(
            lines,
            vec![
                "v1.ListShelves.service.api.producer.request_count.200:1|c",
                // two samples at the bucket 4 midpoint, 5.5ms
                "v1.ListShelves.service.api.producer.total_latencies:5|ms",
                "v1.ListShelves.service.api.producer.total_latencies:5|ms",
            ]
        );
    }

    #[test]
    fn test_mismatched_buckets_are_skipped() {
        let mut report = sample_report();
        let dist = report.operations[0].metric_value_sets[1].metric_values[0]
            .distribution_value
            .as_mut()
            .unwrap();
        dist.exponential_buckets = None;
        assert_eq!(report_lines(&report).len(), 1);
    }

    #[tokio::test]
    async fn test_consume_sends_prefixed_datagrams() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = receiver.local_addr().unwrap().to_string();

        let consumer = StatsdConsumer::connect(&addr, "mixgate").unwrap();
        consumer.consume(&[Arc::new(sample_report())]).unwrap();

        let mut buf = [0u8; 512];
        let n = tokio::time::timeout(Duration::from_secs(2), receiver.recv(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            std::str::from_utf8(&buf[..n]).unwrap(),
            "mixgate.v1.ListShelves.service.api.producer.request_count.200:1|c"
        );
    }

    #[test]
    fn test_connect_outside_runtime_fails() {
        assert!(StatsdConsumer::connect("127.0.0.1:8125", "").is_err());
    }
}
