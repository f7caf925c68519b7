//! Gateway self-metrics.
//!
//! # Responsibilities
//! - Define metrics about the gateway itself (not the telemetry it relays)
//! - Keep metric names and label sets in one place
//!
//! # Metrics
//! - `mixgate_check_requests_total` (counter)
//! - `mixgate_check_errors_total` (counter): denials by `code`
//! - `mixgate_check_duration_seconds` (histogram)
//! - `mixgate_reports_enqueued_total` (counter)
//! - `mixgate_reports_consumed_total` (counter): by `consumer`, `outcome`
//! - `mixgate_config_reloads_total` (counter): by `outcome`
//! - `mixgate_checker_builds_total` (counter): by `kind`, `outcome`
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; `init_metrics` installs the global
//!   Prometheus recorder and its scrape listener, otherwise every call is a no-op
//! - The `prometheus` report consumer keeps its own recorder, so relayed
//!   telemetry never mixes with these series
//! - Check latency buckets span 100µs to 1s

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};

use crate::control::CheckErrorCode;

const CHECK_DURATION: &str = "mixgate_check_duration_seconds";
const CHECK_DURATION_BUCKETS: &[f64] = &[0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0];

fn exporter() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(Matcher::Full(CHECK_DURATION.to_string()), CHECK_DURATION_BUCKETS)
}

/// Installs the global recorder and serves `GET /metrics` on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    exporter()?.with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_check(start: Instant, errors: &[CheckErrorCode]) {
    counter!("mixgate_check_requests_total").increment(1);
    histogram!(CHECK_DURATION).record(start.elapsed().as_secs_f64());
    for code in errors {
        counter!("mixgate_check_errors_total", "code" => code.as_str()).increment(1);
    }
}

pub fn record_report_enqueued() {
    counter!("mixgate_reports_enqueued_total").increment(1);
}

pub fn record_report_consumed(consumer: &str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    counter!(
        "mixgate_reports_consumed_total",
        "consumer" => consumer.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// `outcome` is one of `applied`, `unchanged`, `error`.
pub fn record_config_reload(outcome: &'static str) {
    counter!("mixgate_config_reloads_total", "outcome" => outcome).increment(1);
}

pub fn record_checker_build(kind: &str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    counter!(
        "mixgate_checker_builds_total",
        "kind" => kind.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}
