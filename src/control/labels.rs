//! Well-known label keys, metric names and distribution shapes.
//!
//! Report consumers agree on these names so that a frontend reporting
//! `request_count` gets the same series in every backend.

use crate::control::types::Distribution;

pub const CALLER_IP: &str = "servicecontrol.googleapis.com/caller_ip";

pub const PRODUCER_REQUEST_COUNT: &str = "serviceruntime.googleapis.com/api/producer/request_count";
pub const PRODUCER_REQUEST_SIZES: &str = "serviceruntime.googleapis.com/api/producer/request_sizes";
pub const PRODUCER_TOTAL_LATENCIES: &str =
    "serviceruntime.googleapis.com/api/producer/total_latencies";
pub const PRODUCER_BACKEND_LATENCIES: &str =
    "serviceruntime.googleapis.com/api/producer/backend_latencies";
pub const PRODUCER_REQUEST_COUNT_BY_CONSUMER: &str =
    "serviceruntime.googleapis.com/api/producer/by_consumer/request_count";

pub const CLOUD_PROJECT: &str = "cloud.googleapis.com/project";
pub const CLOUD_LOCATION: &str = "cloud.googleapis.com/location";
pub const CLOUD_SERVICE: &str = "cloud.googleapis.com/service";
pub const CLOUD_UID: &str = "cloud.googleapis.com/uid";
pub const API_VERSION: &str = "serviceruntime.googleapis.com/api_version";
pub const API_METHOD: &str = "serviceruntime.googleapis.com/api_method";
pub const CONSUMER_PROJECT: &str = "serviceruntime.googleapis.com/consumer_project";
pub const PROTOCOL: &str = "/protocol";
pub const RESPONSE_CODE: &str = "/response_code";
pub const RESPONSE_CODE_CLASS: &str = "/response_code_class";
pub const STATUS_CODE: &str = "/status_code";
pub const CONSUMER_ID: &str = "/consumer_id";
pub const CREDENTIAL_ID: &str = "/credential_id";

/// Labels attached to every monitored API resource.
pub const MONITORED_RESOURCE_LABELS: [&str; 7] = [
    CLOUD_LOCATION,
    CLOUD_UID,
    API_VERSION,
    API_METHOD,
    CONSUMER_PROJECT,
    CLOUD_PROJECT,
    CLOUD_SERVICE,
];

/// Extra labels carried by specific metrics.
pub fn per_metric_labels(metric: &str) -> &'static [&'static str] {
    match metric {
        PRODUCER_REQUEST_COUNT => &[PROTOCOL, RESPONSE_CODE, RESPONSE_CODE_CLASS, STATUS_CODE],
        PRODUCER_REQUEST_COUNT_BY_CONSUMER => &[
            PROTOCOL,
            RESPONSE_CODE,
            RESPONSE_CODE_CLASS,
            CREDENTIAL_ID,
            STATUS_CODE,
        ],
        _ => &[],
    }
}

/// Exponential bucket layout agreed between frontends and exporters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialDistribution {
    pub num_buckets: i32,
    pub start_value: f64,
    pub growth_factor: f64,
}

pub const SIZE_DISTRIBUTION: ExponentialDistribution = ExponentialDistribution {
    num_buckets: 8,
    start_value: 1.0,
    growth_factor: 10.0,
};

pub const TIME_DISTRIBUTION: ExponentialDistribution = ExponentialDistribution {
    num_buckets: 8,
    start_value: 1e-6,
    growth_factor: 10.0,
};

impl ExponentialDistribution {
    /// Upper bounds of the finite buckets.
    pub fn bounds(&self) -> Vec<f64> {
        (0..self.num_buckets)
            .map(|i| self.start_value * self.growth_factor.powi(i))
            .collect()
    }

    fn matches(&self, dist: &Distribution) -> bool {
        match &dist.exponential_buckets {
            Some(b) => {
                b.num_finite_buckets == self.num_buckets
                    && b.growth_factor == self.growth_factor
                    && b.scale == self.start_value
            }
            None => false,
        }
    }

    /// Reconstructs individual observations from bucket counts, using the
    /// midpoint of each bucket. Returns `None` when the distribution was not
    /// produced with this bucket layout.
    pub fn samples(&self, dist: &Distribution) -> Option<Vec<f64>> {
        if !self.matches(dist) {
            return None;
        }
        let bounds = self.bounds();
        let mut samples = Vec::new();
        let mut current = if dist.minimum == 0.0 {
            bounds[0]
        } else {
            dist.minimum
        };
        for (i, count) in dist.bucket_counts.iter().enumerate() {
            if i > 0 && i < bounds.len() {
                current = bounds[i - 1] + (bounds[i] - bounds[i - 1]) / 2.0;
            }
            if i >= bounds.len() {
                current = if dist.maximum == 0.0 {
                    bounds[bounds.len() - 1] * self.growth_factor / 2.0
                } else {
                    dist.maximum
                };
            }
            for _ in 0..*count {
                samples.push(current);
            }
        }
        Some(samples)
    }
}

/// Distribution layout expected for a given metric name, if any.
pub fn distribution_for(metric: &str) -> Option<&'static ExponentialDistribution> {
    match metric {
        PRODUCER_TOTAL_LATENCIES | PRODUCER_BACKEND_LATENCIES => Some(&TIME_DISTRIBUTION),
        PRODUCER_REQUEST_SIZES => Some(&SIZE_DISTRIBUTION),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::types::ExponentialBuckets;

    fn size_distribution(bucket_counts: Vec<i64>) -> Distribution {
        Distribution {
            count: bucket_counts.iter().sum(),
            bucket_counts,
            exponential_buckets: Some(ExponentialBuckets {
                num_finite_buckets: 8,
                growth_factor: 10.0,
                scale: 1.0,
            }),
            ..Distribution::default()
        }
    }

    #[test]
    fn test_samples_use_bucket_midpoints() {
        let samples = SIZE_DISTRIBUTION
            .samples(&size_distribution(vec![1, 2, 0]))
            .unwrap();
        assert_eq!(samples, vec![1.0, 5.5, 5.5]);
    }

    #[test]
    fn test_samples_reject_mismatched_layout() {
        let mut dist = size_distribution(vec![1]);
        dist.exponential_buckets = None;
        assert!(SIZE_DISTRIBUTION.samples(&dist).is_none());
        assert!(TIME_DISTRIBUTION.samples(&size_distribution(vec![1])).is_none());
    }

    #[test]
    fn test_overflow_bucket_uses_maximum() {
        let mut counts = vec![0; 9];
        counts[8] = 1;
        let mut dist = size_distribution(counts);
        dist.maximum = 4e8;
        assert_eq!(SIZE_DISTRIBUTION.samples(&dist).unwrap(), vec![4e8]);
    }
}
