//! Metrics collection and statistics.

use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Collects metrics during load test execution.
pub struct MetricsCollector {
    histogram: Histogram<u64>,
    requests_total: u64,
    requests_success: u64,
    requests_failed: u64,
    cache_hits: u64,
    cache_misses: u64,
    bytes_total: u64,
    first_request_time: Option<Instant>,
    last_request_time: Option<Instant>,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self {
            histogram: Histogram::new(3).expect("Failed to create histogram"),
            requests_total: 0,
            requests_success: 0,
            requests_failed: 0,
            cache_hits: 0,
            cache_misses: 0,
            bytes_total: 0,
            first_request_time: None,
            last_request_time: None,
        }
    }

    /// Record a successful request.
    pub fn record_success(&mut self, latency_us: u64, bytes: usize, cache_hit: bool) {
        self.requests_total += 1;
        self.requests_success += 1;
        self.bytes_total += bytes as u64;
        self.histogram.record(latency_us).ok();

        if cache_hit {
            self.cache_hits += 1;
        } else {
            self.cache_misses += 1;
        }

        let now = Instant::now();
        if self.first_request_time.is_none() {
            self.first_request_time = Some(now);
        }
        self.last_request_time = Some(now);
    }

    /// Record a failed request.
    pub fn record_failure(&mut self) {
        self.requests_total += 1;
        self.requests_failed += 1;
    }

    /// Generate final test results.
    pub fn results(
        &self,
        scenario_name: String,
        layer: Option<String>,
        seed: u64,
        concurrency: u32,
    ) -> TestResults {
        let duration = self
            .last_request_time
            .and_then(|last| self.first_request_time.map(|first| last.duration_since(first)))
            .unwrap_or_default();

        let duration_secs = duration.as_secs_f64();
        let rps = if duration_secs > 0.0 {
            self.requests_total as f64 / duration_secs
        } else {
            0.0
        };

        let cache_total = self.cache_hits + self.cache_misses;
        let cache_hit_rate = if cache_total > 0 {
            (self.cache_hits as f64 / cache_total as f64) * 100.0
        } else {
            0.0
        };

        TestResults {
            timestamp: chrono::Utc::now().to_rfc3339(),
            scenario_name,
            layer,
            seed,
            concurrency,
            duration_secs,
            total_requests: self.requests_total,
            successful_requests: self.requests_success,
            failed_requests: self.requests_failed,
            requests_per_second: rps,
            latency_p50: self.histogram.value_at_percentile(50.0) as f64 / 1000.0,
            latency_p75: self.histogram.value_at_percentile(75.0) as f64 / 1000.0,
            latency_p90: self.histogram.value_at_percentile(90.0) as f64 / 1000.0,
            latency_p95: self.histogram.value_at_percentile(95.0) as f64 / 1000.0,
            latency_p99: self.histogram.value_at_percentile(99.0) as f64 / 1000.0,
            latency_min: self.histogram.min() as f64 / 1000.0,
            latency_max: self.histogram.max() as f64 / 1000.0,
            latency_avg: self.histogram.mean() / 1000.0,
            cache_hit_rate,
            bytes_per_second: if duration_secs > 0.0 {
                self.bytes_total as f64 / duration_secs
            } else {
                0.0
            },
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Final test results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResults {
    pub timestamp: String,
    pub scenario_name: String,
    pub layer: Option<String>,
    pub seed: u64,
    pub concurrency: u32,
    pub duration_secs: f64,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub requests_per_second: f64,

    // Latency percentiles (ms)
    pub latency_p50: f64,
    pub latency_p75: f64,
    pub latency_p90: f64,
    pub latency_p95: f64,
    pub latency_p99: f64,
    pub latency_min: f64,
    pub latency_max: f64,
    pub latency_avg: f64,

    /// Share of successful responses the service answered from cache.
    /// Random sampling exists to keep this low; a high value means the
    /// seed or sample space is too small for the test to be meaningful.
    pub cache_hit_rate: f64,

    pub bytes_per_second: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_hit_rate() {
        let mut collector = MetricsCollector::new();
        collector.record_success(1000, 100, true);
        collector.record_success(2000, 100, false);
        collector.record_success(3000, 100, false);
        collector.record_failure();

        let results = collector.results("t".to_string(), None, 1640, 1);
        assert_eq!(results.total_requests, 4);
        assert_eq!(results.successful_requests, 3);
        assert_eq!(results.failed_requests, 1);
        assert!((results.cache_hit_rate - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(results.seed, 1640);
    }

    #[test]
    fn test_empty_collector_produces_zeroes() {
        let collector = MetricsCollector::new();
        let results = collector.results("t".to_string(), None, 1, 1);
        assert_eq!(results.total_requests, 0);
        assert_eq!(results.requests_per_second, 0.0);
        assert_eq!(results.cache_hit_rate, 0.0);
    }
}
