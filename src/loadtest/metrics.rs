//! Request metrics and pass/fail thresholds for a load run.

use serde::Serialize;
use std::time::Duration;

/// One finished request.
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub latency: Duration,
    pub success: bool,
}

/// Thresholds a run must stay under.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub p95_ms: f64,
    pub max_failure_rate: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            p95_ms: 1000.0,
            max_failure_rate: 0.05,
        }
    }
}

/// Collected samples.
#[derive(Debug, Default)]
pub struct Metrics {
    latencies_ms: Vec<u64>,
    failures: usize,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, sample: Sample) {
        self.latencies_ms.push(sample.latency.as_millis() as u64);
        if !sample.success {
            self.failures += 1;
        }
    }

    pub fn requests(&self) -> usize {
        self.latencies_ms.len()
    }

    pub fn summarize(&self) -> Summary {
        let mut sorted = self.latencies_ms.clone();
        sorted.sort_unstable();
        let len = sorted.len();

        let percentile = |p: usize| -> f64 {
            if len == 0 {
                return 0.0;
            }
            sorted[(len * p / 100).min(len - 1)] as f64
        };
        let avg = if len == 0 {
            0.0
        } else {
            sorted.iter().sum::<u64>() as f64 / len as f64
        };

        Summary {
            requests: len,
            failures: self.failures,
            failure_rate: if len == 0 {
                0.0
            } else {
                self.failures as f64 / len as f64
            },
            avg_latency_ms: avg,
            p50_latency_ms: percentile(50),
            p95_latency_ms: percentile(95),
            p99_latency_ms: percentile(99),
            max_latency_ms: sorted.last().copied().unwrap_or(0) as f64,
        }
    }
}

/// Result of a load run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub requests: usize,
    pub failures: usize,
    /// 0.0-1.0
    pub failure_rate: f64,
    pub avg_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub max_latency_ms: f64,
}

impl Summary {
    /// Descriptions of every breached threshold.
    pub fn breaches(&self, thresholds: &Thresholds) -> Vec<String> {
        let mut breaches = Vec::new();
        if self.p95_latency_ms >= thresholds.p95_ms {
            breaches.push(format!(
                "p95 latency {:.0}ms >= {:.0}ms",
                self.p95_latency_ms, thresholds.p95_ms
            ));
        }
        if self.failure_rate >= thresholds.max_failure_rate {
            breaches.push(format!(
                "failure rate {:.2}% >= {:.2}%",
                self.failure_rate * 100.0,
                thresholds.max_failure_rate * 100.0
            ));
        }
        breaches
    }

    pub fn passed(&self, thresholds: &Thresholds) -> bool {
        self.breaches(thresholds).is_empty()
    }
}
