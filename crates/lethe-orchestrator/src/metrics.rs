//! Operational counters and timers, emitted through the `metrics` facade.
//! Recording through the facade cannot fail, so metric emission can never
//! affect an erasure outcome; without an installed recorder the calls are
//! no-ops.

use metrics::{counter, histogram};

pub(crate) struct ErasureMetrics {
    environment: String,
}

impl ErasureMetrics {
    pub(crate) fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
        }
    }

    pub(crate) fn request_processed(&self) {
        counter!("erasure_requests_processed", "environment" => self.environment.clone())
            .increment(1);
    }

    pub(crate) fn partitions_rewritten(&self, count: u64) {
        counter!("erasure_partitions_rewritten", "environment" => self.environment.clone())
            .increment(count);
    }

    pub(crate) fn duration_seconds(&self, seconds: f64) {
        histogram!("erasure_duration_seconds", "environment" => self.environment.clone())
            .record(seconds);
    }

    pub(crate) fn failure(&self) {
        counter!("erasure_failures", "environment" => self.environment.clone()).increment(1);
    }
}
