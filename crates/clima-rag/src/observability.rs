//! Counters for degraded-but-successful paths.
//!
//! Recoverable failures never change what the user sees, so they are only
//! visible here and in `tracing` output.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PipelineMetrics {
    requests: AtomicU64,
    embeddings: AtomicU64,
    brand_stage_failures: AtomicU64,
    metadata_stage_failures: AtomicU64,
    model_extraction_failures: AtomicU64,
    pricing_fallbacks: AtomicU64,
    slot_store_failures: AtomicU64,
    threshold_fallbacks: AtomicU64,
    capacity_fallbacks: AtomicU64,
    empty_results: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub embeddings: u64,
    pub brand_stage_failures: u64,
    pub metadata_stage_failures: u64,
    pub model_extraction_failures: u64,
    pub pricing_fallbacks: u64,
    pub slot_store_failures: u64,
    pub threshold_fallbacks: u64,
    pub capacity_fallbacks: u64,
    pub empty_results: u64,
}

macro_rules! counter {
    ($($name:ident => $field:ident),* $(,)?) => {
        impl PipelineMetrics {
            $(
                pub fn $name(&self) {
                    self.$field.fetch_add(1, Ordering::Relaxed);
                }
            )*
        }
    };
}

counter! {
    record_request => requests,
    record_embedding => embeddings,
    record_brand_stage_failure => brand_stage_failures,
    record_metadata_stage_failure => metadata_stage_failures,
    record_model_extraction_failure => model_extraction_failures,
    record_pricing_fallback => pricing_fallbacks,
    record_slot_store_failure => slot_store_failures,
    record_threshold_fallback => threshold_fallbacks,
    record_capacity_fallback => capacity_fallbacks,
    record_empty_result => empty_results,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            embeddings: self.embeddings.load(Ordering::Relaxed),
            brand_stage_failures: self.brand_stage_failures.load(Ordering::Relaxed),
            metadata_stage_failures: self.metadata_stage_failures.load(Ordering::Relaxed),
            model_extraction_failures: self.model_extraction_failures.load(Ordering::Relaxed),
            pricing_fallbacks: self.pricing_fallbacks.load(Ordering::Relaxed),
            slot_store_failures: self.slot_store_failures.load(Ordering::Relaxed),
            threshold_fallbacks: self.threshold_fallbacks.load(Ordering::Relaxed),
            capacity_fallbacks: self.capacity_fallbacks.load(Ordering::Relaxed),
            empty_results: self.empty_results.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = PipelineMetrics::new();
        metrics.record_request();
        metrics.record_request();
        metrics.record_pricing_fallback();

        let snap = metrics.snapshot();
        assert_eq!(snap.requests, 2);
        assert_eq!(snap.pricing_fallbacks, 1);
        assert_eq!(snap.brand_stage_failures, 0);
    }
}
