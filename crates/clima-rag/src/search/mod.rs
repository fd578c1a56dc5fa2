pub mod hybrid;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::types::CandidateProduct;

pub use hybrid::HybridRetriever;

/// Which retrieval pipeline variant runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    /// Exact attribute match first; semantic search only when it finds nothing.
    MetadataFirst,
    /// House-brand guaranteed stage plus brand-weighted semantic search.
    VectorOnly,
}

/// Stage that produced a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStage {
    Metadata,
    Semantic,
    /// Semantic search re-run without the similarity threshold.
    ThresholdRelaxed,
    /// Nothing matched.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResultSet {
    pub products: Vec<CandidateProduct>,
    pub stage: ResultStage,
    /// The capacity band was dropped after an empty in-band search.
    pub capacity_relaxed: bool,
    /// House-brand candidates skipped by the diversity cap, in rank order.
    /// They only surface when a shown house-brand product is out of stock.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reserve: Vec<CandidateProduct>,
}

impl RankedResultSet {
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }
}

/// Concatenate stage results in order, keeping the first occurrence of each
/// product id.
pub fn merge_unique<I>(stages: I) -> Vec<CandidateProduct>
where
    I: IntoIterator<Item = Vec<CandidateProduct>>,
{
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for stage in stages {
        for product in stage {
            if seen.insert(product.product_id.clone()) {
                merged.push(product);
            }
        }
    }
    merged
}

/// Walk `candidates` in order up to `max` entries. House-brand entries beyond
/// `house_cap` are skipped, which frees their slots for other brands; the
/// skipped ones are returned second.
pub fn select_final(
    candidates: Vec<CandidateProduct>,
    max: usize,
    is_house: impl Fn(&CandidateProduct) -> bool,
    house_cap: Option<usize>,
) -> (Vec<CandidateProduct>, Vec<CandidateProduct>) {
    let mut selected = Vec::with_capacity(max.min(candidates.len()));
    let mut reserve = Vec::new();
    let mut house_count = 0usize;

    for candidate in candidates {
        if selected.len() >= max {
            break;
        }
        if is_house(&candidate) {
            if house_cap.is_some_and(|cap| house_count >= cap) {
                reserve.push(candidate);
                continue;
            }
            house_count += 1;
        }
        selected.push(candidate);
    }

    (selected, reserve)
}
