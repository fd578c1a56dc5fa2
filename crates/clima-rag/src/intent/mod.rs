//! Search intent extraction: target capacity, attribute filters, postal code.

pub mod extractor;
pub mod llm_extractor;
pub mod reference;
pub mod rules;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::FilterSet;

pub use extractor::IntentExtractor;
pub use llm_extractor::LlmFilterExtractor;
pub use reference::resolve_reference;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacitySource {
    /// Stated by the user.
    Explicit,
    /// Derived from area, sun exposure and occupancy.
    Calculated,
    /// Carried over from an earlier turn of the conversation.
    Sticky,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchIntent {
    pub raw_message: String,
    /// Message after item back-references were replaced by product names.
    pub resolved_message: String,
    /// Recent user turns plus the resolved message; the text that gets embedded.
    pub expanded_query: String,
    /// BTU/h, 0 when unknown.
    pub target_capacity: u32,
    pub capacity_source: CapacitySource,
    pub filters: FilterSet,
    pub postal_code: Option<String>,
}

impl SearchIntent {
    pub fn is_calculated(&self) -> bool {
        self.capacity_source == CapacitySource::Calculated
    }
}

/// Result of one filter-extraction strategy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterExtraction {
    pub filters: FilterSet,
    /// Capacity reported by the strategy itself, if it computes one.
    pub capacity: Option<u32>,
}

#[async_trait]
pub trait FilterExtractor: Send + Sync {
    async fn extract(&self, expanded_query: &str) -> Result<FilterExtraction>;

    fn name(&self) -> &'static str;
}

/// Keyword rules. Never fails and never reports a capacity; capacity
/// precedence is handled by `IntentExtractor`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedExtractor;

impl RuleBasedExtractor {
    pub fn filters(&self, expanded_query: &str) -> FilterSet {
        rules::extract_filters(expanded_query)
    }
}

#[async_trait]
impl FilterExtractor for RuleBasedExtractor {
    async fn extract(&self, expanded_query: &str) -> Result<FilterExtraction> {
        Ok(FilterExtraction {
            filters: self.filters(expanded_query),
            capacity: None,
        })
    }

    fn name(&self) -> &'static str {
        "rules"
    }
}
