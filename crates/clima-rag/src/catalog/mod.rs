//! Product catalog access.
//!
//! Every store returns one row per product (chunks collapsed, best-ranked
//! chunk wins) and only in-stock products.

pub mod memory;
pub mod pg_store;
pub mod query;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::brand::BrandWeightTable;
use crate::types::{contains_ignore_case, CandidateProduct, CapacityRange, FilterKey, FilterSet};

pub use memory::MemoryCatalog;
pub use pg_store::{PgCatalogStore, TableName};

/// Constraints shared by every catalog stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogQuery {
    pub filters: FilterSet,
    pub capacity: Option<CapacityRange>,
    /// Brand excluded by substring match (used to split house-brand slots).
    pub exclude_brand: Option<String>,
}

impl CatalogQuery {
    pub fn new(filters: FilterSet, target_capacity: u32) -> Self {
        Self {
            filters,
            capacity: CapacityRange::around(target_capacity),
            exclude_brand: None,
        }
    }

    pub fn without_capacity(&self) -> Self {
        Self {
            capacity: None,
            ..self.clone()
        }
    }

    pub fn with_brand(&self, brand: &str) -> Self {
        let mut query = self.clone();
        query.filters.set(FilterKey::Brand, brand);
        query
    }

    pub fn excluding_brand(&self, brand: &str) -> Self {
        Self {
            exclude_brand: Some(brand.to_string()),
            ..self.clone()
        }
    }

    /// Row-level predicate. `allow_unknown_capacity` admits products whose
    /// capacity could not be extracted (stored as 0).
    pub fn matches(&self, product: &CandidateProduct, allow_unknown_capacity: bool) -> bool {
        if let Some(range) = self.capacity {
            let unknown_ok = allow_unknown_capacity && product.capacity == 0;
            if !unknown_ok && !range.contains(product.capacity) {
                return false;
            }
        }
        if let Some(excluded) = &self.exclude_brand {
            if contains_ignore_case(&product.brand, excluded) {
                return false;
            }
        }
        self.filters.matches(product)
    }
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Exact attribute match, no similarity. Capacity band is strict.
    /// Ordered by capacity ascending.
    async fn search_by_metadata(
        &self,
        query: &CatalogQuery,
        limit: usize,
    ) -> Result<Vec<CandidateProduct>>;

    /// Products of `brand` ordered by distance to `embedding`, no threshold.
    /// Products with unknown capacity pass the band.
    async fn search_by_brand(
        &self,
        brand: &str,
        query: &CatalogQuery,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<CandidateProduct>>;

    /// Ordered by `distance * brand weight` ascending. `min_score <= 0`
    /// disables the similarity threshold.
    async fn search_similar(
        &self,
        embedding: &[f32],
        query: &CatalogQuery,
        min_score: f32,
        weights: &BrandWeightTable,
        limit: usize,
    ) -> Result<Vec<CandidateProduct>>;

    /// All content chunks of a product in ingestion order.
    async fn product_chunks(&self, product_id: &str) -> Result<Vec<String>>;
}
