//! In-process catalog with the same ranking semantics as the pgvector store.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::HashMap;

use super::{CatalogQuery, CatalogStore};
use crate::brand::BrandWeightTable;
use crate::types::{contains_ignore_case, CandidateProduct};

struct StoredChunk {
    product: CandidateProduct,
    embedding: Vec<f32>,
}

#[derive(Default)]
pub struct MemoryCatalog {
    chunks: RwLock<Vec<StoredChunk>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one content chunk. Several chunks may share a `product_id`.
    pub fn insert(&self, product: CandidateProduct, embedding: Vec<f32>) {
        self.chunks.write().push(StoredChunk { product, embedding });
    }

    pub fn len(&self) -> usize {
        self.chunks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.read().is_empty()
    }

    /// Score every matching in-stock chunk, keep the best chunk per product,
    /// then order by `(sort value, product_id)`.
    fn ranked<F>(&self, accept: F, limit: usize) -> Vec<CandidateProduct>
    where
        F: Fn(&StoredChunk) -> Option<(f32, f32)>,
    {
        let chunks = self.chunks.read();
        let mut best: HashMap<&str, (f32, CandidateProduct)> = HashMap::new();

        for chunk in chunks.iter().filter(|c| c.product.in_stock) {
            let Some((sort_val, similarity)) = accept(chunk) else {
                continue;
            };
            let replace = best
                .get(chunk.product.product_id.as_str())
                .map_or(true, |(current, _)| sort_val < *current);
            if replace {
                let mut product = chunk.product.clone();
                product.similarity = similarity;
                best.insert(chunk.product.product_id.as_str(), (sort_val, product));
            }
        }

        let mut ranked: Vec<(f32, CandidateProduct)> = best.into_values().collect();
        ranked.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.1.product_id.cmp(&b.1.product_id))
        });
        ranked.into_iter().take(limit).map(|(_, p)| p).collect()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for i in 0..len {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn search_by_metadata(
        &self,
        query: &CatalogQuery,
        limit: usize,
    ) -> Result<Vec<CandidateProduct>> {
        Ok(self.ranked(
            |chunk| {
                query
                    .matches(&chunk.product, false)
                    .then_some((chunk.product.capacity as f32, 0.0))
            },
            limit,
        ))
    }

    async fn search_by_brand(
        &self,
        brand: &str,
        query: &CatalogQuery,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<CandidateProduct>> {
        Ok(self.ranked(
            |chunk| {
                if !contains_ignore_case(&chunk.product.brand, brand)
                    || !query.matches(&chunk.product, true)
                {
                    return None;
                }
                let similarity = cosine_similarity(embedding, &chunk.embedding);
                Some((1.0 - similarity, similarity))
            },
            limit,
        ))
    }

    async fn search_similar(
        &self,
        embedding: &[f32],
        query: &CatalogQuery,
        min_score: f32,
        weights: &BrandWeightTable,
        limit: usize,
    ) -> Result<Vec<CandidateProduct>> {
        Ok(self.ranked(
            |chunk| {
                if !query.matches(&chunk.product, true) {
                    return None;
                }
                let similarity = cosine_similarity(embedding, &chunk.embedding);
                if min_score > 0.0 && similarity <= min_score {
                    return None;
                }
                let weight = weights.weight_of(&chunk.product.brand) as f32;
                Some(((1.0 - similarity) * weight, similarity))
            },
            limit,
        ))
    }

    async fn product_chunks(&self, product_id: &str) -> Result<Vec<String>> {
        Ok(self
            .chunks
            .read()
            .iter()
            .filter(|c| c.product.product_id == product_id)
            .map(|c| c.product.content.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brand::BrandBoostPolicy;
    use crate::config::RetrievalConfig;
    use crate::types::{FilterKey, FilterSet};

    fn product(id: &str, brand: &str, capacity: u32) -> CandidateProduct {
        CandidateProduct {
            product_id: id.to_string(),
            brand: brand.to_string(),
            capacity,
            product_type: "Split Hi Wall".to_string(),
            content: format!("Ar {} {}", brand, capacity),
            in_stock: true,
            ..CandidateProduct::default()
        }
    }

    fn catalog() -> MemoryCatalog {
        let catalog = MemoryCatalog::new();
        catalog.insert(product("a", "LG", 12000), vec![1.0, 0.0]);
        catalog.insert(product("b", "EOS", 12000), vec![0.8, 0.6]);
        catalog.insert(product("c", "Gree", 9000), vec![0.0, 1.0]);
        catalog.insert(product("d", "Samsung", 0), vec![0.9, 0.1]);
        let mut sold_out = product("e", "LG", 12000);
        sold_out.in_stock = false;
        catalog.insert(sold_out, vec![1.0, 0.0]);
        catalog
    }

    #[tokio::test]
    async fn test_metadata_orders_by_capacity_and_skips_unknown() {
        let query = CatalogQuery::new(FilterSet::new(), 11000);
        let hits = catalog().search_by_metadata(&query, 10).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|p| p.product_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_similar_applies_brand_weight_and_threshold() {
        let weights = BrandBoostPolicy::new(&RetrievalConfig::default().brands).table_for("", None);
        let query = CatalogQuery::new(FilterSet::new(), 12000);
        let hits = catalog()
            .search_similar(&[1.0, 0.0], &query, 0.15, &weights, 10)
            .await
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|p| p.product_id.as_str()).collect();
        // Exact match at distance 0 stays ahead of the weighted house brand.
        assert_eq!(ids, vec!["a", "d", "b"]);
        assert!(!ids.contains(&"e"));
    }

    #[tokio::test]
    async fn test_similar_threshold_drops_distant_products() {
        let weights = BrandWeightTable::default();
        let query = CatalogQuery::new(FilterSet::new(), 0);
        let hits = catalog()
            .search_similar(&[1.0, 0.0], &query, 0.15, &weights, 10)
            .await
            .unwrap();
        assert!(hits.iter().all(|p| p.product_id != "c"));

        let relaxed = catalog()
            .search_similar(&[1.0, 0.0], &query, 0.0, &weights, 10)
            .await
            .unwrap();
        assert!(relaxed.iter().any(|p| p.product_id == "c"));
    }

    #[tokio::test]
    async fn test_brand_search_has_no_threshold() {
        let query = CatalogQuery::new(FilterSet::new(), 9000);
        let hits = catalog()
            .search_by_brand("gree", &query, &[1.0, 0.0], 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].product_id, "c");
    }

    #[tokio::test]
    async fn test_chunks_collapse_to_best_per_product() {
        let catalog = MemoryCatalog::new();
        let mut first = product("x", "LG", 12000);
        first.content = "Ar LG\nparte 1".to_string();
        let mut second = product("x", "LG", 12000);
        second.content = "Ar LG\nparte 2".to_string();
        catalog.insert(first, vec![0.0, 1.0]);
        catalog.insert(second, vec![1.0, 0.0]);

        let weights = BrandWeightTable::default();
        let query = CatalogQuery::new(FilterSet::new(), 0);
        let hits = catalog
            .search_similar(&[1.0, 0.0], &query, 0.0, &weights, 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].content.ends_with("parte 2"));

        let chunks = catalog.product_chunks("x").await.unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].ends_with("parte 1"));
    }

    #[tokio::test]
    async fn test_filters_apply() {
        let query = CatalogQuery::new(FilterSet::new().with(FilterKey::Brand, "eos"), 0);
        let hits = catalog().search_by_metadata(&query, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].brand, "EOS");
    }
}
