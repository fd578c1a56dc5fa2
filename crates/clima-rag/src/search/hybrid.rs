//! Staged candidate retrieval: metadata, house-brand guarantee, semantic
//! search with threshold and capacity fallbacks, then merge and caps.

use std::sync::Arc;

use super::{merge_unique, select_final, RankedResultSet, ResultStage, RetrievalStrategy};
use crate::brand::{BrandBoostPolicy, BrandWeightTable};
use crate::catalog::{CatalogQuery, CatalogStore};
use crate::config::{RetrievalConfig, SearchConfig};
use crate::deadline::Deadline;
use crate::embeddings::EmbeddingProvider;
use crate::error::{RetrievalError, RetrievalResult};
use crate::intent::SearchIntent;
use crate::observability::PipelineMetrics;
use crate::types::{CandidateProduct, FilterKey};

pub struct HybridRetriever {
    catalog: Arc<dyn CatalogStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    brands: Arc<BrandBoostPolicy>,
    config: SearchConfig,
    strategy: RetrievalStrategy,
    max_products: usize,
    metrics: Arc<PipelineMetrics>,
}

impl HybridRetriever {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        brands: Arc<BrandBoostPolicy>,
        config: &RetrievalConfig,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            catalog,
            embedder,
            brands,
            config: config.search.clone(),
            strategy: config.strategy,
            max_products: config.max_products(),
            metrics,
        }
    }

    pub fn strategy(&self) -> RetrievalStrategy {
        self.strategy
    }

    pub async fn retrieve(
        &self,
        intent: &SearchIntent,
        deadline: &Deadline,
    ) -> RetrievalResult<RankedResultSet> {
        let query = CatalogQuery::new(intent.filters.clone(), intent.target_capacity);

        if self.strategy == RetrievalStrategy::MetadataFirst {
            let hits = self.metadata_stage(&query, deadline).await;
            if !hits.is_empty() {
                tracing::info!(hits = hits.len(), "Metadata stage matched, skipping semantic search");
                return Ok(self
                    .finish(hits, ResultStage::Metadata, false, deadline)
                    .await);
            }
        }

        let embedding = deadline
            .run("query embedding", self.embedder.embed(&intent.expanded_query))
            .await?
            .map_err(RetrievalError::Embedding)?;
        self.metrics.record_embedding();

        let guaranteed = match self.strategy {
            RetrievalStrategy::VectorOnly => self.brand_stage(&query, &embedding, deadline).await,
            RetrievalStrategy::MetadataFirst => Vec::new(),
        };

        let weights = self
            .brands
            .table_for(&intent.expanded_query, intent.filters.get(FilterKey::Brand));
        let (semantic, mut stage) = self
            .semantic_stage(&query, &embedding, &weights, deadline)
            .await?;

        let mut merged = merge_unique([guaranteed, semantic]);
        let mut capacity_relaxed = false;

        if merged.is_empty() && query.capacity.is_some() {
            let min_score = match self.strategy {
                RetrievalStrategy::MetadataFirst => self.config.min_similarity,
                RetrievalStrategy::VectorOnly => 0.0,
            };
            tracing::info!(
                target_capacity = intent.target_capacity,
                min_score = min_score,
                "No in-band candidates, retrying without capacity"
            );
            self.metrics.record_capacity_fallback();
            merged = self
                .similar(&query.without_capacity(), &embedding, min_score, &weights, deadline)
                .await?;
            capacity_relaxed = true;
        }

        if merged.is_empty() {
            stage = ResultStage::Empty;
        }

        Ok(self.finish(merged, stage, capacity_relaxed, deadline).await)
    }

    /// Exact attribute match. Without a brand filter, the first
    /// `metadata_house_slots` rows are reserved for the house brand.
    async fn metadata_stage(&self, query: &CatalogQuery, deadline: &Deadline) -> Vec<CandidateProduct> {
        let limit = self.config.metadata_limit;
        let house = self.brands.house_brand();

        let lookups = if query.filters.contains(FilterKey::Brand) {
            vec![(query.clone(), limit)]
        } else {
            let slots = self.config.metadata_house_slots.min(limit);
            vec![
                (query.with_brand(house), slots),
                (query.excluding_brand(house), limit - slots),
            ]
        };

        let mut stages = Vec::with_capacity(lookups.len());
        for (lookup, lookup_limit) in lookups {
            if lookup_limit == 0 {
                continue;
            }
            let result = deadline
                .run(
                    "metadata search",
                    self.catalog.search_by_metadata(&lookup, lookup_limit),
                )
                .await;
            match result {
                Ok(Ok(hits)) => stages.push(hits),
                Ok(Err(e)) => {
                    tracing::warn!(error = %format!("{:#}", e), "Metadata stage failed, treating as empty");
                    self.metrics.record_metadata_stage_failure();
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Metadata stage timed out, treating as empty");
                    self.metrics.record_metadata_stage_failure();
                }
            }
        }

        merge_unique(stages)
    }

    /// House-brand products ordered by distance, no similarity threshold.
    async fn brand_stage(
        &self,
        query: &CatalogQuery,
        embedding: &[f32],
        deadline: &Deadline,
    ) -> Vec<CandidateProduct> {
        let house = self.brands.house_brand();
        if let Some(requested) = query.filters.get(FilterKey::Brand) {
            if !self.brands.is_house_brand(requested) {
                tracing::debug!(brand = requested, "Other brand requested, skipping house-brand stage");
                return Vec::new();
            }
        }

        let result = deadline
            .run(
                "house brand search",
                self.catalog
                    .search_by_brand(house, query, embedding, self.config.stage_limit),
            )
            .await;
        match result {
            Ok(Ok(hits)) => {
                tracing::debug!(brand = house, hits = hits.len(), "House-brand stage");
                hits
            }
            Ok(Err(e)) => {
                tracing::warn!(brand = house, error = %format!("{:#}", e), "House-brand stage failed, treating as empty");
                self.metrics.record_brand_stage_failure();
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(brand = house, error = %e, "House-brand stage timed out, treating as empty");
                self.metrics.record_brand_stage_failure();
                Vec::new()
            }
        }
    }

    async fn semantic_stage(
        &self,
        query: &CatalogQuery,
        embedding: &[f32],
        weights: &BrandWeightTable,
        deadline: &Deadline,
    ) -> RetrievalResult<(Vec<CandidateProduct>, ResultStage)> {
        let hits = self
            .similar(query, embedding, self.config.min_similarity, weights, deadline)
            .await?;

        if self.strategy == RetrievalStrategy::VectorOnly
            && hits.len() < self.config.fallback_min_results
        {
            tracing::info!(
                hits = hits.len(),
                min_results = self.config.fallback_min_results,
                "Few semantic hits, retrying without threshold"
            );
            self.metrics.record_threshold_fallback();
            let relaxed = self.similar(query, embedding, 0.0, weights, deadline).await?;
            return Ok((relaxed, ResultStage::ThresholdRelaxed));
        }

        Ok((hits, ResultStage::Semantic))
    }

    async fn similar(
        &self,
        query: &CatalogQuery,
        embedding: &[f32],
        min_score: f32,
        weights: &BrandWeightTable,
        deadline: &Deadline,
    ) -> RetrievalResult<Vec<CandidateProduct>> {
        let hits = deadline
            .run(
                "semantic search",
                self.catalog.search_similar(
                    embedding,
                    query,
                    min_score,
                    weights,
                    self.config.stage_limit,
                ),
            )
            .await?
            .map_err(|source| RetrievalError::Catalog {
                stage: "semantic",
                source,
            })?;
        tracing::debug!(
            hits = hits.len(),
            min_score = min_score,
            capacity_band = query.capacity.is_some(),
            "Semantic search"
        );
        Ok(hits)
    }

    async fn finish(
        &self,
        candidates: Vec<CandidateProduct>,
        stage: ResultStage,
        capacity_relaxed: bool,
        deadline: &Deadline,
    ) -> RankedResultSet {
        let house_cap = match self.strategy {
            RetrievalStrategy::VectorOnly => self.config.house_brand_cap,
            RetrievalStrategy::MetadataFirst => None,
        };
        let (mut products, mut reserve) = select_final(
            candidates,
            self.max_products,
            |p| self.brands.is_house_brand(&p.brand),
            house_cap,
        );

        if self.strategy == RetrievalStrategy::MetadataFirst || self.config.reassemble_chunks {
            self.reassemble(&mut products, deadline).await;
            self.reassemble(&mut reserve, deadline).await;
        }

        tracing::info!(
            strategy = ?self.strategy,
            stage = ?stage,
            products = products.len(),
            held_back = reserve.len(),
            capacity_relaxed = capacity_relaxed,
            "Retrieval complete"
        );

        RankedResultSet {
            products,
            stage,
            capacity_relaxed,
            reserve,
        }
    }

    /// Replace each product's content with all of its chunks joined.
    async fn reassemble(&self, products: &mut [CandidateProduct], deadline: &Deadline) {
        for product in products.iter_mut() {
            let lookup = deadline
                .run("chunk lookup", self.catalog.product_chunks(&product.product_id))
                .await;
            match lookup {
                Ok(Ok(chunks)) if !chunks.is_empty() => product.content = chunks.join("\n"),
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    tracing::debug!(product_id = %product.product_id, error = %e, "Chunk lookup failed");
                }
                Err(e) => {
                    tracing::debug!(product_id = %product.product_id, error = %e, "Chunk lookup timed out");
                }
            }
        }
    }
}
