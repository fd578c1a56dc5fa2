use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::search::RetrievalStrategy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub strategy: RetrievalStrategy,
    pub search: SearchConfig,
    pub intent: IntentConfig,
    pub session: SessionConfig,
    pub brands: BrandConfig,
    pub openai: OpenAiConfig,
    pub catalog: CatalogConfig,
    pub pricing: PricingConfig,
    /// Upper bound for all external calls made while serving one request.
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Candidates fetched per catalog stage.
    pub stage_limit: usize,
    pub min_similarity: f32,
    /// Below this many semantic hits the threshold is dropped and the stage re-run.
    pub fallback_min_results: usize,
    /// Final list size for the vector-only strategy.
    pub max_products_vector: usize,
    /// Final list size for the metadata-first strategy.
    pub max_products_metadata: usize,
    pub metadata_limit: usize,
    /// House-brand rows reserved in the metadata stage when no brand was requested.
    pub metadata_house_slots: usize,
    /// At most this many house-brand products in the final list. `None` disables.
    pub house_brand_cap: Option<usize>,
    /// Rebuild product content from all of its chunks before serialization.
    /// Metadata-first retrieval always does.
    pub reassemble_chunks: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentConfig {
    /// Prior user turns folded into the expanded query (rule-based extraction).
    pub history_turns_rules: usize,
    /// Prior user turns folded into the expanded query (model extraction).
    pub history_turns_model: usize,
    /// Delegate filter extraction to the text model.
    pub use_model_extractor: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub capacity_ttl_secs: u64,
    /// Messages of history handed to the generation step.
    pub history_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandConfig {
    pub house_brand: String,
    /// Weight shared by the house brand and explicitly requested brands.
    pub boost_weight: f64,
    /// Graduated priors for known competitors, `(brand, weight)`.
    pub priors: Vec<(String, f64)>,
    /// Brands recognized in user text without a ranking prior.
    pub known_brands: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default, skip_serializing)]
    pub api_key: String,
    pub base_url: String,
    pub embedding_model: String,
    pub chat_model: String,
    pub generation_temperature: f32,
    pub timeout_secs: u64,
    pub max_retries: usize,
    /// Cached query embeddings (0 disables the cache).
    pub embedding_cache_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default, skip_serializing)]
    pub database_url: String,
    pub schema: String,
    pub table: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Logistics quote endpoint. Empty means price-only quotes.
    pub shipping_url: String,
    /// Postal-code lookup endpoint, `{cep}` is substituted.
    pub address_lookup_url: String,
    #[serde(default, skip_serializing)]
    pub address_lookup_token: String,
    /// State used when the postal-code lookup fails.
    pub fallback_state: String,
    pub product_type: String,
    pub timeout_secs: u64,
}

impl RetrievalConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.search.stage_limit == 0 {
            return Err("search.stage_limit must be > 0".into());
        }
        if !(0.0..=1.0).contains(&self.search.min_similarity) {
            return Err("search.min_similarity must be in [0.0, 1.0]".into());
        }
        if self.search.max_products_vector == 0 || self.search.max_products_metadata == 0 {
            return Err("search.max_products_* must be > 0".into());
        }
        if self.search.metadata_house_slots > self.search.metadata_limit {
            return Err("search.metadata_house_slots must be <= metadata_limit".into());
        }
        if !(1_200..=1_800).contains(&self.session.capacity_ttl_secs) {
            return Err("session.capacity_ttl_secs must be between 20 and 30 minutes".into());
        }
        if self.brands.house_brand.trim().is_empty() {
            return Err("brands.house_brand must not be empty".into());
        }
        if !(self.brands.boost_weight > 0.0 && self.brands.boost_weight <= 1.0) {
            return Err("brands.boost_weight must be in (0.0, 1.0]".into());
        }
        for (brand, weight) in &self.brands.priors {
            if !(*weight > 0.0 && *weight <= 1.0) {
                return Err(format!("brands.priors weight for '{}' must be in (0.0, 1.0]", brand));
            }
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be > 0".into());
        }
        Ok(())
    }

    /// Load config from a JSON file, falling back to defaults for missing fields.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let mut config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with environment variables.
    pub fn from_env() -> Result<Self, String> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.openai.api_key = key;
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.catalog.database_url = url;
        }
        if let Ok(strategy) = std::env::var("CLIMA_RAG_STRATEGY") {
            match strategy.to_lowercase().as_str() {
                "metadata_first" | "metadata-first" | "v2" => {
                    self.strategy = RetrievalStrategy::MetadataFirst
                }
                "vector_only" | "vector-only" | "v1" => self.strategy = RetrievalStrategy::VectorOnly,
                other => tracing::warn!(value = other, "Ignoring unknown CLIMA_RAG_STRATEGY"),
            }
        }
        if let Some(secs) = std::env::var("CLIMA_RAG_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.request_timeout_secs = secs;
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn capacity_ttl(&self) -> Duration {
        Duration::from_secs(self.session.capacity_ttl_secs)
    }

    /// Final list size for the configured strategy.
    pub fn max_products(&self) -> usize {
        match self.strategy {
            RetrievalStrategy::VectorOnly => self.search.max_products_vector,
            RetrievalStrategy::MetadataFirst => self.search.max_products_metadata,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            strategy: RetrievalStrategy::VectorOnly,
            search: SearchConfig {
                stage_limit: 30,
                min_similarity: 0.15,
                fallback_min_results: 5,
                max_products_vector: 15,
                max_products_metadata: 10,
                metadata_limit: 5,
                metadata_house_slots: 2,
                house_brand_cap: Some(3),
                reassemble_chunks: false,
            },
            intent: IntentConfig {
                history_turns_rules: 3,
                history_turns_model: 5,
                use_model_extractor: false,
            },
            session: SessionConfig {
                capacity_ttl_secs: 20 * 60,
                history_limit: 6,
            },
            brands: BrandConfig {
                house_brand: "EOS".to_string(),
                boost_weight: 0.05,
                priors: vec![
                    ("Samsung".to_string(), 0.94),
                    ("Midea".to_string(), 0.95),
                    ("LG".to_string(), 0.96),
                    ("Gree".to_string(), 0.96),
                    ("Electrolux".to_string(), 0.97),
                ],
                known_brands: [
                    "Daikin", "Fujitsu", "Springer", "Carrier", "Philco", "Consul",
                ]
                .iter()
                .map(|b| b.to_string())
                .collect(),
            },
            openai: OpenAiConfig {
                api_key: String::new(),
                base_url: "https://api.openai.com/v1".to_string(),
                embedding_model: "text-embedding-3-small".to_string(),
                chat_model: "gpt-4o-mini".to_string(),
                generation_temperature: 0.3,
                timeout_secs: 30,
                max_retries: 3,
                embedding_cache_size: 1024,
            },
            catalog: CatalogConfig {
                database_url: String::new(),
                schema: "public".to_string(),
                table: "product_knowledge".to_string(),
            },
            pricing: PricingConfig {
                shipping_url: String::new(),
                address_lookup_url: String::new(),
                address_lookup_token: String::new(),
                fallback_state: "SC".to_string(),
                product_type: "ar-condicionado".to_string(),
                timeout_secs: 10,
            },
            request_timeout_secs: 30,
        }
    }
}
