pub mod brand;
pub mod btu;
pub mod catalog;
pub mod config;
pub mod context;
pub mod deadline;
pub mod embeddings;
pub mod error;
pub mod intent;
pub mod llm;
pub mod observability;
pub mod pipeline;
pub mod pricing;
pub mod search;
pub mod session;
pub mod types;

mod http;

// Re-export primary types for convenience
pub use config::RetrievalConfig;
pub use error::{RetrievalError, RetrievalResult};
pub use pipeline::{Answer, PipelineComponents, RetrievalOutput, RetrievalPipeline};
pub use types::{CandidateProduct, ChatMessage, FilterKey, FilterSet};

pub use brand::{BrandBoostPolicy, BrandWeightTable};
pub use btu::calculate_btu;
pub use catalog::{CatalogQuery, CatalogStore, MemoryCatalog, PgCatalogStore};
pub use context::{ContextAssembler, ContextStyle, PricedCandidate, NO_PRODUCTS_MESSAGE};
pub use intent::{CapacitySource, IntentExtractor, SearchIntent};
pub use search::{HybridRetriever, RankedResultSet, ResultStage, RetrievalStrategy};
pub use session::{CapacitySlotStore, MemorySlotStore};

// Re-export common types
pub use anyhow::{Error, Result};
pub use uuid::Uuid;
