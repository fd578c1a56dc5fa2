use std::time::Duration;

/// Failures that abort a retrieval request. Everything else (brand stage,
/// model intent extraction, pricing) degrades locally and is only counted.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("embedding provider failed: {0:#}")]
    Embedding(anyhow::Error),

    #[error("catalog query failed during {stage}: {source:#}")]
    Catalog {
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("{operation} exceeded the request deadline ({budget:?})")]
    Timeout {
        operation: &'static str,
        budget: Duration,
    },

    #[error("generation failed: {0:#}")]
    Generation(anyhow::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type RetrievalResult<T> = std::result::Result<T, RetrievalError>;
