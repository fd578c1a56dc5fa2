//! OpenAI-compatible embeddings client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::EmbeddingProvider;
use crate::config::OpenAiConfig;
use crate::http;

#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    max_retries: usize,
}

impl OpenAiEmbedder {
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        anyhow::ensure!(!config.api_key.trim().is_empty(), "missing OpenAI API key");
        anyhow::ensure!(
            !config.embedding_model.trim().is_empty(),
            "missing embedding model name"
        );
        let client = http::build_client(
            Some(&config.api_key),
            Duration::from_secs(config.timeout_secs),
        )?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            model: config.embedding_model.clone(),
            max_retries: config.max_retries.max(1),
        })
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: text,
        };

        let mut attempt = 0usize;
        loop {
            match self.client.post(&self.endpoint).json(&request).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let parsed: EmbeddingResponse =
                            http::parse_json_response(resp, &self.endpoint).await?;
                        let first = parsed
                            .data
                            .into_iter()
                            .next()
                            .context("embedding response contained no vectors")?;
                        anyhow::ensure!(!first.embedding.is_empty(), "empty embedding vector");
                        return Ok(first.embedding);
                    }

                    let body = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if http::should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        tracing::warn!(status = %status, attempt = attempt, "Retrying embedding request");
                        tokio::time::sleep(http::retry_backoff(attempt)).await;
                        continue;
                    }
                    anyhow::bail!("embeddings request failed ({}): {}", status, body);
                }
                Err(err) => {
                    if http::is_retryable_error(&err) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        tracing::warn!(error = %err, attempt = attempt, "Retrying embedding request");
                        tokio::time::sleep(http::retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(err).with_context(|| format!("request to {} failed", self.endpoint));
                }
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalConfig;

    #[test]
    fn test_requires_api_key() {
        let config = RetrievalConfig::default().openai;
        assert!(OpenAiEmbedder::new(&config).is_err());
    }

    #[test]
    fn test_endpoint_is_normalized() {
        let mut config = RetrievalConfig::default().openai;
        config.api_key = "sk-test".to_string();
        config.base_url = "http://localhost:8080/v1/".to_string();
        let embedder = OpenAiEmbedder::new(&config).unwrap();
        assert_eq!(embedder.endpoint, "http://localhost:8080/v1/embeddings");
        assert_eq!(embedder.model_name(), "text-embedding-3-small");
    }
}
