use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use crate::brand::BrandBoostPolicy;
use crate::catalog::{CatalogStore, PgCatalogStore};
use crate::config::RetrievalConfig;
use crate::context::{AssembledContext, ContextAssembler, ContextStyle};
use crate::deadline::Deadline;
use crate::embeddings::{CachedEmbedder, EmbeddingProvider, OpenAiEmbedder};
use crate::error::{RetrievalError, RetrievalResult};
use crate::intent::{IntentExtractor, LlmFilterExtractor, SearchIntent};
use crate::llm::{generation_request, OpenAiChatClient, TextModel, SYSTEM_PROMPT};
use crate::observability::{MetricsSnapshot, PipelineMetrics};
use crate::pricing::{CatalogPricing, PricingProvider, ShippingQuoteClient};
use crate::search::{HybridRetriever, RankedResultSet};
use crate::session::{CapacitySlotStore, MemorySlotStore};
use crate::types::ChatMessage;

/// Collaborators a pipeline is assembled from.
pub struct PipelineComponents {
    pub catalog: Arc<dyn CatalogStore>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub slots: Arc<dyn CapacitySlotStore>,
    pub pricing: Arc<dyn PricingProvider>,
    /// Used for answer generation and, when enabled, filter extraction.
    pub text_model: Option<Arc<dyn TextModel>>,
}

/// Everything produced for one message before generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalOutput {
    pub request_id: Uuid,
    pub intent: SearchIntent,
    pub results: RankedResultSet,
    pub context: AssembledContext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub reply: String,
    pub retrieval: RetrievalOutput,
}

pub struct RetrievalPipeline {
    config: RetrievalConfig,
    intent: IntentExtractor,
    retriever: HybridRetriever,
    assembler: ContextAssembler,
    text_model: Option<Arc<dyn TextModel>>,
    metrics: Arc<PipelineMetrics>,
}

impl RetrievalPipeline {
    pub fn from_parts(config: RetrievalConfig, components: PipelineComponents) -> RetrievalResult<Self> {
        Self::with_metrics(config, components, Arc::new(PipelineMetrics::new()))
    }

    fn with_metrics(
        config: RetrievalConfig,
        components: PipelineComponents,
        metrics: Arc<PipelineMetrics>,
    ) -> RetrievalResult<Self> {
        config.validate().map_err(RetrievalError::Config)?;

        let PipelineComponents {
            catalog,
            embedder,
            slots,
            pricing,
            text_model,
        } = components;

        let brands = Arc::new(BrandBoostPolicy::new(&config.brands));

        let mut intent = IntentExtractor::new(slots, &config, metrics.clone());
        if config.intent.use_model_extractor {
            let model = text_model.clone().ok_or_else(|| {
                RetrievalError::Config("intent.use_model_extractor requires a text model".into())
            })?;
            intent = intent.with_model(Arc::new(LlmFilterExtractor::new(model)));
        }

        let retriever = HybridRetriever::new(catalog, embedder, brands.clone(), &config, metrics.clone());
        let assembler = ContextAssembler::new(
            pricing,
            brands,
            ContextStyle::for_strategy(config.strategy),
            metrics.clone(),
        );

        tracing::info!(
            strategy = ?config.strategy,
            model_extraction = config.intent.use_model_extractor,
            generation = text_model.is_some(),
            "Retrieval pipeline ready"
        );

        Ok(Self {
            config,
            intent,
            retriever,
            assembler,
            text_model,
            metrics,
        })
    }

    /// Production wiring: pgvector catalog, OpenAI embeddings and chat,
    /// in-process slot store, logistics pricing when an endpoint is set.
    pub async fn connect(config: RetrievalConfig) -> Result<Self> {
        let metrics = Arc::new(PipelineMetrics::new());
        let catalog = PgCatalogStore::connect(&config.catalog)
            .await
            .context("Failed to connect to the product catalog")?;

        let embedder = OpenAiEmbedder::new(&config.openai).context("Failed to build embedder")?;
        let embedder = CachedEmbedder::wrap(Arc::new(embedder), config.openai.embedding_cache_size);

        let text_model: Arc<dyn TextModel> = Arc::new(
            OpenAiChatClient::new(&config.openai).context("Failed to build chat client")?,
        );

        let pricing: Arc<dyn PricingProvider> = if config.pricing.shipping_url.trim().is_empty() {
            Arc::new(CatalogPricing)
        } else {
            Arc::new(
                ShippingQuoteClient::new(&config.pricing, metrics.clone())
                    .context("Failed to build logistics client")?,
            )
        };

        let components = PipelineComponents {
            catalog: Arc::new(catalog),
            embedder,
            slots: Arc::new(MemorySlotStore::new()),
            pricing,
            text_model: Some(text_model),
        };
        Ok(Self::with_metrics(config, components, metrics)?)
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Intent, ranked products and serialized context for one user message.
    pub async fn build_context(
        &self,
        conversation_id: &str,
        message: &str,
        history: &[ChatMessage],
    ) -> RetrievalResult<RetrievalOutput> {
        let deadline = Deadline::after(self.config.request_timeout());
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "retrieval",
            request_id = %request_id,
            conversation_id = conversation_id
        );
        self.build_context_with(request_id, conversation_id, message, history, &deadline)
            .instrument(span)
            .await
    }

    async fn build_context_with(
        &self,
        request_id: Uuid,
        conversation_id: &str,
        message: &str,
        history: &[ChatMessage],
        deadline: &Deadline,
    ) -> RetrievalResult<RetrievalOutput> {
        self.metrics.record_request();

        let intent = self
            .intent
            .extract(conversation_id, message, history, deadline)
            .await;
        let results = self.retriever.retrieve(&intent, deadline).await?;
        let context = self.assembler.assemble(&intent, &results, deadline).await;

        if context.is_empty() {
            tracing::info!(
                target_capacity = intent.target_capacity,
                filters = intent.filters.len(),
                "No products to show"
            );
            self.metrics.record_empty_result();
        }

        Ok(RetrievalOutput {
            request_id,
            intent,
            results,
            context,
        })
    }

    /// Forget per-conversation state once a conversation is closed.
    pub async fn end_conversation(&self, conversation_id: &str) {
        let deadline = Deadline::after(self.config.request_timeout());
        self.intent.forget(conversation_id, &deadline).await;
    }

    /// Retrieval followed by answer generation with the configured text model.
    pub async fn answer(
        &self,
        conversation_id: &str,
        message: &str,
        history: &[ChatMessage],
    ) -> RetrievalResult<Answer> {
        let model = self
            .text_model
            .clone()
            .ok_or_else(|| RetrievalError::Config("no text model configured for generation".into()))?;

        let deadline = Deadline::after(self.config.request_timeout());
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "answer",
            request_id = %request_id,
            conversation_id = conversation_id
        );

        self.answer_with(model, request_id, conversation_id, message, history, &deadline)
            .instrument(span)
            .await
    }

    async fn answer_with(
        &self,
        model: Arc<dyn TextModel>,
        request_id: Uuid,
        conversation_id: &str,
        message: &str,
        history: &[ChatMessage],
        deadline: &Deadline,
    ) -> RetrievalResult<Answer> {
        let retrieval = self
            .build_context_with(request_id, conversation_id, message, history, deadline)
            .await?;

        let request = generation_request(
            SYSTEM_PROMPT,
            &retrieval.context.text,
            history,
            message,
            self.config.session.history_limit,
            self.config.openai.generation_temperature,
        );
        let reply = deadline
            .run("answer generation", model.complete(&request))
            .await?
            .map_err(RetrievalError::Generation)?;

        tracing::info!(
            model = model.model_name(),
            reply_chars = reply.len(),
            products = retrieval.context.products.len(),
            "Answer generated"
        );
        Ok(Answer { reply, retrieval })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::llm::ChatRequest;
    use crate::types::CandidateProduct;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct FixedEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    #[derive(Default)]
    struct RecordingModel {
        requests: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl TextModel for RecordingModel {
        async fn complete(&self, request: &ChatRequest) -> Result<String> {
            self.requests.lock().push(request.clone());
            Ok("Recomendo o item 1.".to_string())
        }

        fn model_name(&self) -> &str {
            "recording"
        }
    }

    fn components(catalog: MemoryCatalog, text_model: Option<Arc<dyn TextModel>>) -> PipelineComponents {
        PipelineComponents {
            catalog: Arc::new(catalog),
            embedder: Arc::new(FixedEmbedder),
            slots: Arc::new(MemorySlotStore::new()),
            pricing: Arc::new(CatalogPricing),
            text_model,
        }
    }

    fn catalog() -> MemoryCatalog {
        let catalog = MemoryCatalog::new();
        catalog.insert(
            CandidateProduct {
                product_id: "eos-12".to_string(),
                brand: "EOS".to_string(),
                capacity: 12000,
                technology: "Inverter".to_string(),
                product_type: "Split Hi Wall".to_string(),
                content: "Ar Split EOS 12000 Inverter".to_string(),
                sale_price: 2199.0,
                in_stock: true,
                ..CandidateProduct::default()
            },
            vec![1.0, 0.0],
        );
        catalog
    }

    #[test]
    fn test_model_extraction_requires_model() {
        let mut config = RetrievalConfig::default();
        config.intent.use_model_extractor = true;
        let err = RetrievalPipeline::from_parts(config, components(catalog(), None))
            .err()
            .unwrap();
        assert!(matches!(err, RetrievalError::Config(_)));
    }

    #[tokio::test]
    async fn test_build_context_counts_request() {
        let pipeline =
            RetrievalPipeline::from_parts(RetrievalConfig::default(), components(catalog(), None)).unwrap();
        let output = pipeline
            .build_context("c1", "preciso de um ar 12000 split inverter", &[])
            .await
            .unwrap();

        assert_eq!(output.intent.target_capacity, 12000);
        assert_eq!(output.context.products.len(), 1);
        assert!(output.context.text.contains("Item 1:"));
        assert_eq!(pipeline.metrics().requests, 1);
        assert_eq!(pipeline.metrics().empty_results, 0);
    }

    #[tokio::test]
    async fn test_end_conversation_drops_sticky_capacity() {
        let pipeline =
            RetrievalPipeline::from_parts(RetrievalConfig::default(), components(catalog(), None)).unwrap();
        pipeline
            .build_context("c2", "sala de 15m2 sol da manhã", &[])
            .await
            .unwrap();
        let follow_up = pipeline.build_context("c2", "tem inverter?", &[]).await.unwrap();
        assert_eq!(follow_up.intent.target_capacity, 12000);

        pipeline.end_conversation("c2").await;
        let fresh = pipeline.build_context("c2", "tem inverter?", &[]).await.unwrap();
        assert_eq!(fresh.intent.target_capacity, 0);
        assert_eq!(pipeline.metrics().slot_store_failures, 0);
    }

    #[tokio::test]
    async fn test_answer_without_model_is_config_error() {
        let pipeline =
            RetrievalPipeline::from_parts(RetrievalConfig::default(), components(catalog(), None)).unwrap();
        let err = pipeline.answer("c1", "oi", &[]).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Config(_)));
    }

    #[tokio::test]
    async fn test_answer_sends_context_to_model() {
        let model = Arc::new(RecordingModel::default());
        let pipeline = RetrievalPipeline::from_parts(
            RetrievalConfig::default(),
            components(catalog(), Some(model.clone() as Arc<dyn TextModel>)),
        )
        .unwrap();

        let answer = pipeline
            .answer("c1", "split 12000 inverter", &[])
            .await
            .unwrap();
        assert_eq!(answer.reply, "Recomendo o item 1.");

        let requests = model.requests.lock();
        assert_eq!(requests.len(), 1);
        let context = &requests[0].messages[1].content;
        assert!(context.starts_with("CONTEXTO TÉCNICO:\n"));
        assert!(context.contains("Ar Split EOS 12000 Inverter"));
        assert_eq!(requests[0].messages.last().unwrap().content, "split 12000 inverter");
    }
}
