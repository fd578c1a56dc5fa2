use async_trait::async_trait;
use std::sync::Arc;

use clima_rag::llm::TextModel;
use clima_rag::pricing::{CatalogPricing, PricingProvider, Quote, QuoteRequest};
use clima_rag::{
    CandidateProduct, CapacitySource, ChatMessage, FilterKey, MemoryCatalog, MemorySlotStore,
    PipelineComponents, ResultStage, RetrievalConfig, RetrievalPipeline, RetrievalStrategy,
    NO_PRODUCTS_MESSAGE,
};

struct FixedEmbedder;

#[async_trait]
impl clima_rag::embeddings::EmbeddingProvider for FixedEmbedder {
    async fn embed(&self, _text: &str) -> clima_rag::Result<Vec<f32>> {
        Ok(vec![1.0, 0.0])
    }

    fn model_name(&self) -> &str {
        "fixed"
    }
}

/// Out of stock for every product whose id ends in "-far".
struct RegionalStock;

#[async_trait]
impl PricingProvider for RegionalStock {
    async fn quote(&self, request: &QuoteRequest) -> Quote {
        Quote {
            product_id: request.product_id.clone(),
            price: f64::from(request.sale_price),
            shipping_cost: Some(99.0),
            in_stock: !request.product_id.ends_with("-far"),
        }
    }

    fn name(&self) -> &str {
        "regional"
    }
}

fn product(id: &str, brand: &str, capacity: u32, voltage: &str, product_type: &str) -> CandidateProduct {
    CandidateProduct {
        product_id: id.to_string(),
        brand: brand.to_string(),
        capacity,
        cycle: "Frio".to_string(),
        voltage: voltage.to_string(),
        technology: "Inverter".to_string(),
        product_type: product_type.to_string(),
        content: format!(
            "Ar Condicionado {} {} {} {}\nDescrição: Modelo {} com compressor inverter.\nURL: https://loja.example/{}",
            product_type, brand, capacity, voltage, id, id
        ),
        sale_price: 1999.0 + capacity as f32 / 10.0,
        in_stock: true,
        source_url: format!("https://loja.example/{}", id),
        image_url: format!("https://loja.example/img/{}.jpg", id),
        ..CandidateProduct::default()
    }
}

fn catalog() -> MemoryCatalog {
    let catalog = MemoryCatalog::new();
    let rows = [
        (product("eos-9k", "EOS", 9000, "220V", "Split Hi Wall"), 0.90),
        (product("eos-18k-220", "EOS", 18000, "220V", "Split Hi Wall"), 0.80),
        (product("eos-18k-110", "EOS", 18000, "110V", "Split Hi Wall"), 0.85),
        (product("lg-18k-220", "LG", 18000, "220V", "Split Hi Wall"), 0.95),
        (product("gree-18k-110", "Gree", 18000, "110V", "Split Hi Wall"), 0.70),
        (product("samsung-12k", "Samsung", 12000, "220V", "Split Hi Wall"), 0.99),
        (product("samsung-18k-110", "Samsung", 18000, "110V", "Split Hi Wall"), 0.75),
        (product("midea-18k-multi", "Midea", 18000, "220V", "Multi Split"), 0.90),
        (product("lg-12k-far", "LG", 12000, "220V", "Split Hi Wall"), 0.60),
    ];
    for (row, alignment) in rows {
        let alignment: f32 = alignment;
        catalog.insert(row, vec![alignment, (1.0 - alignment * alignment).sqrt()]);
    }
    catalog
}

fn pipeline(strategy: RetrievalStrategy, pricing: Arc<dyn PricingProvider>) -> RetrievalPipeline {
    let mut config = RetrievalConfig::default();
    config.strategy = strategy;
    let components = PipelineComponents {
        catalog: Arc::new(catalog()),
        embedder: Arc::new(FixedEmbedder),
        slots: Arc::new(MemorySlotStore::new()),
        pricing,
        text_model: None::<Arc<dyn TextModel>>,
    };
    RetrievalPipeline::from_parts(config, components).unwrap()
}

#[tokio::test]
async fn calculated_capacity_sticks_across_turns() {
    let pipeline = pipeline(RetrievalStrategy::VectorOnly, Arc::new(CatalogPricing));

    let first_message = "tenho 20m2, sol da tarde, 3 pessoas";
    let first = pipeline.build_context("conv-1", first_message, &[]).await.unwrap();

    assert_eq!(first.intent.target_capacity, 18000);
    assert_eq!(first.intent.capacity_source, CapacitySource::Calculated);
    assert_eq!(first.intent.filters.get(FilterKey::Type), Some("Split"));
    assert!(first.context.text.starts_with(
        "SISTEMA: Com base nos dados (Área, Sol, Pessoas), o cálculo recomendado é de 18000 BTUs."
    ));
    assert!(!first.results.is_empty());
    assert!(first.results.products.iter().all(|p| p.capacity == 18000));
    assert_eq!(first.results.products[0].brand, "EOS");

    let history = vec![
        ChatMessage::user(first_message),
        ChatMessage::assistant("Para 20m² recomendo 18000 BTUs."),
    ];
    let second = pipeline.build_context("conv-1", "e 220v?", &history).await.unwrap();

    assert_eq!(second.intent.target_capacity, 18000);
    assert_eq!(second.intent.capacity_source, CapacitySource::Sticky);
    assert_eq!(second.intent.filters.get(FilterKey::Voltage), Some("220V"));
    assert!(!second.context.text.contains("cálculo recomendado"));

    let ids: Vec<&str> = second
        .results
        .products
        .iter()
        .map(|p| p.product_id.as_str())
        .collect();
    assert_eq!(ids, vec!["eos-18k-220", "lg-18k-220"]);
}

#[tokio::test]
async fn explicit_capacity_and_filters() {
    let pipeline = pipeline(RetrievalStrategy::VectorOnly, Arc::new(CatalogPricing));
    let output = pipeline
        .build_context("conv-2", "preciso de um ar 12000 split inverter", &[])
        .await
        .unwrap();

    assert_eq!(output.intent.target_capacity, 12000);
    assert_eq!(output.intent.capacity_source, CapacitySource::Explicit);
    assert_eq!(output.intent.filters.get(FilterKey::Technology), Some("Inverter"));
    assert_eq!(output.intent.filters.get(FilterKey::Type), Some("Split"));
    assert!(output
        .results
        .products
        .iter()
        .all(|p| (9600..=14400).contains(&p.capacity)));
    assert!(output.context.text.contains("informe seu CEP"));
}

#[tokio::test]
async fn no_candidates_yields_sentinel() {
    let pipeline = pipeline(RetrievalStrategy::VectorOnly, Arc::new(CatalogPricing));
    let output = pipeline
        .build_context("conv-3", "quero um ar de janela 48000", &[])
        .await
        .unwrap();

    assert_eq!(output.results.stage, ResultStage::Empty);
    assert!(output.results.capacity_relaxed);
    assert_eq!(output.context.text, NO_PRODUCTS_MESSAGE);
    assert_eq!(pipeline.metrics().empty_results, 1);
}

#[tokio::test]
async fn postal_code_drops_out_of_stock_products() {
    let pipeline = pipeline(RetrievalStrategy::VectorOnly, Arc::new(RegionalStock));
    let output = pipeline
        .build_context("conv-4", "split 12000 da LG, meu cep é 88010-000", &[])
        .await
        .unwrap();

    assert_eq!(output.intent.target_capacity, 12000);
    assert_eq!(output.intent.postal_code.as_deref(), Some("88010-000"));
    assert!(output
        .results
        .products
        .iter()
        .any(|p| p.product_id == "lg-12k-far"));

    let shown: Vec<&str> = output
        .context
        .products
        .iter()
        .map(|p| p.candidate.product_id.as_str())
        .collect();
    assert_eq!(shown, vec!["samsung-12k"]);
    assert!(output.context.text.contains("Frete para 88010-000: R$99.00 | Em estoque"));
}

#[tokio::test]
async fn postal_code_after_calculation_keeps_capacity() {
    let pipeline = pipeline(RetrievalStrategy::VectorOnly, Arc::new(CatalogPricing));
    let mut history = Vec::new();
    for message in ["tenho 20m2, sol da tarde, 3 pessoas", "meu cep é 13010-000"] {
        let output = pipeline.build_context("conv-7", message, &history).await.unwrap();
        assert_eq!(output.intent.target_capacity, 18000);
        history.push(ChatMessage::user(message));
        history.push(ChatMessage::assistant("Certo."));
    }

    let third = pipeline.build_context("conv-7", "e 220v?", &history).await.unwrap();
    assert_eq!(third.intent.target_capacity, 18000);
    assert_eq!(third.intent.capacity_source, CapacitySource::Sticky);
    assert_eq!(third.intent.postal_code.as_deref(), Some("13010-000"));
    assert!(third.results.products.iter().all(|p| p.capacity == 18000));
}

#[tokio::test]
async fn named_brands_are_boosted_not_filtered() {
    let pipeline = pipeline(RetrievalStrategy::VectorOnly, Arc::new(CatalogPricing));
    let output = pipeline
        .build_context("conv-8", "tem LG ou Samsung de 18000?", &[])
        .await
        .unwrap();

    assert!(!output.intent.filters.contains(FilterKey::Brand));
    let brands: Vec<&str> = output.results.products.iter().map(|p| p.brand.as_str()).collect();
    assert_eq!(brands[0], "EOS");
    assert!(brands.contains(&"LG"));
    assert!(brands.contains(&"Samsung"));
    assert!(output
        .results
        .products
        .iter()
        .any(|p| p.product_id == "eos-18k-220"));
}

#[tokio::test]
async fn metadata_first_uses_compact_context() {
    let pipeline = pipeline(RetrievalStrategy::MetadataFirst, Arc::new(CatalogPricing));
    let output = pipeline
        .build_context("conv-5", "split 18000 220v", &[])
        .await
        .unwrap();

    assert_eq!(output.results.stage, ResultStage::Metadata);
    assert!(output
        .context
        .text
        .starts_with("SISTEMA: Capacidade considerada: 18000 BTUs.\n\nPRODUTOS ENCONTRADOS:\n\n"));
    let brands: Vec<&str> = output.results.products.iter().map(|p| p.brand.as_str()).collect();
    assert_eq!(brands, vec!["EOS", "LG", "Midea"]);
    assert_eq!(pipeline.metrics().embeddings, 0);
}

#[tokio::test]
async fn identical_requests_rank_identically() {
    let a = pipeline(RetrievalStrategy::VectorOnly, Arc::new(CatalogPricing))
        .build_context("conv-6", "ar condicionado inverter", &[])
        .await
        .unwrap();
    let b = pipeline(RetrievalStrategy::VectorOnly, Arc::new(CatalogPricing))
        .build_context("conv-6", "ar condicionado inverter", &[])
        .await
        .unwrap();

    assert_eq!(a.results, b.results);
    assert_eq!(a.context.text, b.context.text);
}
