//! Serializes ranked, priced products into the text block handed to the
//! generation model.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};

use crate::brand::BrandBoostPolicy;
use crate::deadline::Deadline;
use crate::intent::SearchIntent;
use crate::observability::PipelineMetrics;
use crate::pricing::{PricingProvider, Quote, QuoteRequest};
use crate::search::{RankedResultSet, RetrievalStrategy};
use crate::types::CandidateProduct;

/// Returned instead of a product block when nothing can be shown.
pub const NO_PRODUCTS_MESSAGE: &str = "Desculpe, não encontrei produtos correspondentes à sua busca.";

const DETAILED_HEADER: &str = "PRODUTOS ENCONTRADOS (Use EXCLUSIVAMENTE os dados abaixo. Para cada item, exiba a imagem com Markdown ![Nome](URL), inclua uma breve descrição técnica e crie um link de compra):\n\n";
const COMPACT_HEADER: &str = "PRODUTOS ENCONTRADOS:\n\n";
const ASK_FOR_POSTAL_CODE: &str = " (para saber o frete e o estoque, por favor, informe seu CEP)";

static MARKETING_EXCERPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)(?:Descrição Detalhada|Descrição):\s*(.*?)\s*URL:")
        .expect("marketing excerpt regex is valid")
});

static LINE_BREAK_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\n\s*").expect("line break regex is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextStyle {
    /// Title, marketing excerpt and a key-spec block per item.
    Detailed,
    /// One-line specs plus the whitespace-normalized product content.
    Compact,
}

impl ContextStyle {
    pub fn for_strategy(strategy: RetrievalStrategy) -> Self {
        match strategy {
            RetrievalStrategy::VectorOnly => Self::Detailed,
            RetrievalStrategy::MetadataFirst => Self::Compact,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedCandidate {
    pub candidate: CandidateProduct,
    pub quote: Quote,
    pub sales_line: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
    pub text: String,
    pub products: Vec<PricedCandidate>,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

/// `Preço: R$x.xx` plus freight and stock when a postal code is known.
pub fn sales_line(quote: &Quote, postal_code: Option<&str>) -> String {
    let price = format!("Preço: R${:.2}", quote.price);
    match postal_code {
        Some(cep) if quote.in_stock => match quote.shipping_cost {
            Some(freight) => format!("{} | Frete para {}: R${:.2} | Em estoque", price, cep, freight),
            None => format!("{} | Frete para {}: indisponível no momento | Em estoque", price, cep),
        },
        Some(cep) => format!("{} | Indisponível para o CEP {}", price, cep),
        None => price + ASK_FOR_POSTAL_CODE,
    }
}

fn marketing_excerpt(content: &str) -> Option<&str> {
    MARKETING_EXCERPT
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
}

fn detailed_description(product: &CandidateProduct) -> String {
    let mut desc = String::from(product.title());
    if let Some(excerpt) = marketing_excerpt(&product.content) {
        desc.push_str("\n\n");
        desc.push_str(excerpt);
    }

    desc.push_str("\n\n--- Especificações Chave ---\n");
    if product.capacity > 0 {
        desc.push_str(&format!("Capacidade: {} BTUs\n", product.capacity));
    }
    for (label, value) in [
        ("Ciclo", &product.cycle),
        ("Tecnologia", &product.technology),
        ("Voltagem", &product.voltage),
        ("Tipo", &product.product_type),
    ] {
        if !value.is_empty() {
            desc.push_str(&format!("{}: {}\n", label, value));
        }
    }
    desc
}

pub struct ContextAssembler {
    pricing: Arc<dyn PricingProvider>,
    brands: Arc<BrandBoostPolicy>,
    style: ContextStyle,
    metrics: Arc<PipelineMetrics>,
}

impl ContextAssembler {
    pub fn new(
        pricing: Arc<dyn PricingProvider>,
        brands: Arc<BrandBoostPolicy>,
        style: ContextStyle,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            pricing,
            brands,
            style,
            metrics,
        }
    }

    pub fn style(&self) -> ContextStyle {
        self.style
    }

    /// Quote every product in rank order. With a postal code, products the
    /// quote reports as out of stock are dropped, and each dropped house-brand
    /// product is replaced in place by the next in-stock reserve entry.
    pub async fn price(
        &self,
        results: &RankedResultSet,
        postal_code: Option<&str>,
        deadline: &Deadline,
    ) -> Vec<PricedCandidate> {
        let mut reserve = results.reserve.iter();
        let mut priced = Vec::with_capacity(results.len());

        for product in &results.products {
            if let Some(shown) = self.price_one(product, postal_code, deadline).await {
                priced.push(shown);
                continue;
            }
            if !self.brands.is_house_brand(&product.brand) {
                continue;
            }
            for spare in reserve.by_ref() {
                if let Some(shown) = self.price_one(spare, postal_code, deadline).await {
                    tracing::debug!(
                        dropped = %product.product_id,
                        promoted = %spare.product_id,
                        "House-brand slot refilled from reserve"
                    );
                    priced.push(shown);
                    break;
                }
            }
        }
        priced
    }

    /// `None` when a postal code is known and the product is out of stock there.
    async fn price_one(
        &self,
        product: &CandidateProduct,
        postal_code: Option<&str>,
        deadline: &Deadline,
    ) -> Option<PricedCandidate> {
        let request = QuoteRequest::for_candidate(product, postal_code);
        let quote = match deadline.run("pricing", self.pricing.quote(&request)).await {
            Ok(quote) => quote,
            Err(e) => {
                tracing::warn!(product_id = %product.product_id, error = %e, "Pricing timed out, using catalog price");
                self.metrics.record_pricing_fallback();
                Quote::price_only(&request)
            }
        };

        let postal_code = request.postal_code.as_deref();
        if postal_code.is_some() && !quote.in_stock {
            tracing::debug!(product_id = %product.product_id, "Out of stock for postal code, dropping");
            return None;
        }

        let line = sales_line(&quote, postal_code);
        Some(PricedCandidate {
            candidate: product.clone(),
            quote,
            sales_line: line,
        })
    }

    pub async fn assemble(
        &self,
        intent: &SearchIntent,
        results: &RankedResultSet,
        deadline: &Deadline,
    ) -> AssembledContext {
        let products = self
            .price(results, intent.postal_code.as_deref(), deadline)
            .await;
        let text = self.render(intent, &products);
        tracing::info!(
            style = ?self.style,
            retrieved = results.len(),
            shown = products.len(),
            chars = text.len(),
            "Context assembled"
        );
        AssembledContext { text, products }
    }

    pub fn render(&self, intent: &SearchIntent, products: &[PricedCandidate]) -> String {
        if products.is_empty() {
            return NO_PRODUCTS_MESSAGE.to_string();
        }
        match self.style {
            ContextStyle::Detailed => render_detailed(intent, products),
            ContextStyle::Compact => render_compact(intent, products),
        }
    }
}

fn render_detailed(intent: &SearchIntent, products: &[PricedCandidate]) -> String {
    let mut out = String::new();
    if intent.is_calculated() {
        out.push_str(&format!(
            "SISTEMA: Com base nos dados (Área, Sol, Pessoas), o cálculo recomendado é de {} BTUs. Sugira produtos dessa capacidade.\n\n",
            intent.target_capacity
        ));
    }
    out.push_str(DETAILED_HEADER);

    for (i, priced) in products.iter().enumerate() {
        let product = &priced.candidate;
        out.push_str(&format!(
            "Item {}:\nDescrição: {}\nDados de Venda: {}\nLink do Produto: {}\nURL da Imagem: {}\n\n",
            i + 1,
            detailed_description(product),
            priced.sales_line,
            product.source_url,
            product.image_url
        ));
    }
    out
}

fn render_compact(intent: &SearchIntent, products: &[PricedCandidate]) -> String {
    let mut out = String::new();
    if intent.target_capacity > 0 {
        out.push_str(&format!(
            "SISTEMA: Capacidade considerada: {} BTUs.\n\n",
            intent.target_capacity
        ));
    }
    out.push_str(COMPACT_HEADER);

    for (i, priced) in products.iter().enumerate() {
        let product = &priced.candidate;
        let content = LINE_BREAK_WHITESPACE.replace_all(&product.content, "\n");
        out.push_str(&format!(
            "Item {}:\nProduto: {}\nMarca: {}\nSpecs: {} BTUs, {}, {}\nDados de Venda: {}\nLink: {}\nImagem: {}\nDescrição: {}\n\n",
            i + 1,
            product.title(),
            product.brand,
            product.capacity,
            product.cycle,
            product.technology,
            priced.sales_line,
            product.source_url,
            product.image_url,
            content.trim()
        ));
    }
    out
}
