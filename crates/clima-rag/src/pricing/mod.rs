//! Price, freight and stock quotes for retrieved products.
//!
//! Quoting never fails: any remote problem degrades to the catalog price with
//! the catalog stock flag and no freight.

pub mod shipping;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{CandidateProduct, Dimensions};

pub use shipping::ShippingQuoteClient;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub product_id: String,
    pub postal_code: Option<String>,
    pub sale_price: f32,
    pub dimensions: Dimensions,
    /// Stock flag from the catalog row.
    pub in_stock: bool,
}

impl QuoteRequest {
    pub fn for_candidate(candidate: &CandidateProduct, postal_code: Option<&str>) -> Self {
        Self {
            product_id: candidate.product_id.clone(),
            postal_code: postal_code
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            sale_price: candidate.sale_price,
            dimensions: candidate.dimensions,
            in_stock: candidate.in_stock,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub product_id: String,
    pub price: f64,
    /// Freight for the request's postal code, when a logistics quote succeeded.
    pub shipping_cost: Option<f64>,
    pub in_stock: bool,
}

impl Quote {
    pub fn price_only(request: &QuoteRequest) -> Self {
        Self {
            product_id: request.product_id.clone(),
            price: f64::from(request.sale_price),
            shipping_cost: None,
            in_stock: request.in_stock,
        }
    }
}

#[async_trait]
pub trait PricingProvider: Send + Sync {
    async fn quote(&self, request: &QuoteRequest) -> Quote;

    fn name(&self) -> &str;
}

/// Catalog price and stock flag only.
#[derive(Debug, Clone, Copy, Default)]
pub struct CatalogPricing;

#[async_trait]
impl PricingProvider for CatalogPricing {
    async fn quote(&self, request: &QuoteRequest) -> Quote {
        Quote::price_only(request)
    }

    fn name(&self) -> &str {
        "catalog"
    }
}
