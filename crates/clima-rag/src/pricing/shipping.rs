//! Remote freight and stock quotes from the logistics service.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::{PricingProvider, Quote, QuoteRequest};
use crate::config::PricingConfig;
use crate::http;
use crate::observability::PipelineMetrics;

const UNAVAILABLE_LOCATION: &str = "UNAVAILABLE";
const COUNTRY: &str = "BR";

pub struct ShippingQuoteClient {
    client: Client,
    lookup_client: Client,
    shipping_url: String,
    address_lookup_url: String,
    fallback_state: String,
    product_type: String,
    metrics: Arc<PipelineMetrics>,
}

impl ShippingQuoteClient {
    pub fn new(config: &PricingConfig, metrics: Arc<PipelineMetrics>) -> Result<Self> {
        anyhow::ensure!(
            !config.shipping_url.trim().is_empty(),
            "missing logistics quote endpoint"
        );
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        Ok(Self {
            client: http::build_client(None, timeout)?,
            lookup_client: http::build_client(Some(&config.address_lookup_token), timeout)?,
            shipping_url: config.shipping_url.clone(),
            address_lookup_url: config.address_lookup_url.clone(),
            fallback_state: config.fallback_state.clone(),
            product_type: config.product_type.clone(),
            metrics,
        })
    }

    /// State abbreviation for a postal code, `None` when the lookup is not
    /// configured or fails.
    async fn lookup_state(&self, postal_code: &str) -> Option<String> {
        if self.address_lookup_url.trim().is_empty() {
            return None;
        }
        let url = self.address_lookup_url.replace("{cep}", postal_code);
        let result: Result<AddressLookupResponse> = async {
            let resp = self
                .lookup_client
                .get(&url)
                .send()
                .await
                .with_context(|| format!("request to {} failed", url))?;
            let status = resp.status();
            anyhow::ensure!(status.is_success(), "address lookup returned {}", status);
            http::parse_json_response(resp, &url).await
        }
        .await;

        match result {
            Ok(lookup) if lookup.success => lookup
                .result
                .map(|address| address.state_abbreviation)
                .filter(|s| !s.trim().is_empty()),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(postal_code = postal_code, error = %e, "Address lookup failed");
                None
            }
        }
    }

    fn payload<'a>(&'a self, request: &'a QuoteRequest, postal_code: &'a str, state: &'a str) -> ShippingPayload<'a> {
        ShippingPayload {
            address: ShippingAddress {
                country: COUNTRY,
                postal_code,
                state,
            },
            items: vec![ShippingItem {
                id: &request.product_id,
                qtd: 1,
                width: request.dimensions.width,
                height: request.dimensions.height,
                weight: request.dimensions.weight,
                length: request.dimensions.length,
                price: request.sale_price,
                product_type: &self.product_type,
            }],
        }
    }

    async fn remote_quote(&self, request: &QuoteRequest, postal_code: &str) -> Result<Quote> {
        let state = self
            .lookup_state(postal_code)
            .await
            .unwrap_or_else(|| self.fallback_state.clone());
        let payload = self.payload(request, postal_code, &state);

        let resp = self
            .client
            .post(&self.shipping_url)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("request to {} failed", self.shipping_url))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            anyhow::bail!("logistics quote failed ({}): {}", status, body);
        }
        let parsed: ShippingResponse = http::parse_json_response(resp, &self.shipping_url).await?;
        interpret(request, parsed)
    }
}

/// First shipping group decides: an unavailable location means out of stock,
/// otherwise the first method's cost is the freight.
fn interpret(request: &QuoteRequest, response: ShippingResponse) -> Result<Quote> {
    let group = response
        .shipping_groups
        .into_iter()
        .next()
        .context("logistics response contained no shipping groups")?;

    let price = f64::from(request.sale_price);
    if group.location_id == UNAVAILABLE_LOCATION {
        return Ok(Quote {
            product_id: request.product_id.clone(),
            price,
            shipping_cost: None,
            in_stock: false,
        });
    }

    let method = group
        .shipping_methods
        .methods
        .into_iter()
        .next()
        .context("logistics response contained no shipping methods")?;
    Ok(Quote {
        product_id: request.product_id.clone(),
        price,
        shipping_cost: Some(method.shipping_cost),
        in_stock: true,
    })
}

#[async_trait]
impl PricingProvider for ShippingQuoteClient {
    async fn quote(&self, request: &QuoteRequest) -> Quote {
        let Some(postal_code) = request.postal_code.as_deref() else {
            return Quote::price_only(request);
        };

        match self.remote_quote(request, postal_code).await {
            Ok(quote) => {
                tracing::debug!(
                    product_id = %quote.product_id,
                    in_stock = quote.in_stock,
                    shipping_cost = ?quote.shipping_cost,
                    "Logistics quote"
                );
                quote
            }
            Err(e) => {
                tracing::warn!(
                    product_id = %request.product_id,
                    error = %format!("{:#}", e),
                    "Logistics quote failed, using catalog price"
                );
                self.metrics.record_pricing_fallback();
                Quote::price_only(request)
            }
        }
    }

    fn name(&self) -> &str {
        "logistics"
    }
}

#[derive(Serialize)]
struct ShippingPayload<'a> {
    address: ShippingAddress<'a>,
    items: Vec<ShippingItem<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ShippingAddress<'a> {
    country: &'a str,
    postal_code: &'a str,
    state: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ShippingItem<'a> {
    id: &'a str,
    qtd: u32,
    width: f32,
    height: f32,
    weight: f32,
    length: f32,
    price: f32,
    product_type: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShippingResponse {
    #[serde(default)]
    shipping_groups: Vec<ShippingGroup>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShippingGroup {
    #[serde(default)]
    location_id: String,
    #[serde(default)]
    shipping_methods: ShippingMethods,
}

#[derive(Debug, Default, Deserialize)]
struct ShippingMethods {
    #[serde(default)]
    methods: Vec<ShippingMethod>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShippingMethod {
    #[serde(default)]
    shipping_cost: f64,
}

#[derive(Debug, Deserialize)]
struct AddressLookupResponse {
    #[serde(default)]
    success: bool,
    result: Option<AddressData>,
}

#[derive(Debug, Deserialize)]
struct AddressData {
    #[serde(rename = "stateAbreviation", default)]
    state_abbreviation: String,
}
