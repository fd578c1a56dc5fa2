//! Filter extraction delegated to a text model.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;

use super::rules;
use super::{FilterExtraction, FilterExtractor};
use crate::llm::{ChatRequest, TextModel};
use crate::types::{ChatMessage, FilterKey, FilterSet};

const EXTRACTION_PROMPT: &str = r#"Você é um especialista em extração de dados para e-commerce de ar condicionado.
Analise o texto do usuário (que pode conter histórico) e extraia os filtros de busca em formato JSON.

Regras de Extração:
1. **brand**: Marca do produto (ex: Samsung, LG, EOS, Midea, Gree, Electrolux, Daikin, Fujitsu, Springer, Carrier, Philco, Consul).
2. **btus**: Capacidade em BTUs (inteiro).
   - Se o usuário informar BTUs explicitamente (ex: "12000", "12k"), use esse valor.
   - Se informar área (m²) ou pessoas, CALCULE: (600 * m²) + (600 * pessoas extras acima de 2). Se tiver sol forte, use base 800 * m². Arredonde para o padrão comercial mais próximo (9000, 12000, 18000, 24000, etc).
3. **ciclo**: "Frio" ou "Quente/Frio".
4. **voltagem**: "110V" ou "220V".
5. **tecnologia**: "Inverter" ou "Convencional".
6. **type**: Tipo do aparelho. Valores aceitos: "Split", "Janela", "Portátil", "Cassete", "Piso Teto", "Multi Split".
   - Se não for especificado, assuma "Split".

Retorne APENAS o JSON com as chaves brand, btus, ciclo, voltagem, tecnologia e type, sem markdown."#;

/// Wire shape returned by the model. Every field is optional and lenient.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelFilters {
    #[serde(default, deserialize_with = "lenient_string")]
    pub brand: String,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub btus: u32,
    #[serde(default, deserialize_with = "lenient_string")]
    pub ciclo: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub voltagem: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub tecnologia: String,
    #[serde(default, rename = "type", deserialize_with = "lenient_string")]
    pub unit_type: String,
}

impl ModelFilters {
    fn into_extraction(self) -> FilterExtraction {
        let mut filters = FilterSet::new();
        filters.set(FilterKey::Brand, self.brand.trim());
        for (key, raw) in [
            (FilterKey::Cycle, &self.ciclo),
            (FilterKey::Voltage, &self.voltagem),
            (FilterKey::Technology, &self.tecnologia),
            (FilterKey::Type, &self.unit_type),
        ] {
            if !raw.trim().is_empty() {
                filters.set(key, rules::canonical_value(key, raw));
            }
        }
        FilterExtraction {
            filters,
            capacity: (self.btus > 0).then_some(self.btus),
        }
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .map(|v| v.min(u64::from(u32::MAX)) as u32)
            .unwrap_or(0),
        serde_json::Value::String(s) => {
            let digits: String = s.chars().filter(char::is_ascii_digit).collect();
            digits.parse().unwrap_or(0)
        }
        _ => 0,
    })
}

/// Parse the model's reply. Handles markdown fences and surrounding prose.
pub fn parse_model_filters(raw: &str) -> Result<ModelFilters> {
    let cleaned = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let json_str = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if end > start => &cleaned[start..=end],
        _ => cleaned,
    };

    serde_json::from_str::<ModelFilters>(json_str).with_context(|| {
        let preview: String = raw.chars().take(200).collect();
        format!("model returned unparseable filters: {}", preview)
    })
}

pub struct LlmFilterExtractor {
    model: Arc<dyn TextModel>,
}

impl LlmFilterExtractor {
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self { model }
    }

    fn request(expanded_query: &str) -> ChatRequest {
        ChatRequest::new(
            vec![
                ChatMessage::system(EXTRACTION_PROMPT),
                ChatMessage::user(expanded_query),
            ],
            0.0,
        )
        .json()
    }
}

#[async_trait]
impl FilterExtractor for LlmFilterExtractor {
    async fn extract(&self, expanded_query: &str) -> Result<FilterExtraction> {
        let raw = self
            .model
            .complete(&Self::request(expanded_query))
            .await
            .context("filter extraction call failed")?;
        let parsed = parse_model_filters(&raw)?;
        tracing::info!(
            model = self.model.model_name(),
            brand = %parsed.brand,
            btus = parsed.btus,
            unit_type = %parsed.unit_type,
            "Model filter extraction"
        );
        Ok(parsed.into_extraction())
    }

    fn name(&self) -> &'static str {
        "model"
    }
}
