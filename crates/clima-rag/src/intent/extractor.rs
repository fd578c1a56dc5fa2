use std::sync::Arc;
use std::time::Duration;

use super::reference::resolve_reference;
use super::rules::{self, EXPLICIT_MAX, EXPLICIT_MIN};
use super::{CapacitySource, FilterExtraction, FilterExtractor, RuleBasedExtractor, SearchIntent};
use crate::btu;
use crate::config::RetrievalConfig;
use crate::deadline::Deadline;
use crate::observability::PipelineMetrics;
use crate::session::CapacitySlotStore;
use crate::types::{ChatMessage, FilterKey, FilterSet, Role};

const EMPTY_QUERY_FALLBACK: &str = "ar condicionado";
const DEFAULT_TYPE: &str = "Split";
const GENERIC_EXCLUDED_TYPE: &str = "Multi Split";

pub struct IntentExtractor {
    rules: RuleBasedExtractor,
    model: Option<Arc<dyn FilterExtractor>>,
    slots: Arc<dyn CapacitySlotStore>,
    history_turns_rules: usize,
    history_turns_model: usize,
    capacity_ttl: Duration,
    metrics: Arc<PipelineMetrics>,
}

impl IntentExtractor {
    /// Rule-based extractor. Use [`IntentExtractor::with_model`] to delegate
    /// filter extraction to a text model.
    pub fn new(
        slots: Arc<dyn CapacitySlotStore>,
        config: &RetrievalConfig,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            rules: RuleBasedExtractor,
            model: None,
            slots,
            history_turns_rules: config.intent.history_turns_rules,
            history_turns_model: config.intent.history_turns_model,
            capacity_ttl: config.capacity_ttl(),
            metrics,
        }
    }

    pub fn with_model(mut self, model: Arc<dyn FilterExtractor>) -> Self {
        self.model = Some(model);
        self
    }

    fn history_turns(&self) -> usize {
        if self.model.is_some() {
            self.history_turns_model
        } else {
            self.history_turns_rules
        }
    }

    pub async fn extract(
        &self,
        conversation_id: &str,
        message: &str,
        history: &[ChatMessage],
        deadline: &Deadline,
    ) -> SearchIntent {
        let resolved = resolve_reference(message, history);
        if resolved != message {
            tracing::info!(original = message, resolved = %resolved, "Item reference resolved");
        }

        let mut expanded = expand_query(history, &resolved, self.history_turns());
        let sticky = self.slot_get(conversation_id, deadline).await;

        let (target_capacity, capacity_source, filters) = match &self.model {
            Some(model) => {
                let outcome = match deadline.run("intent extraction", model.extract(&expanded)).await {
                    Ok(result) => result,
                    Err(timeout) => Err(anyhow::Error::new(timeout)),
                };
                match outcome {
                    Ok(extraction) => {
                        self.apply_model(conversation_id, &resolved, &expanded, extraction, sticky, deadline)
                            .await
                    }
                    Err(e) => {
                        tracing::warn!(
                            extractor = model.name(),
                            error = %format!("{:#}", e),
                            "Model filter extraction failed, falling back to rules"
                        );
                        self.metrics.record_model_extraction_failure();
                        self.apply_rules(conversation_id, &resolved, &mut expanded, sticky, deadline)
                            .await
                    }
                }
            }
            None => {
                self.apply_rules(conversation_id, &resolved, &mut expanded, sticky, deadline)
                    .await
            }
        };

        let postal_code = rules::postal_code(&expanded);

        tracing::info!(
            conversation_id = conversation_id,
            target_capacity = target_capacity,
            capacity_source = ?capacity_source,
            filters = filters.len(),
            has_postal_code = postal_code.is_some(),
            "Search intent extracted"
        );

        SearchIntent {
            raw_message: message.to_string(),
            resolved_message: resolved,
            expanded_query: expanded,
            target_capacity,
            capacity_source,
            filters,
            postal_code,
        }
    }

    async fn apply_rules(
        &self,
        conversation_id: &str,
        resolved: &str,
        expanded: &mut String,
        sticky: Option<u32>,
        deadline: &Deadline,
    ) -> (u32, CapacitySource, FilterSet) {
        let (capacity, source) = if let Some(explicit) = rules::explicit_capacity(resolved) {
            if let Some(previous) = sticky.filter(|p| *p != explicit) {
                tracing::info!(
                    previous = previous,
                    explicit = explicit,
                    "Explicit capacity overrides the sticky value"
                );
            }
            self.slot_set(conversation_id, explicit, deadline).await;
            (explicit, CapacitySource::Explicit)
        } else if let Some(calculated) = self.recalculate(resolved, expanded, sticky) {
            self.slot_set(conversation_id, calculated, deadline).await;
            expanded.push_str(&format!(" ar condicionado {} btus", calculated));
            (calculated, CapacitySource::Calculated)
        } else if let Some(previous) = sticky {
            (previous, CapacitySource::Sticky)
        } else if let Some(earlier) = rules::explicit_capacity(expanded) {
            (earlier, CapacitySource::Explicit)
        } else {
            (0, CapacitySource::None)
        };

        let mut filters = self.rules.filters(expanded);
        if source == CapacitySource::Calculated {
            filters.set(FilterKey::Type, DEFAULT_TYPE);
        }
        if !filters.contains(FilterKey::Type) {
            filters.set(FilterKey::TypeExclude, GENERIC_EXCLUDED_TYPE);
        }

        (capacity, source, filters)
    }

    /// Calculator inputs are read from the whole expanded query, but only
    /// when there is no sticky value or the current message adds new inputs.
    fn recalculate(&self, resolved: &str, expanded: &str, sticky: Option<u32>) -> Option<u32> {
        if sticky.is_some() && !rules::mentions_calculation_inputs(resolved) {
            return None;
        }
        let inputs = rules::calculation_inputs(expanded)?;
        let capacity = inputs.capacity();
        tracing::info!(
            area_m2 = inputs.area_m2,
            sun = ?inputs.sun,
            people = inputs.people,
            capacity = capacity,
            "Capacity calculated"
        );
        Some(capacity)
    }

    async fn apply_model(
        &self,
        conversation_id: &str,
        resolved: &str,
        expanded: &str,
        extraction: FilterExtraction,
        sticky: Option<u32>,
        deadline: &Deadline,
    ) -> (u32, CapacitySource, FilterSet) {
        let FilterExtraction {
            mut filters,
            capacity,
        } = extraction;

        let (capacity, source) = match capacity {
            Some(reported) => {
                let capacity = if (EXPLICIT_MIN..=EXPLICIT_MAX).contains(&reported) {
                    reported
                } else {
                    btu::nearest_ladder_value(reported)
                };
                self.slot_set(conversation_id, capacity, deadline).await;
                let calculated = rules::explicit_capacity(resolved).is_none()
                    && rules::calculation_inputs(expanded).is_some();
                let source = if calculated {
                    CapacitySource::Calculated
                } else {
                    CapacitySource::Explicit
                };
                (capacity, source)
            }
            None => match sticky {
                Some(previous) => (previous, CapacitySource::Sticky),
                None => (0, CapacitySource::None),
            },
        };

        if !filters.contains(FilterKey::Type) {
            filters.set(FilterKey::Type, DEFAULT_TYPE);
            filters.set(FilterKey::TypeExclude, GENERIC_EXCLUDED_TYPE);
        }

        (capacity, source, filters)
    }

    /// Drop the sticky capacity of a finished conversation.
    pub async fn forget(&self, conversation_id: &str, deadline: &Deadline) {
        match deadline
            .run("capacity slot clear", self.slots.clear(conversation_id))
            .await
        {
            Ok(Ok(())) => tracing::debug!(conversation_id = conversation_id, "Capacity slot cleared"),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Capacity slot clear failed");
                self.metrics.record_slot_store_failure();
            }
            Err(e) => {
                tracing::warn!(error = %e, "Capacity slot clear timed out");
                self.metrics.record_slot_store_failure();
            }
        }
    }

    async fn slot_get(&self, conversation_id: &str, deadline: &Deadline) -> Option<u32> {
        match deadline
            .run("capacity slot read", self.slots.get(conversation_id))
            .await
        {
            Ok(Ok(value)) => value.filter(|v| *v > 0),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Capacity slot read failed");
                self.metrics.record_slot_store_failure();
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Capacity slot read timed out");
                self.metrics.record_slot_store_failure();
                None
            }
        }
    }

    async fn slot_set(&self, conversation_id: &str, capacity: u32, deadline: &Deadline) {
        let write = self.slots.set(conversation_id, capacity, self.capacity_ttl);
        match deadline.run("capacity slot write", write).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Capacity slot write failed");
                self.metrics.record_slot_store_failure();
            }
            Err(e) => {
                tracing::warn!(error = %e, "Capacity slot write timed out");
                self.metrics.record_slot_store_failure();
            }
        }
    }
}

/// The last `turns` user messages, oldest first, followed by `message`.
pub fn expand_query(history: &[ChatMessage], message: &str, turns: usize) -> String {
    let mut recent: Vec<&str> = history
        .iter()
        .rev()
        .filter(|m| m.role == Role::User)
        .take(turns)
        .map(|m| m.content.trim())
        .collect();
    recent.reverse();
    recent.push(message.trim());

    let expanded = recent
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if expanded.is_empty() {
        EMPTY_QUERY_FALLBACK.to_string()
    } else {
        expanded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySlotStore;
    use anyhow::Result;
    use async_trait::async_trait;

    struct Fixture {
        extractor: IntentExtractor,
        slots: Arc<MemorySlotStore>,
        metrics: Arc<PipelineMetrics>,
    }

    fn fixture() -> Fixture {
        let config = RetrievalConfig::default();
        let slots = Arc::new(MemorySlotStore::new());
        let metrics = Arc::new(PipelineMetrics::new());
        let extractor = IntentExtractor::new(slots.clone(), &config, metrics.clone());
        Fixture {
            extractor,
            slots,
            metrics,
        }
    }

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_explicit_capacity_scenario() {
        let f = fixture();
        let intent = f
            .extractor
            .extract("c1", "preciso de um ar 12000 split inverter", &[], &deadline())
            .await;

        assert_eq!(intent.target_capacity, 12000);
        assert_eq!(intent.capacity_source, CapacitySource::Explicit);
        assert_eq!(intent.filters.get(FilterKey::Technology), Some("Inverter"));
        assert_eq!(intent.filters.get(FilterKey::Type), Some("Split"));
        assert!(!intent.filters.contains(FilterKey::TypeExclude));
        assert_eq!(f.slots.get("c1").await.unwrap(), Some(12000));
    }

    #[tokio::test]
    async fn test_calculated_then_sticky_scenario() {
        let f = fixture();
        let first_message = "tenho 20m2, sol da tarde, 3 pessoas";
        let first = f
            .extractor
            .extract("c1", first_message, &[], &deadline())
            .await;

        assert_eq!(first.target_capacity, 18000);
        assert_eq!(first.capacity_source, CapacitySource::Calculated);
        assert_eq!(first.filters.get(FilterKey::Type), Some("Split"));
        assert!(first.expanded_query.ends_with(" ar condicionado 18000 btus"));
        assert_eq!(f.slots.get("c1").await.unwrap(), Some(18000));

        let history = vec![
            ChatMessage::user(first_message),
            ChatMessage::assistant("Recomendo 18000 BTUs."),
        ];
        let follow_up = f
            .extractor
            .extract("c1", "e 220v?", &history, &deadline())
            .await;

        assert_eq!(follow_up.target_capacity, 18000);
        assert_eq!(follow_up.capacity_source, CapacitySource::Sticky);
        assert_eq!(follow_up.filters.get(FilterKey::Voltage), Some("220V"));
        assert_eq!(
            follow_up.filters.get(FilterKey::TypeExclude),
            Some("Multi Split")
        );
    }

    #[tokio::test]
    async fn test_explicit_overrides_calculated() {
        let f = fixture();
        f.slots
            .set("c1", 18000, Duration::from_secs(1200))
            .await
            .unwrap();
        let history = vec![ChatMessage::user("tenho 20m2, sol da tarde, 3 pessoas")];
        let intent = f
            .extractor
            .extract("c1", "na verdade quero 24 mil", &history, &deadline())
            .await;

        assert_eq!(intent.target_capacity, 24000);
        assert_eq!(intent.capacity_source, CapacitySource::Explicit);
        assert_eq!(f.slots.get("c1").await.unwrap(), Some(24000));
    }

    #[tokio::test]
    async fn test_expired_slot_recalculates_from_history() {
        let f = fixture();
        let history = vec![ChatMessage::user("sala de 10 m2 sol da manhã")];
        let intent = f
            .extractor
            .extract("c1", "tem inverter?", &history, &deadline())
            .await;

        assert_eq!(intent.capacity_source, CapacitySource::Calculated);
        assert_eq!(intent.target_capacity, 7500);
    }

    #[tokio::test]
    async fn test_earlier_explicit_capacity_is_last_resort() {
        let f = fixture();
        let history = vec![ChatMessage::user("quero um 9000")];
        let intent = f
            .extractor
            .extract("c2", "tem da LG?", &history, &deadline())
            .await;

        assert_eq!(intent.target_capacity, 9000);
        assert_eq!(intent.capacity_source, CapacitySource::Explicit);
        assert!(!intent.filters.contains(FilterKey::Brand));
    }

    #[tokio::test]
    async fn test_postal_code_does_not_replace_sticky_capacity() {
        let f = fixture();
        let first_message = "tenho 20m2, sol da tarde, 3 pessoas";
        let first = f.extractor.extract("c5", first_message, &[], &deadline()).await;
        assert_eq!(first.target_capacity, 18000);

        let mut history = vec![
            ChatMessage::user(first_message),
            ChatMessage::assistant("Recomendo 18000 BTUs."),
        ];
        let second = f
            .extractor
            .extract("c5", "meu cep é 13010-000", &history, &deadline())
            .await;
        assert_eq!(second.target_capacity, 18000);
        assert_eq!(second.capacity_source, CapacitySource::Sticky);
        assert_eq!(second.postal_code.as_deref(), Some("13010-000"));
        assert_eq!(f.slots.get("c5").await.unwrap(), Some(18000));

        history.push(ChatMessage::user("meu cep é 13010-000"));
        history.push(ChatMessage::assistant("Obrigado!"));
        let third = f.extractor.extract("c5", "e 220v?", &history, &deadline()).await;
        assert_eq!(third.target_capacity, 18000);
        assert_eq!(third.capacity_source, CapacitySource::Sticky);
    }

    #[tokio::test]
    async fn test_forget_clears_sticky_capacity() {
        let f = fixture();
        f.extractor
            .extract("c6", "tenho 20m2, sol da tarde", &[], &deadline())
            .await;
        assert!(f.slots.get("c6").await.unwrap().is_some());

        f.extractor.forget("c6", &deadline()).await;
        let intent = f.extractor.extract("c6", "tem inverter?", &[], &deadline()).await;
        assert_eq!(intent.capacity_source, CapacitySource::None);
    }

    #[tokio::test]
    async fn test_no_capacity() {
        let f = fixture();
        let intent = f
            .extractor
            .extract("c3", "qual o melhor ar?", &[], &deadline())
            .await;
        assert_eq!(intent.target_capacity, 0);
        assert_eq!(intent.capacity_source, CapacitySource::None);
        assert!(intent.postal_code.is_none());
    }

    #[tokio::test]
    async fn test_postal_code_from_history() {
        let f = fixture();
        let history = vec![ChatMessage::user("meu cep é 88010-000")];
        let intent = f
            .extractor
            .extract("c4", "split 12000", &history, &deadline())
            .await;
        assert_eq!(intent.postal_code.as_deref(), Some("88010-000"));
    }

    struct FailingExtractor;

    #[async_trait]
    impl FilterExtractor for FailingExtractor {
        async fn extract(&self, _expanded_query: &str) -> Result<FilterExtraction> {
            anyhow::bail!("model unavailable")
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    struct FixedExtractor(FilterExtraction);

    #[async_trait]
    impl FilterExtractor for FixedExtractor {
        async fn extract(&self, _expanded_query: &str) -> Result<FilterExtraction> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn test_model_failure_falls_back_to_rules() {
        let f = fixture();
        let extractor = f.extractor.with_model(Arc::new(FailingExtractor));
        let intent = extractor
            .extract("c1", "preciso de um ar 12000 split inverter", &[], &deadline())
            .await;

        assert_eq!(intent.target_capacity, 12000);
        assert_eq!(intent.filters.get(FilterKey::Technology), Some("Inverter"));
        assert_eq!(f.metrics.snapshot().model_extraction_failures, 1);
    }

    #[tokio::test]
    async fn test_model_capacity_overwrites_slot_and_defaults_type() {
        let f = fixture();
        let extraction = FilterExtraction {
            filters: FilterSet::new().with(FilterKey::Brand, "Gree"),
            capacity: Some(17000),
        };
        let extractor = f
            .extractor
            .with_model(Arc::new(FixedExtractor(extraction)));
        let intent = extractor
            .extract("c1", "um gree de 17000", &[], &deadline())
            .await;

        assert_eq!(intent.target_capacity, 17000);
        assert_eq!(intent.capacity_source, CapacitySource::Explicit);
        assert_eq!(intent.filters.get(FilterKey::Type), Some("Split"));
        assert_eq!(intent.filters.get(FilterKey::TypeExclude), Some("Multi Split"));
        assert_eq!(f.slots.get("c1").await.unwrap(), Some(17000));
    }

    #[tokio::test]
    async fn test_model_without_capacity_uses_slot() {
        let f = fixture();
        f.slots
            .set("c1", 12000, Duration::from_secs(1200))
            .await
            .unwrap();
        let extractor = f
            .extractor
            .with_model(Arc::new(FixedExtractor(FilterExtraction::default())));
        let intent = extractor.extract("c1", "e quente e frio?", &[], &deadline()).await;
        assert_eq!(intent.target_capacity, 12000);
        assert_eq!(intent.capacity_source, CapacitySource::Sticky);
    }

    #[test]
    fn test_expand_query_takes_recent_user_turns() {
        let history = vec![
            ChatMessage::user("um"),
            ChatMessage::assistant("resposta"),
            ChatMessage::user("dois"),
            ChatMessage::user("três"),
            ChatMessage::user("quatro"),
        ];
        assert_eq!(expand_query(&history, "cinco", 3), "dois três quatro cinco");
        assert_eq!(expand_query(&[], "  ", 3), "ar condicionado");
    }
}
