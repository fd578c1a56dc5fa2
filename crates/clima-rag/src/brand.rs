//! Brand weighting for ranking.
//!
//! Weights multiply the vector distance, so a lower weight means a higher
//! priority. Priors are fixed per process; each request gets its own derived
//! table, never a mutated copy of shared state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::BrandConfig;
use crate::types::contains_ignore_case;

const DEFAULT_WEIGHT: f64 = 1.0;

/// Brand → distance multiplier in (0, 1]. Ordered by brand name so the
/// generated ranking expression is identical for identical inputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrandWeightTable {
    weights: BTreeMap<String, f64>,
}

impl BrandWeightTable {
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(b, w)| (b.as_str(), *w))
    }

    pub fn get(&self, brand: &str) -> Option<f64> {
        self.weights.get(brand).copied()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Weight applied to a product brand, mirroring the store's
    /// `CASE WHEN brand ILIKE '%b%' ...` evaluation: first table entry (in key
    /// order) contained in the product brand wins.
    pub fn weight_of(&self, product_brand: &str) -> f64 {
        self.weights
            .iter()
            .find(|(brand, _)| contains_ignore_case(product_brand, brand))
            .map(|(_, w)| *w)
            .unwrap_or(DEFAULT_WEIGHT)
    }
}

#[derive(Debug, Clone)]
pub struct BrandBoostPolicy {
    house_brand: String,
    boost_weight: f64,
    priors: BrandWeightTable,
    known_brands: Vec<String>,
}

impl BrandBoostPolicy {
    pub fn new(config: &BrandConfig) -> Self {
        let mut weights = BTreeMap::new();
        for (brand, weight) in &config.priors {
            weights.insert(brand.clone(), *weight);
        }
        weights.insert(config.house_brand.clone(), config.boost_weight);

        Self {
            house_brand: config.house_brand.clone(),
            boost_weight: config.boost_weight,
            priors: BrandWeightTable { weights },
            known_brands: config.known_brands.clone(),
        }
    }

    pub fn house_brand(&self) -> &str {
        &self.house_brand
    }

    pub fn is_house_brand(&self, brand: &str) -> bool {
        contains_ignore_case(brand, &self.house_brand)
    }

    pub fn priors(&self) -> &BrandWeightTable {
        &self.priors
    }

    /// Brands (priors first, then the wider known list) literally named in `text`.
    pub fn brands_mentioned(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        self.priors
            .weights
            .keys()
            .chain(self.known_brands.iter())
            .filter(|brand| mentions(&lower, brand))
            .cloned()
            .collect()
    }

    /// Derived table for one request. Every brand named in `query`, and the
    /// explicit brand filter if present, is raised to the house weight.
    pub fn table_for(&self, query: &str, explicit_brand: Option<&str>) -> BrandWeightTable {
        let mut table = self.priors.clone();

        for brand in self.brands_mentioned(query) {
            table.weights.insert(brand, self.boost_weight);
        }

        if let Some(explicit) = explicit_brand.map(str::trim).filter(|b| !b.is_empty()) {
            let existing = table
                .weights
                .keys()
                .find(|k| k.eq_ignore_ascii_case(explicit))
                .cloned();
            let key = existing.unwrap_or_else(|| explicit.to_string());
            table.weights.insert(key, self.boost_weight);
        }

        table
    }
}

/// Whole-word, case-insensitive brand match ("lg" must not fire inside "algum").
fn mentions(lower_text: &str, brand: &str) -> bool {
    let needle = brand.to_lowercase();
    if needle.is_empty() {
        return false;
    }
    lower_text.match_indices(&needle).any(|(start, _)| {
        let before = lower_text[..start].chars().next_back();
        let after = lower_text[start + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
