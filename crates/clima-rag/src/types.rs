use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Shipping dimensions as stored in the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub length: f32,
    pub weight: f32,
    pub width: f32,
    pub height: f32,
}

/// One product as returned by a catalog query. A product may be stored as
/// several content chunks; queries return it once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateProduct {
    pub product_id: String,
    pub brand: String,
    /// Capacity in BTU/h, 0 when ingestion could not extract it.
    pub capacity: u32,
    pub cycle: String,
    pub voltage: String,
    pub technology: String,
    pub product_type: String,
    pub content: String,
    /// `1 - cosine distance`; 0 for metadata-only matches.
    pub similarity: f32,
    pub sale_price: f32,
    pub dimensions: Dimensions,
    pub in_stock: bool,
    pub source_url: String,
    pub image_url: String,
}

impl CandidateProduct {
    /// Display name: the first line of the product content.
    pub fn title(&self) -> &str {
        self.content.lines().next().unwrap_or("").trim()
    }
}

/// Structured attributes recognized by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKey {
    Brand,
    Cycle,
    Voltage,
    Technology,
    Type,
    TypeExclude,
}

impl FilterKey {
    /// Catalog column the key matches against.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Brand => "brand",
            Self::Cycle => "ciclo",
            Self::Voltage => "voltagem",
            Self::Technology => "tecnologia",
            Self::Type | Self::TypeExclude => "type",
        }
    }

    pub fn is_negated(&self) -> bool {
        matches!(self, Self::TypeExclude)
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Brand => "brand",
            Self::Cycle => "cycle",
            Self::Voltage => "voltage",
            Self::Technology => "technology",
            Self::Type => "type",
            Self::TypeExclude => "type_exclude",
        };
        f.write_str(name)
    }
}

/// Typed attribute filters. Iteration order is fixed by `FilterKey`'s ordering
/// so generated queries are reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSet {
    entries: BTreeMap<FilterKey, String>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: FilterKey, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Empty values are ignored.
    pub fn set(&mut self, key: FilterKey, value: impl Into<String>) {
        let value = value.into();
        let value = value.trim();
        if !value.is_empty() {
            self.entries.insert(key, value.to_string());
        }
    }

    pub fn get(&self, key: FilterKey) -> Option<&str> {
        self.entries.get(&key).map(String::as_str)
    }

    pub fn contains(&self, key: FilterKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FilterKey, &str)> {
        self.entries.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Case-insensitive substring semantics, same as the catalog's `ILIKE '%v%'`.
    pub fn matches(&self, product: &CandidateProduct) -> bool {
        self.iter().all(|(key, value)| {
            let field = match key {
                FilterKey::Brand => &product.brand,
                FilterKey::Cycle => &product.cycle,
                FilterKey::Voltage => &product.voltage,
                FilterKey::Technology => &product.technology,
                FilterKey::Type | FilterKey::TypeExclude => &product.product_type,
            };
            let hit = contains_ignore_case(field, value);
            if key.is_negated() {
                !hit
            } else {
                hit
            }
        })
    }
}

/// Inclusive capacity band used by every catalog stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityRange {
    pub min: u32,
    pub max: u32,
}

impl CapacityRange {
    /// ±20 % around the target, truncated like the catalog's integer columns.
    pub fn around(target: u32) -> Option<Self> {
        if target == 0 {
            return None;
        }
        let min = (f64::from(target) * 0.8) as u32;
        let max = (f64::from(target) * 1.2) as u32;
        Some(Self { min, max })
    }

    pub fn contains(&self, capacity: u32) -> bool {
        capacity >= self.min && capacity <= self.max
    }
}

pub(crate) fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
