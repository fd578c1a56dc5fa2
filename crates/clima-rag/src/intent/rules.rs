//! Keyword and pattern rules for Portuguese shopping messages.

use regex::Regex;
use std::sync::LazyLock;

use crate::btu::{self, SunExposure, DEFAULT_PEOPLE};
use crate::types::{FilterKey, FilterSet};

/// Explicit numeric capacities accepted as stated.
pub const EXPLICIT_MIN: u32 = 7_000;
pub const EXPLICIT_MAX: u32 = 80_000;

static NUMERIC_CAPACITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,3})\.?(\d{3})(?:\b|btu)").expect("numeric capacity regex is valid")
});

static SHORTHAND_CAPACITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})\s*(?:k|mil)\b").expect("shorthand capacity regex is valid")
});

static AREA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s*(?:m²|m2|metros|mts|mt)").expect("area regex is valid")
});

static SUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:sol\s*(?:da\s*)?)?(manh[ãa]|tarde)\b").expect("sun regex is valid")
});

static PEOPLE_SUFFIXED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,3})\s*(?:pessoas?|pess|p)\b").expect("people regex is valid")
});

static PEOPLE_BARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})\b").expect("bare people regex is valid"));

static POSTAL_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{5}-?\d{3}\b").expect("postal code regex is valid"));

/// Capacity literally stated in `text`: "12000", "12.000", "12000btus", "12k",
/// "12 mil". Values outside the sanity band are ignored.
/// Postal codes are blanked out first: "13010-000" is not a capacity.
pub fn explicit_capacity(text: &str) -> Option<u32> {
    let in_band = |v: u32| (EXPLICIT_MIN..=EXPLICIT_MAX).contains(&v);
    let text = POSTAL_CODE.replace_all(text, " ");
    let text = text.as_ref();

    let numeric = NUMERIC_CAPACITY.captures_iter(text).find_map(|caps| {
        let digits = format!("{}{}", &caps[1], &caps[2]);
        digits.parse::<u32>().ok().filter(|v| in_band(*v))
    });
    if numeric.is_some() {
        return numeric;
    }

    SHORTHAND_CAPACITY.captures_iter(text).find_map(|caps| {
        caps[1]
            .parse::<u32>()
            .ok()
            .map(|v| v * 1000)
            .filter(|v| in_band(*v))
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalculationInputs {
    pub area_m2: f64,
    pub sun: SunExposure,
    pub people: u32,
}

impl CalculationInputs {
    pub fn capacity(&self) -> u32 {
        btu::calculate_for_exposure(self.area_m2, self.sun, self.people)
    }
}

/// Area and sun exposure are both required; occupancy defaults to two.
pub fn calculation_inputs(text: &str) -> Option<CalculationInputs> {
    let area_caps = AREA.captures(text)?;
    let sun_caps = SUN.captures(text)?;

    let area_m2: f64 = area_caps[1].replacen(',', ".", 1).parse().ok()?;
    let sun = SunExposure::classify(&sun_caps[1]);

    let whole_area = area_caps.get(0)?;
    let mut rest = String::with_capacity(text.len());
    rest.push_str(&text[..whole_area.start()]);
    rest.push(' ');
    rest.push_str(&text[whole_area.end()..]);

    let people = PEOPLE_SUFFIXED
        .captures(&rest)
        .or_else(|| PEOPLE_BARE.captures(&rest))
        .and_then(|caps| caps[1].parse::<u32>().ok())
        .filter(|p| *p > 0)
        .unwrap_or(DEFAULT_PEOPLE);

    Some(CalculationInputs {
        area_m2,
        sun,
        people,
    })
}

/// Whether `text` carries any calculator input on its own.
pub fn mentions_calculation_inputs(text: &str) -> bool {
    AREA.is_match(text) || SUN.is_match(text)
}

pub fn postal_code(text: &str) -> Option<String> {
    POSTAL_CODE.find(text).map(|m| m.as_str().to_string())
}

pub fn technology(lower: &str) -> Option<&'static str> {
    if lower.contains("inverter") {
        Some("Inverter")
    } else if lower.contains("on/off") || lower.contains("convencional") {
        Some("Convencional")
    } else {
        None
    }
}

pub fn cycle(lower: &str) -> Option<&'static str> {
    if lower.contains("quente e frio") || lower.contains("quente/frio") {
        Some("Quente/Frio")
    } else if lower.contains("só frio") || (lower.contains("frio") && !lower.contains("quente")) {
        Some("Frio")
    } else {
        None
    }
}

pub fn voltage(lower: &str) -> Option<&'static str> {
    if lower.contains("220v") || lower.contains("220 v") {
        Some("220V")
    } else if lower.contains("110v") || lower.contains("110 v") || lower.contains("127v") {
        Some("110V")
    } else {
        None
    }
}

pub fn unit_type(lower: &str) -> Option<&'static str> {
    const TYPES: [(&[&str], &str); 6] = [
        (&["multi split", "multisplit"], "Multi Split"),
        (&["janela"], "Janela"),
        (&["piso teto"], "Piso Teto"),
        (&["cassete"], "Cassete"),
        (&["portátil", "portatil"], "Portátil"),
        (&["split"], "Split"),
    ];
    TYPES
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| lower.contains(n)))
        .map(|(_, value)| *value)
}

/// Map a free-form attribute value onto the catalog's display string, or
/// keep it trimmed when no rule recognizes it.
pub fn canonical_value(key: FilterKey, raw: &str) -> String {
    let lower = raw.to_lowercase();
    let known = match key {
        FilterKey::Technology => technology(&lower),
        FilterKey::Cycle => cycle(&lower),
        FilterKey::Voltage => voltage(&lower),
        FilterKey::Type | FilterKey::TypeExclude => unit_type(&lower),
        FilterKey::Brand => None,
    };
    known.map(str::to_string).unwrap_or_else(|| raw.trim().to_string())
}

/// Attribute filters named in `text`. No type defaulting happens here, and
/// brand names never become filters: they only raise the brand's weight.
pub fn extract_filters(text: &str) -> FilterSet {
    let lower = text.to_lowercase();
    let mut filters = FilterSet::new();

    if let Some(v) = technology(&lower) {
        filters.set(FilterKey::Technology, v);
    }
    if let Some(v) = cycle(&lower) {
        filters.set(FilterKey::Cycle, v);
    }
    if let Some(v) = voltage(&lower) {
        filters.set(FilterKey::Voltage, v);
    }
    if let Some(v) = unit_type(&lower) {
        filters.set(FilterKey::Type, v);
    }

    filters
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_capacity_forms() {
        assert_eq!(explicit_capacity("preciso de um ar 12000 split"), Some(12000));
        assert_eq!(explicit_capacity("um de 12.000 btus"), Some(12000));
        assert_eq!(explicit_capacity("quero 9000btus"), Some(9000));
        assert_eq!(explicit_capacity("algo de 18k"), Some(18000));
        assert_eq!(explicit_capacity("uns 24 mil"), Some(24000));
        assert_eq!(explicit_capacity("24 MIL btus"), Some(24000));
    }

    #[test]
    fn test_explicit_capacity_sanity_band() {
        assert_eq!(explicit_capacity("custa 2.500 reais"), None);
        assert_eq!(explicit_capacity("cep 88010-000"), None);
        assert_eq!(explicit_capacity("2 mil reais"), None);
        assert_eq!(explicit_capacity("tenho 20m2"), None);
        // First in-band value wins.
        assert_eq!(explicit_capacity("cep 88010-000, 12000"), Some(12000));
    }

    #[test]
    fn test_postal_code_is_not_a_capacity() {
        assert_eq!(explicit_capacity("meu cep é 13010-000"), None);
        assert_eq!(explicit_capacity("cep 13010000"), None);
        assert_eq!(explicit_capacity("cep 24020-010, quero 18000"), Some(18000));
        assert_eq!(explicit_capacity("12000 btus, cep 13010-000"), Some(12000));
    }

    #[test]
    fn test_calculation_inputs() {
        let inputs = calculation_inputs("tenho 20m2, sol da tarde, 3 pessoas").unwrap();
        assert_eq!(inputs.area_m2, 20.0);
        assert_eq!(inputs.sun, SunExposure::Afternoon);
        assert_eq!(inputs.people, 3);
        assert_eq!(inputs.capacity(), 18000);
    }

    #[test]
    fn test_calculation_defaults_and_decimal_area() {
        let inputs = calculation_inputs("quarto de 12,5 m² sol da manhã").unwrap();
        assert_eq!(inputs.area_m2, 12.5);
        assert_eq!(inputs.sun, SunExposure::Other);
        assert_eq!(inputs.people, DEFAULT_PEOPLE);
    }

    #[test]
    fn test_calculation_requires_sun() {
        assert!(calculation_inputs("sala de 30 metros").is_none());
        assert!(calculation_inputs("sol da tarde").is_none());
        assert!(mentions_calculation_inputs("sol da tarde"));
        assert!(!mentions_calculation_inputs("e 220v?"));
    }

    #[test]
    fn test_people_ignores_capacity_numbers() {
        let inputs =
            calculation_inputs("preciso de um ar 12000, 15m2 sol da tarde 4 pessoas").unwrap();
        assert_eq!(inputs.people, 4);
    }

    #[test]
    fn test_filters() {
        let filters = extract_filters("Preciso de um ar 12000 Split Inverter");
        assert_eq!(filters.get(FilterKey::Technology), Some("Inverter"));
        assert_eq!(filters.get(FilterKey::Type), Some("Split"));
        assert!(!filters.contains(FilterKey::Cycle));

        let filters = extract_filters("multi split quente e frio 220 v da samsung");
        assert_eq!(filters.get(FilterKey::Type), Some("Multi Split"));
        assert_eq!(filters.get(FilterKey::Cycle), Some("Quente/Frio"));
        assert_eq!(filters.get(FilterKey::Voltage), Some("220V"));
        assert!(!filters.contains(FilterKey::Brand));
    }

    #[test]
    fn test_cycle_frio_only_without_quente() {
        assert_eq!(cycle("só frio"), Some("Frio"));
        assert_eq!(cycle("frio"), Some("Frio"));
        assert_eq!(cycle("quente frio"), None);
    }

    #[test]
    fn test_voltage_127_maps_to_110() {
        assert_eq!(voltage("tomada 127v"), Some("110V"));
    }

    #[test]
    fn test_canonical_value() {
        assert_eq!(canonical_value(FilterKey::Cycle, "quente e frio"), "Quente/Frio");
        assert_eq!(canonical_value(FilterKey::Type, "portatil"), "Portátil");
        assert_eq!(canonical_value(FilterKey::Brand, " Daikin "), "Daikin");
    }

    #[test]
    fn test_postal_code() {
        assert_eq!(postal_code("meu cep é 88010-000"), Some("88010-000".to_string()));
        assert_eq!(postal_code("cep 01310100"), Some("01310100".to_string()));
        assert_eq!(postal_code("sem cep"), None);
    }
}
