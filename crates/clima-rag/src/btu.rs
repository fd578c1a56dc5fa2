//! Cooling capacity calculator.
//!
//! Maps room area, sun exposure and occupancy to the smallest commercial
//! capacity that covers the estimated load.

use serde::{Deserialize, Serialize};

/// Commercial capacity ladder (BTU/h), ascending.
pub const LADDER: [u32; 10] = [
    7500, 9000, 12000, 18000, 24000, 27000, 30000, 36000, 48000, 60000,
];

const AFTERNOON_RATE: f64 = 800.0;
const DEFAULT_RATE: f64 = 600.0;
const PER_EXTRA_PERSON: f64 = 600.0;

/// Default occupancy when the user does not say how many people use the room.
pub const DEFAULT_PEOPLE: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SunExposure {
    Afternoon,
    Other,
}

impl SunExposure {
    /// Classify free text ("sol da tarde", "manhã", "afternoon", ...).
    pub fn classify(text: &str) -> Self {
        let lower = text.to_lowercase();
        if lower.contains("tarde") || lower.contains("afternoon") {
            Self::Afternoon
        } else {
            Self::Other
        }
    }

    fn base_rate(self) -> f64 {
        match self {
            Self::Afternoon => AFTERNOON_RATE,
            Self::Other => DEFAULT_RATE,
        }
    }
}

/// Estimate the required capacity and round it up to the ladder.
pub fn calculate_btu(area_m2: f64, sun: &str, people: u32) -> u32 {
    calculate_for_exposure(area_m2, SunExposure::classify(sun), people)
}

pub fn calculate_for_exposure(area_m2: f64, sun: SunExposure, people: u32) -> u32 {
    let area = if area_m2.is_finite() && area_m2 > 0.0 {
        area_m2
    } else {
        0.0
    };

    let mut load = area * sun.base_rate();
    if people > 1 {
        load += f64::from(people - 1) * PER_EXTRA_PERSON;
    }

    round_up_to_ladder(load)
}

fn round_up_to_ladder(load: f64) -> u32 {
    LADDER
        .iter()
        .copied()
        .find(|&size| load <= f64::from(size))
        .unwrap_or(LADDER[LADDER.len() - 1])
}

/// Snap an arbitrary capacity to the closest ladder value (ties go up).
pub fn nearest_ladder_value(capacity: u32) -> u32 {
    let mut best = LADDER[0];
    let mut best_gap = u32::MAX;
    for size in LADDER {
        let gap = size.abs_diff(capacity);
        if gap < best_gap || (gap == best_gap && size > best) {
            best = size;
            best_gap = gap;
        }
    }
    best
}
