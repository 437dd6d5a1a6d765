//! Scenario lanes projected from setup geometry

use serde::{Deserialize, Serialize};

use crate::common::types::{Direction, Setup};
use crate::setup::viability::has_valid_geometry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaneType {
    Base,
    Adverse,
    Acceleration,
}

impl LaneType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaneType::Base => "base",
            LaneType::Adverse => "adverse",
            LaneType::Acceleration => "acceleration",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioLane {
    pub id: String,
    #[serde(rename = "type")]
    pub lane_type: LaneType,
    pub label: String,
    pub price: f64,
    /// Signed points from the reference price, positive above it
    pub distance_points: f64,
    /// Distance in units of setup risk
    pub distance_r: Option<f64>,
    pub description: String,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Base (target1), adverse (stop) and acceleration (target2) lanes
///
/// The reference is `current_price` when it is finite and positive, else
/// the entry mid. Returns nothing for a missing setup or broken geometry.
pub fn build_scenario_lanes(setup: Option<&Setup>, current_price: Option<f64>) -> Vec<ScenarioLane> {
    let Some(setup) = setup else {
        return Vec::new();
    };
    if !has_valid_geometry(setup) {
        return Vec::new();
    }

    let reference = current_price
        .filter(|p| p.is_finite() && *p > 0.0)
        .unwrap_or_else(|| setup.entry_mid());
    let risk = setup.risk_points();
    let side = match setup.direction {
        Direction::Bullish => "upside",
        Direction::Bearish => "downside",
    };

    let lanes = [
        (LaneType::Base, "Base", setup.target1.price, format!("Base case: {} follow-through to target 1", side)),
        (LaneType::Adverse, "Adverse", setup.stop, "Adverse case: stop is hit and the thesis fails".to_string()),
        (LaneType::Acceleration, "Accel", setup.target2.price, format!("Acceleration: {} extension to target 2", side)),
    ];

    lanes
        .into_iter()
        .map(|(lane_type, label, price, description)| {
            let distance = price - reference;
            ScenarioLane {
                id: format!("{}-{}", setup.id, lane_type.as_str()),
                lane_type,
                label: label.to_string(),
                price: round2(price),
                distance_points: round2(distance),
                distance_r: (risk > 0.0).then(|| round2(distance.abs() / risk)),
                description,
            }
        })
        .collect()
}
