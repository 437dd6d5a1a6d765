//! Implied-volatility forecast from a single gated-memory cell step
//!
//! The cell runs one step from a zero hidden and cell state, so the forecast
//! depends only on the current feature snapshot.

use serde::{Deserialize, Serialize};

use super::linalg::{dot, expect_vector, round_to, sigmoid, Matrix};
use super::registry::ModelError;
use super::InferenceSource;

const MODEL_NAME: &str = "iv_forecast";

pub const HORIZON_MINUTES: u32 = 60;
pub const IV_INPUT_SIZE: usize = 7;
/// Forecast moves are capped at +/-20% of current IV
const MAX_DELTA_PCT: f64 = 0.2;
/// IV points needed to call a direction
const DIRECTION_DEADBAND: f64 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IvFeatures {
    pub realized_vol_trend: f64,
    pub iv_momentum: f64,
    pub mean_reversion_pressure: f64,
    pub term_structure_slope: f64,
    pub skew_pressure: f64,
    pub vol_of_vol: f64,
    pub close_to_expiry_pressure: f64,
}

fn clamp_finite(value: f64, min: f64, max: f64) -> f64 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        0.0_f64.clamp(min, max)
    }
}

impl IvFeatures {
    pub fn normalized(&self) -> Self {
        Self {
            realized_vol_trend: clamp_finite(self.realized_vol_trend, -1.5, 1.5),
            iv_momentum: clamp_finite(self.iv_momentum, -1.5, 1.5),
            mean_reversion_pressure: clamp_finite(self.mean_reversion_pressure, -2.0, 2.0),
            term_structure_slope: clamp_finite(self.term_structure_slope, -1.0, 1.0),
            skew_pressure: clamp_finite(self.skew_pressure, -1.5, 1.5),
            vol_of_vol: clamp_finite(self.vol_of_vol, 0.0, 1.5),
            close_to_expiry_pressure: clamp_finite(self.close_to_expiry_pressure, 0.0, 1.0),
        }
    }

    fn as_array(&self) -> [f64; IV_INPUT_SIZE] {
        [
            self.realized_vol_trend,
            self.iv_momentum,
            self.mean_reversion_pressure,
            self.term_structure_slope,
            self.skew_pressure,
            self.vol_of_vol,
            self.close_to_expiry_pressure,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IvDirection {
    Up,
    Down,
    Flat,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IvForecast {
    pub horizon_minutes: u32,
    #[serde(rename = "predictedIV")]
    pub predicted_iv: Option<f64>,
    #[serde(rename = "currentIV")]
    pub current_iv: Option<f64>,
    #[serde(rename = "deltaIV")]
    pub delta_iv: Option<f64>,
    pub direction: IvDirection,
    pub confidence: f64,
    pub source: InferenceSource,
    pub features: IvFeatures,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CellWire {
    input_gate: Vec<Vec<f64>>,
    forget_gate: Vec<Vec<f64>>,
    output_gate: Vec<Vec<f64>>,
    candidate_gate: Vec<Vec<f64>>,
    bias_input: Vec<f64>,
    bias_forget: Vec<f64>,
    bias_output: Vec<f64>,
    bias_candidate: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct HeadWire {
    weights: Vec<f64>,
    bias: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IvModelWire {
    version: String,
    input_size: usize,
    hidden_size: usize,
    cell: CellWire,
    output_delta: HeadWire,
    output_confidence: HeadWire,
}

#[derive(Debug, Clone, PartialEq)]
struct Gate {
    weights: Matrix,
    bias: Vec<f64>,
}

impl Gate {
    fn load(name: &str, rows: &[Vec<f64>], bias: Vec<f64>, hidden: usize, cols: usize) -> Result<Self, ModelError> {
        let weights = Matrix::from_rows(MODEL_NAME, rows)?;
        weights.expect_shape(MODEL_NAME, name, hidden, cols)?;
        expect_vector(MODEL_NAME, &format!("{name} bias"), &bias, hidden)?;
        Ok(Self { weights, bias })
    }

    fn pre_activation(&self, state: &[f64]) -> Vec<f64> {
        self.weights
            .mul_vec(state)
            .iter()
            .zip(&self.bias)
            .map(|(z, b)| z + b)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Head {
    weights: Vec<f64>,
    bias: f64,
}

impl Head {
    fn load(name: &str, wire: HeadWire, hidden: usize) -> Result<Self, ModelError> {
        expect_vector(MODEL_NAME, name, &wire.weights, hidden)?;
        if !wire.bias.is_finite() {
            return Err(ModelError::Invalid {
                model: MODEL_NAME.to_string(),
                detail: format!("{name} bias is not finite"),
            });
        }
        Ok(Self {
            weights: wire.weights,
            bias: wire.bias,
        })
    }

    fn apply(&self, hidden: &[f64]) -> f64 {
        dot(hidden, &self.weights) + self.bias
    }
}

/// Validated cell and output heads
#[derive(Debug, Clone, PartialEq)]
pub struct IvForecastModel {
    version: String,
    hidden_size: usize,
    input: Gate,
    forget: Gate,
    output: Gate,
    candidate: Gate,
    delta_head: Head,
    confidence_head: Head,
}

impl IvForecastModel {
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let wire: IvModelWire = serde_json::from_str(json)?;
        Self::from_wire(wire)
    }

    fn from_wire(wire: IvModelWire) -> Result<Self, ModelError> {
        if wire.input_size != IV_INPUT_SIZE {
            return Err(ModelError::Shape {
                model: MODEL_NAME.to_string(),
                detail: format!("input size {}, expected {IV_INPUT_SIZE}", wire.input_size),
            });
        }
        if wire.hidden_size == 0 {
            return Err(ModelError::Shape {
                model: MODEL_NAME.to_string(),
                detail: "hidden size is zero".to_string(),
            });
        }
        let hidden = wire.hidden_size;
        let cols = wire.input_size + hidden;
        let cell = wire.cell;

        Ok(Self {
            version: wire.version,
            hidden_size: hidden,
            input: Gate::load("inputGate", &cell.input_gate, cell.bias_input, hidden, cols)?,
            forget: Gate::load("forgetGate", &cell.forget_gate, cell.bias_forget, hidden, cols)?,
            output: Gate::load("outputGate", &cell.output_gate, cell.bias_output, hidden, cols)?,
            candidate: Gate::load(
                "candidateGate",
                &cell.candidate_gate,
                cell.bias_candidate,
                hidden,
                cols,
            )?,
            delta_head: Head::load("outputDelta", wire.output_delta, hidden)?,
            confidence_head: Head::load("outputConfidence", wire.output_confidence, hidden)?,
        })
    }

    /// The stock `iv-lstm-lite-v1` cell
    pub fn builtin() -> Result<Self, ModelError> {
        let wire = IvModelWire {
            version: "iv-lstm-lite-v1".to_string(),
            input_size: 7,
            hidden_size: 4,
            cell: CellWire {
                input_gate: vec![
                    vec![0.48, 0.17, -0.24, 0.06, 0.08, 0.11, -0.22, 0.05, -0.03, 0.07, 0.04],
                    vec![0.28, 0.34, -0.20, 0.04, 0.12, 0.15, -0.14, -0.02, 0.05, 0.06, 0.03],
                    vec![0.32, 0.12, -0.18, 0.09, 0.14, 0.05, -0.20, 0.01, 0.04, 0.02, 0.05],
                    vec![0.22, 0.09, -0.16, 0.05, 0.18, 0.07, -0.12, 0.03, 0.04, 0.01, 0.02],
                ],
                forget_gate: vec![
                    vec![0.54, 0.14, -0.16, 0.03, 0.05, 0.09, -0.10, 0.02, 0.04, 0.03, 0.01],
                    vec![0.36, 0.26, -0.18, 0.06, 0.08, 0.11, -0.11, 0.02, 0.03, 0.04, 0.02],
                    vec![0.30, 0.10, -0.12, 0.10, 0.08, 0.04, -0.09, 0.01, 0.03, 0.01, 0.03],
                    vec![0.24, 0.08, -0.10, 0.07, 0.12, 0.05, -0.08, 0.01, 0.02, 0.01, 0.02],
                ],
                output_gate: vec![
                    vec![0.46, 0.18, -0.20, 0.04, 0.10, 0.09, -0.15, 0.02, 0.02, 0.04, 0.02],
                    vec![0.31, 0.29, -0.17, 0.05, 0.09, 0.11, -0.12, 0.03, 0.03, 0.05, 0.03],
                    vec![0.27, 0.11, -0.13, 0.08, 0.10, 0.03, -0.10, 0.01, 0.02, 0.03, 0.02],
                    vec![0.20, 0.06, -0.11, 0.06, 0.11, 0.04, -0.08, 0.01, 0.02, 0.02, 0.01],
                ],
                candidate_gate: vec![
                    vec![0.65, 0.21, -0.42, 0.10, 0.16, 0.12, -0.30, 0.06, -0.04, 0.05, 0.03],
                    vec![0.40, 0.39, -0.36, 0.09, 0.18, 0.18, -0.25, 0.03, 0.06, 0.07, 0.04],
                    vec![0.36, 0.14, -0.30, 0.14, 0.20, 0.08, -0.22, 0.02, 0.05, 0.03, 0.04],
                    vec![0.29, 0.10, -0.24, 0.11, 0.24, 0.09, -0.18, 0.03, 0.04, 0.03, 0.03],
                ],
                bias_input: vec![0.08, 0.07, 0.06, 0.05],
                bias_forget: vec![0.24, 0.22, 0.20, 0.18],
                bias_output: vec![0.05, 0.05, 0.04, 0.04],
                bias_candidate: vec![0.01, 0.01, 0.01, 0.01],
            },
            output_delta: HeadWire {
                weights: vec![0.46, 0.34, 0.30, 0.26],
                bias: -0.02,
            },
            output_confidence: HeadWire {
                weights: vec![0.35, 0.29, 0.26, 0.24],
                bias: 0.2,
            },
        };
        Self::from_wire(wire)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// One step from zero state; returns the new hidden vector
    fn step(&self, input: &[f64; IV_INPUT_SIZE]) -> Vec<f64> {
        let mut state = input.to_vec();
        state.resize(IV_INPUT_SIZE + self.hidden_size, 0.0);

        let prev_cell = vec![0.0; self.hidden_size];

        let i = self.input.pre_activation(&state);
        let f = self.forget.pre_activation(&state);
        let o = self.output.pre_activation(&state);
        let c = self.candidate.pre_activation(&state);

        (0..self.hidden_size)
            .map(|k| {
                let cell = sigmoid(f[k]) * prev_cell[k] + sigmoid(i[k]) * c[k].tanh();
                sigmoid(o[k]) * cell.tanh()
            })
            .collect()
    }

    /// `(delta_pct, confidence)` for normalized features
    fn infer(&self, features: &IvFeatures) -> (f64, f64) {
        let hidden = self.step(&features.as_array());
        let delta_pct = self.delta_head.apply(&hidden).tanh() * MAX_DELTA_PCT;
        let confidence = sigmoid(self.confidence_head.apply(&hidden)).clamp(0.05, 0.95);
        (delta_pct, confidence)
    }
}

fn fallback_delta(f: &IvFeatures) -> (f64, f64) {
    let raw = f.realized_vol_trend * 0.22 + f.iv_momentum * 0.18
        - f.mean_reversion_pressure * 0.30
        + f.term_structure_slope * 0.14
        + f.skew_pressure * 0.08
        + f.vol_of_vol * 0.12
        - f.close_to_expiry_pressure * 0.10;
    let confidence = (0.6 - f.vol_of_vol.abs().min(0.5)).clamp(0.1, 0.85);
    (raw.clamp(-MAX_DELTA_PCT, MAX_DELTA_PCT), confidence)
}

fn direction_for(delta_iv: f64) -> IvDirection {
    if delta_iv > DIRECTION_DEADBAND {
        IvDirection::Up
    } else if delta_iv < -DIRECTION_DEADBAND {
        IvDirection::Down
    } else {
        IvDirection::Flat
    }
}

/// Forecast IV one horizon ahead
///
/// `model` is `None` when the forecaster is not loaded or not rolled out for
/// this user, in which case the linear fallback is used.
pub fn forecast_iv(
    current_iv: Option<f64>,
    features: &IvFeatures,
    model: Option<&IvForecastModel>,
) -> IvForecast {
    let features = features.normalized();
    let Some(current) = current_iv.filter(|iv| iv.is_finite()) else {
        return IvForecast {
            horizon_minutes: HORIZON_MINUTES,
            predicted_iv: None,
            current_iv: None,
            delta_iv: None,
            direction: IvDirection::Unknown,
            confidence: 0.0,
            source: InferenceSource::Fallback,
            features,
        };
    };

    let ((delta_pct, confidence), source) = match model {
        Some(model) => (model.infer(&features), InferenceSource::Ml),
        None => (fallback_delta(&features), InferenceSource::Fallback),
    };

    let predicted = (current * (1.0 + delta_pct)).max(1.0);
    let delta = predicted - current;
    IvForecast {
        horizon_minutes: HORIZON_MINUTES,
        predicted_iv: Some(round_to(predicted, 3)),
        current_iv: Some(round_to(current, 3)),
        delta_iv: Some(round_to(delta, 3)),
        direction: direction_for(delta),
        confidence: round_to(confidence, 3),
        source,
        features,
    }
}
