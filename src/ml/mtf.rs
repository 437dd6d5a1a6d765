//! Multi-timeframe weighting network
//!
//! Two dense layers: ReLU hidden, softmax over the four timeframes.

use serde::{Deserialize, Serialize};

use super::linalg::{expect_vector, relu, round_to, softmax, Matrix};
use super::registry::ModelError;
use super::InferenceSource;

const MODEL_NAME: &str = "mtf_weights";

pub const MTF_INPUT_SIZE: usize = 6;
pub const TIMEFRAME_COUNT: usize = 4;

/// Blend weights for the 1m/5m/15m/1h alignments; they sum to 1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeframeWeights {
    pub m1: f64,
    pub m5: f64,
    pub m15: f64,
    pub h1: f64,
}

impl Default for TimeframeWeights {
    fn default() -> Self {
        Self {
            m1: 0.2,
            m5: 0.35,
            m15: 0.25,
            h1: 0.2,
        }
    }
}

/// Inputs to the weighter
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MtfInput {
    pub align_1m: f64,
    pub align_5m: f64,
    pub align_15m: f64,
    pub align_1h: f64,
    pub regime_compatibility: f64,
    pub flow_bias: f64,
}

impl MtfInput {
    fn as_array(&self) -> [f64; MTF_INPUT_SIZE] {
        [
            self.align_1m,
            self.align_5m,
            self.align_15m,
            self.align_1h,
            self.regime_compatibility,
            self.flow_bias,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MtfWeighting {
    pub weights: TimeframeWeights,
    pub source: InferenceSource,
}

impl MtfWeighting {
    pub fn fallback() -> Self {
        Self {
            weights: TimeframeWeights::default(),
            source: InferenceSource::Fallback,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LayerWire {
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MtfWire {
    version: String,
    input_size: usize,
    hidden_size: usize,
    hidden: LayerWire,
    output: LayerWire,
}

#[derive(Debug, Clone, PartialEq)]
struct Dense {
    weights: Matrix,
    bias: Vec<f64>,
}

impl Dense {
    fn load(name: &str, wire: LayerWire, rows: usize, cols: usize) -> Result<Self, ModelError> {
        let weights = Matrix::from_rows(MODEL_NAME, &wire.weights)?;
        weights.expect_shape(MODEL_NAME, name, rows, cols)?;
        expect_vector(MODEL_NAME, &format!("{name} bias"), &wire.bias, rows)?;
        Ok(Self {
            weights,
            bias: wire.bias,
        })
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        self.weights
            .mul_vec(input)
            .iter()
            .zip(&self.bias)
            .map(|(z, b)| z + b)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MtfModel {
    version: String,
    hidden: Dense,
    output: Dense,
}

impl MtfModel {
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let wire: MtfWire = serde_json::from_str(json)?;
        if wire.input_size != MTF_INPUT_SIZE {
            return Err(ModelError::Shape {
                model: MODEL_NAME.to_string(),
                detail: format!("input size {}, expected {MTF_INPUT_SIZE}", wire.input_size),
            });
        }
        if wire.hidden_size == 0 {
            return Err(ModelError::Shape {
                model: MODEL_NAME.to_string(),
                detail: "hidden size is zero".to_string(),
            });
        }
        Ok(Self {
            version: wire.version,
            hidden: Dense::load("hidden", wire.hidden, wire.hidden_size, MTF_INPUT_SIZE)?,
            output: Dense::load("output", wire.output, TIMEFRAME_COUNT, wire.hidden_size)?,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn predict(&self, input: &MtfInput) -> TimeframeWeights {
        let hidden: Vec<f64> = self
            .hidden
            .forward(&input.as_array())
            .into_iter()
            .map(relu)
            .collect();
        let probs = softmax(&self.output.forward(&hidden));
        TimeframeWeights {
            m1: round_to(probs[0], 6),
            m5: round_to(probs[1], 6),
            m15: round_to(probs[2], 6),
            h1: round_to(probs[3], 6),
        }
    }
}

/// Weights from the model when available, else the fixed defaults
pub fn timeframe_weights(input: &MtfInput, model: Option<&MtfModel>) -> MtfWeighting {
    match model {
        Some(model) => MtfWeighting {
            weights: model.predict(input),
            source: InferenceSource::Ml,
        },
        None => MtfWeighting::fallback(),
    }
}
