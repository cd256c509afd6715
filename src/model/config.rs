use serde::{Deserialize, Serialize};

/// Architecture of the exported classifier, read from `model-twitter.json`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ModelConfig {
    pub vocab_size: usize,
    pub embedding_dim: usize,
    /// Keras `Embedding(mask_zero=True)`: padding positions are skipped by
    /// the encoder.
    #[serde(default)]
    pub mask_zero: bool,
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub dense: Vec<DenseConfig>,
    #[serde(default = "default_output_units")]
    pub output_units: usize,
}

fn default_output_units() -> usize {
    1
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Copy)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EncoderConfig {
    Lstm { units: usize },
    GlobalAveragePooling,
}

impl EncoderConfig {
    pub fn output_dim(&self, embedding_dim: usize) -> usize {
        match self {
            Self::Lstm { units } => *units,
            Self::GlobalAveragePooling => embedding_dim,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Copy)]
pub struct DenseConfig {
    pub units: usize,
    #[serde(default)]
    pub activation: DenseActivation,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum DenseActivation {
    #[default]
    Linear,
    Relu,
    Tanh,
    Sigmoid,
}
