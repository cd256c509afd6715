pub use candle_core::Device;
use candle_core::{DType, Tensor};
use candle_nn::VarBuilder;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::fs::File;
use std::path::Path;

use crate::config::{ArtifactPaths, ServiceConfig, DEFAULT_MAX_LEN, EXPORT_SCRIPT};
use crate::error::{Error, Result};
use crate::model::{ModelConfig, SentimentNetwork};
use crate::preprocess::Preprocessor;
use crate::tokenizer::KerasTokenizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum Sentiment {
    Positive,
    Negative,
}

impl Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Positive => write!(f, "Positive"),
            Self::Negative => write!(f, "Negative"),
        }
    }
}

/// A label with its confidence as a percentage, serialized as a
/// `[label, confidence]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ScoredLabel(pub Sentiment, pub f64);

impl ScoredLabel {
    pub fn label(&self) -> Sentiment {
        self.0
    }

    pub fn confidence(&self) -> f64 {
        self.1
    }
}

/// Probability to percentage, rounded to two decimals.
pub fn to_percentage(probability: f64) -> f64 {
    (probability * 100.0 * 100.0).round() / 100.0
}

/// Orders both classes by the positive-class probability, predicted class
/// first.
pub fn rank(positive: f64) -> [ScoredLabel; 2] {
    let negative = 1.0 - positive;
    let pos = ScoredLabel(Sentiment::Positive, to_percentage(positive));
    let neg = ScoredLabel(Sentiment::Negative, to_percentage(negative));
    if positive < 0.5 {
        [neg, pos]
    } else {
        [pos, neg]
    }
}

#[derive(Clone)]
pub struct SentimentClassifier {
    model: SentimentNetwork,
    preprocessor: Preprocessor,
    device: Device,
}

impl SentimentClassifier {
    pub fn load<P: AsRef<Path>>(path: P, device: Device) -> Result<Self> {
        Self::load_with_len(path, DEFAULT_MAX_LEN, device)
    }

    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        Self::load_with_len(&config.model_dir, config.max_len, Device::Cpu)
    }

    fn load_with_len<P: AsRef<Path>>(path: P, max_len: usize, device: Device) -> Result<Self> {
        let paths = ArtifactPaths::in_dir(path);
        if !paths.model_weights.exists() && paths.keras_model.exists() {
            return Err(Error::ConfigError(format!(
                "found {} but no {}; export the Keras model with {EXPORT_SCRIPT} first",
                paths.keras_model.display(),
                paths.model_weights.display(),
            )));
        }

        let config = read_model_config(&paths.model_config)
            .map_err(|e| Error::artifact(&paths.model_config, e))?;
        tracing::info!(path = %paths.model_config.display(), ?config, "loaded model config");

        let tokenizer = KerasTokenizer::from_file(&paths.tokenizer)
            .map_err(|e| Error::artifact(&paths.tokenizer, e))?;
        tracing::info!(
            path = %paths.tokenizer.display(),
            words = tokenizer.word_count(),
            oov = ?tokenizer.oov_id(),
            "loaded tokenizer"
        );
        if tokenizer.vocab_size() > config.vocab_size {
            tracing::warn!(
                tokenizer = tokenizer.vocab_size(),
                embedding = config.vocab_size,
                "tokenizer can emit ids beyond the embedding table"
            );
        }
        let preprocessor = Preprocessor::new(tokenizer, max_len)?;

        let model = load_weights(&paths.model_weights, &config, &device)
            .map_err(|e| Error::artifact(&paths.model_weights, e))?;
        tracing::info!(path = %paths.model_weights.display(), "loaded model weights");

        Ok(Self::new(model, preprocessor, device))
    }

    pub fn new(model: SentimentNetwork, preprocessor: Preprocessor, device: Device) -> Self {
        Self {
            model,
            preprocessor,
            device,
        }
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    /// Runs one forward pass over an already padded sequence.
    pub fn positive_probability(&self, ids: &[u32]) -> Result<f32> {
        if ids.is_empty() {
            return Err(Error::InvalidInput("empty token sequence".to_string()));
        }
        let input_ids = Tensor::new(ids, &self.device)?.unsqueeze(0)?;
        let probs = self.model.forward(&input_ids)?;
        Ok(probs.squeeze(0)?.to_scalar::<f32>()?)
    }

    pub fn predict(&self, text: &str) -> Result<[ScoredLabel; 2]> {
        let ids = self.preprocessor.preprocess(text)?;
        let positive = self.positive_probability(&ids)?;
        let output = rank(f64::from(positive));
        tracing::debug!(?output, "prediction");
        Ok(output)
    }
}

fn read_model_config(path: &Path) -> Result<ModelConfig> {
    let config_reader = File::open(path)?;
    Ok(serde_json::from_reader(config_reader)?)
}

fn load_weights(path: &Path, config: &ModelConfig, device: &Device) -> Result<SentimentNetwork> {
    let model_builder =
        unsafe { VarBuilder::from_mmaped_safetensors(&[path], DType::F32, device) }?;
    SentimentNetwork::load(model_builder, config)
}
