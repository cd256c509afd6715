//! Process configuration read from the environment.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

pub const MODEL_DIR_VAR: &str = "MODEL_DIR";
pub const MAX_LEN_VAR: &str = "SENTIMENT_MAX_LEN";

/// Sequence length the twitter model was trained with.
pub const DEFAULT_MAX_LEN: usize = 40;

pub const MODEL_CONFIG_FILE: &str = "model-twitter.json";
pub const MODEL_WEIGHTS_FILE: &str = "model-twitter.safetensors";
pub const TOKENIZER_FILE: &str = "tokenizer-twitter.json";
/// Keras original of the weights; only checked for, to point at the export step.
pub const KERAS_MODEL_FILE: &str = "model-twitter.h5";
pub const EXPORT_SCRIPT: &str = "scripts/export_keras_model.py";

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub model_dir: PathBuf,
    pub max_len: usize,
}

impl ServiceConfig {
    pub fn new<P: AsRef<Path>>(model_dir: P) -> Self {
        Self {
            model_dir: model_dir.as_ref().to_path_buf(),
            max_len: DEFAULT_MAX_LEN,
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup, so callers other than
    /// the binary don't have to go through the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let model_dir = lookup(MODEL_DIR_VAR)
            .filter(|dir| !dir.trim().is_empty())
            .ok_or_else(|| Error::ConfigError(format!("{MODEL_DIR_VAR} is not set")))?;

        let max_len = match lookup(MAX_LEN_VAR) {
            Some(raw) => parse_max_len(&raw)?,
            None => DEFAULT_MAX_LEN,
        };

        Ok(Self {
            model_dir: PathBuf::from(model_dir),
            max_len,
        })
    }

    pub fn artifacts(&self) -> ArtifactPaths {
        ArtifactPaths::in_dir(&self.model_dir)
    }
}

fn parse_max_len(raw: &str) -> Result<usize> {
    match raw.trim().parse::<usize>() {
        Ok(0) => Err(Error::ConfigError(format!("{MAX_LEN_VAR} must be positive"))),
        Ok(len) => Ok(len),
        Err(e) => Err(Error::ConfigError(format!(
            "{MAX_LEN_VAR}={raw:?} is not a length: {e}"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactPaths {
    pub model_config: PathBuf,
    pub model_weights: PathBuf,
    pub tokenizer: PathBuf,
    pub keras_model: PathBuf,
}

impl ArtifactPaths {
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self {
            model_config: dir.join(MODEL_CONFIG_FILE),
            model_weights: dir.join(MODEL_WEIGHTS_FILE),
            tokenizer: dir.join(TOKENIZER_FILE),
            keras_model: dir.join(KERAS_MODEL_FILE),
        }
    }
}
