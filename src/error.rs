use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("tokenizer error: {0}")]
    TokenizerError(#[from] tokenizers::Error),
    #[error("candle error: {0}")]
    CandleError(#[from] candle_core::Error),
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("failed to load {}: {source}", .path.display())]
    ArtifactError {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },
    #[error("config error: {0}")]
    ConfigError(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Attaches the artifact path to a load failure.
    pub fn artifact<P: AsRef<Path>>(path: P, source: Error) -> Self {
        Self::ArtifactError {
            path: path.as_ref().to_path_buf(),
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
