pub mod classifier;
pub mod config;
pub mod error;
pub mod handler;
pub mod model;
pub mod preprocess;
pub mod tokenizer;

pub use classifier::{Device, ScoredLabel, Sentiment, SentimentClassifier};
pub use config::ServiceConfig;
pub use error::{Error, Result};
pub use handler::{Envelope, SentimentHandler};
