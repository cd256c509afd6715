//! Entry point invoked by the hub runtime.

use std::io::{BufRead, Write};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::classifier::{ScoredLabel, SentimentClassifier};
use crate::config::ServiceConfig;
use crate::error::{Error, Result};

/// Text predicted once at start-up so the first real request doesn't pay for
/// cold caches.
pub const WARM_UP_TEXT: &str = "This is a very nurturing environment";

const TEXT_KEYS: [&str; 2] = ["text", "inputs"];

pub struct SentimentHandler {
    classifier: SentimentClassifier,
}

impl SentimentHandler {
    pub fn new(classifier: SentimentClassifier) -> Self {
        Self { classifier }
    }

    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        Ok(Self::new(SentimentClassifier::from_config(config)?))
    }

    pub fn warm_up(&self) -> Result<Vec<ScoredLabel>> {
        let output = self.classifier.predict(WARM_UP_TEXT)?.to_vec();
        tracing::info!(?output, "dummy prediction");
        Ok(output)
    }

    /// `context` is accepted for runtime compatibility and ignored.
    pub fn inference_handler(
        &self,
        inputs: &Value,
        _context: Option<&Value>,
    ) -> Result<Vec<ScoredLabel>> {
        let text = extract_text(inputs)?;
        Ok(self.classifier.predict(text)?.to_vec())
    }

    /// Parses one raw request line and runs the handler on it.
    pub fn respond(&self, line: &[u8]) -> Result<Vec<ScoredLabel>> {
        let inputs: Value = serde_json::from_slice(line)?;
        self.inference_handler(&inputs, None)
    }

    /// Serves newline-delimited JSON requests until `reader` is exhausted,
    /// writing one envelope per non-blank line. Request failures become
    /// error envelopes; only I/O failures on the streams end the loop.
    pub fn serve<R: BufRead, W: Write>(&self, mut reader: R, mut writer: W) -> Result<()> {
        let mut line = Vec::new();
        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                return Ok(());
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let envelope = match self.respond(&line) {
                Ok(output) => Envelope::ok(output),
                Err(e) => {
                    tracing::warn!(error = %e, "request failed");
                    Envelope::error(&e)
                }
            };
            serde_json::to_writer(&mut writer, &envelope)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
    }

    pub fn classifier(&self) -> &SentimentClassifier {
        &self.classifier
    }
}

/// Accepts either a bare JSON string or an object carrying the text under
/// `text` or `inputs`.
pub fn extract_text(inputs: &Value) -> Result<&str> {
    match inputs {
        Value::String(text) => Ok(text.as_str()),
        Value::Object(fields) => TEXT_KEYS
            .iter()
            .find_map(|key| fields.get(*key).and_then(Value::as_str))
            .ok_or_else(|| {
                Error::InvalidInput(format!("expected a string under one of {TEXT_KEYS:?}"))
            }),
        other => Err(Error::InvalidInput(format!(
            "expected a string or an object, got {other}"
        ))),
    }
}

/// Response shape read by the web client as `response.body.output`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub body: EnvelopeBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvelopeBody {
    Output { output: Vec<ScoredLabel> },
    Error { error: String },
}

impl Envelope {
    pub fn ok(output: Vec<ScoredLabel>) -> Self {
        Self {
            body: EnvelopeBody::Output { output },
        }
    }

    pub fn error(err: &Error) -> Self {
        Self {
            body: EnvelopeBody::Error {
                error: err.to_string(),
            },
        }
    }
}
