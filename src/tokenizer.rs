//! Word-level tokenizer built from a Keras `Tokenizer.to_json()` artifact.
//!
//! The Keras vocabulary is replayed through a `tokenizers` pipeline:
//! optional lowercasing, filter characters replaced by the split string,
//! splitting on that string, then a `WordLevel` lookup. Keras drops unknown
//! words instead of emitting an unknown id, so the pipeline's unknown token
//! is a sentinel that [`KerasTokenizer::texts_to_sequence`] resolves
//! afterwards together with the `num_words` cut-off.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tokenizers::Tokenizer;

/// Keras' default `filters` argument.
pub const DEFAULT_FILTERS: &str = "!\"#$%&()*+,-./:;<=>?@[\\]^_`{|}~\t\n";

const UNKNOWN_TOKEN: &str = "<\u{0}unk>";
const UNKNOWN_ID: u32 = u32::MAX;

#[derive(Debug, Clone, Deserialize)]
struct KerasTokenizerJson {
    #[serde(default)]
    class_name: Option<String>,
    config: KerasTokenizerConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct KerasTokenizerConfig {
    #[serde(default)]
    num_words: Option<usize>,
    #[serde(default = "default_filters")]
    filters: String,
    #[serde(default = "default_lower")]
    lower: bool,
    #[serde(default = "default_split")]
    split: String,
    #[serde(default)]
    char_level: bool,
    #[serde(default)]
    oov_token: Option<String>,
    word_index: Embedded<HashMap<String, u32>>,
}

fn default_filters() -> String {
    DEFAULT_FILTERS.to_string()
}

fn default_lower() -> bool {
    true
}

fn default_split() -> String {
    " ".to_string()
}

/// Keras stores the vocabulary tables as JSON documents encoded inside a
/// string field; hand-written artifacts often inline them instead.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Embedded<T> {
    Encoded(String),
    Inline(T),
}

impl<T: DeserializeOwned> Embedded<T> {
    fn into_inner(self) -> Result<T> {
        match self {
            Self::Encoded(raw) => Ok(serde_json::from_str(&raw)?),
            Self::Inline(value) => Ok(value),
        }
    }
}

#[derive(Clone)]
pub struct KerasTokenizer {
    tokenizer: Tokenizer,
    num_words: Option<usize>,
    oov_id: Option<u32>,
    max_id: u32,
    word_count: usize,
}

impl KerasTokenizer {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let artifact: KerasTokenizerJson = serde_json::from_str(raw)?;
        if let Some(class_name) = artifact.class_name.as_deref() {
            if class_name != "Tokenizer" {
                return Err(Error::ConfigError(format!(
                    "expected a Keras Tokenizer artifact, found {class_name}"
                )));
            }
        }

        let config = artifact.config;
        if config.char_level {
            return Err(Error::ConfigError(
                "character-level tokenizers are not supported".to_string(),
            ));
        }
        if config.split.is_empty() {
            return Err(Error::ConfigError("tokenizer split string is empty".to_string()));
        }

        let word_index = config.word_index.into_inner()?;
        let oov_id = config
            .oov_token
            .as_ref()
            .and_then(|token| word_index.get(token).copied());
        let max_id = word_index.values().copied().max().unwrap_or(0);
        let word_count = word_index.len();

        let pipeline = pipeline_json(&config.filters, config.lower, &config.split, word_index);
        let tokenizer = Tokenizer::from_str(&pipeline.to_string())?;

        Ok(Self {
            tokenizer,
            // Keras treats `num_words=0` the same as unset.
            num_words: config.num_words.filter(|&n| n > 0),
            oov_id,
            max_id,
            word_count,
        })
    }

    /// Converts one text into vocabulary ids, mirroring Keras
    /// `texts_to_sequences` for a single text.
    pub fn texts_to_sequence(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self.tokenizer.encode(text, false)?;
        Ok(encoding
            .get_ids()
            .iter()
            .zip(encoding.get_offsets())
            .filter(|(_, (start, end))| start < end)
            .filter_map(|(&id, _)| self.resolve(id))
            .collect())
    }

    fn resolve(&self, id: u32) -> Option<u32> {
        if id == UNKNOWN_ID {
            return self.oov_id;
        }
        match self.num_words {
            Some(limit) if id as usize >= limit => self.oov_id,
            _ => Some(id),
        }
    }

    /// Number of rows an embedding needs to accept every id this tokenizer
    /// can emit.
    pub fn vocab_size(&self) -> usize {
        match self.num_words {
            Some(limit) => limit.min(self.max_id as usize + 1),
            None => self.max_id as usize + 1,
        }
    }

    pub fn word_count(&self) -> usize {
        self.word_count
    }

    pub fn oov_id(&self) -> Option<u32> {
        self.oov_id
    }
}

fn pipeline_json(
    filters: &str,
    lower: bool,
    split: &str,
    mut vocab: HashMap<String, u32>,
) -> Value {
    let mut normalizers = Vec::new();
    if lower {
        normalizers.push(json!({ "type": "Lowercase" }));
    }
    if !filters.is_empty() {
        normalizers.push(json!({
            "type": "Replace",
            "pattern": { "Regex": filter_class(filters) },
            "content": split,
        }));
    }
    let normalizer = if normalizers.is_empty() {
        Value::Null
    } else {
        json!({ "type": "Sequence", "normalizers": normalizers })
    };

    vocab.insert(UNKNOWN_TOKEN.to_string(), UNKNOWN_ID);

    json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": normalizer,
        "pre_tokenizer": {
            "type": "Split",
            "pattern": { "String": split },
            "behavior": "Removed",
            "invert": false,
        },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": vocab,
            "unk_token": UNKNOWN_TOKEN,
        },
    })
}

/// Regex character class matching any filter character. Every character is
/// hex-escaped so brackets, backslashes and carets need no special casing.
fn filter_class(filters: &str) -> String {
    let mut class = String::from("[");
    for c in filters.chars() {
        class.push_str(&format!("\\x{{{:X}}}", c as u32));
    }
    class.push(']');
    class
}
