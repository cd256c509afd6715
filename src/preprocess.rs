use crate::config::DEFAULT_MAX_LEN;
use crate::error::{Error, Result};
use crate::tokenizer::KerasTokenizer;

pub const PAD_ID: u32 = 0;

/// Truncates or zero-pads `ids` to exactly `max_len` elements. Both
/// operations happen at the end of the sequence.
pub fn pad_sequence(mut ids: Vec<u32>, max_len: usize) -> Vec<u32> {
    ids.resize(max_len, PAD_ID);
    ids
}

#[derive(Clone)]
pub struct Preprocessor {
    tokenizer: KerasTokenizer,
    max_len: usize,
}

impl Preprocessor {
    pub fn new(tokenizer: KerasTokenizer, max_len: usize) -> Result<Self> {
        if max_len == 0 {
            return Err(Error::ConfigError(
                "sequence length must be positive".to_string(),
            ));
        }
        Ok(Self { tokenizer, max_len })
    }

    pub fn with_default_len(tokenizer: KerasTokenizer) -> Self {
        Self {
            tokenizer,
            max_len: DEFAULT_MAX_LEN,
        }
    }

    pub fn preprocess(&self, text: &str) -> Result<Vec<u32>> {
        let ids = self.tokenizer.texts_to_sequence(text)?;
        Ok(pad_sequence(ids, self.max_len))
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn tokenizer(&self) -> &KerasTokenizer {
        &self.tokenizer
    }
}
