//! Candle port of the twitter sentiment network.
//!
//! Tensor names follow the PyTorch layout candle-nn expects; the Keras
//! weights are transposed accordingly when exported to safetensors.

pub mod config;

pub use config::{DenseActivation, DenseConfig, EncoderConfig, ModelConfig};

use crate::error::{Error, Result};
use crate::preprocess::PAD_ID;
use candle_core::{DType, Tensor, D};
use candle_nn::rnn::{LSTMConfig, LSTM, RNN};
use candle_nn::{Embedding, Linear, Module, VarBuilder};

#[derive(Clone)]
enum Encoder {
    Lstm(LSTM),
    GlobalAveragePooling,
}

impl Encoder {
    /// `mask` is `(batch, seq_len)` with 1.0 on real tokens, or `None` when
    /// the embedding doesn't mask padding.
    fn forward(&self, xs: &Tensor, mask: Option<&Tensor>) -> Result<Tensor> {
        match (self, mask) {
            // Keras LSTM without `return_sequences` yields the last hidden state.
            (Self::Lstm(lstm), None) => {
                let states = lstm.seq(xs)?;
                let last = states
                    .last()
                    .ok_or_else(|| Error::InvalidInput("empty token sequence".to_string()))?;
                Ok(last.h().clone())
            }
            // Padding is trailing, so a masked LSTM ends on the state after the
            // last real token; an all-padding row keeps the zero initial state.
            (Self::Lstm(lstm), Some(mask)) => {
                let states = lstm.seq(xs)?;
                let lengths: Vec<f32> = mask.sum(1)?.to_vec1()?;
                let mut last = Vec::with_capacity(lengths.len());
                for (b, len) in lengths.into_iter().enumerate() {
                    let len = len as usize;
                    let h = match len.checked_sub(1).and_then(|i| states.get(i)) {
                        Some(state) => state.h().get(b)?,
                        None => lstm.zero_state(1)?.h().get(0)?,
                    };
                    last.push(h);
                }
                Ok(Tensor::stack(&last, 0)?)
            }
            (Self::GlobalAveragePooling, None) => Ok(xs.mean(1)?),
            (Self::GlobalAveragePooling, Some(mask)) => {
                let weights = mask.unsqueeze(2)?;
                let total = xs.broadcast_mul(&weights)?.sum(1)?;
                let count = mask.sum_keepdim(1)?.maximum(1f32)?;
                Ok(total.broadcast_div(&count)?)
            }
        }
    }
}

#[derive(Clone)]
struct Dense {
    linear: Linear,
    activation: DenseActivation,
}

impl Dense {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let xs = self.linear.forward(xs)?;
        let xs = match self.activation {
            DenseActivation::Linear => xs,
            DenseActivation::Relu => xs.relu()?,
            DenseActivation::Tanh => xs.tanh()?,
            DenseActivation::Sigmoid => candle_nn::ops::sigmoid(&xs)?,
        };
        Ok(xs)
    }
}

#[derive(Clone)]
pub struct SentimentNetwork {
    embedding: Embedding,
    encoder: Encoder,
    dense: Vec<Dense>,
    classifier: Linear,
    output_units: usize,
    mask_zero: bool,
}

impl SentimentNetwork {
    pub fn load(vb: VarBuilder, config: &ModelConfig) -> Result<Self> {
        if !(1..=2).contains(&config.output_units) {
            return Err(Error::ConfigError(format!(
                "binary classifier needs 1 or 2 output units, got {}",
                config.output_units
            )));
        }

        let embedding =
            candle_nn::embedding(config.vocab_size, config.embedding_dim, vb.pp("embedding"))?;

        let encoder = match config.encoder {
            EncoderConfig::Lstm { units } => Encoder::Lstm(candle_nn::rnn::lstm(
                config.embedding_dim,
                units,
                LSTMConfig::default(),
                vb.pp("lstm"),
            )?),
            EncoderConfig::GlobalAveragePooling => Encoder::GlobalAveragePooling,
        };

        let mut in_dim = config.encoder.output_dim(config.embedding_dim);
        let dense_vb = vb.pp("dense");
        let mut dense = Vec::with_capacity(config.dense.len());
        for (i, layer) in config.dense.iter().enumerate() {
            dense.push(Dense {
                linear: candle_nn::linear(in_dim, layer.units, dense_vb.pp(i.to_string()))?,
                activation: layer.activation,
            });
            in_dim = layer.units;
        }

        let classifier = candle_nn::linear(in_dim, config.output_units, vb.pp("classifier"))?;

        Ok(Self {
            embedding,
            encoder,
            dense,
            classifier,
            output_units: config.output_units,
            mask_zero: config.mask_zero,
        })
    }

    /// Maps `(batch, seq_len)` token ids to a `(batch,)` tensor of
    /// positive-class probabilities.
    pub fn forward(&self, input_ids: &Tensor) -> Result<Tensor> {
        let xs = self.embedding.forward(input_ids)?;
        let mask = if self.mask_zero {
            Some(input_ids.ne(PAD_ID)?.to_dtype(DType::F32)?)
        } else {
            None
        };
        let mut xs = self.encoder.forward(&xs, mask.as_ref())?;
        for layer in &self.dense {
            xs = layer.forward(&xs)?;
        }
        let logits = self.classifier.forward(&xs)?;

        let probs = if self.output_units == 1 {
            candle_nn::ops::sigmoid(&logits)?
        } else {
            candle_nn::ops::softmax(&logits, D::Minus1)?.narrow(1, 1, 1)?
        };
        Ok(probs.squeeze(1)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use std::collections::HashMap;

    fn tensor(data: &[f32], shape: &[usize]) -> Tensor {
        Tensor::from_slice(data, shape, &Device::Cpu).unwrap()
    }

    fn pooling_network(
        classifier_weight: [f32; 2],
        output_units: usize,
        mask_zero: bool,
    ) -> SentimentNetwork {
        let config = ModelConfig {
            vocab_size: 3,
            embedding_dim: 2,
            mask_zero,
            encoder: EncoderConfig::GlobalAveragePooling,
            dense: Vec::new(),
            output_units,
        };
        let mut tensors = HashMap::new();
        tensors.insert(
            "embedding.weight".to_string(),
            tensor(&[0.0, 0.0, 4.0, 0.0, 0.0, 4.0], &[3, 2]),
        );
        if output_units == 1 {
            tensors.insert("classifier.weight".to_string(), tensor(&classifier_weight, &[1, 2]));
            tensors.insert("classifier.bias".to_string(), tensor(&[0.0], &[1]));
        } else {
            let [a, b] = classifier_weight;
            let w = [-a, -b, a, b];
            tensors.insert("classifier.weight".to_string(), tensor(&w, &[2, 2]));
            tensors.insert("classifier.bias".to_string(), tensor(&[0.0, 0.0], &[2]));
        }
        let vb = VarBuilder::from_tensors(tensors, DType::F32, &Device::Cpu);
        SentimentNetwork::load(vb, &config).unwrap()
    }

    fn positive_prob(network: &SentimentNetwork, ids: &[u32]) -> f32 {
        let input = Tensor::new(ids, &Device::Cpu).unwrap().unsqueeze(0).unwrap();
        network.forward(&input).unwrap().to_vec1::<f32>().unwrap()[0]
    }

    #[test]
    fn padding_only_input_is_undecided() {
        let network = pooling_network([1.0, -1.0], 1, false);
        assert!((positive_prob(&network, &[0, 0, 0, 0]) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn sigmoid_head_follows_token_polarity() {
        let network = pooling_network([1.0, -1.0], 1, false);
        assert!(positive_prob(&network, &[1, 1, 0, 0]) > 0.5);
        assert!(positive_prob(&network, &[2, 2, 0, 0]) < 0.5);
    }

    #[test]
    fn softmax_head_reads_positive_column() {
        let network = pooling_network([1.0, -1.0], 2, false);
        let p = positive_prob(&network, &[1, 0]);
        // mean embedding [2, 0]; logits [-2, 2]
        let expected = 1.0 / (1.0 + (-4.0f32).exp());
        assert!((p - expected).abs() < 1e-5);
    }

    fn lstm_network(mask_zero: bool) -> SentimentNetwork {
        let units = 2;
        let config = ModelConfig {
            vocab_size: 4,
            embedding_dim: 3,
            mask_zero,
            encoder: EncoderConfig::Lstm { units },
            dense: vec![DenseConfig {
                units: 2,
                activation: DenseActivation::Relu,
            }],
            output_units: 1,
        };
        let mut tensors = HashMap::new();
        let fill = |n: usize, v: f32| vec![v; n];
        tensors.insert("embedding.weight".to_string(), tensor(&fill(12, 0.1), &[4, 3]));
        tensors.insert("lstm.weight_ih_l0".to_string(), tensor(&fill(4 * units * 3, 0.2), &[4 * units, 3]));
        tensors.insert("lstm.weight_hh_l0".to_string(), tensor(&fill(4 * units * units, 0.1), &[4 * units, units]));
        tensors.insert("lstm.bias_ih_l0".to_string(), tensor(&fill(4 * units, 0.0), &[4 * units]));
        tensors.insert("lstm.bias_hh_l0".to_string(), tensor(&fill(4 * units, 0.0), &[4 * units]));
        tensors.insert("dense.0.weight".to_string(), tensor(&fill(4, 0.5), &[2, 2]));
        tensors.insert("dense.0.bias".to_string(), tensor(&fill(2, 0.0), &[2]));
        tensors.insert("classifier.weight".to_string(), tensor(&[1.0, 1.0], &[1, 2]));
        tensors.insert("classifier.bias".to_string(), tensor(&[0.0], &[1]));
        let vb = VarBuilder::from_tensors(tensors, DType::F32, &Device::Cpu);
        SentimentNetwork::load(vb, &config).unwrap()
    }

    #[test]
    fn lstm_network_produces_a_probability() {
        let p = positive_prob(&lstm_network(false), &[1, 2, 3, 0, 0]);
        // Every weight is positive, so the hidden state and logit are too.
        assert!(p > 0.5 && p < 1.0);
    }

    #[test]
    fn masked_pooling_averages_real_tokens_only() {
        let network = pooling_network([1.0, -1.0], 1, true);
        let p = positive_prob(&network, &[1, 0, 0, 0]);
        // mean over the single real token is [4, 0], not [1, 0]
        let expected = 1.0 / (1.0 + (-4.0f32).exp());
        assert!((p - expected).abs() < 1e-5);
    }

    #[test]
    fn masked_pooling_of_padding_only_is_undecided() {
        let network = pooling_network([1.0, -1.0], 1, true);
        assert!((positive_prob(&network, &[0, 0, 0]) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn masked_lstm_stops_at_the_last_real_token() {
        let masked = positive_prob(&lstm_network(true), &[1, 2, 0, 0, 0]);
        let unpadded = positive_prob(&lstm_network(false), &[1, 2]);
        assert!((masked - unpadded).abs() < 1e-6);
    }

    #[test]
    fn masked_lstm_of_padding_only_keeps_zero_state() {
        // zero hidden state -> relu(0) -> logit 0
        let p = positive_prob(&lstm_network(true), &[0, 0, 0]);
        assert!((p - 0.5).abs() < 1e-6);
    }

    #[test]
    fn rejects_multiclass_heads() {
        let config = ModelConfig {
            vocab_size: 3,
            embedding_dim: 2,
            mask_zero: false,
            encoder: EncoderConfig::GlobalAveragePooling,
            dense: Vec::new(),
            output_units: 3,
        };
        let vb = VarBuilder::from_tensors(HashMap::new(), DType::F32, &Device::Cpu);
        assert!(matches!(
            SentimentNetwork::load(vb, &config),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn missing_weights_are_a_candle_error() {
        let config = ModelConfig {
            vocab_size: 3,
            embedding_dim: 2,
            mask_zero: false,
            encoder: EncoderConfig::GlobalAveragePooling,
            dense: Vec::new(),
            output_units: 1,
        };
        let vb = VarBuilder::from_tensors(HashMap::new(), DType::F32, &Device::Cpu);
        assert!(matches!(
            SentimentNetwork::load(vb, &config),
            Err(Error::CandleError(_))
        ));
    }
}
