//! Recurrent language model: embedding encoder, recurrent stack, softmax decoder.

use candle_core::{D, Tensor};
use candle_nn::{Dropout, Embedding, Linear, Module};

use crate::error::Result;
use crate::model::params::ParamStore;
use crate::model::recurrent::{CellKind, HiddenState, RecurrentStack};

/// Range of the uniform init for encoder and decoder weights.
const INIT_RANGE: f64 = 0.1;

pub struct RnnLanguageModel {
    encoder: Embedding,
    rnn: RecurrentStack,
    decoder: Linear,
    dropout: Dropout,
    ntokens: usize,
}

impl RnnLanguageModel {
    /// Builds the model. With `tied`, the decoder reuses the encoder matrix,
    /// which requires `nhid == emsize` (checked by the caller).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cell: CellKind,
        ntokens: usize,
        emsize: usize,
        nhid: usize,
        nlayers: usize,
        dropout: f32,
        tied: bool,
        params: &mut ParamStore,
    ) -> Result<Self> {
        let encoder_weight = params.uniform("encoder.weight", (ntokens, emsize), INIT_RANGE)?;
        let rnn = RecurrentStack::new(cell, emsize, nhid, nlayers, dropout, params)?;
        let decoder_weight = if tied {
            encoder_weight.clone()
        } else {
            params.uniform("decoder.weight", (ntokens, nhid), INIT_RANGE)?
        };
        let decoder_bias = params.zeros("decoder.bias", ntokens)?;

        Ok(Self {
            encoder: Embedding::new(encoder_weight, emsize),
            rnn,
            decoder: Linear::new(decoder_weight, Some(decoder_bias)),
            dropout: Dropout::new(dropout),
            ntokens,
        })
    }

    pub fn encoder(&self) -> &Embedding {
        &self.encoder
    }

    pub fn ntokens(&self) -> usize {
        self.ntokens
    }

    pub fn init_hidden(&self, batch_size: usize) -> Result<HiddenState> {
        self.rnn.zero_state(batch_size, self.encoder.embeddings().device())
    }

    /// Log-probabilities of shape `(batch * seq, ntokens)` for `text` of
    /// shape `(batch, seq)`, plus the state after the window.
    pub fn forward(&self, text: &Tensor, hidden: &HiddenState, train: bool) -> Result<(Tensor, HiddenState)> {
        let (batch, seq) = text.dims2()?;
        let emb = self.dropout.forward(&self.encoder.forward(text)?, train)?;
        let (output, hidden) = self.rnn.forward(&emb, hidden, train)?;
        let output = self.dropout.forward(&output, train)?;
        let logits = self
            .decoder
            .forward(&output.reshape((batch * seq, self.rnn.hidden_size()))?)?;
        let log_probs = candle_nn::ops::log_softmax(&logits, D::Minus1)?;
        Ok((log_probs, hidden))
    }

    /// Mean negative log-likelihood of `target` (same shape as the input text).
    pub fn loss(&self, log_probs: &Tensor, target: &Tensor) -> Result<Tensor> {
        Ok(candle_nn::loss::nll(log_probs, &target.flatten_all()?)?)
    }
}
