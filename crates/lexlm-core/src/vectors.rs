//! Pretrained word vectors in GloVe text format (`word f1 f2 ...`).

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use candle_core::{Device, Tensor};
use tracing::{debug, info};

use crate::error::{LexError, Result};
use crate::vocab::Vocabulary;

/// Word vectors keyed by token.
#[derive(Debug, Clone, Default)]
pub struct PretrainedVectors {
    dim: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl PretrainedVectors {
    /// Reads a GloVe-style text file. Every line must have the same width.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);

        let mut out = Self::default();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let mut fields = line.split_whitespace();
            let Some(word) = fields.next() else {
                continue;
            };
            let values = fields
                .map(str::parse::<f32>)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| {
                    LexError::InvalidVectors(format!("{}:{}: {}", path.display(), idx + 1, e))
                })?;
            out.insert(word, values).map_err(|e| match e {
                LexError::InvalidVectors(msg) => {
                    LexError::InvalidVectors(format!("{}:{}: {}", path.display(), idx + 1, msg))
                }
                other => other,
            })?;
        }

        info!(path = %path.display(), words = out.len(), dim = out.dim, "Loaded pretrained vectors");
        Ok(out)
    }

    /// Adds one vector. The first insert fixes the dimension.
    pub fn insert(&mut self, word: &str, values: Vec<f32>) -> Result<()> {
        if values.is_empty() {
            return Err(LexError::InvalidVectors(format!("empty vector for {word:?}")));
        }
        if self.vectors.is_empty() {
            self.dim = values.len();
        } else if values.len() != self.dim {
            return Err(LexError::InvalidVectors(format!(
                "vector for {word:?} has {} values, expected {}",
                values.len(),
                self.dim
            )));
        }
        self.vectors.insert(word.to_string(), values);
        Ok(())
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn get(&self, word: &str) -> Option<&[f32]> {
        self.vectors.get(word).map(Vec::as_slice)
    }

    /// Builds a `(vocab_len, dim)` table aligned with `vocab`. Words without a
    /// pretrained vector get a zero row.
    pub fn table_for(&self, vocab: &Vocabulary, dim: usize, device: &Device) -> Result<Tensor> {
        if self.dim != dim {
            return Err(LexError::InvalidVectors(format!(
                "pretrained dimension {} does not match embedding size {}",
                self.dim, dim
            )));
        }

        let mut data = vec![0f32; vocab.len() * dim];
        let mut hits = 0usize;
        for (id, token) in vocab.tokens().iter().enumerate() {
            if let Some(vec) = self.get(token) {
                data[id * dim..(id + 1) * dim].copy_from_slice(vec);
                hits += 1;
            }
        }
        debug!(hits, vocab = vocab.len(), "Aligned pretrained vectors with vocabulary");

        Ok(Tensor::from_vec(data, (vocab.len(), dim), device)?)
    }
}
