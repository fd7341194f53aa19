//! # Batching
//!
//! Turns annotated windows into id tensors. Windows are consumed in order so
//! that row *i* of consecutive batches continues the same stream of text,
//! which lets the recurrent state carry over between batches.

use candle_core::{Device, Tensor};

use crate::corpus::Example;
use crate::error::{LexError, Result};
use crate::relation::{Relation, encode_pairs};
use crate::vocab::Vocabulary;

/// One training step's worth of input.
#[derive(Debug, Clone)]
pub struct Batch {
    /// `(batch, seq_len)` input ids.
    pub text: Tensor,
    /// `(batch, seq_len)` next-token ids.
    pub target: Tensor,
    /// `(N, 2)` id pairs per relation, indexed by [`Relation::index`].
    pub relations: [Tensor; 4],
}

impl Batch {
    /// Encodes `examples` into tensors on `device`.
    pub fn from_examples(examples: &[Example], vocab: &Vocabulary, device: &Device) -> Result<Self> {
        if examples.is_empty() {
            return Err(LexError::Batch("cannot build a batch from zero examples".into()));
        }

        let batch_size = examples.len();
        let seq_len = examples
            .iter()
            .map(|e| e.text.len().max(e.target.len()))
            .max()
            .unwrap_or(0);
        if seq_len == 0 {
            return Err(LexError::Batch("every window in the batch is empty".into()));
        }

        let pad = vocab.pad_id();
        let mut text = vec![pad; batch_size * seq_len];
        let mut target = vec![pad; batch_size * seq_len];
        for (row, example) in examples.iter().enumerate() {
            let offset = row * seq_len;
            for (col, tok) in example.text.iter().enumerate() {
                text[offset + col] = vocab.id(tok);
            }
            for (col, tok) in example.target.iter().enumerate() {
                target[offset + col] = vocab.id(tok);
            }
        }

        let relations = Relation::ALL.map(|relation| {
            let pairs: Vec<u32> = examples
                .iter()
                .flat_map(|e| encode_pairs(e.relation(relation), vocab))
                .flatten()
                .collect();
            let rows = pairs.len() / 2;
            Tensor::from_vec(pairs, (rows, 2), device)
        });
        let [syn, ant, hyp, mer] = relations;

        Ok(Self {
            text: Tensor::from_vec(text, (batch_size, seq_len), device)?,
            target: Tensor::from_vec(target, (batch_size, seq_len), device)?,
            relations: [syn?, ant?, hyp?, mer?],
        })
    }

    /// Number of windows in the batch.
    pub fn batch_size(&self) -> Result<usize> {
        Ok(self.text.dim(0)?)
    }

    /// Relation pairs for `relation`.
    pub fn pairs(&self, relation: Relation) -> &Tensor {
        &self.relations[relation.index()]
    }
}

/// Sequential, non-shuffling iterator over a split.
pub struct BatchIterator<'a> {
    examples: &'a [Example],
    vocab: &'a Vocabulary,
    device: &'a Device,
    batch_size: usize,
    position: usize,
}

impl<'a> BatchIterator<'a> {
    pub fn new(
        examples: &'a [Example],
        vocab: &'a Vocabulary,
        device: &'a Device,
        batch_size: usize,
    ) -> Self {
        Self {
            examples,
            vocab,
            device,
            batch_size: batch_size.max(1),
            position: 0,
        }
    }

    /// Total number of batches in the split, including a short last one.
    pub fn num_batches(&self) -> usize {
        self.examples.len().div_ceil(self.batch_size)
    }
}

impl Iterator for BatchIterator<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.examples.len() {
            return None;
        }
        let end = (self.position + self.batch_size).min(self.examples.len());
        let chunk = &self.examples[self.position..end];
        self.position = end;
        Some(Batch::from_examples(chunk, self.vocab, self.device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example(text: &[&str], target: &[&str], hyp: &[&str]) -> Example {
        Example {
            text: text.iter().map(|s| s.to_string()).collect(),
            target: target.iter().map(|s| s.to_string()).collect(),
            hypernyms: hyp.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_batch_shapes_and_padding() {
        let vocab = Vocabulary::from_tokens(["a", "b", "c"]);
        let examples = vec![
            example(&["a", "b", "c"], &["b", "c", "a"], &["a,b", "c,a"]),
            example(&["c"], &["a"], &[]),
        ];

        let batch = Batch::from_examples(&examples, &vocab, &Device::Cpu).unwrap();
        assert_eq!(batch.text.dims(), &[2, 3]);
        assert_eq!(
            batch.text.to_vec2::<u32>().unwrap(),
            vec![vec![1, 2, 3], vec![3, 0, 0]]
        );
        assert_eq!(
            batch.target.to_vec2::<u32>().unwrap(),
            vec![vec![2, 3, 1], vec![1, 0, 0]]
        );

        let hyp = batch.pairs(Relation::Hypernym).to_vec2::<u32>().unwrap();
        assert_eq!(hyp, vec![vec![1, 2], vec![3, 1], vec![0, 0]]);
        // Neither window annotates synonyms: one padding row each.
        assert_eq!(batch.pairs(Relation::Synonym).dims(), &[2, 2]);
    }

    #[test]
    fn test_iterator_yields_short_last_batch() {
        let vocab = Vocabulary::from_tokens(["a"]);
        let examples: Vec<Example> = (0..5).map(|_| example(&["a"], &["a"], &[])).collect();

        let iter = BatchIterator::new(&examples, &vocab, &Device::Cpu, 2);
        assert_eq!(iter.num_batches(), 3);

        let sizes: Vec<usize> = iter.map(|b| b.unwrap().batch_size().unwrap()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn test_empty_batch_rejected() {
        let vocab = Vocabulary::from_tokens(["a"]);
        assert!(Batch::from_examples(&[], &vocab, &Device::Cpu).is_err());
        let empty = vec![example(&[], &[], &[])];
        assert!(Batch::from_examples(&empty, &vocab, &Device::Cpu).is_err());
    }
}
