//! # Token Vocabulary
//!
//! Bidirectional mapping between token strings and integer ids. Id 0 is
//! always the padding token.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Padding token, always id 0.
pub const PAD_TOKEN: &str = "<pad>";
/// Unknown-word token, id 1 in corpus-built vocabularies.
pub const UNK_TOKEN: &str = "<unk>";

/// Token vocabulary with reverse lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    itos: Vec<String>,
    #[serde(skip)]
    stoi: HashMap<String, u32>,
}

impl Vocabulary {
    /// Builds a vocabulary holding `<pad>` followed by `tokens` in order.
    /// Duplicates are ignored.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut vocab = Self {
            itos: Vec::new(),
            stoi: HashMap::new(),
        };
        vocab.insert(PAD_TOKEN);
        for token in tokens {
            vocab.insert(token.as_ref());
        }
        vocab
    }

    /// Builds a vocabulary from a token stream, the way the training split is
    /// indexed: `<pad>`, `<unk>`, then tokens by descending frequency with ties
    /// broken lexicographically.
    pub fn build<'a, I>(tokens: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for token in tokens {
            *counts.entry(token).or_default() += 1;
        }
        counts.remove(PAD_TOKEN);
        counts.remove(UNK_TOKEN);

        let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
        ranked.sort_by(|(a, ca), (b, cb)| cb.cmp(ca).then_with(|| a.cmp(b)));

        Self::from_tokens(std::iter::once(UNK_TOKEN).chain(ranked.into_iter().map(|(t, _)| t)))
    }

    fn insert(&mut self, token: &str) {
        if self.stoi.contains_key(token) {
            return;
        }
        self.stoi.insert(token.to_string(), self.itos.len() as u32);
        self.itos.push(token.to_string());
    }

    /// Number of entries, including special tokens.
    pub fn len(&self) -> usize {
        self.itos.len()
    }

    /// Always false: the padding token is present in every vocabulary.
    pub fn is_empty(&self) -> bool {
        self.itos.is_empty()
    }

    /// Id of the padding token.
    pub fn pad_id(&self) -> u32 {
        0
    }

    /// Id of `<unk>`, if this vocabulary has one.
    pub fn unk_id(&self) -> Option<u32> {
        self.stoi.get(UNK_TOKEN).copied()
    }

    /// Exact lookup.
    pub fn get(&self, token: &str) -> Option<u32> {
        self.stoi.get(token).copied()
    }

    /// Lookup falling back to `<unk>`, or `<pad>` when there is no `<unk>`.
    pub fn id(&self, token: &str) -> u32 {
        self.get(token)
            .or_else(|| self.unk_id())
            .unwrap_or_else(|| self.pad_id())
    }

    /// Reverse lookup.
    pub fn token(&self, id: u32) -> Option<&str> {
        self.itos.get(id as usize).map(String::as_str)
    }

    /// Tokens in id order.
    pub fn tokens(&self) -> &[String] {
        &self.itos
    }

    /// Writes the vocabulary as JSON, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }

    /// Reads a vocabulary written by [`Vocabulary::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut vocab: Self = serde_json::from_str(&content)?;
        vocab.stoi = vocab
            .itos
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i as u32))
            .collect();
        Ok(vocab)
    }
}
