//! # Lexical Relations
//!
//! The four WordNet-style relations used as auxiliary training signal, and
//! the word-pair encoding they share in annotated corpora.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::vocab::{PAD_TOKEN, Vocabulary};

/// A semantic link between two words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    Synonym,
    Antonym,
    Hypernym,
    Meronym,
}

impl Relation {
    /// All relations, in reporting order.
    pub const ALL: [Relation; 4] = [
        Relation::Synonym,
        Relation::Antonym,
        Relation::Hypernym,
        Relation::Meronym,
    ];

    /// Short tag used on the command line and in artifact names.
    pub fn short_name(self) -> &'static str {
        match self {
            Relation::Synonym => "syn",
            Relation::Antonym => "ant",
            Relation::Hypernym => "hyp",
            Relation::Meronym => "mer",
        }
    }

    /// Whether the loss for this relation ignores padded pairs.
    ///
    /// Hypernym and meronym pairs are sparse, so their mean is taken over
    /// present pairs only. Synonym and antonym losses average every row.
    pub fn is_masked(self) -> bool {
        matches!(self, Relation::Hypernym | Relation::Meronym)
    }

    /// Index into per-relation arrays.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// A set of enabled relations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelationSet([bool; 4]);

impl RelationSet {
    /// No auxiliary relation.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Adds a relation.
    pub fn with(mut self, relation: Relation) -> Self {
        self.0[relation.index()] = true;
        self
    }

    pub fn contains(&self, relation: Relation) -> bool {
        self.0[relation.index()]
    }

    pub fn is_empty(&self) -> bool {
        !self.0.iter().any(|&b| b)
    }

    /// Enabled relations in reporting order.
    pub fn iter(&self) -> impl Iterator<Item = Relation> + '_ {
        Relation::ALL.into_iter().filter(|r| self.contains(*r))
    }
}

impl FromIterator<Relation> for RelationSet {
    fn from_iter<T: IntoIterator<Item = Relation>>(iter: T) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

/// Splits `"a,b"` into a word pair. A missing second word becomes `<pad>`.
pub fn split_pair(entry: &str) -> (&str, &str) {
    let mut parts = entry.splitn(2, ',').map(str::trim);
    let first = parts.next().filter(|s| !s.is_empty()).unwrap_or(PAD_TOKEN);
    let second = parts.next().filter(|s| !s.is_empty()).unwrap_or(PAD_TOKEN);
    (first, second)
}

/// Encodes one window's relation entries as id pairs.
///
/// An empty list still yields one `(<pad>, <pad>)` row so every window
/// contributes to the batch tensor.
pub fn encode_pairs(entries: &[String], vocab: &Vocabulary) -> Vec<[u32; 2]> {
    if entries.is_empty() {
        return vec![[vocab.pad_id(); 2]];
    }
    entries
        .iter()
        .map(|entry| {
            let (a, b) = split_pair(entry);
            [vocab.id(a), vocab.id(b)]
        })
        .collect()
}
