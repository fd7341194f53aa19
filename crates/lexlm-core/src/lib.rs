//! # lexlm Core
//!
//! Recurrent language models trained jointly with lexical-relation
//! (synonym, antonym, hypernym, meronym) objectives, built on candle.
//! Provides the annotated-corpus pipeline, vocabulary, batching, model
//! variants, and the composite loss.
//!
//! ## Quick Start
//!
//! ```rust
//! use candle_core::Device;
//! use lexlm_core::{Batch, Example, LexicalObjective, ModelConfig, ModelVariant,
//!     ObjectiveConfig, ParamStore, Relation, RelationSet, Vocabulary, build_model};
//!
//! let vocab = Vocabulary::from_tokens(["hot", "cold", "warm"]);
//! let example = Example {
//!     text: vec!["hot".into(), "warm".into()],
//!     target: vec!["warm".into(), "cold".into()],
//!     synonyms: vec!["hot,warm".into()],
//!     antonyms: vec!["hot,cold".into()],
//!     ..Default::default()
//! };
//! let batch = Batch::from_examples(&[example], &vocab, &Device::Cpu).unwrap();
//!
//! let config = ModelConfig {
//!     variant: ModelVariant::Joint,
//!     ntokens: vocab.len(),
//!     emsize: 8,
//!     nhid: 8,
//!     wn_hid: 4,
//!     ..Default::default()
//! };
//! let mut params = ParamStore::new(1111, Device::Cpu);
//! let model = build_model(&config, &mut params, None).unwrap();
//!
//! let relations = RelationSet::empty().with(Relation::Synonym).with(Relation::Antonym);
//! let objective = LexicalObjective::new(ObjectiveConfig { relations, ..Default::default() });
//! let hidden = model.init_hidden(1).unwrap();
//! let output = model.forward(&batch, hidden.as_ref(), relations, true).unwrap();
//! let (_loss, breakdown) = objective.compose(&output, &batch).unwrap();
//! assert!(breakdown.total >= breakdown.primary);
//! ```
pub mod batch;
pub mod corpus;
pub mod distance;
pub mod error;
pub mod model;
pub mod objective;
pub mod relation;
pub mod vectors;
pub mod vocab;

// Re-export primary API
pub use batch::{Batch, BatchIterator};
pub use corpus::{CorpusSplits, Example, SplitPaths, load_corpus};
pub use distance::Distance;
pub use error::{LexError, Result};
pub use model::{
    CellKind, CompositeModel, ForwardOutput, HiddenState, ModelConfig, ModelVariant, ParamStore,
    ProjectionMode, build_model,
};
pub use objective::{LexicalObjective, LossBreakdown, ObjectiveConfig, RelationEmbeddings};
pub use relation::{Relation, RelationSet};
pub use vectors::PretrainedVectors;
pub use vocab::{PAD_TOKEN, UNK_TOKEN, Vocabulary};
