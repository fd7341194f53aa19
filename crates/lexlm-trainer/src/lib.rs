//! # lexlm Trainer
//!
//! Command-line configuration, optimization, checkpointing, and embedding
//! export for training lexical language models.

pub mod checkpoint;
pub mod config;
pub mod export;
pub mod interrupt;
pub mod metrics;
pub mod optim;
pub mod scheduler;
pub mod trainer;

pub use checkpoint::BestCheckpoint;
pub use config::{ArtifactPaths, TrainArgs, TrainConfig};
pub use export::{export_embeddings, write_embeddings_binary, write_embeddings_text};
pub use interrupt::watch_interrupts;
pub use metrics::{LossAccumulator, LossAverages};
pub use optim::{LexOptimizer, OptimizerKind, clip_grad_norm};
pub use scheduler::MultiStepLr;
pub use trainer::{RunSummary, Split, TrainOutcome, Trainer};
