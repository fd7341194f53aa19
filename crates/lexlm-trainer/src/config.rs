//! Command-line configuration for a training run.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use candle_core::Device;
use clap::{Parser, ValueEnum};
use lexlm_core::{
    CellKind, Distance, ModelConfig, ModelVariant, ObjectiveConfig, ProjectionMode, Relation,
    RelationSet, SplitPaths,
};
use tracing::warn;

use crate::optim::OptimizerKind;

/// Recurrent cell type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CellArg {
    RnnTanh,
    RnnRelu,
    Lstm,
    Gru,
}

impl From<CellArg> for CellKind {
    fn from(arg: CellArg) -> Self {
        match arg {
            CellArg::RnnTanh => CellKind::RnnTanh,
            CellArg::RnnRelu => CellKind::RnnRelu,
            CellArg::Lstm => CellKind::Lstm,
            CellArg::Gru => CellKind::Gru,
        }
    }
}

/// Lexical relation selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RelationArg {
    Syn,
    Ant,
    Hyp,
    Mer,
}

impl From<RelationArg> for Relation {
    fn from(arg: RelationArg) -> Self {
        match arg {
            RelationArg::Syn => Relation::Synonym,
            RelationArg::Ant => Relation::Antonym,
            RelationArg::Hyp => Relation::Hypernym,
            RelationArg::Mer => Relation::Meronym,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DistanceArg {
    Pairwise,
    Cosine,
}

impl From<DistanceArg> for Distance {
    fn from(arg: DistanceArg) -> Self {
        match arg {
            DistanceArg::Pairwise => Distance::Pairwise,
            DistanceArg::Cosine => Distance::Cosine,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OptimArg {
    Sgd,
    Adam,
}

impl From<OptimArg> for OptimizerKind {
    fn from(arg: OptimArg) -> Self {
        match arg {
            OptimArg::Sgd => OptimizerKind::Sgd,
            OptimArg::Adam => OptimizerKind::Adam,
        }
    }
}

/// CLI arguments
#[derive(Parser, Debug, Clone)]
#[command(name = "train")]
#[command(about = "Train a recurrent language model with lexical-relation objectives")]
#[command(version)]
#[command(args_override_self = true)]
pub struct TrainArgs {
    /// Corpus name; selects the directory under --data-root and the LR milestones
    #[arg(long, default_value = "wikitext-2")]
    pub data: String,

    /// Root directory holding corpora
    #[arg(long, default_value = "data")]
    pub data_root: PathBuf,

    /// Recurrent cell type
    #[arg(long, value_enum, default_value_t = CellArg::Lstm)]
    pub model: CellArg,

    /// Lexical relation to train on (repeatable)
    #[arg(short = 'l', long = "lex", value_enum)]
    pub lex: Vec<RelationArg>,

    /// Size of word embeddings
    #[arg(long, default_value_t = 300)]
    pub emsize: usize,

    /// Number of hidden units per layer
    #[arg(long, default_value_t = 300)]
    pub nhid: usize,

    /// Dimension of the lexical subspace
    #[arg(long, alias = "wn_hid", default_value_t = 100)]
    pub wn_hid: usize,

    /// Margin of the antonym hinge loss
    #[arg(long, default_value_t = 1.0)]
    pub margin: f64,

    /// Number of recurrent layers
    #[arg(long, default_value_t = 2)]
    pub nlayers: usize,

    /// Initial learning rate
    #[arg(long, default_value_t = 0.001)]
    pub lr: f64,

    /// Gradient norm clipping threshold
    #[arg(long, default_value_t = 0.25)]
    pub clip: f64,

    /// Upper epoch limit
    #[arg(long, default_value_t = 14)]
    pub epochs: usize,

    /// Batch size
    #[arg(long, default_value_t = 20)]
    pub batch_size: usize,

    /// Sequence length of the annotated windows
    #[arg(long, default_value_t = 35)]
    pub bptt: usize,

    /// Dropout applied to layers (0 = no dropout)
    #[arg(long, default_value_t = 0.2)]
    pub dropout: f32,

    /// Tie the word embedding and softmax weights
    #[arg(long)]
    pub tied: bool,

    /// Random seed
    #[arg(long, default_value_t = 1111)]
    pub seed: u64,

    /// Use CUDA
    #[arg(long)]
    pub cuda: bool,

    /// CUDA device ordinal
    #[arg(long, default_value_t = 0)]
    pub gpu: usize,

    /// Retrofit pretrained vectors instead of training a language model
    #[arg(long)]
    pub retro: bool,

    /// Pretrained word vectors (GloVe text format), required by --retro
    #[arg(long)]
    pub vectors: Option<PathBuf>,

    /// Report interval in batches
    #[arg(long, default_value_t = 200)]
    pub log_interval: usize,

    /// Directory for model checkpoints and the vocabulary
    #[arg(long, default_value = "models")]
    pub save: PathBuf,

    /// Directory for exported embeddings
    #[arg(long, default_value = "embeddings")]
    pub save_emb: PathBuf,

    /// Distance between related embeddings
    #[arg(long, value_enum, default_value_t = DistanceArg::Pairwise)]
    pub distance: DistanceArg,

    /// Optimizer
    #[arg(long, value_enum, default_value_t = OptimArg::Sgd)]
    pub optim: OptimArg,

    /// Add the projection orthogonality regularizer
    #[arg(long)]
    pub reg: bool,

    /// Segregated LM and lexical model
    #[arg(long)]
    pub seg: bool,

    /// Fix lexical projections to the identity matrix
    #[arg(long, alias = "fixed_wn")]
    pub fixed_wn: bool,

    /// Fix lexical projections to a random matrix
    #[arg(long, alias = "random_wn")]
    pub random_wn: bool,

    /// Ignore the cached examples and re-parse the corpus
    #[arg(long)]
    pub reparse: bool,

    /// Epochs after which the learning rate decays (default depends on --data)
    #[arg(long, value_delimiter = ',')]
    pub milestones: Vec<usize>,

    /// Learning-rate decay factor at each milestone
    #[arg(long, default_value_t = 0.1)]
    pub gamma: f64,

    /// Stop after this many epochs without validation improvement
    #[arg(long)]
    pub early_stop: Option<usize>,
}

/// Output locations, named after the run's configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub vocab: PathBuf,
    pub model: PathBuf,
    pub embeddings_bin: PathBuf,
    pub embeddings_txt: PathBuf,
}

impl ArtifactPaths {
    pub fn new(save: &Path, save_emb: &Path, data: &str, stem: &str) -> Self {
        Self {
            vocab: save.join(format!("vocab_{data}.json")),
            model: save.join(format!("model_{stem}.safetensors")),
            embeddings_bin: save_emb.join(format!("emb_{stem}.safetensors")),
            embeddings_txt: save_emb.join(format!("emb_{stem}.txt")),
        }
    }
}

/// Fully resolved run configuration.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub data: String,
    pub splits: SplitPaths,
    pub reparse: bool,
    /// `ntokens` is filled in once the vocabulary is built.
    pub model: ModelConfig,
    /// `pad_id` is filled in once the vocabulary is built.
    pub objective: ObjectiveConfig,
    pub optimizer: OptimizerKind,
    pub lr: f64,
    pub clip: f64,
    pub epochs: usize,
    pub batch_size: usize,
    pub log_interval: usize,
    pub milestones: Vec<usize>,
    pub gamma: f64,
    pub early_stop: Option<usize>,
    pub seed: u64,
    pub cuda: Option<usize>,
    pub vectors: Option<PathBuf>,
    pub artifacts: ArtifactPaths,
}

/// Default LR milestones for a corpus.
pub fn default_milestones(data: &str) -> Vec<usize> {
    if data == "wikitext-103" {
        vec![4, 6, 8]
    } else {
        vec![10, 25, 35, 45]
    }
}

impl TrainArgs {
    /// Validates the flags and resolves them into a [`TrainConfig`].
    pub fn resolve(self) -> Result<TrainConfig> {
        if self.batch_size == 0 || self.bptt == 0 {
            bail!("--batch-size and --bptt must be positive");
        }
        if self.log_interval == 0 {
            bail!("--log-interval must be positive");
        }
        if self.seg && self.retro {
            bail!("--seg and --retro select different models; pass only one");
        }
        if self.fixed_wn && self.random_wn {
            bail!("--fixed-wn and --random-wn are mutually exclusive");
        }
        if self.retro && self.vectors.is_none() {
            bail!("--retro needs pretrained vectors (--vectors <FILE>)");
        }
        if self.tied && self.nhid != self.emsize {
            bail!("--tied needs --nhid equal to --emsize");
        }
        if !(self.gamma > 0.0 && self.gamma <= 1.0) {
            bail!("--gamma must be in (0, 1]");
        }

        // `syn` has always trained antonyms alongside synonyms.
        let mut relations: RelationSet = self.lex.iter().copied().map(Relation::from).collect();
        if relations.contains(Relation::Synonym) {
            relations = relations.with(Relation::Antonym);
        }
        let lex_tag = self
            .lex
            .iter()
            .map(|r| Relation::from(*r).short_name())
            .collect::<Vec<_>>()
            .join("_");

        let variant = if self.retro {
            ModelVariant::Retrofit
        } else if self.seg {
            ModelVariant::Segregated
        } else {
            ModelVariant::Joint
        };
        let projection = if self.fixed_wn {
            ProjectionMode::Identity
        } else if self.random_wn {
            ProjectionMode::Random
        } else {
            ProjectionMode::Learned
        };
        let distance = Distance::from(self.distance);

        let model = ModelConfig {
            variant,
            cell: self.model.into(),
            ntokens: 0,
            emsize: self.emsize,
            nhid: self.nhid,
            nlayers: self.nlayers,
            wn_hid: self.wn_hid,
            dropout: self.dropout,
            tied: self.tied,
            projection,
            distance,
        };
        let objective = ObjectiveConfig {
            relations,
            distance,
            margin: self.margin,
            regularize: self.reg,
            pad_id: 0,
        };

        let corpus_dir = self
            .data_root
            .join(&self.data)
            .join(format!("annotated_{}_{}", self.bptt, self.batch_size));
        let stem = format!(
            "{}_{}_{}_{}_{}_{}_{}",
            self.data, lex_tag, self.emsize, self.nhid, self.wn_hid, distance, self.retro
        );
        let milestones = if self.milestones.is_empty() {
            default_milestones(&self.data)
        } else {
            self.milestones
        };

        Ok(TrainConfig {
            artifacts: ArtifactPaths::new(&self.save, &self.save_emb, &self.data, &stem),
            data: self.data,
            splits: SplitPaths::in_dir(corpus_dir),
            reparse: self.reparse,
            model,
            objective,
            optimizer: self.optim.into(),
            lr: self.lr,
            clip: self.clip,
            epochs: self.epochs,
            batch_size: self.batch_size,
            log_interval: self.log_interval,
            milestones,
            gamma: self.gamma,
            early_stop: self.early_stop,
            seed: self.seed,
            cuda: self.cuda.then_some(self.gpu),
            vectors: if self.retro { self.vectors } else { None },
        })
    }
}

impl TrainConfig {
    /// Device selected by `--cuda` / `--gpu`.
    pub fn device(&self) -> Result<Device> {
        match self.cuda {
            Some(ordinal) => Ok(Device::new_cuda(ordinal)?),
            None => {
                if candle_core::utils::cuda_is_available() {
                    warn!("A CUDA device is available; run with --cuda to use it");
                }
                Ok(Device::Cpu)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> TrainArgs {
        TrainArgs::try_parse_from(std::iter::once("train").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]).resolve().unwrap();
        assert_eq!(config.model.variant, ModelVariant::Joint);
        assert_eq!(config.model.cell, CellKind::Lstm);
        assert_eq!(config.model.emsize, 300);
        assert_eq!(config.batch_size, 20);
        assert!(config.objective.relations.is_empty());
        assert_eq!(config.milestones, vec![10, 25, 35, 45]);
        assert_eq!(
            config.splits.dir,
            PathBuf::from("data/wikitext-2/annotated_35_20")
        );
        assert!(config.vectors.is_none());
        assert!(config.cuda.is_none());
    }

    #[test]
    fn test_relations_and_artifact_names() {
        let config = parse(&["--lex", "syn", "-l", "hyp", "--distance", "cosine", "--seg"])
            .resolve()
            .unwrap();
        let rels = config.objective.relations;
        assert!(rels.contains(Relation::Synonym));
        assert!(rels.contains(Relation::Antonym));
        assert!(rels.contains(Relation::Hypernym));
        assert!(!rels.contains(Relation::Meronym));
        assert_eq!(config.model.variant, ModelVariant::Segregated);

        assert_eq!(
            config.artifacts.model,
            PathBuf::from("models/model_wikitext-2_syn_hyp_300_300_100_cosine_false.safetensors")
        );
        assert_eq!(
            config.artifacts.embeddings_txt,
            PathBuf::from("embeddings/emb_wikitext-2_syn_hyp_300_300_100_cosine_false.txt")
        );
        assert_eq!(config.artifacts.vocab, PathBuf::from("models/vocab_wikitext-2.json"));
    }

    #[test]
    fn test_antonym_alone_stays_alone() {
        let config = parse(&["--lex", "ant"]).resolve().unwrap();
        assert!(config.objective.relations.contains(Relation::Antonym));
        assert!(!config.objective.relations.contains(Relation::Synonym));
    }

    #[test]
    fn test_milestones() {
        assert_eq!(parse(&["--data", "wikitext-103"]).resolve().unwrap().milestones, vec![4, 6, 8]);
        assert_eq!(parse(&["--milestones", "2,5"]).resolve().unwrap().milestones, vec![2, 5]);
    }

    #[test]
    fn test_retro_and_projection_modes() {
        let config = parse(&["--retro", "--random-wn", "--vectors", "v.txt"]).resolve().unwrap();
        assert_eq!(config.model.variant, ModelVariant::Retrofit);
        assert_eq!(config.model.projection, ProjectionMode::Random);
        assert_eq!(config.vectors, Some(PathBuf::from("v.txt")));
        assert!(config.artifacts.model.to_string_lossy().ends_with("_true.safetensors"));
    }

    #[test]
    fn test_conflicting_flags_rejected() {
        assert!(parse(&["--seg", "--retro"]).resolve().is_err());
        assert!(parse(&["--fixed-wn", "--random-wn"]).resolve().is_err());
        assert!(parse(&["--batch-size", "0"]).resolve().is_err());
        assert!(parse(&["--log-interval", "0"]).resolve().is_err());
        assert!(parse(&["--retro"]).resolve().is_err());
        assert!(parse(&["--tied", "--nhid", "200"]).resolve().is_err());
    }

    #[test]
    fn test_underscore_flag_spellings() {
        let config = parse(&["--seg", "--wn_hid", "40", "--fixed_wn"]).resolve().unwrap();
        assert_eq!(config.model.wn_hid, 40);
        assert_eq!(config.model.projection, ProjectionMode::Identity);

        let config = parse(&["--seg", "--random_wn"]).resolve().unwrap();
        assert_eq!(config.model.projection, ProjectionMode::Random);
    }

    #[test]
    fn test_cuda_ordinal() {
        let config = parse(&["--cuda", "--gpu", "2"]).resolve().unwrap();
        assert_eq!(config.cuda, Some(2));
    }
}
