//! # Model Composition
//!
//! A language-model backbone and a lexical module assembled into one of
//! three variants:
//!
//! - **Joint**: the lexical space is the leading `wn_hid` coordinates of the
//!   LM's own embedding table.
//! - **Segregated**: the LM and a separate lexical module share the encoder;
//!   the lexical module projects embeddings through its own matrices.
//! - **Retrofit**: no LM; pretrained vectors are adjusted under the lexical
//!   losses while being pulled toward their original values.

pub mod language;
pub mod lexical;
pub mod params;
pub mod recurrent;
pub mod retrofit;

use std::fmt;

use candle_core::Tensor;
use serde::{Deserialize, Serialize};

use crate::batch::Batch;
use crate::distance::Distance;
use crate::error::{LexError, Result};
use crate::objective::RelationEmbeddings;
use crate::relation::RelationSet;

pub use language::RnnLanguageModel;
pub use lexical::{LexicalModule, ProjectionMode};
pub use params::ParamStore;
pub use recurrent::{CellKind, HiddenState, LayerState, RecurrentStack};
pub use retrofit::RetrofitModel;

/// Which composite to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelVariant {
    #[default]
    Joint,
    Segregated,
    Retrofit,
}

impl ModelVariant {
    /// Whether the variant carries a recurrent LM (and so a validation
    /// perplexity to select checkpoints on).
    pub fn has_language_model(self) -> bool {
        !matches!(self, ModelVariant::Retrofit)
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelVariant::Joint => "joint",
            ModelVariant::Segregated => "segregated",
            ModelVariant::Retrofit => "retrofit",
        })
    }
}

/// Architecture hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub variant: ModelVariant,
    pub cell: CellKind,
    pub ntokens: usize,
    pub emsize: usize,
    pub nhid: usize,
    pub nlayers: usize,
    pub wn_hid: usize,
    pub dropout: f32,
    pub tied: bool,
    pub projection: ProjectionMode,
    /// Distance used by the retrofit primary loss.
    pub distance: Distance,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            variant: ModelVariant::Joint,
            cell: CellKind::Lstm,
            ntokens: 0,
            emsize: 300,
            nhid: 300,
            nlayers: 2,
            wn_hid: 100,
            dropout: 0.2,
            tied: false,
            projection: ProjectionMode::Learned,
            distance: Distance::Pairwise,
        }
    }
}

impl ModelConfig {
    /// Rejects inconsistent settings before any tensor is allocated.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(LexError::InvalidConfig(msg));

        if self.ntokens == 0 {
            return fail("vocabulary is empty".into());
        }
        if self.emsize == 0 || self.wn_hid == 0 {
            return fail("embedding and lexical sizes must be positive".into());
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return fail(format!("dropout {} outside [0, 1)", self.dropout));
        }
        if self.variant.has_language_model() {
            if self.nhid == 0 || self.nlayers == 0 {
                return fail("recurrent size and depth must be positive".into());
            }
            if self.tied && self.nhid != self.emsize {
                return fail(format!(
                    "tied weights need nhid == emsize (got {} and {})",
                    self.nhid, self.emsize
                ));
            }
        }
        if self.variant == ModelVariant::Joint && self.wn_hid > self.emsize {
            return fail(format!(
                "joint lexical subspace ({}) larger than embeddings ({})",
                self.wn_hid, self.emsize
            ));
        }
        Ok(())
    }
}

/// Everything a forward pass produces.
#[derive(Debug, Clone)]
pub struct ForwardOutput {
    /// LM negative log-likelihood, or retrofit distance.
    pub primary: Tensor,
    /// Recurrent state after the window, for LM variants.
    pub hidden: Option<HiddenState>,
    pub relations: RelationEmbeddings,
    pub regularizer: Option<Tensor>,
}

/// A trainable composite selected at runtime.
pub trait CompositeModel {
    fn variant(&self) -> ModelVariant;

    /// Fresh recurrent state, `None` for models without one.
    fn init_hidden(&self, batch_size: usize) -> Result<Option<HiddenState>>;

    /// Runs the model on `batch`. `train` enables dropout. Relation
    /// embeddings are produced for `relations` only.
    fn forward(
        &self,
        batch: &Batch,
        hidden: Option<&HiddenState>,
        relations: RelationSet,
        train: bool,
    ) -> Result<ForwardOutput>;

    /// The word embedding table `(ntokens, emsize)`.
    fn embeddings(&self) -> &Tensor;
}

/// Joint and segregated variants: a recurrent LM plus a lexical view of its encoder.
pub struct LanguageLexicalModel {
    variant: ModelVariant,
    lm: RnnLanguageModel,
    lexical: LexicalModule,
}

impl LanguageLexicalModel {
    pub fn new(config: &ModelConfig, params: &mut ParamStore) -> Result<Self> {
        let lm = RnnLanguageModel::new(
            config.cell,
            config.ntokens,
            config.emsize,
            config.nhid,
            config.nlayers,
            config.dropout,
            config.tied,
            params,
        )?;
        let encoder = lm.encoder().clone();
        let lexical = match config.variant {
            ModelVariant::Segregated => {
                LexicalModule::projected(encoder, config.wn_hid, config.projection, params)?
            }
            _ => LexicalModule::subspace(encoder, config.wn_hid)?,
        };
        Ok(Self {
            variant: config.variant,
            lm,
            lexical,
        })
    }
}

impl CompositeModel for LanguageLexicalModel {
    fn variant(&self) -> ModelVariant {
        self.variant
    }

    fn init_hidden(&self, batch_size: usize) -> Result<Option<HiddenState>> {
        Ok(Some(self.lm.init_hidden(batch_size)?))
    }

    fn forward(
        &self,
        batch: &Batch,
        hidden: Option<&HiddenState>,
        relations: RelationSet,
        train: bool,
    ) -> Result<ForwardOutput> {
        let batch_size = batch.batch_size()?;
        // A short final batch cannot reuse the carried state.
        let state = match hidden {
            Some(h) if h.batch_size()? == batch_size => h.clone(),
            _ => self.lm.init_hidden(batch_size)?,
        };

        let (log_probs, next) = self.lm.forward(&batch.text, &state, train)?;
        let primary = self.lm.loss(&log_probs, &batch.target)?;

        Ok(ForwardOutput {
            primary,
            hidden: Some(next),
            relations: self.lexical.relation_embeddings(batch, relations)?,
            regularizer: self.lexical.regularizer()?,
        })
    }

    fn embeddings(&self) -> &Tensor {
        self.lm.encoder().embeddings()
    }
}

/// Builds the variant named in `config`. Retrofit needs the pretrained
/// `(ntokens, emsize)` table.
pub fn build_model(
    config: &ModelConfig,
    params: &mut ParamStore,
    pretrained: Option<&Tensor>,
) -> Result<Box<dyn CompositeModel>> {
    config.validate()?;
    match config.variant {
        ModelVariant::Joint | ModelVariant::Segregated => {
            Ok(Box::new(LanguageLexicalModel::new(config, params)?))
        }
        ModelVariant::Retrofit => {
            let table = pretrained.ok_or_else(|| {
                LexError::InvalidConfig("retrofitting needs pretrained vectors".into())
            })?;
            if table.dims() != [config.ntokens, config.emsize] {
                return Err(LexError::InvalidVectors(format!(
                    "pretrained table {:?} does not match ({}, {})",
                    table.dims(),
                    config.ntokens,
                    config.emsize
                )));
            }
            Ok(Box::new(RetrofitModel::new(
                table,
                config.wn_hid,
                config.projection,
                config.distance,
                params,
            )?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    use crate::corpus::Example;
    use crate::relation::Relation;
    use crate::vocab::Vocabulary;

    fn config(variant: ModelVariant) -> ModelConfig {
        ModelConfig {
            variant,
            ntokens: 4,
            emsize: 6,
            nhid: 6,
            nlayers: 1,
            wn_hid: 3,
            dropout: 0.0,
            ..Default::default()
        }
    }

    fn batch(vocab: &Vocabulary, rows: usize) -> Batch {
        let examples: Vec<Example> = (0..rows)
            .map(|_| Example {
                text: vec!["a".into(), "b".into()],
                target: vec!["b".into(), "c".into()],
                synonyms: vec!["a,c".into()],
                hypernyms: vec!["b,c".into()],
                ..Default::default()
            })
            .collect();
        Batch::from_examples(&examples, vocab, &Device::Cpu).unwrap()
    }

    #[test]
    fn test_validate_rejects_bad_combinations() {
        let mut c = config(ModelVariant::Joint);
        c.wn_hid = 10;
        assert!(c.validate().is_err());

        let mut c = config(ModelVariant::Segregated);
        c.tied = true;
        c.nhid = 5;
        assert!(c.validate().is_err());

        let mut c = config(ModelVariant::Segregated);
        c.wn_hid = 10;
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_joint_and_segregated_forward() {
        let vocab = Vocabulary::from_tokens(["a", "b", "c"]);
        let relations = RelationSet::empty().with(Relation::Synonym).with(Relation::Hypernym);

        for variant in [ModelVariant::Joint, ModelVariant::Segregated] {
            let mut params = ParamStore::new(5, Device::Cpu);
            let model = build_model(&config(variant), &mut params, None).unwrap();
            assert_eq!(model.variant(), variant);

            let hidden = model.init_hidden(2).unwrap();
            let out = model.forward(&batch(&vocab, 2), hidden.as_ref(), relations, true).unwrap();
            assert!(out.primary.to_scalar::<f32>().unwrap() > 0.0);
            let (a, _) = out.relations.get(Relation::Synonym).unwrap();
            assert_eq!(a.dims(), &[2, 3]);
            assert_eq!(out.regularizer.is_some(), variant == ModelVariant::Segregated);
            assert_eq!(model.embeddings().dims(), &[4, 6]);
        }
    }

    #[test]
    fn test_short_batch_resets_state() {
        let vocab = Vocabulary::from_tokens(["a", "b", "c"]);
        let mut params = ParamStore::new(5, Device::Cpu);
        let model = build_model(&config(ModelVariant::Joint), &mut params, None).unwrap();

        let hidden = model.init_hidden(3).unwrap();
        let out = model
            .forward(&batch(&vocab, 1), hidden.as_ref(), RelationSet::empty(), false)
            .unwrap();
        assert_eq!(out.hidden.unwrap().batch_size().unwrap(), 1);
    }

    #[test]
    fn test_retrofit_requires_vectors() {
        let mut params = ParamStore::new(5, Device::Cpu);
        assert!(build_model(&config(ModelVariant::Retrofit), &mut params, None).is_err());

        let wrong = Tensor::zeros((4, 2), candle_core::DType::F32, &Device::Cpu).unwrap();
        assert!(build_model(&config(ModelVariant::Retrofit), &mut params, Some(&wrong)).is_err());
    }
}
