//! # Composite Objective
//!
//! Primary loss plus unweighted auxiliary lexical losses and an optional
//! regularization term:
//!
//! ```text
//! L = L_primary + Σ_{r ∈ enabled} L_r + [reg] L_reg
//! ```
//!
//! - synonym: `mean(d(a, b))`
//! - antonym: `mean(relu(margin - d(a, b)))`
//! - hypernym / meronym: `Σ mask·d(a, b) / Σ mask`, where `mask` marks rows
//!   whose first id is not padding. All-padding batches contribute 0.

use candle_core::{DType, Tensor};

use crate::batch::Batch;
use crate::distance::Distance;
use crate::error::Result;
use crate::model::ForwardOutput;
use crate::relation::{Relation, RelationSet};

/// Lexical-space embeddings of the two sides of each relation's pairs.
#[derive(Debug, Clone, Default)]
pub struct RelationEmbeddings {
    pairs: [Option<(Tensor, Tensor)>; 4],
}

impl RelationEmbeddings {
    pub fn insert(&mut self, relation: Relation, left: Tensor, right: Tensor) {
        self.pairs[relation.index()] = Some((left, right));
    }

    pub fn get(&self, relation: Relation) -> Option<(&Tensor, &Tensor)> {
        self.pairs[relation.index()].as_ref().map(|(a, b)| (a, b))
    }
}

/// Objective settings.
#[derive(Debug, Clone, Copy)]
pub struct ObjectiveConfig {
    pub relations: RelationSet,
    pub distance: Distance,
    pub margin: f64,
    pub regularize: bool,
    pub pad_id: u32,
}

impl Default for ObjectiveConfig {
    fn default() -> Self {
        Self {
            relations: RelationSet::empty(),
            distance: Distance::Pairwise,
            margin: 1.0,
            regularize: false,
            pad_id: 0,
        }
    }
}

/// Host-side values of each loss term, for logging and accumulation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LossBreakdown {
    pub primary: f32,
    /// Indexed by [`Relation::index`]; zero for disabled relations.
    pub relations: [f32; 4],
    pub regularizer: f32,
    pub total: f32,
}

impl LossBreakdown {
    pub fn relation(&self, relation: Relation) -> f32 {
        self.relations[relation.index()]
    }
}

pub struct LexicalObjective {
    config: ObjectiveConfig,
}

fn scalar(t: &Tensor) -> Result<f32> {
    Ok(t.to_dtype(DType::F32)?.to_scalar::<f32>()?)
}

impl LexicalObjective {
    pub fn new(config: ObjectiveConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ObjectiveConfig {
        &self.config
    }

    /// Mean distance between synonym pairs.
    pub fn synonym_loss(&self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        Ok(self.config.distance.rows(a, b)?.mean_all()?)
    }

    /// Hinge loss pushing antonym pairs at least `margin` apart.
    pub fn antonym_loss(&self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        let d = self.config.distance.rows(a, b)?;
        Ok(d.affine(-1.0, self.config.margin)?.relu()?.mean_all()?)
    }

    /// Mean distance over pairs whose first slot is not padding.
    pub fn masked_loss(&self, a: &Tensor, b: &Tensor, pairs: &Tensor) -> Result<Tensor> {
        let present = pairs
            .narrow(1, 0, 1)?
            .squeeze(1)?
            .ne(self.config.pad_id)?
            .to_dtype(DType::F32)?;
        let count = scalar(&present.sum_all()?)?;
        if count == 0.0 {
            return Ok(Tensor::zeros((), DType::F32, a.device())?);
        }
        let d = self.config.distance.rows(a, b)?;
        Ok(d.mul(&present)?.sum_all()?.affine(1.0 / count as f64, 0.0)?)
    }

    /// Loss for one relation.
    pub fn relation_loss(&self, relation: Relation, a: &Tensor, b: &Tensor, pairs: &Tensor) -> Result<Tensor> {
        match relation {
            Relation::Synonym => self.synonym_loss(a, b),
            Relation::Antonym => self.antonym_loss(a, b),
            Relation::Hypernym | Relation::Meronym => self.masked_loss(a, b, pairs),
        }
    }

    /// Combines a forward pass into the training loss.
    ///
    /// Enabled relations the model did not embed are skipped.
    pub fn compose(&self, output: &ForwardOutput, batch: &Batch) -> Result<(Tensor, LossBreakdown)> {
        let mut breakdown = LossBreakdown {
            primary: scalar(&output.primary)?,
            ..Default::default()
        };
        let mut total = output.primary.clone();

        for relation in self.config.relations.iter() {
            let Some((a, b)) = output.relations.get(relation) else {
                continue;
            };
            let loss = self.relation_loss(relation, a, b, batch.pairs(relation))?;
            breakdown.relations[relation.index()] = scalar(&loss)?;
            total = total.add(&loss)?;
        }

        if self.config.regularize {
            if let Some(reg) = &output.regularizer {
                breakdown.regularizer = scalar(reg)?;
                total = total.add(reg)?;
            }
        }

        breakdown.total = scalar(&total)?;
        Ok((total, breakdown))
    }
}
