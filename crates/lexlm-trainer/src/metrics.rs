//! Running loss averages for logging and evaluation.

use lexlm_core::{LossBreakdown, Relation};

/// Per-component mean losses over some number of batches.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LossAverages {
    /// LM negative log-likelihood, or retrofit distance.
    pub primary: f64,
    pub relations: [f64; 4],
    pub regularizer: f64,
    pub batches: usize,
}

impl LossAverages {
    pub fn relation(&self, relation: Relation) -> f64 {
        self.relations[relation.index()]
    }

    /// `exp(primary)`; only meaningful for language-model variants.
    pub fn perplexity(&self) -> f64 {
        self.primary.exp()
    }
}

/// Sums loss components until [`LossAccumulator::reset`].
#[derive(Debug, Clone, Default)]
pub struct LossAccumulator {
    primary: f64,
    relations: [f64; 4],
    regularizer: f64,
    batches: usize,
}

impl LossAccumulator {
    pub fn add(&mut self, losses: &LossBreakdown) {
        self.primary += f64::from(losses.primary);
        for relation in Relation::ALL {
            self.relations[relation.index()] += f64::from(losses.relation(relation));
        }
        self.regularizer += f64::from(losses.regularizer);
        self.batches += 1;
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Means over the batches seen so far; all zero when empty.
    pub fn averages(&self) -> LossAverages {
        if self.batches == 0 {
            return LossAverages::default();
        }
        let n = self.batches as f64;
        LossAverages {
            primary: self.primary / n,
            relations: self.relations.map(|v| v / n),
            regularizer: self.regularizer / n,
            batches: self.batches,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
