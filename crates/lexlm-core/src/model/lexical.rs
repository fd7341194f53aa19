//! # Lexical Module
//!
//! Maps word embeddings into the lexical-relation space. Two views exist:
//! a *subspace* view that reads the first `wn_hid` coordinates of the
//! embedding directly, and a *projected* view that multiplies embeddings by
//! per-relation matrices (synonymy and antonymy share one matrix).

use candle_core::{Device, Tensor};
use candle_nn::{Embedding, Module};
use serde::{Deserialize, Serialize};

use crate::batch::Batch;
use crate::error::{LexError, Result};
use crate::model::params::ParamStore;
use crate::objective::RelationEmbeddings;
use crate::relation::{Relation, RelationSet};

/// How projection matrices are obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectionMode {
    /// Trained with the rest of the model.
    #[default]
    Learned,
    /// Frozen rectangular identity.
    Identity,
    /// Frozen random matrix.
    Random,
}

struct Projections {
    synonymy: Tensor,
    hypernymy: Tensor,
    meronymy: Tensor,
    learnable: bool,
}

impl Projections {
    fn for_relation(&self, relation: Relation) -> &Tensor {
        match relation {
            Relation::Synonym | Relation::Antonym => &self.synonymy,
            Relation::Hypernym => &self.hypernymy,
            Relation::Meronym => &self.meronymy,
        }
    }
}

enum LexicalView {
    Subspace(usize),
    Projected(Projections),
}

/// Looks up relation pairs in a (shared) encoder and maps them to the
/// lexical space.
pub struct LexicalModule {
    encoder: Embedding,
    view: LexicalView,
    wn_hid: usize,
}

fn rectangular_identity(rows: usize, cols: usize, device: &Device) -> Result<Tensor> {
    let mut data = vec![0f32; rows * cols];
    for i in 0..rows.min(cols) {
        data[i * cols + i] = 1.0;
    }
    Ok(Tensor::from_vec(data, (rows, cols), device)?)
}

impl LexicalModule {
    /// Lexical space = first `wn_hid` embedding coordinates.
    pub fn subspace(encoder: Embedding, wn_hid: usize) -> Result<Self> {
        let emsize = encoder.embeddings().dim(1)?;
        if wn_hid == 0 || wn_hid > emsize {
            return Err(LexError::InvalidConfig(format!(
                "lexical subspace of {wn_hid} dims does not fit embeddings of {emsize}"
            )));
        }
        Ok(Self {
            encoder,
            view: LexicalView::Subspace(wn_hid),
            wn_hid,
        })
    }

    /// Lexical space = `W_rel · embedding` with `W_rel` of shape `(wn_hid, emsize)`.
    pub fn projected(
        encoder: Embedding,
        wn_hid: usize,
        mode: ProjectionMode,
        params: &mut ParamStore,
    ) -> Result<Self> {
        let emsize = encoder.embeddings().dim(1)?;
        if wn_hid == 0 {
            return Err(LexError::InvalidConfig("lexical space needs at least one dimension".into()));
        }
        let bound = 1.0 / (emsize as f64).sqrt();

        let mut make = |name: &str| -> Result<Tensor> {
            match mode {
                ProjectionMode::Learned => params.uniform(&format!("lexical.{name}"), (wn_hid, emsize), bound),
                ProjectionMode::Identity => rectangular_identity(wn_hid, emsize, params.device()),
                ProjectionMode::Random => params.uniform_constant((wn_hid, emsize), bound),
            }
        };
        let projections = Projections {
            synonymy: make("synonymy")?,
            hypernymy: make("hypernymy")?,
            meronymy: make("meronymy")?,
            learnable: mode == ProjectionMode::Learned,
        };

        Ok(Self {
            encoder,
            view: LexicalView::Projected(projections),
            wn_hid,
        })
    }

    pub fn wn_hid(&self) -> usize {
        self.wn_hid
    }

    fn project(&self, relation: Relation, emb: &Tensor) -> Result<Tensor> {
        match &self.view {
            LexicalView::Subspace(dim) => Ok(emb.narrow(1, 0, *dim)?),
            LexicalView::Projected(p) => Ok(emb.matmul(&p.for_relation(relation).t()?)?),
        }
    }

    /// Lexical-space embeddings of both sides of `(N, 2)` id pairs.
    pub fn embed_pairs(&self, relation: Relation, pairs: &Tensor) -> Result<(Tensor, Tensor)> {
        let left = self.encoder.forward(&pairs.narrow(1, 0, 1)?.squeeze(1)?.contiguous()?)?;
        let right = self.encoder.forward(&pairs.narrow(1, 1, 1)?.squeeze(1)?.contiguous()?)?;
        Ok((self.project(relation, &left)?, self.project(relation, &right)?))
    }

    /// Embeds the pairs of every enabled relation in `batch`.
    pub fn relation_embeddings(&self, batch: &Batch, relations: RelationSet) -> Result<RelationEmbeddings> {
        let mut out = RelationEmbeddings::default();
        for relation in relations.iter() {
            let (a, b) = self.embed_pairs(relation, batch.pairs(relation))?;
            out.insert(relation, a, b);
        }
        Ok(out)
    }

    /// Orthogonality penalty `Σ mean((W Wᵀ - I)²)` over learnable matrices.
    pub fn regularizer(&self) -> Result<Option<Tensor>> {
        let LexicalView::Projected(p) = &self.view else {
            return Ok(None);
        };
        if !p.learnable {
            return Ok(None);
        }

        let eye = rectangular_identity(self.wn_hid, self.wn_hid, p.synonymy.device())?;
        let mut total: Option<Tensor> = None;
        for w in [&p.synonymy, &p.hypernymy, &p.meronymy] {
            let term = w.matmul(&w.t()?)?.sub(&eye)?.sqr()?.mean_all()?;
            total = Some(match total {
                Some(t) => t.add(&term)?,
                None => term,
            });
        }
        Ok(total)
    }
}
