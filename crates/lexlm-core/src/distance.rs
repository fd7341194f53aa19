//! Row-wise distances between paired embeddings.

use std::fmt;
use std::str::FromStr;

use candle_core::{D, Tensor};
use serde::{Deserialize, Serialize};

use crate::error::{LexError, Result};

/// Keeps the Euclidean gradient finite for identical rows.
const PAIRWISE_EPS: f64 = 1e-8;
/// Squared floor on a row norm in cosine similarity (norm >= 1e-8).
const COSINE_EPS_SQ: f64 = 1e-16;

/// Distance between two embeddings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    /// Euclidean distance.
    #[default]
    Pairwise,
    /// `1 - cos(a, b)`.
    Cosine,
}

impl Distance {
    /// Distance between matching rows of two `(N, D)` tensors; returns `(N,)`.
    pub fn rows(self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        match self {
            Distance::Pairwise => {
                let sq = a.sub(b)?.sqr()?.sum(D::Minus1)?;
                // sqrt(x + eps) - sqrt(eps), with both terms computed the same
                // way so identical rows give exactly 0.
                let shifted = sq.affine(1.0, PAIRWISE_EPS)?.sqrt()?;
                let floor = sq.zeros_like()?.affine(1.0, PAIRWISE_EPS)?.sqrt()?;
                Ok(shifted.sub(&floor)?)
            }
            Distance::Cosine => {
                let dot = a.mul(b)?.sum(D::Minus1)?;
                let norm_a = a.sqr()?.sum(D::Minus1)?.affine(1.0, COSINE_EPS_SQ)?.sqrt()?;
                let norm_b = b.sqr()?.sum(D::Minus1)?.affine(1.0, COSINE_EPS_SQ)?.sqrt()?;
                let cos = dot.div(&norm_a.mul(&norm_b)?)?;
                Ok(cos.affine(-1.0, 1.0)?)
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Distance::Pairwise => "pairwise",
            Distance::Cosine => "cosine",
        }
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Distance {
    type Err = LexError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pairwise" => Ok(Distance::Pairwise),
            "cosine" => Ok(Distance::Cosine),
            other => Err(LexError::InvalidConfig(format!("unknown distance {other:?}"))),
        }
    }
}
