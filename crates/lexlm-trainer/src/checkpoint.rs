//! Best-on-validation checkpoint tracking.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use candle_nn::VarMap;
use tracing::{debug, info};

/// Persists parameters whenever the validation loss strictly improves.
#[derive(Debug, Clone)]
pub struct BestCheckpoint {
    path: PathBuf,
    best: Option<f64>,
    patience: usize,
    /// Set once this tracker has written `path`; files from earlier runs
    /// are never restored.
    written: bool,
}

impl BestCheckpoint {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            best: None,
            patience: 0,
            written: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    /// Epochs since the last improvement.
    pub fn patience(&self) -> usize {
        self.patience
    }

    /// NaN never improves.
    pub fn is_improvement(&self, loss: f64) -> bool {
        !loss.is_nan() && self.best.is_none_or(|best| loss < best)
    }

    /// Saves `varmap` if `loss` beats the best so far. Returns whether it did.
    pub fn observe(&mut self, loss: f64, varmap: &VarMap) -> Result<bool> {
        if !self.is_improvement(loss) {
            self.patience += 1;
            debug!(loss, patience = self.patience, "Validation loss did not improve");
            return Ok(false);
        }
        self.save(varmap)?;
        info!(loss, path = %self.path.display(), "Saved new best checkpoint");
        self.best = Some(loss);
        self.patience = 0;
        Ok(true)
    }

    /// Whether this tracker has saved a checkpoint.
    pub fn is_written(&self) -> bool {
        self.written
    }

    /// Writes `varmap` regardless of any score.
    pub fn save(&mut self, varmap: &VarMap) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        varmap
            .save(&self.path)
            .with_context(|| format!("Failed to write checkpoint {}", self.path.display()))?;
        self.written = true;
        Ok(())
    }

    /// Loads the saved parameters into `varmap`. Returns `false` when this
    /// tracker has not written a checkpoint, even if `path` exists.
    pub fn restore(&self, varmap: &mut VarMap) -> Result<bool> {
        if !self.written {
            return Ok(false);
        }
        varmap
            .load(&self.path)
            .with_context(|| format!("Failed to load checkpoint {}", self.path.display()))?;
        Ok(true)
    }
}
