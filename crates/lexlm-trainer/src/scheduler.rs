//! Step learning-rate decay at fixed epochs.

use tracing::info;

use crate::optim::LexOptimizer;

/// Multiplies the learning rate by `gamma` each time a milestone epoch
/// completes. Stepped once per epoch.
#[derive(Debug, Clone)]
pub struct MultiStepLr {
    base_lr: f64,
    milestones: Vec<usize>,
    gamma: f64,
    epoch: usize,
}

impl MultiStepLr {
    pub fn new(base_lr: f64, mut milestones: Vec<usize>, gamma: f64) -> Self {
        milestones.sort_unstable();
        Self {
            base_lr,
            milestones,
            gamma,
            epoch: 0,
        }
    }

    /// Learning rate in effect after `epoch` completed epochs.
    pub fn lr_at(&self, epoch: usize) -> f64 {
        let decays = self.milestones.iter().filter(|&&m| m <= epoch).count();
        self.base_lr * self.gamma.powi(decays as i32)
    }

    /// Completed epochs so far.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Records one completed epoch and applies the resulting rate.
    pub fn step(&mut self, optimizer: &mut LexOptimizer) -> f64 {
        self.epoch += 1;
        let lr = self.lr_at(self.epoch);
        if lr != optimizer.learning_rate() {
            info!(epoch = self.epoch, lr, "Learning rate decayed");
            optimizer.set_learning_rate(lr);
        }
        lr
    }
}
