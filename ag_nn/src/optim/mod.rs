//! Optimizers for neural network training.

mod sgd;

pub use sgd::{Sgd, SgdConfig};

use ag_tensor::Result;

/// Trait for optimization algorithms.
///
/// An optimizer owns handles to the parameters it updates, so `step` reads
/// their accumulated gradients directly.
pub trait Optimizer {
    /// Perform a single optimization step.
    fn step(&mut self) -> Result<()>;

    /// Clear the gradients of every optimized parameter.
    fn zero_grad(&mut self);

    /// Get learning rate.
    fn lr(&self) -> f64;

    /// Set learning rate. An invalid rate is rejected and the current one kept.
    fn set_lr(&mut self, lr: f64) -> Result<()>;
}
