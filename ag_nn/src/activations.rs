//! Activation functions and their module wrappers.

use ag_tensor::prelude::*;

use crate::module::{Module, ModuleRegistry};

/// ReLU activation: max(0, x)
pub fn relu(x: &Tensor) -> Tensor {
    x.relu()
}

/// Sigmoid activation: 1 / (1 + exp(-x))
pub fn sigmoid(x: &Tensor) -> Result<Tensor> {
    let denom = x.neg().exp().add(1.0)?;
    Tensor::scalar(1.0).div(&denom)
}

/// [`relu`] as a module.
#[derive(Debug, Default)]
pub struct ReLU {
    registry: ModuleRegistry,
}

impl ReLU {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Module for ReLU {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        Ok(relu(input))
    }

    fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }
}

/// [`sigmoid`] as a module.
#[derive(Debug, Default)]
pub struct Sigmoid {
    registry: ModuleRegistry,
}

impl Sigmoid {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Module for Sigmoid {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        sigmoid(input)
    }

    fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }
}
