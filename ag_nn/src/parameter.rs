//! Trainable tensors.

use std::fmt;
use std::ops::Deref;

use ag_tensor::prelude::*;
use ndarray::{ArrayD, IxDyn};
use rand::Rng;
use rand_distr::StandardNormal;

/// A tensor registered as a module parameter. Always requires gradients.
///
/// Cloning is O(1) and shares the underlying tensor, so an optimizer holding
/// a clone updates the same data the module reads.
#[derive(Clone)]
pub struct Parameter(Tensor);

impl Parameter {
    /// Parameter of the given shape drawn from a standard normal distribution.
    pub fn randn(shape: &[usize]) -> Self {
        Self::randn_with(shape, &mut rand::thread_rng())
    }

    /// Like [`Parameter::randn`] with an explicit RNG.
    pub fn randn_with<R: Rng>(shape: &[usize], rng: &mut R) -> Self {
        let data: ArrayD<f64> = ArrayD::from_shape_simple_fn(IxDyn(shape), || rng.sample(StandardNormal));
        Parameter(Tensor::new(data, true))
    }

    /// Parameter initialised from existing data.
    pub fn from_data(data: impl TensorData) -> Self {
        Parameter(Tensor::new(data, true))
    }

    /// The underlying tensor handle.
    pub fn tensor(&self) -> &Tensor {
        &self.0
    }
}

impl Deref for Parameter {
    type Target = Tensor;

    fn deref(&self) -> &Tensor {
        &self.0
    }
}

impl AsRef<Tensor> for Parameter {
    fn as_ref(&self) -> &Tensor {
        &self.0
    }
}

impl From<&Parameter> for Tensor {
    fn from(p: &Parameter) -> Tensor {
        p.0.clone()
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Parameter({})", self.0.shape())
    }
}
