//! Affine layer.

use ag_tensor::prelude::*;
use rand::Rng;

use crate::module::{Module, ModuleRegistry};
use crate::parameter::Parameter;

/// Fully connected layer computing `x @ weight^T + bias`.
///
/// Parameters are registered as `weight` and `bias`.
pub struct Linear {
    /// Shape `(out_features, in_features)`.
    pub weight: Parameter,
    /// Shape `(out_features,)`; absent when built without bias.
    pub bias: Option<Parameter>,
    registry: ModuleRegistry,
}

impl Linear {
    /// Standard-normal initialised layer drawn from the thread RNG.
    pub fn new(in_features: usize, out_features: usize, bias: bool) -> Self {
        Self::with_rng(in_features, out_features, bias, &mut rand::thread_rng())
    }

    /// Like [`Linear::new`] with an explicit RNG.
    pub fn with_rng<R: Rng>(in_features: usize, out_features: usize, bias: bool, rng: &mut R) -> Self {
        let weight = Parameter::randn_with(&[out_features, in_features], rng);
        let bias = bias.then(|| Parameter::randn_with(&[out_features], rng));
        Self::from_parameters(weight, bias)
    }

    /// Create a linear layer from existing weight and bias parameters.
    pub fn from_parameters(weight: Parameter, bias: Option<Parameter>) -> Self {
        let mut registry = ModuleRegistry::new();
        let weight = registry.register_parameter("weight", weight);
        let bias = bias.map(|b| registry.register_parameter("bias", b));
        Linear {
            weight,
            bias,
            registry,
        }
    }

    pub fn in_features(&self) -> usize {
        self.weight.shape().dim(1)
    }

    pub fn out_features(&self) -> usize {
        self.weight.shape().dim(0)
    }
}

impl Module for Linear {
    /// `(batch, in_features)` in, `(batch, out_features)` out.
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let y = x.matmul(&self.weight.t())?;
        match &self.bias {
            Some(bias) => y.add(bias.tensor()),
            None => Ok(y),
        }
    }

    fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_forward() {
        let layer = Linear::new(3, 2, true);
        let x = Tensor::new([[1.0, 2.0, 3.0]], false);
        let y = layer.forward(&x).unwrap();
        assert_eq!(y.shape().dims(), &[1, 2]);
        assert_eq!(layer.in_features(), 3);
        assert_eq!(layer.out_features(), 2);
    }

    #[test]
    fn test_linear_known_weights() {
        let layer = Linear::from_parameters(
            Parameter::from_data([[1.0, 0.0], [0.0, 2.0], [1.0, 1.0]]),
            Some(Parameter::from_data([0.5, 0.5, 0.5])),
        );
        let x = Tensor::new([[3.0, 4.0]], false);
        let y = layer.forward(&x).unwrap();
        assert_eq!(y.to_vec(), vec![3.5, 8.5, 7.5]);
    }

    #[test]
    fn test_linear_backward() {
        let layer = Linear::new(3, 2, true);
        let x = Tensor::new([[1.0, 2.0, 3.0]], true);
        let loss = layer.forward(&x).unwrap().sum(None, false).unwrap();
        loss.backward(None).unwrap();

        // d(sum)/dW = ones(out,1) @ x, d(sum)/db = ones
        assert_eq!(
            layer.weight.grad().unwrap().to_vec(),
            vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0]
        );
        assert_eq!(layer.bias.as_ref().unwrap().grad().unwrap().to_vec(), vec![1.0, 1.0]);
        assert!(x.grad().is_some());
    }

    #[test]
    fn test_linear_without_bias_registers_weight_only() {
        let layer = Linear::new(4, 2, false);
        let names: Vec<String> = layer.named_parameters().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["weight"]);
    }
}
