//! Stochastic Gradient Descent optimizer.

use ag_tensor::prelude::*;
use ag_tensor::Array;
use serde::{Deserialize, Serialize};

use super::Optimizer;
use crate::parameter::Parameter;

/// Hyperparameters for [`Sgd`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SgdConfig {
    pub lr: f64,
    #[serde(default)]
    pub momentum: f64,
}

impl SgdConfig {
    pub fn new(lr: f64) -> Self {
        SgdConfig { lr, momentum: 0.0 }
    }

    pub fn with_momentum(mut self, momentum: f64) -> Self {
        self.momentum = momentum;
        self
    }

    /// Reject a negative or non-finite learning rate and momentum outside `[0, 1)`.
    pub fn validate(&self) -> Result<()> {
        if !self.lr.is_finite() || self.lr < 0.0 {
            return Err(Error::Configuration(format!(
                "invalid learning rate: {}",
                self.lr
            )));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(Error::Configuration(format!(
                "invalid momentum: {}",
                self.momentum
            )));
        }
        Ok(())
    }
}

impl Default for SgdConfig {
    fn default() -> Self {
        SgdConfig::new(0.01)
    }
}

/// SGD optimizer with optional momentum.
///
/// Vanilla update: `p -= lr * g`. With momentum: `v = momentum * v + g`,
/// `p -= lr * v`.
pub struct Sgd {
    params: Vec<Parameter>,
    config: SgdConfig,
    velocities: Vec<Option<Array>>,
}

impl Sgd {
    pub fn new(params: impl IntoIterator<Item = Parameter>, config: SgdConfig) -> Result<Self> {
        config.validate()?;
        let params: Vec<Parameter> = params.into_iter().collect();
        let velocities = vec![None; params.len()];
        tracing::debug!(
            params = params.len(),
            lr = config.lr,
            momentum = config.momentum,
            "created SGD optimizer"
        );
        Ok(Sgd {
            params,
            config,
            velocities,
        })
    }

    pub fn config(&self) -> &SgdConfig {
        &self.config
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }
}

impl Optimizer for Sgd {
    fn step(&mut self) -> Result<()> {
        let SgdConfig { lr, momentum } = self.config;

        for (param, velocity) in self.params.iter().zip(self.velocities.iter_mut()) {
            // Parameters not reached by the last backward pass are left alone.
            let Some(grad) = param.grad() else {
                continue;
            };
            let grad = grad.data();

            let mut data = param.data_mut();
            if data.shape() != grad.shape() {
                return Err(Error::Shape(format!(
                    "gradient of shape {:?} does not match parameter of shape {:?}",
                    grad.shape(),
                    data.shape()
                )));
            }

            if momentum > 0.0 {
                let v = velocity.get_or_insert_with(|| Array::zeros(grad.raw_dim()));
                v.mapv_inplace(|x| x * momentum);
                *v += &*grad;
                data.scaled_add(-lr, &*v);
            } else {
                data.scaled_add(-lr, &*grad);
            }
        }
        Ok(())
    }

    fn zero_grad(&mut self) {
        for param in &self.params {
            param.zero_grad();
        }
    }

    fn lr(&self) -> f64 {
        self.config.lr
    }

    fn set_lr(&mut self, lr: f64) -> Result<()> {
        let config = SgdConfig { lr, ..self.config };
        config.validate()?;
        self.config = config;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sgd_vanilla_step() {
        let p = Parameter::from_data([1.0, 2.0]);
        (&*p * 3.0).sum(None, false).unwrap().backward(None).unwrap();

        let mut opt = Sgd::new([p.clone()], SgdConfig::new(0.1)).unwrap();
        opt.step().unwrap();
        let v = p.to_vec();
        assert_relative_eq!(v[0], 0.7);
        assert_relative_eq!(v[1], 1.7);
    }

    #[test]
    fn test_sgd_momentum_accumulates() {
        let p = Parameter::from_data(1.0);
        let mut opt = Sgd::new([p.clone()], SgdConfig::new(0.1).with_momentum(0.9)).unwrap();

        // Constant gradient of 1: v1 = 1, v2 = 1.9
        for _ in 0..2 {
            opt.zero_grad();
            p.tensor().backward(Some(&Tensor::scalar(1.0))).unwrap();
            opt.step().unwrap();
        }
        assert_relative_eq!(p.item().unwrap(), 1.0 - 0.1 - 0.19, epsilon = 1e-12);
    }

    #[test]
    fn test_sgd_skips_params_without_grad() {
        let p = Parameter::from_data([1.0, 2.0]);
        let mut opt = Sgd::new([p.clone()], SgdConfig::new(0.5)).unwrap();
        opt.step().unwrap();
        assert_eq!(p.to_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_sgd_zero_grad() {
        let p = Parameter::from_data(2.0);
        (&*p * &*p).backward(None).unwrap();
        let mut opt = Sgd::new([p.clone()], SgdConfig::default()).unwrap();
        opt.zero_grad();
        assert!(p.grad().is_none());
    }

    #[test]
    fn test_invalid_config() {
        for config in [
            SgdConfig::new(-0.1),
            SgdConfig::new(f64::NAN),
            SgdConfig::new(0.1).with_momentum(1.0),
            SgdConfig::new(0.1).with_momentum(-0.5),
        ] {
            assert!(matches!(
                Sgd::new(Vec::<Parameter>::new(), config),
                Err(Error::Configuration(_))
            ));
        }
    }

    #[test]
    fn test_lr_accessors() {
        let mut opt = Sgd::new(Vec::new(), SgdConfig::new(0.1)).unwrap();
        assert_eq!(opt.lr(), 0.1);
        opt.set_lr(0.01).unwrap();
        assert_eq!(opt.lr(), 0.01);

        for bad in [-0.1, f64::NAN, f64::INFINITY] {
            assert!(matches!(opt.set_lr(bad), Err(Error::Configuration(_))));
            assert_eq!(opt.lr(), 0.01);
        }
    }

    #[test]
    fn test_rejected_lr_does_not_reach_step() {
        let p = Parameter::from_data(1.0);
        let mut opt = Sgd::new([p.clone()], SgdConfig::new(0.1)).unwrap();
        assert!(opt.set_lr(-1.0).is_err());

        p.tensor().backward(Some(&Tensor::scalar(1.0))).unwrap();
        opt.step().unwrap();
        assert_relative_eq!(p.item().unwrap(), 0.9, epsilon = 1e-12);
    }

    #[test]
    fn test_config_deserialize() {
        let config: SgdConfig = serde_json::from_str(r#"{"lr": 0.05}"#).unwrap();
        assert_eq!(config, SgdConfig::new(0.05));
        let config: SgdConfig = serde_json::from_str(r#"{"lr": 0.05, "momentum": 0.9}"#).unwrap();
        assert_eq!(config.momentum, 0.9);
    }
}
