//! # ag_nn - Neural Network Building Blocks for ag_tensor
//!
//! This crate provides thin compositions over the ag_tensor autograd engine:
//!
//! - **Parameters and modules**: [`Parameter`], the [`Module`] trait and its
//!   [`ModuleRegistry`] with dotted-name walks
//! - **Layers**: [`Linear`]
//! - **Activations**: [`ReLU`], [`Sigmoid`]
//! - **Losses**: [`MseLoss`] with a [`Reduction`] selector
//! - **Optimizers**: [`Sgd`] (with momentum) behind the [`Optimizer`] trait
//! - **Data**: [`Dataset`], samplers and [`DataLoader`]
//!
//! ## Example: Training a Small Regression Model
//!
//! ```
//! use ag_nn::{Linear, Module, MseLoss, Optimizer, Sgd, SgdConfig};
//! use ag_tensor::prelude::*;
//!
//! let layer = Linear::new(2, 1, true);
//! let mut opt = Sgd::new(layer.parameters(), SgdConfig::new(0.05)).unwrap();
//! let loss_fn = MseLoss::default();
//!
//! let x = Tensor::new([[1.0, 2.0], [2.0, 1.0], [0.0, 1.0]], false);
//! let y = Tensor::new([[5.0], [4.0], [2.0]], false);
//!
//! for _ in 0..100 {
//!     opt.zero_grad();
//!     let loss = loss_fn.forward(&layer.forward(&x).unwrap(), &y).unwrap();
//!     loss.backward(None).unwrap();
//!     opt.step().unwrap();
//! }
//! ```

pub mod activations;
pub mod data;
pub mod layers;
pub mod loss;
pub mod module;
pub mod optim;
pub mod parameter;

// Re-exports for convenience
pub use activations::{relu, sigmoid, ReLU, Sigmoid};
pub use data::{collate, BatchSampler, DataLoader, Dataset, Sampler, SequentialSampler, TensorDataset};
pub use layers::Linear;
pub use loss::{mse_loss, MseLoss, Reduction};
pub use module::{Module, ModuleRegistry};
pub use optim::{Optimizer, Sgd, SgdConfig};
pub use parameter::Parameter;
