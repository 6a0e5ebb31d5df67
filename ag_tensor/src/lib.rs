//! # ag_tensor - Tensors with a Dynamic Backward Graph
//!
//! This crate provides a dense `f64` tensor that records the operations
//! applied to it, and an engine that walks the recorded graph in reverse to
//! compute gradients.
//!
//! ## Overview
//!
//! - [`Tensor`] - Reference-counted handle holding data, a gradient slot and
//!   a link to the node that produced it
//! - [`functional`] - Forward ops; each one records a backward node when an
//!   operand requires gradients
//! - [`Node`] / [`Edge`] - The backward graph
//! - [`Engine`] - Dependency-counted, FIFO execution of the backward graph
//! - [`finite_diff`] - Numerical gradients for verification
//!
//! Differentiation is eager in the forward direction and lazy in the
//! backward direction: nothing is computed until [`Tensor::backward`] runs.
//!
//! ## Example
//!
//! ```
//! use ag_tensor::prelude::*;
//!
//! let x = Tensor::new([[1.0, 2.0], [3.0, 4.0]], true);
//! let w = Tensor::new([0.5, -1.0], true);
//!
//! // Broadcast multiply, then reduce to a scalar.
//! let y = (&x * &w).sum(None, false).unwrap();
//! y.backward(None).unwrap();
//!
//! // dy/dw sums x over the broadcast axis.
//! assert_eq!(w.grad().unwrap().to_vec(), vec![4.0, 6.0]);
//! assert_eq!(x.grad().unwrap().to_vec(), vec![0.5, -1.0, 0.5, -1.0]);
//! ```
//!
//! ## Supported Operations
//!
//! | Category | Operations |
//! |----------|------------|
//! | Arithmetic | `+`, `-`, `*`, `/`, unary `-` (NumPy broadcasting) |
//! | Linear algebra | [`Tensor::matmul`] (2-D), [`Tensor::transpose`] |
//! | Reductions | [`Tensor::sum`], [`Tensor::mean`] with axes and `keepdims` |
//! | Element-wise | [`Tensor::pow`], [`Tensor::exp`], [`Tensor::relu`] |

pub mod array;
pub mod engine;
pub mod error;
pub mod finite_diff;
pub mod functional;
pub mod node;
pub mod shape;
pub mod tensor;

pub use array::Array;
pub use engine::Engine;
pub use error::{Error, Result};
pub use node::{Edge, Node, NodeRef};
pub use shape::Shape;
pub use tensor::{Tensor, TensorData};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::shape::Shape;
    pub use crate::tensor::{Tensor, TensorData};
}
