//! Error types for tensor construction, graph building and backward execution.

use thiserror::Error;

/// Errors raised by tensor operations and the backward engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Shapes that cannot be combined, reduced or seeded.
    #[error("shape error: {0}")]
    Shape(String),

    /// Operation called on a tensor in the wrong state, e.g. `backward()`
    /// on a tensor that does not require gradients.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Invalid hyperparameter or selector.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A graph node broke the gradient/edge pairing contract.
    #[error("contract violation: {0}")]
    ContractViolation(String),
}

impl Error {
    pub(crate) fn shape(msg: impl Into<String>) -> Self {
        Error::Shape(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
