//! Error types for mrczio-core.

use thiserror::Error;

/// Result type alias for signal model operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for signal model operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A metadata path was empty or contained an empty segment.
    #[error("invalid metadata path: '{0}'")]
    InvalidPath(String),

    /// A metadata path walks through a value that is not a node.
    #[error("metadata path '{0}' traverses a non-node value")]
    NotANode(String),

    /// A metadata value exists but has the wrong type.
    #[error("invalid metadata value at '{path}': expected {expected}")]
    InvalidValue {
        path: String,
        expected: &'static str,
    },

    /// Number of axes does not match the array dimensionality.
    #[error("expected {expected} axes, got {actual}")]
    AxisCount { expected: usize, actual: usize },

    /// An axis points past the last array dimension.
    #[error("axis '{name}' points at dimension {index} of a {ndim}-dimensional array")]
    AxisIndex {
        name: String,
        index: usize,
        ndim: usize,
    },

    /// An axis does not describe the array dimension it points at.
    #[error("axis '{name}' has size {axis_size} but array dimension {index} has size {dim_size}")]
    ShapeMismatch {
        name: String,
        index: usize,
        axis_size: usize,
        dim_size: usize,
    },
}
