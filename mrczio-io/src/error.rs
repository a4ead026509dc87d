//! I/O error types.

use thiserror::Error;

/// Result type for adapter and codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Signal model error.
    #[error("core error: {0}")]
    Core(#[from] mrczio_core::Error),

    /// Extended header (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An argument has a value the adapter or codec does not accept.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A decoded header lacks a field the reader relies on.
    #[error("missing header key: '{0}'")]
    MissingHeaderKey(String),

    /// Invalid file format.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// Compressor not available in this codec.
    #[error("unsupported compressor: {0}")]
    UnsupportedCompressor(String),

    /// Pixel units the codec cannot convert.
    #[error("unsupported pixel units: '{0}'")]
    UnsupportedUnits(String),

    /// Element type or MRC mode the codec cannot handle.
    #[error("unsupported data type: {0}")]
    UnsupportedDataType(String),

    /// Worker pool construction failed.
    #[error("thread pool error: {0}")]
    ThreadPool(String),
}
