//! mrczio-core: Signal model shared by the mrczio format adapters.
//!
//! This crate provides the in-memory representation exchanged between a
//! file-format adapter and the application: an N-dimensional data array,
//! ordered axis descriptors, and dotted-path metadata trees.
//!

pub mod axis;
pub mod data;
pub mod error;
pub mod mapping;
pub mod metadata;
pub mod signal;

pub use axis::Axis;
pub use data::{DataType, SignalData, Statistics};
pub use error::{Error, Result};
pub use mapping::{MappingEntry, MetadataMapping, Transform};
pub use metadata::Metadata;
pub use signal::Signal;
