//! Deferred population of application metadata from format headers.
//!
//! Format adapters attach a static table of [`MappingEntry`] values to the
//! signals they produce. The application applies it on demand to copy
//! selected fields from `original_metadata` into its own metadata schema.

use crate::{Metadata, Result};
use serde_json::Value;
use std::fmt;

/// Converts a header value into the form stored in the destination tree.
pub type Transform = fn(&Value) -> Value;

/// Returns the value unchanged.
#[must_use]
pub fn identity(value: &Value) -> Value {
    value.clone()
}

/// Unwraps a single-element sequence; any other value is returned as is.
#[must_use]
pub fn unwrap_single(value: &Value) -> Value {
    match value {
        Value::Array(items) if items.len() == 1 => items[0].clone(),
        other => other.clone(),
    }
}

/// One `source -> destination` rule of a mapping table.
#[derive(Clone, Copy)]
pub struct MappingEntry {
    /// Dotted path in `original_metadata`.
    pub source: &'static str,
    /// Dotted path in the application metadata.
    pub destination: &'static str,
    pub transform: Transform,
}

impl fmt::Debug for MappingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingEntry")
            .field("source", &self.source)
            .field("destination", &self.destination)
            .finish_non_exhaustive()
    }
}

/// A static mapping table attached to a signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataMapping {
    entries: &'static [MappingEntry],
}

impl MetadataMapping {
    /// Wraps a static table.
    #[must_use]
    pub const fn new(entries: &'static [MappingEntry]) -> Self {
        Self { entries }
    }

    /// Returns the table entries.
    #[must_use]
    pub fn entries(&self) -> &'static [MappingEntry] {
        self.entries
    }

    /// Returns true if the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds the metadata described by the table from `original`.
    ///
    /// Sources that are absent or `null` are skipped.
    ///
    /// # Errors
    /// Returns an error if a destination path cannot be created.
    pub fn apply(&self, original: &Metadata) -> Result<Metadata> {
        let mut out = Metadata::new();
        for entry in self.entries {
            match original.get(entry.source) {
                None | Some(Value::Null) => {}
                Some(value) => out.set(entry.destination, (entry.transform)(value))?,
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    static TABLE: [MappingEntry; 2] = [
        MappingEntry {
            source: "header.voltage",
            destination: "Acquisition_instrument.TEM.beam_energy",
            transform: unwrap_single,
        },
        MappingEntry {
            source: "header.gain",
            destination: "Signal.gain",
            transform: identity,
        },
    ];

    #[test]
    fn test_unwrap_single() {
        assert_eq!(unwrap_single(&json!([300.0])), json!(300.0));
        assert_eq!(unwrap_single(&json!([1, 2])), json!([1, 2]));
        assert_eq!(unwrap_single(&json!(3)), json!(3));
    }

    #[test]
    fn test_apply_skips_missing() {
        let mut original = Metadata::new();
        original.set("header.voltage", json!([300.0])).unwrap();

        let mapped = MetadataMapping::new(&TABLE).apply(&original).unwrap();
        assert_eq!(
            mapped.get_f64("Acquisition_instrument.TEM.beam_energy").unwrap(),
            Some(300.0)
        );
        assert!(!mapped.contains("Signal.gain"));
    }

    #[test]
    fn test_default_is_empty() {
        let mapping = MetadataMapping::default();
        assert!(mapping.is_empty());
        assert!(mapping.apply(&Metadata::new()).unwrap().is_empty());
    }
}
