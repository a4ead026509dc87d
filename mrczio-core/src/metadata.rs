//! Dotted-path metadata trees.
//!
//! A [`Metadata`] is a JSON object whose nested nodes are addressed with
//! dotted keys, e.g. `Acquisition_instrument.TEM.beam_energy`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A metadata tree addressed by dotted paths.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(Map<String, Value>);

fn split_path(path: &str) -> Result<Vec<&str>> {
    let parts: Vec<&str> = path.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(Error::InvalidPath(path.to_string()));
    }
    Ok(parts)
}

impl Metadata {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the root node.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consumes the tree and returns the root node.
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Number of top-level entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the tree has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the top-level keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Looks up the value at a dotted path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.0.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Returns true if a value exists at `path`.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Looks up a number at a dotted path.
    ///
    /// A missing or `null` value is `Ok(None)`.
    ///
    /// # Errors
    /// Returns an error if the value exists but is not a number.
    pub fn get_f64(&self, path: &str) -> Result<Option<f64>> {
        match self.get(path) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value.as_f64().map(Some).ok_or_else(|| Error::InvalidValue {
                path: path.to_string(),
                expected: "a number",
            }),
        }
    }

    /// Returns the number at `path`, or `default` if it is absent.
    ///
    /// # Errors
    /// Returns an error if the value exists but is not a number.
    pub fn get_f64_or(&self, path: &str, default: f64) -> Result<f64> {
        Ok(self.get_f64(path)?.unwrap_or(default))
    }

    /// Sets the value at a dotted path, creating intermediate nodes.
    ///
    /// # Errors
    /// Returns an error if the path is malformed or an intermediate key
    /// already holds a non-node value.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        let parts = split_path(path)?;
        let (last, parents) = parts
            .split_last()
            .ok_or_else(|| Error::InvalidPath(path.to_string()))?;

        let mut node = &mut self.0;
        for part in parents {
            let child = node
                .entry((*part).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            node = child
                .as_object_mut()
                .ok_or_else(|| Error::NotANode(path.to_string()))?;
        }
        node.insert((*last).to_string(), value.into());
        Ok(())
    }

    /// Removes and returns the value at a dotted path.
    pub fn remove(&mut self, path: &str) -> Option<Value> {
        let parts = split_path(path).ok()?;
        let (last, parents) = parts.split_last()?;
        let mut node = &mut self.0;
        for part in parents {
            node = node.get_mut(*part)?.as_object_mut()?;
        }
        node.remove(*last)
    }

    /// Recursively merges `other` into this tree; `other` wins on conflicts.
    pub fn merge(&mut self, other: &Metadata) {
        fn merge_into(dst: &mut Map<String, Value>, src: &Map<String, Value>) {
            for (key, value) in src {
                match (dst.get_mut(key), value) {
                    (Some(Value::Object(d)), Value::Object(s)) => merge_into(d, s),
                    _ => {
                        dst.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        merge_into(&mut self.0, &other.0);
    }
}

impl From<Map<String, Value>> for Metadata {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Metadata> for Value {
    fn from(metadata: Metadata) -> Self {
        Value::Object(metadata.0)
    }
}
