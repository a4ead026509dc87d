//! The signal dictionary exchanged between adapters and the application.

use crate::{Axis, Error, Metadata, MetadataMapping, Result, SignalData};

/// Data array, axis descriptors and metadata of one signal.
#[derive(Debug, Clone)]
pub struct Signal {
    pub data: SignalData,
    pub axes: Vec<Axis>,
    /// Metadata in the application's schema.
    pub metadata: Metadata,
    /// Format-specific metadata, kept verbatim.
    pub original_metadata: Metadata,
    /// Rules for populating `metadata` from `original_metadata`.
    pub mapping: MetadataMapping,
}

impl Signal {
    /// Creates a signal with empty metadata.
    ///
    /// # Errors
    /// Returns an error if the axes do not describe `data`: one axis per
    /// dimension, each pointing at a dimension of matching size.
    pub fn new(data: SignalData, axes: Vec<Axis>) -> Result<Self> {
        validate_axes(&data, &axes)?;
        Ok(Self {
            data,
            axes,
            metadata: Metadata::new(),
            original_metadata: Metadata::new(),
            mapping: MetadataMapping::default(),
        })
    }

    /// Sets the application metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Sets the original metadata.
    #[must_use]
    pub fn with_original_metadata(mut self, original_metadata: Metadata) -> Self {
        self.original_metadata = original_metadata;
        self
    }

    /// Attaches a mapping table.
    #[must_use]
    pub fn with_mapping(mut self, mapping: MetadataMapping) -> Self {
        self.mapping = mapping;
        self
    }

    /// Axes flagged as navigation axes, in order.
    pub fn navigation_axes(&self) -> impl Iterator<Item = &Axis> {
        self.axes.iter().filter(|a| a.navigate)
    }

    /// Axes of the signal space, in order.
    pub fn signal_axes(&self) -> impl Iterator<Item = &Axis> {
        self.axes.iter().filter(|a| !a.navigate)
    }

    /// Returns `metadata` with the mapping table applied on top.
    ///
    /// Existing entries are overwritten by mapped values.
    ///
    /// # Errors
    /// Returns an error if a mapped destination collides with a leaf value.
    pub fn mapped_metadata(&self) -> Result<Metadata> {
        let mapped = self.mapping.apply(&self.original_metadata)?;
        let mut metadata = self.metadata.clone();
        metadata.merge(&mapped);
        Ok(metadata)
    }
}

fn validate_axes(data: &SignalData, axes: &[Axis]) -> Result<()> {
    let shape = data.shape();
    if axes.len() != shape.len() {
        return Err(Error::AxisCount {
            expected: shape.len(),
            actual: axes.len(),
        });
    }
    for axis in axes {
        let dim_size = *shape.get(axis.index_in_array).ok_or_else(|| Error::AxisIndex {
            name: axis.name.clone(),
            index: axis.index_in_array,
            ndim: shape.len(),
        })?;
        if dim_size != axis.size {
            return Err(Error::ShapeMismatch {
                name: axis.name.clone(),
                index: axis.index_in_array,
                axis_size: axis.size,
                dim_size,
            });
        }
    }
    Ok(())
}
