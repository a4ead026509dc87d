//! Axis descriptors.

use serde::{Deserialize, Serialize};

/// Units assigned to an axis that carries no calibration.
pub const UNDEFINED_UNITS: &str = "<undefined>";

/// Describes one dimension of a signal's data array.
///
/// The position of an axis in [`crate::Signal::axes`] is meaningful: the
/// application treats axes flagged `navigate` as indexing a collection of
/// signals and the rest as the signal space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    /// Number of samples along the axis.
    pub size: usize,
    /// Dimension of the data array this axis describes.
    pub index_in_array: usize,
    /// Axis name (`"x"`, `"y"`, `"z"`, ...).
    pub name: String,
    /// Sample spacing in `units`.
    pub scale: f64,
    /// Coordinate of the first sample.
    pub offset: f64,
    /// Physical units of `scale` and `offset`.
    pub units: String,
    /// Whether the axis is a navigation axis.
    pub navigate: bool,
}

impl Axis {
    /// Creates an uncalibrated signal axis.
    pub fn new(name: impl Into<String>, size: usize, index_in_array: usize) -> Self {
        Self {
            size,
            index_in_array,
            name: name.into(),
            scale: 1.0,
            offset: 0.0,
            units: UNDEFINED_UNITS.to_string(),
            navigate: false,
        }
    }

    /// Sets the sample spacing.
    #[must_use]
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Sets the offset.
    #[must_use]
    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    /// Sets the units.
    #[must_use]
    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = units.into();
        self
    }

    /// Marks the axis as navigation or signal.
    #[must_use]
    pub fn with_navigate(mut self, navigate: bool) -> Self {
        self.navigate = navigate;
        self
    }

    /// Coordinate of the last sample.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn high_value(&self) -> f64 {
        self.offset + self.scale * self.size.saturating_sub(1) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_axis_builder() {
        let axis = Axis::new("z", 10, 0)
            .with_scale(0.5)
            .with_offset(1.0)
            .with_units("nm")
            .with_navigate(true);
        assert_eq!(axis.size, 10);
        assert_eq!(axis.units, "nm");
        assert!(axis.navigate);
        assert_relative_eq!(axis.high_value(), 5.5);
    }

    #[test]
    fn test_axis_defaults() {
        let axis = Axis::new("x", 4, 2);
        assert_eq!(axis.units, UNDEFINED_UNITS);
        assert_relative_eq!(axis.scale, 1.0);
        assert!(!axis.navigate);
    }
}
