//! Array payloads carried by a signal.

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type of a [`SignalData`] array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Int8,
    Int16,
    Float32,
    UInt16,
}

impl DataType {
    /// Returns the numpy-style name of the type (`"float32"`, ...).
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Float32 => "float32",
            Self::UInt16 => "uint16",
        }
    }

    /// Size of one element in bytes.
    #[must_use]
    pub fn size_of(self) -> usize {
        match self {
            Self::Int8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Float32 => 4,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Summary statistics of an array, computed in `f64`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Statistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// N-dimensional signal data.
///
/// The variants cover the element types an MRC stack can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalData {
    Int8(ArrayD<i8>),
    Int16(ArrayD<i16>),
    Float32(ArrayD<f32>),
    UInt16(ArrayD<u16>),
}

macro_rules! dispatch {
    ($self:expr, $arr:ident => $body:expr) => {
        match $self {
            SignalData::Int8($arr) => $body,
            SignalData::Int16($arr) => $body,
            SignalData::Float32($arr) => $body,
            SignalData::UInt16($arr) => $body,
        }
    };
}

impl SignalData {
    /// Returns the array shape in C order.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        dispatch!(self, a => a.shape())
    }

    /// Returns the number of dimensions.
    #[must_use]
    pub fn ndim(&self) -> usize {
        dispatch!(self, a => a.ndim())
    }

    /// Returns the total number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        dispatch!(self, a => a.len())
    }

    /// Returns true if the array holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the element type.
    #[must_use]
    pub fn dtype(&self) -> DataType {
        match self {
            Self::Int8(_) => DataType::Int8,
            Self::Int16(_) => DataType::Int16,
            Self::Float32(_) => DataType::Float32,
            Self::UInt16(_) => DataType::UInt16,
        }
    }

    /// Computes min, max and mean over all elements.
    ///
    /// Returns `None` for an empty array. NaN elements of float arrays are
    /// skipped for min and max but propagate into the mean.
    #[must_use]
    pub fn statistics(&self) -> Option<Statistics> {
        if self.is_empty() {
            return None;
        }
        let (min, max, sum) = dispatch!(self, a => a.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0_f64),
            |(lo, hi, sum), &v| {
                let v = f64::from(v);
                (lo.min(v), hi.max(v), sum + v)
            },
        ));
        #[allow(clippy::cast_precision_loss)]
        let mean = sum / self.len() as f64;
        Some(Statistics { min, max, mean })
    }
}

macro_rules! impl_from_array {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<ArrayD<$ty>> for SignalData {
                fn from(array: ArrayD<$ty>) -> Self {
                    Self::$variant(array)
                }
            }
        )*
    };
}

impl_from_array!(i8 => Int8, i16 => Int16, f32 => Float32, u16 => UInt16);

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::IxDyn;

    #[test]
    fn test_shape_and_dtype() {
        let data = SignalData::from(ArrayD::<f32>::zeros(IxDyn(&[2, 3, 4])));
        assert_eq!(data.shape(), &[2, 3, 4]);
        assert_eq!(data.ndim(), 3);
        assert_eq!(data.len(), 24);
        assert_eq!(data.dtype(), DataType::Float32);
        assert_eq!(data.dtype().to_string(), "float32");
    }

    #[test]
    fn test_statistics() {
        let array = ArrayD::from_shape_vec(IxDyn(&[1, 2, 2]), vec![-3_i16, 1, 2, 4]).unwrap();
        let stats = SignalData::from(array).statistics().unwrap();
        assert_relative_eq!(stats.min, -3.0);
        assert_relative_eq!(stats.max, 4.0);
        assert_relative_eq!(stats.mean, 1.0);
    }

    #[test]
    fn test_statistics_empty() {
        let data = SignalData::from(ArrayD::<u16>::zeros(IxDyn(&[0, 2, 2])));
        assert!(data.is_empty());
        assert!(data.statistics().is_none());
    }
}
