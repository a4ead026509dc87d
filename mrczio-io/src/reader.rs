//! MRCZ reader adapter.
//!

use crate::codec::{CodecOptions, DecodeRequest, Endianness, Header, MrczCodec};
use crate::mapping::{HeaderShape, ORIGINAL_HEADER_KEY};
use crate::{Error, Result};
use log::debug;
use mrczio_core::{Axis, Metadata, Signal};
use serde_json::{Map, Value};
use std::path::Path;

/// Header index feeding each constructed axis. The application mixes
/// Fortran and C ordering, so axes are built as `y, x, z` and the `z`
/// axis is then rotated to the front.
pub const READ_ORDER: [usize; 3] = [1, 2, 0];

/// Axis indices whose scales form the header pixel size on write.
pub const WRITE_ORDER: [usize; 3] = [0, 1, 2];

const AXIS_NAMES: [&str; 3] = ["y", "x", "z"];
const AXIS_NAVIGATE: [bool; 3] = [false, false, true];

/// Format-internal header fields removed from the exposed metadata.
pub const POP_FROM_HEADER: [&str; 15] = [
    "compressor",
    "MRCtype",
    "C3",
    "dimensions",
    "dtype",
    "extendedBytes",
    "gain",
    "maxImage",
    "minImage",
    "meanImage",
    "metaId",
    "packedBytes",
    "pixelsize",
    "pixelunits",
    "voltage",
];

/// The only memory-map mode the codec supports (copy-on-write).
pub const SUPPORTED_MMAP_MODE: &str = "c";

/// Units the reader asks the codec to report pixel sizes in.
pub const READ_PIXEL_UNITS: &str = "nm";

/// Read configuration.
#[derive(Clone, Debug)]
pub struct ReadOptions {
    /// Byte order of the file.
    pub endianness: Endianness,
    /// Ask the codec to memory-map the data instead of reading it.
    ///
    /// This only selects the codec's I/O path. [`MrcCodec`](crate::MrcCodec)
    /// still converts every element into an owned array, so peak memory is
    /// the same as an eager read.
    pub lazy: bool,
    /// Memory-map mode; only `"c"` is accepted.
    pub mmap_mode: String,
    /// Options forwarded to the codec's decode call.
    pub options: CodecOptions,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            endianness: Endianness::Little,
            lazy: false,
            mmap_mode: SUPPORTED_MMAP_MODE.to_string(),
            options: CodecOptions::new(),
        }
    }
}

impl ReadOptions {
    /// Set the byte order of the file.
    #[must_use]
    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    /// Fallible variant of [`Self::with_endianness`] taking `"<"` or `">"`.
    ///
    /// # Errors
    /// Returns an error for any other string.
    pub fn try_with_endianness(self, endianness: &str) -> Result<Self> {
        Ok(self.with_endianness(endianness.parse()?))
    }

    /// Enable or disable memory-mapped decoding.
    #[must_use]
    pub fn with_lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// Set the memory-map mode.
    #[must_use]
    pub fn with_mmap_mode(mut self, mode: impl Into<String>) -> Self {
        self.mmap_mode = mode.into();
        self
    }

    /// Add an option forwarded to the codec.
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

/// Reads MRCZ files into [`Signal`]s through a codec.
///
/// The header shape of the codec is detected once, on construction.
#[derive(Debug)]
pub struct MrczReader<C> {
    codec: C,
    shape: HeaderShape,
}

impl<C: MrczCodec> MrczReader<C> {
    /// Wraps a codec.
    pub fn new(codec: C) -> Self {
        let shape = HeaderShape::for_version(codec.version());
        Self { codec, shape }
    }

    /// Returns the wrapped codec.
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Returns the header shape selected for the codec.
    pub fn header_shape(&self) -> HeaderShape {
        self.shape
    }

    /// Reads a file and returns a list holding exactly one signal.
    ///
    /// # Errors
    /// Returns an error if the memory-map mode is not `"c"` (before the
    /// codec is called), if the codec fails, or if the decoded header
    /// lacks any expected field.
    pub fn read<P: AsRef<Path>>(&self, path: P, options: &ReadOptions) -> Result<Vec<Signal>> {
        let path = path.as_ref();
        debug!("Reading MRCZ file: {}", path.display());

        if options.mmap_mode != SUPPORTED_MMAP_MODE {
            // Compressed data cannot be memory-mapped.
            return Err(Error::InvalidArgument(format!(
                "MRCZ supports only copy-on-write memory-maps ('{SUPPORTED_MMAP_MODE}'), got '{}'",
                options.mmap_mode
            )));
        }

        let request = DecodeRequest {
            endian: options.endianness.into(),
            use_memmap: options.lazy,
            pixel_units: READ_PIXEL_UNITS.to_string(),
            options: options.options.clone(),
        };
        let (data, header) = self.codec.decode(path, &request)?;

        let axes = build_axes(data.shape(), &header)?;
        let metadata = prune_header(&header)?;

        let mut original = Map::new();
        original.insert(ORIGINAL_HEADER_KEY.to_string(), Value::Object(header));

        let signal = Signal::new(data, axes)?
            .with_metadata(metadata)
            .with_original_metadata(Metadata::from(original))
            .with_mapping(self.shape.mapping());

        Ok(vec![signal])
    }
}

/// Builds the `z, y, x` axes of a decoded stack.
fn build_axes(shape: &[usize], header: &Header) -> Result<Vec<Axis>> {
    if shape.len() != 3 {
        return Err(Error::InvalidFormat(format!(
            "expected a 3-dimensional stack, got shape {shape:?}"
        )));
    }
    let pixel_size = header_pixel_size(header)?;
    let units = header
        .get("pixelunits")
        .ok_or_else(|| Error::MissingHeaderKey("pixelunits".to_string()))?
        .as_str()
        .ok_or_else(|| Error::InvalidFormat("pixelunits is not a string".to_string()))?;

    let mut axes: Vec<Axis> = READ_ORDER
        .iter()
        .zip(AXIS_NAMES)
        .zip(AXIS_NAVIGATE)
        .map(|((&index, name), navigate)| Axis {
            size: shape[index],
            index_in_array: index,
            name: name.to_string(),
            scale: pixel_size[index],
            offset: 0.0,
            units: units.to_string(),
            navigate,
        })
        .collect();
    axes.rotate_right(1);
    Ok(axes)
}

fn header_pixel_size(header: &Header) -> Result<[f64; 3]> {
    let invalid = || Error::InvalidFormat("pixelsize is not a sequence of 3 numbers".to_string());
    let values = header
        .get("pixelsize")
        .ok_or_else(|| Error::MissingHeaderKey("pixelsize".to_string()))?
        .as_array()
        .ok_or_else(invalid)?;
    if values.len() != 3 {
        return Err(invalid());
    }
    let mut pixel_size = [0.0; 3];
    for (dst, value) in pixel_size.iter_mut().zip(values) {
        *dst = value.as_f64().ok_or_else(invalid)?;
    }
    Ok(pixel_size)
}

/// Copies the header without its format-internal fields.
fn prune_header(header: &Header) -> Result<Metadata> {
    let mut metadata = header.clone();
    for key in POP_FROM_HEADER {
        metadata
            .remove(key)
            .ok_or_else(|| Error::MissingHeaderKey(key.to_string()))?;
    }
    Ok(Metadata::from(metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use serde_json::json;

    fn synthetic_header() -> Header {
        let mut header = Header::new();
        for key in POP_FROM_HEADER {
            header.insert(key.to_string(), Value::Null);
        }
        header.insert("pixelsize".to_string(), json!([0.5, 2.0, 3.0]));
        header.insert("pixelunits".to_string(), json!("nm"));
        header.insert("General".to_string(), json!({"title": "stack"}));
        header
    }

    #[test]
    fn test_read_order_with_rotation_matches_write_order() {
        let mut order = READ_ORDER;
        order.rotate_right(1);
        assert_eq!(order, WRITE_ORDER);
    }

    #[test]
    fn test_build_axes() {
        let axes = build_axes(&[4, 5, 6], &synthetic_header()).unwrap();

        let names: Vec<&str> = axes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["z", "y", "x"]);
        assert_eq!(axes.iter().map(|a| a.size).collect::<Vec<_>>(), vec![4, 5, 6]);
        assert_eq!(
            axes.iter().map(|a| a.index_in_array).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(
            axes.iter().map(|a| a.navigate).collect::<Vec<_>>(),
            vec![true, false, false]
        );
        assert_relative_eq!(axes[0].scale, 0.5);
        assert_relative_eq!(axes[1].scale, 2.0);
        assert_relative_eq!(axes[2].scale, 3.0);
        assert!(axes.iter().all(|a| a.units == "nm" && a.offset == 0.0));
    }

    #[test]
    fn test_build_axes_rejects_bad_input() {
        assert!(matches!(
            build_axes(&[4, 5], &synthetic_header()),
            Err(Error::InvalidFormat(_))
        ));

        let mut header = synthetic_header();
        header.insert("pixelsize".to_string(), json!([1.0, 2.0]));
        assert!(matches!(
            build_axes(&[4, 5, 6], &header),
            Err(Error::InvalidFormat(_))
        ));

        header.remove("pixelsize");
        assert!(matches!(
            build_axes(&[4, 5, 6], &header),
            Err(Error::MissingHeaderKey(key)) if key == "pixelsize"
        ));
    }

    #[test]
    fn test_prune_header() {
        let metadata = prune_header(&synthetic_header()).unwrap();
        assert_eq!(metadata.keys().collect::<Vec<_>>(), vec!["General"]);
    }

    #[test]
    fn test_prune_header_missing_key() {
        let mut header = synthetic_header();
        header.remove("metaId");
        assert!(matches!(
            prune_header(&header),
            Err(Error::MissingHeaderKey(key)) if key == "metaId"
        ));
    }

    #[test]
    fn test_options_builder() {
        let options = ReadOptions::default()
            .try_with_endianness(">")
            .unwrap()
            .with_lazy(true)
            .with_option("n_threads", 2);
        assert_eq!(options.endianness, Endianness::Big);
        assert!(options.lazy);
        assert_eq!(options.mmap_mode, "c");
        assert_eq!(options.options.get("n_threads"), Some(&json!(2)));
        assert!(ReadOptions::default().try_with_endianness("|").is_err());
    }
}
