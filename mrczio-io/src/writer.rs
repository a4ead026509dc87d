//! MRCZ writer adapter.

use crate::codec::{CodecOptions, Compressor, EncodeRequest, Endianness, MrczCodec};
use crate::mapping::{BEAM_ENERGY_PATH, GAIN_FACTOR_PATH};
use crate::reader::WRITE_ORDER;
use crate::{Error, Result};
use log::debug;
use mrczio_core::{Axis, Signal};
use serde_json::Value;
use std::path::Path;

/// Pass-through option overriding the byte order of the written file.
pub const ENDIANNESS_OPTION: &str = "endianness";

/// Gain written when the metadata carries none.
pub const DEFAULT_GAIN: f64 = 1.0;

/// Spherical aberration written to every file; the application metadata
/// has no field for it.
pub const SPHERICAL_ABERRATION: f64 = 0.0;

/// Write configuration.
#[derive(Clone, Debug)]
pub struct WriteOptions {
    /// Dispatch the encode in the background and return immediately.
    pub do_async: bool,
    /// Compressor, `None` for uncompressed output.
    pub compressor: Option<Compressor>,
    /// Compression level.
    pub clevel: u8,
    /// Worker threads for the codec, `None` for its default.
    pub n_threads: Option<usize>,
    /// Options forwarded to the codec's encode call. An `"endianness"`
    /// entry (`"<"` or `">"`) is consumed by the adapter.
    pub options: CodecOptions,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            do_async: false,
            compressor: None,
            clevel: 1,
            n_threads: None,
            options: CodecOptions::new(),
        }
    }
}

impl WriteOptions {
    /// Enable or disable background writing.
    #[must_use]
    pub fn with_async(mut self, enabled: bool) -> Self {
        self.do_async = enabled;
        self
    }

    /// Set the compressor.
    #[must_use]
    pub fn with_compressor(mut self, compressor: Option<Compressor>) -> Self {
        self.compressor = compressor;
        self
    }

    /// Set the compression level.
    #[must_use]
    pub fn with_clevel(mut self, clevel: u8) -> Self {
        self.clevel = clevel;
        self
    }

    /// Set the codec thread count.
    ///
    /// Values less than 1 are clamped to 1.
    #[must_use]
    pub fn with_n_threads(mut self, threads: usize) -> Self {
        self.n_threads = Some(threads.max(1));
        self
    }

    /// Set the byte order of the written file.
    #[must_use]
    pub fn with_endianness(self, endianness: Endianness) -> Self {
        self.with_option(ENDIANNESS_OPTION, endianness.symbol())
    }

    /// Add an option forwarded to the codec.
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

/// Writes [`Signal`]s to MRCZ files through a codec.
#[derive(Debug)]
pub struct MrczWriter<C> {
    codec: C,
}

impl<C: MrczCodec> MrczWriter<C> {
    /// Wraps a codec.
    pub fn new(codec: C) -> Self {
        Self { codec }
    }

    /// Returns the wrapped codec.
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Writes a signal, or dispatches a background write if
    /// `options.do_async` is set.
    ///
    /// A missing beam energy is passed to the codec as `None` and a
    /// missing gain as [`DEFAULT_GAIN`].
    ///
    /// # Errors
    /// Returns an error if the signal has fewer than 3 axes, if the
    /// endianness option or the physics metadata are malformed, or if the
    /// codec fails.
    pub fn write<P: AsRef<Path>>(
        &self,
        path: P,
        signal: &Signal,
        options: WriteOptions,
    ) -> Result<()> {
        let path = path.as_ref();
        let WriteOptions {
            do_async,
            compressor,
            clevel,
            n_threads,
            options: mut codec_options,
        } = options;

        let endianness = match codec_options.remove(ENDIANNESS_OPTION) {
            None => Endianness::Little,
            Some(Value::String(symbol)) => symbol.parse()?,
            Some(other) => {
                return Err(Error::InvalidArgument(format!(
                    "endianness must be a string, got {other}"
                )))
            }
        };

        // Signal axes share their units.
        let pixel_units = signal
            .axes
            .last()
            .ok_or_else(|| Error::InvalidArgument("signal has no axes".to_string()))?
            .units
            .clone();
        let pixel_size = pixel_size(&signal.axes)?;

        let voltage = signal.metadata.get_f64(BEAM_ENERGY_PATH)?;
        let gain = signal.metadata.get_f64_or(GAIN_FACTOR_PATH, DEFAULT_GAIN)?;

        let request = EncodeRequest {
            meta: signal.metadata.clone(),
            endian: endianness.into(),
            pixel_size,
            pixel_units,
            voltage,
            c3: SPHERICAL_ABERRATION,
            gain,
            compressor,
            clevel,
            n_threads,
            options: codec_options,
        };

        debug!(
            "Writing MRCZ file: {} (endian={}, compressor={}, async={do_async})",
            path.display(),
            request.endian,
            compressor.map_or("none", Compressor::name),
        );

        if do_async {
            self.codec
                .encode_async(signal.data.clone(), path.to_path_buf(), request)
        } else {
            self.codec.encode(&signal.data, path, &request)
        }
    }
}

fn pixel_size(axes: &[Axis]) -> Result<[f64; 3]> {
    let mut pixel_size = [0.0; 3];
    for (dst, index) in pixel_size.iter_mut().zip(WRITE_ORDER) {
        *dst = axes
            .get(index)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "MRCZ needs 3 axes, signal has {}",
                    axes.len()
                ))
            })?
            .scale;
    }
    Ok(pixel_size)
}
