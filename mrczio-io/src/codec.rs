//! The codec seam the adapters delegate to.
//!
//! A [`MrczCodec`] owns everything about the on-disk representation:
//! binary layout, compression, memory-mapping and background writes. The
//! reader and writer adapters only marshal arguments in and out of it.

use crate::{Error, Result};
use mrczio_core::{Metadata, SignalData};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Field mapping returned by [`MrczCodec::decode`].
pub type Header = Map<String, Value>;

/// Free-form options forwarded to the codec untouched.
pub type CodecOptions = Map<String, Value>;

/// Byte order as spelled by the application (`"<"` or `">"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

impl Endianness {
    /// Returns `"<"` or `">"`.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Little => "<",
            Self::Big => ">",
        }
    }
}

impl FromStr for Endianness {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "<" => Ok(Self::Little),
            ">" => Ok(Self::Big),
            other => Err(Error::InvalidArgument(format!(
                "endianness must be '<' or '>', got '{other}'"
            ))),
        }
    }
}

/// Byte order as spelled by the codec (`"le"` or `"be"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecEndian {
    Le,
    Be,
}

impl CodecEndian {
    /// Returns `"le"` or `"be"`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Le => "le",
            Self::Be => "be",
        }
    }
}

impl From<Endianness> for CodecEndian {
    fn from(endianness: Endianness) -> Self {
        match endianness {
            Endianness::Little => Self::Le,
            Endianness::Big => Self::Be,
        }
    }
}

impl fmt::Display for CodecEndian {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compressors known to the MRCZ format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compressor {
    Blosclz,
    Lz4,
    Lz4hc,
    Snappy,
    Zlib,
    Zstd,
}

impl Compressor {
    /// Name used in headers and on the command line.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Blosclz => "blosclz",
            Self::Lz4 => "lz4",
            Self::Lz4hc => "lz4hc",
            Self::Snappy => "snappy",
            Self::Zlib => "zlib",
            Self::Zstd => "zstd",
        }
    }

    /// Code stored in the thousands of the MRC mode word. Zero means
    /// uncompressed.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Blosclz => 1,
            Self::Lz4 => 2,
            Self::Lz4hc => 3,
            Self::Snappy => 4,
            Self::Zlib => 5,
            Self::Zstd => 6,
        }
    }

    /// Inverse of [`Self::code`]; `Ok(None)` for code 0.
    ///
    /// # Errors
    /// Returns an error for codes outside the MRCZ table.
    pub fn from_code(code: i32) -> Result<Option<Self>> {
        Ok(Some(match code {
            0 => return Ok(None),
            1 => Self::Blosclz,
            2 => Self::Lz4,
            3 => Self::Lz4hc,
            4 => Self::Snappy,
            5 => Self::Zlib,
            6 => Self::Zstd,
            other => {
                return Err(Error::InvalidFormat(format!(
                    "unknown compressor code {other}"
                )))
            }
        }))
    }
}

impl FromStr for Compressor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "blosclz" => Ok(Self::Blosclz),
            "lz4" => Ok(Self::Lz4),
            "lz4hc" => Ok(Self::Lz4hc),
            "snappy" => Ok(Self::Snappy),
            "zlib" => Ok(Self::Zlib),
            "zstd" => Ok(Self::Zstd),
            other => Err(Error::UnsupportedCompressor(other.to_string())),
        }
    }
}

impl fmt::Display for Compressor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Arguments of a decode call.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeRequest {
    pub endian: CodecEndian,
    /// Read the file through a memory map. The returned array is owned either way.
    pub use_memmap: bool,
    /// Units the returned `pixelsize` is expressed in.
    pub pixel_units: String,
    pub options: CodecOptions,
}

/// Arguments of an encode call.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeRequest {
    /// Application metadata stored alongside the data.
    pub meta: Metadata,
    pub endian: CodecEndian,
    /// Pixel size per array dimension, `[z, y, x]`.
    pub pixel_size: [f64; 3],
    pub pixel_units: String,
    /// Accelerating voltage, if known.
    pub voltage: Option<f64>,
    /// Spherical aberration coefficient.
    pub c3: f64,
    /// Detector gain.
    pub gain: f64,
    pub compressor: Option<Compressor>,
    pub clevel: u8,
    pub n_threads: Option<usize>,
    pub options: CodecOptions,
}

/// An MRCZ encoder/decoder.
pub trait MrczCodec {
    /// Version of the codec, e.g. `"0.5.1"`.
    fn version(&self) -> &str;

    /// Reads a file into an array and its header fields.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or decoded.
    fn decode(&self, path: &Path, request: &DecodeRequest) -> Result<(SignalData, Header)>;

    /// Writes an array to a file and returns once it is on disk.
    ///
    /// # Errors
    /// Returns an error if the data cannot be encoded or written.
    fn encode(&self, data: &SignalData, path: &Path, request: &EncodeRequest) -> Result<()>;

    /// Starts writing an array in the background and returns immediately.
    ///
    /// Completion and failures of the background write are owned by the
    /// codec.
    ///
    /// # Errors
    /// Returns an error only if the write could not be dispatched.
    fn encode_async(&self, data: SignalData, path: PathBuf, request: EncodeRequest) -> Result<()>;
}
