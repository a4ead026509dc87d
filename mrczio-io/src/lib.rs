//! mrczio-io: MRCZ adapters for the mrczio signal model.
//!
//! The reader and writer translate between a [`MrczCodec`]'s header and
//! array representation and [`mrczio_core::Signal`]. [`MrcCodec`] is the
//! bundled uncompressed codec used by [`file_reader`] and [`file_writer`].
//!

pub mod codec;
mod error;
pub mod mapping;
pub mod mrc;
mod reader;
mod writer;

pub use codec::{
    CodecEndian, CodecOptions, Compressor, DecodeRequest, EncodeRequest, Endianness, Header,
    MrczCodec,
};
pub use error::{Error, Result};
pub use mapping::{HeaderShape, BEAM_ENERGY_PATH, GAIN_FACTOR_PATH, ORIGINAL_HEADER_KEY};
pub use mrc::MrcCodec;
pub use reader::{
    MrczReader, ReadOptions, POP_FROM_HEADER, READ_ORDER, READ_PIXEL_UNITS, SUPPORTED_MMAP_MODE,
    WRITE_ORDER,
};
pub use writer::{MrczWriter, WriteOptions, DEFAULT_GAIN, ENDIANNESS_OPTION, SPHERICAL_ABERRATION};

use mrczio_core::Signal;
use std::path::Path;

/// Reads an MRCZ file with the bundled codec.
///
/// # Errors
/// See [`MrczReader::read`].
pub fn file_reader<P: AsRef<Path>>(path: P, options: &ReadOptions) -> Result<Vec<Signal>> {
    MrczReader::new(MrcCodec).read(path, options)
}

/// Writes a signal to an MRCZ file with the bundled codec.
///
/// # Errors
/// See [`MrczWriter::write`].
pub fn file_writer<P: AsRef<Path>>(path: P, signal: &Signal, options: WriteOptions) -> Result<()> {
    MrczWriter::new(MrcCodec).write(path, signal, options)
}
