//! Bundled MRC2014 codec.
//!
//! Writes and reads uncompressed MRCZ files: a 1024-byte MRC2014 header,
//! an optional JSON extended header holding application metadata, then the
//! stack in C order `[nz, ny, nx]`.
//!
//! Header words used beyond the MRC2014 standard (all in the `EXTRA`
//! area):
//!
//! | Offset | Type  | Field                            |
//! |--------|-------|----------------------------------|
//! | 104    | 4 × u8| extended header type (`"json"`)  |
//! | 108    | i32   | format version (20140)           |
//! | 132    | f32   | voltage, NaN if unknown          |
//! | 136    | f32   | spherical aberration C3          |
//! | 140    | f32   | detector gain                    |
//!
//! The MRCZ compressor is stored in the mode word as
//! `mode + 1000 * compressor code`. Only code 0 is produced or accepted.

use crate::codec::{
    CodecEndian, CodecOptions, Compressor, DecodeRequest, EncodeRequest, Header, MrczCodec,
};
use crate::{Error, Result};
use log::{debug, error, warn};
use memmap2::MmapOptions;
use mrczio_core::{DataType, Metadata, SignalData};
use ndarray::{ArrayD, IxDyn};
use rayon::prelude::*;
use serde_json::{json, Value};
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Version reported by [`MrcCodec`].
pub const MRC_CODEC_VERSION: &str = "0.5.0";

const HEADER_LEN: usize = 1024;
const COMPRESSOR_STRIDE: i32 = 1000;
const MRC_VERSION: i32 = 20140;
const JSON_META_ID: &str = "json";

const OFF_DIMS: usize = 0;
const OFF_MODE: usize = 12;
const OFF_SAMPLING: usize = 28;
const OFF_CELL: usize = 40;
const OFF_ANGLES: usize = 52;
const OFF_AXIS_MAP: usize = 64;
const OFF_STATS: usize = 76;
const OFF_NSYMBT: usize = 92;
const OFF_EXTTYP: usize = 104;
const OFF_NVERSION: usize = 108;
const OFF_VOLTAGE: usize = 132;
const OFF_C3: usize = 136;
const OFF_GAIN: usize = 140;
const OFF_MAP: usize = 208;
const OFF_MACHST: usize = 212;

/// Ångströms per unit for the pixel units the codec understands.
fn angstroms_per_unit(units: &str) -> Result<f64> {
    match units {
        "A" | "Å" | "\u{212B}" | "angstrom" => Ok(1.0),
        "pm" => Ok(0.01),
        "nm" => Ok(10.0),
        "um" | "µm" | "μm" => Ok(1.0e4),
        other => Err(Error::UnsupportedUnits(other.to_string())),
    }
}

fn mode_for(dtype: DataType) -> i32 {
    match dtype {
        DataType::Int8 => 0,
        DataType::Int16 => 1,
        DataType::Float32 => 2,
        DataType::UInt16 => 6,
    }
}

fn dtype_for(mode: i32) -> Result<DataType> {
    match mode {
        0 => Ok(DataType::Int8),
        1 => Ok(DataType::Int16),
        2 => Ok(DataType::Float32),
        6 => Ok(DataType::UInt16),
        other => Err(Error::UnsupportedDataType(format!("MRC mode {other}"))),
    }
}

fn machine_stamp(endian: CodecEndian) -> [u8; 4] {
    match endian {
        CodecEndian::Le => [0x44, 0x44, 0x00, 0x00],
        CodecEndian::Be => [0x11, 0x11, 0x00, 0x00],
    }
}

/// An element type that can be stored in an MRC stack.
trait MrcElement: Copy + Send + Sync + 'static {
    const SIZE: usize;

    fn read(bytes: &[u8], endian: CodecEndian) -> Self;

    fn write(self, out: &mut [u8], endian: CodecEndian);
}

macro_rules! impl_mrc_element {
    ($($ty:ty),*) => {
        $(
            impl MrcElement for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn read(bytes: &[u8], endian: CodecEndian) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$ty>()];
                    buf.copy_from_slice(&bytes[..Self::SIZE]);
                    match endian {
                        CodecEndian::Le => <$ty>::from_le_bytes(buf),
                        CodecEndian::Be => <$ty>::from_be_bytes(buf),
                    }
                }

                #[inline]
                fn write(self, out: &mut [u8], endian: CodecEndian) {
                    let buf = match endian {
                        CodecEndian::Le => self.to_le_bytes(),
                        CodecEndian::Be => self.to_be_bytes(),
                    };
                    out[..Self::SIZE].copy_from_slice(&buf);
                }
            }
        )*
    };
}

impl_mrc_element!(i8, i16, i32, f32, u16);

/// Fixed 1024-byte header buffer with endian-aware accessors.
struct HeaderBlock {
    bytes: [u8; HEADER_LEN],
    endian: CodecEndian,
}

impl HeaderBlock {
    fn new(endian: CodecEndian) -> Self {
        Self {
            bytes: [0; HEADER_LEN],
            endian,
        }
    }

    fn from_slice(bytes: &[u8], endian: CodecEndian) -> Result<Self> {
        let bytes: [u8; HEADER_LEN] = bytes
            .get(..HEADER_LEN)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| {
                Error::InvalidFormat(format!(
                    "file is shorter than the {HEADER_LEN}-byte MRC header"
                ))
            })?;
        Ok(Self { bytes, endian })
    }

    fn i32_at(&self, offset: usize) -> i32 {
        i32::read(&self.bytes[offset..offset + 4], self.endian)
    }

    fn f32_at(&self, offset: usize) -> f32 {
        f32::read(&self.bytes[offset..offset + 4], self.endian)
    }

    fn put_i32(&mut self, offset: usize, value: i32) {
        value.write(&mut self.bytes[offset..offset + 4], self.endian);
    }

    fn put_f32(&mut self, offset: usize, value: f32) {
        value.write(&mut self.bytes[offset..offset + 4], self.endian);
    }

    fn word(&self, offset: usize) -> [u8; 4] {
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.bytes[offset..offset + 4]);
        word
    }
}

/// Fields of an MRC header relevant to decoding.
#[derive(Debug, Clone, PartialEq)]
struct MrcHeader {
    /// `[nx, ny, nz]`.
    dims: [usize; 3],
    dtype: DataType,
    compressor: Option<Compressor>,
    mode_word: i32,
    /// Cell lengths in Å, `[x, y, z]`.
    cell: [f32; 3],
    min: f32,
    max: f32,
    mean: f32,
    extended_bytes: usize,
    meta_id: String,
    voltage: f32,
    c3: f32,
    gain: f32,
    machine_stamp: [u8; 4],
}

impl MrcHeader {
    fn parse(block: &HeaderBlock) -> Result<Self> {
        let mut dims = [0usize; 3];
        for (i, dim) in dims.iter_mut().enumerate() {
            let raw = block.i32_at(OFF_DIMS + 4 * i);
            *dim = usize::try_from(raw)
                .map_err(|_| Error::InvalidFormat(format!("negative dimension {raw}")))?;
        }

        let mode_word = block.i32_at(OFF_MODE);
        let compressor = Compressor::from_code(mode_word / COMPRESSOR_STRIDE)?;
        let dtype = dtype_for(mode_word % COMPRESSOR_STRIDE)?;

        let raw_ext = block.i32_at(OFF_NSYMBT);
        let extended_bytes = usize::try_from(raw_ext)
            .map_err(|_| Error::InvalidFormat(format!("negative extended header size {raw_ext}")))?;

        let meta_id = String::from_utf8_lossy(&block.bytes[OFF_EXTTYP..OFF_EXTTYP + 4])
            .trim_end_matches(['\0', ' '])
            .to_string();

        Ok(Self {
            dims,
            dtype,
            compressor,
            mode_word,
            cell: [
                block.f32_at(OFF_CELL),
                block.f32_at(OFF_CELL + 4),
                block.f32_at(OFF_CELL + 8),
            ],
            min: block.f32_at(OFF_STATS),
            max: block.f32_at(OFF_STATS + 4),
            mean: block.f32_at(OFF_STATS + 8),
            extended_bytes,
            meta_id,
            voltage: block.f32_at(OFF_VOLTAGE),
            c3: block.f32_at(OFF_C3),
            gain: block.f32_at(OFF_GAIN),
            machine_stamp: block.word(OFF_MACHST),
        })
    }

    fn to_block(&self, endian: CodecEndian) -> Result<HeaderBlock> {
        let mut block = HeaderBlock::new(endian);
        for (i, &dim) in self.dims.iter().enumerate() {
            let dim = i32::try_from(dim).map_err(|_| {
                Error::InvalidArgument(format!("dimension {dim} exceeds MRC limits"))
            })?;
            block.put_i32(OFF_DIMS + 4 * i, dim);
            block.put_i32(OFF_SAMPLING + 4 * i, dim);
        }
        block.put_i32(OFF_MODE, self.mode_word);
        for (i, &len) in self.cell.iter().enumerate() {
            block.put_f32(OFF_CELL + 4 * i, len);
            block.put_f32(OFF_ANGLES + 4 * i, 90.0);
        }
        for (i, map) in [1, 2, 3].into_iter().enumerate() {
            block.put_i32(OFF_AXIS_MAP + 4 * i, map);
        }
        block.put_f32(OFF_STATS, self.min);
        block.put_f32(OFF_STATS + 4, self.max);
        block.put_f32(OFF_STATS + 8, self.mean);
        let extended = i32::try_from(self.extended_bytes).map_err(|_| {
            Error::InvalidArgument("metadata exceeds the extended header limit".to_string())
        })?;
        block.put_i32(OFF_NSYMBT, extended);

        let mut meta_id = [b' '; 4];
        let id = self.meta_id.as_bytes();
        let n = id.len().min(4);
        meta_id[..n].copy_from_slice(&id[..n]);
        block.bytes[OFF_EXTTYP..OFF_EXTTYP + 4].copy_from_slice(&meta_id);
        block.put_i32(OFF_NVERSION, MRC_VERSION);

        block.put_f32(OFF_VOLTAGE, self.voltage);
        block.put_f32(OFF_C3, self.c3);
        block.put_f32(OFF_GAIN, self.gain);
        block.bytes[OFF_MAP..OFF_MAP + 4].copy_from_slice(b"MAP ");
        block.bytes[OFF_MACHST..OFF_MACHST + 4].copy_from_slice(&machine_stamp(endian));
        Ok(block)
    }

    /// Array shape in C order, `[nz, ny, nx]`.
    fn shape(&self) -> [usize; 3] {
        [self.dims[2], self.dims[1], self.dims[0]]
    }

    fn data_len(&self) -> Result<usize> {
        self.dims
            .iter()
            .try_fold(self.dtype.size_of(), |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| Error::InvalidFormat("stack size overflows".to_string()))
    }

    /// Pixel size `[z, y, x]` converted to `units`.
    fn pixel_size(&self, units: &str) -> Result<[f64; 3]> {
        let factor = angstroms_per_unit(units)?;
        let per_axis = |cell: f32, dim: usize| {
            if dim == 0 {
                0.0
            } else {
                #[allow(clippy::cast_precision_loss)]
                let dim = dim as f64;
                f64::from(cell) / dim / factor
            }
        };
        Ok([
            per_axis(self.cell[2], self.dims[2]),
            per_axis(self.cell[1], self.dims[1]),
            per_axis(self.cell[0], self.dims[0]),
        ])
    }

    fn into_header(self, units: &str, meta: Option<Metadata>) -> Result<Header> {
        let pixel_size = self.pixel_size(units)?;
        let voltage = if self.voltage.is_nan() {
            Value::Null
        } else {
            json!(f64::from(self.voltage))
        };
        let mut header = Header::new();
        header.insert("compressor".to_string(), json!(self.compressor.map(Compressor::name)));
        header.insert("MRCtype".to_string(), json!(self.mode_word % COMPRESSOR_STRIDE));
        header.insert("C3".to_string(), json!(f64::from(self.c3)));
        header.insert("dimensions".to_string(), json!(self.shape()));
        header.insert("dtype".to_string(), json!(self.dtype.name()));
        header.insert("extendedBytes".to_string(), json!(self.extended_bytes));
        header.insert("gain".to_string(), json!(f64::from(self.gain)));
        header.insert("maxImage".to_string(), json!(f64::from(self.max)));
        header.insert("minImage".to_string(), json!(f64::from(self.min)));
        header.insert("meanImage".to_string(), json!(f64::from(self.mean)));
        header.insert("metaId".to_string(), json!(self.meta_id));
        header.insert("packedBytes".to_string(), json!(0));
        header.insert("pixelsize".to_string(), json!(pixel_size));
        header.insert("pixelunits".to_string(), json!(units));
        header.insert("voltage".to_string(), voltage);
        if let Some(meta) = meta {
            for (key, value) in meta.into_map() {
                header.entry(key).or_insert(value);
            }
        }
        Ok(header)
    }
}

/// Runs `op` on a dedicated pool of `n_threads` workers, or on the global
/// rayon pool.
fn install<R: Send>(n_threads: Option<usize>, op: impl FnOnce() -> R + Send) -> Result<R> {
    match n_threads {
        Some(threads) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| Error::ThreadPool(e.to_string()))?;
            Ok(pool.install(op))
        }
        None => Ok(op()),
    }
}

fn decode_elements<T: MrcElement>(
    bytes: &[u8],
    shape: &[usize],
    endian: CodecEndian,
) -> Result<ArrayD<T>> {
    let values: Vec<T> = bytes
        .par_chunks_exact(T::SIZE)
        .map(|chunk| T::read(chunk, endian))
        .collect();
    ArrayD::from_shape_vec(IxDyn(shape), values).map_err(|e| Error::InvalidFormat(e.to_string()))
}

fn encode_elements<T: MrcElement>(array: &ArrayD<T>, endian: CodecEndian) -> Vec<u8> {
    let values: Cow<'_, [T]> = match array.as_slice() {
        Some(slice) => Cow::Borrowed(slice),
        None => Cow::Owned(array.iter().copied().collect()),
    };
    let mut out = vec![0u8; values.len() * T::SIZE];
    out.par_chunks_exact_mut(T::SIZE)
        .zip(values.par_iter())
        .for_each(|(chunk, &value)| value.write(chunk, endian));
    out
}

fn decode_data(bytes: &[u8], header: &MrcHeader, endian: CodecEndian) -> Result<SignalData> {
    let shape = header.shape();
    Ok(match header.dtype {
        DataType::Int8 => SignalData::Int8(decode_elements(bytes, &shape, endian)?),
        DataType::Int16 => SignalData::Int16(decode_elements(bytes, &shape, endian)?),
        DataType::Float32 => SignalData::Float32(decode_elements(bytes, &shape, endian)?),
        DataType::UInt16 => SignalData::UInt16(decode_elements(bytes, &shape, endian)?),
    })
}

fn encode_data(data: &SignalData, endian: CodecEndian) -> Vec<u8> {
    match data {
        SignalData::Int8(a) => encode_elements(a, endian),
        SignalData::Int16(a) => encode_elements(a, endian),
        SignalData::Float32(a) => encode_elements(a, endian),
        SignalData::UInt16(a) => encode_elements(a, endian),
    }
}

/// Reads the `n_threads` pass-through option, warning about any other.
fn thread_option(options: &CodecOptions, call: &str) -> Result<Option<usize>> {
    let mut n_threads = None;
    for (key, value) in options {
        if key == "n_threads" {
            let threads = value
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .filter(|&n| n > 0)
                .ok_or_else(|| {
                    Error::InvalidArgument(format!(
                        "n_threads must be a positive integer, got {value}"
                    ))
                })?;
            n_threads = Some(threads);
        } else {
            warn!("ignoring unsupported {call} option '{key}'");
        }
    }
    Ok(n_threads)
}

/// Uncompressed MRCZ codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct MrcCodec;

impl MrcCodec {
    /// Creates the codec.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn decode_bytes(bytes: &[u8], request: &DecodeRequest) -> Result<(SignalData, Header)> {
        let block = HeaderBlock::from_slice(bytes, request.endian)?;
        let header = MrcHeader::parse(&block)?;
        if let Some(compressor) = header.compressor {
            return Err(Error::UnsupportedCompressor(compressor.name().to_string()));
        }
        if header.machine_stamp[0] != 0 && header.machine_stamp != machine_stamp(request.endian) {
            warn!(
                "machine stamp {:02x?} does not match requested byte order '{}'",
                header.machine_stamp, request.endian
            );
        }

        let data_start = HEADER_LEN
            .checked_add(header.extended_bytes)
            .ok_or_else(|| Error::InvalidFormat("extended header size overflows".to_string()))?;
        let data_end = data_start
            .checked_add(header.data_len()?)
            .ok_or_else(|| Error::InvalidFormat("stack size overflows".to_string()))?;
        if bytes.len() < data_end {
            return Err(Error::InvalidFormat(format!(
                "file holds {} bytes, header describes {data_end}",
                bytes.len()
            )));
        }

        let meta = if header.meta_id == JSON_META_ID && header.extended_bytes > 0 {
            Some(serde_json::from_slice::<Metadata>(&bytes[HEADER_LEN..data_start])?)
        } else {
            None
        };

        let n_threads = thread_option(&request.options, "decode")?;
        let endian = request.endian;
        let data = install(n_threads, || {
            decode_data(&bytes[data_start..data_end], &header, endian)
        })??;

        let header = header.into_header(&request.pixel_units, meta)?;
        Ok((data, header))
    }
}

impl MrczCodec for MrcCodec {
    fn version(&self) -> &str {
        MRC_CODEC_VERSION
    }

    fn decode(&self, path: &Path, request: &DecodeRequest) -> Result<(SignalData, Header)> {
        if request.use_memmap {
            let file = File::open(path)?;
            // SAFETY: The mapping is private copy-on-write; concurrent writers to the
            // file are outside the codec's contract.
            #[allow(unsafe_code)]
            let mmap = unsafe { MmapOptions::new().map_copy_read_only(&file)? };
            Self::decode_bytes(&mmap, request)
        } else {
            let bytes = std::fs::read(path)?;
            Self::decode_bytes(&bytes, request)
        }
    }

    fn encode(&self, data: &SignalData, path: &Path, request: &EncodeRequest) -> Result<()> {
        if let Some(compressor) = request.compressor {
            return Err(Error::UnsupportedCompressor(compressor.name().to_string()));
        }
        let dims = match data.shape() {
            &[nz, ny, nx] => [nx, ny, nz],
            &[ny, nx] => [nx, ny, 1],
            shape => {
                return Err(Error::InvalidArgument(format!(
                    "MRC stores 2- or 3-dimensional arrays, got shape {shape:?}"
                )))
            }
        };
        for (key, _) in &request.options {
            warn!("ignoring unsupported encode option '{key}'");
        }

        let factor = angstroms_per_unit(&request.pixel_units)?;
        let [pz, py, px] = request.pixel_size;
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
        let cell_len = |pixel: f64, dim: usize| (pixel * factor * dim as f64) as f32;

        let meta = if request.meta.is_empty() {
            Vec::new()
        } else {
            serde_json::to_vec(&request.meta)?
        };

        let stats = data.statistics();
        #[allow(clippy::cast_possible_truncation)]
        let header = MrcHeader {
            dims,
            dtype: data.dtype(),
            compressor: None,
            mode_word: mode_for(data.dtype()),
            cell: [cell_len(px, dims[0]), cell_len(py, dims[1]), cell_len(pz, dims[2])],
            min: stats.map_or(0.0, |s| s.min as f32),
            max: stats.map_or(0.0, |s| s.max as f32),
            mean: stats.map_or(0.0, |s| s.mean as f32),
            extended_bytes: meta.len(),
            meta_id: if meta.is_empty() { String::new() } else { JSON_META_ID.to_string() },
            voltage: request.voltage.map_or(f32::NAN, |v| v as f32),
            c3: request.c3 as f32,
            gain: request.gain as f32,
            machine_stamp: machine_stamp(request.endian),
        };
        let block = header.to_block(request.endian)?;

        debug!(
            "encoding {:?} {} stack (clevel {} ignored without compression)",
            data.shape(),
            data.dtype(),
            request.clevel
        );
        let endian = request.endian;
        let payload = install(request.n_threads, || encode_data(data, endian))?;

        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(&block.bytes)?;
        writer.write_all(&meta)?;
        writer.write_all(&payload)?;
        writer.flush()?;
        Ok(())
    }

    fn encode_async(&self, data: SignalData, path: PathBuf, request: EncodeRequest) -> Result<()> {
        let codec = *self;
        rayon::spawn(move || {
            if let Err(e) = codec.encode(&data, &path, &request) {
                error!("background write of {} failed: {e}", path.display());
            }
        });
        Ok(())
    }
}
