#![allow(clippy::float_cmp, clippy::missing_panics_doc)]
use approx::assert_relative_eq;
use mrczio_core::{Axis, Metadata, Signal, SignalData};
use mrczio_io::{
    file_reader, file_writer, CodecEndian, CodecOptions, DecodeRequest, EncodeRequest,
    Endianness, Error, Header, HeaderShape, MrcCodec, MrczCodec, MrczReader, MrczWriter,
    ReadOptions, Result, WriteOptions, BEAM_ENERGY_PATH, GAIN_FACTOR_PATH, POP_FROM_HEADER,
};
use ndarray::{ArrayD, IxDyn};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::tempdir;

/// Codec double that serves a fixed header and records every call.
struct RecordingCodec {
    version: &'static str,
    header: Header,
    shape: Vec<usize>,
    decodes: Mutex<Vec<DecodeRequest>>,
    encodes: Mutex<Vec<(bool, EncodeRequest)>>,
}

impl RecordingCodec {
    fn new(version: &'static str) -> Self {
        let mut header = Header::new();
        for key in POP_FROM_HEADER {
            header.insert(key.to_string(), json!(0));
        }
        header.insert("pixelsize".to_string(), json!([0.25, 0.5, 0.75]));
        header.insert("pixelunits".to_string(), json!("nm"));
        header.insert("voltage".to_string(), json!([300.0]));
        header.insert("gain".to_string(), json!([4.0]));
        header.insert("General".to_string(), json!({"title": "synthetic"}));
        Self {
            version,
            header,
            shape: vec![5, 6, 7],
            decodes: Mutex::new(Vec::new()),
            encodes: Mutex::new(Vec::new()),
        }
    }

    fn last_encode(&self) -> (bool, EncodeRequest) {
        self.encodes.lock().unwrap().last().cloned().unwrap()
    }
}

impl MrczCodec for RecordingCodec {
    fn version(&self) -> &str {
        self.version
    }

    fn decode(&self, _path: &Path, request: &DecodeRequest) -> Result<(SignalData, Header)> {
        self.decodes.lock().unwrap().push(request.clone());
        let data = SignalData::from(ArrayD::<f32>::zeros(IxDyn(&self.shape)));
        Ok((data, self.header.clone()))
    }

    fn encode(&self, _data: &SignalData, _path: &Path, request: &EncodeRequest) -> Result<()> {
        self.encodes.lock().unwrap().push((false, request.clone()));
        Ok(())
    }

    fn encode_async(
        &self,
        _data: SignalData,
        _path: PathBuf,
        request: EncodeRequest,
    ) -> Result<()> {
        self.encodes.lock().unwrap().push((true, request));
        Ok(())
    }
}

fn stack_signal(scales: [f64; 3], units: &str) -> Signal {
    let values: Vec<f32> = (0..60).map(|v| v as f32 * 0.5).collect();
    let data = SignalData::from(ArrayD::from_shape_vec(IxDyn(&[3, 4, 5]), values).unwrap());
    let axes = vec![
        Axis::new("z", 3, 0)
            .with_scale(scales[0])
            .with_units(units)
            .with_navigate(true),
        Axis::new("y", 4, 1).with_scale(scales[1]).with_units(units),
        Axis::new("x", 5, 2).with_scale(scales[2]).with_units(units),
    ];
    Signal::new(data, axes).unwrap()
}

#[test]
fn test_read_builds_axes_in_array_order() {
    let reader = MrczReader::new(RecordingCodec::new("0.5.1"));
    let signals = reader.read("stack.mrcz", &ReadOptions::default()).unwrap();
    assert_eq!(signals.len(), 1);

    let axes = &signals[0].axes;
    assert_eq!(axes.iter().map(|a| a.size).collect::<Vec<_>>(), vec![5, 6, 7]);
    assert_eq!(
        axes.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(),
        vec!["z", "y", "x"]
    );
    assert_relative_eq!(axes[0].scale, 0.25);
    assert_relative_eq!(axes[1].scale, 0.5);
    assert_relative_eq!(axes[2].scale, 0.75);
    assert!(axes[0].navigate);
    assert!(axes.iter().all(|a| a.units == "nm" && a.offset == 0.0));
}

#[test]
fn test_read_prunes_format_fields() {
    let codec = RecordingCodec::new("0.5.1");
    let expected_header = codec.header.clone();
    let signal = MrczReader::new(codec)
        .read("stack.mrcz", &ReadOptions::default())
        .unwrap()
        .remove(0);

    for key in POP_FROM_HEADER {
        assert!(!signal.metadata.contains(key), "{key} leaked into metadata");
        assert!(signal.original_metadata.contains(&format!("mrcz_header.{key}")));
    }
    assert_eq!(signal.metadata.get("General.title"), Some(&json!("synthetic")));
    assert_eq!(
        signal.original_metadata.get("mrcz_header"),
        Some(&Value::Object(expected_header))
    );
}

#[test]
fn test_read_passes_decode_arguments() {
    let reader = MrczReader::new(RecordingCodec::new("0.5.1"));
    let options = ReadOptions::default()
        .with_endianness(Endianness::Big)
        .with_lazy(true)
        .with_option("n_threads", 3);
    reader.read("stack.mrcz", &options).unwrap();

    let decodes = reader.codec().decodes.lock().unwrap();
    assert_eq!(decodes.len(), 1);
    assert_eq!(decodes[0].endian, CodecEndian::Be);
    assert!(decodes[0].use_memmap);
    assert_eq!(decodes[0].pixel_units, "nm");
    assert_eq!(decodes[0].options.get("n_threads"), Some(&json!(3)));
}

#[test]
fn test_read_rejects_mmap_mode_before_decode() {
    let reader = MrczReader::new(RecordingCodec::new("0.5.1"));
    let options = ReadOptions::default().with_mmap_mode("r");
    assert!(matches!(
        reader.read("stack.mrcz", &options),
        Err(Error::InvalidArgument(_))
    ));
    assert!(reader.codec().decodes.lock().unwrap().is_empty());
}

#[test]
fn test_read_missing_header_key_is_fatal() {
    let mut codec = RecordingCodec::new("0.5.1");
    codec.header.remove("packedBytes");
    let reader = MrczReader::new(codec);
    assert!(matches!(
        reader.read("stack.mrcz", &ReadOptions::default()),
        Err(Error::MissingHeaderKey(key)) if key == "packedBytes"
    ));
}

#[test]
fn test_old_codec_mapping_unwraps_scalars() {
    let reader = MrczReader::new(RecordingCodec::new("0.4.3"));
    assert_eq!(reader.header_shape(), HeaderShape::Wrapped);

    let signal = reader
        .read("stack.mrcz", &ReadOptions::default())
        .unwrap()
        .remove(0);
    let mapped = signal.mapped_metadata().unwrap();
    assert_eq!(mapped.get_f64(BEAM_ENERGY_PATH).unwrap(), Some(300.0));
    assert_eq!(mapped.get_f64(GAIN_FACTOR_PATH).unwrap(), Some(4.0));
    assert!(mapped.contains("General.title"));
}

#[test]
fn test_write_defaults_for_missing_physics() {
    let writer = MrczWriter::new(RecordingCodec::new("0.5.1"));
    let signal = stack_signal([1.0, 2.0, 3.0], "nm");
    writer
        .write("out.mrcz", &signal, WriteOptions::default())
        .unwrap();

    let (was_async, request) = writer.codec().last_encode();
    assert!(!was_async);
    assert_eq!(request.voltage, None);
    assert_eq!(request.gain, 1.0);
    assert_eq!(request.c3, 0.0);
    assert_eq!(request.endian, CodecEndian::Le);
    assert_eq!(request.pixel_size, [1.0, 2.0, 3.0]);
    assert_eq!(request.pixel_units, "nm");
    assert_eq!(request.clevel, 1);
    assert_eq!(request.n_threads, None);
    assert_eq!(request.compressor, None);
}

#[test]
fn test_write_reads_physics_metadata() {
    let writer = MrczWriter::new(RecordingCodec::new("0.5.1"));
    let mut metadata = Metadata::new();
    metadata.set(BEAM_ENERGY_PATH, 200.0).unwrap();
    metadata.set(GAIN_FACTOR_PATH, 2.5).unwrap();
    let signal = stack_signal([1.0, 1.0, 1.0], "nm").with_metadata(metadata.clone());

    writer
        .write("out.mrcz", &signal, WriteOptions::default())
        .unwrap();

    let (_, request) = writer.codec().last_encode();
    assert_eq!(request.voltage, Some(200.0));
    assert_eq!(request.gain, 2.5);
    assert_eq!(request.meta, metadata);
}

#[test]
fn test_write_rejects_non_numeric_gain() {
    let writer = MrczWriter::new(RecordingCodec::new("0.5.1"));
    let mut metadata = Metadata::new();
    metadata.set(GAIN_FACTOR_PATH, "high").unwrap();
    let signal = stack_signal([1.0, 1.0, 1.0], "nm").with_metadata(metadata);

    assert!(matches!(
        writer.write("out.mrcz", &signal, WriteOptions::default()),
        Err(Error::Core(_))
    ));
    assert!(writer.codec().encodes.lock().unwrap().is_empty());
}

#[test]
fn test_write_endianness_option_is_consumed() {
    let writer = MrczWriter::new(RecordingCodec::new("0.5.1"));
    let signal = stack_signal([1.0, 1.0, 1.0], "nm");
    let options = WriteOptions::default()
        .with_endianness(Endianness::Big)
        .with_option("custom", true)
        .with_n_threads(4);
    writer.write("out.mrcz", &signal, options).unwrap();

    let (_, request) = writer.codec().last_encode();
    assert_eq!(request.endian, CodecEndian::Be);
    assert_eq!(request.n_threads, Some(4));
    let mut expected = CodecOptions::new();
    expected.insert("custom".to_string(), json!(true));
    assert_eq!(request.options, expected);

    let bad = WriteOptions::default().with_option("endianness", "=");
    assert!(matches!(
        writer.write("out.mrcz", &signal, bad),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn test_write_async_dispatches_background_encode() {
    let writer = MrczWriter::new(RecordingCodec::new("0.5.1"));
    let signal = stack_signal([1.0, 1.0, 1.0], "nm");
    writer
        .write("out.mrcz", &signal, WriteOptions::default().with_async(true))
        .unwrap();
    let (was_async, _) = writer.codec().last_encode();
    assert!(was_async);
}

#[test]
fn test_roundtrip_through_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stack.mrcz");

    let mut metadata = Metadata::new();
    metadata.set("General.title", "roundtrip").unwrap();
    metadata.set(BEAM_ENERGY_PATH, 300.0).unwrap();
    let signal = stack_signal([1.0, 2.0, 3.0], "nm").with_metadata(metadata);

    file_writer(&path, &signal, WriteOptions::default()).unwrap();
    let read = file_reader(&path, &ReadOptions::default()).unwrap().remove(0);

    assert_eq!(read.data, signal.data);
    for (got, want) in read.axes.iter().zip(&signal.axes) {
        assert_eq!(got.name, want.name);
        assert_eq!(got.size, want.size);
        assert_eq!(got.navigate, want.navigate);
        assert_relative_eq!(got.scale, want.scale, epsilon = 1e-6);
    }
    assert_eq!(read.metadata.get("General.title"), Some(&json!("roundtrip")));

    let mapped = read.mapped_metadata().unwrap();
    assert_eq!(mapped.get_f64(BEAM_ENERGY_PATH).unwrap(), Some(300.0));
    assert_eq!(mapped.get_f64(GAIN_FACTOR_PATH).unwrap(), Some(1.0));
}

#[test]
fn test_roundtrip_big_endian_lazy() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stack_be.mrcz");
    let signal = stack_signal([0.5, 0.5, 0.5], "nm");

    file_writer(
        &path,
        &signal,
        WriteOptions::default().with_endianness(Endianness::Big),
    )
    .unwrap();
    let options = ReadOptions::default()
        .with_endianness(Endianness::Big)
        .with_lazy(true);
    let read = file_reader(&path, &options).unwrap().remove(0);
    assert_eq!(read.data, signal.data);
    assert_relative_eq!(read.axes[2].scale, 0.5, epsilon = 1e-6);
}

#[test]
fn test_async_write_lands_on_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("async.mrcz");
    let signal = stack_signal([1.0, 1.0, 1.0], "nm");

    file_writer(&path, &signal, WriteOptions::default().with_async(true)).unwrap();

    let mut read = None;
    for _ in 0..400 {
        if let Ok(mut signals) = file_reader(&path, &ReadOptions::default()) {
            read = signals.pop();
            break;
        }
        std::thread::sleep(Duration::from_millis(25));
    }
    assert_eq!(read.expect("background write never completed").data, signal.data);
}

#[test]
fn test_codec_errors_propagate() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing.mrcz");
    assert!(matches!(
        file_reader(&missing, &ReadOptions::default()),
        Err(Error::Io(_))
    ));

    let signal = stack_signal([1.0, 1.0, 1.0], "<undefined>");
    assert!(matches!(
        file_writer(dir.path().join("out.mrcz"), &signal, WriteOptions::default()),
        Err(Error::UnsupportedUnits(_))
    ));
    assert_eq!(MrcCodec.version(), "0.5.0");
}
