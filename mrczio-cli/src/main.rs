//! mrczio command-line interface.
//!
//! Inspects MRCZ stacks and rewrites them with a different byte order or
//! calibration through the reader and writer adapters.
#![allow(clippy::uninlined_format_args)]

use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use mrczio_core::{Axis, Signal};
use mrczio_io::{
    file_reader, file_writer, Compressor, Endianness, ReadOptions, WriteOptions, BEAM_ENERGY_PATH,
    GAIN_FACTOR_PATH,
};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    MrczIo(#[from] mrczio_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] mrczio_core::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} contains no signal")]
    Empty(PathBuf),
}

/// Byte order selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ByteOrder {
    /// Little-endian ("<")
    Little,
    /// Big-endian (">")
    Big,
}

impl From<ByteOrder> for Endianness {
    fn from(order: ByteOrder) -> Self {
        match order {
            ByteOrder::Little => Endianness::Little,
            ByteOrder::Big => Endianness::Big,
        }
    }
}

/// Inspect and rewrite MRCZ image stacks.
#[derive(Parser)]
#[command(name = "mrczio")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print axes and metadata of an MRCZ file as JSON
    Info {
        /// Input MRCZ file
        input: PathBuf,

        /// Byte order of the input file
        #[arg(short, long, value_enum, default_value = "little")]
        endianness: ByteOrder,

        /// Decode through a copy-on-write memory map
        #[arg(long)]
        lazy: bool,
    },

    /// Read an MRCZ file and write it back out
    Convert {
        /// Input MRCZ file
        input: PathBuf,

        /// Output MRCZ file
        output: PathBuf,

        /// Byte order of the input file
        #[arg(long, value_enum, default_value = "little")]
        input_endianness: ByteOrder,

        /// Byte order of the output file
        #[arg(short, long, value_enum, default_value = "little")]
        endianness: ByteOrder,

        /// Compressor for the output file
        #[arg(long)]
        compressor: Option<Compressor>,

        /// Compression level
        #[arg(long, default_value = "1")]
        clevel: u8,

        /// Worker threads used by the codec
        #[arg(short = 'j', long)]
        threads: Option<usize>,

        /// Override the beam energy (keV) stored in the output
        #[arg(long)]
        beam_energy: Option<f64>,

        /// Override the detector gain stored in the output
        #[arg(long)]
        gain: Option<f64>,
    },
}

#[derive(Serialize)]
struct SignalSummary<'a> {
    file: String,
    dtype: String,
    shape: &'a [usize],
    axes: &'a [Axis],
    metadata: Value,
    original_metadata: &'a Value,
}

fn read_first(input: &Path, options: &ReadOptions) -> Result<Signal> {
    file_reader(input, options)?
        .into_iter()
        .next()
        .ok_or_else(|| CliError::Empty(input.to_path_buf()))
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Info {
            input,
            endianness,
            lazy,
        } => {
            let options = ReadOptions::default()
                .with_endianness(endianness.into())
                .with_lazy(lazy);
            let signal = read_first(&input, &options)?;

            let original = Value::from(signal.original_metadata.clone());
            let summary = SignalSummary {
                file: input.display().to_string(),
                dtype: signal.data.dtype().to_string(),
                shape: signal.data.shape(),
                axes: &signal.axes,
                metadata: Value::from(signal.mapped_metadata()?),
                original_metadata: &original,
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Commands::Convert {
            input,
            output,
            input_endianness,
            endianness,
            compressor,
            clevel,
            threads,
            beam_energy,
            gain,
        } => {
            let start = Instant::now();
            let options = ReadOptions::default().with_endianness(input_endianness.into());
            let mut signal = read_first(&input, &options)?;

            // Carry calibration from the source header into the written metadata.
            signal.metadata = signal.mapped_metadata()?;
            if let Some(energy) = beam_energy {
                signal.metadata.set(BEAM_ENERGY_PATH, energy)?;
            }
            if let Some(gain) = gain {
                signal.metadata.set(GAIN_FACTOR_PATH, gain)?;
            }

            let mut write_options = WriteOptions::default()
                .with_endianness(endianness.into())
                .with_compressor(compressor)
                .with_clevel(clevel);
            if let Some(threads) = threads {
                write_options = write_options.with_n_threads(threads);
            }
            file_writer(&output, &signal, write_options)?;

            info!(
                "converted {} -> {} in {:.2?}",
                input.display(),
                output.display(),
                start.elapsed()
            );
            println!(
                "Wrote {} ({} {:?})",
                output.display(),
                signal.data.dtype(),
                signal.data.shape()
            );
        }
    }

    Ok(())
}
