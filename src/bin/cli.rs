//! tssc CLI - Compress measurement streams
//!
//! Usage:
//!   tssc encode <input.jsonl> -o <output> [OPTIONS]
//!   tssc decode <input> -o <output.jsonl> [OPTIONS]

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use owo_colors::OwoColorize;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;
use tssc::Sample;
use tssc::frame::{FrameReader, FrameWriter};

/// Measurement stream compression tool
#[derive(Parser)]
#[command(name = "tssc")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a JSON-lines sample file into TSSC frames
    Encode {
        /// Input file, one JSON sample per line
        input: PathBuf,

        /// Output frame file
        #[arg(short, long)]
        output: PathBuf,

        /// Maximum frame size in bytes
        #[arg(short, long, default_value_t = 1400)]
        block_size: usize,

        /// Outer compression method
        #[arg(short, long, value_enum, default_value = "none")]
        compress: Compression,

        /// Verify output by decoding and comparing
        #[arg(short, long)]
        verify: bool,

        /// Overwrite output file if it exists
        #[arg(short, long)]
        force: bool,

        /// Suppress output except errors
        #[arg(short, long)]
        quiet: bool,
    },
    /// Expand TSSC frames back into JSON-lines samples
    Decode {
        /// Input frame file
        input: PathBuf,

        /// Output file, one JSON sample per line
        #[arg(short, long)]
        output: PathBuf,

        /// Outer compression format (auto-detected by default)
        #[arg(long, value_enum)]
        format: Option<Compression>,

        /// Overwrite output file if it exists
        #[arg(short, long)]
        force: bool,

        /// Suppress output except errors
        #[arg(short, long)]
        quiet: bool,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum Compression {
    /// No outer compression
    None,
    /// Zstd compression (good balance)
    Zstd,
    /// LZ4 compression (faster)
    Lz4,
}

/// One JSON line of a sample file.
#[derive(Debug, Serialize, Deserialize)]
struct Record {
    id: u16,
    timestamp: i64,
    #[serde(default)]
    quality: u32,
    value: f32,
}

impl From<Record> for Sample {
    fn from(record: Record) -> Self {
        Sample::new(record.id, record.timestamp, record.quality, record.value)
    }
}

impl From<&Sample> for Record {
    fn from(sample: &Sample) -> Self {
        Self {
            id: sample.point_id,
            timestamp: sample.timestamp,
            quality: sample.quality,
            value: sample.value,
        }
    }
}

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_ENCODE_DECODE_FAILED: i32 = 2;

/// Bytes of the length prefix before each frame in a frame file.
const RECORD_LEN_BYTES: usize = 4;

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Encode {
            input,
            output,
            block_size,
            compress,
            verify,
            force,
            quiet,
        } => handle_encode(&input, &output, block_size, compress, verify, force, quiet),
        Commands::Decode {
            input,
            output,
            format,
            force,
            quiet,
        } => handle_decode(&input, &output, format, force, quiet),
    };

    match result {
        Ok(()) => process::exit(EXIT_SUCCESS),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".bright_red().bold(), e);

            let message = e.to_string();
            let exit_code = if message.contains("Encode failed")
                || message.contains("Decode failed")
                || message.contains("Verification failed")
            {
                EXIT_ENCODE_DECODE_FAILED
            } else {
                EXIT_ERROR
            };

            process::exit(exit_code);
        }
    }
}

fn handle_encode(
    input_path: &Path,
    output_path: &Path,
    block_size: usize,
    compress: Compression,
    verify: bool,
    force: bool,
    quiet: bool,
) -> Result<()> {
    if !input_path.exists() {
        bail!("File not found: {}", input_path.display());
    }
    if output_path.exists() && !force {
        bail!(
            "Output file already exists: {}\n   Use --force to overwrite",
            output_path.display()
        );
    }

    let total_steps = if verify { 4 } else { 3 };

    if !quiet {
        println!(
            "{} Reading samples...",
            format!("Step 1/{}:", total_steps).bright_cyan()
        );
    }

    let samples = read_samples(input_path)?;
    let input_size = fs::metadata(input_path)
        .context("Failed to read input file metadata")?
        .len();

    if !quiet {
        println!(
            "{} {} samples, {}",
            "Input:".bright_cyan(),
            samples.len(),
            format_bytes(input_size)
        );
        println!(
            "{} Encoding frames...",
            format!("Step 2/{}:", total_steps).bright_cyan()
        );
    }

    let start = Instant::now();
    let mut writer =
        FrameWriter::new(block_size).map_err(|e| anyhow::anyhow!("Encode failed: {}", e))?;
    let frames = writer.encode(&samples);
    let encoded = pack_frames(&frames)?;
    let encode_time = start.elapsed();

    let (final_data, compression_time) = if compress != Compression::None {
        if !quiet {
            println!(
                "{} Compressing with {:?}...",
                format!("Step 2.5/{}:", total_steps).bright_cyan(),
                compress
            );
        }

        let start = Instant::now();
        let compressed = match compress {
            Compression::Zstd => compress_zstd(&encoded)?,
            Compression::Lz4 => compress_lz4(&encoded)?,
            Compression::None => unreachable!(),
        };
        (compressed, Some(start.elapsed()))
    } else {
        (encoded, None)
    };

    if !quiet {
        println!(
            "{} Writing output...",
            format!("Step 3/{}:", total_steps).bright_cyan()
        );
    }

    fs::write(output_path, &final_data)
        .with_context(|| format!("Failed to write output file: {}", output_path.display()))?;

    let verify_time = if verify {
        if !quiet {
            println!("{} Verifying frames...", "Step 4/4:".bright_cyan());
        }

        let start = Instant::now();
        let (raw, _, _) = decompress_if_needed(&final_data, Some(compress), true)?;
        let decoded = decode_frames(&raw)?;

        if decoded != samples {
            bail!(
                "Verification failed: decoded samples do not match input\n   \
                 Expected {} samples, got {}",
                samples.len(),
                decoded.len()
            );
        }

        Some(start.elapsed())
    } else {
        None
    };

    if !quiet {
        println!();
        println!(
            "{} Created {} ({} in {} frames, {:.1}% of input, {:.2} bytes/sample)",
            "Success:".bright_green().bold(),
            output_path.display(),
            format_bytes(final_data.len() as u64),
            frames.len(),
            (final_data.len() as f64 / input_size.max(1) as f64) * 100.0,
            final_data.len() as f64 / samples.len().max(1) as f64
        );
        print!("   Encoding took {}", format_duration(encode_time));
        if let Some(comp_time) = compression_time {
            print!(", compression took {}", format_duration(comp_time));
        }
        if let Some(verify_time) = verify_time {
            print!(", verification took {}", format_duration(verify_time));
        }
        println!();
    }

    Ok(())
}

fn handle_decode(
    input_path: &Path,
    output_path: &Path,
    format_override: Option<Compression>,
    force: bool,
    quiet: bool,
) -> Result<()> {
    if !input_path.exists() {
        bail!("File not found: {}", input_path.display());
    }
    if output_path.exists() && !force {
        bail!(
            "Output file already exists: {}\n   Use --force to overwrite",
            output_path.display()
        );
    }

    if !quiet {
        println!("{} Reading frames...", "Step 1/3:".bright_cyan());
    }

    let data = fs::read(input_path)
        .with_context(|| format!("Failed to read input file: {}", input_path.display()))?;

    let (raw, detected_format, decompression_time) =
        decompress_if_needed(&data, format_override, quiet)?;

    if !quiet && detected_format != Compression::None {
        println!(
            "{} Detected {:?} compression",
            "Info:".bright_cyan(),
            detected_format
        );
    }

    if !quiet {
        println!("{} Decoding frames...", "Step 2/3:".bright_cyan());
    }

    let start = Instant::now();
    let samples = decode_frames(&raw)?;
    let decode_time = start.elapsed();

    if !quiet {
        println!("{} Writing samples...", "Step 3/3:".bright_cyan());
    }

    write_samples(output_path, &samples)?;

    if !quiet {
        println!();
        println!(
            "{} Created {} ({} samples)",
            "Success:".bright_green().bold(),
            output_path.display(),
            samples.len()
        );
        print!("   Decoding took {}", format_duration(decode_time));
        if let Some(decomp_time) = decompression_time {
            print!(", decompression took {}", format_duration(decomp_time));
        }
        println!();
    }

    Ok(())
}

// ============================================================================
// Sample Files
// ============================================================================

fn read_samples(path: &Path) -> Result<Vec<Sample>> {
    let file = fs::File::open(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;

    let mut samples = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.context("Failed to read input line")?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Record = serde_json::from_str(&line)
            .with_context(|| format!("Invalid sample on line {}", index + 1))?;
        samples.push(record.into());
    }

    Ok(samples)
}

fn write_samples(path: &Path, samples: &[Sample]) -> Result<()> {
    let file = fs::File::create(path)
        .with_context(|| format!("Failed to write output file: {}", path.display()))?;
    let mut out = BufWriter::new(file);

    for sample in samples {
        serde_json::to_writer(&mut out, &Record::from(sample))
            .context("Failed to serialize sample")?;
        out.write_all(b"\n")?;
    }

    out.flush()?;
    Ok(())
}

// ============================================================================
// Frame Files
// ============================================================================

fn pack_frames(frames: &[Vec<u8>]) -> Result<Vec<u8>> {
    let total: usize = frames.iter().map(|f| f.len() + RECORD_LEN_BYTES).sum();
    let mut out = Vec::with_capacity(total);

    for frame in frames {
        let len = u32::try_from(frame.len()).context("Frame too large to encode")?;
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(frame);
    }

    Ok(out)
}

fn decode_frames(data: &[u8]) -> Result<Vec<Sample>> {
    let mut reader = FrameReader::new();
    let mut samples = Vec::new();
    let mut rest = data;

    while !rest.is_empty() {
        if rest.len() < RECORD_LEN_BYTES {
            bail!("Decode failed: truncated frame length");
        }
        let (len, tail) = rest.split_at(RECORD_LEN_BYTES);
        let len = u32::from_be_bytes([len[0], len[1], len[2], len[3]]) as usize;
        if tail.len() < len {
            bail!(
                "Decode failed: frame needs {} bytes, {} left",
                len,
                tail.len()
            );
        }

        let (frame, tail) = tail.split_at(len);
        let decoded = reader
            .read_frame(frame)
            .map_err(|e| anyhow::anyhow!("Decode failed: {}", e))?;
        samples.extend(decoded);
        rest = tail;
    }

    Ok(samples)
}

// ============================================================================
// Compression/Decompression
// ============================================================================

fn compress_zstd(data: &[u8]) -> Result<Vec<u8>> {
    zstd::encode_all(data, 3).context("Zstd compression failed")
}

fn compress_lz4(data: &[u8]) -> Result<Vec<u8>> {
    // Frame format, so the magic bytes are present for detection
    let mut compressed = Vec::new();
    let mut encoder = lz4::EncoderBuilder::new()
        .level(1)
        .build(&mut compressed)
        .context("Failed to create LZ4 encoder")?;

    io::copy(&mut &data[..], &mut encoder).context("Failed to compress with LZ4")?;

    let (_output, result) = encoder.finish();
    result.context("Failed to finish LZ4 compression")?;

    Ok(compressed)
}

fn decompress_if_needed(
    data: &[u8],
    format_override: Option<Compression>,
    quiet: bool,
) -> Result<(Vec<u8>, Compression, Option<std::time::Duration>)> {
    const ZSTD_MAGIC: &[u8] = &[0x28, 0xB5, 0x2F, 0xFD];
    const LZ4_MAGIC: &[u8] = &[0x04, 0x22, 0x4D, 0x18];

    let format = match format_override {
        Some(format) => format,
        None if data.starts_with(ZSTD_MAGIC) => Compression::Zstd,
        None if data.starts_with(LZ4_MAGIC) => Compression::Lz4,
        None => Compression::None,
    };

    let start = Instant::now();
    let decompressed = match format {
        Compression::None => return Ok((data.to_vec(), Compression::None, None)),
        Compression::Zstd => {
            if !quiet {
                println!("{} Decompressing with Zstd...", "Step 1.5/3:".bright_cyan());
            }
            zstd::decode_all(data).context("Zstd decompression failed")?
        }
        Compression::Lz4 => {
            if !quiet {
                println!("{} Decompressing with LZ4...", "Step 1.5/3:".bright_cyan());
            }
            decompress_lz4(data)?
        }
    };

    Ok((decompressed, format, Some(start.elapsed())))
}

fn decompress_lz4(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = lz4::Decoder::new(data).context("Failed to create LZ4 decoder")?;

    let mut decompressed = Vec::new();
    io::copy(&mut decoder, &mut decompressed).context("Failed to decompress LZ4 data")?;

    Ok(decompressed)
}

// ============================================================================
// Utilities
// ============================================================================

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn format_duration(duration: std::time::Duration) -> String {
    let nanos = duration.as_nanos();

    if nanos < 1_000 {
        format!("{}ns", nanos)
    } else if nanos < 1_000_000 {
        format!("{:.1}μs", nanos as f64 / 1_000.0)
    } else if nanos < 1_000_000_000 {
        format!("{:.2}ms", nanos as f64 / 1_000_000.0)
    } else {
        format!("{:.3}s", duration.as_secs_f64())
    }
}
