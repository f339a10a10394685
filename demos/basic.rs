//! Basic usage example for tssc.

use tssc::frame::{FrameReader, FrameWriter};
use tssc::{Decoder, Encoder, Sample, decode_blocks, encode_blocks};

const RAW_SAMPLE_BYTES: usize = 18;

fn main() {
    // Example 1: A handful of samples
    println!("=== Example 1: A Handful of Samples ===");
    let samples = vec![
        Sample::new(1, 1000, 0, 1.0),
        Sample::new(1, 1000, 0, 1.0),
        Sample::new(2, 1001, 0, 2.0),
    ];

    match encode_blocks(&samples, 1024) {
        Ok(blocks) => {
            let encoded: usize = blocks.iter().map(Vec::len).sum();
            println!("Samples: {}", samples.len());
            println!("Raw size: {} bytes", samples.len() * RAW_SAMPLE_BYTES);
            println!("Encoded size: {} bytes", encoded);

            match decode_blocks(&blocks) {
                Ok(recovered) => {
                    assert_eq!(recovered, samples);
                    println!("✓ Successfully decoded and verified!");
                }
                Err(e) => eprintln!("Decode error: {}", e),
            }
        }
        Err(e) => eprintln!("Encode error: {}", e),
    }

    println!();

    // Example 2: Streaming with an explicit encoder and decoder
    println!("=== Example 2: Streaming Session ===");
    let mut encoder = Encoder::new();
    let mut decoder = Decoder::new();
    let mut total = 0;

    for frame in 0..30i64 {
        encoder.set_buffer(vec![0; 512], 0, 512);

        let batch: Vec<Sample> = (0..10u16)
            .map(|id| {
                let value = 60.0 + f32::from(id) * 0.1 + (frame % 3) as f32 * 0.001;
                Sample::new(id, frame * 333_333, 0, value)
            })
            .collect();

        for sample in &batch {
            if !encoder.try_add_measurement(sample) {
                eprintln!("Block full");
                break;
            }
        }

        let len = encoder.finish_block();
        let block = encoder.take_buffer();
        total += len;

        decoder.set_buffer(block, 0, len);
        let decoded: Result<Vec<Sample>, _> = decoder.samples().collect();
        match decoded {
            Ok(decoded) => assert_eq!(decoded, batch),
            Err(e) => {
                eprintln!("Decode error: {}", e);
                return;
            }
        }
    }

    println!("300 samples in 30 blocks: {} bytes", total);
    println!(
        "Average: {:.2} bits/sample",
        total as f64 * 8.0 / 300.0
    );
    println!("✓ Every block decoded in order!");

    println!();

    // Example 3: Framed blocks over a lossy link
    println!("=== Example 3: Framed Blocks ===");
    let samples: Vec<Sample> = (0..2000u16)
        .map(|i| Sample::new(i % 20, i64::from(i / 20), 0, f32::from(i % 7)))
        .collect();

    let mut writer = match FrameWriter::new(256) {
        Ok(writer) => writer,
        Err(e) => {
            eprintln!("Frame error: {}", e);
            return;
        }
    };
    let frames = writer.encode(&samples);
    println!("Frames: {}", frames.len());

    let mut reader = FrameReader::new();
    for (index, frame) in frames.iter().enumerate() {
        // drop the third frame
        if index == 2 {
            continue;
        }
        match reader.read_frame(frame) {
            Ok(decoded) => println!("Frame {}: {} samples", index, decoded.len()),
            Err(e) => {
                println!("Frame {}: {}", index, e);
                break;
            }
        }
    }

    writer.reset();
    let mut recovered = Vec::new();
    for frame in writer.encode(&samples[..100]) {
        match reader.read_frame(&frame) {
            Ok(decoded) => recovered.extend(decoded),
            Err(e) => {
                eprintln!("Decode error: {}", e);
                return;
            }
        }
    }
    assert_eq!(recovered, &samples[..100]);
    println!("✓ Resynchronized after publisher reset!");

    println!();
    println!("=== All Examples Completed ===");
}
