use anyhow::{Context, Result, bail};
use clap::Parser;
use cm160_lib::{FrameKind, decode, split_frames};
use std::fs;
use std::path::PathBuf;

/// Classify, validate and decode CM160 frames given as hex.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Hex-encoded reads (whitespace inside a read is not allowed here; use --file)
    buffers: Vec<String>,
    /// Capture file with one hex-encoded read per line
    #[arg(short, long)]
    file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut reads = Vec::new();
    if let Some(path) = &cli.file {
        let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let compact: String = line.split_whitespace().collect();
            let bytes = hex::decode(&compact).with_context(|| format!("Invalid hex on line {}", number + 1))?;
            reads.push(bytes);
        }
    }
    for arg in &cli.buffers {
        reads.push(hex::decode(arg).with_context(|| format!("Invalid hex argument '{}'", arg))?);
    }
    if reads.is_empty() {
        bail!("No frames given; pass hex arguments or --file");
    }

    let mut last_valid_month = 0u8;
    let mut index = 0usize;
    for read in &reads {
        let mut frames = split_frames(read);
        for frame in frames.by_ref() {
            let kind = frame.kind();
            print!("#{:<5} {}  {:<15}", index, frame, kind.to_string());
            match kind {
                FrameKind::Invalid => println!(" unknown type byte {:#04x}", frame.as_bytes()[0]),
                _ if kind.is_data() && frame.validate().is_err() => {
                    println!(" bad checksum {:#04x}, computed {:#04x}", frame.checksum(), frame.computed_checksum());
                }
                FrameKind::Live | FrameKind::HistoricalData => {
                    let (reading, month) = decode(&frame, last_valid_month);
                    last_valid_month = month;
                    println!(" {}", reading);
                }
                FrameKind::Handshake(handshake) => println!(" ack {:#04x}", handshake.ack()),
                FrameKind::Empty => println!(),
            }
            index += 1;
        }
        let remainder = frames.remainder();
        if !remainder.is_empty() {
            println!("       {} trailing bytes dropped: {}", remainder.len(), hex::encode(remainder));
        }
    }

    Ok(())
}
