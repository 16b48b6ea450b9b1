use anyhow::{Context, Result};
use bmv31t001::frame::{encode_control, encode_data, Command};
use colored::Colorize;
use std::path::Path;

/// Payload size used by the host update tool.
pub const DEFAULT_CHUNK: u8 = 64;

pub fn run(input: &Path, output: &Path, chunk: u8, erase: bool) -> Result<()> {
    println!();
    println!("{}", "📦 Packing audio image...".cyan().bold());
    println!();

    let image = std::fs::read(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    if image.is_empty() {
        anyhow::bail!("{} is empty", input.display());
    }

    let stream = build_stream(&image, chunk, erase)?;

    std::fs::write(output, &stream)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "{}",
        format!(
            "  ✓ {} bytes in {} data frames -> {} ({} bytes)",
            image.len(),
            image.len().div_ceil(usize::from(chunk)),
            output.display(),
            stream.len()
        )
        .green()
    );
    println!();

    Ok(())
}

/// Frame `image` as one complete update session.
///
/// `COMSPI`, optionally `COMCE`, the image split into `chunk`-byte data
/// frames, then `COMORD`.
pub fn build_stream(image: &[u8], chunk: u8, erase: bool) -> Result<Vec<u8>> {
    if chunk == 0 {
        anyhow::bail!("chunk size must be at least 1");
    }

    let mut stream = Vec::new();
    push_control(&mut stream, Command::SwitchToSpi)?;
    if erase {
        push_control(&mut stream, Command::ChipErase)?;
    }
    for piece in image.chunks(usize::from(chunk)) {
        let frame = encode_data(piece).map_err(|e| anyhow::anyhow!("data frame: {e}"))?;
        stream.extend_from_slice(&frame);
    }
    push_control(&mut stream, Command::Finish)?;
    Ok(stream)
}

fn push_control(stream: &mut Vec<u8>, command: Command) -> Result<()> {
    let frame = encode_control(command)
        .map_err(|e| anyhow::anyhow!("{} frame: {e}", command.label()))?;
    stream.extend_from_slice(&frame);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;
    use bmv31t001::frame::{decode, FrameKind};

    fn frames(mut stream: &[u8]) -> Vec<(FrameKind, Vec<u8>)> {
        let mut out = Vec::new();
        while !stream.is_empty() {
            let frame = decode(stream).unwrap();
            let len = 5 + frame.payload.len();
            out.push((frame.kind, frame.payload.to_vec()));
            stream = &stream[len..];
        }
        out
    }

    #[test]
    fn session_is_wrapped_in_control_frames() {
        let image: Vec<u8> = (0..150u8).collect();
        let stream = build_stream(&image, 64, true).unwrap();
        let frames = frames(&stream);

        assert_eq!(frames.len(), 6);
        assert_eq!(frames[0], (FrameKind::Control, b"COMSPI".to_vec()));
        assert_eq!(frames[1], (FrameKind::Control, b"COMCE".to_vec()));
        assert_eq!(frames[2].1.len(), 64);
        assert_eq!(frames[3].1.len(), 64);
        assert_eq!(frames[4].1.len(), 22);
        assert_eq!(frames[5], (FrameKind::Control, b"COMORD".to_vec()));

        let data: Vec<u8> = frames[2..5].iter().flat_map(|(_, p)| p.clone()).collect();
        assert_eq!(data, image);
    }

    #[test]
    fn erase_can_be_skipped() {
        let stream = build_stream(&[1, 2, 3], 64, false).unwrap();
        let frames = frames(&stream);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[1], (FrameKind::Data, vec![1, 2, 3]));
    }

    #[test]
    fn zero_chunk_is_rejected() {
        assert!(build_stream(&[1], 0, true).is_err());
    }

    #[test]
    fn run_writes_stream_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("voice.bin");
        let output = dir.path().join("voice.frames");
        std::fs::write(&input, [0x11u8; 100]).unwrap();

        run(&input, &output, 64, true).unwrap();

        let written = std::fs::read(&output).unwrap();
        assert_eq!(written, build_stream(&[0x11; 100], 64, true).unwrap());
    }
}
