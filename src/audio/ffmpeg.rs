use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::decode::AudioDecoder;
use super::pcm::PcmBuffer;
use crate::error::PipelineError;

/// Decodes through an external `ffmpeg` binary into a scoped temporary file of
/// raw signed 16-bit little-endian mono PCM.
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    binary: PathBuf,
}

impl FfmpegDecoder {
    /// Locates `ffmpeg` on `PATH`. A missing binary is a startup error, not a per-file one.
    pub fn locate() -> crate::error::Result<Self> {
        let binary = which::which("ffmpeg").map_err(|e| {
            PipelineError::Validation(format!("ffmpeg decoder selected but not found: {}", e))
        })?;
        log::info!("Using ffmpeg at {}", binary.display());
        Ok(Self { binary })
    }

    fn run(&self, input: &Path, target_rate: u32) -> Result<Vec<f32>> {
        // Removed when `raw` drops, on success and on every error path.
        let raw = tempfile::Builder::new()
            .prefix("stemchart-")
            .suffix(".pcm")
            .tempfile()
            .context("Failed to create temporary PCM file")?;

        let output = Command::new(&self.binary)
            .args(["-nostdin", "-hide_banner", "-loglevel", "error", "-y", "-i"])
            .arg(input)
            .args(["-ac", "1", "-ar"])
            .arg(target_rate.to_string())
            .args(["-f", "s16le", "-acodec", "pcm_s16le"])
            .arg(raw.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .context("Failed to spawn ffmpeg")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("ffmpeg exited with {}:\n{}", output.status, stderr.trim());
        }

        let bytes = std::fs::read(raw.path()).context("Failed to read decoded PCM")?;
        Ok(pcm_s16le_to_f32(&bytes))
    }
}

impl AudioDecoder for FfmpegDecoder {
    fn decode(&self, path: &Path, target_rate: u32) -> crate::error::Result<PcmBuffer> {
        let samples = self
            .run(path, target_rate)
            .map_err(|e| PipelineError::decode(path, format!("{:#}", e)))?;
        log::info!(
            "Decoded {} via ffmpeg: {} samples, {:.1}s",
            path.display(),
            samples.len(),
            samples.len() as f32 / target_rate as f32
        );
        Ok(PcmBuffer::new(samples, target_rate))
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

fn pcm_s16le_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}
