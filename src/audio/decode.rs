use anyhow::{Context, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::pcm::PcmBuffer;
use super::resample::resample;
use crate::error::PipelineError;

/// Turns an audio file into mono PCM at `target_rate`.
///
/// Implementations must not keep state between calls; one decoder may serve
/// many files concurrently.
pub trait AudioDecoder: Send + Sync {
    fn decode(&self, path: &Path, target_rate: u32) -> crate::error::Result<PcmBuffer>;

    fn name(&self) -> &'static str;
}

/// In-process decoding through symphonia.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoder;

impl AudioDecoder for SymphoniaDecoder {
    fn decode(&self, path: &Path, target_rate: u32) -> crate::error::Result<PcmBuffer> {
        let (samples, source_rate) =
            decode_mono(path).map_err(|e| PipelineError::decode(path, format!("{:#}", e)))?;
        let samples = if source_rate == target_rate {
            samples
        } else {
            log::debug!("Resampling {}Hz -> {}Hz", source_rate, target_rate);
            resample(&samples, source_rate, target_rate)
                .map_err(|e| PipelineError::decode(path, format!("{:#}", e)))?
        };
        Ok(PcmBuffer::new(samples, target_rate))
    }

    fn name(&self) -> &'static str {
        "symphonia"
    }
}

fn decode_mono(path: &Path) -> Result<(Vec<f32>, u32)> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .context("Failed to probe audio format")?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .context("No audio tracks found")?;

    let track_id = track.id;
    let channels = track.codec_params.channels.map_or(1, |c| c.count());
    let sample_rate = track.codec_params.sample_rate.context("Unknown sample rate")?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create audio decoder")?;

    let mut all_samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        let samples = sample_buf.samples();

        if channels == 1 {
            all_samples.extend_from_slice(samples);
        } else {
            for frame_samples in samples.chunks(channels) {
                all_samples.push(frame_samples.iter().sum::<f32>() / channels as f32);
            }
        }
    }

    log::info!(
        "Decoded {}: {} samples, {}Hz, {:.1}s",
        path.display(),
        all_samples.len(),
        sample_rate,
        all_samples.len() as f32 / sample_rate as f32
    );

    Ok((all_samples, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::onset::OnsetDetector;
    use crate::config::OnsetConfig;

    /// 2 s of 48 kHz stereo: 20 ms 1 kHz bursts at 0.10 s and 0.50 s, the right
    /// channel at half the level of the left.
    fn write_stereo_wav(path: &Path) {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 48_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..96_000u32 {
            let t = i as f32 / 48_000.0;
            let in_burst = (0.10..0.12).contains(&t) || (0.50..0.52).contains(&t);
            let left = if in_burst {
                0.5 * (2.0 * std::f32::consts::PI * 1000.0 * t).sin()
            } else {
                0.0
            };
            writer.write_sample((left * 32767.0) as i16).unwrap();
            writer.write_sample((left * 0.5 * 32767.0) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn decodes_stereo_wav_to_mono_at_target_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bursts.wav");
        write_stereo_wav(&path);

        let pcm = SymphoniaDecoder.decode(&path, 44_100).unwrap();
        assert_eq!(pcm.sample_rate(), 44_100);
        assert!((pcm.len() as i64 - 88_200).abs() <= 1, "got {} samples", pcm.len());

        // Mean of 0.5 and 0.25.
        let peak = pcm.samples().iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.33 && peak < 0.45, "peak {}", peak);

        let detector = OnsetDetector::new(&OnsetConfig::default());
        let onsets = detector.detect(&pcm, None);
        let hop = detector.hop_seconds(44_100);
        assert_eq!(onsets.len(), 2, "{:?}", onsets);
        assert!((onsets[0].time_seconds - 0.10).abs() <= hop);
        assert!((onsets[1].time_seconds - 0.50).abs() <= hop);
    }

    #[test]
    fn unreadable_file_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.wav");
        std::fs::write(&path, b"not audio at all").unwrap();
        assert!(matches!(
            SymphoniaDecoder.decode(&path, 44_100),
            Err(PipelineError::Decode { .. })
        ));
    }
}
