use anyhow::{Context, Result};
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

const SINC_LEN: usize = 256;

/// Resample mono f32 audio from `from_rate` to `to_rate` using rubato.
///
/// The output is aligned with the input and holds `round(len * to_rate / from_rate)`
/// samples: the filter delay is trimmed from the front and the tail is flushed
/// with zero padding.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if samples.is_empty() || from_rate == to_rate {
        return Ok(samples.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: SINC_LEN,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;
    let expected = (samples.len() as f64 * ratio).round() as usize;

    let mut padded = Vec::with_capacity(samples.len() + SINC_LEN);
    padded.extend_from_slice(samples);
    padded.resize(samples.len() + SINC_LEN, 0.0);

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, padded.len(), 1)
        .context("Failed to create resampler")?;
    let delay = resampler.output_delay();

    let output = resampler
        .process(&[padded], None)
        .context("Resampling failed")?;

    Ok(output
        .into_iter()
        .next()
        .unwrap_or_default()
        .into_iter()
        .skip(delay)
        .take(expected)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_rate_is_identity() {
        let samples = vec![0.1, -0.2, 0.3];
        assert_eq!(resample(&samples, 44_100, 44_100).unwrap(), samples);
    }

    #[test]
    fn empty_input_stays_empty() {
        assert!(resample(&[], 48_000, 44_100).unwrap().is_empty());
    }

    #[test]
    fn downsampling_keeps_length_and_timing() {
        // 2 s of silence with a 1 kHz burst starting at 0.5 s.
        let mut samples = vec![0.0f32; 96_000];
        for (k, s) in samples[24_000..28_800].iter_mut().enumerate() {
            *s = (2.0 * std::f32::consts::PI * 1000.0 * k as f32 / 48_000.0).sin();
        }

        let out = resample(&samples, 48_000, 44_100).unwrap();
        assert_eq!(out.len(), 88_200);

        let first_loud = out.iter().position(|s| s.abs() > 0.5).unwrap();
        assert!(
            (22_050..22_070).contains(&first_loud),
            "burst starts at sample {}",
            first_loud
        );
    }
}
