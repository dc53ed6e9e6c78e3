use serde::Serialize;

use super::pcm::{PcmBuffer, StemBuffer, StemKind};
use crate::config::OnsetConfig;

/// Full scale of signed 16-bit PCM; the threshold is configured in those units.
const I16_FULL_SCALE: f32 = 32768.0;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OnsetEvent {
    pub time_seconds: f64,
    /// `None` for onsets taken from the unfiltered mix.
    pub stem: Option<StemKind>,
    /// Hop energy that triggered the detection (normalized units).
    pub magnitude: f32,
}

/// Energy-envelope peak picker.
#[derive(Debug, Clone)]
pub struct OnsetDetector {
    hop_size: usize,
    threshold: f32,
}

impl OnsetDetector {
    pub fn new(config: &OnsetConfig) -> Self {
        Self {
            hop_size: config.hop_size.max(1),
            threshold: config.energy_threshold / I16_FULL_SCALE,
        }
    }

    pub fn hop_seconds(&self, sample_rate: u32) -> f64 {
        self.hop_size as f64 / sample_rate as f64
    }

    /// Mean absolute amplitude of every complete hop. A trailing partial hop is dropped.
    pub fn energy_envelope(&self, samples: &[f32]) -> Vec<f32> {
        samples
            .chunks_exact(self.hop_size)
            .map(|hop| hop.iter().map(|s| s.abs()).sum::<f32>() / self.hop_size as f32)
            .collect()
    }

    /// Hop indices that are strict local maxima above the threshold.
    /// The first and last hop are never peaks.
    pub fn peak_hops(&self, energy: &[f32]) -> Vec<usize> {
        if energy.len() < 3 {
            return Vec::new();
        }
        (1..energy.len() - 1)
            .filter(|&i| {
                energy[i] > energy[i - 1] && energy[i] > energy[i + 1] && energy[i] > self.threshold
            })
            .collect()
    }

    pub fn detect(&self, pcm: &PcmBuffer, stem: Option<StemKind>) -> Vec<OnsetEvent> {
        let sample_rate = pcm.sample_rate();
        let duration = pcm.duration_seconds();
        let energy = self.energy_envelope(pcm.samples());

        let onsets: Vec<OnsetEvent> = self
            .peak_hops(&energy)
            .into_iter()
            .map(|i| OnsetEvent {
                time_seconds: (i * self.hop_size) as f64 / sample_rate as f64,
                stem,
                magnitude: energy[i],
            })
            .filter(|o| (0.0..=duration).contains(&o.time_seconds))
            .collect();

        log::debug!(
            "{}: {} hops, {} onsets",
            stem.map_or("mix", |s| s.file_tag()),
            energy.len(),
            onsets.len()
        );
        onsets
    }

    pub fn detect_stem(&self, stem: &StemBuffer) -> Vec<OnsetEvent> {
        self.detect(&stem.pcm, Some(stem.kind))
    }
}
