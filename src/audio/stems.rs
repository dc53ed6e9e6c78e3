//! Frequency-band approximations of instrument stems.
//!
//! Each stem is a filtered copy of the full mix; the bands overlap and are not
//! a partition of the signal.

use rayon::prelude::*;
use std::f64::consts::PI;

use super::pcm::{PcmBuffer, StemBuffer, StemKind};
use crate::config::StemConfig;

/// Normalized second-order section coefficients (Audio EQ Cookbook).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    pub fn lowpass(cutoff: f64, q: f64, sample_rate: f64) -> Self {
        let (cos_w, alpha) = omega(cutoff, q, sample_rate);
        Self::normalize(
            (1.0 - cos_w) / 2.0,
            1.0 - cos_w,
            (1.0 - cos_w) / 2.0,
            1.0 + alpha,
            -2.0 * cos_w,
            1.0 - alpha,
        )
    }

    pub fn highpass(cutoff: f64, q: f64, sample_rate: f64) -> Self {
        let (cos_w, alpha) = omega(cutoff, q, sample_rate);
        Self::normalize(
            (1.0 + cos_w) / 2.0,
            -(1.0 + cos_w),
            (1.0 + cos_w) / 2.0,
            1.0 + alpha,
            -2.0 * cos_w,
            1.0 - alpha,
        )
    }

    /// Constant skirt gain band-pass; peak gain equals Q.
    pub fn bandpass(center: f64, q: f64, sample_rate: f64) -> Self {
        let (cos_w, alpha) = omega(center, q, sample_rate);
        let sin_w = (1.0 - cos_w * cos_w).sqrt();
        Self::normalize(
            sin_w / 2.0,
            0.0,
            -sin_w / 2.0,
            1.0 + alpha,
            -2.0 * cos_w,
            1.0 - alpha,
        )
    }

    fn normalize(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Runs the filter over `input` from a zeroed state (transposed direct form II).
    pub fn process(&self, input: &[f32]) -> Vec<f32> {
        let mut z1 = 0.0f64;
        let mut z2 = 0.0f64;
        input
            .iter()
            .map(|&x| {
                let x = x as f64;
                let y = self.b0 * x + z1;
                z1 = self.b1 * x - self.a1 * y + z2;
                z2 = self.b2 * x - self.a2 * y;
                y as f32
            })
            .collect()
    }
}

fn omega(freq: f64, q: f64, sample_rate: f64) -> (f64, f64) {
    // Keep the corner below Nyquist and Q away from zero.
    let freq = freq.clamp(1.0, sample_rate * 0.49);
    let q = q.max(0.1);
    let w = 2.0 * PI * freq / sample_rate;
    (w.cos(), w.sin() / (2.0 * q))
}

/// Splits a mono mix into overlapping band-limited pseudo-stems.
#[derive(Debug, Clone)]
pub struct StemApproximator {
    config: StemConfig,
}

impl StemApproximator {
    pub fn new(config: StemConfig) -> Self {
        Self { config }
    }

    /// The filter chain applied for one stem, in order.
    pub fn chain(&self, kind: StemKind, sample_rate: u32) -> Vec<Biquad> {
        let sr = sample_rate as f64;
        let c = &self.config;
        match kind {
            StemKind::Percussive => vec![
                Biquad::lowpass(c.percussive_lowpass_hz, c.shelf_q, sr),
                Biquad::highpass(c.percussive_highpass_hz, c.shelf_q, sr),
            ],
            StemKind::Melodic => vec![Biquad::highpass(c.melodic_highpass_hz, c.shelf_q, sr)],
            StemKind::Vocal => vec![Biquad::bandpass(c.vocal_center_hz, c.vocal_q, sr)],
        }
    }

    pub fn extract(&self, source: &PcmBuffer, kind: StemKind) -> StemBuffer {
        let mut samples = source.samples().to_vec();
        for stage in self.chain(kind, source.sample_rate()) {
            samples = stage.process(&samples);
        }
        StemBuffer {
            kind,
            pcm: PcmBuffer::new(samples, source.sample_rate()),
        }
    }

    /// All stems, in `StemKind::ALL` order. Bands are filtered in parallel.
    pub fn split(&self, source: &PcmBuffer) -> Vec<StemBuffer> {
        log::info!("Approximating {} stems...", StemKind::ALL.len());
        StemKind::ALL
            .par_iter()
            .map(|&kind| self.extract(source, kind))
            .collect()
    }
}
