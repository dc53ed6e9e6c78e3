use serde::{Deserialize, Serialize};
use std::fmt;

/// Mono PCM, normalized to [-1, 1].
#[derive(Clone, Debug)]
pub struct PcmBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl PcmBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StemKind {
    Percussive,
    Melodic,
    Vocal,
}

impl StemKind {
    pub const ALL: [StemKind; 3] = [StemKind::Percussive, StemKind::Melodic, StemKind::Vocal];

    /// Name used in stem file names (`<song>_drums.mid`, ...).
    pub fn file_tag(self) -> &'static str {
        match self {
            StemKind::Percussive => "drums",
            StemKind::Melodic => "melody",
            StemKind::Vocal => "vocals",
        }
    }
}

impl fmt::Display for StemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_tag())
    }
}

/// A filtered copy of the source tagged with the role it approximates.
#[derive(Clone, Debug)]
pub struct StemBuffer {
    pub kind: StemKind,
    pub pcm: PcmBuffer,
}
