use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::chart::Difficulty;
use crate::error::{PipelineError, Result};

/// Immutable tuning for one pipeline. Every constant the analysis depends on lives here.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub onset: OnsetConfig,
    #[serde(default)]
    pub stems: StemConfig,
    #[serde(default)]
    pub chart: ChartConfig,
    #[serde(default)]
    pub midi: MidiConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecoderBackend {
    Symphonia,
    Ffmpeg,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_decoder")]
    pub decoder: DecoderBackend,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OnsetConfig {
    /// Samples per non-overlapping analysis window.
    #[serde(default = "default_hop_size")]
    pub hop_size: usize,
    /// Peak threshold in 16-bit PCM amplitude units.
    #[serde(default = "default_energy_threshold")]
    pub energy_threshold: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StemConfig {
    #[serde(default = "default_percussive_lowpass")]
    pub percussive_lowpass_hz: f64,
    #[serde(default = "default_percussive_highpass")]
    pub percussive_highpass_hz: f64,
    #[serde(default = "default_melodic_highpass")]
    pub melodic_highpass_hz: f64,
    #[serde(default = "default_vocal_center")]
    pub vocal_center_hz: f64,
    #[serde(default = "default_butterworth_q")]
    pub shelf_q: f64,
    #[serde(default = "default_vocal_q")]
    pub vocal_q: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChartConfig {
    #[serde(default = "default_lane_count")]
    pub lane_count: u8,
    #[serde(default = "default_lane_height")]
    pub lane_height: f64,
    /// Pixels per millisecond.
    #[serde(default = "default_note_speed")]
    pub note_speed: f64,
    /// Minimum length for a transcribed note to become a hold.
    #[serde(default = "default_hold_min_ms")]
    pub hold_min_ms: i64,
    #[serde(default = "default_artist")]
    pub artist: String,
    #[serde(default = "default_charts_dir")]
    pub charts_dir: PathBuf,
    #[serde(default)]
    pub density: DensityTable,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DensityTable {
    #[serde(default = "default_density_easy")]
    pub easy: f64,
    #[serde(default = "default_density_normal")]
    pub normal: f64,
    #[serde(default = "default_density_hard")]
    pub hard: f64,
    #[serde(default = "default_density_expert")]
    pub expert: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MidiConfig {
    #[serde(default = "default_ppq")]
    pub ppq: u16,
    #[serde(default = "default_velocity")]
    pub velocity: f32,
    #[serde(default = "default_note_duration")]
    pub note_duration: f64,
    #[serde(default = "default_lane_base_pitch")]
    pub lane_base_pitch: u8,
    #[serde(default = "default_lane_pitch_step")]
    pub lane_pitch_step: u8,
    #[serde(default = "default_drums_pitch")]
    pub drums_pitch: u8,
    #[serde(default = "default_melodic_pitch")]
    pub melodic_pitch: u8,
    #[serde(default = "default_vocal_pitch")]
    pub vocal_pitch: u8,
    #[serde(default = "default_midi_dir")]
    pub midi_dir: PathBuf,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            decoder: default_decoder(),
        }
    }
}

impl Default for OnsetConfig {
    fn default() -> Self {
        Self {
            hop_size: default_hop_size(),
            energy_threshold: default_energy_threshold(),
        }
    }
}

impl Default for StemConfig {
    fn default() -> Self {
        Self {
            percussive_lowpass_hz: default_percussive_lowpass(),
            percussive_highpass_hz: default_percussive_highpass(),
            melodic_highpass_hz: default_melodic_highpass(),
            vocal_center_hz: default_vocal_center(),
            shelf_q: default_butterworth_q(),
            vocal_q: default_vocal_q(),
        }
    }
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            lane_count: default_lane_count(),
            lane_height: default_lane_height(),
            note_speed: default_note_speed(),
            density: DensityTable::default(),
            hold_min_ms: default_hold_min_ms(),
            artist: default_artist(),
            charts_dir: default_charts_dir(),
        }
    }
}

impl Default for DensityTable {
    fn default() -> Self {
        Self {
            easy: default_density_easy(),
            normal: default_density_normal(),
            hard: default_density_hard(),
            expert: default_density_expert(),
        }
    }
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            ppq: default_ppq(),
            velocity: default_velocity(),
            note_duration: default_note_duration(),
            lane_base_pitch: default_lane_base_pitch(),
            lane_pitch_step: default_lane_pitch_step(),
            drums_pitch: default_drums_pitch(),
            melodic_pitch: default_melodic_pitch(),
            vocal_pitch: default_vocal_pitch(),
            midi_dir: default_midi_dir(),
        }
    }
}

fn default_sample_rate() -> u32 { 44_100 }
fn default_decoder() -> DecoderBackend { DecoderBackend::Symphonia }
fn default_hop_size() -> usize { 1024 }
fn default_energy_threshold() -> f32 { 2000.0 }
fn default_percussive_lowpass() -> f64 { 200.0 }
fn default_percussive_highpass() -> f64 { 30.0 }
fn default_melodic_highpass() -> f64 { 400.0 }
fn default_vocal_center() -> f64 { 2000.0 }
fn default_butterworth_q() -> f64 { std::f64::consts::FRAC_1_SQRT_2 }
fn default_vocal_q() -> f64 { 0.5 }
fn default_lane_count() -> u8 { 4 }
fn default_lane_height() -> f64 { 600.0 }
fn default_note_speed() -> f64 { 0.4 }
fn default_hold_min_ms() -> i64 { 350 }
fn default_artist() -> String { "STEMSTATION".into() }
fn default_charts_dir() -> PathBuf { PathBuf::from("app/stemstation/charts") }
fn default_density_easy() -> f64 { 0.35 }
fn default_density_normal() -> f64 { 0.55 }
fn default_density_hard() -> f64 { 0.75 }
fn default_density_expert() -> f64 { 0.90 }
fn default_ppq() -> u16 { 480 }
fn default_velocity() -> f32 { 0.8 }
fn default_note_duration() -> f64 { 0.2 }
fn default_lane_base_pitch() -> u8 { 48 }
fn default_lane_pitch_step() -> u8 { 5 }
fn default_drums_pitch() -> u8 { 36 }
fn default_melodic_pitch() -> u8 { 64 }
fn default_vocal_pitch() -> u8 { 60 }
fn default_midi_dir() -> PathBuf { PathBuf::from("app/stemstation/midi") }

impl DensityTable {
    pub fn for_difficulty(&self, difficulty: Difficulty) -> f64 {
        match difficulty {
            Difficulty::Easy => self.easy,
            Difficulty::Normal => self.normal,
            Difficulty::Hard => self.hard,
            Difficulty::Expert => self.expert,
        }
    }
}

impl ChartConfig {
    /// How long a note travels down the lane before it reaches the judgment line.
    pub fn note_travel_ms(&self) -> i64 {
        (self.lane_height / self.note_speed).round() as i64
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(PipelineError::Validation(msg));

        if self.audio.sample_rate == 0 {
            return invalid("audio.sample_rate must be positive".into());
        }
        if self.onset.hop_size == 0 {
            return invalid("onset.hop_size must be positive".into());
        }
        if !(self.onset.energy_threshold >= 0.0) {
            return invalid("onset.energy_threshold must be non-negative".into());
        }
        if !(self.chart.note_speed > 0.0) {
            return invalid("chart.note_speed must be positive".into());
        }
        if self.chart.lane_count == 0 {
            return invalid("chart.lane_count must be at least 1".into());
        }
        let top_lane_pitch = self.midi.lane_base_pitch as u32
            + (self.chart.lane_count as u32 - 1) * self.midi.lane_pitch_step as u32;
        if top_lane_pitch > 127 {
            return invalid(format!(
                "lane pitches exceed the MIDI range (top lane maps to {})",
                top_lane_pitch
            ));
        }
        for (name, density) in [
            ("easy", self.chart.density.easy),
            ("normal", self.chart.density.normal),
            ("hard", self.chart.density.hard),
            ("expert", self.chart.density.expert),
        ] {
            if !(0.0..=1.0).contains(&density) {
                return invalid(format!("chart.density.{} must be within [0, 1]", name));
            }
        }
        if !(self.midi.velocity > 0.0 && self.midi.velocity <= 1.0) {
            return invalid("midi.velocity must be within (0, 1]".into());
        }
        if self.midi.ppq == 0 || self.midi.ppq > 0x7fff {
            return invalid("midi.ppq must be within 1..=32767".into());
        }
        if !(self.midi.note_duration > 0.0) {
            return invalid("midi.note_duration must be positive".into());
        }
        for (name, pitch) in [
            ("drums_pitch", self.midi.drums_pitch),
            ("melodic_pitch", self.midi.melodic_pitch),
            ("vocal_pitch", self.midi.vocal_pitch),
        ] {
            if pitch > 127 {
                return invalid(format!("midi.{} must be a MIDI key (0-127)", name));
            }
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        PipelineError::Validation(format!("cannot read {}: {}", path.display(), e))
    })?;
    toml::from_str(&content)
        .map_err(|e| PipelineError::Validation(format!("{}: {}", path.display(), e)))
}

/// Explicit path first, then `./stemchart.toml`, then the per-user config locations.
pub fn discover_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("stemchart.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("stemchart").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("stemchart").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}
