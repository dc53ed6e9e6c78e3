use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use stemchart::chart::Difficulty;
use stemchart::config::DecoderBackend;

#[derive(Parser, Debug)]
#[command(name = "stemchart", about = "Rhythm-game chart and MIDI generator for song recordings")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a difficulty chart (JSON + MIDI) from whole-mix onsets
    ChartExport(ChartExportArgs),
    /// Write one MIDI file per approximated stem
    StemExport(StemExportArgs),
    /// Assemble a multi-stem chart from per-stem MIDI files
    StemChart(StemChartArgs),
    /// Print the effective configuration
    ShowConfig,
}

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Audio decoder backend
    #[arg(long, value_enum)]
    pub decoder: Option<DecoderArg>,

    /// Files processed in parallel
    #[arg(short, long, default_value_t = 1)]
    pub jobs: usize,

    /// Directory for MIDI output
    #[arg(long)]
    pub midi_dir: Option<PathBuf>,

    /// BPM written to the MIDI tempo (and chart) when known
    #[arg(long, value_parser = parse_bpm)]
    pub bpm: Option<f64>,
}

#[derive(Args, Debug)]
pub struct ChartExportArgs {
    /// Audio file, or a directory of .mp3/.wav files
    pub input: PathBuf,

    /// Track identifier; names the output files
    pub track_id: String,

    /// easy, normal, hard or expert (case-insensitive)
    #[arg(value_parser = parse_difficulty)]
    pub difficulty: Difficulty,

    /// Calibration offset in milliseconds
    #[arg(default_value_t = 0, allow_negative_numbers = true)]
    pub offset_ms: i64,

    /// Seed for difficulty thinning
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Chart title (defaults to the file name)
    #[arg(long)]
    pub title: Option<String>,

    /// Chart artist
    #[arg(long)]
    pub artist: Option<String>,

    /// Directory for chart JSON
    #[arg(long)]
    pub charts_dir: Option<PathBuf>,

    /// Treat INPUT as a MIDI transcription instead of audio
    #[arg(long)]
    pub from_midi: bool,

    #[command(flatten)]
    pub batch: BatchArgs,
}

#[derive(Args, Debug)]
pub struct StemExportArgs {
    /// Audio file, or a directory of .mp3/.wav files
    pub input: PathBuf,

    /// Track identifier; names the output files
    pub track_id: String,

    /// Also write all stems into one multi-track file
    #[arg(long)]
    pub combined: bool,

    #[command(flatten)]
    pub batch: BatchArgs,
}

#[derive(Args, Debug)]
pub struct StemChartArgs {
    pub track_id: String,
    pub song_name: String,
    pub artist: String,
    #[arg(value_parser = parse_bpm)]
    pub bpm: f64,
    /// Directory holding <song>_melody.mid, <song>_drums.mid, <song>_vocals.mid
    pub midi_dir: PathBuf,
    pub output: PathBuf,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum DecoderArg {
    Symphonia,
    Ffmpeg,
}

impl From<DecoderArg> for DecoderBackend {
    fn from(arg: DecoderArg) -> Self {
        match arg {
            DecoderArg::Symphonia => DecoderBackend::Symphonia,
            DecoderArg::Ffmpeg => DecoderBackend::Ffmpeg,
        }
    }
}

fn parse_difficulty(s: &str) -> Result<Difficulty, String> {
    s.parse()
}

fn parse_bpm(s: &str) -> Result<f64, String> {
    let bpm: f64 = s.parse().map_err(|e| format!("invalid bpm '{}': {}", s, e))?;
    if bpm.is_finite() && bpm > 0.0 {
        Ok(bpm)
    } else {
        Err(format!("bpm must be a positive number, got {}", s))
    }
}
