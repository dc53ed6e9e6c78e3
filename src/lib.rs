//! Offline audio analysis that turns a song into a rhythm-game chart and MIDI.
//!
//! decode → stem approximation → onset detection → chart synthesis → JSON / MIDI

pub mod audio;
pub mod chart;
pub mod config;
pub mod error;
pub mod midi;
pub mod output;
pub mod pipeline;

pub use config::Config;
pub use error::{PipelineError, Result};
pub use pipeline::{BatchReport, CancelToken, ChartJob, OutputDirs, Pipeline, StemJob};
