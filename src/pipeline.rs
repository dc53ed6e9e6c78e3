//! Per-file pipeline runs and batch orchestration.

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::audio::{
    AudioDecoder, FfmpegDecoder, OnsetDetector, OnsetEvent, PcmBuffer, StemApproximator, StemKind,
    SymphoniaDecoder,
};
use crate::chart::stemstation::stem_midi_path;
use crate::chart::transcription::chart_from_notes;
use crate::chart::{sanitize_id, Chart, ChartMeta, ChartSynthesizer, Difficulty};
use crate::config::{Config, DecoderBackend};
use crate::error::{PipelineError, Result};
use crate::midi::encode::write_midi;
use crate::midi::import::load_notes;
use crate::midi::{MidiEncoder, NoteTrack};
use crate::output;

/// Cooperative cancellation, checked only between files.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Caller-supplied identity and tuning of one chart-export run.
#[derive(Clone, Debug)]
pub struct ChartJob {
    pub track_id: String,
    pub difficulty: Difficulty,
    pub offset_ms: i64,
    pub bpm: Option<f64>,
    pub seed: u64,
    pub title: Option<String>,
    pub artist: Option<String>,
}

#[derive(Clone, Debug)]
pub struct StemJob {
    pub track_id: String,
    pub bpm: Option<f64>,
    /// Also write every stem into one multi-track file.
    pub combined: bool,
}

#[derive(Clone, Debug)]
pub struct OutputDirs {
    pub charts_dir: PathBuf,
    pub midi_dir: PathBuf,
}

#[derive(Clone, Debug)]
pub struct FileReport {
    pub input: PathBuf,
    pub outputs: Vec<PathBuf>,
    pub notes: usize,
}

pub struct Pipeline {
    config: Config,
    decoder: Box<dyn AudioDecoder>,
    stems: StemApproximator,
    detector: OnsetDetector,
    synth: ChartSynthesizer,
    encoder: MidiEncoder,
}

impl Pipeline {
    pub fn new(config: Config, decoder: Box<dyn AudioDecoder>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            stems: StemApproximator::new(config.stems.clone()),
            detector: OnsetDetector::new(&config.onset),
            synth: ChartSynthesizer::new(config.chart.clone()),
            encoder: MidiEncoder::new(config.midi.clone()),
            decoder,
            config,
        })
    }

    /// Builds the decoder named in the config. A missing ffmpeg binary fails here,
    /// before any file is read.
    pub fn from_config(config: Config) -> Result<Self> {
        let decoder: Box<dyn AudioDecoder> = match config.audio.decoder {
            DecoderBackend::Symphonia => Box::new(SymphoniaDecoder),
            DecoderBackend::Ffmpeg => Box::new(FfmpegDecoder::locate()?),
        };
        log::info!("Decoder: {}", decoder.name());
        Self::new(config, decoder)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn decode(&self, input: &Path) -> Result<PcmBuffer> {
        self.decoder.decode(input, self.config.audio.sample_rate)
    }

    /// Whole-mix onsets thinned into a chart. Stems play no part here.
    pub fn analyze_chart(&self, pcm: &PcmBuffer, meta: ChartMeta, seed: u64) -> Chart {
        let onsets = self.detector.detect(pcm, None);
        log::info!("Detected {} onsets in {:.1}s of audio", onsets.len(), pcm.duration_seconds());
        self.synth.synthesize(&onsets, meta, seed)
    }

    /// Onsets per approximated stem, in `StemKind::ALL` order.
    pub fn analyze_stems(&self, pcm: &PcmBuffer) -> Vec<(StemKind, Vec<OnsetEvent>)> {
        self.stems
            .split(pcm)
            .iter()
            .map(|stem| {
                let onsets = self.detector.detect_stem(stem);
                log::info!("Stem {}: {} onsets", stem.kind, onsets.len());
                (stem.kind, onsets)
            })
            .collect()
    }

    fn chart_meta(&self, input: &Path, job: &ChartJob) -> ChartMeta {
        let title = job.title.clone().unwrap_or_else(|| {
            input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| job.track_id.clone())
        });
        ChartMeta {
            song_id: job.track_id.clone(),
            title,
            artist: job
                .artist
                .clone()
                .unwrap_or_else(|| self.config.chart.artist.clone()),
            bpm: job.bpm,
            offset_ms: job.offset_ms,
            difficulty: job.difficulty,
        }
    }

    fn write_chart_pair(&self, input: &Path, chart: &Chart, dirs: &OutputDirs) -> Result<FileReport> {
        let sanitized = sanitize_id(&chart.song_id);
        let chart_path = output::chart_path(&dirs.charts_dir, &sanitized);
        let midi_path = output::midi_path(&dirs.midi_dir, &sanitized);

        let events = self.encoder.chart_events(&chart.notes);
        let bytes = self
            .encoder
            .encode_single(&events, chart.bpm)
            .map_err(|e| relabel_midi(e, &midi_path))?;

        output::write_chart(&chart_path, chart)?;
        write_midi(&midi_path, &bytes)?;

        Ok(FileReport {
            input: input.to_path_buf(),
            outputs: vec![chart_path, midi_path],
            notes: chart.notes.len(),
        })
    }

    /// chart-export for one audio file: decode, detect, thin, write JSON + MIDI.
    pub fn chart_export(&self, input: &Path, job: &ChartJob, dirs: &OutputDirs) -> Result<FileReport> {
        let pcm = self.decode(input)?;
        let chart = self.analyze_chart(&pcm, self.chart_meta(input, job), job.seed);
        self.write_chart_pair(input, &chart, dirs)
    }

    /// chart-export from an existing MIDI transcription instead of audio.
    pub fn chart_from_midi(&self, midi: &Path, job: &ChartJob, dirs: &OutputDirs) -> Result<FileReport> {
        let notes = load_notes(midi)?;
        let chart = chart_from_notes(&notes, self.chart_meta(midi, job), &self.config.chart);
        self.write_chart_pair(midi, &chart, dirs)
    }

    /// stem-export for one audio file: one MIDI per stem, plus an optional combined file.
    pub fn stem_export(&self, input: &Path, job: &StemJob, midi_dir: &Path) -> Result<FileReport> {
        let pcm = self.decode(input)?;
        let sanitized = sanitize_id(&job.track_id);

        let tracks: Vec<NoteTrack> = self
            .analyze_stems(&pcm)
            .into_iter()
            .map(|(kind, onsets)| NoteTrack {
                name: kind.file_tag(),
                notes: self.encoder.onset_events(kind, &onsets),
            })
            .collect();

        let mut outputs = Vec::new();
        for (track, kind) in tracks.iter().zip(StemKind::ALL) {
            let path = stem_midi_path(midi_dir, &sanitized, kind);
            let bytes = self
                .encoder
                .encode_single(&track.notes, job.bpm)
                .map_err(|e| relabel_midi(e, &path))?;
            write_midi(&path, &bytes)?;
            outputs.push(path);
        }

        if job.combined {
            let path = midi_dir.join(format!("{}_stems.mid", sanitized));
            let bytes = self
                .encoder
                .encode_multi(&tracks, job.bpm)
                .map_err(|e| relabel_midi(e, &path))?;
            write_midi(&path, &bytes)?;
            outputs.push(path);
        }

        Ok(FileReport {
            input: input.to_path_buf(),
            outputs,
            notes: tracks.iter().map(|t| t.notes.len()).sum(),
        })
    }
}

fn relabel_midi(err: PipelineError, path: &Path) -> PipelineError {
    match err {
        PipelineError::Midi { message, .. } => PipelineError::midi(path, message),
        other => other,
    }
}

/// Audio extensions picked up when the input is a directory.
const AUDIO_EXTENSIONS: [&str; 2] = ["mp3", "wav"];

/// A single file as-is, or every `.mp3`/`.wav` directly inside a directory, sorted.
pub fn collect_inputs(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        return Err(PipelineError::Validation(format!(
            "input not found: {}",
            input.display()
        )));
    }

    let entries = std::fs::read_dir(input).map_err(|e| PipelineError::io(input, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| PipelineError::io(input, e))?.path();
        let is_audio = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| {
                AUDIO_EXTENSIONS.iter().any(|a| a.eq_ignore_ascii_case(e))
            });
        if is_audio && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Track id for one file of a run. Directory runs suffix the file stem so every
/// file gets its own outputs.
pub fn track_id_for(base: &str, input: &Path, from_directory: bool) -> String {
    if !from_directory {
        return base.to_string();
    }
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}_{}", base, stem)
}

#[derive(Debug)]
pub struct FileOutcome {
    pub input: PathBuf,
    pub result: Result<FileReport>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<FileOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn cancelled(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.result, Err(PipelineError::Cancelled { .. })))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded() - self.cancelled()
    }

    pub fn total_notes(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .map(|r| r.notes)
            .sum()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0 && self.cancelled() == 0
    }

    pub fn log_summary(&self) {
        if self.outcomes.is_empty() {
            log::info!("Nothing to do: no eligible audio files");
            return;
        }
        for outcome in &self.outcomes {
            match &outcome.result {
                Ok(report) => log::debug!(
                    "{}: {} notes -> {:?}",
                    outcome.input.display(),
                    report.notes,
                    report.outputs
                ),
                Err(PipelineError::Cancelled { .. }) => {
                    log::warn!("{}: skipped (cancelled)", outcome.input.display())
                }
                Err(e) => log::error!("{}: {}", outcome.input.display(), e),
            }
        }
        log::info!(
            "Processed {} files: {} ok, {} failed, {} cancelled, {} notes",
            self.outcomes.len(),
            self.succeeded(),
            self.failed(),
            self.cancelled(),
            self.total_notes()
        );
    }
}

fn progress_bar(len: usize, show: bool) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} files ({eta} remaining)")
        .map(|s| s.progress_chars("=>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

/// Runs `process` over every input on a pool of `jobs` threads. One file's
/// failure never stops the others; outcomes come back in input order.
pub fn run_batch<F>(
    inputs: &[PathBuf],
    jobs: usize,
    cancel: &CancelToken,
    show_progress: bool,
    process: F,
) -> Result<BatchReport>
where
    F: Fn(&Path) -> Result<FileReport> + Sync,
{
    if inputs.is_empty() {
        return Ok(BatchReport::default());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .map_err(|e| PipelineError::Validation(format!("cannot start worker pool: {}", e)))?;
    let pb = progress_bar(inputs.len(), show_progress && inputs.len() > 1);

    let outcomes = pool.install(|| {
        inputs
            .par_iter()
            .map(|input| {
                let result = if cancel.is_cancelled() {
                    Err(PipelineError::Cancelled {
                        path: input.clone(),
                    })
                } else {
                    log::info!("Processing {}...", input.display());
                    process(input)
                };
                if let Err(e) = &result {
                    if !matches!(e, PipelineError::Cancelled { .. }) {
                        log::error!("Failed {}: {}", input.display(), e);
                    }
                }
                pb.inc(1);
                FileOutcome {
                    input: input.clone(),
                    result,
                }
            })
            .collect()
    });
    pb.finish_and_clear();

    Ok(BatchReport { outcomes })
}
