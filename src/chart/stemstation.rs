//! Multi-stem chart assembled from per-stem MIDI transcriptions.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::model::Difficulty;
use crate::audio::pcm::StemKind;
use crate::error::{PipelineError, Result};
use crate::midi::import::{load_notes, ImportedNote};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StemNote {
    pub time_ms: i64,
    pub duration_ms: i64,
    pub pitch: u8,
    pub lane: u8,
}

#[derive(Clone, Debug, Serialize)]
pub struct DifficultyNotes {
    pub notes: Vec<StemNote>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StemEntry {
    pub midi_file: String,
    pub difficulties: BTreeMap<Difficulty, DifficultyNotes>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StemChart {
    pub track_id: String,
    pub song_name: String,
    pub artist: String,
    pub bpm: f64,
    pub audio_offset_ms: i64,
    pub stems: BTreeMap<String, StemEntry>,
}

/// Working form of a note while quantizing and thinning, in float milliseconds.
#[derive(Clone, Debug)]
struct TimedNote {
    time_ms: f64,
    duration_ms: f64,
    pitch: u8,
    lane: u8,
}

impl TimedNote {
    fn finish(&self) -> StemNote {
        StemNote {
            time_ms: self.time_ms.round() as i64,
            duration_ms: self.duration_ms.round() as i64,
            pitch: self.pitch,
            lane: self.lane,
        }
    }
}

/// Four pitch bands: below D3, below C4, below C5, and everything above.
pub fn lane_for_stem_pitch(pitch: u8) -> u8 {
    match pitch {
        0..=49 => 0,
        50..=59 => 1,
        60..=71 => 2,
        _ => 3,
    }
}

/// Minimum gap between kept notes in one lane.
pub fn min_spacing_ms(difficulty: Difficulty) -> f64 {
    match difficulty {
        Difficulty::Easy => 260.0,
        Difficulty::Normal => 150.0,
        Difficulty::Hard => 110.0,
        Difficulty::Expert => 80.0,
    }
}

fn quantize(notes: &mut [TimedNote], grid_ms: f64) {
    for note in notes {
        note.time_ms = (note.time_ms / grid_ms).round() * grid_ms;
    }
}

/// Drops notes that follow the previous kept note in the same lane too closely.
/// Expert keeps everything.
fn thin(notes: &[TimedNote], difficulty: Difficulty) -> Vec<StemNote> {
    let min_gap = min_spacing_ms(difficulty);
    let mut last_by_lane: BTreeMap<u8, f64> = BTreeMap::new();
    let mut out = Vec::new();
    for note in notes {
        let last = last_by_lane.get(&note.lane).copied().unwrap_or(f64::NEG_INFINITY);
        if note.time_ms - last < min_gap && difficulty != Difficulty::Expert {
            continue;
        }
        out.push(note.finish());
        last_by_lane.insert(note.lane, note.time_ms);
    }
    out
}

fn timed_notes(imported: &[ImportedNote]) -> Vec<TimedNote> {
    let mut notes: Vec<TimedNote> = imported
        .iter()
        .map(|n| TimedNote {
            time_ms: n.start_seconds * 1000.0,
            duration_ms: (n.end_seconds - n.start_seconds) * 1000.0,
            pitch: n.pitch,
            lane: lane_for_stem_pitch(n.pitch),
        })
        .collect();
    notes.sort_by(|a, b| a.time_ms.total_cmp(&b.time_ms));
    notes
}

pub struct StemChartRequest<'a> {
    pub track_id: &'a str,
    pub song_name: &'a str,
    pub artist: &'a str,
    pub bpm: f64,
    pub midi_dir: &'a Path,
}

/// Stem MIDI file name for a song: spaces become underscores.
pub fn stem_midi_path(midi_dir: &Path, song_name: &str, stem: StemKind) -> PathBuf {
    midi_dir.join(format!("{}_{}.mid", song_name.replace(' ', "_"), stem.file_tag()))
}

pub fn build_stem_chart(request: &StemChartRequest<'_>) -> Result<StemChart> {
    if !(request.bpm.is_finite() && request.bpm > 0.0) {
        return Err(PipelineError::Validation(format!(
            "bpm must be positive, got {}",
            request.bpm
        )));
    }
    // 16th-note grid.
    let grid_ms = 60_000.0 / request.bpm / 4.0;

    let mut stems = BTreeMap::new();
    for stem in [StemKind::Melodic, StemKind::Percussive, StemKind::Vocal] {
        let path = stem_midi_path(request.midi_dir, request.song_name, stem);
        if !path.exists() {
            log::debug!("No {} stem at {}", stem, path.display());
            continue;
        }

        let mut notes = timed_notes(&load_notes(&path)?);
        quantize(&mut notes, grid_ms);

        let difficulties = Difficulty::ALL
            .iter()
            .map(|&d| (d, DifficultyNotes { notes: thin(&notes, d) }))
            .collect();

        log::info!("Stem {}: {} notes from {}", stem, notes.len(), path.display());
        stems.insert(
            stem.file_tag().to_string(),
            StemEntry {
                midi_file: path.to_string_lossy().replace('\\', "/"),
                difficulties,
            },
        );
    }

    if stems.is_empty() {
        log::warn!(
            "No stem MIDI files for '{}' in {}",
            request.song_name,
            request.midi_dir.display()
        );
    }

    Ok(StemChart {
        track_id: request.track_id.to_string(),
        song_name: request.song_name.to_string(),
        artist: request.artist.to_string(),
        bpm: request.bpm,
        audio_offset_ms: 0,
        stems,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MidiConfig;
    use crate::midi::encode::{write_midi, MidiEncoder, MidiNoteEvent};

    fn timed(time_ms: f64, lane: u8) -> TimedNote {
        TimedNote {
            time_ms,
            duration_ms: 100.0,
            pitch: 60,
            lane,
        }
    }

    #[test]
    fn pitch_bands() {
        assert_eq!(lane_for_stem_pitch(36), 0);
        assert_eq!(lane_for_stem_pitch(50), 1);
        assert_eq!(lane_for_stem_pitch(64), 2);
        assert_eq!(lane_for_stem_pitch(72), 3);
    }

    #[test]
    fn quantizes_to_grid() {
        let mut notes = vec![timed(130.0, 0), timed(240.0, 0)];
        quantize(&mut notes, 125.0);
        assert_eq!(notes[0].time_ms, 125.0);
        assert_eq!(notes[1].time_ms, 250.0);
    }

    #[test]
    fn thinning_is_per_lane_and_expert_keeps_all() {
        let notes = vec![
            timed(0.0, 0),
            timed(100.0, 0),
            timed(100.0, 1),
            timed(200.0, 0),
            timed(300.0, 0),
        ];
        let easy = thin(&notes, Difficulty::Easy);
        let normal = thin(&notes, Difficulty::Normal);
        let expert = thin(&notes, Difficulty::Expert);

        assert_eq!(
            easy.iter().map(|n| (n.time_ms, n.lane)).collect::<Vec<_>>(),
            vec![(0, 0), (100, 1), (300, 0)]
        );
        assert_eq!(
            normal.iter().map(|n| (n.time_ms, n.lane)).collect::<Vec<_>>(),
            vec![(0, 0), (100, 1), (200, 0)]
        );
        assert_eq!(expert.len(), notes.len());
    }

    #[test]
    fn builds_chart_from_stem_files() {
        let dir = tempfile::tempdir().unwrap();
        let enc = MidiEncoder::new(MidiConfig::default());
        let drums: Vec<MidiNoteEvent> = (0..8)
            .map(|i| MidiNoteEvent {
                pitch: 36,
                start_seconds: i as f64 * 0.1,
                duration_seconds: 0.05,
                velocity: 0.9,
            })
            .collect();
        let bytes = enc.encode_single(&drums, Some(120.0)).unwrap();
        write_midi(&stem_midi_path(dir.path(), "My Song", StemKind::Percussive), &bytes).unwrap();

        let chart = build_stem_chart(&StemChartRequest {
            track_id: "local:0:MySong",
            song_name: "My Song",
            artist: "vx9",
            bpm: 120.0,
            midi_dir: dir.path(),
        })
        .unwrap();

        assert_eq!(chart.stems.len(), 1);
        let drums = &chart.stems["drums"];
        assert!(drums.midi_file.ends_with("My_Song_drums.mid"));
        let expert = &drums.difficulties[&Difficulty::Expert].notes;
        let easy = &drums.difficulties[&Difficulty::Easy].notes;
        assert_eq!(expert.len(), 8);
        assert!(easy.len() < expert.len());
        // 120 BPM 16th grid is 125ms.
        assert!(expert.iter().all(|n| n.time_ms % 125 == 0));
        assert!(expert.iter().all(|n| n.lane == 0 && n.pitch == 36));

        let json = serde_json::to_value(&chart).unwrap();
        assert_eq!(json["trackId"], "local:0:MySong");
        assert_eq!(json["audioOffsetMs"], 0);
        assert!(json["stems"]["drums"]["difficulties"]["normal"]["notes"].is_array());
    }

    #[test]
    fn rejects_non_positive_bpm() {
        let dir = tempfile::tempdir().unwrap();
        let result = build_stem_chart(&StemChartRequest {
            track_id: "t",
            song_name: "s",
            artist: "a",
            bpm: 0.0,
            midi_dir: dir.path(),
        });
        assert!(matches!(result, Err(PipelineError::Validation(_))));
    }
}
