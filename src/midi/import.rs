use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{PipelineError, Result};

/// A note read back from a MIDI file, in absolute seconds.
#[derive(Clone, Debug, PartialEq)]
pub struct ImportedNote {
    pub pitch: u8,
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub velocity: u8,
}

enum Clock {
    /// SMPTE timing: every tick has the same length.
    Fixed(f64),
    Tempo(TempoMap),
}

/// Tick-to-seconds conversion honoring every tempo change in the file.
struct TempoMap {
    /// (tick, microseconds per quarter), sorted by tick, first entry at tick 0.
    changes: Vec<(u64, u32)>,
    ticks_per_quarter: f64,
}

impl TempoMap {
    fn seconds_at(&self, tick: u64) -> f64 {
        let mut seconds = 0.0;
        for (i, &(start, us)) in self.changes.iter().enumerate() {
            let end = self.changes.get(i + 1).map_or(u64::MAX, |c| c.0);
            if tick <= start {
                break;
            }
            let span = tick.min(end) - start;
            seconds += span as f64 * us as f64 / 1_000_000.0 / self.ticks_per_quarter;
        }
        seconds
    }
}

pub fn load_notes(path: &Path) -> Result<Vec<ImportedNote>> {
    let bytes = std::fs::read(path).map_err(|e| PipelineError::io(path, e))?;
    parse_notes(&bytes).map_err(|e| PipelineError::midi(path, e))
}

/// Flattens every track of a standard MIDI file into notes sorted by start time.
pub fn parse_notes(bytes: &[u8]) -> std::result::Result<Vec<ImportedNote>, String> {
    let smf = Smf::parse(bytes).map_err(|e| e.to_string())?;

    let clock = match smf.header.timing {
        Timing::Metrical(tpq) => {
            let mut changes: Vec<(u64, u32)> = Vec::new();
            for track in &smf.tracks {
                let mut tick = 0u64;
                for event in track {
                    tick += event.delta.as_int() as u64;
                    if let TrackEventKind::Meta(MetaMessage::Tempo(us)) = event.kind {
                        changes.push((tick, us.as_int()));
                    }
                }
            }
            changes.sort_by_key(|c| c.0);
            if changes.first().map_or(true, |c| c.0 > 0) {
                changes.insert(0, (0, 500_000));
            }
            Clock::Tempo(TempoMap {
                changes,
                ticks_per_quarter: tpq.as_int().max(1) as f64,
            })
        }
        Timing::Timecode(fps, subframes) => {
            Clock::Fixed(1.0 / (fps.as_f32() as f64 * subframes.max(1) as f64))
        }
    };
    let to_seconds = |tick: u64| match &clock {
        Clock::Fixed(seconds_per_tick) => tick as f64 * seconds_per_tick,
        Clock::Tempo(map) => map.seconds_at(tick),
    };

    let mut notes = Vec::new();
    for track in &smf.tracks {
        let mut tick = 0u64;
        // (channel, key) -> stack of (start tick, velocity)
        let mut open: HashMap<(u8, u8), Vec<(u64, u8)>> = HashMap::new();
        for event in track {
            tick += event.delta.as_int() as u64;
            let TrackEventKind::Midi { channel, message } = event.kind else {
                continue;
            };
            let (key, on_velocity) = match message {
                MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => (key.as_int(), Some(vel.as_int())),
                MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => (key.as_int(), None),
                _ => continue,
            };
            let slot = open.entry((channel.as_int(), key)).or_default();
            match on_velocity {
                Some(vel) => slot.push((tick, vel)),
                None => {
                    if let Some((start, vel)) = slot.pop() {
                        notes.push(ImportedNote {
                            pitch: key,
                            start_seconds: to_seconds(start),
                            end_seconds: to_seconds(tick),
                            velocity: vel,
                        });
                    }
                }
            }
        }
        // Notes never released end where the track ends.
        for ((_, key), starts) in open {
            for (start, vel) in starts {
                notes.push(ImportedNote {
                    pitch: key,
                    start_seconds: to_seconds(start),
                    end_seconds: to_seconds(tick),
                    velocity: vel,
                });
            }
        }
    }

    notes.sort_by(|a, b| {
        a.start_seconds
            .total_cmp(&b.start_seconds)
            .then(a.pitch.cmp(&b.pitch))
    });
    Ok(notes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MidiConfig;
    use crate::midi::encode::{MidiEncoder, MidiNoteEvent};

    fn note(pitch: u8, start: f64, duration: f64) -> MidiNoteEvent {
        MidiNoteEvent {
            pitch,
            start_seconds: start,
            duration_seconds: duration,
            velocity: 0.8,
        }
    }

    #[test]
    fn reads_back_encoded_notes() {
        let enc = MidiEncoder::new(MidiConfig::default());
        let bytes = enc
            .encode_single(&[note(60, 0.5, 0.25), note(40, 1.0, 1.0)], Some(100.0))
            .unwrap();
        let notes = parse_notes(&bytes).unwrap();

        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].pitch, 60);
        assert!((notes[0].start_seconds - 0.5).abs() < 0.005);
        assert!((notes[0].end_seconds - 0.75).abs() < 0.005);
        assert_eq!(notes[1].pitch, 40);
        assert!((notes[1].end_seconds - notes[1].start_seconds - 1.0).abs() < 0.005);
        assert_eq!(notes[0].velocity, 102);
    }

    #[test]
    fn default_tempo_applies_without_tempo_event() {
        let enc = MidiEncoder::new(MidiConfig::default());
        let bytes = enc.encode_single(&[note(50, 2.0, 0.2)], None).unwrap();
        let notes = parse_notes(&bytes).unwrap();
        assert!((notes[0].start_seconds - 2.0).abs() < 0.005);
    }

    #[test]
    fn tempo_map_spans_changes() {
        let map = TempoMap {
            changes: vec![(0, 500_000), (960, 1_000_000)],
            ticks_per_quarter: 480.0,
        };
        // Two quarters at 0.5s, then one quarter at 1s.
        assert!((map.seconds_at(960) - 1.0).abs() < 1e-9);
        assert!((map.seconds_at(1440) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_notes(b"not a midi file").is_err());
    }
}
