use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::path::Path;

use crate::audio::onset::OnsetEvent;
use crate::audio::pcm::StemKind;
use crate::chart::model::ChartNote;
use crate::config::MidiConfig;
use crate::error::{PipelineError, Result};

/// Shortest note the encoder will write, in seconds.
pub const MIN_NOTE_SECONDS: f64 = 0.05;

/// Tempo assumed by MIDI readers when no tempo event is present.
const DEFAULT_US_PER_QUARTER: u32 = 500_000;

#[derive(Clone, Debug, PartialEq)]
pub struct MidiNoteEvent {
    pub pitch: u8,
    pub start_seconds: f64,
    pub duration_seconds: f64,
    /// Normalized to (0, 1].
    pub velocity: f32,
}

/// A named track of notes, e.g. one stem.
#[derive(Clone, Debug)]
pub struct NoteTrack {
    pub name: &'static str,
    pub notes: Vec<MidiNoteEvent>,
}

pub struct MidiEncoder {
    config: MidiConfig,
}

impl MidiEncoder {
    pub fn new(config: MidiConfig) -> Self {
        Self { config }
    }

    pub fn lane_pitch(&self, lane: u8) -> u8 {
        let pitch = self.config.lane_base_pitch as u32 + lane as u32 * self.config.lane_pitch_step as u32;
        pitch.min(127) as u8
    }

    pub fn stem_pitch(&self, stem: StemKind) -> u8 {
        match stem {
            StemKind::Percussive => self.config.drums_pitch,
            StemKind::Melodic => self.config.melodic_pitch,
            StemKind::Vocal => self.config.vocal_pitch,
        }
    }

    /// One event per chart note; holds keep their length, taps get the default duration.
    pub fn chart_events(&self, notes: &[ChartNote]) -> Vec<MidiNoteEvent> {
        notes
            .iter()
            .map(|note| MidiNoteEvent {
                pitch: self.lane_pitch(note.lane),
                start_seconds: note.time_ms as f64 / 1000.0,
                duration_seconds: match note.hold_duration_ms {
                    Some(ms) => (ms as f64 / 1000.0).max(MIN_NOTE_SECONDS),
                    None => self.config.note_duration,
                },
                velocity: self.config.velocity,
            })
            .collect()
    }

    pub fn onset_events(&self, stem: StemKind, onsets: &[OnsetEvent]) -> Vec<MidiNoteEvent> {
        let pitch = self.stem_pitch(stem);
        onsets
            .iter()
            .map(|onset| MidiNoteEvent {
                pitch,
                start_seconds: onset.time_seconds,
                duration_seconds: self.config.note_duration,
                velocity: self.config.velocity,
            })
            .collect()
    }

    fn us_per_quarter(bpm: Option<f64>) -> Option<u32> {
        bpm.filter(|b| b.is_finite() && *b > 0.0)
            .map(|b| ((60_000_000.0 / b).round() as u32).clamp(1, 0x00ff_ffff))
    }

    fn seconds_to_ticks(&self, seconds: f64, us_per_quarter: u32) -> u64 {
        let quarters = seconds.max(0.0) * 1_000_000.0 / us_per_quarter as f64;
        (quarters * self.config.ppq as f64).round() as u64
    }

    fn note_track(&self, notes: &[MidiNoteEvent], us_per_quarter: u32, header: Vec<(u64, TrackEventKind<'static>)>) -> Vec<TrackEvent<'static>> {
        let channel = u4::new(0);
        // (tick, note-offs before note-ons, key)
        let mut timed: Vec<(u64, u8, u8, TrackEventKind<'static>)> = header
            .into_iter()
            .map(|(tick, kind)| (tick, 0, 0, kind))
            .collect();

        for note in notes {
            let key = u7::new(note.pitch.min(127));
            let vel = u7::new(((note.velocity * 127.0).round() as u8).clamp(1, 127));
            let start = self.seconds_to_ticks(note.start_seconds, us_per_quarter);
            let duration = note.duration_seconds.max(MIN_NOTE_SECONDS);
            let end = self
                .seconds_to_ticks(note.start_seconds.max(0.0) + duration, us_per_quarter)
                .max(start + 1);

            timed.push((
                start,
                2,
                key.as_int(),
                TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOn { key, vel },
                },
            ));
            timed.push((
                end,
                1,
                key.as_int(),
                TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOff { key, vel: u7::new(0) },
                },
            ));
        }
        timed.sort_by_key(|(tick, rank, key, _)| (*tick, *rank, *key));

        let mut events = Vec::with_capacity(timed.len() + 1);
        let mut last_tick = 0u64;
        for (tick, _, _, kind) in timed {
            let delta = (tick - last_tick).min(0x0fff_ffff) as u32;
            last_tick = tick;
            events.push(TrackEvent {
                delta: u28::new(delta),
                kind,
            });
        }
        events.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });
        events
    }

    fn tempo_header(bpm: Option<f64>) -> Vec<(u64, TrackEventKind<'static>)> {
        Self::us_per_quarter(bpm)
            .map(|us| vec![(0, TrackEventKind::Meta(MetaMessage::Tempo(u24::new(us))))])
            .unwrap_or_default()
    }

    /// Format 0 file with a single track.
    pub fn encode_single(&self, notes: &[MidiNoteEvent], bpm: Option<f64>) -> Result<Vec<u8>> {
        let us = Self::us_per_quarter(bpm).unwrap_or(DEFAULT_US_PER_QUARTER);
        let track = self.note_track(notes, us, Self::tempo_header(bpm));
        self.serialize(Format::SingleTrack, vec![track])
    }

    /// Format 1 file, one named track per entry; the tempo goes in the first track.
    pub fn encode_multi(&self, tracks: &[NoteTrack], bpm: Option<f64>) -> Result<Vec<u8>> {
        let us = Self::us_per_quarter(bpm).unwrap_or(DEFAULT_US_PER_QUARTER);
        let encoded = tracks
            .iter()
            .enumerate()
            .map(|(i, track)| {
                let mut header = vec![(
                    0,
                    TrackEventKind::Meta(MetaMessage::TrackName(track.name.as_bytes())),
                )];
                if i == 0 {
                    header.extend(Self::tempo_header(bpm));
                }
                self.note_track(&track.notes, us, header)
            })
            .collect();
        self.serialize(Format::Parallel, encoded)
    }

    fn serialize(&self, format: Format, tracks: Vec<Vec<TrackEvent<'static>>>) -> Result<Vec<u8>> {
        let smf = Smf {
            header: Header::new(format, Timing::Metrical(u15::new(self.config.ppq))),
            tracks,
        };
        let mut data = Vec::new();
        smf.write(&mut data)
            .map_err(|e| PipelineError::midi("<memory>", e.to_string()))?;
        Ok(data)
    }
}

pub fn write_midi(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }
    std::fs::write(path, data).map_err(|e| PipelineError::io(path, e))?;
    log::info!("Wrote MIDI: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder() -> MidiEncoder {
        MidiEncoder::new(MidiConfig::default())
    }

    /// (key, velocity) of every sounding note-on in one track.
    fn note_ons(track: &[TrackEvent]) -> Vec<(u8, u8)> {
        track
            .iter()
            .filter_map(|e| match e.kind {
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOn { key, vel },
                    ..
                } if vel.as_int() > 0 => Some((key.as_int(), vel.as_int())),
                _ => None,
            })
            .collect()
    }

    fn has_tempo(track: &[TrackEvent]) -> Option<u32> {
        track.iter().find_map(|e| match e.kind {
            TrackEventKind::Meta(MetaMessage::Tempo(t)) => Some(t.as_int()),
            _ => None,
        })
    }

    #[test]
    fn chart_notes_map_lane_to_pitch() {
        let enc = encoder();
        let notes = vec![
            ChartNote::tap(1500, 0),
            ChartNote::tap(1750, 1),
            ChartNote::tap(2000, 2),
            ChartNote::hold(2250, 3, 400),
        ];
        let events = enc.chart_events(&notes);
        assert_eq!(events.iter().map(|e| e.pitch).collect::<Vec<_>>(), vec![48, 53, 58, 63]);
        assert_eq!(events[0].start_seconds, 1.5);
        assert_eq!(events[0].duration_seconds, 0.2);
        assert!((events[3].duration_seconds - 0.4).abs() < 1e-9);

        let short = enc.chart_events(&[ChartNote::hold(0, 0, 10)]);
        assert_eq!(short[0].duration_seconds, MIN_NOTE_SECONDS);
    }

    #[test]
    fn single_track_reparses_with_same_notes() {
        let enc = encoder();
        let notes = enc.chart_events(&[ChartNote::tap(1500, 0), ChartNote::tap(1600, 2), ChartNote::tap(1600, 3)]);
        let bytes = enc.encode_single(&notes, Some(120.0)).unwrap();

        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.header.format, Format::SingleTrack);
        assert_eq!(smf.tracks.len(), 1);
        assert_eq!(has_tempo(&smf.tracks[0]), Some(500_000));
        let ons = note_ons(&smf.tracks[0]);
        assert_eq!(ons.iter().map(|(k, _)| *k).collect::<Vec<_>>(), vec![48, 58, 63]);
        // 0.8 * 127 rounds to 102.
        assert!(ons.iter().all(|(_, v)| *v == 102));
    }

    #[test]
    fn no_bpm_means_no_tempo_event() {
        let enc = encoder();
        let bytes = enc.encode_single(&[], None).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(has_tempo(&smf.tracks[0]), None);
        assert!(note_ons(&smf.tracks[0]).is_empty());
        assert!(matches!(
            smf.tracks[0].last().map(|e| e.kind),
            Some(TrackEventKind::Meta(MetaMessage::EndOfTrack))
        ));
    }

    #[test]
    fn tick_positions_follow_tempo() {
        let enc = encoder();
        let notes = vec![MidiNoteEvent {
            pitch: 60,
            start_seconds: 1.0,
            duration_seconds: 0.5,
            velocity: 1.0,
        }];
        // 60 BPM: one quarter per second, 480 ticks.
        let bytes = enc.encode_single(&notes, Some(60.0)).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        let mut tick = 0u32;
        let mut on_tick = None;
        let mut off_tick = None;
        for event in &smf.tracks[0] {
            tick += event.delta.as_int();
            match event.kind {
                TrackEventKind::Midi { message: MidiMessage::NoteOn { .. }, .. } => on_tick = Some(tick),
                TrackEventKind::Midi { message: MidiMessage::NoteOff { .. }, .. } => off_tick = Some(tick),
                _ => {}
            }
        }
        assert_eq!(on_tick, Some(480));
        assert_eq!(off_tick, Some(720));
    }

    #[test]
    fn overlapping_same_key_turns_off_before_on() {
        let enc = encoder();
        let notes = vec![
            MidiNoteEvent { pitch: 36, start_seconds: 0.0, duration_seconds: 0.25, velocity: 0.9 },
            MidiNoteEvent { pitch: 36, start_seconds: 0.25, duration_seconds: 0.25, velocity: 0.9 },
        ];
        let bytes = enc.encode_single(&notes, Some(120.0)).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        let kinds: Vec<&str> = smf.tracks[0]
            .iter()
            .filter_map(|e| match e.kind {
                TrackEventKind::Midi { message: MidiMessage::NoteOn { .. }, .. } => Some("on"),
                TrackEventKind::Midi { message: MidiMessage::NoteOff { .. }, .. } => Some("off"),
                _ => None,
            })
            .collect();
        assert_eq!(kinds, vec!["on", "off", "on", "off"]);
    }

    #[test]
    fn stem_tracks_use_stem_pitches() {
        let enc = encoder();
        let onset = |t: f64, stem| OnsetEvent { time_seconds: t, stem: Some(stem), magnitude: 0.1 };
        let tracks: Vec<NoteTrack> = StemKind::ALL
            .iter()
            .map(|&stem| NoteTrack {
                name: stem.file_tag(),
                notes: enc.onset_events(stem, &[onset(0.1, stem), onset(0.6, stem)]),
            })
            .collect();
        let bytes = enc.encode_multi(&tracks, None).unwrap();
        let smf = Smf::parse(&bytes).unwrap();

        assert_eq!(smf.header.format, Format::Parallel);
        assert_eq!(smf.tracks.len(), 3);
        let pitches: Vec<u8> = smf.tracks.iter().map(|t| note_ons(t)[0].0).collect();
        assert_eq!(pitches, vec![36, 64, 60]);
        assert!(smf.tracks.iter().all(|t| note_ons(t).len() == 2));
    }

    #[test]
    fn negative_times_clamp_to_zero() {
        let enc = encoder();
        let events = enc.chart_events(&[ChartNote::tap(-200, 1)]);
        let bytes = enc.encode_single(&events, None).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(note_ons(&smf.tracks[0]), vec![(53, 102)]);
    }
}
