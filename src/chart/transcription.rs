use super::model::{Chart, ChartMeta, ChartNote};
use crate::config::ChartConfig;
use crate::midi::import::ImportedNote;

/// Lowest pitch of the first lane; each following lane spans one octave.
const LANE_BASE_PITCH: i32 = 36;

/// Lane for a transcribed pitch: one octave per lane from C2, clamped to the outer lanes.
pub fn lane_for_pitch(pitch: u8, lane_count: u8) -> u8 {
    let top = lane_count.max(1) as i32 - 1;
    (pitch as i32 - LANE_BASE_PITCH).div_euclid(12).clamp(0, top) as u8
}

/// Builds a chart straight from a note transcription. The transcription already
/// is the note source, so no density thinning or travel offset is applied.
pub fn chart_from_notes(notes: &[ImportedNote], meta: ChartMeta, config: &ChartConfig) -> Chart {
    let mut chart_notes: Vec<ChartNote> = notes
        .iter()
        .map(|n| {
            let start_ms = ((n.start_seconds * 1000.0).round() as i64).saturating_add(meta.offset_ms);
            let end_ms = ((n.end_seconds * 1000.0).round() as i64).saturating_add(meta.offset_ms);
            let lane = lane_for_pitch(n.pitch, config.lane_count);
            if end_ms - start_ms >= config.hold_min_ms {
                ChartNote::hold(start_ms, lane, end_ms - start_ms)
            } else {
                ChartNote::tap(start_ms, lane)
            }
        })
        .collect();
    chart_notes.sort_by_key(|n| n.time_ms);

    let holds = chart_notes.iter().filter(|n| n.hold_duration_ms.is_some()).count();
    log::info!(
        "Chart {} from transcription: {} notes ({} holds)",
        meta.song_id,
        chart_notes.len(),
        holds
    );
    meta.into_chart(chart_notes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::model::{Difficulty, NoteKind};

    fn imported(pitch: u8, start: f64, end: f64) -> ImportedNote {
        ImportedNote {
            pitch,
            start_seconds: start,
            end_seconds: end,
            velocity: 100,
        }
    }

    fn meta(offset_ms: i64) -> ChartMeta {
        ChartMeta {
            song_id: "local:1".into(),
            title: "Song".into(),
            artist: "STEMSTATION".into(),
            bpm: None,
            offset_ms,
            difficulty: Difficulty::Normal,
        }
    }

    #[test]
    fn pitch_ranges_map_to_lanes() {
        assert_eq!(lane_for_pitch(20, 4), 0);
        assert_eq!(lane_for_pitch(36, 4), 0);
        assert_eq!(lane_for_pitch(48, 4), 1);
        assert_eq!(lane_for_pitch(60, 4), 2);
        assert_eq!(lane_for_pitch(72, 4), 3);
        assert_eq!(lane_for_pitch(120, 4), 3);
        assert_eq!(lane_for_pitch(120, 2), 1);
    }

    #[test]
    fn long_notes_become_holds() {
        let notes = vec![imported(60, 1.0, 1.2), imported(40, 0.5, 1.5), imported(50, 2.0, 2.35)];
        let chart = chart_from_notes(&notes, meta(10), &ChartConfig::default());

        assert_eq!(chart.notes.len(), 3);
        assert_eq!(chart.notes[0], ChartNote::hold(510, 0, 1000));
        assert_eq!(chart.notes[1], ChartNote::tap(1010, 2));
        // Exactly the hold threshold.
        assert_eq!(chart.notes[2].kind, NoteKind::Hold);
        assert_eq!(chart.notes[2].hold_duration_ms, Some(350));
        assert_eq!(chart.offset_ms, 10);
    }

    #[test]
    fn empty_transcription_gives_empty_chart() {
        let chart = chart_from_notes(&[], meta(0), &ChartConfig::default());
        assert!(chart.notes.is_empty());
    }
}
