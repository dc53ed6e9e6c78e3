use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use super::model::{Chart, ChartMeta, ChartNote};
use crate::audio::onset::OnsetEvent;
use crate::config::ChartConfig;

/// Seeded PCG32; the same seed always yields the same draw sequence.
pub fn create_rng(seed: u64) -> Pcg32 {
    Pcg32::seed_from_u64(seed)
}

/// Turns onsets into a laned, difficulty-thinned chart.
#[derive(Debug, Clone)]
pub struct ChartSynthesizer {
    config: ChartConfig,
}

impl ChartSynthesizer {
    pub fn new(config: ChartConfig) -> Self {
        Self { config }
    }

    /// Keeps each onset with probability `density`. Exactly one draw is taken per
    /// onset, so under one seed a lower density keeps a subset of a higher one.
    pub fn thin<'a>(&self, onsets: &'a [OnsetEvent], density: f64, rng: &mut Pcg32) -> Vec<&'a OnsetEvent> {
        onsets
            .iter()
            .filter(|_| rng.gen::<f64>() < density)
            .collect()
    }

    /// Saturates instead of overflowing on extreme offsets or travel times.
    pub fn note_time_ms(&self, onset_seconds: f64, offset_ms: i64) -> i64 {
        ((onset_seconds * 1000.0).round() as i64)
            .saturating_add(offset_ms)
            .saturating_add(self.config.note_travel_ms())
    }

    pub fn synthesize(&self, onsets: &[OnsetEvent], meta: ChartMeta, seed: u64) -> Chart {
        let density = self.config.density.for_difficulty(meta.difficulty);
        let mut rng = create_rng(seed);
        let survivors = self.thin(onsets, density, &mut rng);
        let lane_count = self.config.lane_count.max(1) as usize;

        let mut notes: Vec<ChartNote> = survivors
            .iter()
            .enumerate()
            .map(|(i, onset)| {
                ChartNote::tap(
                    self.note_time_ms(onset.time_seconds, meta.offset_ms),
                    (i % lane_count) as u8,
                )
            })
            .collect();
        notes.sort_by_key(|n| n.time_ms);

        log::info!(
            "Chart {} [{}]: {}/{} onsets kept (density {:.2}, seed {})",
            meta.song_id,
            meta.difficulty,
            notes.len(),
            onsets.len(),
            density,
            seed
        );
        meta.into_chart(notes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::model::Difficulty;

    fn onsets(times: &[f64]) -> Vec<OnsetEvent> {
        times
            .iter()
            .map(|&t| OnsetEvent {
                time_seconds: t,
                stem: None,
                magnitude: 0.2,
            })
            .collect()
    }

    fn regular_onsets(n: usize) -> Vec<OnsetEvent> {
        onsets(&(0..n).map(|i| i as f64 * 0.25).collect::<Vec<_>>())
    }

    fn meta(difficulty: Difficulty, offset_ms: i64) -> ChartMeta {
        ChartMeta {
            song_id: "song".into(),
            title: "Song".into(),
            artist: "Artist".into(),
            bpm: Some(120.0),
            offset_ms,
            difficulty,
        }
    }

    fn synth() -> ChartSynthesizer {
        ChartSynthesizer::new(ChartConfig::default())
    }

    #[test]
    fn travel_time_is_added_to_every_note() {
        let mut config = ChartConfig::default();
        config.density.expert = 1.0;
        let synth = ChartSynthesizer::new(config);
        let source = onsets(&[0.0929, 0.4876, 1.0004]);
        let chart = synth.synthesize(&source, meta(Difficulty::Expert, -30), 7);

        assert_eq!(chart.notes.len(), 3);
        for (note, onset) in chart.notes.iter().zip(&source) {
            let expected = (onset.time_seconds * 1000.0).round() as i64 - 30 + 1500;
            assert_eq!(note.time_ms, expected);
        }
        assert_eq!(chart.notes[0].time_ms, 93 - 30 + 1500);
    }

    #[test]
    fn lanes_round_robin_within_bounds() {
        let mut config = ChartConfig::default();
        config.density.expert = 1.0;
        let synth = ChartSynthesizer::new(config);
        let chart = synth.synthesize(&regular_onsets(10), meta(Difficulty::Expert, 0), 1);

        let lanes: Vec<u8> = chart.notes.iter().map(|n| n.lane).collect();
        assert_eq!(lanes, vec![0, 1, 2, 3, 0, 1, 2, 3, 0, 1]);
    }

    #[test]
    fn same_seed_same_chart() {
        let source = regular_onsets(200);
        let a = synth().synthesize(&source, meta(Difficulty::Normal, 0), 42);
        let b = synth().synthesize(&source, meta(Difficulty::Normal, 0), 42);
        assert_eq!(a, b);
    }

    #[test]
    fn easy_keeps_a_subset_of_expert() {
        let source = regular_onsets(400);
        let synth = synth();
        let easy = synth.thin(&source, 0.35, &mut create_rng(9));
        let expert = synth.thin(&source, 0.90, &mut create_rng(9));

        assert!(easy.len() < expert.len());
        for kept in &easy {
            assert!(expert.iter().any(|e| std::ptr::eq(*e, *kept)));
        }
        // Loose bounds around the expected 140 and 360 survivors.
        assert!(easy.len() > 80 && easy.len() < 200);
        assert!(expert.len() > 320);
    }

    #[test]
    fn notes_sorted_and_lanes_bounded_for_every_difficulty() {
        let source = regular_onsets(100);
        for difficulty in Difficulty::ALL {
            let chart = synth().synthesize(&source, meta(difficulty, 0), 3);
            assert!(chart.notes.windows(2).all(|w| w[0].time_ms <= w[1].time_ms));
            assert!(chart.notes.iter().all(|n| n.lane < 4));
            assert_eq!(chart.difficulty, difficulty);
            assert_eq!(chart.bpm, Some(120.0));
        }
    }

    #[test]
    fn extreme_offsets_saturate() {
        assert_eq!(synth().note_time_ms(0.1, i64::MAX), i64::MAX);
        assert_eq!(synth().note_time_ms(0.1, i64::MIN), i64::MIN + 100 + 1500);

        let mut config = ChartConfig::default();
        config.note_speed = f64::MIN_POSITIVE;
        let crawling = ChartSynthesizer::new(config);
        assert_eq!(crawling.note_time_ms(2.0, 0), i64::MAX);
    }

    #[test]
    fn no_onsets_gives_empty_chart() {
        let chart = synth().synthesize(&[], meta(Difficulty::Expert, 0), 0);
        assert!(chart.notes.is_empty());
        assert_eq!(chart.song_id, "song");
    }
}
