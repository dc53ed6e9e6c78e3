use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Normal,
    Hard,
    Expert,
}

impl Difficulty {
    pub const ALL: [Difficulty; 4] = [
        Difficulty::Easy,
        Difficulty::Normal,
        Difficulty::Hard,
        Difficulty::Expert,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Normal => "normal",
            Difficulty::Hard => "hard",
            Difficulty::Expert => "expert",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "normal" => Ok(Difficulty::Normal),
            "hard" => Ok(Difficulty::Hard),
            "expert" => Ok(Difficulty::Expert),
            other => Err(format!(
                "unknown difficulty '{}' (expected easy, normal, hard or expert)",
                other
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteKind {
    Tap,
    Hold,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartNote {
    /// Moment the note must be struck, travel time and calibration included.
    pub time_ms: i64,
    pub lane: u8,
    #[serde(rename = "type")]
    pub kind: NoteKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_duration_ms: Option<i64>,
}

impl ChartNote {
    pub fn tap(time_ms: i64, lane: u8) -> Self {
        Self {
            time_ms,
            lane,
            kind: NoteKind::Tap,
            hold_duration_ms: None,
        }
    }

    pub fn hold(time_ms: i64, lane: u8, duration_ms: i64) -> Self {
        Self {
            time_ms,
            lane,
            kind: NoteKind::Hold,
            hold_duration_ms: Some(duration_ms),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chart {
    pub song_id: String,
    pub title: String,
    pub artist: String,
    pub bpm: Option<f64>,
    pub offset_ms: i64,
    pub difficulty: Difficulty,
    pub notes: Vec<ChartNote>,
}

/// Everything about a chart that does not come from the audio.
#[derive(Clone, Debug)]
pub struct ChartMeta {
    pub song_id: String,
    pub title: String,
    pub artist: String,
    pub bpm: Option<f64>,
    pub offset_ms: i64,
    pub difficulty: Difficulty,
}

impl ChartMeta {
    pub fn into_chart(self, notes: Vec<ChartNote>) -> Chart {
        Chart {
            song_id: self.song_id,
            title: self.title,
            artist: self.artist,
            bpm: self.bpm,
            offset_ms: self.offset_ms,
            difficulty: self.difficulty,
            notes,
        }
    }
}

/// File-name-safe form of a track id: anything but letters, digits, `-` and `_` becomes `_`.
/// Non-ASCII letters are kept.
pub fn sanitize_id(track_id: &str) -> String {
    track_id
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
