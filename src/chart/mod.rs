pub mod model;
pub mod stemstation;
pub mod synth;
pub mod transcription;

pub use model::{sanitize_id, Chart, ChartMeta, ChartNote, Difficulty, NoteKind};
pub use synth::ChartSynthesizer;
