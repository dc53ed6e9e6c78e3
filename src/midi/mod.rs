pub mod encode;
pub mod import;

pub use encode::{MidiEncoder, MidiNoteEvent, NoteTrack};
