pub mod decode;
pub mod ffmpeg;
pub mod onset;
pub mod pcm;
pub mod resample;
pub mod stems;

pub use decode::{AudioDecoder, SymphoniaDecoder};
pub use ffmpeg::FfmpegDecoder;
pub use onset::{OnsetDetector, OnsetEvent};
pub use pcm::{PcmBuffer, StemBuffer, StemKind};
pub use stems::StemApproximator;
