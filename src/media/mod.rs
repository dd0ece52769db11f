//! Post-processing collaborators: captions, narration and the final video.

pub mod speech;
pub mod subtitles;
pub mod transcoder;

pub use speech::{CommandSynthesizer, SpeechClip, SpeechSynthesizer};
pub use subtitles::{cues_from_records, to_srt, SubtitleCue};
pub use transcoder::{FfmpegTranscoder, TranscodeJob, Transcoder};
