pub mod capture;
pub mod normalizer;
pub mod recorder;

pub use capture::{EventCapture, InstrumentationState};
pub use normalizer::{ActionNormalizer, NormalizerConfig};
pub use recorder::{Recorder, Recording};
