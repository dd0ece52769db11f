//! Scenario replay: step execution, caption continuity and narration sync.

pub mod continuity;
pub mod engine;

pub use continuity::{assigned_narration, Continuity, NarrationSync};
pub use engine::{ReplayEngine, ReplayOptions, ReplayOutcome};
