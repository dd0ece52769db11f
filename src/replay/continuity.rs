//! Values that carry across steps, and the narration timeline.

use std::time::Duration;

/// A caption value that persists until reassigned.
///
/// `None` on a step inherits the current value, an empty string clears it.
#[derive(Debug, Clone, Default)]
pub struct Continuity {
    current: Option<String>,
}

impl Continuity {
    /// Apply one step's field and return the value in effect for that step
    pub fn apply(&mut self, field: Option<&str>) -> Option<&str> {
        match field {
            None => {}
            Some(value) if value.trim().is_empty() => self.current = None,
            Some(value) => self.current = Some(value.to_string()),
        }
        self.current.as_deref()
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }
}

/// Narration as explicitly assigned by a step (inheritance never replays audio)
pub fn assigned_narration(field: Option<&str>) -> Option<&str> {
    field.filter(|text| !text.trim().is_empty())
}

/// Tracks when the last narration clip ends, measured from replay start.
///
/// Clip durations are real audio lengths and are never scaled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NarrationSync {
    busy_until: Duration,
}

impl NarrationSync {
    /// How long a narrated step must wait at `elapsed` before starting.
    /// Zero when the previous clip already finished.
    pub fn required_wait(&self, elapsed: Duration) -> Duration {
        self.busy_until.saturating_sub(elapsed)
    }

    /// A clip of `duration` starts at `offset`
    pub fn start(&mut self, offset: Duration, duration: Duration) {
        self.busy_until = offset + duration;
    }

    pub fn busy_until(&self) -> Duration {
        self.busy_until
    }
}
