use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::StepFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Running,
    Completed,
    Cancelled,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSession {
    pub id: String,
    pub start_url: String,
    pub status: SessionStatus,
    #[serde(default)]
    pub action_count: usize,
    /// Set when capture instrumentation could not be verified
    #[serde(default)]
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl RecordingSession {
    pub fn new(start_url: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            start_url,
            status: SessionStatus::Pending,
            action_count: 0,
            degraded: false,
            error: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn start(&mut self) {
        self.status = SessionStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn complete(&mut self) {
        self.status = SessionStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: String) {
        self.status = SessionStatus::Error;
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
    }
}

/// Page facts captured when a step fails, before the caller decides to abort
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub url: String,
    pub title: String,
    /// Truncated outer HTML of the document
    pub dom: String,
}

/// Narration clip scheduled at a replay offset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationPlacement {
    pub text: String,
    pub clip: PathBuf,
    pub offset_ms: u64,
    pub duration_ms: u64,
}

impl NarrationPlacement {
    pub fn offset(&self) -> Duration {
        Duration::from_millis(self.offset_ms)
    }

    pub fn end(&self) -> Duration {
        Duration::from_millis(self.offset_ms + self.duration_ms)
    }
}

/// Timing and outcome of one replayed step, relative to replay start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub index: usize,
    pub action: String,
    pub summary: String,
    pub start_ms: u64,
    pub end_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narration: Option<NarrationPlacement>,
    #[serde(default)]
    pub navigated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<StepFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,
}

impl StepRecord {
    pub fn start(&self) -> Duration {
        Duration::from_millis(self.start_ms)
    }

    pub fn end(&self) -> Duration {
        Duration::from_millis(self.end_ms)
    }

    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Result of a replay run. Partial when the run stopped early.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayReport {
    pub id: String,
    pub scenario: String,
    pub total_steps: usize,
    pub steps: Vec<StepRecord>,
    /// Unhandled driver error that aborted the remaining steps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
    #[serde(default)]
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ReplayReport {
    pub fn new(scenario: String, total_steps: usize) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            scenario,
            total_steps,
            steps: Vec::new(),
            aborted: None,
            cancelled: false,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    pub fn first_failure(&self) -> Option<(&StepRecord, &StepFailure)> {
        self.steps
            .iter()
            .find_map(|record| record.failure.as_ref().map(|failure| (record, failure)))
    }

    pub fn success(&self) -> bool {
        self.aborted.is_none()
            && !self.cancelled
            && self.steps.len() == self.total_steps
            && self.steps.iter().all(StepRecord::succeeded)
    }

    pub fn summary(&self) -> String {
        if self.success() {
            return format!(
                "{}: {} steps replayed",
                self.scenario,
                self.steps.len()
            );
        }
        if let Some(error) = &self.aborted {
            return format!(
                "{}: aborted after {}/{} steps: {}",
                self.scenario,
                self.steps.len(),
                self.total_steps,
                error
            );
        }
        if let Some((record, failure)) = self.first_failure() {
            return format!(
                "{}: step {} ({}) failed: {}",
                self.scenario,
                record.index + 1,
                record.summary,
                failure
            );
        }
        format!(
            "{}: stopped after {}/{} steps",
            self.scenario,
            self.steps.len(),
            self.total_steps
        )
    }
}
