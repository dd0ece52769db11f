use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Browser automation error: {0}")]
    BrowserError(String),

    #[error("Invalid scenario: {0}")]
    ValidationError(String),

    #[error("Recording error: {0}")]
    RecordingError(String),

    #[error("Replay error: {0}")]
    ReplayError(String),

    #[error("Media error: {0}")]
    MediaError(String),

    #[error("Failed to parse scenario YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Structured replay failure. Distinguishes a locator miss from an
/// element that was found but whose action changed nothing.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepFailure {
    #[error("locator not found: {locator}")]
    ElementNotFound { locator: String },

    #[error("found but ineffective: {locator}")]
    ActionNoEffect { locator: String },
}

impl StepFailure {
    pub fn locator(&self) -> &str {
        match self {
            StepFailure::ElementNotFound { locator } | StepFailure::ActionNoEffect { locator } => {
                locator
            }
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// Instrumentation never verified ready. Recording continues degraded.
    #[error("capture instrumentation not ready after {attempts} attempts: {reason}")]
    InitFailure { attempts: u32, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeWarning {
    #[error("finalize requested for {key} with no pending input")]
    FinalizeWithoutPending { key: String },
}
