use serde::{Deserialize, Serialize};

use crate::models::{ActionKind, CanonicalAction, Locator, Payload, ScrollDirection};
use crate::timing::SpeedSetting;

/// A persisted, replayable action list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "ScenarioConfig::is_empty")]
    pub config: ScenarioConfig,

    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            config: ScenarioConfig::default(),
            steps: Vec::new(),
        }
    }

    /// Distinct narration texts, in first-use order
    pub fn narration_texts(&self) -> Vec<&str> {
        let mut texts: Vec<&str> = Vec::new();
        for text in self.steps.iter().filter_map(|s| s.audio.as_deref()) {
            if !text.trim().is_empty() && !texts.contains(&text) {
                texts.push(text);
            }
        }
        texts
    }
}

/// Per-scenario overrides of the run configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<SpeedSetting>,

    /// Output path of the processed video
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<BrowserConfig>,
}

impl ScenarioConfig {
    pub fn is_empty(&self) -> bool {
        self.speed.is_none() && self.video.is_none() && self.browser.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headless: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// One step: the action plus its presentation fields.
///
/// `subtitle` and `audio` carry over to later steps until reassigned; an
/// empty string clears them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub action: Action,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,

    /// Narration text, synthesized before the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
}

impl Step {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            description: None,
            subtitle: None,
            audio: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_subtitle(mut self, subtitle: &str) -> Self {
        self.subtitle = Some(subtitle.to_string());
        self
    }

    pub fn with_audio(mut self, audio: &str) -> Self {
        self.audio = Some(audio.to_string());
        self
    }

    /// Human-readable summary used in logs and reports
    pub fn summary(&self) -> String {
        match &self.description {
            Some(description) if !description.trim().is_empty() => description.clone(),
            _ => self.action.to_string(),
        }
    }
}

pub const DEFAULT_SCROLL_AMOUNT: u32 = 500;

fn default_scroll_amount() -> u32 {
    DEFAULT_SCROLL_AMOUNT
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    GoTo {
        url: String,
    },
    Click {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
    },
    Submit {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
    },
    Type {
        /// The value typed
        text: String,
        /// Label or placeholder the field is found by
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
    },
    Scroll {
        #[serde(default)]
        direction: ScrollDirection,
        #[serde(default = "default_scroll_amount")]
        amount: u32,
    },
    Press {
        key: String,
    },
    Wait {
        seconds: f64,
    },
    Screenshot {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

impl Action {
    /// `action` key as written in scenario files
    pub fn name(&self) -> &'static str {
        match self {
            Action::GoTo { .. } => "go_to",
            Action::Click { .. } => "click",
            Action::Submit { .. } => "submit",
            Action::Type { .. } => "type",
            Action::Scroll { .. } => "scroll",
            Action::Press { .. } => "press",
            Action::Wait { .. } => "wait",
            Action::Screenshot { .. } => "screenshot",
        }
    }

    /// Element locator for actions that target one
    pub fn locator(&self) -> Option<Locator> {
        match self {
            Action::Click { text, selector } | Action::Submit { text, selector } => {
                Some(Locator::new(text.clone(), selector.clone()))
            }
            Action::Type { field, selector, .. } => Some(Locator::new(field.clone(), selector.clone())),
            _ => None,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::GoTo { url } => write!(f, "go to {}", url),
            Action::Click { .. } | Action::Submit { .. } => match self.locator() {
                Some(locator) => write!(f, "{} {}", self.name(), locator),
                None => f.write_str(self.name()),
            },
            Action::Type { text, field, selector } => {
                let target = field.as_deref().or(selector.as_deref()).unwrap_or("field");
                write!(f, "type '{}' into '{}'", text, target)
            }
            Action::Scroll { direction, amount } => {
                let direction = match direction {
                    ScrollDirection::Up => "up",
                    ScrollDirection::Down => "down",
                };
                write!(f, "scroll {} {}px", direction, amount)
            }
            Action::Press { key } => write!(f, "press {}", key),
            Action::Wait { seconds } => write!(f, "wait {}s", seconds),
            Action::Screenshot { name } => match name {
                Some(name) => write!(f, "screenshot {}", name),
                None => f.write_str("screenshot"),
            },
        }
    }
}

impl From<&CanonicalAction> for Action {
    fn from(action: &CanonicalAction) -> Self {
        let Locator { text, selector } = action.locator.clone();
        match (action.kind, &action.payload) {
            (ActionKind::GoTo, Payload::Url(url)) => Action::GoTo { url: url.clone() },
            (ActionKind::Submit, _) => Action::Submit { text, selector },
            (ActionKind::Type, Payload::Text(value)) => Action::Type {
                text: value.clone(),
                field: text,
                selector,
            },
            (ActionKind::Scroll, Payload::Scroll { direction, amount }) => Action::Scroll {
                direction: *direction,
                amount: *amount,
            },
            (ActionKind::Press, Payload::Key(key)) => Action::Press { key: key.clone() },
            (ActionKind::Wait, Payload::WaitMs(ms)) => Action::Wait {
                seconds: *ms as f64 / 1000.0,
            },
            _ => Action::Click { text, selector },
        }
    }
}

impl From<&CanonicalAction> for Step {
    fn from(action: &CanonicalAction) -> Self {
        Step::new(Action::from(action)).with_description(&action.description)
    }
}

/// Result of validating a scenario
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}
