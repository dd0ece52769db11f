use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Click,
    Submit,
    Type,
    Scroll,
    Press,
    Wait,
    GoTo,
}

impl ActionKind {
    /// Actions that can cause the page to navigate
    pub fn is_interaction(self) -> bool {
        matches!(self, ActionKind::Click | ActionKind::Submit | ActionKind::Press)
    }
}

/// Text/selector hint used to re-find an element at replay time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

impl Locator {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            selector: None,
        }
    }

    pub fn selector(selector: impl Into<String>) -> Self {
        Self {
            text: None,
            selector: Some(selector.into()),
        }
    }

    pub fn new(text: Option<String>, selector: Option<String>) -> Self {
        Self {
            text: text.filter(|t| !t.trim().is_empty()),
            selector: selector.filter(|s| !s.trim().is_empty()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.selector.is_none()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.text, &self.selector) {
            (Some(text), Some(selector)) => write!(f, "'{}' ({})", text, selector),
            (Some(text), None) => write!(f, "'{}'", text),
            (None, Some(selector)) => write!(f, "{}", selector),
            (None, None) => write!(f, "<empty locator>"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    #[default]
    Down,
}

/// Action-specific data
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    None,
    /// Final value of a `type` action
    Text(String),
    Key(String),
    Url(String),
    Scroll {
        direction: ScrollDirection,
        amount: u32,
    },
    WaitMs(u64),
}

/// The normalized, replay-ready representation of a user interaction
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalAction {
    pub kind: ActionKind,
    pub locator: Locator,
    pub description: String,
    pub payload: Payload,
    /// Timestamp (ms) of the raw event that produced the action
    pub timestamp: i64,
}

impl CanonicalAction {
    pub fn click(locator: Locator, description: String, timestamp: i64) -> Self {
        Self {
            kind: ActionKind::Click,
            locator,
            description,
            payload: Payload::None,
            timestamp,
        }
    }

    pub fn submit(locator: Locator, description: String, timestamp: i64) -> Self {
        Self {
            kind: ActionKind::Submit,
            locator,
            description,
            payload: Payload::None,
            timestamp,
        }
    }

    pub fn type_text(locator: Locator, value: String, description: String, timestamp: i64) -> Self {
        Self {
            kind: ActionKind::Type,
            locator,
            description,
            payload: Payload::Text(value),
            timestamp,
        }
    }

    pub fn press(key: &str, timestamp: i64) -> Self {
        Self {
            kind: ActionKind::Press,
            locator: Locator::default(),
            description: format!("Press {}", key),
            payload: Payload::Key(key.to_string()),
            timestamp,
        }
    }

    pub fn scroll(direction: ScrollDirection, amount: u32, timestamp: i64) -> Self {
        let dir = match direction {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
        };
        Self {
            kind: ActionKind::Scroll,
            locator: Locator::default(),
            description: format!("Scroll {} {}px", dir, amount),
            payload: Payload::Scroll { direction, amount },
            timestamp,
        }
    }

    pub fn go_to(url: &str, timestamp: i64) -> Self {
        Self {
            kind: ActionKind::GoTo,
            locator: Locator::default(),
            description: format!("Open {}", url),
            payload: Payload::Url(url.to_string()),
            timestamp,
        }
    }

    pub fn wait(ms: u64, timestamp: i64) -> Self {
        Self {
            kind: ActionKind::Wait,
            locator: Locator::default(),
            description: format!("Wait {}ms", ms),
            payload: Payload::WaitMs(ms),
            timestamp,
        }
    }

    /// Typed value for `type` actions
    pub fn typed_value(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text(value) => Some(value),
            _ => None,
        }
    }
}
