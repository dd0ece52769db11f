use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of interaction reported by the capture script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawEventKind {
    Click,
    Input,
    Blur,
    Keydown,
    Scroll,
    /// Native form submit event
    Submit,
}

/// Element attributes captured at event time. Empty strings mean "absent".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementSnapshot {
    /// Upper-case tag name as reported by `Element.tagName`
    pub tag: String,
    pub text: String,
    pub id: String,
    pub name: String,
    /// Raw `type` attribute (empty when the attribute is missing)
    #[serde(rename = "type")]
    pub input_type: String,
    pub href: String,
    pub placeholder: String,
    pub label: String,
    pub role: String,
    pub aria_label: String,
    pub class_name: String,
    pub title: String,
    /// `for` attribute of a LABEL
    pub html_for: String,
    pub in_form: bool,
}

/// Identity of a form field used to accumulate `input` events
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InputKey {
    pub id: String,
    pub name: String,
    pub input_type: String,
}

impl fmt::Display for InputKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "id={:?} name={:?} type={:?}", self.id, self.name, self.input_type)
    }
}

impl ElementSnapshot {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_uppercase(),
            ..Default::default()
        }
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_type(mut self, input_type: &str) -> Self {
        self.input_type = input_type.to_string();
        self
    }

    pub fn with_href(mut self, href: &str) -> Self {
        self.href = href.to_string();
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn with_placeholder(mut self, placeholder: &str) -> Self {
        self.placeholder = placeholder.to_string();
        self
    }

    pub fn with_for(mut self, html_for: &str) -> Self {
        self.html_for = html_for.to_string();
        self
    }

    pub fn in_form(mut self) -> Self {
        self.in_form = true;
        self
    }

    pub fn is_tag(&self, tag: &str) -> bool {
        self.tag.eq_ignore_ascii_case(tag)
    }

    pub fn input_key(&self) -> InputKey {
        InputKey {
            id: self.id.clone(),
            name: self.name.clone(),
            input_type: self.input_type.to_lowercase(),
        }
    }

    /// Key used to recognise repeated clicks on the same element:
    /// tag + id + name + (placeholder + type for inputs, text otherwise)
    pub fn element_key(&self) -> String {
        let tail = if self.is_tag("INPUT") {
            format!("{}|{}", self.placeholder, self.input_type.to_lowercase())
        } else {
            self.text.trim().to_string()
        };
        format!(
            "{}|{}|{}|{}",
            self.tag.to_uppercase(),
            self.id,
            self.name,
            tail
        )
    }

    /// `href` only when it identifies a destination ("#" and javascript: links do not)
    pub fn meaningful_href(&self) -> Option<&str> {
        let href = self.href.trim();
        if href.is_empty() || href == "#" || href.to_lowercase().starts_with("javascript:") {
            None
        } else {
            Some(href)
        }
    }

    pub fn has_id_or_name(&self) -> bool {
        !self.id.is_empty() || !self.name.is_empty()
    }
}

/// An as-captured DOM interaction, before semantic interpretation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    pub kind: RawEventKind,
    /// Milliseconds since the Unix epoch (page clock)
    pub timestamp: i64,
    #[serde(default)]
    pub element: ElementSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta_y: Option<f64>,
    /// Submit affordances near the event target (Enter keydown and form submit)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nearby_submits: Vec<ElementSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl RawEvent {
    fn base(kind: RawEventKind, element: ElementSnapshot, timestamp: i64) -> Self {
        Self {
            kind,
            timestamp,
            element,
            value: None,
            key: None,
            delta_y: None,
            nearby_submits: Vec::new(),
            url: None,
        }
    }

    pub fn click(element: ElementSnapshot, timestamp: i64) -> Self {
        Self::base(RawEventKind::Click, element, timestamp)
    }

    pub fn input(element: ElementSnapshot, value: &str, timestamp: i64) -> Self {
        let mut event = Self::base(RawEventKind::Input, element, timestamp);
        event.value = Some(value.to_string());
        event
    }

    pub fn blur(element: ElementSnapshot, timestamp: i64) -> Self {
        Self::base(RawEventKind::Blur, element, timestamp)
    }

    pub fn keydown(element: ElementSnapshot, key: &str, timestamp: i64) -> Self {
        let mut event = Self::base(RawEventKind::Keydown, element, timestamp);
        event.key = Some(key.to_string());
        event
    }

    pub fn scroll(delta_y: f64, timestamp: i64) -> Self {
        let mut event = Self::base(RawEventKind::Scroll, ElementSnapshot::new("HTML"), timestamp);
        event.delta_y = Some(delta_y);
        event
    }

    pub fn submit(form: ElementSnapshot, timestamp: i64) -> Self {
        Self::base(RawEventKind::Submit, form, timestamp)
    }

    pub fn with_nearby_submits(mut self, submits: Vec<ElementSnapshot>) -> Self {
        self.nearby_submits = submits;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_capture_payload() {
        let payload = r#"{
            "kind": "click",
            "timestamp": 1700000000000,
            "element": {"tag": "BUTTON", "text": "Log in", "type": "", "inForm": true},
            "url": "https://app.test/login"
        }"#;
        let event: RawEvent = serde_json::from_str(payload).unwrap();
        assert_eq!(event.kind, RawEventKind::Click);
        assert_eq!(event.element.text, "Log in");
        assert!(event.element.in_form);
        assert!(event.element.id.is_empty());
    }

    #[test]
    fn test_element_key_uses_placeholder_for_inputs() {
        let a = ElementSnapshot::new("input").with_placeholder("Email").with_type("email");
        let b = ElementSnapshot::new("input").with_placeholder("Phone").with_type("tel");
        assert_ne!(a.element_key(), b.element_key());

        let c = ElementSnapshot::new("button").with_text("Save");
        let d = ElementSnapshot::new("button").with_text(" Save ");
        assert_eq!(c.element_key(), d.element_key());
    }

    #[test]
    fn test_meaningful_href() {
        assert_eq!(ElementSnapshot::new("a").with_href("#").meaningful_href(), None);
        assert_eq!(
            ElementSnapshot::new("a").with_href("javascript:void(0)").meaningful_href(),
            None
        );
        assert_eq!(
            ElementSnapshot::new("a").with_href("/settings").meaningful_href(),
            Some("/settings")
        );
    }
}
