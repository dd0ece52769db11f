//! Element resolution: pick the DOM candidate a text locator refers to.
//!
//! Scoring is a pure function of a [`DomSnapshot`] and a query, so the same
//! resolver describes elements at capture time and re-finds them at replay
//! time. [`live::resolve_live`] adds the menu-opening and late-render
//! fallbacks that need a driver.

pub mod live;
pub mod vocabulary;

use serde::{Deserialize, Serialize};

use crate::browser::{DomElement, DomSnapshot};
use crate::models::ElementSnapshot;
use vocabulary::{contains_word, field_concept, FieldConcept};

pub use live::resolve_live;

const EXACT: i32 = 10;
const PREFIX: i32 = 8;
const SUFFIX: i32 = 6;
const WORD: i32 = 4;
const SUBSTRING: i32 = 2;

const NATIVE_BUTTON_BONUS: i32 = 1;
const FIELDLIKE_ANCHOR_PENALTY: i32 = 2;
const OVERLAY_BONUS: i32 = 5;

/// Field-vocabulary matches score above any textual match
pub const FIELD_BAND: i32 = 100;

/// Minimum score accepted by [`ResolveMode::HighConfidence`]
pub const HIGH_CONFIDENCE: i32 = PREFIX;

const INTERACTIVE_TAGS: &[&str] = &[
    "a", "button", "input", "select", "textarea", "label", "details", "summary", "option",
];

const INTERACTIVE_ROLES: &[&str] = &[
    "button", "link", "checkbox", "radio", "textbox", "searchbox", "tab", "menuitem",
    "menuitemcheckbox", "menuitemradio", "option", "switch", "slider", "combobox", "listbox",
    "treeitem",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Field band or a prefix-or-better textual match only
    HighConfidence,
    /// Any positive score
    General,
}

/// What the located element will be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Intent {
    /// Clicked or submitted. Field vocabulary only steers away from anchors.
    #[default]
    Activate,
    /// Typed into. Only form controls qualify, and field vocabulary matches
    /// score in the field band.
    Fill,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTarget {
    pub selector: String,
    pub element: DomElement,
    pub score: i32,
}

/// Lower-case, `:`/`*` stripped, whitespace collapsed
pub fn normalize(value: &str) -> String {
    value
        .to_lowercase()
        .replace([':', '*'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Mirror of the capture script's interactivity predicate
pub fn is_interactive(element: &DomElement) -> bool {
    if element.is_tag("input") && element.input_type.eq_ignore_ascii_case("hidden") {
        return false;
    }
    if INTERACTIVE_TAGS.contains(&element.tag.as_str()) {
        return true;
    }
    if INTERACTIVE_ROLES.contains(&element.role.to_lowercase().as_str()) {
        return true;
    }
    if element.content_editable || element.has_click_handler {
        return true;
    }
    if element.tab_index.is_some_and(|idx| idx >= 0) {
        return true;
    }
    element.pointer_cursor
        && !(element.text.trim().is_empty()
            && element.aria_label.is_empty()
            && element.title.is_empty())
}

fn is_candidate(element: &DomElement) -> bool {
    element.visible && !element.disabled && is_interactive(element)
}

fn is_native_button(element: &DomElement) -> bool {
    match element.tag.as_str() {
        "button" => true,
        "input" => matches!(
            element.input_type.to_lowercase().as_str(),
            "submit" | "button" | "image" | "reset"
        ),
        _ => false,
    }
}

/// Match strength of one attribute value against a normalized query
pub fn match_level(value: &str, query: &str) -> i32 {
    let value = normalize(value);
    if value.is_empty() || query.is_empty() {
        return 0;
    }
    if value == query {
        EXACT
    } else if value.starts_with(query) {
        PREFIX
    } else if value.ends_with(query) {
        SUFFIX
    } else if contains_word(&value, query) {
        WORD
    } else if value.contains(query) {
        SUBSTRING
    } else {
        0
    }
}

fn text_score(element: &DomElement, query: &str) -> i32 {
    [
        &element.text,
        &element.aria_label,
        &element.label,
        &element.placeholder,
        &element.title,
        &element.name,
        &element.id,
    ]
    .iter()
    .map(|value| match_level(value, query))
    .max()
    .unwrap_or(0)
}

fn score(element: &DomElement, query: &str, field: Option<&FieldConcept>, intent: Intent) -> i32 {
    let textual = text_score(element, query);

    if intent == Intent::Fill {
        if !element.is_field() {
            return 0;
        }
        if field.is_some_and(|concept| concept.matches(element)) {
            return FIELD_BAND + textual;
        }
    }

    if textual == 0 {
        return 0;
    }

    let mut total = textual;
    if is_native_button(element) {
        total += NATIVE_BUTTON_BONUS;
    }
    if field.is_some() && element.is_tag("a") {
        total -= FIELDLIKE_ANCHOR_PENALTY;
    }
    if element.in_overlay {
        total += OVERLAY_BONUS;
    }
    total
}

/// Positive-scoring candidates, best first; ties keep document order
pub fn rank<'a>(snapshot: &'a DomSnapshot, query: &str, intent: Intent) -> Vec<(&'a DomElement, i32)> {
    let query = normalize(query);
    if query.is_empty() {
        return Vec::new();
    }
    let field = field_concept(&query);

    let mut scored: Vec<(&DomElement, i32)> = snapshot
        .elements
        .iter()
        .filter(|el| is_candidate(el))
        .map(|el| (el, score(el, &query, field, intent)))
        .filter(|(_, s)| *s > 0)
        .collect();

    scored.sort_by(|(a, sa), (b, sb)| sb.cmp(sa).then(a.index.cmp(&b.index)));
    scored
}

/// Best candidate for `query` under `mode`
pub fn resolve(
    snapshot: &DomSnapshot,
    query: &str,
    mode: ResolveMode,
    intent: Intent,
) -> Option<ResolvedTarget> {
    let (element, score) = rank(snapshot, query, intent).into_iter().next()?;
    let accepted = match mode {
        ResolveMode::General => score > 0,
        ResolveMode::HighConfidence => score >= HIGH_CONFIDENCE,
    };
    if !accepted {
        tracing::debug!("Best match for '{}' scored {} ({:?}), rejected", query, score, mode);
        return None;
    }
    Some(ResolvedTarget {
        selector: element.selector.clone(),
        element: element.clone(),
        score,
    })
}

const DESCRIBE_MAX_CHARS: usize = 80;

/// First non-empty descriptive field of a captured element, whitespace
/// collapsed
pub fn describable_text(element: &ElementSnapshot) -> Option<String> {
    [
        &element.text,
        &element.aria_label,
        &element.label,
        &element.placeholder,
        &element.title,
        &element.name,
        &element.id,
    ]
    .iter()
    .map(|value| value.split_whitespace().collect::<Vec<_>>().join(" "))
    .find(|value| !value.is_empty())
    .map(|value| crate::browser::dom::truncate_str(&value, DESCRIBE_MAX_CHARS))
}

/// Human-readable name of a captured element, from the same fields the
/// scorer matches; the tag name when it has none
pub fn describe(element: &ElementSnapshot) -> String {
    describable_text(element).unwrap_or_else(|| element.tag.to_lowercase())
}

fn is_css_ident(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        Some('-') => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Stable CSS selector for a captured element, when one exists
pub fn selector_hint(element: &ElementSnapshot) -> Option<String> {
    let tag = element.tag.to_lowercase();
    if is_css_ident(&element.id) {
        return Some(format!("#{}", element.id));
    }
    if !element.name.is_empty() && !element.name.contains('"') {
        return Some(format!("{}[name=\"{}\"]", tag, element.name));
    }
    if tag == "a" {
        if let Some(href) = element.meaningful_href() {
            if !href.contains('"') {
                return Some(format!("a[href=\"{}\"]", href));
            }
        }
    }
    None
}
