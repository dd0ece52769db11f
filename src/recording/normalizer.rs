//! Raw DOM events to canonical actions.
//!
//! The normalizer is owned by the single recording task, so its pending
//! inputs and click window need no locking. Events must be fed in arrival
//! order.

use std::collections::VecDeque;

use crate::error::NormalizeWarning;
use crate::models::{
    ActionKind, CanonicalAction, ElementSnapshot, InputKey, Locator, RawEvent, RawEventKind,
    ScrollDirection,
};
use crate::resolver::vocabulary::submit_keyword;
use crate::resolver::{describable_text, describe, normalize, selector_hint};

#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    /// Window in which a repeated click on the same element is dropped
    pub dedup_window_ms: i64,
    /// Window in which an input click following its label click is dropped
    pub label_window_ms: i64,
    /// Size of the recent-click window
    pub recent_clicks: usize,
    /// A navigation this soon after an interaction is attributed to it
    pub nav_attribution_ms: i64,
    /// Scroll runs shorter than this are dropped
    pub min_scroll_px: f64,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            dedup_window_ms: 2000,
            label_window_ms: 300,
            recent_clicks: 5,
            nav_attribution_ms: 3000,
            min_scroll_px: 40.0,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingInput {
    key: InputKey,
    element: ElementSnapshot,
    value: String,
    timestamp: i64,
}

#[derive(Debug, Clone)]
struct RecentClick {
    key: String,
    tag: String,
    text: String,
    href: Option<String>,
    has_id_or_name: bool,
    timestamp: i64,
}

impl RecentClick {
    fn of(element: &ElementSnapshot, timestamp: i64) -> Self {
        Self {
            key: element.element_key(),
            tag: element.tag.to_uppercase(),
            text: normalize(&element.text),
            href: element.meaningful_href().map(str::to_string),
            has_id_or_name: element.has_id_or_name(),
            timestamp,
        }
    }

    fn same_target(&self, other: &RecentClick) -> bool {
        if self.key == other.key {
            return true;
        }
        if let (Some(a), Some(b)) = (&self.href, &other.href) {
            if a == b {
                return true;
            }
        }
        !self.has_id_or_name
            && !other.has_id_or_name
            && !self.text.is_empty()
            && self.text == other.text
            && self.tag == other.tag
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingScroll {
    delta: f64,
    timestamp: i64,
}

pub struct ActionNormalizer {
    config: NormalizerConfig,
    /// At most one entry per key, in first-edit order
    pending: Vec<PendingInput>,
    recent: VecDeque<RecentClick>,
    last_click: Option<(ElementSnapshot, i64)>,
    scroll: Option<PendingScroll>,
    last_interaction: Option<i64>,
    /// Last emitted submit or Enter press
    last_submit: Option<i64>,
    last_goto: Option<i64>,
    warnings: Vec<NormalizeWarning>,
}

impl Default for ActionNormalizer {
    fn default() -> Self {
        Self::new(NormalizerConfig::default())
    }
}

fn is_text_field(element: &ElementSnapshot) -> bool {
    if element.is_tag("TEXTAREA") {
        return true;
    }
    element.is_tag("INPUT")
        && !matches!(
            element.input_type.to_lowercase().as_str(),
            "submit" | "button" | "reset" | "image" | "checkbox" | "radio" | "hidden" | "file"
        )
}

/// Submit iff an explicit `type=submit`, or a typeless BUTTON inside a form.
/// Anchors with an href never submit.
pub fn is_submit_click(element: &ElementSnapshot) -> bool {
    if element.is_tag("A") && !element.href.trim().is_empty() {
        return false;
    }
    let input_type = element.input_type.trim().to_lowercase();
    if input_type == "submit" {
        return true;
    }
    element.is_tag("BUTTON") && input_type.is_empty() && element.in_form
}

fn labels_input(label: &ElementSnapshot, input: &ElementSnapshot) -> bool {
    if !label.html_for.is_empty() && (label.html_for == input.id || label.html_for == input.name) {
        return true;
    }
    let text = normalize(&label.text);
    !text.is_empty()
        && [&input.label, &input.name, &input.id]
            .iter()
            .any(|value| normalize(value) == text)
}

fn element_locator(element: &ElementSnapshot) -> Locator {
    Locator::new(describable_text(element), selector_hint(element))
}

/// Replay anchor of a typed field: label, else placeholder, else name/id
fn field_anchor(element: &ElementSnapshot) -> Option<String> {
    [&element.label, &element.placeholder, &element.name, &element.id]
        .iter()
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

fn is_blank_page(url: &str) -> bool {
    url.is_empty() || url == "about:blank"
}

impl ActionNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self {
            config,
            pending: Vec::new(),
            recent: VecDeque::new(),
            last_click: None,
            scroll: None,
            last_interaction: None,
            last_submit: None,
            last_goto: None,
            warnings: Vec::new(),
        }
    }

    /// First action of a recording: the start page, unless it is blank
    pub fn record_start(&mut self, url: &str, timestamp: i64) -> Vec<CanonicalAction> {
        let mut out = Vec::new();
        if !is_blank_page(url) {
            self.emit(&mut out, CanonicalAction::go_to(url, timestamp));
        }
        out
    }

    pub fn handle(&mut self, event: &RawEvent) -> Vec<CanonicalAction> {
        let mut out = Vec::new();
        if event.kind != RawEventKind::Scroll {
            self.flush_scroll(&mut out);
        }

        match event.kind {
            RawEventKind::Click => self.on_click(&event.element, event.timestamp, &mut out),
            RawEventKind::Input => self.on_input(event),
            RawEventKind::Blur => {
                let key = event.element.input_key();
                if self.has_pending(&key) {
                    self.finalize_into(&key, &mut out);
                }
            }
            RawEventKind::Keydown => self.on_keydown(event, &mut out),
            RawEventKind::Scroll => self.on_scroll(event, &mut out),
            RawEventKind::Submit => self.on_form_submit(event, &mut out),
        }
        out
    }

    /// A main-frame navigation. Pending input is finalized first; navigations
    /// no recent interaction explains become `go_to` actions.
    pub fn on_navigation(&mut self, url: &str, timestamp: i64) -> Vec<CanonicalAction> {
        let mut out = Vec::new();
        self.flush_scroll(&mut out);
        self.finalize_all(&mut out);

        if is_blank_page(url) {
            return out;
        }

        let attributed = self
            .last_interaction
            .is_some_and(|at| timestamp - at < self.config.nav_attribution_ms);
        if attributed {
            tracing::debug!("Navigation to {} follows a recorded action", url);
        } else if self
            .last_goto
            .is_some_and(|at| timestamp - at < self.config.nav_attribution_ms)
        {
            tracing::debug!("Navigation to {} continues a go_to (redirect)", url);
        } else {
            self.emit(&mut out, CanonicalAction::go_to(url, timestamp));
        }
        out
    }

    /// Finalize one field. Emits nothing (and records a warning) when the
    /// field has no accumulated input.
    pub fn finalize_key(&mut self, key: &InputKey) -> Vec<CanonicalAction> {
        let mut out = Vec::new();
        self.finalize_into(key, &mut out);
        out
    }

    /// End of recording: flush everything still pending
    pub fn finish(&mut self) -> Vec<CanonicalAction> {
        let mut out = Vec::new();
        self.flush_scroll(&mut out);
        self.finalize_all(&mut out);
        out
    }

    pub fn warnings(&self) -> &[NormalizeWarning] {
        &self.warnings
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn emit(&mut self, out: &mut Vec<CanonicalAction>, action: CanonicalAction) {
        if action.kind.is_interaction() {
            self.last_interaction = Some(action.timestamp);
        }
        if matches!(action.kind, ActionKind::Submit | ActionKind::Press) {
            self.last_submit = Some(action.timestamp);
        }
        if action.kind == ActionKind::GoTo {
            self.last_goto = Some(action.timestamp);
        }
        tracing::debug!("Action: {}", action.description);
        out.push(action);
    }

    fn remember_click(&mut self, element: &ElementSnapshot, timestamp: i64) {
        self.recent.push_back(RecentClick::of(element, timestamp));
        while self.recent.len() > self.config.recent_clicks {
            self.recent.pop_front();
        }
    }

    fn is_duplicate_click(&self, element: &ElementSnapshot, timestamp: i64) -> bool {
        let candidate = RecentClick::of(element, timestamp);
        self.recent.iter().any(|recent| {
            timestamp - recent.timestamp < self.config.dedup_window_ms && recent.same_target(&candidate)
        })
    }

    fn on_click(&mut self, element: &ElementSnapshot, timestamp: i64, out: &mut Vec<CanonicalAction>) {
        if let Some((previous, at)) = &self.last_click {
            if previous.is_tag("LABEL")
                && element.is_tag("INPUT")
                && timestamp - at < self.config.label_window_ms
                && labels_input(previous, element)
            {
                tracing::debug!("Dropping input click that follows its label click");
                return;
            }
        }

        if self.is_duplicate_click(element, timestamp) {
            tracing::debug!("Dropping duplicate click on {}", element.element_key());
            return;
        }

        if is_submit_click(element) {
            self.finalize_all(out);
            let description = format!("Submit '{}'", describe(element));
            self.emit(out, CanonicalAction::submit(element_locator(element), description, timestamp));
        } else {
            let own_key = is_text_field(element).then(|| element.input_key());
            self.finalize_others(own_key.as_ref(), out);
            let description = format!("Click '{}'", describe(element));
            self.emit(out, CanonicalAction::click(element_locator(element), description, timestamp));
        }

        self.remember_click(element, timestamp);
        self.last_click = Some((element.clone(), timestamp));
    }

    fn on_input(&mut self, event: &RawEvent) {
        let key = event.element.input_key();
        let value = event.value.clone().unwrap_or_default();
        match self.pending.iter_mut().find(|p| p.key == key) {
            Some(pending) => {
                pending.value = value;
                pending.element = event.element.clone();
                pending.timestamp = event.timestamp;
            }
            None => self.pending.push(PendingInput {
                key,
                element: event.element.clone(),
                value,
                timestamp: event.timestamp,
            }),
        }
    }

    fn on_keydown(&mut self, event: &RawEvent, out: &mut Vec<CanonicalAction>) {
        let element = &event.element;
        match event.key.as_deref() {
            Some("Enter") => {
                if element.is_tag("TEXTAREA") {
                    return;
                }
                if element.is_tag("BUTTON") || element.is_tag("A") || element.role.eq_ignore_ascii_case("button") {
                    // The browser turns this into a click event
                    return;
                }
                if is_text_field(element) {
                    self.finalize_into(&element.input_key(), out);
                }

                let target = event
                    .nearby_submits
                    .iter()
                    .find(|candidate| submit_keyword(&describe(candidate)).is_some());
                match target {
                    Some(candidate) => {
                        let description = format!("Submit '{}'", describe(candidate));
                        self.emit(
                            out,
                            CanonicalAction::submit(element_locator(candidate), description, event.timestamp),
                        );
                        // Implicit submission clicks this control next
                        self.remember_click(candidate, event.timestamp);
                    }
                    None => self.emit(out, CanonicalAction::press("Enter", event.timestamp)),
                }
            }
            Some("Tab") => {
                if is_text_field(element) {
                    self.finalize_into(&element.input_key(), out);
                }
            }
            Some("Escape") => {
                if !self.pending.is_empty() {
                    tracing::debug!("Escape discards {} pending input(s)", self.pending.len());
                }
                self.pending.clear();
            }
            _ => {}
        }
    }

    fn on_form_submit(&mut self, event: &RawEvent, out: &mut Vec<CanonicalAction>) {
        self.finalize_all(out);

        let recent = self
            .last_submit
            .is_some_and(|at| event.timestamp - at < self.config.dedup_window_ms);
        if recent {
            tracing::debug!("Form submit already recorded");
            return;
        }

        let control = event
            .nearby_submits
            .iter()
            .find(|candidate| submit_keyword(&describe(candidate)).is_some())
            .or_else(|| event.nearby_submits.first());
        match control {
            Some(candidate) => {
                let description = format!("Submit '{}'", describe(candidate));
                self.emit(
                    out,
                    CanonicalAction::submit(element_locator(candidate), description, event.timestamp),
                );
                self.remember_click(candidate, event.timestamp);
            }
            None => self.emit(out, CanonicalAction::press("Enter", event.timestamp)),
        }
    }

    fn on_scroll(&mut self, event: &RawEvent, out: &mut Vec<CanonicalAction>) {
        let delta = event.delta_y.unwrap_or(0.0);
        if delta == 0.0 || !delta.is_finite() {
            return;
        }
        if let Some(run) = &mut self.scroll {
            if run.delta.signum() == delta.signum() {
                run.delta += delta;
                return;
            }
            // Direction changed: the earlier run is complete
            self.flush_scroll(out);
        }
        self.scroll = Some(PendingScroll {
            delta,
            timestamp: event.timestamp,
        });
    }

    fn flush_scroll(&mut self, out: &mut Vec<CanonicalAction>) {
        let Some(run) = self.scroll.take() else {
            return;
        };
        if run.delta.abs() < self.config.min_scroll_px {
            return;
        }
        let direction = if run.delta < 0.0 {
            ScrollDirection::Up
        } else {
            ScrollDirection::Down
        };
        let amount = run.delta.abs().round() as u32;
        self.emit(out, CanonicalAction::scroll(direction, amount, run.timestamp));
    }

    fn has_pending(&self, key: &InputKey) -> bool {
        self.pending.iter().any(|p| &p.key == key)
    }

    fn finalize_into(&mut self, key: &InputKey, out: &mut Vec<CanonicalAction>) {
        match self.pending.iter().position(|p| &p.key == key) {
            Some(pos) => {
                let pending = self.pending.remove(pos);
                self.emit_type(pending, out);
            }
            None => {
                let warning = NormalizeWarning::FinalizeWithoutPending {
                    key: key.to_string(),
                };
                tracing::warn!("{}", warning);
                self.warnings.push(warning);
            }
        }
    }

    fn finalize_others(&mut self, keep: Option<&InputKey>, out: &mut Vec<CanonicalAction>) {
        let (kept, finalized): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|p| Some(&p.key) == keep);
        self.pending = kept;
        for pending in finalized {
            self.emit_type(pending, out);
        }
    }

    fn finalize_all(&mut self, out: &mut Vec<CanonicalAction>) {
        self.finalize_others(None, out);
    }

    fn emit_type(&mut self, pending: PendingInput, out: &mut Vec<CanonicalAction>) {
        let anchor = field_anchor(&pending.element);
        let description = match &anchor {
            Some(anchor) => format!("Type into '{}'", anchor),
            None => format!("Type into {}", pending.element.tag.to_lowercase()),
        };
        let locator = Locator::new(anchor, selector_hint(&pending.element));
        self.emit(
            out,
            CanonicalAction::type_text(locator, pending.value, description, pending.timestamp),
        );
    }
}
