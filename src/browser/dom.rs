use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use super::driver::BrowserDriver;
use crate::models::Diagnostics;

/// A candidate element in a DOM snapshot, in document order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DomElement {
    /// Document-order position within the snapshot
    pub index: usize,
    /// Unique selector valid until the next snapshot
    pub selector: String,
    /// Lower-case tag name
    pub tag: String,
    pub text: String,
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub input_type: String,
    pub href: String,
    pub placeholder: String,
    pub label: String,
    pub role: String,
    pub aria_label: String,
    pub title: String,
    pub value: String,
    pub autocomplete: String,
    pub class_name: String,
    pub visible: bool,
    pub disabled: bool,
    /// Inside a currently open menu, listbox, dialog or popover
    pub in_overlay: bool,
    /// onclick, data-action, aria-haspopup and similar attributes
    pub has_click_handler: bool,
    pub pointer_cursor: bool,
    pub content_editable: bool,
    pub tab_index: Option<i32>,
}

impl DomElement {
    pub fn new(index: usize, tag: &str) -> Self {
        Self {
            index,
            selector: format!("[data-wt-node=\"{}\"]", index),
            tag: tag.to_lowercase(),
            visible: true,
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

    pub fn with_role(mut self, role: &str) -> Self {
        self.role = role.to_string();
        self
    }

    pub fn in_overlay(mut self) -> Self {
        self.in_overlay = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn is_tag(&self, tag: &str) -> bool {
        self.tag.eq_ignore_ascii_case(tag)
    }

    /// input, textarea or select that accepts user text/choice
    pub fn is_field(&self) -> bool {
        match self.tag.as_str() {
            "textarea" | "select" => true,
            "input" => !matches!(
                self.input_type.to_lowercase().as_str(),
                "submit" | "button" | "reset" | "image" | "hidden" | "checkbox" | "radio"
            ),
            _ => self.content_editable,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomSnapshot {
    pub url: String,
    pub elements: Vec<DomElement>,
}

impl DomSnapshot {
    pub fn new(url: &str, elements: Vec<DomElement>) -> Self {
        Self {
            url: url.to_string(),
            elements,
        }
    }
}

/// Observable page state compared before and after an action
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageState {
    pub url: String,
    pub title: String,
    pub content_hash: String,
    pub interactive_count: u32,
}

impl PageState {
    pub fn changed_from(&self, before: &PageState) -> bool {
        self.url != before.url
            || self.content_hash != before.content_hash
            || self.interactive_count != before.interactive_count
    }
}

/// Collects candidate elements and tags each one with a `data-wt-node`
/// attribute so the returned selectors are unique
pub const SNAPSHOT_SCRIPT: &str = r#"// @script dom-snapshot
(() => {
    const clean = (s, max = 160) => (s || '').replace(/\s+/g, ' ').trim().slice(0, max);
    document.querySelectorAll('[data-wt-node]').forEach(el => el.removeAttribute('data-wt-node'));

    const isVisible = (el) => {
        const rect = el.getBoundingClientRect();
        if (rect.width === 0 || rect.height === 0) return false;
        const style = window.getComputedStyle(el);
        return style.display !== 'none' && style.visibility !== 'hidden' && style.opacity !== '0';
    };

    const OVERLAY = '[role="menu"], [role="listbox"], [role="dialog"], [aria-modal="true"], dialog[open], ' +
        '.dropdown-menu.show, .dropdown-menu.open, .menu.open, [data-state="open"], .popover, [role="tooltip"]';
    const inOpenOverlay = (el) => {
        const overlay = el.closest(OVERLAY);
        return !!overlay && isVisible(overlay);
    };

    const labelFor = (el) => {
        if (el.labels && el.labels.length) return clean(el.labels[0].innerText || el.labels[0].textContent);
        const by = el.getAttribute('aria-labelledby');
        if (by) {
            const text = by.split(/\s+/).map(id => document.getElementById(id)).filter(Boolean)
                .map(node => node.textContent).join(' ');
            if (clean(text)) return clean(text);
        }
        const wrap = el.closest('label');
        return wrap ? clean(wrap.innerText || wrap.textContent) : '';
    };

    const textOf = (el) => {
        const tag = el.tagName;
        if (tag === 'INPUT') {
            const type = (el.getAttribute('type') || '').toLowerCase();
            return ['submit', 'button', 'reset'].includes(type) ? clean(el.value) : '';
        }
        if (tag === 'TEXTAREA' || tag === 'SELECT') return '';
        let text = clean(el.innerText || el.textContent);
        if (!text) {
            const inner = el.querySelector('[aria-label], img[alt], [title]');
            if (inner) text = clean(inner.getAttribute('aria-label') || inner.getAttribute('alt') || inner.getAttribute('title'));
        }
        return text;
    };

    const CANDIDATES = 'a, button, input, select, textarea, label, summary, option, [role], [onclick], ' +
        '[tabindex], [data-action], [data-toggle], [aria-haspopup], [aria-expanded], [contenteditable="true"]';
    const seen = new Set();
    const candidates = [];
    document.querySelectorAll(CANDIDATES).forEach(el => { if (!seen.has(el)) { seen.add(el); candidates.push(el); } });
    document.querySelectorAll('div, span, li, img, svg, p, td').forEach(el => {
        if (seen.has(el) || candidates.length > 1500) return;
        const style = window.getComputedStyle(el);
        if (style.cursor !== 'pointer') return;
        const parent = el.parentElement;
        if (parent && window.getComputedStyle(parent).cursor === 'pointer') return;
        seen.add(el);
        candidates.push(el);
    });

    candidates.sort((a, b) => {
        if (a === b) return 0;
        return a.compareDocumentPosition(b) & Node.DOCUMENT_POSITION_FOLLOWING ? -1 : 1;
    });

    const elements = candidates.slice(0, 1500).map((el, index) => {
        el.setAttribute('data-wt-node', String(index));
        const tabIndex = el.hasAttribute('tabindex') ? el.tabIndex : null;
        return {
            index,
            selector: `[data-wt-node="${index}"]`,
            tag: el.tagName.toLowerCase(),
            text: textOf(el),
            id: el.id || '',
            name: el.getAttribute('name') || '',
            type: (el.getAttribute('type') || '').toLowerCase(),
            href: el.tagName === 'A' ? (el.getAttribute('href') || '') : '',
            placeholder: el.getAttribute('placeholder') || '',
            label: labelFor(el),
            role: (el.getAttribute('role') || '').toLowerCase(),
            ariaLabel: el.getAttribute('aria-label') || '',
            title: el.getAttribute('title') || '',
            value: ['INPUT', 'TEXTAREA', 'SELECT'].includes(el.tagName) ? String(el.value || '').slice(0, 80) : '',
            autocomplete: el.getAttribute('autocomplete') || '',
            className: typeof el.className === 'string' ? clean(el.className, 80) : '',
            visible: isVisible(el),
            disabled: el.disabled === true || el.getAttribute('aria-disabled') === 'true',
            inOverlay: inOpenOverlay(el),
            hasClickHandler: el.hasAttribute('onclick') || el.hasAttribute('data-action') ||
                el.hasAttribute('data-toggle') || el.hasAttribute('aria-haspopup') || el.hasAttribute('aria-expanded'),
            pointerCursor: window.getComputedStyle(el).cursor === 'pointer',
            contentEditable: el.isContentEditable === true,
            tabIndex
        };
    });

    return { url: location.href, elements };
})()
"#;

pub const PAGE_STATE_SCRIPT: &str = r#"// @script page-state
(() => {
    const values = Array.from(document.querySelectorAll('input, textarea, select'))
        .map(el => (el.type === 'checkbox' || el.type === 'radio') ? String(el.checked) : String(el.value || ''))
        .join('\u0001');
    const source = (document.body ? document.body.innerText : '') + '\u0002' + values;
    let hash = 5381;
    for (let i = 0; i < source.length; i++) {
        hash = ((hash << 5) + hash + source.charCodeAt(i)) | 0;
    }
    const interactive = document.querySelectorAll(
        'a[href], button, input:not([type="hidden"]), select, textarea, [role="button"], [role="link"], ' +
        '[role="menuitem"], [tabindex]:not([tabindex="-1"])'
    ).length;
    return {
        url: location.href,
        title: document.title,
        contentHash: String(hash >>> 0),
        interactiveCount: interactive
    };
})()
"#;

pub const READY_STATE_SCRIPT: &str = "// @script ready-state\ndocument.readyState";

pub const TITLE_SCRIPT: &str = "// @script title\ndocument.title";

/// Limit on the DOM excerpt kept with a failure
const DIAGNOSTIC_DOM_CHARS: usize = 20_000;

const OPEN_MENUS_TEMPLATE: &str = r#"// @script open-menus
((query) => {
    const needle = String(query).toLowerCase().replace(/\s+/g, ' ').trim();
    if (!needle) return 0;
    const toggles = document.querySelectorAll(
        '[aria-expanded="false"], details:not([open]) > summary, [aria-haspopup="true"], ' +
        '[aria-haspopup="menu"], .dropdown-toggle, [data-toggle="dropdown"]'
    );
    let opened = 0;
    for (const toggle of toggles) {
        if (opened >= 3) break;
        let content = null;
        const controls = toggle.getAttribute('aria-controls');
        if (controls) content = document.getElementById(controls);
        if (!content && toggle.tagName === 'SUMMARY') content = toggle.parentElement;
        if (!content) content = toggle.nextElementSibling;
        if (!content && toggle.parentElement) {
            content = toggle.parentElement.querySelector('[role="menu"], [role="listbox"], .dropdown-menu, ul');
        }
        if (!content) continue;
        const text = (content.textContent || '').toLowerCase().replace(/\s+/g, ' ');
        if (!text.includes(needle)) continue;
        toggle.click();
        opened += 1;
    }
    return opened;
})(__QUERY__)
"#;

const SCROLL_TEMPLATE: &str = "// @script scroll\n(() => { window.scrollBy({ top: __DELTA__, behavior: 'smooth' }); return window.scrollY; })()";

const CLEAR_FIELD_TEMPLATE: &str = r#"// @script clear-field
((selector) => {
    const el = document.querySelector(selector);
    if (!el) return false;
    if (el.isContentEditable) {
        el.textContent = '';
    } else {
        el.value = '';
    }
    el.dispatchEvent(new Event('input', { bubbles: true }));
    return true;
})(__SELECTOR__)
"#;

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Script that opens collapsed menus whose hidden content mentions `query`
pub fn open_menus_script(query: &str) -> String {
    OPEN_MENUS_TEMPLATE.replace("__QUERY__", &js_string(query))
}

pub fn scroll_script(delta_y: i64) -> String {
    SCROLL_TEMPLATE.replace("__DELTA__", &delta_y.to_string())
}

pub fn clear_field_script(selector: &str) -> String {
    CLEAR_FIELD_TEMPLATE.replace("__SELECTOR__", &js_string(selector))
}

/// Take a DOM snapshot of the current document
pub async fn capture_snapshot(driver: &dyn BrowserDriver) -> Result<DomSnapshot> {
    let value = driver.evaluate(SNAPSHOT_SCRIPT).await?;
    serde_json::from_value(value).map_err(|e| anyhow!("Failed to parse DOM snapshot: {}", e))
}

pub async fn capture_page_state(driver: &dyn BrowserDriver) -> Result<PageState> {
    let value = driver.evaluate(PAGE_STATE_SCRIPT).await?;
    serde_json::from_value(value).map_err(|e| anyhow!("Failed to parse page state: {}", e))
}

pub async fn ready_state(driver: &dyn BrowserDriver) -> Result<String> {
    let value = driver.evaluate(READY_STATE_SCRIPT).await?;
    Ok(value.as_str().unwrap_or_default().to_string())
}

/// Best-effort: a failing probe leaves its field empty
pub async fn capture_diagnostics(driver: &dyn BrowserDriver) -> Diagnostics {
    let url = driver.current_url().await.unwrap_or_default();
    let title = match driver.evaluate(TITLE_SCRIPT).await {
        Ok(value) => value.as_str().unwrap_or_default().to_string(),
        Err(e) => {
            tracing::debug!("Title probe failed: {}", e);
            String::new()
        }
    };
    let dom = match driver.content().await {
        Ok(html) => truncate_str(&html, DIAGNOSTIC_DOM_CHARS),
        Err(e) => {
            tracing::debug!("DOM probe failed: {}", e);
            String::new()
        }
    };
    Diagnostics { url, title, dom }
}

/// Safely truncate a string at character boundaries
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect::<String>() + "..."
    }
}
