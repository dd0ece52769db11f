//! Scripted in-memory driver used by unit tests in place of Chrome.
//!
//! Pages are lists of [`DomElement`]s keyed by URL. Scripts are dispatched
//! on their `// @script <name>` marker line.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

use super::dom::{DomElement, DomSnapshot};
use super::driver::{BoundingBox, BrowserDriver, NavigationEvent, VideoCapture};

/// What happens when an element is clicked (or a key is pressed)
#[derive(Debug, Clone)]
pub enum ClickEffect {
    /// New document, immediately
    Navigate(String),
    /// New document after a delay
    NavigateAfter(String, Duration),
    /// Old document reports `loading` until the new one arrives
    LoadingThenNavigate(String, Duration),
    /// URL changes without a new document
    PushState(String),
    /// In-page content change
    Mutate,
    /// Append elements to the current document
    Reveal(Vec<DomElement>),
    /// Nothing observable
    Nothing,
}

#[derive(Debug, Clone)]
pub struct FakePage {
    pub url: String,
    pub title: String,
    pub elements: Vec<DomElement>,
    ready_state: String,
    effects: HashMap<String, ClickEffect>,
    key_effects: HashMap<String, ClickEffect>,
    /// Elements revealed by the open-menus probe when its query matches
    menus: Vec<(String, Vec<DomElement>)>,
}

impl FakePage {
    pub fn new(url: &str, title: &str) -> Self {
        Self {
            url: url.to_string(),
            title: title.to_string(),
            elements: Vec::new(),
            ready_state: "complete".to_string(),
            effects: HashMap::new(),
            key_effects: HashMap::new(),
            menus: Vec::new(),
        }
    }

    pub fn element(mut self, element: DomElement) -> Self {
        self.elements.push(element);
        self
    }

    pub fn on_click(mut self, index: usize, effect: ClickEffect) -> Self {
        self.effects.insert(node_selector(index), effect);
        self
    }

    /// Effect keyed by an arbitrary selector string
    pub fn on_click_selector(mut self, selector: &str, effect: ClickEffect) -> Self {
        self.effects.insert(selector.to_string(), effect);
        self
    }

    pub fn on_key(mut self, key: &str, effect: ClickEffect) -> Self {
        self.key_effects.insert(key.to_string(), effect);
        self
    }

    pub fn menu(mut self, query: &str, revealed: Vec<DomElement>) -> Self {
        self.menus.push((query.to_lowercase(), revealed));
        self
    }

    pub fn ready_state(mut self, state: &str) -> Self {
        self.ready_state = state.to_string();
        self
    }

    fn find(&self, selector: &str) -> Option<&DomElement> {
        self.elements.iter().find(|el| {
            el.selector == selector
                || (!el.id.is_empty() && selector == format!("#{}", el.id))
                || (!el.name.is_empty() && selector == format!("{}[name=\"{}\"]", el.tag, el.name))
        })
    }
}

pub fn node_selector(index: usize) -> String {
    format!("[data-wt-node=\"{}\"]", index)
}

#[derive(Debug, Default)]
struct FakeState {
    pages: HashMap<String, FakePage>,
    current: String,
    /// Document generation, bumped on each new document
    generation: u64,
    mutations: u64,
    values: HashMap<String, String>,
    init_scripts: Vec<String>,
    capture_version: Option<u64>,
    capture_broken: bool,
    binding: Option<mpsc::UnboundedSender<String>>,
    calls: Vec<String>,
    video_dir: Option<PathBuf>,
    fail_clicks: bool,
}

impl FakeState {
    fn page(&self) -> Option<&FakePage> {
        self.pages.get(&self.current)
    }

    fn page_mut(&mut self) -> Option<&mut FakePage> {
        self.pages.get_mut(&self.current)
    }

    fn load(&mut self, url: &str) {
        if !self.pages.contains_key(url) {
            self.pages.insert(url.to_string(), FakePage::new(url, ""));
        }
        self.current = url.to_string();
        self.generation += 1;
        self.values.clear();
        self.capture_version = None;
        let reinject = self
            .init_scripts
            .iter()
            .any(|script| script.starts_with("// @script capture"));
        if reinject && !self.capture_broken {
            self.capture_version = Some(3);
        }
    }
}

/// In-memory [`BrowserDriver`]
#[derive(Clone)]
pub struct FakeDriver {
    state: Arc<Mutex<FakeState>>,
    nav_tx: broadcast::Sender<NavigationEvent>,
}

impl FakeDriver {
    pub fn new() -> Self {
        let (nav_tx, _) = broadcast::channel(64);
        Self {
            state: Arc::new(Mutex::new(FakeState::default())),
            nav_tx,
        }
    }

    /// Driver already showing `page`
    pub fn with_page(page: FakePage) -> Self {
        let driver = Self::new();
        let url = page.url.clone();
        driver.add_page(page);
        driver.lock().load(&url);
        driver
    }

    pub fn add_page(&self, page: FakePage) {
        self.lock().pages.insert(page.url.clone(), page);
    }

    /// Capture script never reports ready
    pub fn break_capture(&self) {
        self.lock().capture_broken = true;
    }

    pub fn fail_clicks(&self) {
        self.lock().fail_clicks = true;
    }

    /// Deliver a payload through the exposed binding, as the page script would
    pub fn emit(&self, payload: &str) {
        if let Some(tx) = &self.lock().binding {
            let _ = tx.send(payload.to_string());
        }
    }

    pub fn emit_json(&self, value: serde_json::Value) {
        self.emit(&value.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn value_of(&self, selector: &str) -> Option<String> {
        self.lock().values.get(selector).cloned()
    }

    pub fn url(&self) -> String {
        self.lock().current.clone()
    }

    /// Simulate a navigation the user started outside any recorded action
    pub fn user_navigates(&self, url: &str) {
        self.navigate_now(url);
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        // Tests never panic while holding the lock
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn navigate_now(&self, url: &str) {
        self.lock().load(url);
        let _ = self.nav_tx.send(NavigationEvent { url: url.to_string() });
    }

    fn apply(&self, effect: ClickEffect) {
        match effect {
            ClickEffect::Navigate(url) => self.navigate_now(&url),
            ClickEffect::NavigateAfter(url, delay) => {
                let driver = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    driver.navigate_now(&url);
                });
            }
            ClickEffect::LoadingThenNavigate(url, delay) => {
                if let Some(page) = self.lock().page_mut() {
                    page.ready_state = "loading".to_string();
                }
                let driver = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    driver.navigate_now(&url);
                });
            }
            ClickEffect::PushState(url) => {
                let mut state = self.lock();
                if let Some(mut page) = state.page().cloned() {
                    page.url = url.clone();
                    state.pages.insert(url.clone(), page);
                }
                state.current = url;
            }
            ClickEffect::Mutate => self.lock().mutations += 1,
            ClickEffect::Reveal(elements) => {
                let mut state = self.lock();
                state.mutations += 1;
                if let Some(page) = state.page_mut() {
                    page.elements.extend(elements);
                }
            }
            ClickEffect::Nothing => {}
        }
    }

    fn page_state(&self) -> serde_json::Value {
        let state = self.lock();
        let mut values: Vec<_> = state.values.iter().collect();
        values.sort();
        let hash = format!("{}:{}:{:?}", state.generation, state.mutations, values);
        let (title, count) = state
            .page()
            .map(|p| (p.title.clone(), p.elements.iter().filter(|e| e.visible).count()))
            .unwrap_or_default();
        serde_json::json!({
            "url": state.current,
            "title": title,
            "contentHash": hash,
            "interactiveCount": count,
        })
    }

    fn open_menus(&self, script: &str) -> serde_json::Value {
        let query = script
            .rsplit_once("})(")
            .map(|(_, arg)| arg.trim().trim_end_matches(')'))
            .and_then(|arg| serde_json::from_str::<String>(arg).ok())
            .unwrap_or_default()
            .to_lowercase();

        let mut state = self.lock();
        let Some(page) = state.page_mut() else {
            return serde_json::json!(0);
        };
        let mut opened = 0;
        let menus = std::mem::take(&mut page.menus);
        for (trigger, revealed) in menus {
            if (!query.is_empty() && trigger.contains(&query)) || revealed_matches(&revealed, &query) {
                page.elements.extend(revealed);
                opened += 1;
            } else {
                page.menus.push((trigger, revealed));
            }
        }
        if opened > 0 {
            state.mutations += 1;
        }
        serde_json::json!(opened)
    }
}

fn revealed_matches(elements: &[DomElement], query: &str) -> bool {
    !query.is_empty()
        && elements
            .iter()
            .any(|el| el.text.to_lowercase().contains(query))
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.lock().calls.push(format!("navigate {}", url));
        self.navigate_now(url);
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let marker = script
            .lines()
            .next()
            .and_then(|line| line.strip_prefix("// @script "))
            .unwrap_or("")
            .trim()
            .to_string();

        match marker.as_str() {
            "dom-snapshot" => {
                let state = self.lock();
                let elements = state.page().map(|p| p.elements.clone()).unwrap_or_default();
                Ok(serde_json::to_value(DomSnapshot::new(&state.current, elements))?)
            }
            "page-state" => Ok(self.page_state()),
            "ready-state" => Ok(serde_json::json!(self
                .lock()
                .page()
                .map(|p| p.ready_state.clone())
                .unwrap_or_else(|| "complete".to_string()))),
            "title" => Ok(serde_json::json!(self
                .lock()
                .page()
                .map(|p| p.title.clone())
                .unwrap_or_default())),
            "open-menus" => Ok(self.open_menus(script)),
            "scroll" => {
                self.lock().calls.push("scroll".to_string());
                Ok(serde_json::json!(0))
            }
            "clear-field" => Ok(serde_json::json!(true)),
            "capture-probe" => Ok(self
                .lock()
                .capture_version
                .map(|v| serde_json::json!(v))
                .unwrap_or(serde_json::Value::Null)),
            m if m.starts_with("capture") => {
                let mut state = self.lock();
                if state.capture_broken {
                    return Ok(serde_json::Value::Null);
                }
                state.capture_version = Some(3);
                Ok(serde_json::json!(3))
            }
            _ => Ok(serde_json::Value::Null),
        }
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let effect = {
            let mut state = self.lock();
            state.calls.push(format!("click {}", selector));
            if state.fail_clicks {
                return Err(anyhow!("Target closed"));
            }
            let page = state.page().ok_or_else(|| anyhow!("No page available"))?;
            page.find(selector)
                .ok_or_else(|| anyhow!("Failed to find element '{}'", selector))?;
            page.effects.get(selector).cloned()
        };
        if let Some(effect) = effect {
            self.apply(effect);
        }
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str, per_char_delay: Duration) -> Result<()> {
        {
            let mut state = self.lock();
            state.calls.push(format!("type {} {}", selector, text));
            let page = state.page().ok_or_else(|| anyhow!("No page available"))?;
            page.find(selector)
                .ok_or_else(|| anyhow!("Failed to find element '{}'", selector))?;
        }
        if !per_char_delay.is_zero() {
            tokio::time::sleep(per_char_delay * text.chars().count() as u32).await;
        }
        self.lock().values.insert(selector.to_string(), text.to_string());
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        let effect = {
            let mut state = self.lock();
            state.calls.push(format!("press {}", key));
            state.page().and_then(|p| p.key_effects.get(key).cloned())
        };
        if let Some(effect) = effect {
            self.apply(effect);
        }
        Ok(())
    }

    async fn bounding_box(&self, selector: &str) -> Result<Option<BoundingBox>> {
        let state = self.lock();
        Ok(state.page().and_then(|p| p.find(selector)).map(|el| {
            let size = if el.visible { 20.0 } else { 0.0 };
            BoundingBox {
                x: 0.0,
                y: el.index as f64 * 24.0,
                width: size * 5.0,
                height: size,
            }
        }))
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.lock().current.clone())
    }

    async fn content(&self) -> Result<String> {
        let state = self.lock();
        let body: String = state
            .page()
            .map(|p| {
                p.elements
                    .iter()
                    .map(|el| format!("<{0}>{1}</{0}>", el.tag, el.text))
                    .collect()
            })
            .unwrap_or_default();
        Ok(format!("<html><body>{}</body></html>", body))
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.lock().calls.push("screenshot".to_string());
        Ok(b"\x89PNG\r\n\x1a\n".to_vec())
    }

    async fn add_init_script(&self, script: &str) -> Result<()> {
        self.lock().init_scripts.push(script.to_string());
        Ok(())
    }

    async fn expose_binding(&self, _name: &str) -> Result<mpsc::UnboundedReceiver<String>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().binding = Some(tx);
        Ok(rx)
    }

    fn subscribe_navigations(&self) -> broadcast::Receiver<NavigationEvent> {
        self.nav_tx.subscribe()
    }

    async fn start_video_capture(&self, dir: &Path) -> Result<()> {
        self.lock().video_dir = Some(dir.to_path_buf());
        Ok(())
    }

    async fn stop_video_capture(&self) -> Result<Option<VideoCapture>> {
        Ok(self.lock().video_dir.take().map(|dir| VideoCapture {
            manifest: dir.join("frames.ffconcat"),
            dir,
            frame_count: 0,
            duration: Duration::ZERO,
        }))
    }
}
