use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn is_visible(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// Main-frame navigation signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationEvent {
    pub url: String,
}

/// Raw screencast written to disk
#[derive(Debug, Clone, PartialEq)]
pub struct VideoCapture {
    pub dir: PathBuf,
    /// ffconcat manifest listing frames and their display durations
    pub manifest: PathBuf,
    pub frame_count: usize,
    pub duration: Duration,
}

/// The browser-automation collaborator. Calls are not reentrant: one
/// logical session drives one page.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Evaluate a script in the page and return its JSON value
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    async fn click(&self, selector: &str) -> Result<()>;

    /// Focus, clear and type into an element, pausing `per_char_delay`
    /// between characters
    async fn type_text(&self, selector: &str, text: &str, per_char_delay: Duration) -> Result<()>;

    /// Press a key on the focused element
    async fn press_key(&self, key: &str) -> Result<()>;

    /// `None` when no element matches
    async fn bounding_box(&self, selector: &str) -> Result<Option<BoundingBox>>;

    async fn current_url(&self) -> Result<String>;

    /// Serialized HTML of the document
    async fn content(&self) -> Result<String>;

    /// PNG bytes of the viewport
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Register a script evaluated on every new document
    async fn add_init_script(&self, script: &str) -> Result<()>;

    /// Expose a page-callable function; every call's payload lands in the
    /// returned host-side queue in arrival order
    async fn expose_binding(&self, name: &str) -> Result<mpsc::UnboundedReceiver<String>>;

    fn subscribe_navigations(&self) -> broadcast::Receiver<NavigationEvent>;

    async fn start_video_capture(&self, dir: &Path) -> Result<()>;

    /// Stops the screencast; `None` when none was running
    async fn stop_video_capture(&self) -> Result<Option<VideoCapture>>;
}
