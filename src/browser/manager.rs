use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, CaptureScreenshotFormat, EventFrameNavigated,
    EventScreencastFrame, ScreencastFrameAckParams, StartScreencastFormat, StartScreencastParams,
    StopScreencastParams,
};
use chromiumoxide::cdp::js_protocol::runtime::{AddBindingParams, EventBindingCalled};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::dom::clear_field_script;
use super::driver::{BoundingBox, BrowserDriver, NavigationEvent, VideoCapture};
use crate::models::Viewport;

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub viewport: Viewport,
    /// Isolated browser context (no cookies or history)
    pub incognito: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: false,
            viewport: Viewport::default(),
            incognito: true,
        }
    }
}

struct Screencast {
    dir: PathBuf,
    started: Instant,
    frames: Arc<Mutex<Vec<(PathBuf, Instant)>>>,
    task: JoinHandle<()>,
}

/// Chrome over CDP. Owns the browser process and its single page.
pub struct BrowserManager {
    browser: Arc<Mutex<Option<Browser>>>,
    page: Arc<Mutex<Option<Page>>>,
    /// Prevents concurrent launches (double Chrome instances)
    launch_lock: Mutex<()>,
    nav_tx: broadcast::Sender<NavigationEvent>,
    screencast: Mutex<Option<Screencast>>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl BrowserManager {
    pub fn new() -> Self {
        let (nav_tx, _) = broadcast::channel(64);
        Self {
            browser: Arc::new(Mutex::new(None)),
            page: Arc::new(Mutex::new(None)),
            launch_lock: Mutex::new(()),
            nav_tx,
            screencast: Mutex::new(None),
            tasks: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Launch Chrome with a blank page. Navigate with [`BrowserDriver::navigate`]
    /// once bindings and init scripts are in place.
    pub async fn launch(&self, options: &LaunchOptions) -> Result<()> {
        let _launch_guard = self.launch_lock.lock().await;

        self.close().await.ok();

        let viewport = options.viewport;
        let mut config = BrowserConfig::builder().window_size(viewport.width, viewport.height);

        if !options.headless {
            config = config.with_head();
        }

        // The --incognito flag opens two windows; the CDP context API below does not
        config = config
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-default-apps")
            .arg("--disable-extensions");

        let config = config
            .build()
            .map_err(|e| anyhow!("Failed to build browser config: {}", e))?;

        let (mut browser, mut handler) = timeout(Duration::from_secs(30), Browser::launch(config))
            .await
            .map_err(|_| {
                anyhow!("Browser launch timeout (30s) - Chrome may not be installed or is unresponsive")
            })?
            .map_err(|e| anyhow!("Failed to launch browser: {}", e))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                tracing::trace!("Browser event: {:?}", event);
            }
        });
        self.track(handler_task);

        tokio::time::sleep(Duration::from_millis(50)).await;

        let default_pages = browser
            .pages()
            .await
            .map_err(|e| anyhow!("Failed to get pages: {}", e))?;

        if options.incognito {
            tracing::info!("Creating incognito browser context via CDP");
            browser
                .start_incognito_context()
                .await
                .map_err(|e| anyhow!("Failed to start incognito context: {}", e))?;
        }

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| anyhow!("Failed to create page: {}", e))?;

        for default_page in default_pages {
            if let Err(e) = default_page.close().await {
                tracing::warn!("Failed to close default page: {}", e);
            }
        }

        let emulation_params = SetDeviceMetricsOverrideParams::builder()
            .width(viewport.width as i64)
            .height(viewport.height as i64)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(|e| anyhow!("Failed to build viewport params: {}", e))?;

        page.execute(emulation_params)
            .await
            .map_err(|e| anyhow!("Failed to set viewport: {}", e))?;

        self.spawn_navigation_listener(&page).await?;

        *self.browser.lock().await = Some(browser);
        *self.page.lock().await = Some(page);

        tracing::info!(
            "Browser launched{} ({}x{})",
            if options.incognito { " (incognito context)" } else { "" },
            viewport.width,
            viewport.height
        );
        Ok(())
    }

    /// Forward main-frame navigations to subscribers
    async fn spawn_navigation_listener(&self, page: &Page) -> Result<()> {
        let mut events = page
            .event_listener::<EventFrameNavigated>()
            .await
            .map_err(|e| anyhow!("Failed to listen for navigations: {}", e))?;
        let nav_tx = self.nav_tx.clone();

        let task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if event.frame.parent_id.is_some() {
                    continue;
                }
                tracing::debug!("Main frame navigated to {}", event.frame.url);
                let _ = nav_tx.send(NavigationEvent {
                    url: event.frame.url.clone(),
                });
            }
            tracing::debug!("Navigation event stream ended");
        });
        self.track(task);
        Ok(())
    }

    fn track(&self, task: JoinHandle<()>) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.retain(|t| !t.is_finished());
            tasks.push(task);
        }
    }

    async fn page(&self) -> Result<Page> {
        self.page
            .lock()
            .await
            .clone()
            .ok_or_else(|| anyhow!("No page available"))
    }

    pub async fn close(&self) -> Result<()> {
        if let Err(e) = self.stop_video_capture().await {
            tracing::warn!("Failed to stop screencast: {}", e);
        }

        let mut page_guard = self.page.lock().await;
        let mut browser_guard = self.browser.lock().await;

        if let Some(page) = page_guard.take() {
            let _ = page.close().await;
        }

        if let Some(mut browser) = browser_guard.take() {
            let _ = browser.close().await;
            let _ = browser.wait().await;
        }

        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }

        tracing::info!("Browser closed");
        Ok(())
    }
}

impl Default for BrowserManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserDriver for BrowserManager {
    async fn navigate(&self, url: &str) -> Result<()> {
        let page = self.page().await?;
        page.goto(url)
            .await
            .map_err(|e| anyhow!("Failed to navigate to {}: {}", url, e))?;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let page = self.page().await?;
        let result = page
            .evaluate(script)
            .await
            .map_err(|e| anyhow!("Failed to evaluate script: {}", e))?;

        // Scripts returning undefined have no value
        Ok(result.into_value().unwrap_or(serde_json::Value::Null))
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let page = self.page().await?;
        let element = page
            .find_element(selector)
            .await
            .map_err(|e| anyhow!("Failed to find element '{}': {}", selector, e))?;

        element
            .click()
            .await
            .map_err(|e| anyhow!("Failed to click element '{}': {}", selector, e))?;
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str, per_char_delay: Duration) -> Result<()> {
        let page = self.page().await?;
        let element = page
            .find_element(selector)
            .await
            .map_err(|e| anyhow!("Failed to find element '{}': {}", selector, e))?;

        element
            .click()
            .await
            .map_err(|e| anyhow!("Failed to focus element '{}': {}", selector, e))?;

        page.evaluate(clear_field_script(selector))
            .await
            .map_err(|e| anyhow!("Failed to clear element '{}': {}", selector, e))?;

        let mut buf = [0u8; 4];
        for ch in text.chars() {
            element
                .type_str(ch.encode_utf8(&mut buf))
                .await
                .map_err(|e| anyhow!("Failed to type into element '{}': {}", selector, e))?;
            if !per_char_delay.is_zero() {
                tokio::time::sleep(per_char_delay).await;
            }
        }
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        let page = self.page().await?;
        let element = match page.find_element(":focus").await {
            Ok(element) => element,
            Err(_) => page
                .find_element("body")
                .await
                .map_err(|e| anyhow!("No element to receive key '{}': {}", key, e))?,
        };

        element
            .press_key(key)
            .await
            .map_err(|e| anyhow!("Failed to press key '{}': {}", key, e))?;
        Ok(())
    }

    async fn bounding_box(&self, selector: &str) -> Result<Option<BoundingBox>> {
        let page = self.page().await?;
        let element = match page.find_element(selector).await {
            Ok(element) => element,
            Err(_) => return Ok(None),
        };

        match element.bounding_box().await {
            Ok(rect) => Ok(Some(BoundingBox {
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
            })),
            // Detached or display:none
            Err(e) => {
                tracing::debug!("No box model for '{}': {}", selector, e);
                Ok(Some(BoundingBox {
                    x: 0.0,
                    y: 0.0,
                    width: 0.0,
                    height: 0.0,
                }))
            }
        }
    }

    async fn current_url(&self) -> Result<String> {
        let page = self.page().await?;
        page.url()
            .await
            .map_err(|e| anyhow!("Failed to get URL: {}", e))?
            .ok_or_else(|| anyhow!("URL is None"))
    }

    async fn content(&self) -> Result<String> {
        let page = self.page().await?;
        page.content()
            .await
            .map_err(|e| anyhow!("Failed to get DOM content: {}", e))
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let page = self.page().await?;
        page.screenshot(
            ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .build(),
        )
        .await
        .map_err(|e| anyhow!("Failed to take screenshot: {}", e))
    }

    async fn add_init_script(&self, script: &str) -> Result<()> {
        let page = self.page().await?;
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(script))
            .await
            .map_err(|e| anyhow!("Failed to register init script: {}", e))?;
        Ok(())
    }

    async fn expose_binding(&self, name: &str) -> Result<mpsc::UnboundedReceiver<String>> {
        let page = self.page().await?;

        page.execute(AddBindingParams::new(name))
            .await
            .map_err(|e| anyhow!("Failed to add binding '{}': {}", name, e))?;

        let mut events = page
            .event_listener::<EventBindingCalled>()
            .await
            .map_err(|e| anyhow!("Failed to create event listener: {}", e))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let binding = name.to_string();
        let task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if event.name != binding {
                    continue;
                }
                if tx.send(event.payload.clone()).is_err() {
                    break;
                }
            }
            tracing::debug!("Binding '{}' stream ended", binding);
        });
        self.track(task);

        tracing::debug!("CDP binding '{}' exposed", name);
        Ok(rx)
    }

    fn subscribe_navigations(&self) -> broadcast::Receiver<NavigationEvent> {
        self.nav_tx.subscribe()
    }

    async fn start_video_capture(&self, dir: &Path) -> Result<()> {
        let mut guard = self.screencast.lock().await;
        if guard.is_some() {
            return Err(anyhow!("Screencast already running"));
        }

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| anyhow!("Failed to create frame dir {}: {}", dir.display(), e))?;

        let page = self.page().await?;
        let mut events = page
            .event_listener::<EventScreencastFrame>()
            .await
            .map_err(|e| anyhow!("Failed to listen for screencast frames: {}", e))?;

        let params = StartScreencastParams::builder()
            .format(StartScreencastFormat::Jpeg)
            .quality(80)
            .every_nth_frame(1)
            .build();
        page.execute(params)
            .await
            .map_err(|e| anyhow!("Failed to start screencast: {}", e))?;

        let frames: Arc<Mutex<Vec<(PathBuf, Instant)>>> = Arc::new(Mutex::new(Vec::new()));
        let task_frames = Arc::clone(&frames);
        let frame_dir = dir.to_path_buf();
        let task_page = page.clone();

        let task = tokio::spawn(async move {
            while let Some(frame) = events.next().await {
                let arrived = Instant::now();
                if let Err(e) = task_page
                    .execute(ScreencastFrameAckParams::new(frame.session_id))
                    .await
                {
                    tracing::debug!("Screencast ack failed: {}", e);
                }

                let encoded: &[u8] = frame.data.as_ref();
                let bytes = match base64::engine::general_purpose::STANDARD.decode(encoded) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!("Dropping undecodable screencast frame: {}", e);
                        continue;
                    }
                };

                let mut frames = task_frames.lock().await;
                let path = frame_dir.join(format!("frame_{:06}.jpg", frames.len()));
                if let Err(e) = tokio::fs::write(&path, bytes).await {
                    tracing::warn!("Failed to write frame {}: {}", path.display(), e);
                    continue;
                }
                frames.push((path, arrived));
            }
        });

        *guard = Some(Screencast {
            dir: dir.to_path_buf(),
            started: Instant::now(),
            frames,
            task,
        });
        tracing::info!("Screencast started into {}", dir.display());
        Ok(())
    }

    async fn stop_video_capture(&self) -> Result<Option<VideoCapture>> {
        let Some(screencast) = self.screencast.lock().await.take() else {
            return Ok(None);
        };

        if let Ok(page) = self.page().await {
            if let Err(e) = page.execute(StopScreencastParams::default()).await {
                tracing::warn!("Failed to stop screencast: {}", e);
            }
        }
        screencast.task.abort();

        let stopped = Instant::now();
        let frames = screencast.frames.lock().await.clone();
        let manifest = screencast.dir.join("frames.ffconcat");
        let body = super::screencast::concat_manifest(&frames, stopped);
        tokio::fs::write(&manifest, body)
            .await
            .map_err(|e| anyhow!("Failed to write frame manifest: {}", e))?;

        tracing::info!("Screencast stopped: {} frames", frames.len());
        Ok(Some(VideoCapture {
            dir: screencast.dir,
            manifest,
            frame_count: frames.len(),
            duration: stopped.duration_since(screencast.started),
        }))
    }
}
