use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::capture::EventCapture;
use super::normalizer::{ActionNormalizer, NormalizerConfig};
use crate::browser::BrowserDriver;
use crate::context::SessionContext;
use crate::error::NormalizeWarning;
use crate::models::{CanonicalAction, RecordingSession};
use crate::scenario::{Scenario, Step};

/// Outcome of a finished recording
#[derive(Debug, Clone)]
pub struct Recording {
    pub session: RecordingSession,
    pub actions: Vec<CanonicalAction>,
    pub warnings: Vec<NormalizeWarning>,
}

impl Recording {
    pub fn into_scenario(self, name: &str) -> Scenario {
        let mut scenario = Scenario::new(name);
        scenario.description = Some(format!(
            "Recorded from {} on {}",
            self.session.start_url,
            Utc::now().format("%Y-%m-%d %H:%M")
        ));
        scenario.steps = self.actions.iter().map(Step::from).collect();
        scenario
    }
}

/// Records user interactions on one page until cancelled.
///
/// A single task owns the capture queue and the normalizer; polling,
/// navigation signals and cancellation are multiplexed in one loop.
pub struct Recorder {
    context: SessionContext,
    config: NormalizerConfig,
    session: Arc<Mutex<RecordingSession>>,
    action_sender: broadcast::Sender<CanonicalAction>,
    cancel: CancellationToken,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

impl Recorder {
    pub fn new(context: SessionContext, start_url: &str) -> Self {
        Self::with_config(context, start_url, NormalizerConfig::default())
    }

    pub fn with_config(context: SessionContext, start_url: &str, config: NormalizerConfig) -> Self {
        let (action_tx, _) = broadcast::channel(256);
        Self {
            context,
            config,
            session: Arc::new(Mutex::new(RecordingSession::new(start_url.to_string()))),
            action_sender: action_tx,
            cancel: CancellationToken::new(),
        }
    }

    /// Receive every action as it is emitted
    pub fn subscribe_actions(&self) -> broadcast::Receiver<CanonicalAction> {
        self.action_sender.subscribe()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Ask the running loop to flush and finish
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub async fn session(&self) -> RecordingSession {
        self.session.lock().await.clone()
    }

    /// Open the start URL and record until [`Recorder::stop`] is called.
    pub async fn run(&self) -> Result<Recording> {
        let driver = self.context.driver();
        let start_url = {
            let mut session = self.session.lock().await;
            session.start();
            session.start_url.clone()
        };

        let mut capture =
            EventCapture::attach(driver, self.context.timing(), self.cancel.child_token()).await?;
        let mut nav_rx = driver.subscribe_navigations();
        let mut normalizer = ActionNormalizer::new(self.config.clone());
        let mut actions = Vec::new();

        let opening = normalizer.record_start(&start_url, now_ms());
        self.publish(&mut actions, opening);

        if let Err(e) = driver.navigate(&start_url).await {
            self.session.lock().await.fail(e.to_string());
            return Err(e);
        }
        self.instrument(&mut capture, driver).await;

        let session_id = self.session.lock().await.id.clone();
        tracing::info!("Recording {} started on {}", session_id, start_url);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                signal = nav_rx.recv() => {
                    let url = match signal {
                        Ok(event) => event.url,
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!("Missed {} navigation signal(s)", skipped);
                            driver.current_url().await.unwrap_or_default()
                        }
                        Err(RecvError::Closed) => {
                            tracing::warn!("Navigation signals closed; stopping recording");
                            break;
                        }
                    };
                    self.on_navigation(&mut capture, &mut normalizer, &mut actions, &url).await;
                }
                _ = tokio::time::sleep(capture.next_poll_interval()) => {
                    for event in capture.drain() {
                        let emitted = normalizer.handle(&event);
                        self.publish(&mut actions, emitted);
                    }
                }
            }

            if !capture.is_capturing() {
                break;
            }
        }

        capture.stop();
        for event in capture.drain() {
            let emitted = normalizer.handle(&event);
            self.publish(&mut actions, emitted);
        }
        let remaining = normalizer.finish();
        self.publish(&mut actions, remaining);

        let session = {
            let mut session = self.session.lock().await;
            session.action_count = actions.len();
            session.complete();
            session.clone()
        };
        tracing::info!(
            "Recording {} stopped: {} actions, {} warnings",
            session.id,
            actions.len(),
            normalizer.warnings().len()
        );

        Ok(Recording {
            session,
            actions,
            warnings: normalizer.warnings().to_vec(),
        })
    }

    /// Queued events belong to the old document: normalize them before the
    /// navigation, then re-instrument.
    async fn on_navigation(
        &self,
        capture: &mut EventCapture,
        normalizer: &mut ActionNormalizer,
        actions: &mut Vec<CanonicalAction>,
        url: &str,
    ) {
        for event in capture.drain() {
            let emitted = normalizer.handle(&event);
            self.publish(actions, emitted);
        }
        let emitted = normalizer.on_navigation(url, now_ms());
        self.publish(actions, emitted);

        capture.reset_for_new_document();
        self.instrument(capture, self.context.driver()).await;
    }

    async fn instrument(&self, capture: &mut EventCapture, driver: &dyn BrowserDriver) {
        if let Err(e) = capture.instrument(driver).await {
            tracing::warn!("Recording continues degraded: {}", e);
            self.session.lock().await.degraded = true;
        }
    }

    fn publish(&self, actions: &mut Vec<CanonicalAction>, emitted: Vec<CanonicalAction>) {
        for action in emitted {
            // No subscribers is fine
            let _ = self.action_sender.send(action.clone());
            actions.push(action);
        }
    }
}
