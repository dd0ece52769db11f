//! Page instrumentation and the host-side raw event queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::browser::BrowserDriver;
use crate::error::CaptureError;
use crate::models::RawEvent;
use crate::timing::TimingScheduler;

/// Versioned capture script, injected into every document
pub const CAPTURE_SCRIPT: &str = include_str!("../browser/scripts/capture.js");
pub const CAPTURE_VERSION: u64 = 3;
/// Page-callable function the script reports through
pub const CAPTURE_BINDING: &str = "__walkthroughEmit";

pub const PROBE_SCRIPT: &str = "// @script capture-probe
(window.__walkthroughCapture && window.__walkthroughCapture.ready) ? window.__walkthroughCapture.version : null";

const VERIFY_ATTEMPTS: u32 = 2;
const FAST_POLL_CYCLES: u32 = 10;

/// Readiness of the capture script in the current document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstrumentationState {
    pub injected: bool,
    pub ready: bool,
    /// Bumped for every new document
    pub generation: u64,
    /// Readiness could not be verified; events may be missing
    pub degraded: bool,
}

pub struct EventCapture {
    queue: mpsc::UnboundedReceiver<String>,
    state: InstrumentationState,
    cycle: u32,
    timing: TimingScheduler,
    capturing: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl EventCapture {
    /// Expose the event binding and register the script for new documents.
    /// Call once per page, before the first navigation.
    pub async fn attach(
        driver: &dyn BrowserDriver,
        timing: &TimingScheduler,
        cancel: CancellationToken,
    ) -> anyhow::Result<Self> {
        let queue = driver.expose_binding(CAPTURE_BINDING).await?;
        driver.add_init_script(CAPTURE_SCRIPT).await?;
        tracing::debug!("Capture v{} attached via binding {}", CAPTURE_VERSION, CAPTURE_BINDING);

        Ok(Self {
            queue,
            state: InstrumentationState::default(),
            cycle: 0,
            timing: *timing,
            capturing: Arc::new(AtomicBool::new(true)),
            cancel,
        })
    }

    pub fn state(&self) -> &InstrumentationState {
        &self.state
    }

    /// Inject into the current document (a no-op if the init script already
    /// ran) and verify readiness, retrying once. Failure leaves capture
    /// degraded but usable.
    pub async fn instrument(&mut self, driver: &dyn BrowserDriver) -> Result<(), CaptureError> {
        let mut reason = String::from("probe returned no version");

        for attempt in 1..=VERIFY_ATTEMPTS {
            match driver.evaluate(CAPTURE_SCRIPT).await {
                Ok(_) => self.state.injected = true,
                Err(e) => reason = format!("injection failed: {}", e),
            }

            match driver.evaluate(PROBE_SCRIPT).await {
                Ok(value) if value.as_u64() == Some(CAPTURE_VERSION) => {
                    self.state.ready = true;
                    self.state.degraded = false;
                    self.cycle = 0;
                    tracing::debug!(
                        "Capture ready (generation {}, attempt {})",
                        self.state.generation,
                        attempt
                    );
                    return Ok(());
                }
                Ok(value) if !value.is_null() => {
                    reason = format!("version mismatch: expected {}, found {}", CAPTURE_VERSION, value);
                }
                Ok(_) => {}
                Err(e) => reason = format!("probe failed: {}", e),
            }

            if attempt < VERIFY_ATTEMPTS {
                tokio::time::sleep(self.timing.capture_verify_backoff()).await;
            }
        }

        self.state.ready = false;
        self.state.degraded = true;
        self.cycle = 0;
        Err(CaptureError::InitFailure {
            attempts: VERIFY_ATTEMPTS,
            reason,
        })
    }

    /// Everything queued so far, in arrival order. Malformed payloads are
    /// logged and skipped.
    pub fn drain(&mut self) -> Vec<RawEvent> {
        let mut events = Vec::new();
        while let Ok(payload) = self.queue.try_recv() {
            match serde_json::from_str::<RawEvent>(&payload) {
                Ok(event) => events.push(event),
                Err(e) => tracing::warn!("Skipping malformed capture payload ({}): {}", e, payload),
            }
        }
        events
    }

    /// Poll interval for the `cycle`-th poll after (re)instrumentation
    pub fn poll_interval(&self, cycle: u32) -> Duration {
        if cycle < FAST_POLL_CYCLES {
            self.timing.capture_fast_poll()
        } else {
            self.timing.capture_slow_poll()
        }
    }

    /// Interval before the next poll; tight right after (re)instrumentation
    pub fn next_poll_interval(&mut self) -> Duration {
        let interval = self.poll_interval(self.cycle);
        self.cycle = self.cycle.saturating_add(1);
        interval
    }

    /// A new document replaced the instrumented one. Drain the queue first.
    pub fn reset_for_new_document(&mut self) {
        self.state.injected = false;
        self.state.ready = false;
        self.state.generation += 1;
        self.cycle = 0;
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst) && !self.cancel.is_cancelled()
    }

    /// Clear the capturing flag and cancel outstanding poll work
    pub fn stop(&self) {
        self.capturing.store(false, Ordering::SeqCst);
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}
