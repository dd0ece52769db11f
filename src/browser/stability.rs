//! Navigation detection and readiness waits around a page action.
//!
//! Arm a [`NavigationWatch`] *before* the action so a fast navigation is not
//! missed, then [`StabilityWaiter::settle`] after it. Every wait is bounded by
//! the scheduler's safety timeout.

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{sleep, sleep_until, timeout_at, Duration, Instant};

use super::dom::ready_state;
use super::driver::{BrowserDriver, NavigationEvent};
use crate::timing::TimingScheduler;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// The action led to a new document. `ready` is false when DOM-ready
    /// was not observed before the safety timeout.
    Navigated { url: String, ready: bool },
    NoNavigation,
    /// A document was still loading on the old URL when the safety timeout
    /// elapsed. Treated as no navigation.
    TimedOut,
}

impl NavigationOutcome {
    pub fn navigated(&self) -> bool {
        matches!(self, NavigationOutcome::Navigated { .. })
    }
}

/// Captured before an action
pub struct NavigationWatch {
    url_before: String,
    rx: broadcast::Receiver<NavigationEvent>,
}

impl NavigationWatch {
    pub fn url_before(&self) -> &str {
        &self.url_before
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StabilityWaiter {
    primary: Duration,
    safety: Duration,
    poll: Duration,
    ready_poll: Duration,
    in_page_settle: Duration,
}

impl StabilityWaiter {
    pub fn new(timing: &TimingScheduler) -> Self {
        Self {
            primary: timing.nav_primary_timeout(),
            safety: timing.nav_safety_timeout(),
            poll: timing.nav_poll_interval(),
            ready_poll: timing.dom_ready_poll(),
            in_page_settle: timing.in_page_settle(),
        }
    }

    pub fn safety_timeout(&self) -> Duration {
        self.safety
    }

    pub async fn arm(&self, driver: &dyn BrowserDriver) -> NavigationWatch {
        let rx = driver.subscribe_navigations();
        let url_before = driver.current_url().await.unwrap_or_default();
        NavigationWatch { url_before, rx }
    }

    pub async fn settle(&self, driver: &dyn BrowserDriver, mut watch: NavigationWatch) -> NavigationOutcome {
        let started = Instant::now();
        let deadline = started + self.safety;

        let detected = timeout_at(deadline, self.detect(driver, &mut watch, started)).await;
        let outcome = match detected {
            Ok(Some(url)) => {
                let ready = timeout_at(deadline, self.dom_ready(driver)).await.is_ok();
                if !ready {
                    tracing::warn!("Navigated to {} but DOM not ready within {:?}", url, self.safety);
                }
                NavigationOutcome::Navigated { url, ready }
            }
            Ok(None) => NavigationOutcome::NoNavigation,
            Err(_) => {
                tracing::warn!(
                    "Navigation timeout: page still loading on {} after {:?}",
                    watch.url_before,
                    self.safety
                );
                NavigationOutcome::TimedOut
            }
        };

        tracing::debug!("Settled in {:?}: {:?}", started.elapsed(), outcome);
        outcome
    }

    /// Settle used when the action stayed on the same document
    pub async fn wait_in_page_ready(&self) {
        sleep(self.in_page_settle).await;
    }

    /// `Some(url)` once a navigation is observed. Unbounded on a page that
    /// keeps loading; the caller applies the safety deadline.
    async fn detect(
        &self,
        driver: &dyn BrowserDriver,
        watch: &mut NavigationWatch,
        started: Instant,
    ) -> Option<String> {
        let primary = sleep_until(started + self.primary);
        tokio::pin!(primary);
        let mut signals_open = true;

        loop {
            tokio::select! {
                biased;
                signal = watch.rx.recv(), if signals_open => match signal {
                    Ok(event) => return Some(event.url),
                    Err(RecvError::Lagged(_)) => {
                        return Some(driver.current_url().await.unwrap_or_default());
                    }
                    Err(RecvError::Closed) => signals_open = false,
                },
                _ = &mut primary => break,
                _ = sleep(self.poll) => {
                    if let Some(url) = self.url_changed(driver, watch).await {
                        return Some(url);
                    }
                }
            }
        }

        // Confirm with one poll; keep polling only while a new document loads
        loop {
            sleep(self.poll).await;
            if let Ok(event) = watch.rx.try_recv() {
                return Some(event.url);
            }
            if let Some(url) = self.url_changed(driver, watch).await {
                return Some(url);
            }
            match ready_state(driver).await {
                Ok(state) if state == "loading" => continue,
                Ok(_) => return None,
                Err(e) => tracing::debug!("readyState probe failed while settling: {}", e),
            }
        }
    }

    async fn url_changed(&self, driver: &dyn BrowserDriver, watch: &NavigationWatch) -> Option<String> {
        match driver.current_url().await {
            Ok(url) if url != watch.url_before => Some(url),
            _ => None,
        }
    }

    async fn dom_ready(&self, driver: &dyn BrowserDriver) {
        loop {
            if let Ok(state) = ready_state(driver).await {
                if state == "interactive" || state == "complete" {
                    return;
                }
            }
            sleep(self.ready_poll).await;
        }
    }
}
