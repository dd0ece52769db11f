use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::browser::{BrowserDriver, StabilityWaiter};
use crate::timing::TimingScheduler;

/// Everything one automation session needs, built once and passed by
/// reference to the recorder and the replay engine.
#[derive(Clone)]
pub struct SessionContext {
    driver: Arc<dyn BrowserDriver>,
    timing: TimingScheduler,
    waiter: StabilityWaiter,
    output_dir: PathBuf,
}

impl SessionContext {
    pub fn new(driver: Arc<dyn BrowserDriver>, timing: TimingScheduler, output_dir: PathBuf) -> Self {
        Self {
            waiter: StabilityWaiter::new(&timing),
            driver,
            timing,
            output_dir,
        }
    }

    pub fn driver(&self) -> &dyn BrowserDriver {
        self.driver.as_ref()
    }

    pub fn shared_driver(&self) -> Arc<dyn BrowserDriver> {
        Arc::clone(&self.driver)
    }

    pub fn timing(&self) -> &TimingScheduler {
        &self.timing
    }

    pub fn waiter(&self) -> &StabilityWaiter {
        &self.waiter
    }

    /// Directory for screenshots, raw frames and narration clips
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}
