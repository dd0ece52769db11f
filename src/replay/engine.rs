use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{sleep, Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::continuity::{assigned_narration, Continuity, NarrationSync};
use crate::browser::dom::{capture_diagnostics, capture_page_state, scroll_script};
use crate::browser::VideoCapture;
use crate::context::SessionContext;
use crate::error::{AppError, Result, StepFailure};
use crate::media::{SpeechClip, SpeechSynthesizer};
use crate::models::{Locator, NarrationPlacement, ReplayReport, ScrollDirection, StepRecord};
use crate::resolver::{resolve_live, Intent};
use crate::scenario::{Action, Scenario, Step};

#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    /// Keep going after a step fails instead of stopping the run
    pub continue_on_failure: bool,
    /// Record a raw screencast under `<output>/frames`
    pub capture_video: bool,
}

/// Everything a finished run produced
#[derive(Debug, Clone)]
pub struct ReplayOutcome {
    pub report: ReplayReport,
    pub video: Option<VideoCapture>,
}

impl ReplayOutcome {
    pub fn narration(&self) -> Vec<NarrationPlacement> {
        self.report
            .steps
            .iter()
            .filter_map(|record| record.narration.clone())
            .collect()
    }
}

/// Result of one step that did not hit a driver error
struct StepOutcome {
    navigated: bool,
    failure: Option<StepFailure>,
}

impl StepOutcome {
    fn done(navigated: bool) -> Self {
        Self {
            navigated,
            failure: None,
        }
    }

    fn failed(failure: StepFailure) -> Self {
        Self {
            navigated: false,
            failure: Some(failure),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

/// Replays a scenario against the session's page.
///
/// All step timing is measured from one replay-start instant, which is what
/// narration sync and the generated captions are aligned to.
pub struct ReplayEngine {
    context: SessionContext,
    options: ReplayOptions,
    speech: Option<Arc<dyn SpeechSynthesizer>>,
    step_sender: broadcast::Sender<StepRecord>,
    cancel: CancellationToken,
}

impl ReplayEngine {
    pub fn new(context: SessionContext, options: ReplayOptions) -> Self {
        let (step_tx, _) = broadcast::channel(256);
        Self {
            context,
            options,
            speech: None,
            step_sender: step_tx,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_speech(mut self, speech: Arc<dyn SpeechSynthesizer>) -> Self {
        self.speech = Some(speech);
        self
    }

    /// Receive each step record as it completes
    pub fn subscribe_steps(&self) -> broadcast::Receiver<StepRecord> {
        self.step_sender.subscribe()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run every step. Step failures and driver errors end up in the
    /// report; `Err` is reserved for failures before the first step.
    pub async fn run(&self, scenario: &Scenario) -> Result<ReplayOutcome> {
        let clips = self.prepare_narration(scenario).await?;
        let driver = self.context.driver();
        let timing = self.context.timing();
        let mut report = ReplayReport::new(scenario.name.clone(), scenario.steps.len());

        let capturing = if self.options.capture_video {
            let dir = self.context.output_dir().join("frames");
            driver.start_video_capture(&dir).await?;
            true
        } else {
            false
        };

        tracing::info!(
            "Replaying '{}': {} steps at speed {}",
            scenario.name,
            scenario.steps.len(),
            timing.setting()
        );

        let started = Instant::now();
        let mut subtitles = Continuity::default();
        let mut sync = NarrationSync::default();

        for (index, step) in scenario.steps.iter().enumerate() {
            if index > 0 && !self.pause(timing.step_gap()).await {
                report.cancelled = true;
                break;
            }

            let mut narration = None;
            if let Some(text) = assigned_narration(step.audio.as_deref()) {
                match clips.get(text) {
                    Some(clip) => {
                        let wait = sync.required_wait(started.elapsed());
                        if !wait.is_zero() {
                            tracing::debug!("Step {} waits {:?} for narration", index + 1, wait);
                        }
                        if !self.pause(wait).await {
                            report.cancelled = true;
                            break;
                        }
                        let offset = started.elapsed();
                        sync.start(offset, clip.duration);
                        narration = Some(NarrationPlacement {
                            text: text.to_string(),
                            clip: clip.path.clone(),
                            offset_ms: millis(offset),
                            duration_ms: millis(clip.duration),
                        });
                    }
                    None => tracing::warn!("No narration clip for step {}", index + 1),
                }
            }
            let subtitle = subtitles.apply(step.subtitle.as_deref()).map(str::to_string);

            let step_start = started.elapsed();
            tracing::info!("Step {}/{}: {}", index + 1, scenario.steps.len(), step.summary());

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::info!("Replay cancelled");
                    report.cancelled = true;
                    break;
                }
                result = self.execute(index, step) => result,
            };

            match result {
                Ok(outcome) => {
                    let diagnostics = match &outcome.failure {
                        Some(failure) => {
                            tracing::warn!("Step {} failed: {}", index + 1, failure);
                            Some(capture_diagnostics(driver).await)
                        }
                        None => None,
                    };
                    let record = StepRecord {
                        index,
                        action: step.action.name().to_string(),
                        summary: step.summary(),
                        start_ms: millis(step_start),
                        end_ms: millis(started.elapsed()),
                        subtitle,
                        narration,
                        navigated: outcome.navigated,
                        failure: outcome.failure,
                        diagnostics,
                    };
                    let stop = !record.succeeded() && !self.options.continue_on_failure;
                    // No subscribers is fine
                    let _ = self.step_sender.send(record.clone());
                    report.steps.push(record);
                    if stop {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Step {} aborted the replay: {:#}", index + 1, e);
                    report.aborted = Some(format!("step {} ({}): {}", index + 1, step.summary(), e));
                    break;
                }
            }
        }

        if report.aborted.is_none() && !report.cancelled {
            // Let the last narration play out
            let tail = sync.required_wait(started.elapsed());
            self.pause(tail).await;
        }

        let video = if capturing {
            match driver.stop_video_capture().await {
                Ok(video) => video,
                Err(e) => {
                    tracing::warn!("Failed to stop video capture: {}", e);
                    None
                }
            }
        } else {
            None
        };

        report.complete();
        if report.success() {
            tracing::info!("{}", report.summary());
        } else {
            tracing::warn!("{}", report.summary());
        }
        Ok(ReplayOutcome { report, video })
    }

    /// Synthesize every distinct narration text once, up front, so clip
    /// durations are known before timing decisions are made.
    async fn prepare_narration(&self, scenario: &Scenario) -> Result<HashMap<String, SpeechClip>> {
        let mut clips = HashMap::new();
        let texts = scenario.narration_texts();
        if texts.is_empty() {
            return Ok(clips);
        }
        let Some(speech) = &self.speech else {
            tracing::warn!("{} narration line(s) but no speech synthesizer configured", texts.len());
            return Ok(clips);
        };

        let dir = self.context.output_dir().join("narration");
        for (i, text) in texts.into_iter().enumerate() {
            let path = dir.join(format!("clip_{:03}.wav", i));
            let clip = speech
                .synthesize(text, &path)
                .await
                .map_err(|e| AppError::MediaError(format!("narration {}: {:#}", i + 1, e)))?;
            tracing::debug!("Narration {} lasts {:?}", i + 1, clip.duration);
            clips.insert(text.to_string(), clip);
        }
        Ok(clips)
    }

    /// Sleep unless cancelled first; false on cancellation
    async fn pause(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.cancel.is_cancelled();
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = sleep(duration) => true,
        }
    }

    async fn execute(&self, index: usize, step: &Step) -> anyhow::Result<StepOutcome> {
        let driver = self.context.driver();
        let timing = self.context.timing();
        let waiter = self.context.waiter();

        match &step.action {
            Action::GoTo { url } => {
                let watch = waiter.arm(driver).await;
                driver.navigate(url).await?;
                let outcome = waiter.settle(driver, watch).await;
                sleep(timing.after_action()).await;
                Ok(StepOutcome::done(outcome.navigated()))
            }
            Action::Click { .. } | Action::Submit { .. } | Action::Type { .. } => {
                let locator = step.action.locator().unwrap_or_default();
                self.interact(&step.action, locator).await
            }
            Action::Scroll { direction, amount } => {
                let delta = match direction {
                    ScrollDirection::Up => -i64::from(*amount),
                    ScrollDirection::Down => i64::from(*amount),
                };
                driver.evaluate(&scroll_script(delta)).await?;
                waiter.wait_in_page_ready().await;
                Ok(StepOutcome::done(false))
            }
            Action::Press { key } => {
                let watch = waiter.arm(driver).await;
                driver.press_key(key).await?;
                let outcome = waiter.settle(driver, watch).await;
                if !outcome.navigated() {
                    waiter.wait_in_page_ready().await;
                }
                Ok(StepOutcome::done(outcome.navigated()))
            }
            Action::Wait { seconds } => {
                sleep(timing.wait_step(*seconds)).await;
                Ok(StepOutcome::done(false))
            }
            Action::Screenshot { name } => {
                let bytes = driver.screenshot().await?;
                let file = match name {
                    Some(name) => format!("{}.png", name),
                    None => format!("step_{:03}.png", index + 1),
                };
                let dir = self.context.output_dir().join("screenshots");
                tokio::fs::create_dir_all(&dir).await?;
                let path = dir.join(file);
                tokio::fs::write(&path, bytes).await?;
                tracing::info!("Screenshot saved to {}", path.display());
                Ok(StepOutcome::done(false))
            }
        }
    }

    /// Resolve, act and check that the page reacted
    async fn interact(&self, action: &Action, locator: Locator) -> anyhow::Result<StepOutcome> {
        let driver = self.context.driver();
        let timing = self.context.timing();
        let waiter = self.context.waiter();

        let intent = match action {
            Action::Type { .. } => Intent::Fill,
            _ => Intent::Activate,
        };
        let Some(target) = resolve_live(driver, timing, &locator, intent).await? else {
            return Ok(StepOutcome::failed(StepFailure::ElementNotFound {
                locator: locator.to_string(),
            }));
        };
        tracing::debug!("{} resolved to {} (score {})", locator, target.selector, target.score);

        let before = capture_page_state(driver).await?;
        let watch = waiter.arm(driver).await;
        match action {
            Action::Type { text, .. } => {
                driver.type_text(&target.selector, text, timing.typing_delay()).await?
            }
            _ => driver.click(&target.selector).await?,
        }

        let outcome = waiter.settle(driver, watch).await;
        if outcome.navigated() {
            return Ok(StepOutcome::done(true));
        }
        waiter.wait_in_page_ready().await;

        let after = capture_page_state(driver).await?;
        if after.changed_from(&before) {
            Ok(StepOutcome::done(false))
        } else {
            Ok(StepOutcome::failed(StepFailure::ActionNoEffect {
                locator: locator.to_string(),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{ClickEffect, FakeDriver, FakePage};
    use crate::browser::DomElement;
    use crate::timing::{SpeedLevel, TimingScheduler};
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};

    /// Clips of known length, nothing written to disk
    struct FixedSpeech(HashMap<String, Duration>);

    #[async_trait]
    impl SpeechSynthesizer for FixedSpeech {
        async fn synthesize(&self, text: &str, output: &Path) -> anyhow::Result<SpeechClip> {
            let duration = self
                .0
                .get(text)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("unexpected narration '{}'", text))?;
            Ok(SpeechClip {
                path: output.to_path_buf(),
                duration,
            })
        }
    }

    fn engine(driver: &FakeDriver, timing: TimingScheduler, options: ReplayOptions) -> ReplayEngine {
        let context = SessionContext::new(Arc::new(driver.clone()), timing, PathBuf::from("out"));
        ReplayEngine::new(context, options)
    }

    fn blank_driver() -> FakeDriver {
        FakeDriver::with_page(FakePage::new("about:blank", ""))
    }

    fn login_site() -> FakeDriver {
        let driver = blank_driver();
        driver.add_page(
            FakePage::new("https://app.test/", "Home")
                .element(DomElement::new(0, "a").with_text("Pricing").with_href("/pricing"))
                .element(DomElement::new(1, "a").with_text("Login").with_href("/login"))
                .on_click(1, ClickEffect::Navigate("https://app.test/login".into())),
        );
        driver.add_page(
            FakePage::new("https://app.test/login", "Sign in")
                .element(
                    DomElement::new(0, "input")
                        .with_id("email")
                        .with_name("email")
                        .with_type("email")
                        .with_label("Email"),
                )
                .element(
                    DomElement::new(1, "input")
                        .with_id("password")
                        .with_name("password")
                        .with_type("password")
                        .with_label("Password"),
                )
                .element(DomElement::new(2, "a").with_text("Password Reset").with_href("/reset"))
                .element(DomElement::new(3, "button").with_text("Login").with_type("submit"))
                .on_click(3, ClickEffect::NavigateAfter("https://app.test/dashboard".into(), Duration::from_millis(80))),
        );
        driver.add_page(FakePage::new("https://app.test/dashboard", "Dashboard"));
        driver
    }

    /// Same markup as `tests/fixtures/login.html`
    fn sign_in_page() -> FakeDriver {
        let driver = blank_driver();
        let mut email = DomElement::new(2, "input")
            .with_id("email")
            .with_name("email")
            .with_type("email")
            .with_label("Email");
        email.autocomplete = "username".into();
        let mut password = DomElement::new(4, "input")
            .with_id("password")
            .with_name("password")
            .with_type("password")
            .with_label("Password");
        password.autocomplete = "current-password".into();
        driver.add_page(
            FakePage::new("https://app.test/login.html", "Sign in")
                .element(DomElement::new(0, "h1").with_text("Sign in"))
                .element(DomElement::new(1, "label").with_text("Email"))
                .element(email)
                .element(DomElement::new(3, "label").with_text("Password"))
                .element(password)
                .element(DomElement::new(5, "a").with_text("Forgot password?").with_href("reset.html"))
                .element(
                    DomElement::new(6, "button")
                        .with_id("login-button")
                        .with_type("submit")
                        .with_text("Login"),
                )
                .on_click(6, ClickEffect::Navigate("https://app.test/dashboard.html".into())),
        );
        driver.add_page(FakePage::new("https://app.test/dashboard.html", "Dashboard"));
        driver
    }

    fn type_into(field: &str, text: &str) -> Step {
        Step::new(Action::Type {
            text: text.into(),
            field: Some(field.into()),
            selector: None,
        })
    }

    fn click(text: &str) -> Step {
        Step::new(Action::Click {
            text: Some(text.into()),
            selector: None,
        })
    }

    fn go_to(url: &str) -> Step {
        Step::new(Action::GoTo { url: url.into() })
    }

    fn wait(seconds: f64) -> Step {
        Step::new(Action::Wait { seconds })
    }

    fn scenario(steps: Vec<Step>) -> Scenario {
        let mut scenario = Scenario::new("test");
        scenario.steps = steps;
        scenario
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_flow() {
        let driver = login_site();
        let engine = engine(&driver, TimingScheduler::default(), ReplayOptions::default());
        let login = scenario(vec![
            go_to("https://app.test/"),
            click("Login"),
            Step::new(Action::Type {
                text: "user@x.com".into(),
                field: Some("Email".into()),
                selector: None,
            }),
            Step::new(Action::Type {
                text: "secret".into(),
                field: Some("Password".into()),
                selector: None,
            }),
            Step::new(Action::Submit {
                text: Some("Login".into()),
                selector: None,
            }),
        ]);

        let outcome = engine.run(&login).await.unwrap();
        let report = outcome.report;
        assert!(report.success(), "{}", report.summary());
        assert!(report.first_failure().is_none());
        assert_eq!(driver.url(), "https://app.test/dashboard");
        assert!(report.steps[4].navigated);
        assert!(report.steps[1].navigated);

        let calls = driver.calls();
        assert!(calls.contains(&"type [data-wt-node=\"0\"] user@x.com".to_string()));
        assert!(calls.contains(&"type [data-wt-node=\"1\"] secret".to_string()));
        assert!(calls.contains(&"click [data-wt-node=\"3\"]".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_login_presses_the_button_not_the_username_field() {
        let driver = sign_in_page();
        let engine = engine(&driver, TimingScheduler::default(), ReplayOptions::default());
        let sign_in = scenario(vec![
            go_to("https://app.test/login.html"),
            type_into("Email", "user@example.com"),
            type_into("Password", "hunter2"),
            Step::new(Action::Submit {
                text: Some("Login".into()),
                selector: None,
            }),
        ]);

        let report = engine.run(&sign_in).await.unwrap().report;
        assert!(report.success(), "{}", report.summary());
        assert!(report.steps[3].navigated);
        assert_eq!(driver.url(), "https://app.test/dashboard.html");

        let calls = driver.calls();
        assert!(calls.contains(&"type [data-wt-node=\"2\"] user@example.com".to_string()));
        assert!(calls.contains(&"type [data-wt-node=\"4\"] hunter2".to_string()));
        assert!(calls.contains(&"click [data-wt-node=\"6\"]".to_string()));
        assert!(!calls.contains(&"click [data-wt-node=\"2\"]".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_targets_the_input_after_its_label() {
        let driver = blank_driver();
        driver.add_page(
            FakePage::new("https://app.test/signup", "Sign up")
                .element(DomElement::new(0, "label").with_text("Company"))
                .element(DomElement::new(1, "input").with_type("text").with_label("Company")),
        );
        let engine = engine(&driver, TimingScheduler::default(), ReplayOptions::default());
        let signup = scenario(vec![go_to("https://app.test/signup"), type_into("Company", "Acme")]);

        let report = engine.run(&signup).await.unwrap().report;
        assert!(report.success(), "{}", report.summary());
        let calls = driver.calls();
        assert!(calls.contains(&"type [data-wt-node=\"1\"] Acme".to_string()));
        assert!(!calls.iter().any(|call| call.starts_with("type [data-wt-node=\"0\"]")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_narration_never_overlaps_for_any_profile() {
        for level in SpeedLevel::ALL {
            let driver = blank_driver();
            driver.add_page(
                FakePage::new("https://app.test/", "Home")
                    .element(DomElement::new(0, "button").with_text("Next"))
                    .on_click(0, ClickEffect::Mutate),
            );
            let speech = FixedSpeech(HashMap::from([
                ("Welcome to the demo.".to_string(), Duration::from_millis(3_000)),
                ("Click next.".to_string(), Duration::from_millis(1_500)),
                ("Done.".to_string(), Duration::from_millis(700)),
            ]));
            let engine = engine(&driver, TimingScheduler::from_level(level), ReplayOptions::default())
                .with_speech(Arc::new(speech));

            let narrated = scenario(vec![
                go_to("https://app.test/").with_audio("Welcome to the demo."),
                click("Next").with_audio("Click next."),
                wait(0.1),
                wait(0.1).with_audio("Done."),
            ]);
            let outcome = engine.run(&narrated).await.unwrap();
            let steps = &outcome.report.steps;
            assert!(outcome.report.success(), "{}", outcome.report.summary());

            let first = steps[0].narration.as_ref().unwrap();
            let second = steps[1].narration.as_ref().unwrap();
            let third = steps[3].narration.as_ref().unwrap();
            assert_eq!(first.duration_ms, 3_000, "durations are never scaled");
            assert!(steps[1].start() >= first.end(), "profile {}", level);
            assert!(steps[3].start() >= second.end(), "profile {}", level);
            assert!(second.offset() >= first.end());
            assert!(third.offset() >= second.end());
            assert!(steps[2].narration.is_none());
            assert_eq!(outcome.narration().len(), 3);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_narrated_step_does_not_wait() {
        let driver = blank_driver();
        let speech = FixedSpeech(HashMap::from([
            ("Short.".to_string(), Duration::from_millis(100)),
            ("Next.".to_string(), Duration::from_millis(100)),
        ]));
        let engine = engine(&driver, TimingScheduler::default(), ReplayOptions::default())
            .with_speech(Arc::new(speech));
        let narrated = scenario(vec![
            wait(1.0).with_audio("Short."),
            wait(0.0).with_audio("Next."),
        ]);

        let outcome = engine.run(&narrated).await.unwrap();
        let steps = &outcome.report.steps;
        let gap = TimingScheduler::default().step_gap();
        // Already past the first clip: only the regular step gap separates them
        let between = steps[1].start() - steps[0].end();
        assert!(between >= gap - Duration::from_millis(1));
        assert!(between <= gap + Duration::from_millis(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_subtitles_carry_over() {
        let driver = blank_driver();
        let engine = engine(&driver, TimingScheduler::from_level(SpeedLevel::Fastest), ReplayOptions::default());
        let captioned = scenario(vec![
            wait(0.1).with_subtitle("Welcome"),
            wait(0.1),
            wait(0.1).with_subtitle("Step two"),
            wait(0.1).with_subtitle(""),
            wait(0.1),
        ]);

        let outcome = engine.run(&captioned).await.unwrap();
        let subtitles: Vec<_> = outcome
            .report
            .steps
            .iter()
            .map(|r| r.subtitle.as_deref())
            .collect();
        assert_eq!(
            subtitles,
            vec![Some("Welcome"), Some("Welcome"), Some("Step two"), None, None]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_element_stops_with_diagnostics() {
        let driver = login_site();
        let engine = engine(&driver, TimingScheduler::default(), ReplayOptions::default());
        let broken = scenario(vec![go_to("https://app.test/"), click("Publish"), click("Login")]);

        let outcome = engine.run(&broken).await.unwrap();
        let report = outcome.report;
        assert!(!report.success());
        assert_eq!(report.steps.len(), 2);

        let (record, failure) = report.first_failure().unwrap();
        assert_eq!(
            failure,
            &StepFailure::ElementNotFound {
                locator: "'Publish'".into()
            }
        );
        let diagnostics = record.diagnostics.as_ref().unwrap();
        assert_eq!(diagnostics.url, "https://app.test/");
        assert_eq!(diagnostics.title, "Home");
        assert!(diagnostics.dom.contains("Pricing"));
        assert!(report.summary().contains("locator not found"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ineffective_click_is_reported_and_run_continues() {
        let driver = blank_driver();
        driver.add_page(
            FakePage::new("https://app.test/", "Home")
                .element(DomElement::new(0, "button").with_text("Dead"))
                .element(DomElement::new(1, "button").with_text("Live"))
                .on_click(1, ClickEffect::Mutate),
        );
        let options = ReplayOptions {
            continue_on_failure: true,
            ..Default::default()
        };
        let engine = engine(&driver, TimingScheduler::default(), options);
        let run = scenario(vec![go_to("https://app.test/"), click("Dead"), click("Live")]);

        let report = engine.run(&run).await.unwrap().report;
        assert_eq!(report.steps.len(), 3);
        assert_eq!(
            report.steps[1].failure,
            Some(StepFailure::ActionNoEffect {
                locator: "'Dead'".into()
            })
        );
        assert!(report.steps[2].succeeded());
        assert!(report.summary().contains("found but ineffective"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_error_aborts_with_partial_report() {
        let driver = login_site();
        driver.fail_clicks();
        let engine = engine(&driver, TimingScheduler::default(), ReplayOptions::default());
        let run = scenario(vec![go_to("https://app.test/"), click("Login"), wait(1.0)]);

        let report = engine.run(&run).await.unwrap().report;
        assert_eq!(report.steps.len(), 1);
        assert!(report.aborted.as_deref().unwrap().contains("Target closed"));
        assert!(!report.success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start() {
        let driver = login_site();
        let engine = engine(&driver, TimingScheduler::default(), ReplayOptions::default());
        engine.cancel_token().cancel();

        let report = engine.run(&scenario(vec![go_to("https://app.test/")])).await.unwrap().report;
        assert!(report.cancelled);
        assert!(report.steps.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scroll_press_and_screenshot() {
        let dir = tempfile::tempdir().unwrap();
        let driver = login_site();
        let context = SessionContext::new(
            Arc::new(driver.clone()),
            TimingScheduler::default(),
            dir.path().to_path_buf(),
        );
        let engine = ReplayEngine::new(
            context,
            ReplayOptions {
                capture_video: true,
                ..Default::default()
            },
        );
        let mut steps = engine.subscribe_steps();
        let run = scenario(vec![
            go_to("https://app.test/"),
            Step::new(Action::Scroll {
                direction: ScrollDirection::Down,
                amount: 300,
            }),
            Step::new(Action::Press { key: "Tab".into() }),
            Step::new(Action::Screenshot {
                name: Some("home".into()),
            }),
            Step::new(Action::Screenshot { name: None }),
        ]);

        let outcome = engine.run(&run).await.unwrap();
        assert!(outcome.report.success(), "{}", outcome.report.summary());
        assert!(dir.path().join("screenshots/home.png").exists());
        assert!(dir.path().join("screenshots/step_005.png").exists());
        assert_eq!(outcome.video.unwrap().dir, dir.path().join("frames"));
        assert!(driver.calls().contains(&"press Tab".to_string()));
        assert_eq!(steps.recv().await.unwrap().action, "go_to");
    }
}
