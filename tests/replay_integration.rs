//! Chrome-backed replay tests against the fixture site.
//!
//! Run with: cargo test --test replay_integration -- --ignored --test-threads=1

use std::path::PathBuf;
use std::sync::Arc;

use walkthrough::browser::{BrowserDriver, BrowserManager, LaunchOptions};
use walkthrough::error::StepFailure;
use walkthrough::media::cues_from_records;
use walkthrough::replay::{ReplayEngine, ReplayOptions};
use walkthrough::scenario::{self, Action, Scenario, Step};
use walkthrough::timing::{SpeedLevel, TimingScheduler};
use walkthrough::SessionContext;

fn fixtures() -> String {
    format!("file://{}/tests/fixtures", env!("CARGO_MANIFEST_DIR"))
}

fn login_scenario() -> Scenario {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/login.yaml");
    let yaml = std::fs::read_to_string(path).unwrap();
    let expanded = scenario::expand_vars(&yaml, |name| (name == "FIXTURES").then(fixtures)).unwrap();
    assert!(expanded.unresolved.is_empty());
    scenario::parse_yaml(&expanded.content).unwrap()
}

async fn engine(options: ReplayOptions) -> (Arc<BrowserManager>, ReplayEngine) {
    let browser = Arc::new(BrowserManager::new());
    browser
        .launch(&LaunchOptions {
            headless: true,
            ..Default::default()
        })
        .await
        .unwrap();
    let driver: Arc<dyn BrowserDriver> = browser.clone();
    let output = tempfile::tempdir().unwrap().into_path();
    let context = SessionContext::new(driver, TimingScheduler::from_level(SpeedLevel::Fastest), output);
    (browser, ReplayEngine::new(context, options))
}

#[tokio::test]
#[ignore = "needs a local Chrome"]
async fn test_login_scenario_replays() {
    let (browser, engine) = engine(ReplayOptions::default()).await;
    let outcome = engine.run(&login_scenario()).await.unwrap();
    let url = browser.current_url().await.unwrap();
    browser.close().await.unwrap();

    let report = outcome.report;
    assert!(report.success(), "{}", report.summary());
    assert!(url.contains("dashboard.html"), "ended on {}", url);
    assert!(report.steps[1].navigated, "clicking Login opens the form");
    assert!(report.steps[4].navigated, "submitting opens the dashboard");

    let cues = cues_from_records(&report.steps);
    let texts: Vec<_> = cues.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, vec!["Welcome to Acme", "Open the sign-in page"]);
}

#[tokio::test]
#[ignore = "needs a local Chrome"]
async fn test_failures_are_distinguished() {
    let (browser, engine) = engine(ReplayOptions {
        continue_on_failure: true,
        ..Default::default()
    })
    .await;
    let mut broken = Scenario::new("broken");
    broken.steps = vec![
        Step::new(Action::GoTo {
            url: format!("{}/index.html", fixtures()),
        }),
        Step::new(Action::Click {
            text: Some("Checkout".into()),
            selector: None,
        }),
        Step::new(Action::Click {
            text: Some("Does nothing".into()),
            selector: None,
        }),
    ];

    let report = engine.run(&broken).await.unwrap().report;
    browser.close().await.unwrap();

    assert!(matches!(
        report.steps[1].failure,
        Some(StepFailure::ElementNotFound { .. })
    ));
    assert!(matches!(
        report.steps[2].failure,
        Some(StepFailure::ActionNoEffect { .. })
    ));
    let diagnostics = report.steps[1].diagnostics.as_ref().unwrap();
    assert_eq!(diagnostics.title, "Acme Home");
}
