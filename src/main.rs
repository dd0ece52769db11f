use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use walkthrough::browser::{BrowserDriver, BrowserManager, LaunchOptions};
use walkthrough::error::StepFailure;
use walkthrough::media::{
    cues_from_records, to_srt, CommandSynthesizer, FfmpegTranscoder, TranscodeJob, Transcoder,
};
use walkthrough::models::{ReplayReport, Viewport};
use walkthrough::recording::Recorder;
use walkthrough::replay::{ReplayEngine, ReplayOptions, ReplayOutcome};
use walkthrough::scenario;
use walkthrough::timing::{SpeedSetting, TimingScheduler};
use walkthrough::{Config, SessionContext};

#[derive(Parser)]
#[command(name = "walkthrough", version, about = "Record and replay narrated browser walkthroughs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record interactions in a browser window until Ctrl-C
    Record {
        /// Scenario file to write
        output: PathBuf,
        #[arg(long)]
        headless: bool,
        /// Page to start recording on
        #[arg(long, default_value = "about:blank")]
        url: String,
    },
    /// Replay a scenario file
    Run {
        input: PathBuf,
        #[arg(long)]
        headless: bool,
        /// Speed profile (slow, normal, fast, fastest) or a multiplier
        #[arg(long)]
        speed: Option<SpeedSetting>,
        /// Write a processed video to this path
        #[arg(long)]
        video: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Record { output, headless, url } => record(&config, &output, headless, &url).await,
        Command::Run {
            input,
            headless,
            speed,
            video,
        } => run(&config, &input, headless, speed, video).await,
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn scenario_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "walkthrough".to_string())
}

async fn launch(headless: bool, viewport: Viewport) -> Result<Arc<BrowserManager>> {
    let browser = Arc::new(BrowserManager::new());
    browser
        .launch(&LaunchOptions {
            headless,
            viewport,
            ..Default::default()
        })
        .await
        .context("Failed to launch Chrome")?;
    Ok(browser)
}

async fn record(config: &Config, output: &Path, headless: bool, url: &str) -> Result<bool> {
    let browser = launch(headless || config.headless, config.viewport).await?;
    let driver: Arc<dyn BrowserDriver> = browser.clone();
    let context = SessionContext::new(driver, TimingScheduler::new(config.speed), config.output_dir.clone());
    let recorder = Recorder::new(context, url);

    let cancel = recorder.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Stopping recording");
            cancel.cancel();
        }
    });

    let mut actions = recorder.subscribe_actions();
    let printer = tokio::spawn(async move {
        while let Ok(action) = actions.recv().await {
            println!("  ● {}", action.description);
        }
    });

    println!("Recording {} (Ctrl-C to stop)", url);
    let recording = recorder.run().await;
    printer.abort();
    if let Err(e) = browser.close().await {
        tracing::warn!("Failed to close browser: {}", e);
    }
    let recording = recording?;

    if recording.session.degraded {
        println!("Warning: capture script never became ready; some interactions may be missing");
    }
    for warning in &recording.warnings {
        tracing::debug!("Normalizer warning: {}", warning);
    }

    let scenario = recording.into_scenario(&scenario_name(output));
    scenario::save_file(&scenario, output)?;
    println!("Saved {} steps to {}", scenario.steps.len(), output.display());
    Ok(true)
}

async fn run(
    config: &Config,
    input: &Path,
    headless: bool,
    speed: Option<SpeedSetting>,
    video: Option<PathBuf>,
) -> Result<bool> {
    let scenario = scenario::load(input)?;
    let overrides = scenario.config.browser.clone().unwrap_or_default();

    let speed = speed.or(scenario.config.speed).unwrap_or(config.speed);
    let headless = headless || overrides.headless.unwrap_or(config.headless);
    let viewport = Viewport {
        width: overrides.width.unwrap_or(config.viewport.width),
        height: overrides.height.unwrap_or(config.viewport.height),
    };
    let video = video.or_else(|| scenario.config.video.as_ref().map(PathBuf::from));
    let output_dir = config.output_dir.join(scenario_name(input));

    let browser = launch(headless, viewport).await?;
    let driver: Arc<dyn BrowserDriver> = browser.clone();
    let context = SessionContext::new(driver, TimingScheduler::new(speed), output_dir.clone());
    let mut engine = ReplayEngine::new(
        context,
        ReplayOptions {
            capture_video: video.is_some(),
            ..Default::default()
        },
    );
    if let Some(template) = &config.tts_command {
        engine = engine.with_speech(Arc::new(CommandSynthesizer::new(template, &config.ffprobe)?));
    }

    let cancel = engine.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let outcome = engine.run(&scenario).await;
    if let Err(e) = browser.close().await {
        tracing::warn!("Failed to close browser: {}", e);
    }
    let outcome = outcome?;
    print_report(&outcome.report);

    tokio::fs::create_dir_all(&output_dir).await?;
    let report_path = output_dir.join("report.json");
    tokio::fs::write(&report_path, serde_json::to_vec_pretty(&outcome.report)?).await?;
    tracing::info!("Report written to {}", report_path.display());

    let mut ok = outcome.report.success();
    if let Some(target) = video {
        match produce_video(config, &outcome, &output_dir, target).await {
            Ok(Some(path)) => println!("Video: {}", path.display()),
            Ok(None) => println!("No video captured"),
            Err(e) => {
                eprintln!("Video processing failed: {:#}", e);
                ok = false;
            }
        }
    }
    Ok(ok)
}

async fn produce_video(
    config: &Config,
    outcome: &ReplayOutcome,
    output_dir: &Path,
    target: PathBuf,
) -> Result<Option<PathBuf>> {
    let Some(capture) = outcome.video.clone() else {
        return Ok(None);
    };

    let cues = cues_from_records(&outcome.report.steps);
    let subtitles = if cues.is_empty() {
        None
    } else {
        let path = output_dir.join("captions.srt");
        tokio::fs::write(&path, to_srt(&cues)).await?;
        Some(path)
    };

    let job = TranscodeJob {
        capture,
        subtitles,
        narration: outcome.narration(),
        output: target,
    };
    let path = FfmpegTranscoder::new(&config.ffmpeg).transcode(&job).await?;
    Ok(Some(path))
}

fn print_report(report: &ReplayReport) {
    for record in &report.steps {
        match &record.failure {
            None => println!("  ✓ {}. {}", record.index + 1, record.summary),
            Some(failure) => {
                let reason = match failure {
                    StepFailure::ElementNotFound { .. } => "locator not found",
                    StepFailure::ActionNoEffect { .. } => "found but ineffective",
                };
                println!(
                    "  ✗ {}. {} [{}: {}]",
                    record.index + 1,
                    record.summary,
                    reason,
                    failure.locator()
                );
                if let Some(diagnostics) = &record.diagnostics {
                    println!("      on {} ({})", diagnostics.url, diagnostics.title);
                }
            }
        }
    }

    if report.success() {
        println!("✓ {}", report.summary());
    } else {
        println!("✗ {}", report.summary());
    }
}
