use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

/// A synthesized narration clip
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechClip {
    pub path: PathBuf,
    pub duration: Duration,
}

/// Text-to-speech collaborator
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` into an audio file at `output`
    async fn synthesize(&self, text: &str, output: &Path) -> Result<SpeechClip>;
}

const TEXT_PLACEHOLDER: &str = "{text}";
const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Runs an external TTS command and measures the clip with `ffprobe`.
///
/// The template is split on whitespace; `{text}` and `{output}` are
/// substituted per argument, so the narration needs no shell quoting.
/// Example: `espeak-ng -w {output} {text}`.
#[derive(Debug, Clone)]
pub struct CommandSynthesizer {
    program: String,
    args: Vec<String>,
    ffprobe: PathBuf,
}

impl CommandSynthesizer {
    pub fn new(template: &str, ffprobe: impl Into<PathBuf>) -> Result<Self> {
        let mut parts = template.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or_else(|| anyhow!("TTS command is empty"))?;
        let args: Vec<String> = parts.collect();
        for placeholder in [TEXT_PLACEHOLDER, OUTPUT_PLACEHOLDER] {
            if !args.iter().any(|arg| arg.contains(placeholder)) {
                bail!("TTS command '{}' has no {} placeholder", template, placeholder);
            }
        }
        Ok(Self {
            program,
            args,
            ffprobe: ffprobe.into(),
        })
    }

    /// Program and arguments for one clip
    pub fn build_command(&self, text: &str, output: &Path) -> (String, Vec<String>) {
        let output = output.to_string_lossy();
        let args = self
            .args
            .iter()
            .map(|arg| {
                arg.replace(OUTPUT_PLACEHOLDER, &output)
                    .replace(TEXT_PLACEHOLDER, text)
            })
            .collect();
        (self.program.clone(), args)
    }
}

#[async_trait]
impl SpeechSynthesizer for CommandSynthesizer {
    async fn synthesize(&self, text: &str, output: &Path) -> Result<SpeechClip> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let (program, args) = self.build_command(text, output);
        tracing::debug!("Synthesizing narration with {} -> {}", program, output.display());

        let result = Command::new(&program)
            .args(&args)
            .output()
            .await
            .with_context(|| format!("Failed to run TTS command '{}'", program))?;
        if !result.status.success() {
            bail!(
                "TTS command exited with {}: {}",
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            );
        }
        if !output.exists() {
            bail!("TTS command wrote no file at {}", output.display());
        }

        let duration = probe_duration(&self.ffprobe, output).await?;
        Ok(SpeechClip {
            path: output.to_path_buf(),
            duration,
        })
    }
}

/// Arguments asking ffprobe for the container duration in seconds
pub fn probe_args(media: &Path) -> Vec<String> {
    vec![
        "-v".into(),
        "error".into(),
        "-show_entries".into(),
        "format=duration".into(),
        "-of".into(),
        "default=nk=1:nw=1".into(),
        media.to_string_lossy().into_owned(),
    ]
}

/// Parse ffprobe's `default=nk=1:nw=1` duration output
pub fn parse_duration(stdout: &str) -> Option<Duration> {
    let seconds: f64 = stdout.lines().next()?.trim().parse().ok()?;
    (seconds.is_finite() && seconds >= 0.0).then(|| Duration::from_millis((seconds * 1000.0).round() as u64))
}

pub async fn probe_duration(ffprobe: &Path, media: &Path) -> Result<Duration> {
    let output = Command::new(ffprobe)
        .args(probe_args(media))
        .output()
        .await
        .with_context(|| format!("Failed to run {}", ffprobe.display()))?;
    if !output.status.success() {
        bail!(
            "ffprobe failed on {}: {}",
            media.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_duration(&stdout).ok_or_else(|| anyhow!("Unreadable duration '{}' for {}", stdout.trim(), media.display()))
}
