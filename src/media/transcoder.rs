use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::browser::VideoCapture;
use crate::models::NarrationPlacement;

/// Inputs for producing the final demonstration video
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    pub capture: VideoCapture,
    /// SRT file burned into the video
    pub subtitles: Option<PathBuf>,
    pub narration: Vec<NarrationPlacement>,
    pub output: PathBuf,
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, job: &TranscodeJob) -> Result<PathBuf>;
}

const OUTPUT_FPS: &str = "25";

pub struct FfmpegTranscoder {
    ffmpeg: PathBuf,
}

/// Quote a path for use inside a filtergraph option value
fn filter_path(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let mut escaped = String::with_capacity(raw.len() + 2);
    escaped.push('\'');
    for c in raw.chars() {
        match c {
            '\'' => escaped.push_str("'\\''"),
            '\\' | ':' => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped.push('\'');
    escaped
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self { ffmpeg: ffmpeg.into() }
    }

    /// Full ffmpeg argument list: frames from the concat manifest, subtitles
    /// burned in, narration clips delayed to their offsets and mixed.
    pub fn build_args(&self, job: &TranscodeJob) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            job.capture.manifest.to_string_lossy().into_owned(),
        ];
        for placement in &job.narration {
            args.push("-i".into());
            args.push(placement.clip.to_string_lossy().into_owned());
        }

        let mut filters = Vec::new();
        let video_label = match &job.subtitles {
            Some(srt) => {
                filters.push(format!("[0:v]subtitles=filename={}[vout]", filter_path(srt)));
                "[vout]".to_string()
            }
            None => "0:v".to_string(),
        };

        let audio_label = if job.narration.is_empty() {
            None
        } else {
            let mut mix_inputs = String::new();
            for (i, placement) in job.narration.iter().enumerate() {
                filters.push(format!(
                    "[{}:a]adelay={}|{}[a{}]",
                    i + 1,
                    placement.offset_ms,
                    placement.offset_ms,
                    i
                ));
                mix_inputs.push_str(&format!("[a{}]", i));
            }
            filters.push(format!(
                "{}amix=inputs={}:duration=longest:dropout_transition=0[aout]",
                mix_inputs,
                job.narration.len()
            ));
            Some("[aout]".to_string())
        };

        if !filters.is_empty() {
            args.push("-filter_complex".into());
            args.push(filters.join(";"));
        }
        args.push("-map".into());
        args.push(video_label);
        if let Some(label) = audio_label {
            args.push("-map".into());
            args.push(label);
            args.extend(["-c:a".into(), "aac".into()]);
        }
        args.extend([
            "-r".into(),
            OUTPUT_FPS.into(),
            "-c:v".into(),
            "libx264".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            job.output.to_string_lossy().into_owned(),
        ]);
        args
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, job: &TranscodeJob) -> Result<PathBuf> {
        if job.capture.frame_count == 0 {
            bail!("No frames captured in {}", job.capture.dir.display());
        }
        if let Some(parent) = job.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let args = self.build_args(job);
        tracing::info!(
            "Transcoding {} frames with {} narration clip(s) to {}",
            job.capture.frame_count,
            job.narration.len(),
            job.output.display()
        );
        tracing::debug!("{} {}", self.ffmpeg.display(), args.join(" "));

        let output = Command::new(&self.ffmpeg)
            .args(&args)
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.ffmpeg.display()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            bail!(
                "ffmpeg exited with {}: {}",
                output.status,
                tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
            );
        }
        Ok(job.output.clone())
    }
}
