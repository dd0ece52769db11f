use std::env;
use std::path::PathBuf;

use crate::models::Viewport;
use crate::timing::SpeedSetting;

/// Runtime settings read from the environment (and `.env`)
#[derive(Debug, Clone)]
pub struct Config {
    pub headless: bool,
    pub speed: SpeedSetting,
    pub output_dir: PathBuf,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    /// TTS command template with `{text}` and `{output}` placeholders
    pub tts_command: Option<String>,
    pub viewport: Viewport,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            headless: false,
            speed: SpeedSetting::default(),
            output_dir: default_output_dir(),
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            tts_command: None,
            viewport: Viewport::default(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    dirs::video_dir()
        .or_else(dirs::home_dir)
        .map(|dir| dir.join("walkthrough"))
        .unwrap_or_else(|| PathBuf::from("walkthrough-output"))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unparsable values fall back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let headless = match get("WALKTHROUGH_HEADLESS") {
            Some(raw) => parse_bool(&raw).unwrap_or_else(|| {
                tracing::warn!("Ignoring WALKTHROUGH_HEADLESS={}", raw);
                defaults.headless
            }),
            None => defaults.headless,
        };
        let speed = match get("WALKTHROUGH_SPEED") {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!("Ignoring WALKTHROUGH_SPEED: {}", e);
                defaults.speed
            }),
            None => defaults.speed,
        };
        let viewport = Viewport {
            width: get("WALKTHROUGH_VIEWPORT_WIDTH")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.viewport.width),
            height: get("WALKTHROUGH_VIEWPORT_HEIGHT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.viewport.height),
        };

        Self {
            headless,
            speed,
            output_dir: get("WALKTHROUGH_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            ffmpeg: get("FFMPEG_PATH").map(PathBuf::from).unwrap_or(defaults.ffmpeg),
            ffprobe: get("FFPROBE_PATH").map(PathBuf::from).unwrap_or(defaults.ffprobe),
            tts_command: get("WALKTHROUGH_TTS_COMMAND"),
            viewport,
        }
    }
}
