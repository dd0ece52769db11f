//! Speed profiles and the scaled delay/timeout constants derived from them.
//!
//! Every wait in element resolution, stability detection and replay goes
//! through a [`TimingScheduler`], so one setting controls pacing. Narration
//! durations are real audio lengths and are never scaled.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Unscaled constants (Normal profile)
pub mod base {
    use std::time::Duration;

    pub const NAV_PRIMARY_TIMEOUT: Duration = Duration::from_millis(200);
    pub const NAV_SAFETY_TIMEOUT: Duration = Duration::from_millis(2000);
    pub const NAV_POLL_INTERVAL: Duration = Duration::from_millis(50);
    pub const DOM_READY_POLL: Duration = Duration::from_millis(50);
    pub const IN_PAGE_SETTLE: Duration = Duration::from_millis(150);
    pub const RESOLVER_BACKOFF: Duration = Duration::from_millis(250);
    pub const MENU_SETTLE: Duration = Duration::from_millis(300);
    pub const AFTER_ACTION: Duration = Duration::from_millis(400);
    pub const TYPING_PER_CHAR: Duration = Duration::from_millis(40);
    pub const STEP_GAP: Duration = Duration::from_millis(300);
    pub const CAPTURE_VERIFY_BACKOFF: Duration = Duration::from_millis(300);
    pub const CAPTURE_FAST_POLL: Duration = Duration::from_millis(50);
    pub const CAPTURE_SLOW_POLL: Duration = Duration::from_millis(250);
}

/// Number of late-render polls the resolver makes before its final pass
pub const RESOLVER_POLL_ATTEMPTS: u32 = 6;

/// Scaled intervals never drop below this, to avoid busy loops
const MIN_SCALED: Duration = Duration::from_millis(10);

const MIN_MULTIPLIER: f64 = 0.05;
const MAX_MULTIPLIER: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedLevel {
    Slow,
    #[default]
    Normal,
    Fast,
    Fastest,
}

impl SpeedLevel {
    pub const ALL: [SpeedLevel; 4] = [
        SpeedLevel::Slow,
        SpeedLevel::Normal,
        SpeedLevel::Fast,
        SpeedLevel::Fastest,
    ];

    pub fn multiplier(self) -> f64 {
        match self {
            SpeedLevel::Slow => 1.6,
            SpeedLevel::Normal => 1.0,
            SpeedLevel::Fast => 0.6,
            SpeedLevel::Fastest => 0.3,
        }
    }
}

impl FromStr for SpeedLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "slow" => Ok(SpeedLevel::Slow),
            "normal" | "default" => Ok(SpeedLevel::Normal),
            "fast" => Ok(SpeedLevel::Fast),
            "fastest" | "instant" => Ok(SpeedLevel::Fastest),
            other => Err(format!("unknown speed level '{}'", other)),
        }
    }
}

impl fmt::Display for SpeedLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SpeedLevel::Slow => "slow",
            SpeedLevel::Normal => "normal",
            SpeedLevel::Fast => "fast",
            SpeedLevel::Fastest => "fastest",
        };
        f.write_str(name)
    }
}

/// Timing configuration at the API boundary: a named profile or an explicit
/// multiplier (`speed: fast` or `speed: 0.75` in a scenario file)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpeedSetting {
    Named(SpeedLevel),
    Multiplier(f64),
}

impl Default for SpeedSetting {
    fn default() -> Self {
        SpeedSetting::Named(SpeedLevel::Normal)
    }
}

impl SpeedSetting {
    pub fn multiplier(&self) -> f64 {
        let raw = match self {
            SpeedSetting::Named(level) => level.multiplier(),
            SpeedSetting::Multiplier(m) => *m,
        };
        if raw.is_finite() {
            raw.clamp(MIN_MULTIPLIER, MAX_MULTIPLIER)
        } else {
            1.0
        }
    }
}

impl FromStr for SpeedSetting {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(level) = s.parse::<SpeedLevel>() {
            return Ok(SpeedSetting::Named(level));
        }
        s.trim()
            .parse::<f64>()
            .map(SpeedSetting::Multiplier)
            .map_err(|_| format!("'{}' is neither a speed level nor a multiplier", s))
    }
}

impl fmt::Display for SpeedSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeedSetting::Named(level) => write!(f, "{}", level),
            SpeedSetting::Multiplier(m) => write!(f, "x{}", m),
        }
    }
}

/// Resolved timing profile consumed by every waiting component
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingScheduler {
    setting: SpeedSetting,
    multiplier: f64,
}

impl Default for TimingScheduler {
    fn default() -> Self {
        Self::new(SpeedSetting::default())
    }
}

impl TimingScheduler {
    pub fn new(setting: SpeedSetting) -> Self {
        Self {
            setting,
            multiplier: setting.multiplier(),
        }
    }

    pub fn from_level(level: SpeedLevel) -> Self {
        Self::new(SpeedSetting::Named(level))
    }

    pub fn setting(&self) -> SpeedSetting {
        self.setting
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Scale a base duration by the active profile, in whole milliseconds
    pub fn scale(&self, base: Duration) -> Duration {
        if base.is_zero() {
            return base;
        }
        let millis = (base.as_millis() as f64 * self.multiplier).round() as u64;
        Duration::from_millis(millis).max(MIN_SCALED)
    }

    pub fn nav_primary_timeout(&self) -> Duration {
        self.scale(base::NAV_PRIMARY_TIMEOUT)
    }

    pub fn nav_safety_timeout(&self) -> Duration {
        self.scale(base::NAV_SAFETY_TIMEOUT)
    }

    pub fn nav_poll_interval(&self) -> Duration {
        self.scale(base::NAV_POLL_INTERVAL)
    }

    pub fn dom_ready_poll(&self) -> Duration {
        self.scale(base::DOM_READY_POLL)
    }

    pub fn in_page_settle(&self) -> Duration {
        self.scale(base::IN_PAGE_SETTLE)
    }

    pub fn resolver_backoff(&self) -> Duration {
        self.scale(base::RESOLVER_BACKOFF)
    }

    pub fn resolver_attempts(&self) -> u32 {
        RESOLVER_POLL_ATTEMPTS
    }

    pub fn menu_settle(&self) -> Duration {
        self.scale(base::MENU_SETTLE)
    }

    pub fn after_action(&self) -> Duration {
        self.scale(base::AFTER_ACTION)
    }

    pub fn typing_delay(&self) -> Duration {
        self.scale(base::TYPING_PER_CHAR)
    }

    pub fn step_gap(&self) -> Duration {
        self.scale(base::STEP_GAP)
    }

    /// Pause between capture readiness checks
    pub fn capture_verify_backoff(&self) -> Duration {
        self.scale(base::CAPTURE_VERIFY_BACKOFF)
    }

    /// Event queue poll interval right after (re)instrumentation
    pub fn capture_fast_poll(&self) -> Duration {
        self.scale(base::CAPTURE_FAST_POLL)
    }

    pub fn capture_slow_poll(&self) -> Duration {
        self.scale(base::CAPTURE_SLOW_POLL)
    }

    /// Explicit `wait` steps are pacing too
    pub fn wait_step(&self, seconds: f64) -> Duration {
        if !seconds.is_finite() || seconds <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_millis((seconds * 1000.0 * self.multiplier).round() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_are_ordered() {
        let slow = TimingScheduler::from_level(SpeedLevel::Slow);
        let normal = TimingScheduler::from_level(SpeedLevel::Normal);
        let fast = TimingScheduler::from_level(SpeedLevel::Fast);
        let fastest = TimingScheduler::from_level(SpeedLevel::Fastest);

        assert!(slow.after_action() > normal.after_action());
        assert!(normal.after_action() > fast.after_action());
        assert!(fast.after_action() > fastest.after_action());
        assert_eq!(normal.nav_safety_timeout(), base::NAV_SAFETY_TIMEOUT);
    }

    #[test]
    fn test_safety_timeout_covers_primary_window_and_poll() {
        for level in SpeedLevel::ALL {
            let timing = TimingScheduler::from_level(level);
            assert!(
                timing.nav_safety_timeout() >= timing.nav_primary_timeout() + timing.nav_poll_interval(),
                "profile {} breaks the waiter bounds",
                level
            );
        }
    }

    #[test]
    fn test_scaled_intervals_have_a_floor() {
        let timing = TimingScheduler::new(SpeedSetting::Multiplier(0.0001));
        assert_eq!(timing.multiplier(), MIN_MULTIPLIER);
        assert!(timing.nav_poll_interval() >= MIN_SCALED);
    }

    #[test]
    fn test_parse_speed_setting() {
        assert_eq!(
            "fast".parse::<SpeedSetting>().unwrap(),
            SpeedSetting::Named(SpeedLevel::Fast)
        );
        assert_eq!(
            "0.5".parse::<SpeedSetting>().unwrap(),
            SpeedSetting::Multiplier(0.5)
        );
        assert!("warp".parse::<SpeedSetting>().is_err());
    }

    #[test]
    fn test_speed_setting_from_yaml() {
        let named: SpeedSetting = serde_yaml::from_str("slow").unwrap();
        assert_eq!(named, SpeedSetting::Named(SpeedLevel::Slow));
        let explicit: SpeedSetting = serde_yaml::from_str("1.25").unwrap();
        assert_eq!(explicit, SpeedSetting::Multiplier(1.25));
    }

    #[test]
    fn test_capture_intervals_follow_the_profile() {
        let normal = TimingScheduler::default();
        assert_eq!(normal.capture_fast_poll(), base::CAPTURE_FAST_POLL);
        assert_eq!(normal.capture_slow_poll(), base::CAPTURE_SLOW_POLL);

        let fastest = TimingScheduler::from_level(SpeedLevel::Fastest);
        assert!(fastest.capture_verify_backoff() < normal.capture_verify_backoff());
        assert!(fastest.capture_fast_poll() < fastest.capture_slow_poll());
        assert!(fastest.capture_fast_poll() >= MIN_SCALED);
    }

    #[test]
    fn test_wait_step_scales() {
        let half = TimingScheduler::new(SpeedSetting::Multiplier(0.5));
        assert_eq!(half.wait_step(2.0), Duration::from_secs(1));
        assert_eq!(half.wait_step(-1.0), Duration::ZERO);
    }
}
