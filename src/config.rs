//! Threshold and runtime configuration with load-time validation.
//!
//! Settings come from an optional TOML file (`~/.config/gazeguard/config.toml`
//! by default) merged with CLI flags; flags always take precedence. Threshold
//! values are validated once here so the tracker can assume sane, immutable
//! configuration for the rest of the run.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

const CONFIG_FILE: &str = "config.toml";
const CONFIG_DIR_ENV: &str = "GAZEGUARD_CONFIG_DIR";

pub const DEFAULT_YAW_DEG: f32 = 20.0;
pub const DEFAULT_PITCH_DEG: f32 = 15.0;
pub const DEFAULT_GAZE_CENTER_MIN: f32 = 0.35;
pub const DEFAULT_GAZE_CENTER_MAX: f32 = 0.65;
pub const DEFAULT_AWAY_HOLD_MS: u64 = 600;
pub const DEFAULT_COOLDOWN_MS: u64 = 2000;

pub const MAX_ANGLE_DEG: f32 = 90.0;
pub const MAX_AWAY_HOLD_MS: u64 = 60_000;
pub const MAX_COOLDOWN_MS: u64 = 600_000;

const DEFAULT_WS_HOST: &str = "127.0.0.1";
const DEFAULT_WS_PORT: u16 = 8765;
const DEFAULT_SPEECH_COMMAND: &str = "say";

/// Validated, immutable classification and debounce thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Max allowed head yaw deviation from center, in degrees.
    pub yaw_deg: f32,
    /// Max allowed head pitch deviation from center, in degrees.
    pub pitch_deg: f32,
    /// Lower edge of the acceptable horizontal gaze-ratio band.
    pub gaze_center_min: f32,
    /// Upper edge of the acceptable horizontal gaze-ratio band.
    pub gaze_center_max: f32,
    /// Sustained-away duration required before declaring AWAY.
    pub away_hold: Duration,
    /// Minimum spacing between trigger events.
    pub cooldown: Duration,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            yaw_deg: DEFAULT_YAW_DEG,
            pitch_deg: DEFAULT_PITCH_DEG,
            gaze_center_min: DEFAULT_GAZE_CENTER_MIN,
            gaze_center_max: DEFAULT_GAZE_CENTER_MAX,
            away_hold: Duration::from_millis(DEFAULT_AWAY_HOLD_MS),
            cooldown: Duration::from_millis(DEFAULT_COOLDOWN_MS),
        }
    }
}

impl Thresholds {
    /// Reject out-of-range values with a descriptive error.
    ///
    /// Runs once at load time; the tracker performs no runtime validation.
    pub fn validate(&self) -> Result<()> {
        if !self.yaw_deg.is_finite() || self.yaw_deg <= 0.0 || self.yaw_deg > MAX_ANGLE_DEG {
            bail!(
                "yaw threshold must be in (0, {MAX_ANGLE_DEG}] degrees, got {}",
                self.yaw_deg
            );
        }
        if !self.pitch_deg.is_finite() || self.pitch_deg <= 0.0 || self.pitch_deg > MAX_ANGLE_DEG {
            bail!(
                "pitch threshold must be in (0, {MAX_ANGLE_DEG}] degrees, got {}",
                self.pitch_deg
            );
        }
        if !self.gaze_center_min.is_finite() || !(0.0..=1.0).contains(&self.gaze_center_min) {
            bail!(
                "gaze center minimum must be in [0, 1], got {}",
                self.gaze_center_min
            );
        }
        if !self.gaze_center_max.is_finite() || !(0.0..=1.0).contains(&self.gaze_center_max) {
            bail!(
                "gaze center maximum must be in [0, 1], got {}",
                self.gaze_center_max
            );
        }
        if self.gaze_center_min >= self.gaze_center_max {
            bail!(
                "gaze center band is empty: min {} >= max {}",
                self.gaze_center_min,
                self.gaze_center_max
            );
        }
        if self.away_hold > Duration::from_millis(MAX_AWAY_HOLD_MS) {
            bail!(
                "away hold must be at most {MAX_AWAY_HOLD_MS} ms, got {} ms",
                self.away_hold.as_millis()
            );
        }
        if self.cooldown > Duration::from_millis(MAX_COOLDOWN_MS) {
            bail!(
                "cooldown must be at most {MAX_COOLDOWN_MS} ms, got {} ms",
                self.cooldown.as_millis()
            );
        }
        Ok(())
    }
}

/// Spoken-reprimand configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpeechConfig {
    pub enabled: bool,
    /// External synthesizer command; the line to speak is appended as the
    /// final argument.
    pub command: String,
    /// Reprimand lines spoken round-robin on each trigger.
    pub lines: Vec<String>,
    /// Line spoken on an operator force-speak request.
    pub default_line: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: DEFAULT_SPEECH_COMMAND.to_string(),
            lines: vec![
                "Eyes on the screen.".to_string(),
                "Back to work.".to_string(),
                "Your screen misses you.".to_string(),
                "Focus. Now.".to_string(),
            ],
            default_line: "Pay attention.".to_string(),
        }
    }
}

/// Websocket status bridge configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: DEFAULT_WS_HOST.to_string(),
            port: DEFAULT_WS_PORT,
        }
    }
}

/// Threshold overrides as they appear in the config file. All optional so a
/// partial `[thresholds]` table merges cleanly over the defaults.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThresholdsFile {
    pub yaw_deg: Option<f32>,
    pub pitch_deg: Option<f32>,
    pub gaze_center_min: Option<f32>,
    pub gaze_center_max: Option<f32>,
    pub away_hold_ms: Option<u64>,
    pub cooldown_ms: Option<u64>,
}

impl ThresholdsFile {
    /// Apply file values over the built-in defaults. The result still goes
    /// through [`Thresholds::validate`] after CLI overrides are layered on.
    #[must_use = "merged thresholds must still be validated"]
    pub fn merge_over_defaults(&self) -> Thresholds {
        let defaults = Thresholds::default();
        Thresholds {
            yaw_deg: self.yaw_deg.unwrap_or(defaults.yaw_deg),
            pitch_deg: self.pitch_deg.unwrap_or(defaults.pitch_deg),
            gaze_center_min: self.gaze_center_min.unwrap_or(defaults.gaze_center_min),
            gaze_center_max: self.gaze_center_max.unwrap_or(defaults.gaze_center_max),
            away_hold: self
                .away_hold_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.away_hold),
            cooldown: self
                .cooldown_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.cooldown),
        }
    }
}

/// On-disk configuration file contents.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    pub thresholds: ThresholdsFile,
    pub speech: SpeechConfig,
    pub bridge: BridgeConfig,
}

/// Resolve the config directory, honoring the env override used by tests
/// and packaging scripts.
fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = env::var(CONFIG_DIR_ENV) {
        let trimmed = dir.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }
    dirs::home_dir().map(|home| home.join(".config").join("gazeguard"))
}

/// Full path of the default config file, if a home directory is resolvable.
pub fn config_file_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join(CONFIG_FILE))
}

/// Load the config file.
///
/// An explicitly requested path must exist and parse; the default path is
/// allowed to be absent, in which case defaults apply.
pub fn load_file_config(explicit: Option<&Path>) -> Result<FileConfig> {
    let (path, required) = match explicit {
        Some(path) => (path.to_path_buf(), true),
        None => match config_file_path() {
            Some(path) => (path, false),
            None => return Ok(FileConfig::default()),
        },
    };

    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if !required => {
            tracing::debug!(path = %path.display(), %err, "no config file; using defaults");
            return Ok(FileConfig::default());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read config file {}", path.display()))
        }
    };

    toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}
