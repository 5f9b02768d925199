//! CLI flag schema so sentinel startup behavior is explicit and discoverable.
//!
//! Flags override the config file, which overrides built-in defaults.
//! Threshold values are bounds-checked at parse time; cross-field checks
//! happen once in [`Cli::resolve`] after merging.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use gazeguard::config::{
    load_file_config, BridgeConfig, SpeechConfig, Thresholds, MAX_ANGLE_DEG, MAX_AWAY_HOLD_MS,
    MAX_COOLDOWN_MS,
};
use gazeguard::eventlog::DEFAULT_EVENT_LOG;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "gazeguard",
    about = "Attention sentinel that calls out wandering gazes",
    author,
    version
)]
pub(crate) struct Cli {
    /// Config file path (defaults to ~/.config/gazeguard/config.toml)
    #[arg(long = "config")]
    pub(crate) config: Option<PathBuf>,

    /// Replay a built-in sample script instead of reading samples from stdin
    #[arg(long = "demo", default_value_t = false)]
    pub(crate) demo: bool,

    /// Max head yaw deviation from center in degrees
    #[arg(long = "yaw-deg", value_parser = parse_angle_deg)]
    pub(crate) yaw_deg: Option<f32>,

    /// Max head pitch deviation from center in degrees
    #[arg(long = "pitch-deg", value_parser = parse_angle_deg)]
    pub(crate) pitch_deg: Option<f32>,

    /// Lower edge of the acceptable horizontal gaze-ratio band [0.0, 1.0]
    #[arg(long = "gaze-center-min", value_parser = parse_ratio)]
    pub(crate) gaze_center_min: Option<f32>,

    /// Upper edge of the acceptable horizontal gaze-ratio band [0.0, 1.0]
    #[arg(long = "gaze-center-max", value_parser = parse_ratio)]
    pub(crate) gaze_center_max: Option<f32>,

    /// Sustained-away time required before declaring AWAY (ms)
    #[arg(long = "away-hold-ms", value_parser = parse_hold_ms)]
    pub(crate) away_hold_ms: Option<u64>,

    /// Minimum spacing between spoken reprimands (ms)
    #[arg(long = "cooldown-ms", value_parser = parse_cooldown_ms)]
    pub(crate) cooldown_ms: Option<u64>,

    /// Host for the websocket status bridge
    #[arg(long = "ws-host")]
    pub(crate) ws_host: Option<String>,

    /// Port for the websocket status bridge
    #[arg(long = "ws-port")]
    pub(crate) ws_port: Option<u16>,

    /// Disable the websocket status bridge
    #[arg(long = "no-ws", default_value_t = false)]
    pub(crate) no_ws: bool,

    /// External synthesizer command (the line is appended as the last arg)
    #[arg(long = "speech-command")]
    pub(crate) speech_command: Option<String>,

    /// Disable spoken reprimands
    #[arg(long = "no-speech", default_value_t = false)]
    pub(crate) no_speech: bool,

    /// Append-only JSONL event log path
    #[arg(long = "event-log")]
    pub(crate) event_log: Option<PathBuf>,

    /// Enable local telemetry logging
    #[arg(long = "logs", default_value_t = false)]
    pub(crate) logs: bool,

    /// Force telemetry off, overriding --logs
    #[arg(long = "no-logs", default_value_t = false)]
    pub(crate) no_logs: bool,
}

/// Fully merged and validated startup configuration.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedConfig {
    pub(crate) thresholds: Thresholds,
    pub(crate) speech: SpeechConfig,
    pub(crate) bridge: BridgeConfig,
    pub(crate) event_log: PathBuf,
    pub(crate) demo: bool,
    pub(crate) telemetry: bool,
}

impl Cli {
    pub(crate) fn resolve(&self) -> Result<ResolvedConfig> {
        let file = load_file_config(self.config.as_deref())?;

        let mut thresholds = file.thresholds.merge_over_defaults();
        if let Some(yaw) = self.yaw_deg {
            thresholds.yaw_deg = yaw;
        }
        if let Some(pitch) = self.pitch_deg {
            thresholds.pitch_deg = pitch;
        }
        if let Some(min) = self.gaze_center_min {
            thresholds.gaze_center_min = min;
        }
        if let Some(max) = self.gaze_center_max {
            thresholds.gaze_center_max = max;
        }
        if let Some(hold) = self.away_hold_ms {
            thresholds.away_hold = Duration::from_millis(hold);
        }
        if let Some(cooldown) = self.cooldown_ms {
            thresholds.cooldown = Duration::from_millis(cooldown);
        }
        thresholds.validate()?;

        let mut speech = file.speech;
        if let Some(command) = &self.speech_command {
            speech.command = command.clone();
        }
        if self.no_speech {
            speech.enabled = false;
        }

        let mut bridge = file.bridge;
        if let Some(host) = &self.ws_host {
            bridge.host = host.clone();
        }
        if let Some(port) = self.ws_port {
            bridge.port = port;
        }
        if self.no_ws {
            bridge.enabled = false;
        }

        Ok(ResolvedConfig {
            thresholds,
            speech,
            bridge,
            event_log: self
                .event_log
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_EVENT_LOG)),
            demo: self.demo,
            telemetry: self.logs && !self.no_logs,
        })
    }
}

fn parse_angle_deg(raw: &str) -> Result<f32, String> {
    let value: f32 = raw
        .parse()
        .map_err(|_| format!("invalid angle '{raw}'"))?;
    if !value.is_finite() || value <= 0.0 || value > MAX_ANGLE_DEG {
        return Err(format!("angle must be in (0, {MAX_ANGLE_DEG}] degrees"));
    }
    Ok(value)
}

fn parse_ratio(raw: &str) -> Result<f32, String> {
    let value: f32 = raw
        .parse()
        .map_err(|_| format!("invalid gaze ratio '{raw}'"))?;
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err("gaze ratio must be between 0.0 and 1.0".to_string());
    }
    Ok(value)
}

fn parse_hold_ms(raw: &str) -> Result<u64, String> {
    let value: u64 = raw
        .parse()
        .map_err(|_| format!("invalid hold duration '{raw}'"))?;
    if value > MAX_AWAY_HOLD_MS {
        return Err(format!("away hold must be at most {MAX_AWAY_HOLD_MS} ms"));
    }
    Ok(value)
}

fn parse_cooldown_ms(raw: &str) -> Result<u64, String> {
    let value: u64 = raw
        .parse()
        .map_err(|_| format!("invalid cooldown '{raw}'"))?;
    if value > MAX_COOLDOWN_MS {
        return Err(format!("cooldown must be at most {MAX_COOLDOWN_MS} ms"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gazeguard::config::{DEFAULT_COOLDOWN_MS, DEFAULT_YAW_DEG};
    use std::io::Write;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("gazeguard").chain(args.iter().copied()))
    }

    #[test]
    fn defaults_resolve_to_builtin_thresholds() {
        let resolved = parse(&[]).resolve().expect("defaults resolve");
        assert_eq!(resolved.thresholds.yaw_deg, DEFAULT_YAW_DEG);
        assert_eq!(
            resolved.thresholds.cooldown,
            Duration::from_millis(DEFAULT_COOLDOWN_MS)
        );
        assert!(resolved.speech.enabled);
        assert!(resolved.bridge.enabled);
        assert!(!resolved.telemetry);
        assert_eq!(resolved.event_log, PathBuf::from(DEFAULT_EVENT_LOG));
    }

    #[test]
    fn flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp config");
        writeln!(
            file,
            "[thresholds]\nyaw_deg = 40.0\ncooldown_ms = 5000\n\n[bridge]\nport = 9001"
        )
        .expect("write config");

        let path = file.path().to_string_lossy().to_string();
        let resolved = parse(&["--config", &path, "--yaw-deg", "25", "--ws-port", "9002"])
            .resolve()
            .expect("resolve");
        assert_eq!(resolved.thresholds.yaw_deg, 25.0);
        assert_eq!(resolved.thresholds.cooldown, Duration::from_millis(5000));
        assert_eq!(resolved.bridge.port, 9002);
    }

    #[test]
    fn out_of_range_values_are_rejected_at_parse_time() {
        assert!(Cli::try_parse_from(["gazeguard", "--yaw-deg", "120"]).is_err());
        assert!(Cli::try_parse_from(["gazeguard", "--yaw-deg", "-5"]).is_err());
        assert!(Cli::try_parse_from(["gazeguard", "--gaze-center-min", "1.5"]).is_err());
        assert!(Cli::try_parse_from(["gazeguard", "--away-hold-ms", "nope"]).is_err());
        assert!(Cli::try_parse_from(["gazeguard", "--cooldown-ms", "999999999"]).is_err());
    }

    #[test]
    fn inverted_gaze_band_fails_cross_validation() {
        let err = parse(&["--gaze-center-min", "0.8", "--gaze-center-max", "0.2"])
            .resolve()
            .unwrap_err();
        assert!(err.to_string().contains("gaze center band is empty"));
    }

    #[test]
    fn kill_switches_disable_subsystems() {
        let resolved = parse(&["--no-ws", "--no-speech", "--logs", "--no-logs"])
            .resolve()
            .expect("resolve");
        assert!(!resolved.bridge.enabled);
        assert!(!resolved.speech.enabled);
        assert!(!resolved.telemetry);
    }

    #[test]
    fn missing_explicit_config_fails_resolution() {
        let err = parse(&["--config", "/nonexistent/gazeguard.toml"])
            .resolve()
            .unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
