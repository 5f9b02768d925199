//! Per-frame gaze measurements and the instantaneous away classifier.
//!
//! One `GazeSample` arrives per processed camera frame from the pose
//! estimation process. Classification here is stateless; all debouncing
//! lives in [`crate::tracker`].

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::config::Thresholds;

/// Stable focus status as seen by operators and presentation layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FocusStatus {
    Looking,
    Away,
    /// Held only before the first classified sample or while the sentinel
    /// is toggled inactive.
    Unknown,
}

impl std::fmt::Display for FocusStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FocusStatus::Looking => "LOOKING",
            FocusStatus::Away => "AWAY",
            FocusStatus::Unknown => "UNKNOWN",
        };
        write!(f, "{label}")
    }
}

/// One head-pose/gaze measurement for a single frame.
///
/// `gaze_ratio` is absent when iris landmarks were unavailable (eyes closed
/// or occluded); head pose remains valid in that case.
#[derive(Debug, Clone, Copy)]
pub struct GazeSample {
    /// Monotonic capture time supplied by the measurement source.
    pub timestamp: Instant,
    pub face_detected: bool,
    pub yaw_deg: f32,
    pub pitch_deg: f32,
    /// Horizontal iris position normalized to [0, 1] across the eye corners.
    pub gaze_ratio: Option<f32>,
}

impl GazeSample {
    /// Convenience constructor for a centered, attentive frame.
    #[must_use = "constructed samples should be fed to the classifier"]
    pub fn centered(timestamp: Instant) -> Self {
        Self {
            timestamp,
            face_detected: true,
            yaw_deg: 0.0,
            pitch_deg: 0.0,
            gaze_ratio: Some(0.5),
        }
    }
}

/// Instantaneous away-ness for one frame, ignoring history.
///
/// Rule order matters: a missing face is inattention outright, head pose is
/// the dominant signal, and the gaze ratio only tightens the center band when
/// iris data is available. A missing `gaze_ratio` never by itself means away.
#[must_use = "classification result drives the attention tracker"]
pub fn is_away(sample: &GazeSample, thresholds: &Thresholds) -> bool {
    if !sample.face_detected {
        return true;
    }
    if sample.yaw_deg.abs() > thresholds.yaw_deg || sample.pitch_deg.abs() > thresholds.pitch_deg {
        return true;
    }
    if let Some(ratio) = sample.gaze_ratio {
        if ratio < thresholds.gaze_center_min || ratio > thresholds.gaze_center_max {
            return true;
        }
    }
    false
}
