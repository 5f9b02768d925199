//! Event fan-out: records handed to registered sinks, fire-and-forget.
//!
//! The tracker's contract is satisfied once a record is handed off here;
//! sink failures stay local to the sink and never propagate back into the
//! classification path.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::gaze::{FocusStatus, GazeSample};
use crate::tracker::{AttentionEvent, AttentionTracker};

/// Event kind tag in durable records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    StatusChanged,
    Triggered,
}

/// One durable row per emitted event: wall-clock timestamp, kind, status,
/// and the measurement that produced it (absent for control-driven events).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Wall-clock milliseconds since the Unix epoch.
    pub ts_ms: u64,
    pub kind: EventKind,
    pub status: FocusStatus,
    /// Length of the away run at emission time, in milliseconds.
    pub away_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yaw_deg: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch_deg: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gaze_ratio: Option<f32>,
    /// Reprimand line chosen for a trigger, when one was dispatched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<String>,
}

impl EventRecord {
    /// Build a record for a tracker event, capturing derived metrics from
    /// the sample that caused it (control-driven events carry no sample).
    #[must_use = "records exist to be dispatched to sinks"]
    pub fn capture(
        event: &AttentionEvent,
        tracker: &AttentionTracker,
        now: Instant,
        sample: Option<&GazeSample>,
        line: Option<String>,
    ) -> Self {
        let kind = match event {
            AttentionEvent::StatusChanged { .. } => EventKind::StatusChanged,
            AttentionEvent::Triggered { .. } => EventKind::Triggered,
        };
        Self {
            ts_ms: epoch_ms(),
            kind,
            status: tracker.status(),
            away_ms: tracker.away_duration(now).as_millis() as u64,
            yaw_deg: sample.map(|s| s.yaw_deg),
            pitch_deg: sample.map(|s| s.pitch_deg),
            gaze_ratio: sample.and_then(|s| s.gaze_ratio),
            line,
        }
    }
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A consumer of emitted event records.
///
/// Implementations must not block the caller; anything slow (synthesis,
/// network delivery) hands off to its own worker and returns.
pub trait EventSink: Send {
    fn handle(&mut self, record: &EventRecord);
}

/// Ordered registry of sinks; dispatch visits each in registration order.
#[derive(Default)]
pub struct SinkRegistry {
    sinks: Vec<Box<dyn EventSink>>,
}

impl SinkRegistry {
    #[must_use = "an empty registry drops all events"]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn dispatch(&mut self, record: &EventRecord) {
        for sink in &mut self.sinks {
            sink.handle(record);
        }
    }

    #[must_use = "sink count is only useful for assertions and logs"]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    #[must_use = "emptiness check is only useful for assertions and logs"]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}
