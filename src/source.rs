//! Measurement intake: per-frame samples from the pose estimation process.
//!
//! The estimator is an external collaborator. It pipes one JSON object per
//! line on stdin; camera loss must be signalled as `face: false`, which the
//! classifier already treats as away. A scripted source stands in for the
//! estimator in demo mode and tests.

use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, TrySendError};
use serde::Deserialize;

use crate::gaze::GazeSample;

pub const SAMPLE_CHANNEL_CAPACITY: usize = 32;

/// Wire form of one measurement frame.
///
/// `ts_ms` is the producer's monotonic clock in milliseconds; it is anchored
/// to a process-local `Instant` origin on arrival.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct WireSample {
    pub ts_ms: u64,
    pub face: bool,
    pub yaw: f32,
    pub pitch: f32,
    #[serde(default)]
    pub gaze: Option<f32>,
}

impl WireSample {
    #[must_use = "anchored samples should be fed to the sentinel loop"]
    pub fn anchored(self, origin: Instant) -> GazeSample {
        GazeSample {
            timestamp: origin + Duration::from_millis(self.ts_ms),
            face_detected: self.face,
            yaw_deg: self.yaw,
            pitch_deg: self.pitch,
            gaze_ratio: self.gaze,
        }
    }
}

fn forward_sample(tx: &Sender<GazeSample>, sample: GazeSample) -> bool {
    match tx.try_send(sample) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            // Frames are a lossy stream; dropping under backpressure is fine.
            tracing::debug!("sample dropped: channel full");
            true
        }
        Err(TrySendError::Disconnected(_)) => false,
    }
}

/// Read newline-JSON samples from stdin until EOF or stop.
///
/// Malformed lines are input anomalies, not errors: they are logged and
/// skipped so one bad frame cannot take the pipeline down.
pub fn spawn_stdin_reader(
    origin: Instant,
    tx: Sender<GazeSample>,
    stop_flag: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let stdin = io::stdin();
        let stdin_lock = stdin.lock();

        for line in stdin_lock.lines() {
            if stop_flag.load(Ordering::Relaxed) {
                break;
            }
            let line = match line {
                Ok(line) => line,
                Err(_) => break,
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<WireSample>(trimmed) {
                Ok(wire) => {
                    if !forward_sample(&tx, wire.anchored(origin)) {
                        break; // Sentinel loop has exited.
                    }
                }
                Err(err) => {
                    tracing::debug!(%err, "skipping malformed sample line");
                }
            }
        }
        tracing::debug!("sample reader thread exiting");
    })
}

/// Replay a fixed script of frames in real time, then stop.
pub fn spawn_scripted_source(
    script: Vec<WireSample>,
    origin: Instant,
    tx: Sender<GazeSample>,
    stop_flag: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        for wire in script {
            if stop_flag.load(Ordering::Relaxed) {
                break;
            }
            let due = origin + Duration::from_millis(wire.ts_ms);
            let now = Instant::now();
            if due > now {
                thread::sleep(due - now);
            }
            if !forward_sample(&tx, wire.anchored(origin)) {
                break;
            }
        }
        tracing::debug!("scripted source finished");
    })
}

/// Built-in demo script: attentive, then a sustained look-away long enough
/// to trigger a reprimand, then back.
#[must_use = "the demo script must be handed to a scripted source"]
pub fn demo_script() -> Vec<WireSample> {
    let mut frames = Vec::new();
    let frame_ms = 50;
    let mut push = |range_ms: std::ops::Range<u64>, face: bool, yaw: f32, gaze: Option<f32>| {
        let mut ts = range_ms.start;
        while ts < range_ms.end {
            frames.push(WireSample {
                ts_ms: ts,
                face,
                yaw,
                pitch: 0.0,
                gaze,
            });
            ts += frame_ms;
        }
    };
    push(0..1000, true, 0.0, Some(0.5)); // settled and attentive
    push(1000..2000, true, 35.0, None); // sustained look-away
    push(2000..2500, true, 0.0, Some(0.5)); // caught, back to work
    push(2500..3200, false, 0.0, None); // walks off entirely
    push(3200..3600, true, 0.0, Some(0.5));
    frames
}
