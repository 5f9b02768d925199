//! Sentinel loop: the single serialization point for samples and controls.
//!
//! One thread owns the tracker. Samples arrive from the measurement source
//! on one channel and operator commands on another; applying both here keeps
//! the tracker's invariants safe without any locking around its state.

use std::time::Instant;

use crossbeam_channel::{never, select, Receiver};

use crate::bridge::BridgeSink;
use crate::config::Thresholds;
use crate::gaze::{is_away, GazeSample};
use crate::protocol::WireEvent;
use crate::sink::{EventRecord, SinkRegistry};
use crate::speech::{LinePicker, SpeechHandle};
use crate::tracker::{AttentionEvent, AttentionTracker, ControlCommand};

pub const CONTROL_CHANNEL_CAPACITY: usize = 8;

/// Owns the tracker, the sink registry, and the reprimand line rotation.
pub struct SentinelLoop {
    thresholds: Thresholds,
    tracker: AttentionTracker,
    sinks: SinkRegistry,
    picker: LinePicker,
    /// Direct hand-offs for force-speak, which bypasses the state machine.
    speech: Option<SpeechHandle>,
    bridge: Option<BridgeSink>,
    default_line: String,
}

impl SentinelLoop {
    #[must_use = "the loop must be run for the sentinel to do anything"]
    pub fn new(
        thresholds: Thresholds,
        sinks: SinkRegistry,
        picker: LinePicker,
        speech: Option<SpeechHandle>,
        bridge: Option<BridgeSink>,
        default_line: String,
    ) -> Self {
        Self {
            tracker: AttentionTracker::new(thresholds.away_hold, thresholds.cooldown),
            thresholds,
            sinks,
            picker,
            speech,
            bridge,
            default_line,
        }
    }

    /// Drain samples and controls until the sample channel disconnects.
    pub fn run(&mut self, sample_rx: Receiver<GazeSample>, control_rx: Receiver<ControlCommand>) {
        let mut control_rx = Some(control_rx);
        loop {
            let control = control_rx.clone().unwrap_or_else(never);
            select! {
                recv(sample_rx) -> sample => match sample {
                    Ok(sample) => self.process_sample(&sample),
                    Err(_) => break, // Measurement source is gone; we are done.
                },
                recv(control) -> command => match command {
                    Ok(command) => self.handle_control(command),
                    Err(_) => control_rx = None,
                },
            }
        }
        tracing::debug!("sentinel loop exiting");
    }

    fn process_sample(&mut self, sample: &GazeSample) {
        let away = is_away(sample, &self.thresholds);
        for event in self.tracker.observe(away, sample.timestamp) {
            let line = match event {
                AttentionEvent::Triggered { .. } => Some(self.picker.next_line()),
                AttentionEvent::StatusChanged { .. } => None,
            };
            match &event {
                AttentionEvent::StatusChanged { status } => {
                    tracing::info!(%status, "focus status changed");
                }
                AttentionEvent::Triggered { .. } => {
                    tracing::info!(
                        line = line.as_deref().unwrap_or_default(),
                        "attention lost; reprimand dispatched"
                    );
                }
            }
            let record =
                EventRecord::capture(&event, &self.tracker, sample.timestamp, Some(sample), line);
            self.sinks.dispatch(&record);
        }
    }

    fn handle_control(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::Toggle => {
                let event = self.tracker.toggle_active();
                tracing::info!(active = self.tracker.is_active(), "sentinel toggled");
                if let Some(event) = event {
                    let record =
                        EventRecord::capture(&event, &self.tracker, Instant::now(), None, None);
                    self.sinks.dispatch(&record);
                }
            }
            ControlCommand::ResetCooldown => {
                self.tracker.reset_cooldown();
                tracing::info!("cooldown reset");
            }
            ControlCommand::ForceSpeak => self.force_speak(),
        }
    }

    /// Operator-initiated speak: straight to the sinks that care, with no
    /// tracker mutation and no durable event record.
    fn force_speak(&self) {
        tracing::info!(line = %self.default_line, "manual speak requested");
        if let Some(speech) = &self.speech {
            speech.request(self.default_line.clone());
        }
        if let Some(bridge) = &self.bridge {
            bridge.broadcast(&WireEvent::Roast {
                text: self.default_line.clone(),
            });
        }
    }

    #[cfg(test)]
    pub(crate) fn tracker(&self) -> &AttentionTracker {
        &self.tracker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gaze::FocusStatus;
    use crate::sink::test_support::RecordingSink;
    use crate::sink::EventKind;
    use crossbeam_channel::bounded;
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    fn test_loop() -> (SentinelLoop, Arc<Mutex<Vec<crate::sink::EventRecord>>>) {
        let (sink, records) = RecordingSink::new();
        let mut sinks = SinkRegistry::new();
        sinks.register(Box::new(sink));
        let sentinel = SentinelLoop::new(
            Thresholds::default(),
            sinks,
            LinePicker::new(vec!["first".into(), "second".into()], "fallback"),
            None,
            None,
            "fallback".to_string(),
        );
        (sentinel, records)
    }

    fn sample(base: Instant, ms: u64, yaw: f32) -> GazeSample {
        GazeSample {
            timestamp: base + Duration::from_millis(ms),
            face_detected: true,
            yaw_deg: yaw,
            pitch_deg: 0.0,
            gaze_ratio: Some(0.5),
        }
    }

    #[test]
    fn away_run_produces_status_then_trigger_with_rotating_line() {
        let (mut sentinel, records) = test_loop();
        let base = Instant::now();
        sentinel.process_sample(&sample(base, 0, 0.0));
        sentinel.process_sample(&sample(base, 100, 30.0));
        sentinel.process_sample(&sample(base, 700, 30.0));

        let records = records.lock().unwrap();
        let kinds: Vec<_> = records.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::StatusChanged, // LOOKING at t=0
                EventKind::StatusChanged, // AWAY at t=700
                EventKind::Triggered,
            ]
        );
        assert_eq!(records[1].status, FocusStatus::Away);
        assert_eq!(records[2].line.as_deref(), Some("first"));
        assert_eq!(records[2].yaw_deg, Some(30.0));
    }

    #[test]
    fn toggle_emits_unknown_record_and_suppresses_samples() {
        let (mut sentinel, records) = test_loop();
        let base = Instant::now();
        sentinel.process_sample(&sample(base, 0, 0.0));
        sentinel.handle_control(ControlCommand::Toggle);
        sentinel.process_sample(&sample(base, 100, 30.0));
        sentinel.process_sample(&sample(base, 900, 30.0));

        let records = records.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].status, FocusStatus::Unknown);
        assert_eq!(records[1].yaw_deg, None);
        assert!(!sentinel.tracker().is_active());
    }

    #[test]
    fn reset_cooldown_enables_next_away_sample_to_trigger() {
        let (mut sentinel, records) = test_loop();
        let base = Instant::now();
        sentinel.process_sample(&sample(base, 0, 30.0));
        sentinel.process_sample(&sample(base, 600, 30.0)); // AWAY + trigger
        sentinel.handle_control(ControlCommand::ResetCooldown);
        sentinel.process_sample(&sample(base, 700, 30.0)); // re-trigger

        let records = records.lock().unwrap();
        let triggers: Vec<_> = records
            .iter()
            .filter(|r| r.kind == EventKind::Triggered)
            .collect();
        assert_eq!(triggers.len(), 2);
        assert_eq!(triggers[0].line.as_deref(), Some("first"));
        assert_eq!(triggers[1].line.as_deref(), Some("second"));
    }

    #[test]
    fn force_speak_leaves_tracker_and_records_untouched() {
        let (mut sentinel, records) = test_loop();
        let base = Instant::now();
        sentinel.process_sample(&sample(base, 0, 30.0));
        sentinel.handle_control(ControlCommand::ForceSpeak);

        assert!(records.lock().unwrap().is_empty());
        assert_eq!(sentinel.tracker().status(), FocusStatus::Unknown);
        assert!(sentinel.tracker().away_duration(base) <= Duration::from_millis(1));
    }

    #[test]
    fn run_drains_both_channels_until_source_disconnects() {
        let (mut sentinel, records) = test_loop();
        let (sample_tx, sample_rx) = bounded(8);
        let (control_tx, control_rx) = bounded(CONTROL_CHANNEL_CAPACITY);
        let base = Instant::now();

        let worker = thread::spawn(move || {
            sentinel.run(sample_rx, control_rx);
            sentinel
        });

        sample_tx.send(sample(base, 0, 0.0)).unwrap();
        thread::sleep(Duration::from_millis(50));
        control_tx.send(ControlCommand::Toggle).unwrap();
        drop(control_tx); // Loop must keep serving samples after this.
        thread::sleep(Duration::from_millis(50));
        sample_tx.send(sample(base, 100, 30.0)).unwrap();
        drop(sample_tx);

        let sentinel = worker.join().expect("loop thread");
        assert!(!sentinel.tracker().is_active());
        let records = records.lock().unwrap();
        assert!(records
            .iter()
            .any(|r| r.kind == EventKind::StatusChanged && r.status == FocusStatus::Unknown));
    }
}
