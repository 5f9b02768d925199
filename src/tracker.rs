//! Attention debounce state machine: hold hysteresis and trigger cooldown.
//!
//! Consumes the instantaneous per-frame away signal and produces a stable
//! LOOKING/AWAY status plus rate-limited trigger events. The tracker is an
//! explicitly owned state object mutated only by the sentinel loop; controls
//! arriving from other threads are funnelled through that loop's channel
//! before they reach these methods.

use std::time::{Duration, Instant};

use crate::gaze::FocusStatus;

/// Events emitted by the tracker, handed off to registered sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttentionEvent {
    /// Stable status transition (LOOKING, AWAY, or UNKNOWN on deactivation).
    StatusChanged { status: FocusStatus },
    /// Rate-limited "attention lost" trigger; causes a reprimand to be spoken.
    Triggered { at: Instant },
}

/// Operator commands applied between samples.
///
/// `ForceSpeak` is handled by the runtime without touching tracker state; it
/// is carried here so all control intake shares one channel type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Toggle,
    ResetCooldown,
    ForceSpeak,
}

/// Debounced attention state for one observer session.
#[derive(Debug)]
pub struct AttentionTracker {
    away_hold: Duration,
    cooldown: Duration,
    status: FocusStatus,
    /// Start of the current contiguous away run; `Some` iff that run is
    /// non-empty and unbroken by a looking sample.
    away_since: Option<Instant>,
    last_trigger_at: Option<Instant>,
    active: bool,
}

impl AttentionTracker {
    #[must_use = "tracker state must be retained across samples"]
    pub fn new(away_hold: Duration, cooldown: Duration) -> Self {
        Self {
            away_hold,
            cooldown,
            status: FocusStatus::Unknown,
            away_since: None,
            last_trigger_at: None,
            active: true,
        }
    }

    /// Feed one classified sample. Timestamps must be non-decreasing.
    ///
    /// Returns zero, one, or two events: an AWAY transition and its trigger
    /// can fire on the same sample, status change first.
    pub fn observe(&mut self, is_away: bool, now: Instant) -> Vec<AttentionEvent> {
        let mut events = Vec::new();
        if !self.active {
            return events;
        }

        if !is_away {
            self.away_since = None;
            if self.status != FocusStatus::Looking {
                self.status = FocusStatus::Looking;
                events.push(AttentionEvent::StatusChanged {
                    status: FocusStatus::Looking,
                });
            }
            return events;
        }

        let Some(away_since) = self.away_since else {
            // Start of a new away run; status holds until the hysteresis
            // window elapses.
            self.away_since = Some(now);
            return events;
        };

        if now.duration_since(away_since) < self.away_hold {
            return events;
        }

        if self.status != FocusStatus::Away {
            self.status = FocusStatus::Away;
            events.push(AttentionEvent::StatusChanged {
                status: FocusStatus::Away,
            });
        }

        let cooled_down = match self.last_trigger_at {
            None => true,
            Some(last) => now.duration_since(last) >= self.cooldown,
        };
        if cooled_down {
            self.last_trigger_at = Some(now);
            events.push(AttentionEvent::Triggered { at: now });
        }

        events
    }

    /// Flip the active flag.
    ///
    /// Deactivation forces UNKNOWN and clears the away run, but keeps
    /// `last_trigger_at` so re-activating mid-cooldown still respects the
    /// cooldown. Reactivation starts fresh; the next away run must satisfy
    /// the full hold again.
    pub fn toggle_active(&mut self) -> Option<AttentionEvent> {
        self.active = !self.active;
        if self.active {
            return None;
        }
        self.away_since = None;
        if self.status != FocusStatus::Unknown {
            self.status = FocusStatus::Unknown;
            return Some(AttentionEvent::StatusChanged {
                status: FocusStatus::Unknown,
            });
        }
        None
    }

    /// Forget the last trigger so the next qualifying away sample may fire
    /// immediately. Status and the away run are untouched.
    pub fn reset_cooldown(&mut self) {
        self.last_trigger_at = None;
    }

    #[must_use = "status queries should feed the broadcaster or logs"]
    pub fn status(&self) -> FocusStatus {
        self.status
    }

    #[must_use = "active flag should drive operator-facing state"]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Duration of the current away run, zero when not in one.
    #[must_use = "away duration feeds status payloads"]
    pub fn away_duration(&self, now: Instant) -> Duration {
        self.away_since
            .map(|since| now.saturating_duration_since(since))
            .unwrap_or(Duration::ZERO)
    }

    /// Time since the last trigger, `None` when none has fired yet.
    #[must_use = "cooldown introspection feeds status payloads"]
    pub fn time_since_last_trigger(&self, now: Instant) -> Option<Duration> {
        self.last_trigger_at
            .map(|last| now.saturating_duration_since(last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOLD: Duration = Duration::from_millis(600);
    const COOLDOWN: Duration = Duration::from_millis(2000);

    fn tracker() -> AttentionTracker {
        AttentionTracker::new(HOLD, COOLDOWN)
    }

    fn at(base: Instant, secs: f64) -> Instant {
        base + Duration::from_secs_f64(secs)
    }

    fn status_changed(status: FocusStatus) -> AttentionEvent {
        AttentionEvent::StatusChanged { status }
    }

    #[test]
    fn first_looking_sample_leaves_unknown() {
        let base = Instant::now();
        let mut tracker = tracker();
        assert_eq!(tracker.status(), FocusStatus::Unknown);
        let events = tracker.observe(false, at(base, 0.0));
        assert_eq!(events, vec![status_changed(FocusStatus::Looking)]);
        assert_eq!(tracker.status(), FocusStatus::Looking);
    }

    #[test]
    fn away_run_is_silent_until_hold_elapses() {
        let base = Instant::now();
        let mut tracker = tracker();
        tracker.observe(false, at(base, 0.0));

        assert!(tracker.observe(true, at(base, 0.1)).is_empty());
        assert!(tracker.observe(true, at(base, 0.3)).is_empty());
        assert!(tracker.observe(true, at(base, 0.69)).is_empty());
        assert_eq!(tracker.status(), FocusStatus::Looking);

        let events = tracker.observe(true, at(base, 0.7));
        assert_eq!(
            events,
            vec![
                status_changed(FocusStatus::Away),
                AttentionEvent::Triggered { at: at(base, 0.7) },
            ]
        );
        assert_eq!(tracker.status(), FocusStatus::Away);
    }

    #[test]
    fn away_transition_happens_exactly_once_per_run() {
        let base = Instant::now();
        let mut tracker = tracker();
        tracker.observe(true, at(base, 0.0));
        let first = tracker.observe(true, at(base, 0.6));
        assert!(first.contains(&status_changed(FocusStatus::Away)));

        // Still away: no further status change, cooldown suppresses triggers.
        assert!(tracker.observe(true, at(base, 1.0)).is_empty());
        assert!(tracker.observe(true, at(base, 2.0)).is_empty());
    }

    #[test]
    fn cooldown_spaces_triggers() {
        let base = Instant::now();
        let mut tracker = tracker();
        tracker.observe(true, at(base, 0.0));
        let events = tracker.observe(true, at(base, 0.6));
        assert!(events.contains(&AttentionEvent::Triggered { at: at(base, 0.6) }));

        // Persistently away: nothing until t0 + cooldown.
        assert!(tracker.observe(true, at(base, 1.5)).is_empty());
        assert!(tracker.observe(true, at(base, 2.59)).is_empty());
        let retrigger = tracker.observe(true, at(base, 2.6));
        assert_eq!(
            retrigger,
            vec![AttentionEvent::Triggered { at: at(base, 2.6) }]
        );
    }

    #[test]
    fn looking_sample_resets_hold_timer() {
        let base = Instant::now();
        let mut tracker = tracker();
        tracker.observe(true, at(base, 0.0));
        tracker.observe(true, at(base, 0.5));

        let events = tracker.observe(false, at(base, 0.55));
        assert_eq!(events, vec![status_changed(FocusStatus::Looking)]);
        assert_eq!(tracker.away_duration(at(base, 0.55)), Duration::ZERO);

        // New run must accumulate the full hold again.
        tracker.observe(true, at(base, 0.6));
        assert!(tracker.observe(true, at(base, 1.1)).is_empty());
        let events = tracker.observe(true, at(base, 1.2));
        assert!(events.contains(&status_changed(FocusStatus::Away)));
    }

    #[test]
    fn reset_cooldown_allows_immediate_retrigger() {
        let base = Instant::now();
        let mut tracker = tracker();
        tracker.observe(true, at(base, 0.0));
        tracker.observe(true, at(base, 0.6));

        tracker.reset_cooldown();
        assert_eq!(tracker.time_since_last_trigger(at(base, 0.7)), None);
        assert_eq!(tracker.status(), FocusStatus::Away);

        // Well inside the original cooldown window.
        let events = tracker.observe(true, at(base, 0.7));
        assert_eq!(
            events,
            vec![AttentionEvent::Triggered { at: at(base, 0.7) }]
        );
    }

    #[test]
    fn reset_cooldown_does_not_shortcut_the_hold() {
        let base = Instant::now();
        let mut tracker = tracker();
        tracker.observe(false, at(base, 0.0));
        tracker.reset_cooldown();

        tracker.observe(true, at(base, 0.1));
        assert!(tracker.observe(true, at(base, 0.3)).is_empty());
    }

    #[test]
    fn deactivation_forces_unknown_and_suppresses_samples() {
        let base = Instant::now();
        let mut tracker = tracker();
        tracker.observe(false, at(base, 0.0));

        let event = tracker.toggle_active();
        assert!(!tracker.is_active());
        assert_eq!(event, Some(status_changed(FocusStatus::Unknown)));
        assert_eq!(tracker.status(), FocusStatus::Unknown);

        // Samples are ignored while inactive.
        assert!(tracker.observe(true, at(base, 1.0)).is_empty());
        assert!(tracker.observe(true, at(base, 5.0)).is_empty());
        assert_eq!(tracker.status(), FocusStatus::Unknown);
    }

    #[test]
    fn reactivation_requires_fresh_hold() {
        let base = Instant::now();
        let mut tracker = tracker();
        tracker.observe(true, at(base, 0.0));
        tracker.observe(true, at(base, 0.5));

        tracker.toggle_active();
        let event = tracker.toggle_active();
        assert!(tracker.is_active());
        assert_eq!(event, None);

        // The pre-toggle away run is gone; a new one starts from scratch.
        tracker.observe(true, at(base, 0.55));
        assert!(tracker.observe(true, at(base, 1.0)).is_empty());
        let events = tracker.observe(true, at(base, 1.15));
        assert!(events.contains(&status_changed(FocusStatus::Away)));
    }

    #[test]
    fn reactivation_mid_cooldown_still_respects_cooldown() {
        let base = Instant::now();
        let mut tracker = tracker();
        tracker.observe(true, at(base, 0.0));
        tracker.observe(true, at(base, 0.6)); // trigger at 0.6

        tracker.toggle_active();
        tracker.toggle_active();

        // New away run satisfies the hold at 1.6, but the trigger from 0.6
        // keeps the cooldown gate closed until 2.6.
        tracker.observe(true, at(base, 1.0));
        let events = tracker.observe(true, at(base, 1.6));
        assert_eq!(events, vec![status_changed(FocusStatus::Away)]);

        let events = tracker.observe(true, at(base, 2.7));
        assert_eq!(
            events,
            vec![AttentionEvent::Triggered { at: at(base, 2.7) }]
        );
    }

    #[test]
    fn zero_hold_declares_away_on_second_sample() {
        let base = Instant::now();
        let mut tracker = AttentionTracker::new(Duration::ZERO, COOLDOWN);
        assert!(tracker.observe(true, at(base, 0.0)).is_empty());
        let events = tracker.observe(true, at(base, 0.01));
        assert!(events.contains(&status_changed(FocusStatus::Away)));
    }

    #[test]
    fn away_duration_tracks_current_run() {
        let base = Instant::now();
        let mut tracker = tracker();
        assert_eq!(tracker.away_duration(at(base, 0.0)), Duration::ZERO);
        tracker.observe(true, at(base, 1.0));
        assert_eq!(
            tracker.away_duration(at(base, 1.5)),
            Duration::from_millis(500)
        );
    }
}
