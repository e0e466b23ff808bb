//! Short-lived overlay animations (heart burst, play/pause glyph).
//!
//! Each [`Transient`] walks `Idle -> In -> Hold -> Out -> Idle` on the
//! durations of its [`Envelope`]. Callers drive it with the current instant
//! from their tick loop; nothing here owns a timer thread.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    pub fade_in: Duration,
    pub hold: Duration,
    pub fade_out: Duration,
}

impl Envelope {
    pub const fn from_millis(fade_in: u64, hold: u64, fade_out: u64) -> Self {
        Self {
            fade_in: Duration::from_millis(fade_in),
            hold: Duration::from_millis(hold),
            fade_out: Duration::from_millis(fade_out),
        }
    }

    pub fn total(&self) -> Duration {
        self.fade_in + self.hold + self.fade_out
    }
}

/// Heart burst: scale 0 -> 1, hold, back to 0.
pub const HEART_BURST: Envelope = Envelope::from_millis(200, 300, 200);
/// Play/pause glyph: fade in, hold, fade out.
pub const PLAY_PAUSE_GLYPH: Envelope = Envelope::from_millis(200, 1200, 300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    In,
    Hold,
    Out,
}

#[derive(Debug, Clone)]
pub struct Transient {
    envelope: Envelope,
    phase: Phase,
    started_at: Option<Instant>,
}

impl Transient {
    pub fn new(envelope: Envelope) -> Self {
        Self {
            envelope,
            phase: Phase::Idle,
            started_at: None,
        }
    }

    /// Restarts from the beginning, even if already running.
    pub fn start(&mut self, now: Instant) {
        self.started_at = Some(now);
        self.phase = Phase::In;
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_visible(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Advances the phase. Returns true when it changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let next = self.phase_at(now);
        if next == self.phase {
            return false;
        }
        self.phase = next;
        if next == Phase::Idle {
            self.started_at = None;
        }
        true
    }

    fn phase_at(&self, now: Instant) -> Phase {
        let Some(started) = self.started_at else {
            return Phase::Idle;
        };
        let elapsed = now.saturating_duration_since(started);
        let env = &self.envelope;
        if elapsed < env.fade_in {
            Phase::In
        } else if elapsed < env.fade_in + env.hold {
            Phase::Hold
        } else if elapsed < env.total() {
            Phase::Out
        } else {
            Phase::Idle
        }
    }

    /// Scale or opacity in `0.0..=1.0`.
    pub fn level(&self, now: Instant) -> f32 {
        let Some(started) = self.started_at else {
            return 0.0;
        };
        let elapsed = now.saturating_duration_since(started);
        let env = &self.envelope;
        match self.phase_at(now) {
            Phase::Idle => 0.0,
            Phase::In => ratio(elapsed, env.fade_in),
            Phase::Hold => 1.0,
            Phase::Out => 1.0 - ratio(elapsed - env.fade_in - env.hold, env.fade_out),
        }
    }
}

fn ratio(part: Duration, whole: Duration) -> f32 {
    if whole.is_zero() {
        return 1.0;
    }
    (part.as_secs_f32() / whole.as_secs_f32()).clamp(0.0, 1.0)
}
