//! Simulation clock and timing ledger.
//!
//! Every timing window in the controller (coyote time, jump buffering,
//! cooldowns, slide/dash auto-exit) is expressed as a timestamp on the
//! [`SimulationClock`] and compared through elapsed deltas. The clock only
//! advances by the fixed timestep, so the same inputs always produce the same
//! decisions regardless of render frame rate.

use bevy::prelude::*;

/// Monotonic simulation clock, advanced once per fixed step.
#[derive(Resource, Reflect, Debug, Clone, Copy, Default, PartialEq)]
#[reflect(Resource)]
pub struct SimulationClock {
    elapsed: f64,
    steps: u64,
}

impl SimulationClock {
    /// Seconds of simulated time since the last reset.
    #[inline]
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Number of steps since the last reset.
    #[inline]
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Advance by one step of `dt` seconds. Non-positive steps are ignored.
    pub fn advance(&mut self, dt: f32) {
        if dt > 0.0 {
            self.elapsed += f64::from(dt);
            self.steps += 1;
        }
    }

    /// Rewind to zero (level restart).
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// A point in simulation time at which a timed effect ends.
///
/// Cancelling or extending an effect is done by overwriting the deadline,
/// so re-entering a state never schedules a second exit.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct Deadline {
    at: f64,
}

impl Deadline {
    /// Deadline `duration` seconds after `now`.
    pub fn after(now: f64, duration: f32) -> Self {
        Self {
            at: now + f64::from(duration),
        }
    }

    /// Time at which the deadline expires.
    #[inline]
    pub fn at(&self) -> f64 {
        self.at
    }

    /// Whether the deadline has been reached.
    #[inline]
    pub fn expired(&self, now: f64) -> bool {
        now >= self.at
    }
}

/// Elapsed time since `since`, or `None` if never stamped or if the clock
/// reads earlier than the stamp (clock reset).
#[inline]
fn elapsed_since(since: Option<f64>, now: f64) -> Option<f64> {
    since.map(|t| now - t).filter(|delta| *delta >= 0.0)
}

/// `true` if the stamp was never set, or if more than `cooldown` has elapsed.
#[inline]
fn cooldown_elapsed(stamp: Option<f64>, now: f64, cooldown: f32) -> bool {
    match stamp {
        None => true,
        Some(_) => elapsed_since(stamp, now).is_some_and(|delta| delta > f64::from(cooldown)),
    }
}

/// Timestamps of the last occurrence of each timed gameplay event.
///
/// `None` stands for "never", which behaves like negative infinity: windows
/// that start at the event are closed, cooldowns that start at it are open.
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq)]
pub struct TimingLedger {
    pub last_grounded: Option<f64>,
    pub last_jump: Option<f64>,
    pub jump_buffered: Option<f64>,
    pub last_slide: Option<f64>,
    pub last_dash: Option<f64>,
}

impl TimingLedger {
    pub fn mark_grounded(&mut self, now: f64) {
        self.last_grounded = Some(now);
    }

    /// Remember a jump press so it can fire within the buffer window.
    pub fn request_jump(&mut self, now: f64) {
        self.jump_buffered = Some(now);
    }

    /// Drop the pending jump press.
    pub fn consume_jump_buffer(&mut self) {
        self.jump_buffered = None;
    }

    pub fn mark_jump(&mut self, now: f64) {
        self.last_jump = Some(now);
    }

    pub fn mark_slide(&mut self, now: f64) {
        self.last_slide = Some(now);
    }

    pub fn mark_dash(&mut self, now: f64) {
        self.last_dash = Some(now);
    }

    /// Still within the grace window after leaving the ground.
    pub fn can_coyote_jump(&self, now: f64, coyote_time: f32) -> bool {
        elapsed_since(self.last_grounded, now).is_some_and(|delta| delta < f64::from(coyote_time))
    }

    /// A jump press younger than `window` is pending.
    pub fn is_jump_buffered(&self, now: f64, window: f32) -> bool {
        elapsed_since(self.jump_buffered, now).is_some_and(|delta| delta < f64::from(window))
    }

    /// Enough time has passed since the last jump for another one.
    pub fn jump_debounced(&self, now: f64, min_interval: f32) -> bool {
        cooldown_elapsed(self.last_jump, now, min_interval)
    }

    /// A jump happened less than `window` ago.
    pub fn jumped_within(&self, now: f64, window: f32) -> bool {
        elapsed_since(self.last_jump, now).is_some_and(|delta| delta < f64::from(window))
    }

    pub fn can_slide(&self, now: f64, cooldown: f32) -> bool {
        cooldown_elapsed(self.last_slide, now, cooldown)
    }

    pub fn can_dash(&self, now: f64, cooldown: f32) -> bool {
        cooldown_elapsed(self.last_dash, now, cooldown)
    }

    /// Forget every timestamp.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
