//! Auto-advance clock - dwell timing for hands-free paging.
//!
//! Runs a fixed 1s check instead of one long timer per dwell interval:
//! - the dwell can change mid-flight without rescheduling anything
//! - a late check fires once as soon as elapsed >= dwell, delays never add up
//!
//! The clock only decides *when*. `Viewer::tick()` performs the advance
//! through the same path as manual navigation.
//!
//! # Usage
//! ```ignore
//! // Main loop, ~60Hz:
//! if clock.check(now) {
//!     if viewer.auto_step() { clock.mark_advanced(now); }
//! }
//! // Manual page change:
//! clock.reset(now);
//! ```

use std::time::{Duration, Instant};

use log::{debug, trace};

/// Default seconds on a page before advancing
pub const DEFAULT_DWELL_SECS: u32 = 13;
pub const MIN_DWELL_SECS: u32 = 1;
pub const MAX_DWELL_SECS: u32 = 60;

/// Cadence of the dwell check
pub const CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Repeating task firing at a fixed wall-clock cadence.
///
/// Missed ticks are skipped: polling late fires once and the next tick stays
/// on the original grid.
#[derive(Debug, Clone)]
pub struct RepeatingTask {
    period: Duration,
    next_due: Option<Instant>,
}

impl RepeatingTask {
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            next_due: None,
        }
    }

    /// Start ticking; first tick one period after `now`
    pub fn start(&mut self, now: Instant) {
        self.next_due = Some(now + self.period);
    }

    pub fn stop(&mut self) {
        self.next_due = None;
    }

    /// Returns true if a tick is due at `now`
    pub fn poll(&mut self, now: Instant) -> bool {
        let Some(mut due) = self.next_due else {
            return false;
        };
        if now < due {
            return false;
        }
        while due <= now {
            due += self.period;
        }
        self.next_due = Some(due);
        true
    }
}

/// Dwell clock state
#[derive(Debug, Clone)]
pub struct AutoAdvance {
    active: bool,
    dwell_seconds: u32,
    last_advance_at: Instant,
    sound_enabled: bool,
    cadence: RepeatingTask,
}

impl AutoAdvance {
    pub fn new(now: Instant) -> Self {
        Self {
            active: false,
            dwell_seconds: DEFAULT_DWELL_SECS,
            last_advance_at: now,
            sound_enabled: true,
            cadence: RepeatingTask::new(CHECK_INTERVAL),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Turn on/off. Turning on restarts the dwell clock.
    pub fn set_active(&mut self, active: bool, now: Instant) {
        if active == self.active {
            return;
        }
        self.active = active;
        if active {
            self.last_advance_at = now;
            self.cadence.start(now);
            debug!("Auto-advance on ({}s)", self.dwell_seconds);
        } else {
            self.cadence.stop();
            debug!("Auto-advance off");
        }
    }

    /// Flip active state, returns the new state
    pub fn toggle(&mut self, now: Instant) -> bool {
        self.set_active(!self.active, now);
        self.active
    }

    pub fn dwell_seconds(&self) -> u32 {
        self.dwell_seconds
    }

    pub fn dwell(&self) -> Duration {
        Duration::from_secs(self.dwell_seconds as u64)
    }

    /// Set dwell, clamped to 1..=60. Takes effect on the next check.
    pub fn set_dwell_seconds(&mut self, seconds: u32) {
        self.dwell_seconds = seconds.clamp(MIN_DWELL_SECS, MAX_DWELL_SECS);
        trace!("Dwell set to {}s", self.dwell_seconds);
    }

    /// One second shorter dwell
    pub fn faster(&mut self) {
        self.set_dwell_seconds(self.dwell_seconds.saturating_sub(1));
    }

    /// One second longer dwell
    pub fn slower(&mut self) {
        self.set_dwell_seconds(self.dwell_seconds + 1);
    }

    pub fn sound_enabled(&self) -> bool {
        self.sound_enabled
    }

    pub fn set_sound_enabled(&mut self, enabled: bool) {
        self.sound_enabled = enabled;
    }

    pub fn last_advance_at(&self) -> Instant {
        self.last_advance_at
    }

    /// Restart the dwell interval (manual navigation)
    pub fn reset(&mut self, now: Instant) {
        self.last_advance_at = now;
    }

    /// Record a performed advance
    pub fn mark_advanced(&mut self, now: Instant) {
        self.last_advance_at = now;
    }

    /// Dwell elapsed, ignoring the check cadence
    pub fn is_due(&self, now: Instant) -> bool {
        self.active && now.saturating_duration_since(self.last_advance_at) >= self.dwell()
    }

    /// Fixed-rate check: true when a check tick is due and the dwell elapsed
    pub fn check(&mut self, now: Instant) -> bool {
        if !self.active || !self.cadence.poll(now) {
            return false;
        }
        self.is_due(now)
    }

    /// Seconds left until the next advance, None when inactive
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.active.then(|| {
            self.dwell()
                .saturating_sub(now.saturating_duration_since(self.last_advance_at))
        })
    }
}
