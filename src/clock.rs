use spacetimedb::SpacetimeType;

/// Whole-second countdown for the current item.
///
/// The host owns the real timer and feeds `tick`. Every start, pause, resume
/// and stop moves to a new epoch; timers armed under an older epoch are
/// ignored by `tick_epoch`, so a cancelled callback can never land.
#[derive(SpacetimeType, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionClock {
    pub time_remaining: u32,
    pub running: bool,
    /// Expiry already reported for this countdown
    pub expired: bool,
    pub epoch: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockTick {
    /// Clock not running (paused, stopped, or already expired)
    Idle,
    /// Tick armed under an epoch that has since been cancelled
    Stale,
    Running(u32),
    /// Reached zero on this tick; reported once per countdown
    Expired,
}

impl SessionClock {
    /// Begin a fresh countdown, cancelling whatever was running
    pub fn start(&mut self, limit_secs: u32) -> u64 {
        self.epoch += 1;
        self.time_remaining = limit_secs;
        self.running = limit_secs > 0;
        self.expired = false;
        self.epoch
    }

    /// Freeze without touching the remaining time
    pub fn pause(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.running = false;
        self.epoch += 1;
        true
    }

    /// Continue from the preserved remaining time
    pub fn resume(&mut self) -> bool {
        if self.running || self.expired || self.time_remaining == 0 {
            return false;
        }
        self.running = true;
        self.epoch += 1;
        true
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.epoch += 1;
    }

    pub fn tick(&mut self, delta_secs: u32) -> ClockTick {
        if !self.running {
            return ClockTick::Idle;
        }
        self.time_remaining = self.time_remaining.saturating_sub(delta_secs);
        if self.time_remaining == 0 {
            self.running = false;
            self.expired = true;
            return ClockTick::Expired;
        }
        ClockTick::Running(self.time_remaining)
    }

    /// `tick` for a host timer armed under `epoch`
    pub fn tick_epoch(&mut self, epoch: u64, delta_secs: u32) -> ClockTick {
        if epoch != self.epoch {
            return ClockTick::Stale;
        }
        self.tick(delta_secs)
    }
}
