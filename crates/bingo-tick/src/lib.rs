//! Number-calling clock for Bingo Hall rooms.
//!
//! A [`DrawClock`] starts disarmed: a waiting room has nothing to call.
//! [`DrawClock::arm`] schedules the first tick after the pre-start delay,
//! then ticks once per call interval until [`DrawClock::disarm`].
//!
//! # Integration
//!
//! The clock sits inside a room actor's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* joins, marks, claims */ }
//!         tick = clock.wait_for_tick() => self.call_next_number(tick),
//!     }
//! }
//! ```
//!
//! While disarmed, [`DrawClock::wait_for_tick`] pends forever, so the
//! `select!` only ever wakes for commands.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for one room's clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockConfig {
    /// Time between consecutive calls.
    pub interval: Duration,
    /// Time from arming to the first call.
    pub start_delay: Duration,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            start_delay: Duration::from_secs(10),
        }
    }
}

impl ClockConfig {
    /// Shortest interval the clock will run at.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

    pub fn new(interval: Duration, start_delay: Duration) -> Self {
        Self {
            interval,
            start_delay,
        }
    }

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// Called by [`DrawClock::new`]. A zero interval would spin the room
    /// actor, so it is raised to [`Self::MIN_INTERVAL`].
    pub fn validated(mut self) -> Self {
        if self.interval < Self::MIN_INTERVAL {
            warn!(interval = ?self.interval, "call interval below minimum, clamping");
            self.interval = Self::MIN_INTERVAL;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Tick info
// ---------------------------------------------------------------------------

/// Returned by [`DrawClock::wait_for_tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickInfo {
    /// Ticks since the clock was last armed, starting at 1.
    pub tick: u64,
    /// `true` if the tick fired more than 10% of an interval late.
    pub overrun: bool,
    /// Whole intervals lost to the overrun.
    pub ticks_skipped: u64,
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Paced tick source for one room.
///
/// A late tick restarts the cadence from the moment it fired, so players
/// never see two calls back-to-back after a stall.
pub struct DrawClock {
    config: ClockConfig,
    /// `None` while disarmed.
    next_tick: Option<Instant>,
    tick_count: u64,
}

impl DrawClock {
    /// Creates a disarmed clock.
    pub fn new(config: ClockConfig) -> Self {
        let config = config.validated();
        debug!(
            interval_ms = config.interval.as_millis() as u64,
            start_delay_ms = config.start_delay.as_millis() as u64,
            "draw clock created"
        );
        Self {
            config,
            next_tick: None,
            tick_count: 0,
        }
    }

    /// Schedules the first tick exactly `start_delay` from now.
    ///
    /// Returns `false` (and changes nothing) if already armed.
    pub fn arm(&mut self) -> bool {
        if self.next_tick.is_some() {
            return false;
        }
        self.tick_count = 0;
        self.next_tick = Some(Instant::now() + self.config.start_delay);
        debug!(delay_ms = self.config.start_delay.as_millis() as u64, "draw clock armed");
        true
    }

    /// Stops ticking. Idempotent.
    pub fn disarm(&mut self) {
        if self.next_tick.take().is_some() {
            debug!(ticks = self.tick_count, "draw clock disarmed");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.next_tick.is_some()
    }

    /// Waits until the next tick is due.
    ///
    /// Pends forever while disarmed. Cancel-safe: dropping the future
    /// before it resolves leaves the schedule untouched.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let Some(due) = self.next_tick else {
            std::future::pending::<()>().await;
            unreachable!()
        };

        time::sleep_until(due).await;

        let now = Instant::now();
        let interval = self.config.interval;
        self.tick_count += 1;

        let late_by = now.saturating_duration_since(due);
        let overrun = late_by > interval / 10;
        let ticks_skipped = if overrun {
            (late_by.as_nanos() / interval.as_nanos()) as u64
        } else {
            0
        };
        if ticks_skipped > 0 {
            warn!(
                tick = self.tick_count,
                skipped = ticks_skipped,
                late_ms = late_by.as_millis() as u64,
                "draw clock stalled, restarting cadence"
            );
        }
        self.next_tick = Some(now + interval);
        trace!(tick = self.tick_count, overrun, "draw tick");

        TickInfo {
            tick: self.tick_count,
            overrun,
            ticks_skipped,
        }
    }

    /// Ticks since the last `arm`.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    pub fn start_delay(&self) -> Duration {
        self.config.start_delay
    }
}
