#![forbid(unsafe_code)]

//! Repeating-timer facility for timed sources.
//!
//! [`Scheduler`] is a single-threaded timer table driven explicitly by its
//! host. Time comes from one of two clocks:
//!
//! - **Real**: wall-clock time since the scheduler was created
//!   (`web_time::Instant`). [`Scheduler::advance`] blocks for the requested
//!   duration, firing timers as they fall due; [`Scheduler::poll`] fires
//!   whatever is due without blocking.
//! - **Lab**: a manual clock for deterministic tests. `advance` jumps
//!   straight to each due time.
//!
//! # Invariants
//!
//! 1. Timers fire in due-time order; ties fire in start order.
//! 2. A timer started with interval `i` at time `t` fires at `t + k·i`.
//! 3. `stop` is idempotent and takes effect immediately, including from
//!    inside the timer's own tick.
//! 4. The scheduler holds no borrow while a tick runs, so ticks may start
//!    and stop timers.
//!
//! # Failure Modes
//!
//! - **Runaway timers**: if more than
//!   [`SchedulerConfig::max_fires_per_advance`] fires fall within one
//!   `advance`, it stops early with [`SourceError::RunawayTimers`]; the clock
//!   is left at the last fire.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use web_time::{Duration, Instant};

use crate::config::SchedulerConfig;
use crate::error::{Result, SourceError};

/// Opaque identity of a started timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl TimerHandle {
    /// Raw handle value (for tracing/logging).
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Start/stop capability for repeating timers.
pub trait TimerFacility {
    /// Start calling `tick` every `interval`.
    fn start(&self, interval: Duration, tick: Box<dyn FnMut()>) -> TimerHandle;

    /// Stop a timer. Unknown or already stopped handles are ignored.
    fn stop(&self, handle: TimerHandle);
}

// ─── Clock ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Clock {
    Real { epoch: Instant },
    Lab { now: Duration },
}

impl Clock {
    fn now(&self) -> Duration {
        match self {
            Self::Real { epoch } => epoch.elapsed(),
            Self::Lab { now } => *now,
        }
    }
}

// ─── Timer table ─────────────────────────────────────────────────────────────

struct Timer {
    interval: Duration,
    due: Duration,
    /// Taken out while the tick runs.
    tick: Option<Box<dyn FnMut()>>,
}

struct Inner {
    clock: Clock,
    config: SchedulerConfig,
    timers: BTreeMap<TimerHandle, Timer>,
    next_handle: u64,
    started: u64,
    stopped: u64,
    fired: u64,
}

impl Inner {
    fn next_due_before(&self, target: Duration) -> Option<(TimerHandle, Duration)> {
        self.timers
            .iter()
            .filter(|(_, t)| t.tick.is_some() && t.due <= target)
            .min_by_key(|(handle, t)| (t.due, **handle))
            .map(|(handle, t)| (*handle, t.due))
    }
}

/// Single-threaded timer scheduler. Clones share one timer table.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<RefCell<Inner>>,
}

impl Scheduler {
    /// A scheduler on the real clock with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// A scheduler on the real clock.
    #[must_use]
    pub fn with_config(config: SchedulerConfig) -> Self {
        Self::build(
            Clock::Real {
                epoch: Instant::now(),
            },
            config,
        )
    }

    /// A scheduler on a manual lab clock starting at zero.
    #[must_use]
    pub fn lab() -> Self {
        Self::lab_with_config(SchedulerConfig::default())
    }

    /// A lab-clock scheduler with an explicit configuration.
    #[must_use]
    pub fn lab_with_config(config: SchedulerConfig) -> Self {
        Self::build(Clock::Lab { now: Duration::ZERO }, config)
    }

    fn build(clock: Clock, config: SchedulerConfig) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                clock,
                config,
                timers: BTreeMap::new(),
                next_handle: 1,
                started: 0,
                stopped: 0,
                fired: 0,
            })),
        }
    }

    /// Time elapsed on this scheduler's clock.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.inner.borrow().clock.now()
    }

    /// Whether this scheduler runs on the lab clock.
    #[must_use]
    pub fn is_lab(&self) -> bool {
        matches!(self.inner.borrow().clock, Clock::Lab { .. })
    }

    /// Number of timers currently running.
    #[must_use]
    pub fn active_timers(&self) -> usize {
        self.inner.borrow().timers.len()
    }

    /// Total timers ever started.
    #[must_use]
    pub fn timers_started(&self) -> u64 {
        self.inner.borrow().started
    }

    /// Total timers ever stopped.
    #[must_use]
    pub fn timers_stopped(&self) -> u64 {
        self.inner.borrow().stopped
    }

    /// Total timer fires.
    #[must_use]
    pub fn fires(&self) -> u64 {
        self.inner.borrow().fired
    }

    /// Due time of the next timer to fire, if any.
    #[must_use]
    pub fn next_due(&self) -> Option<Duration> {
        self.inner.borrow().timers.values().map(|t| t.due).min()
    }

    /// Move time forward by `delta`, firing every timer that falls due on the
    /// way. Returns the number of fires.
    ///
    /// On the real clock this blocks the calling thread for `delta`.
    pub fn advance(&self, delta: Duration) -> Result<usize> {
        let target = self.now().saturating_add(delta);
        self.run_until(target, true)
    }

    /// Fire every timer already due, without moving the clock. Returns the
    /// number of fires.
    pub fn poll(&self) -> Result<usize> {
        let now = self.now();
        self.run_until(now, false)
    }

    fn run_until(&self, target: Duration, wait: bool) -> Result<usize> {
        let (limit, start) = {
            let inner = self.inner.borrow();
            (inner.config.limit(), inner.clock.now())
        };
        let mut fired = 0usize;
        loop {
            let next = self.inner.borrow().next_due_before(target);
            let Some((handle, due)) = next else {
                break;
            };
            if let Some(limit) = limit
                && fired >= limit
            {
                tracing::warn!(fired, limit, "scheduler.runaway");
                return Err(SourceError::runaway(
                    fired,
                    limit,
                    due.saturating_sub(start),
                ));
            }
            if wait {
                self.wait_until(due);
            }

            let tick = {
                let mut inner = self.inner.borrow_mut();
                let Some(timer) = inner.timers.get_mut(&handle) else {
                    continue;
                };
                timer.due = timer.due.saturating_add(timer.interval);
                let tick = timer.tick.take();
                inner.fired += 1;
                tick
            };
            let Some(mut tick) = tick else {
                continue;
            };
            tick();
            fired += 1;

            // Put the tick back unless the timer stopped itself.
            if let Some(timer) = self.inner.borrow_mut().timers.get_mut(&handle)
                && timer.tick.is_none()
            {
                timer.tick = Some(tick);
            }
        }
        if wait {
            self.wait_until(target);
        }
        Ok(fired)
    }

    fn wait_until(&self, at: Duration) {
        let clock = self.inner.borrow().clock;
        match clock {
            Clock::Lab { now } => {
                if at > now {
                    self.inner.borrow_mut().clock = Clock::Lab { now: at };
                }
            }
            Clock::Real { epoch } => {
                let remaining = at.saturating_sub(epoch.elapsed());
                if !remaining.is_zero() {
                    std::thread::sleep(remaining);
                }
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerFacility for Scheduler {
    /// Intervals shorter than one nanosecond are rounded up to one.
    fn start(&self, interval: Duration, tick: Box<dyn FnMut()>) -> TimerHandle {
        let interval = interval.max(Duration::from_nanos(1));
        let mut inner = self.inner.borrow_mut();
        let handle = TimerHandle(inner.next_handle);
        inner.next_handle += 1;
        inner.started += 1;
        let due = inner.clock.now().saturating_add(interval);
        inner.timers.insert(
            handle,
            Timer {
                interval,
                due,
                tick: Some(tick),
            },
        );
        tracing::debug!(
            timer = handle.raw(),
            interval_us = u64::try_from(interval.as_micros()).unwrap_or(u64::MAX),
            "timer.start"
        );
        handle
    }

    fn stop(&self, handle: TimerHandle) {
        let removed = {
            let mut inner = self.inner.borrow_mut();
            let removed = inner.timers.remove(&handle);
            if removed.is_some() {
                inner.stopped += 1;
            }
            removed
        };
        if removed.is_some() {
            tracing::debug!(timer = handle.raw(), "timer.stop");
        }
        drop(removed);
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Scheduler")
            .field("clock", &inner.clock)
            .field("active", &inner.timers.len())
            .field("started", &inner.started)
            .field("stopped", &inner.stopped)
            .field("fired", &inner.fired)
            .finish()
    }
}
