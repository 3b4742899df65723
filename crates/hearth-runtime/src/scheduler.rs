//! Clocks, countdown timers and period parsing.

#![allow(missing_docs)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::Mutex;
use smol_str::SmolStr;
use tracing::debug;

use crate::error::RuntimeError;
use crate::store::StateStore;

pub const ONE_SECOND_MS: u64 = 1_000;
pub const ONE_MINUTE_MS: u64 = 60 * ONE_SECOND_MS;
pub const ONE_HOUR_MS: u64 = 60 * ONE_MINUTE_MS;

/// Time source for the control loop.
pub trait Clock: Send + Sync + 'static {
    /// Monotonic time since the clock started.
    fn now(&self) -> Duration;

    /// Blocks until `deadline` (no-op if already past).
    fn sleep_until(&self, deadline: Duration);
}

/// Monotonic clock based on `std::time::Instant`.
#[derive(Debug, Clone)]
pub struct StdClock {
    start: Instant,
}

impl StdClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep_until(&self, deadline: Duration) {
        if let Some(delta) = deadline.checked_sub(self.now()) {
            thread::sleep(delta);
        }
    }
}

/// Deterministic clock for tests and simulations.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance time by the given delta.
    pub fn advance(&self, delta: Duration) -> Duration {
        let mut now = self.now.lock();
        *now = now.saturating_add(delta);
        *now
    }

    pub fn set_time(&self, time: Duration) {
        *self.now.lock() = time;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }

    fn sleep_until(&self, deadline: Duration) {
        let mut now = self.now.lock();
        if *now < deadline {
            *now = deadline;
        }
    }
}

/// State key holding the seconds remaining on timer `name`.
#[must_use]
pub fn timer_key(name: &str) -> SmolStr {
    SmolStr::new(format!("timer{name}"))
}

#[derive(Debug, Clone, Copy)]
struct Countdown {
    deadline: Duration,
    reported: i64,
}

/// Named countdown timers mirrored into the live partition.
#[derive(Debug, Default)]
pub struct TimerTable {
    timers: IndexMap<SmolStr, Countdown>,
}

impl TimerTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms (or re-arms) timer `name` to expire `period` after `now`.
    pub fn start(&mut self, name: &str, period: Duration, now: Duration, store: &mut StateStore) {
        let remaining = seconds_left(period);
        debug!(timer = name, period_ms = period.as_millis(), "timer start");
        self.timers.insert(
            SmolStr::new(name),
            Countdown {
                deadline: now.saturating_add(period),
                reported: remaining,
            },
        );
        store.write_live(timer_key(name), remaining);
    }

    /// Disarms timer `name`; returns whether it was running.
    pub fn stop(&mut self, name: &str, store: &mut StateStore) -> bool {
        let running = self.timers.shift_remove(name).is_some();
        debug!(timer = name, running, "timer stop");
        store.write_live(timer_key(name), 0);
        running
    }

    #[must_use]
    pub fn is_running(&self, name: &str) -> bool {
        self.timers.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Updates remaining seconds and expires due timers.
    ///
    /// Remaining time is only written when the whole-second value changes.
    /// Returns the names of timers that expired on this pass.
    pub fn service(&mut self, now: Duration, store: &mut StateStore) -> Vec<SmolStr> {
        let mut expired = Vec::new();
        for (name, countdown) in &mut self.timers {
            match countdown.deadline.checked_sub(now) {
                Some(left) if !left.is_zero() => {
                    let remaining = seconds_left(left);
                    if remaining != countdown.reported {
                        countdown.reported = remaining;
                        store.write_live(timer_key(name), remaining);
                    }
                }
                _ => expired.push(name.clone()),
            }
        }
        for name in &expired {
            self.timers.shift_remove(name);
            debug!(timer = name.as_str(), "timer expired");
            store.write_live(timer_key(name), 0);
        }
        expired
    }
}

fn seconds_left(left: Duration) -> i64 {
    let millis = left.as_millis();
    let secs = millis.div_ceil(u128::from(ONE_SECOND_MS));
    i64::try_from(secs).unwrap_or(i64::MAX)
}

/// Parses a period such as `500ms`, `5s`, `2m`, `1h` or a bare number of
/// `default_unit_ms` units.
///
/// A token containing `digit` names an integer state key whose value is
/// taken as a count of default units.
pub fn parse_period(
    text: &str,
    default_unit_ms: u64,
    store: &StateStore,
) -> Result<Duration, RuntimeError> {
    let text = text.trim();
    let invalid = |reason: &str| RuntimeError::invalid_argument("period", text, reason);
    if text.is_empty() {
        return Err(invalid("missing"));
    }
    let (count, unit) = if text.contains("digit") {
        let value = store
            .read_int(text)
            .ok_or_else(|| invalid("no integer value under key"))?;
        let value = u64::try_from(value).map_err(|_| invalid("negative"))?;
        (value, default_unit_ms)
    } else {
        let (number, unit) = if let Some(number) = text.strip_suffix("ms") {
            (number, 1)
        } else if let Some(number) = text.strip_suffix('s') {
            (number, ONE_SECOND_MS)
        } else if let Some(number) = text.strip_suffix('m') {
            (number, ONE_MINUTE_MS)
        } else if let Some(number) = text.strip_suffix('h') {
            (number, ONE_HOUR_MS)
        } else {
            (text, default_unit_ms)
        };
        let count = number
            .parse::<u64>()
            .map_err(|_| invalid("not a number"))?;
        (count, unit)
    };
    count
        .checked_mul(unit)
        .map(Duration::from_millis)
        .ok_or_else(|| invalid("overflow"))
}
