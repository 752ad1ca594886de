use std::{fmt, time::Duration};

use parking_lot::Mutex;
use quanta::{Clock, Instant};

const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// An exponentially-weighted moving average of a per-second rate.
#[derive(Debug)]
struct Ewma {
    alpha: f64,
    rate: f64,
    uncounted: i64,
    initialized: bool,
}

impl Ewma {
    /// Creates an average that decays over roughly `minutes` minutes, assuming it is ticked every five seconds.
    fn over_minutes(minutes: f64) -> Self {
        let alpha = 1.0 - (-TICK_INTERVAL.as_secs_f64() / 60.0 / minutes).exp();
        Self { alpha, rate: 0.0, uncounted: 0, initialized: false }
    }

    fn update(&mut self, n: i64) {
        self.uncounted = self.uncounted.wrapping_add(n);
    }

    fn tick(&mut self) {
        let instant_rate = self.uncounted as f64 / TICK_INTERVAL.as_secs_f64();
        self.uncounted = 0;

        if self.initialized {
            self.rate += self.alpha * (instant_rate - self.rate);
        } else {
            self.rate = instant_rate;
            self.initialized = true;
        }
    }

    fn rate(&self) -> f64 {
        self.rate
    }
}

struct MeterState {
    count: i64,
    last_tick: Instant,
    m1: Ewma,
    m5: Ewma,
    m15: Ewma,
}

impl MeterState {
    // Averages only move in whole five-second steps, caught up lazily whenever the meter is touched.
    fn tick_if_necessary(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_tick);
        if elapsed < TICK_INTERVAL {
            return;
        }

        let ticks = elapsed.as_nanos() / TICK_INTERVAL.as_nanos();
        let advance = u64::try_from(ticks * TICK_INTERVAL.as_nanos()).unwrap_or(u64::MAX);
        self.last_tick = self.last_tick + Duration::from_nanos(advance);

        for _ in 0..ticks {
            self.m1.tick();
            self.m5.tick();
            self.m15.tick();
        }
    }
}

/// Measures the rate at which events occur.
///
/// Tracks the total number of events, one-, five- and fifteen-minute exponentially-weighted moving average rates, and
/// the mean rate since the meter was created. All rates are per second.
pub struct Meter {
    clock: Clock,
    start: Instant,
    state: Mutex<MeterState>,
}

impl Meter {
    /// Creates a new `Meter` using the system clock.
    pub fn new() -> Self {
        Self::with_clock(Clock::new())
    }

    /// Creates a new `Meter` using the given clock.
    pub fn with_clock(clock: Clock) -> Self {
        let start = clock.now();
        let state = MeterState {
            count: 0,
            last_tick: start,
            m1: Ewma::over_minutes(1.0),
            m5: Ewma::over_minutes(5.0),
            m15: Ewma::over_minutes(15.0),
        };

        Self { clock, start, state: Mutex::new(state) }
    }

    /// Records `n` events.
    pub fn mark(&self, n: i64) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.tick_if_necessary(now);
        state.count = state.count.wrapping_add(n);
        state.m1.update(n);
        state.m5.update(n);
        state.m15.update(n);
    }

    /// Returns the number of events recorded.
    pub fn count(&self) -> i64 {
        self.state.lock().count
    }

    /// Takes a consistent, read-only snapshot of the meter.
    pub fn snapshot(&self) -> MeterSnapshot {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.tick_if_necessary(now);

        let elapsed = now.saturating_duration_since(self.start).as_secs_f64();
        let rate_mean = if elapsed > 0.0 { state.count as f64 / elapsed } else { 0.0 };

        MeterSnapshot {
            count: state.count,
            rate1: state.m1.rate(),
            rate5: state.m5.rate(),
            rate15: state.m15.rate(),
            rate_mean,
        }
    }
}

impl fmt::Debug for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Meter").field("count", &self.count()).finish_non_exhaustive()
    }
}

impl Default for Meter {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time view of a meter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeterSnapshot {
    count: i64,
    rate1: f64,
    rate5: f64,
    rate15: f64,
    rate_mean: f64,
}

impl MeterSnapshot {
    /// Returns the number of events recorded.
    pub fn count(&self) -> i64 {
        self.count
    }

    /// Returns the one-minute moving average rate.
    pub fn rate1(&self) -> f64 {
        self.rate1
    }

    /// Returns the five-minute moving average rate.
    pub fn rate5(&self) -> f64 {
        self.rate5
    }

    /// Returns the fifteen-minute moving average rate.
    pub fn rate15(&self) -> f64 {
        self.rate15
    }

    /// Returns the mean rate since the meter was created.
    pub fn rate_mean(&self) -> f64 {
        self.rate_mean
    }
}
