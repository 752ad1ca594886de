use std::{fmt, time::Duration};

use parking_lot::Mutex;
use quanta::{Clock, Instant};

use super::{
    histogram::{Histogram, HistogramSnapshot},
    meter::{Meter, MeterSnapshot},
};

/// Captures both the distribution of durations and the rate at which they occur.
///
/// Durations are recorded in nanoseconds. Every snapshot sees the histogram and the meter at the same point, so
/// `snapshot.histogram().count()` and `snapshot.rates().count()` always agree.
pub struct Timer {
    clock: Clock,
    // Held across both halves of an update or snapshot.
    guard: Mutex<()>,
    histogram: Histogram,
    meter: Meter,
}

impl Timer {
    /// Creates a new `Timer` using the system clock.
    pub fn new() -> Self {
        Self::with_clock(Clock::new())
    }

    /// Creates a new `Timer` using the given clock for rates and for [`Timer::time`].
    pub fn with_clock(clock: Clock) -> Self {
        Self { guard: Mutex::new(()), histogram: Histogram::new(), meter: Meter::with_clock(clock.clone()), clock }
    }

    /// Records the duration of a single event.
    pub fn update(&self, duration: Duration) {
        let nanos = i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX);
        let _guard = self.guard.lock();
        self.histogram.update(nanos);
        self.meter.mark(1);
    }

    /// Records the time elapsed since `start`, as measured by this timer's clock.
    pub fn update_since(&self, start: Instant) {
        self.update(self.clock.now().saturating_duration_since(start));
    }

    /// Runs `f`, recording how long it took.
    pub fn time<F, T>(&self, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let start = self.clock.now();
        let result = f();
        self.update_since(start);
        result
    }

    /// Returns the number of events recorded.
    pub fn count(&self) -> i64 {
        self.histogram.count()
    }

    /// Takes a read-only snapshot of the timer.
    pub fn snapshot(&self) -> TimerSnapshot {
        let _guard = self.guard.lock();
        TimerSnapshot { histogram: self.histogram.snapshot(), rates: self.meter.snapshot() }
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer").field("count", &self.count()).finish_non_exhaustive()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time view of a timer.
#[derive(Clone, Debug, PartialEq)]
pub struct TimerSnapshot {
    histogram: HistogramSnapshot,
    rates: MeterSnapshot,
}

impl TimerSnapshot {
    /// Returns the distribution of recorded durations, in nanoseconds.
    pub fn histogram(&self) -> &HistogramSnapshot {
        &self.histogram
    }

    /// Returns the rates at which events were recorded.
    pub fn rates(&self) -> &MeterSnapshot {
        &self.rates
    }

    /// Returns the number of events recorded.
    pub fn count(&self) -> i64 {
        self.histogram.count()
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use quanta::Clock;

    use super::Timer;

    #[test]
    fn records_durations_and_rates() {
        let (clock, mock) = Clock::mock();
        let timer = Timer::with_clock(clock);

        timer.update(Duration::from_nanos(10));
        timer.update(Duration::from_nanos(30));
        mock.increment(Duration::from_secs(5));

        let snapshot = timer.snapshot();
        assert_eq!(snapshot.count(), 2);
        assert_eq!(snapshot.histogram().min(), 10);
        assert_eq!(snapshot.histogram().max(), 30);
        assert_eq!(snapshot.histogram().mean(), 20.0);
        assert_eq!(snapshot.rates().count(), 2);
        assert!((snapshot.rates().rate1() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn time_measures_the_closure() {
        let (clock, mock) = Clock::mock();
        let timer = Timer::with_clock(clock);

        let value = timer.time(|| {
            mock.increment(Duration::from_millis(250));
            42
        });

        assert_eq!(value, 42);
        assert_eq!(timer.count(), 1);
        assert_eq!(timer.snapshot().histogram().max(), 250_000_000);
    }

    #[test]
    fn snapshots_are_consistent_under_concurrent_updates() {
        let timer = Timer::new();

        thread::scope(|s| {
            let writers = (0..4)
                .map(|_| {
                    s.spawn(|| {
                        for _ in 0..20_000 {
                            timer.update(Duration::from_nanos(5));
                        }
                    })
                })
                .collect::<Vec<_>>();

            while !writers.iter().all(|w| w.is_finished()) {
                let snapshot = timer.snapshot();
                assert_eq!(snapshot.histogram().count(), snapshot.rates().count());
            }
        });

        let snapshot = timer.snapshot();
        assert_eq!(snapshot.count(), 80_000);
        assert_eq!(snapshot.rates().count(), 80_000);
    }

    #[test]
    fn debug_shows_the_count() {
        let timer = Timer::new();
        timer.update(Duration::from_millis(1));
        assert_eq!(format!("{timer:?}"), "Timer { count: 1, .. }");
    }
}
