use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// What a diff tick asks of the publisher.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Tick {
    /// Whether the caches must be cleared before publishing.
    pub resync: bool,
}

/// Drives the publish loop: a diff tick every diff period, with a resync requested at most once per full period.
///
/// The resync deadline is only looked at when a diff tick fires, so a resync becomes effective on the first diff tick at
/// or after it is due. Overdue diff ticks are skipped rather than replayed in a burst.
pub(crate) struct Schedule {
    diff: Interval,
    resync: ResyncTimer,
}

impl Schedule {
    /// Starts both periods now. The first diff tick fires one diff period from now.
    pub fn new(diff_period: Duration, full_period: Duration) -> Self {
        let start = Instant::now();
        let mut diff = interval_at(start + diff_period, diff_period);
        diff.set_missed_tick_behavior(MissedTickBehavior::Skip);

        Self { diff, resync: ResyncTimer::new(start, full_period) }
    }

    /// Waits for the next diff tick.
    pub async fn tick(&mut self) -> Tick {
        self.diff.tick().await;
        Tick { resync: self.resync.poll_elapsed(Instant::now()) }
    }
}

/// A periodic deadline that is polled rather than awaited.
///
/// Any number of elapsed periods collapse into a single firing.
#[derive(Debug)]
pub(crate) struct ResyncTimer {
    period: Duration,
    next: Instant,
}

impl ResyncTimer {
    pub fn new(start: Instant, period: Duration) -> Self {
        Self { period, next: start + period }
    }

    /// Returns `true` if the deadline has passed since it last fired, and moves it to the first period boundary after
    /// `now`.
    pub fn poll_elapsed(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }

        if self.period.is_zero() {
            return true;
        }

        let behind = now.duration_since(self.next).as_nanos();
        let periods = behind / self.period.as_nanos() + 1;
        let skip = u32::try_from(periods).unwrap_or(u32::MAX);
        self.next += self.period.saturating_mul(skip);

        true
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use super::{ResyncTimer, Schedule};

    const fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn resync_fires_once_per_period() {
        let start = Instant::now();
        let mut timer = ResyncTimer::new(start, secs(60));

        assert!(!timer.poll_elapsed(start + secs(15)));
        assert!(!timer.poll_elapsed(start + secs(45)));
        assert!(timer.poll_elapsed(start + secs(60)));
        assert!(!timer.poll_elapsed(start + secs(75)));
        assert!(timer.poll_elapsed(start + secs(120)));
    }

    #[test]
    fn missed_periods_collapse() {
        let start = Instant::now();
        let mut timer = ResyncTimer::new(start, secs(20));

        assert!(timer.poll_elapsed(start + secs(70)));
        assert!(!timer.poll_elapsed(start + secs(75)));
        assert!(timer.poll_elapsed(start + secs(80)));
    }

    #[test]
    fn resync_fires_on_first_tick_after_due() {
        let start = Instant::now();
        let mut timer = ResyncTimer::new(start, secs(20));

        let fired = (1..=6).map(|i| timer.poll_elapsed(start + secs(15 * i))).collect::<Vec<_>>();
        assert_eq!(fired, vec![false, true, true, true, false, true]);
    }

    #[test]
    fn resync_shorter_than_diff_fires_on_every_tick() {
        let start = Instant::now();
        let mut timer = ResyncTimer::new(start, secs(10));

        assert!((1..=8).all(|i| timer.poll_elapsed(start + secs(15 * i))));
    }

    #[tokio::test(start_paused = true)]
    async fn diff_ticks_carry_resync_requests() {
        let start = Instant::now();
        let mut schedule = Schedule::new(secs(15), secs(60));

        let mut ticks = Vec::new();
        for _ in 0..8 {
            let tick = schedule.tick().await;
            ticks.push((Instant::now().duration_since(start).as_secs(), tick));
        }

        let resyncs = ticks.iter().filter(|(_, tick)| tick.resync).map(|(at, _)| *at).collect::<Vec<_>>();
        assert_eq!(ticks.first().map(|(at, _)| *at), Some(15));
        assert_eq!(ticks.last().map(|(at, _)| *at), Some(120));
        assert_eq!(resyncs, vec![60, 120]);
    }
}
