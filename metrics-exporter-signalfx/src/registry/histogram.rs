use std::fmt;

use parking_lot::Mutex;
use rand::Rng as _;

/// Default number of samples retained by a [`Histogram`].
pub const DEFAULT_RESERVOIR_SIZE: usize = 1028;

struct Reservoir {
    size: usize,
    count: i64,
    values: Vec<i64>,
}

impl Reservoir {
    fn new(size: usize) -> Self {
        Self { size, count: 0, values: Vec::with_capacity(size) }
    }

    // Uniform (Vitter's algorithm R) sampling over everything recorded since the last clear.
    fn push(&mut self, value: i64) {
        self.count += 1;
        if self.values.len() < self.size {
            self.values.push(value);
        } else {
            let idx = rand::rng().random_range(0..self.count);
            if let Ok(idx) = usize::try_from(idx) {
                if idx < self.values.len() {
                    self.values[idx] = value;
                }
            }
        }
    }

    fn clear(&mut self) {
        self.count = 0;
        self.values.clear();
    }
}

/// A histogram of integer values backed by a uniform sampling reservoir.
///
/// The reservoir holds a fixed number of samples regardless of how many values are recorded, and every recorded value
/// has an equal chance of being retained. The total number of recorded values is tracked exactly.
pub struct Histogram {
    reservoir: Mutex<Reservoir>,
}

impl Histogram {
    /// Creates a new `Histogram` with the default reservoir size.
    pub fn new() -> Self {
        Self::with_reservoir_size(DEFAULT_RESERVOIR_SIZE)
    }

    /// Creates a new `Histogram` retaining at most `size` samples.
    ///
    /// A size of zero is treated as one.
    pub fn with_reservoir_size(size: usize) -> Self {
        Self { reservoir: Mutex::new(Reservoir::new(size.max(1))) }
    }

    /// Records a value.
    pub fn update(&self, value: i64) {
        self.reservoir.lock().push(value);
    }

    /// Discards all samples and resets the count.
    pub fn clear(&self) {
        self.reservoir.lock().clear();
    }

    /// Returns the number of values recorded since creation or the last clear.
    pub fn count(&self) -> i64 {
        self.reservoir.lock().count
    }

    /// Takes a consistent, read-only snapshot of the histogram.
    pub fn snapshot(&self) -> HistogramSnapshot {
        let reservoir = self.reservoir.lock();
        HistogramSnapshot::from_samples(reservoir.count, reservoir.values.clone())
    }
}

impl fmt::Debug for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Histogram").field("count", &self.count()).finish_non_exhaustive()
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time view of a histogram.
///
/// All statistics are derived from the same set of samples, and the snapshot never changes after it is taken. Every
/// statistic is zero when there are no samples.
#[derive(Clone, Debug, PartialEq)]
pub struct HistogramSnapshot {
    count: i64,
    sorted: Vec<i64>,
}

impl HistogramSnapshot {
    /// Creates a snapshot from a total count and the retained samples.
    ///
    /// `count` may exceed the number of samples when the samples are a subset of everything that was recorded.
    pub fn from_samples(count: i64, mut samples: Vec<i64>) -> Self {
        samples.sort_unstable();
        Self { count, sorted: samples }
    }

    /// Returns the number of values recorded.
    pub fn count(&self) -> i64 {
        self.count
    }

    /// Returns the retained samples, in ascending order.
    pub fn samples(&self) -> &[i64] {
        &self.sorted
    }

    /// Returns the smallest sample.
    pub fn min(&self) -> i64 {
        self.sorted.first().copied().unwrap_or(0)
    }

    /// Returns the largest sample.
    pub fn max(&self) -> i64 {
        self.sorted.last().copied().unwrap_or(0)
    }

    /// Returns the sum of all samples.
    pub fn sum(&self) -> i64 {
        self.sorted.iter().fold(0i64, |acc, v| acc.wrapping_add(*v))
    }

    /// Returns the arithmetic mean of the samples.
    pub fn mean(&self) -> f64 {
        if self.sorted.is_empty() {
            return 0.0;
        }
        self.sum() as f64 / self.sorted.len() as f64
    }

    /// Returns the population variance of the samples.
    pub fn variance(&self) -> f64 {
        if self.sorted.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let sum_sq = self
            .sorted
            .iter()
            .map(|v| {
                let d = *v as f64 - mean;
                d * d
            })
            .sum::<f64>();
        sum_sq / self.sorted.len() as f64
    }

    /// Returns the population standard deviation of the samples.
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Returns the value at quantile `q` (`0.0..=1.0`).
    ///
    /// Uses the `q * (n + 1)` rank, interpolating linearly between the two closest samples and clamping to the
    /// smallest/largest sample at the edges.
    pub fn percentile(&self, q: f64) -> f64 {
        let size = self.sorted.len();
        if size == 0 {
            return 0.0;
        }

        let pos = q * (size + 1) as f64;
        if pos < 1.0 {
            self.sorted[0] as f64
        } else if pos >= size as f64 {
            self.sorted[size - 1] as f64
        } else {
            let idx = pos as usize;
            let lower = self.sorted[idx - 1] as f64;
            let upper = self.sorted[idx] as f64;
            lower + (pos - pos.floor()) * (upper - lower)
        }
    }

    /// Returns the values at each of the given quantiles, in order.
    pub fn percentiles(&self, qs: &[f64]) -> Vec<f64> {
        qs.iter().map(|q| self.percentile(*q)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{Histogram, HistogramSnapshot};

    #[test]
    fn empty_snapshot_is_all_zero() {
        let snapshot = Histogram::new().snapshot();
        assert_eq!(snapshot.count(), 0);
        assert_eq!(snapshot.min(), 0);
        assert_eq!(snapshot.max(), 0);
        assert_eq!(snapshot.mean(), 0.0);
        assert_eq!(snapshot.std_dev(), 0.0);
        assert_eq!(snapshot.percentiles(&[0.5, 0.99]), vec![0.0, 0.0]);
    }

    #[test]
    fn statistics() {
        let histogram = Histogram::new();
        for v in [50, 1, 12, 2, 17, 3, 15, 5, 11, 9] {
            histogram.update(v);
        }

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.count(), 10);
        assert_eq!(snapshot.min(), 1);
        assert_eq!(snapshot.max(), 50);
        assert_eq!(snapshot.sum(), 125);
        assert_eq!(snapshot.mean(), 12.5);
        assert_eq!(snapshot.percentile(0.5), 10.0);
        assert_eq!(snapshot.percentile(0.999), 50.0);
        assert_eq!(snapshot.percentile(0.0), 1.0);
    }

    #[test]
    fn std_dev_is_population() {
        let snapshot = HistogramSnapshot::from_samples(8, vec![2, 4, 4, 4, 5, 5, 7, 9]);
        assert_eq!(snapshot.mean(), 5.0);
        assert_eq!(snapshot.variance(), 4.0);
        assert_eq!(snapshot.std_dev(), 2.0);
    }

    #[test]
    fn percentile_interpolates() {
        let snapshot = HistogramSnapshot::from_samples(4, vec![10, 20, 30, 40]);

        // rank 0.75 * 5 = 3.75, between the third and fourth samples.
        assert_eq!(snapshot.percentile(0.75), 37.5);
        assert_eq!(snapshot.percentile(0.5), 25.0);
        assert_eq!(snapshot.percentile(0.1), 10.0);
    }

    #[test]
    fn reservoir_is_bounded_but_count_is_exact() {
        let histogram = Histogram::with_reservoir_size(16);
        for v in 0..1000 {
            histogram.update(v);
        }

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.count(), 1000);
        assert_eq!(snapshot.samples().len(), 16);
        assert!(snapshot.samples().iter().all(|v| (0..1000).contains(v)));

        histogram.clear();
        assert_eq!(histogram.count(), 0);
        assert!(histogram.snapshot().samples().is_empty());
    }

    #[test]
    fn snapshot_is_detached() {
        let histogram = Histogram::new();
        histogram.update(1);

        let snapshot = histogram.snapshot();
        histogram.update(100);

        assert_eq!(snapshot.count(), 1);
        assert_eq!(snapshot.max(), 1);
        assert_eq!(histogram.snapshot().max(), 100);
    }
}
