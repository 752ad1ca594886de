use std::sync::atomic::{
    AtomicI64, AtomicU64,
    Ordering::{Acquire, Relaxed, Release},
};

/// A signed integer counter.
#[derive(Debug, Default)]
pub struct Counter {
    count: AtomicI64,
}

impl Counter {
    /// Creates a new `Counter` starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the counter by `delta`.
    pub fn inc(&self, delta: i64) {
        self.count.fetch_add(delta, Relaxed);
    }

    /// Decrements the counter by `delta`.
    pub fn dec(&self, delta: i64) {
        self.count.fetch_sub(delta, Relaxed);
    }

    /// Resets the counter to zero.
    pub fn clear(&self) {
        self.count.store(0, Release);
    }

    /// Returns the current count.
    pub fn count(&self) -> i64 {
        self.count.load(Acquire)
    }
}

/// An integer gauge.
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicI64,
}

impl Gauge {
    /// Creates a new `Gauge` starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the gauge to `value`.
    pub fn update(&self, value: i64) {
        self.value.store(value, Release);
    }

    /// Returns the current value.
    pub fn value(&self) -> i64 {
        self.value.load(Acquire)
    }
}

/// A floating-point gauge.
#[derive(Debug)]
pub struct GaugeFloat {
    bits: AtomicU64,
}

impl GaugeFloat {
    /// Creates a new `GaugeFloat` starting at zero.
    pub fn new() -> Self {
        Self { bits: AtomicU64::new(0.0f64.to_bits()) }
    }

    /// Sets the gauge to `value`.
    pub fn update(&self, value: f64) {
        self.bits.store(value.to_bits(), Release);
    }

    /// Returns the current value.
    pub fn value(&self) -> f64 {
        f64::from_bits(self.bits.load(Acquire))
    }
}

impl Default for GaugeFloat {
    fn default() -> Self {
        Self::new()
    }
}
