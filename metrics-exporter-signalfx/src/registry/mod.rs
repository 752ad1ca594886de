//! Named metrics and the registry that holds them.
//!
//! The publisher only needs something it can enumerate, expressed by [`MetricRegistry`]. [`Registry`] is the
//! implementation shipped with this crate, holding [`Counter`], [`Gauge`], [`GaugeFloat`], [`Histogram`], [`Meter`] and
//! [`Timer`] metrics under unique names.

use std::{any::Any, fmt, sync::Arc};

use indexmap::IndexMap;
use parking_lot::RwLock;
use quanta::Clock;
use thiserror::Error;

mod atomics;
pub use self::atomics::{Counter, Gauge, GaugeFloat};

mod histogram;
pub use self::histogram::{Histogram, HistogramSnapshot, DEFAULT_RESERVOIR_SIZE};

mod meter;
pub use self::meter::{Meter, MeterSnapshot};

mod timer;
pub use self::timer::{Timer, TimerSnapshot};

/// Errors that could occur while registering a metric.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A metric is already registered under the given name.
    #[error("duplicate metric: {name}")]
    Duplicate {
        /// Name of the metric.
        name: String,
    },

    /// The metric registered under the given name is of a different kind than requested.
    #[error("metric '{name}' is a {actual}, not a {expected}")]
    KindMismatch {
        /// Name of the metric.
        name: String,

        /// Kind that was requested.
        expected: &'static str,

        /// Kind that is registered.
        actual: &'static str,
    },
}

/// A value held by a registry that is not one of the known metric kinds.
#[derive(Clone)]
pub struct OtherMetric {
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

impl OtherMetric {
    /// Returns the Rust type name of the wrapped value.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns a reference to the wrapped value if it is of type `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

/// A registered metric.
#[derive(Clone)]
pub enum Metric {
    /// An integer counter.
    Counter(Arc<Counter>),

    /// An integer gauge.
    Gauge(Arc<Gauge>),

    /// A floating-point gauge.
    GaugeFloat(Arc<GaugeFloat>),

    /// A sampled histogram.
    Histogram(Arc<Histogram>),

    /// An event rate meter.
    Meter(Arc<Meter>),

    /// A duration timer.
    Timer(Arc<Timer>),

    /// Anything else.
    ///
    /// Registries may hold values the publisher does not know how to decompose. How those are handled when publishing
    /// is controlled by [`UnrecognizedMetricPolicy`][crate::UnrecognizedMetricPolicy].
    Other(OtherMetric),
}

impl Metric {
    /// Wraps an arbitrary value as a metric of unrecognized kind.
    pub fn other<T>(value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Metric::Other(OtherMetric { type_name: std::any::type_name::<T>(), value: Arc::new(value) })
    }

    /// Returns a short name for the kind of metric.
    ///
    /// For [`Metric::Other`], this is the type name of the wrapped value.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Metric::Counter(_) => "counter",
            Metric::Gauge(_) => "gauge",
            Metric::GaugeFloat(_) => "gauge_float",
            Metric::Histogram(_) => "histogram",
            Metric::Meter(_) => "meter",
            Metric::Timer(_) => "timer",
            Metric::Other(other) => other.type_name(),
        }
    }
}

impl fmt::Debug for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Metric").field(&self.kind_name()).finish()
    }
}

macro_rules! impl_metric_from {
    ($($variant:ident),+) => {
        $(
            impl From<$variant> for Metric {
                fn from(metric: $variant) -> Self {
                    Metric::$variant(Arc::new(metric))
                }
            }

            impl From<Arc<$variant>> for Metric {
                fn from(metric: Arc<$variant>) -> Self {
                    Metric::$variant(metric)
                }
            }
        )+
    };
}

impl_metric_from!(Counter, Gauge, GaugeFloat, Histogram, Meter, Timer);

/// A source of named metrics.
pub trait MetricRegistry {
    /// Calls `f` once for every registered metric.
    fn for_each(&self, f: &mut dyn FnMut(&str, &Metric));
}

impl<T> MetricRegistry for &T
where
    T: MetricRegistry + ?Sized,
{
    fn for_each(&self, f: &mut dyn FnMut(&str, &Metric)) {
        (**self).for_each(f);
    }
}

impl<T> MetricRegistry for Arc<T>
where
    T: MetricRegistry + ?Sized,
{
    fn for_each(&self, f: &mut dyn FnMut(&str, &Metric)) {
        (**self).for_each(f);
    }
}

/// A thread-safe set of uniquely named metrics.
///
/// Metrics are enumerated in registration order.
pub struct Registry {
    clock: Clock,
    metrics: RwLock<IndexMap<String, Metric>>,
}

impl Registry {
    /// Creates an empty `Registry`.
    pub fn new() -> Self {
        Self::with_clock(Clock::new())
    }

    /// Creates an empty `Registry` whose meters and timers use the given clock.
    pub fn with_clock(clock: Clock) -> Self {
        Self { clock, metrics: RwLock::new(IndexMap::new()) }
    }

    /// Registers a metric under `name`.
    ///
    /// # Errors
    ///
    /// If a metric is already registered under `name`, an error is returned and the registry is left unchanged.
    pub fn register<M>(&self, name: &str, metric: M) -> Result<(), RegistryError>
    where
        M: Into<Metric>,
    {
        let mut metrics = self.metrics.write();
        if metrics.contains_key(name) {
            return Err(RegistryError::Duplicate { name: name.to_owned() });
        }
        metrics.insert(name.to_owned(), metric.into());
        Ok(())
    }

    /// Removes the metric registered under `name`, returning it.
    pub fn unregister(&self, name: &str) -> Option<Metric> {
        self.metrics.write().shift_remove(name)
    }

    /// Removes every metric.
    pub fn unregister_all(&self) {
        self.metrics.write().clear();
    }

    /// Gets the metric registered under `name`.
    pub fn get(&self, name: &str) -> Option<Metric> {
        self.metrics.read().get(name).cloned()
    }

    /// Returns the number of registered metrics.
    pub fn len(&self) -> usize {
        self.metrics.read().len()
    }

    /// Returns `true` if no metrics are registered.
    pub fn is_empty(&self) -> bool {
        self.metrics.read().is_empty()
    }

    fn get_or_register<T>(
        &self,
        name: &str,
        expected: &'static str,
        extract: fn(&Metric) -> Option<&Arc<T>>,
        create: impl FnOnce() -> Metric,
    ) -> Result<Arc<T>, RegistryError> {
        let mismatch = |metric: &Metric| RegistryError::KindMismatch {
            name: name.to_owned(),
            expected,
            actual: metric.kind_name(),
        };

        if let Some(metric) = self.metrics.read().get(name) {
            return extract(metric).cloned().ok_or_else(|| mismatch(metric));
        }

        let mut metrics = self.metrics.write();
        let metric = &*metrics.entry(name.to_owned()).or_insert_with(create);
        extract(metric).cloned().ok_or_else(|| mismatch(metric))
    }

    /// Gets the counter registered under `name`, registering a new one if there is none.
    ///
    /// # Errors
    ///
    /// If a metric of another kind is registered under `name`, an error is returned.
    pub fn counter(&self, name: &str) -> Result<Arc<Counter>, RegistryError> {
        self.get_or_register(
            name,
            "counter",
            |m| match m {
                Metric::Counter(c) => Some(c),
                _ => None,
            },
            || Metric::from(Counter::new()),
        )
    }

    /// Gets the gauge registered under `name`, registering a new one if there is none.
    ///
    /// # Errors
    ///
    /// If a metric of another kind is registered under `name`, an error is returned.
    pub fn gauge(&self, name: &str) -> Result<Arc<Gauge>, RegistryError> {
        self.get_or_register(
            name,
            "gauge",
            |m| match m {
                Metric::Gauge(g) => Some(g),
                _ => None,
            },
            || Metric::from(Gauge::new()),
        )
    }

    /// Gets the floating-point gauge registered under `name`, registering a new one if there is none.
    ///
    /// # Errors
    ///
    /// If a metric of another kind is registered under `name`, an error is returned.
    pub fn gauge_float(&self, name: &str) -> Result<Arc<GaugeFloat>, RegistryError> {
        self.get_or_register(
            name,
            "gauge_float",
            |m| match m {
                Metric::GaugeFloat(g) => Some(g),
                _ => None,
            },
            || Metric::from(GaugeFloat::new()),
        )
    }

    /// Gets the histogram registered under `name`, registering a new one if there is none.
    ///
    /// # Errors
    ///
    /// If a metric of another kind is registered under `name`, an error is returned.
    pub fn histogram(&self, name: &str) -> Result<Arc<Histogram>, RegistryError> {
        self.get_or_register(
            name,
            "histogram",
            |m| match m {
                Metric::Histogram(h) => Some(h),
                _ => None,
            },
            || Metric::from(Histogram::new()),
        )
    }

    /// Gets the meter registered under `name`, registering a new one if there is none.
    ///
    /// # Errors
    ///
    /// If a metric of another kind is registered under `name`, an error is returned.
    pub fn meter(&self, name: &str) -> Result<Arc<Meter>, RegistryError> {
        self.get_or_register(
            name,
            "meter",
            |m| match m {
                Metric::Meter(meter) => Some(meter),
                _ => None,
            },
            || Metric::from(Meter::with_clock(self.clock.clone())),
        )
    }

    /// Gets the timer registered under `name`, registering a new one if there is none.
    ///
    /// # Errors
    ///
    /// If a metric of another kind is registered under `name`, an error is returned.
    pub fn timer(&self, name: &str) -> Result<Arc<Timer>, RegistryError> {
        self.get_or_register(
            name,
            "timer",
            |m| match m {
                Metric::Timer(t) => Some(t),
                _ => None,
            },
            || Metric::from(Timer::with_clock(self.clock.clone())),
        )
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricRegistry for Registry {
    fn for_each(&self, f: &mut dyn FnMut(&str, &Metric)) {
        // Enumerate a copy so callbacks are free to touch the registry.
        let entries = self
            .metrics
            .read()
            .iter()
            .map(|(name, metric)| (name.clone(), metric.clone()))
            .collect::<Vec<_>>();

        for (name, metric) in &entries {
            f(name, metric);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{Counter, Metric, MetricRegistry as _, Registry, RegistryError};

    fn names(registry: &Registry) -> Vec<String> {
        let mut names = Vec::new();
        registry.for_each(&mut |name, _| names.push(name.to_owned()));
        names
    }

    #[test]
    fn register_and_enumerate_in_order() {
        let registry = Registry::new();
        registry.register("b", Counter::new()).unwrap();
        registry.register("a", Metric::other("not a metric")).unwrap();
        registry.gauge("c").unwrap();

        assert_eq!(names(&registry), vec!["b", "a", "c"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = Registry::new();
        registry.register("requests", Counter::new()).unwrap();

        let err = registry.register("requests", Counter::new()).unwrap_err();
        assert_eq!(err, RegistryError::Duplicate { name: "requests".to_owned() });
    }

    #[test]
    fn get_or_register_returns_the_same_metric() {
        let registry = Registry::new();
        let first = registry.counter("requests").unwrap();
        first.inc(5);

        let second = registry.counter("requests").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.count(), 5);
    }

    #[test]
    fn get_or_register_checks_the_kind() {
        let registry = Registry::new();
        registry.histogram("latency").unwrap();

        let err = registry.timer("latency").unwrap_err();
        assert_eq!(
            err,
            RegistryError::KindMismatch {
                name: "latency".to_owned(),
                expected: "timer",
                actual: "histogram",
            }
        );
    }

    #[test]
    fn unregister() {
        let registry = Registry::new();
        registry.meter("rate").unwrap();
        registry.gauge_float("load").unwrap();

        assert!(matches!(registry.unregister("rate"), Some(Metric::Meter(_))));
        assert!(registry.unregister("rate").is_none());
        assert_eq!(names(&registry), vec!["load"]);

        registry.unregister_all();
        assert!(registry.is_empty());
    }

    #[test]
    fn callbacks_may_use_the_registry() {
        let registry = Registry::new();
        registry.counter("a").unwrap();

        registry.for_each(&mut |name, _| {
            assert!(registry.get(name).is_some());
            registry.counter("b").unwrap();
        });

        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn other_metrics_keep_their_value() {
        let metric = Metric::other(42u32);
        assert_eq!(metric.kind_name(), "u32");

        let Metric::Other(other) = metric else { panic!("expected an unrecognized metric") };
        assert_eq!(other.downcast_ref::<u32>(), Some(&42));
        assert_eq!(other.downcast_ref::<i32>(), None);
    }
}
