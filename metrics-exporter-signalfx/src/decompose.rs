//! Flattening of registry metrics into scalar observations.
//!
//! Scalar metrics map to a single observation under their own name. Composite metrics are snapshotted once and fan out
//! into several observations named `<name>.<suffix>`.

use thiserror::Error;

use crate::{
    observation::Observation,
    registry::{HistogramSnapshot, Metric, MeterSnapshot, TimerSnapshot},
};

/// Quantiles reported for histograms and timers, in emission order.
pub const PERCENTILES: [f64; 5] = [0.5, 0.75, 0.95, 0.99, 0.999];

const PERCENTILE_SUFFIXES: [&str; 5] =
    [".50-percentile", ".75-percentile", ".95-percentile", ".99-percentile", ".999-percentile"];

/// A registry value that the decomposer does not know how to flatten.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unrecognized metric '{name}' of type {type_name}")]
pub struct UnrecognizedMetric {
    /// Name the value is registered under.
    pub name: String,

    /// Rust type name of the value.
    pub type_name: &'static str,
}

fn suffixed(name: &str, suffix: &str) -> String {
    let mut full = String::with_capacity(name.len() + suffix.len());
    full.push_str(name);
    full.push_str(suffix);
    full
}

/// Decomposes `metric`, registered as `name`, passing every resulting observation to `emit`.
///
/// # Errors
///
/// If `metric` is [`Metric::Other`], nothing is emitted and an error is returned.
pub fn decompose<F>(name: &str, metric: &Metric, mut emit: F) -> Result<(), UnrecognizedMetric>
where
    F: FnMut(Observation),
{
    match metric {
        Metric::Counter(counter) => emit(Observation::counter(name, counter.count())),
        Metric::Gauge(gauge) => emit(Observation::gauge(name, gauge.value())),
        Metric::GaugeFloat(gauge) => emit(Observation::gauge_float(name, gauge.value())),
        Metric::Histogram(histogram) => decompose_histogram(name, &histogram.snapshot(), &mut emit),
        Metric::Meter(meter) => decompose_meter(name, &meter.snapshot(), &mut emit),
        Metric::Timer(timer) => decompose_timer(name, &timer.snapshot(), &mut emit),
        Metric::Other(other) => {
            return Err(UnrecognizedMetric { name: name.to_owned(), type_name: other.type_name() })
        }
    }

    Ok(())
}

fn emit_distribution<F>(name: &str, snapshot: &HistogramSnapshot, emit: &mut F)
where
    F: FnMut(Observation),
{
    emit(Observation::counter(suffixed(name, ".count"), snapshot.count()));
    emit(Observation::counter(suffixed(name, ".min"), snapshot.min()));
    emit(Observation::counter(suffixed(name, ".max"), snapshot.max()));
    emit(Observation::gauge_float(suffixed(name, ".mean"), snapshot.mean()));
    emit(Observation::gauge_float(suffixed(name, ".std-dev"), snapshot.std_dev()));

    let values = snapshot.percentiles(&PERCENTILES);
    for (suffix, value) in PERCENTILE_SUFFIXES.iter().zip(values) {
        emit(Observation::gauge_float(suffixed(name, suffix), value));
    }
}

fn emit_rates<F>(name: &str, snapshot: &MeterSnapshot, emit: &mut F)
where
    F: FnMut(Observation),
{
    emit(Observation::gauge_float(suffixed(name, ".one-minute"), snapshot.rate1()));
    emit(Observation::gauge_float(suffixed(name, ".five-minute"), snapshot.rate5()));
    emit(Observation::gauge_float(suffixed(name, ".fifteen-minute"), snapshot.rate15()));
    emit(Observation::gauge_float(suffixed(name, ".mean-rate"), snapshot.rate_mean()));
}

/// Decomposes a histogram snapshot into count, min, max, mean, standard deviation and percentiles.
pub fn decompose_histogram<F>(name: &str, snapshot: &HistogramSnapshot, emit: &mut F)
where
    F: FnMut(Observation),
{
    emit_distribution(name, snapshot, emit);
}

/// Decomposes a meter snapshot into its count and rates.
pub fn decompose_meter<F>(name: &str, snapshot: &MeterSnapshot, emit: &mut F)
where
    F: FnMut(Observation),
{
    emit(Observation::counter(suffixed(name, ".count"), snapshot.count()));
    emit_rates(name, snapshot, emit);
}

/// Decomposes a timer snapshot into the histogram statistics followed by the meter rates.
pub fn decompose_timer<F>(name: &str, snapshot: &TimerSnapshot, emit: &mut F)
where
    F: FnMut(Observation),
{
    emit_distribution(name, snapshot.histogram(), emit);
    emit_rates(name, snapshot.rates(), emit);
}
