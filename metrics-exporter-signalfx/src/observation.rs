use std::fmt;

/// The kind of a scalar value.
///
/// Kinds are tracked separately in the last-value cache, so a counter and a gauge that happen to share a name never
/// suppress one another.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    /// A monotonic-ish integer count.
    Counter,

    /// An integer point-in-time value.
    Gauge,

    /// A floating-point point-in-time value.
    GaugeFloat,
}

impl Kind {
    /// Returns a short, human-readable name for the kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Kind::Counter => "counter",
            Kind::Gauge => "gauge",
            Kind::GaugeFloat => "gauge_float",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scalar value, tagged with its kind.
///
/// Equality is plain `==` on the inner value: floating-point values are never compared with a tolerance, and `NaN` is
/// never equal to anything, itself included.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ScalarValue {
    /// Integer counter value.
    Counter(i64),

    /// Integer gauge value.
    Gauge(i64),

    /// Floating-point gauge value.
    GaugeFloat(f64),
}

impl ScalarValue {
    /// Returns the kind of this value.
    pub const fn kind(&self) -> Kind {
        match self {
            ScalarValue::Counter(_) => Kind::Counter,
            ScalarValue::Gauge(_) => Kind::Gauge,
            ScalarValue::GaugeFloat(_) => Kind::GaugeFloat,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Counter(v) | ScalarValue::Gauge(v) => write!(f, "{v}"),
            ScalarValue::GaugeFloat(v) => write!(f, "{v}"),
        }
    }
}

/// A single named data point produced during a publish cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    name: String,
    value: ScalarValue,
}

impl Observation {
    /// Creates a new `Observation`.
    pub fn new<N>(name: N, value: ScalarValue) -> Self
    where
        N: Into<String>,
    {
        Self { name: name.into(), value }
    }

    /// Creates a counter observation.
    pub fn counter<N: Into<String>>(name: N, value: i64) -> Self {
        Self::new(name, ScalarValue::Counter(value))
    }

    /// Creates an integer gauge observation.
    pub fn gauge<N: Into<String>>(name: N, value: i64) -> Self {
        Self::new(name, ScalarValue::Gauge(value))
    }

    /// Creates a floating-point gauge observation.
    pub fn gauge_float<N: Into<String>>(name: N, value: f64) -> Self {
        Self::new(name, ScalarValue::GaugeFloat(value))
    }

    /// Returns the name of the observation.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the value of the observation.
    pub const fn value(&self) -> ScalarValue {
        self.value
    }

    /// Returns the kind of the observation.
    pub const fn kind(&self) -> Kind {
        self.value.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::{Kind, Observation, ScalarValue};

    #[test]
    fn kind_follows_value() {
        assert_eq!(Observation::counter("a", 1).kind(), Kind::Counter);
        assert_eq!(Observation::gauge("a", 1).kind(), Kind::Gauge);
        assert_eq!(Observation::gauge_float("a", 1.0).kind(), Kind::GaugeFloat);
    }

    #[test]
    fn float_equality_is_exact() {
        assert_eq!(ScalarValue::GaugeFloat(0.5), ScalarValue::GaugeFloat(0.5));
        assert_ne!(ScalarValue::GaugeFloat(0.1 + 0.2), ScalarValue::GaugeFloat(0.3));
        assert_ne!(ScalarValue::GaugeFloat(f64::NAN), ScalarValue::GaugeFloat(f64::NAN));
        assert_ne!(ScalarValue::Counter(5), ScalarValue::Gauge(5));
    }
}
