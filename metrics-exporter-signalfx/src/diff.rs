//! Change detection between a cycle's observations and the last published values.
//!
//! An [`Update`] compares each observation with the cache and stages the ones that are new or changed. The staged set
//! is committed to the cache only once its batch was delivered; a failed batch instead evicts every name it carried.

use std::fmt;

use hashbrown::HashMap;

use crate::{
    cache::ValueCache,
    observation::{Kind, Observation, ScalarValue},
};

/// Values selected for publishing during a single cycle, grouped by kind.
///
/// The set is applied to the cache only once the batch it describes has been delivered.
#[derive(Default, PartialEq)]
pub struct PendingChanges {
    counters: HashMap<String, i64>,
    gauges: HashMap<String, i64>,
    gauges_f: HashMap<String, f64>,
}

impl PendingChanges {
    /// Creates an empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, name: &str, value: ScalarValue) {
        match value {
            ScalarValue::Counter(v) => {
                self.counters.insert(name.to_owned(), v);
            }
            ScalarValue::Gauge(v) => {
                self.gauges.insert(name.to_owned(), v);
            }
            ScalarValue::GaugeFloat(v) => {
                self.gauges_f.insert(name.to_owned(), v);
            }
        }
    }

    /// Gets the staged value for the given kind and name.
    pub fn get(&self, kind: Kind, name: &str) -> Option<ScalarValue> {
        match kind {
            Kind::Counter => self.counters.get(name).copied().map(ScalarValue::Counter),
            Kind::Gauge => self.gauges.get(name).copied().map(ScalarValue::Gauge),
            Kind::GaugeFloat => self.gauges_f.get(name).copied().map(ScalarValue::GaugeFloat),
        }
    }

    /// Returns the number of staged values.
    pub fn len(&self) -> usize {
        self.counters.len() + self.gauges.len() + self.gauges_f.len()
    }

    /// Returns `true` if nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes every staged value into `cache`, overwriting what was there.
    pub fn commit(self, cache: &mut dyn ValueCache) {
        for (name, v) in &self.counters {
            cache.set(name, ScalarValue::Counter(*v));
        }
        for (name, v) in &self.gauges {
            cache.set(name, ScalarValue::Gauge(*v));
        }
        for (name, v) in &self.gauges_f {
            cache.set(name, ScalarValue::GaugeFloat(*v));
        }
    }

    /// Removes every staged name from `cache`.
    ///
    /// Whether or not the backend saw any part of a failed batch is unknown, so previously cached values for these names
    /// can no longer be trusted either.
    pub fn invalidate(self, cache: &mut dyn ValueCache) {
        for name in self.counters.keys() {
            cache.remove(Kind::Counter, name);
        }
        for name in self.gauges.keys() {
            cache.remove(Kind::Gauge, name);
        }
        for name in self.gauges_f.keys() {
            cache.remove(Kind::GaugeFloat, name);
        }
    }
}

impl fmt::Debug for PendingChanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "counters={:?}, gauges={:?}, gauges_f={:?}", self.counters, self.gauges, self.gauges_f)
    }
}

/// An in-progress publish cycle.
///
/// Every observation is checked against the cache: anything never published, or published with a different value, is
/// added to the outbound batch and staged in the [`PendingChanges`]. The cache itself is left untouched.
pub struct Update<'a> {
    cache: &'a dyn ValueCache,
    batch: Vec<Observation>,
    changes: PendingChanges,
}

impl<'a> Update<'a> {
    /// Starts an empty update against `cache`.
    pub fn new(cache: &'a dyn ValueCache) -> Self {
        Self { cache, batch: Vec::new(), changes: PendingChanges::new() }
    }

    /// Considers a single observation for the batch.
    pub fn consider(&mut self, observation: Observation) {
        let value = observation.value();
        let changed = match self.cache.get(value.kind(), observation.name()) {
            Some(last) => last != value,
            None => true,
        };

        if changed {
            self.changes.record(observation.name(), value);
            self.batch.push(observation);
        }
    }

    /// Returns the observations selected so far.
    pub fn batch(&self) -> &[Observation] {
        &self.batch
    }

    /// Returns the changes staged so far.
    pub fn changes(&self) -> &PendingChanges {
        &self.changes
    }

    /// Finishes the update, returning the batch to send and the changes to apply once it has been sent.
    pub fn into_parts(self) -> (Vec<Observation>, PendingChanges) {
        (self.batch, self.changes)
    }
}
