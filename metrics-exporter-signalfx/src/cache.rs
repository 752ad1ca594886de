//! Last-published-value caches.
//!
//! The publisher remembers the last value it successfully sent for every scalar so that unchanged values can be left
//! out of the next payload. An entry being present means that exact value reached the backend on some earlier cycle;
//! an entry being absent only ever causes a re-send, so implementations are free to forget entries whenever they like.

use hashbrown::HashMap;
use indexmap::{Equivalent, IndexMap};

use crate::observation::{Kind, ScalarValue};

/// Storage for last-published scalar values.
///
/// Caches are owned by a single publisher task and are never shared, so implementations need no interior locking.
pub trait ValueCache: Send {
    /// Gets the cached value for the given kind and name, if any.
    fn get(&self, kind: Kind, name: &str) -> Option<ScalarValue>;

    /// Sets the cached value for `name`, under the kind of `value`.
    fn set(&mut self, name: &str, value: ScalarValue);

    /// Removes the cached value for the given kind and name.
    fn remove(&mut self, kind: Kind, name: &str);

    /// Removes every cached value.
    fn clear(&mut self);

    /// Returns the number of cached values, across all kinds.
    fn len(&self) -> usize;

    /// Returns `true` if nothing is cached.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A cache that keeps one entry per distinct scalar name it has ever been given.
///
/// Memory grows with the number of distinct names, which is fine for registries whose metric set is fixed at startup.
/// See [`BoundedCache`] when it is not.
#[derive(Debug, Default)]
pub struct UnboundedCache {
    counters: HashMap<String, i64>,
    gauges: HashMap<String, i64>,
    gauges_f: HashMap<String, f64>,
}

impl UnboundedCache {
    /// Creates an empty `UnboundedCache`.
    pub fn new() -> Self {
        Self::default()
    }
}

fn upsert<V>(map: &mut HashMap<String, V>, name: &str, value: V) {
    match map.get_mut(name) {
        Some(existing) => *existing = value,
        None => {
            map.insert(name.to_owned(), value);
        }
    }
}

impl ValueCache for UnboundedCache {
    fn get(&self, kind: Kind, name: &str) -> Option<ScalarValue> {
        match kind {
            Kind::Counter => self.counters.get(name).copied().map(ScalarValue::Counter),
            Kind::Gauge => self.gauges.get(name).copied().map(ScalarValue::Gauge),
            Kind::GaugeFloat => self.gauges_f.get(name).copied().map(ScalarValue::GaugeFloat),
        }
    }

    fn set(&mut self, name: &str, value: ScalarValue) {
        match value {
            ScalarValue::Counter(v) => upsert(&mut self.counters, name, v),
            ScalarValue::Gauge(v) => upsert(&mut self.gauges, name, v),
            ScalarValue::GaugeFloat(v) => upsert(&mut self.gauges_f, name, v),
        }
    }

    fn remove(&mut self, kind: Kind, name: &str) {
        match kind {
            Kind::Counter => {
                self.counters.remove(name);
            }
            Kind::Gauge => {
                self.gauges.remove(name);
            }
            Kind::GaugeFloat => {
                self.gauges_f.remove(name);
            }
        }
    }

    fn clear(&mut self) {
        self.counters.clear();
        self.gauges.clear();
        self.gauges_f.clear();
    }

    fn len(&self) -> usize {
        self.counters.len() + self.gauges.len() + self.gauges_f.len()
    }
}

#[derive(Debug, PartialEq, Eq, Hash)]
struct CacheKey {
    kind: Kind,
    name: String,
}

// Hashes identically to `CacheKey`, so lookups don't need to allocate an owned name.
#[derive(Hash)]
struct CacheKeyRef<'a> {
    kind: Kind,
    name: &'a str,
}

impl Equivalent<CacheKey> for CacheKeyRef<'_> {
    fn equivalent(&self, key: &CacheKey) -> bool {
        self.kind == key.kind && self.name == key.name
    }
}

/// A cache holding at most a fixed number of entries.
///
/// When full, writing a new entry evicts the least recently written one. An evicted scalar is simply re-sent the next
/// time it is observed.
#[derive(Debug)]
pub struct BoundedCache {
    capacity: usize,
    entries: IndexMap<CacheKey, ScalarValue>,
}

impl BoundedCache {
    /// Creates an empty `BoundedCache` holding at most `capacity` entries.
    ///
    /// A capacity of zero is treated as one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { capacity, entries: IndexMap::with_capacity(capacity) }
    }

    /// Returns the maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl ValueCache for BoundedCache {
    fn get(&self, kind: Kind, name: &str) -> Option<ScalarValue> {
        self.entries.get(&CacheKeyRef { kind, name }).copied()
    }

    fn set(&mut self, name: &str, value: ScalarValue) {
        let key_ref = CacheKeyRef { kind: value.kind(), name };

        // Move rewritten entries to the back so eviction order follows write recency.
        if let Some((key, _)) = self.entries.shift_remove_entry(&key_ref) {
            self.entries.insert(key, value);
            return;
        }

        if self.entries.len() >= self.capacity {
            self.entries.shift_remove_index(0);
        }
        self.entries.insert(CacheKey { kind: value.kind(), name: name.to_owned() }, value);
    }

    fn remove(&mut self, kind: Kind, name: &str) {
        self.entries.shift_remove(&CacheKeyRef { kind, name });
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{BoundedCache, UnboundedCache, ValueCache};
    use crate::observation::{Kind, ScalarValue};

    fn exercise_basic_contract(cache: &mut dyn ValueCache) {
        assert!(cache.is_empty());
        assert_eq!(cache.get(Kind::Counter, "requests"), None);

        cache.set("requests", ScalarValue::Counter(5));
        assert_eq!(cache.get(Kind::Counter, "requests"), Some(ScalarValue::Counter(5)));

        // Same name, different kind: independent entries.
        assert_eq!(cache.get(Kind::Gauge, "requests"), None);
        cache.set("requests", ScalarValue::Gauge(9));
        assert_eq!(cache.get(Kind::Gauge, "requests"), Some(ScalarValue::Gauge(9)));
        assert_eq!(cache.get(Kind::Counter, "requests"), Some(ScalarValue::Counter(5)));
        assert_eq!(cache.len(), 2);

        cache.set("requests", ScalarValue::Counter(7));
        assert_eq!(cache.get(Kind::Counter, "requests"), Some(ScalarValue::Counter(7)));
        assert_eq!(cache.len(), 2);

        cache.remove(Kind::Counter, "requests");
        assert_eq!(cache.get(Kind::Counter, "requests"), None);
        assert_eq!(cache.get(Kind::Gauge, "requests"), Some(ScalarValue::Gauge(9)));

        cache.set("latency.mean", ScalarValue::GaugeFloat(12.5));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get(Kind::GaugeFloat, "latency.mean"), None);
    }

    #[test]
    fn unbounded_basic_contract() {
        exercise_basic_contract(&mut UnboundedCache::new());
    }

    #[test]
    fn bounded_basic_contract() {
        exercise_basic_contract(&mut BoundedCache::with_capacity(16));
    }

    #[test]
    fn bounded_evicts_least_recently_written() {
        let mut cache = BoundedCache::with_capacity(2);
        cache.set("a", ScalarValue::Counter(1));
        cache.set("b", ScalarValue::Counter(2));

        // Rewriting `a` makes `b` the oldest entry.
        cache.set("a", ScalarValue::Counter(3));
        cache.set("c", ScalarValue::Counter(4));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(Kind::Counter, "a"), Some(ScalarValue::Counter(3)));
        assert_eq!(cache.get(Kind::Counter, "b"), None);
        assert_eq!(cache.get(Kind::Counter, "c"), Some(ScalarValue::Counter(4)));
    }

    #[test]
    fn bounded_zero_capacity_holds_one() {
        let mut cache = BoundedCache::with_capacity(0);
        assert_eq!(cache.capacity(), 1);

        cache.set("a", ScalarValue::Gauge(1));
        cache.set("b", ScalarValue::Gauge(2));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(Kind::Gauge, "b"), Some(ScalarValue::Gauge(2)));
    }

    proptest! {
        #[test]
        fn bounded_never_exceeds_capacity(
            capacity in 1usize..16,
            writes in proptest::collection::vec(("[a-e]", any::<i64>()), 0..64),
        ) {
            let mut cache = BoundedCache::with_capacity(capacity);
            for (name, value) in &writes {
                cache.set(name, ScalarValue::Counter(*value));
                prop_assert!(cache.len() <= capacity);
                prop_assert_eq!(cache.get(Kind::Counter, name), Some(ScalarValue::Counter(*value)));
            }
        }
    }
}
