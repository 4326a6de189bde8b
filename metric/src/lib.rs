//! A minimal, in-process metric registry.
//!
//! Actors (archive, partition, identifier, ...) register named instruments once at construction
//! time and obtain a cheap-to-clone [`U64Counter`] handle per label set (an [`Attributes`] set),
//! following the teacher workspace's `metric` crate shape.

#![warn(missing_docs, clippy::clone_on_ref_ptr)]

use parking_lot::Mutex;
use std::{
    any::Any,
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

/// A set of label key/value pairs identifying one observer within a [`Metric`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Attributes(Vec<(&'static str, String)>);

impl Attributes {
    /// Build a set of attributes from key/value pairs.
    pub fn from(pairs: &[(&'static str, &str)]) -> Self {
        let mut v: Vec<_> = pairs
            .iter()
            .map(|(k, v)| (*k, v.to_string()))
            .collect();
        v.sort();
        Self(v)
    }
}

/// A monotonically increasing counter.
#[derive(Debug, Clone, Default)]
pub struct U64Counter(Arc<AtomicU64>);

impl U64Counter {
    /// Increment the counter by `delta`.
    pub fn inc(&self, delta: u64) {
        self.0.fetch_add(delta, Ordering::Relaxed);
    }

    /// Read the current value.
    pub fn fetch(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A named instrument, parameterized by observer type `T` (presently only [`U64Counter`]).
#[derive(Debug)]
pub struct Metric<T> {
    observers: Arc<Mutex<BTreeMap<Attributes, T>>>,
}

impl<T> Clone for Metric<T> {
    fn clone(&self) -> Self {
        Self {
            observers: Arc::clone(&self.observers),
        }
    }
}

impl<T> Metric<T>
where
    T: Clone + Default,
{
    /// Obtain (creating if necessary) the observer for a given label set.
    pub fn recorder(&self, attributes: &[(&'static str, &str)]) -> T {
        let attributes = Attributes::from(attributes);
        let mut observers = self.observers.lock();
        observers.entry(attributes).or_default().clone()
    }

    /// Look up the observer for a given label set, if it has ever been recorded.
    pub fn get_observer(&self, attributes: &Attributes) -> Option<T> {
        self.observers.lock().get(attributes).cloned()
    }
}

trait AnyMetric: Any + Send + Sync + std::fmt::Debug {
    fn as_any(&self) -> &dyn Any;
}

impl<T> AnyMetric for Metric<T>
where
    T: Send + Sync + std::fmt::Debug + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Registry of named instruments, shared (via `Arc`) by every actor in a node.
#[derive(Debug, Default)]
pub struct Registry {
    instruments: Mutex<BTreeMap<&'static str, Arc<dyn AnyMetric>>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or fetch an already-registered) named instrument.
    ///
    /// `description` is presently unused at runtime; it documents the instrument the way the
    /// teacher's registry does, ready to be surfaced by an exporter later.
    pub fn register_metric<T>(&self, name: &'static str, _description: &'static str) -> Metric<T>
    where
        T: Clone + Default + Send + Sync + std::fmt::Debug + 'static,
    {
        let mut instruments = self.instruments.lock();
        let entry = instruments.entry(name).or_insert_with(|| {
            Arc::new(Metric::<T> {
                observers: Arc::new(Mutex::new(BTreeMap::new())),
            }) as Arc<dyn AnyMetric>
        });
        entry
            .as_any()
            .downcast_ref::<Metric<T>>()
            .expect("instrument registered under this name with a different observer type")
            .clone()
    }

    /// Look up an already-registered instrument by name.
    pub fn get_instrument<T>(&self, name: &'static str) -> Option<Metric<T>>
    where
        T: Clone + Default + Send + Sync + std::fmt::Debug + 'static,
    {
        let instruments = self.instruments.lock();
        instruments
            .get(name)
            .map(|m| {
                m.as_any()
                    .downcast_ref::<Metric<T>>()
                    .expect("instrument registered under this name with a different observer type")
                    .clone()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_roundtrip() {
        let registry = Registry::new();
        let metric: Metric<U64Counter> =
            registry.register_metric("events_indexed", "count of indexed events");
        let a = metric.recorder(&[("partition", "a")]);
        let b = metric.recorder(&[("partition", "b")]);
        a.inc(3);
        a.inc(4);
        b.inc(1);

        let looked_up: Metric<U64Counter> = registry.get_instrument("events_indexed").unwrap();
        let a2 = looked_up.get_observer(&Attributes::from(&[("partition", "a")])).unwrap();
        assert_eq!(a2.fetch(), 7);
        let b2 = looked_up.get_observer(&Attributes::from(&[("partition", "b")])).unwrap();
        assert_eq!(b2.fetch(), 1);
    }
}
