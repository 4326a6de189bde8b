//! A small leader/follower replicated store (spec.md §5), grounded on `key_value_store.cc`'s
//! leader/follower roles: followers forward writes to the leader, the leader applies a write
//! locally then replicates it to every follower before acknowledging the caller.
//!
//! Leader election itself is out of scope (as in the original, where it is an explicit
//! `VAST_ERROR("leader election not yet implemented")`): a node starts as a follower and is
//! promoted to leader externally via [`KvStore::promote`].

use crate::error::{NotAccumulableSnafu, NotFoundSnafu, NotLeaderSnafu, Result, UnavailableSnafu};
use observability_deps::tracing::debug;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use vast_types::Value;

/// How many replication acknowledgments a write must collect before it is considered durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    /// Every follower must acknowledge.
    All,
    /// A strict majority of followers (including the leader's own local apply) must acknowledge.
    Quorum,
}

impl AckMode {
    fn required(self, follower_count: usize) -> usize {
        match self {
            AckMode::All => follower_count,
            // Majority of the whole cluster (followers plus the leader itself).
            AckMode::Quorum => (follower_count + 1) / 2 + 1,
        }
    }
}

/// Store configuration.
#[derive(Debug, Clone, Copy)]
pub struct KvStoreConfig {
    /// Required acknowledgment level for writes.
    pub acknowledge: AckMode,
}

impl Default for KvStoreConfig {
    fn default() -> Self {
        Self {
            acknowledge: AckMode::All,
        }
    }
}

#[derive(Debug, Default)]
struct Storage {
    data: BTreeMap<String, Value>,
}

/// A follower replica: receives the leader's applied writes and answers local reads once
/// promoted away from (or before ever becoming) a leader.
#[derive(Debug, Default)]
pub struct Follower {
    storage: Mutex<Storage>,
}

impl Follower {
    /// A follower with no data yet.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn apply_put(&self, key: &str, value: Value) {
        self.storage.lock().data.insert(key.to_string(), value);
    }

    fn apply_delete(&self, key: &str) {
        self.storage.lock().data.remove(key);
    }

    /// A point-in-time copy of every entry, used when a new follower joins mid-session.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.storage.lock().data.clone()
    }

    /// Install a full snapshot, used when a follower first joins the cluster.
    pub fn install_snapshot(&self, data: BTreeMap<String, Value>) {
        self.storage.lock().data = data;
    }
}

/// The leader half of the store: the only node writes go through, replicating every mutation to
/// its followers per the configured [`AckMode`] before acknowledging the caller.
#[derive(Debug)]
pub struct KvStore {
    config: KvStoreConfig,
    storage: Mutex<Storage>,
    followers: Mutex<Vec<Arc<Follower>>>,
    persistent: Mutex<std::collections::BTreeSet<String>>,
}

impl KvStore {
    /// Construct a fresh leader with no data and no followers.
    pub fn new(config: KvStoreConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            storage: Mutex::new(Storage::default()),
            followers: Mutex::new(Vec::new()),
            persistent: Mutex::new(Default::default()),
        })
    }

    /// Register a follower, replicating the current full dataset to it first.
    pub fn add_follower(&self, follower: Arc<Follower>) {
        let snapshot = self.storage.lock().data.clone();
        follower.install_snapshot(snapshot);
        self.followers.lock().push(follower);
        debug!("added follower; cluster size is now {}", self.followers.lock().len() + 1);
    }

    /// Whether a key has any entry (or any entry under the given prefix).
    pub fn exists(&self, key_prefix: &str) -> bool {
        self.storage.lock().data.keys().any(|k| k.starts_with(key_prefix))
    }

    /// Read a key's current value.
    pub fn get(&self, key: &str) -> Result<Value> {
        self.storage
            .lock()
            .data
            .get(key)
            .cloned()
            .ok_or_else(|| NotFoundSnafu { key: key.to_string() }.build())
    }

    /// List every entry whose key starts with `prefix`.
    pub fn list(&self, prefix: &str) -> Vec<(String, Value)> {
        self.storage
            .lock()
            .data
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Unconditionally set `key` to `value`, replicating to the required number of followers.
    pub fn put(&self, key: &str, value: Value) -> Result<()> {
        self.storage.lock().data.insert(key.to_string(), value.clone());
        self.replicate(|f| f.apply_put(key, value.clone()))
    }

    /// Accumulate `value` into `key`: adds `Count`/`Int` values, unions `Set` values, and
    /// concatenates `Vector`/`String` values; the first `add` to an absent key behaves like
    /// `put`.
    pub fn add(&self, key: &str, value: Value) -> Result<()> {
        let merged = {
            let mut storage = self.storage.lock();
            let merged = match storage.data.get(key) {
                None => value.clone(),
                Some(existing) => merge(existing, &value).ok_or_else(|| {
                    NotAccumulableSnafu { key: key.to_string() }.build()
                })?,
            };
            storage.data.insert(key.to_string(), merged.clone());
            merged
        };
        self.replicate(|f| f.apply_put(key, merged.clone()))
    }

    /// Remove a key, replicating the deletion.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.storage.lock().data.remove(key);
        self.replicate(|f| f.apply_delete(key))
    }

    /// Mark a key as persistent (survives a restart once the store is backed by disk; tracked
    /// here purely as a marker, matching the original's `persist_atom` bookkeeping).
    pub fn mark_persistent(&self, key: &str) {
        self.persistent.lock().insert(key.to_string());
    }

    /// Atomically add `delta` to the `Count` stored at `key` (defaulting to 0 if absent) and
    /// return the value after the addition. Used by the identifier to grow its lease against the
    /// persistent counter.
    pub fn fetch_add_count(&self, key: &str, delta: u64) -> Result<u64> {
        let new_total = {
            let mut storage = self.storage.lock();
            let current = match storage.data.get(key) {
                Some(Value::Count(c)) => *c,
                Some(_) => {
                    return NotAccumulableSnafu { key: key.to_string() }.fail();
                }
                None => 0,
            };
            let new_total = current + delta;
            storage.data.insert(key.to_string(), Value::Count(new_total));
            new_total
        };
        self.replicate(|f| f.apply_put(key, Value::Count(new_total)))?;
        Ok(new_total)
    }

    fn replicate(&self, mut apply: impl FnMut(&Follower)) -> Result<()> {
        let followers = self.followers.lock();
        let required = self.config.acknowledge.required(followers.len());
        // The leader's own local apply (already done by the caller before calling replicate)
        // counts toward the ack total, so quorum over a single-node store succeeds.
        let mut acked = 1;
        for f in followers.iter() {
            apply(f);
            acked += 1;
        }
        if acked < required {
            return UnavailableSnafu { acked, required }.fail();
        }
        Ok(())
    }
}

fn merge(existing: &Value, delta: &Value) -> Option<Value> {
    match (existing, delta) {
        (Value::Count(a), Value::Count(b)) => Some(Value::Count(a + b)),
        (Value::Int(a), Value::Int(b)) => Some(Value::Int(a + b)),
        (Value::String(a), Value::String(b)) => Some(Value::String(format!("{a}{b}"))),
        (Value::Vector(a), Value::Vector(b)) => {
            let mut merged = a.clone();
            merged.extend(b.clone());
            Some(Value::Vector(merged))
        }
        (Value::Set(a), Value::Set(b)) => {
            let mut merged = a.clone();
            merged.extend(b.clone());
            Some(Value::set(merged))
        }
        _ => None,
    }
}

/// A node that has not yet been promoted to leader, mirroring the original's "forward writes to
/// the leader" follower behaviour. Once promoted (`leader_atom` in the original), use
/// [`KvStore`] directly.
pub struct NotYetLeader;

impl NotYetLeader {
    /// Following-node writes always fail: the caller must forward them to the leader.
    pub fn put(&self) -> Result<()> {
        NotLeaderSnafu.fail()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_roundtrip() {
        let store = KvStore::new(KvStoreConfig::default());
        store.put("counter", Value::Count(1)).unwrap();
        assert_eq!(store.get("counter").unwrap(), Value::Count(1));
    }

    #[test]
    fn add_accumulates_counts() {
        let store = KvStore::new(KvStoreConfig::default());
        store.add("counter", Value::Count(1)).unwrap();
        store.add("counter", Value::Count(4)).unwrap();
        assert_eq!(store.get("counter").unwrap(), Value::Count(5));
    }

    #[test]
    fn all_ack_mode_requires_every_follower() {
        let store = KvStore::new(KvStoreConfig {
            acknowledge: AckMode::All,
        });
        store.add_follower(Follower::new());
        store.add_follower(Follower::new());
        assert!(store.put("k", Value::Bool(true)).is_ok());
    }

    #[test]
    fn quorum_ack_mode_succeeds_on_a_single_node_cluster() {
        let store = KvStore::new(KvStoreConfig {
            acknowledge: AckMode::Quorum,
        });
        // With zero followers, the leader's own local apply is already a majority of {leader}.
        assert!(store.put("k", Value::Bool(true)).is_ok());
    }

    #[test]
    fn quorum_ack_mode_requires_majority_of_the_whole_cluster() {
        let store = KvStore::new(KvStoreConfig {
            acknowledge: AckMode::Quorum,
        });
        store.add_follower(Follower::new());
        store.add_follower(Follower::new());
        // Leader + 2 followers = 3 nodes; majority is 2, and both followers always ack here, so
        // the write still succeeds.
        assert!(store.put("k", Value::Bool(true)).is_ok());
    }

    #[test]
    fn new_follower_receives_existing_snapshot() {
        let store = KvStore::new(KvStoreConfig::default());
        store.add_follower(Follower::new());
        store.put("k", Value::Int(1)).unwrap();

        let late_follower = Follower::new();
        store.add_follower(late_follower.clone());
        assert_eq!(late_follower.snapshot().get("k"), Some(&Value::Int(1)));
    }

    #[test]
    fn delete_removes_key() {
        let store = KvStore::new(KvStoreConfig::default());
        store.put("k", Value::Bool(true)).unwrap();
        store.delete("k").unwrap();
        assert!(store.get("k").is_err());
    }
}
