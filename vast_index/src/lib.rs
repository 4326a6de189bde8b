//! Manages the lifecycle of all partitions and schedules them against a capacity budget
//! (spec.md §4.5), grounded on `index.cc`'s round-robin active-partition ingestion,
//! time-pruned historical dispatch, and continuous query dispatch.
//!
//! The original is an actor juggling a `schedule` FIFO and per-partition task actors so it can
//! overlap many in-flight queries across a bounded passive set. Without an actor mailbox,
//! [`Index::query`] instead walks candidate partitions synchronously, relying on the same LRU
//! capacity bound to keep at most `passive_partitions_in_memory` sealed partitions resident at
//! once. Continuous queries have no such FIFO to begin with (spec.md §4.4, §4.5): they are
//! installed directly on every active partition, and [`Index::write`] returns whatever each one
//! newly matched so the caller can deliver it, in place of a sink actor.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(missing_docs, clippy::clone_on_ref_ptr)]

pub mod error;
mod lru;
mod meta;

pub use error::Error;

use lru::LruCache;
use metric::{Registry, U64Counter};
use observability_deps::tracing::{debug, warn};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;
use vast_bitmap::Bitmap;
use vast_partition::{Partition, PartitionConfig};
use vast_time::{Time, TimeProvider};
use vast_types::expr::restrictor;
use vast_types::{Event, EventId, Expr};

use error::Result;

/// Index configuration (spec.md §4.5: "`max_events_per_partition`, `active_partitions` (N),
/// `passive_partitions_in_memory` (M)").
#[derive(Debug, Clone, Copy)]
pub struct IndexConfig {
    /// A partition is retired and replaced once its event count would exceed this on the next
    /// batch.
    pub max_events_per_partition: u64,
    /// Number of partitions kept resident and actively accepting writes.
    pub active_partitions: usize,
    /// Maximum number of sealed (passive) partitions kept resident for querying at once.
    pub passive_partitions_in_memory: usize,
    /// Per-partition overload watermark, forwarded to every spawned [`Partition`].
    pub partition_overload_watermark: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_events_per_partition: 1 << 20,
            active_partitions: 1,
            passive_partitions_in_memory: 4,
            partition_overload_watermark: vast_partition::DEFAULT_OVERLOAD_WATERMARK,
        }
    }
}

/// Persisted bookkeeping for one partition (spec.md §4.5 `partition_state`).
#[derive(Debug, Clone, Copy)]
pub struct PartitionMeta {
    /// Events written so far.
    pub events: u64,
    /// Wall-clock time of the last write.
    pub last_modified: Time,
    /// Earliest event timestamp.
    pub from: Time,
    /// Latest event timestamp.
    pub to: Time,
}

impl Default for PartitionMeta {
    fn default() -> Self {
        Self {
            events: 0,
            last_modified: Time::MIN,
            from: Time::MAX,
            to: Time::MIN,
        }
    }
}

struct IndexMetrics {
    events_written: U64Counter,
    partitions_retired: U64Counter,
    passive_loads: U64Counter,
}

impl IndexMetrics {
    fn new(registry: &Registry) -> Self {
        Self {
            events_written: registry
                .register_metric::<U64Counter>("index_events_written", "events forwarded to a partition")
                .recorder(&[]),
            partitions_retired: registry
                .register_metric::<U64Counter>("index_partitions_retired", "active partitions retired on overflow")
                .recorder(&[]),
            passive_loads: registry
                .register_metric::<U64Counter>("index_passive_loads", "partitions loaded from disk for a query")
                .recorder(&[]),
        }
    }
}

/// Opaque handle for one continuous-query subscriber, returned by
/// [`Index::subscribe_continuous`] and consumed by [`Index::unsubscribe`] (spec.md §4.5
/// "Subscriber lifecycle").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// One continuous query's new hits for one subscriber, as reported by a single [`Index::write`]
/// call (spec.md §4.4 "Continuous query": "forwarding hits to the sink"). With no actor mailbox
/// to deliver into, this stands in for the sink: the caller is responsible for routing each
/// delivery to whatever transport `subscriber` corresponds to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuousDelivery {
    /// Which subscriber this delivery is for.
    pub subscriber: SubscriberId,
    /// The continuous query expression that matched.
    pub expr: Expr,
    /// Event ids newly matched by this query in this batch.
    pub ids: Vec<EventId>,
}

struct ContinuousQuery {
    subscribers: HashSet<SubscriberId>,
}

struct State {
    partitions: HashMap<Uuid, PartitionMeta>,
    active: Vec<(Uuid, Arc<Partition>)>,
    next_active: usize,
    /// `queries` restricted to its continuous half (spec.md §4.5's `queries: map<expression,
    /// {subscribers, historical_state, continuous_state}>`); historical queries are resolved
    /// once per call by `vast_query::Query` instead of being tracked here.
    continuous: HashMap<Expr, ContinuousQuery>,
    next_subscriber: u64,
}

/// Owns every partition directory under `dir`, load-balancing writes across a fixed-size active
/// ring and dispatching historical queries to the partitions whose time span can satisfy them
/// (spec.md §4.5).
pub struct Index {
    dir: PathBuf,
    meta_path: PathBuf,
    config: IndexConfig,
    clock: Arc<dyn TimeProvider>,
    state: Mutex<State>,
    passive: Mutex<LruCache<Arc<Partition>>>,
    metrics: IndexMetrics,
}

impl Index {
    /// Open (or initialize) an index rooted at `dir`: recover partition meta from `meta` if
    /// present, then load up to `active_partitions` existing partitions (most-recently-modified
    /// first, skipping any already at capacity) into the active ring, padding with fresh
    /// partitions as needed (spec.md §4.5, grounded on `index::make`'s startup scan).
    pub fn open(
        dir: PathBuf,
        config: IndexConfig,
        clock: Arc<dyn TimeProvider>,
        registry: &Registry,
    ) -> Result<Arc<Self>> {
        let meta_path = dir.join("meta");
        let partitions = if meta_path.exists() {
            meta::read_meta(&meta_path)?
        } else {
            HashMap::new()
        };

        let mut candidates: Vec<(Uuid, PartitionMeta)> = partitions
            .iter()
            .filter(|(_, m)| m.events < config.max_events_per_partition)
            .map(|(u, m)| (*u, *m))
            .collect();
        candidates.sort_by(|a, b| b.1.last_modified.cmp(&a.1.last_modified));

        let mut active = Vec::with_capacity(config.active_partitions);
        let mut partitions = partitions;
        for i in 0..config.active_partitions {
            let uuid = candidates.get(i).map(|(u, _)| *u).unwrap_or_else(Uuid::new_v4);
            let partition = Partition::open(
                dir.join(uuid.to_string()),
                uuid,
                PartitionConfig {
                    overload_watermark: config.partition_overload_watermark,
                },
            )?;
            partitions.entry(uuid).or_default();
            active.push((uuid, Arc::new(partition)));
        }

        let passive_capacity = config.passive_partitions_in_memory;
        Ok(Arc::new(Self {
            dir,
            meta_path,
            config,
            clock,
            state: Mutex::new(State {
                partitions,
                active,
                next_active: 0,
                continuous: HashMap::new(),
                next_subscriber: 0,
            }),
            passive: Mutex::new(LruCache::new(passive_capacity, |uuid, partition: Arc<Partition>| {
                debug!(%uuid, "evicts passive partition");
                if let Err(error) = partition.flush() {
                    warn!(%uuid, %error, "failed to flush partition on eviction");
                }
            })),
            metrics: IndexMetrics::new(registry),
        }))
    }

    /// Forward a batch to the next active partition in round-robin order, retiring it for a
    /// fresh one first if the batch would overflow `max_events_per_partition` (spec.md §4.5
    /// ingestion). A retired partition's continuous queries transfer to its replacement (spec.md
    /// §4.5 "Continuous dispatch").
    ///
    /// Returns one [`ContinuousDelivery`] per `(continuous query, subscriber)` pair that matched
    /// a row in this batch.
    pub fn write(&self, events: &[Event]) -> Result<Vec<ContinuousDelivery>> {
        let Some((first, last)) = events.first().zip(events.last()) else {
            return Ok(Vec::new());
        };
        let (first_ts, last_ts) = (first.timestamp(), last.timestamp());

        let mut state = self.state.lock();
        let idx = state.next_active % state.active.len();
        state.next_active = state.next_active.wrapping_add(1);

        let (mut uuid, mut partition) = state.active[idx].clone();
        let current_events = state.partitions.get(&uuid).map_or(0, |m| m.events);
        if current_events > 0 && current_events + events.len() as u64 > self.config.max_events_per_partition {
            debug!(%uuid, "retires active partition on overflow");
            partition.flush()?;
            uuid = Uuid::new_v4();
            partition = Arc::new(Partition::open(
                self.dir.join(uuid.to_string()),
                uuid,
                PartitionConfig {
                    overload_watermark: self.config.partition_overload_watermark,
                },
            )?);
            for expr in state.continuous.keys() {
                partition.install_continuous(expr.clone());
            }
            state.active[idx] = (uuid, Arc::clone(&partition));
            self.metrics.partitions_retired.inc(1);
        }

        let continuous_hits = partition.write(events)?;
        let meta = state.partitions.entry(uuid).or_default();
        meta.events += events.len() as u64;
        meta.last_modified = self.clock.now();
        meta.from = meta.from.min(first_ts);
        meta.to = meta.to.max(last_ts);
        self.metrics.events_written.inc(events.len() as u64);

        let mut deliveries = Vec::new();
        for (expr, ids) in continuous_hits {
            if let Some(query) = state.continuous.get(&expr) {
                for &subscriber in &query.subscribers {
                    deliveries.push(ContinuousDelivery {
                        subscriber,
                        expr: expr.clone(),
                        ids: ids.clone(),
                    });
                }
            }
        }
        Ok(deliveries)
    }

    /// Install `expr` as a continuous query on every active partition and register the caller as
    /// its first subscriber (spec.md §4.5 "Continuous dispatch"). If `expr` is already an
    /// installed continuous query, this only adds another subscriber; it is not re-installed.
    pub fn subscribe_continuous(&self, expr: Expr) -> SubscriberId {
        let mut state = self.state.lock();
        let id = SubscriberId(state.next_subscriber);
        state.next_subscriber += 1;

        if let Some(query) = state.continuous.get_mut(&expr) {
            query.subscribers.insert(id);
        } else {
            let mut subscribers = HashSet::new();
            subscribers.insert(id);
            state.continuous.insert(expr.clone(), ContinuousQuery { subscribers });
            for (_, partition) in &state.active {
                partition.install_continuous(expr.clone());
            }
        }
        id
    }

    /// Remove `subscriber` from every continuous query, disabling (and uninstalling from every
    /// active partition) any query whose last subscriber this was (spec.md §4.5 "Subscriber
    /// lifecycle": "when the last subscriber leaves a continuous query, disable it").
    pub fn unsubscribe(&self, subscriber: SubscriberId) {
        let mut state = self.state.lock();
        let mut emptied = Vec::new();
        for (expr, query) in state.continuous.iter_mut() {
            query.subscribers.remove(&subscriber);
            if query.subscribers.is_empty() {
                emptied.push(expr.clone());
            }
        }
        for expr in emptied {
            state.continuous.remove(&expr);
            for (_, partition) in &state.active {
                partition.remove_continuous(&expr);
            }
            debug!(?expr, "last subscriber left; disabled continuous query");
        }
    }

    /// Evaluate `expr` against every partition whose `[from, to]` span survives the time-range
    /// restrictor, returning the union of matching event ids (spec.md §4.5 historical dispatch,
    /// §4.6 "accumulate hits from the index").
    ///
    /// Active partitions are queried in place; passive (sealed) ones are loaded from disk into
    /// the bounded LRU on demand, evicting and flushing the least-recently-used entry if the
    /// cache is full.
    pub fn query(&self, expr: &Expr) -> Result<Vec<EventId>> {
        let candidates: Vec<Uuid> = {
            let state = self.state.lock();
            state
                .partitions
                .iter()
                .filter(|(_, meta)| meta.events > 0 && restrictor::restrict(expr, meta.from, meta.to))
                .map(|(uuid, _)| *uuid)
                .collect()
        };

        let mut hits = Vec::new();
        for uuid in candidates {
            let partition = self.resolve_partition(uuid)?;
            let bitmap: Bitmap = partition.evaluate(expr);
            hits.extend(partition.hits_to_event_ids(&bitmap));
        }
        hits.sort_by_key(|id| id.get());
        hits.dedup();
        Ok(hits)
    }

    fn resolve_partition(&self, uuid: Uuid) -> Result<Arc<Partition>> {
        {
            let state = self.state.lock();
            if let Some((_, partition)) = state.active.iter().find(|(u, _)| *u == uuid) {
                return Ok(Arc::clone(partition));
            }
        }
        let mut passive = self.passive.lock();
        if let Some(partition) = passive.get(&uuid) {
            return Ok(Arc::clone(partition));
        }
        debug!(%uuid, "loads passive partition for query");
        let partition = Arc::new(Partition::open(
            self.dir.join(uuid.to_string()),
            uuid,
            PartitionConfig {
                overload_watermark: self.config.partition_overload_watermark,
            },
        )?);
        passive.insert(uuid, Arc::clone(&partition));
        self.metrics.passive_loads.inc(1);
        Ok(partition)
    }

    /// Flush every active partition and the meta table to disk (spec.md §4.5).
    pub fn flush(&self) -> Result<()> {
        let state = self.state.lock();
        for (_, partition) in &state.active {
            partition.flush()?;
        }
        meta::write_meta(&self.meta_path, &state.partitions)?;
        Ok(())
    }
}
