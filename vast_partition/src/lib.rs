//! Holds and queries the bitmap indexers for one contiguous range of event ids (spec.md §4.4),
//! grounded on `partition.cc`'s per-type indexer dispatch and `bitmap_index_polymorphic.h`'s
//! coder interface.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(missing_docs, clippy::clone_on_ref_ptr)]

pub mod error;
pub mod indexer;
mod persist;

pub use error::Error;

use indexer::{leaves, FieldIndexer};
use observability_deps::tracing::debug;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use uuid::Uuid;
use vast_bitmap::Bitmap;
use vast_time::Time;
use vast_types::expr::predicatizer::DispatchKey;
use vast_types::types::Shape;
use vast_types::{Event, EventId, Expr, Operand, Type, Value};

use error::Result;

/// A partition is overloaded once its in-flight event count crosses this watermark
/// (spec.md §4.4: "≈ 2²⁰ events").
pub const DEFAULT_OVERLOAD_WATERMARK: u64 = 1 << 20;

/// Tuning knobs for one partition.
#[derive(Debug, Clone, Copy)]
pub struct PartitionConfig {
    /// Soft watermark past which the partition reports itself overloaded.
    pub overload_watermark: u64,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            overload_watermark: DEFAULT_OVERLOAD_WATERMARK,
        }
    }
}

struct State {
    schema: Vec<Type>,
    indexers: HashMap<DispatchKey, FieldIndexer>,
    row_ids: Vec<EventId>,
    first_ts: Option<Time>,
    last_ts: Option<Time>,
    events_in_flight: u64,
    /// Continuous query expressions installed on this partition (spec.md §4.4 "Continuous
    /// query"). Not persisted: a restart drops continuous queries the same way it drops every
    /// other in-memory subscriber state, and callers re-subscribe.
    continuous: HashSet<Expr>,
}

impl State {
    fn rows(&self) -> usize {
        self.row_ids.len()
    }
}

/// One directory's worth of bitmap indexers, covering a contiguous span of event ids
/// (spec.md §3.5, §4.4).
pub struct Partition {
    dir: PathBuf,
    id: Uuid,
    config: PartitionConfig,
    state: Mutex<State>,
}

impl Partition {
    /// Open the partition rooted at `dir`, recovering its indexers if it was previously flushed,
    /// or start a fresh, empty one otherwise.
    pub fn open(dir: PathBuf, id: Uuid, config: PartitionConfig) -> Result<Self> {
        let state = if persist::exists(&dir) {
            let loaded = persist::read(&dir)?;
            State {
                schema: loaded.schema,
                indexers: loaded.indexers,
                row_ids: loaded.row_ids,
                first_ts: loaded.first_ts,
                last_ts: loaded.last_ts,
                events_in_flight: 0,
                continuous: HashSet::new(),
            }
        } else {
            State {
                schema: Vec::new(),
                indexers: HashMap::new(),
                row_ids: Vec::new(),
                first_ts: None,
                last_ts: None,
                events_in_flight: 0,
                continuous: HashSet::new(),
            }
        };
        Ok(Self {
            dir,
            id,
            config,
            state: Mutex::new(state),
        })
    }

    /// This partition's identity, used as its directory name and as the index's scheduling key.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Number of rows (events) this partition currently holds.
    pub fn rows(&self) -> usize {
        self.state.lock().rows()
    }

    /// The `[first, last]` timestamp extent of every event written so far, used by the
    /// index's time-range restrictor (spec.md §4.5). `None` if the partition is empty.
    pub fn span(&self) -> Option<(Time, Time)> {
        let state = self.state.lock();
        Some((state.first_ts?, state.last_ts?))
    }

    /// Whether this partition has crossed its overload watermark (spec.md §4.4).
    pub fn is_overloaded(&self) -> bool {
        self.state.lock().events_in_flight >= self.config.overload_watermark
    }

    /// Append a batch of events: create indexers for newly seen, non-`skip` types, forward every
    /// row to its matching field indexers, and stretch every other indexer by one row to keep
    /// the partition column-aligned (spec.md §4.4 write path).
    ///
    /// Also evaluates every installed continuous query against just this batch's rows (spec.md
    /// §4.4 "Continuous query": "new batches cause a transient `accumulator`... to gather
    /// per-predicate hits and compute the evaluation once"), returning the event ids each one
    /// newly matched. An expression with no new matches is omitted from the result.
    pub fn write(&self, events: &[Event]) -> Result<Vec<(Expr, Vec<EventId>)>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }
        let mut state = self.state.lock();
        let batch_start = state.rows();
        for event in events {
            self.write_one(&mut state, event);
        }
        state.events_in_flight += events.len() as u64;
        debug!(
            partition = %self.id,
            count = events.len(),
            rows = state.rows(),
            "indexed batch"
        );

        let mut continuous_hits = Vec::new();
        if !state.continuous.is_empty() {
            let rows = state.rows();
            let exprs: Vec<Expr> = state.continuous.iter().cloned().collect();
            for expr in exprs {
                let bitmap = vast_bitmap::evaluate(&expr, rows, &mut |predicate| {
                    self.decode_predicate(&state, predicate, rows)
                });
                let ids: Vec<EventId> = bitmap
                    .iter_ones()
                    .filter(|&row| row >= batch_start)
                    .filter_map(|row| state.row_ids.get(row).copied())
                    .collect();
                if !ids.is_empty() {
                    continuous_hits.push((expr, ids));
                }
            }
        }
        Ok(continuous_hits)
    }

    /// Install `expr` as a continuous query: every subsequent [`Self::write`] call reports the
    /// rows it newly matches (spec.md §4.5 "Continuous dispatch": "Attach the expression to
    /// every active partition"). A no-op if `expr` is already installed.
    pub fn install_continuous(&self, expr: Expr) {
        self.state.lock().continuous.insert(expr);
    }

    /// Stop evaluating `expr` on future batches (spec.md §4.5 "Subscriber lifecycle": "when the
    /// last subscriber leaves a continuous query, disable it").
    pub fn remove_continuous(&self, expr: &Expr) {
        self.state.lock().continuous.remove(expr);
    }

    /// Every continuous query currently installed, used to carry them over to a replacement
    /// partition on retirement (spec.md §4.5 "On active-partition retirement, the continuous
    /// query is transferred to the replacement").
    pub fn continuous_queries(&self) -> Vec<Expr> {
        self.state.lock().continuous.iter().cloned().collect()
    }

    fn write_one(&self, state: &mut State, event: &Event) {
        let ty = event.ty();
        let fingerprint = ty.fingerprint().0;

        if !ty.is_skipped() && !state.schema.iter().any(|t| t.fingerprint().0 == fingerprint) {
            state.schema.push(ty.clone());
            for (path, leaf_ty) in leaves(ty) {
                let key = DispatchKey::Field(fingerprint, path);
                state
                    .indexers
                    .entry(key)
                    .or_insert_with(|| FieldIndexer::for_shape(&leaf_ty.shape));
            }
        }

        let type_name = Value::String(ty.name.clone().unwrap_or_default());
        state
            .indexers
            .entry(DispatchKey::EventType)
            .or_insert_with(|| FieldIndexer::for_shape(&Shape::String))
            .encode(Some(&type_name));
        state
            .indexers
            .entry(DispatchKey::EventTime)
            .or_insert_with(|| FieldIndexer::for_shape(&Shape::TimePoint))
            .encode(Some(&Value::Time(event.timestamp())));

        for (key, indexer) in state.indexers.iter_mut() {
            match key {
                DispatchKey::Field(fp, path) if *fp == fingerprint && !ty.is_skipped() => {
                    indexer.encode(event.data().at_path(path));
                }
                DispatchKey::EventType | DispatchKey::EventTime => {}
                _ => indexer.stretch(1),
            }
        }

        state.row_ids.push(event.id());
        state.first_ts = Some(state.first_ts.map_or(event.timestamp(), |t| t.min(event.timestamp())));
        state.last_ts = Some(state.last_ts.map_or(event.timestamp(), |t| t.max(event.timestamp())));
    }

    /// Evaluate a fully resolved expression against this partition's indexers, returning a
    /// bitmap of matching rows (spec.md §4.4, "re-evaluate the expression using the bitmap
    /// evaluator").
    pub fn evaluate(&self, expr: &Expr) -> Bitmap {
        let state = self.state.lock();
        let rows = state.rows();
        vast_bitmap::evaluate(expr, rows, &mut |predicate| {
            self.decode_predicate(&state, predicate, rows)
        })
    }

    fn decode_predicate(&self, state: &State, predicate: &vast_types::Predicate, rows: usize) -> Bitmap {
        let rhs = match &predicate.rhs {
            Operand::Data(v) => v.clone(),
            _ => return Bitmap::filled(rows, true),
        };
        match &predicate.lhs {
            Operand::EventType => state
                .indexers
                .get(&DispatchKey::EventType)
                .and_then(|idx| idx.decode(predicate.op, &rhs))
                .unwrap_or_else(|| Bitmap::filled(rows, true)),
            Operand::EventTime => state
                .indexers
                .get(&DispatchKey::EventTime)
                .and_then(|idx| idx.decode(predicate.op, &rhs))
                .unwrap_or_else(|| Bitmap::filled(rows, true)),
            Operand::DataExtractor(ty, path) => {
                let key = DispatchKey::Field(ty.fingerprint().0, path.clone());
                state
                    .indexers
                    .get(&key)
                    .and_then(|idx| idx.decode(predicate.op, &rhs))
                    .unwrap_or_else(|| Bitmap::filled(rows, false))
            }
            // A type-extractor is always paired by the resolver with an `EventType` check in the
            // same conjunction (see `resolver::resolve`); answering it as "maybe" here and
            // letting that sibling predicate narrow the result keeps this decode total.
            Operand::TypeExtractor(_) | Operand::SchemaExtractor(_) => Bitmap::filled(rows, true),
        }
    }

    /// Map a row bitmap (as returned by [`Self::evaluate`]) back to the absolute event ids it
    /// represents.
    pub fn hits_to_event_ids(&self, hits: &Bitmap) -> Vec<EventId> {
        let state = self.state.lock();
        hits.iter_ones().filter_map(|i| state.row_ids.get(i).copied()).collect()
    }

    /// Persist the schema table and every indexer to disk (spec.md §4.4 flush).
    pub fn flush(&self) -> Result<()> {
        let state = self.state.lock();
        persist::write(
            &self.dir,
            &state.schema,
            &state.row_ids,
            state.first_ts,
            state.last_ts,
            &state.indexers,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vast_types::{types::Shape, Field, RelOp, Value};

    fn conn_type() -> Type {
        Type::new(Shape::Record(vec![Field::new("proto", Type::new(Shape::String))])).named("conn")
    }

    fn make_event(id: u64, proto: &str) -> Event {
        Event::with_id(
            EventId::new(id),
            Time::from_timestamp_nanos(id as i64),
            conn_type(),
            Value::Record(vec![Value::String(proto.into())]),
        )
    }

    #[test]
    fn write_then_evaluate_finds_matching_rows() {
        let dir = tempfile::tempdir().unwrap();
        let partition = Partition::open(dir.path().to_path_buf(), Uuid::new_v4(), PartitionConfig::default()).unwrap();
        partition
            .write(&[make_event(1, "tcp"), make_event(2, "udp"), make_event(3, "tcp")])
            .unwrap();

        let ty = conn_type();
        let expr = Expr::predicate(
            Operand::DataExtractor(ty, vec![0]),
            RelOp::Eq,
            Operand::Data(Value::String("tcp".into())),
        );
        let hits = partition.evaluate(&expr);
        let ids = partition.hits_to_event_ids(&hits);
        assert_eq!(ids, vec![EventId::new(1), EventId::new(3)]);
    }

    #[test]
    fn flush_then_reopen_preserves_indexers() {
        let dir = tempfile::tempdir().unwrap();
        let uuid = Uuid::new_v4();
        {
            let partition = Partition::open(dir.path().to_path_buf(), uuid, PartitionConfig::default()).unwrap();
            partition.write(&[make_event(1, "tcp")]).unwrap();
            partition.flush().unwrap();
        }

        let reopened = Partition::open(dir.path().to_path_buf(), uuid, PartitionConfig::default()).unwrap();
        assert_eq!(reopened.rows(), 1);
        let ty = conn_type();
        let expr = Expr::predicate(
            Operand::DataExtractor(ty, vec![0]),
            RelOp::Eq,
            Operand::Data(Value::String("tcp".into())),
        );
        assert_eq!(reopened.evaluate(&expr).count_ones(), 1);
    }

    #[test]
    fn overload_watermark_trips_after_enough_events() {
        let dir = tempfile::tempdir().unwrap();
        let config = PartitionConfig { overload_watermark: 2 };
        let partition = Partition::open(dir.path().to_path_buf(), Uuid::new_v4(), config).unwrap();
        assert!(!partition.is_overloaded());
        partition.write(&[make_event(1, "tcp"), make_event(2, "tcp")]).unwrap();
        assert!(partition.is_overloaded());
    }

    fn tcp_expr() -> Expr {
        Expr::predicate(
            Operand::DataExtractor(conn_type(), vec![0]),
            RelOp::Eq,
            Operand::Data(Value::String("tcp".into())),
        )
    }

    #[test]
    fn continuous_query_only_reports_rows_from_the_batch_that_matched_them() {
        let dir = tempfile::tempdir().unwrap();
        let partition = Partition::open(dir.path().to_path_buf(), Uuid::new_v4(), PartitionConfig::default()).unwrap();
        let expr = tcp_expr();
        partition.install_continuous(expr.clone());

        let first = partition.write(&[make_event(1, "udp")]).unwrap();
        assert!(first.is_empty(), "no tcp rows in the first batch");

        let second = partition.write(&[make_event(2, "tcp"), make_event(3, "udp")]).unwrap();
        assert_eq!(second, vec![(expr, vec![EventId::new(2)])]);
    }

    #[test]
    fn removed_continuous_query_stops_reporting_hits() {
        let dir = tempfile::tempdir().unwrap();
        let partition = Partition::open(dir.path().to_path_buf(), Uuid::new_v4(), PartitionConfig::default()).unwrap();
        let expr = tcp_expr();
        partition.install_continuous(expr.clone());
        partition.remove_continuous(&expr);

        let hits = partition.write(&[make_event(1, "tcp")]).unwrap();
        assert!(hits.is_empty());
        assert!(partition.continuous_queries().is_empty());
    }

    #[test]
    fn continuous_queries_lists_every_installed_expression() {
        let dir = tempfile::tempdir().unwrap();
        let partition = Partition::open(dir.path().to_path_buf(), Uuid::new_v4(), PartitionConfig::default()).unwrap();
        let expr = tcp_expr();
        partition.install_continuous(expr.clone());
        assert_eq!(partition.continuous_queries(), vec![expr]);
    }
}
