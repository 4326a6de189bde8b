//! Resolves a query expression against the index's bitmap hits, then pulls the matching events
//! out of the archive one pull-request at a time (spec.md §4.6), grounded on `query.cc`'s
//! idle/waiting/extracting state machine, collapsed to a synchronous pull API: there is no
//! mailbox to prefetch chunks into, so `extract` does its own archive lookup inline per id.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(missing_docs, clippy::clone_on_ref_ptr)]

pub mod error;

pub use error::Error;

use metric::{Registry, U64Counter};
use observability_deps::tracing::{debug, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use vast_archive::Archive;
use vast_index::Index;
use vast_types::expr::{evaluator, resolver, Expr};
use vast_types::{Event, Fingerprint};

use error::{ChunkSnafu, Result};
use snafu::ResultExt;

/// Tuning knobs for a single query (spec.md §4.6).
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryConfig {
    /// Caps the total number of events ever delivered by this query, across every `extract`
    /// call. `None` means unlimited.
    pub max_results: Option<u64>,
}

struct QueryMetrics {
    delivered: U64Counter,
    false_positives: U64Counter,
}

impl QueryMetrics {
    fn new(registry: &Registry) -> Self {
        Self {
            delivered: registry
                .register_metric::<U64Counter>("query_events_delivered", "events returned to callers")
                .recorder(&[]),
            false_positives: registry
                .register_metric::<U64Counter>(
                    "query_false_positives",
                    "candidate hits that failed the type-resolved re-check",
                )
                .recorder(&[]),
        }
    }
}

struct State {
    hits: Vec<u64>,
    position: usize,
    delivered: u64,
    resolved: HashMap<Fingerprint, Option<Expr>>,
}

/// A resolved, pullable query: the hit set is computed once at construction time, and events are
/// extracted in ascending id order on demand.
pub struct Query {
    archive: Arc<Archive>,
    ast: Expr,
    config: QueryConfig,
    state: Mutex<State>,
    metrics: QueryMetrics,
}

impl Query {
    /// Resolve `ast` against `index` into a concrete, ascending-order hit set, ready for
    /// extraction via the archive.
    pub fn new(
        archive: Arc<Archive>,
        index: &Index,
        ast: Expr,
        config: QueryConfig,
        registry: &Registry,
    ) -> Result<Arc<Self>> {
        let mut hits: Vec<u64> = index.query(&ast)?.into_iter().map(|id| id.get()).collect();
        hits.sort_unstable();
        hits.dedup();
        debug!(hits = hits.len(), "resolved query hit set");
        Ok(Arc::new(Self {
            archive,
            ast,
            config,
            state: Mutex::new(State {
                hits,
                position: 0,
                delivered: 0,
                resolved: HashMap::new(),
            }),
            metrics: QueryMetrics::new(registry),
        }))
    }

    /// Pull up to `n` more matching events, in ascending id order. `n == 0` means "as many as
    /// remain", capped by [`QueryConfig::max_results`] (spec.md §4.6's `extract_atom` semantics).
    ///
    /// Candidate hits whose type-resolved expression turns out false (the index's bitmap
    /// evaluation over-approximates predicates it can't encode exactly, e.g. schema extractors)
    /// are silently skipped and counted as false positives; they don't count against `n`.
    pub fn extract(&self, n: u64) -> Result<Vec<Event>> {
        let mut state = self.state.lock();
        let want = if n == 0 { u64::MAX } else { n };
        let mut out = Vec::new();

        while out.len() as u64 != want && state.position < state.hits.len() {
            if let Some(max) = self.config.max_results {
                if state.delivered >= max {
                    break;
                }
            }
            let id = state.hits[state.position];
            state.position += 1;

            let Some(chunk) = self.archive.lookup(vast_types::EventId::new(id))? else {
                warn!(id, "query hit has no corresponding chunk in the archive");
                continue;
            };
            let event = chunk
                .reader()
                .seek(vast_types::EventId::new(id))
                .context(ChunkSnafu { id })?;

            let fingerprint = event.ty().fingerprint();
            let resolved = state
                .resolved
                .entry(fingerprint)
                .or_insert_with(|| resolver::resolve_against(&self.ast, event.ty()))
                .clone();

            let matches = match &resolved {
                Some(resolved) => evaluator::evaluate(resolved, &event),
                None => false,
            };

            if matches {
                state.delivered += 1;
                self.metrics.delivered.inc(1);
                out.push(event);
            } else {
                self.metrics.false_positives.inc(1);
                warn!(id, "ignoring false positive hit");
            }
        }

        Ok(out)
    }

    /// Fraction of the original hit set that has been considered so far (not necessarily
    /// delivered, since false positives are also consumed).
    pub fn progress(&self) -> f64 {
        let state = self.state.lock();
        if state.hits.is_empty() {
            1.0
        } else {
            state.position as f64 / state.hits.len() as f64
        }
    }

    /// Whether every hit has been considered, or the result cap has been reached.
    pub fn is_done(&self) -> bool {
        let state = self.state.lock();
        state.position >= state.hits.len()
            || self.config.max_results.is_some_and(|max| state.delivered >= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vast_archive::ArchiveConfig;
    use vast_index::IndexConfig;
    use vast_time::{MockProvider, Time};
    use vast_types::expr::{Operand, RelOp};
    use vast_types::types::Shape;
    use vast_types::{Field, Type, Value};

    fn make_event(ts: i64, x: i64) -> Event {
        let ty = Type::new(Shape::Record(vec![Field::new("x", Type::new(Shape::Int))])).named("t");
        Event::pending(Time::from_timestamp_nanos(ts), ty, Value::Record(vec![Value::Int(x)]))
    }

    fn setup(dir: &std::path::Path) -> (Arc<Archive>, Arc<Index>, Registry) {
        let registry = Registry::new();
        let clock = Arc::new(MockProvider::new(Time::from_timestamp_nanos(0)));
        let archive = Archive::new(dir.join("archive"), ArchiveConfig::default(), &registry).unwrap();
        let index = Index::open(dir.join("index"), IndexConfig::default(), clock, &registry).unwrap();
        (archive, index, registry)
    }

    fn ingest(archive: &Archive, index: &Index, events: &mut [Event]) {
        for (i, event) in events.iter_mut().enumerate() {
            event.assign_id(vast_types::EventId::new(i as u64 + 1));
        }
        archive.ingest(events).unwrap();
        index.write(events).unwrap();
    }

    fn type_predicate() -> Expr {
        let ty = Type::new(Shape::Record(vec![Field::new("x", Type::new(Shape::Int))])).named("t");
        Expr::predicate(Operand::EventType, RelOp::Eq, Operand::TypeExtractor(ty))
    }

    #[test]
    fn extracts_all_matching_events_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let (archive, index, registry) = setup(dir.path());
        let mut batch = vec![make_event(1, 1), make_event(2, 2), make_event(3, 3)];
        ingest(&archive, &index, &mut batch);

        let query = Query::new(archive, &index, type_predicate(), QueryConfig::default(), &registry).unwrap();
        let first = query.extract(2).unwrap();
        assert_eq!(first.len(), 2);
        let second = query.extract(2).unwrap();
        assert_eq!(second.len(), 1);
        assert!(query.is_done());
    }

    #[test]
    fn extract_zero_pulls_everything_remaining() {
        let dir = tempfile::tempdir().unwrap();
        let (archive, index, registry) = setup(dir.path());
        let mut batch = vec![make_event(1, 1), make_event(2, 2)];
        ingest(&archive, &index, &mut batch);

        let query = Query::new(archive, &index, type_predicate(), QueryConfig::default(), &registry).unwrap();
        let all = query.extract(0).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn max_results_caps_total_delivery() {
        let dir = tempfile::tempdir().unwrap();
        let (archive, index, registry) = setup(dir.path());
        let mut batch = vec![make_event(1, 1), make_event(2, 2), make_event(3, 3)];
        ingest(&archive, &index, &mut batch);

        let config = QueryConfig { max_results: Some(1) };
        let query = Query::new(archive, &index, type_predicate(), config, &registry).unwrap();
        let out = query.extract(0).unwrap();
        assert_eq!(out.len(), 1);
        assert!(query.is_done());
    }

    #[test]
    fn non_matching_query_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (archive, index, registry) = setup(dir.path());
        let mut batch = vec![make_event(1, 1)];
        ingest(&archive, &index, &mut batch);

        let other_ty = Type::new(Shape::Bool).named("other");
        let expr = Expr::predicate(Operand::EventType, RelOp::Eq, Operand::TypeExtractor(other_ty));
        let query = Query::new(archive, &index, expr, QueryConfig::default(), &registry).unwrap();
        assert!(query.extract(0).unwrap().is_empty());
        assert!(query.is_done());
    }
}
