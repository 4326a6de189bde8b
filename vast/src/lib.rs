//! Wires the identifier, archive, index, importer, and query engine into one pipeline, and
//! carries the flow-control and task substrate shared across the whole system (spec.md §2).
//!
//! A command-line front-end, network transport, and input-source parsing are explicitly out of
//! scope (spec.md §1); this crate stops at the library boundary and is exercised by its own
//! integration tests.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(missing_docs, clippy::clone_on_ref_ptr)]

pub mod error;

pub use error::Error;

use metric::Registry;
use observability_deps::tracing::debug;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;
use vast_archive::{Archive, ArchiveConfig};
use vast_flow::FlowGraph;
use vast_identifier::{Identifier, IdentifierConfig};
use vast_importer::Importer;
use vast_index::{Index, IndexConfig};
use vast_kv::{KvStore, KvStoreConfig};
use vast_query::{Query, QueryConfig};
use vast_task::Task;
use vast_time::{SystemProvider, TimeProvider};
use vast_types::expr::Expr;
use vast_types::{Event, EventId};

use error::{IoSnafu, Result};
use snafu::ResultExt;

/// The pipeline's flow-graph node for whatever upstream component hands batches to the
/// importer; the pipeline does not model it further (spec.md §1: input sources are external).
pub const SOURCE: &str = "source";
/// The flow-graph node for [`Pipeline::import`]. Registered as a deflector: an overload
/// originating downstream (at `INDEX` or `ARCHIVE`) stops here rather than reaching `SOURCE`,
/// since throttling imports is the only backpressure lever this pipeline actually has.
pub const IMPORTER: &str = "importer";
/// The flow-graph node for the index.
pub const INDEX: &str = "index";
/// The flow-graph node for the archive.
pub const ARCHIVE: &str = "archive";

/// Aggregates every collaborator's tuning knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineConfig {
    /// Id-lease tuning.
    pub identifier: IdentifierConfig,
    /// Segment store tuning.
    pub archive: ArchiveConfig,
    /// Partition lifecycle tuning.
    pub index: IndexConfig,
    /// Default tuning applied to queries started via [`Pipeline::query`].
    pub query: QueryConfig,
}

/// The assembled ingestion/query pipeline (spec.md §2's component table).
pub struct Pipeline {
    archive: Arc<Archive>,
    index: Arc<Index>,
    importer: Importer,
    flow: FlowGraph<&'static str>,
    flush_barrier: Task<&'static str>,
    query_config: QueryConfig,
    registry: Registry,
}

impl Pipeline {
    /// Open (or initialize) a pipeline rooted at `dir`, wiring a fresh single-node key-value
    /// store, identifier, archive, and index together, and registering the canonical
    /// `source -> importer -> {index, archive}` flow graph with `importer` as the sole
    /// deflector (spec.md §4.7, §5).
    pub fn open(dir: PathBuf, config: PipelineConfig) -> Result<Self> {
        std::fs::create_dir_all(&dir).context(IoSnafu { path: dir.clone() })?;

        let registry = Registry::new();
        let clock: Arc<dyn TimeProvider> = Arc::new(SystemProvider::new());
        let store = KvStore::new(KvStoreConfig::default());
        let identifier = Arc::new(Identifier::new(store, Arc::clone(&clock), config.identifier));
        let archive = Archive::new(dir.join("archive"), config.archive, &registry)?;
        let index = Index::open(dir.join("index"), config.index, clock, &registry)?;
        let importer = Importer::new(identifier, Arc::clone(&archive), Arc::clone(&index));

        let flow = FlowGraph::new();
        flow.add_edge(SOURCE, IMPORTER);
        flow.add_edge(IMPORTER, INDEX);
        flow.add_edge(IMPORTER, ARCHIVE);
        flow.register_deflector(IMPORTER)
            .expect("importer always has both an upstream and a downstream edge");

        Ok(Self {
            archive,
            index,
            importer,
            flow,
            flush_barrier: Task::new(),
            query_config: config.query,
            registry,
        })
    }

    /// Assign ids and route a batch through the archive and index (spec.md §5).
    pub fn import(&self, batch: Vec<Event>) -> Result<Range<EventId>> {
        Ok(self.importer.import(batch)?)
    }

    /// Resolve `ast` against the index and return a pullable query over the matching events
    /// (spec.md §4.6).
    pub fn query(&self, ast: Expr) -> Result<Arc<Query>> {
        Ok(Query::new(
            Arc::clone(&self.archive),
            self.index.as_ref(),
            ast,
            self.query_config,
            &self.registry,
        )?)
    }

    /// Force both the archive and the index to persist their in-flight state, reporting
    /// completion through a two-child [`Task`] barrier (spec.md §4.8).
    pub fn flush(&self) -> Result<()> {
        self.flush_barrier.register(ARCHIVE);
        self.flush_barrier.register(INDEX);

        self.archive.flush()?;
        if let Some(n) = self.flush_barrier.done(&ARCHIVE) {
            debug!(remaining = n.remaining, "archive flush acknowledged");
        }

        self.index.flush()?;
        if let Some(n) = self.flush_barrier.done(&INDEX) {
            debug!(finished = n.finished, "index flush acknowledged");
        }
        Ok(())
    }

    /// Report that `origin` is overloaded and return the flow-graph nodes that should throttle
    /// in response (spec.md §4.7). Deciding *when* a component is overloaded is an external
    /// monitoring concern this pipeline doesn't model; it only routes the signal once raised.
    pub fn report_overload(&self, origin: &'static str) -> Vec<&'static str> {
        self.flow.propagate(&origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vast_time::Time;
    use vast_types::expr::{Operand, RelOp};
    use vast_types::types::Shape;
    use vast_types::{Field, Type, Value};

    fn conn_event(ts: i64, port: i64) -> Event {
        let ty = Type::new(Shape::Record(vec![Field::new("port", Type::new(Shape::Int))])).named("conn");
        Event::pending(Time::from_timestamp_nanos(ts), ty, Value::Record(vec![Value::Int(port)]))
    }

    fn pipeline(dir: &std::path::Path) -> Pipeline {
        Pipeline::open(dir.to_path_buf(), PipelineConfig::default()).unwrap()
    }

    #[test]
    fn import_then_query_finds_matching_events() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());

        pipeline
            .import(vec![conn_event(1, 80), conn_event(2, 443), conn_event(3, 443)])
            .unwrap();

        let ty = Type::new(Shape::Record(vec![Field::new("port", Type::new(Shape::Int))])).named("conn");
        let ast = Expr::predicate(Operand::EventType, RelOp::Eq, Operand::TypeExtractor(ty));
        let query = pipeline.query(ast).unwrap();
        let hits = query.extract(0).unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn empty_expression_yields_no_hits_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        pipeline.import(vec![conn_event(1, 80)]).unwrap();

        let query = pipeline.query(Expr::Nil).unwrap();
        assert!(query.extract(0).unwrap().is_empty());
        assert!(query.is_done());
    }

    #[test]
    fn overload_at_index_stops_at_the_importer_deflector() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        assert_eq!(pipeline.report_overload(INDEX), vec![IMPORTER]);
        assert_eq!(pipeline.report_overload(ARCHIVE), vec![IMPORTER]);
    }

    #[test]
    fn flush_acknowledges_both_barrier_children() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        pipeline.import(vec![conn_event(1, 80)]).unwrap();
        pipeline.flush().unwrap();
        assert!(pipeline.flush_barrier.is_done());
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        let range = pipeline.import(Vec::new()).unwrap();
        assert_eq!(range.start, EventId::INVALID);
    }
}
