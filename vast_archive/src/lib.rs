//! Durable, ID-addressable storage of historical events (spec.md §4.3), grounded on
//! `archive.cc`'s segment-store behavior: events accumulate into an in-flight segment
//! (`current`), which is flushed to disk as a fresh, randomly-named segment file once it would
//! exceed `max_segment_size`; an `id_map` range-map remembers which segment holds which id
//! range, and an LRU keeps the hottest segments resident.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(missing_docs, clippy::clone_on_ref_ptr)]

pub mod error;
mod lru;
mod meta;
pub mod segment;

pub use error::Error;
pub use segment::CompressionMethod;

use lru::LruCache;
use metric::{Registry, U64Counter};
use observability_deps::tracing::{debug, warn};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;
use vast_bitmap::RangeMap;
use vast_chunk::Writer;
use vast_types::{Event, EventId};

use error::Result;
use segment::Segment;

/// Archive configuration (spec.md §4.3: "`max_segment_size`, `compression_method`").
#[derive(Debug, Clone, Copy)]
pub struct ArchiveConfig {
    /// A segment is flushed once its accumulated chunk bytes would reach this size.
    pub max_segment_size: u64,
    /// Number of segments the LRU keeps resident at once.
    pub cache_capacity: usize,
    /// Compression applied to each chunk's record body when it is persisted.
    pub compression: CompressionMethod,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_segment_size: 64 * 1024 * 1024,
            cache_capacity: 16,
            compression: CompressionMethod::Zstd,
        }
    }
}

struct ArchiveMetrics {
    events_written: U64Counter,
    bytes_written: U64Counter,
    cache_hits: U64Counter,
    cache_misses: U64Counter,
}

impl ArchiveMetrics {
    fn new(registry: &Registry) -> Self {
        Self {
            events_written: registry
                .register_metric::<U64Counter>("archive_events_written", "events persisted")
                .recorder(&[]),
            bytes_written: registry
                .register_metric::<U64Counter>("archive_bytes_written", "compressed bytes flushed")
                .recorder(&[]),
            cache_hits: registry
                .register_metric::<U64Counter>("archive_segment_cache_hits", "segment cache hits")
                .recorder(&[]),
            cache_misses: registry
                .register_metric::<U64Counter>(
                    "archive_segment_cache_misses",
                    "segment cache misses",
                )
                .recorder(&[]),
        }
    }
}

struct State {
    current: Segment,
    current_size: u64,
    id_map: RangeMap<EventId, Uuid>,
}

/// The segment store: accepts batches of events, compresses them into chunks, and answers
/// by-id lookups across both the in-flight segment and flushed, disk-resident ones.
pub struct Archive {
    dir: PathBuf,
    meta_path: PathBuf,
    config: ArchiveConfig,
    state: Mutex<State>,
    cache: Mutex<LruCache<Arc<Segment>>>,
    metrics: ArchiveMetrics,
}

impl Archive {
    /// Open (or initialize) an archive rooted at `dir`, recovering `id_map` from `meta.data` if
    /// it already exists (spec.md §4.3, grounded on `archive::make_behavior`'s
    /// `load(meta_data_filename_, segments_)`).
    pub fn new(dir: PathBuf, config: ArchiveConfig, registry: &Registry) -> Result<Arc<Self>> {
        let meta_path = dir.join("meta.data");
        let id_map = if meta_path.exists() {
            meta::read_meta(&meta_path)?
        } else {
            RangeMap::new()
        };
        Ok(Arc::new(Self {
            dir,
            meta_path,
            config,
            state: Mutex::new(State {
                current: Vec::new(),
                current_size: 0,
                id_map,
            }),
            cache: Mutex::new(LruCache::new(config.cache_capacity, |uuid, _segment| {
                debug!(%uuid, "evicted segment from archive cache");
            })),
            metrics: ArchiveMetrics::new(registry),
        }))
    }

    /// Compress `events` into one chunk and append it to the in-flight segment, flushing first
    /// if the chunk would push the segment past `max_segment_size` (spec.md §4.3 write path).
    pub fn ingest(&self, events: &[Event]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        debug!(
            count = events.len(),
            first = %events[0].id(),
            last = %events[events.len() - 1].id(),
            "archiving batch"
        );
        let mut writer = Writer::new();
        for event in events {
            writer.write(event).map_err(|source| Error::Chunk { source })?;
        }
        let chunk = writer.flush();
        let chunk_bytes = chunk.bytes();

        let mut state = self.state.lock();
        let too_large = state.current_size + chunk_bytes >= self.config.max_segment_size;
        if !state.current.is_empty() && too_large {
            self.flush_locked(&mut state)?;
        }
        state.current_size += chunk_bytes;
        state.current.push(chunk);
        self.metrics.events_written.inc(events.len() as u64);
        Ok(())
    }

    /// Force a flush of the in-flight segment, even if it hasn't reached `max_segment_size`.
    pub fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.flush_locked(&mut state)
    }

    fn flush_locked(&self, state: &mut State) -> Result<()> {
        if state.current.is_empty() {
            return Ok(());
        }
        debug!(chunks = state.current.len(), "flushing segment");
        let uuid = Uuid::new_v4();
        let path = self.segment_path(uuid);
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir).map_err(|source| Error::Io {
                path: self.dir.clone(),
                source,
            })?;
        }
        segment::write_segment(&path, &state.current, self.config.compression)?;

        let mut flushed_bytes = 0u64;
        for chunk in &state.current {
            let ones: Vec<usize> = chunk.meta().ids.iter_ones().collect();
            if let (Some(&first), Some(&last)) = (ones.first(), ones.last()) {
                state
                    .id_map
                    .insert(EventId::new(first as u64)..EventId::new(last as u64 + 1), uuid);
            }
            flushed_bytes += chunk.bytes();
        }
        self.metrics.bytes_written.inc(flushed_bytes);

        let segment = std::mem::take(&mut state.current);
        state.current_size = 0;
        self.cache.lock().insert(uuid, Arc::new(segment));

        meta::write_meta(&self.meta_path, &state.id_map)?;
        Ok(())
    }

    /// Find the chunk containing `id`, scanning the in-flight segment first and then the
    /// `id_map`-addressed, possibly-cached segment on disk (spec.md §4.3 read path). Returns
    /// `None` if `id` has never been archived.
    pub fn lookup(&self, id: EventId) -> Result<Option<vast_chunk::Chunk>> {
        {
            let state = self.state.lock();
            for chunk in &state.current {
                if chunk.meta().ids.get(id.get() as usize) {
                    return Ok(Some(chunk.clone()));
                }
            }
        }

        let uuid = {
            let state = self.state.lock();
            match state.id_map.get(id) {
                Some(uuid) => *uuid,
                None => {
                    warn!(%id, "no segment covers this id");
                    return Ok(None);
                }
            }
        };

        let segment = {
            let mut cache = self.cache.lock();
            if let Some(segment) = cache.get(&uuid) {
                self.metrics.cache_hits.inc(1);
                Arc::clone(segment)
            } else {
                self.metrics.cache_misses.inc(1);
                debug!(%uuid, "segment cache miss");
                let path = self.segment_path(uuid);
                let loaded = Arc::new(segment::read_segment(&path)?);
                cache.insert(uuid, Arc::clone(&loaded));
                loaded
            }
        };

        for chunk in segment.iter() {
            if chunk.meta().ids.get(id.get() as usize) {
                return Ok(Some(chunk.clone()));
            }
        }
        warn!(%id, %uuid, "segment did not contain looked-up id");
        Ok(None)
    }

    fn segment_path(&self, uuid: Uuid) -> PathBuf {
        self.dir.join(uuid.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vast_time::Time;
    use vast_types::{types::Shape, Field, Type, Value};

    fn make_event(id: u64) -> Event {
        let ty = Type::new(Shape::Record(vec![Field::new("x", Type::new(Shape::Int))])).named("t");
        Event::with_id(
            EventId::new(id),
            Time::from_timestamp_nanos(id as i64),
            ty,
            Value::Record(vec![Value::Int(id as i64)]),
        )
    }

    #[test]
    fn ingest_and_lookup_from_in_flight_segment() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::new();
        let archive = Archive::new(dir.path().to_path_buf(), ArchiveConfig::default(), &registry).unwrap();
        archive.ingest(&[make_event(1), make_event(2)]).unwrap();

        let chunk = archive.lookup(EventId::new(2)).unwrap().unwrap();
        assert!(chunk.meta().ids.get(2));
    }

    #[test]
    fn flush_makes_events_findable_after_restart_of_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::new();
        let archive = Archive::new(dir.path().to_path_buf(), ArchiveConfig::default(), &registry).unwrap();
        archive.ingest(&[make_event(1)]).unwrap();
        archive.flush().unwrap();

        // A brand new archive handle over the same directory should recover the id_map and be
        // able to serve the id from disk.
        let reopened = Archive::new(dir.path().to_path_buf(), ArchiveConfig::default(), &registry).unwrap();
        let chunk = reopened.lookup(EventId::new(1)).unwrap().unwrap();
        assert_eq!(chunk.events(), 1);
    }

    #[test]
    fn unknown_id_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::new();
        let archive = Archive::new(dir.path().to_path_buf(), ArchiveConfig::default(), &registry).unwrap();
        archive.ingest(&[make_event(1)]).unwrap();
        assert!(archive.lookup(EventId::new(99)).unwrap().is_none());
    }

    #[test]
    fn large_batches_trigger_automatic_flush() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::new();
        let config = ArchiveConfig {
            max_segment_size: 1, // any non-empty chunk exceeds this
            ..ArchiveConfig::default()
        };
        let archive = Archive::new(dir.path().to_path_buf(), config, &registry).unwrap();
        archive.ingest(&[make_event(1)]).unwrap();
        archive.ingest(&[make_event(2)]).unwrap();

        // The first chunk must have been flushed to disk to make room for the second.
        let segment_files = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name() != "meta.data")
            .count();
        assert_eq!(segment_files, 1);
    }
}
