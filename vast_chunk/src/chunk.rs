//! The chunk itself: an immutable, compressed batch of events (spec.md §3.3) plus its
//! single-use [`Writer`] and [`Reader`].

use crate::error::{self, Error, NotFoundSnafu, OutOfOrderSnafu, Result};
use crate::value_codec::{decode_value, encode_value};
use crate::varint::{read_i64, read_u64, write_i64, write_u64};
use std::collections::HashMap;
use vast_bitmap::Bitmap;
use vast_time::Time;
use vast_types::{Event, EventId, Fingerprint, Type};

/// Chunk-level metadata, kept separate from the compressed body so queries can prune a chunk
/// without decompressing it (spec.md §3.3).
#[derive(Debug, Clone)]
pub struct ChunkMeta {
    /// Minimum timestamp among the chunk's events.
    pub first: Time,
    /// Maximum timestamp among the chunk's events.
    pub last: Time,
    /// Membership mask: bit `i` set means event id `i` is present in this chunk. Empty when the
    /// chunk holds only pending (unassigned-id) events.
    pub ids: Bitmap,
    /// Every distinct type appearing in the chunk, indexed by the type-id written into records.
    pub schema: Vec<Type>,
}

/// An immutable, compressed sequence of events produced contiguously in id space.
#[derive(Debug, Clone)]
pub struct Chunk {
    meta: ChunkMeta,
    body: Vec<u8>,
    event_count: u64,
}

impl Chunk {
    /// The chunk's metadata.
    pub fn meta(&self) -> &ChunkMeta {
        &self.meta
    }

    /// Size of the encoded body in bytes.
    pub fn bytes(&self) -> u64 {
        self.body.len() as u64
    }

    /// Number of events in the chunk.
    pub fn events(&self) -> u64 {
        self.event_count
    }

    /// The id of the first event, or [`EventId::INVALID`] if the chunk only holds pending
    /// events.
    pub fn base(&self) -> EventId {
        self.meta
            .ids
            .iter_ones()
            .next()
            .map(|i| EventId::new(i as u64))
            .unwrap_or(EventId::INVALID)
    }

    /// The encoded record body, for segment-level (de)serialization. Opaque to everything but
    /// [`Reader`] and the segment codec that persists chunks to disk.
    pub fn raw_body(&self) -> &[u8] {
        &self.body
    }

    /// Reconstruct a chunk from its parts, as done when a segment is loaded from disk.
    pub fn from_parts(meta: ChunkMeta, body: Vec<u8>, event_count: u64) -> Chunk {
        Chunk {
            meta,
            body,
            event_count,
        }
    }

    /// Start a sequential or seeking reader over this chunk.
    pub fn reader(&self) -> Reader<'_> {
        Reader {
            chunk: self,
            pos: 0,
            next_id_index: 0,
            emitted: 0,
        }
    }
}

/// Writes events into a chunk in insertion order. Single-use: call [`Writer::flush`] exactly
/// once to obtain the finished [`Chunk`] (spec.md §4.2).
pub struct Writer {
    first: Option<Time>,
    last: Option<Time>,
    ids: Bitmap,
    schema: Vec<Type>,
    type_cache: HashMap<Fingerprint, u32>,
    body: Vec<u8>,
    last_written_id: Option<EventId>,
    pending: bool,
    event_count: u64,
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

impl Writer {
    /// A writer with no events yet.
    pub fn new() -> Self {
        Self {
            first: None,
            last: None,
            ids: Bitmap::new(),
            schema: Vec::new(),
            type_cache: HashMap::new(),
            body: Vec::new(),
            last_written_id: None,
            pending: false,
            event_count: 0,
        }
    }

    /// Write one event into the chunk.
    ///
    /// The events in a chunk must either all have [`EventId::INVALID`] ("pending") or strictly
    /// increasing ids (spec.md §3.3); mixing the two, or writing ids out of order, fails with
    /// [`Error::OutOfOrder`].
    pub fn write(&mut self, event: &Event) -> Result<()> {
        let is_pending = event.id() == EventId::INVALID;
        if self.event_count == 0 {
            self.pending = is_pending;
        } else if is_pending != self.pending {
            return OutOfOrderSnafu {
                id: event.id().get(),
                previous: self.last_written_id.map(|i| i.get()).unwrap_or(0),
            }
            .fail();
        }
        if !is_pending {
            if let Some(prev) = self.last_written_id {
                if event.id().get() <= prev.get() {
                    return OutOfOrderSnafu {
                        id: event.id().get(),
                        previous: prev.get(),
                    }
                    .fail();
                }
            }
            let gap = event.id().get() as usize - self.ids.len();
            self.ids.append(gap, false);
            self.ids.push(true);
            self.last_written_id = Some(event.id());
        }

        let ty = event.ty();
        let fp = ty.fingerprint();
        let type_id = *self.type_cache.entry(fp).or_insert_with(|| {
            self.schema.push(ty.clone());
            (self.schema.len() - 1) as u32
        });
        write_u64(&mut self.body, type_id as u64);
        write_i64(&mut self.body, event.timestamp().timestamp_nanos());
        encode_value(event.data(), &mut self.body);

        self.first = Some(self.first.map_or(event.timestamp(), |f| f.min(event.timestamp())));
        self.last = Some(self.last.map_or(event.timestamp(), |l| l.max(event.timestamp())));
        self.event_count += 1;
        Ok(())
    }

    /// Finalize the writer into an immutable [`Chunk`].
    pub fn flush(self) -> Chunk {
        Chunk {
            meta: ChunkMeta {
                first: self.first.unwrap_or(Time::MAX),
                last: self.last.unwrap_or(Time::MIN),
                ids: self.ids,
                schema: self.schema,
            },
            body: self.body,
            event_count: self.event_count,
        }
    }
}

/// Extracts events from a chunk, either sequentially or by seeking to a specific id
/// (spec.md §4.2).
pub struct Reader<'a> {
    chunk: &'a Chunk,
    pos: usize,
    next_id_index: usize,
    emitted: u64,
}

impl<'a> Reader<'a> {
    /// Yield the next event in chunk order, or `None` once every event has been read.
    pub fn read(&mut self) -> Result<Option<Event>> {
        if self.emitted >= self.chunk.event_count {
            return Ok(None);
        }
        let id = self.next_id();
        self.materialize(id)
    }

    /// Advance past events until the one with `id` is reached, returning it.
    ///
    /// Fails with [`Error::NotFound`] if `id` is not present in the chunk's membership mask.
    pub fn seek(&mut self, id: EventId) -> Result<Event> {
        if !self.chunk.meta.ids.get(id.get() as usize) {
            return NotFoundSnafu { id: id.get() }.fail();
        }
        loop {
            let next = self.next_id();
            if next == id {
                return match self.materialize(next)? {
                    Some(event) => Ok(event),
                    None => NotFoundSnafu { id: id.get() }.fail(),
                };
            }
            // Discard: skip the record body without building an `Event`.
            self.skip_one()?;
        }
    }

    fn next_id(&mut self) -> EventId {
        if self.chunk.meta.ids.is_empty() {
            return EventId::INVALID;
        }
        while !self.chunk.meta.ids.get(self.next_id_index) {
            self.next_id_index += 1;
        }
        let id = EventId::new(self.next_id_index as u64);
        self.next_id_index += 1;
        id
    }

    fn materialize(&mut self, id: EventId) -> Result<Option<Event>> {
        if self.pos >= self.chunk.body.len() {
            return Ok(None);
        }
        let type_id = read_u64(&self.chunk.body, &mut self.pos)? as usize;
        let ty = self
            .chunk
            .meta
            .schema
            .get(type_id)
            .cloned()
            .ok_or(Error::SchemaMissing { type_id: type_id as u32 })?;
        let nanos = read_i64(&self.chunk.body, &mut self.pos)?;
        let data = decode_value(&self.chunk.body, &mut self.pos)?;
        self.emitted += 1;
        Ok(Some(Event::with_id(id, Time::from_timestamp_nanos(nanos), ty, data)))
    }

    fn skip_one(&mut self) -> Result<()> {
        let type_id = read_u64(&self.chunk.body, &mut self.pos)? as usize;
        error::ensure_schema_present(&self.chunk.meta.schema, type_id)?;
        let _nanos = read_i64(&self.chunk.body, &mut self.pos)?;
        let _data = decode_value(&self.chunk.body, &mut self.pos)?;
        self.emitted += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vast_types::{types::Shape, Value};

    fn make_event(id: u64, ts: i64, payload: i64) -> Event {
        let ty = Type::new(Shape::Record(vec![vast_types::Field::new(
            "x",
            Type::new(Shape::Int),
        )]))
        .named("t");
        let ev = Event::with_id(
            EventId::new(id),
            Time::from_timestamp_nanos(ts),
            ty,
            Value::Record(vec![Value::Int(payload)]),
        );
        ev
    }

    #[test]
    fn sequential_read_roundtrips() {
        let mut w = Writer::new();
        w.write(&make_event(1, 100, 10)).unwrap();
        w.write(&make_event(2, 200, 20)).unwrap();
        w.write(&make_event(3, 300, 30)).unwrap();
        let chunk = w.flush();
        assert_eq!(chunk.events(), 3);
        assert_eq!(chunk.base(), EventId::new(1));

        let mut r = chunk.reader();
        let e1 = r.read().unwrap().unwrap();
        assert_eq!(e1.id(), EventId::new(1));
        assert_eq!(e1.data(), &Value::Record(vec![Value::Int(10)]));
        let e2 = r.read().unwrap().unwrap();
        assert_eq!(e2.id(), EventId::new(2));
        let e3 = r.read().unwrap().unwrap();
        assert_eq!(e3.id(), EventId::new(3));
        assert!(r.read().unwrap().is_none());
    }

    #[test]
    fn seek_finds_target_and_skips_prior() {
        let mut w = Writer::new();
        w.write(&make_event(5, 100, 1)).unwrap();
        w.write(&make_event(6, 200, 2)).unwrap();
        w.write(&make_event(9, 300, 3)).unwrap();
        let chunk = w.flush();

        let mut r = chunk.reader();
        let found = r.seek(EventId::new(9)).unwrap();
        assert_eq!(found.data(), &Value::Record(vec![Value::Int(3)]));
    }

    #[test]
    fn seek_missing_id_fails() {
        let mut w = Writer::new();
        w.write(&make_event(5, 100, 1)).unwrap();
        let chunk = w.flush();
        let mut r = chunk.reader();
        assert!(r.seek(EventId::new(7)).is_err());
    }

    #[test]
    fn mixing_pending_and_assigned_ids_fails() {
        let mut w = Writer::new();
        w.write(&make_event(0, 100, 1)).unwrap();
        assert!(w.write(&make_event(1, 200, 2)).is_err());
    }

    #[test]
    fn out_of_order_ids_fail() {
        let mut w = Writer::new();
        w.write(&make_event(5, 100, 1)).unwrap();
        assert!(w.write(&make_event(3, 200, 2)).is_err());
    }
}
