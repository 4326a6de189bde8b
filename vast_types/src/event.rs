//! Events, spec.md §3.1.

use crate::{types::Type, value::Value};
use vast_time::Time;

/// A 64-bit event identifier. `0` is reserved as invalid; the useful range is `[1, 2^64-2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(u64);

impl EventId {
    /// The sentinel "invalid" id.
    pub const INVALID: EventId = EventId(0);

    /// The largest representable id.
    pub const MAX: EventId = EventId(u64::MAX - 1);

    /// Wrap a raw id. Does not validate; use [`EventId::valid`] for pending events that may
    /// still carry `0`.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric value.
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Whether this id is in the valid `[1, 2^64-2]` range.
    pub fn valid(&self) -> bool {
        self.0 != 0 && self.0 != u64::MAX
    }

    /// `self + n`, saturating at [`EventId::MAX`].
    pub fn saturating_add(&self, n: u64) -> EventId {
        EventId(self.0.saturating_add(n).min(u64::MAX - 1))
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An immutable `(id, timestamp, type, data)` tuple (spec.md §3.1).
///
/// An event without an id (`id == EventId::INVALID`) is *pending* and only exists between a
/// source and the importer; once assigned an id an event is never mutated again.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    id: EventId,
    timestamp: Time,
    ty: Type,
    data: Value,
}

impl Event {
    /// Construct a pending event (no id assigned yet).
    pub fn pending(timestamp: Time, ty: Type, data: Value) -> Self {
        Self {
            id: EventId::INVALID,
            timestamp,
            ty,
            data,
        }
    }

    /// Construct an event that already has an id (e.g. when decoding from a chunk).
    pub fn with_id(id: EventId, timestamp: Time, ty: Type, data: Value) -> Self {
        Self {
            id,
            timestamp,
            ty,
            data,
        }
    }

    /// The event's id.
    pub fn id(&self) -> EventId {
        self.id
    }

    /// Whether this event has not yet been assigned an id.
    pub fn is_pending(&self) -> bool {
        self.id == EventId::INVALID
    }

    /// Assign an id to a pending event. This is the only mutation an event ever undergoes,
    /// performed exactly once by the importer (spec.md §3.1).
    pub fn assign_id(&mut self, id: EventId) {
        debug_assert!(self.is_pending(), "events are immutable once assigned an id");
        self.id = id;
    }

    /// The event's timestamp.
    pub fn timestamp(&self) -> Time {
        self.timestamp
    }

    /// The event's type.
    pub fn ty(&self) -> &Type {
        &self.ty
    }

    /// The event's data.
    pub fn data(&self) -> &Value {
        &self.data
    }
}
