//! The shared error taxonomy from spec.md §7, used across crate boundaries so that callers
//! (e.g. the query engine deciding whether a failure is fatal) can match on [`Kind`] without
//! caring which crate's `snafu`-derived error produced it.

/// Coarse failure category. Individual crates define their own `snafu` error enums and expose
/// a `kind()` accessor returning one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Malformed input to a parser (expression, schema).
    Parse,
    /// Type-system violation: incompatible operator/operand, congruence failure.
    Type,
    /// Requested event id, partition, or actor label is absent.
    NotFound,
    /// Duplicate registration (actor label, peer, flow edge).
    Conflict,
    /// On-disk data failed integrity or decoding checks.
    Corrupt,
    /// Filesystem error on read/write/mkdir/rm.
    Io,
    /// Remote actor unreachable, lease refresh timed out.
    Unavailable,
    /// Internal invariant broken; should be rare and always actionable.
    Logic,
}

impl Kind {
    /// Whether a failure of this kind is expected to terminate the owning actor (storage-layer
    /// I/O per spec.md §7) as opposed to just failing one request.
    pub fn is_fatal_to_owner(&self) -> bool {
        matches!(self, Kind::Io | Kind::Corrupt | Kind::Logic)
    }
}
