//! Chunk codec errors (spec.md §4.2: "`corrupt` on header mismatch; `schema_missing` if a
//! referenced type-id is absent from the chunk's schema table").

use snafu::Snafu;
use vast_types::Kind;

/// Errors raised while writing or reading a chunk.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// The body bytes don't decode to a well-formed record stream.
    #[snafu(display("chunk is corrupt: {detail}"))]
    Corrupt {
        /// What failed to decode.
        detail: String,
    },

    /// A record referenced a type-id with no corresponding schema table entry.
    #[snafu(display("schema table has no entry for type-id {type_id}"))]
    SchemaMissing {
        /// The out-of-range type-id.
        type_id: u32,
    },

    /// `read(id)` was asked for an id the chunk's `ids` mask does not contain.
    #[snafu(display("event {id} not found in chunk"))]
    NotFound {
        /// The id that was looked up.
        id: u64,
    },

    /// A writer was given events out of the required id order.
    #[snafu(display("event ids must be all-pending or strictly increasing, got {id} after {previous}"))]
    OutOfOrder {
        /// The id that violated ordering.
        id: u64,
        /// The previously written id.
        previous: u64,
    },
}

impl Error {
    /// The coarse failure category, for callers that need to decide whether a chunk failure is
    /// fatal to its owning archive (spec.md §7).
    pub fn kind(&self) -> Kind {
        match self {
            Error::Corrupt { .. } | Error::SchemaMissing { .. } => Kind::Corrupt,
            Error::NotFound { .. } => Kind::NotFound,
            Error::OutOfOrder { .. } => Kind::Logic,
        }
    }
}

/// Convenience alias for chunk codec results.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Validate that `type_id` indexes into `schema`, used when skipping a record without
/// materializing its value.
pub fn ensure_schema_present<T>(schema: &[T], type_id: usize) -> Result<()> {
    if type_id < schema.len() {
        Ok(())
    } else {
        SchemaMissingSnafu {
            type_id: type_id as u32,
        }
        .fail()
    }
}
