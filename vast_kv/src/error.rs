//! Errors for the replicated key-value store (spec.md §5).

use snafu::Snafu;
use vast_types::Kind;

/// Errors raised by [`crate::KvStore`] operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// The requested key has no entry.
    #[snafu(display("key not found: {key}"))]
    NotFound {
        /// The missing key.
        key: String,
    },

    /// A write was attempted against a node that is currently a follower.
    #[snafu(display("this node is not the leader"))]
    NotLeader,

    /// Replication did not reach the required acknowledgment count before the follower set
    /// stopped responding.
    #[snafu(display("replication reached {acked}/{required} required acknowledgments"))]
    Unavailable {
        /// Acknowledgments actually received.
        acked: usize,
        /// Acknowledgments required by the configured [`crate::AckMode`].
        required: usize,
    },

    /// `add` was applied to a value whose type doesn't support accumulation.
    #[snafu(display("key {key} does not hold an accumulable value"))]
    NotAccumulable {
        /// The offending key.
        key: String,
    },
}

impl Error {
    /// The coarse failure category (spec.md §7).
    pub fn kind(&self) -> Kind {
        match self {
            Error::NotFound { .. } => Kind::NotFound,
            Error::NotLeader => Kind::Logic,
            Error::Unavailable { .. } => Kind::Unavailable,
            Error::NotAccumulable { .. } => Kind::Type,
        }
    }
}

/// Convenience alias for key-value store results.
pub type Result<T, E = Error> = std::result::Result<T, E>;
