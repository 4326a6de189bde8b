//! Query errors.

use snafu::Snafu;
use vast_types::Kind;

/// Errors raised while resolving hits or pulling events for a query.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Resolving the initial hit set against the index failed.
    #[snafu(display("index error: {source}"))]
    Index {
        /// The underlying index error.
        source: vast_index::Error,
    },

    /// Looking up a hit's chunk in the archive failed.
    #[snafu(display("archive error: {source}"))]
    Archive {
        /// The underlying archive error.
        source: vast_archive::Error,
    },

    /// A chunk claimed (via its membership mask) to contain an id that its reader could not
    /// actually materialize.
    #[snafu(display("chunk error while extracting event {id}: {source}"))]
    Chunk {
        /// The id that failed to extract.
        id: u64,
        /// The underlying chunk error.
        source: vast_chunk::Error,
    },
}

impl From<vast_index::Error> for Error {
    fn from(source: vast_index::Error) -> Self {
        Error::Index { source }
    }
}

impl From<vast_archive::Error> for Error {
    fn from(source: vast_archive::Error) -> Self {
        Error::Archive { source }
    }
}

impl Error {
    /// The coarse failure category (spec.md §7).
    pub fn kind(&self) -> Kind {
        match self {
            Error::Index { source } => source.kind(),
            Error::Archive { source } => source.kind(),
            Error::Chunk { .. } => Kind::Corrupt,
        }
    }
}

/// Convenience alias for query results.
pub type Result<T, E = Error> = std::result::Result<T, E>;
