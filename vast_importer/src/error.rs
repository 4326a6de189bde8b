//! Importer errors: a thin union over the three collaborators it calls synchronously.

use snafu::Snafu;
use vast_types::Kind;

/// Errors raised by [`crate::Importer::import`].
#[derive(Debug, Snafu)]
pub enum Error {
    /// Reserving an id range failed.
    #[snafu(display("identifier error: {source}"))]
    Identifier {
        /// The underlying identifier error.
        source: vast_identifier::Error,
    },

    /// Writing the batch to the archive failed.
    #[snafu(display("archive error: {source}"))]
    Archive {
        /// The underlying archive error.
        source: vast_archive::Error,
    },

    /// Writing the batch to the index failed.
    #[snafu(display("index error: {source}"))]
    Index {
        /// The underlying index error.
        source: vast_index::Error,
    },
}

impl From<vast_identifier::Error> for Error {
    fn from(source: vast_identifier::Error) -> Self {
        Error::Identifier { source }
    }
}

impl From<vast_archive::Error> for Error {
    fn from(source: vast_archive::Error) -> Self {
        Error::Archive { source }
    }
}

impl From<vast_index::Error> for Error {
    fn from(source: vast_index::Error) -> Self {
        Error::Index { source }
    }
}

impl Error {
    /// The coarse failure category (spec.md §7).
    pub fn kind(&self) -> Kind {
        match self {
            Error::Identifier { source } => source.kind(),
            Error::Archive { source } => source.kind(),
            Error::Index { source } => source.kind(),
        }
    }
}

/// Convenience alias for importer results.
pub type Result<T, E = Error> = std::result::Result<T, E>;
