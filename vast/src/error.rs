//! Pipeline-level errors: a thin union over the collaborators [`crate::Pipeline`] drives.

use snafu::Snafu;
use vast_types::Kind;

/// Errors raised by [`crate::Pipeline`] operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// A collaborator's on-disk directory could not be created.
    #[snafu(display("i/o error on {path}: {source}"))]
    Io {
        /// The directory involved.
        path: std::path::PathBuf,
        /// The underlying OS error.
        source: std::io::Error,
    },

    /// Opening or flushing the archive failed.
    #[snafu(display("archive error: {source}"))]
    Archive {
        /// The underlying archive error.
        source: vast_archive::Error,
    },

    /// Opening or flushing the index failed.
    #[snafu(display("index error: {source}"))]
    Index {
        /// The underlying index error.
        source: vast_index::Error,
    },

    /// Importing a batch failed.
    #[snafu(display("import error: {source}"))]
    Importer {
        /// The underlying importer error.
        source: vast_importer::Error,
    },

    /// Running a query failed.
    #[snafu(display("query error: {source}"))]
    Query {
        /// The underlying query error.
        source: vast_query::Error,
    },
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

impl From<vast_importer::Error> for Error {
    fn from(source: vast_importer::Error) -> Self {
        Error::Importer { source }
    }
}

impl From<vast_query::Error> for Error {
    fn from(source: vast_query::Error) -> Self {
        Error::Query { source }
    }
}

impl Error {
    /// The coarse failure category (spec.md §7).
    pub fn kind(&self) -> Kind {
        match self {
            Error::Io { .. } => Kind::Io,
            Error::Archive { source } => source.kind(),
            Error::Index { source } => source.kind(),
            Error::Importer { source } => source.kind(),
            Error::Query { source } => source.kind(),
        }
    }
}

/// Convenience alias for pipeline results.
pub type Result<T, E = Error> = std::result::Result<T, E>;
