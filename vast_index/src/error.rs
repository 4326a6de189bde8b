//! Index errors.

use snafu::Snafu;
use std::path::PathBuf;
use vast_types::Kind;

/// Errors raised by [`crate::Index`] operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// A meta file could not be read or written.
    #[snafu(display("i/o error on {path}: {source}"))]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying OS error.
        source: std::io::Error,
    },

    /// The meta file's bytes don't decode to well-formed state.
    #[snafu(display("index meta file {path} is corrupt: {detail}"))]
    Corrupt {
        /// The file that failed to decode.
        path: PathBuf,
        /// What failed to decode.
        detail: String,
    },

    /// A partition operation failed.
    #[snafu(display("partition error: {source}"))]
    Partition {
        /// The underlying partition error.
        source: vast_partition::Error,
    },
}

impl From<vast_partition::Error> for Error {
    fn from(source: vast_partition::Error) -> Self {
        Error::Partition { source }
    }
}

impl Error {
    /// The coarse failure category (spec.md §7).
    pub fn kind(&self) -> Kind {
        match self {
            Error::Io { .. } => Kind::Io,
            Error::Corrupt { .. } => Kind::Corrupt,
            Error::Partition { source } => source.kind(),
        }
    }
}

/// Convenience alias for index results.
pub type Result<T, E = Error> = std::result::Result<T, E>;
