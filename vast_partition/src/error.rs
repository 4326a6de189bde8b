//! Partition errors.

use snafu::Snafu;
use std::path::PathBuf;
use vast_types::Kind;

/// Errors raised by [`crate::Partition`] operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// A partition file could not be read or written.
    #[snafu(display("i/o error on {path}: {source}"))]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying OS error.
        source: std::io::Error,
    },

    /// A partition file's bytes don't decode to well-formed state.
    #[snafu(display("partition file {path} is corrupt: {detail}"))]
    Corrupt {
        /// The file that failed to decode.
        path: PathBuf,
        /// What failed to decode.
        detail: String,
    },

    /// A chunk-codec failure while encoding or decoding a schema table or value.
    #[snafu(display("codec error: {source}"))]
    Chunk {
        /// The underlying chunk error.
        source: vast_chunk::Error,
    },
}

impl Error {
    /// The coarse failure category (spec.md §7).
    pub fn kind(&self) -> Kind {
        match self {
            Error::Io { .. } => Kind::Io,
            Error::Corrupt { .. } => Kind::Corrupt,
            Error::Chunk { source } => source.kind(),
        }
    }
}

/// Convenience alias for partition results.
pub type Result<T, E = Error> = std::result::Result<T, E>;
