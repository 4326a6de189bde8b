//! Archive errors (spec.md §4.3: "Any I/O error during flush is fatal to the archive actor...
//! unreadable segment files yield `decode_error`").

use snafu::Snafu;
use std::path::PathBuf;
use vast_types::Kind;

/// Errors raised by [`crate::Archive`] operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// A segment or metadata file could not be read or written.
    #[snafu(display("i/o error on {path}: {source}"))]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying OS error.
        source: std::io::Error,
    },

    /// A segment file's bytes don't decode to a well-formed segment.
    #[snafu(display("segment {path} is corrupt: {detail}"))]
    Corrupt {
        /// The file that failed to decode.
        path: PathBuf,
        /// What failed to decode.
        detail: String,
    },

    /// A chunk codec failure while materializing a stored chunk.
    #[snafu(display("chunk codec error: {source}"))]
    Chunk {
        /// The underlying chunk error.
        source: vast_chunk::Error,
    },

    /// The configured compressor failed to encode or decode a chunk body.
    #[snafu(display("compression error: {detail}"))]
    Compression {
        /// What the compressor reported.
        detail: String,
    },
}

impl Error {
    /// The coarse failure category (spec.md §7): archive I/O and corruption are both fatal to
    /// the owning actor.
    pub fn kind(&self) -> Kind {
        match self {
            Error::Io { .. } => Kind::Io,
            Error::Corrupt { .. } => Kind::Corrupt,
            Error::Chunk { source } => source.kind(),
            Error::Compression { .. } => Kind::Corrupt,
        }
    }
}

/// Convenience alias for archive results.
pub type Result<T, E = Error> = std::result::Result<T, E>;
