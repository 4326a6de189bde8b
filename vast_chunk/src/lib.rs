//! Chunk encoding: the immutable, compressed unit of storage an archive segment is built from
//! (spec.md §3.3, §4.2).
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(missing_docs, clippy::clone_on_ref_ptr)]

pub mod chunk;
pub mod error;
pub mod type_codec;
pub mod value_codec;
pub mod varint;

pub use chunk::{Chunk, ChunkMeta, Reader, Writer};
pub use error::Error;
