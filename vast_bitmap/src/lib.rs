//! Compressed bitmap storage and the field coders partitions build on top of it (spec.md §4.4).
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(missing_docs, clippy::clone_on_ref_ptr)]

pub mod bitmap;
pub mod coder;
pub mod ewah;
pub mod eval;
pub mod range_map;

pub use bitmap::{Bitmap, Encoding};
pub use coder::{BitsliceCoder, EqualityCoder, SingletonCoder};
pub use eval::evaluate;
pub use range_map::RangeMap;
