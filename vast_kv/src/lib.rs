//! A replicated leader/follower key-value store (spec.md §5), used to persist the identifier's
//! counter and other small pieces of cluster-wide configuration.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(missing_docs, clippy::clone_on_ref_ptr)]

pub mod error;
pub mod store;

pub use error::Error;
pub use store::{AckMode, Follower, KvStore, KvStoreConfig};
