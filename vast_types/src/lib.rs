//! The data model shared across every actor in the event store: the closed type system, tagged
//! values, events, the query expression language, and the coarse error taxonomy used to
//! classify failures across crate boundaries.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(missing_docs, clippy::clone_on_ref_ptr)]

pub mod error;
pub mod event;
pub mod expr;
pub mod types;
pub mod value;

pub use error::Kind;
pub use event::{Event, EventId};
pub use expr::{Expr, Operand, Predicate, RelOp};
pub use types::{Attribute, Field, Fingerprint, Shape, Type};
pub use value::{PortProto, Subnet, Value};
