//! A crate containing dependencies and utilities for configuring tracing-based observability.
//!
//! This crate exists to keep a single, pinned version of `tracing` and friends used across the
//! entire event-store workspace, the same way the teacher workspace's own
//! `observability_deps` crate does.

/// Re-export the `tracing` crate so call-sites only ever need to depend on
/// `observability_deps`, not on `tracing` directly.
pub use tracing;
