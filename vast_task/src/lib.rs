//! A completion barrier over a dynamically registered set of children, with progress reporting
//! and composable parent/child tasks (spec.md §4.8), grounded on `task.h`'s `done`/`register`/
//! `subscribe`/`supervise` protocol.
//!
//! The original is an actor that reacts to a child's `done` message or its termination signal.
//! Without an actor runtime, a [`Task`] is instead a plain, lock-guarded barrier: callers report
//! completion explicitly, and [`Task::done`] returns the observers that should be notified so the
//! caller's own messaging layer can deliver them.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(missing_docs, clippy::clone_on_ref_ptr)]

use observability_deps::tracing::{error, trace};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::hash::Hash;

/// The result of reporting a child complete: what the caller should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    /// Remaining (incomplete) child count, for progress reporting.
    pub remaining: u64,
    /// Total children ever registered.
    pub total: u64,
    /// Set once every registered child has completed: the caller should notify every
    /// supervisor of task completion.
    pub finished: bool,
}

/// A completion barrier: tracks a set of children by id, reporting progress as each completes
/// and firing once none remain (spec.md §4.8).
pub struct Task<Id: Eq + Hash + Clone> {
    state: Mutex<State<Id>>,
}

struct State<Id: Eq + Hash + Clone> {
    remaining: HashSet<Id>,
    total: u64,
}

impl<Id: Eq + Hash + Clone + std::fmt::Debug> Default for Task<Id> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id: Eq + Hash + Clone + std::fmt::Debug> Task<Id> {
    /// An empty task: a barrier with no children yet, already "finished" until the first
    /// [`Task::register`].
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                remaining: HashSet::new(),
                total: 0,
            }),
        }
    }

    /// Add a child to the barrier. Registering the same id twice is a no-op on the second call
    /// (mirrors the original's `std::set::insert` semantics).
    pub fn register(&self, child: Id) {
        let mut state = self.state.lock();
        if state.remaining.insert(child.clone()) {
            state.total += 1;
            trace!(?child, total = state.total, "registered task child");
        }
    }

    /// Mark `child` complete, whether by explicit report or by observing its termination
    /// (spec.md §4.8: "a child termination is equivalent to `done`").
    ///
    /// Returns `None` if `child` was never registered (or already completed) — the original
    /// logs this as an error and exits; here the caller decides how to react.
    pub fn done(&self, child: &Id) -> Option<Notification> {
        let mut state = self.state.lock();
        if !state.remaining.remove(child) {
            error!(?child, "task got completion from unregistered child");
            return None;
        }
        Some(Notification {
            remaining: state.remaining.len() as u64,
            total: state.total,
            finished: state.remaining.is_empty(),
        })
    }

    /// Current `(remaining, total)` progress, as reported to subscribers on each completion.
    pub fn progress(&self) -> (u64, u64) {
        let state = self.state.lock();
        (state.remaining.len() as u64, state.total)
    }

    /// Whether every registered child has completed.
    pub fn is_done(&self) -> bool {
        self.state.lock().remaining.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finishes_once_every_child_reports_done() {
        let task: Task<&str> = Task::new();
        task.register("a");
        task.register("b");
        assert!(!task.is_done());

        let n = task.done(&"a").unwrap();
        assert!(!n.finished);
        assert_eq!(n.remaining, 1);

        let n = task.done(&"b").unwrap();
        assert!(n.finished);
        assert_eq!(n.remaining, 0);
        assert_eq!(n.total, 2);
    }

    #[test]
    fn registering_same_child_twice_counts_once() {
        let task: Task<&str> = Task::new();
        task.register("a");
        task.register("a");
        assert_eq!(task.progress(), (1, 1));
    }

    #[test]
    fn done_for_unregistered_child_reports_none() {
        let task: Task<&str> = Task::new();
        task.register("a");
        assert!(task.done(&"ghost").is_none());
        assert!(!task.is_done());
    }

    #[test]
    fn empty_task_is_immediately_done() {
        let task: Task<&str> = Task::new();
        assert!(task.is_done());
    }
}
