//! Time functionality for the event store.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(missing_docs, clippy::clone_on_ref_ptr)]

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;
use std::{
    fmt::{Debug, Display, Formatter},
    ops::{Add, Sub},
    time::Duration,
};

/// A nanosecond-resolution instant in time, matching the `timestamp` field of an event
/// (spec.md §3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time(i64);

impl Time {
    /// The earliest representable time point.
    pub const MIN: Time = Time(i64::MIN);

    /// The latest representable time point.
    pub const MAX: Time = Time(i64::MAX);

    /// Construct from a count of nanoseconds since the Unix epoch.
    pub fn from_timestamp_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Construct from a count of milliseconds since the Unix epoch.
    pub fn from_timestamp_millis(millis: i64) -> Self {
        Self(millis * 1_000_000)
    }

    /// Nanoseconds since the Unix epoch.
    pub fn timestamp_nanos(&self) -> i64 {
        self.0
    }

    /// Convert to a `chrono` UTC date-time, for display and parsing interop.
    pub fn date_time(&self) -> DateTime<Utc> {
        Utc.timestamp_nanos(self.0)
    }

    /// Saturating duration since an earlier time point; zero if `earlier` is actually later.
    pub fn checked_duration_since(&self, earlier: Time) -> Option<Duration> {
        if self.0 < earlier.0 {
            None
        } else {
            Some(Duration::from_nanos((self.0 - earlier.0) as u64))
        }
    }
}

impl Display for Time {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.date_time().to_rfc3339())
    }
}

impl Add<Duration> for Time {
    type Output = Time;

    fn add(self, rhs: Duration) -> Self::Output {
        Time(self.0 + rhs.as_nanos() as i64)
    }
}

impl Sub<Duration> for Time {
    type Output = Time;

    fn sub(self, rhs: Duration) -> Self::Output {
        Time(self.0 - rhs.as_nanos() as i64)
    }
}

impl Sub<Time> for Time {
    type Output = Duration;

    /// Panics if `rhs` is later than `self`; use [`Time::checked_duration_since`] otherwise.
    fn sub(self, rhs: Time) -> Self::Output {
        self.checked_duration_since(rhs)
            .expect("rhs must not be later than self")
    }
}

/// Abstracts over wall-clock access so that actors (identifier lease timestamps, partition
/// `last_modified`, query `start_time`) can be driven by a [`MockProvider`] in tests.
pub trait TimeProvider: Debug + Send + Sync + 'static {
    /// The current wall-clock time.
    fn now(&self) -> Time;
}

/// A [`TimeProvider`] backed by the operating system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProvider {}

impl SystemProvider {
    /// Create a new system-clock time provider.
    pub fn new() -> Self {
        Self {}
    }
}

impl TimeProvider for SystemProvider {
    fn now(&self) -> Time {
        let now = Utc::now();
        Time::from_timestamp_nanos(now.timestamp_nanos_opt().unwrap_or(i64::MAX))
    }
}

/// A [`TimeProvider`] with a settable, monotonically advanceable clock, for deterministic tests.
#[derive(Debug)]
pub struct MockProvider {
    now: RwLock<Time>,
}

impl MockProvider {
    /// Create a mock clock starting at `start`.
    pub fn new(start: Time) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    /// Overwrite the current time.
    pub fn set(&self, time: Time) {
        *self.now.write() = time;
    }

    /// Advance the clock by `duration` and return the new time.
    pub fn inc(&self, duration: Duration) -> Time {
        let mut now = self.now.write();
        *now = *now + duration;
        *now
    }
}

impl TimeProvider for MockProvider {
    fn now(&self) -> Time {
        *self.now.read()
    }
}
