use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Microseconds since the Unix epoch, displayed as `<secs>.<micros>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.0 / 1_000_000, self.0 % 1_000_000)
    }
}

/// Issues strictly increasing wall-clock timestamps.
///
/// Two calls landing in the same microsecond (or a wall clock that stepped
/// backwards) still get distinct values: the later call is bumped one
/// microsecond past the last value handed out.
#[derive(Debug, Default)]
pub struct TimestampClock {
    last: AtomicU64,
}

impl TimestampClock {
    /// Creates a clock that has not issued anything yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current time, or one microsecond past the last value
    /// issued when the clock has not moved ahead of it.
    pub fn next(&self) -> Timestamp {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
            .unwrap_or_default();
        self.next_after(now)
    }

    fn next_after(&self, now: u64) -> Timestamp {
        let bump = |last: u64| now.max(last.saturating_add(1));
        let previous = self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| Some(bump(last)))
            .unwrap_or_else(|last| last);
        Timestamp(bump(previous))
    }
}
