//! In-memory quota counters keyed by `(scope, identity)`.
//!
//! Fixed-window counting: each key keeps a count and the start of its
//! current window. Windows do not slide, so a caller straddling a boundary
//! can be admitted up to `2 × max_count` times within one window length.
//! That is the accepted trade-off for O(1) memory and update cost per key.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Idle entries are kept for this many window lengths before a sweep may
/// drop them.
const RETENTION_WINDOWS: u32 = 2;

/// Outcome of a single `increment_and_check` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaCheck {
    pub admitted: bool,
    /// Admissions left in the current window after this call.
    pub remaining: u64,
    /// When the current window ends.
    pub reset_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct QuotaKey {
    scope: String,
    identity: String,
}

struct CounterEntry {
    count: u64,
    window_start: Instant,
    window: Duration,
    last_seen: Instant,
}

/// Shared fixed-window counter store.
///
/// `DashMap::entry` holds the shard write lock for the whole
/// read-check-increment sequence, so concurrent calls for the same key
/// serialize while unrelated keys proceed in parallel.
#[derive(Clone, Default)]
pub struct QuotaStore {
    counters: Arc<DashMap<QuotaKey, CounterEntry>>,
}

impl QuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one attempt for `(scope, identity)` and reports whether it fits
    /// in the current window.
    ///
    /// Rejected attempts do not increment the counter. A `now` earlier than
    /// the stored window start is clamped to it, so a clock stepping
    /// backwards never shrinks a window.
    pub fn increment_and_check(
        &self,
        scope: &str,
        identity: &str,
        window: Duration,
        max_count: u64,
        now: Instant,
    ) -> QuotaCheck {
        let key = QuotaKey {
            scope: scope.to_string(),
            identity: identity.to_string(),
        };
        let mut entry = self.counters.entry(key).or_insert_with(|| CounterEntry {
            count: 0,
            window_start: now,
            window,
            last_seen: now,
        });
        let counter = entry.value_mut();

        let now = now.max(counter.window_start);
        counter.window = window;
        counter.last_seen = now;

        if now.duration_since(counter.window_start) >= window {
            counter.window_start = now;
            counter.count = 0;
        }

        let reset_at = counter.window_start + window;
        if counter.count >= max_count {
            return QuotaCheck {
                admitted: false,
                remaining: 0,
                reset_at,
            };
        }

        counter.count += 1;
        QuotaCheck {
            admitted: true,
            remaining: max_count - counter.count,
            reset_at,
        }
    }

    /// Drops entries whose window has expired and that are either empty or
    /// idle for longer than the retention period. Returns the count removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.counters.len();
        self.counters.retain(|_, counter| {
            let expired = now.saturating_duration_since(counter.window_start) >= counter.window;
            let idle = now.saturating_duration_since(counter.last_seen)
                >= counter.window * RETENTION_WINDOWS;
            !(expired && (counter.count == 0 || idle))
        });
        before.saturating_sub(self.counters.len())
    }

    /// Number of tracked `(scope, identity)` pairs.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}
