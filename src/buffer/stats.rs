//! Page cache counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Something the paged buffer counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BufferEvent {
    /// The page was already resident.
    Hit,
    /// The page had to be loaded or created.
    Miss,
    PageRead,
    PageWritten,
    /// A page left memory to stay within the budget.
    Eviction,
    /// The file was cut back to the content length.
    Truncation,
}

/// Counters kept by a [`PagedFileBuffer`](crate::buffer::PagedFileBuffer).
///
/// Relaxed atomics: counters are independent, so only atomicity matters.
///
/// # Example
/// ```
/// use pagestore::buffer::BufferStats;
///
/// let stats = BufferStats::new();
/// assert_eq!(stats.snapshot().hit_rate(), 0.0);
/// ```
#[derive(Debug, Default)]
pub struct BufferStats {
    hits: AtomicU64,
    misses: AtomicU64,
    pages_read: AtomicU64,
    pages_written: AtomicU64,
    evictions: AtomicU64,
    truncations: AtomicU64,
}

impl BufferStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record(&self, event: BufferEvent) {
        let counter = match event {
            BufferEvent::Hit => &self.hits,
            BufferEvent::Miss => &self.misses,
            BufferEvent::PageRead => &self.pages_read,
            BufferEvent::PageWritten => &self.pages_written,
            BufferEvent::Eviction => &self.evictions,
            BufferEvent::Truncation => &self.truncations,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            cache_hits: load(&self.hits),
            cache_misses: load(&self.misses),
            evictions: load(&self.evictions),
            pages_read: load(&self.pages_read),
            pages_written: load(&self.pages_written),
            truncations: load(&self.truncations),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.pages_read,
            &self.pages_written,
            &self.evictions,
            &self.truncations,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Buffer counters at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub evictions: u64,
    pub pages_read: u64,
    pub pages_written: u64,
    pub truncations: u64,
}

impl StatsSnapshot {
    /// Share of page accesses served from memory, 0.0 when nothing was accessed.
    pub fn hit_rate(&self) -> f64 {
        match self.cache_hits + self.cache_misses {
            0 => 0.0,
            total => self.cache_hits as f64 / total as f64,
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits={} misses={} evictions={} read={} written={} truncations={} ({:.1}% hit)",
            self.cache_hits,
            self.cache_misses,
            self.evictions,
            self.pages_read,
            self.pages_written,
            self.truncations,
            self.hit_rate() * 100.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_land_in_their_counter() {
        let stats = BufferStats::new();
        for _ in 0..7 {
            stats.record(BufferEvent::Hit);
        }
        for _ in 0..3 {
            stats.record(BufferEvent::Miss);
        }
        stats.record(BufferEvent::Truncation);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.cache_hits, 7);
        assert_eq!(snapshot.cache_misses, 3);
        assert_eq!(snapshot.truncations, 1);
        assert_eq!(snapshot.evictions, 0);
        assert_eq!(snapshot.hit_rate(), 0.7);
    }

    #[test]
    fn test_reset_clears_everything() {
        let stats = BufferStats::new();
        stats.record(BufferEvent::Eviction);
        stats.record(BufferEvent::PageWritten);
        stats.reset();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn test_display() {
        let snapshot = StatsSnapshot {
            cache_hits: 80,
            cache_misses: 20,
            ..Default::default()
        };
        let display = snapshot.to_string();
        assert!(display.starts_with("hits=80 misses=20"));
        assert!(display.ends_with("(80.0% hit)"));
    }
}
