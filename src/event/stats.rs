use std::sync::atomic::{AtomicU64, Ordering};

use super::{EventKind, EVENT_KIND_COUNT};

/// Lock-free per-EventKind counters.
///
/// `snapshot()` atomically reads and resets all counters, making it
/// suitable for periodic reporting without contention.
pub struct EventStats {
    counts: [AtomicU64; EVENT_KIND_COUNT],
    ignored: AtomicU64,
}

impl EventStats {
    /// Create a new zeroed EventStats.
    pub fn new() -> Self {
        Self {
            counts: std::array::from_fn(|_| AtomicU64::new(0)),
            ignored: AtomicU64::new(0),
        }
    }

    /// Increment the counter for the given event kind by one.
    pub fn record(&self, kind: EventKind) {
        self.counts[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Count an event whose type name has no supported kind.
    pub fn record_ignored(&self) {
        self.ignored.fetch_add(1, Ordering::Relaxed);
    }

    /// Atomically read and reset all counters, returning only non-zero
    /// kinds and the ignored count.
    pub fn snapshot(&self) -> (Vec<(EventKind, u64)>, u64) {
        let mut result = Vec::new();

        for (i, counter) in self.counts.iter().enumerate() {
            let v = counter.swap(0, Ordering::Relaxed);
            if v > 0 {
                if let Some(kind) = EventKind::from_index(i) {
                    result.push((kind, v));
                }
            }
        }

        (result, self.ignored.swap(0, Ordering::Relaxed))
    }
}

impl Default for EventStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let stats = EventStats::new();
        stats.record(EventKind::SocketRead);
        stats.record(EventKind::SocketRead);
        stats.record(EventKind::GcHeapSummary);
        stats.record_ignored();

        let (snap, ignored) = stats.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(ignored, 1);

        let read_count = snap
            .iter()
            .find(|(k, _)| *k == EventKind::SocketRead)
            .map(|(_, v)| *v);
        assert_eq!(read_count, Some(2));
    }

    #[test]
    fn test_snapshot_resets_counters() {
        let stats = EventStats::new();
        stats.record(EventKind::CpuLoad);

        let (snap1, _) = stats.snapshot();
        assert_eq!(snap1.len(), 1);

        let (snap2, ignored) = stats.snapshot();
        assert!(snap2.is_empty());
        assert_eq!(ignored, 0);
    }
}
