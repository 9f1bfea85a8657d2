use tracing::{debug, trace};

use super::paired::{PairedEventCorrelator, Phase};
use super::RecordedEventHandler;
use crate::event::{fields, EventKind, RecordedEvent};
use crate::metrics::{BoundHistogram, Meter, MetricsError, ObservedValue, Unit};

const GC_DURATION: &str = "jfr.GCHeapSummary.duration";
const HEAP_USED: &str = "jfr.GCHeapSummary.heapUsed";
const HEAP_COMMITTED: &str = "jfr.GCHeapSummary.heapCommitted";
const G1_DURATION: &str = "jfr.G1GarbageCollection.duration";

const NANOS_PER_MILLI: f64 = 1_000_000.0;

/// The parts of a heap summary kept while waiting for its partner.
#[derive(Debug, Clone, Copy, PartialEq)]
struct HeapSnapshot {
    start_time_ns: i64,
    heap_used: Option<i64>,
    committed: Option<i64>,
}

impl HeapSnapshot {
    fn of(event: &RecordedEvent) -> Self {
        Self {
            start_time_ns: event.start_time_ns,
            heap_used: event.long(fields::HEAP_USED),
            committed: event
                .record(fields::HEAP_SPACE)
                .and_then(|space| space.long(fields::COMMITTED_SIZE)),
        }
    }
}

/// Pairs `Before GC` / `After GC` heap summaries by `gcId`.
///
/// Records the pause between the halves and publishes the heap figures of
/// the `After GC` half to callback gauges.
pub struct GcHeapSummaryHandler {
    pairs: PairedEventCorrelator<HeapSnapshot>,
    duration: Option<BoundHistogram>,
    heap_used: ObservedValue,
    heap_committed: ObservedValue,
}

impl GcHeapSummaryHandler {
    pub fn new() -> Self {
        Self {
            pairs: PairedEventCorrelator::new(EventKind::GcHeapSummary.as_str()),
            duration: None,
            heap_used: ObservedValue::new(),
            heap_committed: ObservedValue::new(),
        }
    }

    /// Halves still waiting for a partner.
    pub fn pending_len(&self) -> usize {
        self.pairs.pending_len()
    }

    fn record(&self, before: HeapSnapshot, after: HeapSnapshot) {
        match after.start_time_ns.checked_sub(before.start_time_ns) {
            Some(elapsed_ns) if elapsed_ns >= 0 => {
                if let Some(h) = &self.duration {
                    h.record(elapsed_ns as f64 / NANOS_PER_MILLI);
                }
            }
            elapsed_ns => debug!(
                before = before.start_time_ns,
                after = after.start_time_ns,
                ?elapsed_ns,
                "GC pair has no valid elapsed time, not recording duration"
            ),
        }

        if let Some(used) = after.heap_used {
            self.heap_used.set(used as f64);
        }
        if let Some(committed) = after.committed {
            self.heap_committed.set(committed as f64);
        }
    }
}

impl Default for GcHeapSummaryHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordedEventHandler for GcHeapSummaryHandler {
    fn event_kind(&self) -> EventKind {
        EventKind::GcHeapSummary
    }

    fn init(&mut self, meter: &Meter) -> Result<(), MetricsError> {
        let histogram = meter
            .histogram(GC_DURATION)
            .description("GC Duration")
            .unit(Unit::Milliseconds)
            .build()?;
        self.duration = Some(histogram.bind(&[])?);

        let used = self.heap_used.clone();
        meter
            .up_down_counter(HEAP_USED)
            .description("Heap used after the last GC")
            .unit(Unit::Kilobytes)
            .build_with_callback(move || used.get())?;

        let committed = self.heap_committed.clone();
        meter
            .up_down_counter(HEAP_COMMITTED)
            .description("Heap committed after the last GC")
            .unit(Unit::Kilobytes)
            .build_with_callback(move || committed.get())?;
        Ok(())
    }

    fn accept(&mut self, event: &RecordedEvent) {
        let Some(phase) = event.string(fields::WHEN).and_then(Phase::from_marker) else {
            trace!("Heap summary without a GC phase marker, dropping");
            return;
        };
        let Some(gc_id) = event.long(fields::GC_ID) else {
            trace!("Heap summary without gcId, dropping");
            return;
        };

        if let Some(pair) = self.pairs.offer(gc_id, phase, HeapSnapshot::of(event)) {
            self.record(pair.before, pair.after);
        }
    }
}

/// Records the duration of each G1 collection.
pub struct G1GarbageCollectionHandler {
    duration: Option<BoundHistogram>,
}

impl G1GarbageCollectionHandler {
    pub fn new() -> Self {
        Self { duration: None }
    }
}

impl Default for G1GarbageCollectionHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordedEventHandler for G1GarbageCollectionHandler {
    fn event_kind(&self) -> EventKind {
        EventKind::G1GarbageCollection
    }

    fn init(&mut self, meter: &Meter) -> Result<(), MetricsError> {
        let histogram = meter
            .histogram(G1_DURATION)
            .description("G1 GC Duration")
            .unit(Unit::Milliseconds)
            .build()?;
        self.duration = Some(histogram.bind(&[])?);
        Ok(())
    }

    fn accept(&mut self, event: &RecordedEvent) {
        if let (Some(h), Some(d)) = (&self.duration, event.duration) {
            h.record(d.as_secs_f64() * 1_000.0);
        }
    }
}
