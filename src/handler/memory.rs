use super::thread::GroupHandlerFactory;
use super::{RecordedEventHandler, THREAD_NAME};
use crate::event::{fields, EventKind, RecordedEvent};
use crate::metrics::{BoundHistogram, Meter, MetricsError, Unit};

/// Builds per-group allocation size handlers for one allocation event kind.
pub struct AllocationFactory {
    kind: EventKind,
    field: &'static str,
    metric: &'static str,
}

impl AllocationFactory {
    /// TLAB refills, sized by the new TLAB.
    pub fn in_new_tlab() -> Self {
        Self {
            kind: EventKind::ObjectAllocationInNewTlab,
            field: fields::TLAB_SIZE,
            metric: "jfr.ObjectAllocationInNewTLAB.allocation",
        }
    }

    /// Allocations made directly in the heap.
    pub fn outside_tlab() -> Self {
        Self {
            kind: EventKind::ObjectAllocationOutsideTlab,
            field: fields::ALLOCATION_SIZE,
            metric: "jfr.ObjectAllocationOutsideTLAB.allocation",
        }
    }
}

impl GroupHandlerFactory for AllocationFactory {
    fn event_kind(&self) -> EventKind {
        self.kind
    }

    fn create(&self, group: &str) -> Option<Box<dyn RecordedEventHandler>> {
        Some(Box::new(AllocationHandler {
            kind: self.kind,
            field: self.field,
            metric: self.metric,
            group: group.to_string(),
            histogram: None,
        }))
    }
}

struct AllocationHandler {
    kind: EventKind,
    field: &'static str,
    metric: &'static str,
    group: String,
    histogram: Option<BoundHistogram>,
}

impl RecordedEventHandler for AllocationHandler {
    fn event_kind(&self) -> EventKind {
        self.kind
    }

    fn init(&mut self, meter: &Meter) -> Result<(), MetricsError> {
        let histogram = meter
            .histogram(self.metric)
            .description("Allocation")
            .unit(Unit::Bytes)
            .attribute_keys(&[THREAD_NAME])
            .build()?;
        self.histogram = Some(histogram.bind(&[self.group.as_str()])?);
        Ok(())
    }

    fn accept(&mut self, event: &RecordedEvent) {
        if let (Some(h), Some(size)) = (&self.histogram, event.long(self.field)) {
            h.record(size as f64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use prometheus::Registry;

    use crate::event::{FieldValue, ThreadRef};
    use crate::handler::{HandlerContext, ThreadDispatchingHandler};

    fn allocation(kind: EventKind, thread: &str, field: &str, size: i64) -> RecordedEvent {
        RecordedEvent::of(kind, 1)
            .with_thread(ThreadRef::java(1, thread))
            .with_field(fields::OBJECT_CLASS, FieldValue::String("byte[]".to_string()))
            .with_field(field, FieldValue::Long(size))
    }

    fn bucket_sums(meter: &Meter, name: &str) -> Vec<(String, u64, f64)> {
        let families = meter.registry().gather();
        let Some(family) = families.iter().find(|f| f.get_name() == name) else {
            return Vec::new();
        };
        let mut out: Vec<(String, u64, f64)> = family
            .get_metric()
            .iter()
            .map(|m| {
                let h = m.get_histogram();
                (
                    m.get_label()[0].get_value().to_string(),
                    h.get_sample_count(),
                    h.get_sample_sum(),
                )
            })
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    #[test]
    fn test_tlab_size_recorded_per_group() {
        let meter = Meter::new(Registry::new());
        let mut h = ThreadDispatchingHandler::new(
            AllocationFactory::in_new_tlab(),
            &HandlerContext::default(),
        );
        h.init(&meter).expect("init");

        let kind = EventKind::ObjectAllocationInNewTlab;
        h.accept(&allocation(kind, "pool-1-thread-1", fields::TLAB_SIZE, 512));
        h.accept(&allocation(kind, "pool-1-thread-2", fields::TLAB_SIZE, 1024));
        h.accept(&allocation(kind, "main", fields::TLAB_SIZE, 64));
        h.accept(&allocation(kind, "main", fields::ALLOCATION_SIZE, 99));

        assert_eq!(
            bucket_sums(&meter, "jfr_ObjectAllocationInNewTLAB_allocation_bytes"),
            vec![
                ("main".to_string(), 1, 64.0),
                ("pool-1-thread".to_string(), 2, 1536.0),
            ]
        );
    }

    #[test]
    fn test_outside_tlab_uses_allocation_size() {
        let meter = Meter::new(Registry::new());
        let mut h = ThreadDispatchingHandler::new(
            AllocationFactory::outside_tlab(),
            &HandlerContext::default(),
        );
        h.init(&meter).expect("init");

        let kind = EventKind::ObjectAllocationOutsideTlab;
        h.accept(&allocation(kind, "main", fields::ALLOCATION_SIZE, 4096));

        assert_eq!(
            bucket_sums(&meter, "jfr_ObjectAllocationOutsideTLAB_allocation_bytes"),
            vec![("main".to_string(), 1, 4096.0)]
        );
    }
}
