//! Per-thread-group fan-out.
//!
//! A [`ThreadDispatchingHandler`] keeps one child handler per thread group.
//! Groups come from [`ThreadGrouper`], which collapses numbered pool
//! threads so the number of children stays bounded.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use super::{HandlerContext, RecordedEventHandler};
use crate::event::{EventKind, RecordedEvent, ThreadRef};
use crate::metrics::{CounterInstrument, Meter, MetricsError};

/// Group key for threads with no usable name.
pub const UNNAMED_GROUP: &str = "unnamed";

/// Group key for threads first seen once `max_groups` is reached.
pub const OVERFLOW_GROUP: &str = "other";

const SEPARATORS: &[u8] = b"-_#. :";

/// Maps raw thread names to bounded-cardinality group keys.
#[derive(Clone, Default)]
pub struct ThreadGrouper {
    ignored: Arc<HashSet<String>>,
}

impl ThreadGrouper {
    /// Creates a grouper whose `ignored` groups produce no metrics.
    pub fn new<I>(ignored: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            ignored: Arc::new(ignored.into_iter().collect()),
        }
    }

    /// Strips trailing digit runs, and the separator before each run,
    /// until none remain. `pool-3-thread-7` becomes `pool-3-thread`.
    pub fn group<'a>(&self, raw: &'a str) -> &'a str {
        let mut bytes = raw.as_bytes();
        loop {
            let digits = bytes.iter().rev().take_while(|b| b.is_ascii_digit()).count();
            if digits == 0 {
                break;
            }
            bytes = &bytes[..bytes.len() - digits];
            let seps = bytes
                .iter()
                .rev()
                .take_while(|b| SEPARATORS.contains(*b))
                .count();
            bytes = &bytes[..bytes.len() - seps];
        }

        if bytes.is_empty() {
            return UNNAMED_GROUP;
        }
        // Only ASCII bytes were removed, so the cut is on a char boundary.
        &raw[..bytes.len()]
    }

    pub fn is_ignored(&self, group: &str) -> bool {
        self.ignored.contains(group)
    }
}

/// Creates the child handler for one thread group.
pub trait GroupHandlerFactory: Send {
    fn event_kind(&self) -> EventKind;

    /// Returns `None` when the group should produce no metrics.
    fn create(&self, group: &str) -> Option<Box<dyn RecordedEventHandler>>;

    /// The thread an event is attributed to.
    fn thread<'e>(&self, event: &'e RecordedEvent) -> Option<&'e ThreadRef> {
        event.thread.as_ref()
    }

    fn polling_interval(&self) -> Option<Duration> {
        None
    }
}

enum Slot {
    Live(Box<dyn RecordedEventHandler>),
    Absent,
}

/// Fans events out to lazily created per-group children.
///
/// The outcome of the first sighting of a group is cached for good: a
/// child that failed to initialize is never retried.
pub struct ThreadDispatchingHandler<F> {
    factory: F,
    grouper: ThreadGrouper,
    max_groups: usize,
    meter: Option<Meter>,
    groups_created: Option<CounterInstrument>,
    groups: HashMap<String, Slot>,
}

impl<F: GroupHandlerFactory> ThreadDispatchingHandler<F> {
    pub fn new(factory: F, ctx: &HandlerContext) -> Self {
        Self {
            factory,
            grouper: ctx.grouper.clone(),
            max_groups: ctx.max_groups,
            meter: None,
            groups_created: None,
            groups: HashMap::new(),
        }
    }

    /// Number of cached groups, tombstones included.
    #[cfg(test)]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Whether `group` has a live child.
    #[cfg(test)]
    pub fn is_live(&self, group: &str) -> bool {
        matches!(self.groups.get(group), Some(Slot::Live(_)))
    }

    #[cfg(test)]
    pub fn has_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    fn count_group(&self, outcome: &str) {
        if let Some(counter) = &self.groups_created {
            if let Ok(bound) = counter.bind(&[self.factory.event_kind().as_str(), outcome]) {
                bound.inc();
            }
        }
    }

    fn create_slot(&self, meter: &Meter, group: &str) -> Slot {
        let event = self.factory.event_kind();

        if self.grouper.is_ignored(group) {
            debug!(event = %event, group, "Ignoring thread group");
            self.count_group("ignored");
            return Slot::Absent;
        }

        let Some(mut child) = self.factory.create(group) else {
            self.count_group("absent");
            return Slot::Absent;
        };

        match child.init(meter) {
            Ok(()) => {
                debug!(event = %event, group, "Created thread group handler");
                self.count_group("live");
                Slot::Live(child)
            }
            Err(e) => {
                warn!(event = %event, group, error = %e, "Thread group handler init failed");
                self.count_group("failed");
                Slot::Absent
            }
        }
    }
}

impl<F: GroupHandlerFactory> RecordedEventHandler for ThreadDispatchingHandler<F> {
    fn event_kind(&self) -> EventKind {
        self.factory.event_kind()
    }

    fn init(&mut self, meter: &Meter) -> Result<(), MetricsError> {
        let counter = meter
            .counter("jfr_metrics.thread_groups_created")
            .description("Thread groups seen by per-thread handlers, by outcome")
            .attribute_keys(&["event", "outcome"])
            .build()?;
        self.groups_created = Some(counter);
        self.meter = Some(meter.clone());
        Ok(())
    }

    fn accept(&mut self, event: &RecordedEvent) {
        let Some(thread) = self.factory.thread(event) else {
            trace!(event = %self.factory.event_kind(), "Event has no thread, skipping");
            return;
        };
        let mut group = self.grouper.group(thread.name().unwrap_or(""));

        if let Some(slot) = self.groups.get_mut(group) {
            if let Slot::Live(child) = slot {
                child.accept(event);
            }
            return;
        }

        if self.groups.len() >= self.max_groups {
            group = OVERFLOW_GROUP;
            if let Some(slot) = self.groups.get_mut(group) {
                if let Slot::Live(child) = slot {
                    child.accept(event);
                }
                return;
            }
        }

        let Some(meter) = self.meter.as_ref() else {
            trace!(event = %self.factory.event_kind(), "Handler not initialized, skipping");
            return;
        };
        let mut slot = self.create_slot(meter, group);
        if let Slot::Live(child) = &mut slot {
            child.accept(event);
        }
        self.groups.insert(group.to_string(), slot);
    }

    fn polling_interval(&self) -> Option<Duration> {
        self.factory.polling_interval()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use prometheus::Registry;

    use crate::event::FieldValue;

    #[test]
    fn test_group_strips_numeric_suffixes() {
        let g = ThreadGrouper::default();
        assert_eq!(g.group("pool-3-thread-7"), "pool-3-thread");
        assert_eq!(g.group("pool-3-thread-42"), "pool-3-thread");
        assert_eq!(g.group("GC Thread#1"), "GC Thread");
        assert_eq!(g.group("C2 CompilerThread0"), "C2 CompilerThread");
        assert_eq!(g.group("worker_12.3"), "worker");
        assert_eq!(g.group("grpc-nio:8"), "grpc-nio");
        assert_eq!(g.group("main"), "main");
        assert_eq!(g.group("Reference Handler"), "Reference Handler");
    }

    #[test]
    fn test_group_keeps_separators_without_digits() {
        let g = ThreadGrouper::default();
        assert_eq!(g.group("trailing-"), "trailing-");
        assert_eq!(g.group("x2y"), "x2y");
    }

    #[test]
    fn test_group_empty_is_unnamed() {
        let g = ThreadGrouper::default();
        assert_eq!(g.group(""), UNNAMED_GROUP);
        assert_eq!(g.group("1234"), UNNAMED_GROUP);
        assert_eq!(g.group("-12"), UNNAMED_GROUP);
    }

    #[test]
    fn test_group_is_deterministic_and_borrowed() {
        let g = ThreadGrouper::default();
        let raw = String::from("ForkJoinPool.commonPool-worker-3");
        let a = g.group(&raw);
        let b = g.group(&raw);
        assert_eq!(a, b);
        assert_eq!(a, "ForkJoinPool.commonPool-worker");
        assert_eq!(a.as_ptr(), raw.as_ptr());
    }

    #[test]
    fn test_group_non_ascii_name() {
        let g = ThreadGrouper::default();
        assert_eq!(g.group("planificador-ñ-9"), "planificador-ñ");
    }

    struct Counting {
        accepted: Arc<AtomicUsize>,
        fail_init: bool,
    }

    impl RecordedEventHandler for Counting {
        fn event_kind(&self) -> EventKind {
            EventKind::SocketRead
        }

        fn init(&mut self, _meter: &Meter) -> Result<(), MetricsError> {
            if self.fail_init {
                return Err(MetricsError::Bind {
                    name: "test".to_string(),
                    expected: 1,
                    got: 0,
                });
            }
            Ok(())
        }

        fn accept(&mut self, _event: &RecordedEvent) {
            self.accepted.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[derive(Default)]
    struct Recorder {
        created: Arc<AtomicUsize>,
        accepted: Arc<AtomicUsize>,
        failing: Option<&'static str>,
        refuse: Option<&'static str>,
    }

    impl GroupHandlerFactory for Recorder {
        fn event_kind(&self) -> EventKind {
            EventKind::SocketRead
        }

        fn create(&self, group: &str) -> Option<Box<dyn RecordedEventHandler>> {
            if self.refuse == Some(group) {
                return None;
            }
            self.created.fetch_add(1, Ordering::Relaxed);
            Some(Box::new(Counting {
                accepted: Arc::clone(&self.accepted),
                fail_init: self.failing == Some(group),
            }))
        }
    }

    fn event(thread: &str) -> RecordedEvent {
        RecordedEvent::of(EventKind::SocketRead, 1)
            .with_thread(ThreadRef::java(1, thread))
            .with_field("bytesRead", FieldValue::Long(10))
    }

    fn init(handler: &mut impl RecordedEventHandler) {
        handler
            .init(&Meter::new(Registry::new()))
            .expect("init");
    }

    #[test]
    fn test_same_group_created_once() {
        let factory = Recorder::default();
        let created = Arc::clone(&factory.created);
        let accepted = Arc::clone(&factory.accepted);
        let mut h = ThreadDispatchingHandler::new(factory, &HandlerContext::default());
        init(&mut h);

        h.accept(&event("pool-1-thread-1"));
        h.accept(&event("pool-1-thread-2"));
        h.accept(&event("main"));

        assert_eq!(created.load(Ordering::Relaxed), 2);
        assert_eq!(accepted.load(Ordering::Relaxed), 3);
        assert!(h.is_live("pool-1-thread"));
        assert!(h.is_live("main"));
    }

    #[test]
    fn test_failed_init_is_tombstoned() {
        let factory = Recorder {
            failing: Some("main"),
            ..Recorder::default()
        };
        let created = Arc::clone(&factory.created);
        let accepted = Arc::clone(&factory.accepted);
        let mut h = ThreadDispatchingHandler::new(factory, &HandlerContext::default());
        init(&mut h);

        h.accept(&event("main"));
        h.accept(&event("main"));

        assert_eq!(created.load(Ordering::Relaxed), 1);
        assert_eq!(accepted.load(Ordering::Relaxed), 0);
        assert!(h.has_group("main"));
        assert!(!h.is_live("main"));
    }

    #[test]
    fn test_factory_none_and_ignored_groups() {
        let factory = Recorder {
            refuse: Some("Signal Dispatcher"),
            ..Recorder::default()
        };
        let created = Arc::clone(&factory.created);
        let ctx = HandlerContext {
            grouper: ThreadGrouper::new(["GC Thread".to_string()]),
            ..HandlerContext::default()
        };
        let mut h = ThreadDispatchingHandler::new(factory, &ctx);
        init(&mut h);

        h.accept(&event("Signal Dispatcher"));
        h.accept(&event("GC Thread#3"));
        h.accept(&event("GC Thread#4"));

        assert_eq!(created.load(Ordering::Relaxed), 0);
        assert_eq!(h.group_count(), 2);
        assert!(!h.is_live("GC Thread"));
    }

    #[test]
    fn test_event_without_thread_is_skipped() {
        let factory = Recorder::default();
        let accepted = Arc::clone(&factory.accepted);
        let mut h = ThreadDispatchingHandler::new(factory, &HandlerContext::default());
        init(&mut h);

        h.accept(&RecordedEvent::of(EventKind::SocketRead, 1));
        assert_eq!(accepted.load(Ordering::Relaxed), 0);
        assert_eq!(h.group_count(), 0);
    }

    #[test]
    fn test_nameless_thread_groups_as_unnamed() {
        let mut h =
            ThreadDispatchingHandler::new(Recorder::default(), &HandlerContext::default());
        init(&mut h);

        let nameless = ThreadRef {
            os_thread_id: 3,
            os_name: None,
            java_name: None,
            java_thread_id: None,
        };
        h.accept(&RecordedEvent::of(EventKind::SocketRead, 1).with_thread(nameless));
        assert!(h.is_live(UNNAMED_GROUP));
    }

    #[test]
    fn test_max_groups_overflow() {
        let factory = Recorder::default();
        let accepted = Arc::clone(&factory.accepted);
        let ctx = HandlerContext {
            max_groups: 2,
            ..HandlerContext::default()
        };
        let mut h = ThreadDispatchingHandler::new(factory, &ctx);
        init(&mut h);

        for name in ["a", "b", "c", "d", "a"] {
            h.accept(&event(name));
        }

        assert_eq!(h.group_count(), 3);
        assert!(h.is_live("a"));
        assert!(h.is_live("b"));
        assert!(h.is_live(OVERFLOW_GROUP));
        assert!(!h.has_group("c"));
        assert_eq!(accepted.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn test_accept_before_init_creates_nothing() {
        let mut h =
            ThreadDispatchingHandler::new(Recorder::default(), &HandlerContext::default());
        h.accept(&event("main"));
        assert_eq!(h.group_count(), 0);
    }

    #[test]
    fn test_groups_created_counter() {
        let meter = Meter::new(Registry::new());
        let mut h =
            ThreadDispatchingHandler::new(Recorder::default(), &HandlerContext::default());
        h.init(&meter).expect("init");
        h.accept(&event("main"));
        h.accept(&event("main"));

        let families = meter.registry().gather();
        let family = families
            .iter()
            .find(|f| f.get_name() == "jfr_metrics_thread_groups_created_total")
            .expect("family");
        assert_eq!(family.get_metric().len(), 1);
        assert_eq!(family.get_metric()[0].get_counter().get_value(), 1.0);
    }
}
