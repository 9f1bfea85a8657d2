use std::sync::Arc;
use std::time::Instant;

use prometheus::Counter;
use tracing::debug;

use crate::event::parse::parse_event;
use crate::event::stats::EventStats;
use crate::event::{EventKind, RecordedEvent};
use crate::export::HealthMetrics;
use crate::handler::HandlerRegistry;

/// Parses lines and dispatches events on the single consumer.
///
/// Keeps health counters pre-bound per event kind so steady-state
/// dispatch does not allocate.
pub struct EventPipeline {
    registry: HandlerRegistry,
    health: Arc<HealthMetrics>,
    stats: Arc<EventStats>,
    by_kind: Vec<Counter>,
}

impl EventPipeline {
    pub fn new(
        registry: HandlerRegistry,
        health: Arc<HealthMetrics>,
        stats: Arc<EventStats>,
    ) -> Self {
        let by_kind = EventKind::all()
            .iter()
            .map(|kind| health.events_by_type.with_label_values(&[kind.as_str()]))
            .collect();
        health.handlers_active.set(registry.len() as f64);

        Self {
            registry,
            health,
            stats,
            by_kind,
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Processes one raw line as read from the source. A line that is not
    /// UTF-8 counts as received and malformed.
    pub fn process_bytes(&mut self, raw: &[u8]) {
        match std::str::from_utf8(raw) {
            Ok(line) => self.process_line(line),
            Err(e) => {
                self.health.events_received.inc();
                debug!(error = %e, "Dropping non UTF-8 event line");
                self.health.events_malformed.inc();
            }
        }
    }

    /// Parses and dispatches one JSON line. Blank lines are skipped.
    pub fn process_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        self.health.events_received.inc();

        match parse_event(line) {
            Ok(event) => {
                self.process_event(&event);
            }
            Err(e) => {
                debug!(error = %e, "Dropping malformed event");
                self.health.events_malformed.inc();
            }
        }
    }

    /// Dispatches one parsed event. Returns the number of handlers invoked.
    pub fn process_event(&mut self, event: &RecordedEvent) -> usize {
        let Some(kind) = event.kind() else {
            self.ignore();
            return 0;
        };

        let started = Instant::now();
        let invoked = self.registry.dispatch_kind(kind, event);
        self.health
            .event_dispatch_duration
            .observe(started.elapsed().as_secs_f64());

        if invoked == 0 {
            self.ignore();
            return 0;
        }

        self.by_kind[kind.index()].inc();
        self.stats.record(kind);
        invoked
    }

    fn ignore(&self) {
        self.health.events_ignored.inc();
        self.stats.record_ignored();
    }
}
