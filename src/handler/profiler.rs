use std::sync::Arc;

use tracing::trace;

use super::thread::GroupHandlerFactory;
use super::{RecordedEventHandler, THREAD_NAME};
use crate::event::{fields, EventKind, RecordedEvent, ThreadRef};
use crate::metrics::{BoundCounter, CounterInstrument, ExecutionProfile, Meter, MetricsError};

const CPU_SAMPLES: &str = "runtime.jvm.cpu.samples";

/// `state` label for samples without a thread state.
const UNKNOWN_STATE: &str = "unknown";

/// Builds per-group method sample handlers, grouped by the sampled thread.
pub struct MethodSampleFactory {
    kind: EventKind,
    profile: Arc<ExecutionProfile>,
}

impl MethodSampleFactory {
    pub fn new(kind: EventKind, profile: Arc<ExecutionProfile>) -> Self {
        Self { kind, profile }
    }
}

impl GroupHandlerFactory for MethodSampleFactory {
    fn event_kind(&self) -> EventKind {
        self.kind
    }

    fn create(&self, group: &str) -> Option<Box<dyn RecordedEventHandler>> {
        Some(Box::new(MethodSampleHandler {
            kind: self.kind,
            group: group.to_string(),
            profile: Arc::clone(&self.profile),
            samples: None,
            by_state: Vec::new(),
            folded: String::new(),
        }))
    }

    fn thread<'e>(&self, event: &'e RecordedEvent) -> Option<&'e ThreadRef> {
        event.thread_field(fields::SAMPLED_THREAD)
    }
}

struct MethodSampleHandler {
    kind: EventKind,
    group: String,
    profile: Arc<ExecutionProfile>,
    samples: Option<CounterInstrument>,
    /// Bound counters per thread state; the state set is small and fixed.
    by_state: Vec<(String, BoundCounter)>,
    folded: String,
}

impl MethodSampleHandler {
    fn count(&mut self, state: &str) {
        if let Some((_, counter)) = self.by_state.iter().find(|(s, _)| s == state) {
            counter.inc();
            return;
        }
        let Some(samples) = &self.samples else {
            return;
        };
        match samples.bind(&[self.group.as_str(), state]) {
            Ok(counter) => {
                counter.inc();
                self.by_state.push((state.to_string(), counter));
            }
            Err(e) => trace!(error = %e, "Binding sample counter failed"),
        }
    }
}

impl RecordedEventHandler for MethodSampleHandler {
    fn event_kind(&self) -> EventKind {
        self.kind
    }

    fn init(&mut self, meter: &Meter) -> Result<(), MetricsError> {
        let samples = meter
            .counter(CPU_SAMPLES)
            .description("Method samples by thread group and state")
            .attribute_keys(&[THREAD_NAME, fields::STATE])
            .build()?;
        self.samples = Some(samples);
        Ok(())
    }

    fn accept(&mut self, event: &RecordedEvent) {
        self.count(event.string(fields::STATE).unwrap_or(UNKNOWN_STATE));

        let Some(trace) = event.stack_trace.as_ref() else {
            return;
        };
        ExecutionProfile::fold_into(&self.group, Some(trace), &mut self.folded);
        self.profile.record(&self.group, &self.folded);
    }
}
