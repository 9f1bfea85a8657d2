use std::time::Duration;

use super::thread::GroupHandlerFactory;
use super::{RecordedEventHandler, ONE_SECOND, THREAD_NAME};
use crate::event::{fields, EventKind, RecordedEvent};
use crate::metrics::{BoundHistogram, Meter, MetricsError, Unit};

const CPU_UTILIZATION: &str = "runtime.jvm.cpu.utilization";
const THREAD_CPU_UTILIZATION: &str = "runtime.jvm.thread.cpu.utilization";
const CONTEXT_SWITCH: &str = "runtime.jvm.cpu.context_switch";

const CPU_USAGE: &str = "cpu.usage";

/// Process and machine CPU load from `jdk.CPULoad`.
pub struct OverallCpuLoadHandler {
    /// (field, recorder) in `cpu.usage` order: user, system, machine.
    loads: Vec<(&'static str, BoundHistogram)>,
}

impl OverallCpuLoadHandler {
    pub fn new() -> Self {
        Self { loads: Vec::new() }
    }
}

impl Default for OverallCpuLoadHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordedEventHandler for OverallCpuLoadHandler {
    fn event_kind(&self) -> EventKind {
        EventKind::CpuLoad
    }

    fn init(&mut self, meter: &Meter) -> Result<(), MetricsError> {
        let histogram = meter
            .histogram(CPU_UTILIZATION)
            .description("CPU Utilization")
            .unit(Unit::Ratio)
            .attribute_keys(&[CPU_USAGE])
            .build()?;
        self.loads = vec![
            (fields::JVM_USER, histogram.bind(&["user"])?),
            (fields::JVM_SYSTEM, histogram.bind(&["system"])?),
            (fields::MACHINE_TOTAL, histogram.bind(&["machine"])?),
        ];
        Ok(())
    }

    fn accept(&mut self, event: &RecordedEvent) {
        for (field, h) in &self.loads {
            if let Some(v) = event.double(field) {
                h.record(v);
            }
        }
    }

    fn polling_interval(&self) -> Option<Duration> {
        Some(ONE_SECOND)
    }
}

/// Builds per-group handlers for `jdk.ThreadCPULoad`.
pub struct ThreadCpuLoadFactory;

impl GroupHandlerFactory for ThreadCpuLoadFactory {
    fn event_kind(&self) -> EventKind {
        EventKind::ThreadCpuLoad
    }

    fn create(&self, group: &str) -> Option<Box<dyn RecordedEventHandler>> {
        Some(Box::new(ThreadCpuLoadHandler {
            group: group.to_string(),
            user: None,
            system: None,
        }))
    }

    fn polling_interval(&self) -> Option<Duration> {
        Some(ONE_SECOND)
    }
}

struct ThreadCpuLoadHandler {
    group: String,
    user: Option<BoundHistogram>,
    system: Option<BoundHistogram>,
}

impl RecordedEventHandler for ThreadCpuLoadHandler {
    fn event_kind(&self) -> EventKind {
        EventKind::ThreadCpuLoad
    }

    fn init(&mut self, meter: &Meter) -> Result<(), MetricsError> {
        let histogram = meter
            .histogram(THREAD_CPU_UTILIZATION)
            .description("Thread CPU Utilization")
            .unit(Unit::Ratio)
            .attribute_keys(&[THREAD_NAME, CPU_USAGE])
            .build()?;
        self.user = Some(histogram.bind(&[self.group.as_str(), "user"])?);
        self.system = Some(histogram.bind(&[self.group.as_str(), "system"])?);
        Ok(())
    }

    fn accept(&mut self, event: &RecordedEvent) {
        if let (Some(h), Some(v)) = (&self.user, event.double(fields::USER)) {
            h.record(v);
        }
        if let (Some(h), Some(v)) = (&self.system, event.double(fields::SYSTEM)) {
            h.record(v);
        }
    }
}

/// Context switch rate from `jdk.ThreadContextSwitchRate`.
pub struct ContextSwitchRateHandler {
    rate: Option<BoundHistogram>,
}

impl ContextSwitchRateHandler {
    pub fn new() -> Self {
        Self { rate: None }
    }
}

impl Default for ContextSwitchRateHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordedEventHandler for ContextSwitchRateHandler {
    fn event_kind(&self) -> EventKind {
        EventKind::ThreadContextSwitchRate
    }

    fn init(&mut self, meter: &Meter) -> Result<(), MetricsError> {
        let histogram = meter
            .histogram(CONTEXT_SWITCH)
            .description("Context Switch Rate")
            .unit(Unit::Hertz)
            .build()?;
        self.rate = Some(histogram.bind(&[])?);
        Ok(())
    }

    fn accept(&mut self, event: &RecordedEvent) {
        if let (Some(h), Some(v)) = (&self.rate, event.double(fields::SWITCH_RATE)) {
            h.record(v);
        }
    }

    fn polling_interval(&self) -> Option<Duration> {
        Some(ONE_SECOND)
    }
}
