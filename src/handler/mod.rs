//! Event handlers and the registry that routes events to them.

pub mod cpu;
pub mod gauges;
pub mod gc;
pub mod memory;
pub mod network;
pub mod paired;
pub mod profiler;
pub mod registry;
pub mod thread;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::event::{EventKind, RecordedEvent};
use crate::metrics::{ExecutionProfile, Meter, MetricsError};

pub use registry::HandlerRegistry;
pub use thread::{GroupHandlerFactory, ThreadDispatchingHandler, ThreadGrouper};

/// Attribute key carrying the thread group on per-thread instruments.
pub const THREAD_NAME: &str = "thread.name";

/// Interval at which the recorder is asked to emit periodic events.
pub const ONE_SECOND: Duration = Duration::from_secs(1);

/// A unit of work for one event type.
///
/// `init` runs once before the first `accept`; `accept` never fails and
/// skips any metric whose source field is missing.
pub trait RecordedEventHandler: Send {
    /// The event kind this handler consumes.
    fn event_kind(&self) -> EventKind;

    /// Recorder type name, derived from the kind.
    fn event_name(&self) -> &'static str {
        self.event_kind().as_str()
    }

    /// Creates this handler's instruments.
    fn init(&mut self, meter: &Meter) -> Result<(), MetricsError>;

    /// Consumes one event of this handler's kind.
    fn accept(&mut self, event: &RecordedEvent);

    /// How often the recorder should emit this event, for periodic kinds.
    fn polling_interval(&self) -> Option<Duration> {
        None
    }
}

/// Settings shared by all handlers built for one registry.
#[derive(Clone)]
pub struct HandlerContext {
    pub grouper: ThreadGrouper,
    /// Upper bound on thread groups per dispatching handler before
    /// new groups fold into [`thread::OVERFLOW_GROUP`].
    pub max_groups: usize,
    pub profile: Arc<ExecutionProfile>,
}

impl Default for HandlerContext {
    fn default() -> Self {
        Self {
            grouper: ThreadGrouper::default(),
            max_groups: 256,
            profile: Arc::new(ExecutionProfile::new(4096)),
        }
    }
}

/// Selectable handler, as named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    GcHeapSummary,
    G1GarbageCollection,
    ObjectAllocationInNewTlab,
    ObjectAllocationOutsideTlab,
    NetworkRead,
    NetworkWrite,
    OverallCpuLoad,
    ThreadCpuLoad,
    ContextSwitchRate,
    CompilerStatistics,
    ContainerConfiguration,
    JavaMethodSample,
    NativeMethodSample,
}

impl HandlerKind {
    /// Every handler, in default registration order.
    pub fn all() -> &'static [Self] {
        &[
            Self::GcHeapSummary,
            Self::G1GarbageCollection,
            Self::ObjectAllocationInNewTlab,
            Self::ObjectAllocationOutsideTlab,
            Self::NetworkRead,
            Self::NetworkWrite,
            Self::OverallCpuLoad,
            Self::ThreadCpuLoad,
            Self::ContextSwitchRate,
            Self::CompilerStatistics,
            Self::ContainerConfiguration,
            Self::JavaMethodSample,
            Self::NativeMethodSample,
        ]
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GcHeapSummary => "gc_heap_summary",
            Self::G1GarbageCollection => "g1_garbage_collection",
            Self::ObjectAllocationInNewTlab => "object_allocation_in_new_tlab",
            Self::ObjectAllocationOutsideTlab => "object_allocation_outside_tlab",
            Self::NetworkRead => "network_read",
            Self::NetworkWrite => "network_write",
            Self::OverallCpuLoad => "overall_cpu_load",
            Self::ThreadCpuLoad => "thread_cpu_load",
            Self::ContextSwitchRate => "context_switch_rate",
            Self::CompilerStatistics => "compiler_statistics",
            Self::ContainerConfiguration => "container_configuration",
            Self::JavaMethodSample => "java_method_sample",
            Self::NativeMethodSample => "native_method_sample",
        }
    }

    /// The event kind the handler consumes.
    pub const fn event_kind(self) -> EventKind {
        match self {
            Self::GcHeapSummary => EventKind::GcHeapSummary,
            Self::G1GarbageCollection => EventKind::G1GarbageCollection,
            Self::ObjectAllocationInNewTlab => EventKind::ObjectAllocationInNewTlab,
            Self::ObjectAllocationOutsideTlab => EventKind::ObjectAllocationOutsideTlab,
            Self::NetworkRead => EventKind::SocketRead,
            Self::NetworkWrite => EventKind::SocketWrite,
            Self::OverallCpuLoad => EventKind::CpuLoad,
            Self::ThreadCpuLoad => EventKind::ThreadCpuLoad,
            Self::ContextSwitchRate => EventKind::ThreadContextSwitchRate,
            Self::CompilerStatistics => EventKind::CompilerStatistics,
            Self::ContainerConfiguration => EventKind::ContainerConfiguration,
            Self::JavaMethodSample => EventKind::ExecutionSample,
            Self::NativeMethodSample => EventKind::NativeMethodSample,
        }
    }

    /// Instantiates the handler. Instruments are created later by `init`.
    pub fn create(self, ctx: &HandlerContext) -> Box<dyn RecordedEventHandler> {
        match self {
            Self::GcHeapSummary => Box::new(gc::GcHeapSummaryHandler::new()),
            Self::G1GarbageCollection => Box::new(gc::G1GarbageCollectionHandler::new()),
            Self::ObjectAllocationInNewTlab => Box::new(ThreadDispatchingHandler::new(
                memory::AllocationFactory::in_new_tlab(),
                ctx,
            )),
            Self::ObjectAllocationOutsideTlab => Box::new(ThreadDispatchingHandler::new(
                memory::AllocationFactory::outside_tlab(),
                ctx,
            )),
            Self::NetworkRead => Box::new(ThreadDispatchingHandler::new(
                network::NetworkFactory::read(),
                ctx,
            )),
            Self::NetworkWrite => Box::new(ThreadDispatchingHandler::new(
                network::NetworkFactory::write(),
                ctx,
            )),
            Self::OverallCpuLoad => Box::new(cpu::OverallCpuLoadHandler::new()),
            Self::ThreadCpuLoad => {
                Box::new(ThreadDispatchingHandler::new(cpu::ThreadCpuLoadFactory, ctx))
            }
            Self::ContextSwitchRate => Box::new(cpu::ContextSwitchRateHandler::new()),
            Self::CompilerStatistics => Box::new(gauges::GaugeHandler::compiler_statistics()),
            Self::ContainerConfiguration => {
                Box::new(gauges::GaugeHandler::container_configuration())
            }
            Self::JavaMethodSample => Box::new(ThreadDispatchingHandler::new(
                profiler::MethodSampleFactory::new(
                    EventKind::ExecutionSample,
                    Arc::clone(&ctx.profile),
                ),
                ctx,
            )),
            Self::NativeMethodSample => Box::new(ThreadDispatchingHandler::new(
                profiler::MethodSampleFactory::new(
                    EventKind::NativeMethodSample,
                    Arc::clone(&ctx.profile),
                ),
                ctx,
            )),
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_kind_serde_names_match_as_str() {
        for kind in HandlerKind::all() {
            let yaml = serde_yaml::to_string(kind).expect("serialize");
            assert_eq!(yaml.trim(), kind.as_str());

            let back: HandlerKind = serde_yaml::from_str(kind.as_str()).expect("deserialize");
            assert_eq!(back, *kind);
        }
    }

    #[test]
    fn test_created_handler_matches_event_kind() {
        let ctx = HandlerContext::default();
        for kind in HandlerKind::all() {
            let handler = kind.create(&ctx);
            assert_eq!(handler.event_kind(), kind.event_kind(), "{kind}");
            assert_eq!(handler.event_name(), kind.event_kind().as_str());
        }
    }

    #[test]
    fn test_polling_intervals() {
        let ctx = HandlerContext::default();
        let polled: Vec<HandlerKind> = HandlerKind::all()
            .iter()
            .copied()
            .filter(|k| k.create(&ctx).polling_interval() == Some(ONE_SECOND))
            .collect();
        assert_eq!(
            polled,
            vec![
                HandlerKind::OverallCpuLoad,
                HandlerKind::ThreadCpuLoad,
                HandlerKind::ContextSwitchRate,
                HandlerKind::CompilerStatistics,
            ]
        );
    }
}
