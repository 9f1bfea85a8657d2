pub mod parse;
pub mod stats;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Deserialize;

/// EventKind identifies the recorder event types this crate understands.
///
/// Every other type name in the stream is ignored at dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventKind {
    GcHeapSummary = 0,
    G1GarbageCollection = 1,
    ObjectAllocationInNewTlab = 2,
    ObjectAllocationOutsideTlab = 3,
    SocketRead = 4,
    SocketWrite = 5,
    CpuLoad = 6,
    ThreadCpuLoad = 7,
    ThreadContextSwitchRate = 8,
    CompilerStatistics = 9,
    ContainerConfiguration = 10,
    ExecutionSample = 11,
    NativeMethodSample = 12,
}

/// Number of EventKind variants, used for array sizing.
pub const EVENT_KIND_COUNT: usize = 13;

impl EventKind {
    /// Returns the recorder's type name for this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GcHeapSummary => "jdk.GCHeapSummary",
            Self::G1GarbageCollection => "jdk.G1GarbageCollection",
            Self::ObjectAllocationInNewTlab => "jdk.ObjectAllocationInNewTLAB",
            Self::ObjectAllocationOutsideTlab => "jdk.ObjectAllocationOutsideTLAB",
            Self::SocketRead => "jdk.SocketRead",
            Self::SocketWrite => "jdk.SocketWrite",
            Self::CpuLoad => "jdk.CPULoad",
            Self::ThreadCpuLoad => "jdk.ThreadCPULoad",
            Self::ThreadContextSwitchRate => "jdk.ThreadContextSwitchRate",
            Self::CompilerStatistics => "jdk.CompilerStatistics",
            Self::ContainerConfiguration => "jdk.ContainerConfiguration",
            Self::ExecutionSample => "jdk.ExecutionSample",
            Self::NativeMethodSample => "jdk.NativeMethodSample",
        }
    }

    /// Convert from the recorder's type name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "jdk.GCHeapSummary" => Some(Self::GcHeapSummary),
            "jdk.G1GarbageCollection" => Some(Self::G1GarbageCollection),
            "jdk.ObjectAllocationInNewTLAB" => Some(Self::ObjectAllocationInNewTlab),
            "jdk.ObjectAllocationOutsideTLAB" => Some(Self::ObjectAllocationOutsideTlab),
            "jdk.SocketRead" => Some(Self::SocketRead),
            "jdk.SocketWrite" => Some(Self::SocketWrite),
            "jdk.CPULoad" => Some(Self::CpuLoad),
            "jdk.ThreadCPULoad" => Some(Self::ThreadCpuLoad),
            "jdk.ThreadContextSwitchRate" => Some(Self::ThreadContextSwitchRate),
            "jdk.CompilerStatistics" => Some(Self::CompilerStatistics),
            "jdk.ContainerConfiguration" => Some(Self::ContainerConfiguration),
            "jdk.ExecutionSample" => Some(Self::ExecutionSample),
            "jdk.NativeMethodSample" => Some(Self::NativeMethodSample),
            _ => None,
        }
    }

    /// Dense index in `0..EVENT_KIND_COUNT`.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Convert from a dense index.
    pub fn from_index(i: usize) -> Option<Self> {
        Self::all().get(i).copied()
    }

    /// Return all event kinds in index order.
    pub fn all() -> &'static [Self] {
        &[
            Self::GcHeapSummary,
            Self::G1GarbageCollection,
            Self::ObjectAllocationInNewTlab,
            Self::ObjectAllocationOutsideTlab,
            Self::SocketRead,
            Self::SocketWrite,
            Self::CpuLoad,
            Self::ThreadCpuLoad,
            Self::ThreadContextSwitchRate,
            Self::CompilerStatistics,
            Self::ContainerConfiguration,
            Self::ExecutionSample,
            Self::NativeMethodSample,
        ]
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field names used by the supported event kinds.
pub mod fields {
    // jdk.GCHeapSummary / jdk.G1GarbageCollection
    pub const GC_ID: &str = "gcId";
    pub const WHEN: &str = "when";
    pub const HEAP_USED: &str = "heapUsed";
    pub const HEAP_SPACE: &str = "heapSpace";
    pub const COMMITTED_SIZE: &str = "committedSize";

    // Allocation
    pub const OBJECT_CLASS: &str = "objectClass";
    pub const ALLOCATION_SIZE: &str = "allocationSize";
    pub const TLAB_SIZE: &str = "tlabSize";

    // Socket I/O
    pub const HOST: &str = "host";
    pub const BYTES_READ: &str = "bytesRead";
    pub const BYTES_WRITTEN: &str = "bytesWritten";

    // CPU
    pub const JVM_USER: &str = "jvmUser";
    pub const JVM_SYSTEM: &str = "jvmSystem";
    pub const MACHINE_TOTAL: &str = "machineTotal";
    pub const USER: &str = "user";
    pub const SYSTEM: &str = "system";
    pub const SWITCH_RATE: &str = "switchRate";

    // jdk.CompilerStatistics
    pub const COMPILE_COUNT: &str = "compileCount";
    pub const BAILOUT_COUNT: &str = "bailoutCount";
    pub const INVALIDATED_COUNT: &str = "invalidatedCount";
    pub const OSR_COMPILE_COUNT: &str = "osrCompileCount";
    pub const STANDARD_COMPILE_COUNT: &str = "standardCompileCount";
    pub const OSR_BYTES_COMPILED: &str = "osrBytesCompiled";
    pub const STANDARD_BYTES_COMPILED: &str = "standardBytesCompiled";
    pub const NMETHODS_SIZE: &str = "nmethodsSize";
    pub const NMETHOD_CODE_SIZE: &str = "nmethodCodeSize";
    pub const PEAK_TIME_SPENT: &str = "peakTimeSpent";
    pub const TOTAL_TIME_SPENT: &str = "totalTimeSpent";

    // jdk.ContainerConfiguration
    pub const CONTAINER_TYPE: &str = "containerType";
    pub const EFFECTIVE_CPU_COUNT: &str = "effectiveCpuCount";
    pub const MEMORY_LIMIT: &str = "memoryLimit";

    // Method sampling
    pub const SAMPLED_THREAD: &str = "sampledThread";
    pub const STATE: &str = "state";
}

/// A thread reference as emitted by the recorder.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ThreadRef {
    pub os_thread_id: i64,
    #[serde(default)]
    pub os_name: Option<String>,
    #[serde(default)]
    pub java_name: Option<String>,
    #[serde(default)]
    pub java_thread_id: Option<i64>,
}

impl ThreadRef {
    /// Creates a reference to a named Java thread.
    pub fn java(os_thread_id: i64, java_name: &str) -> Self {
        Self {
            os_thread_id,
            os_name: None,
            java_name: Some(java_name.to_string()),
            java_thread_id: None,
        }
    }

    /// Raw name used for grouping: the Java name, falling back to the OS name.
    pub fn name(&self) -> Option<&str> {
        self.java_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or_else(|| self.os_name.as_deref().filter(|n| !n.is_empty()))
    }
}

/// A typed field value.
///
/// `Null` is accepted on the wire and reads as an absent field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Boolean(bool),
    Long(i64),
    Double(f64),
    String(String),
    Thread(ThreadRef),
    Record(RecordedObject),
}

/// A set of named fields. Used for an event's top level and for nested records.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct RecordedObject {
    fields: BTreeMap<String, FieldValue>,
}

impl RecordedObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, value: FieldValue) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: FieldValue) {
        self.fields.insert(name.to_string(), value);
    }

    /// Returns the value for `name`, treating `Null` as absent.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        match self.fields.get(name) {
            None | Some(FieldValue::Null) => None,
            Some(v) => Some(v),
        }
    }

    /// Integer field. Doubles are not coerced.
    pub fn long(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            FieldValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Floating point field. Integers are widened.
    pub fn double(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            FieldValue::Double(v) => Some(*v),
            FieldValue::Long(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            FieldValue::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn record(&self, name: &str) -> Option<&RecordedObject> {
        match self.get(name)? {
            FieldValue::Record(v) => Some(v),
            _ => None,
        }
    }

    pub fn thread(&self, name: &str) -> Option<&ThreadRef> {
        match self.get(name)? {
            FieldValue::Thread(v) => Some(v),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Method identity of a stack frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Method {
    #[serde(rename = "type")]
    pub type_name: String,
    pub name: String,
    #[serde(default)]
    pub descriptor: String,
}

/// A single stack frame, innermost first in [`StackTrace::frames`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    #[serde(default)]
    pub method: Option<Method>,
    #[serde(default)]
    pub line_number: Option<i32>,
    #[serde(default)]
    pub bytecode_index: Option<i32>,
}

impl Frame {
    pub fn new(type_name: &str, name: &str, descriptor: &str) -> Self {
        Self {
            method: Some(Method {
                type_name: type_name.to_string(),
                name: name.to_string(),
                descriptor: descriptor.to_string(),
            }),
            line_number: None,
            bytecode_index: None,
        }
    }

    /// Appends `Type.name(descriptor)` to `out`, or `[missing]` without a method.
    pub fn describe_into(&self, out: &mut String) {
        match &self.method {
            Some(m) => {
                out.reserve(m.type_name.len() + m.name.len() + m.descriptor.len() + 1);
                out.push_str(&m.type_name);
                out.push('.');
                out.push_str(&m.name);
                out.push_str(&m.descriptor);
            }
            None => out.push_str("[missing]"),
        }
    }
}

/// Stack trace attached to sampling and I/O events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StackTrace {
    #[serde(default)]
    pub frames: Vec<Frame>,
    #[serde(default)]
    pub truncated: bool,
}

/// One immutable event from the recorder stream.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    /// Recorder type name, e.g. `jdk.GCHeapSummary`.
    pub type_name: String,
    /// Start time in nanoseconds since the Unix epoch.
    pub start_time_ns: i64,
    pub duration: Option<Duration>,
    /// The thread that emitted the event (`eventThread`).
    pub thread: Option<ThreadRef>,
    pub stack_trace: Option<StackTrace>,
    pub fields: RecordedObject,
}

impl RecordedEvent {
    pub fn new(type_name: &str, start_time_ns: i64) -> Self {
        Self {
            type_name: type_name.to_string(),
            start_time_ns,
            duration: None,
            thread: None,
            stack_trace: None,
            fields: RecordedObject::new(),
        }
    }

    /// Creates an event for a known kind.
    pub fn of(kind: EventKind, start_time_ns: i64) -> Self {
        Self::new(kind.as_str(), start_time_ns)
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_thread(mut self, thread: ThreadRef) -> Self {
        self.thread = Some(thread);
        self
    }

    pub fn with_stack_trace(mut self, trace: StackTrace) -> Self {
        self.stack_trace = Some(trace);
        self
    }

    pub fn with_field(mut self, name: &str, value: FieldValue) -> Self {
        self.fields.insert(name, value);
        self
    }

    /// The kind for this event's type name, if it is a supported one.
    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_name(&self.type_name)
    }

    pub fn long(&self, name: &str) -> Option<i64> {
        self.fields.long(name)
    }

    pub fn double(&self, name: &str) -> Option<f64> {
        self.fields.double(name)
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        self.fields.string(name)
    }

    pub fn record(&self, name: &str) -> Option<&RecordedObject> {
        self.fields.record(name)
    }

    pub fn thread_field(&self, name: &str) -> Option<&ThreadRef> {
        self.fields.thread(name)
    }
}
