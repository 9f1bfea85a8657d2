//! Handlers that publish the latest value of periodic statistics events.

use std::time::Duration;

use super::{RecordedEventHandler, ONE_SECOND};
use crate::event::{fields, EventKind, RecordedEvent};
use crate::metrics::{Meter, MetricsError, ObservedValue, Unit};

/// One event field exported as a gauge.
struct GaugeSpec {
    field: &'static str,
    metric: &'static str,
    description: &'static str,
    unit: Unit,
}

const fn gauge(
    field: &'static str,
    metric: &'static str,
    description: &'static str,
    unit: Unit,
) -> GaugeSpec {
    GaugeSpec {
        field,
        metric,
        description,
        unit,
    }
}

const COMPILER_STATISTICS: &[GaugeSpec] = &[
    gauge(fields::COMPILE_COUNT, "runtime.jvm.compiler.compile_count", "Compilations", Unit::Count),
    gauge(fields::BAILOUT_COUNT, "runtime.jvm.compiler.bailout_count", "Bailouts", Unit::Count),
    gauge(
        fields::INVALIDATED_COUNT,
        "runtime.jvm.compiler.invalidated_count",
        "Invalidated compilations",
        Unit::Count,
    ),
    gauge(
        fields::OSR_COMPILE_COUNT,
        "runtime.jvm.compiler.osr_compile_count",
        "On-stack replacement compilations",
        Unit::Count,
    ),
    gauge(
        fields::STANDARD_COMPILE_COUNT,
        "runtime.jvm.compiler.standard_compile_count",
        "Standard compilations",
        Unit::Count,
    ),
    gauge(
        fields::OSR_BYTES_COMPILED,
        "runtime.jvm.compiler.osr_compiled",
        "Bytecode compiled by on-stack replacement",
        Unit::Bytes,
    ),
    gauge(
        fields::STANDARD_BYTES_COMPILED,
        "runtime.jvm.compiler.standard_compiled",
        "Bytecode compiled by standard compilations",
        Unit::Bytes,
    ),
    gauge(
        fields::NMETHODS_SIZE,
        "runtime.jvm.compiler.nmethods_size",
        "Size of compiled methods",
        Unit::Bytes,
    ),
    gauge(
        fields::NMETHOD_CODE_SIZE,
        "runtime.jvm.compiler.nmethod_code_size",
        "Code size of compiled methods",
        Unit::Bytes,
    ),
    gauge(
        fields::PEAK_TIME_SPENT,
        "runtime.jvm.compiler.peak_time",
        "Longest single compilation",
        Unit::Milliseconds,
    ),
    gauge(
        fields::TOTAL_TIME_SPENT,
        "runtime.jvm.compiler.total_time",
        "Time spent compiling",
        Unit::Milliseconds,
    ),
];

const CONTAINER_CONFIGURATION: &[GaugeSpec] = &[
    gauge(
        fields::EFFECTIVE_CPU_COUNT,
        "runtime.jvm.container.cpu.effective",
        "CPUs available to the container",
        Unit::Count,
    ),
    gauge(
        fields::MEMORY_LIMIT,
        "runtime.jvm.container.memory.limit",
        "Container memory limit",
        Unit::Bytes,
    ),
];

/// Publishes the most recent value of each configured field.
///
/// Values are handed to the export reader through [`ObservedValue`]s; a
/// field missing from an event leaves its gauge at the previous value.
pub struct GaugeHandler {
    kind: EventKind,
    polling: Option<Duration>,
    specs: &'static [GaugeSpec],
    values: Vec<ObservedValue>,
}

impl GaugeHandler {
    /// JIT compiler counters from `jdk.CompilerStatistics`.
    pub fn compiler_statistics() -> Self {
        Self::new(EventKind::CompilerStatistics, COMPILER_STATISTICS, Some(ONE_SECOND))
    }

    /// Container limits from `jdk.ContainerConfiguration`.
    pub fn container_configuration() -> Self {
        Self::new(EventKind::ContainerConfiguration, CONTAINER_CONFIGURATION, None)
    }

    fn new(kind: EventKind, specs: &'static [GaugeSpec], polling: Option<Duration>) -> Self {
        Self {
            kind,
            polling,
            specs,
            values: specs.iter().map(|_| ObservedValue::new()).collect(),
        }
    }
}

impl RecordedEventHandler for GaugeHandler {
    fn event_kind(&self) -> EventKind {
        self.kind
    }

    fn init(&mut self, meter: &Meter) -> Result<(), MetricsError> {
        for (spec, value) in self.specs.iter().zip(&self.values) {
            let reader = value.clone();
            meter
                .up_down_counter(spec.metric)
                .description(spec.description)
                .unit(spec.unit)
                .build_with_callback(move || reader.get())?;
        }
        Ok(())
    }

    fn accept(&mut self, event: &RecordedEvent) {
        for (spec, value) in self.specs.iter().zip(&self.values) {
            if let Some(v) = event.double(spec.field) {
                value.set(v);
            }
        }
    }

    fn polling_interval(&self) -> Option<Duration> {
        self.polling
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use prometheus::Registry;

    use crate::event::FieldValue;

    fn gauge_value(meter: &Meter, name: &str) -> Option<f64> {
        meter
            .registry()
            .gather()
            .iter()
            .find(|f| f.get_name() == name)
            .map(|f| f.get_metric()[0].get_gauge().get_value())
    }

    #[test]
    fn test_compiler_statistics() {
        let meter = Meter::new(Registry::new());
        let mut h = GaugeHandler::compiler_statistics();
        h.init(&meter).expect("init");
        assert_eq!(meter.instrument_count(), COMPILER_STATISTICS.len());

        h.accept(
            &RecordedEvent::of(EventKind::CompilerStatistics, 1)
                .with_field(fields::COMPILE_COUNT, FieldValue::Long(812))
                .with_field(fields::NMETHODS_SIZE, FieldValue::Long(1 << 20))
                .with_field(fields::PEAK_TIME_SPENT, FieldValue::Long(43)),
        );
        h.accept(
            &RecordedEvent::of(EventKind::CompilerStatistics, 2)
                .with_field(fields::COMPILE_COUNT, FieldValue::Long(900)),
        );

        assert_eq!(
            gauge_value(&meter, "runtime_jvm_compiler_compile_count"),
            Some(900.0)
        );
        assert_eq!(
            gauge_value(&meter, "runtime_jvm_compiler_nmethods_size_bytes"),
            Some(1_048_576.0)
        );
        assert_eq!(
            gauge_value(&meter, "runtime_jvm_compiler_peak_time_milliseconds"),
            Some(43.0)
        );
        assert_eq!(
            gauge_value(&meter, "runtime_jvm_compiler_bailout_count"),
            Some(0.0)
        );
        assert_eq!(h.polling_interval(), Some(ONE_SECOND));
    }

    #[test]
    fn test_container_configuration() {
        let meter = Meter::new(Registry::new());
        let mut h = GaugeHandler::container_configuration();
        h.init(&meter).expect("init");

        h.accept(
            &RecordedEvent::of(EventKind::ContainerConfiguration, 1)
                .with_field(fields::CONTAINER_TYPE, FieldValue::String("cgroupv2".to_string()))
                .with_field(fields::EFFECTIVE_CPU_COUNT, FieldValue::Long(4))
                .with_field(fields::MEMORY_LIMIT, FieldValue::Long(-1)),
        );

        assert_eq!(
            gauge_value(&meter, "runtime_jvm_container_cpu_effective"),
            Some(4.0)
        );
        assert_eq!(
            gauge_value(&meter, "runtime_jvm_container_memory_limit_bytes"),
            Some(-1.0)
        );
        assert_eq!(h.polling_interval(), None);
    }
}
