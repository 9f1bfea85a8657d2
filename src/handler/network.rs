use super::thread::GroupHandlerFactory;
use super::{RecordedEventHandler, THREAD_NAME};
use crate::event::{fields, EventKind, RecordedEvent};
use crate::metrics::{BoundHistogram, Meter, MetricsError, Unit};

/// Names for one socket direction.
#[derive(Clone, Copy)]
struct SocketIo {
    kind: EventKind,
    bytes_field: &'static str,
    bytes_metric: &'static str,
    bytes_description: &'static str,
    duration_metric: &'static str,
    duration_description: &'static str,
}

const READ: SocketIo = SocketIo {
    kind: EventKind::SocketRead,
    bytes_field: fields::BYTES_READ,
    bytes_metric: "jfr.SocketRead.bytesRead",
    bytes_description: "Bytes Read",
    duration_metric: "jfr.SocketRead.duration",
    duration_description: "Read Duration",
};

const WRITE: SocketIo = SocketIo {
    kind: EventKind::SocketWrite,
    bytes_field: fields::BYTES_WRITTEN,
    bytes_metric: "jfr.SocketWrite.bytesWritten",
    bytes_description: "Bytes Written",
    duration_metric: "jfr.SocketWrite.duration",
    duration_description: "Write Duration",
};

/// Builds per-group socket I/O handlers.
pub struct NetworkFactory {
    io: SocketIo,
}

impl NetworkFactory {
    pub fn read() -> Self {
        Self { io: READ }
    }

    pub fn write() -> Self {
        Self { io: WRITE }
    }
}

impl GroupHandlerFactory for NetworkFactory {
    fn event_kind(&self) -> EventKind {
        self.io.kind
    }

    fn create(&self, group: &str) -> Option<Box<dyn RecordedEventHandler>> {
        Some(Box::new(NetworkHandler {
            io: self.io,
            group: group.to_string(),
            bytes: None,
            duration: None,
        }))
    }
}

struct NetworkHandler {
    io: SocketIo,
    group: String,
    bytes: Option<BoundHistogram>,
    duration: Option<BoundHistogram>,
}

impl RecordedEventHandler for NetworkHandler {
    fn event_kind(&self) -> EventKind {
        self.io.kind
    }

    fn init(&mut self, meter: &Meter) -> Result<(), MetricsError> {
        let bytes = meter
            .histogram(self.io.bytes_metric)
            .description(self.io.bytes_description)
            .unit(Unit::Bytes)
            .attribute_keys(&[THREAD_NAME])
            .build()?;
        let duration = meter
            .histogram(self.io.duration_metric)
            .description(self.io.duration_description)
            .unit(Unit::Milliseconds)
            .attribute_keys(&[THREAD_NAME])
            .build()?;

        self.bytes = Some(bytes.bind(&[self.group.as_str()])?);
        self.duration = Some(duration.bind(&[self.group.as_str()])?);
        Ok(())
    }

    fn accept(&mut self, event: &RecordedEvent) {
        if let (Some(h), Some(n)) = (&self.bytes, event.long(self.io.bytes_field)) {
            h.record(n as f64);
        }
        if let (Some(h), Some(d)) = (&self.duration, event.duration) {
            h.record(d.as_secs_f64() * 1_000.0);
        }
    }
}
