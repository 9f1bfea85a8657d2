//! Event parsing for JSON-lines recorder output.
//!
//! Each line holds one event object. Decoding goes through [`WireEvent`]
//! so the public [`RecordedEvent`] can keep `Duration` and typed fields.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use super::{RecordedEvent, RecordedObject, StackTrace, ThreadRef};

/// Errors that can occur during event parsing.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("invalid event json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("event has an empty type name")]
    EmptyTypeName,

    #[error("{type_name}: negative duration {duration_ns}ns")]
    NegativeDuration { type_name: String, duration_ns: i64 },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEvent {
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    start_time: i64,
    #[serde(default)]
    duration: Option<i64>,
    #[serde(default)]
    event_thread: Option<ThreadRef>,
    #[serde(default)]
    stack_trace: Option<StackTrace>,
    #[serde(default)]
    fields: RecordedObject,
}

/// Parse one JSON line into a [`RecordedEvent`].
///
/// Type names are not validated against the supported set; unknown kinds
/// are ignored later at dispatch.
pub fn parse_event(line: &str) -> Result<RecordedEvent, ParseError> {
    let wire: WireEvent = serde_json::from_str(line)?;

    if wire.type_name.is_empty() {
        return Err(ParseError::EmptyTypeName);
    }

    let duration = match wire.duration {
        Some(ns) if ns < 0 => {
            return Err(ParseError::NegativeDuration {
                type_name: wire.type_name,
                duration_ns: ns,
            })
        }
        Some(ns) => Some(Duration::from_nanos(ns as u64)),
        None => None,
    };

    Ok(RecordedEvent {
        type_name: wire.type_name,
        start_time_ns: wire.start_time,
        duration,
        thread: wire.event_thread,
        stack_trace: wire.stack_trace,
        fields: wire.fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{fields, EventKind, FieldValue};

    #[test]
    fn test_parse_socket_write() {
        let line = r#"{"type":"jdk.SocketWrite","startTime":1700000000000000000,"duration":87400000,
            "eventThread":{"osThreadId":41,"javaName":"pool-3-thread-7","javaThreadId":252},
            "stackTrace":{"frames":[{"method":{"type":"java.net.SocketOutputStream","name":"socketWrite","descriptor":"([BII)V"},"lineNumber":68,"bytecodeIndex":12}],"truncated":false},
            "fields":{"bytesWritten":34,"host":"db"}}"#;

        let ev = parse_event(line).expect("parse");
        assert_eq!(ev.kind(), Some(EventKind::SocketWrite));
        assert_eq!(ev.start_time_ns, 1_700_000_000_000_000_000);
        assert_eq!(ev.duration, Some(Duration::from_nanos(87_400_000)));
        assert_eq!(ev.long(fields::BYTES_WRITTEN), Some(34));
        assert_eq!(ev.string(fields::HOST), Some("db"));

        let thread = ev.thread.as_ref().expect("thread");
        assert_eq!(thread.os_thread_id, 41);
        assert_eq!(thread.name(), Some("pool-3-thread-7"));
        assert_eq!(thread.java_thread_id, Some(252));

        let trace = ev.stack_trace.as_ref().expect("stack trace");
        assert_eq!(trace.frames.len(), 1);
        assert_eq!(trace.frames[0].line_number, Some(68));
        assert!(!trace.truncated);
    }

    #[test]
    fn test_parse_nested_record_and_thread_field() {
        let line = r#"{"type":"jdk.ExecutionSample","startTime":5,
            "fields":{"sampledThread":{"osThreadId":9,"osName":"worker-1"},
                      "heapSpace":{"committedSize":2048,"reservedSize":4096},
                      "state":"STATE_RUNNABLE","missing":null}}"#;

        let ev = parse_event(line).expect("parse");
        let sampled = ev.thread_field(fields::SAMPLED_THREAD).expect("sampled thread");
        assert_eq!(sampled.name(), Some("worker-1"));

        // Extra keys make it a record, not a thread reference.
        let heap = ev.record(fields::HEAP_SPACE).expect("record");
        assert_eq!(heap.long(fields::COMMITTED_SIZE), Some(2048));
        assert!(ev.thread_field(fields::HEAP_SPACE).is_none());

        assert_eq!(ev.fields.get("missing"), None);
        assert_eq!(ev.duration, None);
        assert!(ev.thread.is_none());
    }

    #[test]
    fn test_parse_double_and_bool_fields() {
        let line = r#"{"type":"jdk.CPULoad","startTime":1,"fields":{"jvmUser":0.25,"machineTotal":1,"flag":true}}"#;
        let ev = parse_event(line).expect("parse");
        assert_eq!(ev.double(fields::JVM_USER), Some(0.25));
        assert_eq!(ev.double(fields::MACHINE_TOTAL), Some(1.0));
        assert_eq!(ev.fields.get("flag"), Some(&FieldValue::Boolean(true)));
    }

    #[test]
    fn test_parse_unknown_type_is_not_an_error() {
        let ev = parse_event(r#"{"type":"jdk.ClassLoad","startTime":3}"#).expect("parse");
        assert_eq!(ev.kind(), None);
        assert!(ev.fields.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_event("not json"), Err(ParseError::Json(_))));
        assert!(matches!(parse_event(r#"{"startTime":1}"#), Err(ParseError::Json(_))));
        assert!(matches!(
            parse_event(r#"{"type":"","startTime":1}"#),
            Err(ParseError::EmptyTypeName)
        ));
        assert!(matches!(
            parse_event(r#"{"type":"jdk.G1GarbageCollection","startTime":1,"duration":-4}"#),
            Err(ParseError::NegativeDuration { duration_ns: -4, .. })
        ));
    }
}
