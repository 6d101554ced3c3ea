//! Trace event model.
//!
//! A [`TraceEvent`] is the immutable record of one observed IPC action. The
//! payload of each event type is a variant of [`EventKind`] with typed
//! fields; anything the current taxonomy does not know about is carried in
//! [`EventKind::Other`] so older tools can still load newer traces.
//!
//! # Wire format
//!
//! Events serialize as flat records with the field order
//! `time`, `type`, `label`, `meta`:
//!
//! ```text
//! {"time": 1718000000.25, "type": "pipe_message", "label": "pipe_receiver_1",
//!  "meta": {"payload": "p0-3", "rcv_ts": 1718000000.25, "sent_ts": 1718000000.21}}
//! ```

use crate::clock::now_secs;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const PROCESS_START: &str = "process_start";
pub const PROCESS_STOP: &str = "process_stop";
pub const PIPE_MESSAGE: &str = "pipe_message";
pub const QUEUE_PUT: &str = "queue_put";
pub const QUEUE_GET: &str = "queue_get";
pub const SHM_WRITE: &str = "shm_write";
pub const SHM_READ: &str = "shm_read";
pub const SHM_ERROR: &str = "shm_error";

/// Typed payload of a trace event, one variant per event type.
#[derive(Clone, Debug, PartialEq)]
pub enum EventKind {
    ProcessStart,
    ProcessStop,
    /// Delivered over a pipe. Timestamps are wall clock seconds.
    PipeMessage {
        payload: String,
        sent_ts: f64,
        rcv_ts: f64,
    },
    QueuePut {
        payload: String,
        ts: f64,
    },
    QueueGet {
        payload: String,
        sent_ts: f64,
        rcv_ts: f64,
    },
    ShmWrite {
        payload: String,
    },
    /// Segment contents as observed, trailing padding stripped.
    ShmRead {
        payload: String,
    },
    ShmError {
        error: String,
    },
    /// Event type unknown to this build, kept verbatim.
    Other {
        type_name: String,
        meta: Map<String, Value>,
    },
}

impl EventKind {
    /// The `type` tag written on the wire.
    pub fn type_name(&self) -> &str {
        match self {
            EventKind::ProcessStart => PROCESS_START,
            EventKind::ProcessStop => PROCESS_STOP,
            EventKind::PipeMessage { .. } => PIPE_MESSAGE,
            EventKind::QueuePut { .. } => QUEUE_PUT,
            EventKind::QueueGet { .. } => QUEUE_GET,
            EventKind::ShmWrite { .. } => SHM_WRITE,
            EventKind::ShmRead { .. } => SHM_READ,
            EventKind::ShmError { .. } => SHM_ERROR,
            EventKind::Other { type_name, .. } => type_name,
        }
    }

    /// True for events that represent a message moving through a channel.
    pub fn is_message(&self) -> bool {
        matches!(
            self,
            EventKind::PipeMessage { .. }
                | EventKind::QueuePut { .. }
                | EventKind::QueueGet { .. }
                | EventKind::ShmWrite { .. }
                | EventKind::ShmRead { .. }
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "TraceRecord", try_from = "TraceRecord")]
pub struct TraceEvent {
    pub timestamp: f64,
    /// Id of the emitting worker, if any.
    pub label: Option<String>,
    pub kind: EventKind,
}

impl TraceEvent {
    pub fn new(timestamp: f64, label: Option<String>, kind: EventKind) -> Self {
        Self {
            timestamp,
            label,
            kind,
        }
    }

    /// Stamps `kind` with the current wall clock.
    pub fn now(label: impl Into<String>, kind: EventKind) -> Self {
        Self::new(now_secs(), Some(label.into()), kind)
    }

    pub fn type_name(&self) -> &str {
        self.kind.type_name()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid meta for `{type_name}` event")]
pub struct MetaError {
    type_name: String,
    #[source]
    source: serde_json::Error,
}

#[derive(Serialize, Deserialize)]
struct TraceRecord {
    time: f64,
    #[serde(rename = "type")]
    type_name: String,
    label: Option<String>,
    #[serde(default)]
    meta: Map<String, Value>,
}

#[derive(Deserialize)]
struct PayloadMeta {
    payload: String,
}

#[derive(Deserialize)]
struct TransitMeta {
    payload: String,
    sent_ts: f64,
    rcv_ts: f64,
}

#[derive(Deserialize)]
struct PutMeta {
    payload: String,
    ts: f64,
}

#[derive(Deserialize)]
struct ErrorMeta {
    error: String,
}

fn meta<const N: usize>(fields: [(&str, Value); N]) -> Map<String, Value> {
    fields
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

impl From<TraceEvent> for TraceRecord {
    fn from(event: TraceEvent) -> Self {
        let type_name = event.type_name().to_string();
        let meta = match event.kind {
            EventKind::ProcessStart | EventKind::ProcessStop => Map::new(),
            EventKind::PipeMessage {
                payload,
                sent_ts,
                rcv_ts,
            }
            | EventKind::QueueGet {
                payload,
                sent_ts,
                rcv_ts,
            } => meta([
                ("payload", payload.into()),
                ("sent_ts", sent_ts.into()),
                ("rcv_ts", rcv_ts.into()),
            ]),
            EventKind::QueuePut { payload, ts } => {
                meta([("payload", payload.into()), ("ts", ts.into())])
            }
            EventKind::ShmWrite { payload } | EventKind::ShmRead { payload } => {
                meta([("payload", payload.into())])
            }
            EventKind::ShmError { error } => meta([("error", error.into())]),
            EventKind::Other { meta, .. } => meta,
        };
        TraceRecord {
            time: event.timestamp,
            type_name,
            label: event.label,
            meta,
        }
    }
}

impl TryFrom<TraceRecord> for TraceEvent {
    type Error = MetaError;

    fn try_from(record: TraceRecord) -> Result<Self, Self::Error> {
        fn parse<T: DeserializeOwned>(
            type_name: &str,
            meta: &Map<String, Value>,
        ) -> Result<T, MetaError> {
            serde_json::from_value(Value::Object(meta.clone())).map_err(|source| MetaError {
                type_name: type_name.to_string(),
                source,
            })
        }

        let TraceRecord {
            time,
            type_name,
            label,
            meta,
        } = record;

        let kind = match type_name.as_str() {
            PROCESS_START => EventKind::ProcessStart,
            PROCESS_STOP => EventKind::ProcessStop,
            PIPE_MESSAGE => {
                let m: TransitMeta = parse(&type_name, &meta)?;
                EventKind::PipeMessage {
                    payload: m.payload,
                    sent_ts: m.sent_ts,
                    rcv_ts: m.rcv_ts,
                }
            }
            QUEUE_GET => {
                let m: TransitMeta = parse(&type_name, &meta)?;
                EventKind::QueueGet {
                    payload: m.payload,
                    sent_ts: m.sent_ts,
                    rcv_ts: m.rcv_ts,
                }
            }
            QUEUE_PUT => {
                let m: PutMeta = parse(&type_name, &meta)?;
                EventKind::QueuePut {
                    payload: m.payload,
                    ts: m.ts,
                }
            }
            SHM_WRITE => EventKind::ShmWrite {
                payload: parse::<PayloadMeta>(&type_name, &meta)?.payload,
            },
            SHM_READ => EventKind::ShmRead {
                payload: parse::<PayloadMeta>(&type_name, &meta)?.payload,
            },
            SHM_ERROR => EventKind::ShmError {
                error: parse::<ErrorMeta>(&type_name, &meta)?.error,
            },
            _ => EventKind::Other { type_name, meta },
        };

        Ok(TraceEvent {
            timestamp: time,
            label,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_fields_are_written_in_order() {
        let ev = TraceEvent::new(
            12.5,
            Some("queue_sender_1".into()),
            EventKind::QueuePut {
                payload: "q0-0".into(),
                ts: 12.25,
            },
        );
        let json = serde_json::to_string(&ev).unwrap();
        assert_eq!(
            json,
            r#"{"time":12.5,"type":"queue_put","label":"queue_sender_1","meta":{"payload":"q0-0","ts":12.25}}"#
        );
    }

    #[test]
    fn lifecycle_events_carry_empty_meta() {
        let ev = TraceEvent::new(1.0, Some("p".into()), EventKind::ProcessStop);
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "process_stop");
        assert!(v["meta"].as_object().unwrap().is_empty());
    }

    #[test]
    fn unknown_types_are_kept_verbatim() {
        let raw = r#"{"time":3.0,"type":"sem_wait","label":null,"meta":{"sem":"s1"}}"#;
        let ev: TraceEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(ev.type_name(), "sem_wait");
        assert!(!ev.kind.is_message());
        assert_eq!(serde_json::to_string(&ev).unwrap(), raw);
    }

    #[test]
    fn missing_meta_fields_are_rejected() {
        let raw = r#"{"time":3.0,"type":"pipe_message","label":"r","meta":{"payload":"x"}}"#;
        let err = serde_json::from_str::<TraceEvent>(raw).unwrap_err();
        assert!(err.to_string().contains("pipe_message"));
    }

    #[test]
    fn missing_meta_defaults_to_empty() {
        let raw = r#"{"time":3.0,"type":"process_start","label":"w"}"#;
        let ev: TraceEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(ev.kind, EventKind::ProcessStart);
    }
}
