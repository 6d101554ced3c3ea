use crate::event::TraceEvent;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to encode or decode trace")]
    Json(#[from] serde_json::Error),

    #[error("failed to access trace file '{path}'")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Writes `events` as a pretty-printed JSON array, one record per event.
pub fn export_json<W: Write>(events: &[TraceEvent], writer: W) -> Result<(), ExportError> {
    serde_json::to_writer_pretty(writer, events)?;
    Ok(())
}

pub fn export_json_string(events: &[TraceEvent]) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(events)?)
}

pub fn export_to_path(events: &[TraceEvent], path: impl AsRef<Path>) -> Result<(), ExportError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|source| ExportError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut out = BufWriter::new(file);
    export_json(events, &mut out)?;
    out.flush().map_err(|source| ExportError::Io {
        path: path.display().to_string(),
        source,
    })
}

pub fn import_json<R: Read>(reader: R) -> Result<Vec<TraceEvent>, ExportError> {
    Ok(serde_json::from_reader(BufReader::new(reader))?)
}

pub fn import_json_str(s: &str) -> Result<Vec<TraceEvent>, ExportError> {
    Ok(serde_json::from_str(s)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    #[test]
    fn export_then_import_yields_same_events() {
        let events = vec![
            TraceEvent::new(1718000000.125, Some("pipe_sender_1".into()), EventKind::ProcessStart),
            TraceEvent::new(
                1718000000.3310022,
                Some("pipe_receiver_1".into()),
                EventKind::PipeMessage {
                    payload: "p0-0".into(),
                    sent_ts: 1718000000.1290417,
                    rcv_ts: 1718000000.3309981,
                },
            ),
            TraceEvent::new(
                1718000001.0,
                Some("shm_reader_1_0".into()),
                EventKind::ShmRead {
                    payload: String::new(),
                },
            ),
            TraceEvent::new(1718000002.0, None, EventKind::ProcessStop),
        ];

        let text = export_json_string(&events).unwrap();
        let back = import_json_str(&text).unwrap();
        assert_eq!(back, events);
    }

    #[test]
    fn export_is_a_json_array() {
        let mut buf = Vec::new();
        export_json(&[], &mut buf).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert!(v.as_array().unwrap().is_empty());
    }
}
