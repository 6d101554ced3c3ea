pub mod clock;
pub mod event;
pub mod export;
pub mod log;

pub use clock::now_secs;
pub use event::{EventKind, MetaError, TraceEvent};
pub use export::{ExportError, export_json, export_json_string, export_to_path, import_json, import_json_str};
pub use log::TraceLog;
