//! Anomaly detection over trace snapshots.
//!
//! Every function here is pure: it reads a slice of events plus whatever
//! context it needs (registered process count, the current time) and returns
//! findings. Nothing is cached between calls, so the same inputs always
//! produce the same alerts in the same order.

pub mod alert;
pub mod detectors;
pub mod throughput;

pub use alert::{Alert, Severity};
pub use detectors::{
    DetectorConfig, detect_deadlock, detect_pipe_latency, detect_queue_backlog, run_all_detectors,
};
pub use throughput::throughput;
