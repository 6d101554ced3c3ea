use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a worker.
///
/// ```text
///   Running ──stop requested──▶ Cancelling ──exited / forced──▶ Stopped
///      └───────────────── exited on its own ───────────────────────▲
/// ```
///
/// Stopped is terminal; the trace log refuses events from a stopped worker.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Running = 0,
    Cancelling = 1,
    Stopped = 2,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => WorkerState::Running,
            1 => WorkerState::Cancelling,
            _ => WorkerState::Stopped,
        }
    }
}

/// State cell shared by a worker thread, its handle and the trace gate.
#[derive(Clone, Debug)]
pub struct SharedState(Arc<AtomicU8>);

impl Default for SharedState {
    fn default() -> Self {
        Self(Arc::new(AtomicU8::new(WorkerState::Running as u8)))
    }
}

impl SharedState {
    pub fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves to `Stopped` unconditionally.
    pub fn stop(&self) {
        self.0.store(WorkerState::Stopped as u8, Ordering::Release);
    }

    /// Atomically moves `from` to `to`; returns false if the state was not `from`.
    pub fn transition(&self, from: WorkerState, to: WorkerState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
