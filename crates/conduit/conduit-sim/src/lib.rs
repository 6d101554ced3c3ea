//! Process and channel lifecycle for the IPC simulator.
//!
//! [`IpcSimulator`] is the entry point: it creates channels, spawns worker
//! roles on their own threads, tracks them in a [`ProcessRegistry`] and
//! records lifecycle events in the shared [`TraceLog`](conduit_trace::TraceLog).

mod cancel;
mod error;
mod id;
mod registry;
mod simulator;
mod state;
mod worker;

pub use cancel::{CancelToken, Canceller, cancel_pair};
pub use error::SimError;
pub use id::{IdAllocator, ProcessId};
pub use registry::{ProcessHandle, ProcessInfo, ProcessRegistry};
pub use simulator::{IpcSimulator, SimOptions, StopOutcome};
pub use state::{SharedState, WorkerState};
pub use worker::{Role, WorkerExit, WorkerSpec};
