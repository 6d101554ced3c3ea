use crate::cancel::cancel_pair;
use crate::error::SimError;
use crate::id::{IdAllocator, ProcessId};
use crate::registry::{ProcessHandle, ProcessInfo, ProcessRegistry};
use crate::state::{SharedState, WorkerState};
use crate::worker::{self, TraceSink, WorkerContext, WorkerExit, WorkerSpec};
use conduit_channel::{MessageQueue, PipeEndpoint, SegmentHandle, SegmentStore, SharedSegment};
use conduit_trace::{EventKind, TraceEvent, TraceLog, now_secs};
use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct SimOptions {
    /// Directory backing named shared segments.
    pub segment_dir: PathBuf,
    /// Retained trace events; unbounded when `None`.
    pub trace_capacity: Option<usize>,
    /// How long `stop_process` waits before detaching a worker.
    pub stop_grace: Duration,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            segment_dir: std::env::temp_dir().join("conduit_shm"),
            trace_capacity: None,
            stop_grace: Duration::from_secs(1),
        }
    }
}

/// Result of a [`IpcSimulator::stop_process`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    /// Unknown id, or the process had already stopped. Nothing was done.
    NotRunning,
    /// The worker honoured cancellation within the grace period.
    Exited(WorkerExit),
    /// The worker did not exit in time and was detached.
    Forced,
}

/// Marks the worker stopped and signals completion when its thread ends,
/// including by panic.
struct ExitGuard {
    state: SharedState,
    _done: Sender<()>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.state.stop();
    }
}

pub struct IpcSimulator {
    log: TraceLog,
    registry: Mutex<ProcessRegistry>,
    store: SegmentStore,
    /// Creator mappings, keyed by segment name.
    segments: Mutex<HashMap<String, SharedSegment>>,
    queues: Mutex<Vec<MessageQueue>>,
    ids: IdAllocator,
    stop_grace: Duration,
    shut_down: AtomicBool,
}

impl IpcSimulator {
    pub fn new(options: SimOptions) -> Result<Self, SimError> {
        let store = SegmentStore::open(&options.segment_dir).map_err(SimError::SegmentStore)?;
        Ok(Self {
            log: TraceLog::with_capacity(options.trace_capacity),
            registry: Mutex::new(ProcessRegistry::default()),
            store,
            segments: Mutex::new(HashMap::new()),
            queues: Mutex::new(Vec::new()),
            ids: IdAllocator::default(),
            stop_grace: options.stop_grace,
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn create_pipe(&self) -> (PipeEndpoint, PipeEndpoint) {
        conduit_channel::pipe()
    }

    /// New queue, torn down by [`shutdown`](Self::shutdown). After shutdown
    /// the queue comes back already closed.
    pub fn create_queue(&self) -> MessageQueue {
        let queue = MessageQueue::new();
        let mut queues = self.lock_queues();
        if self.is_shut_down() {
            queue.close();
        } else {
            queues.push(queue.clone());
        }
        queue
    }

    /// Allocates a segment under a generated name.
    ///
    /// The simulator keeps the creating mapping until the segment is
    /// released; the returned handle is an extra attachment for the caller.
    pub fn create_shared_segment(&self, size: usize) -> Result<(String, SegmentHandle), SimError> {
        self.ensure_running()?;
        let segment = self.store.create(size)?;
        self.adopt_segment(segment)
    }

    pub fn create_named_segment(&self, name: &str, size: usize) -> Result<(String, SegmentHandle), SimError> {
        self.ensure_running()?;
        let segment = self.store.create_named(name, size)?;
        self.adopt_segment(segment)
    }

    /// Registers a freshly created segment, or unlinks it again if the
    /// simulator shut down in the meantime or the caller's attach fails.
    fn adopt_segment(&self, segment: SharedSegment) -> Result<(String, SegmentHandle), SimError> {
        let name = segment.name().to_string();
        let mut segments = self.lock_segments();
        let attached = if self.is_shut_down() {
            Err(SimError::ShutDown)
        } else {
            self.store.attach(&name).map_err(SimError::from)
        };
        match attached {
            Ok(handle) => {
                segments.insert(name.clone(), segment);
                Ok((name, handle))
            }
            Err(e) => {
                drop(segment);
                self.store.unlink(&name)?;
                Err(e)
            }
        }
    }

    /// Stops every process attached to `name`, drops the creator mapping and
    /// unlinks the name so it can be created again.
    pub fn release_segment(&self, name: &str) -> Result<(), SimError> {
        let users = self.lock_registry().using_segment(name);
        for id in users {
            if let Err(e) = self.stop_process(id.as_str()) {
                warn!(process = %id, segment = name, error = %e, "stop failed while releasing segment");
            }
        }
        self.lock_segments().remove(name);
        self.store.unlink(name)?;
        Ok(())
    }

    pub fn segment_names(&self) -> Vec<String> {
        self.lock_segments().keys().cloned().collect()
    }

    pub fn segment_store(&self) -> &SegmentStore {
        &self.store
    }

    /// Next group number for generated process ids.
    pub fn allocate_group(&self) -> u64 {
        self.ids.next_group()
    }

    /// Spawns a worker running `spec` and registers it under `id`.
    ///
    /// The `process_start` event is recorded before the worker takes its
    /// first step, so it precedes every event the worker emits.
    pub fn start_process(&self, id: impl Into<ProcessId>, spec: WorkerSpec) -> Result<ProcessId, SimError> {
        let id = id.into();
        let mut registry = self.lock_registry();
        self.ensure_running()?;
        if registry.contains(id.as_str()) {
            return Err(SimError::DuplicateId(id));
        }

        let role = spec.role();
        let segment = spec.segment().map(str::to_string);
        let state = SharedState::default();
        let (canceller, cancel) = cancel_pair();
        let (done_tx, done_rx) = bounded::<()>(0);
        let (go_tx, go_rx) = bounded::<()>(0);
        let ctx = WorkerContext {
            sink: TraceSink::new(id.to_string(), state.clone(), self.log.clone()),
            cancel,
            store: self.store.clone(),
        };

        let guard = ExitGuard {
            state: state.clone(),
            _done: done_tx,
        };
        let worker_id = id.clone();
        let thread = thread::Builder::new()
            .name(id.to_string())
            .spawn(move || {
                let _guard = guard;
                // Disconnects once the start event is recorded.
                let _ = go_rx.recv();
                let exit = worker::run(spec, &ctx);
                debug!(process = %worker_id, ?exit, "worker exited");
                exit
            })
            .map_err(|source| SimError::Spawn {
                id: id.clone(),
                source,
            })?;

        self.log
            .append(TraceEvent::now(id.as_str(), EventKind::ProcessStart));
        drop(go_tx);

        registry.insert(ProcessHandle {
            id: id.clone(),
            role,
            state,
            started_at: now_secs(),
            segment,
            canceller,
            done: done_rx,
            thread: Some(thread),
        })?;
        info!(process = %id, %role, "process started");
        Ok(id)
    }

    /// Cancels the worker and waits up to the grace period for it to exit,
    /// detaching it if it does not.
    ///
    /// Idempotent: unknown or already stopped ids are a no-op, and
    /// `process_stop` is recorded at most once per process.
    pub fn stop_process(&self, id: &str) -> Result<StopOutcome, SimError> {
        let (pid, state, done, thread) = {
            let mut registry = self.lock_registry();
            let Some(handle) = registry.get_mut(id) else {
                return Ok(StopOutcome::NotRunning);
            };
            if handle.thread.is_none()
                || !handle
                    .state
                    .transition(WorkerState::Running, WorkerState::Cancelling)
            {
                return Ok(StopOutcome::NotRunning);
            }
            handle.canceller.cancel();
            (
                handle.id.clone(),
                handle.state.clone(),
                handle.done.clone(),
                handle.thread.take(),
            )
        };

        let outcome = match done.recv_timeout(self.stop_grace) {
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    process = %pid,
                    grace_ms = self.stop_grace.as_millis() as u64,
                    "worker ignored cancellation, detaching"
                );
                drop(thread);
                Ok(StopOutcome::Forced)
            }
            _ => match thread.map(JoinHandle::join) {
                Some(Ok(exit)) => Ok(StopOutcome::Exited(exit)),
                Some(Err(_)) => Err(SimError::WorkerPanicked(pid.clone())),
                None => Ok(StopOutcome::NotRunning),
            },
        };

        self.log
            .append_with(TraceEvent::now(pid.as_str(), EventKind::ProcessStop), || state.stop());
        info!(process = %pid, "process stopped");
        outcome
    }

    /// Stops every process, tears down queues and unlinks segments.
    ///
    /// A failure on one process does not prevent attempting the rest; all
    /// failures are reported together. Calling it again is a no-op, and
    /// later attempts to start processes or create segments fail with
    /// [`SimError::ShutDown`].
    pub fn shutdown(&self) -> Result<(), SimError> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let ids = self.lock_registry().ids().to_vec();
        let mut failed = Vec::new();
        for id in ids {
            if let Err(e) = self.stop_process(id.as_str()) {
                warn!(process = %id, error = %e, "failed to stop process during shutdown");
                failed.push((id.to_string(), e.to_string()));
            }
        }

        for queue in self.lock_queues().drain(..) {
            queue.close();
        }

        for name in self.segment_names() {
            if let Err(e) = self.release_segment(&name) {
                warn!(segment = %name, error = %e, "failed to release segment during shutdown");
                failed.push((name, e.to_string()));
            }
        }

        info!(failures = failed.len(), "simulator shut down");
        if failed.is_empty() {
            Ok(())
        } else {
            Err(SimError::Shutdown { failed })
        }
    }

    pub fn trace(&self) -> &TraceLog {
        &self.log
    }

    pub fn trace_snapshot(&self) -> Vec<TraceEvent> {
        self.log.snapshot()
    }

    /// Every registered process, including stopped ones, in start order.
    pub fn processes(&self) -> Vec<ProcessInfo> {
        self.lock_registry().infos()
    }

    /// Number of registered processes, stopped ones included.
    pub fn process_count(&self) -> usize {
        self.lock_registry().len()
    }

    pub fn list_active_processes(&self) -> Vec<ProcessInfo> {
        self.lock_registry().active()
    }

    pub fn process(&self, id: &str) -> Option<ProcessInfo> {
        self.lock_registry().get(id).map(ProcessHandle::info)
    }

    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn ensure_running(&self) -> Result<(), SimError> {
        if self.is_shut_down() {
            Err(SimError::ShutDown)
        } else {
            Ok(())
        }
    }

    fn lock_registry(&self) -> MutexGuard<'_, ProcessRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_segments(&self) -> MutexGuard<'_, HashMap<String, SharedSegment>> {
        self.segments.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_queues(&self) -> MutexGuard<'_, Vec<MessageQueue>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for IpcSimulator {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "shutdown on drop reported failures");
        }
    }
}
