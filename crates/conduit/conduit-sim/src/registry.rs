use crate::cancel::Canceller;
use crate::error::SimError;
use crate::id::ProcessId;
use crate::state::{SharedState, WorkerState};
use crate::worker::{Role, WorkerExit};
use crossbeam_channel::Receiver;
use serde::Serialize;
use std::collections::HashMap;
use std::thread::JoinHandle;

/// One spawned worker. Owned by the registry; referenced elsewhere by id.
pub struct ProcessHandle {
    pub(crate) id: ProcessId,
    pub(crate) role: Role,
    pub(crate) state: SharedState,
    pub(crate) started_at: f64,
    pub(crate) segment: Option<String>,
    pub(crate) canceller: Canceller,
    /// Disconnects when the worker thread has finished, even by panic.
    pub(crate) done: Receiver<()>,
    pub(crate) thread: Option<JoinHandle<WorkerExit>>,
}

impl ProcessHandle {
    pub fn id(&self) -> &ProcessId {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> WorkerState {
        self.state.get()
    }

    pub fn info(&self) -> ProcessInfo {
        ProcessInfo {
            id: self.id.clone(),
            role: self.role,
            state: self.state.get(),
            started_at: self.started_at,
            segment: self.segment.clone(),
        }
    }
}

/// Point-in-time view of a process, safe to hand out.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProcessInfo {
    pub id: ProcessId,
    pub role: Role,
    pub state: WorkerState,
    pub started_at: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment: Option<String>,
}

/// Processes keyed by id, iterated in start order.
///
/// Stopped processes stay registered so their ids cannot be reused.
#[derive(Default)]
pub struct ProcessRegistry {
    handles: HashMap<ProcessId, ProcessHandle>,
    order: Vec<ProcessId>,
}

impl ProcessRegistry {
    pub fn contains(&self, id: &str) -> bool {
        self.handles.contains_key(id)
    }

    pub(crate) fn insert(&mut self, handle: ProcessHandle) -> Result<(), SimError> {
        if self.handles.contains_key(&handle.id) {
            return Err(SimError::DuplicateId(handle.id.clone()));
        }
        self.order.push(handle.id.clone());
        self.handles.insert(handle.id.clone(), handle);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&ProcessHandle> {
        self.handles.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut ProcessHandle> {
        self.handles.get_mut(id)
    }

    pub fn ids(&self) -> &[ProcessId] {
        &self.order
    }

    pub fn infos(&self) -> Vec<ProcessInfo> {
        self.order
            .iter()
            .filter_map(|id| self.handles.get(id))
            .map(ProcessHandle::info)
            .collect()
    }

    /// Processes not yet stopped.
    pub fn active(&self) -> Vec<ProcessInfo> {
        self.infos()
            .into_iter()
            .filter(|p| p.state != WorkerState::Stopped)
            .collect()
    }

    /// Ids of live processes attached to `segment`.
    pub fn using_segment(&self, segment: &str) -> Vec<ProcessId> {
        self.order
            .iter()
            .filter_map(|id| self.handles.get(id))
            .filter(|h| h.segment.as_deref() == Some(segment) && h.state.get() != WorkerState::Stopped)
            .map(|h| h.id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
