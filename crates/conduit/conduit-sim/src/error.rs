use crate::id::ProcessId;
use conduit_channel::ChannelError;
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("process id '{0}' is already registered")]
    DuplicateId(ProcessId),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("failed to spawn worker '{id}'")]
    Spawn {
        id: ProcessId,
        #[source]
        source: io::Error,
    },

    #[error("worker '{0}' panicked")]
    WorkerPanicked(ProcessId),

    #[error("simulator is shut down")]
    ShutDown,

    #[error("failed to open segment store")]
    SegmentStore(#[source] io::Error),

    /// Every worker was attempted; these ones failed.
    #[error("shutdown finished with {} failure(s)", failed.len())]
    Shutdown { failed: Vec<(String, String)> },
}
