use std::io;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The peer closed its end, or the queue was torn down.
    #[error("channel closed by peer")]
    Broken,

    #[error("timed out waiting on channel")]
    Timeout,

    /// The caller's interrupt signal fired while waiting.
    #[error("wait interrupted")]
    Interrupted,

    #[error("segment '{0}' already exists")]
    SegmentExists(String),

    #[error("invalid segment size {0}")]
    InvalidSegmentSize(usize),

    #[error("invalid segment name '{0}'")]
    InvalidSegmentName(String),

    #[error("failed to attach segment '{name}'")]
    SegmentAttach {
        name: String,
        #[source]
        source: io::Error,
    },
}

impl ChannelError {
    pub fn is_broken(&self) -> bool {
        matches!(self, ChannelError::Broken)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ChannelError::Timeout)
    }

    /// True for every failure to create or map a shared segment.
    pub fn is_segment_attach(&self) -> bool {
        matches!(
            self,
            ChannelError::SegmentExists(_)
                | ChannelError::InvalidSegmentSize(_)
                | ChannelError::InvalidSegmentName(_)
                | ChannelError::SegmentAttach { .. }
        )
    }
}
