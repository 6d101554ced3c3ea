//! Worker roles.
//!
//! Each role is a loop that runs on its own thread until it is cancelled or
//! its channel reports closed. Blocking points are bounded waits that also
//! watch the cancellation token. The channel resource is owned by the loop
//! and released when the loop returns, on every path including unwinding.

use crate::cancel::CancelToken;
use crate::state::{SharedState, WorkerState};
use conduit_channel::{ChannelError, Message, MessageQueue, PipeEndpoint, SegmentHandle, SegmentStore};
use conduit_trace::{EventKind, TraceEvent, TraceLog, now_secs};
use serde::Serialize;
use std::any::Any;
use std::error::Error;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    PipeSender,
    PipeReceiver,
    QueueSender,
    QueueReceiver,
    #[serde(rename = "shm_writer")]
    SegmentWriter,
    #[serde(rename = "shm_reader")]
    SegmentReader,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::PipeSender => "pipe_sender",
            Role::PipeReceiver => "pipe_receiver",
            Role::QueueSender => "queue_sender",
            Role::QueueReceiver => "queue_receiver",
            Role::SegmentWriter => "shm_writer",
            Role::SegmentReader => "shm_reader",
        })
    }
}

/// A role bound to the channel it will drive.
#[derive(Debug)]
pub enum WorkerSpec {
    PipeSender {
        endpoint: PipeEndpoint,
        rate: Duration,
        prefix: String,
    },
    PipeReceiver {
        endpoint: PipeEndpoint,
        poll: Duration,
        processing_delay: Duration,
    },
    QueueSender {
        queue: MessageQueue,
        rate: Duration,
        prefix: String,
    },
    QueueReceiver {
        queue: MessageQueue,
        get_timeout: Duration,
        processing_delay: Duration,
    },
    SegmentWriter {
        segment: String,
        interval: Duration,
        /// Fixed payload; `shm-<i>` when absent or empty.
        payload: Option<Vec<u8>>,
    },
    SegmentReader {
        segment: String,
        interval: Duration,
    },
    /// Attaches to `segment` and blocks on `release` without watching for
    /// cancellation, then reads once.
    #[cfg(test)]
    Unresponsive {
        segment: String,
        release: crossbeam_channel::Receiver<()>,
    },
}

impl WorkerSpec {
    pub fn pipe_sender(endpoint: PipeEndpoint, rate: Duration) -> Self {
        WorkerSpec::PipeSender {
            endpoint,
            rate,
            prefix: "msg".into(),
        }
    }

    pub fn pipe_receiver(endpoint: PipeEndpoint, processing_delay: Duration) -> Self {
        WorkerSpec::PipeReceiver {
            endpoint,
            poll: Duration::from_millis(200),
            processing_delay,
        }
    }

    pub fn queue_sender(queue: MessageQueue, rate: Duration) -> Self {
        WorkerSpec::QueueSender {
            queue,
            rate,
            prefix: "qmsg".into(),
        }
    }

    pub fn queue_receiver(queue: MessageQueue, processing_delay: Duration) -> Self {
        WorkerSpec::QueueReceiver {
            queue,
            get_timeout: Duration::from_secs(1),
            processing_delay,
        }
    }

    pub fn segment_writer(segment: impl Into<String>, interval: Duration) -> Self {
        WorkerSpec::SegmentWriter {
            segment: segment.into(),
            interval,
            payload: None,
        }
    }

    pub fn segment_reader(segment: impl Into<String>, interval: Duration) -> Self {
        WorkerSpec::SegmentReader {
            segment: segment.into(),
            interval,
        }
    }

    /// Payload prefix for sender roles; ignored by other roles.
    pub fn with_prefix(mut self, new_prefix: impl Into<String>) -> Self {
        if let WorkerSpec::PipeSender { prefix, .. } | WorkerSpec::QueueSender { prefix, .. } =
            &mut self
        {
            *prefix = new_prefix.into();
        }
        self
    }

    /// Fixed payload for a segment writer; ignored by other roles.
    pub fn with_payload(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        if let WorkerSpec::SegmentWriter { payload, .. } = &mut self {
            *payload = Some(bytes.into());
        }
        self
    }

    pub fn role(&self) -> Role {
        match self {
            WorkerSpec::PipeSender { .. } => Role::PipeSender,
            WorkerSpec::PipeReceiver { .. } => Role::PipeReceiver,
            WorkerSpec::QueueSender { .. } => Role::QueueSender,
            WorkerSpec::QueueReceiver { .. } => Role::QueueReceiver,
            WorkerSpec::SegmentWriter { .. } => Role::SegmentWriter,
            WorkerSpec::SegmentReader { .. } => Role::SegmentReader,
            #[cfg(test)]
            WorkerSpec::Unresponsive { .. } => Role::SegmentReader,
        }
    }

    /// Name of the segment this worker attaches to, if any.
    pub fn segment(&self) -> Option<&str> {
        match self {
            WorkerSpec::SegmentWriter { segment, .. } | WorkerSpec::SegmentReader { segment, .. } => {
                Some(segment)
            }
            #[cfg(test)]
            WorkerSpec::Unresponsive { segment, .. } => Some(segment),
            _ => None,
        }
    }
}

/// Why a worker loop returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerExit {
    Cancelled,
    /// Peer closed the pipe, or the queue was torn down.
    ChannelClosed,
    /// No message arrived within the receive timeout.
    TimedOut,
    /// Recorded as an `shm_error` event.
    Failed,
}

/// Emits trace events for one worker, refusing them once it is stopped.
pub(crate) struct TraceSink {
    label: String,
    state: SharedState,
    log: TraceLog,
}

impl TraceSink {
    pub(crate) fn new(label: String, state: SharedState, log: TraceLog) -> Self {
        Self { label, state, log }
    }

    fn emit(&self, kind: EventKind) {
        let event = TraceEvent::now(self.label.as_str(), kind);
        let state = &self.state;
        self.log
            .append_if(event, || state.get() != WorkerState::Stopped);
    }
}

pub(crate) struct WorkerContext {
    pub(crate) sink: TraceSink,
    pub(crate) cancel: CancelToken,
    pub(crate) store: SegmentStore,
}

pub(crate) fn run(spec: WorkerSpec, ctx: &WorkerContext) -> WorkerExit {
    match spec {
        WorkerSpec::PipeSender {
            endpoint,
            rate,
            prefix,
        } => pipe_sender(endpoint, rate, &prefix, ctx),
        WorkerSpec::PipeReceiver {
            endpoint,
            poll,
            processing_delay,
        } => pipe_receiver(endpoint, poll, processing_delay, ctx),
        WorkerSpec::QueueSender {
            queue,
            rate,
            prefix,
        } => queue_sender(queue, rate, &prefix, ctx),
        WorkerSpec::QueueReceiver {
            queue,
            get_timeout,
            processing_delay,
        } => queue_receiver(queue, get_timeout, processing_delay, ctx),
        WorkerSpec::SegmentWriter {
            segment,
            interval,
            payload,
        } => with_segment(&segment, ctx, |handle| {
            segment_writer(handle, interval, payload.as_deref(), ctx)
        }),
        WorkerSpec::SegmentReader { segment, interval } => {
            with_segment(&segment, ctx, |handle| segment_reader(handle, interval, ctx))
        }
        #[cfg(test)]
        WorkerSpec::Unresponsive { segment, release } => with_segment(&segment, ctx, |handle| {
            let _ = release.recv();
            ctx.sink.emit(EventKind::ShmRead {
                payload: String::from_utf8_lossy(&handle.read_trimmed()).into_owned(),
            });
            WorkerExit::Cancelled
        }),
    }
}

fn pipe_sender(endpoint: PipeEndpoint, rate: Duration, prefix: &str, ctx: &WorkerContext) -> WorkerExit {
    let mut i: u64 = 0;
    loop {
        if ctx.cancel.is_cancelled() {
            return WorkerExit::Cancelled;
        }
        let msg = Message::new(format!("{prefix}-{i}"), now_secs());
        // The receiver going away is the normal way a pipe ends.
        if endpoint.send(msg).is_err() {
            return WorkerExit::ChannelClosed;
        }
        i += 1;
        if ctx.cancel.sleep(rate) {
            return WorkerExit::Cancelled;
        }
    }
}

fn pipe_receiver(
    endpoint: PipeEndpoint,
    poll: Duration,
    processing_delay: Duration,
    ctx: &WorkerContext,
) -> WorkerExit {
    loop {
        let msg = match endpoint.recv_interruptible(poll, ctx.cancel.signal()) {
            Ok(msg) => msg,
            Err(ChannelError::Timeout) => continue,
            Err(ChannelError::Interrupted) => return WorkerExit::Cancelled,
            Err(_) => return WorkerExit::ChannelClosed,
        };
        let rcv_ts = now_secs();
        ctx.sink.emit(EventKind::PipeMessage {
            payload: msg.payload,
            sent_ts: msg.sent_ts,
            rcv_ts,
        });
        if !processing_delay.is_zero() && ctx.cancel.sleep(processing_delay) {
            return WorkerExit::Cancelled;
        }
    }
}

fn queue_sender(queue: MessageQueue, rate: Duration, prefix: &str, ctx: &WorkerContext) -> WorkerExit {
    let mut i: u64 = 0;
    loop {
        if ctx.cancel.is_cancelled() {
            return WorkerExit::Cancelled;
        }
        let payload = format!("{prefix}-{i}");
        let ts = now_secs();
        if queue.put(Message::new(payload.clone(), ts)).is_err() {
            return WorkerExit::ChannelClosed;
        }
        ctx.sink.emit(EventKind::QueuePut { payload, ts });
        i += 1;
        if ctx.cancel.sleep(rate) {
            return WorkerExit::Cancelled;
        }
    }
}

fn queue_receiver(
    queue: MessageQueue,
    get_timeout: Duration,
    processing_delay: Duration,
    ctx: &WorkerContext,
) -> WorkerExit {
    loop {
        let msg = match queue.get_interruptible(Some(get_timeout), ctx.cancel.signal()) {
            Ok(msg) => msg,
            Err(ChannelError::Timeout) => return WorkerExit::TimedOut,
            Err(ChannelError::Interrupted) => return WorkerExit::Cancelled,
            Err(_) => return WorkerExit::ChannelClosed,
        };
        let rcv_ts = now_secs();
        ctx.sink.emit(EventKind::QueueGet {
            payload: msg.payload,
            sent_ts: msg.sent_ts,
            rcv_ts,
        });
        if !processing_delay.is_zero() && ctx.cancel.sleep(processing_delay) {
            return WorkerExit::Cancelled;
        }
    }
}

/// Attaches to `name`, runs `body`, and turns an attach failure or a panic
/// inside `body` into an `shm_error` event. The handle is dropped before
/// this returns either way.
fn with_segment(
    name: &str,
    ctx: &WorkerContext,
    body: impl FnOnce(&mut SegmentHandle) -> WorkerExit,
) -> WorkerExit {
    let mut handle = match ctx.store.attach(name) {
        Ok(handle) => handle,
        Err(e) => {
            ctx.sink.emit(EventKind::ShmError { error: describe(&e) });
            return WorkerExit::Failed;
        }
    };
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(&mut handle)));
    drop(handle);
    match outcome {
        Ok(exit) => exit,
        Err(panic) => {
            ctx.sink.emit(EventKind::ShmError {
                error: panic_message(panic.as_ref()),
            });
            WorkerExit::Failed
        }
    }
}

fn segment_writer(
    handle: &mut SegmentHandle,
    interval: Duration,
    payload: Option<&[u8]>,
    ctx: &WorkerContext,
) -> WorkerExit {
    let mut i: u64 = 0;
    loop {
        if ctx.cancel.is_cancelled() {
            return WorkerExit::Cancelled;
        }
        let bytes = match payload {
            Some(p) if !p.is_empty() => p.to_vec(),
            _ => format!("shm-{i}").into_bytes(),
        };
        let n = handle.write(&bytes);
        ctx.sink.emit(EventKind::ShmWrite {
            payload: String::from_utf8_lossy(&bytes[..n]).into_owned(),
        });
        i += 1;
        if ctx.cancel.sleep(interval) {
            return WorkerExit::Cancelled;
        }
    }
}

fn segment_reader(handle: &mut SegmentHandle, interval: Duration, ctx: &WorkerContext) -> WorkerExit {
    loop {
        if ctx.cancel.is_cancelled() {
            return WorkerExit::Cancelled;
        }
        let snapshot = handle.read_trimmed();
        ctx.sink.emit(EventKind::ShmRead {
            payload: String::from_utf8_lossy(&snapshot).into_owned(),
        });
        if ctx.cancel.sleep(interval) {
            return WorkerExit::Cancelled;
        }
    }
}

/// Error message with its source chain, `outer: inner: root`.
fn describe(err: &dyn Error) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(e) = source {
        msg.push_str(": ");
        msg.push_str(&e.to_string());
        source = e.source();
    }
    msg
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
