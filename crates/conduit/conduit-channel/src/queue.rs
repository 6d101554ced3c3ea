//! Multi-producer, multi-consumer FIFO queue.
//!
//! Every clone of a [`MessageQueue`] refers to the same FIFO. Each message is
//! delivered to exactly one receiver. Closing the queue from any clone tears
//! it down for all of them: pending and future `put`/`get` calls fail with
//! [`ChannelError::Broken`], and blocked receivers wake up immediately.

use crate::error::ChannelError;
use crate::message::Message;
use crossbeam_channel::{Receiver, Sender, never, select, unbounded};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct MessageQueue {
    tx: Sender<Message>,
    rx: Receiver<Message>,
    /// Never carries a value; disconnects when the queue is closed.
    closed_rx: Receiver<()>,
    closer: Arc<Mutex<Option<Sender<()>>>>,
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        let (closed_tx, closed_rx) = unbounded();
        Self {
            tx,
            rx,
            closed_rx,
            closer: Arc::new(Mutex::new(Some(closed_tx))),
        }
    }

    pub fn put(&self, msg: Message) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Broken);
        }
        self.tx.send(msg).map_err(|_| ChannelError::Broken)
    }

    /// Takes the oldest message, waiting up to `timeout` (forever if `None`).
    pub fn get(&self, timeout: Option<Duration>) -> Result<Message, ChannelError> {
        self.get_interruptible(timeout, &never())
    }

    /// Like [`get`](Self::get), but gives up with
    /// [`ChannelError::Interrupted`] as soon as `interrupt` disconnects.
    pub fn get_interruptible(
        &self,
        timeout: Option<Duration>,
        interrupt: &Receiver<()>,
    ) -> Result<Message, ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Broken);
        }
        match timeout {
            Some(timeout) => select! {
                recv(self.rx) -> msg => msg.map_err(|_| ChannelError::Broken),
                recv(self.closed_rx) -> _ => Err(ChannelError::Broken),
                recv(interrupt) -> _ => Err(ChannelError::Interrupted),
                default(timeout) => Err(ChannelError::Timeout),
            },
            None => select! {
                recv(self.rx) -> msg => msg.map_err(|_| ChannelError::Broken),
                recv(self.closed_rx) -> _ => Err(ChannelError::Broken),
                recv(interrupt) -> _ => Err(ChannelError::Interrupted),
            },
        }
    }

    /// Tears the queue down. Idempotent.
    pub fn close(&self) {
        let mut closer = self.closer.lock().unwrap_or_else(PoisonError::into_inner);
        closer.take();
    }

    pub fn is_closed(&self) -> bool {
        self.closer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Messages put but not yet taken.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
