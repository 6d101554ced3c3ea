//! Duplex pipe built from two crossed unbounded channels.
//!
//! ```text
//!   endpoint A                      endpoint B
//!   tx ──────────── a_to_b ───────────▶ rx
//!   rx ◀─────────── b_to_a ──────────── tx
//! ```
//!
//! Endpoints are not `Clone`: each one belongs to exactly one worker. When an
//! endpoint is dropped, sends from its peer fail with
//! [`ChannelError::Broken`] and receives fail once the buffered messages
//! have been drained.

use crate::error::ChannelError;
use crate::message::Message;
use crossbeam_channel::{Receiver, Sender, never, select, unbounded};
use std::time::Duration;

#[derive(Debug)]
pub struct PipeEndpoint {
    tx: Sender<Message>,
    rx: Receiver<Message>,
}

/// Creates a pair of connected duplex endpoints.
pub fn pipe() -> (PipeEndpoint, PipeEndpoint) {
    let (a_tx, b_rx) = unbounded();
    let (b_tx, a_rx) = unbounded();
    (
        PipeEndpoint { tx: a_tx, rx: a_rx },
        PipeEndpoint { tx: b_tx, rx: b_rx },
    )
}

impl PipeEndpoint {
    pub fn send(&self, msg: Message) -> Result<(), ChannelError> {
        self.tx.send(msg).map_err(|_| ChannelError::Broken)
    }

    /// Waits at most `timeout` for the next message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Message, ChannelError> {
        self.recv_interruptible(timeout, &never())
    }

    /// Like [`recv_timeout`](Self::recv_timeout), but gives up with
    /// [`ChannelError::Interrupted`] as soon as `interrupt` disconnects.
    pub fn recv_interruptible(&self, timeout: Duration, interrupt: &Receiver<()>) -> Result<Message, ChannelError> {
        select! {
            recv(self.rx) -> msg => msg.map_err(|_| ChannelError::Broken),
            recv(interrupt) -> _ => Err(ChannelError::Interrupted),
            default(timeout) => Err(ChannelError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_flow_both_ways() {
        let (a, b) = pipe();
        a.send(Message::new("ping", 1.0)).unwrap();
        b.send(Message::new("pong", 2.0)).unwrap();

        let got = b.recv_timeout(Duration::from_millis(50)).unwrap();
        assert_eq!(got, Message::new("ping", 1.0));
        let got = a.recv_timeout(Duration::from_millis(50)).unwrap();
        assert_eq!(got.payload, "pong");
    }

    #[test]
    fn empty_pipe_times_out() {
        let (a, _b) = pipe();
        let err = a.recv_timeout(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, ChannelError::Timeout));
    }

    #[test]
    fn send_to_closed_peer_is_broken() {
        let (a, b) = pipe();
        drop(b);
        assert!(a.send(Message::new("x", 0.0)).unwrap_err().is_broken());
    }

    #[test]
    fn interrupt_ends_the_wait() {
        let (a, _b) = pipe();
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        drop(stop_tx);
        let err = a
            .recv_interruptible(Duration::from_secs(10), &stop_rx)
            .unwrap_err();
        assert!(matches!(err, ChannelError::Interrupted));
    }

    #[test]
    fn receiver_drains_buffer_before_reporting_broken() {
        let (a, b) = pipe();
        a.send(Message::new("last", 0.0)).unwrap();
        drop(a);

        assert_eq!(b.recv_timeout(Duration::from_millis(10)).unwrap().payload, "last");
        assert!(b.recv_timeout(Duration::from_millis(10)).unwrap_err().is_broken());
    }
}
