//! Cancellation signal shared between the simulator and one worker.
//!
//! The token is the receiving side of a channel that never carries a value.
//! Dropping the [`Canceller`] disconnects it, which wakes every wait on
//! [`CancelToken::signal`] at once, so a worker blocked in `select!` or
//! sleeping through [`CancelToken::sleep`] notices within one wakeup.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};
use std::time::Duration;

#[derive(Debug)]
pub struct Canceller(Option<Sender<()>>);

#[derive(Clone, Debug)]
pub struct CancelToken(Receiver<()>);

pub fn cancel_pair() -> (Canceller, CancelToken) {
    let (tx, rx) = bounded(0);
    (Canceller(Some(tx)), CancelToken(rx))
}

impl Canceller {
    /// Idempotent.
    pub fn cancel(&mut self) {
        self.0.take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_none()
    }
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.0.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleeps for `dur` unless cancelled first. Returns `true` if cancelled.
    pub fn sleep(&self, dur: Duration) -> bool {
        !matches!(self.0.recv_timeout(dur), Err(RecvTimeoutError::Timeout))
    }

    /// Disconnects on cancellation, for use as a `select!` arm.
    pub fn signal(&self) -> &Receiver<()> {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn sleep_runs_full_duration_without_cancel() {
        let (_c, token) = cancel_pair();
        let start = Instant::now();
        assert!(!token.sleep(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancel_interrupts_sleep() {
        let (mut c, token) = cancel_pair();
        let start = Instant::now();
        let h = thread::spawn(move || token.sleep(Duration::from_secs(30)));
        thread::sleep(Duration::from_millis(20));
        c.cancel();
        c.cancel();
        assert!(h.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(c.is_cancelled());
    }

    #[test]
    fn dropping_canceller_cancels() {
        let (c, token) = cancel_pair();
        drop(c);
        assert!(token.is_cancelled());
        assert!(token.sleep(Duration::ZERO));
    }
}
