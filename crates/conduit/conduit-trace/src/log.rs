//! Shared append-only trace log.
//!
//! One [`TraceLog`] is shared by every worker, the simulator and the
//! analyzer. Cloning the log clones a handle to the same storage.
//!
//! Appends are best-effort: if the log cannot take the event (its lock was
//! poisoned by a panicking writer) the event is dropped and the caller is
//! never told. Simulated traffic must not stall because telemetry failed.
//!
//! Snapshots copy the current contents under a read lock, so a reader gets a
//! consistent ordered view while appends keep going on other threads.

use crate::event::TraceEvent;
use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::warn;

#[derive(Debug, Default)]
struct Inner {
    events: VecDeque<TraceEvent>,
    /// Maximum number of retained events; `None` keeps everything.
    capacity: Option<usize>,
    evicted: u64,
}

impl Inner {
    fn push(&mut self, event: TraceEvent) {
        self.events.push_back(event);
        if let Some(cap) = self.capacity {
            while self.events.len() > cap {
                self.events.pop_front();
                self.evicted += 1;
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct TraceLog {
    inner: Arc<RwLock<Inner>>,
}

impl TraceLog {
    /// Unbounded log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Log retaining at most `capacity` events; the oldest are evicted first.
    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity))
    }

    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                capacity,
                ..Inner::default()
            })),
        }
    }

    pub fn append(&self, event: TraceEvent) {
        self.append_if(event, || true);
    }

    /// Appends `event` only if `admit` returns true.
    ///
    /// `admit` runs while the log is write-locked, so it is ordered against
    /// every [`append_with`](Self::append_with) hook.
    pub fn append_if(&self, event: TraceEvent, admit: impl FnOnce() -> bool) -> bool {
        match self.inner.write() {
            Ok(mut inner) => {
                if !admit() {
                    return false;
                }
                inner.push(event);
                true
            }
            Err(_) => {
                warn!(event = event.type_name(), "trace log unavailable, event dropped");
                false
            }
        }
    }

    /// Runs `before` and appends `event` as one step under the write lock.
    ///
    /// Used to flip a producer's state so that no event it emits afterwards
    /// can land behind `event`.
    pub fn append_with(&self, event: TraceEvent, before: impl FnOnce()) {
        match self.inner.write() {
            Ok(mut inner) => {
                before();
                inner.push(event);
            }
            Err(_) => {
                before();
                warn!(event = event.type_name(), "trace log unavailable, event dropped");
            }
        }
    }

    /// Ordered copy of every event currently held.
    pub fn snapshot(&self) -> Vec<TraceEvent> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.events.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .events
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of events dropped to honour the capacity bound.
    pub fn evicted(&self) -> u64 {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use std::thread;

    fn ev(ts: f64) -> TraceEvent {
        TraceEvent::new(ts, Some("w".into()), EventKind::ProcessStart)
    }

    #[test]
    fn snapshot_preserves_append_order() {
        let log = TraceLog::new();
        for i in 0..5 {
            log.append(ev(i as f64));
        }
        let ts: Vec<f64> = log.snapshot().iter().map(|e| e.timestamp).collect();
        assert_eq!(ts, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn bounded_log_evicts_oldest() {
        let log = TraceLog::bounded(3);
        for i in 0..5 {
            log.append(ev(i as f64));
        }
        let snap = log.snapshot();
        assert_eq!(snap.len(), 3);
        assert_eq!(snap[0].timestamp, 2.0);
        assert_eq!(log.evicted(), 2);
    }

    #[test]
    fn rejected_events_are_not_stored() {
        let log = TraceLog::new();
        assert!(!log.append_if(ev(1.0), || false));
        assert!(log.append_if(ev(2.0), || true));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn concurrent_appends_are_all_kept() {
        let log = TraceLog::new();
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let log = log.clone();
                thread::spawn(move || {
                    for i in 0..500 {
                        log.append(ev((t * 1000 + i) as f64));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(log.len(), 8 * 500);
    }

    #[test]
    fn poisoned_log_drops_appends_but_still_snapshots() {
        let log = TraceLog::new();
        log.append(ev(1.0));
        let poisoner = log.clone();
        let _ = thread::spawn(move || {
            let _guard = poisoner.inner.write().unwrap();
            panic!("poison the lock");
        })
        .join();

        log.append(ev(2.0));
        assert_eq!(log.snapshot().len(), 1);
    }
}
