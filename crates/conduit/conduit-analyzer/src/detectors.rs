use crate::alert::{Alert, Severity};
use conduit_trace::{EventKind, TraceEvent};
use tracing::debug;

pub const NO_ACTIVITY: &str = "no activity in window";

#[derive(Clone, Debug, PartialEq)]
pub struct DetectorConfig {
    /// Backlog above which `queue_backlog` fires.
    pub backlog_threshold: i64,
    pub latency_threshold_ms: f64,
    /// Trailing window, in seconds, the deadlock detector looks for activity in.
    pub deadlock_window_s: f64,
    /// When set, only puts and gets inside this trailing window are counted.
    pub backlog_window_s: Option<f64>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            backlog_threshold: 50,
            latency_threshold_ms: 500.0,
            deadlock_window_s: 5.0,
            backlog_window_s: None,
        }
    }
}

fn within(event: &TraceEvent, now: f64, window_s: f64) -> bool {
    now - event.timestamp < window_s
}

/// Counts `queue_put` minus `queue_get`, over the whole trace unless
/// `window_s` is given, and reports it if it exceeds `threshold`.
pub fn detect_queue_backlog(
    events: &[TraceEvent],
    threshold: i64,
    window_s: Option<f64>,
    now: f64,
) -> Vec<Alert> {
    let mut backlog: i64 = 0;
    for event in events {
        if window_s.is_some_and(|w| !within(event, now, w)) {
            continue;
        }
        match event.kind {
            EventKind::QueuePut { .. } => backlog += 1,
            EventKind::QueueGet { .. } => backlog -= 1,
            _ => {}
        }
    }
    if backlog > threshold {
        vec![Alert::QueueBacklog {
            backlog,
            severity: Severity::High,
            time: now,
        }]
    } else {
        Vec::new()
    }
}

/// One alert per `pipe_message` whose delivery took longer than
/// `threshold_ms`. Historical events alert again on every call.
pub fn detect_pipe_latency(events: &[TraceEvent], threshold_ms: f64, now: f64) -> Vec<Alert> {
    events
        .iter()
        .filter_map(|event| match event.kind {
            EventKind::PipeMessage { sent_ts, rcv_ts, .. } => {
                let latency_ms = (rcv_ts - sent_ts) * 1000.0;
                (latency_ms > threshold_ms).then(|| Alert::PipeHighLatency {
                    latency_ms,
                    label: event.label.clone(),
                    time: now,
                })
            }
            _ => None,
        })
        .collect()
}

/// Flags a silent trace: no event inside the trailing window while at least
/// one process is registered, stopped ones included.
pub fn detect_deadlock(
    events: &[TraceEvent],
    registered_processes: usize,
    window_s: f64,
    now: f64,
) -> Vec<Alert> {
    if registered_processes == 0 || events.iter().any(|e| within(e, now, window_s)) {
        return Vec::new();
    }
    vec![Alert::PossibleDeadlock {
        reason: NO_ACTIVITY.to_string(),
        time: now,
    }]
}

/// Runs backlog, latency and deadlock detection, in that order.
pub fn run_all_detectors(
    events: &[TraceEvent],
    registered_processes: usize,
    config: &DetectorConfig,
    now: f64,
) -> Vec<Alert> {
    let mut alerts = detect_queue_backlog(events, config.backlog_threshold, config.backlog_window_s, now);
    alerts.extend(detect_pipe_latency(events, config.latency_threshold_ms, now));
    alerts.extend(detect_deadlock(events, registered_processes, config.deadlock_window_s, now));
    debug!(events = events.len(), alerts = alerts.len(), "detectors ran");
    alerts
}
