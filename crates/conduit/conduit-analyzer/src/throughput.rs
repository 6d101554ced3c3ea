use conduit_trace::TraceEvent;

/// Message events per second over the trailing `window_s` seconds.
///
/// Counts pipe deliveries, queue puts and gets, and segment writes and
/// reads. A non-positive window yields zero.
pub fn throughput(events: &[TraceEvent], now: f64, window_s: f64) -> f64 {
    if window_s <= 0.0 {
        return 0.0;
    }
    let msgs = events
        .iter()
        .filter(|e| now - e.timestamp < window_s && e.kind.is_message())
        .count();
    msgs as f64 / window_s
}
