use std::time::{SystemTime, UNIX_EPOCH};

/// Wall clock time in seconds since the unix epoch.
///
/// Every trace event and alert is stamped with this clock. It is not
/// monotonic across threads; callers comparing timestamps from different
/// workers must tolerate small inversions.
#[inline]
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
