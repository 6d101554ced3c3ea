use serde::Serialize;
use std::borrow::Borrow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of a simulated process.
///
/// Externally this is just a string; the newtype keeps it from being mixed
/// up with labels, segment names and other free-form strings.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ProcessId(String);

impl ProcessId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ProcessId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProcessId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ProcessId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Hands out group numbers for generated process ids (`pipe_sender_3`, ...).
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }
}

impl IdAllocator {
    /// Next group number, starting at 1. Never repeats.
    pub fn next_group(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// `<prefix>_<group>`
    pub fn allocate(&self, prefix: &str) -> ProcessId {
        ProcessId(format!("{prefix}_{}", self.next_group()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn groups_are_sequential_from_one() {
        let ids = IdAllocator::default();
        assert_eq!(ids.next_group(), 1);
        assert_eq!(ids.next_group(), 2);
        assert_eq!(ids.allocate("queue_sender").as_str(), "queue_sender_3");
    }

    #[test]
    fn ids_can_be_looked_up_by_str() {
        let mut map = HashMap::new();
        map.insert(ProcessId::from("pipe_sender_1"), 7);
        assert_eq!(map.get("pipe_sender_1"), Some(&7));
    }
}
