//! Refresh run log.
//!
//! Append-only from the caller's point of view; the in-memory sink keeps a
//! bounded ring buffer and evicts the oldest entries first.

use std::collections::VecDeque;
use std::sync::Mutex;

use duet_core::RunLogEntry;

/// Default number of entries kept by [`InMemoryRunLog`].
pub const DEFAULT_RUN_LOG_CAPACITY: usize = 1000;

/// Destination for run log entries.
pub trait RunLogSink: Send + Sync {
    /// Append an entry. Never fails from the caller's point of view.
    fn append(&self, entry: RunLogEntry);

    /// All retained entries in insertion order.
    fn entries(&self) -> Vec<RunLogEntry>;
}

/// Bounded in-memory run log.
#[derive(Debug)]
pub struct InMemoryRunLog {
    capacity: usize,
    entries: Mutex<VecDeque<RunLogEntry>>,
}

impl InMemoryRunLog {
    /// Create a log holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_RUN_LOG_CAPACITY))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryRunLog {
    fn default() -> Self {
        Self::new(DEFAULT_RUN_LOG_CAPACITY)
    }
}

impl RunLogSink for InMemoryRunLog {
    fn append(&self, entry: RunLogEntry) {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    fn entries(&self) -> Vec<RunLogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(message: &str) -> RunLogEntry {
        RunLogEntry::new(Utc::now(), message)
    }

    #[test]
    fn test_entries_keep_insertion_order() {
        let log = InMemoryRunLog::default();
        log.append(entry("start"));
        log.append(entry("fetched"));
        log.append(entry("done"));

        let messages: Vec<_> = log.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["start", "fetched", "done"]);
    }

    #[test]
    fn test_oldest_entries_evicted_first() {
        let log = InMemoryRunLog::new(2);
        log.append(entry("one"));
        log.append(entry("two"));
        log.append(entry("three"));

        let messages: Vec<_> = log.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["two", "three"]);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let log = InMemoryRunLog::new(0);
        assert_eq!(log.capacity(), 1);
        log.append(entry("a"));
        log.append(entry("b"));
        assert_eq!(log.entries().len(), 1);
    }
}
