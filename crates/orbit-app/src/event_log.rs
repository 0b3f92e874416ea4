//! User-facing activity log
//!
//! A fixed-capacity ring of [`LogEntry`] values. Appends are O(1), evict the
//! oldest entry silently at capacity, and never block on I/O: the lock is only
//! held for the push itself and never across an `.await`.

use std::sync::{Mutex, PoisonError};

use orbit_core::prelude::*;
use orbit_core::{LogEntry, RingBuffer, Severity};
use tokio::sync::broadcast;

use crate::events::OrbitEvent;

/// Number of entries retained
pub const LOG_CAPACITY: usize = 50;

#[derive(Debug)]
pub struct EventLog {
    entries: Mutex<RingBuffer<LogEntry>>,
    events: broadcast::Sender<OrbitEvent>,
}

impl EventLog {
    pub fn new(events: broadcast::Sender<OrbitEvent>) -> Self {
        Self::with_capacity(LOG_CAPACITY, events)
    }

    pub fn with_capacity(capacity: usize, events: broadcast::Sender<OrbitEvent>) -> Self {
        Self {
            entries: Mutex::new(RingBuffer::new(capacity)),
            events,
        }
    }

    /// Append an entry, mirroring it to the diagnostic log
    pub fn append(&self, message: impl Into<String>, severity: Severity) -> LogEntry {
        let entry = LogEntry::new(severity, message);

        match severity {
            Severity::Error => warn!("[activity] {}", entry.message),
            _ => info!("[activity] {}", entry.message),
        }

        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());

        // No subscribers is fine
        let _ = self.events.send(OrbitEvent::LogAppended {
            entry: entry.clone(),
        });

        entry
    }

    pub fn info(&self, message: impl Into<String>) -> LogEntry {
        self.append(message, Severity::Info)
    }

    pub fn success(&self, message: impl Into<String>) -> LogEntry {
        self.append(message, Severity::Success)
    }

    pub fn error(&self, message: impl Into<String>) -> LogEntry {
        self.append(message, Severity::Error)
    }

    /// Snapshot of the log, newest first
    pub fn recent(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .newest_first()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> EventLog {
        let (tx, _) = broadcast::channel(16);
        EventLog::new(tx)
    }

    #[test]
    fn test_recent_is_newest_first() {
        let log = log();
        log.info("first");
        log.success("second");
        log.error("third");

        let recent = log.recent();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].message, "third");
        assert_eq!(recent[0].severity, Severity::Error);
        assert_eq!(recent[2].message, "first");
    }

    #[test]
    fn test_ring_never_exceeds_capacity() {
        let log = log();
        for i in 0..=LOG_CAPACITY {
            log.info(format!("entry {i}"));
            assert!(log.len() <= LOG_CAPACITY);
        }

        let recent = log.recent();
        assert_eq!(recent.len(), LOG_CAPACITY);
        assert_eq!(recent[0].message, format!("entry {LOG_CAPACITY}"));
        assert!(!recent.iter().any(|e| e.message == "entry 0"));
        assert!(recent.iter().any(|e| e.message == "entry 1"));
    }

    #[test]
    fn test_append_broadcasts_entry() {
        let (tx, mut rx) = broadcast::channel(16);
        let log = EventLog::new(tx);

        log.success("Connected to 192.168.1.50:5555");

        match rx.try_recv().unwrap() {
            OrbitEvent::LogAppended { entry } => {
                assert_eq!(entry.message, "Connected to 192.168.1.50:5555");
                assert_eq!(entry.severity, Severity::Success);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_append_without_subscribers_does_not_fail() {
        let log = log();
        log.error("nobody is listening");
        assert!(!log.is_empty());
    }
}
