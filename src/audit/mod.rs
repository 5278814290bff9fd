//! Append-only audit event log
//!
//! Every notable action in the demo (turn reveals, resets, product selection) is
//! recorded here and rendered by the activity views. Entries are never edited or
//! removed individually; the only way to shrink the log is a whole-system reset.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One immutable log record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Position in the log, starting at 1; restarts after a reset
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub detail: String,
}

/// Anything that accepts audit events
///
/// Components are handed a sink at construction; there is no global log.
pub trait AuditSink: Send + Sync {
    fn append(&self, name: &str, detail: &str);
}

#[derive(Debug, Default)]
struct Entries {
    events: Vec<AuditEvent>,
    next_seq: u64,
}

/// Shared in-memory audit log
///
/// Cloning the handle shares the underlying list.
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    inner: Arc<RwLock<Entries>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    // Entries are pushed whole, so a poisoned lock still guards a consistent list.
    fn read(&self) -> RwLockReadGuard<'_, Entries> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Entries> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// All events, oldest first
    pub fn all(&self) -> Vec<AuditEvent> {
        self.read().events.clone()
    }

    /// All events, newest first; the shared list is left untouched
    pub fn newest_first(&self) -> Vec<AuditEvent> {
        let mut events = self.all();
        events.reverse();
        events
    }

    pub fn len(&self) -> usize {
        self.read().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().events.is_empty()
    }

    /// Drop every event; only the whole-system reset calls this
    pub fn reset(&self) {
        let mut entries = self.write();
        entries.events.clear();
        entries.next_seq = 0;
    }
}

impl AuditSink for AuditLog {
    fn append(&self, name: &str, detail: &str) {
        let mut entries = self.write();
        entries.next_seq += 1;
        let event = AuditEvent {
            seq: entries.next_seq,
            timestamp: Utc::now(),
            name: name.to_string(),
            detail: detail.to_string(),
        };
        tracing::debug!(seq = event.seq, name = %event.name, "audit");
        entries.events.push(event);
    }
}
