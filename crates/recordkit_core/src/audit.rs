//! Operation audit trail.
//!
//! Every create, update, delete, and lifecycle event produces one
//! [`AuditEntry`] with before and after snapshots. Where the entries go is up
//! to the configured [`AuditSink`].

use crate::entity::LocalTime;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Kind recorded for creates.
pub const KIND_CREATE: &str = "create";
/// Kind recorded for updates.
pub const KIND_UPDATE: &str = "update";
/// Kind recorded for deletes.
pub const KIND_DELETE: &str = "delete";

/// One audited operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Request the operation ran in.
    pub request_id: Uuid,
    /// Entity table.
    pub table: String,
    /// Entity identifier (0 for batch deletes of several rows).
    pub entity_id: u64,
    /// `create`, `update`, `delete`, or the lifecycle event name.
    pub kind: String,
    /// Human-readable operation name.
    pub label: String,
    /// Acting user id.
    pub operator_id: String,
    /// Acting user name.
    pub operator_name: String,
    /// Snapshot before the operation.
    pub before: Value,
    /// Snapshot after the operation.
    pub after: Value,
    /// When the operation ran.
    pub at: LocalTime,
}

/// Errors reported by an audit sink.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The sink cannot accept entries right now.
    #[error("audit sink unavailable: {message}")]
    Unavailable {
        /// Description of the problem.
        message: String,
    },

    /// The sink refused this entry.
    #[error("audit entry rejected: {message}")]
    Rejected {
        /// Description of the problem.
        message: String,
    },
}

/// Destination for audit entries.
pub trait AuditSink: Send + Sync {
    /// Records one entry.
    ///
    /// # Errors
    ///
    /// Returns an [`AuditError`] if the entry could not be recorded.
    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError>;
}

/// Emits each entry as a structured `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        tracing::info!(
            target: "recordkit::audit",
            request_id = %entry.request_id,
            table = %entry.table,
            id = entry.entity_id,
            kind = %entry.kind,
            label = %entry.label,
            operator_id = %entry.operator_id,
            operator_name = %entry.operator_name,
            before = %entry.before,
            after = %entry.after,
            at = %entry.at,
            "audit"
        );
        Ok(())
    }
}

/// Collects entries in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every recorded entry, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    /// Returns the entries recorded for `table`.
    #[must_use]
    pub fn entries_for(&self, table: &str) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.table == table)
            .cloned()
            .collect()
    }

    /// Returns the number of recorded entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every recorded entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }
}
