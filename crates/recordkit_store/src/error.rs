//! Error types for store operations.

use crate::types::TransactionId;
use std::time::Duration;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A query that must return a row returned none.
    #[error("no rows found in table {table}")]
    NotFound {
        /// The table that was searched.
        table: String,
    },

    /// A query could not be evaluated against the table.
    #[error("invalid query on table {table}: {message}")]
    InvalidQuery {
        /// The table the query targeted.
        table: String,
        /// Description of the problem.
        message: String,
    },

    /// A row did not have the shape the store requires.
    #[error("invalid row for table {table}: {message}")]
    InvalidRow {
        /// The table the row was written to.
        table: String,
        /// Description of the problem.
        message: String,
    },

    /// An insert supplied an identifier that is already taken.
    #[error("duplicate primary key {id} in table {table}")]
    DuplicateKey {
        /// The table written to.
        table: String,
        /// The conflicting identifier.
        id: u64,
    },

    /// The transaction was already committed or rolled back.
    #[error("transaction {txid} is no longer active")]
    TransactionClosed {
        /// The closed transaction.
        txid: TransactionId,
    },

    /// The writer gate could not be acquired in time.
    #[error("timed out after {waited:?} waiting for the write lock")]
    LockTimeout {
        /// How long the caller waited.
        waited: Duration,
    },
}

impl StoreError {
    /// Creates a not found error.
    pub fn not_found(table: impl Into<String>) -> Self {
        Self::NotFound {
            table: table.into(),
        }
    }

    /// Creates an invalid query error.
    pub fn invalid_query(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid row error.
    pub fn invalid_row(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRow {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Returns true for the "no rows" condition.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_distinguishable() {
        assert!(StoreError::not_found("sales_order").is_not_found());
        assert!(!StoreError::invalid_query("sales_order", "bad").is_not_found());
    }

    #[test]
    fn messages_name_the_table() {
        let err = StoreError::invalid_row("sales_order", "expected object");
        assert_eq!(
            err.to_string(),
            "invalid row for table sales_order: expected object"
        );
    }
}
