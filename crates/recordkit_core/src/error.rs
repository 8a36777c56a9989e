//! Error types for the recordkit engine.

use crate::audit::AuditError;
use recordkit_store::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Broad classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The engine was used incorrectly; retrying cannot help.
    Configuration,
    /// A record that must exist does not.
    NotFound,
    /// A business rule rejected the operation.
    Business,
    /// The store, serializer, audit sink, or request scope failed.
    Storage,
    /// A column reference failed the allow-list check.
    InjectionGuard,
}

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No live entity is registered under the key.
    #[error("entity #{key} is not registered in this request scope")]
    NotRegistered {
        /// The identity key that was looked up.
        key: u64,
    },

    /// A lifecycle event was executed before `init_state_machine`.
    #[error("state machine for {table} is not initialized")]
    StateMachineMissing {
        /// The entity table.
        table: String,
    },

    /// A preload named an association the entity does not declare.
    #[error("{table} has no association named {name}")]
    UnknownAssociation {
        /// The entity table.
        table: String,
        /// The requested association.
        name: String,
    },

    /// A mutating operation ran without an actor in the request scope.
    #[error("{operation} requires an actor in the request scope")]
    MissingActor {
        /// The operation that needed the actor.
        operation: &'static str,
    },

    /// `run_in_transaction` was called while a transaction was open.
    #[error("request {request_id} already has an open transaction")]
    NestedTransaction {
        /// The request that owns the open transaction.
        request_id: Uuid,
    },

    /// A record that must exist was not found.
    #[error("record not found in {table}")]
    NotFound {
        /// The table searched.
        table: String,
    },

    /// The event is not legal from the current state.
    #[error("{table}: event {event} is not allowed in state {state}")]
    IllegalTransition {
        /// The entity table.
        table: String,
        /// The state the machine was in.
        state: String,
        /// The rejected event.
        event: String,
    },

    /// A before or leave hook vetoed the transition.
    #[error("{table}: event {event} was canceled: {reason}")]
    TransitionCanceled {
        /// The entity table.
        table: String,
        /// The canceled event.
        event: String,
        /// Why the hook vetoed.
        reason: String,
    },

    /// A unique business value is already taken.
    #[error("{table}.{column} value {value} already exists")]
    Duplicate {
        /// The entity table.
        table: String,
        /// The unique column(s).
        column: String,
        /// The rejected value.
        value: String,
    },

    /// A batch check exceeded the configured limit.
    #[error("batch of {size} exceeds the limit of {limit}")]
    BatchTooLarge {
        /// Number of candidates supplied.
        size: usize,
        /// The configured limit.
        limit: usize,
    },

    /// A batch operation received no values.
    #[error("{operation} requires at least one value")]
    EmptyBatch {
        /// The operation that was called.
        operation: &'static str,
    },

    /// An argument had the wrong shape.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// An entity hook rejected the entity.
    #[error("{table} failed validation: {message}")]
    Validation {
        /// The entity table.
        table: String,
        /// Description of the problem.
        message: String,
    },

    /// The store failed.
    #[error("{operation} on {table} failed: {source}")]
    Storage {
        /// The engine operation.
        operation: &'static str,
        /// The table involved.
        table: String,
        /// The store error.
        #[source]
        source: StoreError,
    },

    /// An entity could not be converted to or from a row.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The audit sink failed and audit failures are fatal.
    #[error("audit error: {0}")]
    Audit(#[from] AuditError),

    /// The request was cancelled or its deadline passed.
    #[error("request {request_id} was cancelled")]
    Cancelled {
        /// The cancelled request.
        request_id: Uuid,
    },

    /// A column reference failed the allow-list check.
    #[error("invalid column reference: {column:?}")]
    InvalidColumn {
        /// The rejected column text.
        column: String,
    },
}

impl EngineError {
    /// Wraps a store error with operation context.
    ///
    /// [`StoreError::NotFound`] becomes [`EngineError::NotFound`].
    pub fn storage(operation: &'static str, table: impl Into<String>, source: StoreError) -> Self {
        let table = table.into();
        if source.is_not_found() {
            return Self::NotFound { table };
        }
        Self::Storage {
            operation,
            table,
            source,
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid column error.
    pub fn invalid_column(column: impl Into<String>) -> Self {
        Self::InvalidColumn {
            column: column.into(),
        }
    }

    /// Returns the classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotRegistered { .. }
            | Self::StateMachineMissing { .. }
            | Self::UnknownAssociation { .. }
            | Self::MissingActor { .. }
            | Self::NestedTransaction { .. } => ErrorKind::Configuration,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::IllegalTransition { .. }
            | Self::TransitionCanceled { .. }
            | Self::Duplicate { .. }
            | Self::BatchTooLarge { .. }
            | Self::EmptyBatch { .. }
            | Self::InvalidArgument { .. }
            | Self::Validation { .. } => ErrorKind::Business,
            Self::Storage { .. }
            | Self::Serialization(_)
            | Self::Audit(_)
            | Self::Cancelled { .. } => ErrorKind::Storage,
            Self::InvalidColumn { .. } => ErrorKind::InjectionGuard,
        }
    }

    /// Returns true for [`EngineError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_not_found_maps_to_not_found() {
        let err = EngineError::storage("load", "sales_order", StoreError::not_found("sales_order"));
        assert!(err.is_not_found());
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn other_store_errors_keep_context() {
        let err = EngineError::storage(
            "create",
            "sales_order",
            StoreError::invalid_row("sales_order", "bad id"),
        );
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(err.to_string().starts_with("create on sales_order failed"));
    }

    #[test]
    fn kinds() {
        assert_eq!(
            EngineError::NotRegistered { key: 3 }.kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            EngineError::BatchTooLarge { size: 501, limit: 500 }.kind(),
            ErrorKind::Business
        );
        assert_eq!(
            EngineError::invalid_column("a;b").kind(),
            ErrorKind::InjectionGuard
        );
    }

    #[test]
    fn duplicate_message_names_value() {
        let err = EngineError::Duplicate {
            table: "sales_order".into(),
            column: "order_id".into(),
            value: "SO1".into(),
        };
        assert_eq!(err.to_string(), "sales_order.order_id value SO1 already exists");
    }
}
