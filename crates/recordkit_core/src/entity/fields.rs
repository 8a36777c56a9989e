//! Auditing columns shared by every entity.

use super::time::LocalTime;
use serde::{Deserialize, Serialize};

/// Columns written only when a row is created.
pub const CREATE_ONLY_COLUMNS: [&str; 3] = ["created_at", "create_by", "create_by_name"];

/// Columns written only when a row is updated.
pub const UPDATE_ONLY_COLUMNS: [&str; 3] = ["updated_at", "update_by", "update_by_name"];

/// Soft-delete marker column.
pub const DELETED_AT_COLUMN: &str = "deleted_at";

/// Identifier and auditing fields, embedded in an entity with
/// `#[serde(flatten)]`.
///
/// ```rust
/// use recordkit_core::AuditFields;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// struct Customer {
///     #[serde(flatten)]
///     audit: AuditFields,
///     name: String,
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditFields {
    /// Store-assigned identifier; 0 until persisted.
    pub id: u64,
    /// Creator id.
    pub create_by: String,
    /// Creator display name.
    pub create_by_name: String,
    /// Creation time.
    pub created_at: Option<LocalTime>,
    /// Last updater id.
    pub update_by: String,
    /// Last updater display name.
    pub update_by_name: String,
    /// Last update time.
    pub updated_at: Option<LocalTime>,
    /// Soft-delete marker.
    pub deleted_at: Option<LocalTime>,
}

impl AuditFields {
    /// Returns true once the row has been persisted.
    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        self.id != 0
    }

    /// Returns true if the row is soft-deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_columns_default() {
        let fields: AuditFields = serde_json::from_value(json!({"id": 4})).unwrap();
        assert_eq!(fields.id, 4);
        assert!(fields.created_at.is_none());
        assert!(fields.is_persisted());
        assert!(!fields.is_deleted());
    }

    #[test]
    fn serializes_null_timestamps() {
        let value = serde_json::to_value(AuditFields::default()).unwrap();
        assert_eq!(value["deleted_at"], serde_json::Value::Null);
        assert_eq!(value["id"], 0);
    }
}
