//! Entity contract and row conversion.
//!
//! An entity is a plain serde struct that embeds [`AuditFields`] and names its
//! table. Its JSON object form is its row.

mod fields;
mod time;

pub use fields::{AuditFields, CREATE_ONLY_COLUMNS, DELETED_AT_COLUMN, UPDATE_ONLY_COLUMNS};
pub use time::LocalTime;

use crate::error::{EngineError, EngineResult};
use recordkit_store::Row;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// A declared one-to-many relation from an entity to child rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Association {
    /// Field of the parent entity holding the children.
    pub name: &'static str,
    /// Child table.
    pub table: &'static str,
    /// Column on the child that points at the parent.
    pub foreign_key: &'static str,
    /// Column on the parent the foreign key refers to.
    pub references: &'static str,
}

impl Association {
    /// Declares an association.
    #[must_use]
    pub const fn new(
        name: &'static str,
        table: &'static str,
        foreign_key: &'static str,
        references: &'static str,
    ) -> Self {
        Self {
            name,
            table,
            foreign_key,
            references,
        }
    }
}

/// A business record managed by [`crate::Model`].
///
/// The hooks default to no-ops; entity types override the ones they need.
pub trait Entity: Serialize + DeserializeOwned + Clone + Default + Send + Sync + 'static {
    /// Table the entity is stored in.
    const TABLE: &'static str;

    /// Returns the embedded identifier and auditing fields.
    fn audit(&self) -> &AuditFields;

    /// Returns the embedded identifier and auditing fields mutably.
    fn audit_mut(&mut self) -> &mut AuditFields;

    /// Returns the identifier (0 until persisted).
    fn id(&self) -> u64 {
        self.audit().id
    }

    /// Declared associations.
    fn associations() -> &'static [Association] {
        &[]
    }

    /// Checks the entity before it is written.
    ///
    /// # Errors
    ///
    /// Returns a validation error describing the first problem found.
    fn validate(&self) -> EngineResult<()> {
        Ok(())
    }

    /// Fixes up data that can be corrected automatically.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity cannot be repaired.
    fn repair(&mut self) -> EngineResult<()> {
        Ok(())
    }

    /// Fills in derived fields.
    ///
    /// # Errors
    ///
    /// Returns an error if a derived value cannot be computed.
    fn complete(&mut self) -> EngineResult<()> {
        Ok(())
    }
}

/// Looks up an association of `T` by field name.
pub(crate) fn association<T: Entity>(name: &str) -> EngineResult<&'static Association> {
    T::associations()
        .iter()
        .find(|a| a.name == name)
        .ok_or_else(|| EngineError::UnknownAssociation {
            table: T::TABLE.to_string(),
            name: name.to_string(),
        })
}

/// Converts a serializable value to a row.
pub(crate) fn to_row<V: Serialize>(table: &str, value: &V) -> EngineResult<Row> {
    match serde_json::to_value(value)? {
        Value::Object(row) => Ok(row),
        other => Err(EngineError::invalid_argument(format!(
            "{table} must serialize to an object, got {other}"
        ))),
    }
}

/// Rebuilds an entity from a row.
pub(crate) fn from_row<T: Entity>(row: Row) -> EngineResult<T> {
    Ok(serde_json::from_value(Value::Object(row))?)
}
