//! Create, update, and soft delete.

use super::Model;
use crate::audit::{KIND_CREATE, KIND_DELETE, KIND_UPDATE};
use crate::entity::{
    from_row, to_row, Association, Entity, LocalTime, CREATE_ONLY_COLUMNS, DELETED_AT_COLUMN,
    UPDATE_ONLY_COLUMNS,
};
use crate::error::EngineResult;
use crate::scope::Actor;
use recordkit_store::{cell, OrderBy, Row, ID_COLUMN};
use serde_json::{json, Value};

/// A parent row with its association fields split off.
struct Split {
    row: Row,
    children: Vec<(&'static Association, Vec<Row>)>,
}

fn split<T: Entity>(entity: &T) -> EngineResult<Split> {
    let mut row = to_row(T::TABLE, entity)?;
    let mut children = Vec::new();
    for association in T::associations() {
        if let Some(Value::Array(items)) = row.remove(association.name) {
            let rows = items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(child) => Some(child),
                    _ => None,
                })
                .collect();
            children.push((association, rows));
        }
    }
    Ok(Split { row, children })
}

fn stamp(row: &mut Row, columns: [&str; 3], actor: &Actor, at: LocalTime) {
    let [at_column, by_column, name_column] = columns;
    row.insert(at_column.to_string(), Value::String(at.to_string()));
    row.insert(by_column.to_string(), Value::String(actor.id.clone()));
    row.insert(name_column.to_string(), Value::String(actor.name.clone()));
}

/// Prepares a row for insertion: stamped creator, no updater, store-assigned id.
fn prepare_insert(row: &mut Row, actor: &Actor, at: LocalTime) {
    stamp(row, CREATE_ONLY_COLUMNS, actor, at);
    for column in UPDATE_ONLY_COLUMNS {
        row.remove(column);
    }
    if cell(row, ID_COLUMN).as_u64() == Some(0) {
        row.remove(ID_COLUMN);
    }
}

fn is_new(row: &Row) -> bool {
    cell(row, ID_COLUMN).as_u64().unwrap_or(0) == 0
}

impl<T: Entity> Model<T> {
    /// Inserts the registered instance together with its association
    /// children.
    ///
    /// The instance is stamped with the actor as creator and the store's
    /// assigned identifiers are written back into it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EngineError::MissingActor`] without writing anything
    /// if the request has no actor, or a storage error.
    pub fn create(&self) -> EngineResult<T> {
        let entity = self.entity()?;
        let draft = entity.read().clone();
        let created = self.insert_entity(&draft)?;
        *entity.write() = created.clone();
        self.remember(&created);
        self.scope.record_audit(
            T::TABLE,
            created.id(),
            KIND_CREATE,
            "create",
            serde_json::to_value(T::default())?,
            serde_json::to_value(&created)?,
        )?;
        Ok(created)
    }

    /// Inserts `data` instead of the registered instance, which is left as is.
    ///
    /// # Errors
    ///
    /// Same as [`Model::create`].
    pub fn create_with_data(&self, data: T) -> EngineResult<T> {
        let created = self.insert_entity(&data)?;
        self.scope.record_audit(
            T::TABLE,
            created.id(),
            KIND_CREATE,
            "create",
            serde_json::to_value(T::default())?,
            serde_json::to_value(&created)?,
        )?;
        Ok(created)
    }

    /// Saves the registered instance and its association children.
    ///
    /// Creator columns are never overwritten. Children without an identifier
    /// are inserted; the rest are saved by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EngineError::MissingActor`] without writing anything
    /// if the request has no actor, or a storage error.
    pub fn update(&self) -> EngineResult<T> {
        let entity = self.entity()?;
        let current = entity.read().clone();
        let before = self.loaded.lock().clone().unwrap_or_else(|| current.clone());
        let updated = self.save_entity(&current, "update")?;
        *entity.write() = updated.clone();
        self.remember(&updated);
        self.scope.record_audit(
            T::TABLE,
            updated.id(),
            KIND_UPDATE,
            "update",
            serde_json::to_value(&before)?,
            serde_json::to_value(&updated)?,
        )?;
        Ok(updated)
    }

    /// Saves `data` instead of the registered instance, which is left as is.
    ///
    /// # Errors
    ///
    /// Same as [`Model::update`].
    pub fn update_with_data(&self, data: T) -> EngineResult<T> {
        let updated = self.save_entity(&data, "update")?;
        self.scope.record_audit(
            T::TABLE,
            updated.id(),
            KIND_UPDATE,
            "update",
            serde_json::to_value(&data)?,
            serde_json::to_value(&updated)?,
        )?;
        Ok(updated)
    }

    /// Soft-deletes the rows with `ids`, stamping the deletion time and the
    /// actor as last updater. Returns the number of rows marked.
    ///
    /// Children are left alone. An empty `ids` is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EngineError::MissingActor`] if the request has no
    /// actor, or a storage error.
    pub fn del(&self, ids: &[u64]) -> EngineResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let actor = self.scope.require_actor("delete")?.clone();
        let now = self.scope.now();
        let mut tombstone = Row::new();
        tombstone.insert(DELETED_AT_COLUMN.to_string(), Value::String(now.to_string()));
        tombstone.insert("update_by".to_string(), Value::String(actor.id.clone()));
        tombstone.insert("update_by_name".to_string(), Value::String(actor.name.clone()));

        let touched =
            self.with_store("delete", T::TABLE, |ex| ex.delete(T::TABLE, ids, &tombstone))?;
        tracing::debug!(table = T::TABLE, ?ids, touched, "soft deleted");

        let entity_id = if ids.len() == 1 { ids[0] } else { 0 };
        self.scope.record_audit(
            T::TABLE,
            entity_id,
            KIND_DELETE,
            "delete",
            json!({ "ids": ids }),
            Value::Object(tombstone),
        )?;
        Ok(touched)
    }

    /// Returns the largest live identifier, or 0 for an empty table.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn max_id(&self) -> EngineResult<u64> {
        let query = self.base_query().order_by(OrderBy::desc(ID_COLUMN)).limit(1);
        let rows = self.with_store("max_id", T::TABLE, |ex| ex.find(T::TABLE, &query))?;
        Ok(rows
            .first()
            .and_then(|row| cell(row, ID_COLUMN).as_u64())
            .unwrap_or(0))
    }

    fn insert_entity(&self, entity: &T) -> EngineResult<T> {
        let actor = self.scope.require_actor("create")?.clone();
        let now = self.scope.now();
        let Split { mut row, children } = split(entity)?;
        prepare_insert(&mut row, &actor, now);

        let mut stored = self.with_store("create", T::TABLE, |ex| ex.insert(T::TABLE, row))?;
        for (association, rows) in children {
            let parent = cell(&stored, association.references).clone();
            let mut saved = Vec::with_capacity(rows.len());
            for mut child in rows {
                child.insert(association.foreign_key.to_string(), parent.clone());
                prepare_insert(&mut child, &actor, now);
                let child = self.with_store("create", association.table, |ex| {
                    ex.insert(association.table, child)
                })?;
                saved.push(Value::Object(child));
            }
            stored.insert(association.name.to_string(), Value::Array(saved));
        }
        tracing::debug!(table = T::TABLE, id = %cell(&stored, ID_COLUMN), "created");
        from_row(stored)
    }

    pub(crate) fn save_entity(&self, entity: &T, operation: &'static str) -> EngineResult<T> {
        let actor = self.scope.require_actor(operation)?.clone();
        let now = self.scope.now();
        let Split { mut row, children } = split(entity)?;
        let mut stored = self.save_row(T::TABLE, &mut row, &actor, now)?;

        for (association, rows) in children {
            let parent = cell(&stored, association.references).clone();
            let mut saved = Vec::with_capacity(rows.len());
            for mut child in rows {
                child.insert(association.foreign_key.to_string(), parent.clone());
                let row = self.save_row(association.table, &mut child, &actor, now)?;
                saved.push(Value::Object(row));
            }
            stored.insert(association.name.to_string(), Value::Array(saved));
        }
        tracing::debug!(table = T::TABLE, id = %cell(&stored, ID_COLUMN), "saved");
        from_row(stored)
    }

    fn save_row(
        &self,
        table: &str,
        row: &mut Row,
        actor: &Actor,
        now: LocalTime,
    ) -> EngineResult<Row> {
        if is_new(row) {
            prepare_insert(row, actor, now);
            let row = std::mem::take(row);
            return self.with_store("update", table, |ex| ex.insert(table, row));
        }
        stamp(row, UPDATE_ONLY_COLUMNS, actor, now);
        let row = std::mem::take(row);
        self.with_store("update", table, |ex| ex.save(table, row, &CREATE_ONLY_COLUMNS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_insert_strips_updater_and_zero_id() {
        let mut row = json!({"id": 0, "update_by": "x", "updated_at": null, "name": "a"})
            .as_object()
            .cloned()
            .unwrap();
        let at = LocalTime::parse("2024-05-01 10:00:00").unwrap();
        prepare_insert(&mut row, &Actor::new("u1", "Alice"), at);
        assert!(!row.contains_key("id"));
        assert!(!row.contains_key("update_by"));
        assert_eq!(row["create_by"], "u1");
        assert_eq!(row["created_at"], "2024-05-01 10:00:00");
    }

    #[test]
    fn explicit_id_is_kept() {
        let mut row = json!({"id": 7}).as_object().cloned().unwrap();
        let at = LocalTime::parse("2024-05-01").unwrap();
        prepare_insert(&mut row, &Actor::new("u1", "Alice"), at);
        assert_eq!(row["id"], 7);
        assert!(!is_new(&row));
    }
}
