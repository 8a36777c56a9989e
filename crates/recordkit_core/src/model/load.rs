//! Loads, fresh reads, and list queries.
//!
//! Loads write the row into the registered instance and remember it as the
//! loaded image. Fresh reads (`get_*`, `list_*`, `count_*`) never touch the
//! registered instance.

use super::{Model, Preloads};
use crate::condition::{validate_column, Condition};
use crate::entity::{association, from_row, Association, Entity, DELETED_AT_COLUMN};
use crate::error::{EngineError, EngineResult};
use recordkit_store::{cell, render_cell, OrderBy, Query, Row, ID_COLUMN};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Default order of preloaded children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChildOrder {
    Ascending,
    Descending,
}

impl ChildOrder {
    fn clause(self) -> OrderBy {
        match self {
            Self::Ascending => OrderBy::asc(ID_COLUMN),
            Self::Descending => OrderBy::desc(ID_COLUMN),
        }
    }
}

fn with_default_order(query: Query) -> Query {
    if query.has_order() {
        query
    } else {
        query.order_by(OrderBy::asc(ID_COLUMN))
    }
}

impl<T: Entity> Model<T> {
    /// Loads the first live row matching `condition` into the registered
    /// instance, eager-loading `preloads`.
    ///
    /// Rows are taken in identifier order unless the condition orders them.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] if nothing matches.
    pub fn load_data(&self, condition: &Condition, preloads: Option<&Preloads>) -> EngineResult<T> {
        self.load_query(condition.apply(self.base_query()), preloads, "load_data")
    }

    /// Loads the live row with `id` into the registered instance.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] if there is no such live row.
    pub fn load_by_id(&self, id: u64, preloads: Option<&Preloads>) -> EngineResult<T> {
        self.load_query(self.base_query().eq(ID_COLUMN, id), preloads, "load_by_id")
    }

    /// Loads the first live row whose `column` equals `value`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidColumn`] for a malformed column, or
    /// [`EngineError::NotFound`] if nothing matches.
    pub fn load_by_business_code(
        &self,
        column: &str,
        value: impl Into<Value>,
        preloads: Option<&Preloads>,
    ) -> EngineResult<T> {
        validate_column(column)?;
        self.load_query(
            self.base_query().eq(column, value),
            preloads,
            "load_by_business_code",
        )
    }

    /// Reads the live row with `id` without touching the registered instance.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] if there is no such live row.
    pub fn get_by_id(&self, id: u64, preloads: Option<&Preloads>) -> EngineResult<T> {
        let query = with_default_order(self.base_query().eq(ID_COLUMN, id));
        let row = self.with_store("get_by_id", T::TABLE, |ex| ex.first(T::TABLE, &query))?;
        self.hydrate_one(row, preloads, ChildOrder::Ascending)
    }

    /// Reads the live rows with `ids`, in the model's custom order or by
    /// identifier.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn get_by_ids(&self, ids: &[u64], preloads: Option<&Preloads>) -> EngineResult<Vec<T>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut query = self.base_query().is_in(ID_COLUMN, ids.iter().copied());
        for clause in &self.options.custom_order {
            query = query.order_by(clause.clone());
        }
        let rows = self.fetch("get_by_ids", &with_default_order(query))?;
        self.hydrate(rows, preloads, ChildOrder::Ascending)
    }

    /// Reads the live rows with `ids` in store order.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn list_by_ids(&self, ids: &[u64], preloads: Option<&Preloads>) -> EngineResult<Vec<T>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = self.base_query().is_in(ID_COLUMN, ids.iter().copied());
        let rows = self.fetch("list_by_ids", &query)?;
        self.hydrate(rows, preloads, ChildOrder::Ascending)
    }

    /// Reads the live rows whose `column` equals `value`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidColumn`] for a malformed column, or a
    /// storage error.
    pub fn list_by_business_code(
        &self,
        column: &str,
        value: impl Into<Value>,
        preloads: Option<&Preloads>,
    ) -> EngineResult<Vec<T>> {
        validate_column(column)?;
        let query = self.base_query().eq(column, value);
        let rows = self.fetch("list_by_business_code", &query)?;
        self.hydrate(rows, preloads, ChildOrder::Ascending)
    }

    /// Reads the live rows whose `column` is one of `values`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::EmptyBatch`] for an empty `values`,
    /// [`EngineError::InvalidColumn`] for a malformed column, or a storage
    /// error.
    pub fn list_by_business_codes<V>(
        &self,
        column: &str,
        values: &[V],
        preloads: Option<&Preloads>,
    ) -> EngineResult<Vec<T>>
    where
        V: Clone + Into<Value>,
    {
        let query = self.codes_query("list_by_business_codes", column, values)?;
        let rows = self.fetch("list_by_business_codes", &query)?;
        self.hydrate(rows, preloads, ChildOrder::Ascending)
    }

    /// Counts the live rows whose `column` equals `value`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidColumn`] for a malformed column, or a
    /// storage error.
    pub fn count_by_business_code(
        &self,
        column: &str,
        value: impl Into<Value>,
    ) -> EngineResult<u64> {
        validate_column(column)?;
        let query = self.base_query().eq(column, value);
        self.with_store("count_by_business_code", T::TABLE, |ex| ex.count(T::TABLE, &query))
    }

    /// Counts the live rows whose `column` is one of `values`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::EmptyBatch`] for an empty `values`,
    /// [`EngineError::InvalidColumn`] for a malformed column, or a storage
    /// error.
    pub fn count_by_business_codes<V>(&self, column: &str, values: &[V]) -> EngineResult<u64>
    where
        V: Clone + Into<Value>,
    {
        let query = self.codes_query("count_by_business_codes", column, values)?;
        self.with_store("count_by_business_codes", T::TABLE, |ex| ex.count(T::TABLE, &query))
    }

    /// Lists live rows.
    ///
    /// The default condition, the permission conditions, then `conditions`
    /// are applied in that order. Rows are ordered by the custom order, or
    /// newest first, and the model's preloads are attached with their
    /// children newest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error, or [`EngineError::UnknownAssociation`] for a
    /// bad preload.
    pub fn list(&self, conditions: &[Condition]) -> EngineResult<Vec<T>> {
        let mut query = self.filtered_query(conditions);
        if self.options.custom_order.is_empty() {
            query = query.order_by(OrderBy::desc(ID_COLUMN));
        } else {
            for clause in &self.options.custom_order {
                query = query.order_by(clause.clone());
            }
        }
        let rows = self.fetch("list", &query)?;
        let preloads = self.options.preloads.clone();
        self.hydrate(rows, Some(&preloads), ChildOrder::Descending)
    }

    /// Counts the rows [`Model::list`] would return, ignoring pagination.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn count(&self, conditions: &[Condition]) -> EngineResult<u64> {
        let query = self.filtered_query(conditions).clear_pagination();
        self.with_store("count", T::TABLE, |ex| ex.count(T::TABLE, &query))
    }

    fn load_query(
        &self,
        query: Query,
        preloads: Option<&Preloads>,
        operation: &'static str,
    ) -> EngineResult<T> {
        let entity = self.entity()?;
        let query = with_default_order(query);
        let row = self.with_store(operation, T::TABLE, |ex| ex.first(T::TABLE, &query))?;
        let loaded = self.hydrate_one(row, preloads, ChildOrder::Ascending)?;
        *entity.write() = loaded.clone();
        self.remember(&loaded);
        tracing::debug!(table = T::TABLE, id = loaded.id(), operation, "loaded");
        Ok(loaded)
    }

    fn codes_query<V>(
        &self,
        operation: &'static str,
        column: &str,
        values: &[V],
    ) -> EngineResult<Query>
    where
        V: Clone + Into<Value>,
    {
        if values.is_empty() {
            return Err(EngineError::EmptyBatch { operation });
        }
        validate_column(column)?;
        Ok(self.base_query().is_in(column, values.iter().cloned()))
    }

    fn fetch(&self, operation: &'static str, query: &Query) -> EngineResult<Vec<Row>> {
        self.with_store(operation, T::TABLE, |ex| ex.find(T::TABLE, query))
    }

    fn hydrate_one(
        &self,
        row: Row,
        preloads: Option<&Preloads>,
        order: ChildOrder,
    ) -> EngineResult<T> {
        self.hydrate(vec![row], preloads, order)?
            .pop()
            .ok_or_else(|| EngineError::NotFound {
                table: T::TABLE.to_string(),
            })
    }

    fn hydrate(
        &self,
        mut rows: Vec<Row>,
        preloads: Option<&Preloads>,
        order: ChildOrder,
    ) -> EngineResult<Vec<T>> {
        if let Some(preloads) = preloads {
            for preload in preloads.iter() {
                let association = association::<T>(&preload.name)?;
                self.attach_children(&mut rows, association, preload.condition.as_ref(), order)?;
            }
        }
        rows.into_iter().map(from_row).collect()
    }

    /// Fetches the children of every row in one query and groups them by
    /// parent key.
    fn attach_children(
        &self,
        rows: &mut [Row],
        association: &'static Association,
        condition: Option<&Condition>,
        order: ChildOrder,
    ) -> EngineResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut seen = HashSet::new();
        let keys: Vec<Value> = rows
            .iter()
            .map(|row| cell(row, association.references))
            .filter(|key| !key.is_null() && seen.insert(render_cell(key)))
            .cloned()
            .collect();

        let mut grouped: HashMap<String, Vec<Value>> = HashMap::new();
        if !keys.is_empty() {
            let mut query = Query::new()
                .is_null(DELETED_AT_COLUMN)
                .is_in(association.foreign_key, keys);
            if let Some(condition) = condition {
                query = condition.apply(query);
            }
            if !query.has_order() {
                query = query.order_by(order.clause());
            }
            let children = self.with_store("preload", association.table, |ex| {
                ex.find(association.table, &query)
            })?;
            for child in children {
                let key = render_cell(cell(&child, association.foreign_key));
                grouped.entry(key).or_default().push(Value::Object(child));
            }
        }

        for row in rows.iter_mut() {
            let key = render_cell(cell(row, association.references));
            let children = grouped.get(&key).cloned().unwrap_or_default();
            row.insert(association.name.to_string(), Value::Array(children));
        }
        Ok(())
    }
}
