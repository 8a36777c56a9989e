//! Business-code and composite-key uniqueness checks.
//!
//! All checks consider live rows only. The single-entity checks exclude the
//! registered instance itself, so re-saving an existing record is not a
//! duplicate of itself.

use super::Model;
use crate::condition::validate_column;
use crate::entity::Entity;
use crate::error::{EngineError, EngineResult};
use recordkit_store::{cell, fingerprint, render_cell};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

fn unqualified(column: &str) -> &str {
    column.rsplit_once('.').map_or(column, |(_, name)| name)
}

/// A match set is a duplicate unless it is empty or only the entity itself.
fn is_duplicate(ids: &[u64], own_id: u64) -> bool {
    match ids {
        [] => false,
        [only] => own_id == 0 || *only != own_id,
        _ => true,
    }
}

fn key_columns(columns: &[&str]) -> EngineResult<Vec<String>> {
    if columns.is_empty() {
        return Err(EngineError::invalid_argument("at least one key column is required"));
    }
    columns
        .iter()
        .map(|column| validate_column(column).map(|()| (*column).to_string()))
        .collect()
}

impl<T: Entity> Model<T> {
    /// Returns true if another live row has `column == value`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidColumn`] for a malformed column, or a
    /// storage error.
    pub fn check_business_code_exist(
        &self,
        column: &str,
        value: impl Into<Value>,
    ) -> EngineResult<bool> {
        validate_column(column)?;
        let own_id = self.entity()?.read().id();
        let query = self.base_query().eq(column, value);
        let ids = self.with_store("check_business_code_exist", T::TABLE, |ex| {
            ex.find_ids(T::TABLE, &query)
        })?;
        Ok(is_duplicate(&ids, own_id))
    }

    /// Fails if another live row has `column == value`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Duplicate`] naming the column and value.
    pub fn business_code_cannot_repeat(
        &self,
        column: &str,
        value: impl Into<Value>,
    ) -> EngineResult<()> {
        let value = value.into();
        if self.check_business_code_exist(column, value.clone())? {
            return Err(EngineError::Duplicate {
                table: T::TABLE.to_string(),
                column: column.to_string(),
                value: render_cell(&value),
            });
        }
        Ok(())
    }

    /// For each of `values`, returns whether a live row has that `column`
    /// value. Results line up with the input.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::BatchTooLarge`] above the configured batch
    /// limit, [`EngineError::InvalidColumn`] for a malformed column, or a
    /// storage error.
    pub fn check_business_codes_exist<V>(
        &self,
        column: &str,
        values: &[V],
    ) -> EngineResult<Vec<bool>>
    where
        V: Clone + Into<Value>,
    {
        self.check_batch_size(values.len())?;
        validate_column(column)?;
        if values.is_empty() {
            return Ok(Vec::new());
        }
        let candidates: Vec<Value> = values.iter().cloned().map(Into::into).collect();
        let query = self.base_query().is_in(column, candidates.clone());
        let rows = self.with_store("check_business_codes_exist", T::TABLE, |ex| {
            ex.find(T::TABLE, &query)
        })?;
        let name = unqualified(column);
        let present: HashSet<String> =
            rows.iter().map(|row| render_cell(cell(row, name))).collect();
        Ok(candidates
            .iter()
            .map(|value| present.contains(&render_cell(value)))
            .collect())
    }

    /// Returns true if another live row has exactly `values` in `columns`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidArgument`] if the lengths differ or no
    /// column is given, [`EngineError::InvalidColumn`] for a malformed
    /// column, or a storage error.
    pub fn check_unique_keys_exist<V>(&self, columns: &[&str], values: &[V]) -> EngineResult<bool>
    where
        V: Clone + Into<Value>,
    {
        let columns = key_columns(columns)?;
        if values.len() != columns.len() {
            return Err(EngineError::invalid_argument(format!(
                "{} key columns but {} values",
                columns.len(),
                values.len()
            )));
        }
        let own_id = self.entity()?.read().id();
        let tuple = values.iter().cloned().map(Into::into).collect();
        let query = self.base_query().tuple_in(columns, vec![tuple]);
        let ids = self.with_store("check_unique_keys_exist", T::TABLE, |ex| {
            ex.find_ids(T::TABLE, &query)
        })?;
        Ok(is_duplicate(&ids, own_id))
    }

    /// For each candidate tuple, returns whether a live row other than those
    /// in `exclude_ids` already has it in `columns`.
    ///
    /// Runs one query for the whole batch. Results line up with the input.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::BatchTooLarge`] above the configured batch limit
    /// before querying anything, [`EngineError::InvalidArgument`] for an
    /// empty column list or a candidate of the wrong length,
    /// [`EngineError::InvalidColumn`] for a malformed column, or a storage
    /// error.
    pub fn check_unique_keys_exist_batch<V>(
        &self,
        columns: &[&str],
        candidates: &[Vec<V>],
        exclude_ids: &[u64],
    ) -> EngineResult<Vec<bool>>
    where
        V: Clone + Into<Value>,
    {
        self.check_batch_size(candidates.len())?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let columns = key_columns(columns)?;
        let tuples: Vec<Vec<Value>> = candidates
            .iter()
            .map(|candidate| {
                if candidate.len() == columns.len() {
                    Ok(candidate.iter().cloned().map(Into::into).collect())
                } else {
                    Err(EngineError::invalid_argument(format!(
                        "candidate has {} values for {} key columns",
                        candidate.len(),
                        columns.len()
                    )))
                }
            })
            .collect::<EngineResult<_>>()?;

        let delimiter = self.scope.config().fingerprint_delimiter;
        let query = self.base_query().tuple_in(columns.clone(), tuples.clone());
        let prints = self.with_store("check_unique_keys_exist_batch", T::TABLE, |ex| {
            ex.fingerprints(T::TABLE, &columns, delimiter, &query)
        })?;

        let mut owners: HashMap<String, Vec<u64>> = HashMap::new();
        for (id, print) in prints {
            owners.entry(print).or_default().push(id);
        }
        let exclude: HashSet<u64> = exclude_ids.iter().copied().collect();
        Ok(tuples
            .iter()
            .map(|tuple| {
                let print = fingerprint(tuple, delimiter);
                owners
                    .get(&print)
                    .is_some_and(|ids| ids.iter().any(|id| !exclude.contains(id)))
            })
            .collect())
    }

    fn check_batch_size(&self, size: usize) -> EngineResult<()> {
        let limit = self.scope.config().batch_limit;
        if size > limit {
            return Err(EngineError::BatchTooLarge { size, limit });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_row_is_not_a_duplicate() {
        assert!(!is_duplicate(&[], 0));
        assert!(!is_duplicate(&[4], 4));
        assert!(is_duplicate(&[4], 5));
        assert!(is_duplicate(&[4], 0));
        assert!(is_duplicate(&[4, 5], 4));
    }

    #[test]
    fn unqualified_strips_table() {
        assert_eq!(unqualified("sales_order.order_id"), "order_id");
        assert_eq!(unqualified("order_id"), "order_id");
    }
}
