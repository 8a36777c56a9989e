//! Row and query model.
//!
//! Queries are plain data. Every backend evaluates the same [`Predicate`]
//! semantics, so the engine can compose conditions without knowing which
//! store will run them.

use crate::error::{StoreError, StoreResult};
use crate::pattern;
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;

/// One table row: column name to cell value.
pub type Row = Map<String, Value>;

/// Name of the store-assigned identifier column.
pub const ID_COLUMN: &str = "id";

static NULL: Value = Value::Null;

/// A single filter over one or more columns.
///
/// Column references may be qualified (`table.column`); the qualifier must
/// name the table being queried.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column = value`.
    Eq {
        /// Target column.
        column: String,
        /// Value to compare with.
        value: Value,
    },
    /// `column LIKE pattern`, with `%` and `_` wildcards and `\` escapes.
    Like {
        /// Target column.
        column: String,
        /// The wildcard pattern.
        pattern: String,
    },
    /// `column BETWEEN lower AND upper`, both bounds inclusive.
    Between {
        /// Target column.
        column: String,
        /// Inclusive lower bound.
        lower: Value,
        /// Inclusive upper bound.
        upper: Value,
    },
    /// `column IN (values)`.
    In {
        /// Target column.
        column: String,
        /// Accepted values.
        values: Vec<Value>,
    },
    /// `(c1, c2, ...) IN ((v1, v2, ...), ...)`.
    TupleIn {
        /// Target columns, in tuple order.
        columns: Vec<String>,
        /// Accepted tuples.
        values: Vec<Vec<Value>>,
    },
    /// `column IS NULL` (absent columns are null).
    IsNull {
        /// Target column.
        column: String,
    },
}

impl Predicate {
    /// Evaluates this predicate against one row of `table`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidQuery`] if a column is qualified with a
    /// different table or a `LIKE` pattern cannot be compiled.
    pub fn matches(&self, table: &str, row: &Row) -> StoreResult<bool> {
        let matched = match self {
            Self::Eq { column, value } => loose_eq(cell(row, resolve(table, column)?), value),
            Self::Like { column, pattern } => {
                let text = match cell(row, resolve(table, column)?) {
                    Value::Null => return Ok(false),
                    Value::String(s) => s.clone(),
                    other => render_cell(other),
                };
                pattern::like(&text, pattern).map_err(|e| {
                    StoreError::invalid_query(table, format!("invalid LIKE pattern: {e}"))
                })?
            }
            Self::Between {
                column,
                lower,
                upper,
            } => {
                let value = cell(row, resolve(table, column)?);
                !value.is_null()
                    && compare_values(value, lower) != Ordering::Less
                    && compare_values(value, upper) != Ordering::Greater
            }
            Self::In { column, values } => {
                let value = cell(row, resolve(table, column)?);
                values.iter().any(|candidate| loose_eq(value, candidate))
            }
            Self::TupleIn { columns, values } => {
                let cells = columns
                    .iter()
                    .map(|c| resolve(table, c).map(|c| cell(row, c)))
                    .collect::<StoreResult<Vec<_>>>()?;
                values.iter().any(|tuple| {
                    tuple.len() == cells.len()
                        && tuple.iter().zip(&cells).all(|(want, have)| loose_eq(have, want))
                })
            }
            Self::IsNull { column } => cell(row, resolve(table, column)?).is_null(),
        };
        Ok(matched)
    }
}

/// One ordering clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Column to order by.
    pub column: String,
    /// Descending if true.
    pub descending: bool,
}

impl OrderBy {
    /// Ascending order on `column`.
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    /// Descending order on `column`.
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }
}

/// A conjunction of predicates plus ordering and pagination.
///
/// Built by chaining; every method consumes and returns the query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    predicates: Vec<Predicate>,
    order: Vec<OrderBy>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Query {
    /// Creates an empty query matching every row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a predicate.
    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Adds `column = value`.
    #[must_use]
    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Predicate::Eq {
            column: column.into(),
            value: value.into(),
        })
    }

    /// Adds `column LIKE pattern`.
    #[must_use]
    pub fn like(self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.filter(Predicate::Like {
            column: column.into(),
            pattern: pattern.into(),
        })
    }

    /// Adds `column BETWEEN lower AND upper`.
    #[must_use]
    pub fn between(
        self,
        column: impl Into<String>,
        lower: impl Into<Value>,
        upper: impl Into<Value>,
    ) -> Self {
        self.filter(Predicate::Between {
            column: column.into(),
            lower: lower.into(),
            upper: upper.into(),
        })
    }

    /// Adds `column IN (values)`.
    #[must_use]
    pub fn is_in<V: Into<Value>>(
        self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.filter(Predicate::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    /// Adds `(columns) IN (tuples)`.
    #[must_use]
    pub fn tuple_in(self, columns: Vec<String>, values: Vec<Vec<Value>>) -> Self {
        self.filter(Predicate::TupleIn { columns, values })
    }

    /// Adds `column IS NULL`.
    #[must_use]
    pub fn is_null(self, column: impl Into<String>) -> Self {
        self.filter(Predicate::IsNull {
            column: column.into(),
        })
    }

    /// Appends an ordering clause.
    #[must_use]
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order.push(order);
        self
    }

    /// Sets the maximum number of rows returned.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the number of matching rows skipped.
    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Removes limit and offset.
    #[must_use]
    pub fn clear_pagination(mut self) -> Self {
        self.limit = None;
        self.offset = None;
        self
    }

    /// Removes all ordering clauses.
    #[must_use]
    pub fn clear_order(mut self) -> Self {
        self.order.clear();
        self
    }

    /// Returns the predicates.
    #[must_use]
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Returns the ordering clauses.
    #[must_use]
    pub fn order(&self) -> &[OrderBy] {
        &self.order
    }

    /// Returns true if an ordering clause is set.
    #[must_use]
    pub fn has_order(&self) -> bool {
        !self.order.is_empty()
    }

    /// Returns the limit.
    #[must_use]
    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    /// Returns the offset.
    #[must_use]
    pub fn offset_value(&self) -> Option<u64> {
        self.offset
    }

    /// Returns true if every predicate matches the row.
    ///
    /// # Errors
    ///
    /// Propagates predicate evaluation errors.
    pub fn matches(&self, table: &str, row: &Row) -> StoreResult<bool> {
        for predicate in &self.predicates {
            if !predicate.matches(table, row)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Filters, orders, and paginates `rows`.
    ///
    /// Rows are expected in ascending id order; without ordering clauses that
    /// order is kept.
    ///
    /// # Errors
    ///
    /// Propagates predicate evaluation and column resolution errors.
    pub fn select<'a, I>(&self, table: &str, rows: I) -> StoreResult<Vec<&'a Row>>
    where
        I: IntoIterator<Item = &'a Row>,
    {
        let mut selected = Vec::new();
        for row in rows {
            if self.matches(table, row)? {
                selected.push(row);
            }
        }

        if !self.order.is_empty() {
            let keys = self
                .order
                .iter()
                .map(|o| resolve(table, &o.column).map(|c| (c, o.descending)))
                .collect::<StoreResult<Vec<_>>>()?;
            selected.sort_by(|a, b| {
                for (column, descending) in &keys {
                    let ord = compare_values(cell(a, column), cell(b, column));
                    let ord = if *descending { ord.reverse() } else { ord };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let offset = usize::try_from(self.offset.unwrap_or(0)).unwrap_or(usize::MAX);
        let limit = self
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        Ok(selected.into_iter().skip(offset).take(limit).collect())
    }
}

/// Strips a table qualifier from `column`.
fn resolve<'c>(table: &str, column: &'c str) -> StoreResult<&'c str> {
    match column.split_once('.') {
        None => Ok(column),
        Some((qualifier, name)) if qualifier == table => Ok(name),
        Some((qualifier, _)) => Err(StoreError::invalid_query(
            table,
            format!("column {column} is qualified with foreign table {qualifier}"),
        )),
    }
}

/// Returns the cell at `column`, or null if the row has no such column.
#[must_use]
pub fn cell<'r>(row: &'r Row, column: &str) -> &'r Value {
    row.get(column).unwrap_or(&NULL)
}

/// Renders a cell as text: null becomes the empty string.
#[must_use]
pub fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => "0".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Renders `cells` and joins them with `delimiter` into one comparable key.
///
/// Backslashes and characters of `delimiter` inside a cell are escaped with
/// a backslash, so distinct tuples never share a key. `delimiter` must not
/// contain a backslash.
#[must_use]
pub fn fingerprint<'a>(cells: impl IntoIterator<Item = &'a Value>, delimiter: &str) -> String {
    let mut out = String::new();
    for (i, value) in cells.into_iter().enumerate() {
        if i > 0 {
            out.push_str(delimiter);
        }
        for c in render_cell(value).chars() {
            if c == '\\' || delimiter.contains(c) {
                out.push('\\');
            }
            out.push(c);
        }
    }
    out
}

/// Returns true for null, empty strings/collections, zero, and `false`.
#[must_use]
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Equality with numeric coercion.
///
/// Numbers compare by value, and a string equals a number when it is that
/// number's decimal rendering.
#[must_use]
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => cmp_numbers(x, y) == Ordering::Equal,
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            *s == n.to_string()
        }
        _ => a == b,
    }
}

/// Total order over cells used for sorting and range predicates.
///
/// Null sorts first. A numeric string compares numerically with a number.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => cmp_numbers(x, y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Number(n), Value::String(s)) => match s.parse::<f64>() {
            Ok(parsed) => cmp_f64(n.as_f64().unwrap_or(0.0), parsed),
            Err(_) => rank(a).cmp(&rank(b)),
        },
        (Value::String(s), Value::Number(n)) => match s.parse::<f64>() {
            Ok(parsed) => cmp_f64(parsed, n.as_f64().unwrap_or(0.0)),
            Err(_) => rank(a).cmp(&rank(b)),
        },
        (Value::Array(x), Value::Array(y)) => {
            for (xv, yv) in x.iter().zip(y) {
                let ord = compare_values(xv, yv);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn cmp_numbers(x: &Number, y: &Number) -> Ordering {
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return a.cmp(&b);
    }
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        return a.cmp(&b);
    }
    cmp_f64(x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0))
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn eq_coerces_numbers_and_strings() {
        let r = row(json!({"id": 7, "status": 1}));
        assert!(Predicate::Eq {
            column: "status".into(),
            value: json!("1")
        }
        .matches("t", &r)
        .unwrap());
        assert!(Query::new().eq("id", 7u64).matches("t", &r).unwrap());
    }

    #[test]
    fn qualified_columns_must_name_the_table() {
        let r = row(json!({"order_id": "SO1"}));
        assert!(Query::new()
            .eq("sales_order.order_id", "SO1")
            .matches("sales_order", &r)
            .unwrap());
        assert!(Query::new()
            .eq("customer.order_id", "SO1")
            .matches("sales_order", &r)
            .is_err());
    }

    #[test]
    fn between_is_inclusive_and_skips_null() {
        let r = row(json!({"created_at": "2024-05-01 10:00:00"}));
        let q = Query::new().between("created_at", "2024-05-01 00:00:00", "2024-05-01 10:00:00");
        assert!(q.matches("t", &r).unwrap());

        let empty = row(json!({}));
        assert!(!q.matches("t", &empty).unwrap());
    }

    #[test]
    fn tuple_in_matches_whole_tuples() {
        let r = row(json!({"a": "A", "b": "X"}));
        let q = Query::new().tuple_in(
            vec!["a".into(), "b".into()],
            vec![vec![json!("A"), json!("Y")], vec![json!("A"), json!("X")]],
        );
        assert!(q.matches("t", &r).unwrap());

        let miss = Query::new().tuple_in(vec!["a".into(), "b".into()], vec![vec![json!("A")]]);
        assert!(!miss.matches("t", &r).unwrap());
    }

    #[test]
    fn is_null_treats_absent_as_null() {
        let r = row(json!({"deleted_at": null}));
        assert!(Query::new().is_null("deleted_at").matches("t", &r).unwrap());
        assert!(Query::new().is_null("missing").matches("t", &r).unwrap());
    }

    #[test]
    fn select_orders_then_paginates() {
        let rows: Vec<Row> = (1..=5)
            .map(|i| row(json!({"id": i, "group": i % 2})))
            .collect();
        let q = Query::new()
            .order_by(OrderBy::desc("id"))
            .offset(1)
            .limit(2);
        let ids: Vec<u64> = q
            .select("t", &rows)
            .unwrap()
            .iter()
            .map(|r| r["id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, vec![4, 3]);
    }

    #[test]
    fn select_without_order_keeps_input_order() {
        let rows: Vec<Row> = (1..=3).map(|i| row(json!({"id": i}))).collect();
        let selected = Query::new().select("t", &rows).unwrap();
        assert_eq!(selected.len(), 3);
        assert_eq!(selected[0]["id"], 1);
    }

    #[test]
    fn render_and_emptiness() {
        assert_eq!(render_cell(&Value::Null), "");
        assert_eq!(render_cell(&json!(12)), "12");
        assert_eq!(render_cell(&json!("x")), "x");
        assert!(is_empty_value(&json!(0)));
        assert!(is_empty_value(&json!("")));
        assert!(!is_empty_value(&json!("0")));
    }

    #[test]
    fn fingerprints_escape_the_delimiter() {
        let key = |cells: &[Value]| fingerprint(cells, "|");
        assert_eq!(key(&[json!("A"), json!(1), Value::Null]), "A|1|");
        assert_ne!(key(&[json!("a|b"), json!("c")]), key(&[json!("a"), json!("b|c")]));
        assert_ne!(key(&[json!("a\\"), json!("b")]), key(&[json!("a"), json!("\\b")]));
        assert_eq!(key(&[json!("a|b")]), r"a\|b");
    }

    #[test]
    fn compare_numeric_strings_with_numbers() {
        assert_eq!(compare_values(&json!(10), &json!("9")), Ordering::Greater);
        assert_eq!(compare_values(&Value::Null, &json!(0)), Ordering::Less);
    }
}
