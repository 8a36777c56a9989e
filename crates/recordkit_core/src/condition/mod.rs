//! Composable query conditions and the search-spec condition builder.
//!
//! A [`Condition`] is a function that narrows a [`Query`]. Conditions from
//! different sources (a model's default filter, permission filters, caller
//! filters) are applied one after another, so their predicates are ANDed.
//!
//! Search request objects describe their filters declaratively through
//! [`SearchSpec::search_fields`]; [`make_condition`] turns that list into one
//! condition.

mod column;

pub use column::{escape_like, parse_order, validate_column};

use crate::error::EngineResult;
use recordkit_store::{is_empty_value, render_cell, OrderBy, Predicate, Query, ID_COLUMN};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A reusable query transformation.
#[derive(Clone)]
pub struct Condition(Arc<dyn Fn(Query) -> Query + Send + Sync>);

impl Condition {
    /// Wraps a query transformation.
    pub fn new(f: impl Fn(Query) -> Query + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// A condition that leaves the query unchanged.
    #[must_use]
    pub fn identity() -> Self {
        Self::new(|q| q)
    }

    /// Adds one predicate.
    #[must_use]
    pub fn filter(predicate: Predicate) -> Self {
        Self::new(move |q| q.filter(predicate.clone()))
    }

    /// Appends ordering clauses.
    #[must_use]
    pub fn order(clauses: Vec<OrderBy>) -> Self {
        Self::new(move |q| clauses.iter().cloned().fold(q, Query::order_by))
    }

    /// Removes limit and offset.
    #[must_use]
    pub fn clear_pagination() -> Self {
        Self::new(Query::clear_pagination)
    }

    /// Orders by descending identifier.
    #[must_use]
    pub fn order_by_id_desc() -> Self {
        Self::new(|q| q.order_by(OrderBy::desc(ID_COLUMN)))
    }

    /// Orders by ascending identifier.
    #[must_use]
    pub fn order_by_id_asc() -> Self {
        Self::new(|q| q.order_by(OrderBy::asc(ID_COLUMN)))
    }

    /// Applies the condition.
    #[must_use]
    pub fn apply(&self, query: Query) -> Query {
        (self.0)(query)
    }

    /// Applies `self`, then `next`.
    #[must_use]
    pub fn and(self, next: Condition) -> Self {
        Self::new(move |q| next.apply(self.apply(q)))
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Condition(..)")
    }
}

impl From<Predicate> for Condition {
    fn from(predicate: Predicate) -> Self {
        Self::filter(predicate)
    }
}

/// Applies conditions in order.
pub(crate) fn apply_all<'a>(
    query: Query,
    conditions: impl IntoIterator<Item = &'a Condition>,
) -> Query {
    conditions.into_iter().fold(query, |q, c| c.apply(q))
}

/// The predicate kind of a search field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    /// `column = value`.
    Eq,
    /// `column LIKE %value%`.
    Like,
    /// `column BETWEEN lower AND upper`.
    Between,
    /// 1-based page number.
    Page,
    /// Rows per page.
    PageSize,
}

/// One declared search field: its kind, target column, and current value.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchField {
    /// Predicate kind.
    pub kind: SearchKind,
    /// Target column, qualified with its table when one was given.
    pub column: String,
    /// The value supplied by the request.
    pub value: Value,
}

impl SearchField {
    fn column_field(kind: SearchKind, table: &str, column: &str, value: Value) -> Self {
        let column = if table.is_empty() {
            column.to_string()
        } else {
            format!("{table}.{column}")
        };
        Self {
            kind,
            column,
            value,
        }
    }

    /// An equality field.
    pub fn eq(table: &str, column: &str, value: impl Into<Value>) -> Self {
        Self::column_field(SearchKind::Eq, table, column, value.into())
    }

    /// A substring match field.
    pub fn like(table: &str, column: &str, value: impl Into<Value>) -> Self {
        Self::column_field(SearchKind::Like, table, column, value.into())
    }

    /// A range field; `bounds` should hold `[lower, upper]`.
    pub fn between(table: &str, column: &str, bounds: impl Into<Value>) -> Self {
        Self::column_field(SearchKind::Between, table, column, bounds.into())
    }

    /// The page number field.
    #[must_use]
    pub fn page(page: u64) -> Self {
        Self {
            kind: SearchKind::Page,
            column: String::new(),
            value: Value::from(page),
        }
    }

    /// The page size field.
    #[must_use]
    pub fn page_size(size: u64) -> Self {
        Self {
            kind: SearchKind::PageSize,
            column: String::new(),
            value: Value::from(size),
        }
    }
}

/// A search request that declares its filter fields.
pub trait SearchSpec {
    /// Returns every declared field with its current value.
    fn search_fields(&self) -> Vec<SearchField>;
}

/// Builds one condition from a search spec.
///
/// Empty values (null, `""`, 0, `false`, empty arrays) are skipped. A range
/// needs two non-empty bounds or it is skipped. Pagination applies only when
/// both page and page size are positive.
///
/// # Errors
///
/// Returns [`crate::EngineError::InvalidColumn`] if a field names a column
/// outside the allow-list.
pub fn make_condition<S: SearchSpec + ?Sized>(spec: &S) -> EngineResult<Condition> {
    let mut predicates = Vec::new();
    let mut page = 0;
    let mut size = 0;

    for field in spec.search_fields() {
        match field.kind {
            SearchKind::Page => page = as_count(&field.value),
            SearchKind::PageSize => size = as_count(&field.value),
            SearchKind::Eq => {
                validate_column(&field.column)?;
                if !is_empty_value(&field.value) {
                    predicates.push(Predicate::Eq {
                        column: field.column,
                        value: field.value,
                    });
                }
            }
            SearchKind::Like => {
                validate_column(&field.column)?;
                if !is_empty_value(&field.value) {
                    let text = render_cell(&field.value);
                    predicates.push(Predicate::Like {
                        column: field.column,
                        pattern: format!("%{}%", escape_like(&text)),
                    });
                }
            }
            SearchKind::Between => {
                validate_column(&field.column)?;
                if let Value::Array(bounds) = field.value {
                    if let [lower, upper] = bounds.as_slice() {
                        if !is_empty_value(lower) && !is_empty_value(upper) {
                            predicates.push(Predicate::Between {
                                column: field.column,
                                lower: lower.clone(),
                                upper: upper.clone(),
                            });
                        }
                    }
                }
            }
        }
    }

    let pagination = (page > 0 && size > 0).then(|| (size, (page - 1).saturating_mul(size)));
    Ok(Condition::new(move |q| {
        let mut q = predicates.iter().cloned().fold(q, Query::filter);
        if let Some((limit, offset)) = pagination {
            q = q.limit(limit).offset(offset);
        }
        q
    }))
}

fn as_count(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use serde_json::json;

    struct Search {
        order_id: String,
        name_like: String,
        created_at: Vec<String>,
        page: u64,
        page_size: u64,
    }

    impl SearchSpec for Search {
        fn search_fields(&self) -> Vec<SearchField> {
            vec![
                SearchField::eq("sales_order", "order_id", self.order_id.clone()),
                SearchField::like("sales_order", "customer_name", self.name_like.clone()),
                SearchField::between("sales_order", "created_at", self.created_at.clone()),
                SearchField::page(self.page),
                SearchField::page_size(self.page_size),
            ]
        }
    }

    fn empty() -> Search {
        Search {
            order_id: String::new(),
            name_like: String::new(),
            created_at: Vec::new(),
            page: 0,
            page_size: 0,
        }
    }

    #[test]
    fn only_pagination_gives_limit_and_offset() {
        let spec = Search {
            page: 3,
            page_size: 10,
            ..empty()
        };
        let q = make_condition(&spec).unwrap().apply(Query::new());
        assert!(q.predicates().is_empty());
        assert_eq!(q.limit_value(), Some(10));
        assert_eq!(q.offset_value(), Some(20));
    }

    #[test]
    fn missing_page_size_disables_pagination() {
        let spec = Search {
            page: 2,
            ..empty()
        };
        let q = make_condition(&spec).unwrap().apply(Query::new());
        assert_eq!(q.limit_value(), None);
        assert_eq!(q.offset_value(), None);
    }

    #[test]
    fn empty_values_are_skipped() {
        let q = make_condition(&empty()).unwrap().apply(Query::new());
        assert_eq!(q, Query::new());
    }

    #[test]
    fn like_wraps_and_escapes() {
        let spec = Search {
            name_like: "50%".into(),
            ..empty()
        };
        let q = make_condition(&spec).unwrap().apply(Query::new());
        assert_eq!(
            q.predicates(),
            &[Predicate::Like {
                column: "sales_order.customer_name".into(),
                pattern: r"%50\%%".into(),
            }]
        );
    }

    #[test]
    fn one_sided_range_is_skipped() {
        for bounds in [
            vec!["2024-01-01".to_string()],
            vec!["2024-01-01".to_string(), String::new()],
            vec!["a".into(), "b".into(), "c".into()],
        ] {
            let spec = Search {
                created_at: bounds,
                ..empty()
            };
            let q = make_condition(&spec).unwrap().apply(Query::new());
            assert!(q.predicates().is_empty());
        }
    }

    #[test]
    fn full_range_becomes_between() {
        let spec = Search {
            created_at: vec!["2024-01-01 00:00:00".into(), "2024-01-31 23:59:59".into()],
            order_id: "SO1".into(),
            ..empty()
        };
        let q = make_condition(&spec).unwrap().apply(Query::new());
        assert_eq!(q.predicates().len(), 2);
        assert!(matches!(
            &q.predicates()[1],
            Predicate::Between { lower, .. } if lower == "2024-01-01 00:00:00"
        ));
    }

    struct Hostile;

    impl SearchSpec for Hostile {
        fn search_fields(&self) -> Vec<SearchField> {
            vec![SearchField::eq("", "id) or (1=1", json!(1))]
        }
    }

    #[test]
    fn malformed_column_fails() {
        assert!(matches!(
            make_condition(&Hostile),
            Err(EngineError::InvalidColumn { .. })
        ));
    }

    #[test]
    fn conditions_compose_in_order() {
        let c = Condition::filter(Predicate::IsNull {
            column: "deleted_at".into(),
        })
        .and(Condition::order_by_id_desc())
        .and(Condition::clear_pagination());
        let q = c.apply(Query::new().limit(5));
        assert_eq!(q.predicates().len(), 1);
        assert_eq!(q.order(), &[OrderBy::desc("id")]);
        assert_eq!(q.limit_value(), None);
    }

    #[test]
    fn page_values_accept_numeric_strings() {
        assert_eq!(as_count(&json!("4")), 4);
        assert_eq!(as_count(&json!(-1)), 0);
        assert_eq!(as_count(&json!(null)), 0);
    }
}
