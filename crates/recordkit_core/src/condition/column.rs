//! Column allow-list and order clause parsing.

use crate::error::{EngineError, EngineResult};
use once_cell::sync::Lazy;
use recordkit_store::OrderBy;
use regex::Regex;

static COLUMN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").ok());

/// Checks that `column` is a bare or `table.column` identifier.
///
/// # Errors
///
/// Returns [`EngineError::InvalidColumn`] for anything else.
pub fn validate_column(column: &str) -> EngineResult<()> {
    match COLUMN.as_ref() {
        Some(pattern) if pattern.is_match(column) => Ok(()),
        _ => Err(EngineError::invalid_column(column)),
    }
}

/// Parses `"order_id desc, id"` into order clauses.
///
/// An empty string yields no clauses.
///
/// # Errors
///
/// Returns [`EngineError::InvalidColumn`] for a malformed segment or column.
pub fn parse_order(text: &str) -> EngineResult<Vec<OrderBy>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    text.split(',')
        .map(|segment| {
            let mut words = segment.split_whitespace();
            let column = words
                .next()
                .ok_or_else(|| EngineError::invalid_column(segment))?;
            validate_column(column)?;
            let descending = match words.next() {
                None => false,
                Some(dir) if dir.eq_ignore_ascii_case("asc") => false,
                Some(dir) if dir.eq_ignore_ascii_case("desc") => true,
                Some(_) => return Err(EngineError::invalid_column(segment.trim())),
            };
            if words.next().is_some() {
                return Err(EngineError::invalid_column(segment.trim()));
            }
            Ok(OrderBy {
                column: column.to_string(),
                descending,
            })
        })
        .collect()
}

/// Escapes `LIKE` wildcards so `value` matches literally.
#[must_use]
pub fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
