//! `LIKE` pattern matching.
//!
//! `%` matches any run of characters, `_` matches exactly one, and `\` makes
//! the next character literal. Matching is case-sensitive and anchored at both
//! ends.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

const CACHE_CAPACITY: usize = 256;

static COMPILED: Lazy<Mutex<HashMap<String, Arc<Regex>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Returns true if `text` matches the `LIKE` pattern.
///
/// # Errors
///
/// Returns the regex error if the translated pattern cannot be compiled.
pub fn like(text: &str, pattern: &str) -> Result<bool, regex::Error> {
    if let Some(matched) = fast_path(text, pattern) {
        return Ok(matched);
    }
    Ok(compiled(pattern)?.is_match(text))
}

fn fast_path(text: &str, pattern: &str) -> Option<bool> {
    if pattern.contains('\\') || pattern.contains('_') {
        return None;
    }
    match pattern.matches('%').count() {
        0 => Some(text == pattern),
        1 if pattern.ends_with('%') => Some(text.starts_with(&pattern[..pattern.len() - 1])),
        1 if pattern.starts_with('%') => Some(text.ends_with(&pattern[1..])),
        2 if pattern.len() >= 2 && pattern.starts_with('%') && pattern.ends_with('%') => {
            Some(text.contains(&pattern[1..pattern.len() - 1]))
        }
        _ => None,
    }
}

fn compiled(pattern: &str) -> Result<Arc<Regex>, regex::Error> {
    let mut cache = COMPILED.lock();
    if let Some(regex) = cache.get(pattern) {
        return Ok(Arc::clone(regex));
    }
    let regex = Arc::new(Regex::new(&to_regex(pattern))?);
    if cache.len() >= CACHE_CAPACITY {
        cache.clear();
    }
    cache.insert(pattern.to_string(), Arc::clone(&regex));
    Ok(regex)
}

fn to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push_str("(?s)^");
    let mut chars = pattern.chars();
    let mut buf = [0u8; 4];
    while let Some(c) = chars.next() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => out.push_str(&regex::escape(escaped.encode_utf8(&mut buf))),
                None => out.push_str(r"\\"),
            },
            other => out.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }
    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn wildcards() {
        assert!(like("SO-2024-001", "SO%").unwrap());
        assert!(like("SO-2024-001", "%001").unwrap());
        assert!(like("SO-2024-001", "%2024%").unwrap());
        assert!(like("SO-2024-001", "SO-____-001").unwrap());
        assert!(!like("SO-2024-001", "SO-___-001").unwrap());
        assert!(like("anything", "%").unwrap());
    }

    #[test]
    fn exact_match_without_wildcards() {
        assert!(like("abc", "abc").unwrap());
        assert!(!like("abcd", "abc").unwrap());
    }

    #[test]
    fn escapes_make_wildcards_literal() {
        assert!(like("50%", r"50\%").unwrap());
        assert!(!like("500", r"50\%").unwrap());
        assert!(like("a_b", r"%a\_b%").unwrap());
        assert!(!like("axb", r"%a\_b%").unwrap());
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        assert!(like("a.b(c)", "a.b(c)").unwrap());
        assert!(like("x[1]+y", "%[1]+%").unwrap());
        assert!(!like("axb", "a.b").unwrap());
    }

    proptest! {
        #[test]
        fn fast_path_agrees_with_regex(text in "[ab%]{0,6}", pattern in "[ab%]{0,5}") {
            if let Some(fast) = fast_path(&text, &pattern) {
                prop_assert_eq!(fast, compiled(&pattern).unwrap().is_match(&text));
            }
        }

        #[test]
        fn escaped_text_matches_itself(text in "[a-z%_.]{0,8}") {
            let escaped: String = text
                .chars()
                .flat_map(|c| match c {
                    '%' | '_' => vec!['\\', c],
                    other => vec![other],
                })
                .collect();
            prop_assert!(like(&text, &escaped).unwrap());
        }
    }
}
