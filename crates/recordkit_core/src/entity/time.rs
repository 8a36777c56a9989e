//! Second-precision local timestamps.

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, SubsecRound};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// A local wall-clock timestamp with second precision.
///
/// Serialized as `"YYYY-MM-DD HH:MM:SS"`, so textual order equals
/// chronological order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalTime(NaiveDateTime);

impl LocalTime {
    /// Returns the current local time, truncated to whole seconds.
    #[must_use]
    pub fn now() -> Self {
        Self::from_naive(Local::now().naive_local())
    }

    /// Wraps a naive timestamp, truncating sub-second precision.
    #[must_use]
    pub fn from_naive(value: NaiveDateTime) -> Self {
        Self(value.trunc_subsecs(0))
    }

    /// Parses `"YYYY-MM-DD HH:MM:SS"` or `"YYYY-MM-DD"` (midnight).
    ///
    /// # Errors
    ///
    /// Returns the chrono parse error if neither form matches.
    pub fn parse(text: &str) -> Result<Self, chrono::ParseError> {
        let text = text.trim();
        match NaiveDateTime::parse_from_str(text, DATETIME_FORMAT) {
            Ok(value) => Ok(Self(value)),
            Err(full) => NaiveDate::parse_from_str(text, DATE_FORMAT)
                .map(|date| Self(date.and_time(NaiveTime::MIN)))
                .map_err(|_| full),
        }
    }

    /// Returns the underlying naive timestamp.
    #[must_use]
    pub const fn naive(&self) -> NaiveDateTime {
        self.0
    }

    /// Returns the date part as `"YYYY-MM-DD"`.
    #[must_use]
    pub fn date_string(&self) -> String {
        self.0.format(DATE_FORMAT).to_string()
    }

    /// Returns true if this timestamp falls on the current local date.
    #[must_use]
    pub fn is_today(&self) -> bool {
        self.0.date() == Local::now().date_naive()
    }

    /// Returns true if this timestamp falls on or before the current local date.
    #[must_use]
    pub fn lte_today(&self) -> bool {
        self.0.date() <= Local::now().date_naive()
    }
}

impl fmt::Display for LocalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DATETIME_FORMAT))
    }
}

impl FromStr for LocalTime {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<NaiveDateTime> for LocalTime {
    fn from(value: NaiveDateTime) -> Self {
        Self::from_naive(value)
    }
}

impl Serialize for LocalTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LocalTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(|e| de::Error::custom(format!("invalid time {text:?}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn parses_both_forms() {
        let full = LocalTime::parse("2024-05-01 13:45:10").unwrap();
        assert_eq!(full.to_string(), "2024-05-01 13:45:10");

        let date = LocalTime::parse("2024-05-01").unwrap();
        assert_eq!(date.to_string(), "2024-05-01 00:00:00");
        assert!(date < full);
    }

    #[test]
    fn rejects_garbage() {
        assert!(LocalTime::parse("yesterday").is_err());
        assert!("2024-13-01".parse::<LocalTime>().is_err());
    }

    #[test]
    fn serde_uses_text_form() {
        let t = LocalTime::parse("2024-05-01 08:00:00").unwrap();
        let json = serde_json::to_value(t).unwrap();
        assert_eq!(json, serde_json::json!("2024-05-01 08:00:00"));
        let back: LocalTime = serde_json::from_value(json).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn now_has_no_subseconds() {
        let now = LocalTime::now();
        assert_eq!(now.naive().and_utc().timestamp_subsec_nanos(), 0);
        assert!(now.is_today());
        assert!(now.lte_today());
    }

    #[test]
    fn tomorrow_is_not_lte_today() {
        let tomorrow = LocalTime::from_naive(Local::now().naive_local() + Duration::days(1));
        assert!(!tomorrow.is_today());
        assert!(!tomorrow.lte_today());
        assert_eq!(tomorrow.date_string().len(), 10);
    }

    #[test]
    fn textual_order_matches_chronological_order() {
        let a = LocalTime::parse("2024-01-09 23:59:59").unwrap();
        let b = LocalTime::parse("2024-01-10 00:00:00").unwrap();
        assert!(a < b);
        assert!(a.to_string() < b.to_string());
    }
}
