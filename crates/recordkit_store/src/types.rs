//! Transaction identity and state.

use std::fmt;

/// Identifies the holder of the writer gate.
///
/// Ids handed out by [`Store::begin`](crate::Store::begin) start at 1 and only
/// grow. Id 0 is reserved for single autocommit writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(u64);

impl TransactionId {
    /// The writer id of an autocommit write.
    pub const AUTOCOMMIT: Self = Self(0);

    /// Wraps a raw id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns true for the autocommit writer.
    #[must_use]
    pub const fn is_autocommit(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_autocommit() {
            f.write_str("autocommit")
        } else {
            write!(f, "tx-{}", self.0)
        }
    }
}

/// Where a transaction is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Open. Reads and writes go to its working copy.
    Active,
    /// Its working copy was published.
    Committed,
    /// Its working copy was discarded, explicitly or on drop.
    RolledBack,
}

impl TransactionState {
    /// Returns true once the transaction has committed or rolled back.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "active",
            Self::Committed => "committed",
            Self::RolledBack => "rolled back",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn autocommit_id_is_reserved() {
        assert!(TransactionId::AUTOCOMMIT.is_autocommit());
        assert!(!TransactionId::new(1).is_autocommit());
        assert!(TransactionId::AUTOCOMMIT < TransactionId::new(1));
        assert_eq!(TransactionId::AUTOCOMMIT.to_string(), "autocommit");
        assert_eq!(TransactionId::new(7).to_string(), "tx-7");
    }

    #[test]
    fn finished_states() {
        assert!(!TransactionState::Active.is_finished());
        assert!(TransactionState::Committed.is_finished());
        assert!(TransactionState::RolledBack.is_finished());
        assert_eq!(TransactionState::RolledBack.to_string(), "rolled back");
    }
}
