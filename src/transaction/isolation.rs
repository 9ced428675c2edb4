use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Transaction isolation levels understood by the store.
///
/// Only the canonical SQL names parse; `"REPEATABLE_READ"` and
/// `"repeatable-read"` are accepted as spellings of the same name, anything
/// else (e.g. `"REPEATABLE READS"`) is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IsolationLevel {
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }

    /// Whether transactions at this level read from a snapshot taken at begin.
    pub fn uses_snapshot(&self) -> bool {
        !matches!(self, Self::ReadCommitted)
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown isolation level '{0}', expected one of: READ COMMITTED, REPEATABLE READ, SERIALIZABLE")]
pub struct ParseIsolationLevelError(pub String);

impl FromStr for IsolationLevel {
    type Err = ParseIsolationLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s
            .replace(['_', '-'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_uppercase();

        match normalized.as_str() {
            "READ COMMITTED" => Ok(Self::ReadCommitted),
            "REPEATABLE READ" => Ok(Self::RepeatableRead),
            "SERIALIZABLE" => Ok(Self::Serializable),
            _ => Err(ParseIsolationLevelError(s.to_string())),
        }
    }
}
