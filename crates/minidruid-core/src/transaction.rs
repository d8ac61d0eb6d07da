//! Transaction settings shared by drivers and the transaction template

use serde::{Deserialize, Serialize};

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Read uncommitted - dirty reads possible
    ReadUncommitted,
    /// Read committed - no dirty reads
    ReadCommitted,
    /// Repeatable read - no non-repeatable reads (MySQL default)
    RepeatableRead,
    /// Serializable - full isolation
    Serializable,
}

impl IsolationLevel {
    /// Convert to SQL string for SET TRANSACTION statement
    pub fn to_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_sql())
    }
}
