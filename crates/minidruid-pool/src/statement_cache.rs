//! Per-connection prepared statement cache

use std::sync::Arc;

use indexmap::IndexMap;
use minidruid_core::PreparedStatement;

/// Least-recently-used cache of prepared statements keyed by SQL text
///
/// Each physical connection owns one; it moves with the connection between
/// the idle set and its borrowers.
pub(crate) struct StatementCache {
    capacity: usize,
    /// Least recently used first
    statements: IndexMap<String, Arc<dyn PreparedStatement>>,
}

impl StatementCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            statements: IndexMap::new(),
        }
    }

    /// Look up a statement, marking it most recently used
    pub(crate) fn get(&mut self, sql: &str) -> Option<Arc<dyn PreparedStatement>> {
        let index = self.statements.get_index_of(sql)?;
        let last = self.statements.len() - 1;
        self.statements.move_index(index, last);
        self.statements.get_index(last).map(|(_, stmt)| stmt.clone())
    }

    /// Insert a statement, returning the one evicted to make room
    pub(crate) fn insert(
        &mut self,
        sql: String,
        statement: Arc<dyn PreparedStatement>,
    ) -> Option<Arc<dyn PreparedStatement>> {
        if let Some(previous) = self.statements.shift_remove(&sql) {
            self.statements.insert(sql, statement);
            return Some(previous);
        }

        let evicted = if self.statements.len() >= self.capacity {
            self.statements.shift_remove_index(0).map(|(_, stmt)| stmt)
        } else {
            None
        };
        self.statements.insert(sql, statement);
        evicted
    }

    /// Remove every cached statement
    pub(crate) fn drain(&mut self) -> Vec<Arc<dyn PreparedStatement>> {
        self.statements.drain(..).map(|(_, stmt)| stmt).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.statements.len()
    }
}
