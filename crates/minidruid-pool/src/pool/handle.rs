//! Borrowed connections

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use minidruid_core::{Connection, PreparedStatement, Result};
use uuid::Uuid;

use super::entry::PoolEntry;
use super::pool::PoolInner;

/// A connection borrowed from a `Pool`
///
/// Derefs to the connection. Call `release` to hand it back (this runs the
/// `test_on_return` validation inline); dropping the handle releases it as
/// well.
pub struct PooledConnection {
    id: Uuid,
    conn: Arc<dyn Connection>,
    entry: Option<PoolEntry>,
    pool: Arc<PoolInner>,
}

impl PooledConnection {
    pub(crate) fn new(pool: Arc<PoolInner>, entry: PoolEntry) -> Self {
        Self {
            id: entry.id,
            conn: entry.conn.clone(),
            entry: Some(entry),
            pool,
        }
    }

    /// Identifier of the underlying physical connection
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Time since the physical connection was opened
    pub fn age(&self) -> Duration {
        self.entry
            .as_ref()
            .map(|entry| entry.created_at.elapsed())
            .unwrap_or_default()
    }

    /// Prepare a statement, reusing the connection's cached one if any
    ///
    /// Without `pool_prepared_statements` this is a plain `prepare`.
    pub async fn prepare(&mut self, sql: &str) -> Result<Arc<dyn PreparedStatement>> {
        let cached = match self.entry.as_mut().and_then(|e| e.statements.as_mut()) {
            Some(cache) => cache.get(sql),
            None => return self.conn.prepare(sql).await,
        };
        self.pool.counters.record_statement_lookup(cached.is_some());
        if let Some(statement) = cached {
            return Ok(statement);
        }

        let statement = self.conn.prepare(sql).await?;
        let evicted = self
            .entry
            .as_mut()
            .and_then(|e| e.statements.as_mut())
            .and_then(|cache| cache.insert(sql.to_string(), statement.clone()));
        if let Some(evicted) = evicted {
            if let Err(e) = evicted.close().await {
                tracing::debug!(connection = %self.id, error = %e, "failed to close evicted statement");
            }
        }
        Ok(statement)
    }

    /// Number of prepared statements cached on this connection
    pub fn cached_statements(&self) -> usize {
        self.entry
            .as_ref()
            .and_then(|entry| entry.statements.as_ref())
            .map_or(0, |cache| cache.len())
    }

    /// Hand the connection back to its pool
    pub async fn release(mut self) {
        if let Some(entry) = self.entry.take() {
            self.pool.release(entry).await;
        }
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            self.pool.release_on_drop(entry);
        }
    }
}
