//! Bookkeeping for one physical connection

use std::sync::Arc;
use std::time::{Duration, Instant};

use minidruid_core::Connection;
use uuid::Uuid;

use crate::statement_cache::StatementCache;

pub(crate) struct PoolEntry {
    pub(crate) id: Uuid,
    /// The driver's connection; validation and close go through it
    pub(crate) raw: Arc<dyn Connection>,
    /// What borrowers see: `raw`, wrapped for statistics when monitoring
    pub(crate) conn: Arc<dyn Connection>,
    pub(crate) statements: Option<StatementCache>,
    pub(crate) created_at: Instant,
    pub(crate) last_used_at: Instant,
}

impl PoolEntry {
    pub(crate) fn new(
        raw: Arc<dyn Connection>,
        conn: Arc<dyn Connection>,
        statements: Option<StatementCache>,
    ) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4(),
            raw,
            conn,
            statements,
            created_at: now,
            last_used_at: now,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.last_used_at = Instant::now();
    }

    pub(crate) fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_used_at)
    }

    /// Close cached statements, then the physical connection
    pub(crate) async fn close(mut self) {
        if let Some(cache) = self.statements.as_mut() {
            for statement in cache.drain() {
                if let Err(e) = statement.close().await {
                    tracing::debug!(connection = %self.id, error = %e, "failed to close statement");
                }
            }
        }
        if let Err(e) = self.raw.close().await {
            tracing::warn!(connection = %self.id, error = %e, "failed to close connection");
        }
    }
}
