//! Transaction template
//!
//! Runs a unit of work inside a transaction on a pooled connection: the
//! connection is acquired, the transaction begun and configured, the work
//! run, and the transaction committed on success or rolled back on error
//! or timeout. The connection goes back to the pool on every path.

use std::time::Duration;

use futures::future::BoxFuture;
use minidruid_core::{IsolationLevel, MiniDruidError, Result, Transaction};

use crate::pool::{Pool, PooledConnection};

/// Transactional execution bound to a `Pool`
#[derive(Clone)]
pub struct TransactionTemplate {
    pool: Pool,
    isolation_level: Option<IsolationLevel>,
    read_only: bool,
    timeout: Option<Duration>,
}

impl TransactionTemplate {
    /// Create a template with the driver's default transaction settings
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            isolation_level: None,
            read_only: false,
            timeout: None,
        }
    }

    /// Set the isolation level applied to every transaction
    pub fn with_isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }

    /// Mark every transaction read-only
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Roll back work that runs longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn isolation_level(&self) -> Option<IsolationLevel> {
        self.isolation_level
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run `work` in a transaction
    ///
    /// # Example
    ///
    /// ```ignore
    /// let inserted = template
    ///     .execute(|tx| {
    ///         Box::pin(async move {
    ///             let result = tx.execute("INSERT INTO t_user VALUES (?)", &[1.into()]).await?;
    ///             Ok(result.affected_rows)
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn execute<T, F>(&self, work: F) -> Result<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t dyn Transaction) -> BoxFuture<'t, Result<T>> + Send,
    {
        let conn = self.pool.acquire().await?;
        let result = self.run(&conn, work).await;
        conn.release().await;
        result
    }

    async fn run<T, F>(&self, conn: &PooledConnection, work: F) -> Result<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t dyn Transaction) -> BoxFuture<'t, Result<T>> + Send,
    {
        let tx = conn.begin_transaction().await?;

        if let Err(e) = self.apply_settings(&*tx).await {
            rollback(tx).await;
            return Err(e);
        }

        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, work(&*tx)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(MiniDruidError::Timeout(format!(
                    "transaction exceeded {} ms",
                    limit.as_millis()
                ))),
            },
            None => work(&*tx).await,
        };

        match outcome {
            Ok(value) => {
                tx.commit()
                    .await
                    .map_err(|e| MiniDruidError::Transaction(format!("commit failed: {}", e)))?;
                Ok(value)
            }
            Err(e) => {
                tracing::debug!(error = %e, "rolling back transaction");
                rollback(tx).await;
                Err(e)
            }
        }
    }

    async fn apply_settings(&self, tx: &dyn Transaction) -> Result<()> {
        if let Some(level) = self.isolation_level {
            tx.set_isolation_level(level).await?;
        }
        if self.read_only {
            tx.set_read_only().await?;
        }
        Ok(())
    }
}

async fn rollback(tx: Box<dyn Transaction>) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(error = %e, "transaction rollback failed");
    }
}
