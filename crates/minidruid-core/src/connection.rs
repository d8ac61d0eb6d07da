//! Connection, transaction and prepared statement traits

use crate::{IsolationLevel, QueryResult, Result, StatementResult, Value};
use async_trait::async_trait;
use std::sync::Arc;

/// A physical database connection
///
/// Drivers implement this trait; the pool hands connections out behind a
/// `PooledConnection` and the statistics layer wraps them to time every
/// statement.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "mysql", "postgresql")
    fn driver_name(&self) -> &str;

    /// Execute a statement that modifies data (INSERT/UPDATE/DELETE)
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult>;

    /// Execute a query that returns rows (SELECT)
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Prepare a statement for repeated execution
    async fn prepare(&self, sql: &str) -> Result<Arc<dyn PreparedStatement>>;

    /// Begin a transaction
    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>>;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}

/// A database transaction
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;

    /// Execute a query within the transaction
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Execute a statement within the transaction
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult>;

    /// Set the isolation level of the running transaction
    ///
    /// The default issues a standard `SET TRANSACTION ISOLATION LEVEL`.
    async fn set_isolation_level(&self, level: IsolationLevel) -> Result<()> {
        let sql = format!("SET TRANSACTION ISOLATION LEVEL {}", level.to_sql());
        self.execute(&sql, &[]).await.map(|_| ())
    }

    /// Mark the running transaction read-only
    async fn set_read_only(&self) -> Result<()> {
        self.execute("SET TRANSACTION READ ONLY", &[]).await.map(|_| ())
    }
}

/// A prepared statement
#[async_trait]
pub trait PreparedStatement: Send + Sync {
    /// The SQL text this statement was prepared from
    fn sql(&self) -> &str;

    /// Execute the prepared statement with parameters
    async fn execute(&self, params: &[Value]) -> Result<StatementResult>;

    /// Query the prepared statement with parameters
    async fn query(&self, params: &[Value]) -> Result<QueryResult>;

    /// Close/deallocate the prepared statement
    async fn close(&self) -> Result<()>;
}
