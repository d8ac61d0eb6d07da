//! Connection wrapper that records statement statistics
//!
//! Every statement executed through the wrapper, directly, inside a
//! transaction or through a prepared statement, is timed and handed to the
//! shared `StatCollector`.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use minidruid_core::{
    Connection, IsolationLevel, PreparedStatement, QueryResult, Result, StatementResult,
    Transaction, Value,
};

use super::collector::StatCollector;

async fn timed<T, F>(collector: &StatCollector, sql: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let start = Instant::now();
    let result = fut.await;
    collector.record(sql, start.elapsed(), result.is_err());
    result
}

/// A connection whose statements are recorded by a `StatCollector`
pub struct StatConnection {
    inner: Arc<dyn Connection>,
    collector: Arc<StatCollector>,
}

impl StatConnection {
    /// Wrap a connection
    pub fn new(inner: Arc<dyn Connection>, collector: Arc<StatCollector>) -> Self {
        Self { inner, collector }
    }

    /// The wrapped connection
    pub fn inner(&self) -> &Arc<dyn Connection> {
        &self.inner
    }

    /// The collector statements are recorded into
    pub fn collector(&self) -> &Arc<StatCollector> {
        &self.collector
    }
}

#[async_trait]
impl Connection for StatConnection {
    fn driver_name(&self) -> &str {
        self.inner.driver_name()
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        timed(&self.collector, sql, self.inner.execute(sql, params)).await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        timed(&self.collector, sql, self.inner.query(sql, params)).await
    }

    async fn prepare(&self, sql: &str) -> Result<Arc<dyn PreparedStatement>> {
        let statement = self.inner.prepare(sql).await?;
        Ok(Arc::new(StatPreparedStatement {
            inner: statement,
            collector: self.collector.clone(),
        }))
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        let tx = self.inner.begin_transaction().await?;
        Ok(Box::new(StatTransaction {
            inner: tx,
            collector: self.collector.clone(),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// A transaction whose statements are recorded by a `StatCollector`
pub struct StatTransaction {
    inner: Box<dyn Transaction>,
    collector: Arc<StatCollector>,
}

#[async_trait]
impl Transaction for StatTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.inner.rollback().await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        timed(&self.collector, sql, self.inner.query(sql, params)).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        timed(&self.collector, sql, self.inner.execute(sql, params)).await
    }

    async fn set_isolation_level(&self, level: IsolationLevel) -> Result<()> {
        self.inner.set_isolation_level(level).await
    }

    async fn set_read_only(&self) -> Result<()> {
        self.inner.set_read_only().await
    }
}

/// A prepared statement whose executions are recorded by a `StatCollector`
pub struct StatPreparedStatement {
    inner: Arc<dyn PreparedStatement>,
    collector: Arc<StatCollector>,
}

#[async_trait]
impl PreparedStatement for StatPreparedStatement {
    fn sql(&self) -> &str {
        self.inner.sql()
    }

    async fn execute(&self, params: &[Value]) -> Result<StatementResult> {
        timed(&self.collector, self.inner.sql(), self.inner.execute(params)).await
    }

    async fn query(&self, params: &[Value]) -> Result<QueryResult> {
        timed(&self.collector, self.inner.sql(), self.inner.query(params)).await
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}
