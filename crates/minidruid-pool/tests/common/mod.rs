//! Common test utilities and mocks

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use minidruid_core::{
    Connection, MiniDruidError, PreparedStatement, QueryResult, Result, StatementResult,
    Transaction, Value,
};
use minidruid_pool::{ConnectOptions, ConnectionFactory};
use parking_lot::Mutex;

/// Log of everything the mock driver was asked to do, shared by all
/// connections of one factory
pub type StatementLog = Arc<Mutex<Vec<String>>>;

/// Mock connection that records statements and supports transactions.
///
/// Statements containing `FAIL` return a query error.
pub struct MockConnection {
    log: StatementLog,
    closed: AtomicBool,
}

impl MockConnection {
    fn run(&self, sql: &str) -> Result<()> {
        self.log.lock().push(sql.to_string());
        if sql.contains("FAIL") {
            return Err(MiniDruidError::Query(format!("mock failure: {}", sql)));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    async fn execute(&self, sql: &str, _params: &[Value]) -> Result<StatementResult> {
        self.run(sql)?;
        Ok(StatementResult::affected(1))
    }

    async fn query(&self, sql: &str, _params: &[Value]) -> Result<QueryResult> {
        self.run(sql)?;
        Ok(QueryResult::empty())
    }

    async fn prepare(&self, _sql: &str) -> Result<Arc<dyn PreparedStatement>> {
        Err(MiniDruidError::NotSupported(
            "Prepared statements not supported in mock".into(),
        ))
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        self.log.lock().push("BEGIN".to_string());
        Ok(Box::new(MockTransaction {
            log: self.log.clone(),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct MockTransaction {
    log: StatementLog,
}

impl MockTransaction {
    fn run(&self, sql: &str) -> Result<()> {
        self.log.lock().push(sql.to_string());
        if sql.contains("FAIL") {
            return Err(MiniDruidError::Query(format!("mock failure: {}", sql)));
        }
        Ok(())
    }
}

#[async_trait]
impl Transaction for MockTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.log.lock().push("COMMIT".to_string());
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.log.lock().push("ROLLBACK".to_string());
        Ok(())
    }

    async fn query(&self, sql: &str, _params: &[Value]) -> Result<QueryResult> {
        self.run(sql)?;
        Ok(QueryResult::empty())
    }

    async fn execute(&self, sql: &str, _params: &[Value]) -> Result<StatementResult> {
        self.run(sql)?;
        Ok(StatementResult::affected(1))
    }
}

/// Mock driver handing out `MockConnection`s
pub struct MockFactory {
    log: StatementLog,
    created: AtomicUsize,
    options: Mutex<Vec<ConnectOptions>>,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            log: Arc::new(Mutex::new(Vec::new())),
            created: AtomicUsize::new(0),
            options: Mutex::new(Vec::new()),
        })
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn last_options(&self) -> Option<ConnectOptions> {
        self.options.lock().last().cloned()
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    async fn connect(&self, options: &ConnectOptions) -> Result<Arc<dyn Connection>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.options.lock().push(options.clone());
        Ok(Arc::new(MockConnection {
            log: self.log.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Install a test subscriber honouring `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
