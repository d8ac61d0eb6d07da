//! Tests for statement statistics

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use minidruid_core::{
    Connection, MiniDruidError, PreparedStatement, QueryResult, Result, StatementResult,
    Transaction, Value,
};
use pretty_assertions::assert_eq;

use super::*;

/// Mock connection whose statements take a configurable time
struct MockConnection {
    delay: Duration,
    fail: AtomicBool,
    executed: AtomicUsize,
    closed: AtomicBool,
}

impl MockConnection {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            fail: AtomicBool::new(false),
            executed: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    async fn run(&self) -> Result<()> {
        self.executed.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(MiniDruidError::Query("mock failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    async fn execute(&self, _sql: &str, _params: &[Value]) -> Result<StatementResult> {
        self.run().await?;
        Ok(StatementResult::affected(1))
    }

    async fn query(&self, _sql: &str, _params: &[Value]) -> Result<QueryResult> {
        self.run().await?;
        Ok(QueryResult::empty())
    }

    async fn prepare(&self, sql: &str) -> Result<Arc<dyn PreparedStatement>> {
        Ok(Arc::new(MockStatement {
            sql: sql.to_string(),
        }))
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        Err(MiniDruidError::NotSupported(
            "Transactions not supported in mock".into(),
        ))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct MockStatement {
    sql: String,
}

#[async_trait]
impl PreparedStatement for MockStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    async fn execute(&self, _params: &[Value]) -> Result<StatementResult> {
        Ok(StatementResult::affected(1))
    }

    async fn query(&self, _params: &[Value]) -> Result<QueryResult> {
        Ok(QueryResult::empty())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// merge_sql tests
// =============================================================================

#[test]
fn test_merge_replaces_literals() {
    assert_eq!(
        merge_sql("select * from t_user where u_age = 1"),
        "SELECT * FROM t_user WHERE u_age = ?"
    );
    assert_eq!(
        merge_sql("SELECT u_name FROM t_user WHERE u_name = 'bob' AND u_active = true"),
        "SELECT u_name FROM t_user WHERE u_name = ? AND u_active = ?"
    );
}

#[test]
fn test_merge_equal_for_different_literals() {
    assert_eq!(
        merge_sql("select * from t_user where u_id = 1"),
        merge_sql("select *   from t_user\n where u_id = 2")
    );
}

#[test]
fn test_merge_collapses_in_lists() {
    assert_eq!(
        merge_sql("delete from t_user where u_id in (1, 2, 3)"),
        "DELETE FROM t_user WHERE u_id IN (?)"
    );
    assert_eq!(
        merge_sql("delete from t_user where u_id in (7)"),
        merge_sql("delete from t_user where u_id in (7, 8, 9, 10)")
    );
}

#[test]
fn test_merge_negative_numbers() {
    assert_eq!(
        merge_sql("select * from t_user where u_score > -5"),
        "SELECT * FROM t_user WHERE u_score > ?"
    );
    // binary minus stays
    assert_eq!(
        merge_sql("select u_score - 5 from t_user"),
        "SELECT u_score - ? FROM t_user"
    );
}

#[test]
fn test_merge_function_calls() {
    assert_eq!(
        merge_sql("select user_score(u_id, 10) from t_user where u_id = 3"),
        "SELECT user_score(u_id, ?) FROM t_user WHERE u_id = ?"
    );
}

#[test]
fn test_merge_keeps_untokenizable_sql() {
    assert_eq!(merge_sql("  select 'unterminated  "), "select 'unterminated");
}

// =============================================================================
// StatementKind tests
// =============================================================================

#[test]
fn test_statement_kind_classify() {
    assert_eq!(StatementKind::classify("SELECT 1"), StatementKind::Select);
    assert_eq!(
        StatementKind::classify("  with x as (select 1) select * from x"),
        StatementKind::Select
    );
    assert_eq!(
        StatementKind::classify("(select 1) union (select 2)"),
        StatementKind::Select
    );
    assert_eq!(
        StatementKind::classify("insert into t_user values (1)"),
        StatementKind::Insert
    );
    assert_eq!(
        StatementKind::classify("Update t_user set u_age = 1"),
        StatementKind::Update
    );
    assert_eq!(
        StatementKind::classify("delete from t_user"),
        StatementKind::Delete
    );
    assert_eq!(
        StatementKind::classify("create table t_user (u_id int)"),
        StatementKind::Other
    );
    assert_eq!(StatementKind::classify(""), StatementKind::Other);
}

// =============================================================================
// StatCollector tests
// =============================================================================

#[test]
fn test_collector_counts_by_kind() {
    let collector = StatCollector::new(StatFilterConfig::new(1000));

    collector.record("select 1", Duration::from_millis(1), false);
    collector.record("insert into t_user values (1)", Duration::from_millis(2), false);
    collector.record("update t_user set u_age = 2", Duration::from_millis(3), true);
    collector.record("delete from t_user", Duration::from_millis(4), false);

    let stats = collector.query_stats();
    assert_eq!(stats.total_queries, 4);
    assert_eq!(stats.select_queries, 1);
    assert_eq!(stats.insert_queries, 1);
    assert_eq!(stats.update_queries, 1);
    assert_eq!(stats.delete_queries, 1);
    assert_eq!(stats.error_queries, 1);
    assert_eq!(stats.slow_queries, 0);
    assert!((stats.max_query_time_ms - 4.0).abs() < 0.001);
    assert!((stats.avg_query_time_ms() - 2.5).abs() < 0.001);
    assert!((stats.write_percentage() - 75.0).abs() < 0.001);
}

#[test]
fn test_collector_slow_threshold_is_strict() {
    let collector = StatCollector::new(StatFilterConfig::new(100));

    collector.record("select 1", Duration::from_millis(100), false);
    assert!(collector.slow_sql().is_empty());

    collector.record("select 2", Duration::from_millis(101), false);
    let slow = collector.slow_sql();
    assert_eq!(slow.len(), 1);
    assert_eq!(slow[0].sql, "select 2");
    assert!(!slow[0].failed);
    assert_eq!(collector.query_stats().slow_queries, 1);
}

#[test]
fn test_collector_ring_buffer_bounded() {
    let config = StatFilterConfig::new(0).with_slow_sql_capacity(3);
    let collector = StatCollector::new(config);

    for i in 0..10 {
        collector.record(&format!("select {}", i), Duration::from_millis(5), false);
    }

    let slow = collector.slow_sql();
    assert_eq!(slow.len(), 3);
    let texts: Vec<&str> = slow.iter().map(|r| r.sql.as_str()).collect();
    assert_eq!(texts, vec!["select 7", "select 8", "select 9"]);
    assert_eq!(collector.query_stats().slow_queries, 10);
}

#[test]
fn test_collector_capacity_at_least_one() {
    let config = StatFilterConfig::new(0).with_slow_sql_capacity(0);
    assert_eq!(config.slow_sql_capacity, 1);
}

#[test]
fn test_collector_merges_statements() {
    let config = StatFilterConfig::new(1000).with_merge_sql(true);
    let collector = StatCollector::new(config);

    collector.record("select * from t_user where u_id = 1", Duration::from_millis(2), false);
    collector.record("select * from t_user where u_id = 2", Duration::from_millis(4), false);

    let stats = collector.sql_stats();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].sql, "SELECT * FROM t_user WHERE u_id = ?");
    assert_eq!(stats[0].execute_count, 2);
    assert_eq!(stats[0].kind, StatementKind::Select);
    assert!((stats[0].avg_time_ms() - 3.0).abs() < 0.001);

    let looked_up = collector
        .sql_stat("SELECT * FROM t_user WHERE u_id = 99")
        .expect("merged stat");
    assert_eq!(looked_up.execute_count, 2);
}

#[test]
fn test_collector_without_merge_keeps_literals() {
    let collector = StatCollector::new(StatFilterConfig::new(1000));

    collector.record("select * from t_user where u_id = 1", Duration::from_millis(1), false);
    collector.record("select * from t_user where u_id = 2", Duration::from_millis(1), false);

    assert_eq!(collector.sql_stats().len(), 2);
    assert!(collector.sql_stat(" select * from t_user where u_id = 1 ").is_some());
}

#[test]
fn test_collector_sql_stats_sorted_by_total_time() {
    let collector = StatCollector::new(StatFilterConfig::new(1000));

    collector.record("select 1", Duration::from_millis(1), false);
    collector.record("select 2", Duration::from_millis(9), false);
    collector.record("select 3", Duration::from_millis(5), false);

    let order: Vec<String> = collector.sql_stats().into_iter().map(|s| s.sql).collect();
    assert_eq!(order, vec!["select 2", "select 3", "select 1"]);
}

#[test]
fn test_collector_snapshot_and_reset() {
    let collector = StatCollector::new(StatFilterConfig::new(0));
    collector.record("select 1", Duration::from_millis(1), false);

    let snapshot = collector.snapshot();
    assert_eq!(snapshot.query_stats.total_queries, 1);
    assert_eq!(snapshot.sql_stats.len(), 1);
    assert_eq!(snapshot.slow_sql.len(), 1);

    let json = serde_json::to_value(&snapshot).expect("serialize");
    assert_eq!(json["sql_stats"][0]["kind"], "select");

    collector.reset();
    assert_eq!(collector.query_stats(), QueryStats::default());
    assert!(collector.sql_stats().is_empty());
    assert!(collector.slow_sql().is_empty());
}

// =============================================================================
// StatConnection tests
// =============================================================================

#[tokio::test]
async fn test_stat_connection_records_statements() {
    let collector = Arc::new(StatCollector::new(StatFilterConfig::new(1000)));
    let inner = Arc::new(MockConnection::new(Duration::ZERO));
    let conn = StatConnection::new(inner.clone(), collector.clone());

    conn.query("select 1", &[]).await.expect("query");
    conn.execute("update t_user set u_age = 1", &[]).await.expect("execute");

    assert_eq!(inner.executed.load(Ordering::SeqCst), 2);
    let stats = collector.query_stats();
    assert_eq!(stats.total_queries, 2);
    assert_eq!(stats.select_queries, 1);
    assert_eq!(stats.update_queries, 1);
    assert_eq!(conn.driver_name(), "mock");
}

#[tokio::test]
async fn test_stat_connection_records_failures() {
    let collector = Arc::new(StatCollector::new(StatFilterConfig::new(1000)));
    let inner = Arc::new(MockConnection::new(Duration::ZERO));
    inner.fail.store(true, Ordering::SeqCst);
    let conn = StatConnection::new(inner, collector.clone());

    let err = conn.query("select 1", &[]).await.unwrap_err();
    assert!(matches!(err, MiniDruidError::Query(_)));
    assert_eq!(collector.query_stats().error_queries, 1);
}

#[tokio::test]
async fn test_stat_connection_detects_slow_sql() {
    let config = StatFilterConfig::new(10).with_log_slow_sql(true);
    let collector = Arc::new(StatCollector::new(config));
    let conn = StatConnection::new(
        Arc::new(MockConnection::new(Duration::from_millis(30))),
        collector.clone(),
    );

    conn.query("select pg_sleep(0.03)", &[]).await.expect("query");

    let slow = collector.slow_sql();
    assert_eq!(slow.len(), 1);
    assert!(slow[0].duration_ms >= 30.0);
}

#[tokio::test]
async fn test_stat_prepared_statement_records_executions() {
    let collector = Arc::new(StatCollector::new(StatFilterConfig::new(1000)));
    let conn = StatConnection::new(
        Arc::new(MockConnection::new(Duration::ZERO)),
        collector.clone(),
    );

    let stmt = conn
        .prepare("insert into t_user values (?)")
        .await
        .expect("prepare");
    stmt.execute(&[Value::from(1)]).await.expect("execute");
    stmt.execute(&[Value::from(2)]).await.expect("execute");

    let stat = collector
        .sql_stat("insert into t_user values (?)")
        .expect("stat");
    assert_eq!(stat.execute_count, 2);
    assert_eq!(stat.kind, StatementKind::Insert);
}

#[tokio::test]
async fn test_stat_connection_delegates_close() {
    let inner = Arc::new(MockConnection::new(Duration::ZERO));
    let conn = StatConnection::new(inner.clone(), Arc::new(StatCollector::default()));

    assert!(!conn.is_closed());
    conn.close().await.expect("close");
    assert!(conn.is_closed());
    assert!(inner.is_closed());
}
