//! Statement statistics collector
//!
//! Aggregates execution counts and timings per statement and records slow
//! statements in a bounded ring buffer.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use super::merge::merge_sql;

/// Configuration for statement statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatFilterConfig {
    /// Log statements slower than the threshold at warn level
    pub log_slow_sql: bool,
    /// Normalize literals before aggregation
    pub merge_sql: bool,
    /// Threshold for slow statement detection (ms)
    pub slow_sql_millis: u64,
    /// Maximum number of slow statements kept for inspection
    pub slow_sql_capacity: usize,
}

impl Default for StatFilterConfig {
    fn default() -> Self {
        Self {
            log_slow_sql: false,
            merge_sql: false,
            slow_sql_millis: 3000,
            slow_sql_capacity: 100,
        }
    }
}

impl StatFilterConfig {
    /// Create config with custom slow statement threshold
    pub fn new(slow_sql_millis: u64) -> Self {
        Self {
            slow_sql_millis,
            ..Default::default()
        }
    }

    /// Builder method: set slow statement logging
    pub fn with_log_slow_sql(mut self, log: bool) -> Self {
        self.log_slow_sql = log;
        self
    }

    /// Builder method: set SQL merging
    pub fn with_merge_sql(mut self, merge: bool) -> Self {
        self.merge_sql = merge;
        self
    }

    /// Builder method: set ring buffer capacity (at least 1)
    pub fn with_slow_sql_capacity(mut self, capacity: usize) -> Self {
        self.slow_sql_capacity = capacity.max(1);
        self
    }

    /// Get the slow statement threshold as a Duration
    pub fn slow_sql_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_sql_millis)
    }
}

/// Kind of statement, derived from its leading keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Other,
}

impl StatementKind {
    /// Classify a statement by its first keyword
    pub fn classify(sql: &str) -> Self {
        let head = sql
            .trim_start_matches(|c: char| c.is_whitespace() || c == '(')
            .split(|c: char| c.is_whitespace() || c == '(')
            .next()
            .unwrap_or_default();

        if head.eq_ignore_ascii_case("select") || head.eq_ignore_ascii_case("with") {
            Self::Select
        } else if head.eq_ignore_ascii_case("insert") || head.eq_ignore_ascii_case("replace") {
            Self::Insert
        } else if head.eq_ignore_ascii_case("update") {
            Self::Update
        } else if head.eq_ignore_ascii_case("delete") {
            Self::Delete
        } else {
            Self::Other
        }
    }
}

/// Aggregated statistics for one (possibly merged) statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlStat {
    /// Statement text used as aggregation key
    pub sql: String,
    /// Statement kind
    pub kind: StatementKind,
    /// Number of executions
    pub execute_count: u64,
    /// Number of failed executions
    pub error_count: u64,
    /// Number of executions above the slow threshold
    pub slow_count: u64,
    /// Total execution time in milliseconds
    pub total_time_ms: f64,
    /// Maximum execution time in milliseconds
    pub max_time_ms: f64,
    /// When the statement last ran
    pub last_executed_at: DateTime<Utc>,
}

impl SqlStat {
    fn new(sql: String) -> Self {
        let kind = StatementKind::classify(&sql);
        Self {
            sql,
            kind,
            execute_count: 0,
            error_count: 0,
            slow_count: 0,
            total_time_ms: 0.0,
            max_time_ms: 0.0,
            last_executed_at: Utc::now(),
        }
    }

    /// Average execution time in milliseconds
    pub fn avg_time_ms(&self) -> f64 {
        if self.execute_count == 0 {
            return 0.0;
        }
        self.total_time_ms / self.execute_count as f64
    }
}

/// A statement that exceeded the slow threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlowSqlRecord {
    /// Statement text as executed
    pub sql: String,
    /// Execution time in milliseconds
    pub duration_ms: f64,
    /// When the statement finished
    pub executed_at: DateTime<Utc>,
    /// Whether the execution failed
    pub failed: bool,
}

/// Execution statistics across all statements
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryStats {
    /// Total number of statements executed
    pub total_queries: u64,
    /// Number of SELECT statements
    pub select_queries: u64,
    /// Number of INSERT statements
    pub insert_queries: u64,
    /// Number of UPDATE statements
    pub update_queries: u64,
    /// Number of DELETE statements
    pub delete_queries: u64,
    /// Number of failed statements
    pub error_queries: u64,
    /// Number of slow statements (based on threshold)
    pub slow_queries: u64,
    /// Total execution time in milliseconds
    pub total_time_ms: f64,
    /// Maximum execution time in milliseconds
    pub max_query_time_ms: f64,
}

impl QueryStats {
    /// Average execution time in milliseconds
    pub fn avg_query_time_ms(&self) -> f64 {
        if self.total_queries == 0 {
            return 0.0;
        }
        self.total_time_ms / self.total_queries as f64
    }

    /// Calculate percentage of DML (write) statements
    pub fn write_percentage(&self) -> f64 {
        if self.total_queries == 0 {
            return 0.0;
        }
        let writes = self.insert_queries + self.update_queries + self.delete_queries;
        (writes as f64 / self.total_queries as f64) * 100.0
    }

    fn count(&mut self, kind: StatementKind) {
        self.total_queries += 1;
        match kind {
            StatementKind::Select => self.select_queries += 1,
            StatementKind::Insert => self.insert_queries += 1,
            StatementKind::Update => self.update_queries += 1,
            StatementKind::Delete => self.delete_queries += 1,
            StatementKind::Other => {}
        }
    }
}

/// Point-in-time copy of everything the collector knows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatSnapshot {
    /// Totals across all statements
    pub query_stats: QueryStats,
    /// Per-statement statistics, most expensive first
    pub sql_stats: Vec<SqlStat>,
    /// Most recent slow statements, oldest first
    pub slow_sql: Vec<SlowSqlRecord>,
    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,
}

#[derive(Default)]
struct StatState {
    totals: QueryStats,
    by_sql: HashMap<String, SqlStat>,
    slow: VecDeque<SlowSqlRecord>,
}

/// Statement statistics collector
///
/// Shared by every connection of a pool. Recording takes a short lock and
/// never performs I/O.
pub struct StatCollector {
    config: StatFilterConfig,
    state: Mutex<StatState>,
}

impl StatCollector {
    /// Create a collector with the given configuration
    pub fn new(config: StatFilterConfig) -> Self {
        Self {
            config,
            state: Mutex::new(StatState::default()),
        }
    }

    /// Get the current configuration
    pub fn config(&self) -> &StatFilterConfig {
        &self.config
    }

    /// Record one statement execution
    pub fn record(&self, sql: &str, elapsed: Duration, failed: bool) {
        let key = if self.config.merge_sql {
            merge_sql(sql)
        } else {
            sql.trim().to_string()
        };
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let is_slow = elapsed > self.config.slow_sql_threshold();
        let now = Utc::now();

        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let kind = StatementKind::classify(&key);

            state.totals.count(kind);
            state.totals.total_time_ms += elapsed_ms;
            state.totals.max_query_time_ms = state.totals.max_query_time_ms.max(elapsed_ms);
            if failed {
                state.totals.error_queries += 1;
            }
            if is_slow {
                state.totals.slow_queries += 1;
            }

            let stat = state
                .by_sql
                .entry(key)
                .or_insert_with_key(|k| SqlStat::new(k.clone()));
            stat.execute_count += 1;
            stat.total_time_ms += elapsed_ms;
            stat.max_time_ms = stat.max_time_ms.max(elapsed_ms);
            stat.last_executed_at = now;
            if failed {
                stat.error_count += 1;
            }

            if is_slow {
                stat.slow_count += 1;
                if state.slow.len() >= self.config.slow_sql_capacity.max(1) {
                    state.slow.pop_front();
                }
                state.slow.push_back(SlowSqlRecord {
                    sql: sql.to_string(),
                    duration_ms: elapsed_ms,
                    executed_at: now,
                    failed,
                });
            }
        }

        if is_slow && self.config.log_slow_sql {
            tracing::warn!(
                sql = %sql,
                duration_ms = elapsed_ms,
                threshold_ms = self.config.slow_sql_millis,
                "slow sql"
            );
        }
    }

    /// Totals across all statements
    pub fn query_stats(&self) -> QueryStats {
        self.state.lock().totals.clone()
    }

    /// Statistics for one aggregation key
    pub fn sql_stat(&self, sql: &str) -> Option<SqlStat> {
        let key = if self.config.merge_sql {
            merge_sql(sql)
        } else {
            sql.trim().to_string()
        };
        self.state.lock().by_sql.get(&key).cloned()
    }

    /// Per-statement statistics, most expensive first
    pub fn sql_stats(&self) -> Vec<SqlStat> {
        let mut stats: Vec<SqlStat> = self.state.lock().by_sql.values().cloned().collect();
        stats.sort_by(|a, b| b.total_time_ms.total_cmp(&a.total_time_ms));
        stats
    }

    /// Most recent slow statements, oldest first
    pub fn slow_sql(&self) -> Vec<SlowSqlRecord> {
        self.state.lock().slow.iter().cloned().collect()
    }

    /// Take a consistent snapshot
    pub fn snapshot(&self) -> StatSnapshot {
        let (query_stats, mut sql_stats, slow_sql) = {
            let state = self.state.lock();
            (
                state.totals.clone(),
                state.by_sql.values().cloned().collect::<Vec<_>>(),
                state.slow.iter().cloned().collect::<Vec<_>>(),
            )
        };
        sql_stats.sort_by(|a, b| b.total_time_ms.total_cmp(&a.total_time_ms));

        StatSnapshot {
            query_stats,
            sql_stats,
            slow_sql,
            taken_at: Utc::now(),
        }
    }

    /// Discard everything recorded so far
    pub fn reset(&self) {
        *self.state.lock() = StatState::default();
    }
}

impl Default for StatCollector {
    fn default() -> Self {
        Self::new(StatFilterConfig::default())
    }
}
