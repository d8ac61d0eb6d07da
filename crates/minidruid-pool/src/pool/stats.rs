//! Pool statistics types

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Point-in-time connection counts of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Physical connections owned by the pool (idle + active + in maintenance)
    total: usize,
    /// Connections available for borrowing
    idle: usize,
    /// Connections borrowed or being opened for a borrower
    active: usize,
    /// Callers waiting for a connection
    waiting: usize,
}

impl PoolStats {
    /// Create new pool statistics
    pub fn new(total: usize, idle: usize, active: usize, waiting: usize) -> Self {
        Self {
            total,
            idle,
            active,
            waiting,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn idle(&self) -> usize {
        self.idle
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn waiting(&self) -> usize {
        self.waiting
    }

    /// Pool utilization as a fraction (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.active as f64 / self.total as f64
        }
    }

    /// Check if every connection is in use
    pub fn is_full(&self) -> bool {
        self.idle == 0 && self.total > 0
    }
}

impl Default for PoolStats {
    fn default() -> Self {
        Self::new(0, 0, 0, 0)
    }
}

/// Counters accumulated over the lifetime of a pool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifetimeStats {
    /// Physical connections opened
    pub connections_created: u64,
    /// Physical connections closed by the pool
    pub connections_closed: u64,
    /// Successful `acquire` calls
    pub borrows: u64,
    /// Connections handed back
    pub returns: u64,
    /// Connections rejected by validation
    pub validation_failures: u64,
    /// Idle connections closed by the sweep
    pub evictions: u64,
    /// `acquire` calls that gave up waiting
    pub wait_timeouts: u64,
    /// Prepared statement cache hits across all connections
    pub statement_cache_hits: u64,
    /// Prepared statement cache misses across all connections
    pub statement_cache_misses: u64,
}

#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    connections_created: AtomicU64,
    connections_closed: AtomicU64,
    borrows: AtomicU64,
    returns: AtomicU64,
    validation_failures: AtomicU64,
    evictions: AtomicU64,
    wait_timeouts: AtomicU64,
    statement_cache_hits: AtomicU64,
    statement_cache_misses: AtomicU64,
}

impl PoolCounters {
    pub(crate) fn record_created(&self) {
        self.connections_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_borrow(&self) {
        self.borrows.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_return(&self) {
        self.returns.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_validation_failure(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_wait_timeout(&self) {
        self.wait_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_statement_lookup(&self, hit: bool) {
        if hit {
            self.statement_cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.statement_cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self) -> LifetimeStats {
        LifetimeStats {
            connections_created: self.connections_created.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            borrows: self.borrows.load(Ordering::Relaxed),
            returns: self.returns.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            wait_timeouts: self.wait_timeouts.load(Ordering::Relaxed),
            statement_cache_hits: self.statement_cache_hits.load(Ordering::Relaxed),
            statement_cache_misses: self.statement_cache_misses.load(Ordering::Relaxed),
        }
    }
}
