//! Connection pool implementation

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use minidruid_core::{Connection, MiniDruidError, Result};
use minidruid_monitor::{StatCollector, StatConnection};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::entry::PoolEntry;
use super::eviction::{self, SweepReport};
use super::factory::{ConnectOptions, ConnectionFactory};
use super::handle::PooledConnection;
use super::stats::{LifetimeStats, PoolCounters, PoolStats};
use crate::config::{PoolConfig, redact_url};
use crate::credentials::resolve_password;
use crate::statement_cache::StatementCache;
use crate::validation::validate_connection;

/// Mutable pool state, guarded by one mutex
///
/// The lock is only held for bookkeeping, never across I/O.
pub(crate) struct PoolState {
    /// Connections available for borrowing; the back is the most recently used
    pub(crate) idle: VecDeque<PoolEntry>,
    /// Connections borrowed, or being opened or validated for a borrower
    pub(crate) active: usize,
    /// Connections taken out or being opened by the eviction sweep
    pub(crate) maintenance: usize,
    pub(crate) waiting: usize,
    pub(crate) closed: bool,
    /// Every physical connection the pool owns, so `close` can reach
    /// connections that are still borrowed
    pub(crate) live: HashMap<Uuid, Arc<dyn Connection>>,
}

impl PoolState {
    fn new() -> Self {
        Self {
            idle: VecDeque::new(),
            active: 0,
            maintenance: 0,
            waiting: 0,
            closed: false,
            live: HashMap::new(),
        }
    }

    pub(crate) fn total(&self) -> usize {
        self.idle.len() + self.active + self.maintenance
    }
}

pub(crate) enum Slot {
    /// An idle connection, counted as active
    Idle(PoolEntry),
    /// Permission to open one connection, counted as active
    Open,
}

pub(crate) struct PoolInner {
    pub(crate) config: PoolConfig,
    options: ConnectOptions,
    factory: Arc<dyn ConnectionFactory>,
    pub(crate) state: Mutex<PoolState>,
    /// Signalled whenever a connection or a slot becomes available
    pub(crate) available: Notify,
    pub(crate) collector: Option<Arc<StatCollector>>,
    pub(crate) counters: PoolCounters,
    shutdown: CancellationToken,
    eviction_task: Mutex<Option<JoinHandle<()>>>,
}

impl PoolInner {
    /// Open a physical connection and wrap it the way borrowers see it
    pub(crate) async fn open_entry(&self) -> Result<PoolEntry> {
        let raw = self.factory.connect(&self.options).await?;
        self.counters.record_created();

        let conn: Arc<dyn Connection> = match &self.collector {
            Some(collector) => Arc::new(StatConnection::new(raw.clone(), collector.clone())),
            None => raw.clone(),
        };
        let statements = self
            .config
            .pool_prepared_statements()
            .then(|| StatementCache::new(self.config.max_open_prepared_statements()));

        let entry = PoolEntry::new(raw, conn, statements);
        tracing::debug!(pool = %self.config.name(), connection = %entry.id, "connection opened");
        Ok(entry)
    }

    /// Remove a connection from the registry, counting it as closed
    pub(crate) fn forget(&self, state: &mut PoolState, id: Uuid) {
        if state.live.remove(&id).is_some() {
            self.counters.record_closed();
        }
    }

    /// Validate a connection, logging and counting failures
    pub(crate) async fn validate(&self, entry: &PoolEntry) -> bool {
        match validate_connection(
            &*entry.raw,
            self.config.validation_query(),
            self.config.validation_query_timeout(),
        )
        .await
        {
            Ok(elapsed) => {
                tracing::trace!(connection = %entry.id, ?elapsed, "connection validated");
                true
            }
            Err(e) => {
                self.counters.record_validation_failure();
                tracing::warn!(
                    pool = %self.config.name(),
                    connection = %entry.id,
                    error = %e,
                    "connection failed validation"
                );
                false
            }
        }
    }

    /// Whether an idle connection must be validated before it is handed out
    fn needs_borrow_check(&self, entry: &PoolEntry) -> bool {
        if self.config.test_on_borrow() {
            return true;
        }
        match self.config.time_between_eviction_runs() {
            Some(period) if self.config.test_while_idle() => {
                entry.idle_for(std::time::Instant::now()) > period
            }
            _ => false,
        }
    }

    /// Take an idle connection or a slot to open one, waiting until `deadline`
    pub(crate) async fn reserve(&self, deadline: Option<Instant>) -> Result<Slot> {
        let mut expired = false;
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            // register before looking at the state so no release is missed
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.closed {
                    return Err(self.closed_error());
                }
                if let Some(entry) = state.idle.pop_back() {
                    state.active += 1;
                    return Ok(Slot::Idle(entry));
                }
                if state.total() < self.config.max_active() {
                    state.active += 1;
                    return Ok(Slot::Open);
                }
            }

            if expired {
                self.counters.record_wait_timeout();
                return Err(MiniDruidError::PoolExhausted(format!(
                    "no connection available within {} ms (max_active: {})",
                    self.config.max_wait_millis(),
                    self.config.max_active()
                )));
            }

            let _waiting = WaitingGuard::new(&self.state);
            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        expired = true;
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Give back an active slot whose connection never reached a borrower
    pub(crate) fn cancel_reservation(&self, id: Option<Uuid>) {
        {
            let mut state = self.state.lock();
            state.active = state.active.saturating_sub(1);
            if let Some(id) = id {
                self.forget(&mut state, id);
            }
        }
        self.available.notify_one();
    }

    /// Close a borrowed connection instead of returning it
    pub(crate) async fn discard(&self, entry: PoolEntry) {
        self.cancel_reservation(Some(entry.id));
        entry.close().await;
    }

    /// Put a borrowed connection back into the idle set
    ///
    /// Returns the entry when it has to be closed instead.
    fn checkin(&self, mut entry: PoolEntry) -> Option<PoolEntry> {
        let mut state = self.state.lock();
        state.active = state.active.saturating_sub(1);
        if state.closed {
            return Some(entry);
        }
        if entry.raw.is_closed() {
            self.forget(&mut state, entry.id);
            drop(state);
            self.available.notify_one();
            return Some(entry);
        }

        entry.touch();
        state.idle.push_back(entry);
        drop(state);
        self.available.notify_one();
        None
    }

    pub(crate) async fn release(&self, entry: PoolEntry) {
        self.counters.record_return();

        if self.config.test_on_return() && !self.is_closed() && !self.validate(&entry).await {
            self.discard(entry).await;
            return;
        }
        if let Some(entry) = self.checkin(entry) {
            entry.close().await;
        }
    }

    /// Release path for handles dropped without `release`
    pub(crate) fn release_on_drop(self: &Arc<Self>, entry: PoolEntry) {
        if self.config.test_on_return() {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                let pool = self.clone();
                runtime.spawn(async move { pool.release(entry).await });
                return;
            }
            tracing::debug!(connection = %entry.id, "no runtime, returning without validation");
        }

        self.counters.record_return();
        if let Some(entry) = self.checkin(entry) {
            close_detached(entry);
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn closed_error(&self) -> MiniDruidError {
        MiniDruidError::PoolClosed(format!("pool '{}' is closed", self.config.name()))
    }

    pub(crate) async fn close(&self) {
        let (idle, live) = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let idle: Vec<PoolEntry> = state.idle.drain(..).collect();
            let live: Vec<(Uuid, Arc<dyn Connection>)> = state.live.drain().collect();
            (idle, live)
        };

        self.available.notify_waiters();
        self.shutdown.cancel();
        // a sweep in flight sees the pool closed and settles what it took
        let task = self.eviction_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(pool = %self.config.name(), error = %e, "eviction task failed");
            }
        }

        let idle_ids: HashSet<Uuid> = idle.iter().map(|entry| entry.id).collect();
        live.iter().for_each(|_| self.counters.record_closed());
        for entry in idle {
            entry.close().await;
        }

        // borrowed connections are closed too; their handles find the pool
        // closed on release
        let mut in_use = 0;
        for (id, conn) in live {
            if idle_ids.contains(&id) {
                continue;
            }
            in_use += 1;
            if let Err(e) = conn.close().await {
                tracing::warn!(connection = %id, error = %e, "failed to close borrowed connection");
            }
        }

        tracing::info!(
            pool = %self.config.name(),
            closed_in_use = in_use,
            "pool closed"
        );
    }
}

/// Close a connection from synchronous code, on the current runtime if any
fn close_detached(entry: PoolEntry) {
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(entry.close());
        }
        Err(_) => {
            tracing::debug!(connection = %entry.id, "no runtime, dropping connection");
        }
    }
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Counts a caller as waiting for as long as it is alive
struct WaitingGuard<'a> {
    state: &'a Mutex<PoolState>,
}

impl<'a> WaitingGuard<'a> {
    fn new(state: &'a Mutex<PoolState>) -> Self {
        state.lock().waiting += 1;
        Self { state }
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.waiting = state.waiting.saturating_sub(1);
    }
}

/// Holds an active slot until the connection reaches its borrower
///
/// Dropping it while armed, for example when the `acquire` future is
/// cancelled, gives the slot back. A connection held at that point goes
/// back to the idle set untested.
struct Reservation<'a> {
    pool: &'a PoolInner,
    entry: Option<PoolEntry>,
    armed: bool,
}

impl<'a> Reservation<'a> {
    fn new(pool: &'a PoolInner) -> Self {
        Self {
            pool,
            entry: None,
            armed: true,
        }
    }

    fn hold(&mut self, entry: PoolEntry) -> &PoolEntry {
        self.entry.insert(entry)
    }

    /// Take the held connection out, leaving the slot with the caller
    fn settle(mut self) -> Option<PoolEntry> {
        let entry = self.entry.take();
        if entry.is_some() {
            self.armed = false;
        }
        entry
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.entry.take() {
            Some(entry) => {
                if let Some(entry) = self.pool.checkin(entry) {
                    close_detached(entry);
                }
            }
            None => self.pool.cancel_reservation(None),
        }
    }
}

/// A pool of physical database connections
///
/// Cloning is cheap; clones share the same pool. Connections are handed
/// out as `PooledConnection`s, which return to the pool on `release` or
/// when dropped.
#[derive(Clone)]
pub struct Pool {
    pub(crate) inner: Arc<PoolInner>,
}

impl Pool {
    /// Validate the configuration, open `initial_size` connections and start
    /// the eviction task
    ///
    /// Fails with a configuration error for invalid settings, a security
    /// error when the password cannot be decrypted, and with the driver's
    /// error if any initial connection cannot be opened. Nothing stays open
    /// on failure.
    pub async fn init<F: ConnectionFactory>(config: PoolConfig, factory: F) -> Result<Self> {
        config.validate()?;
        let password = resolve_password(&config)?;
        let options = ConnectOptions::from_config(&config, password);

        if (config.test_on_borrow() || config.test_on_return() || config.test_while_idle())
            && config.validation_query().is_none()
        {
            tracing::warn!(
                pool = %config.name(),
                "validation enabled without validation_query, only closed connections are detected"
            );
        }

        let collector = config
            .monitoring_enabled()
            .then(|| Arc::new(StatCollector::new(config.stat_filter_config())));

        let inner = Arc::new(PoolInner {
            options,
            factory: Arc::new(factory),
            state: Mutex::new(PoolState::new()),
            available: Notify::new(),
            collector,
            counters: PoolCounters::default(),
            shutdown: CancellationToken::new(),
            eviction_task: Mutex::new(None),
            config,
        });

        let mut opened = Vec::with_capacity(inner.config.initial_size());
        for _ in 0..inner.config.initial_size() {
            match inner.open_entry().await {
                Ok(entry) => opened.push(entry),
                Err(e) => {
                    tracing::warn!(
                        pool = %inner.config.name(),
                        error = %e,
                        opened = opened.len(),
                        "failed to open initial connections"
                    );
                    for entry in opened {
                        inner.counters.record_closed();
                        entry.close().await;
                    }
                    return Err(e);
                }
            }
        }

        {
            let mut state = inner.state.lock();
            for entry in opened {
                state.live.insert(entry.id, entry.raw.clone());
                state.idle.push_back(entry);
            }
        }

        if let Some(period) = inner.config.time_between_eviction_runs() {
            let task = eviction::spawn_eviction_task(
                Arc::downgrade(&inner),
                period,
                inner.shutdown.clone(),
            );
            *inner.eviction_task.lock() = Some(task);
        }

        tracing::info!(
            pool = %inner.config.name(),
            url = %redact_url(inner.config.url()),
            initial_size = inner.config.initial_size(),
            max_active = inner.config.max_active(),
            monitoring = inner.collector.is_some(),
            "pool initialized"
        );

        Ok(Self { inner })
    }

    /// Borrow a connection
    ///
    /// Hands out an idle connection if there is one, otherwise opens a new
    /// one while the pool is below `max_active`, otherwise waits up to
    /// `max_wait` for a release and fails with `PoolExhausted`. With
    /// `test_on_borrow`, connections that fail validation are closed and
    /// acquisition retried; after `max_active + 1` failures a `Validation`
    /// error is returned.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        let inner = &*self.inner;
        let deadline = inner.config.max_wait().map(|wait| Instant::now() + wait);
        let mut failures = 0usize;

        loop {
            let slot = inner.reserve(deadline).await?;
            let mut reservation = Reservation::new(inner);

            let entry = match slot {
                Slot::Idle(entry) => entry,
                Slot::Open => {
                    let entry = inner.open_entry().await?;
                    let closed = {
                        let mut state = inner.state.lock();
                        if !state.closed {
                            state.live.insert(entry.id, entry.raw.clone());
                        }
                        state.closed
                    };
                    if closed {
                        drop(reservation);
                        inner.counters.record_closed();
                        entry.close().await;
                        return Err(inner.closed_error());
                    }
                    entry
                }
            };

            let held = reservation.hold(entry);
            let healthy = !inner.needs_borrow_check(held) || inner.validate(held).await;
            let Some(entry) = reservation.settle() else {
                continue;
            };

            if !healthy {
                inner.discard(entry).await;
                failures += 1;
                if failures > inner.config.max_active() {
                    return Err(MiniDruidError::Validation(format!(
                        "no valid connection after {} attempts",
                        failures
                    )));
                }
                continue;
            }

            inner.counters.record_borrow();
            return Ok(PooledConnection::new(self.inner.clone(), entry));
        }
    }

    /// Return a borrowed connection, validating it first with `test_on_return`
    pub async fn release(&self, conn: PooledConnection) {
        conn.release().await;
    }

    /// Run one eviction pass now
    ///
    /// The background task runs the same pass every
    /// `time_between_eviction_runs`.
    pub async fn eviction_sweep(&self) -> SweepReport {
        self.inner.sweep().await
    }

    /// Stop the eviction task and close every connection, borrowed or idle
    ///
    /// Later `acquire` calls fail with `PoolClosed`. Closing twice is a no-op.
    pub async fn close(&self) {
        self.inner.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Get current connection counts
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats::new(state.total(), state.idle.len(), state.active, state.waiting)
    }

    /// Get counters accumulated since `init`
    pub fn lifetime_stats(&self) -> LifetimeStats {
        self.inner.counters.snapshot()
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Statement statistics, when monitoring is enabled
    pub fn stat_collector(&self) -> Option<&Arc<StatCollector>> {
        self.inner.collector.as_ref()
    }
}
