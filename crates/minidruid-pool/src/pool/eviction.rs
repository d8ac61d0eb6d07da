//! Idle connection eviction
//!
//! A sweep closes connections that stayed idle longer than
//! `min_evictable_idle_time` without shrinking the pool below `min_idle`,
//! validates the surviving idle connections when `test_while_idle` is set,
//! and opens new connections if the pool ended up below `min_idle`.

use std::sync::Weak;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::entry::PoolEntry;
use super::pool::PoolInner;

/// What one eviction sweep did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Idle connections closed for exceeding the idle threshold
    pub evicted: usize,
    /// Idle connections validated
    pub validated: usize,
    /// Idle connections closed after failing validation
    pub discarded: usize,
    /// Connections opened to get back to `min_idle`
    pub replenished: usize,
}

impl SweepReport {
    /// Whether the sweep changed nothing
    pub fn is_empty(&self) -> bool {
        self.evicted == 0 && self.discarded == 0 && self.replenished == 0
    }
}

impl PoolInner {
    pub(crate) async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let now = Instant::now();
        let threshold = self.config.min_evictable_idle_time();
        let min_idle = self.config.min_idle();

        let (expired, to_check) = {
            let mut state = self.state.lock();
            if state.closed {
                return report;
            }

            // oldest first, stop once the pool is down to min_idle
            let mut excess = state.total().saturating_sub(min_idle);
            let mut expired = Vec::new();
            let mut kept = std::collections::VecDeque::with_capacity(state.idle.len());
            for entry in state.idle.drain(..) {
                if excess > 0 && entry.idle_for(now) > threshold {
                    excess -= 1;
                    expired.push(entry);
                } else {
                    kept.push_back(entry);
                }
            }
            state.idle = kept;
            for entry in &expired {
                self.forget(&mut state, entry.id);
            }

            // newest first, so putting each one back at the front keeps the order
            let to_check: Vec<Uuid> = if self.config.test_while_idle() {
                state.idle.iter().rev().map(|entry| entry.id).collect()
            } else {
                Vec::new()
            };
            (expired, to_check)
        };

        report.evicted = expired.len();
        for entry in expired {
            self.counters.record_eviction();
            tracing::debug!(
                pool = %self.config.name(),
                connection = %entry.id,
                idle_ms = entry.idle_for(now).as_millis() as u64,
                "evicting idle connection"
            );
            entry.close().await;
        }

        for id in to_check {
            let Some(entry) = self.take_for_check(id) else {
                continue;
            };
            report.validated += 1;
            let valid = self.validate(&entry).await;

            let leftover = {
                let mut state = self.state.lock();
                state.maintenance = state.maintenance.saturating_sub(1);
                if !valid {
                    self.forget(&mut state, entry.id);
                    Some(entry)
                } else if state.closed {
                    Some(entry)
                } else {
                    // validated connections go back behind the recently used ones
                    state.idle.push_front(entry);
                    None
                }
            };
            self.available.notify_one();

            if let Some(entry) = leftover {
                if !valid {
                    report.discarded += 1;
                }
                entry.close().await;
            }
        }

        report.replenished = self.replenish().await;

        if !report.is_empty() {
            tracing::debug!(
                pool = %self.config.name(),
                evicted = report.evicted,
                validated = report.validated,
                discarded = report.discarded,
                replenished = report.replenished,
                "eviction sweep"
            );
        }
        report
    }

    /// Take one idle connection out for validation, unless it was borrowed
    /// meanwhile or the pool closed
    ///
    /// Only this connection is withheld from borrowers while it is checked.
    fn take_for_check(&self, id: Uuid) -> Option<PoolEntry> {
        let mut state = self.state.lock();
        if state.closed {
            return None;
        }
        let position = state.idle.iter().position(|entry| entry.id == id)?;
        let entry = state.idle.remove(position)?;
        state.maintenance += 1;
        Some(entry)
    }

    /// Open connections until the pool holds `min_idle`
    async fn replenish(&self) -> usize {
        let needed = {
            let mut state = self.state.lock();
            if state.closed {
                return 0;
            }
            let total = state.total();
            let needed = self
                .config
                .min_idle()
                .saturating_sub(total)
                .min(self.config.max_active().saturating_sub(total));
            state.maintenance += needed;
            needed
        };
        if needed == 0 {
            return 0;
        }

        let mut opened = Vec::with_capacity(needed);
        for _ in 0..needed {
            match self.open_entry().await {
                Ok(entry) => opened.push(entry),
                Err(e) => {
                    tracing::warn!(
                        pool = %self.config.name(),
                        error = %e,
                        "failed to replenish idle connections"
                    );
                    break;
                }
            }
        }

        let count = opened.len();
        let rejected = {
            let mut state = self.state.lock();
            state.maintenance = state.maintenance.saturating_sub(needed);
            if state.closed {
                opened
            } else {
                for entry in opened {
                    state.live.insert(entry.id, entry.raw.clone());
                    state.idle.push_back(entry);
                }
                Vec::new()
            }
        };
        self.available.notify_waiters();

        if !rejected.is_empty() {
            for entry in rejected {
                self.counters.record_closed();
                entry.close().await;
            }
            return 0;
        }
        count
    }
}

/// Run `sweep` every `period` until `shutdown` is cancelled or the pool is
/// dropped
pub(crate) fn spawn_eviction_task(
    pool: Weak<PoolInner>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(inner) = pool.upgrade() else {
                break;
            };
            inner.sweep().await;
        }
        tracing::debug!("eviction task stopped");
    })
}
