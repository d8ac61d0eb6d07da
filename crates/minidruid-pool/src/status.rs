//! Status snapshot served by the monitor endpoint

use chrono::{DateTime, Utc};
use minidruid_core::Result;
use minidruid_monitor::StatSnapshot;
use serde::{Deserialize, Serialize};

use crate::config::redact_url;
use crate::pool::{LifetimeStats, Pool, PoolStats};

/// Everything the monitor endpoint reports about one data source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceStatus {
    pub name: String,
    /// Connection URL with any password masked
    pub url: String,
    pub closed: bool,
    pub max_active: usize,
    pub min_idle: usize,
    pub pool: PoolStats,
    pub lifetime: LifetimeStats,
    /// Statement statistics; `None` unless monitoring is enabled
    pub statements: Option<StatSnapshot>,
    pub taken_at: DateTime<Utc>,
}

impl DataSourceStatus {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Pool {
    /// Take a status snapshot of this pool
    pub fn status(&self) -> DataSourceStatus {
        let config = self.config();
        DataSourceStatus {
            name: config.name().to_string(),
            url: redact_url(config.url()),
            closed: self.is_closed(),
            max_active: config.max_active(),
            min_idle: config.min_idle(),
            pool: self.stats(),
            lifetime: self.lifetime_stats(),
            statements: self.stat_collector().map(|collector| collector.snapshot()),
            taken_at: Utc::now(),
        }
    }
}
