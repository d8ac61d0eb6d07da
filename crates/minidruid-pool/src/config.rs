//! Pool configuration

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use minidruid_core::{MiniDruidError, Result};
use minidruid_monitor::StatFilterConfig;
use serde::{Deserialize, Serialize};

/// Immutable configuration snapshot for a `Pool`
///
/// Built with `PoolConfig::new` and the `with_*` methods, or resolved from
/// external properties through `DataSourceProperties`. `Pool::init` calls
/// `validate` before opening anything.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Data source name, used in logs and the status snapshot
    name: String,
    url: String,
    username: String,
    /// Plaintext, or encrypted when `password_public_key` is set
    #[serde(skip_serializing)]
    password: String,
    /// Base64 X.509 public key used to decrypt `password`
    password_public_key: Option<String>,
    /// Extra key/value pairs handed to the driver
    connection_properties: BTreeMap<String, String>,

    max_active: usize,
    min_idle: usize,
    initial_size: usize,
    /// Values <= 0 wait without bound
    max_wait_millis: i64,

    /// 0 disables the background eviction task
    time_between_eviction_runs_millis: u64,
    min_evictable_idle_time_millis: u64,

    validation_query: Option<String>,
    /// 0 means no timeout
    validation_query_timeout_millis: u64,
    test_on_borrow: bool,
    test_on_return: bool,
    test_while_idle: bool,

    pool_prepared_statements: bool,
    max_open_prepared_statements: usize,

    monitoring_enabled: bool,
    log_slow_sql: bool,
    merge_sql: bool,
    slow_sql_threshold_millis: u64,
    slow_sql_capacity: usize,
}

impl PoolConfig {
    /// Create a configuration for the given URL and user with default tunables
    pub fn new(url: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            ..Default::default()
        }
    }

    /// Check the sizing invariants and required credentials
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(MiniDruidError::Config("url is required".into()));
        }
        if self.username.trim().is_empty() {
            return Err(MiniDruidError::Config("username is required".into()));
        }
        if self.max_active == 0 {
            return Err(MiniDruidError::Config(
                "max_active must be greater than 0".into(),
            ));
        }
        if self.initial_size > self.min_idle {
            return Err(MiniDruidError::Config(format!(
                "initial_size ({}) cannot exceed min_idle ({})",
                self.initial_size, self.min_idle
            )));
        }
        if self.min_idle > self.max_active {
            return Err(MiniDruidError::Config(format!(
                "min_idle ({}) cannot exceed max_active ({})",
                self.min_idle, self.max_active
            )));
        }
        if self.pool_prepared_statements && self.max_open_prepared_statements == 0 {
            return Err(MiniDruidError::Config(
                "max_open_prepared_statements must be greater than 0 when pooling statements"
                    .into(),
            ));
        }
        Ok(())
    }

    /// Set the data source name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the password (plaintext, or encrypted if a public key is set)
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set the Base64 public key used to decrypt the password
    pub fn with_password_public_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.password_public_key = (!key.trim().is_empty()).then_some(key);
        self
    }

    /// Add a driver connection property
    pub fn with_connection_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.connection_properties.insert(key.into(), value.into());
        self
    }

    /// Set the maximum number of physical connections
    pub fn with_max_active(mut self, max_active: usize) -> Self {
        self.max_active = max_active;
        self
    }

    /// Set the number of idle connections the sweep keeps
    pub fn with_min_idle(mut self, min_idle: usize) -> Self {
        self.min_idle = min_idle;
        self
    }

    /// Set the number of connections opened by `init`
    pub fn with_initial_size(mut self, initial_size: usize) -> Self {
        self.initial_size = initial_size;
        self
    }

    /// Set how long `acquire` waits for a free connection; <= 0 waits forever
    pub fn with_max_wait_millis(mut self, max_wait_millis: i64) -> Self {
        self.max_wait_millis = max_wait_millis;
        self
    }

    /// Set the eviction cadence; 0 disables the background task
    pub fn with_time_between_eviction_runs_millis(mut self, millis: u64) -> Self {
        self.time_between_eviction_runs_millis = millis;
        self
    }

    /// Set how long a connection may stay idle before the sweep closes it
    pub fn with_min_evictable_idle_time_millis(mut self, millis: u64) -> Self {
        self.min_evictable_idle_time_millis = millis;
        self
    }

    /// Set the validation query; an empty string clears it
    pub fn with_validation_query(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.validation_query = (!query.trim().is_empty()).then_some(query);
        self
    }

    /// Set the validation query timeout; 0 means no timeout
    pub fn with_validation_query_timeout_millis(mut self, millis: u64) -> Self {
        self.validation_query_timeout_millis = millis;
        self
    }

    /// Validate idle connections before handing them out
    pub fn with_test_on_borrow(mut self, test: bool) -> Self {
        self.test_on_borrow = test;
        self
    }

    /// Validate connections when they are released
    pub fn with_test_on_return(mut self, test: bool) -> Self {
        self.test_on_return = test;
        self
    }

    /// Validate idle connections during the sweep and after long idle periods
    pub fn with_test_while_idle(mut self, test: bool) -> Self {
        self.test_while_idle = test;
        self
    }

    /// Enable or disable the per-connection prepared statement cache
    pub fn with_pool_prepared_statements(mut self, enabled: bool) -> Self {
        self.pool_prepared_statements = enabled;
        self
    }

    /// Bound the prepared statement cache; a positive value also enables it
    pub fn with_max_open_prepared_statements(mut self, max: usize) -> Self {
        self.max_open_prepared_statements = max;
        if max > 0 {
            self.pool_prepared_statements = true;
        }
        self
    }

    /// Enable statement statistics
    pub fn with_monitoring_enabled(mut self, enabled: bool) -> Self {
        self.monitoring_enabled = enabled;
        self
    }

    /// Log slow statements at warn level
    pub fn with_log_slow_sql(mut self, log: bool) -> Self {
        self.log_slow_sql = log;
        self
    }

    /// Merge statements that differ only in literals
    pub fn with_merge_sql(mut self, merge: bool) -> Self {
        self.merge_sql = merge;
        self
    }

    /// Set the slow statement threshold
    pub fn with_slow_sql_threshold_millis(mut self, millis: u64) -> Self {
        self.slow_sql_threshold_millis = millis;
        self
    }

    /// Set how many slow statements are kept
    pub fn with_slow_sql_capacity(mut self, capacity: usize) -> Self {
        self.slow_sql_capacity = capacity;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn password_public_key(&self) -> Option<&str> {
        self.password_public_key.as_deref()
    }

    pub fn connection_properties(&self) -> &BTreeMap<String, String> {
        &self.connection_properties
    }

    pub fn max_active(&self) -> usize {
        self.max_active
    }

    pub fn min_idle(&self) -> usize {
        self.min_idle
    }

    pub fn initial_size(&self) -> usize {
        self.initial_size
    }

    pub fn max_wait_millis(&self) -> i64 {
        self.max_wait_millis
    }

    /// Get the acquire wait bound, `None` when waiting is unbounded
    pub fn max_wait(&self) -> Option<Duration> {
        u64::try_from(self.max_wait_millis)
            .ok()
            .filter(|millis| *millis > 0)
            .map(Duration::from_millis)
    }

    /// Get the eviction cadence, `None` when the background task is disabled
    pub fn time_between_eviction_runs(&self) -> Option<Duration> {
        (self.time_between_eviction_runs_millis > 0)
            .then(|| Duration::from_millis(self.time_between_eviction_runs_millis))
    }

    pub fn min_evictable_idle_time(&self) -> Duration {
        Duration::from_millis(self.min_evictable_idle_time_millis)
    }

    pub fn validation_query(&self) -> Option<&str> {
        self.validation_query.as_deref()
    }

    /// Get the validation timeout, `None` when unbounded
    pub fn validation_query_timeout(&self) -> Option<Duration> {
        (self.validation_query_timeout_millis > 0)
            .then(|| Duration::from_millis(self.validation_query_timeout_millis))
    }

    pub fn test_on_borrow(&self) -> bool {
        self.test_on_borrow
    }

    pub fn test_on_return(&self) -> bool {
        self.test_on_return
    }

    pub fn test_while_idle(&self) -> bool {
        self.test_while_idle
    }

    pub fn pool_prepared_statements(&self) -> bool {
        self.pool_prepared_statements
    }

    pub fn max_open_prepared_statements(&self) -> usize {
        self.max_open_prepared_statements
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring_enabled
    }

    pub fn log_slow_sql(&self) -> bool {
        self.log_slow_sql
    }

    pub fn merge_sql(&self) -> bool {
        self.merge_sql
    }

    pub fn slow_sql_threshold_millis(&self) -> u64 {
        self.slow_sql_threshold_millis
    }

    pub fn slow_sql_capacity(&self) -> usize {
        self.slow_sql_capacity
    }

    /// Statistics settings derived from the monitoring fields
    pub fn stat_filter_config(&self) -> StatFilterConfig {
        StatFilterConfig::new(self.slow_sql_threshold_millis)
            .with_log_slow_sql(self.log_slow_sql)
            .with_merge_sql(self.merge_sql)
            .with_slow_sql_capacity(self.slow_sql_capacity)
    }
}

impl Default for PoolConfig {
    /// Defaults:
    /// - max_active: 8, min_idle: 0, initial_size: 0
    /// - max_wait: unbounded
    /// - eviction every 60 seconds, idle threshold 30 minutes
    /// - test_while_idle on, test_on_borrow and test_on_return off
    /// - slow statement threshold: 3 seconds, 100 kept
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            url: String::new(),
            username: String::new(),
            password: String::new(),
            password_public_key: None,
            connection_properties: BTreeMap::new(),
            max_active: 8,
            min_idle: 0,
            initial_size: 0,
            max_wait_millis: -1,
            time_between_eviction_runs_millis: 60_000,
            min_evictable_idle_time_millis: 1_800_000,
            validation_query: None,
            validation_query_timeout_millis: 0,
            test_on_borrow: false,
            test_on_return: false,
            test_while_idle: true,
            pool_prepared_statements: false,
            max_open_prepared_statements: 10,
            monitoring_enabled: false,
            log_slow_sql: false,
            merge_sql: false,
            slow_sql_threshold_millis: 3_000,
            slow_sql_capacity: 100,
        }
    }
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("name", &self.name)
            .field("url", &redact_url(&self.url))
            .field("username", &self.username)
            .field("password", &"***")
            .field("encrypted_password", &self.password_public_key.is_some())
            .field("connection_properties", &self.connection_properties)
            .field("max_active", &self.max_active)
            .field("min_idle", &self.min_idle)
            .field("initial_size", &self.initial_size)
            .field("max_wait_millis", &self.max_wait_millis)
            .field(
                "time_between_eviction_runs_millis",
                &self.time_between_eviction_runs_millis,
            )
            .field(
                "min_evictable_idle_time_millis",
                &self.min_evictable_idle_time_millis,
            )
            .field("validation_query", &self.validation_query)
            .field("test_on_borrow", &self.test_on_borrow)
            .field("test_on_return", &self.test_on_return)
            .field("test_while_idle", &self.test_while_idle)
            .field("pool_prepared_statements", &self.pool_prepared_statements)
            .field("monitoring_enabled", &self.monitoring_enabled)
            .finish_non_exhaustive()
    }
}

/// Mask the password component of a connection URL
///
/// URLs that do not parse (for example `jdbc:mysql://...`) are checked again
/// with the `jdbc:` prefix removed; anything still unparseable is masked
/// entirely.
pub fn redact_url(raw: &str) -> String {
    let (prefix, rest) = match raw.strip_prefix("jdbc:") {
        Some(rest) => ("jdbc:", rest),
        None => ("", raw),
    };

    match url::Url::parse(rest) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("***"));
            }
            format!("{}{}", prefix, parsed)
        }
        Err(_) => "***".to_string(),
    }
}
