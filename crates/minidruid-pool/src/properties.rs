//! Data source properties
//!
//! The external configuration surface. Properties live under the
//! `spring.druid.datasource.` prefix and may be written in kebab-case
//! (`max-active`), camelCase (`maxActive`) or snake_case (`max_active`).
//! They can come from a flat key/value map, a TOML document or environment
//! variables (`SPRING_DRUID_DATASOURCE_MAX_ACTIVE`); sources are combined
//! with `merge`.

use std::collections::BTreeMap;
use std::fmt;

use minidruid_core::{MiniDruidError, Result};
use serde::{Deserialize, Serialize};

use crate::config::{PoolConfig, redact_url};
use crate::session::SessionFactoryConfig;

/// Prefix of every data source property
pub const PROPERTY_PREFIX: &str = "spring.druid.datasource.";

/// Prefix of every data source environment variable
pub const ENV_PREFIX: &str = "SPRING_DRUID_DATASOURCE_";

/// Raw data source properties
///
/// Every field is optional; unset fields fall back to the `PoolConfig`
/// defaults.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DataSourceProperties {
    pub name: Option<String>,
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub pwd_public_key: Option<String>,
    /// `k=v;k2=v2`
    pub connection_properties: Option<String>,
    pub max_active: Option<usize>,
    pub initial_size: Option<usize>,
    /// Milliseconds; <= 0 waits without bound
    pub max_wait: Option<i64>,
    pub min_idle: Option<usize>,
    pub time_between_eviction_runs_millis: Option<u64>,
    pub min_evictable_idle_time_millis: Option<u64>,
    pub validation_query: Option<String>,
    /// Seconds
    pub validation_query_timeout: Option<u64>,
    pub test_while_idle: Option<bool>,
    pub test_on_borrow: Option<bool>,
    pub test_on_return: Option<bool>,
    pub pool_prepared_statements: Option<bool>,
    pub max_open_prepared_statements: Option<usize>,
    pub enable_monitor: Option<bool>,
    pub log_slow_sql: Option<bool>,
    pub merge_sql: Option<bool>,
    pub slow_sql_millis: Option<u64>,
    pub slow_sql_capacity: Option<usize>,
    pub mybatis_mapper_locations: Option<String>,
}

impl DataSourceProperties {
    /// Read properties from `spring.druid.datasource.*` keys
    ///
    /// Keys outside the prefix and unknown property names are ignored.
    pub fn from_properties<I, K, V>(properties: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut props = Self::default();
        for (key, value) in properties {
            if let Some(name) = key.as_ref().strip_prefix(PROPERTY_PREFIX) {
                props.set(name, value.as_ref())?;
            }
        }
        Ok(props)
    }

    /// Read properties from a TOML document
    ///
    /// Both nested tables (`[spring.druid.datasource]`) and dotted keys are
    /// accepted. A document without the section yields empty properties.
    pub fn from_toml_str(document: &str) -> Result<Self> {
        let root: toml::Table = document
            .parse()
            .map_err(|e| MiniDruidError::Config(format!("invalid TOML: {}", e)))?;

        let section = ["spring", "druid", "datasource"]
            .iter()
            .try_fold(&root, |table, key| table.get(*key)?.as_table());

        let mut props = Self::default();
        if let Some(section) = section {
            for (name, value) in section {
                props.set(name, &toml_value_to_string(name, value)?)?;
            }
        }
        Ok(props)
    }

    /// Read properties from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_env_vars(std::env::vars())
    }

    /// Read properties from `SPRING_DRUID_DATASOURCE_*` variables
    pub fn from_env_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut props = Self::default();
        for (key, value) in vars {
            if let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) {
                props.set(&name.to_ascii_lowercase(), value.as_ref())?;
            }
        }
        Ok(props)
    }

    /// Combine two sources; values set in `overrides` win
    pub fn merge(self, overrides: Self) -> Self {
        Self {
            name: overrides.name.or(self.name),
            url: overrides.url.or(self.url),
            username: overrides.username.or(self.username),
            password: overrides.password.or(self.password),
            pwd_public_key: overrides.pwd_public_key.or(self.pwd_public_key),
            connection_properties: overrides
                .connection_properties
                .or(self.connection_properties),
            max_active: overrides.max_active.or(self.max_active),
            initial_size: overrides.initial_size.or(self.initial_size),
            max_wait: overrides.max_wait.or(self.max_wait),
            min_idle: overrides.min_idle.or(self.min_idle),
            time_between_eviction_runs_millis: overrides
                .time_between_eviction_runs_millis
                .or(self.time_between_eviction_runs_millis),
            min_evictable_idle_time_millis: overrides
                .min_evictable_idle_time_millis
                .or(self.min_evictable_idle_time_millis),
            validation_query: overrides.validation_query.or(self.validation_query),
            validation_query_timeout: overrides
                .validation_query_timeout
                .or(self.validation_query_timeout),
            test_while_idle: overrides.test_while_idle.or(self.test_while_idle),
            test_on_borrow: overrides.test_on_borrow.or(self.test_on_borrow),
            test_on_return: overrides.test_on_return.or(self.test_on_return),
            pool_prepared_statements: overrides
                .pool_prepared_statements
                .or(self.pool_prepared_statements),
            max_open_prepared_statements: overrides
                .max_open_prepared_statements
                .or(self.max_open_prepared_statements),
            enable_monitor: overrides.enable_monitor.or(self.enable_monitor),
            log_slow_sql: overrides.log_slow_sql.or(self.log_slow_sql),
            merge_sql: overrides.merge_sql.or(self.merge_sql),
            slow_sql_millis: overrides.slow_sql_millis.or(self.slow_sql_millis),
            slow_sql_capacity: overrides.slow_sql_capacity.or(self.slow_sql_capacity),
            mybatis_mapper_locations: overrides
                .mybatis_mapper_locations
                .or(self.mybatis_mapper_locations),
        }
    }

    /// Whether a data source URL is configured
    pub fn is_configured(&self) -> bool {
        self.url.as_deref().is_some_and(|url| !url.trim().is_empty())
    }

    /// Whether the monitor endpoint should be exposed
    pub fn monitor_enabled(&self) -> bool {
        self.enable_monitor.unwrap_or(false)
    }

    /// Build the pool configuration, or `None` when no URL is configured
    ///
    /// The result is not validated; `Pool::init` does that.
    pub fn to_pool_config(&self) -> Result<Option<PoolConfig>> {
        let Some(url) = self.url.as_deref().filter(|_| self.is_configured()) else {
            return Ok(None);
        };

        let mut config = PoolConfig::new(url, self.username.clone().unwrap_or_default());
        if let Some(name) = &self.name {
            config = config.with_name(name.as_str());
        }
        if let Some(password) = &self.password {
            config = config.with_password(password.as_str());
        }
        if let Some(key) = &self.pwd_public_key {
            config = config.with_password_public_key(key.as_str());
        }
        if let Some(raw) = &self.connection_properties {
            for (key, value) in parse_connection_properties(raw)? {
                config = config.with_connection_property(key, value);
            }
        }
        if let Some(v) = self.max_active {
            config = config.with_max_active(v);
        }
        if let Some(v) = self.initial_size {
            config = config.with_initial_size(v);
        }
        if let Some(v) = self.max_wait {
            config = config.with_max_wait_millis(v);
        }
        if let Some(v) = self.min_idle {
            config = config.with_min_idle(v);
        }
        if let Some(v) = self.time_between_eviction_runs_millis {
            config = config.with_time_between_eviction_runs_millis(v);
        }
        if let Some(v) = self.min_evictable_idle_time_millis {
            config = config.with_min_evictable_idle_time_millis(v);
        }
        if let Some(v) = &self.validation_query {
            config = config.with_validation_query(v.as_str());
        }
        if let Some(seconds) = self.validation_query_timeout {
            config = config.with_validation_query_timeout_millis(seconds.saturating_mul(1000));
        }
        if let Some(v) = self.test_while_idle {
            config = config.with_test_while_idle(v);
        }
        if let Some(v) = self.test_on_borrow {
            config = config.with_test_on_borrow(v);
        }
        if let Some(v) = self.test_on_return {
            config = config.with_test_on_return(v);
        }
        if let Some(v) = self.pool_prepared_statements {
            config = config.with_pool_prepared_statements(v);
        }
        if let Some(v) = self.max_open_prepared_statements {
            config = config.with_max_open_prepared_statements(v);
        }
        if let Some(v) = self.enable_monitor {
            config = config.with_monitoring_enabled(v);
        }
        if let Some(v) = self.log_slow_sql {
            config = config.with_log_slow_sql(v);
        }
        if let Some(v) = self.merge_sql {
            config = config.with_merge_sql(v);
        }
        if let Some(v) = self.slow_sql_millis {
            config = config.with_slow_sql_threshold_millis(v);
        }
        if let Some(v) = self.slow_sql_capacity {
            config = config.with_slow_sql_capacity(v);
        }
        Ok(Some(config))
    }

    /// Session factory settings; mapper locations default when unset
    pub fn session_factory_config(&self) -> SessionFactoryConfig {
        match &self.mybatis_mapper_locations {
            Some(locations) => SessionFactoryConfig::new().with_mapper_locations(locations.as_str()),
            None => SessionFactoryConfig::new(),
        }
    }

    /// Set one property by (unprefixed) name
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let key = normalize_key(name);
        let value = value.trim();
        match key.as_str() {
            "name" => self.name = Some(value.to_string()),
            "url" => self.url = Some(value.to_string()),
            "username" => self.username = Some(value.to_string()),
            "password" => self.password = Some(value.to_string()),
            "pwd-public-key" => self.pwd_public_key = Some(value.to_string()),
            "connection-properties" => self.connection_properties = Some(value.to_string()),
            "max-active" => self.max_active = Some(parse(&key, value)?),
            "initial-size" => self.initial_size = Some(parse(&key, value)?),
            "max-wait" => self.max_wait = Some(parse(&key, value)?),
            "min-idle" => self.min_idle = Some(parse(&key, value)?),
            "time-between-eviction-runs-millis" => {
                self.time_between_eviction_runs_millis = Some(parse(&key, value)?)
            }
            "min-evictable-idle-time-millis" => {
                self.min_evictable_idle_time_millis = Some(parse(&key, value)?)
            }
            "validation-query" => self.validation_query = Some(value.to_string()),
            "validation-query-timeout" => {
                self.validation_query_timeout = Some(parse(&key, value)?)
            }
            "test-while-idle" => self.test_while_idle = Some(parse(&key, value)?),
            "test-on-borrow" => self.test_on_borrow = Some(parse(&key, value)?),
            "test-on-return" => self.test_on_return = Some(parse(&key, value)?),
            "pool-prepared-statements" => {
                self.pool_prepared_statements = Some(parse(&key, value)?)
            }
            "max-open-prepared-statements" => {
                self.max_open_prepared_statements = Some(parse(&key, value)?)
            }
            "enable-monitor" => self.enable_monitor = Some(parse(&key, value)?),
            "log-slow-sql" => self.log_slow_sql = Some(parse(&key, value)?),
            "merge-sql" => self.merge_sql = Some(parse(&key, value)?),
            "slow-sql-millis" => self.slow_sql_millis = Some(parse(&key, value)?),
            "slow-sql-capacity" => self.slow_sql_capacity = Some(parse(&key, value)?),
            "mybatis-mapper-locations" => {
                self.mybatis_mapper_locations = Some(value.to_string())
            }
            _ => tracing::debug!(property = %name, "ignoring unknown data source property"),
        }
        Ok(())
    }
}

impl fmt::Debug for DataSourceProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSourceProperties")
            .field("name", &self.name)
            .field("url", &self.url.as_deref().map(redact_url))
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("pwd_public_key", &self.pwd_public_key.is_some())
            .field("max_active", &self.max_active)
            .field("initial_size", &self.initial_size)
            .field("min_idle", &self.min_idle)
            .field("max_wait", &self.max_wait)
            .field("enable_monitor", &self.enable_monitor)
            .finish_non_exhaustive()
    }
}

/// `maxActive`, `max_active` and `MAX-ACTIVE` all become `max-active`
fn normalize_key(name: &str) -> String {
    let mut key = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.trim().chars() {
        if c == '_' || c == '-' || c == '.' {
            key.push('-');
            prev_lower = false;
        } else if c.is_ascii_uppercase() {
            if prev_lower {
                key.push('-');
            }
            key.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else {
            key.push(c);
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        }
    }
    key
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    value.parse::<T>().map_err(|e| {
        MiniDruidError::Config(format!("invalid value '{}' for {}: {}", value, key, e))
    })
}

/// Parse `k=v;k2=v2` driver properties
pub fn parse_connection_properties(raw: &str) -> Result<BTreeMap<String, String>> {
    let mut properties = BTreeMap::new();
    for pair in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            MiniDruidError::Config(format!("invalid connection property '{}'", pair))
        })?;
        properties.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(properties)
}

fn toml_value_to_string(name: &str, value: &toml::Value) -> Result<String> {
    match value {
        toml::Value::String(s) => Ok(s.clone()),
        toml::Value::Integer(i) => Ok(i.to_string()),
        toml::Value::Boolean(b) => Ok(b.to_string()),
        // connection properties may be written as a table
        toml::Value::Table(table) => Ok(table
            .iter()
            .map(|(k, v)| match v {
                toml::Value::String(s) => format!("{}={}", k, s),
                other => format!("{}={}", k, other),
            })
            .collect::<Vec<_>>()
            .join(";")),
        other => Err(MiniDruidError::Config(format!(
            "unsupported TOML value for {}: {}",
            name,
            other.type_str()
        ))),
    }
}
