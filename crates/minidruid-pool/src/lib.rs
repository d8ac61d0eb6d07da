//! minidruid pool - a configured connection pool and the data source built on it
//!
//! This crate provides:
//! - `Pool` - connection pooling with validation, idle eviction and
//!   prepared statement caching
//! - `PoolConfig` - the validated pool configuration
//! - `DataSourceProperties` - the property surface, read from maps, TOML
//!   or the environment
//! - `TransactionTemplate` - transactional execution on pooled connections
//! - `DataSourceContextBuilder` - wires pool, template and session factory
//!   settings together from properties

pub mod config;
pub mod context;
pub mod credentials;
pub mod pool;
pub mod properties;
pub mod session;
mod statement_cache;
pub mod status;
pub mod transaction;
mod validation;

pub use config::{PoolConfig, redact_url};
pub use context::{DataSourceContext, DataSourceContextBuilder, MONITOR_PATH};
pub use credentials::PasswordDecryptor;
pub use pool::{
    ConnectOptions, ConnectionFactory, LifetimeStats, Pool, PoolStats, PooledConnection,
    SweepReport,
};
pub use properties::{DataSourceProperties, PROPERTY_PREFIX};
pub use session::{DEFAULT_MAPPER_LOCATION, SessionFactoryConfig};
pub use status::DataSourceStatus;
pub use transaction::TransactionTemplate;

pub use minidruid_core::{MiniDruidError, Result};
