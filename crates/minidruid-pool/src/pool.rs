//! Connection pooling
//!
//! This module provides the pool itself: sizing bounds, waiting with a
//! timeout, validation on borrow, return and while idle, idle eviction on a
//! background task, per-connection prepared statement caching and the
//! optional statement statistics decoration.
//!
//! # Example
//!
//! ```ignore
//! use minidruid_pool::{Pool, PoolConfig};
//!
//! let config = PoolConfig::new("mysql://db:3306/app", "app")
//!     .with_password("secret")
//!     .with_initial_size(2)
//!     .with_min_idle(2)
//!     .with_max_active(10)
//!     .with_max_wait_millis(5000);
//!
//! let pool = Pool::init(config, driver).await?;
//! let conn = pool.acquire().await?;
//! conn.query("SELECT 1", &[]).await?;
//! conn.release().await;
//! pool.close().await;
//! ```

mod entry;
mod eviction;
mod factory;
mod handle;
mod pool;
mod stats;


pub use eviction::SweepReport;
pub use factory::{ConnectOptions, ConnectionFactory};
pub use handle::PooledConnection;
pub use pool::Pool;
pub use stats::{LifetimeStats, PoolStats};
