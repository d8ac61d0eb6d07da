//! Data source wiring
//!
//! `DataSourceContextBuilder` turns `DataSourceProperties` into the set of
//! objects an application needs: the pool, a transaction template bound to
//! it and the session factory settings. Nothing is built when no URL is
//! configured, and caller supplied instances take precedence over the ones
//! the builder would create.
//!
//! # Example
//!
//! ```ignore
//! let properties = DataSourceProperties::from_toml_str(&std::fs::read_to_string("app.toml")?)?
//!     .merge(DataSourceProperties::from_env()?);
//!
//! if let Some(context) = DataSourceContextBuilder::new(properties).build(driver).await? {
//!     let template = context.transaction_template();
//!     // ...
//!     context.close().await;
//! }
//! ```

use minidruid_core::Result;

use crate::pool::{ConnectionFactory, Pool};
use crate::properties::DataSourceProperties;
use crate::session::SessionFactoryConfig;
use crate::status::DataSourceStatus;
use crate::transaction::TransactionTemplate;

/// Path the monitor endpoint is mounted on when monitoring is enabled
pub const MONITOR_PATH: &str = "/druid/*";

/// The wired data source
pub struct DataSourceContext {
    pool: Pool,
    transaction_template: TransactionTemplate,
    session_factory: SessionFactoryConfig,
    monitor_path: Option<&'static str>,
}

impl DataSourceContext {
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn transaction_template(&self) -> &TransactionTemplate {
        &self.transaction_template
    }

    pub fn session_factory(&self) -> &SessionFactoryConfig {
        &self.session_factory
    }

    /// Where the monitor endpoint should be exposed, if anywhere
    pub fn monitor_path(&self) -> Option<&'static str> {
        self.monitor_path
    }

    /// Status snapshot for the monitor endpoint
    pub fn status(&self) -> DataSourceStatus {
        self.pool.status()
    }

    /// Close the pool
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Builds a `DataSourceContext` from properties
pub struct DataSourceContextBuilder {
    properties: DataSourceProperties,
    pool: Option<Pool>,
    transaction_template: Option<TransactionTemplate>,
    session_factory: Option<SessionFactoryConfig>,
}

impl DataSourceContextBuilder {
    pub fn new(properties: DataSourceProperties) -> Self {
        Self {
            properties,
            pool: None,
            transaction_template: None,
            session_factory: None,
        }
    }

    /// Use an existing pool instead of creating one
    pub fn with_pool(mut self, pool: Pool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Use an existing transaction template instead of creating one
    pub fn with_transaction_template(mut self, template: TransactionTemplate) -> Self {
        self.transaction_template = Some(template);
        self
    }

    /// Use existing session factory settings instead of the configured ones
    pub fn with_session_factory(mut self, session_factory: SessionFactoryConfig) -> Self {
        self.session_factory = Some(session_factory);
        self
    }

    pub fn properties(&self) -> &DataSourceProperties {
        &self.properties
    }

    /// Build the context
    ///
    /// Returns `Ok(None)` when no URL is configured. The factory is only
    /// used when no pool was supplied.
    pub async fn build<F: ConnectionFactory>(self, factory: F) -> Result<Option<DataSourceContext>> {
        let Some(config) = self.properties.to_pool_config()? else {
            tracing::debug!("no data source url configured, skipping data source wiring");
            return Ok(None);
        };

        let pool = match self.pool {
            Some(pool) => pool,
            None => Pool::init(config, factory).await?,
        };
        let transaction_template = self
            .transaction_template
            .unwrap_or_else(|| TransactionTemplate::new(pool.clone()));
        let session_factory = self
            .session_factory
            .unwrap_or_else(|| self.properties.session_factory_config());
        let monitor_path = self.properties.monitor_enabled().then_some(MONITOR_PATH);

        tracing::info!(
            pool = %pool.config().name(),
            mapper_locations = %session_factory.mapper_locations(),
            monitor = monitor_path.is_some(),
            "data source wired"
        );

        Ok(Some(DataSourceContext {
            pool,
            transaction_template,
            session_factory,
            monitor_path,
        }))
    }
}
