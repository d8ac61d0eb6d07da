//! Physical connection creation

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use minidruid_core::{Connection, Result};

use crate::config::{PoolConfig, redact_url};

/// Everything a driver needs to open a physical connection
///
/// The password is already decrypted.
#[derive(Clone)]
pub struct ConnectOptions {
    pub url: String,
    pub username: String,
    pub password: String,
    /// Driver specific properties
    pub properties: BTreeMap<String, String>,
}

impl ConnectOptions {
    pub(crate) fn from_config(config: &PoolConfig, password: String) -> Self {
        Self {
            url: config.url().to_string(),
            username: config.username().to_string(),
            password,
            properties: config.connection_properties().clone(),
        }
    }
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("url", &redact_url(&self.url))
            .field("username", &self.username)
            .field("password", &"***")
            .field("properties", &self.properties)
            .finish()
    }
}

/// Factory trait for opening physical connections
///
/// Implemented by drivers. The pool calls it from `init`, when it grows
/// on demand and when the eviction sweep refills to `min_idle`.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Open a new connection
    async fn connect(&self, options: &ConnectOptions) -> Result<Arc<dyn Connection>>;
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    async fn connect(&self, options: &ConnectOptions) -> Result<Arc<dyn Connection>> {
        (**self).connect(options).await
    }
}
