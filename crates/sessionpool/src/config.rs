//! Pool configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::error::PoolError;
use crate::session::IsolationLevel;

/// Default maximum number of prepared statements cached per connection.
pub const DEFAULT_STATEMENT_CACHE_SIZE: usize = 64;

/// Configuration for the connection pool.
///
/// Besides sizing and timeouts this carries the session defaults every
/// connection is returned to when it goes back to the pool.
///
/// This struct is marked `#[non_exhaustive]`. Use the builder methods or
/// [`Default::default()`] to construct instances.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PoolConfig {
    /// Number of connections opened when the pool is created.
    pub min_connections: u32,

    /// Maximum number of connections allowed.
    pub max_connections: u32,

    /// Time a connection can be idle before being closed.
    pub idle_timeout: Duration,

    /// Maximum lifetime of a connection.
    pub max_lifetime: Duration,

    /// Prepared statements cached per connection. Zero disables the cache.
    pub statement_cache_size: usize,

    /// Roll back an open transaction when a connection in manual-commit
    /// mode is returned.
    pub rollback_on_return: bool,

    /// Default auto-commit mode.
    pub default_auto_commit: bool,

    /// Default transaction isolation level.
    pub default_transaction_isolation: IsolationLevel,

    /// Default read-only mode.
    pub default_read_only: bool,

    /// Default catalog. `None` leaves the driver's choice in place.
    pub default_catalog: Option<Arc<str>>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 0,
            max_connections: 10,
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
            statement_cache_size: DEFAULT_STATEMENT_CACHE_SIZE,
            rollback_on_return: true,
            default_auto_commit: true,
            default_transaction_isolation: IsolationLevel::ReadCommitted,
            default_read_only: false,
            default_catalog: None,
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of connections opened up front.
    #[must_use]
    pub fn min_connections(mut self, count: u32) -> Self {
        self.min_connections = count;
        self
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.max_connections = count;
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the maximum connection lifetime.
    #[must_use]
    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    /// Set the per-connection statement cache size. Zero disables caching.
    #[must_use]
    pub fn statement_cache_size(mut self, size: usize) -> Self {
        self.statement_cache_size = size;
        self
    }

    /// Enable or disable rollback of open transactions on return.
    #[must_use]
    pub fn rollback_on_return(mut self, enabled: bool) -> Self {
        self.rollback_on_return = enabled;
        self
    }

    /// Set the default auto-commit mode.
    #[must_use]
    pub fn default_auto_commit(mut self, auto_commit: bool) -> Self {
        self.default_auto_commit = auto_commit;
        self
    }

    /// Set the default transaction isolation level.
    #[must_use]
    pub fn default_transaction_isolation(mut self, level: IsolationLevel) -> Self {
        self.default_transaction_isolation = level;
        self
    }

    /// Set the default read-only mode.
    #[must_use]
    pub fn default_read_only(mut self, read_only: bool) -> Self {
        self.default_read_only = read_only;
        self
    }

    /// Set the default catalog.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sessionpool::PoolConfig;
    ///
    /// let config = PoolConfig::new().default_catalog(Some("inventory"));
    /// assert_eq!(config.default_catalog.as_deref(), Some("inventory"));
    ///
    /// let config = config.default_catalog(None::<&str>);
    /// assert!(config.default_catalog.is_none());
    /// ```
    #[must_use]
    pub fn default_catalog<S: Into<Arc<str>>>(mut self, catalog: Option<S>) -> Self {
        self.default_catalog = catalog.map(Into::into);
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_connections == 0 {
            return Err(PoolError::Configuration(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(PoolError::Configuration(
                "min_connections cannot be greater than max_connections".into(),
            ));
        }
        if self.default_catalog.as_deref() == Some("") {
            return Err(PoolError::Configuration(
                "default_catalog must not be empty".into(),
            ));
        }
        Ok(())
    }
}
