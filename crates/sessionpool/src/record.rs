//! Pooled connection records.
//!
//! A [`PooledConnection`] pairs one physical connection with the
//! bookkeeping the pool needs across its whole lifetime: the shared pool
//! defaults, the statement cache, which session properties a caller moved
//! away from those defaults, and lifecycle metadata.
//!
//! ## Return protocol
//!
//! When a handle is closed the record returns itself to the pool:
//!
//! 1. A connection still in manual-commit mode has its open transaction
//!    rolled back (if `rollback_on_return` is set)
//! 2. Each property whose changed flag is set is restored to the pool
//!    default and its flag cleared; untouched properties are never reset
//! 3. The record is pushed onto the pool's idle stack
//!
//! If the pool is closed or a reset step fails, the record is discarded
//! and its physical connection closed instead.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;

use crate::config::PoolConfig;
use crate::connection::RawConnection;
use crate::error::{PoolError, Result};
use crate::lifecycle::{ConnectionMetadata, ConnectionState};
use crate::pool::PoolShared;
use crate::session::{ChangedFlags, SessionProperty};
use crate::statement_cache::StatementCache;

/// Pool-owned record of one physical connection.
pub struct PooledConnection {
    raw: Box<dyn RawConnection>,
    config: Arc<PoolConfig>,
    statement_cache: Option<Arc<Mutex<StatementCache>>>,
    changed: ChangedFlags,
    current_auto_commit: bool,
    metadata: ConnectionMetadata,
    pool: Weak<PoolShared>,
}

impl PooledConnection {
    /// Wrap a freshly opened physical connection, applying the pool
    /// defaults to it first.
    ///
    /// Every default is applied, a `None` catalog included, so a new record
    /// starts in the same session state a reset record returns to.
    pub(crate) fn open(
        id: u64,
        mut raw: Box<dyn RawConnection>,
        config: Arc<PoolConfig>,
        pool: Weak<PoolShared>,
    ) -> Result<Self> {
        if let Err(e) = apply_defaults(raw.as_mut(), &config) {
            if let Err(close_err) = raw.close() {
                tracing::warn!(connection_id = id, error = %close_err, "failed to close rejected connection");
            }
            return Err(e);
        }

        let statement_cache = NonZeroUsize::new(config.statement_cache_size)
            .map(|size| Arc::new(Mutex::new(StatementCache::new(size))));

        tracing::debug!(
            connection_id = id,
            statement_cache = statement_cache.is_some(),
            "opened pooled connection"
        );

        Ok(Self {
            raw,
            current_auto_commit: config.default_auto_commit,
            config,
            statement_cache,
            changed: ChangedFlags::new(),
            metadata: ConnectionMetadata::new(id),
            pool,
        })
    }

    /// Get the connection identifier.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.metadata.id
    }

    /// Get the pool configuration this record resets to.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Get the changed flags.
    #[must_use]
    pub fn changed_flags(&self) -> ChangedFlags {
        self.changed
    }

    /// Get the last auto-commit mode applied to the physical connection.
    #[must_use]
    pub fn current_auto_commit(&self) -> bool {
        self.current_auto_commit
    }

    /// Get the time of the last use.
    #[must_use]
    pub fn last_access(&self) -> Instant {
        self.metadata.last_used_at
    }

    /// Get the statement cache, if caching is enabled.
    #[must_use]
    pub fn statement_cache(&self) -> Option<&Arc<Mutex<StatementCache>>> {
        self.statement_cache.as_ref()
    }

    /// Get the physical connection.
    #[must_use]
    pub fn raw(&self) -> &dyn RawConnection {
        self.raw.as_ref()
    }

    pub(crate) fn raw_mut(&mut self) -> &mut dyn RawConnection {
        self.raw.as_mut()
    }

    /// Stamp the current time as the last access.
    pub fn update_access_time(&mut self) {
        self.metadata.touch();
    }

    /// Mark or unmark a property as changed from the pool default.
    pub fn set_changed(&mut self, property: SessionProperty, changed: bool) {
        self.changed.set(property, changed);
    }

    pub(crate) fn set_current_auto_commit(&mut self, auto_commit: bool) {
        self.current_auto_commit = auto_commit;
    }

    pub(crate) fn mark_checkout(&mut self) {
        self.metadata.mark_checkout();
    }

    /// Check whether the pool should stop handing this record out.
    pub(crate) fn is_stale(&self) -> bool {
        self.metadata.is_expired(self.config.max_lifetime)
            || self.metadata.is_idle_expired(self.config.idle_timeout)
    }

    /// Restore every changed property to its pool default.
    pub(crate) fn reset_to_defaults(&mut self) -> Result<()> {
        if !self.current_auto_commit && self.config.rollback_on_return {
            tracing::trace!(connection_id = self.id(), "rolling back open transaction");
            self.raw.rollback()?;
        }

        let changed = self.changed;
        for property in changed.iter() {
            match property {
                SessionProperty::AutoCommit => {
                    self.raw.set_auto_commit(self.config.default_auto_commit)?;
                    self.current_auto_commit = self.config.default_auto_commit;
                }
                SessionProperty::TransactionIsolation => self
                    .raw
                    .set_transaction_isolation(self.config.default_transaction_isolation)?,
                SessionProperty::ReadOnly => {
                    self.raw.set_read_only(self.config.default_read_only)?;
                }
                SessionProperty::Catalog => {
                    self.raw.set_catalog(self.config.default_catalog.as_deref())?;
                }
            }
            self.changed.set(property, false);
            tracing::trace!(
                connection_id = self.id(),
                property = property.name(),
                "reset session property to default"
            );
        }
        Ok(())
    }

    /// Hand this record back to the pool it came from.
    ///
    /// Fails with [`PoolError::PoolClosed`] if the pool has been closed or
    /// dropped, and with the physical connection's own error if resetting a
    /// changed property fails. In both cases the physical connection is
    /// closed and the record does not re-enter the pool.
    pub fn return_to_pool_by_self(mut self) -> Result<()> {
        let Some(pool) = self.pool.upgrade() else {
            tracing::debug!(connection_id = self.id(), "pool dropped, closing returned connection");
            return Err(PoolError::PoolClosed.into());
        };
        if pool.is_closed() {
            pool.discard(self);
            return Err(PoolError::PoolClosed.into());
        }

        self.metadata.state = ConnectionState::Resetting;
        if let Err(e) = self.reset_to_defaults() {
            tracing::warn!(
                connection_id = self.id(),
                error = %e,
                "failed to reset connection, discarding"
            );
            pool.discard(self);
            return Err(e);
        }

        self.metadata.mark_checkin();
        pool.check_in(self)
    }

    /// Close the physical connection.
    pub(crate) fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.metadata.state == ConnectionState::Closed {
            return;
        }
        self.metadata.state = ConnectionState::Closed;
        if let Some(cache) = self.statement_cache.take() {
            cache.lock().clear();
        }
        if let Err(e) = self.raw.close() {
            tracing::warn!(connection_id = self.id(), error = %e, "failed to close connection");
        }
        tracing::debug!(connection_id = self.id(), "closed pooled connection");
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.metadata.id)
            .field("state", &self.metadata.state)
            .field("checkout_count", &self.metadata.checkout_count)
            .field("changed", &self.changed)
            .field("current_auto_commit", &self.current_auto_commit)
            .field("statement_cache", &self.statement_cache)
            .finish_non_exhaustive()
    }
}

fn apply_defaults(raw: &mut dyn RawConnection, config: &PoolConfig) -> Result<()> {
    raw.set_auto_commit(config.default_auto_commit)?;
    raw.set_transaction_isolation(config.default_transaction_isolation)?;
    raw.set_read_only(config.default_read_only)?;
    raw.set_catalog(config.default_catalog.as_deref())?;
    Ok(())
}
