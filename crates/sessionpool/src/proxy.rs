//! Caller-facing connection handle.
//!
//! A [`ProxyConnection`] stands in for a physical connection for the
//! duration of one checkout. It forwards every capability call to the
//! physical connection, records which session properties moved away from
//! the pool defaults, and on [`close`](ProxyConnection::close) sends the
//! leased record back to the pool instead of disconnecting.
//!
//! ## State machine
//!
//! ```text
//! Open { record, statement_cache } --close()--> Closed
//! ```
//!
//! `Closed` is terminal and carries no payload, so a closed handle cannot
//! reach the record, the physical connection or the statement cache. Every
//! operation except `close` fails with [`Error::ConnectionClosed`] once the
//! handle is closed; `close` itself becomes a no-op.

use std::any::{Any, type_name};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::connection::{
    Metadata, ServerInfo, SessionSettings, StatementHandle, TransactionControl, Wrapper,
};
use crate::error::{Error, Result};
use crate::record::PooledConnection;
use crate::session::{ChangedFlags, IsolationLevel, SessionProperty, catalog_differs};
use crate::statement_cache::{PreparedStatement, StatementCache};

/// A pooled connection handle.
///
/// Not internally synchronized: the handle is `Send` but every operation
/// takes `&mut self`. Dropping an open handle closes it.
#[derive(Debug)]
pub struct ProxyConnection {
    state: ProxyState,
}

#[derive(Debug)]
enum ProxyState {
    Open(OpenConnection),
    Closed,
}

#[derive(Debug)]
struct OpenConnection {
    record: PooledConnection,
    statement_cache: Option<Arc<Mutex<StatementCache>>>,
}

impl ProxyConnection {
    /// Wrap a checked-out record.
    ///
    /// The connection is not validated here; that is the pool's job before
    /// checkout.
    pub fn new(record: PooledConnection) -> Self {
        let statement_cache = record.statement_cache().cloned();
        Self {
            state: ProxyState::Open(OpenConnection {
                record,
                statement_cache,
            }),
        }
    }

    /// Check whether the handle has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self.state, ProxyState::Closed)
    }

    /// Get the identifier of the leased connection, or `None` once closed.
    #[must_use]
    pub fn connection_id(&self) -> Option<u64> {
        self.record().ok().map(PooledConnection::id)
    }

    /// Get the leased record's changed flags, or `None` once closed.
    #[must_use]
    pub fn changed_flags(&self) -> Option<ChangedFlags> {
        self.record().ok().map(PooledConnection::changed_flags)
    }

    /// Get the time of the last use, or `None` once closed.
    #[must_use]
    pub fn last_access(&self) -> Option<Instant> {
        self.record().ok().map(PooledConnection::last_access)
    }

    /// Check whether the handle still holds a statement cache.
    #[must_use]
    pub fn has_statement_cache(&self) -> bool {
        matches!(&self.state, ProxyState::Open(open) if open.statement_cache.is_some())
    }

    fn record(&self) -> Result<&PooledConnection> {
        match &self.state {
            ProxyState::Open(open) => Ok(&open.record),
            ProxyState::Closed => Err(Error::ConnectionClosed),
        }
    }

    fn record_mut(&mut self) -> Result<&mut PooledConnection> {
        match &mut self.state {
            ProxyState::Open(open) => Ok(&mut open.record),
            ProxyState::Closed => Err(Error::ConnectionClosed),
        }
    }

    /// Record a session property change after it was applied.
    fn track(record: &mut PooledConnection, property: SessionProperty, changed: bool) {
        record.update_access_time();
        record.set_changed(property, changed);
        tracing::trace!(
            connection_id = record.id(),
            property = property.name(),
            changed,
            "session property set"
        );
    }

    /// Prepare a statement, reusing the connection's cached handle when
    /// the same SQL text was prepared before.
    pub fn prepare(&mut self, sql: &str) -> Result<StatementHandle> {
        let ProxyState::Open(open) = &mut self.state else {
            return Err(Error::ConnectionClosed);
        };
        let record = &mut open.record;
        record.update_access_time();

        let Some(cache) = &open.statement_cache else {
            return record.raw_mut().prepare(sql);
        };
        if let Some(handle) = cache.lock().get(sql) {
            return Ok(handle);
        }

        let handle = record.raw_mut().prepare(sql)?;
        let evicted = cache.lock().insert(PreparedStatement::new(handle, sql));
        if let Some(stmt) = evicted {
            if let Err(e) = record.raw_mut().unprepare(stmt.handle()) {
                tracing::warn!(
                    connection_id = record.id(),
                    handle = stmt.handle(),
                    error = %e,
                    "failed to release evicted statement"
                );
            }
        }
        Ok(handle)
    }

    /// Close the handle and return the connection to the pool.
    ///
    /// The handle is closed and has released the record before the return
    /// is attempted, so it is closed even if the return fails. A failed
    /// return means the pool rejected the connection and closed it.
    ///
    /// Closing an already closed handle does nothing.
    pub fn close(&mut self) -> Result<()> {
        let ProxyState::Open(open) = std::mem::replace(&mut self.state, ProxyState::Closed) else {
            return Ok(());
        };
        let OpenConnection {
            record,
            statement_cache,
        } = open;
        drop(statement_cache);

        tracing::trace!(connection_id = record.id(), "returning connection to pool");
        record.return_to_pool_by_self()
    }
}

impl Drop for ProxyConnection {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "connection dropped but could not be returned to pool");
        }
    }
}

impl SessionSettings for ProxyConnection {
    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        let record = self.record_mut()?;
        record.raw_mut().set_auto_commit(auto_commit)?;
        record.set_current_auto_commit(auto_commit);
        let changed = auto_commit != record.config().default_auto_commit;
        Self::track(record, SessionProperty::AutoCommit, changed);
        Ok(())
    }

    fn auto_commit(&mut self) -> Result<bool> {
        let record = self.record_mut()?;
        record.update_access_time();
        record.raw_mut().auto_commit()
    }

    fn set_transaction_isolation(&mut self, level: IsolationLevel) -> Result<()> {
        let record = self.record_mut()?;
        record.raw_mut().set_transaction_isolation(level)?;
        let changed = level != record.config().default_transaction_isolation;
        Self::track(record, SessionProperty::TransactionIsolation, changed);
        Ok(())
    }

    fn transaction_isolation(&mut self) -> Result<IsolationLevel> {
        let record = self.record_mut()?;
        record.update_access_time();
        record.raw_mut().transaction_isolation()
    }

    fn set_read_only(&mut self, read_only: bool) -> Result<()> {
        let record = self.record_mut()?;
        record.raw_mut().set_read_only(read_only)?;
        let changed = read_only != record.config().default_read_only;
        Self::track(record, SessionProperty::ReadOnly, changed);
        Ok(())
    }

    fn is_read_only(&mut self) -> Result<bool> {
        let record = self.record_mut()?;
        record.update_access_time();
        record.raw_mut().is_read_only()
    }

    fn set_catalog(&mut self, catalog: Option<&str>) -> Result<()> {
        let record = self.record_mut()?;
        record.raw_mut().set_catalog(catalog)?;
        let changed = catalog_differs(catalog, record.config().default_catalog.as_deref());
        Self::track(record, SessionProperty::Catalog, changed);
        Ok(())
    }

    fn catalog(&mut self) -> Result<Option<String>> {
        let record = self.record_mut()?;
        record.update_access_time();
        record.raw_mut().catalog()
    }
}

impl TransactionControl for ProxyConnection {
    fn commit(&mut self) -> Result<()> {
        let record = self.record_mut()?;
        record.update_access_time();
        record.raw_mut().commit()
    }

    fn rollback(&mut self) -> Result<()> {
        let record = self.record_mut()?;
        record.update_access_time();
        record.raw_mut().rollback()
    }
}

impl Metadata for ProxyConnection {
    fn server_info(&mut self) -> Result<ServerInfo> {
        let record = self.record_mut()?;
        record.update_access_time();
        record.raw_mut().server_info()
    }

    fn is_valid(&mut self) -> Result<bool> {
        let record = self.record_mut()?;
        record.update_access_time();
        record.raw_mut().is_valid()
    }
}

impl Wrapper for ProxyConnection {
    fn is_wrapper_for<T: Any>(&self) -> Result<bool> {
        Ok(self.record()?.raw().as_any().is::<T>())
    }

    fn unwrap<T: Any>(&mut self) -> Result<&mut Self> {
        if self.is_wrapper_for::<T>()? {
            Ok(self)
        } else {
            Err(Error::UnsupportedWrap {
                target: type_name::<T>(),
            })
        }
    }
}
