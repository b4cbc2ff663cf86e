//! Connection pool implementation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::config::PoolConfig;
use crate::connection::ConnectionFactory;
use crate::error::{Error, PoolError};
use crate::proxy::ProxyConnection;
use crate::record::PooledConnection;

/// A connection pool.
///
/// The pool owns idle [`PooledConnection`] records and leases them out
/// wrapped in a [`ProxyConnection`]. Closing (or dropping) the handle sends
/// the record back through [`PooledConnection::return_to_pool_by_self`].
///
/// `Pool` is cheap to clone; clones share the same connections.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolShared>,
}

/// State shared between the pool and the records it has leased out.
pub(crate) struct PoolShared {
    config: Arc<PoolConfig>,
    factory: Box<dyn ConnectionFactory>,
    state: Mutex<PoolState>,
    next_id: AtomicU64,
}

struct PoolState {
    idle: Vec<PooledConnection>,
    total: u32,
    closed: bool,
}

impl Pool {
    /// Create a pool and open `min_connections` connections up front.
    pub fn new<F>(config: PoolConfig, factory: F) -> Result<Self, PoolError>
    where
        F: ConnectionFactory + 'static,
    {
        config.validate()?;

        let inner = Arc::new(PoolShared {
            config: Arc::new(config),
            factory: Box::new(factory),
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                total: 0,
                closed: false,
            }),
            next_id: AtomicU64::new(1),
        });

        for _ in 0..inner.config.min_connections {
            let record = inner.open_record()?;
            let mut state = inner.state.lock();
            state.total += 1;
            state.idle.push(record);
        }

        tracing::debug!(
            min = inner.config.min_connections,
            max = inner.config.max_connections,
            "connection pool created"
        );
        Ok(Self { inner })
    }

    /// Get a connection from the pool.
    ///
    /// Returns an idle connection if one is available, otherwise opens a
    /// new one if the pool is below `max_connections`. Does not wait:
    /// an exhausted pool fails with [`PoolError::MaxConnectionsReached`].
    pub fn get(&self) -> Result<ProxyConnection, PoolError> {
        loop {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(PoolError::PoolClosed);
            }

            if let Some(mut record) = state.idle.pop() {
                if record.is_stale() {
                    state.total -= 1;
                    drop(state);
                    tracing::debug!(connection_id = record.id(), "discarding stale connection");
                    record.close();
                    continue;
                }
                drop(state);
                record.mark_checkout();
                tracing::trace!(connection_id = record.id(), "checked out idle connection");
                return Ok(ProxyConnection::new(record));
            }

            if state.total >= self.inner.config.max_connections {
                return Err(PoolError::MaxConnectionsReached {
                    max: self.inner.config.max_connections,
                });
            }
            // Reserve the slot before connecting outside the lock
            state.total += 1;
            drop(state);

            let mut record = match self.inner.open_record() {
                Ok(record) => record,
                Err(e) => {
                    self.inner.release_slot();
                    return Err(e);
                }
            };
            if self.inner.is_closed() {
                tracing::debug!(connection_id = record.id(), "pool closed while connecting");
                self.inner.discard(record);
                return Err(PoolError::PoolClosed);
            }
            record.mark_checkout();
            tracing::trace!(connection_id = record.id(), "checked out new connection");
            return Ok(ProxyConnection::new(record));
        }
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        let available = state.idle.len() as u32;
        PoolStatus {
            available,
            in_use: state.total - available,
            total: state.total,
            max: self.inner.config.max_connections,
        }
    }

    /// Close the pool, closing all idle connections.
    ///
    /// Connections checked out at this point are closed when their handle
    /// is returned.
    pub fn close(&self) {
        let idle = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            let idle = std::mem::take(&mut state.idle);
            state.total -= idle.len() as u32;
            idle
        };
        let count = idle.len();
        for record in idle {
            record.close();
        }
        tracing::info!(closed_idle = count, "connection pool closed");
    }

    /// Check if the pool is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.inner.config)
            .field("status", &self.status())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl PoolShared {
    fn open_record(self: &Arc<Self>) -> Result<PooledConnection, PoolError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let raw = self.factory.connect().map_err(creation_error)?;
        PooledConnection::open(id, raw, Arc::clone(&self.config), Arc::downgrade(self))
            .map_err(creation_error)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Accept a reset record back into the idle stack.
    pub(crate) fn check_in(&self, record: PooledConnection) -> Result<(), Error> {
        let mut state = self.state.lock();
        if state.closed {
            state.total -= 1;
            drop(state);
            record.close();
            return Err(PoolError::PoolClosed.into());
        }
        tracing::debug!(connection_id = record.id(), "connection returned to pool");
        state.idle.push(record);
        Ok(())
    }

    /// Drop a checked-out record from the pool's accounting and close it.
    pub(crate) fn discard(&self, record: PooledConnection) {
        self.release_slot();
        record.close();
    }

    fn release_slot(&self) {
        let mut state = self.state.lock();
        state.total = state.total.saturating_sub(1);
    }
}

fn creation_error(e: Error) -> PoolError {
    PoolError::ConnectionCreation(e.to_string())
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Number of idle connections available.
    pub available: u32,
    /// Number of connections currently in use.
    pub in_use: u32,
    /// Total number of connections.
    pub total: u32,
    /// Maximum allowed connections.
    pub max: u32,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::connection::{RawConnection, SessionSettings};
    use crate::test_support::{StubConnection, StubState};

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::TRACE)
            .try_init();
    }

    fn stub_factory() -> impl ConnectionFactory {
        || -> crate::error::Result<Box<dyn RawConnection>> { Ok(StubConnection::new().0) }
    }

    #[test]
    fn test_pool_rejects_invalid_config() {
        let result = Pool::new(PoolConfig::new().max_connections(0), stub_factory());
        assert!(matches!(result, Err(PoolError::Configuration(_))));
    }

    #[test]
    fn test_pool_opens_min_connections() {
        init_tracing();
        let pool = Pool::new(
            PoolConfig::new().min_connections(3).max_connections(5),
            stub_factory(),
        )
        .unwrap();

        let status = pool.status();
        assert_eq!(status.available, 3);
        assert_eq!(status.in_use, 0);
        assert_eq!(status.total, 3);
        assert_eq!(status.max, 5);
    }

    #[test]
    fn test_pool_reuses_returned_connection() {
        init_tracing();
        let pool = Pool::new(PoolConfig::new().max_connections(2), stub_factory()).unwrap();

        let mut conn = pool.get().unwrap();
        let id = conn.connection_id().unwrap();
        assert_eq!(pool.status().in_use, 1);
        conn.close().unwrap();

        let status = pool.status();
        assert_eq!(status.in_use, 0);
        assert_eq!(status.available, 1);

        let conn = pool.get().unwrap();
        assert_eq!(conn.connection_id(), Some(id));
    }

    #[test]
    fn test_pool_exhaustion() {
        let pool = Pool::new(PoolConfig::new().max_connections(1), stub_factory()).unwrap();

        let _held = pool.get().unwrap();
        let result = pool.get();
        assert!(matches!(
            result,
            Err(PoolError::MaxConnectionsReached { max: 1 })
        ));
    }

    #[test]
    fn test_pool_creation_failure_releases_slot() {
        let factory = || -> crate::error::Result<Box<dyn RawConnection>> {
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            )))
        };
        let pool = Pool::new(PoolConfig::new().max_connections(1), factory).unwrap();

        let result = pool.get();
        assert!(matches!(result, Err(PoolError::ConnectionCreation(msg)) if msg.contains("refused")));
        assert_eq!(pool.status().total, 0);
    }

    #[test]
    fn test_closed_pool_rejects_get_and_return() {
        let pool = Pool::new(
            PoolConfig::new().min_connections(1).max_connections(2),
            stub_factory(),
        )
        .unwrap();
        let mut conn = pool.get().unwrap();

        pool.close();
        assert!(pool.is_closed());
        assert!(matches!(pool.get(), Err(PoolError::PoolClosed)));

        let result = conn.close();
        assert!(matches!(result, Err(Error::Pool(PoolError::PoolClosed))));
        assert!(conn.is_closed());
        assert_eq!(pool.status().total, 0);
    }

    #[test]
    fn test_pool_closed_while_connecting_discards_connection() {
        let pool_slot: Arc<Mutex<Option<Pool>>> = Arc::new(Mutex::new(None));
        let opened: Arc<Mutex<Vec<Arc<Mutex<StubState>>>>> = Arc::new(Mutex::new(Vec::new()));
        let factory = {
            let pool_slot = Arc::clone(&pool_slot);
            let opened = Arc::clone(&opened);
            move || -> crate::error::Result<Box<dyn RawConnection>> {
                if let Some(pool) = pool_slot.lock().take() {
                    pool.close();
                }
                let (raw, state) = StubConnection::new();
                opened.lock().push(state);
                Ok(raw)
            }
        };
        let pool = Pool::new(PoolConfig::new().max_connections(1), factory).unwrap();
        *pool_slot.lock() = Some(pool.clone());

        let result = pool.get();
        assert!(matches!(result, Err(PoolError::PoolClosed)));
        assert_eq!(pool.status().total, 0);

        let opened = opened.lock();
        assert_eq!(opened.len(), 1);
        assert!(opened[0].lock().closed);
    }

    #[test]
    fn test_stale_idle_connection_is_replaced() {
        let pool = Pool::new(
            PoolConfig::new()
                .min_connections(1)
                .max_connections(1)
                .idle_timeout(std::time::Duration::ZERO),
            stub_factory(),
        )
        .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));

        let mut conn = pool.get().unwrap();
        assert_eq!(conn.connection_id(), Some(2));
        assert!(conn.auto_commit().unwrap());
        assert_eq!(pool.status().total, 1);
    }
}
