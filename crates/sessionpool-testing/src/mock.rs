//! Scriptable mock physical connection.
//!
//! [`MockConnection`] implements [`RawConnection`] entirely in memory. Every
//! call is appended to a log and can be made to fail on demand, and a
//! [`MockHandle`] keeps access to the connection's state after the pool has
//! taken ownership of it.
//!
//! ## Example
//!
//! ```rust
//! use sessionpool::{Pool, PoolConfig, SessionSettings};
//! use sessionpool_testing::mock::{MockFactory, MockOp};
//!
//! let factory = MockFactory::new();
//! let pool = Pool::new(PoolConfig::new(), factory.clone()).unwrap();
//!
//! let mut conn = pool.get().unwrap();
//! conn.set_read_only(true).unwrap();
//! conn.close().unwrap();
//!
//! let handle = factory.handle(0).unwrap();
//! assert!(!handle.session().read_only);
//! assert_eq!(handle.count(MockOp::SetReadOnly), 3);
//! ```

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, MutexGuard};
use sessionpool::{
    ConnectionFactory, Error, IsolationLevel, Metadata, RawConnection, Result, ServerInfo,
    SessionSettings, StatementHandle, TransactionControl,
};

/// Error code used for injected failures.
pub const INJECTED_ERROR_CODE: i32 = 50000;

/// An operation on a mock connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    /// `set_auto_commit`
    SetAutoCommit,
    /// `auto_commit`
    GetAutoCommit,
    /// `set_transaction_isolation`
    SetTransactionIsolation,
    /// `transaction_isolation`
    GetTransactionIsolation,
    /// `set_read_only`
    SetReadOnly,
    /// `is_read_only`
    GetReadOnly,
    /// `set_catalog`
    SetCatalog,
    /// `catalog`
    GetCatalog,
    /// `commit`
    Commit,
    /// `rollback`
    Rollback,
    /// `server_info`
    ServerInfo,
    /// `is_valid`
    IsValid,
    /// `prepare`
    Prepare,
    /// `unprepare`
    Unprepare,
    /// `close`
    Close,
}

/// Session values held by a mock connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Auto-commit mode.
    pub auto_commit: bool,
    /// Transaction isolation level.
    pub isolation: IsolationLevel,
    /// Read-only mode.
    pub read_only: bool,
    /// Current catalog.
    pub catalog: Option<String>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            auto_commit: true,
            isolation: IsolationLevel::ReadCommitted,
            read_only: false,
            catalog: None,
        }
    }
}

#[derive(Debug)]
struct MockState {
    session: SessionSnapshot,
    server: ServerInfo,
    closed: bool,
    calls: Vec<MockOp>,
    failures: HashSet<MockOp>,
    next_handle: StatementHandle,
    prepared: Vec<String>,
    unprepared: Vec<StatementHandle>,
}

/// Builder for [`MockConnection`].
#[derive(Debug, Clone)]
pub struct MockBuilder {
    session: SessionSnapshot,
    server: ServerInfo,
    failures: HashSet<MockOp>,
}

impl Default for MockBuilder {
    fn default() -> Self {
        Self {
            session: SessionSnapshot::default(),
            server: ServerInfo {
                product_name: "MockDB".into(),
                product_version: "1.0.0".into(),
            },
            failures: HashSet::new(),
        }
    }
}

impl MockBuilder {
    /// Set the reported product name.
    #[must_use]
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server.product_name = name.into();
        self
    }

    /// Set the reported product version.
    #[must_use]
    pub fn with_server_version(mut self, version: impl Into<String>) -> Self {
        self.server.product_version = version.into();
        self
    }

    /// Set the session values the connection starts with.
    #[must_use]
    pub fn with_session(mut self, session: SessionSnapshot) -> Self {
        self.session = session;
        self
    }

    /// Make every call of `op` fail.
    #[must_use]
    pub fn fail_on(mut self, op: MockOp) -> Self {
        self.failures.insert(op);
        self
    }

    /// Build the connection.
    #[must_use]
    pub fn build(&self) -> MockConnection {
        MockConnection {
            state: Arc::new(Mutex::new(MockState {
                session: self.session.clone(),
                server: self.server.clone(),
                closed: false,
                calls: Vec::new(),
                failures: self.failures.clone(),
                next_handle: 1,
                prepared: Vec::new(),
                unprepared: Vec::new(),
            })),
        }
    }
}

/// In-memory physical connection.
pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    /// Create a builder.
    #[must_use]
    pub fn builder() -> MockBuilder {
        MockBuilder::default()
    }

    /// Create a connection with default session values.
    #[must_use]
    pub fn new() -> Self {
        MockBuilder::default().build()
    }

    /// Get a handle observing this connection.
    #[must_use]
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn call(&self, op: MockOp) -> Result<MutexGuard<'_, MockState>> {
        let mut state = self.state.lock();
        if state.closed && op != MockOp::Close {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock connection is closed",
            )));
        }
        if state.failures.contains(&op) {
            return Err(Error::Database {
                code: INJECTED_ERROR_CODE,
                message: format!("injected failure in {op:?}"),
            });
        }
        state.calls.push(op);
        tracing::trace!(?op, "mock connection call");
        Ok(state)
    }
}

impl Default for MockConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockConnection")
            .field("session", &self.state.lock().session)
            .finish_non_exhaustive()
    }
}

impl SessionSettings for MockConnection {
    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        self.call(MockOp::SetAutoCommit)?.session.auto_commit = auto_commit;
        Ok(())
    }

    fn auto_commit(&mut self) -> Result<bool> {
        Ok(self.call(MockOp::GetAutoCommit)?.session.auto_commit)
    }

    fn set_transaction_isolation(&mut self, level: IsolationLevel) -> Result<()> {
        self.call(MockOp::SetTransactionIsolation)?.session.isolation = level;
        Ok(())
    }

    fn transaction_isolation(&mut self) -> Result<IsolationLevel> {
        Ok(self.call(MockOp::GetTransactionIsolation)?.session.isolation)
    }

    fn set_read_only(&mut self, read_only: bool) -> Result<()> {
        self.call(MockOp::SetReadOnly)?.session.read_only = read_only;
        Ok(())
    }

    fn is_read_only(&mut self) -> Result<bool> {
        Ok(self.call(MockOp::GetReadOnly)?.session.read_only)
    }

    fn set_catalog(&mut self, catalog: Option<&str>) -> Result<()> {
        self.call(MockOp::SetCatalog)?.session.catalog = catalog.map(str::to_owned);
        Ok(())
    }

    fn catalog(&mut self) -> Result<Option<String>> {
        Ok(self.call(MockOp::GetCatalog)?.session.catalog.clone())
    }
}

impl TransactionControl for MockConnection {
    fn commit(&mut self) -> Result<()> {
        self.call(MockOp::Commit).map(drop)
    }

    fn rollback(&mut self) -> Result<()> {
        self.call(MockOp::Rollback).map(drop)
    }
}

impl Metadata for MockConnection {
    fn server_info(&mut self) -> Result<ServerInfo> {
        Ok(self.call(MockOp::ServerInfo)?.server.clone())
    }

    fn is_valid(&mut self) -> Result<bool> {
        Ok(self.call(MockOp::IsValid).is_ok())
    }
}

impl RawConnection for MockConnection {
    fn prepare(&mut self, sql: &str) -> Result<StatementHandle> {
        let mut state = self.call(MockOp::Prepare)?;
        let handle = state.next_handle;
        state.next_handle += 1;
        state.prepared.push(sql.to_owned());
        Ok(handle)
    }

    fn unprepare(&mut self, handle: StatementHandle) -> Result<()> {
        self.call(MockOp::Unprepare)?.unprepared.push(handle);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.call(MockOp::Close)?.closed = true;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Observer of a [`MockConnection`] that outlives the connection's move
/// into a pool.
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    /// Get the current session values.
    #[must_use]
    pub fn session(&self) -> SessionSnapshot {
        self.state.lock().session.clone()
    }

    /// Change session values behind the pool's back.
    pub fn update_session(&self, f: impl FnOnce(&mut SessionSnapshot)) {
        f(&mut self.state.lock().session);
    }

    /// Get the log of successful calls.
    #[must_use]
    pub fn calls(&self) -> Vec<MockOp> {
        self.state.lock().calls.clone()
    }

    /// Count successful calls of `op`.
    #[must_use]
    pub fn count(&self, op: MockOp) -> usize {
        self.state.lock().calls.iter().filter(|call| **call == op).count()
    }

    /// Clear the call log.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Make every later call of `op` fail.
    pub fn fail_on(&self, op: MockOp) {
        self.state.lock().failures.insert(op);
    }

    /// Let every later call succeed again.
    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Check whether the physical connection was closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Get the SQL texts prepared so far.
    #[must_use]
    pub fn prepared(&self) -> Vec<String> {
        self.state.lock().prepared.clone()
    }

    /// Get the statement handles released so far.
    #[must_use]
    pub fn unprepared(&self) -> Vec<StatementHandle> {
        self.state.lock().unprepared.clone()
    }
}

impl fmt::Debug for MockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockHandle")
            .field("session", &state.session)
            .field("closed", &state.closed)
            .field("calls", &state.calls.len())
            .finish()
    }
}

/// Connection factory producing [`MockConnection`]s.
///
/// Clones share the list of handles, so a test can keep one clone and give
/// another to the pool.
#[derive(Clone, Default)]
pub struct MockFactory {
    inner: Arc<FactoryInner>,
}

#[derive(Default)]
struct FactoryInner {
    template: MockBuilder,
    handles: Mutex<Vec<MockHandle>>,
    refuse: AtomicBool,
}

impl MockFactory {
    /// Create a factory producing default mock connections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a factory producing connections from `template`.
    #[must_use]
    pub fn with_template(template: MockBuilder) -> Self {
        Self {
            inner: Arc::new(FactoryInner {
                template,
                ..FactoryInner::default()
            }),
        }
    }

    /// Make later `connect` calls fail (or succeed again).
    pub fn refuse_connections(&self, refuse: bool) {
        self.inner.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Get the handle of the `index`th connection opened.
    #[must_use]
    pub fn handle(&self, index: usize) -> Option<MockHandle> {
        self.inner.handles.lock().get(index).cloned()
    }

    /// Get handles of every connection opened, in order.
    #[must_use]
    pub fn handles(&self) -> Vec<MockHandle> {
        self.inner.handles.lock().clone()
    }

    /// Number of connections opened.
    #[must_use]
    pub fn opened(&self) -> usize {
        self.inner.handles.lock().len()
    }
}

impl ConnectionFactory for MockFactory {
    fn connect(&self) -> Result<Box<dyn RawConnection>> {
        if self.inner.refuse.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "mock factory refused connection",
            )));
        }
        let conn = self.inner.template.build();
        self.inner.handles.lock().push(conn.handle());
        Ok(Box::new(conn))
    }
}

impl fmt::Debug for MockFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockFactory")
            .field("opened", &self.opened())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_records_calls() {
        let mut conn = MockConnection::new();
        let handle = conn.handle();

        conn.set_read_only(true).unwrap();
        conn.set_catalog(Some("archive")).unwrap();

        assert_eq!(handle.calls(), vec![MockOp::SetReadOnly, MockOp::SetCatalog]);
        assert!(handle.session().read_only);
        assert_eq!(handle.session().catalog.as_deref(), Some("archive"));
    }

    #[test]
    fn test_mock_injected_failure() {
        let mut conn = MockConnection::builder().fail_on(MockOp::Commit).build();
        let handle = conn.handle();

        let err = conn.commit().unwrap_err();
        assert!(matches!(err, Error::Database { code: INJECTED_ERROR_CODE, .. }));
        assert!(handle.calls().is_empty());

        handle.clear_failures();
        conn.commit().unwrap();
        assert_eq!(handle.count(MockOp::Commit), 1);
    }

    #[test]
    fn test_mock_rejects_calls_after_close() {
        let mut conn = MockConnection::new();
        RawConnection::close(&mut conn).unwrap();

        assert!(matches!(conn.set_auto_commit(false), Err(Error::Io(_))));
        assert!(!conn.is_valid().unwrap());
    }

    #[test]
    fn test_factory_tracks_handles() {
        let factory = MockFactory::with_template(
            MockConnection::builder().with_server_name("Warehouse"),
        );
        let mut conn = factory.connect().unwrap();
        assert_eq!(factory.opened(), 1);
        assert_eq!(conn.server_info().unwrap().product_name, "Warehouse");

        factory.refuse_connections(true);
        assert!(factory.connect().is_err());
        assert_eq!(factory.opened(), 1);
    }
}
