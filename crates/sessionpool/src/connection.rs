//! Connection capability traits.
//!
//! The capability surface is split into one trait per group so that the
//! physical connection and the pool handle can implement the same set:
//!
//! - [`SessionSettings`] - auto-commit, isolation, read-only, catalog
//! - [`TransactionControl`] - commit and rollback
//! - [`Metadata`] - server information and liveness
//! - [`Wrapper`] - introspection of the wrapped physical connection
//!
//! [`RawConnection`] bundles the first three with the statement and
//! lifecycle hooks the pool needs from a driver, and [`ConnectionFactory`]
//! opens new ones.

use std::any::Any;

use crate::error::Result;
use crate::session::IsolationLevel;

/// Server-assigned handle of a prepared statement.
pub type StatementHandle = i32;

/// Session-level settings of a connection.
pub trait SessionSettings {
    /// Enable or disable auto-commit mode.
    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()>;

    /// Get the auto-commit mode.
    fn auto_commit(&mut self) -> Result<bool>;

    /// Set the transaction isolation level.
    fn set_transaction_isolation(&mut self, level: IsolationLevel) -> Result<()>;

    /// Get the transaction isolation level.
    fn transaction_isolation(&mut self) -> Result<IsolationLevel>;

    /// Enable or disable read-only mode.
    fn set_read_only(&mut self, read_only: bool) -> Result<()>;

    /// Get the read-only mode.
    fn is_read_only(&mut self) -> Result<bool>;

    /// Switch the current catalog. `None` clears it.
    fn set_catalog(&mut self, catalog: Option<&str>) -> Result<()>;

    /// Get the current catalog.
    fn catalog(&mut self) -> Result<Option<String>>;
}

/// Explicit transaction control.
pub trait TransactionControl {
    /// Commit the current transaction.
    fn commit(&mut self) -> Result<()>;

    /// Roll back the current transaction.
    fn rollback(&mut self) -> Result<()>;
}

/// Information reported by the database server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    /// Product name, e.g. `"PostgreSQL"`.
    pub product_name: String,
    /// Product version string.
    pub product_version: String,
}

/// Connection metadata queries.
pub trait Metadata {
    /// Get information about the connected server.
    fn server_info(&mut self) -> Result<ServerInfo>;

    /// Check whether the connection is still usable.
    fn is_valid(&mut self) -> Result<bool>;
}

/// Introspection of the physical connection behind a handle.
pub trait Wrapper {
    /// Check whether the wrapped physical connection is a `T`.
    fn is_wrapper_for<T: Any>(&self) -> Result<bool>;

    /// Obtain this handle as a `T`-backed connection.
    ///
    /// Returns the handle itself, never the physical connection, so that
    /// every later call is still intercepted.
    fn unwrap<T: Any>(&mut self) -> Result<&mut Self>
    where
        Self: Sized;
}

/// A physical database connection managed by the pool.
///
/// Drivers implement this trait; the pool never talks to the transport
/// directly.
pub trait RawConnection: SessionSettings + TransactionControl + Metadata + Send + 'static {
    /// Prepare a statement and return its handle.
    fn prepare(&mut self, sql: &str) -> Result<StatementHandle>;

    /// Release a prepared statement.
    fn unprepare(&mut self, handle: StatementHandle) -> Result<()>;

    /// Close the physical connection.
    fn close(&mut self) -> Result<()>;

    /// View the connection as [`Any`] for type introspection.
    fn as_any(&self) -> &dyn Any;
}

/// Opens new physical connections for the pool.
pub trait ConnectionFactory: Send + Sync {
    /// Open a new physical connection.
    fn connect(&self) -> Result<Box<dyn RawConnection>>;
}

impl<F> ConnectionFactory for F
where
    F: Fn() -> Result<Box<dyn RawConnection>> + Send + Sync,
{
    fn connect(&self) -> Result<Box<dyn RawConnection>> {
        self()
    }
}
