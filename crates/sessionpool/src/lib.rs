//! # sessionpool
//!
//! Connection pool handles that track session state and return themselves
//! to the pool on close.
//!
//! A [`ProxyConnection`] stands in for a physical database connection for
//! the length of one checkout. It forwards every call to the driver's
//! [`RawConnection`], remembers which session properties the caller moved
//! away from the pool defaults, and on close hands its
//! [`PooledConnection`] record back to the [`Pool`]. Only the properties
//! that actually changed are reset before the connection is reused.
//!
//! ## Features
//!
//! - Open/closed handle lifecycle; a closed handle rejects every operation
//! - Selective reset of auto-commit, isolation level, read-only and catalog
//! - Rollback of open manual-commit transactions on return
//! - Per-connection prepared statement cache that survives checkouts
//! - Driver-agnostic: bring your own [`RawConnection`] and
//!   [`ConnectionFactory`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use sessionpool::{Pool, PoolConfig, SessionSettings};
//!
//! let config = PoolConfig::new()
//!     .max_connections(20)
//!     .default_auto_commit(true);
//!
//! let pool = Pool::new(config, my_driver_factory)?;
//! let mut conn = pool.get()?;
//! conn.set_auto_commit(false)?;
//! // Use connection...
//! conn.close()?; // auto-commit is restored before the next checkout
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod error;
pub mod lifecycle;
pub mod pool;
pub mod proxy;
pub mod record;
pub mod session;
pub mod statement_cache;

#[cfg(test)]
mod test_support;

pub use config::PoolConfig;
pub use connection::{
    ConnectionFactory, Metadata, RawConnection, ServerInfo, SessionSettings, StatementHandle,
    TransactionControl, Wrapper,
};
pub use error::{Error, PoolError, Result};
pub use lifecycle::{ConnectionMetadata, ConnectionState};
pub use pool::{Pool, PoolStatus};
pub use proxy::ProxyConnection;
pub use record::PooledConnection;
pub use session::{ChangedFlags, IsolationLevel, SessionProperty};
pub use statement_cache::{PreparedStatement, StatementCache};
