//! Error types.

use thiserror::Error;

/// Errors returned by connection handles and physical connections.
///
/// The pool handle adds exactly two variants of its own,
/// [`Error::ConnectionClosed`] and [`Error::UnsupportedWrap`]. Everything
/// else is produced by the physical connection and is passed through the
/// handle unchanged.
#[derive(Debug, Error)]
pub enum Error {
    /// The handle was used after it was closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// `unwrap` was asked for a type the physical connection is not.
    #[error("wrapped object is not an instance of {target}")]
    UnsupportedWrap {
        /// Name of the requested type.
        target: &'static str,
    },

    /// The database rejected an operation.
    #[error("database error {code}: {message}")]
    Database {
        /// Vendor error code.
        code: i32,
        /// Error message.
        message: String,
    },

    /// IO error on the physical transport.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Pool error.
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),
}

impl Error {
    /// Check if this error is transient and may succeed on retry.
    ///
    /// A closed handle can be replaced by checking out a new one, and an
    /// exhausted pool may have capacity later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed
                | Self::Io(_)
                | Self::Pool(PoolError::MaxConnectionsReached { .. })
        )
    }

    /// Check if this error was raised because the handle is closed.
    #[must_use]
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed)
    }
}

/// Errors that can occur during pool operations.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Pool is closed.
    #[error("pool is closed")]
    PoolClosed,

    /// Connection creation failed.
    #[error("failed to create connection: {0}")]
    ConnectionCreation(String),

    /// Pool configuration error.
    #[error("pool configuration error: {0}")]
    Configuration(String),

    /// Maximum connections reached.
    #[error("maximum connections ({max}) reached")]
    MaxConnectionsReached {
        /// Maximum allowed connections.
        max: u32,
    },
}

/// Result type for connection operations.
pub type Result<T> = std::result::Result<T, Error>;
