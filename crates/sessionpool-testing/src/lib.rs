//! # sessionpool-testing
//!
//! Test infrastructure for `sessionpool`.
//!
//! This crate provides an in-memory physical connection so that pool and
//! handle behavior can be tested without a database server.
//!
//! ## Features
//!
//! - [`MockConnection`] recording every call made on it
//! - Failure injection per operation
//! - [`MockHandle`] to inspect a connection after the pool owns it
//! - [`MockFactory`] to back a [`sessionpool::Pool`]
//! - Tracing setup and pool fixtures for tests
//!
//! ## Example
//!
//! ```rust
//! use sessionpool::{PoolConfig, SessionSettings};
//! use sessionpool_testing::fixtures::mock_pool;
//!
//! let (pool, factory) = mock_pool(PoolConfig::new()).unwrap();
//! let mut conn = pool.get().unwrap();
//! conn.set_catalog(Some("staging")).unwrap();
//! drop(conn);
//!
//! assert_eq!(factory.handle(0).unwrap().session().catalog, None);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod fixtures;
pub mod mock;

pub use mock::{MockBuilder, MockConnection, MockFactory, MockHandle, MockOp, SessionSnapshot};
