//! Test fixture utilities.

use sessionpool::{IsolationLevel, Pool, PoolConfig, PoolError};
use tracing_subscriber::EnvFilter;

use crate::mock::MockFactory;

/// Install a tracing subscriber that writes through the test harness.
///
/// Honors `RUST_LOG`; defaults to `sessionpool=trace`. Safe to call from
/// every test.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sessionpool=trace"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Pool configuration with non-trivial session defaults.
///
/// Every default differs from what a freshly built mock connection starts
/// with, which makes it easy to see whether defaults were applied.
#[must_use]
pub fn custom_defaults() -> PoolConfig {
    PoolConfig::new()
        .max_connections(4)
        .default_auto_commit(false)
        .default_transaction_isolation(IsolationLevel::Snapshot)
        .default_read_only(true)
        .default_catalog(Some("reporting"))
}

/// Create a pool backed by a fresh [`MockFactory`].
///
/// The returned factory shares its connection handles with the pool's copy.
pub fn mock_pool(config: PoolConfig) -> Result<(Pool, MockFactory), PoolError> {
    let factory = MockFactory::new();
    let pool = Pool::new(config, factory.clone())?;
    Ok((pool, factory))
}
