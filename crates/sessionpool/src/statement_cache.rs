//! Per-connection prepared statement cache with LRU eviction.
//!
//! ## Lifecycle
//!
//! 1. First preparation of a SQL text goes to the physical connection
//! 2. The handle is cached by SQL text; later preparations reuse it
//! 3. When the cache is full, the least recently used handle is evicted and
//!    must be released on the physical connection
//! 4. Closing the physical connection implicitly releases every handle
//!
//! The cache belongs to the pooled connection record and survives across
//! checkouts.

use std::num::NonZeroUsize;

use lru::LruCache;

use crate::connection::StatementHandle;

/// A cached prepared statement.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    handle: StatementHandle,
    sql: String,
}

impl PreparedStatement {
    /// Create a new prepared statement.
    pub fn new(handle: StatementHandle, sql: impl Into<String>) -> Self {
        Self {
            handle,
            sql: sql.into(),
        }
    }

    /// Get the server-assigned handle.
    #[must_use]
    pub fn handle(&self) -> StatementHandle {
        self.handle
    }

    /// Get the SQL text.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

/// LRU cache of prepared statements keyed by SQL text.
pub struct StatementCache {
    cache: LruCache<String, PreparedStatement>,
    max_size: NonZeroUsize,
    hits: u64,
    misses: u64,
}

impl StatementCache {
    /// Create a new statement cache holding at most `max_size` statements.
    #[must_use]
    pub fn new(max_size: NonZeroUsize) -> Self {
        Self {
            cache: LruCache::new(max_size),
            max_size,
            hits: 0,
            misses: 0,
        }
    }

    /// Look up a prepared statement handle by SQL text.
    ///
    /// This updates the LRU order.
    pub fn get(&mut self, sql: &str) -> Option<StatementHandle> {
        if let Some(stmt) = self.cache.get(sql) {
            self.hits += 1;
            tracing::trace!(sql = sql, handle = stmt.handle, "statement cache hit");
            Some(stmt.handle)
        } else {
            self.misses += 1;
            tracing::trace!(sql = sql, "statement cache miss");
            None
        }
    }

    /// Insert a prepared statement.
    ///
    /// Returns the evicted statement if one was removed due to capacity.
    /// The caller is responsible for releasing its handle.
    pub fn insert(&mut self, stmt: PreparedStatement) -> Option<PreparedStatement> {
        let evicted = if !self.cache.contains(stmt.sql()) && self.cache.len() >= self.max_size.get()
        {
            self.cache.pop_lru().map(|(_, stmt)| stmt)
        } else {
            None
        };

        tracing::trace!(sql = stmt.sql(), handle = stmt.handle, "caching prepared statement");
        self.cache.put(stmt.sql.clone(), stmt);
        evicted
    }

    /// Remove every cached statement, returning them in LRU order.
    pub fn clear(&mut self) -> Vec<PreparedStatement> {
        let mut statements = Vec::with_capacity(self.cache.len());
        while let Some((_, stmt)) = self.cache.pop_lru() {
            statements.push(stmt);
        }
        statements
    }

    /// Get the number of cached statements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Get the maximum cache size.
    #[must_use]
    pub fn max_size(&self) -> usize {
        self.max_size.get()
    }

    /// Get the number of cache hits.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Get the number of cache misses.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses
    }
}

impl std::fmt::Debug for StatementCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementCache")
            .field("len", &self.cache.len())
            .field("max_size", &self.max_size)
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn cache(size: usize) -> StatementCache {
        StatementCache::new(NonZeroUsize::new(size).unwrap())
    }

    #[test]
    fn test_statement_cache_insert_and_get() {
        let mut cache = cache(10);

        cache.insert(PreparedStatement::new(1, "SELECT * FROM users"));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("SELECT * FROM users"), Some(1));
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 0);
    }

    #[test]
    fn test_statement_cache_miss() {
        let mut cache = cache(10);

        assert_eq!(cache.get("SELECT 1"), None);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_statement_cache_lru_eviction() {
        let mut cache = cache(2);

        cache.insert(PreparedStatement::new(1, "SELECT 1"));
        cache.insert(PreparedStatement::new(2, "SELECT 2"));

        // Touch the first statement so the second becomes least recently used
        cache.get("SELECT 1");

        let evicted = cache.insert(PreparedStatement::new(3, "SELECT 3"));
        assert_eq!(evicted.unwrap().handle(), 2);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("SELECT 1"), Some(1));
        assert_eq!(cache.get("SELECT 2"), None);
        assert_eq!(cache.get("SELECT 3"), Some(3));
    }

    #[test]
    fn test_statement_cache_replace_does_not_evict() {
        let mut cache = cache(2);

        cache.insert(PreparedStatement::new(1, "SELECT 1"));
        cache.insert(PreparedStatement::new(2, "SELECT 2"));

        assert!(cache.insert(PreparedStatement::new(7, "SELECT 1")).is_none());
        assert_eq!(cache.get("SELECT 1"), Some(7));
        assert_eq!(cache.get("SELECT 2"), Some(2));
    }

    #[test]
    fn test_statement_cache_clear() {
        let mut cache = cache(10);

        cache.insert(PreparedStatement::new(1, "SELECT 1"));
        cache.insert(PreparedStatement::new(2, "SELECT 2"));

        let cleared = cache.clear();
        assert_eq!(cleared.len(), 2);
        assert_eq!(cleared[0].handle(), 1);
        assert!(cache.is_empty());
    }
}
