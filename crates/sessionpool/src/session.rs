//! Session-level settings tracked across checkouts.
//!
//! A pooled connection carries four session properties that callers may
//! change while they hold it. Each has a pool-wide default in
//! [`PoolConfig`](crate::PoolConfig); [`ChangedFlags`] records which of them
//! currently diverge from that default so that only those are reset when the
//! connection goes back to the pool.

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IsolationLevel {
    /// Read uncommitted (dirty reads allowed).
    ReadUncommitted,

    /// Read committed.
    ///
    /// Transactions can only read committed data. Prevents dirty reads
    /// but allows non-repeatable reads and phantom reads.
    #[default]
    ReadCommitted,

    /// Repeatable read.
    ///
    /// Ensures rows read by a transaction don't change during the transaction.
    RepeatableRead,

    /// Serializable (highest isolation).
    Serializable,

    /// Snapshot isolation.
    ///
    /// Uses row versioning to provide a point-in-time view of data.
    Snapshot,
}

/// A session property whose divergence from the pool default is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionProperty {
    /// Auto-commit mode.
    AutoCommit,
    /// Transaction isolation level.
    TransactionIsolation,
    /// Read-only mode.
    ReadOnly,
    /// Current catalog (database).
    Catalog,
}

impl SessionProperty {
    /// All tracked properties, in reset order.
    pub const ALL: [Self; 4] = [
        Self::AutoCommit,
        Self::TransactionIsolation,
        Self::ReadOnly,
        Self::Catalog,
    ];

    const fn index(self) -> usize {
        match self {
            Self::AutoCommit => 0,
            Self::TransactionIsolation => 1,
            Self::ReadOnly => 2,
            Self::Catalog => 3,
        }
    }

    /// Get the property name used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::AutoCommit => "auto_commit",
            Self::TransactionIsolation => "transaction_isolation",
            Self::ReadOnly => "read_only",
            Self::Catalog => "catalog",
        }
    }
}

/// Per-property "changed from default" indicators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangedFlags([bool; 4]);

impl ChangedFlags {
    /// Flags with nothing marked as changed.
    #[must_use]
    pub const fn new() -> Self {
        Self([false; 4])
    }

    /// Check whether a property is marked as changed.
    #[must_use]
    pub fn is_changed(&self, property: SessionProperty) -> bool {
        self.0[property.index()]
    }

    /// Mark or unmark a property as changed.
    pub fn set(&mut self, property: SessionProperty, changed: bool) {
        self.0[property.index()] = changed;
    }

    /// Check whether any property is marked as changed.
    #[must_use]
    pub fn any(&self) -> bool {
        self.0.iter().any(|changed| *changed)
    }

    /// Number of properties marked as changed.
    #[must_use]
    pub fn count(&self) -> usize {
        self.0.iter().filter(|changed| **changed).count()
    }

    /// Iterate over the changed properties in reset order.
    pub fn iter(&self) -> impl Iterator<Item = SessionProperty> + '_ {
        SessionProperty::ALL
            .into_iter()
            .filter(|property| self.is_changed(*property))
    }
}

/// Compare a catalog value against the configured default.
///
/// Two absent catalogs are equal; an absent and a present one are not.
#[must_use]
pub fn catalog_differs(catalog: Option<&str>, default: Option<&str>) -> bool {
    catalog != default
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_isolation_level() {
        assert_eq!(IsolationLevel::default(), IsolationLevel::ReadCommitted);
    }

    #[test]
    fn test_changed_flags_start_clear() {
        let flags = ChangedFlags::new();
        assert!(!flags.any());
        assert_eq!(flags.count(), 0);
        assert_eq!(flags.iter().count(), 0);
    }

    #[test]
    fn test_changed_flags_set_and_clear() {
        let mut flags = ChangedFlags::new();
        flags.set(SessionProperty::Catalog, true);
        flags.set(SessionProperty::AutoCommit, true);

        assert!(flags.is_changed(SessionProperty::Catalog));
        assert!(!flags.is_changed(SessionProperty::ReadOnly));
        assert_eq!(flags.count(), 2);
        assert_eq!(
            flags.iter().collect::<Vec<_>>(),
            vec![SessionProperty::AutoCommit, SessionProperty::Catalog]
        );

        flags.set(SessionProperty::AutoCommit, false);
        assert_eq!(flags.count(), 1);
    }

    #[test]
    fn test_catalog_comparison_is_null_safe() {
        assert!(!catalog_differs(None, None));
        assert!(catalog_differs(None, Some("sales")));
        assert!(catalog_differs(Some("sales"), None));
        assert!(!catalog_differs(Some("sales"), Some("sales")));
        assert!(catalog_differs(Some("sales"), Some("Sales")));
    }
}
