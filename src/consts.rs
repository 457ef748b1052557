// -----------------------------------------------------------------------------
// Registry - Sizing
// -----------------------------------------------------------------------------

/// Default number of keyed slots in a registry.
pub const DEFAULT_CAPACITY: usize = {
  #[cfg(not(any(miri, test)))]
  {
    1 << 12
  }
  #[cfg(any(miri, test))]
  {
    1 << 8
  }
};

/// Default number of indexed slots in a registry.
pub const DEFAULT_INDEXED_SLOTS: usize = 64;

/// Maximum number of keyed slots in a registry.
pub const MAX_CAPACITY: usize = 1 << 24;

/// Maximum number of indexed slots in a registry.
pub const MAX_INDEXED_SLOTS: usize = 1 << 16;

/// Maximum number of request nodes in a registry.
pub const MAX_QUEUE_NODES: usize = 1 << 26;

// -----------------------------------------------------------------------------
// Lookup Table
// -----------------------------------------------------------------------------

/// Minimum number of key slots in a lookup table.
pub const MIN_TABLE_ENTRIES: usize = 1 << 3;

/// Maximum number of key slots in a lookup table.
pub const MAX_TABLE_ENTRIES: usize = 1 << 31;

// -----------------------------------------------------------------------------
// Flush Behavior
// -----------------------------------------------------------------------------

/// Default number of requests processed by [`Maintenance::tick`].
///
/// [`Maintenance::tick`]: crate::registry::Maintenance::tick
pub const DEFAULT_FLUSH_BUDGET: usize = 256;

/// Default label attached to registry diagnostics.
pub const DEFAULT_LABEL: &str = "resreg";
