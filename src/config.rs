use crate::consts;
use crate::registry::Factory;
use crate::registry::Registry;

// -----------------------------------------------------------------------------
// Registry Config
// -----------------------------------------------------------------------------

/// Construction parameters of a [`Registry`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
  // ---------------------------------------------------------------------------
  // Registry Configuration
  // ---------------------------------------------------------------------------
  pub label: String,
  pub capacity: usize,
  pub indexed_slots: usize,
  pub queue_nodes: Option<usize>,
  pub flush_budget: usize,
  // ---------------------------------------------------------------------------
  // Tracing Subscriber Configuration
  // ---------------------------------------------------------------------------
  pub tracing_source_file: bool,
  pub tracing_source_line: bool,
  pub tracing_source_name: bool,
  pub tracing_thread_info: bool,
  pub tracing_verbose: bool,
  pub tracing_very_verbose: bool,
}

impl RegistryConfig {
  #[inline]
  pub fn new() -> Self {
    Self {
      label: consts::DEFAULT_LABEL.to_owned(),
      capacity: consts::DEFAULT_CAPACITY,
      indexed_slots: consts::DEFAULT_INDEXED_SLOTS,
      queue_nodes: None,
      flush_budget: consts::DEFAULT_FLUSH_BUDGET,
      tracing_source_file: false,
      tracing_source_line: false,
      tracing_source_name: false,
      tracing_thread_info: true,
      tracing_verbose: true,
      tracing_very_verbose: false,
    }
  }

  /// Creates a default configuration with `capacity` keyed slots.
  #[inline]
  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      capacity,
      ..Self::new()
    }
  }

  /// Creates a default configuration with the largest capacity whose fixed
  /// arrays fit in `bytes`.
  ///
  /// See [`Registry::calc_capacity`].
  #[inline]
  pub fn with_bytes<F: Factory>(bytes: usize) -> Self {
    Self::with_capacity(Registry::<F>::calc_capacity(bytes))
  }

  /// Returns the number of request nodes the registry allocates.
  #[inline]
  pub const fn queue_nodes(&self) -> usize {
    match self.queue_nodes {
      Some(nodes) => nodes,
      None => Self::default_queue_nodes(self.capacity, self.indexed_slots),
    }
  }

  /// Returns the default number of request nodes: room for a create and a
  /// destroy per keyed slot, plus a create per indexed slot.
  #[inline]
  pub const fn default_queue_nodes(capacity: usize, indexed_slots: usize) -> usize {
    capacity.saturating_mul(2).saturating_add(indexed_slots)
  }

  #[inline]
  pub const fn tracing_filter(&self) -> tracing::Level {
    if self.tracing_very_verbose {
      tracing::Level::TRACE
    } else if self.tracing_verbose {
      tracing::Level::DEBUG
    } else {
      tracing::Level::INFO
    }
  }
}

impl Default for RegistryConfig {
  #[inline]
  fn default() -> Self {
    Self::new()
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
