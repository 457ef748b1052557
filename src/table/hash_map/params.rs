use std::num::NonZeroUsize;

use crate::consts;

/// Sizing parameters of a [`HashMap`].
///
/// [`HashMap`]: crate::table::HashMap
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Params {
  pub(crate) length: NonZeroUsize,
  pub(crate) mask: usize,
}

impl Params {
  /// Minimum number of key slots in a table.
  pub(crate) const MIN_ENTRIES: NonZeroUsize = assert_nonzero(consts::MIN_TABLE_ENTRIES);

  /// Maximum number of key slots in a table.
  pub(crate) const MAX_ENTRIES: NonZeroUsize = assert_nonzero(consts::MAX_TABLE_ENTRIES);

  /// Computes the table shape for `capacity` live entries.
  ///
  /// The table keeps a load factor of at most one half: the length is the
  /// next power of two of `2 * capacity`, clamped to the supported range.
  #[inline]
  pub(crate) const fn new(capacity: usize) -> Self {
    let length: NonZeroUsize = actual_length(capacity);

    Self {
      length,
      mask: length.get() - 1,
    }
  }
}

#[inline]
const fn actual_length(capacity: usize) -> NonZeroUsize {
  let Some(doubled) = capacity.checked_mul(2) else {
    return Params::MAX_ENTRIES;
  };

  let Some(length) = doubled.checked_next_power_of_two() else {
    return Params::MAX_ENTRIES;
  };

  if length < Params::MIN_ENTRIES.get() {
    Params::MIN_ENTRIES
  } else if length > Params::MAX_ENTRIES.get() {
    Params::MAX_ENTRIES
  } else {
    assert_nonzero(length)
  }
}

#[inline]
const fn assert_nonzero(value: usize) -> NonZeroUsize {
  NonZeroUsize::new(value).expect("nonzero value")
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_length() {
    // Below minimum
    assert_eq!(Params::new(0).length, Params::MIN_ENTRIES);
    assert_eq!(Params::new(1).length, Params::MIN_ENTRIES);
    assert_eq!(Params::new(4).length, Params::MIN_ENTRIES);

    // Doubled, then rounded to a power of two
    assert_eq!(Params::new(5).length.get(), 16);
    assert_eq!(Params::new(16).length.get(), 32);
    assert_eq!(Params::new(100).length.get(), 256);

    // Above maximum
    assert_eq!(Params::new(usize::MAX).length, Params::MAX_ENTRIES);
    assert_eq!(Params::new(1 << 40).length, Params::MAX_ENTRIES);
  }

  #[test]
  fn test_mask_covers_all_indices() {
    for shift in 3..20 {
      let params: Params = Params::new(1 << shift);

      assert!(params.length.is_power_of_two());
      assert_eq!(params.mask, params.length.get() - 1);
      assert_eq!(params.mask.count_ones(), params.length.trailing_zeros());
    }
  }

  #[test]
  fn test_load_factor() {
    for capacity in 1..2048 {
      let params: Params = Params::new(capacity);
      assert!(params.length.get() >= capacity * 2);
    }
  }
}
