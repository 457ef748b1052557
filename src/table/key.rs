use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result;
use std::num::NonZeroU64;
use xxhash_rust::const_xxh3;
use xxhash_rust::xxh3;

/// A non-zero 64-bit content key, usually the hash of a resource identifier.
///
/// Zero is the lookup table's empty-slot sentinel and cannot be represented.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Key(NonZeroU64);

impl Key {
  /// Creates a key from raw bits, returning `None` for zero.
  #[inline]
  pub const fn new(bits: u64) -> Option<Self> {
    match NonZeroU64::new(bits) {
      Some(bits) => Some(Self(bits)),
      None => None,
    }
  }

  /// Hashes `identifier` (a URI or path) into a key.
  #[inline]
  pub fn from_identifier(identifier: &str) -> Self {
    Self::from_hash(xxh3::xxh3_64(identifier.as_bytes()))
  }

  /// Hashes `identifier` at compile time; equal to [`Key::from_identifier`].
  #[inline]
  pub const fn from_static(identifier: &'static str) -> Self {
    Self::from_hash(const_xxh3::xxh3_64(identifier.as_bytes()))
  }

  /// Returns the raw key bits.
  #[inline]
  pub const fn get(self) -> u64 {
    self.0.get()
  }

  #[inline]
  const fn from_hash(hash: u64) -> Self {
    match NonZeroU64::new(hash) {
      Some(bits) => Self(bits),
      // A zero hash collides with the empty sentinel.
      None => Self(NonZeroU64::MIN),
    }
  }
}

impl Debug for Key {
  fn fmt(&self, f: &mut Formatter<'_>) -> Result {
    write!(f, "Key({:#018x})", self.get())
  }
}

impl Display for Key {
  fn fmt(&self, f: &mut Formatter<'_>) -> Result {
    write!(f, "{:016x}", self.get())
  }
}

impl From<NonZeroU64> for Key {
  #[inline]
  fn from(other: NonZeroU64) -> Self {
    Self(other)
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_new_rejects_zero() {
    assert_eq!(Key::new(0), None);
    assert_eq!(Key::new(7).map(Key::get), Some(7));
  }

  #[test]
  fn test_static_matches_runtime() {
    const KEY: Key = Key::from_static("textures/stone.png");

    assert_eq!(KEY, Key::from_identifier("textures/stone.png"));
    assert_ne!(KEY, Key::from_identifier("textures/stone.jpg"));
  }

  #[test]
  fn test_zero_hash_remapped() {
    assert_eq!(Key::from_hash(0).get(), 1);
  }

  #[test]
  fn test_display() {
    let key: Key = Key::new(0xABC).unwrap();

    assert_eq!(format!("{key}"), "0000000000000abc");
    assert_eq!(format!("{key:?}"), "Key(0x0000000000000abc)");
  }
}
