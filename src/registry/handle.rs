use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::ptr;

use crate::error::fatal;
use crate::loom::sync::atomic::Ordering::Acquire;
use crate::raise;
use crate::registry::Factory;
use crate::registry::Maintenance;
use crate::registry::Registry;
use crate::registry::Status;
use crate::registry::Word;
use crate::registry::pool::Link;
use crate::registry::pool::Slot;
use crate::table::Key;

/// A counted reference to a registry slot.
///
/// While any handle to a slot is alive, the slot cannot be reclaimed. The
/// handle does not keep the resource itself alive across flushes: a forced
/// insert may swap it, which is why resource access goes through
/// [`Handle::get`] and the maintenance token.
pub struct Handle<'r, F: Factory> {
  registry: &'r Registry<F>,
  key: Key,
  link: Link,
}

impl<'r, F: Factory> Handle<'r, F> {
  /// Wraps a reference that the caller has already counted.
  #[inline]
  pub(crate) const fn new(registry: &'r Registry<F>, key: Key, link: Link) -> Self {
    Self { registry, key, link }
  }

  #[inline]
  pub(crate) const fn link(&self) -> Link {
    self.link
  }

  #[inline]
  fn slot(&self) -> &'r Slot {
    self.registry.readonly.pool.get(self.link.index())
  }

  #[inline]
  fn word(&self) -> Word {
    self.slot().word.load(Acquire)
  }

  /// Returns the registry the handle belongs to.
  #[inline]
  pub fn registry(&self) -> &'r Registry<F> {
    self.registry
  }

  /// Returns the key of the referenced slot.
  #[inline]
  pub const fn key(&self) -> Key {
    self.key
  }

  /// Returns the current status of the referenced slot.
  #[inline]
  pub fn status(&self) -> Status {
    self.word().status()
  }

  /// Returns the current number of references to the slot.
  #[inline]
  pub fn refcount(&self) -> u16 {
    self.word().refcount()
  }

  /// Returns the resource the slot currently shows.
  ///
  /// This is the placeholder while the slot is loading, the built resource
  /// once it is [`Ready`], and the error placeholder after a failure. A slot
  /// reloading after a forced request keeps showing what it showed before.
  ///
  /// # Panics
  ///
  /// Raises `SysInv` if `token` belongs to another registry.
  ///
  /// [`Ready`]: Status::Ready
  #[inline]
  pub fn get<'m>(&self, token: &'m Maintenance<'_, F>) -> &'m F::Resource {
    if !ptr::eq(self.registry, token.registry()) {
      raise!(Error, SysInv, "maintenance token belongs to another registry");
    }

    // SAFETY: Our reference keeps the word non-zero, and the token borrow
    //         prevents any flush from destroying the resource for `'m`.
    unsafe { Registry::<F>::resource(self.word()) }
  }
}

impl<F: Factory> Clone for Handle<'_, F> {
  fn clone(&self) -> Self {
    match self.slot().word.reference() {
      Ok(_) => Self::new(self.registry, self.key, self.link),
      Err(word) if word.is_zero() => fatal!("live handle to a reclaimed slot"),
      Err(_) => raise!(Error, SysCap, "reference count saturated"),
    }
  }
}

impl<F: Factory> Drop for Handle<'_, F> {
  #[inline]
  fn drop(&mut self) {
    self.slot().word.release();
  }
}

impl<F: Factory> PartialEq for Handle<'_, F> {
  #[inline]
  fn eq(&self, other: &Self) -> bool {
    ptr::eq(self.registry, other.registry) && self.link == other.link
  }
}

impl<F: Factory> Eq for Handle<'_, F> {}

impl<F: Factory> Debug for Handle<'_, F> {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    let word: Word = self.word();

    f.debug_struct("Handle")
      .field("registry", &self.registry.label())
      .field("key", &self.key)
      .field("link", &self.link)
      .field("word", &word)
      .finish()
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use std::panic;

  use super::*;
  use crate::config::RegistryConfig;

  struct Unit;

  impl Factory for Unit {
    type Resource = u32;
    type Payload = u32;

    fn create(&self, _identifier: &str, payload: u32) -> Option<u32> {
      Some(payload)
    }
  }

  fn registry() -> Registry<Unit> {
    Registry::new(RegistryConfig::with_capacity(8), Unit, 0)
  }

  #[test]
  fn test_clone_and_drop_track_refcount() {
    let registry: Registry<Unit> = registry();
    let handle: Handle<'_, Unit> = registry.resolve(Key::from_static("x"), None);

    assert_eq!(handle.refcount(), 1);

    let copies: Vec<Handle<'_, Unit>> = (0..10).map(|_| handle.clone()).collect();

    assert_eq!(handle.refcount(), 11);
    assert!(copies.iter().all(|copy| *copy == handle));

    drop(copies);

    assert_eq!(handle.refcount(), 1);
    assert_eq!(handle.key(), Key::from_static("x"));
  }

  #[test]
  fn test_get_rejects_foreign_token() {
    let a: Registry<Unit> = registry();
    let b: Registry<Unit> = registry();

    let handle: Handle<'_, Unit> = a.resolve(Key::from_static("x"), None);
    let token: Maintenance<'_, Unit> = b.maintenance();

    let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
      let _ignore: &u32 = handle.get(&token);
    }));

    assert!(result.is_err());
  }

  #[test]
  fn test_handles_from_different_registries_differ() {
    let a: Registry<Unit> = registry();
    let b: Registry<Unit> = registry();

    let x: Handle<'_, Unit> = a.resolve(Key::from_static("x"), None);
    let y: Handle<'_, Unit> = b.resolve(Key::from_static("x"), None);

    assert_ne!(x, y);
    assert!(format!("{x:?}").starts_with("Handle"));
  }
}
