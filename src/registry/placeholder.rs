use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result;
use std::ops::Deref;

/// A resource stored at an address that can be packed into a slot word.
///
/// Slot words keep their status in the low four address bits, so every
/// resource the registry points at lives in an `Aligned` wrapper.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
#[repr(C, align(16))]
pub struct Aligned<R>(R);

impl<R> Aligned<R> {
  /// Wraps `value`.
  #[inline]
  pub const fn new(value: R) -> Self {
    Self(value)
  }

  /// Unwraps the inner value.
  #[inline]
  pub fn into_inner(self) -> R {
    self.0
  }

  /// Returns the address packed into slot words.
  #[inline]
  pub(crate) fn addr(&self) -> usize {
    (self as *const Self).expose_provenance()
  }
}

impl<R> Deref for Aligned<R> {
  type Target = R;

  #[inline]
  fn deref(&self) -> &Self::Target {
    &self.0
  }
}

impl<R: Debug> Debug for Aligned<R> {
  fn fmt(&self, f: &mut Formatter<'_>) -> Result {
    Debug::fmt(&self.0, f)
  }
}

// -----------------------------------------------------------------------------
// Placeholder
// -----------------------------------------------------------------------------

/// A stand-in resource handed out while the real one is loading.
///
/// Placeholders live for the rest of the program and are never passed to
/// the factory for destruction.
///
/// # Examples
///
/// ```
/// use resreg::registry::Aligned;
/// use resreg::registry::Placeholder;
///
/// static CHECKER: Aligned<&str> = Aligned::new("checkerboard");
///
/// let fixed: Placeholder<&str> = Placeholder::from_static(&CHECKER);
/// let built: Placeholder<&str> = Placeholder::leak("loading");
///
/// assert_eq!(*fixed, "checkerboard");
/// assert_eq!(*built, "loading");
/// ```
pub struct Placeholder<R: 'static> {
  value: &'static Aligned<R>,
}

impl<R: 'static> Placeholder<R> {
  /// Creates a placeholder from a `static` resource.
  #[inline]
  pub const fn from_static(value: &'static Aligned<R>) -> Self {
    Self { value }
  }

  /// Moves `value` to the heap and leaks it as a placeholder.
  #[inline]
  pub fn leak(value: R) -> Self {
    Self {
      value: Box::leak(Box::new(Aligned::new(value))),
    }
  }

  /// Returns the stand-in resource.
  #[inline]
  pub const fn get(&self) -> &'static R {
    &self.value.0
  }

  #[inline]
  pub(crate) fn addr(&self) -> usize {
    self.value.addr()
  }
}

impl<R: 'static> Clone for Placeholder<R> {
  #[inline]
  fn clone(&self) -> Self {
    *self
  }
}

impl<R: 'static> Copy for Placeholder<R> {}

impl<R: 'static> Deref for Placeholder<R> {
  type Target = R;

  #[inline]
  fn deref(&self) -> &Self::Target {
    self.get()
  }
}

impl<R: Debug + 'static> Debug for Placeholder<R> {
  fn fmt(&self, f: &mut Formatter<'_>) -> Result {
    f.debug_tuple("Placeholder").field(self.get()).finish()
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
