//! Exceptions raised by registry misuse.
//!
//! The registry never reports normal load or create failures through this
//! module; those settle into [`Status::Error`] with the shared error
//! placeholder. What remains are contract violations, which are surfaced
//! immediately:
//!
//! 1. [`BadArg`]: an invalid configuration or argument
//! 2. [`SysCap`]: a fixed capacity has been exhausted
//! 3. [`SysInv`]: the registry was used in an invalid state
//!
//! Recoverable conditions use [`raise!`] (a panic carrying an [`Exception`]).
//! Broken internal invariants use `fatal!`, which aborts the process.
//!
//! [`Status::Error`]: crate::registry::Status::Error
//! [`BadArg`]: ExceptionGroup::BadArg
//! [`SysCap`]: ExceptionGroup::SysCap
//! [`SysInv`]: ExceptionGroup::SysInv
//! [`raise!`]: crate::raise!

mod exception;
mod exception_class;
mod exception_group;
mod macros;

pub(crate) use self::macros::fatal;

pub use self::exception::Exception;
pub use self::exception_class::ExceptionClass;
pub use self::exception_group::ExceptionGroup;

// -----------------------------------------------------------------------------
// raise!
// -----------------------------------------------------------------------------

/// Raises an exception with the specified class, group, and message.
///
/// # Examples
///
/// ```
/// # use resreg::raise;
/// fn check_capacity(capacity: usize) {
///   if capacity == 0 {
///     raise!(Error, BadArg, "capacity must be non-zero");
///   }
/// }
/// ```
#[macro_export]
macro_rules! raise {
  ($class:ident, $group:ident, $error:expr $(,)?) => {
    ::std::panic!(
      "{}",
      $crate::error::Exception::new(
        $crate::error::ExceptionClass::$class,
        $crate::error::ExceptionGroup::$group,
        $error,
      ),
    )
  };
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use std::panic;

  #[test]
  fn test_raise_macro_badarg() {
    assert!(panic::catch_unwind(|| raise!(Error, BadArg, "zero capacity")).is_err());
  }

  #[test]
  fn test_raise_macro_syscap() {
    assert!(panic::catch_unwind(|| raise!(Error, SysCap, "slot pool exhausted")).is_err());
  }

  #[test]
  fn test_raise_macro_sysinv() {
    assert!(panic::catch_unwind(|| raise!(Error, SysInv, "maintenance token in use")).is_err());
  }

  #[test]
  fn test_raise_macro_message() {
    let error = panic::catch_unwind(|| raise!(Error, SysCap, "lookup table full")).unwrap_err();
    let error: &String = error.downcast_ref::<String>().unwrap();

    assert_eq!(
      error,
      "error:(SysCap) a system limit has been reached - lookup table full",
    );
  }
}
