//! Internal error handling macros.

/// Displays a system error message and aborts the program.
///
/// Use this for unrecoverable errors that indicate bugs in the registry
/// itself, such as a refcount underflow on a live handle. The program prints
/// a diagnostic message and aborts without unwinding.
///
/// # Examples
///
/// ```ignore
/// if word.is_zero() {
///   fatal!("released a handle to a reclaimed slot");
/// }
/// ```
macro_rules! fatal {
  ($error:expr) => {{
    ::std::eprintln!(
      "{}:{}: (SysInv) a system invariant has been broken: {}",
      ::std::file!(),
      ::std::line!(),
      $error,
    );

    ::std::process::abort();
  }};
}

pub(crate) use fatal;
