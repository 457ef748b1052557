//! Process-wide diagnostics setup.
//!
//! The registry only emits [`tracing`] events. Applications that do not
//! install their own subscriber can call [`init_tracing_subscriber`] once at
//! startup to print them.

use std::fmt::Display;

use crate::config::RegistryConfig;
use crate::error::Exception;
use crate::error::ExceptionClass;
use crate::error::ExceptionGroup;

/// Installs the global tracing subscriber described by `config`.
///
/// Without the `subscriber` feature this is a no-op.
///
/// # Errors
///
/// Returns a `SysInv` exception if a global subscriber is already set.
#[cfg(feature = "subscriber")]
pub fn init_tracing_subscriber(config: &RegistryConfig) -> Result<(), Exception> {
  use tracing_subscriber::FmtSubscriber;
  use tracing_subscriber::fmt::format;
  use tracing_subscriber::util::SubscriberInitExt;

  FmtSubscriber::builder()
    .event_format(format().compact())
    .log_internal_errors(true)
    .with_ansi(true)
    .with_file(config.tracing_source_file)
    .with_level(true)
    .with_line_number(config.tracing_source_line)
    .with_max_level(config.tracing_filter())
    .with_target(config.tracing_source_name)
    .with_thread_ids(config.tracing_thread_info)
    .with_thread_names(config.tracing_thread_info)
    .finish()
    .try_init()
    .map_err(error)
}

/// Installs the global tracing subscriber described by `config`.
///
/// Without the `subscriber` feature this is a no-op.
///
/// # Errors
///
/// Never fails without the `subscriber` feature.
#[cfg(not(feature = "subscriber"))]
pub fn init_tracing_subscriber(_config: &RegistryConfig) -> Result<(), Exception> {
  Ok(())
}

#[cfg_attr(not(feature = "subscriber"), allow(dead_code))]
#[inline]
fn error<E: Display>(error: E) -> Exception {
  Exception::new(ExceptionClass::Error, ExceptionGroup::SysInv, error)
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;

  #[cfg(not(feature = "subscriber"))]
  #[test]
  fn test_noop_without_feature() {
    assert!(init_tracing_subscriber(&RegistryConfig::new()).is_ok());
  }

  #[cfg(feature = "subscriber")]
  #[test]
  fn test_second_install_fails() {
    let config: RegistryConfig = RegistryConfig::new();
    let _ignore: Result<(), Exception> = init_tracing_subscriber(&config);
    let result: Result<(), Exception> = init_tracing_subscriber(&config);

    assert_eq!(result.map_err(|error| error.group()), Err(ExceptionGroup::SysInv));
  }

  #[test]
  fn test_error_group() {
    assert_eq!(error("already set").group(), ExceptionGroup::SysInv);
  }
}
