use std::error::Error;
use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use triomphe::Arc;

use crate::registry::Factory;
use crate::registry::Registry;
use crate::registry::pool::Link;
use crate::table::Key;

/// Produces payloads for [`Registry::load`] asynchronously.
///
/// The loader receives a [`Completion`] and may finish it on any thread,
/// at any later time. Dropping the completion without finishing it settles
/// the load as [`LoadError::Abandoned`].
pub trait Loader<F: Factory>: Send + Sync {
  /// Starts loading the resource named by [`Completion::identifier`].
  fn load(&self, completion: Completion<F>);
}

// -----------------------------------------------------------------------------
// Load Error
// -----------------------------------------------------------------------------

/// Reason a load did not produce a payload.
#[derive(Debug)]
#[non_exhaustive]
pub enum LoadError {
  /// The completion was dropped without being finished.
  Abandoned,
  /// The loader could not produce a payload.
  Failed(Box<dyn Error + Send + Sync>),
}

impl LoadError {
  /// Wraps an arbitrary loader error.
  #[inline]
  pub fn failed<E>(error: E) -> Self
  where
    E: Into<Box<dyn Error + Send + Sync>>,
  {
    Self::Failed(error.into())
  }
}

impl Display for LoadError {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    match self {
      Self::Abandoned => f.write_str("load abandoned"),
      Self::Failed(error) => write!(f, "load failed: {error}"),
    }
  }
}

impl Error for LoadError {
  fn source(&self) -> Option<&(dyn Error + 'static)> {
    match self {
      Self::Abandoned => None,
      Self::Failed(error) => Some(&**error),
    }
  }
}

// -----------------------------------------------------------------------------
// Completion
// -----------------------------------------------------------------------------

/// The registry's completion entry point for one in-flight load.
pub struct Completion<F: Factory> {
  registry: Arc<Registry<F>>,
  identifier: Box<str>,
  key: Key,
  link: Link,
  settled: bool,
}

impl<F: Factory> Completion<F> {
  #[inline]
  pub(crate) fn new(registry: Arc<Registry<F>>, identifier: Box<str>, key: Key, link: Link) -> Self {
    Self {
      registry,
      identifier,
      key,
      link,
      settled: false,
    }
  }

  /// Returns the identifier of the resource being loaded.
  #[inline]
  pub fn identifier(&self) -> &str {
    &self.identifier
  }

  /// Returns the key of the resource being loaded.
  #[inline]
  pub const fn key(&self) -> Key {
    self.key
  }

  /// Returns the registry that issued the load.
  #[inline]
  pub fn registry(&self) -> &Registry<F> {
    &self.registry
  }

  /// Finishes the load.
  ///
  /// A payload is queued for creation on the next flush; an error settles
  /// the slot as [`Status::Error`].
  ///
  /// [`Status::Error`]: crate::registry::Status::Error
  #[inline]
  pub fn complete(mut self, result: Result<F::Payload, LoadError>) {
    self.settle(result);
  }

  fn settle(&mut self, result: Result<F::Payload, LoadError>) {
    self.settled = true;

    let identifier: Box<str> = std::mem::take(&mut self.identifier);

    self
      .registry
      .complete_load(self.key, self.link, identifier, result);
  }
}

impl<F: Factory> Drop for Completion<F> {
  fn drop(&mut self) {
    if !self.settled {
      self.settle(Err(LoadError::Abandoned));
    }
  }
}

impl<F: Factory> Debug for Completion<F> {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("Completion")
      .field("identifier", &self.identifier)
      .field("key", &self.key)
      .field("settled", &self.settled)
      .finish()
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
