/// Builds and tears down the resources stored in a [`Registry`].
///
/// Both methods run on the thread holding the [`Maintenance`] token (and in
/// the registry's destructor), never concurrently with each other.
///
/// [`Registry`]: crate::registry::Registry
/// [`Maintenance`]: crate::registry::Maintenance
///
/// # Examples
///
/// ```
/// use resreg::registry::Factory;
///
/// struct Shaders;
///
/// impl Factory for Shaders {
///   type Resource = String;
///   type Payload = Vec<u8>;
///
///   fn create(&self, identifier: &str, payload: Vec<u8>) -> Option<String> {
///     String::from_utf8(payload)
///       .ok()
///       .map(|source| format!("{identifier}: {source}"))
///   }
/// }
/// ```
pub trait Factory: Send + Sync {
  /// The resource type stored in registry slots.
  type Resource: Send + Sync + 'static;

  /// The compiled input a resource is built from.
  type Payload: Send;

  /// Builds a resource, returning `None` if the payload is unusable.
  ///
  /// Failures are recorded as [`Status::Error`] and the slot keeps pointing
  /// at the error placeholder.
  ///
  /// [`Status::Error`]: crate::registry::Status::Error
  fn create(&self, identifier: &str, payload: Self::Payload) -> Option<Self::Resource>;

  /// Releases a resource that is no longer referenced by any slot.
  #[inline]
  fn destroy(&self, resource: Self::Resource) {
    drop(resource);
  }
}
