use std::collections::VecDeque;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::ptr;

use crate::error::fatal;
use crate::loom::sync::MutexGuard;
use crate::loom::sync::atomic::Ordering::AcqRel;
use crate::loom::sync::atomic::Ordering::Acquire;
use crate::loom::sync::atomic::Ordering::Relaxed;
use crate::registry::Aligned;
use crate::registry::AtomicWord;
use crate::registry::Factory;
use crate::registry::Registry;
use crate::registry::Status;
use crate::registry::Word;
use crate::registry::gate::Closed;
use crate::registry::pool::Link;
use crate::registry::pool::Slot;
use crate::registry::queue::Request;
use crate::registry::queue::RequestQueue;
use crate::registry::queue::Target;
use crate::table::HashMap;
use crate::table::Key;

type Raw<R> = *mut Aligned<R>;

// -----------------------------------------------------------------------------
// Flush Stats
// -----------------------------------------------------------------------------

/// Cumulative counters of the flush pipeline.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
pub struct FlushStats {
  /// Resources built by the factory.
  pub created: u64,
  /// Create requests that ended in [`Status::Error`].
  pub failed: u64,
  /// Resources handed back to the factory.
  pub destroyed: u64,
  /// Slots returned to the pool.
  pub reclaimed: u64,
  /// Resources destroyed because their slot was gone before installation.
  pub orphaned: u64,
}

/// State owned by the maintenance token.
pub(crate) struct FlushState {
  stats: FlushStats,
  /// Detached create nodes not yet processed, oldest first.
  creates: VecDeque<u32>,
  /// Detached destroy nodes not yet processed.
  destroys: VecDeque<u32>,
}

impl FlushState {
  pub(crate) fn new(nodes: usize) -> Self {
    Self {
      stats: FlushStats::default(),
      creates: VecDeque::with_capacity(nodes),
      destroys: VecDeque::with_capacity(nodes),
    }
  }
}

// -----------------------------------------------------------------------------
// Maintenance
// -----------------------------------------------------------------------------

/// The exclusive right to build, install, destroy, and read resources.
///
/// At most one token exists per registry at a time. Every pointer change,
/// and every status change other than a move into `Loading`, happens through
/// it. Resource references borrow it, so no reference can overlap a flush.
pub struct Maintenance<'r, F: Factory> {
  registry: &'r Registry<F>,
  state: MutexGuard<'r, FlushState>,
}

impl<'r, F: Factory> Maintenance<'r, F> {
  #[inline]
  pub(crate) fn new(registry: &'r Registry<F>, state: MutexGuard<'r, FlushState>) -> Self {
    Self { registry, state }
  }

  /// Returns the registry this token belongs to.
  #[inline]
  pub fn registry(&self) -> &'r Registry<F> {
    self.registry
  }

  /// Returns the cumulative flush counters.
  #[inline]
  pub fn stats(&self) -> FlushStats {
    self.state.stats
  }

  /// Runs the flush pipeline with a budget of `max_operations` requests.
  ///
  /// 1. Create requests, oldest first: build each resource and install it.
  /// 2. Destroy requests, while budget remains.
  /// 3. Reclaim every linked slot that has no references and no request in
  ///    flight.
  /// 4. Compact the lookup table once derelict keys fill a quarter of it,
  ///    unless a resolver is inside.
  ///
  /// A create whose slot lost every reference is not installed: the
  /// resource is destroyed and the slot reclaimed on the spot.
  ///
  /// Requests beyond the budget stay queued in order for the next call.
  /// Returns the number of requests processed; `flush(0)` does nothing.
  pub fn flush(&mut self, max_operations: usize) -> usize {
    if max_operations == 0 {
      return 0;
    }

    let queue: &'r RequestQueue<F> = &self.registry.readonly.queue;
    let mut processed: usize = 0;

    // -------------------------------------------------------------------------
    // 1. Creates
    // -------------------------------------------------------------------------

    let start: usize = self.state.creates.len();

    self.state.creates.extend(queue.take_creates());
    self.state.creates.make_contiguous()[start..].reverse();

    while processed < max_operations {
      let Some(node) = self.state.creates.pop_front() else {
        break;
      };

      // SAFETY: The node was detached from the create stack above or by an
      //         earlier flush, and is read exactly once.
      self.process(unsafe { queue.take(node) });

      processed += 1;
    }

    // -------------------------------------------------------------------------
    // 2. Destroys
    // -------------------------------------------------------------------------

    self.state.destroys.extend(queue.take_destroys());

    while processed < max_operations {
      let Some(node) = self.state.destroys.pop_front() else {
        break;
      };

      // SAFETY: See above.
      self.process(unsafe { queue.take(node) });

      processed += 1;
    }

    // -------------------------------------------------------------------------
    // 3. Reclaim
    // -------------------------------------------------------------------------

    let reclaimed: usize = self.reclaim();

    // -------------------------------------------------------------------------
    // 4. Compact
    // -------------------------------------------------------------------------

    let compacted: usize = self.compact_keys();

    tracing::debug!(
      registry = %self.registry.label(),
      processed,
      reclaimed,
      compacted,
      creates = self.state.creates.len(),
      destroys = self.state.destroys.len(),
      "flush",
    );

    processed
  }

  /// Flushes with the budget configured for the registry.
  #[inline]
  pub fn tick(&mut self) -> usize {
    self.flush(self.registry.readonly.flush_budget)
  }

  /// Installs `resource` into the slot linked for `key`.
  ///
  /// `None` marks the slot as [`Status::Error`] with the error placeholder.
  /// A resource the slot held before is destroyed on a later flush.
  ///
  /// Returns `false` if `key` has no live slot; `resource` is then queued
  /// for destruction instead of being installed.
  #[inline]
  pub fn replace(&mut self, key: Key, resource: Option<F::Resource>) -> bool {
    let resource: Option<Raw<F::Resource>> = resource.map(Self::into_raw);
    self.install_keyed(key, None, resource)
  }

  /// Installs `resource` into indexed slot `index`.
  ///
  /// `None` marks the slot as [`Status::Error`] with the error placeholder.
  /// A resource the slot held before is destroyed on a later flush.
  ///
  /// # Panics
  ///
  /// Raises `BadArg` if `index` is out of range.
  #[inline]
  pub fn replace_by_index(&mut self, index: u32, resource: Option<F::Resource>) {
    let resource: Option<Raw<F::Resource>> = resource.map(Self::into_raw);
    self.install_indexed(index, resource);
  }

  /// Returns the resource shown by indexed slot `index`, or `None` if the
  /// slot is empty.
  ///
  /// # Panics
  ///
  /// Raises `BadArg` if `index` is out of range.
  #[inline]
  pub fn resolve_indexed(&self, index: u32) -> Option<&F::Resource> {
    let word: Word = self.registry.indexed_word(index).load(Acquire);

    if word.is_zero() {
      None
    } else {
      // SAFETY: The word is live and `self` is borrowed for the lifetime of
      //         the returned reference.
      Some(unsafe { Registry::<F>::resource(word) })
    }
  }
}

// -----------------------------------------------------------------------------
// Maintenance - Internals
// -----------------------------------------------------------------------------

impl<F: Factory> Maintenance<'_, F> {
  fn process(&mut self, request: Request<F>) {
    match request {
      Request::Create {
        target,
        identifier,
        payload,
      } => {
        let resource: Option<F::Resource> = match payload {
          Some(payload) => self.registry.factory().create(&identifier, payload),
          None => None,
        };

        if resource.is_some() {
          self.state.stats.created += 1;
        } else {
          self.state.stats.failed += 1;

          tracing::warn!(
            registry = %self.registry.label(),
            identifier = &*identifier,
            ?target,
            "create failed",
          );
        }

        let resource: Option<Raw<F::Resource>> = resource.map(Self::into_raw);

        let installed: bool = match target {
          Target::Keyed { key, link } => self.install_keyed(key, Some(link), resource),
          Target::Indexed(index) => {
            self.install_indexed(index, resource);
            true
          }
        };

        tracing::trace!(
          registry = %self.registry.label(),
          request = "create",
          identifier = &*identifier,
          ?target,
          installed,
        );
      }
      Request::Destroy { resource } => {
        tracing::trace!(registry = %self.registry.label(), request = "destroy");
        self.destroy(resource);
      }
    }
  }

  /// Installs `resource` into the slot of `key`, or orphans it.
  ///
  /// With an `expected` link the slot must still be that allocation, so a
  /// create for a reclaimed slot never lands in its successor. A create for
  /// a slot without references reclaims the slot instead.
  fn install_keyed(&mut self, key: Key, expected: Option<Link>, resource: Option<Raw<F::Resource>>) -> bool {
    let registry: &Registry<F> = self.registry;

    let link: Link = match (Link::from_bits(registry.readonly.map.get(key)), expected) {
      (Some(current), Some(expected)) if current == expected => current,
      (Some(current), None) => current,
      _ => return self.orphan(key, resource),
    };

    let slot: &Slot = registry.readonly.pool.get(link.index());

    if !slot.is_current(link) || slot.key() != Some(key) {
      return self.orphan(key, resource);
    }

    let (addr, status, owned): (usize, Status, bool) = match resource {
      Some(raw) => (raw.expose_provenance(), Status::Ready, true),
      None => (registry.error_addr(), Status::Error, false),
    };

    let abandon: bool = expected.is_some();

    let update: Result<Word, Word> = slot.word.update(|word| {
      if word.is_zero() {
        None
      } else if abandon && word.refcount() == 0 {
        Some(Word::ZERO)
      } else {
        Some(Registry::<F>::repack(word, addr, status, owned))
      }
    });

    match update {
      Ok(prev) if abandon && prev.refcount() == 0 => {
        self.release_slot(key, link, prev);

        if let Some(raw) = resource {
          self.state.stats.orphaned += 1;

          // SAFETY: `raw` came from `into_raw` and was never published.
          self.destroy(unsafe { Box::from_raw(raw) });
        }

        false
      }
      Ok(prev) => {
        self.retire(prev);
        true
      }
      Err(_) => self.orphan(key, resource),
    }
  }

  fn install_indexed(&mut self, index: u32, resource: Option<Raw<F::Resource>>) {
    let registry: &Registry<F> = self.registry;
    let cell: &AtomicWord = registry.indexed_word(index);

    let (addr, status, owned): (usize, Status, bool) = match resource {
      Some(raw) => (raw.expose_provenance(), Status::Indexed, true),
      None => (registry.error_addr(), Status::Error, false),
    };

    let update: Result<Word, Word> = cell.update(|word| {
      if word.is_zero() {
        Some(Registry::<F>::pack(addr, status, owned, 0))
      } else {
        Some(Registry::<F>::repack(word, addr, status, owned))
      }
    });

    if let Ok(prev) = update {
      self.retire(prev);
    }
  }

  /// Queues the resource `prev` pointed at for destruction, if it owned one.
  fn retire(&mut self, prev: Word) {
    if prev.is_zero() || !prev.is_owned() {
      return;
    }

    // SAFETY: Owned words point at a boxed resource, and the word that owned
    //         it has just been replaced.
    let resource: Box<Aligned<F::Resource>> = unsafe { Self::from_addr(prev.addr()) };

    self.queue_destroy(resource);
  }

  fn orphan(&mut self, key: Key, resource: Option<Raw<F::Resource>>) -> bool {
    tracing::trace!(registry = %self.registry.label(), %key, result = "orphaned");

    if let Some(raw) = resource {
      self.state.stats.orphaned += 1;

      // SAFETY: `raw` came from `into_raw` and was never published.
      self.queue_destroy(unsafe { Box::from_raw(raw) });
    }

    false
  }

  fn queue_destroy(&mut self, resource: Box<Aligned<F::Resource>>) {
    let request: Request<F> = Request::Destroy { resource };

    if let Err(Request::Destroy { resource }) = self.registry.readonly.queue.push(request) {
      tracing::warn!(
        registry = %self.registry.label(),
        "request queue exhausted, destroying immediately",
      );

      self.destroy(resource);
    }
  }

  fn destroy(&mut self, resource: Box<Aligned<F::Resource>>) {
    self.registry.factory().destroy(resource.into_inner());
    self.state.stats.destroyed += 1;
  }

  /// Returns every unreferenced, settled slot to the pool.
  fn reclaim(&mut self) -> usize {
    let registry: &Registry<F> = self.registry;
    let mut reclaimed: usize = 0;

    for (key, cell) in registry.readonly.map.entries() {
      let Some(link) = Link::from_bits(cell.load(Acquire)) else {
        continue;
      };

      let slot: &Slot = registry.readonly.pool.get(link.index());
      let word: Word = slot.word.load(Acquire);

      if word.is_zero()
        || word.refcount() != 0
        || !word.status().is_collectible()
        || !slot.is_current(link)
      {
        continue;
      }

      // Fails if a resolver referenced the slot in the meantime.
      if slot
        .word
        .compare_exchange(word, Word::ZERO, AcqRel, Acquire)
        .is_err()
      {
        continue;
      }

      self.release_slot(key, link, word);

      reclaimed += 1;
    }

    reclaimed
  }

  /// Finishes reclaiming slot `link` of `key`, whose word `prev` was just
  /// replaced by [`Word::ZERO`].
  fn release_slot(&mut self, key: Key, link: Link, prev: Word) {
    let registry: &Registry<F> = self.registry;

    // A resolver that saw the zero word may have unlinked it already.
    let _ = registry.readonly.map.cas(key, link.into_bits(), HashMap::NUL);

    if prev.is_owned() {
      // SAFETY: The slot owned the resource and its word is now zero.
      self.destroy(unsafe { Self::from_addr(prev.addr()) });
    }

    registry.readonly.pool.free(link.index());
    registry.volatile.len.fetch_sub(1, Relaxed);

    self.state.stats.reclaimed += 1;

    tracing::trace!(registry = %registry.label(), %key, ?link, result = "reclaimed");
  }

  /// Removes derelict keys once they fill a quarter of the lookup table.
  fn compact_keys(&mut self) -> usize {
    let registry: &Registry<F> = self.registry;
    let map: &HashMap = &registry.readonly.map;

    if map.derelict() < map.capacity() / 4 {
      return 0;
    }

    let Some(closed) = registry.volatile.gate.try_close() else {
      tracing::trace!(
        registry = %registry.label(),
        readers = registry.volatile.gate.readers(),
        "compaction deferred",
      );

      return 0;
    };

    // SAFETY: The gate is closed, so no resolver is inside the table, and
    //         the token holder keeps no value cell across this call.
    let removed: usize = unsafe { map.reclaim_keys_unchecked() };

    drop::<Closed<'_>>(closed);

    removed
  }

  /// Tears down every request and resource; used by the registry destructor.
  pub(crate) fn shutdown(mut self) {
    let registry: &Registry<F> = self.registry;
    let queue: &RequestQueue<F> = &registry.readonly.queue;
    let mut dropped: usize = 0;

    let creates: Vec<u32> = self.state.creates.drain(..).chain(queue.take_creates()).collect();

    for node in creates {
      // SAFETY: Every node was detached from the create stack and not read.
      drop(unsafe { queue.take(node) });
      dropped += 1;
    }

    // Destroying can only queue more destroys through `retire`, which is not
    // reachable from here, so one pass drains everything.
    let destroys: Vec<u32> = self.state.destroys.drain(..).chain(queue.take_destroys()).collect();

    for node in destroys {
      // SAFETY: See above.
      self.process(unsafe { queue.take(node) });
    }

    for slot in registry.readonly.pool.iter() {
      let word: Word = slot.word.load(Acquire);

      if !word.is_zero() && word.is_owned() {
        // SAFETY: We have exclusive access; the slot owns the resource.
        self.destroy(unsafe { Self::from_addr(word.addr()) });
      }

      slot.word.store(Word::ZERO, Relaxed);
    }

    for index in 0..registry.indexed_capacity() as u32 {
      let cell: &AtomicWord = registry.indexed_word(index);
      let word: Word = cell.load(Acquire);

      if !word.is_zero() && word.is_owned() {
        // SAFETY: See above.
        self.destroy(unsafe { Self::from_addr(word.addr()) });
      }

      cell.store(Word::ZERO, Relaxed);
    }

    if !queue.is_empty() {
      fatal!("request queued during registry shutdown");
    }

    if dropped != 0 {
      tracing::warn!(
        registry = %registry.label(),
        dropped,
        "registry dropped with pending create requests",
      );
    }
  }

  #[inline]
  fn into_raw(resource: F::Resource) -> Raw<F::Resource> {
    Box::into_raw(Box::new(Aligned::new(resource)))
  }

  /// # Safety
  ///
  /// `addr` must come from [`into_raw`] and must not be reclaimed twice.
  ///
  /// [`into_raw`]: Self::into_raw
  #[inline]
  unsafe fn from_addr(addr: usize) -> Box<Aligned<F::Resource>> {
    // SAFETY: Upheld by the caller; the address was exposed when packed.
    unsafe { Box::from_raw(ptr::with_exposed_provenance_mut(addr)) }
  }
}

impl<F: Factory> Debug for Maintenance<'_, F> {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("Maintenance")
      .field("registry", &self.registry.label())
      .field("stats", &self.state.stats)
      .field("creates", &self.state.creates.len())
      .field("destroys", &self.state.destroys.len())
      .finish()
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use std::sync::Arc;
  use std::sync::Mutex;

  use super::*;
  use crate::config::RegistryConfig;
  use crate::registry::Handle;

  /// Records every destroyed resource.
  #[derive(Default)]
  struct Recorder {
    destroyed: Arc<Mutex<Vec<String>>>,
  }

  impl Factory for Recorder {
    type Resource = String;
    type Payload = &'static str;

    fn create(&self, _identifier: &str, payload: &'static str) -> Option<String> {
      (!payload.is_empty()).then(|| payload.to_owned())
    }

    fn destroy(&self, resource: String) {
      self.destroyed.lock().unwrap().push(resource);
    }
  }

  fn registry() -> (Registry<Recorder>, Arc<Mutex<Vec<String>>>) {
    let factory: Recorder = Recorder::default();
    let destroyed: Arc<Mutex<Vec<String>>> = Arc::clone(&factory.destroyed);

    let mut config: RegistryConfig = RegistryConfig::with_capacity(16);
    config.indexed_slots = 8;

    (Registry::new(config, factory, "error".to_owned()), destroyed)
  }

  #[test]
  fn test_flush_zero_is_noop() {
    let (registry, _) = registry();
    let _held: Handle<'_, Recorder> = registry.insert("a", None, "a", false);
    let mut token: Maintenance<'_, Recorder> = registry.maintenance();

    assert_eq!(token.flush(0), 0);
    assert_eq!(token.stats(), FlushStats::default());
    assert_eq!(registry.status(Key::from_identifier("a")), Some(Status::Loading));
  }

  #[test]
  fn test_flush_empty_twice() {
    let (registry, _) = registry();
    let mut token: Maintenance<'_, Recorder> = registry.maintenance();

    assert_eq!(token.flush(10), 0);
    assert_eq!(token.flush(10), 0);
  }

  #[test]
  fn test_create_failure_shows_error_placeholder() {
    let (registry, _) = registry();
    let handle: Handle<'_, Recorder> = registry.insert("broken", None, "", true);
    let mut token: Maintenance<'_, Recorder> = registry.maintenance();

    token.flush(4);

    assert_eq!(handle.status(), Status::Error);
    assert_eq!(handle.get(&token), "error");
    assert_eq!(token.stats().failed, 1);
  }

  #[test]
  fn test_budget_keeps_fifo_order() {
    let (registry, _) = registry();

    let a: Handle<'_, Recorder> = registry.insert("a", None, "a", false);
    let b: Handle<'_, Recorder> = registry.insert("b", None, "b", false);
    let c: Handle<'_, Recorder> = registry.insert("c", None, "c", false);

    let mut token: Maintenance<'_, Recorder> = registry.maintenance();

    assert_eq!(token.flush(1), 1);
    assert_eq!(a.status(), Status::Ready);
    assert_eq!(b.status(), Status::Loading);

    assert_eq!(token.flush(1), 1);
    assert_eq!(b.status(), Status::Ready);
    assert_eq!(c.status(), Status::Loading);

    assert_eq!(token.flush(8), 1);
    assert_eq!(c.status(), Status::Ready);
  }

  #[test]
  fn test_forced_insert_replaces_resource() {
    let (registry, destroyed) = registry();
    let handle: Handle<'_, Recorder> = registry.insert("shader", None, "v1", false);

    registry.flush(8);

    let again: Handle<'_, Recorder> = registry.insert("shader", None, "v2", true);
    let mut token: Maintenance<'_, Recorder> = registry.maintenance();

    // The create runs first; the old resource is destroyed in the same pass.
    assert_eq!(token.flush(8), 2);
    assert_eq!(handle.get(&token), "v2");
    assert_eq!(*destroyed.lock().unwrap(), ["v1"]);

    drop(again);
  }

  #[test]
  fn test_replace() {
    let (registry, destroyed) = registry();
    let key: Key = Key::from_identifier("manual");
    let handle: Handle<'_, Recorder> = registry.resolve(key, None);
    let mut token: Maintenance<'_, Recorder> = registry.maintenance();

    assert!(token.replace(key, Some("one".to_owned())));
    assert_eq!(handle.status(), Status::Ready);
    assert_eq!(handle.get(&token), "one");

    assert!(token.replace(key, None));
    assert_eq!(handle.status(), Status::Error);

    token.flush(4);
    assert_eq!(*destroyed.lock().unwrap(), ["one"]);

    // Unknown keys orphan the resource.
    assert!(!token.replace(Key::from_identifier("nobody"), Some("lost".to_owned())));
    token.flush(4);

    assert_eq!(token.stats().orphaned, 1);
    assert_eq!(*destroyed.lock().unwrap(), ["one", "lost"]);
  }

  #[test]
  fn test_reclaim_requires_zero_refcount() {
    let (registry, destroyed) = registry();
    let kept: Handle<'_, Recorder> = registry.insert("kept", None, "kept", false);
    let copy: Handle<'_, Recorder> = kept.clone();

    drop(registry.insert("dropped", None, "dropped", false));

    let mut token: Maintenance<'_, Recorder> = registry.maintenance();

    token.flush(8);

    assert_eq!(registry.len(), 1);
    assert_eq!(token.stats().reclaimed, 1);
    assert_eq!(*destroyed.lock().unwrap(), ["dropped"]);

    drop(kept);
    token.flush(8);
    assert_eq!(registry.len(), 1);

    drop(copy);
    token.flush(8);
    assert_eq!(registry.len(), 0);
  }

  #[test]
  fn test_loading_slot_not_reclaimed_before_create() {
    let (registry, _) = registry();

    drop(registry.insert("a", None, "a", false));
    drop(registry.insert("b", None, "b", false));

    let mut token: Maintenance<'_, Recorder> = registry.maintenance();

    // Only "a" is created; "b" is still loading and must survive the sweep.
    assert_eq!(token.flush(1), 1);
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.status(Key::from_identifier("b")), Some(Status::Loading));

    assert_eq!(token.flush(1), 1);
    assert!(registry.is_empty());
  }

  #[test]
  fn test_indexed_replace_by_index() {
    let (registry, destroyed) = registry();
    let mut token: Maintenance<'_, Recorder> = registry.maintenance();

    assert_eq!(token.resolve_indexed(2), None);

    token.replace_by_index(2, Some("first".to_owned()));
    assert_eq!(token.resolve_indexed(2).map(String::as_str), Some("first"));
    assert_eq!(registry.indexed_status(2), Some(Status::Indexed));

    token.replace_by_index(2, None);
    assert_eq!(token.resolve_indexed(2).map(String::as_str), Some("error"));

    token.flush(4);
    assert_eq!(*destroyed.lock().unwrap(), ["first"]);
  }
}
