//! Fixed-capacity, lock-free resource registry.
//!
//! # Architecture
//!
//! ```text
//!   HashMap (Key ─▶ Link)        SlotPool                RequestQueue
//! ┌──────────┬────────────┐    ┌─────────────────┐     ┌──────────────┐
//! │ Key(a1f) │ Link(3#7) ─┼───▶│ 3: Word, serial │     │ creates  ◀── │ insert, load
//! │ Key(0c4) │ NUL        │    │ 4: ZERO         │     │ destroys ◀── │ replace
//! └──────────┴────────────┘    └─────────────────┘     └──────────────┘
//!                                                              │
//!                                          Maintenance::flush ◀┘
//! ```
//!
//! # Concurrency Model
//!
//! - **Hot paths** (`resolve`, `insert`, `load`, handle clone and drop) are
//!   lock-free: each is a bounded number of CAS loops on the hash map and the
//!   slot words.
//! - **Privileged paths** (resource creation and destruction, status and
//!   pointer changes, reclamation) belong to whoever holds the
//!   [`Maintenance`] token, and there is at most one token at a time.
//!
//! The only status changes allowed outside the token are the CAS moves into
//! `Loading`: `Missing ──▶ Loading` lets exactly one caller issue a create
//! for a resolved slot, and a forced request restarts a settled slot. Both
//! keep the slot's pointer.
//!
//! # Reclamation
//!
//! A flush reclaims every linked slot that has no references and no request
//! in flight. The single CAS that moves its word to [`Word::ZERO`] is the
//! linearization point: a concurrent resolver either referenced the slot
//! first (and the CAS fails) or finds a zero word or a new serial and links
//! a fresh slot.
//!
//! Reclaimed keys stay in the hash map with a nil value. Once enough of them
//! pile up, a flush removes them while no resolver is inside the table: every
//! table access pins a reader gate, and the token holder compacts only if it
//! can close the gate. [`Registry::compact`] does the same with exclusive
//! access.

use crossbeam_utils::Backoff;
use crossbeam_utils::CachePadded;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::num::NonZeroUsize;
use std::panic::RefUnwindSafe;
use std::panic::UnwindSafe;
use std::ptr;
use std::ptr::NonNull;
use triomphe::Arc;

use crate::config::RegistryConfig;
use crate::consts;
use crate::error::fatal;
use crate::loom::hint;
use crate::loom::sync::Mutex;
use crate::loom::sync::MutexGuard;
use crate::loom::sync::atomic::AtomicU32;
use crate::loom::sync::atomic::AtomicU64;
use crate::loom::sync::atomic::Ordering::AcqRel;
use crate::loom::sync::atomic::Ordering::Acquire;
use crate::loom::sync::atomic::Ordering::Relaxed;
use crate::loom::sync::atomic::Ordering::Release;
use crate::loom::sync::try_lock;
use crate::raise;
use crate::registry::Aligned;
use crate::registry::AtomicWord;
use crate::registry::Completion;
use crate::registry::Factory;
use crate::registry::Handle;
use crate::registry::LoadError;
use crate::registry::Loader;
use crate::registry::Maintenance;
use crate::registry::Placeholder;
use crate::registry::Status;
use crate::registry::Word;
use crate::registry::gate::Gate;
use crate::registry::gate::Pinned;
use crate::registry::maintenance::FlushState;
use crate::registry::pool::Link;
use crate::registry::pool::Slot;
use crate::registry::pool::SlotPool;
use crate::registry::queue::Request;
use crate::registry::queue::RequestQueue;
use crate::registry::queue::Target;
use crate::table::HashMap;
use crate::table::Key;
use crate::tyre::Slots;

// -----------------------------------------------------------------------------
// Registry
// -----------------------------------------------------------------------------

/// A concurrent cache from resource keys to reference-counted slots.
///
/// # Examples
///
/// ```
/// use resreg::config::RegistryConfig;
/// use resreg::registry::Factory;
/// use resreg::registry::Registry;
/// use resreg::registry::Status;
///
/// struct Text;
///
/// impl Factory for Text {
///   type Resource = String;
///   type Payload = &'static str;
///
///   fn create(&self, _identifier: &str, payload: &'static str) -> Option<String> {
///     Some(payload.to_uppercase())
///   }
/// }
///
/// let registry = Registry::new(RegistryConfig::with_capacity(16), Text, String::new());
/// let handle = registry.insert("greeting", None, "hello", false);
///
/// assert_eq!(handle.status(), Status::Loading);
///
/// let mut token = registry.maintenance();
/// token.flush(8);
///
/// assert_eq!(handle.status(), Status::Ready);
/// assert_eq!(handle.get(&token), "HELLO");
/// ```
#[repr(C)]
pub struct Registry<F: Factory> {
  pub(super) volatile: CachePadded<Volatile>,
  pub(super) readonly: CachePadded<ReadOnly<F>>,
}

pub(super) struct Volatile {
  /// Number of slots currently linked into the hash map.
  pub(super) len: AtomicU32,
  /// Readers of the hash map, and the key compaction that excludes them.
  pub(super) gate: Gate,
}

pub(super) struct ReadOnly<F: Factory> {
  pub(super) label: Box<str>,
  pub(super) map: HashMap,
  pub(super) pool: SlotPool,
  pub(super) indexed: Option<Slots<AtomicWord>>,
  pub(super) queue: RequestQueue<F>,
  pub(super) factory: F,
  pub(super) loader: Option<Box<dyn Loader<F>>>,
  pub(super) error: NonNull<Aligned<F::Resource>>,
  pub(super) flush_budget: usize,
  pub(super) flush: Mutex<FlushState>,
}

impl<F: Factory> Registry<F> {
  /// Creates a registry without a loader.
  ///
  /// `error_placeholder` is shown by every slot whose load or creation
  /// failed. It is owned by the registry and handed to the factory for
  /// destruction when the registry is dropped.
  ///
  /// # Panics
  ///
  /// Raises `BadArg` if the configuration is out of range.
  #[inline]
  pub fn new(config: RegistryConfig, factory: F, error_placeholder: F::Resource) -> Self {
    Self::build(config, factory, error_placeholder, None)
  }

  /// Creates a registry that resolves [`Registry::load`] through `loader`.
  ///
  /// # Panics
  ///
  /// Raises `BadArg` if the configuration is out of range.
  #[inline]
  pub fn with_loader<L>(
    config: RegistryConfig,
    factory: F,
    error_placeholder: F::Resource,
    loader: L,
  ) -> Self
  where
    L: Loader<F> + 'static,
  {
    Self::build(config, factory, error_placeholder, Some(Box::new(loader)))
  }

  /// Returns the number of bytes a registry for `capacity` slots allocates
  /// for its fixed arrays, using the default indexed slot and queue sizes.
  #[inline]
  pub const fn calc_size(capacity: usize) -> usize {
    let indexed: usize = consts::DEFAULT_INDEXED_SLOTS;
    let nodes: usize = RegistryConfig::default_queue_nodes(capacity, indexed);

    Self::bytes_for(capacity, indexed, nodes)
  }

  /// Returns the largest capacity whose [`calc_size`] fits in `bytes`, or
  /// zero if none does.
  ///
  /// [`calc_size`]: Self::calc_size
  pub const fn calc_capacity(bytes: usize) -> usize {
    let mut lo: usize = 0;
    let mut hi: usize = consts::MAX_CAPACITY;

    while lo < hi {
      let mid: usize = lo + (hi - lo).div_ceil(2);

      if Self::calc_size(mid) <= bytes {
        lo = mid;
      } else {
        hi = mid - 1;
      }
    }

    lo
  }

  /// Returns the number of bytes allocated for the registry's fixed arrays.
  #[inline]
  pub fn bytes(&self) -> usize {
    Self::bytes_for(
      self.capacity(),
      self.indexed_capacity(),
      self.readonly.queue.nodes(),
    )
  }

  /// Returns the registry label used in diagnostics.
  #[inline]
  pub fn label(&self) -> &str {
    &self.readonly.label
  }

  /// Returns the maximum number of keyed slots.
  #[inline]
  pub fn capacity(&self) -> usize {
    self.readonly.pool.capacity()
  }

  /// Returns the number of indexed slots.
  #[inline]
  pub fn indexed_capacity(&self) -> usize {
    self.readonly.indexed.as_ref().map_or(0, |slots| slots.len().get())
  }

  /// Returns the number of keyed slots currently linked.
  ///
  /// This value may change immediately after reading due to concurrent
  /// operations in other threads.
  #[inline]
  pub fn len(&self) -> usize {
    self.volatile.len.load(Relaxed) as usize
  }

  /// Returns `true` if no keyed slot is linked.
  #[inline]
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Returns the resource factory.
  #[inline]
  pub fn factory(&self) -> &F {
    &self.readonly.factory
  }

  // ---------------------------------------------------------------------------
  // Concurrent API
  // ---------------------------------------------------------------------------

  /// Returns a handle to the slot of `key`, creating a [`Missing`] slot that
  /// shows `placeholder` (or the error placeholder) if there is none.
  ///
  /// # Panics
  ///
  /// Raises `SysCap` if the lookup table or the slot pool is full.
  ///
  /// [`Missing`]: Status::Missing
  #[inline]
  pub fn resolve(&self, key: Key, placeholder: Option<Placeholder<F::Resource>>) -> Handle<'_, F> {
    self.acquire(key, self.placeholder_addr(placeholder), Status::Missing).0
  }

  /// Resolves `identifier` and queues a create request built from `payload`.
  ///
  /// The request is queued if the slot is new, if it was [`Missing`], or if
  /// `force` is set; otherwise `payload` is dropped. A forced request moves a
  /// settled slot back to [`Loading`]; a built resource stays visible until
  /// the next flush replaces it.
  ///
  /// # Panics
  ///
  /// Raises `SysCap` if the lookup table or the slot pool is full.
  ///
  /// [`Missing`]: Status::Missing
  /// [`Loading`]: Status::Loading
  pub fn insert(
    &self,
    identifier: &str,
    placeholder: Option<Placeholder<F::Resource>>,
    payload: F::Payload,
    force: bool,
  ) -> Handle<'_, F> {
    let key: Key = Key::from_identifier(identifier);
    let (handle, begun): (Handle<'_, F>, Option<Status>) = self.begin(key, placeholder, force);

    if begun.is_some() || force {
      let request: Request<F> = Request::Create {
        target: Target::Keyed {
          key,
          link: handle.link(),
        },
        identifier: identifier.into(),
        payload: Some(payload),
      };

      if self.readonly.queue.push(request).is_err() {
        tracing::warn!(
          registry = %self.label(),
          %key,
          identifier,
          "request queue exhausted, create dropped",
        );

        if let Some(prev) = begun {
          self.abort_loading(handle.link(), prev);
        }
      }
    }

    handle
  }

  /// Resolves `identifier` and asks the loader for its payload.
  ///
  /// The loader is invoked under the same conditions [`insert`] queues a
  /// create; its [`Completion`] queues the create once the payload is ready.
  ///
  /// # Panics
  ///
  /// Raises `BadArg` if the registry has no loader, and `SysCap` if the
  /// lookup table or the slot pool is full.
  ///
  /// [`insert`]: Self::insert
  pub fn load<'a>(
    this: &'a Arc<Self>,
    identifier: &str,
    placeholder: Option<Placeholder<F::Resource>>,
    force: bool,
  ) -> Handle<'a, F> {
    let Some(loader) = this.readonly.loader.as_deref() else {
      raise!(Error, BadArg, "registry has no loader");
    };

    let key: Key = Key::from_identifier(identifier);
    let (handle, begun): (Handle<'a, F>, Option<Status>) = this.begin(key, placeholder, force);

    if begun.is_some() || force {
      tracing::trace!(registry = %this.label(), %key, identifier, "load");
      loader.load(Completion::new(Arc::clone(this), identifier.into(), key, handle.link()));
    }

    handle
  }

  /// Queues a create request for indexed slot `index`.
  ///
  /// An empty slot shows the error placeholder as [`LoadingIndexed`] until
  /// the next flush. A settled slot is moved back to [`LoadingIndexed`] and
  /// keeps showing its resource until the new one is installed; the old one
  /// is then destroyed.
  ///
  /// # Panics
  ///
  /// Raises `BadArg` if `index` is out of range.
  ///
  /// [`LoadingIndexed`]: Status::LoadingIndexed
  pub fn insert_indexed(&self, index: u32, label: &str, payload: F::Payload) {
    let cell: &AtomicWord = self.indexed_word(index);
    let fresh: Word = Self::pack(self.error_addr(), Status::LoadingIndexed, false, 0);

    let prev: Word = match cell.update(|word| {
      if word.is_zero() {
        Some(fresh)
      } else {
        Some(word.with_status(Status::LoadingIndexed))
      }
    }) {
      Ok(prev) => prev,
      Err(word) => word,
    };

    let request: Request<F> = Request::Create {
      target: Target::Indexed(index),
      identifier: label.into(),
      payload: Some(payload),
    };

    if self.readonly.queue.push(request).is_err() {
      tracing::warn!(
        registry = %self.label(),
        index,
        label,
        "request queue exhausted, indexed create dropped",
      );

      // Indexed words carry no references, so an unchanged word is still ours.
      let next: Word = if prev.is_zero() {
        fresh
      } else {
        prev.with_status(Status::LoadingIndexed)
      };

      if next != prev {
        let _ = cell.compare_exchange(next, prev, AcqRel, Relaxed);
      }
    }
  }

  /// Returns the status of the slot linked for `key`, if any.
  #[inline]
  pub fn status(&self, key: Key) -> Option<Status> {
    let _pinned: Pinned<'_> = self.volatile.gate.pin();
    let link: Link = Link::from_bits(self.readonly.map.get(key))?;
    let slot: &Slot = self.readonly.pool.get(link.index());
    let word: Word = slot.word.load(Acquire);

    if word.is_zero() || !slot.is_current(link) {
      None
    } else {
      Some(word.status())
    }
  }

  /// Returns the status of indexed slot `index`, or `None` if it is empty.
  ///
  /// # Panics
  ///
  /// Raises `BadArg` if `index` is out of range.
  #[inline]
  pub fn indexed_status(&self, index: u32) -> Option<Status> {
    let word: Word = self.indexed_word(index).load(Acquire);

    if word.is_zero() {
      None
    } else {
      Some(word.status())
    }
  }

  // ---------------------------------------------------------------------------
  // Maintenance API
  // ---------------------------------------------------------------------------

  /// Takes the maintenance token.
  ///
  /// # Panics
  ///
  /// Raises `SysInv` if another token for this registry is alive.
  #[inline]
  pub fn maintenance(&self) -> Maintenance<'_, F> {
    match try_lock(&self.readonly.flush) {
      Some(guard) => Maintenance::new(self, guard),
      None => raise!(Error, SysInv, "maintenance token already taken"),
    }
  }

  /// Takes the maintenance token for a single [`Maintenance::flush`].
  ///
  /// # Panics
  ///
  /// Raises `SysInv` if another token for this registry is alive.
  #[inline]
  pub fn flush(&self, max_operations: usize) -> usize {
    self.maintenance().flush(max_operations)
  }

  /// Removes reclaimed keys from the lookup table, returning how many.
  ///
  /// Flushes compact the table on their own once derelict keys take up a
  /// quarter of it and no resolver is inside; this forces a compaction.
  #[inline]
  pub fn compact(&mut self) -> usize {
    let removed: usize = self.readonly.map.reclaim_keys();

    tracing::debug!(registry = %self.label(), removed, "compact");

    removed
  }
}

// -----------------------------------------------------------------------------
// Registry - Internals
// -----------------------------------------------------------------------------

impl<F: Factory> Registry<F> {
  fn build(
    config: RegistryConfig,
    factory: F,
    error_placeholder: F::Resource,
    loader: Option<Box<dyn Loader<F>>>,
  ) -> Self {
    let queue_nodes: usize = config.queue_nodes();

    let Some(capacity) = NonZeroUsize::new(config.capacity) else {
      raise!(Error, BadArg, "registry capacity must be non-zero");
    };

    if capacity.get() > consts::MAX_CAPACITY {
      raise!(Error, BadArg, format_args!("registry capacity exceeds {}", consts::MAX_CAPACITY));
    }

    if config.indexed_slots > consts::MAX_INDEXED_SLOTS {
      raise!(Error, BadArg, format_args!("indexed slots exceed {}", consts::MAX_INDEXED_SLOTS));
    }

    let Some(nodes) = NonZeroUsize::new(queue_nodes) else {
      raise!(Error, BadArg, "queue nodes must be non-zero");
    };

    if nodes.get() > consts::MAX_QUEUE_NODES {
      raise!(Error, BadArg, format_args!("queue nodes exceed {}", consts::MAX_QUEUE_NODES));
    }

    let indexed: Option<Slots<AtomicWord>> = NonZeroUsize::new(config.indexed_slots)
      .map(|len| Slots::from_fn(len, |_| AtomicWord::zero()));

    let error: NonNull<Aligned<F::Resource>> =
      NonNull::from(Box::leak(Box::new(Aligned::new(error_placeholder))));

    tracing::debug!(
      registry = %config.label,
      capacity = capacity.get(),
      indexed = config.indexed_slots,
      nodes = nodes.get(),
      "registry created",
    );

    Self {
      volatile: CachePadded::new(Volatile {
        len: AtomicU32::new(0),
        gate: Gate::new(),
      }),
      readonly: CachePadded::new(ReadOnly {
        label: config.label.into_boxed_str(),
        map: HashMap::with_capacity(capacity.get()),
        pool: SlotPool::new(capacity),
        indexed,
        queue: RequestQueue::new(nodes),
        factory,
        loader,
        error,
        flush_budget: config.flush_budget,
        flush: Mutex::new(FlushState::new(nodes.get())),
      }),
    }
  }

  const fn bytes_for(capacity: usize, indexed: usize, nodes: usize) -> usize {
    HashMap::calc_size(capacity)
      + SlotPool::bytes(capacity)
      + Slots::<AtomicWord>::bytes(indexed)
      + RequestQueue::<F>::bytes(nodes)
  }

  /// Finds or links the slot of `key`.
  ///
  /// A new slot is published with `status`, `addr`, and one reference for
  /// the returned handle. Returns whether this call linked the slot.
  fn acquire(&self, key: Key, addr: usize, status: Status) -> (Handle<'_, F>, bool) {
    // Compaction moves keys and value cells; stay pinned while using `cell`.
    let _pinned: Pinned<'_> = self.volatile.gate.pin();

    let cell: &AtomicU64 = match self.readonly.map.entry(key) {
      Ok(cell) => cell,
      Err(error) => raise!(Error, SysCap, error),
    };

    let backoff: Backoff = Backoff::new();

    loop {
      // -----------------------------------------------------------------------
      // 1. Follow Existing Link
      // -----------------------------------------------------------------------

      let bits: u64 = cell.load(Acquire);

      if let Some(link) = Link::from_bits(bits) {
        if self.try_reference(link) {
          return (Handle::new(self, key, link), false);
        }

        // The slot was reclaimed; unlink it so a fresh one can take its place.
        let _ = cell.compare_exchange(bits, HashMap::NUL, AcqRel, Relaxed);

        backoff.spin();
        continue;
      }

      // -----------------------------------------------------------------------
      // 2. Allocate Slot
      // -----------------------------------------------------------------------

      let Some(link) = self.readonly.pool.alloc(key) else {
        raise!(Error, SysCap, "registry slot pool exhausted");
      };

      let slot: &Slot = self.readonly.pool.get(link.index());

      slot.word.store(Self::pack(addr, status, false, 1), Release);

      // -----------------------------------------------------------------------
      // 3. Link Slot
      // -----------------------------------------------------------------------

      match cell.compare_exchange(HashMap::NUL, link.into_bits(), AcqRel, Acquire) {
        Ok(_) => {
          self.volatile.len.fetch_add(1, Relaxed);
          tracing::trace!(registry = %self.label(), %key, ?link, %status, "linked");
          return (Handle::new(self, key, link), true);
        }
        Err(_) => {
          self.discard(link);
          backoff.spin();
        }
      }
    }
  }

  /// Resolves `key` and claims the right to issue its create request.
  ///
  /// Returns the status the slot had before this call moved it to
  /// `Loading`: `Missing` for a new or resolved slot, or a settled status if
  /// `force` restarted it.
  fn begin(
    &self,
    key: Key,
    placeholder: Option<Placeholder<F::Resource>>,
    force: bool,
  ) -> (Handle<'_, F>, Option<Status>) {
    let addr: usize = self.placeholder_addr(placeholder);
    let (handle, linked): (Handle<'_, F>, bool) = self.acquire(key, addr, Status::Loading);

    if linked {
      return (handle, Some(Status::Missing));
    }

    let slot: &Slot = self.readonly.pool.get(handle.link().index());

    let begun: Option<Status> = slot
      .word
      .update(|word| match word.status() {
        Status::Missing => Some(word.with_status(Status::Loading)),
        Status::Ready | Status::Error if force => Some(word.with_status(Status::Loading)),
        _ => None,
      })
      .ok()
      .map(Word::status);

    (handle, begun)
  }

  /// Adds a reference through `link`, returning `false` if it is stale.
  fn try_reference(&self, link: Link) -> bool {
    let slot: &Slot = self.readonly.pool.get(link.index());

    match slot.word.reference() {
      Ok(_) if slot.is_current(link) => true,
      Ok(_) => {
        slot.word.release();
        false
      }
      Err(word) if word.is_zero() => false,
      Err(_) => raise!(Error, SysCap, "reference count saturated"),
    }
  }

  /// Returns a slot that lost the race to be linked.
  fn discard(&self, link: Link) {
    let slot: &Slot = self.readonly.pool.get(link.index());
    let backoff: Backoff = Backoff::new();

    // Resolvers holding a stale link to this slot may add a transient
    // reference; they drop it once they see the new serial.
    loop {
      let word: Word = slot.word.load(Acquire);

      if word.refcount() == 1
        && slot
          .word
          .compare_exchange(word, Word::ZERO, AcqRel, Acquire)
          .is_ok()
      {
        break;
      }

      hint::snooze(&backoff);
    }

    self.readonly.pool.free(link.index());
  }

  /// Moves a slot that could not get its create request back out of
  /// `Loading`: to `Ready` if it still owns a resource, else to `restore`.
  pub(super) fn abort_loading(&self, link: Link, restore: Status) {
    let slot: &Slot = self.readonly.pool.get(link.index());

    let _ = slot.word.update(|word| {
      if word.is_zero() || !slot.is_current(link) || word.status() != Status::Loading {
        None
      } else if word.is_owned() {
        Some(word.with_status(Status::Ready))
      } else {
        Some(word.with_status(restore))
      }
    });
  }

  /// Queues the create request of a finished load.
  pub(crate) fn complete_load(
    &self,
    key: Key,
    link: Link,
    identifier: Box<str>,
    result: Result<F::Payload, LoadError>,
  ) {
    let payload: Option<F::Payload> = match result {
      Ok(payload) => Some(payload),
      Err(error) => {
        tracing::warn!(
          registry = %self.label(),
          %key,
          identifier = &*identifier,
          %error,
          "load failed",
        );
        None
      }
    };

    let request: Request<F> = Request::Create {
      target: Target::Keyed { key, link },
      identifier,
      payload,
    };

    if let Err(request) = self.readonly.queue.push(request) {
      tracing::warn!(
        registry = %self.label(),
        %key,
        ?request,
        "request queue exhausted, completed load dropped",
      );

      self.abort_loading(link, Status::Missing);
    }
  }

  #[inline]
  pub(super) fn indexed_word(&self, index: u32) -> &AtomicWord {
    match self.readonly.indexed.as_ref() {
      Some(slots) if (index as usize) < slots.len().get() => slots.get(index as usize),
      _ => raise!(Error, BadArg, format_args!("indexed slot {index} out of range")),
    }
  }

  #[inline]
  pub(super) fn error_addr(&self) -> usize {
    self.readonly.error.as_ptr().expose_provenance()
  }

  #[inline]
  fn placeholder_addr(&self, placeholder: Option<Placeholder<F::Resource>>) -> usize {
    match placeholder {
      Some(placeholder) => placeholder.addr(),
      None => self.error_addr(),
    }
  }

  /// Returns the resource a slot word points at.
  ///
  /// # Safety
  ///
  /// `word` must be non-zero, and the caller must hold the maintenance token
  /// (or exclusive access) for `'a`, so the resource cannot be destroyed.
  #[inline]
  pub(super) unsafe fn resource<'a>(word: Word) -> &'a F::Resource {
    // SAFETY: Non-zero words always point at a live, aligned resource; the
    //         caller keeps it alive for `'a`.
    unsafe { &*ptr::with_exposed_provenance::<Aligned<F::Resource>>(word.addr()) }
  }

  /// Packs a slot word; `owned` marks a factory-built resource.
  #[inline]
  pub(super) fn pack(addr: usize, status: Status, owned: bool, refcount: u16) -> Word {
    let kind: u8 = if owned { Word::OWNED } else { 0 };

    match Word::pack(addr, status, kind, refcount) {
      Ok(word) => word,
      Err(error) => fatal!(error),
    }
  }

  /// Points `word` at a new resource, keeping its refcount.
  #[inline]
  pub(super) fn repack(word: Word, addr: usize, status: Status, owned: bool) -> Word {
    Self::pack(addr, status, owned, word.refcount())
  }
}

// SAFETY: Shared state is only mutated through atomics, the request queue,
//         and the maintenance mutex. Resources are only read and destroyed
//         by the maintenance token holder.
unsafe impl<F: Factory> Send for Registry<F> {}
// SAFETY: See above.
unsafe impl<F: Factory> Sync for Registry<F> {}

impl<F: Factory> RefUnwindSafe for Registry<F> {}
impl<F: Factory> UnwindSafe for Registry<F> {}

impl<F: Factory> Drop for Registry<F> {
  fn drop(&mut self) {
    {
      let guard: MutexGuard<'_, FlushState> = match try_lock(&self.readonly.flush) {
        Some(guard) => guard,
        None => fatal!("maintenance token alive while dropping registry"),
      };

      Maintenance::new(self, guard).shutdown();
    }

    // SAFETY: The error placeholder was leaked from a box in `build`, and no
    //         slot word points at it anymore.
    let error: Box<Aligned<F::Resource>> = unsafe { Box::from_raw(self.readonly.error.as_ptr()) };

    self.readonly.factory.destroy(error.into_inner());

    tracing::debug!(registry = %self.label(), "registry dropped");
  }
}

impl<F: Factory> Debug for Registry<F> {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("Registry")
      .field("volatile.len", &self.volatile.len)
      .field("readonly.label", &self.readonly.label)
      .field("readonly.map", &self.readonly.map)
      .field("readonly.pool", &self.readonly.pool)
      .field("readonly.indexed", &self.indexed_capacity())
      .field("readonly.queue", &self.readonly.queue)
      .field("readonly.loader", &self.readonly.loader.is_some())
      .field("readonly.error", &self.readonly.error)
      .finish()
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
