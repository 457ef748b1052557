//! The fixed arena of registry slots.
//!
//! Hash-map values are [`Link`]s into this arena rather than pointers, so a
//! slot can be reclaimed and reused without invalidating the table. Every
//! allocation bumps the slot's serial; a link whose serial no longer matches
//! is stale and must not be followed.

use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::num::NonZeroUsize;

use crate::loom::sync::atomic::AtomicU32;
use crate::loom::sync::atomic::AtomicU64;
use crate::loom::sync::atomic::Ordering::Acquire;
use crate::loom::sync::atomic::Ordering::Relaxed;
use crate::loom::sync::atomic::Ordering::Release;
use crate::registry::AtomicWord;
use crate::table::HashMap;
use crate::table::Key;
use crate::tyre::Links;
use crate::tyre::Slots;
use crate::tyre::Stack;

// -----------------------------------------------------------------------------
// Link
// -----------------------------------------------------------------------------

/// A serial-tagged slot index, stored as a hash-map value.
#[derive(Clone, Copy, Hash, PartialEq, Eq)]
pub(crate) struct Link {
  bits: u64,
}

impl Link {
  #[inline]
  pub(crate) const fn new(serial: u32, index: u32) -> Self {
    Self {
      bits: ((serial as u64) << 32) | index as u64,
    }
  }

  /// Decodes a hash-map value, returning `None` for [`HashMap::NUL`].
  #[inline]
  pub(crate) const fn from_bits(bits: u64) -> Option<Self> {
    if bits == HashMap::NUL {
      None
    } else {
      Some(Self { bits })
    }
  }

  #[inline]
  pub(crate) const fn into_bits(self) -> u64 {
    self.bits
  }

  #[inline]
  pub(crate) const fn serial(self) -> u32 {
    (self.bits >> 32) as u32
  }

  #[inline]
  pub(crate) const fn index(self) -> u32 {
    self.bits as u32
  }
}

impl Debug for Link {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    write!(f, "Link({}#{})", self.index(), self.serial())
  }
}

// -----------------------------------------------------------------------------
// Slot
// -----------------------------------------------------------------------------

/// One arena entry.
pub(crate) struct Slot {
  pub(crate) word: AtomicWord,
  key: AtomicU64,
  serial: AtomicU32,
}

impl Slot {
  #[inline]
  fn new() -> Self {
    Self {
      word: AtomicWord::zero(),
      key: AtomicU64::new(0),
      serial: AtomicU32::new(0),
    }
  }

  /// Returns the key the slot was last allocated for.
  #[inline]
  pub(crate) fn key(&self) -> Option<Key> {
    Key::new(self.key.load(Relaxed))
  }

  #[inline]
  pub(crate) fn serial(&self) -> u32 {
    self.serial.load(Acquire)
  }

  /// Returns `true` if `link` still refers to the current allocation.
  #[inline]
  pub(crate) fn is_current(&self, link: Link) -> bool {
    self.serial() == link.serial()
  }
}

// -----------------------------------------------------------------------------
// Slot Pool
// -----------------------------------------------------------------------------

/// Fixed-capacity slot allocator with a lock-free free list.
pub(crate) struct SlotPool {
  slots: Slots<Slot>,
  links: Links,
  free: Stack,
}

impl SlotPool {
  pub(crate) fn new(capacity: NonZeroUsize) -> Self {
    let slots: Slots<Slot> = Slots::from_fn(capacity, |_| Slot::new());
    let links: Links = Links::new(capacity);
    let free: Stack = Stack::with_all(&links);

    Self { slots, links, free }
  }

  /// Returns the number of bytes allocated for `capacity` slots.
  #[inline]
  pub(crate) const fn bytes(capacity: usize) -> usize {
    Slots::<Slot>::bytes(capacity) + Links::bytes(capacity)
  }

  #[inline]
  pub(crate) fn capacity(&self) -> usize {
    self.slots.len().get()
  }

  #[inline]
  pub(crate) fn get(&self, index: u32) -> &Slot {
    self.slots.get(index as usize)
  }

  /// Iterates over every slot in the arena.
  #[inline]
  pub(crate) fn iter(&self) -> impl Iterator<Item = &Slot> {
    self.slots.as_slice().iter()
  }

  /// Takes a slot off the free list and starts a new allocation for `key`.
  ///
  /// The caller must publish the slot's word before linking it.
  #[inline]
  pub(crate) fn alloc(&self, key: Key) -> Option<Link> {
    let index: u32 = self.free.pop(&self.links)?;
    let slot: &Slot = self.get(index);

    // Relaxed increment: the word store that publishes the slot is Release.
    let serial: u32 = slot.serial.fetch_add(1, Relaxed).wrapping_add(1);

    slot.key.store(key.get(), Relaxed);

    Some(Link::new(serial, index))
  }

  /// Returns a slot to the free list.
  ///
  /// The slot's word must already be [`Word::ZERO`].
  ///
  /// [`Word::ZERO`]: crate::registry::Word::ZERO
  #[inline]
  pub(crate) fn free(&self, index: u32) {
    debug_assert!(
      self.get(index).word.load(Acquire).is_zero(),
      "SlotPool::free requires a reclaimed slot",
    );

    self.get(index).key.store(0, Release);
    self.free.push(&self.links, index);
  }
}

impl Debug for SlotPool {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("SlotPool")
      .field("capacity", &self.capacity())
      .field("free", &self.free)
      .finish()
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
