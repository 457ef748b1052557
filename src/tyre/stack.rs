use crossbeam_utils::Backoff;
use crossbeam_utils::CachePadded;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::num::NonZeroUsize;

use crate::loom::sync::atomic::AtomicU32;
use crate::loom::sync::atomic::AtomicU64;
use crate::loom::sync::atomic::Ordering::AcqRel;
use crate::loom::sync::atomic::Ordering::Acquire;
use crate::loom::sync::atomic::Ordering::Relaxed;
use crate::loom::sync::atomic::Ordering::Release;
use crate::tyre::Slots;

/// Marker for "no next node" in a chain of links.
pub(crate) const NIL: u32 = u32::MAX;

const TAG_SHIFT: u32 = 32;
const IDX_MASK: u64 = u32::MAX as u64;

#[inline]
const fn head_pack(tag: u32, index: u32) -> u64 {
  ((tag as u64) << TAG_SHIFT) | index as u64
}

#[inline]
const fn head_tag(head: u64) -> u32 {
  (head >> TAG_SHIFT) as u32
}

#[inline]
const fn head_index(head: u64) -> u32 {
  (head & IDX_MASK) as u32
}

// -----------------------------------------------------------------------------
// Links
// -----------------------------------------------------------------------------

/// Intrusive "next" pointers shared by every [`Stack`] over the same nodes.
///
/// A node index belongs to at most one stack at a time, so a single array of
/// links serves the free list and the request queues alike.
pub(crate) struct Links {
  next: Slots<AtomicU32>,
}

impl Links {
  #[inline]
  pub(crate) fn new(len: NonZeroUsize) -> Self {
    debug_assert!(len.get() < NIL as usize, "too many nodes for a link chain");

    Self {
      next: Slots::from_fn(len, |_| AtomicU32::new(NIL)),
    }
  }

  /// Returns the number of bytes allocated for `len` links.
  #[inline]
  pub(crate) const fn bytes(len: usize) -> usize {
    Slots::<AtomicU32>::bytes(len)
  }

  #[inline]
  pub(crate) fn len(&self) -> usize {
    self.next.len().get()
  }

  #[inline]
  fn get(&self, index: u32) -> u32 {
    self.next.get(index as usize).load(Relaxed)
  }

  #[inline]
  fn set(&self, index: u32, next: u32) {
    self.next.get(index as usize).store(next, Relaxed);
  }
}

// -----------------------------------------------------------------------------
// Stack
// -----------------------------------------------------------------------------

/// A lock-free LIFO of node indices.
///
/// The head packs a 32-bit modification tag next to the top index, so a
/// node that is popped and pushed back between another thread's load and
/// CAS cannot be mistaken for an unchanged head.
pub(crate) struct Stack {
  head: CachePadded<AtomicU64>,
}

impl Stack {
  /// Creates an empty stack.
  #[inline]
  pub(crate) fn new() -> Self {
    Self {
      head: CachePadded::new(AtomicU64::new(head_pack(0, NIL))),
    }
  }

  /// Creates a stack holding every node of `links`, lowest index on top.
  ///
  /// Must only be called while no other stack shares `links`.
  #[inline]
  pub(crate) fn with_all(links: &Links) -> Self {
    let len: u32 = links.len() as u32;

    for index in 0..len {
      links.set(index, if index + 1 < len { index + 1 } else { NIL });
    }

    Self {
      head: CachePadded::new(AtomicU64::new(head_pack(0, 0))),
    }
  }

  /// Returns `true` if the stack held no nodes at the time of the call.
  #[inline]
  pub(crate) fn is_empty(&self) -> bool {
    head_index(self.head.load(Acquire)) == NIL
  }

  /// Pushes `index`, which the caller must exclusively own.
  #[inline]
  pub(crate) fn push(&self, links: &Links, index: u32) {
    let backoff: Backoff = Backoff::new();
    let mut head: u64 = self.head.load(Relaxed);

    loop {
      links.set(index, head_index(head));

      let next: u64 = head_pack(head_tag(head).wrapping_add(1), index);

      match self
        .head
        .compare_exchange_weak(head, next, Release, Relaxed)
      {
        Ok(_) => return,
        Err(current) => {
          head = current;
          backoff.spin();
        }
      }
    }
  }

  /// Pops the top index, transferring its ownership to the caller.
  #[inline]
  pub(crate) fn pop(&self, links: &Links) -> Option<u32> {
    let backoff: Backoff = Backoff::new();
    let mut head: u64 = self.head.load(Acquire);

    loop {
      let index: u32 = head_index(head);

      if index == NIL {
        return None;
      }

      // This may read a link that is concurrently rewritten; the tag makes
      // the CAS below fail in that case.
      let next: u64 = head_pack(head_tag(head).wrapping_add(1), links.get(index));

      match self
        .head
        .compare_exchange_weak(head, next, Acquire, Acquire)
      {
        Ok(_) => return Some(index),
        Err(current) => {
          head = current;
          backoff.spin();
        }
      }
    }
  }

  /// Detaches every node at once, returning them in LIFO order.
  #[inline]
  pub(crate) fn take<'a>(&self, links: &'a Links) -> Chain<'a> {
    let backoff: Backoff = Backoff::new();
    let mut head: u64 = self.head.load(Relaxed);

    loop {
      if head_index(head) == NIL {
        return Chain::new(links, NIL);
      }

      let next: u64 = head_pack(head_tag(head).wrapping_add(1), NIL);

      match self.head.compare_exchange_weak(head, next, AcqRel, Relaxed) {
        Ok(_) => return Chain::new(links, head_index(head)),
        Err(current) => {
          head = current;
          backoff.spin();
        }
      }
    }
  }
}

impl Debug for Stack {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    let head: u64 = self.head.load(Relaxed);

    f.debug_struct("Stack")
      .field("tag", &head_tag(head))
      .field("top", &head_index(head))
      .finish()
  }
}

// -----------------------------------------------------------------------------
// Chain
// -----------------------------------------------------------------------------

/// A detached run of nodes, exclusively owned by whoever called [`Stack::take`].
///
/// The iterator reads a node's successor before yielding it, so yielded
/// indices may be pushed onto another stack right away.
pub(crate) struct Chain<'a> {
  links: &'a Links,
  cursor: u32,
}

impl<'a> Chain<'a> {
  #[inline]
  const fn new(links: &'a Links, cursor: u32) -> Self {
    Self { links, cursor }
  }
}

impl Iterator for Chain<'_> {
  type Item = u32;

  #[inline]
  fn next(&mut self) -> Option<Self::Item> {
    if self.cursor == NIL {
      return None;
    }

    let index: u32 = self.cursor;

    self.cursor = self.links.get(index);

    Some(index)
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
