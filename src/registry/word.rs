//! The packed slot word.
//!
//! Every registry slot is described by a single 64-bit word so that pointer,
//! status, and reference count change together under one CAS:
//!
//! ```text
//! 63        52 51    48 47                                   4 3      0
//! ┌───────────┬────────┬──────────────────────────────────────┬────────┐
//! │ refcount  │  kind  │         address (16-byte aligned)    │ status │
//! └───────────┴────────┴──────────────────────────────────────┴────────┘
//! ```
//!
//! The status occupies the low bits of the address, which are always zero
//! for a 16-byte aligned pointer. A refcount of `0xFFF` is never stored, so
//! adding one unit at bit 52 of the whole word cannot carry out of the
//! field. The all-zero word marks a reclaimed slot.
//!
//! Bit 0 of the kind is the [`Word::OWNED`] flag: the address points at a
//! factory-built resource that the slot owns and must hand back for
//! destruction. Placeholders are never owned.
//!
//! This module is the only place that knows the bit layout; the rest of the
//! crate goes through the typed accessors of [`Word`].

use crossbeam_utils::Backoff;
use std::error::Error;
use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;

use crate::error::fatal;
use crate::loom::sync::atomic::AtomicU64;
use crate::loom::sync::atomic::Ordering;
use crate::loom::sync::atomic::Ordering::AcqRel;
use crate::loom::sync::atomic::Ordering::Acquire;
use crate::registry::Status;

const STATUS_MASK: u64 = (1 << Status::BITS) - 1;

const ADDR_BITS: u32 = 48;
const ADDR_MASK: u64 = ((1 << ADDR_BITS) - 1) & !STATUS_MASK;

const KIND_SHIFT: u32 = ADDR_BITS;
const KIND_BITS: u32 = 4;
const KIND_MASK: u64 = (1 << KIND_BITS) - 1;

const REFCOUNT_SHIFT: u32 = KIND_SHIFT + KIND_BITS;
const REFCOUNT_UNIT: u64 = 1 << REFCOUNT_SHIFT;

// -----------------------------------------------------------------------------
// Pack Error
// -----------------------------------------------------------------------------

/// Error returned when a field does not fit its slot-word bit width.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum PackError {
  /// The address is null.
  Null,
  /// The address is not aligned to [`Word::ALIGN`] bytes.
  Misaligned,
  /// The address does not fit in 48 bits.
  AddressRange,
  /// The kind does not fit in 4 bits.
  Kind,
  /// The refcount exceeds [`Word::MAX_REFCOUNT`].
  Refcount,
}

impl Display for PackError {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.write_str(match self {
      Self::Null => "null resource address",
      Self::Misaligned => "resource address is not 16-byte aligned",
      Self::AddressRange => "resource address exceeds 48 bits",
      Self::Kind => "resource kind exceeds 4 bits",
      Self::Refcount => "reference count exceeds the maximum",
    })
  }
}

impl Error for PackError {}

// -----------------------------------------------------------------------------
// Word
// -----------------------------------------------------------------------------

/// A decoded view of a slot word.
#[derive(Clone, Copy, Hash, PartialEq, Eq)]
#[repr(transparent)]
pub struct Word {
  bits: u64,
}

impl Word {
  /// The reclaimed-slot sentinel.
  pub const ZERO: Self = Self { bits: 0 };

  /// Required alignment of a packed address.
  pub const ALIGN: usize = 1 << Status::BITS;

  /// Largest storable reference count; `0xFFF` is reserved.
  pub const MAX_REFCOUNT: u16 = 0xFFE;

  /// Largest storable resource kind.
  pub const MAX_KIND: u8 = KIND_MASK as u8;

  /// Kind flag of a word that owns its resource.
  pub const OWNED: u8 = 0b0001;

  /// Packs the given fields into a word, validating each field's width.
  ///
  /// # Errors
  ///
  /// Returns a [`PackError`] naming the first field that does not fit.
  #[inline]
  pub const fn pack(addr: usize, status: Status, kind: u8, refcount: u16) -> Result<Self, PackError> {
    let addr: u64 = match Self::check_addr(addr) {
      Ok(addr) => addr,
      Err(error) => return Err(error),
    };

    if kind > Self::MAX_KIND {
      return Err(PackError::Kind);
    }

    if refcount > Self::MAX_REFCOUNT {
      return Err(PackError::Refcount);
    }

    Ok(Self {
      bits: ((refcount as u64) << REFCOUNT_SHIFT)
        | ((kind as u64) << KIND_SHIFT)
        | addr
        | status.into_bits() as u64,
    })
  }

  /// Replaces the address and status, keeping the kind and refcount.
  ///
  /// # Errors
  ///
  /// Returns a [`PackError`] if `addr` cannot be packed.
  #[inline]
  pub const fn repack(self, addr: usize, status: Status) -> Result<Self, PackError> {
    let addr: u64 = match Self::check_addr(addr) {
      Ok(addr) => addr,
      Err(error) => return Err(error),
    };

    let keep: u64 = self.bits & !(ADDR_MASK | STATUS_MASK);

    Ok(Self {
      bits: keep | addr | status.into_bits() as u64,
    })
  }

  /// Replaces the status, keeping every other field.
  #[inline]
  pub const fn with_status(self, status: Status) -> Self {
    Self {
      bits: (self.bits & !STATUS_MASK) | status.into_bits() as u64,
    }
  }

  /// Adds one reference, or returns `None` if the count is saturated.
  #[inline]
  pub const fn reference(self) -> Option<Self> {
    if self.refcount() >= Self::MAX_REFCOUNT {
      None
    } else {
      Some(Self {
        bits: self.bits + REFCOUNT_UNIT,
      })
    }
  }

  /// Removes one reference, or returns `None` if the count is zero.
  #[inline]
  pub const fn release(self) -> Option<Self> {
    if self.refcount() == 0 {
      None
    } else {
      Some(Self {
        bits: self.bits - REFCOUNT_UNIT,
      })
    }
  }

  /// Returns `true` if this is the reclaimed-slot sentinel.
  #[inline]
  pub const fn is_zero(self) -> bool {
    self.bits == 0
  }

  /// Returns the packed resource address.
  #[inline]
  pub const fn addr(self) -> usize {
    (self.bits & ADDR_MASK) as usize
  }

  /// Returns the slot status.
  #[inline]
  pub fn status(self) -> Status {
    match Status::from_bits((self.bits & STATUS_MASK) as u8) {
      Some(status) => status,
      None => fatal!(format_args!("corrupt status bits in {self:?}")),
    }
  }

  /// Returns the reserved resource kind.
  #[inline]
  pub const fn kind(self) -> u8 {
    ((self.bits >> KIND_SHIFT) & KIND_MASK) as u8
  }

  /// Returns `true` if the address is a resource owned by the slot.
  #[inline]
  pub const fn is_owned(self) -> bool {
    self.kind() & Self::OWNED != 0
  }

  /// Returns the reference count.
  #[inline]
  pub const fn refcount(self) -> u16 {
    (self.bits >> REFCOUNT_SHIFT) as u16
  }

  /// Returns the raw word.
  #[inline]
  pub const fn into_bits(self) -> u64 {
    self.bits
  }

  #[inline]
  const fn from_bits(bits: u64) -> Self {
    Self { bits }
  }

  #[inline]
  const fn check_addr(addr: usize) -> Result<u64, PackError> {
    let addr: u64 = addr as u64;

    if addr == 0 {
      Err(PackError::Null)
    } else if addr & STATUS_MASK != 0 {
      Err(PackError::Misaligned)
    } else if addr & !ADDR_MASK != 0 {
      Err(PackError::AddressRange)
    } else {
      Ok(addr)
    }
  }
}

impl Debug for Word {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    if self.is_zero() {
      return f.write_str("Word(ZERO)");
    }

    f.debug_struct("Word")
      .field("addr", &format_args!("{:#x}", self.addr()))
      .field("status", &(self.bits & STATUS_MASK))
      .field("kind", &self.kind())
      .field("refcount", &self.refcount())
      .finish()
  }
}

// -----------------------------------------------------------------------------
// Atomic Word
// -----------------------------------------------------------------------------

/// A slot word shared between threads.
///
/// Any thread may change the refcount; pointer and status changes are made
/// by the maintenance token holder. Both go through CAS on the same word, so
/// a refcount update that races with a repack simply retries.
#[repr(transparent)]
pub struct AtomicWord {
  bits: AtomicU64,
}

impl AtomicWord {
  /// Creates a new atomic word.
  #[inline]
  pub fn new(word: Word) -> Self {
    Self {
      bits: AtomicU64::new(word.into_bits()),
    }
  }

  /// Creates a new atomic word holding [`Word::ZERO`].
  #[inline]
  pub fn zero() -> Self {
    Self::new(Word::ZERO)
  }

  /// Loads the current word.
  #[inline]
  pub fn load(&self, order: Ordering) -> Word {
    Word::from_bits(self.bits.load(order))
  }

  /// Stores `word` unconditionally.
  #[inline]
  pub fn store(&self, word: Word, order: Ordering) {
    self.bits.store(word.into_bits(), order);
  }

  /// Stores `new` if the current word equals `current`.
  ///
  /// # Errors
  ///
  /// Returns the actual word if it did not equal `current`.
  #[inline]
  pub fn compare_exchange(
    &self,
    current: Word,
    new: Word,
    success: Ordering,
    failure: Ordering,
  ) -> Result<Word, Word> {
    self
      .bits
      .compare_exchange(current.into_bits(), new.into_bits(), success, failure)
      .map(Word::from_bits)
      .map_err(Word::from_bits)
  }

  /// Applies `f` in a CAS loop until it wins or `f` returns `None`.
  ///
  /// Returns the previous word on success.
  ///
  /// # Errors
  ///
  /// Returns the word `f` declined to update.
  #[inline]
  pub fn update<F>(&self, mut f: F) -> Result<Word, Word>
  where
    F: FnMut(Word) -> Option<Word>,
  {
    let backoff: Backoff = Backoff::new();
    let mut current: Word = self.load(Acquire);

    loop {
      let Some(next) = f(current) else {
        return Err(current);
      };

      match self.compare_exchange(current, next, AcqRel, Acquire) {
        Ok(prev) => return Ok(prev),
        Err(actual) => {
          current = actual;
          backoff.spin();
        }
      }
    }
  }

  /// Adds one reference to a live word.
  ///
  /// # Errors
  ///
  /// Returns the current word unchanged if it is [`Word::ZERO`] (the slot
  /// was reclaimed) or its refcount is saturated.
  #[inline]
  pub fn reference(&self) -> Result<Word, Word> {
    self.update(|word| if word.is_zero() { None } else { word.reference() })
  }

  /// Removes one reference, returning the previous word.
  ///
  /// Releasing a reclaimed or unreferenced word aborts the process; it can
  /// only happen if a reference was released twice.
  #[inline]
  pub fn release(&self) -> Word {
    match self.update(Word::release) {
      Ok(prev) => prev,
      Err(word) if word.is_zero() => fatal!("released a reference to a reclaimed slot"),
      Err(word) => fatal!(format_args!("reference count underflow in {word:?}")),
    }
  }
}

impl Debug for AtomicWord {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    Debug::fmt(&self.load(Acquire), f)
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use std::sync::Arc;
  use std::thread;

  use super::*;

  const ADDR: usize = 0x7F12_3456_7890;

  #[test]
  fn test_pack_fields() {
    let word: Word = Word::pack(ADDR, Status::Loading, 9, 42).unwrap();

    assert_eq!(word.addr(), ADDR);
    assert_eq!(word.status(), Status::Loading);
    assert_eq!(word.kind(), 9);
    assert_eq!(word.refcount(), 42);
    assert!(!word.is_zero());
  }

  #[test]
  fn test_pack_validates_widths() {
    assert_eq!(Word::pack(0, Status::Missing, 0, 0), Err(PackError::Null));
    assert_eq!(Word::pack(ADDR + 8, Status::Missing, 0, 0), Err(PackError::Misaligned));
    assert_eq!(Word::pack(1 << 48, Status::Missing, 0, 0), Err(PackError::AddressRange));
    assert_eq!(Word::pack(ADDR, Status::Missing, 16, 0), Err(PackError::Kind));
    assert_eq!(Word::pack(ADDR, Status::Missing, 0, 0xFFF), Err(PackError::Refcount));
    assert!(Word::pack(ADDR, Status::Missing, 15, Word::MAX_REFCOUNT).is_ok());
  }

  #[test]
  fn test_repack_keeps_kind_and_refcount() {
    let word: Word = Word::pack(ADDR, Status::Loading, 3, 7).unwrap();
    let next: Word = word.repack(0x1000, Status::Ready).unwrap();

    assert_eq!(next.addr(), 0x1000);
    assert_eq!(next.status(), Status::Ready);
    assert_eq!(next.kind(), 3);
    assert_eq!(next.refcount(), 7);

    assert_eq!(word.repack(0x1001, Status::Ready), Err(PackError::Misaligned));
  }

  #[test]
  fn test_with_status_keeps_ownership() {
    let word: Word = Word::pack(ADDR, Status::Ready, Word::OWNED, 2).unwrap();
    let next: Word = word.with_status(Status::Loading);

    assert_eq!(next.status(), Status::Loading);
    assert_eq!(next.addr(), ADDR);
    assert_eq!(next.refcount(), 2);
    assert!(next.is_owned());
    assert!(!Word::pack(ADDR, Status::Ready, 0, 2).unwrap().is_owned());
  }

  #[test]
  fn test_reference_saturates() {
    let word: Word = Word::pack(ADDR, Status::Ready, 15, Word::MAX_REFCOUNT - 1).unwrap();
    let full: Word = word.reference().unwrap();

    assert_eq!(full.refcount(), Word::MAX_REFCOUNT);
    assert_eq!(full.kind(), 15);
    assert_eq!(full.reference(), None);
  }

  #[test]
  fn test_release_underflow() {
    let word: Word = Word::pack(ADDR, Status::Ready, 0, 1).unwrap();
    let idle: Word = word.release().unwrap();

    assert_eq!(idle.refcount(), 0);
    assert_eq!(idle.addr(), ADDR);
    assert_eq!(idle.status(), Status::Ready);
    assert_eq!(idle.release(), None);
  }

  #[test]
  fn test_atomic_reference_rejects_zero() {
    let atomic: AtomicWord = AtomicWord::zero();

    assert_eq!(atomic.reference(), Err(Word::ZERO));
    assert!(atomic.load(Acquire).is_zero());
  }

  #[test]
  fn test_atomic_update_declined() {
    let word: Word = Word::pack(ADDR, Status::Missing, 0, 1).unwrap();
    let atomic: AtomicWord = AtomicWord::new(word);

    assert_eq!(atomic.update(|_| None), Err(word));
    assert_eq!(atomic.load(Acquire), word);
  }

  #[test]
  fn test_concurrent_reference_release() {
    const THREADS: usize = 4;
    const ROUNDS: usize = 500;

    let word: Word = Word::pack(ADDR, Status::Ready, 0, 1).unwrap();
    let atomic: Arc<AtomicWord> = Arc::new(AtomicWord::new(word));

    let handles: Vec<_> = (0..THREADS)
      .map(|index| {
        let atomic: Arc<AtomicWord> = Arc::clone(&atomic);

        thread::spawn(move || {
          for round in 0..ROUNDS {
            atomic.reference().unwrap();

            // Interleave pointer changes with refcount changes.
            if index == 0 && round % 10 == 0 {
              let status: Status = if round % 20 == 0 { Status::Error } else { Status::Ready };
              atomic.update(|word| word.repack(ADDR, status).ok()).unwrap();
            }

            atomic.release();
          }
        })
      })
      .collect();

    for handle in handles {
      handle.join().unwrap();
    }

    let last: Word = atomic.load(Acquire);

    assert_eq!(last.refcount(), 1);
    assert_eq!(last.addr(), ADDR);
  }
}
