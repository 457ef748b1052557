//! Lock-free, fixed-capacity, open-addressing hash map.
//!
//! Keys are non-zero 64-bit integers; values are 64-bit words. A slot is a
//! pair of parallel atomics, `keys[i]` and `vals[i]`:
//!
//! ```text
//! keys │ 0 │ K₁ │ K₂ │ 0 │ K₃ │ 0 │ 0 │ 0 │
//! vals │ ∅ │ V₁ │ ∅  │ ∅ │ V₃ │ ∅ │ ∅ │ ∅ │
//!              ╰── derelict: key kept, value niled
//! ```
//!
//! Keys are inserted by CAS and are never removed while the table is shared,
//! which keeps linear-scan termination ("stop at the first empty key") valid
//! for every concurrent reader. Removal is expressed by niling a value; the
//! derelict key stays in place until [`HashMap::reclaim_keys`] runs with
//! exclusive access, or [`HashMap::reclaim_keys_unchecked`] runs while the
//! caller keeps every other thread out of the table.

use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::num::NonZeroUsize;

use crate::loom::sync::atomic::AtomicU64;
use crate::loom::sync::atomic::Ordering::AcqRel;
use crate::loom::sync::atomic::Ordering::Acquire;
use crate::loom::sync::atomic::Ordering::Relaxed;
use crate::loom::sync::atomic::Ordering::Release;
use crate::table::Key;
use crate::table::MapFullError;
use crate::table::hash_map::Params;
use crate::tyre::Slots;

/// Key bits of an empty slot.
const EMPTY: u64 = 0;

/// Lock-free open-addressing hash map over caller-chosen 64-bit values.
pub struct HashMap {
  keys: Slots<AtomicU64>,
  vals: Slots<AtomicU64>,
  mask: usize,
}

impl HashMap {
  /// The value of an absent or niled entry.
  pub const NUL: u64 = u64::MAX;

  /// Creates a new, empty table sized for `capacity` live entries.
  ///
  /// The number of key slots is the next power of two of `2 * capacity`,
  /// with a minimum of 8.
  #[inline]
  pub fn with_capacity(capacity: usize) -> Self {
    let params: Params = Params::new(capacity);

    Self {
      keys: Slots::from_fn(params.length, |_| AtomicU64::new(EMPTY)),
      vals: Slots::from_fn(params.length, |_| AtomicU64::new(Self::NUL)),
      mask: params.mask,
    }
  }

  /// Returns the number of key slots a table for `capacity` entries uses.
  #[inline]
  pub const fn calc_length(capacity: usize) -> usize {
    Params::new(capacity).length.get()
  }

  /// Returns the number of bytes a table for `capacity` entries allocates.
  #[inline]
  pub const fn calc_size(capacity: usize) -> usize {
    Slots::<AtomicU64>::bytes(Self::calc_length(capacity)) * 2
  }

  /// Returns the number of key slots in the table.
  #[inline]
  pub fn capacity(&self) -> usize {
    self.keys.len().get()
  }

  /// Returns the number of live (non-nil) entries.
  ///
  /// This walks the whole table and may be stale immediately after reading
  /// due to concurrent operations in other threads.
  #[inline]
  pub fn len(&self) -> usize {
    self.entries().filter(|(_, value)| value.load(Relaxed) != Self::NUL).count()
  }

  /// Returns the number of derelict keys: keys whose value is nil.
  ///
  /// Keys claimed by an insertion that has not stored its value yet are
  /// counted as well.
  #[inline]
  pub fn derelict(&self) -> usize {
    self.entries().filter(|(_, value)| value.load(Relaxed) == Self::NUL).count()
  }

  /// Returns `true` if the table holds no live entries.
  #[inline]
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Inserts `key` with `value` if the key is not present.
  ///
  /// Returns `Ok(false)` without touching the value if the key already
  /// occupies a slot, including a derelict one.
  ///
  /// # Errors
  ///
  /// Returns [`MapFullError`] if the table has no empty slot left on the
  /// scan sequence of `key`.
  #[inline]
  pub fn add(&self, key: Key, value: u64) -> Result<bool, MapFullError> {
    let (index, inserted): (usize, bool) = self.claim(key)?;

    if inserted {
      self.vals.get(index).store(value, Release);
    }

    Ok(inserted)
  }

  /// Finds or inserts `key` and returns its value cell.
  ///
  /// A freshly inserted key holds [`NUL`]. The returned reference stays
  /// valid for the lifetime of the table, so callers can keep operating on
  /// the value without probing again.
  ///
  /// [`NUL`]: Self::NUL
  ///
  /// # Errors
  ///
  /// Returns [`MapFullError`] if the table is full.
  #[inline]
  pub fn entry(&self, key: Key) -> Result<&AtomicU64, MapFullError> {
    self.claim(key).map(|(index, _)| self.vals.get(index))
  }

  /// Stores `value` under `key`, returning the previous value and the cell.
  ///
  /// # Errors
  ///
  /// Returns [`MapFullError`] if the table is full.
  #[inline]
  pub fn set(&self, key: Key, value: u64) -> Result<(u64, &AtomicU64), MapFullError> {
    let cell: &AtomicU64 = self.entry(key)?;
    let prev: u64 = cell.swap(value, AcqRel);

    Ok((prev, cell))
  }

  /// Replaces the value under `key` with `new` if it currently equals
  /// `current`, inserting the key first if needed.
  ///
  /// The inner result follows [`AtomicU64::compare_exchange`].
  ///
  /// # Errors
  ///
  /// Returns [`MapFullError`] if the table is full.
  #[inline]
  #[allow(clippy::type_complexity)]
  pub fn cas(
    &self,
    key: Key,
    current: u64,
    new: u64,
  ) -> Result<(Result<u64, u64>, &AtomicU64), MapFullError> {
    let cell: &AtomicU64 = self.entry(key)?;
    let result: Result<u64, u64> = cell.compare_exchange(current, new, AcqRel, Acquire);

    Ok((result, cell))
  }

  /// Returns the value stored under `key`, or [`NUL`] if absent.
  ///
  /// [`NUL`]: Self::NUL
  #[inline]
  pub fn get(&self, key: Key) -> u64 {
    let bits: u64 = key.get();

    for index in self.scan(key) {
      match self.keys.get(index).load(Acquire) {
        EMPTY => return Self::NUL,
        found if found == bits => return self.vals.get(index).load(Acquire),
        _ => {}
      }
    }

    Self::NUL
  }

  /// Returns a best-effort iterator over occupied key slots and their value
  /// cells, derelict keys included.
  #[inline]
  pub fn entries(&self) -> impl Iterator<Item = (Key, &AtomicU64)> + '_ {
    self
      .keys
      .as_slice()
      .iter()
      .zip(self.vals.as_slice())
      .filter_map(|(key, value)| Key::new(key.load(Acquire)).map(|key| (key, value)))
  }

  // ---------------------------------------------------------------------------
  // Exclusive Operations
  // ---------------------------------------------------------------------------

  /// Removes every derelict key, rehashing collided successors so that every
  /// remaining key stays reachable from its home slot.
  ///
  /// Returns the number of keys removed.
  pub fn reclaim_keys(&mut self) -> usize {
    // SAFETY: `&mut self` rules out every other access to the table.
    unsafe { self.reclaim_keys_unchecked() }
  }

  /// Shared-reference form of [`reclaim_keys`].
  ///
  /// # Safety
  ///
  /// No other thread may access the table, and no value cell returned by
  /// [`entry`], [`set`], or [`cas`] may be used, until this call returns.
  ///
  /// [`reclaim_keys`]: Self::reclaim_keys
  /// [`entry`]: Self::entry
  /// [`set`]: Self::set
  /// [`cas`]: Self::cas
  pub unsafe fn reclaim_keys_unchecked(&self) -> usize {
    let mut total: usize = 0;

    // A backward shift can move a derelict key into an already visited slot
    // when a cluster wraps around the end of the table; sweep until stable.
    loop {
      let mut removed: usize = 0;

      for index in 0..self.capacity() {
        while self.key_at(index) != EMPTY && self.val_at(index) == Self::NUL {
          self.delete(index);
          removed += 1;
        }
      }

      if removed == 0 {
        break total;
      }

      total += removed;
    }
  }

  /// Moves every live entry into `target` and clears `self`.
  ///
  /// Returns the number of entries moved.
  ///
  /// # Errors
  ///
  /// Returns [`MapFullError`] if `target` cannot hold the entries; entries
  /// moved before the failure stay in `target` and `self` is left untouched.
  pub fn migrate(&mut self, target: &mut HashMap) -> Result<usize, MapFullError> {
    let mut moved: usize = 0;

    for index in 0..self.capacity() {
      let Some(key) = Key::new(self.key_at(index)) else {
        continue;
      };

      let value: u64 = self.val_at(index);

      if value != Self::NUL {
        target.set(key, value)?;
        moved += 1;
      }
    }

    self.clear();

    Ok(moved)
  }

  /// Removes every key and value.
  pub fn clear(&mut self) {
    for index in 0..self.capacity() {
      self.keys.get(index).store(EMPTY, Relaxed);
      self.vals.get(index).store(Self::NUL, Relaxed);
    }
  }

  // ---------------------------------------------------------------------------
  // Internals
  // ---------------------------------------------------------------------------

  /// Returns the scan sequence of `key`: every slot once, starting at home.
  #[inline]
  fn scan(&self, key: Key) -> impl Iterator<Item = usize> + use<> {
    let mask: usize = self.mask;
    let home: usize = self.home(key.get());

    (0..=mask).map(move |step| (home + step) & mask)
  }

  #[inline]
  const fn home(&self, bits: u64) -> usize {
    bits as usize & self.mask
  }

  /// Finds the slot of `key`, claiming an empty one if the key is absent.
  ///
  /// Returns the slot index and whether this call inserted the key.
  fn claim(&self, key: Key) -> Result<(usize, bool), MapFullError> {
    let bits: u64 = key.get();

    for index in self.scan(key) {
      let slot: &AtomicU64 = self.keys.get(index);
      let mut found: u64 = slot.load(Acquire);

      if found == EMPTY {
        match slot.compare_exchange(EMPTY, bits, AcqRel, Acquire) {
          Ok(_) => return Ok((index, true)),
          Err(actual) => found = actual,
        }
      }

      // Another thread may have claimed this slot for the same key.
      if found == bits {
        return Ok((index, false));
      }
    }

    Err(MapFullError)
  }

  #[inline]
  fn key_at(&self, index: usize) -> u64 {
    self.keys.get(index).load(Relaxed)
  }

  #[inline]
  fn val_at(&self, index: usize) -> u64 {
    self.vals.get(index).load(Relaxed)
  }

  /// Empties slot `hole` and shifts back the successors that would otherwise
  /// become unreachable (Knuth, Algorithm R).
  fn delete(&self, mut hole: usize) {
    self.keys.get(hole).store(EMPTY, Relaxed);
    self.vals.get(hole).store(Self::NUL, Relaxed);

    let mut index: usize = hole;

    loop {
      index = (index + 1) & self.mask;

      let bits: u64 = self.key_at(index);

      if bits == EMPTY {
        break;
      }

      let home: usize = self.home(bits);

      // The entry stays put if its home lies cyclically within (hole, index].
      let reachable: bool = if hole <= index {
        hole < home && home <= index
      } else {
        hole < home || home <= index
      };

      if reachable {
        continue;
      }

      self.keys.get(hole).store(bits, Relaxed);
      self.vals.get(hole).store(self.val_at(index), Relaxed);
      self.keys.get(index).store(EMPTY, Relaxed);
      self.vals.get(index).store(Self::NUL, Relaxed);

      hole = index;
    }
  }
}

impl Debug for HashMap {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("HashMap")
      .field("keys", &self.keys.as_ptr())
      .field("vals", &self.vals.as_ptr())
      .field("capacity", &self.capacity())
      .finish()
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
