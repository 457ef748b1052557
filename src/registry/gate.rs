//! Admission gate between lookup-table readers and key compaction.
//!
//! Resolvers pin the gate for as long as they scan or hold a value cell of
//! the lookup table. The maintenance token holder compacts the table only if
//! it can close the gate while no reader is pinned; readers that arrive
//! during a compaction spin until it is over.
//!
//! ```text
//!  31          30                                0
//! ┌───────────┬──────────────────────────────────┐
//! │  closed   │          pinned readers          │
//! └───────────┴──────────────────────────────────┘
//! ```

use crossbeam_utils::Backoff;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;

use crate::loom::hint;
use crate::loom::sync::atomic::AtomicU32;
use crate::loom::sync::atomic::Ordering::Acquire;
use crate::loom::sync::atomic::Ordering::Relaxed;
use crate::loom::sync::atomic::Ordering::Release;

const CLOSED: u32 = 1 << 31;

pub(crate) struct Gate {
  state: AtomicU32,
}

impl Gate {
  #[inline]
  pub(crate) fn new() -> Self {
    Self {
      state: AtomicU32::new(0),
    }
  }

  /// Pins the gate as a reader, waiting out a running compaction.
  #[inline]
  pub(crate) fn pin(&self) -> Pinned<'_> {
    let backoff: Backoff = Backoff::new();

    loop {
      if self.state.fetch_add(1, Acquire) & CLOSED == 0 {
        return Pinned { gate: self };
      }

      self.state.fetch_sub(1, Relaxed);
      hint::snooze(&backoff);
    }
  }

  /// Closes the gate if no reader is pinned.
  ///
  /// The gate reopens when the returned guard is dropped.
  #[inline]
  pub(crate) fn try_close(&self) -> Option<Closed<'_>> {
    self
      .state
      .compare_exchange(0, CLOSED, Acquire, Relaxed)
      .ok()
      .map(|_| Closed { gate: self })
  }

  /// Returns the number of pinned readers.
  #[inline]
  pub(crate) fn readers(&self) -> u32 {
    self.state.load(Relaxed) & !CLOSED
  }
}

impl Debug for Gate {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    let state: u32 = self.state.load(Relaxed);

    f.debug_struct("Gate")
      .field("closed", &(state & CLOSED != 0))
      .field("readers", &(state & !CLOSED))
      .finish()
  }
}

/// A reader pin; see [`Gate::pin`].
#[must_use]
pub(crate) struct Pinned<'a> {
  gate: &'a Gate,
}

impl Drop for Pinned<'_> {
  #[inline]
  fn drop(&mut self) {
    self.gate.state.fetch_sub(1, Release);
  }
}

/// Exclusive access to the lookup table; see [`Gate::try_close`].
#[must_use]
pub(crate) struct Closed<'a> {
  gate: &'a Gate,
}

impl Drop for Closed<'_> {
  #[inline]
  fn drop(&mut self) {
    self.gate.state.fetch_sub(CLOSED, Release);
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use std::sync::atomic::AtomicBool;
  use std::sync::atomic::Ordering::SeqCst;
  use std::thread;

  use super::*;

  #[test]
  fn test_close_requires_no_readers() {
    let gate: Gate = Gate::new();
    let pinned: Pinned<'_> = gate.pin();

    assert_eq!(gate.readers(), 1);
    assert!(gate.try_close().is_none());

    drop(pinned);

    assert_eq!(gate.readers(), 0);
    assert!(gate.try_close().is_some());
    assert!(gate.try_close().is_some());
  }

  #[test]
  fn test_closed_gate_excludes_second_close() {
    let gate: Gate = Gate::new();
    let closed: Closed<'_> = gate.try_close().unwrap();

    assert!(gate.try_close().is_none());

    drop(closed);

    let _pinned: Pinned<'_> = gate.pin();
  }

  #[test]
  fn test_reader_waits_for_compaction() {
    let gate: Gate = Gate::new();
    let compacting: AtomicBool = AtomicBool::new(true);
    let closed: Closed<'_> = gate.try_close().unwrap();

    thread::scope(|scope| {
      let reader = scope.spawn(|| {
        let _pinned: Pinned<'_> = gate.pin();
        compacting.load(SeqCst)
      });

      compacting.store(false, SeqCst);
      drop(closed);

      assert!(!reader.join().unwrap(), "Reader entered a closed gate!");
    });

    assert_eq!(gate.readers(), 0);
  }
}
