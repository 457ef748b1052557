#[cfg(not(loom))]
pub(crate) mod export {
  pub(crate) mod alloc {
    pub(crate) use std::alloc::Layout;
    pub(crate) use std::alloc::alloc;
    pub(crate) use std::alloc::dealloc;
  }

  pub(crate) mod cell {
    /// [`std::cell::UnsafeCell`] with the closure-based API of loom's cell.
    #[repr(transparent)]
    pub(crate) struct UnsafeCell<T> {
      inner: std::cell::UnsafeCell<T>,
    }

    impl<T> UnsafeCell<T> {
      #[inline]
      pub(crate) const fn new(value: T) -> Self {
        Self {
          inner: std::cell::UnsafeCell::new(value),
        }
      }

      #[inline]
      pub(crate) fn with_mut<F, R>(&self, f: F) -> R
      where
        F: FnOnce(*mut T) -> R,
      {
        f(self.inner.get())
      }
    }
  }

  pub(crate) mod hint {
    use crossbeam_utils::Backoff;

    /// Waits for another thread to make progress.
    #[inline]
    pub(crate) fn snooze(backoff: &Backoff) {
      backoff.snooze();
    }
  }

  pub(crate) mod sync {
    pub(crate) use parking_lot::Mutex;
    pub(crate) use parking_lot::MutexGuard;

    pub(crate) mod atomic {
      pub(crate) use std::sync::atomic::AtomicU32;
      pub(crate) use std::sync::atomic::AtomicU64;
      pub(crate) use std::sync::atomic::Ordering;
    }

    /// Attempts to acquire `mutex` without blocking.
    #[inline]
    pub(crate) fn try_lock<T>(mutex: &Mutex<T>) -> Option<MutexGuard<'_, T>> {
      mutex.try_lock()
    }
  }
}

#[cfg(loom)]
pub(crate) mod export {
  pub(crate) mod alloc {
    pub(crate) use loom::alloc::Layout;
    pub(crate) use loom::alloc::alloc;
    pub(crate) use loom::alloc::dealloc;
  }

  pub(crate) mod cell {
    pub(crate) use loom::cell::UnsafeCell;
  }

  pub(crate) mod hint {
    use crossbeam_utils::Backoff;

    /// Waits for another thread to make progress; loom must see the yield.
    #[inline]
    pub(crate) fn snooze(_backoff: &Backoff) {
      loom::thread::yield_now();
    }
  }

  pub(crate) mod sync {
    pub(crate) use loom::sync::Mutex;
    pub(crate) use loom::sync::MutexGuard;

    pub(crate) mod atomic {
      pub(crate) use loom::sync::atomic::AtomicU32;
      pub(crate) use loom::sync::atomic::AtomicU64;
      pub(crate) use loom::sync::atomic::Ordering;
    }

    /// Attempts to acquire `mutex` without blocking.
    #[inline]
    pub(crate) fn try_lock<T>(mutex: &Mutex<T>) -> Option<MutexGuard<'_, T>> {
      mutex.try_lock().ok()
    }
  }
}

#[doc(inline)]
pub(crate) use self::export::*;
