use crossbeam_utils::CachePadded;
use std::alloc::handle_alloc_error;
use std::mem::ManuallyDrop;
use std::mem::MaybeUninit;
use std::num::NonZeroUsize;
use std::ptr;
use std::ptr::NonNull;
use std::slice;

use crate::error::fatal;
use crate::loom::alloc::Layout;
use crate::loom::alloc::alloc;
use crate::loom::alloc::dealloc;

/// A fixed-length array allocated on a cache-line boundary.
///
/// The allocation size is always a multiple of [`Slots::CACHE_LINE`], which
/// is what [`Slots::bytes`] reports for memory accounting.
#[repr(C)]
pub(crate) struct Slots<T> {
  ptr: NonNull<T>,
  len: NonZeroUsize,
}

impl<T> Slots<T> {
  /// The assumed size of a cache line in bytes.
  pub(crate) const CACHE_LINE: usize = size_of::<CachePadded<u8>>();

  /// Constructs a new slot array with uninitialized contents.
  #[inline]
  pub(crate) fn new_uninit(len: NonZeroUsize) -> Slots<MaybeUninit<T>> {
    let layout: Layout = Self::layout(len);

    // SAFETY: Layout is guaranteed to have a non-zero size.
    let target: *mut u8 = unsafe { alloc(layout) };

    let Some(nonnull) = NonNull::new(target) else {
      handle_alloc_error(layout);
    };

    Slots {
      ptr: nonnull.cast(),
      len,
    }
  }

  /// Constructs a new slot array, initializing each entry with `init(index)`.
  #[inline]
  pub(crate) fn from_fn<F>(len: NonZeroUsize, mut init: F) -> Self
  where
    F: FnMut(usize) -> T,
  {
    let mut this: Slots<MaybeUninit<T>> = Self::new_uninit(len);

    for (index, item) in this.as_mut_slice().iter_mut().enumerate() {
      item.write(init(index));
    }

    // SAFETY: Every entry was written above.
    unsafe { this.assume_init() }
  }

  /// Returns the number of bytes allocated for an array of `len` entries.
  #[inline]
  pub(crate) const fn bytes(len: usize) -> usize {
    (len * size_of::<T>()).next_multiple_of(Self::CACHE_LINE)
  }

  /// Returns a raw pointer to the array's buffer.
  #[inline]
  pub(crate) const fn as_ptr(&self) -> *const T {
    self.ptr.as_ptr()
  }

  /// Returns an unsafe mutable pointer to the array's buffer.
  #[inline]
  pub(crate) const fn as_mut_ptr(&mut self) -> *mut T {
    self.ptr.as_ptr()
  }

  /// Returns the total number of elements the array holds.
  #[inline]
  pub(crate) const fn len(&self) -> NonZeroUsize {
    self.len
  }

  /// Extracts a slice containing the entire array.
  #[inline]
  pub(crate) const fn as_slice(&self) -> &[T] {
    // SAFETY: `ptr` points to `len` initialized entries owned by `self`.
    unsafe { slice::from_raw_parts(self.as_ptr(), self.len.get()) }
  }

  /// Extracts a mutable slice of the entire array.
  #[inline]
  pub(crate) const fn as_mut_slice(&mut self) -> &mut [T] {
    // SAFETY: `ptr` points to `len` initialized entries owned by `self`.
    unsafe { slice::from_raw_parts_mut(self.as_mut_ptr(), self.len.get()) }
  }

  /// Returns a reference to the entry at `index`.
  ///
  /// # Panics
  ///
  /// Panics if `index` is out of bounds.
  #[inline]
  pub(crate) fn get(&self, index: usize) -> &T {
    &self.as_slice()[index]
  }

  #[inline]
  fn layout(len: NonZeroUsize) -> Layout {
    match Layout::from_size_align(Self::bytes(len.get()), Self::CACHE_LINE) {
      Ok(layout) if layout.size() != 0 => layout,
      Ok(_) => fatal!("invalid slot layout"),
      Err(error) => fatal!(error),
    }
  }
}

impl<T> Slots<MaybeUninit<T>> {
  /// Converts `self` into an initialized array.
  ///
  /// # Safety
  ///
  /// This function has the same safety requirements as [`MaybeUninit::assume_init`].
  /// It is up to the caller to guarantee that all `MaybeUninit<T>` entries are
  /// really in an initialized state.
  #[inline]
  pub(crate) unsafe fn assume_init(self) -> Slots<T> {
    let len: NonZeroUsize = self.len;
    let ptr: NonNull<T> = ManuallyDrop::new(self).ptr.cast();

    Slots { ptr, len }
  }
}

impl<T> Drop for Slots<T> {
  fn drop(&mut self) {
    let layout: Layout = Self::layout(self.len);

    // SAFETY: We're the sole owner at drop time and every entry is
    //         initialized (`MaybeUninit` entries drop as no-ops).
    unsafe { ptr::drop_in_place(self.as_mut_slice()) }

    // SAFETY: The pointer was allocated by the global allocator using this
    //         exact layout.
    unsafe { dealloc(self.as_mut_ptr().cast(), layout) }
  }
}

// SAFETY: `Slots<T>` owns its entries like a `Box<[T]>`.
unsafe impl<T: Send> Send for Slots<T> {}
// SAFETY: `Slots<T>` only hands out shared references through `&self`.
unsafe impl<T: Sync> Sync for Slots<T> {}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
