//! Fixed-capacity building blocks for the lock-free containers.
//!
//! - [`Slots`]: a cache-line aligned, fixed-length array
//! - [`Stack`]: a tagged Treiber stack of indices threaded through [`Links`]

#[cfg(not(any(target_pointer_width = "32", target_pointer_width = "64")))]
compile_error!("tyre requires a 32-bit or 64-bit platform");

mod slots;
mod stack;

pub(crate) use self::slots::Slots;
pub(crate) use self::stack::Chain;
pub(crate) use self::stack::Links;
pub(crate) use self::stack::NIL;
pub(crate) use self::stack::Stack;
