//! Bounded request queues feeding the flush pipeline.
//!
//! Requests live in a fixed node pool. Producers on any thread pop a node
//! from the free stack, write the request into it, and push it onto the
//! create or destroy stack. The maintenance token holder detaches whole
//! stacks at once and returns each node to the free stack after reading it.

use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::mem::MaybeUninit;
use std::num::NonZeroUsize;

use crate::loom::cell::UnsafeCell;
use crate::registry::Aligned;
use crate::registry::Factory;
use crate::registry::pool::Link;
use crate::table::Key;
use crate::tyre::Chain;
use crate::tyre::Links;
use crate::tyre::Slots;
use crate::tyre::Stack;

/// Where a created resource is installed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Target {
  /// A keyed slot, valid only while `link` is still the key's allocation.
  Keyed { key: Key, link: Link },
  /// An indexed slot.
  Indexed(u32),
}

/// A unit of work for the flush pipeline.
pub(crate) enum Request<F: Factory> {
  /// Build a resource and install it at `target`. A missing payload records
  /// a failed load.
  Create {
    target: Target,
    identifier: Box<str>,
    payload: Option<F::Payload>,
  },
  /// Hand a resource back to the factory.
  Destroy {
    resource: Box<Aligned<F::Resource>>,
  },
}

impl<F: Factory> Debug for Request<F> {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    match self {
      Self::Create {
        target,
        identifier,
        payload,
      } => f
        .debug_struct("Create")
        .field("target", target)
        .field("identifier", identifier)
        .field("payload", &payload.is_some())
        .finish(),
      Self::Destroy { resource } => f
        .debug_struct("Destroy")
        .field("resource", &resource.addr())
        .finish(),
    }
  }
}

type Node<F> = UnsafeCell<MaybeUninit<Request<F>>>;

// -----------------------------------------------------------------------------
// Request Queue
// -----------------------------------------------------------------------------

pub(crate) struct RequestQueue<F: Factory> {
  nodes: Slots<Node<F>>,
  links: Links,
  free: Stack,
  creates: Stack,
  destroys: Stack,
}

impl<F: Factory> RequestQueue<F> {
  pub(crate) fn new(nodes: NonZeroUsize) -> Self {
    let links: Links = Links::new(nodes);
    let free: Stack = Stack::with_all(&links);

    Self {
      nodes: Slots::from_fn(nodes, |_| UnsafeCell::new(MaybeUninit::uninit())),
      links,
      free,
      creates: Stack::new(),
      destroys: Stack::new(),
    }
  }

  /// Returns the number of bytes allocated for `nodes` request nodes.
  #[inline]
  pub(crate) const fn bytes(nodes: usize) -> usize {
    Slots::<Node<F>>::bytes(nodes) + Links::bytes(nodes)
  }

  #[inline]
  pub(crate) fn nodes(&self) -> usize {
    self.links.len()
  }

  /// Returns `true` if neither queue held a request at the time of the call.
  #[inline]
  pub(crate) fn is_empty(&self) -> bool {
    self.creates.is_empty() && self.destroys.is_empty()
  }

  /// Enqueues `request`.
  ///
  /// # Errors
  ///
  /// Returns the request if the node pool is exhausted.
  pub(crate) fn push(&self, request: Request<F>) -> Result<(), Request<F>> {
    let Some(index) = self.free.pop(&self.links) else {
      return Err(request);
    };

    let stack: &Stack = match request {
      Request::Create { .. } => &self.creates,
      Request::Destroy { .. } => &self.destroys,
    };

    // SAFETY: Popping the node from the free stack gave us sole ownership.
    self.nodes.get(index as usize).with_mut(|node| unsafe {
      (*node).write(request);
    });

    stack.push(&self.links, index);

    Ok(())
  }

  /// Detaches every queued create request, newest first.
  #[inline]
  pub(crate) fn take_creates(&self) -> Chain<'_> {
    self.creates.take(&self.links)
  }

  /// Detaches every queued destroy request, newest first.
  #[inline]
  pub(crate) fn take_destroys(&self) -> Chain<'_> {
    self.destroys.take(&self.links)
  }

  /// Reads the request in node `index` and returns the node to the pool.
  ///
  /// # Safety
  ///
  /// `index` must have been detached by [`take_creates`] or
  /// [`take_destroys`] and not read since.
  ///
  /// [`take_creates`]: Self::take_creates
  /// [`take_destroys`]: Self::take_destroys
  pub(crate) unsafe fn take(&self, index: u32) -> Request<F> {
    // SAFETY: The caller guarantees that the node is detached and holds an
    //         initialized request that has not been read yet.
    let request: Request<F> = self
      .nodes
      .get(index as usize)
      .with_mut(|node| unsafe { (*node).assume_init_read() });

    self.free.push(&self.links, index);

    request
  }
}

impl<F: Factory> Drop for RequestQueue<F> {
  fn drop(&mut self) {
    let detached: Vec<u32> = self.take_creates().chain(self.take_destroys()).collect();

    for index in detached {
      // SAFETY: The node was just detached from a request stack.
      drop(unsafe { self.take(index) });
    }
  }
}

impl<F: Factory> Debug for RequestQueue<F> {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("RequestQueue")
      .field("nodes", &self.nodes())
      .field("free", &self.free)
      .field("creates", &self.creates)
      .field("destroys", &self.destroys)
      .finish()
  }
}

// SAFETY: Nodes are handed between threads by the stacks, and a node is only
//         accessed by whoever popped or detached it.
unsafe impl<F: Factory> Send for RequestQueue<F> {}
// SAFETY: See above.
unsafe impl<F: Factory> Sync for RequestQueue<F> {}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
