use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result;

/// Lifecycle state of a registry slot.
///
/// ```text
/// Missing ──▶ Loading ──▶ Ready | Error ──(forced)──▶ Loading
///
/// LoadingIndexed ──▶ Indexed | Error ──(re-insert)──▶ LoadingIndexed
/// ```
///
/// Placeholder states point at a stand-in resource (a caller placeholder or
/// the registry's error placeholder); [`Ready`] and [`Indexed`] point at a
/// resource built by the factory. A slot restarted by a forced request keeps
/// showing its built resource while it is loading again.
///
/// [`Ready`]: Status::Ready
/// [`Indexed`]: Status::Indexed
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
  /// Resolved, but no create request has been issued.
  Missing = 0,
  /// A create request for the slot is in flight.
  Loading = 1,
  /// The slot holds a resource built by the factory.
  Ready = 2,
  /// Loading or creation failed; the slot holds the error placeholder.
  Error = 3,
  /// A create request for an indexed slot is in flight.
  LoadingIndexed = 4,
  /// The indexed slot holds a resource built by the factory.
  Indexed = 5,
}

impl Status {
  /// Number of bits used to encode a status.
  pub const BITS: u32 = 4;

  /// Decodes a status from its bit representation.
  #[inline]
  pub const fn from_bits(bits: u8) -> Option<Self> {
    match bits {
      0 => Some(Self::Missing),
      1 => Some(Self::Loading),
      2 => Some(Self::Ready),
      3 => Some(Self::Error),
      4 => Some(Self::LoadingIndexed),
      5 => Some(Self::Indexed),
      _ => None,
    }
  }

  /// Returns the bit representation of the status.
  #[inline]
  pub const fn into_bits(self) -> u8 {
    self as u8
  }

  /// Returns `true` if the status can show a stand-in resource.
  #[inline]
  pub const fn is_placeholder(self) -> bool {
    !self.is_real()
  }

  /// Returns `true` if the status always shows a factory-built resource.
  #[inline]
  pub const fn is_real(self) -> bool {
    matches!(self, Self::Ready | Self::Indexed)
  }

  /// Returns `true` if a create request for the slot is in flight.
  #[inline]
  pub const fn is_pending(self) -> bool {
    matches!(self, Self::Loading | Self::LoadingIndexed)
  }

  /// Returns `true` if an unreferenced slot in this state may be reclaimed.
  #[inline]
  pub const fn is_collectible(self) -> bool {
    matches!(self, Self::Missing | Self::Ready | Self::Error)
  }
}

impl Display for Status {
  fn fmt(&self, f: &mut Formatter<'_>) -> Result {
    f.write_str(match self {
      Self::Missing => "missing",
      Self::Loading => "loading",
      Self::Ready => "ready",
      Self::Error => "error",
      Self::LoadingIndexed => "loading_indexed",
      Self::Indexed => "indexed",
    })
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
