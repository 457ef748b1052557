use std::error::Error;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result;

/// Error returned when a search wrapped the whole table without finding the
/// key or an empty slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct MapFullError;

impl Display for MapFullError {
  fn fmt(&self, f: &mut Formatter<'_>) -> Result {
    f.write_str("lookup table is full")
  }
}

impl Error for MapFullError {}
