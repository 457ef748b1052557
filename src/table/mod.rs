//! Open-addressing lookup table over non-zero 64-bit keys.

mod hash_map;
mod key;

pub use self::hash_map::HashMap;
pub use self::hash_map::MapFullError;
pub use self::key::Key;
