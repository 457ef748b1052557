mod error;
mod map;
mod params;

pub use self::error::MapFullError;
pub use self::map::HashMap;

pub(crate) use self::params::Params;
