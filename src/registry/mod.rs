//! Resource registry.
//!
//! A [`Registry`] maps resource keys to reference-counted slots that show a
//! placeholder until the real resource is built. Any thread may resolve,
//! insert, or load resources; building, installing, destroying, and reading
//! them happens through the single [`Maintenance`] token.
//!
//! - [`Factory`]: builds and destroys resources
//! - [`Loader`]: produces payloads asynchronously for [`Registry::load`]
//! - [`Handle`]: a counted reference to a slot
//! - [`Word`]: the packed pointer, status, and refcount of a slot

mod core;
mod factory;
mod gate;
mod handle;
mod loader;
mod maintenance;
mod placeholder;
mod pool;
mod queue;
mod status;
mod word;

pub use self::core::Registry;
pub use self::factory::Factory;
pub use self::handle::Handle;
pub use self::loader::Completion;
pub use self::loader::LoadError;
pub use self::loader::Loader;
pub use self::maintenance::FlushStats;
pub use self::maintenance::Maintenance;
pub use self::placeholder::Aligned;
pub use self::placeholder::Placeholder;
pub use self::status::Status;
pub use self::word::AtomicWord;
pub use self::word::PackError;
pub use self::word::Word;
