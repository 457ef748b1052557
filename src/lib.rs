//! Resreg - A fixed-capacity, lock-free resource registry.
//!
//! Resreg maps resource identifiers to reference-counted slots. A slot
//! shows a caller-supplied placeholder until its resource is built, and any
//! thread may resolve, insert, or load resources without taking a lock.
//! Building, installing, and destroying resources is deferred to a flush
//! run by the single holder of the maintenance token.
//!
//! # Quick Start
//!
//! ```
//! use resreg::Registry;
//! use resreg::RegistryConfig;
//! use resreg::registry::Aligned;
//! use resreg::registry::Factory;
//! use resreg::registry::Placeholder;
//! use resreg::registry::Status;
//!
//! struct Meshes;
//!
//! impl Factory for Meshes {
//!   type Resource = Vec<f32>;
//!   type Payload = usize;
//!
//!   fn create(&self, _identifier: &str, vertices: usize) -> Option<Vec<f32>> {
//!     (vertices != 0).then(|| vec![0.0; vertices * 3])
//!   }
//! }
//!
//! static CUBE: Aligned<Vec<f32>> = Aligned::new(Vec::new());
//!
//! let registry = Registry::new(RegistryConfig::with_capacity(64), Meshes, Vec::new());
//!
//! let mesh = registry.insert("meshes/cube.obj", Some(Placeholder::from_static(&CUBE)), 8, false);
//! let copy = mesh.clone();
//!
//! assert_eq!(copy.status(), Status::Loading);
//!
//! let mut token = registry.maintenance();
//! token.flush(16);
//!
//! assert_eq!(mesh.get(&token).len(), 24);
//! ```
//!
//! # Core Modules
//!
//! - [`registry`]: The registry, its handles, and the maintenance token
//! - [`table`]: The lock-free key table behind the registry
//! - [`config`]: Registry construction parameters
//! - [`init`]: Optional tracing subscriber setup
//! - [`error`]: Exception system
//! - [`consts`]: Registry limits and defaults

mod loom;
mod tyre;

pub mod config;
pub mod consts;
pub mod error;
pub mod init;
pub mod registry;
pub mod table;

pub use self::config::RegistryConfig;
pub use self::registry::Handle;
pub use self::registry::Maintenance;
pub use self::registry::Registry;
pub use self::table::Key;
