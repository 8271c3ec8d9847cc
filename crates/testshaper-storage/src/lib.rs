//! TestShaper Storage
//!
//! Persistence for the security core: scoped policy settings and identity
//! records with their lockout state.
//!
//! # Backends
//!
//! - [`StorageEngine`] - RocksDB, values encoded with bincode
//! - [`MemoryStore`] - process memory, with an availability toggle for tests
//!
//! # Column Families
//!
//! - `policy_settings` - one row per `(scope, key)`
//! - `identities` - identity records keyed by identifier

pub mod engine;
pub mod keys;
pub mod memory;
pub mod options;
pub mod store;

pub use engine::StorageEngine;
pub use memory::MemoryStore;
pub use options::StorageOptions;
pub use store::{IdentityStore, PolicyStore};
