//! Core of `vault-kv-cp`: walk a KV v2 tree in one store and copy every leaf
//! secret into the same relative location in another store.
//!
//! Stores are reached only through [`KvStore`]. The live Vault implementation
//! lives in `vault-kv-cp-http`; [`MemoryStore`] backs tests.

pub mod copier;
pub mod error;
pub mod memory;
pub mod path;
pub mod store;
pub mod walker;

pub use copier::copy_secret;
pub use error::{Error, ListingShapeError, Result, StoreError, StoreResult};
pub use memory::MemoryStore;
pub use path::RelPath;
pub use store::{Endpoint, KvStore, Listing, Secret, SecretData, WriteReceipt};
pub use walker::{WalkSummary, migrate, walk};
