//! Physical storage backends
//!
//! Reference implementations of the [`Configuration`](crate::config::Configuration)
//! contract directly over a root tree: an in-memory backend for tests and
//! embedded use, and a single-JSON-document backend that rewrites the whole
//! file on every persist. Distributed backends (LDAP, databases) live
//! outside this crate and implement the same contract.

pub mod file;
pub mod memory;

pub use file::FileConfiguration;
pub use memory::MemoryConfiguration;
