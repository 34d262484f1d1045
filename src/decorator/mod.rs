//! Configuration decorators
//!
//! Each decorator wraps an inner [`Configuration`](crate::config::Configuration)
//! by composition: it owns a `Box<dyn Configuration>` and forwards every
//! operation it does not override, adding exactly one cross-cutting
//! concern:
//!
//! - [`CachedRootConfiguration`]: retains the root tree once and serves all
//!   reads from it by path lookup.
//! - [`CachingConfiguration`]: retained root with an optional staleness
//!   window, write-through or read-only, invalidated on batch failure.
//! - [`IndexingConfiguration`]: maintains the uuid-to-path reference index
//!   and resolves `//*[_.uuid='...']` lookups through it.
//!
//! The hash-based optimistic-locking decorator lives in [`crate::olock`].
//!
//! Decorator caches are shared mutable state guarded by a mutex; the
//! synchronization discipline is part of each constructor's documented
//! contract.

pub mod cached_root;
pub mod caching;
pub mod indexing;

pub use cached_root::CachedRootConfiguration;
pub use caching::CachingConfiguration;
pub use indexing::IndexingConfiguration;
