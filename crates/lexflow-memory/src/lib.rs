//! Shared agent memory with time-to-live expiry.
//!
//! A namespaced key/value cache: entries are written under `(agent, key)`,
//! expire after their TTL, and are reclaimed by a periodic background sweep.
//!
//! # Main types
//!
//! - [`MemoryStore`] — the store, its sweep, and the sweeper loop.
//! - [`MemoryEntry`] — one stored value with its TTL metadata.

/// The TTL key/value store.
pub mod store;

pub use store::{MemoryEntry, MemoryStore};
