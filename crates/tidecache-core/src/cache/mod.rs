//! Two-tier response cache.
//!
//! This module provides the `CacheStore` that sits in front of the remote
//! backend:
//! - Memory tier: bounded entry count, least-recently-used eviction
//! - Persistent tier: survives restarts, small payloads only, byte budget
//! - Per-entry TTL, exact and wildcard invalidation
//!
//! `policy` holds the pure key/TTL/category rules used to address entries.

pub mod entry;
pub mod pattern;
pub mod persistent;
pub mod policy;
pub mod store;

pub use entry::CacheEntry;
pub use pattern::KeyPattern;
pub use persistent::{FileStore, MemoryStore, PersistentStore};
pub use store::{CacheStats, CacheStore};
