//! Tidecache - a two-tier response cache with background synchronization.
//!
//! Responses from a remote backend are kept in a bounded memory tier and,
//! when small enough, in a persistent tier that survives restarts. The sync
//! engine preloads everything an identity needs, refreshes categories on a
//! schedule, and keeps the cache coherent after writes.

pub mod auth;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod sync;

pub use auth::{CredentialProvider, Identity, IdentityProvider, Session};
pub use cache::{CacheEntry, CacheStore, FileStore, KeyPattern, MemoryStore, PersistentStore};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::Config;
pub use error::{FetchError, SyncError, SyncResult};
pub use sync::{SyncOrchestrator, SyncProgress, SyncSummary, SyncTask, TaskPlanner};
