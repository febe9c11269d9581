//! Background synchronization of the cache with the remote backend.
//!
//! This module provides the `SyncOrchestrator` which:
//! - Bulk-loads an identity's data, one category group at a time
//! - Invalidates or refetches single categories on demand
//! - Applies optimistic writes with rollback
//! - Runs one periodic refresh timer per category

pub mod backoff;
pub mod optimistic;
pub mod orchestrator;
pub mod progress;
pub mod scheduler;
pub mod task;

pub use backoff::RateLimitBackoff;
pub use optimistic::OptimisticUndo;
pub use orchestrator::SyncOrchestrator;
pub use progress::{InitOutcome, SyncPhase, SyncProgress, SyncSummary, TickOutcome};
pub use scheduler::{SyncTimer, TimerRegistry};
pub use task::{FetchFn, FetchFuture, SyncTask, TaskPlanner};
