//! Credential and identity sources consulted by the sync engine.
//!
//! This module provides:
//! - `CredentialProvider`: is the access token usable, and for how long
//! - `IdentityProvider`: whose data a full reload should fetch
//! - `Session`: a disk-persisted implementation of both
//!
//! Issuing tokens is the host application's job.

pub mod session;

use chrono::Duration;
use serde::{Deserialize, Serialize};

pub use session::{Session, SessionData, TokenData};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

pub trait CredentialProvider: Send + Sync {
    fn is_valid(&self) -> bool;

    /// Remaining token lifetime, `None` when there is no token at all.
    fn time_until_expiry(&self) -> Option<Duration>;

    /// True when a live token runs out within `lead`.
    fn is_expiring_soon(&self, lead: Duration) -> bool {
        self.time_until_expiry()
            .map(|remaining| remaining > Duration::zero() && remaining < lead)
            .unwrap_or(false)
    }
}

pub trait IdentityProvider: Send + Sync {
    fn current_identity(&self) -> Option<Identity>;
}
