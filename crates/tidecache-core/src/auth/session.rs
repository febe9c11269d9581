use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{CredentialProvider, Identity, IdentityProvider};
use crate::clock::{SharedClock, SystemClock};

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Tokens are treated as expired this long before their stated expiry,
/// absorbing clock skew with the issuer.
const EXPIRY_SKEW_SECONDS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenData {
    pub access_token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TokenData {
    pub fn new(access_token: impl Into<String>, lifetime: Duration, now: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            issued_at: now,
            expires_at: now + lifetime,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at - Duration::seconds(EXPIRY_SKEW_SECONDS)
    }

    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        self.time_until_expiry(now).num_minutes()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub token: TokenData,
    pub identity: Identity,
}

/// The signed-in user's token and identity, persisted next to the cache.
///
/// Acts as both the credential and identity source for the sync engine.
pub struct Session {
    cache_dir: PathBuf,
    data: RwLock<Option<SessionData>>,
    clock: SharedClock,
}

impl Session {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            data: RwLock::new(None),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn data(&self) -> Option<SessionData> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Load session from disk. Returns whether a still-valid session was found.
    pub fn load(&self) -> Result<bool> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(false);
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        let data: SessionData =
            serde_json::from_str(&contents).context("Failed to parse session file")?;

        if data.token.is_expired(self.clock.now()) {
            debug!("Stored session has expired");
            return Ok(false);
        }
        self.update(data);
        Ok(true)
    }

    /// Save session to disk
    pub fn save(&self) -> Result<()> {
        if let Some(data) = self.data() {
            let path = self.session_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let contents = serde_json::to_string_pretty(&data)?;
            std::fs::write(path, contents)?;
        }
        Ok(())
    }

    /// Clear session data (logout)
    pub fn clear(&self) -> Result<()> {
        *self.data.write().unwrap_or_else(PoisonError::into_inner) = None;
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    pub fn update(&self, data: SessionData) {
        *self.data.write().unwrap_or_else(PoisonError::into_inner) = Some(data);
    }

    /// Get the bearer token if the session is valid
    pub fn token(&self) -> Option<String> {
        let now = self.clock.now();
        self.data()
            .filter(|d| !d.token.is_expired(now))
            .map(|d| d.token.access_token)
    }

    fn session_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }
}

impl CredentialProvider for Session {
    fn is_valid(&self) -> bool {
        let now = self.clock.now();
        match self.data() {
            Some(data) if !data.token.is_expired(now) => true,
            Some(_) => {
                warn!("Access token has expired");
                false
            }
            None => false,
        }
    }

    fn time_until_expiry(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.data().map(|d| d.token.time_until_expiry(now))
    }
}

impl IdentityProvider for Session {
    fn current_identity(&self) -> Option<Identity> {
        self.data().map(|d| d.identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};

    fn identity() -> Identity {
        Identity {
            email: "kim@school.example".to_string(),
            name: Some("Kim".to_string()),
            is_admin: false,
        }
    }

    fn session_data(now: DateTime<Utc>, lifetime: Duration) -> SessionData {
        SessionData {
            token: TokenData::new("tok", lifetime, now),
            identity: identity(),
        }
    }

    #[test]
    fn test_token_expiry_includes_skew() {
        let now = Utc::now();
        let token = TokenData::new("t", Duration::minutes(10), now);
        assert!(!token.is_expired(now + Duration::minutes(8)));
        assert!(token.is_expired(now + Duration::seconds(9 * 60 + 1)));
        assert_eq!(token.minutes_until_expiry(now), 10);
        assert_eq!(token.time_until_expiry(now + Duration::hours(1)), Duration::zero());
    }

    #[test]
    fn test_empty_session_is_invalid() {
        let session = Session::new(PathBuf::from("/nonexistent"));
        assert!(!session.is_valid());
        assert!(session.current_identity().is_none());
        assert!(session.time_until_expiry().is_none());
        assert!(!session.is_expiring_soon(Duration::minutes(5)));
    }

    #[test]
    fn test_expiring_soon() {
        let clock = ManualClock::default();
        let session = Session::new(PathBuf::from("/nonexistent")).with_clock(Arc::new(clock.clone()));
        session.update(session_data(clock.now(), Duration::minutes(30)));

        assert!(session.is_valid());
        assert!(!session.is_expiring_soon(Duration::minutes(5)));

        clock.advance(Duration::minutes(27));
        assert!(session.is_expiring_soon(Duration::minutes(5)));
        assert!(session.is_valid());

        clock.advance(Duration::minutes(5));
        assert!(!session.is_valid());
        assert!(session.token().is_none());
    }

    #[test]
    fn test_save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::new(dir.path().to_path_buf());
        session.update(session_data(Utc::now(), Duration::hours(1)));
        session.save().unwrap();

        let restored = Session::new(dir.path().to_path_buf());
        assert!(restored.load().unwrap());
        assert_eq!(restored.current_identity(), Some(identity()));
        assert_eq!(restored.token().as_deref(), Some("tok"));

        restored.clear().unwrap();
        assert!(!Session::new(dir.path().to_path_buf()).load().unwrap());
    }

    #[test]
    fn test_load_skips_expired_session() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::new(dir.path().to_path_buf());
        session.update(session_data(Utc::now() - Duration::hours(2), Duration::hours(1)));
        session.save().unwrap();

        let restored = Session::new(dir.path().to_path_buf());
        assert!(!restored.load().unwrap());
        assert!(restored.data().is_none());
    }
}
