use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub version: u32,
}

impl CacheEntry {
    /// Build an entry living `ttl` from `now`. Non-positive TTLs are clamped to
    /// one millisecond so `expires_at` always lies after `created_at`.
    pub fn new(key: impl Into<String>, payload: Value, ttl: Duration, now: DateTime<Utc>) -> Self {
        let ttl = ttl.max(Duration::milliseconds(1));
        Self {
            key: key.into(),
            payload,
            created_at: now,
            expires_at: now + ttl,
            version: 1,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn age_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_minutes()
    }

    pub fn age_display(&self, now: DateTime<Utc>) -> String {
        let minutes = self.age_minutes(now);
        if minutes < 1 {
            // Includes negative ages from clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }

    pub fn time_to_live(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }

    /// Serialized size of the payload alone, used for the persistence threshold.
    pub fn payload_size(&self) -> Option<usize> {
        serde_json::to_string(&self.payload).ok().map(|s| s.len())
    }
}
