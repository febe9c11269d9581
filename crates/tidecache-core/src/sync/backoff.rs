use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::config::SyncConfig;

#[derive(Debug, Default)]
struct CategoryBackoff {
    strikes: i64,
    paused_until: Option<DateTime<Utc>>,
}

/// Per-category pause after the backend answers "too many requests".
///
/// Each consecutive rate-limited refresh lengthens the pause by one step,
/// up to a ceiling. Strikes are cleared by any refresh that is not rate
/// limited, and when a pause runs out.
#[derive(Debug)]
pub struct RateLimitBackoff {
    base: Duration,
    step: Duration,
    max: Duration,
    categories: HashMap<String, CategoryBackoff>,
}

impl RateLimitBackoff {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            base: Duration::minutes(config.backoff_base_minutes),
            step: Duration::minutes(config.backoff_step_minutes),
            max: Duration::minutes(config.backoff_max_minutes),
            categories: HashMap::new(),
        }
    }

    /// Register a rate-limit response and return how long the category now rests.
    pub fn record_rate_limit(&mut self, category: &str, now: DateTime<Utc>) -> Duration {
        let state = self.categories.entry(category.to_string()).or_default();
        state.strikes += 1;
        let pause = (self.base + self.step * (state.strikes - 1) as i32).min(self.max);
        state.paused_until = Some(now + pause);
        warn!(
            category,
            strikes = state.strikes,
            pause_minutes = pause.num_minutes(),
            "Rate limited, pausing category"
        );
        pause
    }

    pub fn record_success(&mut self, category: &str) {
        if let Some(state) = self.categories.get_mut(category) {
            state.strikes = 0;
            if state.paused_until.is_none() {
                self.categories.remove(category);
            }
        }
    }

    /// Deadline of an active pause. A lapsed pause is forgotten here along
    /// with its strikes.
    pub fn paused_until(&mut self, category: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.categories.get(category)?.paused_until {
            Some(until) if now < until => Some(until),
            Some(_) => {
                info!(category, "Rate-limit pause lapsed, resuming category");
                self.categories.remove(category);
                None
            }
            None => None,
        }
    }

    pub fn strikes(&self, category: &str) -> i64 {
        self.categories.get(category).map(|s| s.strikes).unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.categories.clear();
    }
}
