use serde::Serialize;

/// Reported after every bulk-load task settles, successfully or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SyncProgress {
    pub current: usize,
    pub total: usize,
    pub category: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SyncSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub rate_limited: bool,
}

impl SyncSummary {
    pub fn record(&mut self, ok: bool) {
        self.total += 1;
        if ok {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn merge(&mut self, other: SyncSummary) {
        self.total += other.total;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.rate_limited |= other.rate_limited;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Completed(SyncSummary),
    /// Another initialization was in flight; nothing was done
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SyncPhase {
    #[default]
    NotInitialized,
    Initializing,
    Ready,
}

/// Why a periodic tick did or did not refetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Refreshed(SyncSummary),
    AppInactive,
    /// Not used by the active scope and not always synced
    OutOfScope,
    Paused,
    RateLimited,
    CredentialInvalid,
    CredentialExpiring,
    RecentlySynced,
    AlreadySyncing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_record_and_merge() {
        let mut a = SyncSummary::default();
        a.record(true);
        a.record(false);
        let mut b = SyncSummary {
            rate_limited: true,
            ..Default::default()
        };
        b.record(true);
        a.merge(b);
        assert_eq!(
            a,
            SyncSummary {
                total: 3,
                succeeded: 2,
                failed: 1,
                rate_limited: true,
            }
        );
    }

    #[test]
    fn test_progress_serializes_flat() {
        let progress = SyncProgress {
            current: 1,
            total: 5,
            category: "students".into(),
            message: "Students done".into(),
        };
        let json = serde_json::to_value(&progress).unwrap();
        assert_eq!(json["current"], 1);
        assert_eq!(json["category"], "students");
    }
}
