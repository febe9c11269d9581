use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::backoff::RateLimitBackoff;
use super::optimistic::{self, OptimisticUndo};
use super::progress::{InitOutcome, SyncPhase, SyncProgress, SyncSummary, TickOutcome};
use super::scheduler::{SyncTimer, TimerRegistry};
use super::task::{SyncTask, TaskPlanner};
use crate::auth::{CredentialProvider, Identity, IdentityProvider};
use crate::cache::pattern::category_of;
use crate::cache::{policy, CacheStore};
use crate::clock::{SharedClock, SystemClock};
use crate::config::SyncConfig;
use crate::error::{FetchError, SyncError, SyncResult};

/// Used if a category interval cannot be expressed as a std duration
const FALLBACK_TICK: std::time::Duration = std::time::Duration::from_secs(10 * 60);

struct SyncState {
    phase: SyncPhase,
    last_sync_time: Option<DateTime<Utc>>,
    last_synced: HashMap<String, DateTime<Utc>>,
    syncing: HashSet<String>,
    paused_until: Option<DateTime<Utc>>,
    app_active: bool,
    /// `None` syncs every category
    active_categories: Option<HashSet<String>>,
    last_ticks: HashMap<String, TickOutcome>,
    backoff: RateLimitBackoff,
    /// Tasks from the last initialize, replayed by category refetches
    plan: Vec<SyncTask>,
}

impl SyncState {
    fn new(config: &SyncConfig) -> Self {
        Self {
            phase: SyncPhase::NotInitialized,
            last_sync_time: None,
            last_synced: HashMap::new(),
            syncing: HashSet::new(),
            paused_until: None,
            app_active: true,
            active_categories: None,
            last_ticks: HashMap::new(),
            backoff: RateLimitBackoff::new(config),
            plan: Vec::new(),
        }
    }

    fn in_scope(&self, category: &str) -> bool {
        match &self.active_categories {
            None => true,
            Some(active) => {
                active.contains(category) || policy::ALWAYS_SYNC_CATEGORIES.contains(&category)
            }
        }
    }

    /// A full sync interval has passed since the category last synced.
    fn is_due(&self, category: &str, now: DateTime<Utc>) -> bool {
        self.last_synced
            .get(category)
            .map_or(true, |last| now - *last >= policy::sync_interval_for(category))
    }
}

/// Clears the reentrancy flag when initialization ends, however it ends.
struct InitializingGuard<'a>(&'a AtomicBool);

impl Drop for InitializingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Moves a category back from Syncing to Idle.
struct SyncingGuard<'a> {
    state: &'a Mutex<SyncState>,
    category: String,
}

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .syncing
            .remove(&self.category);
    }
}

/// Drives bulk loading, manual refreshes, optimistic writes and the
/// periodic background refresh of one session's cache.
pub struct SyncOrchestrator {
    cache: Arc<CacheStore>,
    credentials: Arc<dyn CredentialProvider>,
    identities: Arc<dyn IdentityProvider>,
    planner: Arc<dyn TaskPlanner>,
    config: SyncConfig,
    clock: SharedClock,
    initializing: AtomicBool,
    state: Mutex<SyncState>,
    timers: TimerRegistry,
}

impl SyncOrchestrator {
    pub fn new(
        cache: Arc<CacheStore>,
        credentials: Arc<dyn CredentialProvider>,
        identities: Arc<dyn IdentityProvider>,
        planner: Arc<dyn TaskPlanner>,
    ) -> Self {
        let config = SyncConfig::default();
        Self {
            cache,
            credentials,
            identities,
            planner,
            state: Mutex::new(SyncState::new(&config)),
            config,
            clock: Arc::new(SystemClock),
            initializing: AtomicBool::new(false),
            timers: TimerRegistry::default(),
        }
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.state = Mutex::new(SyncState::new(&config));
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    fn state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn phase(&self) -> SyncPhase {
        self.state().phase
    }

    pub fn is_initializing(&self) -> bool {
        self.initializing.load(Ordering::Acquire)
    }

    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        self.state().last_sync_time
    }

    // =========================================================================
    // Bulk loading
    // =========================================================================

    /// Load everything the planner lists for `identity`.
    ///
    /// Tasks are grouped by category; groups run one after another, tasks
    /// inside a group run concurrently. A failed task is logged and counted
    /// but never stops its siblings. `progress` fires after each task settles.
    pub async fn initialize<P>(&self, identity: &Identity, progress: P) -> SyncResult<InitOutcome>
    where
        P: Fn(SyncProgress) + Send + Sync,
    {
        if self
            .initializing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Initialization already in progress, ignoring request");
            return Ok(InitOutcome::AlreadyRunning);
        }
        let _guard = InitializingGuard(&self.initializing);

        if !self.credentials.is_valid() {
            return Err(SyncError::CredentialUnavailable(
                "access token is missing or expired".to_string(),
            ));
        }

        let tasks = self.planner.plan(identity);
        info!(email = %identity.email, tasks = tasks.len(), "Initial data load started");
        {
            let mut state = self.state();
            state.phase = SyncPhase::Initializing;
            state.plan = tasks.clone();
        }

        let total = tasks.len();
        let completed = AtomicUsize::new(0);
        let report = |task: &SyncTask, outcome: &Result<(), FetchError>| {
            let current = completed.fetch_add(1, Ordering::SeqCst) + 1;
            let message = match outcome {
                Ok(()) => format!("{} loaded", task.name),
                Err(e) => format!("{} failed: {}", task.name, e),
            };
            progress(SyncProgress {
                current,
                total,
                category: task.category.clone(),
                message,
            });
        };

        let mut summary = SyncSummary::default();
        for (category, group) in group_by_category(&tasks) {
            debug!(category = %category, tasks = group.len(), "Loading category group");
            summary.merge(self.run_group(&category, &group, &report).await);
        }

        {
            let mut state = self.state();
            state.phase = SyncPhase::Ready;
            state.last_sync_time = Some(self.clock.now());
        }
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Initial data load complete"
        );
        Ok(InitOutcome::Completed(summary))
    }

    /// Drop the whole cache and reload for the signed-in identity.
    pub async fn refresh_all<P>(&self, progress: P) -> SyncResult<InitOutcome>
    where
        P: Fn(SyncProgress) + Send + Sync,
    {
        if self.is_initializing() {
            warn!("Initialization in progress, ignoring full refresh");
            return Ok(InitOutcome::AlreadyRunning);
        }
        info!("Full refresh requested");
        self.cache.clear();
        let identity = self
            .identities
            .current_identity()
            .ok_or(SyncError::IdentityMissing)?;
        self.initialize(&identity, progress).await
    }

    async fn run_group<S>(&self, category: &str, tasks: &[&SyncTask], on_settled: &S) -> SyncSummary
    where
        S: Fn(&SyncTask, &Result<(), FetchError>) + Sync,
    {
        let results = join_all(tasks.iter().map(|&task| async move {
            let outcome = self.run_task(task).await;
            on_settled(task, &outcome);
            outcome
        }))
        .await;
        self.settle_category(category, &results)
    }

    async fn run_task(&self, task: &SyncTask) -> Result<(), FetchError> {
        match task.fetch().await {
            Ok(payload) => {
                let key = task.cache_key();
                self.cache.set(&key, payload, policy::ttl_for(&task.action));
                debug!(task = %task.name, key = %key, "Task result cached");
                Ok(())
            }
            Err(e) => {
                error!(task = %task.name, category = %task.category, error = %e, "Sync task failed");
                Err(e)
            }
        }
    }

    fn settle_category(&self, category: &str, results: &[Result<(), FetchError>]) -> SyncSummary {
        let mut summary = SyncSummary::default();
        for result in results {
            summary.record(result.is_ok());
            if matches!(result, Err(e) if e.is_rate_limited()) {
                summary.rate_limited = true;
            }
        }

        let now = self.clock.now();
        let mut state = self.state();
        if summary.rate_limited {
            state.backoff.record_rate_limit(category, now);
        } else {
            state.backoff.record_success(category);
        }
        if summary.succeeded > 0 {
            state.last_synced.insert(category.to_string(), now);
        }
        summary
    }

    // =========================================================================
    // Partial refresh
    // =========================================================================

    fn category_paused_until(&self, category: &str) -> Option<DateTime<Utc>> {
        let now = self.clock.now();
        self.state().backoff.paused_until(category, now)
    }

    /// Invalidate every cached key of `category`. Readers repopulate lazily.
    /// Returns false when skipped for a bad credential or rate-limit pause.
    pub fn refresh_category(&self, category: &str) -> bool {
        if let Some(until) = self.category_paused_until(category) {
            info!(category, until = %until, "Category paused after rate limiting, skipping refresh");
            return false;
        }
        if !self.credentials.is_valid() {
            warn!(category, "Credential invalid, skipping refresh");
            return false;
        }
        self.cache.invalidate(&format!("{}:*", category));
        debug!(category, "Category invalidated");
        true
    }

    fn begin_syncing(&self, category: &str) -> Option<SyncingGuard<'_>> {
        if !self.state().syncing.insert(category.to_string()) {
            return None;
        }
        Some(SyncingGuard {
            state: &self.state,
            category: category.to_string(),
        })
    }

    /// Invalidate `category`, then immediately re-run its tasks from the
    /// last plan. `None` if the refresh was skipped.
    pub async fn refetch_category(&self, category: &str) -> Option<SyncSummary> {
        let Some(_syncing) = self.begin_syncing(category) else {
            debug!(category, "Category already syncing");
            return None;
        };
        if !self.refresh_category(category) {
            return None;
        }

        let tasks: Vec<SyncTask> = self
            .state()
            .plan
            .iter()
            .filter(|task| task.category == category)
            .cloned()
            .collect();
        let refs: Vec<&SyncTask> = tasks.iter().collect();
        let summary = self.run_group(category, &refs, &|_, _| {}).await;

        self.state().last_sync_time = Some(self.clock.now());
        info!(
            category,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Category refreshed"
        );
        Some(summary)
    }

    /// Post-write coherency: drop `keys` (exact or wildcard), then refetch
    /// each category they name. Skipped entirely without a valid credential;
    /// later reads would miss and refetch anyway.
    pub async fn invalidate_and_refresh<K>(&self, keys: &[K]) -> SyncSummary
    where
        K: AsRef<str> + Sync,
    {
        if !self.credentials.is_valid() {
            warn!("Credential invalid, skipping post-write invalidation");
            return SyncSummary::default();
        }

        for key in keys {
            self.cache.invalidate(key.as_ref());
        }
        let categories: BTreeSet<String> = keys
            .iter()
            .filter_map(|key| category_of(key.as_ref()).map(str::to_string))
            .collect();

        let mut summary = SyncSummary::default();
        let results = join_all(categories.iter().map(|c| self.refetch_category(c))).await;
        for result in results.into_iter().flatten() {
            summary.merge(result);
        }
        debug!(keys = keys.len(), categories = categories.len(), "Post-write refresh done");
        summary
    }

    /// Read-through: serve from cache, or fetch, cache with the action's TTL,
    /// and return.
    pub async fn load<F, Fut>(
        &self,
        category: &str,
        action: &str,
        params: &Value,
        fetch: F,
    ) -> Result<Value, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, FetchError>>,
    {
        let key = policy::derive_key(category, action, params);
        if let Some(hit) = self.cache.get(&key) {
            debug!(key = %key, "Cache hit");
            return Ok(hit);
        }

        debug!(key = %key, "Cache miss, fetching");
        match fetch().await {
            Ok(value) => {
                self.cache.set(&key, value.clone(), policy::ttl_for(action));
                Ok(value)
            }
            Err(e) => {
                if e.is_rate_limited() {
                    let now = self.clock.now();
                    self.state().backoff.record_rate_limit(category, now);
                }
                Err(e)
            }
        }
    }

    // =========================================================================
    // Optimistic writes
    // =========================================================================

    /// Show `transform` applied to each cached key right away. Call `undo` on
    /// the result if the network write fails.
    pub fn optimistic_update<K, F>(&self, keys: &[K], transform: F) -> OptimisticUndo
    where
        K: AsRef<str>,
        F: Fn(&Value) -> Value,
    {
        optimistic::apply(&self.cache, keys, transform)
    }

    /// Apply `transform`, await `write`, and roll back before reporting a
    /// failed write.
    pub async fn optimistic_write<K, F, W, T>(
        &self,
        keys: &[K],
        transform: F,
        write: W,
    ) -> SyncResult<T>
    where
        K: AsRef<str>,
        F: Fn(&Value) -> Value,
        W: Future<Output = anyhow::Result<T>>,
    {
        let undo = self.optimistic_update(keys, transform);
        match write.await {
            Ok(value) => {
                undo.commit();
                Ok(value)
            }
            Err(e) => {
                warn!(error = %e, "Write failed, rolling back optimistic update");
                undo.undo();
                Err(SyncError::Write(e))
            }
        }
    }

    // =========================================================================
    // Periodic sync
    // =========================================================================

    /// Schedule one repeating refresh per policy category. Any timers already
    /// running are stopped first. Must be called inside a tokio runtime.
    pub fn start_periodic_sync(self: &Arc<Self>) {
        self.stop_periodic_sync();

        for category in policy::categories() {
            let period = policy::sync_interval_for(category)
                .to_std()
                .unwrap_or(FALLBACK_TICK);
            let weak = Arc::downgrade(self);
            let name = category.to_string();
            let timer = SyncTimer::spawn(name.clone(), period, move || {
                let weak = weak.clone();
                let name = name.clone();
                async move {
                    let Some(orchestrator) = weak.upgrade() else {
                        return ControlFlow::Break(());
                    };
                    let outcome = orchestrator.run_tick(&name).await;
                    debug!(category = %name, ?outcome, "Periodic sync tick");
                    ControlFlow::Continue(())
                }
            });
            self.timers.insert(category, timer);
        }
        info!(timers = self.timers.len(), "Periodic sync started");
    }

    /// Cancel every scheduled timer. Safe to call repeatedly.
    pub fn stop_periodic_sync(&self) {
        let stopped = self.timers.stop_all();
        if stopped > 0 {
            info!(timers = stopped, "Periodic sync stopped");
        }
    }

    pub fn scheduled_categories(&self) -> Vec<String> {
        self.timers.categories()
    }

    pub fn is_scheduled(&self, category: &str) -> bool {
        self.timers.is_scheduled(category)
    }

    /// One periodic tick for `category`, with all of its skip rules applied.
    pub async fn run_tick(&self, category: &str) -> TickOutcome {
        let outcome = self.evaluate_tick(category).await;
        self.state()
            .last_ticks
            .insert(category.to_string(), outcome);
        outcome
    }

    /// Outcome of the most recent tick of `category`.
    pub fn last_tick(&self, category: &str) -> Option<TickOutcome> {
        self.state().last_ticks.get(category).copied()
    }

    async fn evaluate_tick(&self, category: &str) -> TickOutcome {
        let now = self.clock.now();
        {
            let mut state = self.state();
            if !state.app_active {
                return TickOutcome::AppInactive;
            }
            if !state.in_scope(category) {
                return TickOutcome::OutOfScope;
            }
            if let Some(until) = state.paused_until {
                if now < until {
                    return TickOutcome::Paused;
                }
                state.paused_until = None;
                info!("Sync pause elapsed, resuming");
            }
            if state.backoff.paused_until(category, now).is_some() {
                return TickOutcome::RateLimited;
            }
        }

        if !self.credentials.is_valid() {
            warn!(category, "Credential invalid, skipping periodic sync");
            return TickOutcome::CredentialInvalid;
        }
        if self.credentials.is_expiring_soon(self.config.expiry_lead()) {
            warn!(category, "Credential expiring soon, skipping periodic sync");
            return TickOutcome::CredentialExpiring;
        }
        if self.synced_recently(category, now) {
            return TickOutcome::RecentlySynced;
        }

        match self.refetch_category(category).await {
            Some(summary) => TickOutcome::Refreshed(summary),
            None => TickOutcome::AlreadySyncing,
        }
    }

    fn synced_recently(&self, category: &str, now: DateTime<Utc>) -> bool {
        let Some(last) = self.state().last_synced.get(category).copied() else {
            return false;
        };
        let interval = policy::sync_interval_for(category);
        let guard = Duration::milliseconds(
            (interval.num_milliseconds() as f64 * self.config.tick_guard_ratio) as i64,
        );
        now - last < guard
    }

    /// Suspend periodic ticks for `duration`; they resume on their own after.
    pub fn pause_sync(&self, duration: Duration) {
        let until = self.clock.now() + duration;
        self.state().paused_until = Some(until);
        info!(until = %until, "Periodic sync paused");
    }

    pub fn resume_sync(&self) {
        if self.state().paused_until.take().is_some() {
            info!("Periodic sync resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        let now = self.clock.now();
        self.state().paused_until.is_some_and(|until| now < until)
    }

    /// Ticks are skipped while the host application is in the background.
    /// Coming back to the foreground catches up every due category in scope.
    pub async fn set_app_active(&self, active: bool) -> SyncSummary {
        let was_active = std::mem::replace(&mut self.state().app_active, active);
        debug!(active, "App activity changed");
        if active && !was_active {
            info!("App active again, catching up");
            return self.catch_up().await;
        }
        SyncSummary::default()
    }

    /// Limit ticks to `categories` plus the always-synced ones; `None` lifts
    /// the limit. A new limit immediately catches up its due categories.
    pub async fn set_active_categories(&self, categories: Option<Vec<String>>) -> SyncSummary {
        let limited = categories.is_some();
        self.state().active_categories = categories.map(|list| list.into_iter().collect());
        if limited {
            return self.catch_up().await;
        }
        SyncSummary::default()
    }

    /// [`set_active_categories`](Self::set_active_categories) with the
    /// categories the named scope reads.
    pub async fn set_scope(&self, scope: Option<&str>) -> SyncSummary {
        let categories = scope.map(|scope| {
            policy::categories_for_scope(scope)
                .iter()
                .map(|c| c.to_string())
                .collect()
        });
        self.set_active_categories(categories).await
    }

    /// Tick every in-scope category whose full interval has elapsed.
    pub async fn catch_up(&self) -> SyncSummary {
        let now = self.clock.now();
        let due: Vec<&'static str> = {
            let state = self.state();
            if !state.app_active {
                return SyncSummary::default();
            }
            policy::categories()
                .into_iter()
                .filter(|category| state.in_scope(category) && state.is_due(category, now))
                .collect()
        };

        let outcomes = join_all(due.iter().map(|category| self.run_tick(category))).await;
        let mut summary = SyncSummary::default();
        for outcome in outcomes {
            if let TickOutcome::Refreshed(refreshed) = outcome {
                summary.merge(refreshed);
            }
        }
        debug!(categories = due.len(), refreshed = summary.total, "Catch-up finished");
        summary
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    pub fn cleanup(&self) {
        self.stop_periodic_sync();
        self.state().last_sync_time = None;
    }

    /// End of session: stop syncing, forget state, drop every cached entry.
    pub fn logout(&self) {
        self.cleanup();
        *self.state() = SyncState::new(&self.config);
        self.cache.clear();
        info!("Sync state and cache cleared for logout");
    }
}

/// Categories in order of first appearance, each with its tasks.
fn group_by_category(tasks: &[SyncTask]) -> Vec<(String, Vec<&SyncTask>)> {
    let mut groups: Vec<(String, Vec<&SyncTask>)> = Vec::new();
    for task in tasks {
        match groups.iter_mut().find(|(category, _)| *category == task.category) {
            Some((_, group)) => group.push(task),
            None => groups.push((task.category.clone(), vec![task])),
        }
    }
    groups
}
