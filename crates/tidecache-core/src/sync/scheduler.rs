//! Repeating per-category timers and the registry that owns them.

use std::collections::HashMap;
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// A spawned loop invoking a tick callback every `period`.
///
/// Stopping only prevents future ticks: a tick already running is left to
/// finish. Dropping the timer stops it as well.
pub struct SyncTimer {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SyncTimer {
    /// Must be called from within a tokio runtime. The first tick fires one
    /// `period` after spawning. The loop ends early if `tick` breaks.
    pub fn spawn<F, Fut>(name: String, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send,
    {
        let (stop, mut stopped) = watch::channel(false);
        // Anchored at spawn time, not at the task's first poll
        let start = Instant::now() + period;
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    // Fires on stop, and errors once the sender is dropped
                    _ = stopped.changed() => break,
                }
                if *stopped.borrow() {
                    break;
                }
                if tick().await.is_break() {
                    break;
                }
            }
            debug!(timer = %name, "Sync timer finished");
        });
        Self { stop, handle }
    }

    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Category → running timer. At most one timer per category.
#[derive(Default)]
pub struct TimerRegistry {
    timers: Mutex<HashMap<String, SyncTimer>>,
}

impl TimerRegistry {
    fn timers(&self) -> MutexGuard<'_, HashMap<String, SyncTimer>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a timer, stopping whatever was scheduled for the category before.
    pub fn insert(&self, category: &str, timer: SyncTimer) {
        if let Some(previous) = self.timers().insert(category.to_string(), timer) {
            previous.stop();
        }
    }

    /// Stop and forget every timer. Returns how many were running.
    pub fn stop_all(&self) -> usize {
        let drained: Vec<SyncTimer> = self.timers().drain().map(|(_, t)| t).collect();
        for timer in &drained {
            timer.stop();
        }
        drained.len()
    }

    pub fn is_scheduled(&self, category: &str) -> bool {
        self.timers()
            .get(category)
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.timers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn categories(&self) -> Vec<String> {
        let mut names: Vec<String> = self.timers().keys().cloned().collect();
        names.sort();
        names
    }
}
