//! Auto-save scheduler.
//!
//! Two triggers drive [`DraftEngine::try_sync`]:
//! - a trailing debounce, reset by every edit, that fires once edits stop
//! - a ceiling interval that fires regardless of typing whenever the draft
//!   has unsaved changes
//!
//! Syncs are spawned so the timers keep running while a cycle is in flight;
//! a trigger that lands during a cycle is dropped by the engine's guard.
//! The engine can disarm the scheduler (explicit save, publish); disarmed
//! timers never trigger. Shutting down or dropping the handle stops the task.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::debug;

use crate::config::AutosaveSection;
use crate::engine::DraftEngine;

/// Timer settings. A zero ceiling disables the ceiling timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoSaveTimings {
    pub debounce: Duration,
    pub ceiling: Duration,
}

impl Default for AutoSaveTimings {
    fn default() -> Self {
        Self::from(&AutosaveSection::default())
    }
}

impl From<&AutosaveSection> for AutoSaveTimings {
    fn from(section: &AutosaveSection) -> Self {
        Self {
            debounce: section.debounce(),
            ceiling: section.ceiling(),
        }
    }
}

/// Why a sync was triggered. Used in logs only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Debounce,
    Ceiling,
}

pub struct AutoSaveScheduler;

impl AutoSaveScheduler {
    /// Start the scheduler task for `engine`.
    pub fn spawn(engine: Arc<DraftEngine>, timings: AutoSaveTimings) -> SchedulerHandle {
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(run(engine, timings, stop_rx));
        SchedulerHandle {
            stop: Some(stop_tx),
            task: Some(task),
        }
    }
}

/// Owns the scheduler task. Dropping the handle aborts it.
pub struct SchedulerHandle {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stop the timers and wait for the task to exit.
    ///
    /// A sync already in flight is not cancelled.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            stop.send(()).ok();
        }
        if let Some(task) = self.task.take() {
            task.await.ok();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn ceiling_interval(period: Duration) -> Option<Interval> {
    if period.is_zero() {
        return None;
    }
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(interval)
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn fire(engine: &Arc<DraftEngine>, trigger: Trigger) {
    debug!(?trigger, "auto-save triggered");
    let engine = Arc::clone(engine);
    tokio::spawn(async move {
        engine.try_sync().await;
    });
}

async fn run(engine: Arc<DraftEngine>, timings: AutoSaveTimings, mut stop: oneshot::Receiver<()>) {
    let mut edits = engine.subscribe_edits();
    let mut armed = engine.subscribe_armed();
    let mut ceiling = ceiling_interval(timings.ceiling);

    let debounce = tokio::time::sleep(timings.debounce);
    tokio::pin!(debounce);
    let mut debounce_pending = false;

    loop {
        tokio::select! {
            _ = &mut stop => break,
            changed = edits.changed() => {
                if changed.is_err() {
                    break;
                }
                if *armed.borrow() {
                    debounce.as_mut().reset(Instant::now() + timings.debounce);
                    debounce_pending = true;
                }
            }
            _ = &mut debounce, if debounce_pending => {
                debounce_pending = false;
                fire(&engine, Trigger::Debounce);
            }
            _ = next_tick(&mut ceiling) => {
                if *armed.borrow() && engine.sync_state().await.has_unsaved_changes {
                    fire(&engine, Trigger::Ceiling);
                }
            }
            changed = armed.changed() => {
                if changed.is_err() {
                    break;
                }
                let now_armed = *armed.borrow_and_update();
                debug!(armed = now_armed, "auto-save armed state changed");
                if now_armed {
                    if let Some(interval) = ceiling.as_mut() {
                        interval.reset();
                    }
                } else {
                    debounce_pending = false;
                }
            }
        }
    }
    debug!("auto-save scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LocalCache;
    use crate::draft::{Draft, DraftPatch};
    use crate::remote::{InMemoryDraftClient, RemoteOperation};
    use tempfile::{TempDir, tempdir};

    fn valid_draft() -> Draft {
        Draft {
            title: "Projeto Solar".into(),
            summary: "x".repeat(60),
            category: Some("energia".into()),
            ..Default::default()
        }
    }

    fn setup() -> (Arc<InMemoryDraftClient>, Arc<DraftEngine>, TempDir) {
        let dir = tempdir().unwrap();
        let client = Arc::new(InMemoryDraftClient::new());
        let engine = DraftEngine::new(client.clone(), LocalCache::new(dir.path(), "s"))
            .with_draft(valid_draft());
        (client, Arc::new(engine), dir)
    }

    fn timings() -> AutoSaveTimings {
        AutoSaveTimings {
            debounce: Duration::from_secs(5),
            ceiling: Duration::from_secs(60),
        }
    }

    async fn type_char(engine: &DraftEngine, n: usize) {
        engine
            .mutate(DraftPatch::summary("y".repeat(60 + n)))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_fires_after_quiet_period() {
        let (client, engine, _dir) = setup();
        let _handle = AutoSaveScheduler::spawn(engine.clone(), timings());
        tokio::task::yield_now().await;

        type_char(&engine, 1).await;
        tokio::time::sleep(Duration::from_secs(3)).await;
        type_char(&engine, 2).await;
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(client.count(RemoteOperation::CreateBase), 0);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(client.count(RemoteOperation::CreateBase), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ceiling_fires_during_continuous_typing() {
        let (client, engine, _dir) = setup();
        let _handle = AutoSaveScheduler::spawn(engine.clone(), timings());
        tokio::task::yield_now().await;

        for n in 0..32 {
            type_char(&engine, n).await;
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
        assert_eq!(client.count(RemoteOperation::CreateBase), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ceiling_ignores_clean_draft() {
        let (client, engine, _dir) = setup();
        engine.try_sync().await;
        assert_eq!(client.count(RemoteOperation::CreateBase), 1);
        client.reset_calls();

        let _handle = AutoSaveScheduler::spawn(engine.clone(), timings());
        tokio::time::sleep(Duration::from_secs(130)).await;
        assert!(client.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarmed_scheduler_never_triggers() {
        let (client, engine, _dir) = setup();
        let _handle = AutoSaveScheduler::spawn(engine.clone(), timings());
        tokio::task::yield_now().await;

        engine.suspend_autosave();
        tokio::task::yield_now().await;
        type_char(&engine, 1).await;
        tokio::time::sleep(Duration::from_secs(110)).await;
        assert!(client.calls().is_empty());

        engine.resume_autosave();
        tokio::task::yield_now().await;
        type_char(&engine, 2).await;
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(client.count(RemoteOperation::CreateBase), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_timers() {
        let (client, engine, _dir) = setup();
        let handle = AutoSaveScheduler::spawn(engine.clone(), timings());
        assert!(handle.is_running());
        handle.shutdown().await;

        type_char(&engine, 1).await;
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(client.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_timers() {
        let (client, engine, _dir) = setup();
        drop(AutoSaveScheduler::spawn(engine.clone(), timings()));

        type_char(&engine, 1).await;
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(client.calls().is_empty());
    }

    #[test]
    fn test_timings_from_config() {
        let timings = AutoSaveTimings::default();
        assert_eq!(timings.debounce, Duration::from_secs(5));
        assert_eq!(timings.ceiling, Duration::from_secs(60));
    }
}
