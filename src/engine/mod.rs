//! Draft synchronization engine.
//!
//! The engine is the only owner of the draft, its remote identity and the
//! local cache. It decides when to run the step savers and what to do with
//! their results:
//!
//! - `mutate` applies an edit, rewrites the cache and notifies the scheduler.
//! - `try_sync` is the silent auto-save cycle. Failures are logged only.
//! - `save_draft_explicit` and `publish` surface failures as classifications.
//!
//! At most one cycle runs at a time. The state lock is never held across a
//! remote call, so edits keep flowing while a cycle is in flight. Edits made
//! during a cycle are detected through the edit generation counter and keep
//! the draft marked as unsaved.

mod events;
mod state;

pub use events::{SyncEvent, SyncTrigger};
pub use state::{CycleReport, SkipCause, SyncAttempt, SyncState};

use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::cache::{CacheSnapshot, LocalCache};
use crate::classify::{Classification, ErrorCategory, classify_failure};
use crate::draft::validation::{explicit_save_violations, minimum_validity, publish_violations};
use crate::draft::{Draft, DraftPatch, ValidationRules, normalize_email};
use crate::errors::{CacheError, SyncError};
use crate::remote::{DraftId, RemoteDraftClient, ResolvedIdentities};
use crate::savers::{self, Promotion, SaveContext, SavePolicy, Step};
use state::EngineState;

/// Releases the reentrancy flag when dropped.
struct SyncGuard<'a>(&'a AtomicBool);

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct DraftEngine {
    client: Arc<dyn RemoteDraftClient>,
    cache: LocalCache,
    rules: ValidationRules,
    current_user_email: Option<String>,
    state: Mutex<EngineState>,
    syncing: AtomicBool,
    edits: watch::Sender<u64>,
    armed: watch::Sender<bool>,
    event_tx: Option<mpsc::Sender<SyncEvent>>,
}

impl DraftEngine {
    pub fn new(client: Arc<dyn RemoteDraftClient>, cache: LocalCache) -> Self {
        let (edits, _) = watch::channel(0);
        let (armed, _) = watch::channel(true);
        Self {
            client,
            cache,
            rules: ValidationRules::default(),
            current_user_email: None,
            state: Mutex::new(EngineState::new(Draft::default())),
            syncing: AtomicBool::new(false),
            edits,
            armed,
            event_tx: None,
        }
    }

    /// Start from an existing document. It counts as unsaved.
    pub fn with_draft(mut self, draft: Draft) -> Self {
        let state = self.state.get_mut();
        state.draft = draft;
        state.has_unsaved_changes = true;
        self
    }

    /// Resume a draft the remote side already knows. No recovery is offered.
    pub fn with_identity(mut self, id: DraftId) -> Self {
        self.state.get_mut().identity = Some(id);
        self
    }

    pub fn with_current_step(mut self, step: Step) -> Self {
        self.state.get_mut().current_step = step;
        self
    }

    pub fn with_rules(mut self, rules: ValidationRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_current_user(mut self, email: Option<String>) -> Self {
        self.current_user_email = email;
        self
    }

    /// Set the event channel for progress updates.
    pub fn with_event_channel(mut self, tx: mpsc::Sender<SyncEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Events never wait on the receiver; a full channel drops the event.
    async fn emit_event(&self, event: SyncEvent) {
        if let Some(ref tx) = self.event_tx {
            if let Err(mpsc::error::TrySendError::Full(event)) = tx.try_send(event) {
                debug!(?event, "event channel full, dropping event");
            }
        }
    }

    fn try_begin(&self) -> Option<SyncGuard<'_>> {
        self.syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SyncGuard(&self.syncing))
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    /// Edit generation; bumped by every mutation.
    pub fn subscribe_edits(&self) -> watch::Receiver<u64> {
        self.edits.subscribe()
    }

    /// Whether auto-save timers should run.
    pub fn subscribe_armed(&self) -> watch::Receiver<bool> {
        self.armed.subscribe()
    }

    /// Stop auto-save until [`Self::resume_autosave`].
    pub fn suspend_autosave(&self) {
        self.armed.send_replace(false);
    }

    pub fn resume_autosave(&self) {
        self.armed.send_replace(true);
    }

    fn bump_generation(&self) {
        self.edits.send_modify(|g| *g += 1);
    }

    fn generation(&self) -> u64 {
        *self.edits.borrow()
    }

    pub async fn draft(&self) -> Draft {
        self.state.lock().await.draft.clone()
    }

    pub async fn identity(&self) -> Option<DraftId> {
        self.state.lock().await.identity.clone()
    }

    pub async fn sync_state(&self) -> SyncState {
        let state = self.state.lock().await;
        SyncState {
            has_unsaved_changes: state.has_unsaved_changes,
            is_syncing: self.is_syncing(),
            last_synced_at: state.last_synced_at,
            current_step: state.current_step,
            identity: state.identity.clone(),
            published: state.published,
        }
    }

    pub async fn set_current_step(&self, step: Step) {
        self.state.lock().await.current_step = step;
    }

    /// Apply an edit, rewrite the cache and notify the scheduler.
    ///
    /// The edit is applied even if the cache write fails; the error is
    /// returned so the caller can tell the user recovery is unavailable.
    pub async fn mutate(&self, patch: DraftPatch) -> Result<(), CacheError> {
        let stored = {
            let mut state = self.state.lock().await;
            patch.apply(&mut state.draft);
            state.has_unsaved_changes = true;
            // bumped under the lock so a finishing cycle never misses it
            self.bump_generation();
            self.cache.store(&state.draft)
        };
        if let Err(ref e) = stored {
            warn!(error = %e, "failed to write cache snapshot");
        }
        stored.map(|_| ())
    }

    /// The cached snapshot to offer for recovery, at most once per session.
    ///
    /// Nothing is offered when the session resumes a known remote draft.
    pub async fn pending_recovery(&self) -> Result<Option<CacheSnapshot>, CacheError> {
        let mut state = self.state.lock().await;
        if state.recovery_offered || state.identity.is_some() {
            return Ok(None);
        }
        state.recovery_offered = true;
        self.cache.load()
    }

    /// Merge a cached snapshot into the draft and mark it unsaved.
    pub async fn recover_from_cache(&self, snapshot: &CacheSnapshot) {
        {
            let mut state = self.state.lock().await;
            state.draft.merge_snapshot(&snapshot.draft);
            state.has_unsaved_changes = true;
            self.bump_generation();
        }
        info!(captured_at = %snapshot.captured_at, "recovered draft from cache");
    }

    pub fn discard_cache(&self) -> Result<(), CacheError> {
        self.cache.clear()?;
        info!("discarded cached draft");
        Ok(())
    }

    /// Silent auto-save cycle.
    ///
    /// Runs steps `1..=current_step`. A failure at step 1 ends the cycle;
    /// later failures are logged and the remaining steps still run.
    pub async fn try_sync(&self) -> SyncAttempt {
        let Some(_guard) = self.try_begin() else {
            debug!("sync already in flight, dropping trigger");
            return SyncAttempt::Skipped(SkipCause::Busy);
        };

        let through = {
            let state = self.state.lock().await;
            if state.published {
                return SyncAttempt::Skipped(SkipCause::Published);
            }
            if !minimum_validity(&state.draft, &self.rules) {
                debug!("draft below minimum validity, skipping auto-save");
                return SyncAttempt::Skipped(SkipCause::NotReady);
            }
            if state.title_rejected() {
                debug!("title rejected as duplicate, skipping auto-save");
                return SyncAttempt::Skipped(SkipCause::DuplicateTitle);
            }
            state.current_step
        };

        let report = self
            .run_cycle(SyncTrigger::Auto, SavePolicy::SkipIncomplete, through, None)
            .await;

        for failure in &report.failures {
            let classification = classify_failure(&failure.failure);
            if failure.step == Step::Base && classification.category == ErrorCategory::DuplicateTitle {
                self.note_duplicate_title().await;
            } else {
                warn!(
                    step = failure.step.number(),
                    category = %classification.category,
                    error = %failure.failure,
                    "auto-save step failed"
                );
            }
        }

        SyncAttempt::Ran(report)
    }

    async fn note_duplicate_title(&self) {
        let title = {
            let mut state = self.state.lock().await;
            if state.title_rejected() {
                return;
            }
            let title = state.draft.title.trim().to_string();
            state.rejected_title = Some(title.clone());
            title
        };
        warn!(title = %title, "title already exists remotely, auto-save paused until it changes");
        self.emit_event(SyncEvent::DuplicateTitle { title }).await;
    }

    /// User-requested save.
    ///
    /// Validates first, then runs all five steps, stopping at the first
    /// failure. Auto-save is suspended on entry and resumed if the save fails.
    pub async fn save_draft_explicit(&self) -> Result<CycleReport, SyncError> {
        let Some(_guard) = self.try_begin() else {
            return Err(SyncError::Busy);
        };

        {
            let state = self.state.lock().await;
            if state.published {
                return Err(SyncError::AlreadyPublished);
            }
            let violations = explicit_save_violations(&state.draft, &self.rules);
            if !violations.is_empty() {
                return Err(Classification::validation(violations).into());
            }
        }

        self.suspend_autosave();
        let report = self
            .run_cycle(SyncTrigger::Explicit, SavePolicy::SkipIncomplete, Step::Visibility, None)
            .await;

        match report.first_failure() {
            Some(failure) => {
                self.resume_autosave();
                let classification = classify_failure(&failure.failure);
                info!(step = failure.step.number(), category = %classification.category, "explicit save failed");
                Err(classification.into())
            }
            None => {
                self.state.lock().await.rejected_title = None;
                if report.edited_during_cycle {
                    debug!("draft edited during explicit save, resuming auto-save");
                    self.resume_autosave();
                }
                Ok(report)
            }
        }
    }

    /// Validate, resolve every team address, then write all five steps and
    /// submit the draft for publication.
    ///
    /// Nothing is written remotely unless every check passes. A published
    /// session refuses further publish and save calls.
    pub async fn publish(&self) -> Result<CycleReport, SyncError> {
        if self.state.lock().await.published {
            return Err(SyncError::AlreadyPublished);
        }
        let Some(_guard) = self.try_begin() else {
            return Err(SyncError::Busy);
        };

        let draft = {
            let state = self.state.lock().await;
            if state.published {
                return Err(SyncError::AlreadyPublished);
            }
            state.draft.clone()
        };
        check_publishable(&draft, &self.rules)?;

        let emails = draft.team.all_emails();
        let resolved = self
            .client
            .resolve_identities(&emails)
            .await
            .map_err(|f| SyncError::from(classify_failure(&f)))?;
        check_team(&draft, &resolved)?;

        self.suspend_autosave();
        let report = self
            .run_cycle(SyncTrigger::Publish, SavePolicy::Strict, Step::Visibility, Some(&resolved))
            .await;

        if let Some(failure) = report.first_failure() {
            self.resume_autosave();
            let classification = classify_failure(&failure.failure);
            info!(step = failure.step.number(), category = %classification.category, "publish failed");
            return Err(classification.into());
        }

        let id = {
            let mut state = self.state.lock().await;
            state.published = true;
            state.identity.clone()
        };
        if report.edited_during_cycle {
            warn!("draft edited during publish, keeping the edit in the local cache");
        }
        if let Some(id) = id {
            info!(id = %id, "draft published");
            self.emit_event(SyncEvent::Published { id }).await;
        }
        Ok(report)
    }

    /// Run the step savers in order against a snapshot of the draft.
    ///
    /// Under `SkipIncomplete` with an auto trigger every step after the base
    /// runs even if an earlier one failed. Explicit save and publish stop at
    /// the first failure.
    async fn run_cycle(
        &self,
        trigger: SyncTrigger,
        policy: SavePolicy,
        through: Step,
        resolved: Option<&ResolvedIdentities>,
    ) -> CycleReport {
        let (draft, identity, generation) = {
            let state = self.state.lock().await;
            (state.draft.clone(), state.identity.clone(), self.generation())
        };
        self.emit_event(SyncEvent::CycleStarted { trigger }).await;
        debug!(%trigger, through = through.number(), has_identity = identity.is_some(), "sync cycle started");

        let mut ctx = SaveContext::new(self.client.as_ref(), policy)
            .with_current_user(self.current_user_email.as_deref());
        if let Some(resolved) = resolved {
            ctx = ctx.with_resolved(resolved);
        }
        let stop_on_failure = trigger != SyncTrigger::Auto;
        let mut report = CycleReport::new(trigger);

        let id = match savers::base::save(ctx, identity.as_ref(), &draft).await {
            Ok(step) => {
                let assigned = step.identity.clone();
                self.apply_promotions(step.promotions.clone()).await;
                report.steps.push(step);
                if identity.is_none() {
                    self.record_identity(&assigned).await;
                }
                Some(assigned)
            }
            Err(failure) => {
                self.apply_promotions(failure.promotions.clone()).await;
                report.failures.push(failure);
                None
            }
        };

        if let Some(id) = &id {
            for step in through.through().skip(1) {
                match savers::save_step(ctx, step, id, &draft).await {
                    Ok(saved) => {
                        self.apply_promotions(saved.promotions.clone()).await;
                        report.steps.push(saved);
                    }
                    Err(failure) => {
                        self.apply_promotions(failure.promotions.clone()).await;
                        report.failures.push(failure);
                        if stop_on_failure {
                            break;
                        }
                    }
                }
            }
        }
        report.identity = id;

        self.finish_cycle(&mut report, generation).await;
        info!(
            %trigger,
            saved = report.saved_steps().len(),
            failed = report.failures.len(),
            cache_cleared = report.cache_cleared,
            "sync cycle finished"
        );
        self.emit_event(SyncEvent::CycleFinished {
            trigger,
            saved: report.saved_steps(),
            failed: report.failed_steps(),
            cache_cleared: report.cache_cleared,
        })
        .await;
        report
    }

    async fn record_identity(&self, id: &DraftId) {
        {
            let mut state = self.state.lock().await;
            match &state.identity {
                None => state.identity = Some(id.clone()),
                Some(existing) if existing == id => return,
                Some(existing) => {
                    error!(existing = %existing, offered = %id, "refusing a second remote identity");
                    return;
                }
            }
        }
        info!(id = %id, "remote draft created");
        self.emit_event(SyncEvent::IdentityAssigned { id: id.clone() }).await;
    }

    async fn apply_promotions(&self, promotions: Vec<Promotion>) {
        if promotions.is_empty() {
            return;
        }
        let mut state = self.state.lock().await;
        for promotion in promotions {
            if !promotion.apply(&mut state.draft) {
                debug!("uploaded item changed during the cycle, keeping the newer version");
            }
        }
    }

    /// Settle sync state and the cache once a cycle is over.
    ///
    /// The cache is cleared when the base step succeeded and nothing was
    /// edited meanwhile. The draft only counts as saved when no step failed.
    async fn finish_cycle(&self, report: &mut CycleReport, generation: u64) {
        let mut state = self.state.lock().await;
        report.edited_during_cycle = self.generation() != generation;
        if !report.base_saved() {
            return;
        }

        state.last_synced_at = Some(Utc::now());
        if report.edited_during_cycle {
            debug!("draft edited during sync, keeping cache");
            return;
        }
        if report.failures.is_empty() {
            state.has_unsaved_changes = false;
        }
        match self.cache.clear() {
            Ok(()) => report.cache_cleared = true,
            Err(e) => warn!(error = %e, "failed to clear cache after sync"),
        }
    }
}

fn check_publishable(draft: &Draft, rules: &ValidationRules) -> Result<(), SyncError> {
    let violations = publish_violations(draft, rules);
    if !violations.is_empty() {
        return Err(Classification::validation(violations).into());
    }
    if draft.team.authors.iter().all(|a| a.trim().is_empty()) {
        return Err(Classification::leader_undefined().into());
    }
    if !draft.terms_accepted {
        return Err(Classification::terms_not_accepted().into());
    }
    Ok(())
}

fn check_team(draft: &Draft, resolved: &ResolvedIdentities) -> Result<(), SyncError> {
    if !resolved.unresolved.is_empty() {
        return Err(Classification::invalid_team(resolved.unresolved.clone()).into());
    }
    let has_author = draft.team.authors.iter().any(|email| {
        let email = normalize_email(email);
        resolved
            .authors
            .iter()
            .any(|u| normalize_email(&u.email) == email)
    });
    if !has_author {
        return Err(Classification::leader_undefined().into());
    }
    Ok(())
}
