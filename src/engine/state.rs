use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::draft::Draft;
use crate::remote::DraftId;
use crate::savers::{Step, StepFailure, StepOutcome, StepReport};

use super::events::SyncTrigger;

/// Everything the engine owns, behind one lock.
#[derive(Debug, Clone)]
pub(crate) struct EngineState {
    pub draft: Draft,
    pub identity: Option<DraftId>,
    pub has_unsaved_changes: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub current_step: Step,
    /// Set once publish succeeds; later publish calls are refused.
    pub published: bool,
    /// Title the remote side rejected as a duplicate during auto-save.
    pub rejected_title: Option<String>,
    pub recovery_offered: bool,
}

impl EngineState {
    pub fn new(draft: Draft) -> Self {
        Self {
            draft,
            identity: None,
            has_unsaved_changes: false,
            last_synced_at: None,
            current_step: Step::Base,
            published: false,
            rejected_title: None,
            recovery_offered: false,
        }
    }

    /// Whether auto-save is holding back because of a duplicate title.
    pub fn title_rejected(&self) -> bool {
        self.rejected_title
            .as_deref()
            .is_some_and(|t| t.trim() == self.draft.title.trim())
    }
}

/// Read-only view of the engine for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncState {
    pub has_unsaved_changes: bool,
    pub is_syncing: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub current_step: Step,
    pub identity: Option<DraftId>,
    pub published: bool,
}

/// Why `try_sync` did not run a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipCause {
    /// Another cycle is in flight.
    Busy,
    /// The draft does not meet the minimum validity gate.
    NotReady,
    /// The current title was rejected as a duplicate.
    DuplicateTitle,
    Published,
}

/// Result of one `try_sync` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAttempt {
    Skipped(SkipCause),
    Ran(CycleReport),
}

impl SyncAttempt {
    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            SyncAttempt::Ran(report) => Some(report),
            SyncAttempt::Skipped(_) => None,
        }
    }
}

/// What one sync cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub trigger: SyncTrigger,
    pub identity: Option<DraftId>,
    pub steps: Vec<StepReport>,
    pub failures: Vec<StepFailure>,
    pub cache_cleared: bool,
    /// The draft was edited while the cycle was in flight.
    pub edited_during_cycle: bool,
}

impl CycleReport {
    pub(crate) fn new(trigger: SyncTrigger) -> Self {
        Self {
            trigger,
            identity: None,
            steps: Vec::new(),
            failures: Vec::new(),
            cache_cleared: false,
            edited_during_cycle: false,
        }
    }

    pub fn base_saved(&self) -> bool {
        self.steps.iter().any(|r| r.step == Step::Base)
    }

    pub fn is_complete(&self) -> bool {
        self.base_saved() && self.failures.is_empty()
    }

    pub fn saved_steps(&self) -> Vec<Step> {
        self.steps
            .iter()
            .filter(|r| r.outcome == StepOutcome::Saved)
            .map(|r| r.step)
            .collect()
    }

    pub fn failed_steps(&self) -> Vec<Step> {
        self.failures.iter().map(|f| f.step).collect()
    }

    pub fn first_failure(&self) -> Option<&StepFailure> {
        self.failures.first()
    }
}
