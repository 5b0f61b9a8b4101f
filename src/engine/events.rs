use serde::{Deserialize, Serialize};

use crate::remote::DraftId;
use crate::savers::Step;

/// What started a sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    Auto,
    Explicit,
    Publish,
}

impl std::fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncTrigger::Auto => write!(f, "auto"),
            SyncTrigger::Explicit => write!(f, "explicit"),
            SyncTrigger::Publish => write!(f, "publish"),
        }
    }
}

/// Events emitted by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    CycleStarted {
        trigger: SyncTrigger,
    },
    CycleFinished {
        trigger: SyncTrigger,
        saved: Vec<Step>,
        failed: Vec<Step>,
        cache_cleared: bool,
    },
    /// The remote side assigned the draft its identity.
    IdentityAssigned {
        id: DraftId,
    },
    /// Auto-save hit a duplicate title. Emitted once per rejected title;
    /// auto-save stops writing until the title changes.
    DuplicateTitle {
        title: String,
    },
    Published {
        id: DraftId,
    },
}
