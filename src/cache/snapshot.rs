use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::draft::{AcademicInfo, Draft, PhaseKind, RepositorySettings, TeamSpec};

/// Phase text only. Attachments never reach the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseDescriptions {
    #[serde(default)]
    pub ideation: String,
    #[serde(default)]
    pub modeling: String,
    #[serde(default)]
    pub prototyping: String,
    #[serde(default)]
    pub implementation: String,
}

impl PhaseDescriptions {
    pub fn get(&self, kind: PhaseKind) -> &str {
        match kind {
            PhaseKind::Ideation => &self.ideation,
            PhaseKind::Modeling => &self.modeling,
            PhaseKind::Prototyping => &self.prototyping,
            PhaseKind::Implementation => &self.implementation,
        }
    }

    fn set(&mut self, kind: PhaseKind, value: String) {
        match kind {
            PhaseKind::Ideation => self.ideation = value,
            PhaseKind::Modeling => self.modeling = value,
            PhaseKind::Prototyping => self.prototyping = value,
            PhaseKind::Implementation => self.implementation = value,
        }
    }
}

/// A draft with every binary and file reference stripped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftSnapshot {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub academic: AcademicInfo,
    #[serde(default)]
    pub team: TeamSpec,
    #[serde(default)]
    pub phases: PhaseDescriptions,
    #[serde(default)]
    pub repository: RepositorySettings,
    #[serde(default)]
    pub terms_accepted: bool,
}

impl From<&Draft> for DraftSnapshot {
    fn from(draft: &Draft) -> Self {
        let mut phases = PhaseDescriptions::default();
        for (kind, record) in draft.phases.iter() {
            phases.set(kind, record.description.clone());
        }
        Self {
            title: draft.title.clone(),
            summary: draft.summary.clone(),
            category: draft.category.clone(),
            academic: draft.academic.clone(),
            team: draft.team.clone(),
            phases,
            repository: draft.repository.clone(),
            terms_accepted: draft.terms_accepted,
        }
    }
}

/// The record stored on disk: a snapshot and when it was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub draft: DraftSnapshot,
    pub captured_at: DateTime<Utc>,
}

impl CacheSnapshot {
    pub fn capture(draft: &Draft) -> Self {
        Self {
            draft: DraftSnapshot::from(draft),
            captured_at: Utc::now(),
        }
    }
}

impl Draft {
    /// Restore the text fields of a snapshot. Banner and attachments held in
    /// memory are left as they are.
    pub fn merge_snapshot(&mut self, snapshot: &DraftSnapshot) {
        self.title = snapshot.title.clone();
        self.summary = snapshot.summary.clone();
        self.category = snapshot.category.clone();
        self.academic = snapshot.academic.clone();
        self.team = snapshot.team.clone();
        for kind in PhaseKind::ALL {
            self.phases.get_mut(kind).description = snapshot.phases.get(kind).to_string();
        }
        self.repository = snapshot.repository.clone();
        self.terms_accepted = snapshot.terms_accepted;
    }
}
