//! Partial updates to a [`Draft`].
//!
//! Every field is optional; `None` leaves the draft untouched. Blank strings
//! clear optional text fields.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Attachment, Banner, Draft, PhaseKind};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhasePatch {
    pub phase: PhaseKind,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub add_attachments: Vec<Attachment>,
    #[serde(default)]
    pub remove_attachments: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub banner: Option<Banner>,
    #[serde(default)]
    pub clear_banner: bool,
    #[serde(default)]
    pub course: Option<String>,
    #[serde(default)]
    pub class_group: Option<String>,
    #[serde(default)]
    pub modality: Option<String>,
    #[serde(default)]
    pub authors: Option<Vec<String>>,
    #[serde(default)]
    pub advisors: Option<Vec<String>>,
    #[serde(default)]
    pub leader_email: Option<String>,
    #[serde(default)]
    pub current_user_is_leader: Option<bool>,
    #[serde(default)]
    pub phases: Vec<PhasePatch>,
    #[serde(default)]
    pub has_repository: Option<bool>,
    #[serde(default)]
    pub repository_url: Option<String>,
    #[serde(default)]
    pub code_public: Option<bool>,
    #[serde(default)]
    pub project_public: Option<bool>,
    #[serde(default)]
    pub terms_accepted: Option<bool>,
}

impl DraftPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn summary(summary: impl Into<String>) -> Self {
        Self {
            summary: Some(summary.into()),
            ..Default::default()
        }
    }

    pub fn phase_description(phase: PhaseKind, description: impl Into<String>) -> Self {
        Self {
            phases: vec![PhasePatch {
                phase,
                description: Some(description.into()),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    pub fn add_attachment(phase: PhaseKind, attachment: Attachment) -> Self {
        Self {
            phases: vec![PhasePatch {
                phase,
                add_attachments: vec![attachment],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == DraftPatch::default()
    }

    /// Apply this patch to `draft` in place.
    pub fn apply(self, draft: &mut Draft) {
        if let Some(title) = self.title {
            draft.title = title;
        }
        if let Some(summary) = self.summary {
            draft.summary = summary;
        }
        if let Some(category) = self.category {
            draft.category = non_blank(category);
        }
        if self.clear_banner {
            draft.banner = None;
        }
        if let Some(banner) = self.banner {
            draft.banner = Some(banner);
        }
        if let Some(course) = self.course {
            draft.academic.course = non_blank(course);
        }
        if let Some(class_group) = self.class_group {
            draft.academic.class_group = non_blank(class_group);
        }
        if let Some(modality) = self.modality {
            draft.academic.modality = non_blank(modality);
        }
        if let Some(authors) = self.authors {
            draft.team.authors = authors;
        }
        if let Some(advisors) = self.advisors {
            draft.team.advisors = advisors;
        }
        if let Some(leader) = self.leader_email {
            draft.team.leader_email = non_blank(leader);
        }
        if let Some(flag) = self.current_user_is_leader {
            draft.team.current_user_is_leader = flag;
        }
        for phase_patch in self.phases {
            let record = draft.phases.get_mut(phase_patch.phase);
            if let Some(description) = phase_patch.description {
                record.description = description;
            }
            if !phase_patch.remove_attachments.is_empty() {
                record
                    .attachments
                    .retain(|a| !phase_patch.remove_attachments.contains(&a.id));
            }
            record.attachments.extend(phase_patch.add_attachments);
        }
        if let Some(has_repository) = self.has_repository {
            draft.repository.has_repository = has_repository;
        }
        if let Some(url) = self.repository_url {
            draft.repository.repository_url = non_blank(url);
        }
        if let Some(code_public) = self.code_public {
            draft.repository.code_public = code_public;
        }
        if let Some(project_public) = self.project_public {
            draft.repository.project_public = project_public;
        }
        if let Some(accepted) = self.terms_accepted {
            draft.terms_accepted = accepted;
        }
    }
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
