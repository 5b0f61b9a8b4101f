//! Step savers: one function per remote step, run in strict order.
//!
//! Step 1 is the only saver that can mint a [`DraftId`]; the others take an
//! identity by reference, so a dependent step cannot be expressed without
//! one. Savers never mutate the draft. Files they upload ahead of a step
//! are reported back as [`Promotion`]s and applied to the live draft by the
//! engine, which keeps later cycles from uploading the same bytes again.

pub mod academic;
pub mod base;
pub mod phases;
pub mod team;
pub mod visibility;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::draft::{Draft, PhaseKind, RemoteFileRef};
use crate::errors::RemoteFailure;
use crate::remote::{DraftId, RemoteDraftClient, ResolvedIdentities};

/// The five remote steps, in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Step {
    Base = 1,
    Academic = 2,
    Team = 3,
    Phases = 4,
    Visibility = 5,
}

impl Step {
    pub const ALL: [Step; 5] = [
        Step::Base,
        Step::Academic,
        Step::Team,
        Step::Phases,
        Step::Visibility,
    ];

    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn from_number(n: u8) -> Option<Step> {
        Step::ALL.into_iter().find(|s| s.number() == n)
    }

    pub fn label(self) -> &'static str {
        match self {
            Step::Base => "base",
            Step::Academic => "academic",
            Step::Team => "team",
            Step::Phases => "phases",
            Step::Visibility => "visibility",
        }
    }

    /// Steps `1..=self`, in order.
    pub fn through(self) -> impl Iterator<Item = Step> {
        Step::ALL.into_iter().take_while(move |s| *s <= self)
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "step {} ({})", self.number(), self.label())
    }
}

impl From<Step> for u8 {
    fn from(step: Step) -> u8 {
        step.number()
    }
}

impl TryFrom<u8> for Step {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Step::from_number(value).ok_or_else(|| format!("step must be between 1 and 5, got {}", value))
    }
}

/// How strictly a saver treats missing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePolicy {
    /// Auto-save and explicit save: skip steps whose data is incomplete and
    /// upload pending binaries ahead of the step write.
    SkipIncomplete,
    /// Publish: run every step, send pending phase binaries inline with the
    /// step 4 request, and mark the visibility write as a publication.
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AcademicIncomplete,
    TeamEmpty,
    NoResolvedMembers,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::AcademicIncomplete => f.write_str("course, class or modality missing"),
            SkipReason::TeamEmpty => f.write_str("no authors or advisors"),
            SkipReason::NoResolvedMembers => f.write_str("no team address resolved to an account"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum StepOutcome {
    Saved,
    Skipped(SkipReason),
}

/// A pending file that now has a remote reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Promotion {
    Banner {
        file_name: String,
        reference: RemoteFileRef,
    },
    Attachment {
        phase: PhaseKind,
        id: Uuid,
        reference: RemoteFileRef,
    },
}

impl Promotion {
    /// Apply to the live draft. Returns false if the item changed meanwhile.
    pub fn apply(self, draft: &mut Draft) -> bool {
        match self {
            Promotion::Banner {
                file_name,
                reference,
            } => draft.promote_banner(&file_name, reference),
            Promotion::Attachment {
                phase,
                id,
                reference,
            } => draft.promote_attachment(phase, id, reference),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub step: Step,
    pub outcome: StepOutcome,
    pub identity: DraftId,
    pub promotions: Vec<Promotion>,
}

impl StepReport {
    fn saved(step: Step, identity: &DraftId) -> Self {
        Self {
            step,
            outcome: StepOutcome::Saved,
            identity: identity.clone(),
            promotions: Vec::new(),
        }
    }

    fn skipped(step: Step, identity: &DraftId, reason: SkipReason) -> Self {
        Self {
            step,
            outcome: StepOutcome::Skipped(reason),
            identity: identity.clone(),
            promotions: Vec::new(),
        }
    }

    fn with_promotions(mut self, promotions: Vec<Promotion>) -> Self {
        self.promotions = promotions;
        self
    }
}

/// A failed step, with any uploads that succeeded before the failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub step: Step,
    pub failure: RemoteFailure,
    pub promotions: Vec<Promotion>,
}

impl StepFailure {
    pub fn new(step: Step, failure: RemoteFailure) -> Self {
        Self {
            step,
            failure,
            promotions: Vec::new(),
        }
    }

    fn with_promotions(mut self, promotions: Vec<Promotion>) -> Self {
        self.promotions = promotions;
        self
    }
}

impl std::fmt::Display for StepFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed: {}", self.step, self.failure)
    }
}

pub type StepResult = Result<StepReport, StepFailure>;

/// Everything a saver needs besides the draft itself.
#[derive(Clone, Copy)]
pub struct SaveContext<'a> {
    pub client: &'a dyn RemoteDraftClient,
    pub policy: SavePolicy,
    /// The signed-in user, for drafts where the current user leads the team.
    pub current_user_email: Option<&'a str>,
    /// Identities resolved ahead of the cycle; the team saver resolves on its
    /// own when absent.
    pub resolved: Option<&'a ResolvedIdentities>,
}

impl<'a> SaveContext<'a> {
    pub fn new(client: &'a dyn RemoteDraftClient, policy: SavePolicy) -> Self {
        Self {
            client,
            policy,
            current_user_email: None,
            resolved: None,
        }
    }

    pub fn with_current_user(mut self, email: Option<&'a str>) -> Self {
        self.current_user_email = email;
        self
    }

    pub fn with_resolved(mut self, resolved: &'a ResolvedIdentities) -> Self {
        self.resolved = Some(resolved);
        self
    }
}

/// Run a step that depends on an existing identity.
///
/// `Step::Base` is accepted too and always updates, never creates.
pub async fn save_step(ctx: SaveContext<'_>, step: Step, identity: &DraftId, draft: &Draft) -> StepResult {
    match step {
        Step::Base => base::save(ctx, Some(identity), draft).await,
        Step::Academic => academic::save(ctx, identity, draft).await,
        Step::Team => team::save(ctx, identity, draft).await,
        Step::Phases => phases::save(ctx, identity, draft).await,
        Step::Visibility => visibility::save(ctx, identity, draft).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_serializes_as_number() {
        assert_eq!(serde_json::to_value(Step::Team).unwrap(), 3);
        let step: Step = serde_json::from_str("4").unwrap();
        assert_eq!(step, Step::Phases);
        assert!(serde_json::from_str::<Step>("9").is_err());
    }

    #[test]
    fn test_through_is_inclusive_and_ordered() {
        let steps: Vec<Step> = Step::Team.through().collect();
        assert_eq!(steps, vec![Step::Base, Step::Academic, Step::Team]);
        assert_eq!(Step::Base.through().count(), 1);
    }

    #[test]
    fn test_from_number_bounds() {
        assert_eq!(Step::from_number(1), Some(Step::Base));
        assert_eq!(Step::from_number(5), Some(Step::Visibility));
        assert_eq!(Step::from_number(0), None);
        assert_eq!(Step::from_number(6), None);
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(StepOutcome::Skipped(SkipReason::TeamEmpty)).unwrap();
        assert_eq!(json["outcome"], "skipped");
        assert_eq!(json["reason"], "team_empty");
    }
}
