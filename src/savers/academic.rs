//! Step 2: course, class group and modality.

use tracing::debug;

use super::{SaveContext, SavePolicy, SkipReason, Step, StepFailure, StepReport, StepResult};
use crate::draft::Draft;
use crate::remote::{AcademicFields, DraftId};

pub async fn save(ctx: SaveContext<'_>, identity: &DraftId, draft: &Draft) -> StepResult {
    if ctx.policy == SavePolicy::SkipIncomplete && !draft.academic.is_complete() {
        debug!(id = %identity, "academic fields incomplete, skipping step 2");
        return Ok(StepReport::skipped(
            Step::Academic,
            identity,
            SkipReason::AcademicIncomplete,
        ));
    }

    let fields = AcademicFields {
        course: text(&draft.academic.course),
        class_group: text(&draft.academic.class_group),
        modality: text(&draft.academic.modality),
    };
    ctx.client
        .patch_academic(identity, &fields)
        .await
        .map_err(|f| StepFailure::new(Step::Academic, f))?;
    Ok(StepReport::saved(Step::Academic, identity))
}

fn text(value: &Option<String>) -> String {
    value.as_deref().map(str::trim).unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{InMemoryDraftClient, RemoteCall, RemoteOperation};
    use crate::savers::StepOutcome;

    #[tokio::test]
    async fn test_skipped_when_incomplete() {
        let client = InMemoryDraftClient::new();
        let ctx = SaveContext::new(&client, SavePolicy::SkipIncomplete);
        let mut draft = Draft::default();
        draft.academic.course = Some("ADS".into());

        let report = save(ctx, &DraftId::new("d"), &draft).await.unwrap();
        assert_eq!(report.outcome, StepOutcome::Skipped(SkipReason::AcademicIncomplete));
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_sends_trimmed_fields() {
        let client = InMemoryDraftClient::new();
        let ctx = SaveContext::new(&client, SavePolicy::SkipIncomplete);
        let mut draft = Draft::default();
        draft.academic.course = Some(" ADS ".into());
        draft.academic.class_group = Some("T1".into());
        draft.academic.modality = Some("presencial".into());

        save(ctx, &DraftId::new("d"), &draft).await.unwrap();
        match &client.calls()[0] {
            RemoteCall::PatchAcademic { fields, .. } => assert_eq!(fields.course, "ADS"),
            other => panic!("Expected PatchAcademic, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_strict_policy_never_skips() {
        let client = InMemoryDraftClient::new();
        let ctx = SaveContext::new(&client, SavePolicy::Strict);
        save(ctx, &DraftId::new("d"), &Draft::default()).await.unwrap();
        assert_eq!(client.count(RemoteOperation::PatchAcademic), 1);
    }
}
