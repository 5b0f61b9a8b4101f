//! Step 5: repository link, visibility switches and terms acceptance.

use super::{SaveContext, SavePolicy, Step, StepFailure, StepReport, StepResult};
use crate::draft::{Draft, is_filled};
use crate::remote::{DraftId, VisibilityFields};

pub async fn save(ctx: SaveContext<'_>, identity: &DraftId, draft: &Draft) -> StepResult {
    let settings = visibility_fields(draft, ctx.policy == SavePolicy::Strict);
    ctx.client
        .patch_visibility(identity, &settings)
        .await
        .map_err(|f| StepFailure::new(Step::Visibility, f))?;
    Ok(StepReport::saved(Step::Visibility, identity))
}

fn visibility_fields(draft: &Draft, publish: bool) -> VisibilityFields {
    let repo = &draft.repository;
    let repository_url = if repo.has_repository && is_filled(&repo.repository_url) {
        repo.repository_url.as_deref().map(|u| u.trim().to_string())
    } else {
        None
    };
    VisibilityFields {
        has_repository: repo.has_repository,
        repository_url,
        code_public: repo.code_public,
        project_public: repo.project_public,
        terms_accepted: draft.terms_accepted,
        publish,
    }
}
