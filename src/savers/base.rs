//! Step 1: title, summary, category and banner. The only identity-minting step.

use tracing::{debug, warn};

use super::{Promotion, SaveContext, SavePolicy, Step, StepFailure, StepReport, StepResult};
use crate::draft::{Banner, Draft, RemoteFileRef};
use crate::remote::{BaseFields, DraftId, UploadPurpose};

/// Create the base resource when `identity` is absent, otherwise update it.
///
/// A pending banner is uploaded first. Under `SkipIncomplete` a failed banner
/// upload does not hold back the text fields; the banner is retried on the
/// next cycle. Under `Strict` it fails the step.
pub async fn save(ctx: SaveContext<'_>, identity: Option<&DraftId>, draft: &Draft) -> StepResult {
    let mut promotions = Vec::new();

    let banner = match &draft.banner {
        None => None,
        Some(Banner::Remote(reference)) => Some(reference.clone()),
        Some(Banner::Pending(upload)) => match ctx.client.upload_file(upload, UploadPurpose::Banner).await {
            Ok(reference) => {
                promotions.push(Promotion::Banner {
                    file_name: upload.file_name.clone(),
                    reference: reference.clone(),
                });
                Some(reference)
            }
            Err(failure) if ctx.policy == SavePolicy::SkipIncomplete => {
                warn!(file = %upload.file_name, error = %failure, "banner upload failed, saving without it");
                None
            }
            Err(failure) => return Err(StepFailure::new(Step::Base, failure)),
        },
    };

    let fields = base_fields(draft, banner);

    let identity = match identity {
        Some(id) => {
            ctx.client
                .patch_base(id, &fields)
                .await
                .map_err(|f| StepFailure::new(Step::Base, f).with_promotions(promotions.clone()))?;
            id.clone()
        }
        None => {
            let id = ctx
                .client
                .create_base(&fields)
                .await
                .map_err(|f| StepFailure::new(Step::Base, f).with_promotions(promotions.clone()))?;
            debug!(id = %id, "base resource created");
            id
        }
    };

    Ok(StepReport::saved(Step::Base, &identity).with_promotions(promotions))
}

fn base_fields(draft: &Draft, banner: Option<RemoteFileRef>) -> BaseFields {
    BaseFields {
        title: draft.title.trim().to_string(),
        summary: draft.summary.trim().to_string(),
        category: draft.category.clone(),
        banner,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::FileUpload;
    use crate::errors::RemoteFailure;
    use crate::remote::{InMemoryDraftClient, RemoteCall, RemoteOperation};

    fn draft() -> Draft {
        Draft {
            title: "  Projeto Solar  ".into(),
            summary: "Resumo".into(),
            category: Some("energia".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_creates_when_identity_absent() {
        let client = InMemoryDraftClient::new();
        let ctx = SaveContext::new(&client, SavePolicy::SkipIncomplete);
        let report = save(ctx, None, &draft()).await.unwrap();
        assert_eq!(report.identity.as_str(), "draft-1");
        assert_eq!(
            client.calls(),
            vec![RemoteCall::CreateBase {
                title: "Projeto Solar".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_patches_when_identity_present() {
        let client = InMemoryDraftClient::new();
        let ctx = SaveContext::new(&client, SavePolicy::SkipIncomplete);
        let id = DraftId::new("draft-9");
        let report = save(ctx, Some(&id), &draft()).await.unwrap();
        assert_eq!(report.identity, id);
        assert_eq!(client.count(RemoteOperation::CreateBase), 0);
        assert_eq!(client.count(RemoteOperation::PatchBase), 1);
    }

    #[tokio::test]
    async fn test_pending_banner_is_uploaded_and_promoted() {
        let client = InMemoryDraftClient::new();
        let ctx = SaveContext::new(&client, SavePolicy::SkipIncomplete);
        let mut d = draft();
        d.banner = Some(Banner::Pending(FileUpload::new("capa.png", "image/png", vec![1])));

        let report = save(ctx, None, &d).await.unwrap();
        assert_eq!(report.promotions.len(), 1);
        assert!(report.promotions[0].clone().apply(&mut d));
        assert!(matches!(d.banner, Some(Banner::Remote(_))));
    }

    #[tokio::test]
    async fn test_banner_failure_tolerated_under_skip_incomplete() {
        let client = InMemoryDraftClient::new();
        client.fail_next(RemoteOperation::UploadFile, RemoteFailure::network("offline"));
        let ctx = SaveContext::new(&client, SavePolicy::SkipIncomplete);
        let mut d = draft();
        d.banner = Some(Banner::Pending(FileUpload::new("capa.png", "image/png", vec![1])));

        let report = save(ctx, None, &d).await.unwrap();
        assert!(report.promotions.is_empty());
        assert_eq!(client.count(RemoteOperation::CreateBase), 1);
    }

    #[tokio::test]
    async fn test_banner_failure_fails_strict_step() {
        let client = InMemoryDraftClient::new();
        client.fail_next(RemoteOperation::UploadFile, RemoteFailure::http(500, "boom"));
        let ctx = SaveContext::new(&client, SavePolicy::Strict);
        let mut d = draft();
        d.banner = Some(Banner::Pending(FileUpload::new("capa.png", "image/png", vec![1])));

        let err = save(ctx, None, &d).await.unwrap_err();
        assert_eq!(err.step, Step::Base);
        assert_eq!(client.count(RemoteOperation::CreateBase), 0);
    }

    #[tokio::test]
    async fn test_create_failure_keeps_banner_promotion() {
        let client = InMemoryDraftClient::new();
        client.fail_next(RemoteOperation::CreateBase, RemoteFailure::http(500, "boom"));
        let ctx = SaveContext::new(&client, SavePolicy::SkipIncomplete);
        let mut d = draft();
        d.banner = Some(Banner::Pending(FileUpload::new("capa.png", "image/png", vec![1])));

        let err = save(ctx, None, &d).await.unwrap_err();
        assert_eq!(err.promotions.len(), 1);
    }
}
