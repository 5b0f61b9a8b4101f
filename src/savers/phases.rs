//! Step 4: the four phase records in one request.
//!
//! Each attachment is sent as one of three kinds: an external link, a
//! reference to a file the remote side already stores, or new binary
//! content. Phases are prepared concurrently since none depends on another.

use futures::future::join_all;
use tracing::{debug, warn};

use super::{Promotion, SaveContext, SavePolicy, Step, StepFailure, StepReport, StepResult};
use crate::draft::{AttachmentSource, Draft, PhaseKind, PhaseRecord};
use crate::errors::RemoteFailure;
use crate::remote::{AttachmentPayload, DraftId, PhasePayload, RemoteDraftClient, UploadPurpose};

struct PreparedPhase {
    payload: PhasePayload,
    promotions: Vec<Promotion>,
    failure: Option<RemoteFailure>,
}

pub async fn save(ctx: SaveContext<'_>, identity: &DraftId, draft: &Draft) -> StepResult {
    let prepared = join_all(
        draft
            .phases
            .iter()
            .map(|(kind, record)| prepare_phase(ctx.client, ctx.policy, kind, record)),
    )
    .await;

    let mut payloads = Vec::with_capacity(prepared.len());
    let mut promotions = Vec::new();
    let mut first_failure = None;
    for phase in prepared {
        promotions.extend(phase.promotions);
        if first_failure.is_none() {
            first_failure = phase.failure;
        }
        payloads.push(phase.payload);
    }

    if let Some(failure) = first_failure {
        return Err(StepFailure::new(Step::Phases, failure).with_promotions(promotions));
    }

    let binaries: usize = payloads.iter().map(PhasePayload::binary_count).sum();
    debug!(id = %identity, uploaded = promotions.len(), inline = binaries, "sending phases");

    match ctx.client.patch_phases(identity, &payloads).await {
        Ok(()) => Ok(StepReport::saved(Step::Phases, identity).with_promotions(promotions)),
        Err(failure) => Err(StepFailure::new(Step::Phases, failure).with_promotions(promotions)),
    }
}

async fn prepare_phase(
    client: &dyn RemoteDraftClient,
    policy: SavePolicy,
    kind: PhaseKind,
    record: &PhaseRecord,
) -> PreparedPhase {
    let mut attachments = Vec::with_capacity(record.attachments.len());
    let mut promotions = Vec::new();
    let mut failure = None;

    for attachment in &record.attachments {
        let name = attachment.name.clone();
        match &attachment.source {
            AttachmentSource::Link { url } => {
                attachments.push(AttachmentPayload::Link {
                    name,
                    url: url.clone(),
                });
            }
            AttachmentSource::Remote(reference) => {
                attachments.push(AttachmentPayload::Existing {
                    name,
                    reference: reference.reference.clone(),
                });
            }
            AttachmentSource::Pending(upload) if policy == SavePolicy::Strict => {
                attachments.push(AttachmentPayload::Binary {
                    name,
                    file: upload.clone(),
                });
            }
            AttachmentSource::Pending(upload) => {
                if failure.is_some() {
                    continue;
                }
                match client.upload_file(upload, UploadPurpose::Attachment).await {
                    Ok(reference) => {
                        attachments.push(AttachmentPayload::Existing {
                            name,
                            reference: reference.reference.clone(),
                        });
                        promotions.push(Promotion::Attachment {
                            phase: kind,
                            id: attachment.id,
                            reference,
                        });
                    }
                    Err(e) => {
                        warn!(phase = %kind, file = %upload.file_name, error = %e, "attachment upload failed");
                        failure = Some(e);
                    }
                }
            }
        }
    }

    PreparedPhase {
        payload: PhasePayload {
            phase: kind,
            description: record.description.trim().to_string(),
            attachments,
        },
        promotions,
        failure,
    }
}
