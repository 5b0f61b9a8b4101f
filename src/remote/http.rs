//! HTTP implementation of [`RemoteDraftClient`].
//!
//! Endpoints, relative to the configured base URL:
//!
//! | Operation            | Request                                   |
//! |----------------------|-------------------------------------------|
//! | `create_base`        | `POST projects` → `{"id": ...}`            |
//! | `patch_base`         | `PATCH projects/{id}/step-1`              |
//! | `patch_academic`     | `PATCH projects/{id}/step-2`              |
//! | `patch_team`         | `PATCH projects/{id}/step-3`              |
//! | `patch_phases`       | `PATCH projects/{id}/step-4` (multipart when files travel along) |
//! | `patch_visibility`   | `PATCH projects/{id}/step-5`              |
//! | `resolve_identities` | `POST users/resolve`                      |
//! | `upload_file`        | `POST files` (multipart)                  |
//!
//! Error responses carry `{"message": "..."}` or `{"message": ["...", ...]}`;
//! anything else is passed through as raw text.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{
    AcademicFields, AttachmentPayload, BaseFields, DraftId, PhasePayload, RemoteDraftClient,
    ResolvedIdentities, TeamMember, UploadPurpose, VisibilityFields,
};
use crate::config::RemoteSection;
use crate::draft::{FileUpload, PhaseKind, RemoteFileRef};
use crate::errors::{FailureBody, RemoteFailure};

#[derive(Debug, Deserialize)]
struct CreatedResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    reference: String,
    #[serde(default)]
    file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    message: Option<FailureBody>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct ResolveRequest<'a> {
    emails: &'a [String],
}

#[derive(Debug, Serialize)]
struct TeamRequest<'a> {
    authors: &'a [TeamMember],
    advisor_ids: &'a [String],
}

/// Step 4 phase as it travels in a multipart request: binaries point at the
/// form field holding their bytes.
#[derive(Debug, Serialize)]
struct WirePhase<'a> {
    phase: PhaseKind,
    description: &'a str,
    attachments: Vec<WireAttachment<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum WireAttachment<'a> {
    Link { name: &'a str, url: &'a str },
    Existing { name: &'a str, reference: &'a str },
    Binary { name: &'a str, field: String },
}

/// Production client for the remote draft resource.
pub struct HttpDraftClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpDraftClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("draftsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// Build a client from the `[remote]` configuration section.
    ///
    /// The bearer token is read from the environment variable named by
    /// `token_env`; a missing variable means unauthenticated requests.
    pub fn from_config(remote: &RemoteSection) -> Result<Self> {
        let base_url = remote
            .base_url
            .clone()
            .context("No remote base_url configured. Set [remote].base_url or DRAFTSYNC_BASE_URL")?;
        let token = std::env::var(&remote.token_env).ok();
        Self::new(base_url, token, Duration::from_secs(remote.timeout_secs))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn step_url(&self, id: &DraftId, step: u8) -> String {
        self.url(&format!("projects/{}/step-{}", id, step))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, RemoteFailure> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| RemoteFailure::network(e.to_string()))?;
        check_status(response).await
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, RemoteFailure> {
        let response = self.send(builder).await?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| RemoteFailure::network(e.to_string()))?;
        serde_json::from_str(&text)
            .map_err(|e| RemoteFailure::http(status, format!("Resposta inválida do servidor: {}", e)))
    }
}

async fn check_status(response: Response) -> Result<Response, RemoteFailure> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    Err(RemoteFailure::http(status.as_u16(), parse_error_body(&text)))
}

/// Pull the message out of an error response body.
pub(crate) fn parse_error_body(text: &str) -> FailureBody {
    match serde_json::from_str::<ErrorEnvelope>(text) {
        Ok(ErrorEnvelope {
            message: Some(message),
            ..
        }) => message,
        Ok(ErrorEnvelope {
            error: Some(error), ..
        }) => FailureBody::Text(error),
        _ => FailureBody::Text(text.trim().to_string()),
    }
}

fn file_part(file: &FileUpload) -> Result<Part, RemoteFailure> {
    Part::bytes(file.bytes.clone())
        .file_name(file.file_name.clone())
        .mime_str(&file.content_type)
        .map_err(|e| {
            RemoteFailure::network(format!(
                "Invalid content type '{}' for {}: {}",
                file.content_type, file.file_name, e
            ))
        })
}

/// Build the multipart form for a step 4 request carrying binaries.
fn phases_form(phases: &[PhasePayload]) -> Result<Form, RemoteFailure> {
    let mut form = Form::new();
    let mut wire = Vec::with_capacity(phases.len());
    let mut field_index = 0usize;

    for phase in phases {
        let mut attachments = Vec::with_capacity(phase.attachments.len());
        for attachment in &phase.attachments {
            match attachment {
                AttachmentPayload::Link { name, url } => {
                    attachments.push(WireAttachment::Link { name, url });
                }
                AttachmentPayload::Existing { name, reference } => {
                    attachments.push(WireAttachment::Existing { name, reference });
                }
                AttachmentPayload::Binary { name, file } => {
                    let field = format!("file-{}", field_index);
                    field_index += 1;
                    form = form.part(field.clone(), file_part(file)?);
                    attachments.push(WireAttachment::Binary { name, field });
                }
            }
        }
        wire.push(WirePhase {
            phase: phase.phase,
            description: &phase.description,
            attachments,
        });
    }

    let payload = serde_json::to_string(&wire)
        .map_err(|e| RemoteFailure::network(format!("Failed to encode phases: {}", e)))?;
    Ok(form.text("payload", payload))
}

#[async_trait]
impl RemoteDraftClient for HttpDraftClient {
    async fn create_base(&self, fields: &BaseFields) -> Result<DraftId, RemoteFailure> {
        let created: CreatedResponse = self
            .send_json(self.client.post(self.url("projects")).json(fields))
            .await?;
        debug!(id = %created.id, "created remote draft");
        Ok(DraftId::new(created.id))
    }

    async fn patch_base(&self, id: &DraftId, fields: &BaseFields) -> Result<(), RemoteFailure> {
        self.send(self.client.patch(self.step_url(id, 1)).json(fields))
            .await
            .map(|_| ())
    }

    async fn patch_academic(
        &self,
        id: &DraftId,
        fields: &AcademicFields,
    ) -> Result<(), RemoteFailure> {
        self.send(self.client.patch(self.step_url(id, 2)).json(fields))
            .await
            .map(|_| ())
    }

    async fn resolve_identities(
        &self,
        emails: &[String],
    ) -> Result<ResolvedIdentities, RemoteFailure> {
        self.send_json(
            self.client
                .post(self.url("users/resolve"))
                .json(&ResolveRequest { emails }),
        )
        .await
    }

    async fn patch_team(
        &self,
        id: &DraftId,
        authors: &[TeamMember],
        advisor_ids: &[String],
    ) -> Result<(), RemoteFailure> {
        let body = TeamRequest {
            authors,
            advisor_ids,
        };
        self.send(self.client.patch(self.step_url(id, 3)).json(&body))
            .await
            .map(|_| ())
    }

    async fn patch_phases(
        &self,
        id: &DraftId,
        phases: &[PhasePayload],
    ) -> Result<(), RemoteFailure> {
        let request = self.client.patch(self.step_url(id, 4));
        let has_binaries = phases.iter().any(|p| p.binary_count() > 0);
        let request = if has_binaries {
            request.multipart(phases_form(phases)?)
        } else {
            request.json(phases)
        };
        self.send(request).await.map(|_| ())
    }

    async fn patch_visibility(
        &self,
        id: &DraftId,
        settings: &VisibilityFields,
    ) -> Result<(), RemoteFailure> {
        self.send(self.client.patch(self.step_url(id, 5)).json(settings))
            .await
            .map(|_| ())
    }

    async fn upload_file(
        &self,
        file: &FileUpload,
        purpose: UploadPurpose,
    ) -> Result<RemoteFileRef, RemoteFailure> {
        let form = Form::new()
            .text("purpose", purpose.as_str())
            .part("file", file_part(file)?);
        let uploaded: UploadResponse = self
            .send_json(self.client.post(self.url("files")).multipart(form))
            .await?;
        Ok(RemoteFileRef {
            reference: uploaded.reference,
            file_name: uploaded.file_name.or_else(|| Some(file.file_name.clone())),
        })
    }
}
