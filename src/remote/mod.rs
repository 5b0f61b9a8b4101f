//! Remote draft client contract.
//!
//! The remote resource is built across five dependent steps. This module
//! defines the payloads the step savers send and the [`RemoteDraftClient`]
//! trait they send them through. Two implementations ship with the crate:
//! - [`HttpDraftClient`]: the production client over HTTP
//! - [`InMemoryDraftClient`]: a recording client with failure injection

pub mod http;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::draft::{FileUpload, PhaseKind, RemoteFileRef};
use crate::errors::RemoteFailure;

pub use http::HttpDraftClient;
pub use memory::{InMemoryDraftClient, RemoteCall, RemoteOperation};

/// Server-assigned key of the remote draft.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftId(String);

impl DraftId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DraftId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Step 1 payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseFields {
    pub title: String,
    pub summary: String,
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner: Option<RemoteFileRef>,
}

/// Step 2 payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcademicFields {
    pub course: String,
    pub class_group: String,
    pub modality: String,
}

/// A user record returned by identity resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Result of resolving a batch of email addresses.
///
/// Students come back as `authors`, teachers as `advisors`; addresses with
/// no matching account are listed in `unresolved`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedIdentities {
    #[serde(default)]
    pub authors: Vec<UserIdentity>,
    #[serde(default)]
    pub advisors: Vec<UserIdentity>,
    #[serde(default)]
    pub unresolved: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TeamRole {
    #[serde(rename = "LIDER")]
    Leader,
    #[serde(rename = "AUTOR")]
    Author,
}

impl std::fmt::Display for TeamRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TeamRole::Leader => f.write_str("LIDER"),
            TeamRole::Author => f.write_str("AUTOR"),
        }
    }
}

/// One author in the step 3 payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub user_id: String,
    pub email: String,
    pub role: TeamRole,
}

/// One attachment in the step 4 payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttachmentPayload {
    /// External link, sent as text.
    Link { name: String, url: String },
    /// A file the remote side already stores.
    Existing { name: String, reference: String },
    /// A new file whose bytes travel with the request.
    Binary { name: String, file: FileUpload },
}

/// One phase in the step 4 payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhasePayload {
    pub phase: PhaseKind,
    pub description: String,
    pub attachments: Vec<AttachmentPayload>,
}

impl PhasePayload {
    pub fn binary_count(&self) -> usize {
        self.attachments
            .iter()
            .filter(|a| matches!(a, AttachmentPayload::Binary { .. }))
            .count()
    }
}

/// Step 5 payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityFields {
    pub has_repository: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_url: Option<String>,
    pub code_public: bool,
    pub project_public: bool,
    pub terms_accepted: bool,
    /// Submit the project for publication along with these settings.
    #[serde(default)]
    pub publish: bool,
}

/// Why a file is being uploaded ahead of a step write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadPurpose {
    Banner,
    Attachment,
}

impl UploadPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadPurpose::Banner => "banner",
            UploadPurpose::Attachment => "attachment",
        }
    }
}

/// Calls the engine makes against the remote draft resource.
///
/// Implementations normalize every failure into a [`RemoteFailure`] before
/// returning it; the engine never sees transport-specific error types.
#[async_trait]
pub trait RemoteDraftClient: Send + Sync {
    /// Create the base resource and return its new identity.
    async fn create_base(&self, fields: &BaseFields) -> Result<DraftId, RemoteFailure>;

    async fn patch_base(&self, id: &DraftId, fields: &BaseFields) -> Result<(), RemoteFailure>;

    async fn patch_academic(
        &self,
        id: &DraftId,
        fields: &AcademicFields,
    ) -> Result<(), RemoteFailure>;

    /// Look up accounts for a batch of addresses.
    async fn resolve_identities(
        &self,
        emails: &[String],
    ) -> Result<ResolvedIdentities, RemoteFailure>;

    async fn patch_team(
        &self,
        id: &DraftId,
        authors: &[TeamMember],
        advisor_ids: &[String],
    ) -> Result<(), RemoteFailure>;

    /// Send all four phases in one request.
    async fn patch_phases(&self, id: &DraftId, phases: &[PhasePayload])
    -> Result<(), RemoteFailure>;

    async fn patch_visibility(
        &self,
        id: &DraftId,
        settings: &VisibilityFields,
    ) -> Result<(), RemoteFailure>;

    async fn upload_file(
        &self,
        file: &FileUpload,
        purpose: UploadPurpose,
    ) -> Result<RemoteFileRef, RemoteFailure>;
}
