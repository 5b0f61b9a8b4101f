//! In-memory [`RemoteDraftClient`] that records every call.
//!
//! Used by the test suite and by `draftsync sync --dry-run`. Supports:
//! - a user directory for identity resolution
//! - titles that already exist (step 1 answers 409)
//! - one-shot or permanent failures per operation
//! - simulated latency, so tests can hold a call in flight

use async_trait::async_trait;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{
    AcademicFields, BaseFields, DraftId, PhasePayload, RemoteDraftClient, ResolvedIdentities,
    TeamMember, UploadPurpose, UserIdentity, VisibilityFields,
};
use crate::draft::{FileUpload, RemoteFileRef, normalize_email};
use crate::errors::RemoteFailure;

/// The remote operations, for failure injection and call filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteOperation {
    CreateBase,
    PatchBase,
    PatchAcademic,
    ResolveIdentities,
    PatchTeam,
    PatchPhases,
    PatchVisibility,
    UploadFile,
}

/// A recorded call with the parts of its payload tests care about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum RemoteCall {
    CreateBase { title: String },
    PatchBase { id: String, title: String },
    PatchAcademic { id: String, fields: AcademicFields },
    ResolveIdentities { emails: Vec<String> },
    PatchTeam {
        id: String,
        authors: Vec<TeamMember>,
        advisor_ids: Vec<String>,
    },
    PatchPhases {
        id: String,
        descriptions: Vec<String>,
        attachment_counts: Vec<usize>,
        binary_count: usize,
    },
    PatchVisibility { id: String, fields: VisibilityFields },
    UploadFile {
        file_name: String,
        purpose: UploadPurpose,
    },
}

impl RemoteCall {
    pub fn operation(&self) -> RemoteOperation {
        match self {
            RemoteCall::CreateBase { .. } => RemoteOperation::CreateBase,
            RemoteCall::PatchBase { .. } => RemoteOperation::PatchBase,
            RemoteCall::PatchAcademic { .. } => RemoteOperation::PatchAcademic,
            RemoteCall::ResolveIdentities { .. } => RemoteOperation::ResolveIdentities,
            RemoteCall::PatchTeam { .. } => RemoteOperation::PatchTeam,
            RemoteCall::PatchPhases { .. } => RemoteOperation::PatchPhases,
            RemoteCall::PatchVisibility { .. } => RemoteOperation::PatchVisibility,
            RemoteCall::UploadFile { .. } => RemoteOperation::UploadFile,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccountKind {
    Student,
    Teacher,
}

#[derive(Default)]
struct MemoryState {
    calls: Vec<RemoteCall>,
    users: HashMap<String, (UserIdentity, AccountKind)>,
    taken_titles: Vec<String>,
    one_shot_failures: HashMap<RemoteOperation, VecDeque<RemoteFailure>>,
    permanent_failures: HashMap<RemoteOperation, RemoteFailure>,
    latency: Option<Duration>,
    next_id: u64,
    next_file: u64,
}

/// Recording client backed by process memory.
#[derive(Default)]
pub struct InMemoryDraftClient {
    state: Mutex<MemoryState>,
}

impl InMemoryDraftClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a student account; resolves as an author.
    pub fn with_student(self, email: &str, id: &str) -> Self {
        self.add_user(email, id, AccountKind::Student);
        self
    }

    /// Register a teacher account; resolves as an advisor.
    pub fn with_teacher(self, email: &str, id: &str) -> Self {
        self.add_user(email, id, AccountKind::Teacher);
        self
    }

    /// Make step 1 reject this title with a 409.
    pub fn with_taken_title(self, title: &str) -> Self {
        self.lock().taken_titles.push(title.trim().to_lowercase());
        self
    }

    /// Delay every call by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = Some(latency);
        self
    }

    fn add_user(&self, email: &str, id: &str, kind: AccountKind) {
        let email = normalize_email(email);
        let identity = UserIdentity {
            id: id.to_string(),
            email: email.clone(),
            name: None,
        };
        self.lock().users.insert(email, (identity, kind));
    }

    /// Fail the next call of `operation` with `failure`.
    pub fn fail_next(&self, operation: RemoteOperation, failure: RemoteFailure) {
        self.lock()
            .one_shot_failures
            .entry(operation)
            .or_default()
            .push_back(failure);
    }

    /// Fail every call of `operation` until [`Self::clear_failures`].
    pub fn fail_always(&self, operation: RemoteOperation, failure: RemoteFailure) {
        self.lock().permanent_failures.insert(operation, failure);
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.one_shot_failures.clear();
        state.permanent_failures.clear();
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.lock().calls.clone()
    }

    pub fn calls_of(&self, operation: RemoteOperation) -> Vec<RemoteCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.operation() == operation)
            .cloned()
            .collect()
    }

    pub fn count(&self, operation: RemoteOperation) -> usize {
        self.calls_of(operation).len()
    }

    pub fn reset_calls(&self) {
        self.lock().calls.clear();
    }

    /// Record the call, wait out the latency, then apply injected failures.
    async fn enter(&self, call: RemoteCall) -> Result<(), RemoteFailure> {
        let operation = call.operation();
        let latency = {
            let mut state = self.lock();
            state.calls.push(call);
            state.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let mut state = self.lock();
        if let Some(failure) = state
            .one_shot_failures
            .get_mut(&operation)
            .and_then(|queue| queue.pop_front())
        {
            return Err(failure);
        }
        if let Some(failure) = state.permanent_failures.get(&operation) {
            return Err(failure.clone());
        }
        Ok(())
    }

    fn check_title(&self, title: &str) -> Result<(), RemoteFailure> {
        let taken = self
            .lock()
            .taken_titles
            .contains(&title.trim().to_lowercase());
        if taken {
            Err(RemoteFailure::http(409, "Já existe um projeto com este título"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteDraftClient for InMemoryDraftClient {
    async fn create_base(&self, fields: &BaseFields) -> Result<DraftId, RemoteFailure> {
        self.enter(RemoteCall::CreateBase {
            title: fields.title.clone(),
        })
        .await?;
        self.check_title(&fields.title)?;
        let mut state = self.lock();
        state.next_id += 1;
        Ok(DraftId::new(format!("draft-{}", state.next_id)))
    }

    async fn patch_base(&self, id: &DraftId, fields: &BaseFields) -> Result<(), RemoteFailure> {
        self.enter(RemoteCall::PatchBase {
            id: id.to_string(),
            title: fields.title.clone(),
        })
        .await?;
        self.check_title(&fields.title)
    }

    async fn patch_academic(
        &self,
        id: &DraftId,
        fields: &AcademicFields,
    ) -> Result<(), RemoteFailure> {
        self.enter(RemoteCall::PatchAcademic {
            id: id.to_string(),
            fields: fields.clone(),
        })
        .await
    }

    async fn resolve_identities(
        &self,
        emails: &[String],
    ) -> Result<ResolvedIdentities, RemoteFailure> {
        self.enter(RemoteCall::ResolveIdentities {
            emails: emails.to_vec(),
        })
        .await?;
        let state = self.lock();
        let mut resolved = ResolvedIdentities::default();
        for email in emails {
            match state.users.get(&normalize_email(email)) {
                Some((identity, AccountKind::Student)) => resolved.authors.push(identity.clone()),
                Some((identity, AccountKind::Teacher)) => resolved.advisors.push(identity.clone()),
                None => resolved.unresolved.push(email.clone()),
            }
        }
        Ok(resolved)
    }

    async fn patch_team(
        &self,
        id: &DraftId,
        authors: &[TeamMember],
        advisor_ids: &[String],
    ) -> Result<(), RemoteFailure> {
        self.enter(RemoteCall::PatchTeam {
            id: id.to_string(),
            authors: authors.to_vec(),
            advisor_ids: advisor_ids.to_vec(),
        })
        .await
    }

    async fn patch_phases(
        &self,
        id: &DraftId,
        phases: &[PhasePayload],
    ) -> Result<(), RemoteFailure> {
        self.enter(RemoteCall::PatchPhases {
            id: id.to_string(),
            descriptions: phases.iter().map(|p| p.description.clone()).collect(),
            attachment_counts: phases.iter().map(|p| p.attachments.len()).collect(),
            binary_count: phases.iter().map(PhasePayload::binary_count).sum(),
        })
        .await
    }

    async fn patch_visibility(
        &self,
        id: &DraftId,
        settings: &VisibilityFields,
    ) -> Result<(), RemoteFailure> {
        self.enter(RemoteCall::PatchVisibility {
            id: id.to_string(),
            fields: settings.clone(),
        })
        .await
    }

    async fn upload_file(
        &self,
        file: &FileUpload,
        purpose: UploadPurpose,
    ) -> Result<RemoteFileRef, RemoteFailure> {
        self.enter(RemoteCall::UploadFile {
            file_name: file.file_name.clone(),
            purpose,
        })
        .await?;
        let mut state = self.lock();
        state.next_file += 1;
        Ok(RemoteFileRef {
            reference: format!("file-{}", state.next_file),
            file_name: Some(file.file_name.clone()),
        })
    }
}
