//! The in-memory draft of a project submission.
//!
//! This module provides:
//! - `Draft`, the authoritative document being edited
//! - `Phases`, which always holds one record per `PhaseKind`
//! - `Attachment` and `Banner`, each pointing at exactly one file source
//! - `DraftPatch` (in `patch`) and validation rules (in `validation`)

pub mod patch;
pub mod validation;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub use patch::{DraftPatch, PhasePatch};
pub use validation::ValidationRules;

/// The four fixed project phases, in wizard order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    #[default]
    Ideation,
    Modeling,
    Prototyping,
    Implementation,
}

impl PhaseKind {
    pub const ALL: [PhaseKind; 4] = [
        PhaseKind::Ideation,
        PhaseKind::Modeling,
        PhaseKind::Prototyping,
        PhaseKind::Implementation,
    ];

    /// Wire name used by the remote resource.
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseKind::Ideation => "ideation",
            PhaseKind::Modeling => "modeling",
            PhaseKind::Prototyping => "prototyping",
            PhaseKind::Implementation => "implementation",
        }
    }
}

impl std::fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reference to a file the remote side already stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileRef {
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl RemoteFileRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            file_name: None,
        }
    }
}

/// A local file that has not been transmitted yet.
///
/// `bytes` never serializes; documents on disk point at the file through
/// `path` and the bytes are read with [`Draft::load_pending_files`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUpload {
    pub file_name: String,
    /// Guessed from `file_name` at load time when left empty.
    #[serde(default)]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for FileUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileUpload")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("path", &self.path)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl FileUpload {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            path: None,
            bytes,
        }
    }

    /// Read a file from disk, guessing its content type from the extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read attachment file: {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "attachment".to_string());
        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Ok(Self {
            file_name,
            content_type,
            path: Some(path.to_path_buf()),
            bytes,
        })
    }

    fn load_bytes(&mut self, base_dir: &Path) -> Result<()> {
        if self.content_type.is_empty() {
            self.content_type = mime_guess::from_path(&self.file_name)
                .first_or_octet_stream()
                .essence_str()
                .to_string();
        }
        if !self.bytes.is_empty() {
            return Ok(());
        }
        let Some(path) = &self.path else {
            return Ok(());
        };
        let resolved = if path.is_absolute() {
            path.clone()
        } else {
            base_dir.join(path)
        };
        self.bytes = std::fs::read(&resolved)
            .with_context(|| format!("Failed to read attachment file: {}", resolved.display()))?;
        Ok(())
    }
}

/// Where an attachment's content lives. Exactly one source per attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttachmentSource {
    /// A local file waiting to be transmitted.
    Pending(FileUpload),
    /// A file the remote side already holds.
    Remote(RemoteFileRef),
    /// An external link, embedded as text.
    Link { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    pub source: AttachmentSource,
}

impl Attachment {
    pub fn pending(upload: FileUpload) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: upload.file_name.clone(),
            source: AttachmentSource::Pending(upload),
        }
    }

    pub fn remote(name: impl Into<String>, reference: RemoteFileRef) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            source: AttachmentSource::Remote(reference),
        }
    }

    pub fn link(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            source: AttachmentSource::Link { url: url.into() },
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.source, AttachmentSource::Pending(_))
    }
}

/// The project banner image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Banner {
    Pending(FileUpload),
    Remote(RemoteFileRef),
}

/// One phase of the project: a description and its attachments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRecord {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// One record per phase. The fixed fields make a missing phase unrepresentable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phases {
    #[serde(default)]
    pub ideation: PhaseRecord,
    #[serde(default)]
    pub modeling: PhaseRecord,
    #[serde(default)]
    pub prototyping: PhaseRecord,
    #[serde(default)]
    pub implementation: PhaseRecord,
}

impl Phases {
    pub fn get(&self, kind: PhaseKind) -> &PhaseRecord {
        match kind {
            PhaseKind::Ideation => &self.ideation,
            PhaseKind::Modeling => &self.modeling,
            PhaseKind::Prototyping => &self.prototyping,
            PhaseKind::Implementation => &self.implementation,
        }
    }

    pub fn get_mut(&mut self, kind: PhaseKind) -> &mut PhaseRecord {
        match kind {
            PhaseKind::Ideation => &mut self.ideation,
            PhaseKind::Modeling => &mut self.modeling,
            PhaseKind::Prototyping => &mut self.prototyping,
            PhaseKind::Implementation => &mut self.implementation,
        }
    }

    /// Records in wizard order.
    pub fn iter(&self) -> impl Iterator<Item = (PhaseKind, &PhaseRecord)> {
        PhaseKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }
}

/// Course, class and modality. Step 2 is only sent when all three are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcademicInfo {
    #[serde(default)]
    pub course: Option<String>,
    #[serde(default)]
    pub class_group: Option<String>,
    #[serde(default)]
    pub modality: Option<String>,
}

impl AcademicInfo {
    pub fn is_complete(&self) -> bool {
        is_filled(&self.course) && is_filled(&self.class_group) && is_filled(&self.modality)
    }
}

/// Who built the project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSpec {
    /// Author emails, in the order the user entered them.
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub advisors: Vec<String>,
    #[serde(default)]
    pub leader_email: Option<String>,
    /// When set, the signed-in user leads the team regardless of `leader_email`.
    #[serde(default)]
    pub current_user_is_leader: bool,
}

impl TeamSpec {
    pub fn is_empty(&self) -> bool {
        self.authors.is_empty() && self.advisors.is_empty()
    }

    /// Every referenced address, normalized and de-duplicated, authors first.
    pub fn all_emails(&self) -> Vec<String> {
        let mut emails: Vec<String> = Vec::new();
        for email in self.authors.iter().chain(self.advisors.iter()) {
            let normalized = normalize_email(email);
            if !normalized.is_empty() && !emails.contains(&normalized) {
                emails.push(normalized);
            }
        }
        emails
    }
}

/// Repository link and visibility switches for step 5.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySettings {
    #[serde(default)]
    pub has_repository: bool,
    #[serde(default)]
    pub repository_url: Option<String>,
    #[serde(default)]
    pub code_public: bool,
    #[serde(default)]
    pub project_public: bool,
}

/// The full in-progress submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub banner: Option<Banner>,
    #[serde(default)]
    pub academic: AcademicInfo,
    #[serde(default)]
    pub team: TeamSpec,
    #[serde(default)]
    pub phases: Phases,
    #[serde(default)]
    pub repository: RepositorySettings,
    #[serde(default)]
    pub terms_accepted: bool,
}

impl Draft {
    /// Load a draft document from a JSON file.
    ///
    /// Pending uploads that name a `path` are read relative to the document.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read draft file: {}", path.display()))?;
        let mut draft: Draft = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse draft file: {}", path.display()))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        draft.load_pending_files(base_dir)?;
        Ok(draft)
    }

    /// Fill in the bytes of every pending upload that was declared by path.
    pub fn load_pending_files(&mut self, base_dir: &Path) -> Result<()> {
        if let Some(Banner::Pending(upload)) = &mut self.banner {
            upload.load_bytes(base_dir)?;
        }
        for kind in PhaseKind::ALL {
            for attachment in &mut self.phases.get_mut(kind).attachments {
                if let AttachmentSource::Pending(upload) = &mut attachment.source {
                    upload.load_bytes(base_dir)?;
                }
            }
        }
        Ok(())
    }

    /// Replace a pending attachment with the remote reference it was stored as.
    ///
    /// Returns false when the attachment is gone or no longer pending (the user
    /// removed or replaced it while the upload was in flight).
    pub fn promote_attachment(&mut self, phase: PhaseKind, id: Uuid, reference: RemoteFileRef) -> bool {
        let record = self.phases.get_mut(phase);
        match record.attachments.iter_mut().find(|a| a.id == id) {
            Some(attachment) if attachment.is_pending() => {
                attachment.source = AttachmentSource::Remote(reference);
                true
            }
            _ => false,
        }
    }

    /// Replace a pending banner with its remote reference, if it is still the
    /// same file that was uploaded.
    pub fn promote_banner(&mut self, file_name: &str, reference: RemoteFileRef) -> bool {
        match &self.banner {
            Some(Banner::Pending(upload)) if upload.file_name == file_name => {
                self.banner = Some(Banner::Remote(reference));
                true
            }
            _ => false,
        }
    }

    /// The address that leads the team, before any fallback is applied.
    pub fn designated_leader(&self, current_user_email: Option<&str>) -> Option<String> {
        if self.team.current_user_is_leader
            && let Some(email) = current_user_email
        {
            return Some(normalize_email(email));
        }
        self.team
            .leader_email
            .as_deref()
            .map(normalize_email)
            .filter(|e| !e.is_empty())
    }
}

/// Trim and lowercase an email address for comparisons.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn is_filled(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}
