//! Local recovery cache.
//!
//! One JSON record per editing session under `.draftsync/cache/<session>.json`.
//! The record is rewritten on every draft mutation and deleted once the
//! remote side holds the draft.

mod snapshot;

use std::fs;
use std::path::{Path, PathBuf};

pub use snapshot::{CacheSnapshot, DraftSnapshot, PhaseDescriptions};

use crate::draft::Draft;
use crate::errors::CacheError;

pub struct LocalCache {
    path: PathBuf,
}

impl LocalCache {
    /// Cache for `session` inside `cache_dir`.
    ///
    /// Characters outside `[A-Za-z0-9_-]` in the session key are replaced so
    /// the key is always a single safe file name.
    pub fn new(cache_dir: &Path, session: &str) -> Self {
        Self {
            path: cache_dir.join(format!("{}.json", sanitize_session(session))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write a stripped snapshot of `draft`, replacing any previous record.
    pub fn store(&self, draft: &Draft) -> Result<CacheSnapshot, CacheError> {
        let snapshot = CacheSnapshot::capture(draft);
        let json = serde_json::to_string_pretty(&snapshot).map_err(CacheError::Serialize)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| CacheError::WriteFailed {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|source| CacheError::WriteFailed {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| CacheError::WriteFailed {
            path: self.path.clone(),
            source,
        })?;
        Ok(snapshot)
    }

    /// Read the record, if one exists.
    pub fn load(&self) -> Result<Option<CacheSnapshot>, CacheError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CacheError::ReadFailed {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let snapshot = serde_json::from_str(&content).map_err(|source| CacheError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(snapshot))
    }

    /// Delete the record. Deleting a missing record is not an error.
    pub fn clear(&self) -> Result<(), CacheError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CacheError::RemoveFailed {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

fn sanitize_session(session: &str) -> String {
    let cleaned: String = session
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}
