//! Typed error hierarchy for the draft synchronization engine.
//!
//! Three top-level types cover the three failure surfaces:
//! - `CacheError`: local snapshot persistence failures
//! - `RemoteFailure`: a remote call that failed, normalized to `{status, body}`
//! - `SyncError`: what explicit save and publish hand back to the caller

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classify::Classification;

/// Errors from the local cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to write cache record at {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read cache record at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove cache record at {path}: {source}")]
    RemoveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cache record at {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize draft snapshot: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Message body of a failed remote call.
///
/// The remote side answers either with a single free-text message or with a
/// list of per-field messages; both shapes reach the classifier untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FailureBody {
    Text(String),
    List(Vec<String>),
}

impl FailureBody {
    /// All messages joined into one string, for substring matching.
    pub fn joined(&self) -> String {
        match self {
            FailureBody::Text(text) => text.clone(),
            FailureBody::List(items) => items.join("; "),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FailureBody::Text(text) => text.trim().is_empty(),
            FailureBody::List(items) => items.iter().all(|i| i.trim().is_empty()),
        }
    }
}

impl Default for FailureBody {
    fn default() -> Self {
        FailureBody::Text(String::new())
    }
}

impl From<&str> for FailureBody {
    fn from(value: &str) -> Self {
        FailureBody::Text(value.to_string())
    }
}

impl From<String> for FailureBody {
    fn from(value: String) -> Self {
        FailureBody::Text(value)
    }
}

impl From<Vec<String>> for FailureBody {
    fn from(value: Vec<String>) -> Self {
        FailureBody::List(value)
    }
}

impl std::fmt::Display for FailureBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.joined())
    }
}

/// A failed remote call, normalized at the client boundary.
///
/// `status` is `None` when no HTTP response was received at all (offline,
/// DNS failure, connection reset). A status of `0` is folded into `None`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", display_failure(.status, .body))]
pub struct RemoteFailure {
    pub status: Option<u16>,
    pub body: FailureBody,
}

fn display_failure(status: &Option<u16>, body: &FailureBody) -> String {
    match status {
        Some(code) => format!("remote call failed with HTTP {}: {}", code, body),
        None => format!("remote call failed without a response: {}", body),
    }
}

impl RemoteFailure {
    pub fn new(status: Option<u16>, body: impl Into<FailureBody>) -> Self {
        Self {
            status: status.filter(|code| *code != 0),
            body: body.into(),
        }
    }

    pub fn http(status: u16, body: impl Into<FailureBody>) -> Self {
        Self::new(Some(status), body)
    }

    /// A failure where no response arrived.
    pub fn network(message: impl Into<FailureBody>) -> Self {
        Self::new(None, message)
    }

    pub fn is_network(&self) -> bool {
        self.status.is_none()
    }
}

/// Errors surfaced by explicit save and publish.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{}: {}", .0.title, .0.message)]
    Classified(Box<Classification>),

    #[error("A synchronization cycle is already in flight")]
    Busy,

    #[error("This draft has already been published")]
    AlreadyPublished,
}

impl SyncError {
    /// The classification carried by this error, if any.
    pub fn classification(&self) -> Option<&Classification> {
        match self {
            SyncError::Classified(c) => Some(c),
            _ => None,
        }
    }
}

impl From<Classification> for SyncError {
    fn from(value: Classification) -> Self {
        SyncError::Classified(Box::new(value))
    }
}
