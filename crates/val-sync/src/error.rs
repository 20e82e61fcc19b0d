//! Error types.

use thiserror::Error;
use val_path::{ModuleFilePath, PathError};
use val_patch::{PatchError, PatchId};
use val_schema::ResolveError;

/// Failures talking to the content API.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    /// Connection failed or timed out. Counts towards service unavailability.
    #[error("network error: {0}")]
    Network(String),
    /// The server refused the request.
    #[error("rejected: {message}")]
    Rejected {
        message: String,
        patch_id: Option<PatchId>,
    },
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("unexpected status {code}: {message}")]
    Status { code: u16, message: String },
}

impl TransportError {
    pub fn is_network(&self) -> bool {
        matches!(self, TransportError::Network(_))
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SyncError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Patch(#[from] PatchError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The id is already queued with different operations.
    #[error("patch {0} already exists")]
    Duplicate(PatchId),
    #[error("unknown module {0}")]
    UnknownModule(ModuleFilePath),
    #[error("unknown patch {0}")]
    UnknownPatch(PatchId),
    /// The answer arrived after the authoritative state moved on.
    #[error("response was stale and has been discarded")]
    Stale,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}
