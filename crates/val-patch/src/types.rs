//! Core types for patches.
//!
//! Operation paths are raw patch paths (`["posts", "0", "title"]`), never
//! quoted module paths.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;
use val_path::PathError;
use val_schema::SchemaKind;

pub use val_path::PatchPath;

// ── Error ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PatchError {
    #[error("NOT_FOUND")]
    NotFound,
    #[error("TEST")]
    Test,
    #[error("INVALID_INDEX")]
    InvalidIndex,
    #[error("INVALID_TARGET")]
    InvalidTarget,
    #[error("INVALID_OP: {0}")]
    InvalidOp(String),
    #[error("file operation not allowed on {0} node")]
    FileNotAllowed(SchemaKind),
    #[error("invalid file payload: {0}")]
    InvalidPayload(String),
    #[error(transparent)]
    Path(#[from] PathError),
}

// ── Patch identifiers ─────────────────────────────────────────────────────

/// Identifier of one submitted patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatchId(Uuid);

impl PatchId {
    /// A fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for PatchId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for PatchId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for PatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ── Operation kinds ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Add,
    Remove,
    Replace,
    Move,
    Copy,
    Test,
    File,
}

impl OpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OpKind::Add => "add",
            OpKind::Remove => "remove",
            OpKind::Replace => "replace",
            OpKind::Move => "move",
            OpKind::Copy => "copy",
            OpKind::Test => "test",
            OpKind::File => "file",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, PatchError> {
        match s {
            "add" => Ok(OpKind::Add),
            "remove" => Ok(OpKind::Remove),
            "replace" => Ok(OpKind::Replace),
            "move" => Ok(OpKind::Move),
            "copy" => Ok(OpKind::Copy),
            "test" => Ok(OpKind::Test),
            "file" => Ok(OpKind::File),
            other => Err(PatchError::InvalidOp(format!("unknown op: {other}"))),
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Op enum ───────────────────────────────────────────────────────────────

/// A patch operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Add {
        path: PatchPath,
        value: Value,
    },
    Remove {
        path: PatchPath,
    },
    Replace {
        path: PatchPath,
        value: Value,
    },
    Move {
        from: PatchPath,
        path: PatchPath,
    },
    Copy {
        from: PatchPath,
        path: PatchPath,
    },
    Test {
        path: PatchPath,
        value: Value,
    },
    /// Binary content for a file or image node.
    ///
    /// `value` holds the inline payload (data URL or base64) until the
    /// operation is desugared, then the SHA-256 hex digest of the payload.
    File {
        path: PatchPath,
        file_path: Option<String>,
        value: Value,
        metadata: Option<Value>,
        remote: bool,
    },
}

impl Op {
    pub fn add(path: PatchPath, value: Value) -> Self {
        Op::Add { path, value }
    }

    pub fn remove(path: PatchPath) -> Self {
        Op::Remove { path }
    }

    pub fn replace(path: PatchPath, value: Value) -> Self {
        Op::Replace { path, value }
    }

    pub fn move_op(from: PatchPath, path: PatchPath) -> Self {
        Op::Move { from, path }
    }

    pub fn copy(from: PatchPath, path: PatchPath) -> Self {
        Op::Copy { from, path }
    }

    pub fn test(path: PatchPath, value: Value) -> Self {
        Op::Test { path, value }
    }

    /// File operation; only file and image nodes accept one.
    pub fn file(
        kind: SchemaKind,
        path: PatchPath,
        file_path: Option<String>,
        value: Value,
        metadata: Option<Value>,
        remote: bool,
    ) -> Result<Self, PatchError> {
        if !kind.is_file_like() {
            return Err(PatchError::FileNotAllowed(kind));
        }
        Ok(Op::File {
            path,
            file_path,
            value,
            metadata,
            remote,
        })
    }

    pub fn kind(&self) -> OpKind {
        match self {
            Op::Add { .. } => OpKind::Add,
            Op::Remove { .. } => OpKind::Remove,
            Op::Replace { .. } => OpKind::Replace,
            Op::Move { .. } => OpKind::Move,
            Op::Copy { .. } => OpKind::Copy,
            Op::Test { .. } => OpKind::Test,
            Op::File { .. } => OpKind::File,
        }
    }

    /// Returns the operation name string.
    pub fn op_name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Returns the target path of the operation.
    pub fn path(&self) -> &PatchPath {
        match self {
            Op::Add { path, .. } => path,
            Op::Remove { path } => path,
            Op::Replace { path, .. } => path,
            Op::Move { path, .. } => path,
            Op::Copy { path, .. } => path,
            Op::Test { path, .. } => path,
            Op::File { path, .. } => path,
        }
    }

    /// Source path of `move` and `copy`.
    pub fn from(&self) -> Option<&PatchPath> {
        match self {
            Op::Move { from, .. } | Op::Copy { from, .. } => Some(from),
            _ => None,
        }
    }

    /// Returns true if the operation changes nothing when it succeeds.
    pub fn is_predicate(&self) -> bool {
        matches!(self, Op::Test { .. })
    }
}

// ── Result types ──────────────────────────────────────────────────────────

/// Result of applying a single operation.
#[derive(Debug, Clone)]
pub struct OpResult {
    /// The value at the path before the operation, if applicable.
    pub old: Option<Value>,
}

/// Result of applying a full patch.
#[derive(Debug, Clone)]
pub struct PatchResult {
    pub doc: Value,
    pub res: Vec<OpResult>,
}

/// Server-reported failure of one patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchFailure {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_id: Option<PatchId>,
    /// Skipped patches are not counted as errors in summaries.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
}

impl PatchFailure {
    pub fn new(message: impl Into<String>, patch_id: Option<PatchId>) -> Self {
        Self {
            message: message.into(),
            patch_id,
            skipped: false,
        }
    }
}
