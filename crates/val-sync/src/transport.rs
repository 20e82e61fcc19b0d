//! Transport seam between the engine and the content API.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use val_path::ModuleFilePath;
use val_patch::codec::json::to_json_patch;
use val_patch::{FileUploadRequest, FileUploadResponse, Op, ParentRef, PatchFailure, PatchId};
use val_schema::SchemaSet;

use crate::error::TransportError;

/// Upload progress callback: `(bytes_sent, bytes_total)`.
pub type Progress = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// One patch as submitted to `POST /patches`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchSubmission {
    pub patch_id: PatchId,
    #[serde(rename = "path")]
    pub module_file_path: ModuleFilePath,
    pub patch: Value,
    pub created_at: DateTime<Utc>,
    pub parent_ref: ParentRef,
}

impl PatchSubmission {
    pub fn new(
        patch_id: PatchId,
        module_file_path: ModuleFilePath,
        ops: &[Op],
        created_at: DateTime<Utc>,
        parent_ref: ParentRef,
    ) -> Self {
        Self {
            patch_id,
            module_file_path,
            patch: to_json_patch(ops),
            created_at,
            parent_ref,
        }
    }
}

/// Acknowledgement of a submission. Patches listed in `errors` were refused
/// individually; the rest of the request still went through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    #[serde(default)]
    pub accepted: Vec<PatchId>,
    #[serde(default)]
    pub errors: Vec<PatchFailure>,
}

/// Authoritative state of one module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSource {
    pub source: Value,
    /// Patches already folded into `source`.
    #[serde(default)]
    pub applied: Vec<PatchId>,
    #[serde(default)]
    pub errors: Vec<PatchFailure>,
}

/// Response of `PUT /sources`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcesResponse {
    /// Content revision the sources were read at.
    #[serde(default)]
    pub revision: Option<String>,
    pub modules: BTreeMap<ModuleFilePath, ModuleSource>,
}

/// Content API as seen by the engine. Every call may complete out of order
/// with respect to the others.
pub trait Transport: Send + Sync {
    fn fetch_schemas(&self) -> impl Future<Output = Result<SchemaSet, TransportError>> + Send;

    /// Sources of `modules`, or of every module when empty.
    fn fetch_sources(
        &self,
        modules: &[ModuleFilePath],
    ) -> impl Future<Output = Result<SourcesResponse, TransportError>> + Send;

    fn submit_patches(
        &self,
        patches: &[PatchSubmission],
    ) -> impl Future<Output = Result<SubmitResponse, TransportError>> + Send;

    fn delete_patches(&self, ids: &[PatchId]) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn upload_file(
        &self,
        patch_id: PatchId,
        request: &FileUploadRequest,
        progress: Progress,
    ) -> impl Future<Output = Result<FileUploadResponse, TransportError>> + Send;
}
