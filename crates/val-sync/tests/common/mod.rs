//! In-memory content API used by the engine tests.

#![allow(dead_code)]

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::Notify;
use val_path::ModuleFilePath;
use val_patch::codec::json::from_json_patch;
use val_patch::{apply_patch, FileUploadRequest, FileUploadResponse, PatchFailure, PatchId};
use val_schema::{Schema, SchemaSet};
use val_sync::{
    ModuleSource, PatchSubmission, Progress, SourcesResponse, SubmitResponse, SyncConfig, SyncEngine,
    Transport, TransportError,
};

pub const BLOG: &str = "/content/blog.val.ts";

pub fn blog() -> ModuleFilePath {
    ModuleFilePath::new(BLOG).unwrap()
}

pub fn blog_schema() -> Schema {
    Schema::from_json(&json!({
        "type": "object",
        "items": {
            "posts": {"type": "array", "item": {"type": "object", "items": {
                "title": {"type": "string"},
                "hero": {"type": "image", "opt": true}
            }}},
            "codes": {"type": "record", "item": {"type": "string"}}
        }
    }))
    .unwrap()
}

pub fn blog_source() -> Value {
    json!({
        "posts": [
            {"title": "First", "hero": {"_ref": "/public/val/first.png"}},
            {"title": "Second", "hero": null}
        ],
        "codes": {"404": "Not found"}
    })
}

#[derive(Default)]
pub struct ServerState {
    pub revision: u64,
    pub sources: BTreeMap<ModuleFilePath, Value>,
    pub applied: Vec<PatchId>,
    pub reject: Vec<PatchId>,
    pub offline: bool,
    /// When set, submitted patches are held but not applied.
    pub hold: bool,
    /// The next submission waits at the gate until released.
    pub gated: bool,
    /// The gated submission fails with a network error once released.
    pub fail_gated: bool,
    /// Patch ids of every submission request, in arrival order.
    pub batches: Vec<Vec<PatchId>>,
    pub submitted: Vec<PatchSubmission>,
    pub deleted: Vec<PatchId>,
    pub uploads: Vec<(PatchId, FileUploadRequest)>,
}

#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

#[derive(Default)]
pub struct FakeServer {
    pub schemas: SchemaSet,
    pub state: Mutex<ServerState>,
    pub gate: Gate,
}

impl FakeServer {
    pub fn blog() -> Self {
        let server = FakeServer {
            schemas: SchemaSet {
                schema_sha: Some("sha-1".into()),
                schemas: BTreeMap::from([(blog(), blog_schema())]),
            },
            state: Mutex::default(),
            gate: Gate::default(),
        };
        server.state.lock().sources.insert(blog(), blog_source());
        server
    }

    fn check_online(&self) -> Result<(), TransportError> {
        if self.state.lock().offline {
            return Err(TransportError::Network("connection refused".into()));
        }
        Ok(())
    }
}

impl Transport for FakeServer {
    async fn fetch_schemas(&self) -> Result<SchemaSet, TransportError> {
        self.check_online()?;
        Ok(self.schemas.clone())
    }

    async fn fetch_sources(&self, modules: &[ModuleFilePath]) -> Result<SourcesResponse, TransportError> {
        self.check_online()?;
        let state = self.state.lock();
        let modules = state
            .sources
            .iter()
            .filter(|(m, _)| modules.is_empty() || modules.contains(m))
            .map(|(m, source)| {
                (
                    m.clone(),
                    ModuleSource {
                        source: source.clone(),
                        applied: state.applied.clone(),
                        errors: Vec::new(),
                    },
                )
            })
            .collect();
        Ok(SourcesResponse {
            revision: Some(format!("r{}", state.revision)),
            modules,
        })
    }

    async fn submit_patches(&self, patches: &[PatchSubmission]) -> Result<SubmitResponse, TransportError> {
        self.check_online()?;
        let gated = {
            let mut state = self.state.lock();
            state.batches.push(patches.iter().map(|p| p.patch_id).collect());
            std::mem::take(&mut state.gated)
        };
        if gated {
            self.gate.entered.notify_one();
            self.gate.release.notified().await;
            if std::mem::take(&mut self.state.lock().fail_gated) {
                return Err(TransportError::Network("connection reset".into()));
            }
        }
        let mut state = self.state.lock();
        let mut response = SubmitResponse::default();
        for submission in patches {
            state.submitted.push(submission.clone());
            if state.reject.contains(&submission.patch_id) {
                response.errors.push(PatchFailure::new("rejected by server", Some(submission.patch_id)));
                continue;
            }
            if !state.hold {
                let ops = from_json_patch(&submission.patch).map_err(|e| TransportError::Decode(e.to_string()))?;
                let source = state
                    .sources
                    .get_mut(&submission.module_file_path)
                    .ok_or_else(|| TransportError::Status { code: 404, message: "no such module".into() })?;
                apply_patch(source, &ops).map_err(|e| TransportError::Rejected {
                    message: e.to_string(),
                    patch_id: Some(submission.patch_id),
                })?;
                state.applied.push(submission.patch_id);
                state.revision += 1;
            }
            response.accepted.push(submission.patch_id);
        }
        Ok(response)
    }

    async fn delete_patches(&self, ids: &[PatchId]) -> Result<(), TransportError> {
        self.check_online()?;
        self.state.lock().deleted.extend_from_slice(ids);
        Ok(())
    }

    async fn upload_file(
        &self,
        patch_id: PatchId,
        request: &FileUploadRequest,
        progress: Progress,
    ) -> Result<FileUploadResponse, TransportError> {
        self.check_online()?;
        let total = request.data.len() as u64;
        progress(total / 2, total);
        progress(total, total);
        self.state.lock().uploads.push((patch_id, request.clone()));
        Ok(FileUploadResponse {
            patch_id,
            file_path: request.file_path.clone(),
        })
    }
}

pub fn engine() -> SyncEngine<FakeServer> {
    SyncEngine::new(FakeServer::blog(), SyncConfig::default())
}

pub async fn initialized_engine() -> SyncEngine<FakeServer> {
    let engine = engine();
    engine.init().await.unwrap();
    engine
}

/// Title of the first post as the server holds it.
pub fn server_title(server: &FakeServer) -> Value {
    server.state.lock().sources[&blog()]["posts"][0]["title"].clone()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
