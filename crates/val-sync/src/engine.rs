//! The sync engine.
//!
//! Owns every module's authoritative tree, its queue of pending patches and
//! its status. Local edits are applied to an optimistic tree immediately and
//! reconciled against the server later. Readers get immutable [`Arc`]
//! snapshots that stay the same object until the value changes.
//!
//! The state lock is never held across an await; listeners run after it is
//! released.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use val_path::{from_patch_path, ModuleFilePath, SourcePath};
use val_patch::{
    aggregate_with, apply_patch, desugar_file_ops, FileUploadResponse, Op, ParentRef, PatchError,
    PatchFailure, PatchId, PatchRecord, PatchSet, PendingUpload,
};
use val_schema::{
    patch_path_to_module_path, schema_at, shallow_at_source_path, validate, ResolveError,
    SchemaKind, SchemaSet, ShallowView,
};

use crate::config::SyncConfig;
use crate::debounce::DebounceBuffer;
use crate::error::{SyncError, TransportError};
use crate::listeners::{ListenerRegistry, Subscription, Topic};
use crate::status::{ServiceStatus, SyncStatus};
use crate::transport::{PatchSubmission, Progress, SourcesResponse, Transport};

pub type ShallowResult = Result<ShallowView, ResolveError>;

// ── State ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchState {
    /// Not yet sent.
    Queued,
    InFlight,
    /// Held by the server, not yet folded into the authoritative tree.
    Submitted,
    /// Refused by the server or no longer applicable. Kept for revert.
    Failed,
}

#[derive(Debug, Clone)]
struct PendingPatch {
    record: PatchRecord,
    parent_ref: ParentRef,
    state: PatchState,
    uploads: Vec<PendingUpload>,
    /// Folded into the authoritative tree.
    applied: bool,
    failure: Option<PatchFailure>,
}

impl PendingPatch {
    fn is_complete(&self) -> bool {
        self.applied && self.uploads.is_empty()
    }
}

#[derive(Debug)]
struct ModuleState {
    base: Option<Value>,
    tree: Option<Arc<Value>>,
    pending: Vec<PendingPatch>,
    /// Server errors not tied to a queued patch.
    errors: Vec<PatchFailure>,
    status: Arc<SyncStatus>,
    render: Option<Arc<Value>>,
}

impl ModuleState {
    fn new(loading: &Arc<SyncStatus>) -> Self {
        Self {
            base: None,
            tree: None,
            pending: Vec::new(),
            errors: Vec::new(),
            status: Arc::clone(loading),
            render: None,
        }
    }

    fn failures(&self) -> Vec<PatchFailure> {
        self.errors
            .iter()
            .cloned()
            .chain(self.pending.iter().filter_map(|p| p.failure.clone()))
            .collect()
    }

    fn set_status(&mut self, module: &ModuleFilePath, status: SyncStatus, topics: &mut Vec<Topic>) {
        if *self.status != status {
            debug!(module = %module, status = ?StatusName(&status), "module status changed");
            self.status = Arc::new(status);
            topics.push(Topic::SyncStatus(module.clone()));
        }
    }
}

struct StatusName<'a>(&'a SyncStatus);

impl std::fmt::Debug for StatusName<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self.0 {
            SyncStatus::Loading => "loading",
            SyncStatus::Success { .. } => "success",
            SyncStatus::Error { .. } => "error",
        })
    }
}

/// Authoritative version a request was issued against. A response whose
/// marker no longer matches the engine's is stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMarker {
    pub revision: Option<String>,
    pub epoch: u64,
}

/// A shallow view kept up to date while at least one subscriber watches it.
struct WatchedView {
    view: Arc<ShallowResult>,
    watchers: usize,
}

struct EngineState {
    modules: BTreeMap<ModuleFilePath, ModuleState>,
    schemas: Option<Arc<SchemaSet>>,
    revision: Option<String>,
    /// Bumped on every authoritative update and every local revert.
    epoch: u64,
    initialized_at: Option<DateTime<Utc>>,
    service: ServiceStatus,
    failing_since: Option<Instant>,
    shallow: HashMap<SourcePath, WatchedView>,
    debounce: DebounceBuffer,
    loading: Arc<SyncStatus>,
}

impl EngineState {
    fn new() -> Self {
        Self {
            modules: BTreeMap::new(),
            schemas: None,
            revision: None,
            epoch: 0,
            initialized_at: None,
            service: ServiceStatus::Available,
            failing_since: None,
            shallow: HashMap::new(),
            debounce: DebounceBuffer::default(),
            loading: Arc::new(SyncStatus::Loading),
        }
    }

    fn marker(&self) -> VersionMarker {
        VersionMarker {
            revision: self.revision.clone(),
            epoch: self.epoch,
        }
    }

    fn module_mut(&mut self, module: &ModuleFilePath) -> &mut ModuleState {
        let loading = &self.loading;
        self.modules
            .entry(module.clone())
            .or_insert_with(|| ModuleState::new(loading))
    }

    fn find_pending(&self, patch_id: PatchId) -> Option<&PendingPatch> {
        self.modules
            .values()
            .flat_map(|m| &m.pending)
            .find(|p| p.record.patch_id == patch_id)
    }

    fn find_pending_mut(&mut self, patch_id: PatchId) -> Option<&mut PendingPatch> {
        self.modules
            .values_mut()
            .flat_map(|m| &mut m.pending)
            .find(|p| p.record.patch_id == patch_id)
    }

    fn records(&self) -> Vec<PatchRecord> {
        self.modules
            .values()
            .flat_map(|m| m.pending.iter().map(|p| p.record.clone()))
            .collect()
    }

    /// The watched view of `source_path`, or a freshly computed one when
    /// nobody subscribes to it.
    fn shallow_of(&self, source_path: &SourcePath) -> Arc<ShallowResult> {
        if let Some(watched) = self.shallow.get(source_path) {
            return Arc::clone(&watched.view);
        }
        let module = source_path.module_file_path();
        let tree = self.modules.get(&module).and_then(|m| m.tree.as_deref());
        Arc::new(compute_shallow(self.schemas.as_deref(), tree, source_path))
    }

    fn watch_shallow(&mut self, source_path: &SourcePath) {
        if let Some(watched) = self.shallow.get_mut(source_path) {
            watched.watchers += 1;
            return;
        }
        let view = self.shallow_of(source_path);
        self.shallow
            .insert(source_path.clone(), WatchedView { view, watchers: 1 });
    }

    fn unwatch_shallow(&mut self, source_path: &SourcePath) {
        let Some(watched) = self.shallow.get_mut(source_path) else {
            return;
        };
        watched.watchers = watched.watchers.saturating_sub(1);
        if watched.watchers == 0 {
            self.shallow.remove(source_path);
        }
    }

    /// Recompute watched shallow views of `module`, or of every module.
    fn refresh_shallow(&mut self, module: Option<&ModuleFilePath>, topics: &mut Vec<Topic>) {
        let EngineState {
            modules,
            schemas,
            shallow,
            ..
        } = self;
        for (source_path, watched) in shallow.iter_mut() {
            let owner = source_path.module_file_path();
            if module.is_some_and(|target| *target != owner) {
                continue;
            }
            let tree = modules.get(&owner).and_then(|m| m.tree.as_deref());
            let next = compute_shallow(schemas.as_deref(), tree, source_path);
            if *watched.view != next {
                watched.view = Arc::new(next);
                topics.push(Topic::Shallow(source_path.clone()));
            }
        }
    }
}

fn compute_shallow(schemas: Option<&SchemaSet>, tree: Option<&Value>, source_path: &SourcePath) -> ShallowResult {
    let module = source_path.module_file_path();
    let schema = schemas
        .and_then(|s| s.get(&module))
        .ok_or(ResolveError::NotFound { module })?;
    shallow_at_source_path(source_path, schema, tree)
}

/// Rebuild the optimistic tree from the authoritative base by replaying
/// every pending patch the base does not contain yet.
fn replay(module: &ModuleFilePath, m: &mut ModuleState, topics: &mut Vec<Topic>) {
    let Some(base) = &m.base else {
        return;
    };
    let mut tree = base.clone();
    for p in m
        .pending
        .iter_mut()
        .filter(|p| !p.applied && p.state != PatchState::Failed)
    {
        if let Err(e) = apply_patch(&mut tree, &p.record.ops) {
            warn!(module = %module, patch_id = %p.record.patch_id, error = %e, "pending patch no longer applies");
            p.state = PatchState::Failed;
            p.failure = Some(PatchFailure::new(
                format!("patch no longer applies: {e}"),
                Some(p.record.patch_id),
            ));
        }
    }
    if m.tree.as_deref() != Some(&tree) {
        m.tree = Some(Arc::new(tree));
        topics.push(Topic::Module(module.clone()));
    }
}

// ── Snapshots ─────────────────────────────────────────────────────────────

/// Value of one topic at the time of reading.
#[derive(Debug, Clone)]
pub enum Snapshot {
    Module(Option<Arc<Value>>),
    Schemas(Option<Arc<SchemaSet>>),
    SyncStatus(Arc<SyncStatus>),
    PendingOpsCount(usize),
    Render(Option<Arc<Value>>),
    Shallow(Arc<ShallowResult>),
    ServiceStatus(ServiceStatus),
    Initialized(Option<DateTime<Utc>>),
}

// ── Engine ────────────────────────────────────────────────────────────────

pub struct SyncEngine<T> {
    transport: T,
    config: SyncConfig,
    state: Arc<Mutex<EngineState>>,
    listeners: Arc<ListenerRegistry>,
    /// One submission per module at a time, so a module's queue reaches the
    /// server in order even when a batch has to be resent.
    submit_turns: Mutex<HashMap<ModuleFilePath, Arc<AsyncMutex<()>>>>,
}

impl<T: Transport> SyncEngine<T> {
    pub fn new(transport: T, config: SyncConfig) -> Self {
        Self {
            transport,
            config,
            state: Arc::new(Mutex::new(EngineState::new())),
            listeners: Arc::new(ListenerRegistry::new()),
            submit_turns: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn emit(&self, mut topics: Vec<Topic>) {
        let mut seen = HashSet::new();
        topics.retain(|t| seen.insert(t.clone()));
        if !topics.is_empty() {
            self.listeners.notify(&topics);
        }
    }

    // ── Subscriptions ─────────────────────────────────────────────────────

    /// Register `listener` for `topic`. Subscribing to a module topic
    /// creates the module in the loading state. A shallow view is kept
    /// current only while some subscription watches its address.
    pub fn subscribe(&self, topic: Topic, listener: impl Fn() + Send + Sync + 'static) -> Subscription {
        {
            let mut state = self.state.lock();
            match &topic {
                Topic::Module(m) | Topic::SyncStatus(m) | Topic::Render(m) => {
                    state.module_mut(m);
                }
                Topic::Shallow(source_path) => state.watch_shallow(source_path),
                _ => {}
            }
        }
        let subscription = self.listeners.subscribe(topic.clone(), Arc::new(listener));
        match topic {
            Topic::Shallow(source_path) => {
                let state = Arc::downgrade(&self.state);
                subscription.on_release(move || {
                    if let Some(state) = state.upgrade() {
                        state.lock().unwatch_shallow(&source_path);
                    }
                })
            }
            _ => subscription,
        }
    }

    pub fn get_snapshot(&self, topic: &Topic) -> Snapshot {
        match topic {
            Topic::Module(m) => Snapshot::Module(self.module(m)),
            Topic::Schemas => Snapshot::Schemas(self.schemas()),
            Topic::SyncStatus(m) => Snapshot::SyncStatus(self.status(m)),
            Topic::PendingOpsCount => Snapshot::PendingOpsCount(self.pending_ops_count()),
            Topic::Render(m) => Snapshot::Render(self.render(m)),
            Topic::Shallow(source_path) => Snapshot::Shallow(self.shallow(source_path)),
            Topic::ServiceStatus => Snapshot::ServiceStatus(self.service_status()),
            Topic::Initialized => Snapshot::Initialized(self.initialized_at()),
        }
    }

    /// Optimistic tree of `module`, `None` until it is loaded.
    pub fn module(&self, module: &ModuleFilePath) -> Option<Arc<Value>> {
        self.state.lock().modules.get(module).and_then(|m| m.tree.clone())
    }

    pub fn schemas(&self) -> Option<Arc<SchemaSet>> {
        self.state.lock().schemas.clone()
    }

    pub fn status(&self, module: &ModuleFilePath) -> Arc<SyncStatus> {
        let state = self.state.lock();
        match state.modules.get(module) {
            Some(m) => Arc::clone(&m.status),
            None => Arc::clone(&state.loading),
        }
    }

    /// Patches not yet complete, including failed ones kept for revert and
    /// applied ones still waiting for their upload.
    pub fn pending_ops_count(&self) -> usize {
        self.state.lock().modules.values().map(|m| m.pending.len()).sum()
    }

    pub fn render(&self, module: &ModuleFilePath) -> Option<Arc<Value>> {
        self.state.lock().modules.get(module).and_then(|m| m.render.clone())
    }

    pub fn shallow(&self, source_path: &SourcePath) -> Arc<ShallowResult> {
        self.state.lock().shallow_of(source_path)
    }

    pub fn service_status(&self) -> ServiceStatus {
        self.state.lock().service
    }

    pub fn initialized_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().initialized_at
    }

    pub fn version_marker(&self) -> VersionMarker {
        self.state.lock().marker()
    }

    pub fn patch_state(&self, patch_id: PatchId) -> Option<PatchState> {
        self.state.lock().find_pending(patch_id).map(|p| p.state)
    }

    /// Every queued patch, grouped by module in module order.
    pub fn patch_records(&self) -> Vec<PatchRecord> {
        self.state.lock().records()
    }

    /// Queued patches grouped by target. Addresses are translated through
    /// the module's schema so numeric record keys stay keys.
    pub fn patch_sets(&self) -> Vec<PatchSet> {
        let state = self.state.lock();
        aggregate_with(&state.records(), |module, path| {
            let tree = state.modules.get(module).and_then(|m| m.tree.as_deref());
            state
                .schemas
                .as_deref()
                .and_then(|schemas| schemas.get(module))
                .and_then(|schema| patch_path_to_module_path(module, schema, tree, path).ok())
                .unwrap_or_else(|| from_patch_path(path))
        })
    }

    pub fn set_render(&self, module: &ModuleFilePath, render: Option<Value>) {
        {
            let mut state = self.state.lock();
            state.module_mut(module).render = render.map(Arc::new);
        }
        self.emit(vec![Topic::Render(module.clone())]);
    }

    // ── Local edits ───────────────────────────────────────────────────────

    pub fn create_patch_id(&self) -> PatchId {
        PatchId::new()
    }

    pub fn add_patch(
        &self,
        module: &ModuleFilePath,
        kind: SchemaKind,
        ops: Vec<Op>,
        created_at: DateTime<Utc>,
    ) -> Result<PatchId, SyncError> {
        self.add_patch_with_id(module, kind, ops, PatchId::new(), created_at)
    }

    /// Queue a patch under a caller-chosen id and apply it to the optimistic
    /// tree. `kind` is the schema kind of the edited node.
    ///
    /// Adding the same id with the same operations again is a no-op.
    pub fn add_patch_with_id(
        &self,
        module: &ModuleFilePath,
        kind: SchemaKind,
        ops: Vec<Op>,
        patch_id: PatchId,
        created_at: DateTime<Utc>,
    ) -> Result<PatchId, SyncError> {
        let mut topics = Vec::new();
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            let tree = state.modules.get(module).and_then(|m| m.tree.clone());
            let schemas = state.schemas.clone();
            if let Some(schemas) = &schemas {
                let schema = schemas
                    .get(module)
                    .ok_or_else(|| SyncError::UnknownModule(module.clone()))?;
                for op in ops.iter().filter(|op| matches!(op, Op::File { .. })) {
                    if !kind.is_file_like() {
                        return Err(PatchError::FileNotAllowed(kind).into());
                    }
                    let at = patch_path_to_module_path(module, schema, tree.as_deref(), op.path())?;
                    let target = schema_at(module, schema, tree.as_deref(), &at)?.kind();
                    if !target.is_file_like() {
                        return Err(PatchError::FileNotAllowed(target).into());
                    }
                }
            }

            let head = state.revision.clone().unwrap_or_default();
            let m = state.module_mut(module);
            let parent_ref = match m.pending.last() {
                Some(last) => ParentRef::Patch {
                    patch_id: last.record.patch_id,
                },
                None => ParentRef::Head { head_base_sha: head },
            };
            let (ops, uploads) = desugar_file_ops(ops, patch_id, &parent_ref)?;

            if let Some(existing) = state.find_pending(patch_id) {
                if existing.record.module_file_path == *module && existing.record.ops == ops {
                    debug!(module = %module, patch_id = %patch_id, "patch already queued");
                    return Ok(patch_id);
                }
                return Err(SyncError::Duplicate(patch_id));
            }

            let m = state.module_mut(module);
            if let Some(tree) = &m.tree {
                let mut next = Value::clone(tree);
                apply_patch(&mut next, &ops)?;
                if let Some(schema) = schemas.as_deref().and_then(|s| s.get(module)) {
                    let problems = validate(module, schema, &next);
                    if let Some(first) = problems.first() {
                        warn!(
                            module = %module,
                            patch_id = %patch_id,
                            errors = problems.len(),
                            first = %first,
                            "optimistic tree no longer matches its schema"
                        );
                    }
                }
                m.tree = Some(Arc::new(next));
                topics.push(Topic::Module(module.clone()));
            }
            debug!(
                module = %module,
                patch_id = %patch_id,
                ops = ops.len(),
                uploads = uploads.len(),
                "patch queued"
            );
            m.pending.push(PendingPatch {
                record: PatchRecord {
                    patch_id,
                    module_file_path: module.clone(),
                    ops,
                    created_at,
                    author: None,
                },
                parent_ref,
                state: PatchState::Queued,
                uploads,
                applied: false,
                failure: None,
            });
            m.set_status(module, SyncStatus::Loading, &mut topics);
            topics.push(Topic::PendingOpsCount);
            state.refresh_shallow(Some(module), &mut topics);
        }
        self.emit(topics);
        Ok(patch_id)
    }

    /// Queue a patch and submit the module's queue up to and including it.
    /// Resolves once the server accepted or refused it, waiting out any
    /// submission of the module that is already under way.
    pub async fn add_patch_awaitable(
        &self,
        module: &ModuleFilePath,
        kind: SchemaKind,
        ops: Vec<Op>,
        patch_id: PatchId,
        created_at: DateTime<Utc>,
    ) -> Result<PatchId, SyncError> {
        self.add_patch_with_id(module, kind, ops, patch_id, created_at)?;
        loop {
            self.push_module(module).await?;
            let state = self.state.lock();
            let pending = state
                .find_pending(patch_id)
                .ok_or(SyncError::UnknownPatch(patch_id))?;
            return match pending.state {
                PatchState::Submitted => Ok(patch_id),
                PatchState::Failed => {
                    let message = pending
                        .failure
                        .as_ref()
                        .map(|f| f.message.clone())
                        .unwrap_or_default();
                    Err(TransportError::Rejected {
                        message,
                        patch_id: Some(patch_id),
                    }
                    .into())
                }
                // Another caller took it since; the next turn waits for it.
                PatchState::InFlight => continue,
                PatchState::Queued => Err(SyncError::Stale),
            };
        }
    }

    /// Buffer an edit from a continuous-input field. Buffered edits are not
    /// visible until [`SyncEngine::flush_debounced`] turns each address's
    /// edits into one patch.
    pub fn add_debounced_patch(&self, source_path: &SourcePath, kind: SchemaKind, ops: Vec<Op>) {
        self.state.lock().debounce.push(source_path, kind, ops, Utc::now());
    }

    pub fn flush_debounced(&self) -> Vec<PatchId> {
        let edits = self.state.lock().debounce.drain();
        let mut ids = Vec::with_capacity(edits.len());
        for (source_path, edit) in edits {
            match self.add_patch(&edit.module, edit.kind, edit.ops, edit.created_at) {
                Ok(id) => ids.push(id),
                Err(e) => warn!(source_path = %source_path, error = %e, "dropping debounced edit"),
            }
        }
        if !ids.is_empty() {
            debug!(patches = ids.len(), "flushed debounced edits");
        }
        ids
    }

    /// Remove patches from the queue and replay the rest over the last
    /// authoritative tree. Patches the server already holds are deleted there
    /// too; a response still in flight for them is dropped as stale.
    pub async fn delete_patches(&self, ids: &[PatchId]) -> Result<(), SyncError> {
        let wanted: HashSet<PatchId> = ids.iter().copied().collect();
        let mut topics = Vec::new();
        let remote = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let mut remote = Vec::new();
            let mut touched = Vec::new();
            for (module, m) in state.modules.iter_mut() {
                let before = m.pending.len();
                m.pending.retain(|p| {
                    if !wanted.contains(&p.record.patch_id) {
                        return true;
                    }
                    if matches!(p.state, PatchState::InFlight | PatchState::Submitted) {
                        remote.push(p.record.patch_id);
                    }
                    false
                });
                if m.pending.len() != before {
                    replay(module, m, &mut topics);
                    touched.push(module.clone());
                }
            }
            if !touched.is_empty() {
                state.epoch += 1;
                topics.push(Topic::PendingOpsCount);
                for module in &touched {
                    state.refresh_shallow(Some(module), &mut topics);
                }
            }
            info!(requested = ids.len(), remote = remote.len(), "deleted patches");
            remote
        };
        self.emit(topics);
        if !remote.is_empty() {
            let result = self.transport.delete_patches(&remote).await;
            self.note_network(&result);
            result?;
        }
        Ok(())
    }

    // ── Server round trips ────────────────────────────────────────────────

    /// Fetch schemas and sources, then mark the engine initialized.
    pub async fn init(&self) -> Result<(), SyncError> {
        let result = self.transport.fetch_schemas().await;
        self.note_network(&result);
        let schemas = result?;
        let mut topics = vec![Topic::Schemas];
        {
            let mut state = self.state.lock();
            info!(schema_sha = ?schemas.schema_sha, modules = schemas.schemas.len(), "schemas loaded");
            state.schemas = Some(Arc::new(schemas));
            state.refresh_shallow(None, &mut topics);
        }
        self.emit(topics);

        self.refresh().await?;

        let at = Utc::now();
        self.state.lock().initialized_at = Some(at);
        info!(initialized_at = %at, "sync engine initialized");
        self.emit(vec![Topic::Initialized]);
        Ok(())
    }

    /// One reconciliation cycle: flush debounced edits, push every module's
    /// queue in order, then fetch and reconcile authoritative state.
    pub async fn sync(&self) -> Result<(), SyncError> {
        self.flush_debounced();
        let modules: Vec<ModuleFilePath> = {
            let state = self.state.lock();
            state
                .modules
                .iter()
                .filter(|(_, m)| m.pending.iter().any(|p| p.state == PatchState::Queued))
                .map(|(module, _)| module.clone())
                .collect()
        };
        let mut first_error = None;
        for module in &modules {
            if let Err(e) = self.push_module(module).await {
                warn!(module = %module, error = %e, "patch submission failed");
                first_error.get_or_insert(e);
            }
        }
        self.refresh().await?;
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Fetch authoritative sources and reconcile them. Returns `false` when
    /// the response was stale.
    pub async fn refresh(&self) -> Result<bool, SyncError> {
        let (marker, modules) = {
            let state = self.state.lock();
            let modules: Vec<ModuleFilePath> = state.modules.keys().cloned().collect();
            (state.marker(), modules)
        };
        let result = self.transport.fetch_sources(&modules).await;
        self.note_network(&result);
        Ok(self.reconcile(&marker, result?))
    }

    /// Fold an authoritative response issued at `marker` into the engine.
    ///
    /// Applied patches leave the queue unless an upload is outstanding, the
    /// rest are replayed over the new base and every module in the response
    /// ends up in success or error. A response whose marker is out of date
    /// changes nothing.
    pub fn reconcile(&self, marker: &VersionMarker, response: SourcesResponse) -> bool {
        let mut topics = Vec::new();
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if state.marker() != *marker {
                warn!(
                    target: "val_sync::stale",
                    issued = ?marker,
                    current = ?state.marker(),
                    "discarding stale sources response"
                );
                return false;
            }
            state.revision = response.revision;
            state.epoch += 1;

            let mut touched = Vec::with_capacity(response.modules.len());
            for (module, source) in response.modules {
                let m = state.module_mut(&module);
                let applied: HashSet<PatchId> = source.applied.into_iter().collect();
                for p in m.pending.iter_mut() {
                    if applied.contains(&p.record.patch_id) {
                        p.applied = true;
                        p.state = PatchState::Submitted;
                    }
                }
                let before = m.pending.len();
                m.pending.retain(|p| !p.is_complete());
                if m.pending.len() != before {
                    topics.push(Topic::PendingOpsCount);
                }

                m.errors.clear();
                for failure in source.errors {
                    let target = failure
                        .patch_id
                        .and_then(|id| m.pending.iter_mut().find(|p| p.record.patch_id == id));
                    match target {
                        Some(p) => {
                            p.state = PatchState::Failed;
                            p.failure = Some(failure);
                        }
                        None => m.errors.push(failure),
                    }
                }

                m.base = Some(source.source);
                replay(&module, m, &mut topics);
                let failures = m.failures();
                let status = if failures.is_empty() {
                    SyncStatus::Success {
                        data: m.tree.as_deref().cloned().unwrap_or(Value::Null),
                    }
                } else {
                    SyncStatus::Error { errors: failures }
                };
                m.set_status(&module, status, &mut topics);
                touched.push(module);
            }
            for module in &touched {
                state.refresh_shallow(Some(module), &mut topics);
            }
            debug!(revision = ?state.revision, modules = touched.len(), "reconciled sources");
        }
        self.emit(topics);
        true
    }

    fn submit_turn(&self, module: &ModuleFilePath) -> Arc<AsyncMutex<()>> {
        Arc::clone(self.submit_turns.lock().entry(module.clone()).or_default())
    }

    /// Submit every queued patch of `module` in queue order. Waits for any
    /// earlier submission of the module to settle first.
    async fn push_module(&self, module: &ModuleFilePath) -> Result<(), SyncError> {
        let turn = self.submit_turn(module);
        let _turn = turn.lock().await;
        let (marker, submissions) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let marker = state.marker();
            let Some(m) = state.modules.get_mut(module) else {
                return Ok(());
            };
            let submissions: Vec<PatchSubmission> = m
                .pending
                .iter_mut()
                .filter(|p| p.state == PatchState::Queued)
                .map(|p| {
                    p.state = PatchState::InFlight;
                    PatchSubmission::new(
                        p.record.patch_id,
                        module.clone(),
                        &p.record.ops,
                        p.record.created_at,
                        p.parent_ref.clone(),
                    )
                })
                .collect();
            (marker, submissions)
        };
        if submissions.is_empty() {
            return Ok(());
        }
        let batch: HashSet<PatchId> = submissions.iter().map(|s| s.patch_id).collect();
        debug!(module = %module, patches = batch.len(), "submitting patches");

        let result = self.transport.submit_patches(&submissions).await;
        self.note_network(&result);

        let mut topics = Vec::new();
        let outcome = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let stale = state.marker() != marker;
            if stale {
                warn!(target: "val_sync::stale", module = %module, "submission answered after the tree moved on");
            }
            let Some(m) = state.modules.get_mut(module) else {
                return result.map(|_| ()).map_err(Into::into);
            };
            let in_batch = |p: &PendingPatch| batch.contains(&p.record.patch_id) && p.state == PatchState::InFlight;
            match result {
                Ok(response) => {
                    let accepted: HashSet<PatchId> = response.accepted.into_iter().collect();
                    let mut failed = false;
                    for p in m.pending.iter_mut().filter(|p| in_batch(p)) {
                        let id = p.record.patch_id;
                        let failure = response.errors.iter().find(|f| f.patch_id == Some(id));
                        if accepted.contains(&id) {
                            p.state = PatchState::Submitted;
                        } else if let (Some(failure), false) = (failure, stale) {
                            p.state = PatchState::Failed;
                            p.failure = Some(failure.clone());
                            failed = true;
                        } else {
                            p.state = PatchState::Queued;
                        }
                    }
                    info!(module = %module, accepted = accepted.len(), "patches acknowledged");
                    if failed {
                        replay(module, m, &mut topics);
                        let errors = m.failures();
                        m.set_status(module, SyncStatus::Error { errors }, &mut topics);
                    }
                    Ok(())
                }
                Err(TransportError::Rejected { message, patch_id }) if !stale => {
                    warn!(module = %module, error = %message, "submission rejected");
                    for p in m.pending.iter_mut().filter(|p| in_batch(p)) {
                        if patch_id.is_none() || patch_id == Some(p.record.patch_id) {
                            p.state = PatchState::Failed;
                            p.failure = Some(PatchFailure::new(message.clone(), Some(p.record.patch_id)));
                        } else {
                            p.state = PatchState::Queued;
                        }
                    }
                    replay(module, m, &mut topics);
                    let errors = m.failures();
                    m.set_status(module, SyncStatus::Error { errors }, &mut topics);
                    Err(TransportError::Rejected { message, patch_id }.into())
                }
                Err(e) => {
                    for p in m.pending.iter_mut().filter(|p| in_batch(p)) {
                        p.state = PatchState::Queued;
                    }
                    Err(e.into())
                }
            }
        };
        {
            let mut state = self.state.lock();
            state.refresh_shallow(Some(module), &mut topics);
        }
        self.emit(topics);
        outcome
    }

    /// Upload every outstanding file of `patch_id`. The patch leaves the
    /// queue once all uploads acknowledged and the server applied it.
    pub async fn upload_file(
        &self,
        patch_id: PatchId,
        progress: Progress,
    ) -> Result<Vec<FileUploadResponse>, SyncError> {
        let uploads = self
            .state
            .lock()
            .find_pending(patch_id)
            .map(|p| p.uploads.clone())
            .ok_or(SyncError::UnknownPatch(patch_id))?;
        let mut responses = Vec::with_capacity(uploads.len());
        for upload in uploads {
            let result = self
                .transport
                .upload_file(patch_id, &upload.request, Arc::clone(&progress))
                .await;
            self.note_network(&result);
            let response = result?;
            info!(patch_id = %patch_id, file_path = %response.file_path, "upload acknowledged");
            let removed = {
                let mut guard = self.state.lock();
                let state = &mut *guard;
                if let Some(p) = state.find_pending_mut(patch_id) {
                    p.uploads.retain(|u| u.sha256 != upload.sha256);
                }
                let mut removed = false;
                for m in state.modules.values_mut() {
                    let before = m.pending.len();
                    m.pending
                        .retain(|p| p.record.patch_id != patch_id || !p.is_complete());
                    removed |= m.pending.len() != before;
                }
                removed
            };
            if removed {
                self.emit(vec![Topic::PendingOpsCount]);
            }
            responses.push(response);
        }
        Ok(responses)
    }

    /// Track reachability. Network failures that persist past the grace
    /// period flip the service to unavailable; any answer flips it back.
    fn note_network<R>(&self, result: &Result<R, TransportError>) {
        let mut streak_started = None;
        let changed = {
            let mut state = self.state.lock();
            match result {
                Err(e) if e.is_network() => {
                    let now = Instant::now();
                    if state.failing_since.is_none() {
                        streak_started = Some(now);
                    }
                    let since = *state.failing_since.get_or_insert(now);
                    let elapsed = now.duration_since(since);
                    if state.service == ServiceStatus::Available && elapsed >= self.config.network_grace {
                        warn!(error = %e, failing_for = ?elapsed, "content service unavailable");
                        state.service = ServiceStatus::Unavailable;
                        true
                    } else {
                        debug!(error = %e, "network failure within grace period");
                        false
                    }
                }
                _ => {
                    state.failing_since = None;
                    if state.service == ServiceStatus::Unavailable {
                        info!("content service reachable again");
                        state.service = ServiceStatus::Available;
                        true
                    } else {
                        false
                    }
                }
            }
        };
        if changed {
            self.emit(vec![Topic::ServiceStatus]);
        }
        if let Some(since) = streak_started {
            self.schedule_unavailable(since);
        }
    }

    /// Flip to unavailable once `network_grace` has passed since `since`,
    /// unless some request got an answer in the meantime.
    fn schedule_unavailable(&self, since: Instant) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let state = Arc::downgrade(&self.state);
        let listeners = Arc::clone(&self.listeners);
        let grace = self.config.network_grace;
        runtime.spawn(async move {
            tokio::time::sleep_until(since + grace).await;
            let Some(state) = state.upgrade() else {
                return;
            };
            let flipped = {
                let mut state = state.lock();
                if state.failing_since == Some(since) && state.service == ServiceStatus::Available {
                    warn!(failing_for = ?grace, "content service unavailable");
                    state.service = ServiceStatus::Unavailable;
                    true
                } else {
                    false
                }
            };
            if flipped {
                listeners.notify(&[Topic::ServiceStatus]);
            }
        });
    }
}
