//! Background build execution with single-flight per package identity.
//!
//! The docset directory is the durable record of what is available. The
//! coordinator's task map only tracks work that has not finished yet and
//! overrides the filesystem view while it exists.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, Semaphore, broadcast, watch};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use docsmith_builders::TEMP_DIR_NAME;
use docsmith_shared::{
    AppConfig, BuildStatus, DocsetError, DocsetStatus, PackageIdentity, Result,
};
use docsmith_storage::StatusStore;

use crate::pipeline::{BuildRequest, Pipeline, ProgressReporter, SilentProgress};

/// Completion events buffered per subscriber before the oldest are dropped.
const EVENT_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Runtime settings for the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    pub max_concurrent_builds: usize,
}

impl From<&AppConfig> for CoordinatorOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_concurrent_builds: config.defaults.max_concurrent_builds,
        }
    }
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

/// Terminal result of one build task, shared by every attached caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub task_id: Uuid,
    pub identity: PackageIdentity,
    pub success: bool,
    /// Artifact path on success, the verbatim failure reason otherwise.
    pub message: String,
    pub artifact_path: Option<PathBuf>,
}

/// Broadcast to subscribers whenever a task finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionEvent {
    pub success: bool,
    pub message: String,
    pub name: String,
    pub version: String,
}

impl From<&BuildOutcome> for CompletionEvent {
    fn from(outcome: &BuildOutcome) -> Self {
        Self {
            success: outcome.success,
            message: outcome.message.clone(),
            name: outcome.identity.name().to_string(),
            version: outcome.identity.version().to_string(),
        }
    }
}

/// A caller's attachment to a build task.
#[derive(Debug)]
pub struct BuildHandle {
    task_id: Uuid,
    identity: PackageIdentity,
    result: watch::Receiver<Option<BuildOutcome>>,
}

impl BuildHandle {
    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    pub fn identity(&self) -> &PackageIdentity {
        &self.identity
    }

    /// Wait for the task to finish.
    pub async fn wait(mut self) -> BuildOutcome {
        let outcome = match self.result.wait_for(Option::is_some).await {
            Ok(current) => (*current).clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| self.lost())
    }

    fn lost(&self) -> BuildOutcome {
        BuildOutcome {
            task_id: self.task_id,
            identity: self.identity.clone(),
            success: false,
            message: "build task ended without reporting a result".into(),
            artifact_path: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

struct ActiveTask {
    id: Uuid,
    status: BuildStatus,
    result: watch::Sender<Option<BuildOutcome>>,
}

#[derive(Default)]
struct TaskTable {
    active: HashMap<PackageIdentity, ActiveTask>,
    deleting: HashSet<PackageIdentity>,
}

struct Inner {
    pipeline: Arc<Pipeline>,
    store: Arc<dyn StatusStore>,
    progress: Arc<dyn ProgressReporter>,
    permits: Arc<Semaphore>,
    tasks: Mutex<TaskTable>,
    events: broadcast::Sender<CompletionEvent>,
    accepting: AtomicBool,
}

/// Runs build pipelines in the background, at most one per identity.
#[derive(Clone)]
pub struct TaskCoordinator {
    inner: Arc<Inner>,
}

impl TaskCoordinator {
    pub fn new(pipeline: Pipeline, store: Arc<dyn StatusStore>, opts: CoordinatorOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                pipeline: Arc::new(pipeline),
                store,
                progress: Arc::new(SilentProgress),
                permits: Arc::new(Semaphore::new(opts.max_concurrent_builds.max(1))),
                tasks: Mutex::new(TaskTable::default()),
                events,
                accepting: AtomicBool::new(true),
            }),
        }
    }

    /// Replace the progress reporter. Only valid before the first submit.
    pub fn with_progress(self, progress: Arc<dyn ProgressReporter>) -> Self {
        match Arc::try_unwrap(self.inner) {
            Ok(mut inner) => {
                inner.progress = progress;
                Self {
                    inner: Arc::new(inner),
                }
            }
            Err(inner) => {
                warn!("coordinator already shared; progress reporter not replaced");
                Self { inner }
            }
        }
    }

    pub fn base_dir(&self) -> &Path {
        self.inner.pipeline.base_dir()
    }

    /// Completion events for every task finishing from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<CompletionEvent> {
        self.inner.events.subscribe()
    }

    /// Start a build, or attach to the one already running for this identity.
    #[instrument(skip_all, fields(name = %request.identity.name(), version = %request.identity.version()))]
    pub async fn submit(&self, request: BuildRequest) -> Result<BuildHandle> {
        if !self.inner.accepting.load(Ordering::SeqCst) {
            return Err(DocsetError::ShutDown);
        }
        let identity = request.identity.clone();

        let (task_id, result) = {
            let mut tasks = self.inner.tasks.lock().await;
            if tasks.deleting.contains(&identity) {
                return Err(DocsetError::validation(format!(
                    "{identity} is being deleted"
                )));
            }
            if let Some(task) = tasks.active.get(&identity) {
                debug!(task_id = %task.id, "attaching to in-flight build");
                return Ok(BuildHandle {
                    task_id: task.id,
                    identity,
                    result: task.result.subscribe(),
                });
            }

            let task_id = Uuid::now_v7();
            let (sender, result) = watch::channel(None);
            tasks.active.insert(
                identity.clone(),
                ActiveTask {
                    id: task_id,
                    status: BuildStatus::Pending,
                    result: sender,
                },
            );
            (task_id, result)
        };

        info!(%task_id, "build submitted");
        let handle = BuildHandle {
            task_id,
            identity,
            result,
        };
        let inner = self.inner.clone();
        tokio::spawn(async move { inner.execute(task_id, request).await });
        Ok(handle)
    }

    /// Caller-visible status. A non-terminal task wins; otherwise the
    /// directory on disk decides, falling back to a recorded failure.
    pub async fn status(&self, identity: &PackageIdentity) -> DocsetStatus {
        if let Some(task) = self.inner.tasks.lock().await.active.get(identity) {
            return task.status.into();
        }
        if is_docset_dir(&self.inner.pipeline.docset_path(identity)) {
            return DocsetStatus::Available;
        }
        match self.inner.store.get_status(identity).await {
            Ok(Some(record)) if record.status == DocsetStatus::Error => DocsetStatus::Error,
            Ok(_) => DocsetStatus::NotAvailable,
            Err(e) => {
                warn!(%identity, error = %e, "status lookup failed");
                DocsetStatus::NotAvailable
            }
        }
    }

    /// The last recorded failure message, if any.
    pub async fn last_error(&self, identity: &PackageIdentity) -> Option<String> {
        match self.inner.store.get_status(identity).await {
            Ok(record) => record.and_then(|r| r.last_error),
            Err(e) => {
                warn!(%identity, error = %e, "status lookup failed");
                None
            }
        }
    }

    /// Remove the docset and reset status to `NotAvailable`. Rejected while
    /// a build for the identity is pending or running.
    #[instrument(skip_all, fields(identity = %identity))]
    pub async fn delete(&self, identity: &PackageIdentity) -> Result<()> {
        {
            let mut tasks = self.inner.tasks.lock().await;
            if tasks.active.contains_key(identity) {
                return Err(DocsetError::BuildInProgress {
                    name: identity.name().to_string(),
                    version: identity.version().to_string(),
                });
            }
            tasks.deleting.insert(identity.clone());
        }

        let result = self.remove_docset(identity).await;
        self.inner.tasks.lock().await.deleting.remove(identity);
        result
    }

    async fn remove_docset(&self, identity: &PackageIdentity) -> Result<()> {
        let path = self.inner.pipeline.docset_path(identity);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(&path)
                .await
                .map_err(|e| DocsetError::io(&path, e))?;
            info!(path = %path.display(), "docset deleted");
        }
        if let Some(parent) = path.parent() {
            // only succeeds once no other version is left
            let _ = tokio::fs::remove_dir(parent).await;
        }
        self.inner
            .store
            .set_status(identity, DocsetStatus::NotAvailable, None)
            .await
    }

    /// Delete then submit. If the submit cannot start, the identity stays
    /// `NotAvailable`.
    pub async fn regenerate(&self, request: BuildRequest) -> Result<BuildHandle> {
        self.delete(&request.identity).await?;
        self.submit(request).await
    }

    /// Every `{name}/{version}` docset present on disk, sorted.
    pub async fn list_docsets(&self) -> Result<Vec<(PackageIdentity, PathBuf)>> {
        let base = self.base_dir().to_path_buf();
        tokio::task::spawn_blocking(move || scan_docsets(&base))
            .await
            .map_err(|e| DocsetError::Storage(format!("docset scan aborted: {e}")))?
    }

    /// Reconcile the status store with the docset directory.
    ///
    /// Docsets on disk become `Available`. Records claiming `Available`,
    /// `Pending` or `Running` without a directory or a live task become
    /// `NotAvailable`. Returns the identities found on disk.
    #[instrument(skip_all)]
    pub async fn refresh(&self) -> Result<Vec<PackageIdentity>> {
        let on_disk = self.list_docsets().await?;
        let active: HashSet<PackageIdentity> = self
            .inner
            .tasks
            .lock()
            .await
            .active
            .keys()
            .cloned()
            .collect();

        for (identity, path) in &on_disk {
            if !active.contains(identity) {
                self.inner
                    .store
                    .set_status(identity, DocsetStatus::Available, Some(path.as_path()))
                    .await?;
            }
        }

        let present: HashSet<&PackageIdentity> = on_disk.iter().map(|(id, _)| id).collect();
        for record in self.inner.store.list().await? {
            let stale = matches!(
                record.status,
                DocsetStatus::Available | DocsetStatus::Pending | DocsetStatus::Running
            );
            if stale && !present.contains(&record.identity) && !active.contains(&record.identity) {
                debug!(identity = %record.identity, "marking missing docset not available");
                self.inner
                    .store
                    .set_status(&record.identity, DocsetStatus::NotAvailable, None)
                    .await?;
            }
        }

        info!(docsets = on_disk.len(), "docset directory reconciled");
        Ok(on_disk.into_iter().map(|(id, _)| id).collect())
    }

    /// Stop accepting work and wait for in-flight tasks to finish.
    pub async fn shutdown(&self) {
        self.inner.accepting.store(false, Ordering::SeqCst);
        let pending: Vec<watch::Receiver<Option<BuildOutcome>>> = self
            .inner
            .tasks
            .lock()
            .await
            .active
            .values()
            .map(|t| t.result.subscribe())
            .collect();
        for mut result in pending {
            let _ = result.wait_for(Option::is_some).await;
        }
        info!("task coordinator shut down");
    }
}

impl Inner {
    /// Drive one task to a terminal state and notify every attached caller.
    #[instrument(skip_all, fields(%task_id, name = %request.identity.name(), version = %request.identity.version()))]
    async fn execute(self: Arc<Self>, task_id: Uuid, request: BuildRequest) {
        let identity = request.identity.clone();
        self.persist(&identity, DocsetStatus::Pending, None).await;

        let outcome = match self.permits.clone().acquire_owned().await {
            Ok(_permit) => {
                self.mark_running(&identity).await;
                self.persist(&identity, DocsetStatus::Running, None).await;
                self.run_guarded(task_id, request).await
            }
            Err(_) => BuildOutcome {
                task_id,
                identity: identity.clone(),
                success: false,
                message: DocsetError::ShutDown.to_string(),
                artifact_path: None,
            },
        };

        self.record_outcome(&outcome).await;

        let sender = self.tasks.lock().await.active.remove(&identity).map(|t| t.result);
        if let Some(sender) = sender {
            sender.send_replace(Some(outcome.clone()));
        }
        let _ = self.events.send(CompletionEvent::from(&outcome));
    }

    /// Run the pipeline on its own task so a panic becomes a failed outcome.
    async fn run_guarded(&self, task_id: Uuid, request: BuildRequest) -> BuildOutcome {
        let identity = request.identity.clone();
        let pipeline = self.pipeline.clone();
        let progress = self.progress.clone();
        let joined =
            tokio::spawn(async move { pipeline.run(&request, progress.as_ref()).await }).await;

        let (success, message, artifact_path) = match joined {
            Ok(Ok(artifact)) => (
                true,
                artifact.path.display().to_string(),
                Some(artifact.path),
            ),
            Ok(Err(e)) => {
                warn!(error = %e, "build failed");
                (false, e.to_string(), None)
            }
            Err(join) => {
                error!(error = %join, "build task panicked");
                (false, format!("build task panicked: {join}"), None)
            }
        };
        BuildOutcome {
            task_id,
            identity,
            success,
            message,
            artifact_path,
        }
    }

    async fn mark_running(&self, identity: &PackageIdentity) {
        if let Some(task) = self.tasks.lock().await.active.get_mut(identity) {
            task.status = BuildStatus::Running;
        }
    }

    /// Persist the terminal state. A failed rebuild that left an earlier
    /// docset in place keeps reporting that docset as available.
    async fn record_outcome(&self, outcome: &BuildOutcome) {
        let identity = &outcome.identity;
        if outcome.success {
            self.persist(identity, DocsetStatus::Available, outcome.artifact_path.as_deref())
                .await;
            return;
        }

        let existing = self.pipeline.docset_path(identity);
        if is_docset_dir(&existing) {
            self.persist(identity, DocsetStatus::Available, Some(existing.as_path())).await;
        } else {
            self.persist(identity, DocsetStatus::Error, None).await;
        }
        if let Err(e) = self.store.record_error(identity, &outcome.message).await {
            warn!(%identity, error = %e, "failed to record build error");
        }
    }

    async fn persist(&self, identity: &PackageIdentity, status: DocsetStatus, path: Option<&Path>) {
        if let Err(e) = self.store.set_status(identity, status, path).await {
            warn!(%identity, %status, error = %e, "failed to persist status");
        }
    }
}

fn is_docset_dir(path: &Path) -> bool {
    path.is_dir()
}

/// Walk `base` two levels deep, skipping the scratch root and hidden
/// entries (publish backups).
fn scan_docsets(base: &Path) -> Result<Vec<(PackageIdentity, PathBuf)>> {
    let entries = match std::fs::read_dir(base) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(DocsetError::io(base, e)),
    };

    let mut found = Vec::new();
    for name_dir in entries.flatten().map(|e| e.path()).filter(|p| p.is_dir()) {
        let Some(name) = visible_name(&name_dir) else {
            continue;
        };
        if name == TEMP_DIR_NAME {
            continue;
        }
        let Ok(versions) = std::fs::read_dir(&name_dir) else {
            continue;
        };
        for version_dir in versions.flatten().map(|e| e.path()).filter(|p| p.is_dir()) {
            let Some(version) = visible_name(&version_dir) else {
                continue;
            };
            match PackageIdentity::new(&name, &version) {
                Ok(identity) => found.push((identity, version_dir)),
                Err(e) => debug!(path = %version_dir.display(), error = %e, "skipping entry"),
            }
        }
    }
    found.sort();
    Ok(found)
}

fn visible_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    (!name.starts_with('.')).then(|| name.to_string())
}
