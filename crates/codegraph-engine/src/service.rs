//! Context service: JSON request/response front end over the query façade,
//! the scheduler and background indexing jobs.
//!
//! Transport is newline-delimited JSON. Each request carries an `intent`
//! tag; each response is `{"ok": bool, "result": ..., "error": ...}`.

use crate::indexer::Indexer;
use crate::scheduler::Scheduler;
use chrono::{DateTime, Utc};
use codegraph_core::{CodegraphConfig, CodegraphError, GraphStore, Repository};
use codegraph_graph::QueryFacade;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Rough indexing cost used for job duration estimates.
const ESTIMATED_MS_PER_FILE: u64 = 15;

/// How often a running job refreshes its progress.
const JOB_POLL_INTERVAL: Duration = Duration::from_millis(200);

fn default_limit() -> usize {
    20
}

// ── Wire Types ──────────────────────────────────────────────────────────────

/// A context request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Request {
    Definition { target: String },
    Callers { target: String },
    Callees { target: String },
    Imports { module: String },
    Contains { target: String },
    Search {
        pattern: String,
        #[serde(default = "default_limit")]
        limit: usize,
    },
    Stats,
    /// Start a background indexing job for a directory.
    Index {
        path: String,
        #[serde(default)]
        is_dependency: bool,
    },
    /// Force re-indexing of one file under the watched root.
    ReindexPath { path: String },
    JobStatus { job_id: String },
    Status,
    ListRepositories,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    fn success(result: Value) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(message.into()),
        }
    }
}

// ── Jobs ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// A background indexing job.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: String,
    pub path: String,
    pub status: JobState,
    pub processed_files: usize,
    pub total_files: usize,
    pub estimated_seconds: u64,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

type Jobs = Arc<Mutex<HashMap<String, Job>>>;

fn lock_jobs(
    jobs: &Mutex<HashMap<String, Job>>,
) -> Result<MutexGuard<'_, HashMap<String, Job>>, CodegraphError> {
    jobs.lock()
        .map_err(|e| CodegraphError::LockPoisoned(format!("jobs: {e}")))
}

fn update_job(jobs: &Mutex<HashMap<String, Job>>, id: &str, f: impl FnOnce(&mut Job)) {
    match lock_jobs(jobs) {
        Ok(mut jobs) => {
            if let Some(job) = jobs.get_mut(id) {
                f(job);
            }
        }
        Err(e) => tracing::error!("{e}"),
    }
}

// ── Service ─────────────────────────────────────────────────────────────────

/// Answers context requests against one graph store.
pub struct ContextService {
    store: Arc<dyn GraphStore>,
    config: CodegraphConfig,
    scheduler: Option<Arc<Scheduler>>,
    jobs: Jobs,
}

impl ContextService {
    pub fn new(store: Arc<dyn GraphStore>, config: CodegraphConfig) -> Self {
        Self {
            store,
            config,
            scheduler: None,
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Attach a live scheduler (watch mode) for `reindex_path` and `status`.
    pub fn with_scheduler(mut self, scheduler: Arc<Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn backend_type(&self) -> &'static str {
        self.store.backend_type()
    }

    pub fn is_connected(&self) -> bool {
        self.store.is_connected()
    }

    /// Parse and answer one JSON line.
    pub fn handle_line(&self, line: &str) -> Response {
        match serde_json::from_str::<Request>(line) {
            Ok(request) => self.handle(request),
            Err(e) => Response::error(format!("Invalid request: {e}")),
        }
    }

    pub fn handle(&self, request: Request) -> Response {
        tracing::debug!("Handling {request:?}");
        match self.dispatch(request) {
            Ok(result) => Response::success(result),
            Err(e) => Response::error(e.to_string()),
        }
    }

    fn dispatch(&self, request: Request) -> Result<Value, CodegraphError> {
        let facade = QueryFacade::new(self.store.as_ref());
        match request {
            Request::Definition { target } => to_value(facade.definition(&target)?),
            Request::Callers { target } => to_value(facade.callers_of(&target)?),
            Request::Callees { target } => to_value(facade.callees_of(&target)?),
            Request::Imports { module } => to_value(facade.imports(&module)?),
            Request::Contains { target } => to_value(facade.contains(&target)?),
            Request::Search { pattern, limit } => to_value(facade.search(&pattern, limit)?),
            Request::Stats => to_value(facade.stats()?),
            Request::Index {
                path,
                is_dependency,
            } => self.start_index_job(&path, is_dependency),
            Request::ReindexPath { path } => self.reindex_path(&path),
            Request::JobStatus { job_id } => {
                let jobs = lock_jobs(&self.jobs)?;
                let job = jobs
                    .get(&job_id)
                    .ok_or_else(|| CodegraphError::NotFound(format!("Job {job_id}")))?;
                to_value(job)
            }
            Request::Status => self.status(),
            Request::ListRepositories => to_value(self.store.list_repositories()?),
        }
    }

    fn start_index_job(&self, path: &str, is_dependency: bool) -> Result<Value, CodegraphError> {
        let root = Path::new(path);
        if !root.is_dir() {
            return Ok(json!({ "status": "path_not_found", "path": path }));
        }
        let root = root.canonicalize()?;
        let key = root.to_string_lossy().into_owned();

        if self
            .store
            .list_repositories()?
            .iter()
            .any(|repo| repo.path == key)
        {
            return Ok(json!({
                "status": "already_indexed",
                "path": key,
                "message": format!("{key} is already indexed; use reindex_path for individual files"),
            }));
        }

        let mut jobs = lock_jobs(&self.jobs)?;
        if let Some(job) = jobs.values().find(|job| {
            job.path == key && matches!(job.status, JobState::Pending | JobState::Running)
        }) {
            return Ok(json!({
                "status": "already_indexing",
                "path": key,
                "job_id": job.id,
            }));
        }

        let indexer = Indexer::new(&root, Arc::clone(&self.store), &self.config.index)?;
        let total_files = indexer.walk().len();
        let estimated_seconds = (total_files as u64 * ESTIMATED_MS_PER_FILE).div_ceil(1000);
        let id = uuid::Uuid::new_v4().to_string();
        jobs.insert(
            id.clone(),
            Job {
                id: id.clone(),
                path: key.clone(),
                status: JobState::Pending,
                processed_files: 0,
                total_files,
                estimated_seconds,
                errors: Vec::new(),
                started_at: Utc::now(),
                finished_at: None,
            },
        );
        drop(jobs);

        let context = JobContext {
            id: id.clone(),
            root,
            is_dependency,
            jobs: Arc::clone(&self.jobs),
            store: Arc::clone(&self.store),
            workers: self.config.index.workers,
            retry: self.config.retry.clone(),
        };
        if let Err(e) = std::thread::Builder::new()
            .name(format!("codegraph-job-{id}"))
            .spawn(move || context.run(indexer))
        {
            update_job(&self.jobs, &id, |job| {
                job.status = JobState::Failed;
                job.errors.push(format!("failed to spawn job thread: {e}"));
            });
            return Err(e.into());
        }

        tracing::info!("Started job {id} for {key} ({total_files} files)");
        Ok(json!({
            "status": "started",
            "job_id": id,
            "path": key,
            "total_files": total_files,
            "estimated_seconds": estimated_seconds,
        }))
    }

    fn reindex_path(&self, path: &str) -> Result<Value, CodegraphError> {
        let scheduler = self.scheduler.as_ref().ok_or_else(|| {
            CodegraphError::NotFound("no live index; run the watcher or use the index intent".into())
        })?;
        let relative = scheduler
            .indexer()
            .relative_path(Path::new(path))
            .ok_or_else(|| {
                CodegraphError::NotFound(format!("{path} is outside the watched root"))
            })?;
        let queued = scheduler.reindex(&relative)?;
        Ok(json!({
            "status": if queued { "queued" } else { "coalesced" },
            "path": relative,
        }))
    }

    fn status(&self) -> Result<Value, CodegraphError> {
        let scheduler = match &self.scheduler {
            Some(scheduler) => Some(scheduler.status()?),
            None => None,
        };
        let mut jobs: Vec<Job> = lock_jobs(&self.jobs)?.values().cloned().collect();
        jobs.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        Ok(json!({
            "backend": self.store.backend_type(),
            "connected": self.store.is_connected(),
            "stats": self.store.stats()?,
            "scheduler": scheduler,
            "jobs": jobs,
        }))
    }
}

fn to_value<T: Serialize>(value: T) -> Result<Value, CodegraphError> {
    Ok(serde_json::to_value(value)?)
}

/// Everything a background job needs, moved onto its thread.
struct JobContext {
    id: String,
    root: PathBuf,
    is_dependency: bool,
    jobs: Jobs,
    store: Arc<dyn GraphStore>,
    workers: usize,
    retry: codegraph_core::RetryConfig,
}

impl JobContext {
    fn run(self, indexer: Indexer) {
        update_job(&self.jobs, &self.id, |job| job.status = JobState::Running);
        let scheduler = Scheduler::start(indexer, self.workers, self.retry.clone());
        let outcome = self.drive(&scheduler);
        scheduler.shutdown();

        match outcome {
            Ok(errors) => {
                tracing::info!(
                    "Job {} completed for {} ({} failed files)",
                    self.id,
                    self.root.display(),
                    errors.len()
                );
                update_job(&self.jobs, &self.id, |job| {
                    job.status = JobState::Completed;
                    job.errors = errors;
                    job.finished_at = Some(Utc::now());
                });
            }
            Err(e) => {
                tracing::warn!("Job {} failed: {e}", self.id);
                update_job(&self.jobs, &self.id, |job| {
                    job.status = JobState::Failed;
                    job.errors.push(e.to_string());
                    job.finished_at = Some(Utc::now());
                });
            }
        }
    }

    /// Index the tree and register the repository. Returns per-file errors.
    fn drive(&self, scheduler: &Scheduler) -> Result<Vec<String>, CodegraphError> {
        let summary = scheduler.reconcile()?;
        update_job(&self.jobs, &self.id, |job| {
            job.total_files = job.total_files.max(summary.queued + summary.deletions)
        });

        while !scheduler.wait_idle(JOB_POLL_INTERVAL)? {
            let processed = scheduler.status()?.processed;
            update_job(&self.jobs, &self.id, |job| job.processed_files = processed);
        }
        let status = scheduler.status()?;
        update_job(&self.jobs, &self.id, |job| {
            job.processed_files = status.processed
        });

        let name = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.root.to_string_lossy().into_owned());
        self.store.register_repository(&Repository {
            path: self.root.to_string_lossy().into_owned(),
            name,
            is_dependency: self.is_dependency,
            indexed_at: Utc::now(),
        })?;

        Ok(status
            .failed
            .into_iter()
            .map(|f| format!("{}: {}", f.path, f.error))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegraph_core::IndexConfig;
    use codegraph_storage::Storage;
    use std::fs;
    use std::time::Instant;

    fn service() -> ContextService {
        let store: Arc<dyn GraphStore> = Arc::new(Storage::open_in_memory().unwrap());
        ContextService::new(store, CodegraphConfig::default())
    }

    fn wait_for_job(service: &ContextService, job_id: &str) -> Value {
        let deadline = Instant::now() + Duration::from_secs(20);
        loop {
            let response = service.handle(Request::JobStatus {
                job_id: job_id.to_string(),
            });
            let job = response.result.unwrap();
            if job["status"] == "completed" || job["status"] == "failed" {
                return job;
            }
            assert!(Instant::now() < deadline, "job did not finish: {job}");
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn request_parsing() {
        let request: Request =
            serde_json::from_str(r#"{"intent": "search", "pattern": "foo"}"#).unwrap();
        assert_eq!(
            request,
            Request::Search {
                pattern: "foo".into(),
                limit: 20
            }
        );
        let request: Request =
            serde_json::from_str(r#"{"intent": "reindex_path", "path": "a.py"}"#).unwrap();
        assert_eq!(request, Request::ReindexPath { path: "a.py".into() });
    }

    #[test]
    fn invalid_requests_are_reported() {
        let service = service();
        let response = service.handle_line(r#"{"intent": "teleport"}"#);
        assert!(!response.ok);
        assert!(response.error.unwrap().contains("Invalid request"));

        let response = service.handle_line("not json");
        assert!(!response.ok);
    }

    #[test]
    fn index_missing_path_is_not_an_error() {
        let service = service();
        let response = service.handle(Request::Index {
            path: "/definitely/not/here".into(),
            is_dependency: false,
        });
        assert!(response.ok);
        assert_eq!(response.result.unwrap()["status"], "path_not_found");
    }

    #[test]
    fn index_job_then_query_then_refuse_reindex() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("shapes.py"),
            "class Circle:\n    def area(self):\n        return helper()\n\ndef helper():\n    return 1\n",
        )
        .unwrap();
        let service = service();

        let started = service
            .handle(Request::Index {
                path: dir.path().to_string_lossy().into_owned(),
                is_dependency: false,
            })
            .result
            .unwrap();
        assert_eq!(started["status"], "started");
        assert_eq!(started["total_files"], 1);
        let job = wait_for_job(&service, started["job_id"].as_str().unwrap());
        assert_eq!(job["status"], "completed");
        assert_eq!(job["processed_files"], 1);

        let repos = service.handle(Request::ListRepositories).result.unwrap();
        assert_eq!(repos.as_array().unwrap().len(), 1);
        assert_eq!(repos[0]["is_dependency"], false);

        let again = service
            .handle(Request::Index {
                path: dir.path().to_string_lossy().into_owned(),
                is_dependency: false,
            })
            .result
            .unwrap();
        assert_eq!(again["status"], "already_indexed");

        let found = service
            .handle_line(r#"{"intent": "definition", "target": "shapes.Circle.area"}"#)
            .result
            .unwrap();
        assert_eq!(found[0]["name"], "area");

        let contains = service
            .handle(Request::Contains {
                target: "shapes.Circle".into(),
            })
            .result
            .unwrap();
        assert_eq!(contains[0]["node"]["qualified_name"], "shapes.Circle.area");

        let stats = service.handle(Request::Stats).result.unwrap();
        assert_eq!(stats["file_count"], 1);
    }

    #[test]
    fn second_repository_does_not_evict_the_first() {
        let (app, dep) = (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap());
        fs::write(app.path().join("app.py"), "from lib import load\n\ndef main():\n    load()\n").unwrap();
        fs::write(dep.path().join("lib.py"), "def load():\n    pass\n").unwrap();
        let service = service();

        for (dir, is_dependency) in [(&app, false), (&dep, true)] {
            let started = service
                .handle(Request::Index {
                    path: dir.path().to_string_lossy().into_owned(),
                    is_dependency,
                })
                .result
                .unwrap();
            assert_eq!(started["status"], "started");
            let job = wait_for_job(&service, started["job_id"].as_str().unwrap());
            assert_eq!(job["status"], "completed");
        }

        let repos = service.handle(Request::ListRepositories).result.unwrap();
        assert_eq!(repos.as_array().unwrap().len(), 2);
        let stats = service.handle(Request::Stats).result.unwrap();
        assert_eq!(stats["file_count"], 2);

        let main = service
            .handle(Request::Definition {
                target: "app.main".into(),
            })
            .result
            .unwrap();
        assert_eq!(main.as_array().unwrap().len(), 1);
        let callees = service
            .handle(Request::Callees {
                target: "app.main".into(),
            })
            .result
            .unwrap();
        assert!(callees.to_string().contains("lib.load"), "{callees}");
    }

    #[test]
    fn unknown_job_and_missing_scheduler_are_errors() {
        let service = service();
        let response = service.handle(Request::JobStatus {
            job_id: "nope".into(),
        });
        assert!(!response.ok);

        let response = service.handle(Request::ReindexPath {
            path: "a.py".into(),
        });
        assert!(!response.ok);
    }

    #[test]
    fn reindex_path_and_status_with_live_scheduler() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "def f():\n    pass\n").unwrap();
        let store: Arc<dyn GraphStore> = Arc::new(Storage::open_in_memory().unwrap());
        let indexer =
            Indexer::new(dir.path(), Arc::clone(&store), &IndexConfig::default()).unwrap();
        let scheduler = Arc::new(Scheduler::start(indexer, 1, Default::default()));
        let service = ContextService::new(store, CodegraphConfig::default())
            .with_scheduler(Arc::clone(&scheduler));

        let response = service.handle(Request::ReindexPath {
            path: dir.path().join("a.py").to_string_lossy().into_owned(),
        });
        assert!(response.ok, "{response:?}");
        assert_eq!(response.result.unwrap()["path"], "a.py");
        assert!(scheduler.wait_idle(Duration::from_secs(10)).unwrap());

        let status = service.handle(Request::Status).result.unwrap();
        assert_eq!(status["backend"], "sqlite");
        assert_eq!(status["connected"], true);
        assert_eq!(status["scheduler"]["processed"], 1);
        assert!(status["scheduler"]["failed"].as_array().unwrap().is_empty());
    }
}
