//! Incremental scheduler: a worker pool that indexes distinct files in
//! parallel and serializes work on the same file.
//!
//! Enqueueing only touches in-memory sets and an unbounded channel, so it
//! never waits on I/O, parsing or commits. A notification for a file that
//! is already in flight is coalesced into one re-run after it finishes.

use crate::indexer::{FileOutcome, Indexer};
use crate::tracker::FailedFile;
use codegraph_core::{CodegraphError, RetryConfig};
use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

/// Result of a full scan of the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    /// Supported files found by the walk.
    pub scanned: usize,
    /// Files queued (new, changed or unchanged; workers skip unchanged ones).
    pub queued: usize,
    /// Known files that are gone and were queued for deletion.
    pub deletions: usize,
}

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub queued: usize,
    pub in_flight: usize,
    pub processed: usize,
    /// Files still waiting to be (re-)indexed.
    pub pending: Vec<String>,
    pub failed: Vec<FailedFile>,
    /// Number of files per tracker state.
    pub states: BTreeMap<String, usize>,
}

#[derive(Debug, Default)]
struct QueueState {
    queued: HashSet<String>,
    in_flight: HashSet<String>,
    /// In-flight files notified again; re-queued when they finish.
    rerun: HashSet<String>,
}

impl QueueState {
    fn is_idle(&self) -> bool {
        self.queued.is_empty() && self.in_flight.is_empty() && self.rerun.is_empty()
    }
}

struct Shared {
    indexer: Indexer,
    retry: RetryConfig,
    queue: Mutex<QueueState>,
    idle: Condvar,
    sender: Mutex<Option<Sender<String>>>,
    shutdown: AtomicBool,
    processed: AtomicUsize,
}

impl Shared {
    fn queue(&self) -> Result<MutexGuard<'_, QueueState>, CodegraphError> {
        self.queue
            .lock()
            .map_err(|e| CodegraphError::LockPoisoned(format!("scheduler queue: {e}")))
    }

    fn send(&self, path: String) -> Result<(), CodegraphError> {
        let sender = self
            .sender
            .lock()
            .map_err(|e| CodegraphError::LockPoisoned(format!("scheduler sender: {e}")))?;
        match sender.as_ref() {
            Some(tx) => tx
                .send(path)
                .map_err(|e| CodegraphError::Internal(format!("scheduler channel closed: {e}"))),
            None => Err(CodegraphError::Internal("scheduler is shut down".into())),
        }
    }

    /// Index one file, retrying store failures with exponential backoff.
    fn process(&self, path: &str) {
        let max_attempts = self.retry.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            let error = match self.indexer.index_file(path) {
                Ok(outcome) => {
                    log_outcome(path, &outcome);
                    return;
                }
                Err(e) => e,
            };

            let retry = error.is_retryable()
                && attempt < max_attempts
                && !self.shutdown.load(Ordering::SeqCst);
            if let Ok(mut tracker) = self.indexer.tracker() {
                tracker.failed(path, error.to_string(), !retry);
            }
            if !retry {
                tracing::warn!("Failed to index {path}: {error}");
                return;
            }

            let delay = self.retry.backoff(attempt);
            tracing::debug!(
                "{path}: {error}; retrying in {:?} (attempt {attempt}/{max_attempts})",
                delay
            );
            std::thread::sleep(delay);
        }
    }

    /// Worker loop. Exits when the channel closes or shutdown is requested.
    fn run_worker(&self, receiver: Receiver<String>) {
        while let Ok(path) = receiver.recv() {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            match self.queue() {
                Ok(mut queue) => {
                    queue.queued.remove(&path);
                    queue.in_flight.insert(path.clone());
                }
                Err(e) => {
                    tracing::error!("{e}");
                    break;
                }
            }

            self.process(&path);
            self.processed.fetch_add(1, Ordering::SeqCst);

            let mut queue = match self.queue() {
                Ok(queue) => queue,
                Err(e) => {
                    tracing::error!("{e}");
                    break;
                }
            };
            queue.in_flight.remove(&path);
            if queue.rerun.remove(&path) && queue.queued.insert(path.clone()) {
                if let Err(e) = self.send(path) {
                    tracing::debug!("Dropping re-run: {e}");
                }
            }
            if queue.is_idle() {
                self.idle.notify_all();
            }
        }
    }
}

fn log_outcome(path: &str, outcome: &FileOutcome) {
    match outcome {
        FileOutcome::Indexed(result) => {
            tracing::debug!("Indexed {path} ({} writes)", result.writes())
        }
        FileOutcome::Deleted(result) => {
            tracing::debug!("Removed {path} ({} writes)", result.writes())
        }
        FileOutcome::Unchanged => tracing::trace!("Unchanged {path}"),
        FileOutcome::Skipped(reason) => tracing::debug!("Skipped {path}: {reason}"),
    }
}

/// Worker pool driving an [`Indexer`].
pub struct Scheduler {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    /// Start `workers` threads (at least one).
    pub fn start(indexer: Indexer, workers: usize, retry: RetryConfig) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded::<String>();
        let shared = Arc::new(Shared {
            indexer,
            retry,
            queue: Mutex::new(QueueState::default()),
            idle: Condvar::new(),
            sender: Mutex::new(Some(tx)),
            shutdown: AtomicBool::new(false),
            processed: AtomicUsize::new(0),
        });

        let handles = (0..workers.max(1))
            .map(|i| {
                let shared = Arc::clone(&shared);
                let rx = rx.clone();
                std::thread::Builder::new()
                    .name(format!("codegraph-worker-{i}"))
                    .spawn(move || shared.run_worker(rx))
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::error!("Failed to spawn worker: {e}");
                    None
                }
            })
            .collect();

        Self {
            shared,
            workers: Mutex::new(handles),
        }
    }

    pub fn indexer(&self) -> &Indexer {
        &self.shared.indexer
    }

    /// Queue a file (relative path). Returns `false` if it was coalesced
    /// with work already queued or in flight.
    pub fn enqueue(&self, relative: &str) -> Result<bool, CodegraphError> {
        let mut queue = self.shared.queue()?;
        if queue.in_flight.contains(relative) {
            queue.rerun.insert(relative.to_string());
            return Ok(false);
        }
        if !queue.queued.insert(relative.to_string()) {
            return Ok(false);
        }
        if let Err(e) = self.shared.send(relative.to_string()) {
            queue.queued.remove(relative);
            return Err(e);
        }
        Ok(true)
    }

    /// Queue a filesystem path reported by the watcher.
    pub fn enqueue_path(&self, path: &Path) -> Result<bool, CodegraphError> {
        match self.shared.indexer.relative_path(path) {
            Some(relative) if self.shared.indexer.filter().accepts(Path::new(&relative)) => {
                self.enqueue(&relative)
            }
            _ => Ok(false),
        }
    }

    /// Re-index a file even if its fingerprint is unchanged.
    pub fn reindex(&self, relative: &str) -> Result<bool, CodegraphError> {
        self.shared.indexer.tracker()?.invalidate(relative);
        self.enqueue(relative)
    }

    /// Walk the root, queue every supported file and queue deletions for
    /// recorded files that no longer exist.
    pub fn reconcile(&self) -> Result<ReconcileSummary, CodegraphError> {
        let files = self.shared.indexer.walk();
        let mut summary = ReconcileSummary {
            scanned: files.len(),
            ..ReconcileSummary::default()
        };

        let present: HashSet<&str> = files.iter().map(String::as_str).collect();
        for file in &files {
            if self.enqueue(file)? {
                summary.queued += 1;
            }
        }

        let known = self.shared.indexer.tracker()?.known_paths();
        for path in known.iter().filter(|p| !present.contains(p.as_str())) {
            if self.enqueue(path)? {
                summary.deletions += 1;
            }
        }

        tracing::info!(
            "Reconciled {}: {} files scanned, {} queued, {} deletions",
            self.shared.indexer.root().display(),
            summary.scanned,
            summary.queued,
            summary.deletions
        );
        Ok(summary)
    }

    /// Re-attempt every unresolved edge in the store.
    pub fn relink_unresolved(&self) -> Result<usize, CodegraphError> {
        self.shared.indexer.upsert().relink_unresolved()
    }

    /// Block until nothing is queued or in flight. Returns `false` on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> Result<bool, CodegraphError> {
        let queue = self.shared.queue()?;
        let (queue, _) = self
            .shared
            .idle
            .wait_timeout_while(queue, timeout, |q| !q.is_idle())
            .map_err(|e| CodegraphError::LockPoisoned(format!("scheduler queue: {e}")))?;
        Ok(queue.is_idle())
    }

    pub fn status(&self) -> Result<SchedulerStatus, CodegraphError> {
        let (queued, in_flight) = {
            let queue = self.shared.queue()?;
            (queue.queued.len() + queue.rerun.len(), queue.in_flight.len())
        };
        let tracker = self.shared.indexer.tracker()?;
        Ok(SchedulerStatus {
            queued,
            in_flight,
            processed: self.shared.processed.load(Ordering::SeqCst),
            pending: tracker.pending(),
            failed: tracker.failures(),
            states: tracker.counts(),
        })
    }

    /// Stop accepting work and join the workers. In-flight files finish
    /// (commit or roll back); queued files are left for the next start.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        if let Ok(mut sender) = self.shared.sender.lock() {
            sender.take();
        }
        let handles = match self.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(_) => return,
        };
        for handle in handles {
            if handle.join().is_err() {
                tracing::error!("Worker thread panicked");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
