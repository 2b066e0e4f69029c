//! Per-file indexing state and the fingerprint table.
//!
//! ```text
//! Unseen -> Indexing -> Indexed -> Changed -> Indexing -> Indexed ...
//!                                     \-> Failed (retries exhausted)
//! any -> Deleted
//! ```
//!
//! Fingerprints are only recorded after a confirmed commit, so a failed or
//! interrupted file is still seen as changed on the next pass.

use codegraph_core::{FileRecord, FileState};
use codegraph_index::ChangeDetector;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// A file that could not be indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
    pub path: String,
    pub error: String,
}

/// Tracks what the engine knows about every file under the root.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    detector: ChangeDetector,
    states: HashMap<String, FileState>,
    errors: HashMap<String, String>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed fingerprints and `Indexed` states from persisted records.
    pub fn from_records(records: &[FileRecord]) -> Self {
        let mut tracker = Self::new();
        tracker.detector.seed(
            records
                .iter()
                .map(|r| (r.path.clone(), r.fingerprint.clone())),
        );
        for record in records {
            tracker.states.insert(record.path.clone(), FileState::Indexed);
        }
        tracker
    }

    pub fn state(&self, path: &str) -> FileState {
        self.states.get(path).copied().unwrap_or(FileState::Unseen)
    }

    /// Whether a confirmed fingerprint exists for `path`.
    pub fn is_known(&self, path: &str) -> bool {
        self.detector.known(path).is_some()
    }

    /// Record a freshly computed fingerprint. Returns `true` if the file
    /// must be (re-)indexed.
    pub fn observe(&mut self, path: &str, fingerprint: &str) -> bool {
        let changed = self.detector.is_changed(path, fingerprint);
        let state = self.state(path);
        if changed {
            if state != FileState::Failed {
                self.states.insert(path.to_string(), FileState::Changed);
            }
        } else if matches!(state, FileState::Unseen | FileState::Deleted) {
            self.states.insert(path.to_string(), FileState::Indexed);
        }
        changed || matches!(state, FileState::Changed | FileState::Failed)
    }

    /// Force the next observation to re-index `path`.
    pub fn invalidate(&mut self, path: &str) {
        self.detector.remove(path);
        self.states.insert(path.to_string(), FileState::Changed);
    }

    pub fn begin(&mut self, path: &str) {
        self.states.insert(path.to_string(), FileState::Indexing);
    }

    /// The file's contribution committed with `fingerprint`.
    pub fn committed(&mut self, path: &str, fingerprint: &str) {
        self.detector.update(path, fingerprint);
        self.states.insert(path.to_string(), FileState::Indexed);
        self.errors.remove(path);
    }

    /// Indexing failed. The file stays `Changed`, or becomes `Failed` once
    /// retries are exhausted.
    pub fn failed(&mut self, path: &str, error: String, exhausted: bool) {
        let state = if exhausted {
            FileState::Failed
        } else {
            FileState::Changed
        };
        self.states.insert(path.to_string(), state);
        self.errors.insert(path.to_string(), error);
    }

    /// The file's deletion committed.
    pub fn deleted(&mut self, path: &str) {
        self.detector.remove(path);
        self.states.insert(path.to_string(), FileState::Deleted);
        self.errors.remove(path);
    }

    /// Paths with a confirmed fingerprint.
    pub fn known_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.detector.paths().map(str::to_string).collect();
        paths.sort();
        paths
    }

    /// Files waiting to be (re-)indexed.
    pub fn pending(&self) -> Vec<String> {
        self.paths_in(&[FileState::Changed, FileState::Indexing])
    }

    pub fn failures(&self) -> Vec<FailedFile> {
        self.paths_in(&[FileState::Failed])
            .into_iter()
            .map(|path| FailedFile {
                error: self.errors.get(&path).cloned().unwrap_or_default(),
                path,
            })
            .collect()
    }

    /// Number of files per state.
    pub fn counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for state in self.states.values() {
            *counts.entry(state.to_string()).or_insert(0) += 1;
        }
        counts
    }

    fn paths_in(&self, states: &[FileState]) -> Vec<String> {
        let mut paths: Vec<String> = self
            .states
            .iter()
            .filter(|(_, s)| states.contains(s))
            .map(|(p, _)| p.clone())
            .collect();
        paths.sort();
        paths
    }
}
