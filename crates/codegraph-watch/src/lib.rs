//! codegraph-watch: Debounced file watcher feeding the incremental scheduler.
//!
//! Uses `notify` with debouncing to detect file changes. Skips common build
//! and dependency directories and files whose extension no adapter handles.

use codegraph_core::{CodegraphError, WatchConfig};
use crossbeam_channel::Receiver;
use notify_debouncer_mini::{new_debouncer, DebouncedEvent};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

/// A debounced change to one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// Default ignore directory names.
pub const IGNORE_DIRS: &[&str] = &[
    "target",
    ".git",
    "__pycache__",
    ".venv",
    "venv",
    ".mypy_cache",
    ".pytest_cache",
    ".tox",
    "dist",
    "build",
    "node_modules",
    ".cargo",
];

/// Which paths the watcher reports.
#[derive(Debug, Clone)]
pub struct WatchFilter {
    extensions: Vec<String>,
    ignore_dirs: Vec<String>,
}

impl WatchFilter {
    /// Watch files with the given extensions, skipping [`IGNORE_DIRS`] plus `extra_ignore`.
    pub fn new(extensions: &[&str], extra_ignore: &[String]) -> Self {
        Self {
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
            ignore_dirs: IGNORE_DIRS
                .iter()
                .map(|d| d.to_string())
                .chain(extra_ignore.iter().cloned())
                .collect(),
        }
    }

    /// Check if a file extension is watchable.
    pub fn is_watchable(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e == ext))
    }

    /// Check if a path is inside an ignored directory.
    pub fn should_ignore(&self, path: &Path) -> bool {
        path.components().any(|component| match component {
            std::path::Component::Normal(name) => name
                .to_str()
                .is_some_and(|n| self.ignore_dirs.iter().any(|d| d == n)),
            _ => false,
        })
    }

    pub fn accepts(&self, path: &Path) -> bool {
        self.is_watchable(path) && !self.should_ignore(path)
    }
}

/// Classify a debounced path given whether it exists now and which paths are known.
pub fn classify(path: &Path, exists: bool, known: &mut HashSet<PathBuf>) -> ChangeKind {
    if !exists {
        known.remove(path);
        ChangeKind::Deleted
    } else if known.insert(path.to_path_buf()) {
        ChangeKind::Created
    } else {
        ChangeKind::Modified
    }
}

/// File watcher that monitors a directory tree with debouncing.
pub struct FileWatcher {
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
    receiver: Receiver<ChangeEvent>,
}

impl FileWatcher {
    /// Watch `root` recursively.
    ///
    /// `known` seeds the set of files already indexed, so their first change
    /// is reported as `Modified` rather than `Created`.
    pub fn new(
        root: &Path,
        config: &WatchConfig,
        filter: WatchFilter,
        known: impl IntoIterator<Item = PathBuf>,
    ) -> Result<Self, CodegraphError> {
        let (tx, rx) = crossbeam_channel::unbounded::<ChangeEvent>();
        let mut known: HashSet<PathBuf> = known.into_iter().collect();

        let mut debouncer = new_debouncer(
            Duration::from_millis(config.debounce_ms),
            move |res: Result<Vec<DebouncedEvent>, notify::Error>| match res {
                Ok(events) => {
                    let mut seen = HashSet::new();
                    for event in events {
                        let path = event.path;
                        if !seen.insert(path.clone()) || !filter.accepts(&path) {
                            continue;
                        }
                        let kind = classify(&path, path.is_file(), &mut known);
                        let _ = tx.send(ChangeEvent { path, kind });
                    }
                }
                Err(e) => {
                    tracing::error!("Watch error: {e}");
                }
            },
        )
        .map_err(|e| {
            CodegraphError::Io(std::io::Error::other(format!(
                "Failed to create debouncer: {e}"
            )))
        })?;

        debouncer
            .watcher()
            .watch(root, notify::RecursiveMode::Recursive)
            .map_err(|e| {
                CodegraphError::Io(std::io::Error::other(format!(
                    "Failed to watch {}: {e}",
                    root.display()
                )))
            })?;

        tracing::info!("Watching {} for changes", root.display());

        Ok(Self {
            _debouncer: debouncer,
            receiver: rx,
        })
    }

    /// Get the receiver for change events.
    pub fn receiver(&self) -> &Receiver<ChangeEvent> {
        &self.receiver
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> WatchFilter {
        WatchFilter::new(&["py", "pyi", "rs"], &["generated".to_string()])
    }

    #[test]
    fn watchable_extensions() {
        let filter = filter();
        assert!(filter.is_watchable(Path::new("src/main.rs")));
        assert!(filter.is_watchable(Path::new("pkg/m.pyi")));
        assert!(!filter.is_watchable(Path::new("index.ts")));
        assert!(!filter.is_watchable(Path::new("Makefile")));
    }

    #[test]
    fn ignored_directories() {
        let filter = filter();
        assert!(filter.should_ignore(Path::new("project/target/debug/build.rs")));
        assert!(filter.should_ignore(Path::new(".git/config")));
        assert!(filter.should_ignore(Path::new("pkg/__pycache__/m.py")));
        assert!(filter.should_ignore(Path::new("src/generated/api.rs")));
        assert!(!filter.should_ignore(Path::new("src/main.rs")));
        assert!(!filter.accepts(Path::new("venv/lib/site.py")));
        assert!(filter.accepts(Path::new("app/views.py")));
    }

    #[test]
    fn classify_tracks_known_paths() {
        let mut known = HashSet::from([PathBuf::from("a.py")]);
        assert_eq!(classify(Path::new("a.py"), true, &mut known), ChangeKind::Modified);
        assert_eq!(classify(Path::new("b.py"), true, &mut known), ChangeKind::Created);
        assert_eq!(classify(Path::new("b.py"), true, &mut known), ChangeKind::Modified);
        assert_eq!(classify(Path::new("a.py"), false, &mut known), ChangeKind::Deleted);
        assert_eq!(classify(Path::new("a.py"), true, &mut known), ChangeKind::Created);
    }

    #[test]
    fn watcher_reports_created_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let config = WatchConfig {
            debounce_ms: 20,
            ..WatchConfig::default()
        };
        let watcher = FileWatcher::new(&root, &config, filter(), Vec::new()).unwrap();

        std::fs::write(root.join("m.py"), "def f():\n    pass\n").unwrap();
        std::fs::write(root.join("notes.txt"), "ignored").unwrap();

        let event = watcher
            .receiver()
            .recv_timeout(Duration::from_secs(5))
            .expect("a change event");
        assert_eq!(event.path.file_name().unwrap(), "m.py");
        assert_eq!(event.kind, ChangeKind::Created);
    }
}
