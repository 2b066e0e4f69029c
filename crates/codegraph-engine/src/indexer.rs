//! Single-file indexing pipeline and source tree walk.
//!
//! read -> fingerprint -> parse -> resolve -> apply, with the change
//! tracker deciding whether a file needs work at all.

use crate::symbols::StoreSymbols;
use crate::tracker::ChangeTracker;
use crate::upsert::{CommitResult, GraphUpsertEngine};
use codegraph_core::{CodegraphError, FileRecord, GraphStore, IndexConfig};
use codegraph_index::{fingerprint, CodeParser, ParseOutcome, SymbolResolver};
use codegraph_watch::WatchFilter;
use ignore::WalkBuilder;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Indexed(CommitResult),
    /// Fingerprint matched the last commit.
    Unchanged,
    /// The file is gone; its contribution was retracted.
    Deleted(CommitResult),
    /// Not indexed (unsupported language, too large).
    Skipped(String),
}

/// Indexes files under one root into a graph store.
///
/// File records and node/edge provenance use store paths (`{root}/{relative}`)
/// so several roots can share one store. The tracker and the walk work with
/// paths relative to the root.
pub struct Indexer {
    root: PathBuf,
    /// `/`-separated root, without a trailing separator.
    scope: String,
    parser: CodeParser,
    upsert: GraphUpsertEngine,
    tracker: Mutex<ChangeTracker>,
    filter: WatchFilter,
    max_file_bytes: u64,
}

impl Indexer {
    /// Create an indexer whose tracker is seeded from the file records
    /// stored under `root`. Records of other roots are left alone.
    pub fn new(
        root: &Path,
        store: Arc<dyn GraphStore>,
        config: &IndexConfig,
    ) -> Result<Self, CodegraphError> {
        let parser = CodeParser::with_languages(&config.languages)?;
        let filter = WatchFilter::new(&parser.supported_extensions(), &config.ignore_dirs);
        let scope = store_scope(root);
        let prefix = format!("{scope}/");
        let own: Vec<FileRecord> = store
            .file_records()?
            .into_iter()
            .filter_map(|mut record| {
                record.path = record.path.strip_prefix(&prefix)?.to_string();
                Some(record)
            })
            .collect();
        tracing::debug!("{}: {} recorded files", root.display(), own.len());
        let tracker = ChangeTracker::from_records(&own);
        Ok(Self {
            root: root.to_path_buf(),
            scope,
            parser,
            upsert: GraphUpsertEngine::new(store),
            tracker: Mutex::new(tracker),
            filter,
            max_file_bytes: config.max_file_bytes,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn upsert(&self) -> &GraphUpsertEngine {
        &self.upsert
    }

    pub fn filter(&self) -> &WatchFilter {
        &self.filter
    }

    pub fn tracker(&self) -> Result<MutexGuard<'_, ChangeTracker>, CodegraphError> {
        self.tracker
            .lock()
            .map_err(|e| CodegraphError::LockPoisoned(format!("tracker: {e}")))
    }

    /// Store path of a root-relative path.
    pub fn store_path(&self, relative: &str) -> String {
        format!("{}/{}", self.scope, relative)
    }

    /// Root-relative path of a store path. `None` for other roots.
    pub fn relative_store_path<'p>(&self, store_path: &'p str) -> Option<&'p str> {
        store_path
            .strip_prefix(self.scope.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
    }

    /// `path` relative to the root, `/`-separated. `None` outside the root.
    pub fn relative_path(&self, path: &Path) -> Option<String> {
        let relative = if path.is_absolute() {
            path.strip_prefix(&self.root).ok()?
        } else {
            path
        };
        let parts: Vec<&str> = relative
            .components()
            .filter_map(|c| match c {
                std::path::Component::Normal(name) => name.to_str(),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("/"))
        }
    }

    /// Supported source files under the root, honouring `.gitignore`.
    pub fn walk(&self) -> Vec<String> {
        let walker = WalkBuilder::new(&self.root)
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .require_git(false)
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    tracing::warn!("Walk error: {}", err);
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            let Some(relative) = self.relative_path(entry.path()) else {
                continue;
            };
            if self.filter.accepts(Path::new(&relative)) {
                files.push(relative);
            }
        }
        files.sort();
        files
    }

    /// Bring the graph up to date for one file (relative path).
    ///
    /// On error the tracker is left in `Indexing`; the caller decides
    /// whether to retry or report the file as failed.
    pub fn index_file(&self, relative: &str) -> Result<FileOutcome, CodegraphError> {
        let Some(language) = self.parser.language_for(relative) else {
            return self.skip(relative, "unsupported language");
        };
        let language = language.to_string();

        let content = match std::fs::read(self.root.join(relative)) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return self.remove_file(relative)
            }
            Err(e) => return Err(e.into()),
        };
        if content.len() as u64 > self.max_file_bytes {
            tracing::warn!(
                "Skipping {relative}: {} bytes exceeds the {} byte limit",
                content.len(),
                self.max_file_bytes
            );
            return self.skip(relative, "file too large");
        }

        let fp = fingerprint(&content);
        {
            let mut tracker = self.tracker()?;
            if !tracker.observe(relative, &fp) {
                return Ok(FileOutcome::Unchanged);
            }
            tracker.begin(relative);
        }

        let store_path = self.store_path(relative);
        let parsed = match self.parser.parse(relative, &content) {
            ParseOutcome::Parsed(parsed) => parsed.with_file_path(store_path.clone()),
            ParseOutcome::Unsupported => return self.skip(relative, "unsupported language"),
            ParseOutcome::Failed(e) => return Err(e),
        };
        if let Some(error) = parsed.parse_error() {
            tracing::warn!(
                "{relative}:{}:{}: {} (indexing well-formed parts)",
                error.span.start_line + 1,
                error.span.start_col + 1,
                error.name
            );
        }

        let store = self.upsert.store().clone();
        let symbols = StoreSymbols::new(store.as_ref());
        let resolution = SymbolResolver::new(&symbols).resolve(&parsed)?;
        for ambiguity in resolution.ambiguities() {
            tracing::debug!("{relative}: {ambiguity}, left unresolved");
        }

        let record = FileRecord {
            path: store_path,
            language,
            fingerprint: fp.clone(),
            indexed_at: chrono::Utc::now(),
            contributions: BTreeSet::new(),
        };
        let result = self
            .upsert
            .apply(&record, &resolution.nodes, &resolution.edges)?;
        self.tracker()?.committed(relative, &fp);
        self.refresh_heirs(&result)?;
        Ok(FileOutcome::Indexed(result))
    }

    /// Retract a file that no longer exists.
    pub fn remove_file(&self, relative: &str) -> Result<FileOutcome, CodegraphError> {
        let result = self.upsert.delete_file(&self.store_path(relative))?;
        self.tracker()?.deleted(relative);
        self.refresh_heirs(&result)?;
        Ok(FileOutcome::Deleted(result))
    }

    /// Report a file that cannot be indexed, retracting any earlier contribution.
    fn skip(&self, relative: &str, reason: &str) -> Result<FileOutcome, CodegraphError> {
        let result = self.upsert.delete_file(&self.store_path(relative))?;
        if result.record_written {
            tracing::info!(
                "Retracted {relative} ({reason}): {} nodes, {} edges removed",
                result.nodes_removed,
                result.edges_removed
            );
            self.tracker()?.deleted(relative);
            self.refresh_heirs(&result)?;
        }
        Ok(FileOutcome::Skipped(reason.into()))
    }

    /// Re-apply files that inherited shared nodes, so the survivors carry
    /// the heir's own span and signature.
    fn refresh_heirs(&self, result: &CommitResult) -> Result<(), CodegraphError> {
        for heir in &result.heirs {
            let Some(relative) = self.relative_store_path(heir) else {
                tracing::debug!("Heir {heir} belongs to another root; keeping its provenance only");
                continue;
            };
            self.tracker()?.invalidate(relative);
            if let Err(e) = self.index_file(relative) {
                tracing::warn!("Failed to refresh {relative}: {e}");
                self.tracker()?.failed(relative, e.to_string(), false);
            }
        }
        Ok(())
    }
}

/// `/`-separated form of `root`, canonical when the root exists.
fn store_scope(root: &Path) -> String {
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let scope = root.to_string_lossy().replace('\\', "/");
    scope.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegraph_core::{FileState, GraphStore};
    use codegraph_storage::Storage;
    use std::fs;

    fn setup() -> (tempfile::TempDir, Arc<Storage>, Indexer) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let indexer = Indexer::new(dir.path(), storage.clone(), &IndexConfig::default()).unwrap();
        (dir, storage, indexer)
    }

    #[test]
    fn walk_respects_gitignore_and_ignore_dirs() {
        let (dir, _storage, indexer) = setup();
        fs::create_dir_all(dir.path().join("pkg")).unwrap();
        fs::create_dir_all(dir.path().join("target")).unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".gitignore"), "skip.py\n").unwrap();
        fs::write(dir.path().join("pkg/m.py"), "def f(): pass\n").unwrap();
        fs::write(dir.path().join("skip.py"), "x = 1\n").unwrap();
        fs::write(dir.path().join("target/gen.rs"), "fn g() {}\n").unwrap();
        fs::write(dir.path().join("README.md"), "# readme\n").unwrap();
        fs::write(dir.path().join("lib.rs"), "fn h() {}\n").unwrap();

        assert_eq!(indexer.walk(), vec!["lib.rs", "pkg/m.py"]);
    }

    #[test]
    fn index_then_skip_unchanged_then_delete() {
        let (dir, storage, indexer) = setup();
        fs::write(dir.path().join("m.py"), "def f():\n    pass\n").unwrap();

        match indexer.index_file("m.py").unwrap() {
            FileOutcome::Indexed(result) => assert_eq!(result.nodes_added, 2),
            other => panic!("expected Indexed, got {other:?}"),
        }
        assert_eq!(indexer.tracker().unwrap().state("m.py"), FileState::Indexed);
        assert_eq!(indexer.index_file("m.py").unwrap(), FileOutcome::Unchanged);

        fs::remove_file(dir.path().join("m.py")).unwrap();
        assert!(matches!(
            indexer.index_file("m.py").unwrap(),
            FileOutcome::Deleted(_)
        ));
        assert_eq!(storage.stats().unwrap().node_count, 0);
        assert_eq!(indexer.tracker().unwrap().state("m.py"), FileState::Deleted);
    }

    #[test]
    fn invalid_utf8_fails_without_touching_the_store() {
        let (dir, storage, indexer) = setup();
        fs::write(dir.path().join("bad.py"), [0x64, 0x65, 0x66, 0xff]).unwrap();
        let err = indexer.index_file("bad.py").unwrap_err();
        assert!(matches!(err, CodegraphError::Parse(_)));
        assert_eq!(storage.stats().unwrap().file_count, 0);
    }

    #[test]
    fn oversized_and_unsupported_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let config = IndexConfig {
            max_file_bytes: 8,
            ..IndexConfig::default()
        };
        let indexer = Indexer::new(dir.path(), storage, &config).unwrap();
        fs::write(dir.path().join("big.py"), "def long_name(): pass\n").unwrap();
        assert!(matches!(
            indexer.index_file("big.py").unwrap(),
            FileOutcome::Skipped(_)
        ));
        assert!(matches!(
            indexer.index_file("notes.txt").unwrap(),
            FileOutcome::Skipped(_)
        ));
    }

    #[test]
    fn files_that_become_skippable_are_retracted() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let config = IndexConfig {
            max_file_bytes: 64,
            ..IndexConfig::default()
        };
        let indexer = Indexer::new(dir.path(), storage.clone(), &config).unwrap();
        fs::write(dir.path().join("m.py"), "def f():\n    pass\n").unwrap();
        fs::write(dir.path().join("lib.rs"), "fn g() {}\n").unwrap();
        assert!(matches!(
            indexer.index_file("m.py").unwrap(),
            FileOutcome::Indexed(_)
        ));
        assert!(matches!(
            indexer.index_file("lib.rs").unwrap(),
            FileOutcome::Indexed(_)
        ));

        // Grown past the size limit.
        fs::write(dir.path().join("m.py"), format!("def f():\n    pass\n{}", "#".repeat(80))).unwrap();
        assert_eq!(
            indexer.index_file("m.py").unwrap(),
            FileOutcome::Skipped("file too large".into())
        );
        assert!(storage.get_node("function:m.f").unwrap().is_none());
        assert!(storage.get_node("module:m").unwrap().is_none());
        assert_eq!(indexer.tracker().unwrap().state("m.py"), FileState::Deleted);

        // Language no longer enabled.
        let python_only = IndexConfig {
            languages: vec!["python".into()],
            ..config
        };
        let indexer = Indexer::new(dir.path(), storage.clone(), &python_only).unwrap();
        assert!(indexer.tracker().unwrap().is_known("lib.rs"));
        assert_eq!(
            indexer.index_file("lib.rs").unwrap(),
            FileOutcome::Skipped("unsupported language".into())
        );
        let stats = storage.stats().unwrap();
        assert_eq!(stats.node_count, 0);
        assert_eq!(stats.file_count, 0);
        assert!(!indexer.tracker().unwrap().is_known("lib.rs"));
    }

    #[test]
    fn roots_sharing_a_store_keep_separate_records() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        fs::write(first.path().join("app.py"), "def run():\n    pass\n").unwrap();
        fs::write(second.path().join("app.py"), "def serve():\n    pass\n").unwrap();

        let a = Indexer::new(first.path(), storage.clone(), &IndexConfig::default()).unwrap();
        a.index_file("app.py").unwrap();
        let b = Indexer::new(second.path(), storage.clone(), &IndexConfig::default()).unwrap();
        assert!(b.tracker().unwrap().known_paths().is_empty());
        b.index_file("app.py").unwrap();

        let mut paths: Vec<String> = storage
            .file_records()
            .unwrap()
            .into_iter()
            .map(|r| r.path)
            .collect();
        paths.sort();
        let mut expected = vec![a.store_path("app.py"), b.store_path("app.py")];
        expected.sort();
        assert_eq!(paths, expected);
        assert_ne!(expected[0], expected[1]);
        assert_eq!(a.relative_store_path(&a.store_path("app.py")), Some("app.py"));
        assert_eq!(b.relative_store_path(&a.store_path("app.py")), None);

        // Same module name in both roots: the module node is shared.
        let run = storage.get_node("function:app.run").unwrap().unwrap();
        assert_eq!(run.file_path, a.store_path("app.py"));
        assert!(storage.get_node("function:app.serve").unwrap().is_some());

        // A fresh indexer for the first root only sees its own file.
        let again = Indexer::new(first.path(), storage.clone(), &IndexConfig::default()).unwrap();
        assert_eq!(again.tracker().unwrap().known_paths(), vec!["app.py"]);
        assert_eq!(again.index_file("app.py").unwrap(), FileOutcome::Unchanged);
    }

    #[test]
    fn relative_paths() {
        let (dir, _storage, indexer) = setup();
        assert_eq!(
            indexer.relative_path(&dir.path().join("pkg").join("m.py")),
            Some("pkg/m.py".to_string())
        );
        assert_eq!(indexer.relative_path(Path::new("/elsewhere/x.py")), None);
        assert_eq!(indexer.relative_path(dir.path()), None);
    }
}
