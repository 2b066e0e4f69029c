//! SHA-256 based change detection for incremental indexing.
//!
//! Tracks content fingerprints of previously indexed files so unchanged
//! files can be skipped. The table is seeded from persisted file records and
//! only updated after a confirmed commit.

use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Compute the SHA-256 hex fingerprint of file content.
pub fn fingerprint(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Tracks file content fingerprints for incremental change detection.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    /// Map of file_path -> SHA-256 hex fingerprint from the last confirmed index.
    known: HashMap<String, String>,
}

impl ChangeDetector {
    /// Create a new empty ChangeDetector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the table from `(path, fingerprint)` pairs, e.g. persisted file records.
    pub fn seed<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.known.extend(entries);
        tracing::debug!("Loaded {} known file fingerprints", self.known.len());
    }

    /// Returns `true` if the file is new or its fingerprint differs.
    pub fn is_changed(&self, path: &str, fingerprint: &str) -> bool {
        self.known.get(path).map(String::as_str) != Some(fingerprint)
    }

    /// Fingerprint recorded for a path.
    pub fn known(&self, path: &str) -> Option<&str> {
        self.known.get(path).map(String::as_str)
    }

    /// Record the fingerprint for a file after a confirmed commit.
    pub fn update(&mut self, path: &str, fingerprint: &str) {
        self.known.insert(path.to_string(), fingerprint.to_string());
    }

    /// Forget a file (e.g., after its deletion was committed).
    pub fn remove(&mut self, path: &str) -> bool {
        self.known.remove(path).is_some()
    }

    /// Paths with a recorded fingerprint.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.known.keys().map(String::as_str)
    }

    /// Get the number of tracked files.
    pub fn tracked_count(&self) -> usize {
        self.known.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_sha256_hex() {
        let fp = fingerprint(b"");
        assert_eq!(
            fp,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_ne!(fingerprint(b"a"), fingerprint(b"b"));
    }

    #[test]
    fn new_file_is_changed() {
        let detector = ChangeDetector::new();
        assert!(detector.is_changed("foo.rs", &fingerprint(b"fn main() {}")));
    }

    #[test]
    fn same_content_not_changed() {
        let mut detector = ChangeDetector::new();
        let fp = fingerprint(b"fn main() {}");
        detector.update("foo.rs", &fp);
        assert!(!detector.is_changed("foo.rs", &fp));
    }

    #[test]
    fn different_content_is_changed() {
        let mut detector = ChangeDetector::new();
        detector.update("foo.rs", &fingerprint(b"fn main() {}"));
        assert!(detector.is_changed("foo.rs", &fingerprint(b"fn main() { run(); }")));
    }

    #[test]
    fn remove_makes_changed() {
        let mut detector = ChangeDetector::new();
        let fp = fingerprint(b"content");
        detector.update("foo.rs", &fp);
        assert!(detector.remove("foo.rs"));
        assert!(detector.is_changed("foo.rs", &fp));
        assert!(!detector.remove("foo.rs"));
    }

    #[test]
    fn seed_and_tracked_count() {
        let mut detector = ChangeDetector::new();
        detector.seed([
            ("a.rs".to_string(), fingerprint(b"a")),
            ("b.py".to_string(), fingerprint(b"b")),
        ]);
        assert_eq!(detector.tracked_count(), 2);
        assert_eq!(detector.known("a.rs"), Some(fingerprint(b"a").as_str()));
        let mut paths: Vec<_> = detector.paths().collect();
        paths.sort();
        assert_eq!(paths, vec!["a.rs", "b.py"]);
    }
}
