//! Persistent configuration for codegraph.
//!
//! Loads/saves a TOML config at `~/.codegraph/config.toml`. A handful of
//! environment variables override file values so deployments can be
//! configured without writing the file.

use crate::CodegraphError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Languages with a parser adapter.
pub const SUPPORTED_LANGUAGES: &[&str] = &["python", "rust"];

/// Top-level codegraph configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CodegraphConfig {
    pub storage: StorageConfig,
    pub index: IndexConfig,
    pub retry: RetryConfig,
    pub watch: WatchConfig,
}

impl CodegraphConfig {
    /// Load configuration from the given path.
    pub fn load(path: &Path) -> Result<Self, CodegraphError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CodegraphError::Config(e.to_string()))
    }

    /// Save configuration to the given path.
    pub fn save(&self, path: &Path) -> Result<(), CodegraphError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| CodegraphError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from the default path, or return defaults if the file doesn't exist.
    /// Environment overrides are applied either way.
    pub fn load_or_default() -> Result<Self, CodegraphError> {
        let path = Self::default_path();
        let mut config = if path.exists() {
            Self::load(&path)?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Default config path: `~/.codegraph/config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".codegraph")
            .join("config.toml")
    }

    /// Apply `CODEGRAPH_*` overrides from a variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), CodegraphError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db_path) = lookup("CODEGRAPH_DB_PATH").filter(|v| !v.is_empty()) {
            self.storage.db_path = db_path;
        }
        if let Some(workers) = lookup("CODEGRAPH_WORKERS") {
            self.index.workers = workers.trim().parse().map_err(|_| {
                CodegraphError::Config(format!("CODEGRAPH_WORKERS must be a number, got '{workers}'"))
            })?;
        }
        if let Some(languages) = lookup("CODEGRAPH_LANGUAGES") {
            self.index.languages = languages
                .split(',')
                .map(|l| l.trim().to_lowercase())
                .filter(|l| !l.is_empty())
                .collect();
        }
        Ok(())
    }

    /// Check for settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), CodegraphError> {
        if self.index.languages.is_empty() {
            return Err(CodegraphError::Config(
                "no language adapters enabled".to_string(),
            ));
        }
        for language in &self.index.languages {
            if !SUPPORTED_LANGUAGES.contains(&language.as_str()) {
                return Err(CodegraphError::Config(format!(
                    "unsupported language '{language}' (supported: {})",
                    SUPPORTED_LANGUAGES.join(", ")
                )));
            }
        }
        if self.index.workers == 0 {
            return Err(CodegraphError::Config(
                "index.workers must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(CodegraphError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.storage.db_path.is_empty() {
            return Err(CodegraphError::Config(
                "storage.db_path is not set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    pub db_path: String,
    /// SQLite cache size in MB.
    pub cache_size_mb: u32,
    /// SQLite busy timeout in seconds.
    pub busy_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".codegraph")
                .join("codegraph.db")
                .to_string_lossy()
                .into_owned(),
            cache_size_mb: 64,
            busy_timeout_secs: 5,
        }
    }
}

/// Indexing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Enabled language adapters.
    pub languages: Vec<String>,
    /// Worker threads used by the scheduler.
    pub workers: usize,
    /// Files larger than this are skipped.
    pub max_file_bytes: u64,
    /// Extra directory names to skip on top of `.gitignore`.
    pub ignore_dirs: Vec<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            languages: SUPPORTED_LANGUAGES.iter().map(|l| l.to_string()).collect(),
            workers: 4,
            max_file_bytes: 2 * 1024 * 1024,
            ignore_dirs: Vec::new(),
        }
    }
}

/// Retry policy for store failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per file before it is reported as failed.
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff_ms: 100,
            max_backoff_ms: 5_000,
        }
    }
}

impl RetryConfig {
    /// Exponential backoff before retry number `attempt` (1-based), capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let ms = self
            .base_backoff_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// File watcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub debounce_ms: u64,
    /// Interval between sweeps that re-attempt unresolved edges.
    pub relink_interval_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 50,
            relink_interval_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_roundtrips_through_toml() {
        let config = CodegraphConfig::default();
        let toml_str =
            toml::to_string_pretty(&config).expect("default config should serialize to TOML");
        let parsed: CodegraphConfig =
            toml::from_str(&toml_str).expect("serialized TOML should parse back");
        assert_eq!(parsed.index.workers, 4);
        assert_eq!(parsed.index.languages, vec!["python", "rust"]);
        assert_eq!(parsed.retry.max_attempts, 5);
    }

    #[test]
    fn load_nonexistent_returns_error() {
        let result = CodegraphConfig::load(Path::new("/tmp/nonexistent_codegraph_config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = CodegraphConfig::default();
        config.index.workers = 8;
        config.storage.cache_size_mb = 128;

        config.save(&path).expect("save should succeed");
        let loaded = CodegraphConfig::load(&path).expect("load should succeed");

        assert_eq!(loaded.index.workers, 8);
        assert_eq!(loaded.storage.cache_size_mb, 128);
    }

    #[test]
    fn partial_toml_uses_defaults_for_missing_fields() {
        let partial = r#"
[index]
workers = 2
"#;
        let config: CodegraphConfig = toml::from_str(partial).expect("partial TOML should parse");
        assert_eq!(config.index.workers, 2);
        assert_eq!(config.index.languages.len(), 2);
        assert_eq!(config.watch.debounce_ms, 50);
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let vars: HashMap<&str, &str> = [
            ("CODEGRAPH_DB_PATH", "/tmp/graph.db"),
            ("CODEGRAPH_WORKERS", "3"),
            ("CODEGRAPH_LANGUAGES", "Python"),
        ]
        .into_iter()
        .collect();
        let mut config = CodegraphConfig::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.storage.db_path, "/tmp/graph.db");
        assert_eq!(config.index.workers, 3);
        assert_eq!(config.index.languages, vec!["python"]);
    }

    #[test]
    fn non_numeric_worker_override_is_a_config_error() {
        let mut config = CodegraphConfig::default();
        let err = config
            .apply_overrides(|k| (k == "CODEGRAPH_WORKERS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, CodegraphError::Config(_)));
    }

    #[test]
    fn validate_rejects_empty_languages() {
        let mut config = CodegraphConfig::default();
        config.index.languages.clear();
        let err = config.validate().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn validate_rejects_unknown_language_and_zero_workers() {
        let mut config = CodegraphConfig::default();
        config.index.languages = vec!["cobol".to_string()];
        assert!(config.validate().is_err());

        let mut config = CodegraphConfig::default();
        config.index.workers = 0;
        assert!(config.validate().is_err());

        assert!(CodegraphConfig::default().validate().is_ok());
    }

    #[test]
    fn backoff_grows_and_caps() {
        let retry = RetryConfig {
            max_attempts: 10,
            base_backoff_ms: 100,
            max_backoff_ms: 1_000,
        };
        assert_eq!(retry.backoff(1), Duration::from_millis(100));
        assert_eq!(retry.backoff(2), Duration::from_millis(200));
        assert_eq!(retry.backoff(3), Duration::from_millis(400));
        assert_eq!(retry.backoff(8), Duration::from_millis(1_000));
    }

    #[test]
    fn default_path_ends_with_config_toml() {
        assert!(CodegraphConfig::default_path().ends_with("config.toml"));
    }
}
