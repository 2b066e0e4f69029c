//! `codegraph doctor`: configuration and store health checks.

use codegraph_core::{CodegraphConfig, GraphStore};
use codegraph_storage::Storage;
use colored::Colorize;
use std::path::{Path, PathBuf};

pub(crate) fn cmd_doctor(config_path: Option<&Path>, db: Option<&Path>) -> anyhow::Result<()> {
    println!("{}", "codegraph doctor".bold());
    println!();

    let mut all_ok = true;

    // 1. Configuration
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(CodegraphConfig::default_path);
    let config = match crate::load_config(config_path, db) {
        Ok(config) => {
            let detail = if path.exists() {
                path.display().to_string()
            } else {
                "using defaults (no config.toml)".to_string()
            };
            print_check("Configuration", true, &detail);
            config
        }
        Err(e) => {
            print_check("Configuration", false, &e.to_string());
            println!();
            println!("{}", "Fix the configuration first.".red().bold());
            return Ok(());
        }
    };

    // 2. Store settings
    if let Err(e) = Storage::validate_config(&config.storage) {
        print_check("Store settings", false, &e.to_string());
        all_ok = false;
    } else {
        print_check("Store settings", true, &config.storage.db_path);
    }

    // 3. Store connectivity
    let db_path = PathBuf::from(&config.storage.db_path);
    match Storage::open_with_config(&db_path, &config.storage) {
        Ok(storage) => {
            let connected = storage.is_connected();
            print_check(
                "Store connection",
                connected,
                &format!("backend {}", storage.backend_type()),
            );
            all_ok &= connected;

            match storage.stats() {
                Ok(stats) => print_check(
                    "Graph",
                    true,
                    &format!(
                        "{} files, {} nodes, {} edges ({} unresolved)",
                        stats.file_count,
                        stats.node_count,
                        stats.edge_count,
                        stats.unresolved_edge_count
                    ),
                ),
                Err(e) => {
                    print_check("Graph", false, &e.to_string());
                    all_ok = false;
                }
            }
            if let Err(e) = storage.close() {
                tracing::warn!("Failed to close store: {e}");
            }
        }
        Err(e) => {
            print_check("Store connection", false, &e.to_string());
            all_ok = false;
        }
    }

    // 4. Language adapters
    print_check("Languages", true, &config.index.languages.join(", "));

    println!();
    if all_ok {
        println!("{}", "All checks passed!".green().bold());
    } else {
        println!("{}", "Some checks failed. See above for details.".red().bold());
    }

    Ok(())
}

fn print_check(name: &str, ok: bool, detail: &str) {
    let status = if ok {
        "OK".green().bold().to_string()
    } else {
        "FAIL".red().bold().to_string()
    };
    if detail.is_empty() {
        println!("  [{status}] {name}");
    } else {
        println!("  [{status}] {name}: {detail}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doctor_on_fresh_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("graph.db");
        let config = dir.path().join("config.toml");
        std::fs::write(&config, "").unwrap();
        cmd_doctor(Some(&config), Some(&db)).unwrap();
        assert!(db.exists());
    }

    #[test]
    fn doctor_reports_bad_config_without_failing() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.toml");
        std::fs::write(&config, "[index]\nworkers = 0\n").unwrap();
        cmd_doctor(Some(&config), None).unwrap();
    }
}
