//! `GraphStore` trait implementation for Storage.

use crate::transaction::SqliteTransaction;
use crate::{graph_persistence as gp, live, map_sqlite, Storage};
use codegraph_core::{
    CodegraphError, FileRecord, GraphQuery, GraphStats, GraphStore, GraphTransaction, QueryRow,
    Repository,
};
use rusqlite::params;
use std::collections::HashMap;

impl GraphStore for Storage {
    fn begin(&self) -> Result<Box<dyn GraphTransaction + '_>, CodegraphError> {
        Ok(Box::new(SqliteTransaction::begin(self.writer()?)?))
    }

    fn run_query(&self, query: &GraphQuery) -> Result<Vec<QueryRow>, CodegraphError> {
        let guard = self.reader()?;
        gp::run_query(live(&guard)?, query)
    }

    fn file_records(&self) -> Result<Vec<FileRecord>, CodegraphError> {
        let guard = self.reader()?;
        gp::all_file_records(live(&guard)?)
    }

    fn register_repository(&self, repo: &Repository) -> Result<(), CodegraphError> {
        let guard = self.writer()?;
        live(&guard)?
            .execute(
                "INSERT INTO repositories (path, name, is_dependency, indexed_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(path) DO UPDATE SET
                    name = excluded.name,
                    is_dependency = excluded.is_dependency,
                    indexed_at = excluded.indexed_at",
                params![
                    repo.path,
                    repo.name,
                    repo.is_dependency,
                    repo.indexed_at.timestamp()
                ],
            )
            .map_err(map_sqlite)?;
        Ok(())
    }

    fn list_repositories(&self) -> Result<Vec<Repository>, CodegraphError> {
        let guard = self.reader()?;
        let conn = live(&guard)?;
        let mut stmt = conn
            .prepare("SELECT path, name, is_dependency, indexed_at FROM repositories ORDER BY path")
            .map_err(map_sqlite)?;

        let repos = stmt
            .query_map([], |row| {
                Ok(Repository {
                    path: row.get(0)?,
                    name: row.get(1)?,
                    is_dependency: row.get(2)?,
                    indexed_at: chrono::DateTime::from_timestamp(row.get(3)?, 0)
                        .unwrap_or_default(),
                })
            })
            .map_err(map_sqlite)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sqlite)?;

        Ok(repos)
    }

    fn stats(&self) -> Result<GraphStats, CodegraphError> {
        let guard = self.reader()?;
        let conn = live(&guard)?;

        let count = |sql: &str| -> Result<usize, CodegraphError> {
            conn.query_row(sql, [], |row| row.get::<_, i64>(0))
                .map(|n| n as usize)
                .map_err(map_sqlite)
        };

        let group = |sql: &str| -> Result<HashMap<String, usize>, CodegraphError> {
            let mut stmt = conn.prepare(sql).map_err(map_sqlite)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
                })
                .map_err(map_sqlite)?
                .collect::<Result<HashMap<_, _>, _>>()
                .map_err(map_sqlite)?;
            Ok(rows)
        };

        Ok(GraphStats {
            node_count: count("SELECT COUNT(*) FROM nodes")?,
            edge_count: count("SELECT COUNT(*) FROM edges")?,
            unresolved_edge_count: count("SELECT COUNT(*) FROM edges WHERE dst IS NULL")?,
            file_count: count("SELECT COUNT(*) FROM file_records")?,
            node_kind_counts: group("SELECT kind, COUNT(*) FROM nodes GROUP BY kind")?,
            relationship_type_counts: group(
                "SELECT relationship, COUNT(*) FROM edges GROUP BY relationship",
            )?,
        })
    }

    fn backend_type(&self) -> &'static str {
        "sqlite"
    }

    fn is_connected(&self) -> bool {
        let Ok(guard) = self.reader() else {
            return false;
        };
        match guard.as_ref() {
            Some(conn) => conn
                .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .is_ok(),
            None => false,
        }
    }
}
