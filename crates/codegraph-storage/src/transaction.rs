//! Write transactions on the SQLite store.

use crate::{graph_persistence as gp, live, map_sqlite};
use codegraph_core::{
    CodegraphError, Edge, FileRecord, GraphNode, GraphQuery, GraphTransaction, MergeOutcome,
    QueryRow,
};
use rusqlite::Connection;
use std::sync::MutexGuard;

/// An open `BEGIN IMMEDIATE` transaction.
///
/// Holds the writer lock for its whole lifetime. Dropping it without a
/// commit rolls back.
pub struct SqliteTransaction<'a> {
    guard: MutexGuard<'a, Option<Connection>>,
    finished: bool,
}

impl<'a> SqliteTransaction<'a> {
    pub(crate) fn begin(guard: MutexGuard<'a, Option<Connection>>) -> Result<Self, CodegraphError> {
        live(&guard)?
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(map_sqlite)?;
        Ok(Self {
            guard,
            finished: false,
        })
    }

    fn conn(&self) -> Result<&Connection, CodegraphError> {
        live(&self.guard)
    }

    fn finish(&mut self, statement: &str) -> Result<(), CodegraphError> {
        self.conn()?.execute_batch(statement).map_err(map_sqlite)?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Some(conn) = self.guard.as_ref() {
            if let Err(e) = conn.execute_batch("ROLLBACK") {
                tracing::warn!("Rollback of abandoned transaction failed: {e}");
            }
        }
    }
}

impl GraphTransaction for SqliteTransaction<'_> {
    fn merge_node(&mut self, node: &GraphNode) -> Result<MergeOutcome, CodegraphError> {
        gp::merge_node(self.conn()?, node)
    }

    fn merge_edge(&mut self, edge: &Edge) -> Result<MergeOutcome, CodegraphError> {
        gp::merge_edge(self.conn()?, edge)
    }

    fn delete_node(&mut self, id: &str) -> Result<bool, CodegraphError> {
        gp::delete_node(self.conn()?, id)
    }

    fn delete_edge(&mut self, id: &str) -> Result<bool, CodegraphError> {
        gp::delete_edge(self.conn()?, id)
    }

    fn run_query(&mut self, query: &GraphQuery) -> Result<Vec<QueryRow>, CodegraphError> {
        gp::run_query(self.conn()?, query)
    }

    fn file_record(&mut self, path: &str) -> Result<Option<FileRecord>, CodegraphError> {
        gp::get_file_record(self.conn()?, path)
    }

    fn other_claimants(
        &mut self,
        item_id: &str,
        except: &str,
    ) -> Result<Vec<String>, CodegraphError> {
        gp::other_claimants(self.conn()?, item_id, except)
    }

    fn put_file_record(&mut self, record: &FileRecord) -> Result<(), CodegraphError> {
        gp::put_file_record(self.conn()?, record)
    }

    fn delete_file_record(&mut self, path: &str) -> Result<bool, CodegraphError> {
        gp::delete_file_record(self.conn()?, path)
    }

    fn commit(mut self: Box<Self>) -> Result<(), CodegraphError> {
        self.finish("COMMIT")
    }

    fn rollback(mut self: Box<Self>) -> Result<(), CodegraphError> {
        self.finish("ROLLBACK")
    }
}
