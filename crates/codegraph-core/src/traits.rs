use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{CodegraphError, Edge, FileRecord, GraphNode, RelationshipType, Repository};

// ── Query Expressions ───────────────────────────────────────────────────────

/// A graph query expression understood by every store backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphQuery {
    NodeById(String),
    NodesByQualifiedName(String),
    NodesByName(String),
    NodesInFile(String),
    /// Case-insensitive substring match on name or qualified name.
    SearchNodes { pattern: String, limit: usize },
    EdgeById(String),
    EdgesFrom {
        node_id: String,
        relationship: Option<RelationshipType>,
    },
    EdgesTo {
        node_id: String,
        relationship: Option<RelationshipType>,
    },
    EdgesInFile(String),
    /// All edges without a destination.
    UnresolvedEdges,
    /// Unresolved edges waiting on an exact `target_ref`.
    UnresolvedEdgesFor(String),
    AllNodes,
}

/// One result row of a [`GraphQuery`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryRow {
    Node(GraphNode),
    Edge(Edge),
}

impl QueryRow {
    pub fn into_node(self) -> Option<GraphNode> {
        match self {
            Self::Node(node) => Some(node),
            Self::Edge(_) => None,
        }
    }

    pub fn into_edge(self) -> Option<Edge> {
        match self {
            Self::Edge(edge) => Some(edge),
            Self::Node(_) => None,
        }
    }
}

/// What a merge did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Created,
    Updated,
    /// The stored row already matched; nothing was written.
    Unchanged,
}

// ── Stats ───────────────────────────────────────────────────────────────────

/// Statistics about the stored graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub unresolved_edge_count: usize,
    pub file_count: usize,
    pub node_kind_counts: HashMap<String, usize>,
    pub relationship_type_counts: HashMap<String, usize>,
}

// ── Graph Store Contract ────────────────────────────────────────────────────

/// A unit of work against the graph store.
///
/// Nothing is visible to other readers until [`commit`](Self::commit)
/// succeeds. Dropping a transaction without committing rolls it back.
pub trait GraphTransaction {
    /// Create the node if absent, otherwise update it in place.
    fn merge_node(&mut self, node: &GraphNode) -> Result<MergeOutcome, CodegraphError>;

    /// Create the edge if absent, otherwise update it in place.
    fn merge_edge(&mut self, edge: &Edge) -> Result<MergeOutcome, CodegraphError>;

    /// Delete a node by ID. Returns true if a node was deleted.
    fn delete_node(&mut self, id: &str) -> Result<bool, CodegraphError>;

    /// Delete an edge by ID. Returns true if an edge was deleted.
    fn delete_edge(&mut self, id: &str) -> Result<bool, CodegraphError>;

    /// Run a query against the transaction's view of the graph.
    fn run_query(&mut self, query: &GraphQuery) -> Result<Vec<QueryRow>, CodegraphError>;

    /// Load a file record with its contribution set.
    fn file_record(&mut self, path: &str) -> Result<Option<FileRecord>, CodegraphError>;

    /// Files (other than `except`) whose contribution set contains `item_id`.
    fn other_claimants(
        &mut self,
        item_id: &str,
        except: &str,
    ) -> Result<Vec<String>, CodegraphError>;

    /// Insert or replace a file record and its contribution set.
    fn put_file_record(&mut self, record: &FileRecord) -> Result<(), CodegraphError>;

    /// Remove a file record and its contribution set.
    fn delete_file_record(&mut self, path: &str) -> Result<bool, CodegraphError>;

    /// Atomically publish every change made in this transaction.
    fn commit(self: Box<Self>) -> Result<(), CodegraphError>;

    /// Discard every change made in this transaction.
    fn rollback(self: Box<Self>) -> Result<(), CodegraphError>;
}

/// Pluggable graph store backend.
///
/// All mutation goes through [`GraphTransaction`]; the direct methods here
/// are read-only apart from repository registration.
pub trait GraphStore: Send + Sync {
    /// Open a new transaction.
    fn begin(&self) -> Result<Box<dyn GraphTransaction + '_>, CodegraphError>;

    /// Run a read-only query against committed state.
    fn run_query(&self, query: &GraphQuery) -> Result<Vec<QueryRow>, CodegraphError>;

    /// All persisted file records (used to seed the change tracker).
    fn file_records(&self) -> Result<Vec<FileRecord>, CodegraphError>;

    /// Register (or refresh) an indexed repository.
    fn register_repository(&self, repo: &Repository) -> Result<(), CodegraphError>;

    /// List registered repositories, ordered by path.
    fn list_repositories(&self) -> Result<Vec<Repository>, CodegraphError>;

    /// Get graph statistics.
    fn stats(&self) -> Result<GraphStats, CodegraphError>;

    /// Short backend identifier (e.g. "sqlite").
    fn backend_type(&self) -> &'static str;

    /// Probe the backend with a trivial query.
    fn is_connected(&self) -> bool;

    // ── Query Helpers ───────────────────────────────────────────────

    /// Get a node by ID.
    fn get_node(&self, id: &str) -> Result<Option<GraphNode>, CodegraphError> {
        Ok(self
            .run_query(&GraphQuery::NodeById(id.to_string()))?
            .into_iter()
            .find_map(QueryRow::into_node))
    }

    /// Get an edge by ID.
    fn get_edge(&self, id: &str) -> Result<Option<Edge>, CodegraphError> {
        Ok(self
            .run_query(&GraphQuery::EdgeById(id.to_string()))?
            .into_iter()
            .find_map(QueryRow::into_edge))
    }

    /// Run a query and keep only node rows.
    fn query_nodes(&self, query: &GraphQuery) -> Result<Vec<GraphNode>, CodegraphError> {
        Ok(self
            .run_query(query)?
            .into_iter()
            .filter_map(QueryRow::into_node)
            .collect())
    }

    /// Run a query and keep only edge rows.
    fn query_edges(&self, query: &GraphQuery) -> Result<Vec<Edge>, CodegraphError> {
        Ok(self
            .run_query(query)?
            .into_iter()
            .filter_map(QueryRow::into_edge)
            .collect())
    }
}

/// Node-only helper mirroring [`GraphStore::query_nodes`] inside a transaction.
pub fn tx_query_nodes(
    tx: &mut dyn GraphTransaction,
    query: &GraphQuery,
) -> Result<Vec<GraphNode>, CodegraphError> {
    Ok(tx
        .run_query(query)?
        .into_iter()
        .filter_map(QueryRow::into_node)
        .collect())
}

/// Edge-only helper mirroring [`GraphStore::query_edges`] inside a transaction.
pub fn tx_query_edges(
    tx: &mut dyn GraphTransaction,
    query: &GraphQuery,
) -> Result<Vec<Edge>, CodegraphError> {
    Ok(tx
        .run_query(query)?
        .into_iter()
        .filter_map(QueryRow::into_edge)
        .collect())
}
