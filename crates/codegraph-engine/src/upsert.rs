//! Graph upsert engine: applies one file's contribution as a transactional diff.
//!
//! The previous contribution set of a file is read from its record, stale
//! items are retracted (edges first, then nodes no other file claims), new
//! items are merged, waiting edges are linked, and the record is written
//! last. Everything happens inside one store transaction.

use codegraph_core::{
    tx_query_edges, tx_query_nodes, CodegraphError, Confidence, Edge, FileRecord, GraphNode,
    GraphQuery, GraphStore, GraphTransaction, MergeOutcome, NodeKind, RelationshipType,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// What one commit changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommitResult {
    pub nodes_added: usize,
    pub nodes_updated: usize,
    pub nodes_removed: usize,
    pub edges_added: usize,
    pub edges_updated: usize,
    pub edges_removed: usize,
    /// Waiting edges (from any file) that received a destination.
    pub edges_linked: usize,
    /// Edges (from any file) whose destination was removed.
    pub edges_unlinked: usize,
    /// Whether the file record itself was written or dropped.
    pub record_written: bool,
    /// Files that took over provenance of shared nodes this commit released.
    /// Their nodes still carry the released file's span and signature.
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub heirs: BTreeSet<String>,
}

impl CommitResult {
    /// Total number of store writes. Zero for a no-op apply.
    pub fn writes(&self) -> usize {
        self.nodes_added
            + self.nodes_updated
            + self.nodes_removed
            + self.edges_added
            + self.edges_updated
            + self.edges_removed
            + self.edges_linked
            + self.edges_unlinked
            + usize::from(self.record_written)
    }
}

/// Applies per-file contributions to a [`GraphStore`].
#[derive(Clone)]
pub struct GraphUpsertEngine {
    store: Arc<dyn GraphStore>,
}

impl GraphUpsertEngine {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Replace the contribution of `record.path` with `nodes` and `edges`.
    ///
    /// `record.contributions` is ignored; the new set is the ids of `nodes`
    /// and `edges`. On error the transaction is rolled back and the stored
    /// record keeps its previous set.
    pub fn apply(
        &self,
        record: &FileRecord,
        nodes: &[GraphNode],
        edges: &[Edge],
    ) -> Result<CommitResult, CodegraphError> {
        let mut tx = self.store.begin()?;
        let previous = tx.file_record(&record.path)?;
        let mut result = CommitResult::default();
        let contributions = diff(
            tx.as_mut(),
            &record.path,
            previous.as_ref(),
            nodes,
            edges,
            &mut result,
        )?;

        let changed = previous.as_ref().map_or(true, |p| {
            p.fingerprint != record.fingerprint
                || p.language != record.language
                || p.contributions != contributions
        });
        if changed {
            tx.put_file_record(&FileRecord {
                contributions,
                ..record.clone()
            })?;
            result.record_written = true;
        }

        tx.commit()?;
        tracing::debug!(
            "Applied {}: {} writes ({} linked, {} unlinked)",
            record.path,
            result.writes(),
            result.edges_linked,
            result.edges_unlinked
        );
        Ok(result)
    }

    /// Retract everything `path` contributed and drop its record.
    pub fn delete_file(&self, path: &str) -> Result<CommitResult, CodegraphError> {
        let mut tx = self.store.begin()?;
        let Some(previous) = tx.file_record(path)? else {
            tx.rollback()?;
            return Ok(CommitResult::default());
        };
        let mut result = CommitResult::default();
        diff(tx.as_mut(), path, Some(&previous), &[], &[], &mut result)?;
        result.record_written = tx.delete_file_record(path)?;
        tx.commit()?;
        tracing::debug!(
            "Deleted {}: {} nodes, {} edges removed",
            path,
            result.nodes_removed,
            result.edges_removed
        );
        Ok(result)
    }

    /// Re-attempt every unresolved edge in the store. Returns how many linked.
    pub fn relink_unresolved(&self) -> Result<usize, CodegraphError> {
        let mut tx = self.store.begin()?;
        let waiting = tx_query_edges(tx.as_mut(), &GraphQuery::UnresolvedEdges)?;
        let mut linked = 0;
        for mut edge in waiting {
            if let Some((dst, confidence)) = find_target(tx.as_mut(), &edge)? {
                edge.dst = Some(dst);
                edge.confidence = confidence;
                tx.merge_edge(&edge)?;
                linked += 1;
            }
        }
        tx.commit()?;
        if linked > 0 {
            tracing::info!("Relinked {linked} unresolved edges");
        }
        Ok(linked)
    }
}

/// Retract stale items and merge new ones. Returns the new contribution set.
fn diff(
    tx: &mut dyn GraphTransaction,
    path: &str,
    previous: Option<&FileRecord>,
    nodes: &[GraphNode],
    edges: &[Edge],
    result: &mut CommitResult,
) -> Result<BTreeSet<String>, CodegraphError> {
    let contributions: BTreeSet<String> = nodes
        .iter()
        .map(|n| n.id.clone())
        .chain(edges.iter().map(|e| e.id.clone()))
        .collect();

    if let Some(previous) = previous {
        let stale: Vec<&String> = previous.contributions.difference(&contributions).collect();
        retract(tx, path, &stale, result)?;
    }

    for node in nodes {
        match tx.merge_node(node)? {
            MergeOutcome::Created => {
                result.nodes_added += 1;
                result.edges_linked += link_waiting(tx, node)?;
            }
            MergeOutcome::Updated => result.nodes_updated += 1,
            MergeOutcome::Unchanged => {}
        }
    }

    for edge in edges {
        let edge = validate_edge(tx, edge.clone())?;
        match tx.merge_edge(&edge)? {
            MergeOutcome::Created => result.edges_added += 1,
            MergeOutcome::Updated => result.edges_updated += 1,
            MergeOutcome::Unchanged => {}
        }
    }

    Ok(contributions)
}

/// Remove stale edges, then stale nodes no other file still claims.
fn retract(
    tx: &mut dyn GraphTransaction,
    path: &str,
    stale: &[&String],
    result: &mut CommitResult,
) -> Result<(), CodegraphError> {
    let (stale_edges, stale_nodes): (Vec<&String>, Vec<&String>) =
        stale.iter().copied().partition(|id| Edge::is_edge_id(id));

    for id in stale_edges {
        if tx.delete_edge(id)? {
            result.edges_removed += 1;
        }
    }

    for id in stale_nodes {
        let claimants = tx.other_claimants(id, path)?;
        if let Some(heir) = claimants.first() {
            // Shared symbol: keep it, but move provenance off this file.
            if let Some(mut node) = get_node(tx, id)? {
                if node.file_path == path {
                    node.file_path = heir.clone();
                    tx.merge_node(&node)?;
                    result.nodes_updated += 1;
                    result.heirs.insert(heir.clone());
                }
            }
            continue;
        }

        let incoming = tx_query_edges(
            tx,
            &GraphQuery::EdgesTo {
                node_id: id.to_string(),
                relationship: None,
            },
        )?;
        for mut edge in incoming {
            edge.unlink();
            tx.merge_edge(&edge)?;
            result.edges_unlinked += 1;
        }
        if tx.delete_node(id)? {
            result.nodes_removed += 1;
        }
    }
    Ok(())
}

/// Link edges waiting on a newly created node. Returns how many linked.
fn link_waiting(tx: &mut dyn GraphTransaction, node: &GraphNode) -> Result<usize, CodegraphError> {
    let mut linked = 0;

    let waiting = tx_query_edges(
        tx,
        &GraphQuery::UnresolvedEdgesFor(node.qualified_name.clone()),
    )?;
    for mut edge in waiting {
        if !edge.relationship.accepts_target(node.kind) {
            continue;
        }
        edge.dst = Some(node.id.clone());
        edge.confidence = Confidence::Resolved;
        tx.merge_edge(&edge)?;
        linked += 1;
    }

    // Bare names link only while the simple name stays unique.
    if node.kind == NodeKind::Module || node.name == node.qualified_name {
        return Ok(linked);
    }
    let waiting = tx_query_edges(tx, &GraphQuery::UnresolvedEdgesFor(node.name.clone()))?;
    for mut edge in waiting {
        if edge.relationship == RelationshipType::Imports {
            continue;
        }
        if let Some(id) = unique_by_name(tx, &edge)? {
            if id == node.id {
                edge.dst = Some(id);
                edge.confidence = Confidence::Heuristic;
                tx.merge_edge(&edge)?;
                linked += 1;
            }
        }
    }
    Ok(linked)
}

/// Drop destinations that do not exist, then try to link what is left waiting.
fn validate_edge(tx: &mut dyn GraphTransaction, mut edge: Edge) -> Result<Edge, CodegraphError> {
    if let Some(dst) = edge.dst.clone() {
        if get_node(tx, &dst)?.is_none() {
            edge.unlink();
        }
    }
    if edge.dst.is_none() {
        if let Some((dst, confidence)) = find_target(tx, &edge)? {
            edge.dst = Some(dst);
            edge.confidence = confidence;
        }
    }
    Ok(edge)
}

/// Destination for a waiting edge, if the store now has one.
fn find_target(
    tx: &mut dyn GraphTransaction,
    edge: &Edge,
) -> Result<Option<(String, Confidence)>, CodegraphError> {
    let qualified = edge.target_ref.contains('.') || edge.target_ref.contains("::");
    if qualified || edge.relationship == RelationshipType::Imports {
        let best = tx_query_nodes(
            tx,
            &GraphQuery::NodesByQualifiedName(edge.target_ref.clone()),
        )?
        .into_iter()
        .filter(|n| edge.relationship.accepts_target(n.kind))
        .min_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.id.cmp(&b.id)));
        return Ok(best.map(|n| (n.id, Confidence::Resolved)));
    }
    Ok(unique_by_name(tx, edge)?.map(|id| (id, Confidence::Heuristic)))
}

/// The only node outside the edge's own file whose simple name matches.
fn unique_by_name(
    tx: &mut dyn GraphTransaction,
    edge: &Edge,
) -> Result<Option<String>, CodegraphError> {
    let mut candidates = tx_query_nodes(tx, &GraphQuery::NodesByName(edge.target_ref.clone()))?
        .into_iter()
        .filter(|n| n.kind != NodeKind::Module && n.file_path != edge.file_path)
        .filter(|n| edge.relationship.accepts_target(n.kind));
    match (candidates.next(), candidates.next()) {
        (Some(only), None) => Ok(Some(only.id)),
        _ => Ok(None),
    }
}

fn get_node(tx: &mut dyn GraphTransaction, id: &str) -> Result<Option<GraphNode>, CodegraphError> {
    Ok(tx_query_nodes(tx, &GraphQuery::NodeById(id.to_string()))?
        .into_iter()
        .next())
}
