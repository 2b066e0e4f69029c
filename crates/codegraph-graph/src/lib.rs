//! codegraph-graph: Read-only query façade over the code graph.
//!
//! Translates context requests (definition, callers, callees, imports,
//! containment, search) into store queries and shapes the results. Only
//! edges with a destination are reported as relationships; results are
//! ordered by source file, then position.

mod import_graph;

pub use import_graph::ImportGraph;

use codegraph_core::{
    CodegraphError, Edge, GraphNode, GraphQuery, GraphStats, GraphStore, NodeKind,
    RelationshipType,
};
use serde::Serialize;
use std::collections::HashSet;

/// A related node together with the edge that relates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relation {
    pub node: GraphNode,
    pub edge: Edge,
}

/// Query façade over any [`GraphStore`].
pub struct QueryFacade<'a> {
    store: &'a dyn GraphStore,
}

impl<'a> QueryFacade<'a> {
    pub fn new(store: &'a dyn GraphStore) -> Self {
        Self { store }
    }

    /// Nodes matching a node id, a qualified name or, failing both, a simple name.
    pub fn definition(&self, target: &str) -> Result<Vec<GraphNode>, CodegraphError> {
        if looks_like_node_id(target) {
            if let Some(node) = self.store.get_node(target)? {
                return Ok(vec![node]);
            }
        }
        let mut nodes = self
            .store
            .query_nodes(&GraphQuery::NodesByQualifiedName(target.to_string()))?;
        if nodes.is_empty() {
            nodes = self
                .store
                .query_nodes(&GraphQuery::NodesByName(target.to_string()))?;
        }
        sort_nodes(&mut nodes);
        Ok(nodes)
    }

    /// Functions and methods calling `target`.
    pub fn callers_of(&self, target: &str) -> Result<Vec<Relation>, CodegraphError> {
        let mut relations = Vec::new();
        for node in self.definition(target)? {
            let edges = self.store.query_edges(&GraphQuery::EdgesTo {
                node_id: node.id.clone(),
                relationship: Some(RelationshipType::Calls),
            })?;
            for edge in edges {
                if let Some(caller) = self.store.get_node(&edge.src)? {
                    relations.push(Relation { node: caller, edge });
                }
            }
        }
        sort_relations(&mut relations);
        Ok(relations)
    }

    /// Nodes called by `target`. Unresolved calls are left out.
    pub fn callees_of(&self, target: &str) -> Result<Vec<Relation>, CodegraphError> {
        self.outgoing(target, RelationshipType::Calls)
    }

    /// Direct members of a module or class.
    pub fn contains(&self, target: &str) -> Result<Vec<Relation>, CodegraphError> {
        self.outgoing(target, RelationshipType::Contains)
    }

    /// Modules (and symbols) imported by `module`, directly and transitively.
    pub fn imports(&self, module: &str) -> Result<ImportGraph, CodegraphError> {
        let root = self
            .definition(module)?
            .into_iter()
            .find(|n| n.kind == NodeKind::Module)
            .ok_or_else(|| CodegraphError::NotFound(format!("Module {module}")))?;
        ImportGraph::build(self.store, root)
    }

    /// Case-insensitive substring search over names and qualified names.
    pub fn search(&self, pattern: &str, limit: usize) -> Result<Vec<GraphNode>, CodegraphError> {
        self.store.query_nodes(&GraphQuery::SearchNodes {
            pattern: pattern.to_string(),
            limit,
        })
    }

    pub fn stats(&self) -> Result<GraphStats, CodegraphError> {
        self.store.stats()
    }

    fn outgoing(
        &self,
        target: &str,
        relationship: RelationshipType,
    ) -> Result<Vec<Relation>, CodegraphError> {
        let mut relations = Vec::new();
        let mut seen = HashSet::new();
        for node in self.definition(target)? {
            let edges = self.store.query_edges(&GraphQuery::EdgesFrom {
                node_id: node.id.clone(),
                relationship: Some(relationship),
            })?;
            for edge in edges {
                let Some(dst) = edge.dst.as_deref() else {
                    continue;
                };
                if !seen.insert(edge.id.clone()) {
                    continue;
                }
                if let Some(callee) = self.store.get_node(dst)? {
                    relations.push(Relation { node: callee, edge });
                }
            }
        }
        sort_relations(&mut relations);
        Ok(relations)
    }
}

/// `kind:qualified_name` with a known kind prefix.
fn looks_like_node_id(target: &str) -> bool {
    target
        .split_once(':')
        .is_some_and(|(kind, rest)| !rest.starts_with(':') && kind.parse::<NodeKind>().is_ok())
}

fn position(node: &GraphNode) -> (&str, usize, usize, &str) {
    (
        node.file_path.as_str(),
        node.span.start_line,
        node.span.start_col,
        node.id.as_str(),
    )
}

pub(crate) fn sort_nodes(nodes: &mut [GraphNode]) {
    nodes.sort_by(|a, b| position(a).cmp(&position(b)));
}

fn sort_relations(relations: &mut [Relation]) {
    relations.sort_by(|a, b| {
        position(&a.node)
            .cmp(&position(&b.node))
            .then_with(|| a.edge.span.cmp(&b.edge.span))
    });
}

#[cfg(test)]
pub(crate) mod test_support {
    use codegraph_core::{Confidence, Edge, GraphNode, GraphStore, NodeKind, RelationshipType, Span};
    use codegraph_storage::Storage;

    pub fn node(kind: NodeKind, qn: &str, file: &str, line: usize) -> GraphNode {
        GraphNode {
            id: GraphNode::node_id(kind, qn),
            kind,
            name: qn.rsplit('.').next().unwrap_or(qn).to_string(),
            qualified_name: qn.to_string(),
            file_path: file.to_string(),
            language: "python".to_string(),
            span: Span::new(line, 0, line + 1, 0),
            signature: None,
        }
    }

    pub fn edge(
        rel: RelationshipType,
        src: &str,
        target: &str,
        dst: Option<&str>,
        file: &str,
    ) -> Edge {
        Edge {
            id: Edge::edge_id(rel, src, target, file),
            src: src.to_string(),
            dst: dst.map(str::to_string),
            relationship: rel,
            confidence: if dst.is_some() {
                Confidence::Resolved
            } else {
                Confidence::Unresolved
            },
            target_ref: target.to_string(),
            file_path: file.to_string(),
            span: Span::default(),
        }
    }

    pub fn store(nodes: &[GraphNode], edges: &[Edge]) -> Storage {
        let storage = Storage::open_in_memory().unwrap();
        let mut tx = storage.begin().unwrap();
        for n in nodes {
            tx.merge_node(n).unwrap();
        }
        for e in edges {
            tx.merge_edge(e).unwrap();
        }
        tx.commit().unwrap();
        storage
    }
}
