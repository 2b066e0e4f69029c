//! Module-level import graph built from IMPORTS edges.

use crate::sort_nodes;
use codegraph_core::{CodegraphError, GraphNode, GraphQuery, GraphStore, NodeKind, RelationshipType};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

/// Imports of one module: its direct targets and every module reachable
/// through import chains.
#[derive(Debug, Clone, Serialize)]
pub struct ImportGraph {
    pub module: GraphNode,
    /// Imported nodes as written (modules, classes, functions).
    pub direct: Vec<GraphNode>,
    /// Modules reachable through one or more imports, excluding `module`.
    pub transitive: Vec<GraphNode>,
}

impl ImportGraph {
    /// Walk resolved IMPORTS edges outward from `root`.
    ///
    /// Imported symbols are projected onto the module declaring them so the
    /// transitive closure is a module graph.
    pub(crate) fn build(store: &dyn GraphStore, root: GraphNode) -> Result<Self, CodegraphError> {
        let mut graph: DiGraph<String, ()> = DiGraph::new();
        let mut index: HashMap<String, NodeIndex> = HashMap::new();
        let mut modules: HashMap<String, GraphNode> = HashMap::new();
        let mut queue = VecDeque::new();

        let root_idx = graph.add_node(root.id.clone());
        index.insert(root.id.clone(), root_idx);
        modules.insert(root.id.clone(), root.clone());
        queue.push_back(root.clone());

        let mut direct = Vec::new();
        while let Some(module) = queue.pop_front() {
            let from = index[&module.id];
            for target in imported_nodes(store, &module.id)? {
                if module.id == root.id {
                    direct.push(target.clone());
                }
                let Some(target_module) = declaring_module(store, target)? else {
                    continue;
                };
                let to = match index.get(&target_module.id) {
                    Some(idx) => *idx,
                    None => {
                        let idx = graph.add_node(target_module.id.clone());
                        index.insert(target_module.id.clone(), idx);
                        modules.insert(target_module.id.clone(), target_module.clone());
                        queue.push_back(target_module);
                        idx
                    }
                };
                graph.update_edge(from, to, ());
            }
        }

        let mut transitive = Vec::new();
        let mut bfs = Bfs::new(&graph, root_idx);
        while let Some(idx) = bfs.next(&graph) {
            if idx == root_idx {
                continue;
            }
            if let Some(node) = graph.node_weight(idx).and_then(|id| modules.get(id)) {
                transitive.push(node.clone());
            }
        }

        sort_nodes(&mut direct);
        direct.dedup_by(|a, b| a.id == b.id);
        sort_nodes(&mut transitive);
        tracing::debug!(
            "Import graph of {}: {} direct, {} transitive",
            root.qualified_name,
            direct.len(),
            transitive.len()
        );
        Ok(Self {
            module: root,
            direct,
            transitive,
        })
    }
}

fn imported_nodes(store: &dyn GraphStore, module_id: &str) -> Result<Vec<GraphNode>, CodegraphError> {
    let edges = store.query_edges(&GraphQuery::EdgesFrom {
        node_id: module_id.to_string(),
        relationship: Some(RelationshipType::Imports),
    })?;
    let mut nodes = Vec::new();
    for edge in edges {
        if let Some(dst) = edge.dst.as_deref() {
            if let Some(node) = store.get_node(dst)? {
                nodes.push(node);
            }
        }
    }
    Ok(nodes)
}

/// The module node of the file declaring `node` (the node itself for modules).
fn declaring_module(
    store: &dyn GraphStore,
    node: GraphNode,
) -> Result<Option<GraphNode>, CodegraphError> {
    if node.kind == NodeKind::Module {
        return Ok(Some(node));
    }
    Ok(store
        .query_nodes(&GraphQuery::NodesInFile(node.file_path.clone()))?
        .into_iter()
        .find(|n| n.kind == NodeKind::Module))
}
