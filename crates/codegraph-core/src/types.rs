use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::CodegraphError;

// ── Node Kinds ──────────────────────────────────────────────────────────────

/// Node types in the code graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A source file's module (Python module, Rust module).
    Module,
    /// Class, struct, enum, trait.
    Class,
    /// Free function.
    Function,
    /// Function defined directly inside a class or impl block.
    Method,
    /// Module-level constant, static or upper-case assignment.
    Variable,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Module => write!(f, "module"),
            Self::Class => write!(f, "class"),
            Self::Function => write!(f, "function"),
            Self::Method => write!(f, "method"),
            Self::Variable => write!(f, "variable"),
        }
    }
}

impl std::str::FromStr for NodeKind {
    type Err = CodegraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "module" => Ok(Self::Module),
            "class" => Ok(Self::Class),
            "function" => Ok(Self::Function),
            "method" => Ok(Self::Method),
            "variable" => Ok(Self::Variable),
            _ => Err(CodegraphError::InvalidNodeKind(s.to_string())),
        }
    }
}

// ── Relationship Types ──────────────────────────────────────────────────────

/// Edge types in the code graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    Calls,
    Imports,
    Inherits,
    Contains,
    References,
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Calls => write!(f, "CALLS"),
            Self::Imports => write!(f, "IMPORTS"),
            Self::Inherits => write!(f, "INHERITS"),
            Self::Contains => write!(f, "CONTAINS"),
            Self::References => write!(f, "REFERENCES"),
        }
    }
}

impl std::str::FromStr for RelationshipType {
    type Err = CodegraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CALLS" => Ok(Self::Calls),
            "IMPORTS" => Ok(Self::Imports),
            "INHERITS" => Ok(Self::Inherits),
            "CONTAINS" => Ok(Self::Contains),
            "REFERENCES" => Ok(Self::References),
            _ => Err(CodegraphError::InvalidRelationshipType(s.to_string())),
        }
    }
}

impl RelationshipType {
    /// Whether a node of `kind` can be the destination of this relationship.
    pub fn accepts_target(&self, kind: NodeKind) -> bool {
        match self {
            Self::Imports | Self::Contains => true,
            Self::Calls => matches!(
                kind,
                NodeKind::Function | NodeKind::Method | NodeKind::Class
            ),
            Self::Inherits => kind == NodeKind::Class,
            Self::References => kind != NodeKind::Module,
        }
    }
}

// ── Edge Confidence ─────────────────────────────────────────────────────────

/// How an edge's destination was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Bound through local scope or an import.
    Resolved,
    /// Unique simple-name match with no binding in scope.
    Heuristic,
    /// No destination yet; the edge waits for `target_ref` to appear.
    Unresolved,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolved => write!(f, "resolved"),
            Self::Heuristic => write!(f, "heuristic"),
            Self::Unresolved => write!(f, "unresolved"),
        }
    }
}

impl std::str::FromStr for Confidence {
    type Err = CodegraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "resolved" => Ok(Self::Resolved),
            "heuristic" => Ok(Self::Heuristic),
            "unresolved" => Ok(Self::Unresolved),
            _ => Err(CodegraphError::InvalidConfidence(s.to_string())),
        }
    }
}

// ── Core Data Structures ────────────────────────────────────────────────────

/// A 0-based source range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start_line: usize,
    pub start_col: usize,
    pub end_line: usize,
    pub end_col: usize,
}

impl Span {
    pub fn new(start_line: usize, start_col: usize, end_line: usize, end_col: usize) -> Self {
        Self {
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }
}

/// A node in the code graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub kind: NodeKind,
    pub name: String,
    pub qualified_name: String,
    /// Declaring file, relative to the indexed root.
    pub file_path: String,
    pub language: String,
    pub span: Span,
    pub signature: Option<String>,
}

impl GraphNode {
    /// Stable node identity: kind plus qualified name.
    pub fn node_id(kind: NodeKind, qualified_name: &str) -> String {
        format!("{kind}:{qualified_name}")
    }
}

/// A graph edge. `dst` is `None` while the edge is unresolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub src: String,
    pub dst: Option<String>,
    pub relationship: RelationshipType,
    pub confidence: Confidence,
    /// Qualified (or bare) name the reference points at, as written after
    /// alias expansion. Kept so unresolved edges can be linked later.
    pub target_ref: String,
    /// Contributing file (provenance).
    pub file_path: String,
    pub span: Span,
}

impl Edge {
    /// Stable edge identity, independent of whether the target is resolved.
    pub fn edge_id(
        relationship: RelationshipType,
        src: &str,
        target_ref: &str,
        file_path: &str,
    ) -> String {
        format!("{relationship}:{src}->{target_ref}@{file_path}")
    }

    /// True if `id` has the shape produced by [`Edge::edge_id`].
    pub fn is_edge_id(id: &str) -> bool {
        id.split_once(':').is_some_and(|(prefix, _)| {
            prefix == prefix.to_uppercase() && prefix.parse::<RelationshipType>().is_ok()
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.dst.is_some()
    }

    /// Drop the destination and mark the edge as waiting for its target.
    pub fn unlink(&mut self) {
        self.dst = None;
        self.confidence = Confidence::Unresolved;
    }
}

/// Persisted indexing state for one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub language: String,
    /// SHA-256 hex digest of the file content.
    pub fingerprint: String,
    pub indexed_at: DateTime<Utc>,
    /// Node and edge ids this file contributed.
    pub contributions: BTreeSet<String>,
}

/// Per-file indexing state tracked by the change tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Unseen,
    Indexing,
    Indexed,
    Changed,
    Deleted,
    /// Still `Changed`, but retries are exhausted.
    Failed,
}

impl std::fmt::Display for FileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unseen => write!(f, "unseen"),
            Self::Indexing => write!(f, "indexing"),
            Self::Indexed => write!(f, "indexed"),
            Self::Changed => write!(f, "changed"),
            Self::Deleted => write!(f, "deleted"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A source tree registered for indexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub path: String,
    pub name: String,
    pub is_dependency: bool,
    pub indexed_at: DateTime<Utc>,
}
