//! Facts: the per-file structural observations produced by a language adapter.

use codegraph_core::{NodeKind, Span};
use serde::{Deserialize, Serialize};

/// What a [`Fact`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactKind {
    /// A named definition. `name` is the simple name.
    Definition(NodeKind),
    /// A call site. `name` is the callee as written, e.g. `foo`, `os.path.join`,
    /// `self.run`, `Vec::new`, or `_.len` for a call on an unknown receiver.
    Call,
    /// An import binding. `name` is the local binding (`*` for a glob import),
    /// `target` the imported path as written (relative prefixes kept).
    Import,
    /// A base class or implemented trait. `scope` ends with the subclass.
    Inherits,
    /// A non-call use of a name, such as a decorator.
    Reference,
    /// The first syntax error in an otherwise usable tree.
    ParseError,
}

/// A structural fact with its position in the source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    pub kind: FactKind,
    pub name: String,
    /// Enclosing definition names, outermost first. Empty at module level.
    pub scope: Vec<String>,
    pub span: Span,
    pub target: Option<String>,
    pub signature: Option<String>,
}

impl Fact {
    pub fn definition(
        kind: NodeKind,
        name: impl Into<String>,
        scope: &[String],
        span: Span,
    ) -> Self {
        Self {
            kind: FactKind::Definition(kind),
            name: name.into(),
            scope: scope.to_vec(),
            span,
            target: None,
            signature: None,
        }
    }

    pub fn call(name: impl Into<String>, scope: &[String], span: Span) -> Self {
        Self {
            kind: FactKind::Call,
            name: name.into(),
            scope: scope.to_vec(),
            span,
            target: None,
            signature: None,
        }
    }

    pub fn import(
        binding: impl Into<String>,
        target: impl Into<String>,
        scope: &[String],
        span: Span,
    ) -> Self {
        Self {
            kind: FactKind::Import,
            name: binding.into(),
            scope: scope.to_vec(),
            span,
            target: Some(target.into()),
            signature: None,
        }
    }

    pub fn inherits(base: impl Into<String>, class_scope: &[String], span: Span) -> Self {
        Self {
            kind: FactKind::Inherits,
            name: base.into(),
            scope: class_scope.to_vec(),
            span,
            target: None,
            signature: None,
        }
    }

    pub fn reference(name: impl Into<String>, scope: &[String], span: Span) -> Self {
        Self {
            kind: FactKind::Reference,
            name: name.into(),
            scope: scope.to_vec(),
            span,
            target: None,
            signature: None,
        }
    }

    pub fn parse_error(message: impl Into<String>, span: Span) -> Self {
        Self {
            kind: FactKind::ParseError,
            name: message.into(),
            scope: Vec::new(),
            span,
            target: None,
            signature: None,
        }
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// The definition kind, if this fact is a definition.
    pub fn definition_kind(&self) -> Option<NodeKind> {
        match self.kind {
            FactKind::Definition(kind) => Some(kind),
            _ => None,
        }
    }
}

/// Span of a tree-sitter node.
pub(crate) fn span_of(node: tree_sitter::Node) -> Span {
    let start = node.start_position();
    let end = node.end_position();
    Span::new(start.row, start.column, end.row, end.column)
}

/// Text of a node, or empty on invalid UTF-8.
pub(crate) fn node_text(node: tree_sitter::Node, source: &[u8]) -> String {
    node.utf8_text(source).unwrap_or("").to_string()
}

/// Collapse runs of whitespace so multi-line signatures compare stably.
pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Named children of a node, in source order.
pub(crate) fn named_children<'t>(node: tree_sitter::Node<'t>) -> Vec<tree_sitter::Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

/// All children of a node, in source order.
pub(crate) fn children<'t>(node: tree_sitter::Node<'t>) -> Vec<tree_sitter::Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}
