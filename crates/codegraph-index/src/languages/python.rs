//! Python language extractor using tree-sitter-python.

use crate::extractor::LanguageExtractor;
use crate::fact::{children, collapse_whitespace, named_children, node_text, span_of, Fact};
use codegraph_core::NodeKind;
use tree_sitter::{Node, Tree};

/// Python language extractor for tree-sitter-based code indexing.
pub struct PythonExtractor;

impl PythonExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PythonExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageExtractor for PythonExtractor {
    fn language_name(&self) -> &str {
        "python"
    }

    fn file_extensions(&self) -> &[&str] {
        &["py", "pyi"]
    }

    fn tree_sitter_language(&self) -> tree_sitter::Language {
        tree_sitter_python::LANGUAGE.into()
    }

    fn scope_separator(&self) -> &'static str {
        "."
    }

    fn extract_facts(&self, tree: &Tree, source: &[u8]) -> Vec<Fact> {
        let mut facts = Vec::new();
        walk(tree.root_node(), source, &[], false, &mut facts);
        facts
    }
}

// ── Traversal ─────────────────────────────────────────────────────────────

fn walk(node: Node, source: &[u8], scope: &[String], in_class: bool, facts: &mut Vec<Fact>) {
    match node.kind() {
        "function_definition" => {
            if visit_function(node, source, scope, in_class, facts) {
                return;
            }
        }
        "class_definition" => {
            if visit_class(node, source, scope, facts) {
                return;
            }
        }
        "decorated_definition" => {
            visit_decorated(node, source, scope, in_class, facts);
            return;
        }
        "import_statement" => {
            visit_import(node, source, scope, facts);
            return;
        }
        "import_from_statement" => {
            visit_import_from(node, source, scope, facts);
            return;
        }
        "expression_statement" => {
            if scope.is_empty() && !in_class {
                if let Some(fact) = module_constant(node, source) {
                    facts.push(fact);
                }
            }
        }
        "call" => {
            if let Some(function) = node.child_by_field_name("function") {
                if let Some(callee) = callee_name(function, source) {
                    facts.push(Fact::call(callee, scope, span_of(node)));
                }
            }
        }
        _ => {}
    }

    for child in named_children(node) {
        walk(child, source, scope, in_class, facts);
    }
}

/// Returns false when the node has no name and should be walked generically.
fn visit_function(
    node: Node,
    source: &[u8],
    scope: &[String],
    in_class: bool,
    facts: &mut Vec<Fact>,
) -> bool {
    let Some(name_node) = node.child_by_field_name("name") else {
        return false;
    };
    let name = node_text(name_node, source);
    let kind = if in_class {
        NodeKind::Method
    } else {
        NodeKind::Function
    };
    let header_end = node
        .child_by_field_name("return_type")
        .or_else(|| node.child_by_field_name("parameters"))
        .unwrap_or(name_node);
    facts.push(
        Fact::definition(kind, &name, scope, span_of(node))
            .with_signature(header(node, header_end, source)),
    );

    // Default values are evaluated in the enclosing scope.
    if let Some(parameters) = node.child_by_field_name("parameters") {
        walk(parameters, source, scope, false, facts);
    }

    let mut inner = scope.to_vec();
    inner.push(name);
    if let Some(body) = node.child_by_field_name("body") {
        for child in named_children(body) {
            walk(child, source, &inner, false, facts);
        }
    }
    true
}

fn visit_class(node: Node, source: &[u8], scope: &[String], facts: &mut Vec<Fact>) -> bool {
    let Some(name_node) = node.child_by_field_name("name") else {
        return false;
    };
    let name = node_text(name_node, source);
    let superclasses = node.child_by_field_name("superclasses");
    let header_end = superclasses.unwrap_or(name_node);
    facts.push(
        Fact::definition(NodeKind::Class, &name, scope, span_of(node))
            .with_signature(header(node, header_end, source)),
    );

    let mut inner = scope.to_vec();
    inner.push(name);

    if let Some(bases) = superclasses {
        for base in named_children(bases) {
            let base_node = match base.kind() {
                "identifier" | "attribute" => Some(base),
                // Generic[T], Base[int]
                "subscript" => base.child_by_field_name("value"),
                // metaclass=..., **kwargs
                _ => None,
            };
            if let Some(base_node) = base_node.filter(|n| is_dotted_path(*n)) {
                facts.push(Fact::inherits(
                    dotted_text(base_node, source),
                    &inner,
                    span_of(base_node),
                ));
            }
            // Calls inside base expressions still count.
            walk(base, source, scope, false, facts);
        }
    }

    if let Some(body) = node.child_by_field_name("body") {
        for child in named_children(body) {
            walk(child, source, &inner, true, facts);
        }
    }
    true
}

fn visit_decorated(
    node: Node,
    source: &[u8],
    scope: &[String],
    in_class: bool,
    facts: &mut Vec<Fact>,
) {
    let definition = node.child_by_field_name("definition");
    let decorated_name = definition
        .and_then(|d| d.child_by_field_name("name"))
        .map(|n| node_text(n, source));

    for child in named_children(node) {
        if child.kind() != "decorator" {
            continue;
        }
        let Some(expr) = named_children(child).into_iter().next() else {
            continue;
        };
        let target = if expr.kind() == "call" {
            expr.child_by_field_name("function")
        } else {
            Some(expr)
        };
        match (target.filter(|t| is_dotted_path(*t)), &decorated_name) {
            (Some(target), Some(name)) => {
                let mut owner = scope.to_vec();
                owner.push(name.clone());
                facts.push(Fact::reference(
                    dotted_text(target, source),
                    &owner,
                    span_of(target),
                ));
            }
            _ => walk(expr, source, scope, in_class, facts),
        }
        if expr.kind() == "call" {
            if let Some(arguments) = expr.child_by_field_name("arguments") {
                walk(arguments, source, scope, in_class, facts);
            }
        }
    }

    if let Some(definition) = definition {
        walk(definition, source, scope, in_class, facts);
    }
}

fn visit_import(node: Node, source: &[u8], scope: &[String], facts: &mut Vec<Fact>) {
    // import a.b, c as d
    for child in named_children(node) {
        match child.kind() {
            "dotted_name" => {
                let path = dotted_text(child, source);
                facts.push(Fact::import(&path, &path, scope, span_of(child)));
            }
            "aliased_import" => {
                let (Some(name), Some(alias)) = (
                    child.child_by_field_name("name"),
                    child.child_by_field_name("alias"),
                ) else {
                    continue;
                };
                facts.push(Fact::import(
                    node_text(alias, source),
                    dotted_text(name, source),
                    scope,
                    span_of(child),
                ));
            }
            _ => {}
        }
    }
}

fn visit_import_from(node: Node, source: &[u8], scope: &[String], facts: &mut Vec<Fact>) {
    // from a.b import c, d as e / from . import x / from ..m import *
    let Some(module_node) = node.child_by_field_name("module_name") else {
        return;
    };
    let module = dotted_text(module_node, source);

    if children(node).iter().any(|c| c.kind() == "wildcard_import") {
        facts.push(Fact::import("*", &module, scope, span_of(node)));
        return;
    }

    let mut cursor = node.walk();
    let names: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();
    for name in names {
        match name.kind() {
            "dotted_name" => {
                let imported = dotted_text(name, source);
                facts.push(Fact::import(
                    &imported,
                    join_module(&module, &imported),
                    scope,
                    span_of(name),
                ));
            }
            "aliased_import" => {
                let (Some(inner), Some(alias)) = (
                    name.child_by_field_name("name"),
                    name.child_by_field_name("alias"),
                ) else {
                    continue;
                };
                facts.push(Fact::import(
                    node_text(alias, source),
                    join_module(&module, &dotted_text(inner, source)),
                    scope,
                    span_of(name),
                ));
            }
            _ => {}
        }
    }
}

fn module_constant(node: Node, source: &[u8]) -> Option<Fact> {
    let assignment = named_children(node).into_iter().next()?;
    if assignment.kind() != "assignment" {
        return None;
    }
    let left = assignment.child_by_field_name("left")?;
    if left.kind() != "identifier" {
        return None;
    }
    let name = node_text(left, source);
    if !is_constant_name(&name) {
        return None;
    }
    let text = node_text(assignment, source);
    let first_line = text.lines().next().unwrap_or_default().trim().to_string();
    Some(
        Fact::definition(NodeKind::Variable, name, &[], span_of(assignment))
            .with_signature(first_line),
    )
}

// ── Helper Functions ──────────────────────────────────────────────────────

/// `UPPER_CASE` names of at least two characters.
fn is_constant_name(name: &str) -> bool {
    name.len() >= 2
        && name.chars().any(|c| c.is_ascii_uppercase())
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c == '_' || c.is_ascii_digit())
        && !name.starts_with('_')
}

/// A call target as written, or `_.name` when the receiver is an expression.
fn callee_name(function: Node, source: &[u8]) -> Option<String> {
    match function.kind() {
        "identifier" => Some(node_text(function, source)),
        "attribute" if is_dotted_path(function) => Some(dotted_text(function, source)),
        "attribute" => function
            .child_by_field_name("attribute")
            .map(|attr| format!("_.{}", node_text(attr, source))),
        _ => None,
    }
}

fn is_dotted_path(node: Node) -> bool {
    match node.kind() {
        "identifier" | "dotted_name" => true,
        "attribute" => node
            .child_by_field_name("object")
            .is_some_and(is_dotted_path),
        _ => false,
    }
}

/// Node text with whitespace removed (`a . b` -> `a.b`).
fn dotted_text(node: Node, source: &[u8]) -> String {
    node_text(node, source).split_whitespace().collect()
}

fn join_module(module: &str, name: &str) -> String {
    if module.ends_with('.') {
        format!("{module}{name}")
    } else {
        format!("{module}.{name}")
    }
}

/// Definition header from the node start to the end of `until`.
fn header(node: Node, until: Node, source: &[u8]) -> String {
    let text = source
        .get(node.start_byte()..until.end_byte())
        .and_then(|bytes| std::str::from_utf8(bytes).ok())
        .unwrap_or_default();
    collapse_whitespace(text)
}
