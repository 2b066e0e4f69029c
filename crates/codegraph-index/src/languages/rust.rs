//! Rust language extractor using tree-sitter-rust.

use crate::extractor::LanguageExtractor;
use crate::fact::{collapse_whitespace, named_children, node_text, span_of, Fact};
use codegraph_core::NodeKind;
use tree_sitter::{Node, Tree};

/// Rust language extractor for tree-sitter-based code indexing.
pub struct RustExtractor;

impl RustExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageExtractor for RustExtractor {
    fn language_name(&self) -> &str {
        "rust"
    }

    fn file_extensions(&self) -> &[&str] {
        &["rs"]
    }

    fn tree_sitter_language(&self) -> tree_sitter::Language {
        tree_sitter_rust::LANGUAGE.into()
    }

    fn scope_separator(&self) -> &'static str {
        "::"
    }

    fn extract_facts(&self, tree: &Tree, source: &[u8]) -> Vec<Fact> {
        let mut facts = Vec::new();
        walk(tree.root_node(), source, &[], false, &mut facts);
        facts
    }
}

// ── Traversal ─────────────────────────────────────────────────────────────

/// `in_impl` is true for items directly inside an `impl` or `trait` body.
fn walk(node: Node, source: &[u8], scope: &[String], in_impl: bool, facts: &mut Vec<Fact>) {
    match node.kind() {
        "function_item" | "function_signature_item" => {
            if visit_function(node, source, scope, in_impl, facts) {
                return;
            }
        }
        "struct_item" | "enum_item" | "union_item" => {
            if let Some(name) = node.child_by_field_name("name") {
                facts.push(
                    Fact::definition(NodeKind::Class, node_text(name, source), scope, span_of(node))
                        .with_signature(item_header(node, source)),
                );
                return;
            }
        }
        "trait_item" => {
            if visit_trait(node, source, scope, facts) {
                return;
            }
        }
        "impl_item" => {
            if visit_impl(node, source, scope, facts) {
                return;
            }
        }
        "mod_item" => {
            // `mod foo;` lives in its own file.
            let (Some(name), Some(body)) = (
                node.child_by_field_name("name"),
                node.child_by_field_name("body"),
            ) else {
                return;
            };
            let name = node_text(name, source);
            facts.push(
                Fact::definition(NodeKind::Module, &name, scope, span_of(node))
                    .with_signature(format!("mod {name}")),
            );
            let mut inner = scope.to_vec();
            inner.push(name);
            for child in named_children(body) {
                walk(child, source, &inner, false, facts);
            }
            return;
        }
        "const_item" | "static_item" => {
            if let Some(name) = node.child_by_field_name("name") {
                let signature = match node.child_by_field_name("value") {
                    Some(value) => slice(source, node.start_byte(), value.start_byte())
                        .trim_end()
                        .trim_end_matches('=')
                        .to_string(),
                    None => node_text(node, source),
                };
                facts.push(
                    Fact::definition(
                        NodeKind::Variable,
                        node_text(name, source),
                        scope,
                        span_of(node),
                    )
                    .with_signature(collapse_whitespace(signature.trim_end_matches(';'))),
                );
                if let Some(value) = node.child_by_field_name("value") {
                    walk(value, source, scope, false, facts);
                }
                return;
            }
        }
        "use_declaration" => {
            if let Some(argument) = node.child_by_field_name("argument") {
                collect_use(argument, source, "", scope, facts);
            }
            return;
        }
        "call_expression" => {
            if let Some(function) = node.child_by_field_name("function") {
                if let Some(callee) = callee_name(function, source) {
                    facts.push(Fact::call(callee, scope, span_of(node)));
                }
            }
        }
        // Token trees are not parsed further.
        "macro_invocation" | "macro_definition" | "attribute_item" | "inner_attribute_item" => {
            return;
        }
        _ => {}
    }

    for child in named_children(node) {
        walk(child, source, scope, false, facts);
    }
}

fn visit_function(
    node: Node,
    source: &[u8],
    scope: &[String],
    in_impl: bool,
    facts: &mut Vec<Fact>,
) -> bool {
    let Some(name_node) = node.child_by_field_name("name") else {
        return false;
    };
    let name = node_text(name_node, source);
    let kind = if in_impl {
        NodeKind::Method
    } else {
        NodeKind::Function
    };
    facts.push(
        Fact::definition(kind, &name, scope, span_of(node))
            .with_signature(item_header(node, source)),
    );

    let mut inner = scope.to_vec();
    inner.push(name);
    if let Some(body) = node.child_by_field_name("body") {
        walk(body, source, &inner, false, facts);
    }
    true
}

fn visit_trait(node: Node, source: &[u8], scope: &[String], facts: &mut Vec<Fact>) -> bool {
    let Some(name_node) = node.child_by_field_name("name") else {
        return false;
    };
    let name = node_text(name_node, source);
    facts.push(
        Fact::definition(NodeKind::Class, &name, scope, span_of(node))
            .with_signature(item_header(node, source)),
    );

    let mut inner = scope.to_vec();
    inner.push(name);

    // trait A: B + fmt::Debug
    if let Some(bounds) = node.child_by_field_name("bounds") {
        for bound in named_children(bounds) {
            if let Some(path) = type_path(bound, source) {
                facts.push(Fact::inherits(path, &inner, span_of(bound)));
            }
        }
    }

    if let Some(body) = node.child_by_field_name("body") {
        for child in named_children(body) {
            walk(child, source, &inner, true, facts);
        }
    }
    true
}

fn visit_impl(node: Node, source: &[u8], scope: &[String], facts: &mut Vec<Fact>) -> bool {
    let Some(self_type) = node
        .child_by_field_name("type")
        .and_then(|t| type_name(t, source))
    else {
        return false;
    };
    let mut inner = scope.to_vec();
    inner.push(self_type);

    if let Some(trait_node) = node.child_by_field_name("trait") {
        if let Some(path) = type_path(trait_node, source) {
            facts.push(Fact::inherits(path, &inner, span_of(trait_node)));
        }
    }

    if let Some(body) = node.child_by_field_name("body") {
        for child in named_children(body) {
            walk(child, source, &inner, true, facts);
        }
    }
    true
}

/// Flatten a `use` tree into one import fact per binding.
fn collect_use(node: Node, source: &[u8], prefix: &str, scope: &[String], facts: &mut Vec<Fact>) {
    match node.kind() {
        "identifier" | "crate" | "self" | "super" => {
            let text = node_text(node, source);
            if text == "self" && !prefix.is_empty() {
                facts.push(Fact::import(
                    last_segment(prefix),
                    prefix,
                    scope,
                    span_of(node),
                ));
            } else {
                facts.push(Fact::import(&text, join_path(prefix, &text), scope, span_of(node)));
            }
        }
        "scoped_identifier" => {
            let full = join_path(prefix, &path_text(node, source));
            match full.strip_suffix("::self") {
                Some(path) => {
                    facts.push(Fact::import(last_segment(path), path, scope, span_of(node)))
                }
                None => facts.push(Fact::import(
                    last_segment(&full),
                    &full,
                    scope,
                    span_of(node),
                )),
            }
        }
        "use_as_clause" => {
            let (Some(path), Some(alias)) = (
                node.child_by_field_name("path"),
                node.child_by_field_name("alias"),
            ) else {
                return;
            };
            facts.push(Fact::import(
                node_text(alias, source),
                join_path(prefix, &path_text(path, source)),
                scope,
                span_of(node),
            ));
        }
        "scoped_use_list" => {
            let inner_prefix = match node.child_by_field_name("path") {
                Some(path) => join_path(prefix, &path_text(path, source)),
                None => prefix.to_string(),
            };
            if let Some(list) = node.child_by_field_name("list") {
                collect_use(list, source, &inner_prefix, scope, facts);
            }
        }
        "use_list" => {
            for child in named_children(node) {
                collect_use(child, source, prefix, scope, facts);
            }
        }
        "use_wildcard" => {
            let text = path_text(node, source);
            let module = text.trim_end_matches('*').trim_end_matches("::");
            facts.push(Fact::import(
                "*",
                join_path(prefix, module),
                scope,
                span_of(node),
            ));
        }
        _ => {}
    }
}

/// Callee as written: `foo`, `a::b::foo`, `self.run`, or `_.len` for
/// method calls on any other receiver.
fn callee_name(function: Node, source: &[u8]) -> Option<String> {
    match function.kind() {
        "identifier" | "scoped_identifier" => Some(path_text(function, source)),
        "generic_function" => function
            .child_by_field_name("function")
            .and_then(|f| callee_name(f, source)),
        "field_expression" => {
            let field = node_text(function.child_by_field_name("field")?, source);
            let receiver = function.child_by_field_name("value")?;
            if receiver.kind() == "self" {
                Some(format!("self.{field}"))
            } else {
                Some(format!("_.{field}"))
            }
        }
        _ => None,
    }
}

/// Last path segment of a type with generics and references stripped.
fn type_name(node: Node, source: &[u8]) -> Option<String> {
    match node.kind() {
        "type_identifier" | "primitive_type" => Some(node_text(node, source)),
        "generic_type" | "reference_type" | "pointer_type" => node
            .child_by_field_name("type")
            .and_then(|t| type_name(t, source)),
        "scoped_type_identifier" => node
            .child_by_field_name("name")
            .map(|n| node_text(n, source)),
        _ => None,
    }
}

/// Full path of a type or trait reference with generics stripped.
fn type_path(node: Node, source: &[u8]) -> Option<String> {
    match node.kind() {
        "type_identifier" | "scoped_type_identifier" => Some(path_text(node, source)),
        "generic_type" => node
            .child_by_field_name("type")
            .and_then(|t| type_path(t, source)),
        _ => None,
    }
}

/// Path text with whitespace and generic arguments removed.
fn path_text(node: Node, source: &[u8]) -> String {
    let text: String = node_text(node, source).split_whitespace().collect();
    strip_generics(&text)
}

fn strip_generics(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    // `Vec::<u8>::new` leaves an empty segment behind.
    while out.contains("::::") {
        out = out.replace("::::", "::");
    }
    out.trim_end_matches("::").to_string()
}

fn join_path(prefix: &str, path: &str) -> String {
    match (prefix.is_empty(), path.is_empty()) {
        (true, _) => path.to_string(),
        (_, true) => prefix.to_string(),
        _ => format!("{prefix}::{path}"),
    }
}

fn last_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

fn slice(source: &[u8], start: usize, end: usize) -> &str {
    source
        .get(start..end)
        .and_then(|bytes| std::str::from_utf8(bytes).ok())
        .unwrap_or_default()
}

/// Item text up to its body, e.g. `pub fn run(&self) -> Result<()>`.
fn item_header(node: Node, source: &[u8]) -> String {
    let end = node
        .child_by_field_name("body")
        .map(|b| b.start_byte())
        .unwrap_or_else(|| node.end_byte());
    collapse_whitespace(slice(source, node.start_byte(), end).trim_end_matches(';'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fact::FactKind;
    use tree_sitter::Parser;

    fn extract(source: &str) -> Vec<Fact> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_rust::LANGUAGE.into())
            .expect("failed to set Rust language");
        let tree = parser
            .parse(source.as_bytes(), None)
            .expect("failed to parse");
        RustExtractor::new().extract_facts(&tree, source.as_bytes())
    }

    fn of_kind(facts: &[Fact], kind: FactKind) -> Vec<&Fact> {
        facts.iter().filter(|f| f.kind == kind).collect()
    }

    #[test]
    fn extract_rust_function() {
        let source = r#"
/// Adds two numbers.
pub fn add(a: i32, b: i32) -> i32 {
    a + b
}
"#;
        let facts = extract(source);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].name, "add");
        assert_eq!(facts[0].kind, FactKind::Definition(NodeKind::Function));
        assert_eq!(
            facts[0].signature.as_deref(),
            Some("pub fn add(a: i32, b: i32) -> i32")
        );
    }

    #[test]
    fn impl_methods_are_scoped_under_self_type() {
        let source = r#"
pub struct Counter { n: u32 }

impl Counter {
    pub fn new() -> Self { Self { n: 0 } }
    pub fn bump(&mut self) { self.add(1); }
    fn add(&mut self, by: u32) { self.n += by; }
}

impl<T> fmt::Display for Wrapper<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { Ok(()) }
}
"#;
        let facts = extract(source);
        let defs: Vec<_> = facts
            .iter()
            .filter_map(|f| f.definition_kind().map(|k| (k, f.name.as_str(), f.scope.clone())))
            .collect();
        assert_eq!(defs[0], (NodeKind::Class, "Counter", vec![]));
        assert_eq!(
            defs[1],
            (NodeKind::Method, "new", vec!["Counter".to_string()])
        );
        assert_eq!(
            defs[4],
            (NodeKind::Method, "fmt", vec!["Wrapper".to_string()])
        );

        let inherits = of_kind(&facts, FactKind::Inherits);
        assert_eq!(inherits.len(), 1);
        assert_eq!(inherits[0].name, "fmt::Display");
        assert_eq!(inherits[0].scope, vec!["Wrapper"]);

        let calls = of_kind(&facts, FactKind::Call);
        let names: Vec<_> = calls.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["self.add", "Ok"]);
        assert_eq!(calls[0].scope, vec!["Counter", "bump"]);
        assert_eq!(calls[1].scope, vec!["Wrapper", "fmt"]);
    }

    #[test]
    fn use_trees_flatten_to_bindings() {
        let source = r#"
use std::collections::{HashMap, btree_map::BTreeMap as Tree};
use crate::store::Store;
use super::util::{self, helpers::*};
use anyhow;
"#;
        let facts = extract(source);
        let imports: Vec<_> = of_kind(&facts, FactKind::Import)
            .into_iter()
            .map(|f| (f.name.as_str(), f.target.as_deref().unwrap_or_default()))
            .collect();
        assert_eq!(
            imports,
            vec![
                ("HashMap", "std::collections::HashMap"),
                ("Tree", "std::collections::btree_map::BTreeMap"),
                ("Store", "crate::store::Store"),
                ("util", "super::util"),
                ("*", "super::util::helpers"),
                ("anyhow", "anyhow"),
            ]
        );
    }

    #[test]
    fn calls_cover_paths_generics_and_receivers() {
        let source = r#"
fn run() {
    helper();
    Store::open(path);
    let v = Vec::<u8>::new();
    v.len();
    crate::util::go();
    println!("{}", other());
}
"#;
        let facts = extract(source);
        let calls: Vec<_> = of_kind(&facts, FactKind::Call)
            .into_iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(
            calls,
            vec!["helper", "Store::open", "Vec::new", "_.len", "crate::util::go"]
        );
    }

    #[test]
    fn traits_consts_and_inline_modules() {
        let source = r#"
pub const MAX: usize = 10;
static NAME: &str = "x";

pub trait Store: Send + Sync {
    fn get(&self, id: &str) -> Option<String>;
    fn has(&self, id: &str) -> bool { self.get(id).is_some() }
}

mod inner {
    pub fn f() {}
}
"#;
        let facts = extract(source);
        let max = facts.iter().find(|f| f.name == "MAX").unwrap();
        assert_eq!(max.kind, FactKind::Definition(NodeKind::Variable));
        assert_eq!(max.signature.as_deref(), Some("pub const MAX: usize"));
        assert!(facts
            .iter()
            .any(|f| f.name == "NAME" && f.kind == FactKind::Definition(NodeKind::Variable)));

        let get = facts.iter().find(|f| f.name == "get").unwrap();
        assert_eq!(get.kind, FactKind::Definition(NodeKind::Method));
        assert_eq!(get.scope, vec!["Store"]);

        let bounds: Vec<_> = of_kind(&facts, FactKind::Inherits)
            .into_iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(bounds, vec!["Send", "Sync"]);

        let inner = facts.iter().find(|f| f.name == "inner").unwrap();
        assert_eq!(inner.kind, FactKind::Definition(NodeKind::Module));
        let f = facts.iter().find(|f| f.name == "f").unwrap();
        assert_eq!(f.kind, FactKind::Definition(NodeKind::Function));
        assert_eq!(f.scope, vec!["inner"]);
    }

    #[test]
    fn strip_generics_handles_turbofish() {
        assert_eq!(strip_generics("Vec::<u8>::new"), "Vec::new");
        assert_eq!(strip_generics("HashMap<K, V>"), "HashMap");
        assert_eq!(strip_generics("a::b"), "a::b");
    }
}
