//! Fact normalization and reference resolution into graph nodes and edges.
//!
//! Definitions become nodes with qualified names derived from the module
//! path and enclosing scopes. References (calls, imports, bases, decorators)
//! become edges, resolved in order of precedence:
//!
//! 1. local scope, innermost first (`self.`/`Self::` map to the enclosing class)
//! 2. the file's import aliases (and glob imports)
//! 3. a unique global match by simple name (`heuristic`)
//!
//! Anything else stays `unresolved` with the qualified target it waits for.

use crate::fact::FactKind;
use crate::module_path::{join, ModulePath};
use crate::parser::ParsedFile;
use codegraph_core::{
    CodegraphError, Confidence, Edge, GraphNode, NodeKind, RelationshipType, Span,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

// ── Symbol Index ──────────────────────────────────────────────────────────

/// A node as seen by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolEntry {
    pub id: String,
    pub kind: NodeKind,
    pub name: String,
    pub qualified_name: String,
    pub file_path: String,
}

impl From<&GraphNode> for SymbolEntry {
    fn from(node: &GraphNode) -> Self {
        Self {
            id: node.id.clone(),
            kind: node.kind,
            name: node.name.clone(),
            qualified_name: node.qualified_name.clone(),
            file_path: node.file_path.clone(),
        }
    }
}

/// Lookup of already-known symbols across the whole tree.
pub trait SymbolIndex {
    fn by_qualified_name(&self, qualified_name: &str) -> Result<Vec<SymbolEntry>, CodegraphError>;

    fn by_name(&self, name: &str) -> Result<Vec<SymbolEntry>, CodegraphError>;
}

/// In-memory symbol index keyed by qualified name and simple name.
#[derive(Debug, Default)]
pub struct SymbolTable {
    entries: HashMap<String, SymbolEntry>,
    qualified_index: HashMap<String, BTreeSet<String>>,
    name_index: HashMap<String, BTreeSet<String>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add nodes to the index.
    pub fn add_nodes<'a>(&mut self, nodes: impl IntoIterator<Item = &'a GraphNode>) {
        for node in nodes {
            let entry = SymbolEntry::from(node);
            self.qualified_index
                .entry(entry.qualified_name.clone())
                .or_default()
                .insert(entry.id.clone());
            self.name_index
                .entry(entry.name.clone())
                .or_default()
                .insert(entry.id.clone());
            self.entries.insert(entry.id.clone(), entry);
        }
    }

    /// Drop every entry declared in `file_path`.
    pub fn remove_file(&mut self, file_path: &str) {
        let ids: Vec<String> = self
            .entries
            .values()
            .filter(|e| e.file_path == file_path)
            .map(|e| e.id.clone())
            .collect();
        for id in ids {
            if let Some(entry) = self.entries.remove(&id) {
                if let Some(set) = self.qualified_index.get_mut(&entry.qualified_name) {
                    set.remove(&id);
                }
                if let Some(set) = self.name_index.get_mut(&entry.name) {
                    set.remove(&id);
                }
            }
        }
    }

    /// Get the number of indexed symbols.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn collect(&self, ids: Option<&BTreeSet<String>>) -> Vec<SymbolEntry> {
        ids.into_iter()
            .flatten()
            .filter_map(|id| self.entries.get(id).cloned())
            .collect()
    }
}

impl SymbolIndex for SymbolTable {
    fn by_qualified_name(&self, qualified_name: &str) -> Result<Vec<SymbolEntry>, CodegraphError> {
        Ok(self.collect(self.qualified_index.get(qualified_name)))
    }

    fn by_name(&self, name: &str) -> Result<Vec<SymbolEntry>, CodegraphError> {
        Ok(self.collect(self.name_index.get(name)))
    }
}

// ── Resolution ────────────────────────────────────────────────────────────

/// Graph-ready output for one file.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The file's module node (also the first entry of `nodes`).
    pub module: GraphNode,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<Edge>,
    /// `target_ref`s of edges left without a destination.
    pub unresolved: Vec<String>,
    /// Names with more than one global candidate.
    pub ambiguous: Vec<String>,
}

impl Resolution {
    /// Ids of every node and edge, i.e. the file's contribution set.
    pub fn contribution_ids(&self) -> BTreeSet<String> {
        self.nodes
            .iter()
            .map(|n| n.id.clone())
            .chain(self.edges.iter().map(|e| e.id.clone()))
            .collect()
    }

    /// One [`CodegraphError::ResolutionAmbiguity`] per ambiguous target.
    /// These are reported, never returned as failures.
    pub fn ambiguities(&self) -> impl Iterator<Item = CodegraphError> + '_ {
        self.ambiguous
            .iter()
            .map(|target| CodegraphError::ResolutionAmbiguity(target.clone()))
    }
}

/// Where a reference points.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    target_ref: String,
    dst: Option<String>,
    confidence: Confidence,
    ambiguous: bool,
}

impl Target {
    fn resolved(target_ref: String, id: String, confidence: Confidence) -> Self {
        Self {
            target_ref,
            dst: Some(id),
            confidence,
            ambiguous: false,
        }
    }

    fn unresolved(target_ref: String) -> Self {
        Self {
            target_ref,
            dst: None,
            confidence: Confidence::Unresolved,
            ambiguous: false,
        }
    }
}

/// Resolves a parsed file's facts against a [`SymbolIndex`].
pub struct SymbolResolver<'a> {
    index: &'a dyn SymbolIndex,
}

impl<'a> SymbolResolver<'a> {
    pub fn new(index: &'a dyn SymbolIndex) -> Self {
        Self { index }
    }

    /// Normalize `file`'s facts into nodes and edges.
    pub fn resolve(&self, file: &ParsedFile) -> Result<Resolution, CodegraphError> {
        let module_path = ModulePath::for_file(&file.relative_path, &file.language);
        let ctx = FileContext::build(file, module_path);

        let module = ctx.module_node(file);
        let mut resolution = Resolution {
            module: module.clone(),
            nodes: vec![module.clone()],
            edges: Vec::new(),
            unresolved: Vec::new(),
            ambiguous: Vec::new(),
        };
        let mut seen_edges = HashSet::new();

        // Definitions and containment.
        let mut seen_nodes = HashSet::from([module.id.clone()]);
        for fact in &file.facts {
            let Some(kind) = fact.definition_kind() else {
                continue;
            };
            let relative = ctx.relative(&fact.scope, &fact.name);
            let qualified_name = ctx.qualify(&relative);
            let id = GraphNode::node_id(kind, &qualified_name);
            if !seen_nodes.insert(id.clone()) {
                continue;
            }
            let parent = ctx.enclosing_definition(&fact.scope);
            let contains = Edge {
                id: Edge::edge_id(
                    RelationshipType::Contains,
                    &parent,
                    &qualified_name,
                    &file.file_path,
                ),
                src: parent,
                dst: Some(id.clone()),
                relationship: RelationshipType::Contains,
                confidence: Confidence::Resolved,
                target_ref: qualified_name.clone(),
                file_path: file.file_path.clone(),
                span: fact.span,
            };
            resolution.nodes.push(GraphNode {
                id,
                kind,
                name: fact.name.clone(),
                qualified_name,
                file_path: file.file_path.clone(),
                language: file.language.clone(),
                span: fact.span,
                signature: fact.signature.clone(),
            });
            if seen_edges.insert(contains.id.clone()) {
                resolution.edges.push(contains);
            }
        }

        // References.
        for fact in &file.facts {
            let (relationship, src, target) = match fact.kind {
                FactKind::Import => {
                    let Some(raw) = fact.target.as_deref() else {
                        continue;
                    };
                    let absolute = ctx.module.absolutize(raw);
                    let target = self.lookup_qualified(
                        &ctx,
                        absolute,
                        RelationshipType::Imports,
                        Confidence::Resolved,
                    )?;
                    (RelationshipType::Imports, module.id.clone(), target)
                }
                FactKind::Call | FactKind::Reference => {
                    let relationship = if fact.kind == FactKind::Call {
                        RelationshipType::Calls
                    } else {
                        RelationshipType::References
                    };
                    let src = ctx.enclosing_definition(&fact.scope);
                    let target = self.resolve_name(&ctx, &fact.name, &fact.scope, relationship)?;
                    (relationship, src, target)
                }
                FactKind::Inherits => {
                    // The subtype is declared here, or imported for an `impl`.
                    let class_path = fact.scope.join(ctx.separator());
                    let src = match ctx.local_id(&class_path, RelationshipType::Inherits) {
                        Some(id) => id,
                        None => match ctx.homes.get(&class_path) {
                            Some(home) => GraphNode::node_id(NodeKind::Class, home),
                            None => {
                                tracing::debug!(
                                    "{}: skipping base {} of undeclared type {}",
                                    file.file_path,
                                    fact.name,
                                    class_path
                                );
                                continue;
                            }
                        },
                    };
                    let outer = &fact.scope[..fact.scope.len().saturating_sub(1)];
                    let target =
                        self.resolve_name(&ctx, &fact.name, outer, RelationshipType::Inherits)?;
                    (RelationshipType::Inherits, src, target)
                }
                FactKind::Definition(_) | FactKind::ParseError => continue,
            };

            let edge = Edge {
                id: Edge::edge_id(relationship, &src, &target.target_ref, &file.file_path),
                src,
                dst: target.dst.clone(),
                relationship,
                confidence: target.confidence,
                target_ref: target.target_ref.clone(),
                file_path: file.file_path.clone(),
                span: fact.span,
            };
            if !seen_edges.insert(edge.id.clone()) {
                continue;
            }
            if target.ambiguous {
                resolution.ambiguous.push(target.target_ref.clone());
            }
            if edge.dst.is_none() {
                resolution.unresolved.push(target.target_ref);
            }
            resolution.edges.push(edge);
        }

        Ok(resolution)
    }

    /// Resolve a name as written in `scope`.
    fn resolve_name(
        &self,
        ctx: &FileContext,
        written: &str,
        scope: &[String],
        relationship: RelationshipType,
    ) -> Result<Target, CodegraphError> {
        let sep = ctx.separator();
        let segments: Vec<String> = match parse_written(written, sep) {
            Written::Path(segments) => segments,
            Written::Dynamic(method) => return self.lookup_global(ctx, method, relationship),
            Written::OnSelf(member) => {
                let Some(class) = ctx.enclosing_class(scope) else {
                    return self.lookup_global(ctx, member, relationship);
                };
                let relative = join(&class.join(sep), &member, sep);
                return match ctx.local_id(&relative, relationship) {
                    Some(id) => Ok(Target::resolved(
                        ctx.qualify(&relative),
                        id,
                        Confidence::Resolved,
                    )),
                    // Inherited or dynamic attribute.
                    None => self.lookup_global(ctx, member, relationship),
                };
            }
        };

        // Paths anchored at the crate or module (`crate::`, `super::`, `self::`).
        if sep == "::" && matches!(segments[0].as_str(), "crate" | "super" | "self") {
            let absolute = ctx.module.absolutize(&segments.join(sep));
            return self.lookup_qualified(ctx, absolute, relationship, Confidence::Resolved);
        }

        // 1. Local scope, innermost first.
        let written_path = segments.join(sep);
        for depth in (0..=scope.len()).rev() {
            let prefix = &scope[..depth];
            // Class bodies are not enclosing scopes for nested functions.
            if depth > 0 && depth < scope.len() && ctx.is_class_path(prefix) {
                continue;
            }
            let relative = join(&prefix.join(sep), &written_path, sep);
            if let Some(id) = ctx.local_id(&relative, relationship) {
                return Ok(Target::resolved(
                    ctx.qualify(&relative),
                    id,
                    Confidence::Resolved,
                ));
            }
        }

        // 2. Import aliases, longest binding first.
        for take in (1..=segments.len()).rev() {
            let binding = segments[..take].join(sep);
            if let Some(imported) = ctx.aliases.get(&binding) {
                let qualified = join(imported, &segments[take..].join(sep), sep);
                return self.lookup_qualified(ctx, qualified, relationship, Confidence::Resolved);
            }
        }
        for glob in &ctx.globs {
            let candidate = join(glob, &written_path, sep);
            if let Some(entry) = self.pick(ctx, self.index.by_qualified_name(&candidate)?, relationship)
            {
                return Ok(Target::resolved(candidate, entry.id, Confidence::Resolved));
            }
        }

        // 3. Absolute paths, then a unique simple name.
        match segments.len() {
            1 => self.lookup_global(ctx, written_path, relationship),
            // `obj.method()` on an unbound Python name is a receiver call.
            _ if sep == "." => {
                let member = segments.last().cloned().unwrap_or_default();
                self.lookup_global(ctx, member, relationship)
            }
            _ => self.lookup_qualified(ctx, written_path, relationship, Confidence::Resolved),
        }
    }

    /// Exact qualified-name lookup; a miss leaves the edge waiting on `qualified`.
    fn lookup_qualified(
        &self,
        ctx: &FileContext,
        qualified: String,
        relationship: RelationshipType,
        confidence: Confidence,
    ) -> Result<Target, CodegraphError> {
        for relative in ctx.local_paths(&qualified) {
            if let Some(id) = ctx.local_id(&relative, relationship) {
                return Ok(Target::resolved(qualified, id, confidence));
            }
        }
        if qualified == ctx.module.qualified_name && relationship == RelationshipType::Imports {
            let id = GraphNode::node_id(NodeKind::Module, &qualified);
            return Ok(Target::resolved(qualified, id, confidence));
        }
        let candidates = self.index.by_qualified_name(&qualified)?;
        Ok(match self.pick(ctx, candidates, relationship) {
            Some(entry) => Target::resolved(qualified, entry.id, confidence),
            None => Target::unresolved(qualified),
        })
    }

    /// Unique simple-name match anywhere outside this file.
    fn lookup_global(
        &self,
        ctx: &FileContext,
        name: String,
        relationship: RelationshipType,
    ) -> Result<Target, CodegraphError> {
        let candidates: Vec<SymbolEntry> = self
            .index
            .by_name(&name)?
            .into_iter()
            .filter(|e| e.file_path != ctx.file_path && e.kind != NodeKind::Module)
            .filter(|e| relationship.accepts_target(e.kind))
            .collect();
        Ok(match candidates.len() {
            1 => {
                let entry = candidates.into_iter().next().map(|e| e.id);
                Target {
                    target_ref: name,
                    dst: entry,
                    confidence: Confidence::Heuristic,
                    ambiguous: false,
                }
            }
            0 => Target::unresolved(name),
            _ => Target {
                ambiguous: true,
                ..Target::unresolved(name)
            },
        })
    }

    /// Best candidate for `relationship` among nodes sharing a qualified name.
    fn pick(
        &self,
        ctx: &FileContext,
        candidates: Vec<SymbolEntry>,
        relationship: RelationshipType,
    ) -> Option<SymbolEntry> {
        candidates
            .into_iter()
            .filter(|e| e.file_path != ctx.file_path || e.kind == NodeKind::Module)
            .filter(|e| relationship.accepts_target(e.kind))
            .min_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.id.cmp(&b.id)))
    }
}

// ── Per-file context ──────────────────────────────────────────────────────

/// How a reference was written.
enum Written {
    /// `foo`, `a.b.c`, `a::b::c`
    Path(Vec<String>),
    /// `self.m`, `cls.m`, `Self::m`
    OnSelf(String),
    /// A member of an unknown receiver.
    Dynamic(String),
}

fn parse_written(written: &str, sep: &str) -> Written {
    if let Some(member) = written.strip_prefix("_.") {
        return Written::Dynamic(last(member, ".").to_string());
    }
    if sep == "::" {
        // Rust method calls use `.`; paths use `::`.
        if let Some((receiver, method)) = written.rsplit_once('.') {
            return if receiver == "self" {
                Written::OnSelf(method.to_string())
            } else {
                Written::Dynamic(method.to_string())
            };
        }
        if let Some(member) = written.strip_prefix("Self::") {
            return Written::OnSelf(member.to_string());
        }
    } else if let Some(member) = written
        .strip_prefix("self.")
        .or_else(|| written.strip_prefix("cls."))
    {
        // Only direct members; `self.a.b()` is dynamic.
        return if member.contains('.') {
            Written::Dynamic(last(member, ".").to_string())
        } else {
            Written::OnSelf(member.to_string())
        };
    }
    Written::Path(written.split(sep).map(str::to_string).collect())
}

fn last<'s>(text: &'s str, sep: &str) -> &'s str {
    text.rsplit(sep).next().unwrap_or(text)
}

struct FileContext {
    file_path: String,
    module: ModulePath,
    /// Definitions by path relative to the module.
    local: BTreeMap<String, Vec<(NodeKind, String)>>,
    aliases: HashMap<String, String>,
    globs: Vec<String>,
    /// Imported `impl` targets by path relative to the module, mapped to
    /// the type's qualified name.
    homes: BTreeMap<String, String>,
}

impl FileContext {
    fn build(file: &ParsedFile, module: ModulePath) -> Self {
        let mut ctx = Self {
            file_path: file.file_path.clone(),
            module,
            local: BTreeMap::new(),
            aliases: HashMap::new(),
            globs: Vec::new(),
            homes: BTreeMap::new(),
        };
        let mut defined = HashSet::new();
        for fact in &file.facts {
            match fact.kind {
                FactKind::Definition(_) => {
                    defined.insert(ctx.relative(&fact.scope, &fact.name));
                }
                FactKind::Import => {
                    let Some(raw) = fact.target.as_deref() else {
                        continue;
                    };
                    let absolute = ctx.module.absolutize(raw);
                    if fact.name == "*" {
                        if !ctx.globs.contains(&absolute) {
                            ctx.globs.push(absolute);
                        }
                    } else {
                        ctx.aliases.insert(fact.name.clone(), absolute);
                    }
                }
                _ => {}
            }
        }

        // Items of `impl Trait for Imported` belong to the imported type.
        if ctx.separator() == "::" {
            for fact in file.facts.iter().filter(|f| !f.scope.is_empty()) {
                let Some(depth) = (1..=fact.scope.len())
                    .find(|&d| !defined.contains(&fact.scope[..d].join(ctx.separator())))
                else {
                    continue;
                };
                let target = fact.scope[..depth].join(ctx.separator());
                if ctx.homes.contains_key(&target) {
                    continue;
                }
                if let Some(imported) = ctx.aliases.get(&fact.scope[depth - 1]) {
                    ctx.homes.insert(target, imported.clone());
                }
            }
        }

        for fact in &file.facts {
            if let FactKind::Definition(kind) = fact.kind {
                let relative = ctx.relative(&fact.scope, &fact.name);
                let id = GraphNode::node_id(kind, &ctx.qualify(&relative));
                let entry = ctx.local.entry(relative).or_default();
                if !entry.iter().any(|(_, existing)| *existing == id) {
                    entry.push((kind, id));
                }
            }
        }
        ctx
    }

    /// Qualified name of the definition at `relative`.
    fn qualify(&self, relative: &str) -> String {
        let sep = self.separator();
        for (target, home) in &self.homes {
            if relative == target {
                return home.clone();
            }
            if let Some(rest) = relative
                .strip_prefix(target.as_str())
                .and_then(|rest| rest.strip_prefix(sep))
            {
                return join(home, rest, sep);
            }
        }
        self.module.child(relative)
    }

    fn separator(&self) -> &'static str {
        self.module.separator
    }

    fn relative(&self, scope: &[String], name: &str) -> String {
        join(&scope.join(self.separator()), name, self.separator())
    }

    fn module_node(&self, file: &ParsedFile) -> GraphNode {
        GraphNode {
            id: GraphNode::node_id(NodeKind::Module, &self.module.qualified_name),
            kind: NodeKind::Module,
            name: self.module.name().to_string(),
            qualified_name: self.module.qualified_name.clone(),
            file_path: file.file_path.clone(),
            language: file.language.clone(),
            span: Span {
                start_line: 0,
                start_col: 0,
                ..file.span
            },
            signature: None,
        }
    }

    /// Innermost definition enclosing `scope`, or the module.
    fn enclosing_definition(&self, scope: &[String]) -> String {
        (1..=scope.len())
            .rev()
            .find_map(|depth| {
                self.local
                    .get(&scope[..depth].join(self.separator()))
                    .and_then(|entries| entries.iter().min().map(|(_, id)| id.clone()))
            })
            .unwrap_or_else(|| GraphNode::node_id(NodeKind::Module, &self.module.qualified_name))
    }

    /// Innermost scope prefix that is a class, or an impl target declared elsewhere.
    fn enclosing_class<'s>(&self, scope: &'s [String]) -> Option<&'s [String]> {
        (1..=scope.len()).rev().map(|depth| &scope[..depth]).find(|prefix| {
            match self.local.get(&prefix.join(self.separator())) {
                Some(entries) => entries.iter().any(|(kind, _)| *kind == NodeKind::Class),
                None => true,
            }
        })
    }

    fn is_class_path(&self, prefix: &[String]) -> bool {
        self.local
            .get(&prefix.join(self.separator()))
            .is_some_and(|entries| entries.iter().any(|(kind, _)| *kind == NodeKind::Class))
    }

    /// Local definition at `relative` acceptable as a `relationship` target.
    fn local_id(&self, relative: &str, relationship: RelationshipType) -> Option<String> {
        self.local.get(relative).and_then(|entries| {
            entries
                .iter()
                .filter(|(kind, _)| relationship.accepts_target(*kind))
                .min()
                .map(|(_, id)| id.clone())
        })
    }

    /// Relative paths under which this file may define `qualified`.
    fn local_paths(&self, qualified: &str) -> Vec<String> {
        let sep = self.separator();
        let mut paths: Vec<String> = self
            .strip_module(qualified)
            .map(str::to_string)
            .into_iter()
            .collect();
        for (target, home) in &self.homes {
            if qualified == home {
                paths.push(target.clone());
            } else if let Some(rest) = qualified
                .strip_prefix(home.as_str())
                .and_then(|rest| rest.strip_prefix(sep))
            {
                paths.push(join(target, rest, sep));
            }
        }
        paths
    }

    /// Path relative to this module, if `qualified` is inside it.
    fn strip_module<'q>(&self, qualified: &'q str) -> Option<&'q str> {
        let module = &self.module.qualified_name;
        if module.is_empty() {
            return Some(qualified);
        }
        qualified
            .strip_prefix(module.as_str())
            .and_then(|rest| rest.strip_prefix(self.separator()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{CodeParser, ParseOutcome};

    fn parse(path: &str, source: &str) -> ParsedFile {
        match CodeParser::new().parse(path, source.as_bytes()) {
            ParseOutcome::Parsed(file) => file,
            other => panic!("expected Parsed, got {other:?}"),
        }
    }

    fn resolve(table: &SymbolTable, path: &str, source: &str) -> Resolution {
        SymbolResolver::new(table)
            .resolve(&parse(path, source))
            .unwrap()
    }

    fn edge<'r>(res: &'r Resolution, rel: RelationshipType, target_ref: &str) -> &'r Edge {
        res.edges
            .iter()
            .find(|e| e.relationship == rel && e.target_ref == target_ref)
            .unwrap_or_else(|| panic!("no {rel} edge to {target_ref} in {:#?}", res.edges))
    }

    #[test]
    fn definitions_get_qualified_ids_and_containment() {
        let table = SymbolTable::new();
        let res = resolve(
            &table,
            "pkg/shapes.py",
            "class Circle:\n    def area(self):\n        return 1\n",
        );

        let ids: Vec<_> = res.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "module:pkg.shapes",
                "class:pkg.shapes.Circle",
                "method:pkg.shapes.Circle.area"
            ]
        );
        assert_eq!(res.module.name, "shapes");

        let contains = edge(&res, RelationshipType::Contains, "pkg.shapes.Circle.area");
        assert_eq!(contains.src, "class:pkg.shapes.Circle");
        assert_eq!(contains.dst.as_deref(), Some("method:pkg.shapes.Circle.area"));
        let top = edge(&res, RelationshipType::Contains, "pkg.shapes.Circle");
        assert_eq!(top.src, "module:pkg.shapes");
    }

    #[test]
    fn local_scope_wins_over_imports_and_globals() {
        let mut table = SymbolTable::new();
        let other = resolve(&SymbolTable::new(), "other.py", "def helper():\n    pass\n");
        table.add_nodes(&other.nodes);

        let res = resolve(
            &table,
            "main.py",
            "from other import helper\n\ndef helper():\n    pass\n\ndef run():\n    helper()\n",
        );
        let call = edge(&res, RelationshipType::Calls, "main.helper");
        assert_eq!(call.src, "function:main.run");
        assert_eq!(call.dst.as_deref(), Some("function:main.helper"));
        assert_eq!(call.confidence, Confidence::Resolved);
    }

    #[test]
    fn imports_resolve_through_aliases() {
        let mut table = SymbolTable::new();
        let util = resolve(&SymbolTable::new(), "pkg/util.py", "def fmt():\n    pass\n");
        table.add_nodes(&util.nodes);

        let res = resolve(
            &table,
            "pkg/app.py",
            "from . import util as u\nfrom .util import fmt as f\n\ndef go():\n    u.fmt()\n    f()\n",
        );

        let import = edge(&res, RelationshipType::Imports, "pkg.util");
        assert_eq!(import.src, "module:pkg.app");
        assert_eq!(import.dst.as_deref(), Some("module:pkg.util"));

        for call in res
            .edges
            .iter()
            .filter(|e| e.relationship == RelationshipType::Calls)
        {
            assert_eq!(call.target_ref, "pkg.util.fmt");
            assert_eq!(call.dst.as_deref(), Some("function:pkg.util.fmt"));
            assert_eq!(call.confidence, Confidence::Resolved);
        }
    }

    #[test]
    fn forward_imports_stay_unresolved_with_qualified_target() {
        let res = resolve(
            &SymbolTable::new(),
            "b.py",
            "from a import f\n\ndef g():\n    f()\n",
        );
        let call = edge(&res, RelationshipType::Calls, "a.f");
        assert_eq!(call.dst, None);
        assert_eq!(call.confidence, Confidence::Unresolved);
        assert!(res.unresolved.contains(&"a.f".to_string()));
        // The edge id does not depend on resolution.
        assert_eq!(
            call.id,
            Edge::edge_id(RelationshipType::Calls, "function:b.g", "a.f", "b.py")
        );
    }

    #[test]
    fn unique_global_name_is_heuristic_and_ambiguity_is_counted() {
        let mut table = SymbolTable::new();
        let one = resolve(&SymbolTable::new(), "one.py", "def solo():\n    pass\n\ndef twin():\n    pass\n");
        let two = resolve(&SymbolTable::new(), "two.py", "def twin():\n    pass\n");
        table.add_nodes(&one.nodes);
        table.add_nodes(&two.nodes);

        let res = resolve(&table, "main.py", "def run():\n    solo()\n    twin()\n    obj.solo()\n");

        let solo = edge(&res, RelationshipType::Calls, "solo");
        assert_eq!(solo.dst.as_deref(), Some("function:one.solo"));
        assert_eq!(solo.confidence, Confidence::Heuristic);

        let twin = edge(&res, RelationshipType::Calls, "twin");
        assert_eq!(twin.dst, None);
        assert_eq!(res.ambiguous, vec!["twin".to_string()]);
        let reported: Vec<CodegraphError> = res.ambiguities().collect();
        assert_eq!(reported.len(), 1);
        assert!(matches!(
            &reported[0],
            CodegraphError::ResolutionAmbiguity(target) if target == "twin"
        ));
        assert!(!reported[0].is_retryable() && !reported[0].is_fatal());

        // `solo()` and `obj.solo()` share a target and collapse into one edge.
        assert_eq!(
            res.edges
                .iter()
                .filter(|e| e.relationship == RelationshipType::Calls)
                .count(),
            2
        );
    }

    #[test]
    fn self_calls_bind_to_enclosing_class() {
        let res = resolve(
            &SymbolTable::new(),
            "svc.py",
            "class Svc:\n    def run(self):\n        self.step()\n    def step(self):\n        pass\n",
        );
        let call = edge(&res, RelationshipType::Calls, "svc.Svc.step");
        assert_eq!(call.src, "method:svc.Svc.run");
        assert_eq!(call.dst.as_deref(), Some("method:svc.Svc.step"));
    }

    #[test]
    fn inherits_resolves_bases() {
        let res = resolve(
            &SymbolTable::new(),
            "zoo.py",
            "class Animal:\n    pass\n\nclass Dog(Animal):\n    pass\n",
        );
        let inherits = edge(&res, RelationshipType::Inherits, "zoo.Animal");
        assert_eq!(inherits.src, "class:zoo.Dog");
        assert_eq!(inherits.dst.as_deref(), Some("class:zoo.Animal"));
    }

    #[test]
    fn rust_paths_and_impls() {
        let mut table = SymbolTable::new();
        let store = resolve(
            &SymbolTable::new(),
            "src/store.rs",
            "pub struct Store;\nimpl Store {\n    pub fn open() -> Self { Store }\n}\n",
        );
        table.add_nodes(&store.nodes);
        assert!(store
            .nodes
            .iter()
            .any(|n| n.id == "method:crate::store::Store::open"));

        let res = resolve(
            &table,
            "src/app.rs",
            "use crate::store::Store;\n\npub struct App;\nimpl App {\n    fn new() -> Self { Self::init(); Store::open(); App }\n    fn init() {}\n}\n",
        );
        let open = edge(&res, RelationshipType::Calls, "crate::store::Store::open");
        assert_eq!(open.src, "method:crate::app::App::new");
        assert_eq!(open.dst.as_deref(), Some("method:crate::store::Store::open"));

        let init = edge(&res, RelationshipType::Calls, "crate::app::App::init");
        assert_eq!(init.dst.as_deref(), Some("method:crate::app::App::init"));

        let import = edge(&res, RelationshipType::Imports, "crate::store::Store");
        assert_eq!(import.dst.as_deref(), Some("class:crate::store::Store"));
    }

    #[test]
    fn trait_impls_for_imported_types_attach_to_the_type() {
        let mut table = SymbolTable::new();
        let model = resolve(
            &SymbolTable::new(),
            "src/model.rs",
            "pub struct Foo;\npub trait Greet {\n    fn hi(&self);\n}\n",
        );
        table.add_nodes(&model.nodes);

        let res = resolve(
            &table,
            "src/greet.rs",
            "use crate::model::{Foo, Greet};\n\nimpl Greet for Foo {\n    fn hi(&self) { self.wave(); }\n}\n\nimpl Foo {\n    fn wave(&self) {}\n}\n",
        );

        let inherits = edge(&res, RelationshipType::Inherits, "crate::model::Greet");
        assert_eq!(inherits.src, "class:crate::model::Foo");
        assert_eq!(inherits.dst.as_deref(), Some("class:crate::model::Greet"));
        assert_eq!(inherits.file_path, "src/greet.rs");

        let ids: Vec<_> = res.nodes.iter().map(|n| n.id.as_str()).collect();
        assert!(ids.contains(&"method:crate::model::Foo::hi"), "{ids:?}");
        assert!(ids.contains(&"method:crate::model::Foo::wave"), "{ids:?}");
        assert!(!ids.iter().any(|id| id.starts_with("method:crate::greet::")));

        let wave = edge(&res, RelationshipType::Calls, "crate::model::Foo::wave");
        assert_eq!(wave.src, "method:crate::model::Foo::hi");
        assert_eq!(wave.dst.as_deref(), Some("method:crate::model::Foo::wave"));
    }

    #[test]
    fn trait_impl_waits_when_the_trait_is_not_indexed_yet() {
        let res = resolve(
            &SymbolTable::new(),
            "src/greet.rs",
            "use crate::model::{Foo, Greet};\n\nimpl Greet for Foo {\n    fn hi(&self) {}\n}\n",
        );
        let inherits = edge(&res, RelationshipType::Inherits, "crate::model::Greet");
        assert_eq!(inherits.src, "class:crate::model::Foo");
        assert_eq!(inherits.dst, None);
        assert!(res.unresolved.contains(&"crate::model::Greet".to_string()));
    }

    #[test]
    fn provenance_path_does_not_change_module_names() {
        let file = parse("pkg/m.py", "def f():\n    g()\n").with_file_path("/repo/pkg/m.py");
        let res = SymbolResolver::new(&SymbolTable::new())
            .resolve(&file)
            .unwrap();
        assert_eq!(res.module.id, "module:pkg.m");
        assert!(res.nodes.iter().all(|n| n.file_path == "/repo/pkg/m.py"));
        assert!(res.edges.iter().all(|e| e.file_path == "/repo/pkg/m.py"));
        let call = edge(&res, RelationshipType::Calls, "g");
        assert_eq!(
            call.id,
            Edge::edge_id(RelationshipType::Calls, "function:pkg.m.f", "g", "/repo/pkg/m.py")
        );
    }

    #[test]
    fn resolution_is_order_independent() {
        let forward = resolve(
            &SymbolTable::new(),
            "m.py",
            "def a():\n    b()\n\ndef b():\n    pass\n",
        );
        let call = edge(&forward, RelationshipType::Calls, "m.b");
        assert_eq!(call.dst.as_deref(), Some("function:m.b"));
    }

    #[test]
    fn symbol_table_remove_file() {
        let mut table = SymbolTable::new();
        let res = resolve(&SymbolTable::new(), "a.py", "def f():\n    pass\n");
        table.add_nodes(&res.nodes);
        assert_eq!(table.len(), 2);
        assert_eq!(table.by_name("f").unwrap().len(), 1);
        table.remove_file("a.py");
        assert!(table.is_empty());
        assert!(table.by_qualified_name("a.f").unwrap().is_empty());
    }
}
