//! LanguageExtractor trait for per-language fact extraction from tree-sitter ASTs.

use crate::fact::Fact;

/// Trait for per-language fact extraction from tree-sitter ASTs.
///
/// Each supported language implements this trait. Extraction must be
/// deterministic: facts are returned in source order (depth-first, pre-order).
pub trait LanguageExtractor: Send + Sync {
    /// Returns the human-readable language name (e.g., "rust", "python").
    fn language_name(&self) -> &str;

    /// Returns the file extensions this extractor handles (e.g., &["rs"] for Rust).
    fn file_extensions(&self) -> &[&str];

    /// Returns the tree-sitter Language for configuring the parser.
    fn tree_sitter_language(&self) -> tree_sitter::Language;

    /// Separator used when joining qualified names (`.` or `::`).
    fn scope_separator(&self) -> &'static str;

    /// Extract all facts from a parsed tree-sitter AST.
    fn extract_facts(&self, tree: &tree_sitter::Tree, source: &[u8]) -> Vec<Fact>;
}
