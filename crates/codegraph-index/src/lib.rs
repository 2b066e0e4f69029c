//! codegraph-index: Tree-sitter based fact extraction and symbol resolution.
//!
//! Turns a source file into structural facts (definitions, calls, imports,
//! bases, references) and resolves those facts into graph nodes and edges
//! with stable, qualified identities.
//!
//! # Architecture
//!
//! - **parser**: Tree-sitter parsing coordinator that dispatches to language extractors
//! - **extractor**: Trait for per-language fact extraction
//! - **languages**: Language-specific extractors (Python, Rust)
//! - **fact**: The fact model shared by extractors and the resolver
//! - **module_path**: Module qualified names derived from file paths
//! - **resolver**: Normalizes facts into nodes/edges and resolves references
//! - **incremental**: SHA-256 content fingerprints and change detection

pub mod extractor;
pub mod fact;
pub mod incremental;
pub mod languages;
pub mod module_path;
pub mod parser;
pub mod resolver;

pub use extractor::LanguageExtractor;
pub use fact::{Fact, FactKind};
pub use incremental::{fingerprint, ChangeDetector};
pub use module_path::ModulePath;
pub use parser::{CodeParser, ParseOutcome, ParsedFile};
pub use resolver::{Resolution, SymbolEntry, SymbolIndex, SymbolResolver, SymbolTable};
