//! Tree-sitter parsing coordinator.
//!
//! Detects language from file extension, selects the appropriate extractor,
//! and runs fact extraction.

use crate::extractor::LanguageExtractor;
use crate::fact::{children, span_of, Fact};
use crate::languages;
use codegraph_core::{CodegraphError, Span};
use std::path::Path;
use tree_sitter::{Node, Parser};

/// Facts extracted from one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFile {
    /// Path to the parsed file, relative to the indexed root. Names the module.
    pub relative_path: String,
    /// Provenance recorded on nodes and edges. Starts out equal to
    /// `relative_path`; see [`ParsedFile::with_file_path`].
    pub file_path: String,
    /// Language that was detected and used.
    pub language: String,
    /// Qualified-name separator of the language.
    pub separator: &'static str,
    /// Facts in source order.
    pub facts: Vec<Fact>,
    /// Span of the whole file.
    pub span: Span,
}

impl ParsedFile {
    /// Record provenance under `file_path` (e.g. a root-scoped store path).
    pub fn with_file_path(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = file_path.into();
        self
    }

    /// The first recorded syntax error, if the tree had any.
    pub fn parse_error(&self) -> Option<&Fact> {
        self.facts
            .iter()
            .find(|f| f.kind == crate::fact::FactKind::ParseError)
    }
}

/// Result of parsing a single file.
#[derive(Debug)]
pub enum ParseOutcome {
    Parsed(ParsedFile),
    /// No extractor is registered for the file's extension.
    Unsupported,
    /// The file could not be parsed at all.
    Failed(CodegraphError),
}

/// Coordinates tree-sitter parsing across multiple languages.
pub struct CodeParser {
    extractors: Vec<Box<dyn LanguageExtractor>>,
}

impl CodeParser {
    /// Create a new CodeParser with all registered language extractors.
    pub fn new() -> Self {
        Self {
            extractors: languages::all_extractors(),
        }
    }

    /// Create a parser limited to the named languages.
    pub fn with_languages(languages: &[String]) -> Result<Self, CodegraphError> {
        let mut extractors = Vec::new();
        for extractor in languages::all_extractors() {
            if languages.iter().any(|l| l == extractor.language_name()) {
                extractors.push(extractor);
            }
        }
        if extractors.is_empty() {
            return Err(CodegraphError::Config(format!(
                "no language adapters match {languages:?}"
            )));
        }
        Ok(Self { extractors })
    }

    /// Parse a single file into facts.
    ///
    /// Trees with syntax errors still yield facts for their well-formed parts,
    /// plus one `ParseError` fact at the first error.
    pub fn parse(&self, path: &str, content: &[u8]) -> ParseOutcome {
        let Some(extractor) = self.extractor_for_path(path) else {
            return ParseOutcome::Unsupported;
        };

        if std::str::from_utf8(content).is_err() {
            return ParseOutcome::Failed(CodegraphError::Parse(format!(
                "{path}: content is not valid UTF-8"
            )));
        }

        let mut parser = Parser::new();
        if let Err(e) = parser.set_language(&extractor.tree_sitter_language()) {
            return ParseOutcome::Failed(CodegraphError::Parse(format!("{path}: {e}")));
        }
        let Some(tree) = parser.parse(content, None) else {
            return ParseOutcome::Failed(CodegraphError::Parse(format!(
                "{path}: parser produced no tree"
            )));
        };

        let root = tree.root_node();
        let mut facts = extractor.extract_facts(&tree, content);
        if root.has_error() {
            if let Some(error) = first_error(root) {
                let message = if error.is_missing() {
                    format!("missing {}", error.kind())
                } else {
                    "unexpected syntax".to_string()
                };
                let fact = Fact::parse_error(message, span_of(error));
                let at = facts.partition_point(|f| {
                    (f.span.start_line, f.span.start_col)
                        <= (fact.span.start_line, fact.span.start_col)
                });
                facts.insert(at, fact);
            }
        }

        ParseOutcome::Parsed(ParsedFile {
            relative_path: path.to_string(),
            file_path: path.to_string(),
            language: extractor.language_name().to_string(),
            separator: extractor.scope_separator(),
            facts,
            span: span_of(root),
        })
    }

    /// Language name for a path, if any extractor handles it.
    pub fn language_for(&self, path: &str) -> Option<&str> {
        self.extractor_for_path(path).map(|e| e.language_name())
    }

    /// Returns the list of all supported file extensions.
    pub fn supported_extensions(&self) -> Vec<&str> {
        self.extractors
            .iter()
            .flat_map(|e| e.file_extensions().iter().copied())
            .collect()
    }

    /// Check if a given file extension is supported.
    pub fn supports_extension(&self, ext: &str) -> bool {
        self.extractors
            .iter()
            .any(|e| e.file_extensions().contains(&ext))
    }

    fn extractor_for_path(&self, path: &str) -> Option<&dyn LanguageExtractor> {
        let extension = Path::new(path).extension().and_then(|ext| ext.to_str())?;
        self.extractors
            .iter()
            .find(|e| e.file_extensions().contains(&extension))
            .map(|e| e.as_ref())
    }
}

impl Default for CodeParser {
    fn default() -> Self {
        Self::new()
    }
}

/// First error or missing node in pre-order.
fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    children(node).into_iter().find_map(first_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fact::FactKind;
    use codegraph_core::NodeKind;

    fn parsed(outcome: ParseOutcome) -> ParsedFile {
        match outcome {
            ParseOutcome::Parsed(file) => file,
            other => panic!("expected Parsed, got {other:?}"),
        }
    }

    #[test]
    fn parse_rust_file() {
        let parser = CodeParser::new();
        let file = parsed(parser.parse("src/main.rs", b"pub fn hello() { greet(); }"));
        assert_eq!(file.language, "rust");
        assert_eq!(file.separator, "::");
        assert_eq!(file.facts.len(), 2);
        assert!(file.parse_error().is_none());
    }

    #[test]
    fn unsupported_extension_short_circuits() {
        let parser = CodeParser::new();
        assert!(matches!(
            parser.parse("file.xyz", b"some content"),
            ParseOutcome::Unsupported
        ));
        assert!(matches!(
            parser.parse("Makefile", b"all:"),
            ParseOutcome::Unsupported
        ));
    }

    #[test]
    fn invalid_utf8_fails() {
        let parser = CodeParser::new();
        match parser.parse("bad.py", &[0x64, 0x65, 0x66, 0xff, 0xfe]) {
            ParseOutcome::Failed(CodegraphError::Parse(msg)) => assert!(msg.contains("bad.py")),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn syntax_error_keeps_well_formed_facts() {
        let parser = CodeParser::new();
        let source = "def ok():\n    pass\n\ndef broken(:\n    pass\n\nclass Later:\n    pass\n";
        let file = parsed(parser.parse("m.py", source.as_bytes()));

        let error = file.parse_error().expect("a parse error fact");
        assert!(error.span.start_line >= 3);
        assert!(file
            .facts
            .iter()
            .any(|f| f.name == "ok" && f.kind == FactKind::Definition(NodeKind::Function)));

        // Still in source order after inserting the error fact.
        let starts: Vec<_> = file
            .facts
            .iter()
            .map(|f| (f.span.start_line, f.span.start_col))
            .collect();
        let mut sorted = starts.clone();
        sorted.sort();
        assert_eq!(starts, sorted);
    }

    #[test]
    fn with_languages_limits_extractors() {
        let parser = CodeParser::with_languages(&["python".to_string()]).unwrap();
        assert!(parser.supports_extension("pyi"));
        assert!(!parser.supports_extension("rs"));
        assert!(matches!(
            parser.parse("lib.rs", b"fn f() {}"),
            ParseOutcome::Unsupported
        ));

        let err = CodeParser::with_languages(&["cobol".to_string()]).err().unwrap();
        assert!(err.is_fatal());
    }

    #[test]
    fn language_for_path() {
        let parser = CodeParser::new();
        assert_eq!(parser.language_for("pkg/mod.pyi"), Some("python"));
        assert_eq!(parser.language_for("src/lib.rs"), Some("rust"));
        assert_eq!(parser.language_for("README.md"), None);
    }
}
