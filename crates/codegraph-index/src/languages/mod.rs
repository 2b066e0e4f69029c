//! Language registry for code indexing.
//!
//! Each language implements the `LanguageExtractor` trait and is registered here.

pub mod python;
pub mod rust;

use crate::extractor::LanguageExtractor;

/// Returns all available language extractors.
pub fn all_extractors() -> Vec<Box<dyn LanguageExtractor>> {
    vec![
        Box::new(python::PythonExtractor::new()),
        Box::new(rust::RustExtractor::new()),
    ]
}

/// Find an extractor for a given file extension.
pub fn extractor_for_extension(ext: &str) -> Option<Box<dyn LanguageExtractor>> {
    all_extractors()
        .into_iter()
        .find(|extractor| extractor.file_extensions().contains(&ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_rust_extractor() {
        let ext = extractor_for_extension("rs");
        assert!(ext.is_some());
        assert_eq!(ext.unwrap().language_name(), "rust");
    }

    #[test]
    fn finds_python_extractor_for_stubs() {
        for extension in ["py", "pyi"] {
            let ext = extractor_for_extension(extension);
            assert_eq!(ext.unwrap().language_name(), "python");
        }
    }

    #[test]
    fn returns_none_for_unknown() {
        assert!(extractor_for_extension("ts").is_none());
        assert!(extractor_for_extension("xyz").is_none());
    }
}
