//! Module qualified names derived from file paths.

/// The module a source file defines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePath {
    /// e.g. `pkg.sub.m` or `crate::store`.
    pub qualified_name: String,
    /// Base for relative references: the Python package, or the Rust crate root.
    pub root: String,
    /// Python package containing the module (the module itself for `__init__`).
    pub package: String,
    pub separator: &'static str,
}

impl ModulePath {
    /// Derive the module for `path` (relative, `/`-separated) in `language`.
    pub fn for_file(path: &str, language: &str) -> Self {
        let path = path.replace('\\', "/");
        match language {
            "rust" => rust_module(&path),
            _ => python_module(&path),
        }
    }

    /// Last segment of the qualified name.
    pub fn name(&self) -> &str {
        self.qualified_name
            .rsplit(self.separator)
            .next()
            .unwrap_or(&self.qualified_name)
    }

    /// `self.qualified_name` joined with a relative path.
    pub fn child(&self, relative: &str) -> String {
        join(&self.qualified_name, relative, self.separator)
    }

    /// Turn an import path as written into an absolute qualified name.
    ///
    /// Python: leading dots are relative to the package. Rust: `crate`,
    /// `self` and `super` prefixes are relative to the crate root and module.
    pub fn absolutize(&self, target: &str) -> String {
        match self.separator {
            "::" => self.absolutize_rust(target),
            _ => self.absolutize_python(target),
        }
    }

    fn absolutize_python(&self, target: &str) -> String {
        let dots = target.chars().take_while(|c| *c == '.').count();
        if dots == 0 {
            return target.to_string();
        }
        let mut base = self.package.clone();
        for _ in 1..dots {
            base = parent(&base, ".").to_string();
        }
        join(&base, &target[dots..], ".")
    }

    fn absolutize_rust(&self, target: &str) -> String {
        let mut segments = target.split("::").peekable();
        let base = match segments.peek().copied() {
            Some("crate") => {
                segments.next();
                self.root.clone()
            }
            Some("self") => {
                segments.next();
                self.qualified_name.clone()
            }
            Some("super") => {
                let mut base = self.qualified_name.clone();
                while segments.peek() == Some(&"super") {
                    segments.next();
                    base = parent(&base, "::").to_string();
                }
                base
            }
            _ => return target.to_string(),
        };
        let rest: Vec<&str> = segments.collect();
        join(&base, &rest.join("::"), "::")
    }
}

fn python_module(path: &str) -> ModulePath {
    let without_ext = match path.rsplit_once('.') {
        Some((stem, ext)) if !ext.contains('/') => stem,
        _ => path,
    };
    let mut segments: Vec<&str> = without_ext
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    let is_package = segments.last() == Some(&"__init__") && segments.len() > 1;
    if is_package {
        segments.pop();
    }
    let qualified_name = segments.join(".");
    let package = if is_package {
        qualified_name.clone()
    } else {
        parent(&qualified_name, ".").to_string()
    };
    ModulePath {
        root: segments.first().map(|s| s.to_string()).unwrap_or_default(),
        qualified_name,
        package,
        separator: ".",
    }
}

fn rust_module(path: &str) -> ModulePath {
    let without_ext = path.strip_suffix(".rs").unwrap_or(path);
    let segments: Vec<&str> = without_ext.split('/').filter(|s| !s.is_empty()).collect();

    let (root, mut rest) = match segments.iter().rposition(|s| *s == "src") {
        Some(0) => ("crate".to_string(), segments[1..].to_vec()),
        // crates/foo-bar/src/x.rs -> foo_bar::x
        Some(i) => (segments[i - 1].replace('-', "_"), segments[i + 1..].to_vec()),
        None => ("crate".to_string(), segments.clone()),
    };
    if rest.last() == Some(&"mod") {
        rest.pop();
    }
    if rest.len() == 1 && matches!(rest[0], "lib" | "main") {
        rest.clear();
    }

    let qualified_name = std::iter::once(root.as_str())
        .chain(rest.iter().copied())
        .collect::<Vec<_>>()
        .join("::");
    ModulePath {
        package: parent(&qualified_name, "::").to_string(),
        qualified_name,
        root,
        separator: "::",
    }
}

fn parent<'a>(qualified: &'a str, separator: &str) -> &'a str {
    qualified
        .rsplit_once(separator)
        .map(|(parent, _)| parent)
        .unwrap_or("")
}

pub(crate) fn join(base: &str, relative: &str, separator: &str) -> String {
    match (base.is_empty(), relative.is_empty()) {
        (true, _) => relative.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{base}{separator}{relative}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_module_names() {
        let m = ModulePath::for_file("pkg/sub/m.py", "python");
        assert_eq!(m.qualified_name, "pkg.sub.m");
        assert_eq!(m.package, "pkg.sub");
        assert_eq!(m.name(), "m");

        let init = ModulePath::for_file("pkg/__init__.py", "python");
        assert_eq!(init.qualified_name, "pkg");
        assert_eq!(init.package, "pkg");

        let stub = ModulePath::for_file("pkg/sub/m.pyi", "python");
        assert_eq!(stub.qualified_name, "pkg.sub.m");

        assert_eq!(ModulePath::for_file("top.py", "python").qualified_name, "top");
    }

    #[test]
    fn python_relative_imports() {
        let m = ModulePath::for_file("pkg/sub/m.py", "python");
        assert_eq!(m.absolutize(".sibling"), "pkg.sub.sibling");
        assert_eq!(m.absolutize("..other.f"), "pkg.other.f");
        assert_eq!(m.absolutize("."), "pkg.sub");
        assert_eq!(m.absolutize("os.path"), "os.path");

        let init = ModulePath::for_file("pkg/__init__.py", "python");
        assert_eq!(init.absolutize(".core"), "pkg.core");
    }

    #[test]
    fn rust_module_names() {
        assert_eq!(
            ModulePath::for_file("src/lib.rs", "rust").qualified_name,
            "crate"
        );
        assert_eq!(
            ModulePath::for_file("src/main.rs", "rust").qualified_name,
            "crate"
        );
        assert_eq!(
            ModulePath::for_file("src/a.rs", "rust").qualified_name,
            "crate::a"
        );
        assert_eq!(
            ModulePath::for_file("src/a/mod.rs", "rust").qualified_name,
            "crate::a"
        );
        assert_eq!(
            ModulePath::for_file("src/a/b.rs", "rust").qualified_name,
            "crate::a::b"
        );
        let member = ModulePath::for_file("crates/my-store/src/lib.rs", "rust");
        assert_eq!(member.qualified_name, "my_store");
        assert_eq!(member.root, "my_store");
    }

    #[test]
    fn rust_relative_paths() {
        let m = ModulePath::for_file("src/a/b.rs", "rust");
        assert_eq!(m.absolutize("crate::x::Y"), "crate::x::Y");
        assert_eq!(m.absolutize("self::inner::f"), "crate::a::b::inner::f");
        assert_eq!(m.absolutize("super::c"), "crate::a::c");
        assert_eq!(m.absolutize("super::super::top"), "crate::top");
        assert_eq!(m.absolutize("std::fmt"), "std::fmt");

        let member = ModulePath::for_file("crates/core/src/types.rs", "rust");
        assert_eq!(member.absolutize("crate::error::E"), "core::error::E");
    }
}
