//! Source text introspection: declared package and primary type name.

use once_cell::sync::Lazy;
use regex::Regex;

static PACKAGE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"package (.*?);").expect("valid package pattern"));

static EXTENDS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"public class (.*) extends").expect("valid extends pattern"));

static IMPLEMENTS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"public class (.*) implements").expect("valid implements pattern"));

static IMPORT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"import (.*?);").expect("valid import pattern"));

fn first_capture(pattern: &Regex, src: &str) -> Option<String> {
    pattern
        .captures(src)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Declared package of the source, if any.
pub fn package_name(src: &str) -> Option<String> {
    first_capture(&PACKAGE_PATTERN, src)
}

/// Name of the first public class that extends, or failing that implements,
/// another type.
pub fn class_name(src: &str) -> Option<String> {
    first_capture(&EXTENDS_PATTERN, src).or_else(|| first_capture(&IMPLEMENTS_PATTERN, src))
}

/// Package qualified class name. `None` when no class declaration matches.
pub fn full_class_name(src: &str) -> Option<String> {
    let class_name = class_name(src)?;
    Some(match package_name(src) {
        Some(package) => format!("{package}.{class_name}"),
        None => class_name,
    })
}

/// Every symbol named by an import declaration, in source order.
pub fn imports(src: &str) -> Vec<String> {
    IMPORT_PATTERN
        .captures_iter(src)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|symbol| !symbol.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_full_class_name_with_package() {
        let src = "package p; public class Foo implements Bar {}";
        assert_eq!(package_name(src).as_deref(), Some("p"));
        assert_eq!(class_name(src).as_deref(), Some("Foo"));
        assert_eq!(full_class_name(src).as_deref(), Some("p.Foo"));
    }

    #[test]
    fn test_full_class_name_without_package() {
        let src = "public class Foo extends Bar {}";
        assert_eq!(package_name(src), None);
        assert_eq!(full_class_name(src).as_deref(), Some("Foo"));
    }

    #[test]
    fn test_extends_takes_precedence() {
        let src = r#"
            package org.acme.scripts;

            public class Helper implements Runnable {}
            public class Main extends Script {}
        "#;
        assert_eq!(class_name(src).as_deref(), Some("Main"));
        assert_eq!(
            full_class_name(src).as_deref(),
            Some("org.acme.scripts.Main")
        );
    }

    #[test]
    fn test_multiline_source() {
        let src = "package  a.b ;\n\nimport x.y.Z;\n\npublic class Thing extends Base {\n}\n";
        assert_eq!(full_class_name(src).as_deref(), Some("a.b.Thing"));
    }

    #[test]
    fn test_no_declaration_returns_none() {
        assert_eq!(full_class_name("class Hidden {}"), None);
        assert_eq!(full_class_name(""), None);
        assert_eq!(full_class_name("package p;"), None);
    }

    #[test]
    fn test_imports() {
        let src = "import a.B;\nimport  c.d.E ;\nimport static f.G.h;\n";
        assert_eq!(imports(src), vec!["a.B", "c.d.E", "static f.G.h"]);
    }

    proptest! {
        #[test]
        fn prop_sources_without_public_class_yield_none(src in "[a-z ;{}\\n.]{0,200}") {
            prop_assume!(!src.contains("public class"));
            prop_assert_eq!(full_class_name(&src), None);
        }

        #[test]
        fn prop_introspection_never_panics(src in ".{0,300}") {
            let _ = full_class_name(&src);
            let _ = imports(&src);
        }
    }
}
