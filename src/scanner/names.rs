// src/scanner/names.rs

//! Best-effort extraction of a file's primary component name
//!
//! Finds the first top-level declaration (class, function, struct,
//! component) for a handful of languages. Purely informational; `None`
//! is always an acceptable answer.

use regex::Regex;
use std::sync::LazyLock;

static RUST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?(?:struct|enum|trait|fn)\s+([A-Za-z_][A-Za-z0-9_]*)")
        .unwrap()
});

static PYTHON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(?:class|def)\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap());

static JS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:export\s+)?(?:default\s+)?(?:class|function)\s+([A-Za-z_$][A-Za-z0-9_$]*)")
        .unwrap()
});

static GO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(?:func|type)\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap());

/// Extract the primary component name for a file of the given type.
pub fn extract_component_name(type_name: &str, text: &str) -> Option<String> {
    let regex = match type_name {
        "rust" => &*RUST_RE,
        "python" => &*PYTHON_RE,
        "javascript" | "typescript" => &*JS_RE,
        "go" => &*GO_RE,
        _ => return None,
    };

    regex
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rust_declarations() {
        assert_eq!(
            extract_component_name("rust", "pub struct Engine {\n}\n"),
            Some("Engine".to_string())
        );
        assert_eq!(
            extract_component_name("rust", "fn main() {}\n"),
            Some("main".to_string())
        );
    }

    #[test]
    fn test_python_class_and_def() {
        assert_eq!(
            extract_component_name("python", "import os\n\nclass Worker:\n    pass\n"),
            Some("Worker".to_string())
        );
        assert_eq!(
            extract_component_name("python", "def handler(event):\n    return 1\n"),
            Some("handler".to_string())
        );
        // Indented defs are not top-level.
        assert_eq!(extract_component_name("python", "    def inner():\n"), None);
    }

    #[test]
    fn test_javascript_exports() {
        assert_eq!(
            extract_component_name("javascript", "export default class App {}\n"),
            Some("App".to_string())
        );
        assert_eq!(
            extract_component_name("typescript", "export function render() {}\n"),
            Some("render".to_string())
        );
    }

    #[test]
    fn test_unknown_language_is_none() {
        assert_eq!(extract_component_name("markdown", "# Title\n"), None);
    }
}
