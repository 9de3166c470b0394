use std::path::Path;
use std::sync::LazyLock;

use tree_sitter::Language;

/// A source language with syntax-aware unit extraction.
pub struct LanguageConfig {
    pub name: &'static str,
    pub language: Language,
    pub extensions: &'static [&'static str],
    /// Node kinds that become syntax-unit chunks. Traversal never descends
    /// into a node of one of these kinds once it is claimed.
    pub unit_kinds: &'static [&'static str],
}

static LANGUAGES: LazyLock<Vec<LanguageConfig>> = LazyLock::new(|| {
    vec![
        go_config(),
        python_config(),
        typescript_config(),
        tsx_config(),
        javascript_config(),
        rust_config(),
    ]
});

impl LanguageConfig {
    pub fn get_all() -> &'static [LanguageConfig] {
        &LANGUAGES
    }

    pub fn get_by_extension(ext: &str) -> Option<&'static LanguageConfig> {
        let ext = ext.trim_start_matches('.');
        Self::get_all()
            .iter()
            .find(|c| c.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }

    pub fn is_unit_kind(&self, kind: &str) -> bool {
        self.unit_kinds.contains(&kind)
    }
}

/// Name of the syntax-aware language declared by a file's extension, if any.
pub fn language_for_path(path: &str) -> Option<&'static str> {
    let ext = Path::new(path).extension()?.to_str()?;
    LanguageConfig::get_by_extension(ext).map(|c| c.name)
}

/// Language label shown next to a search hit, derived from the extension.
///
/// Covers many more extensions than have syntax support; unknown ones
/// report `plaintext`.
pub fn detect_display_language(path: &str) -> &'static str {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "py" => "python",
        "js" | "mjs" | "cjs" => "javascript",
        "jsx" => "jsx",
        "ts" => "typescript",
        "tsx" => "tsx",
        "java" => "java",
        "cpp" | "cc" | "hpp" => "cpp",
        "c" | "h" => "c",
        "cs" => "csharp",
        "go" => "go",
        "rs" => "rust",
        "rb" => "ruby",
        "php" => "php",
        "html" => "html",
        "css" => "css",
        "scss" => "scss",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "md" => "markdown",
        "sql" => "sql",
        "sh" | "bash" => "bash",
        "xml" => "xml",
        _ => "plaintext",
    }
}

const JS_UNITS: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "arrow_function",
    "method_definition",
    "class_declaration",
];

const TS_UNITS: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "arrow_function",
    "method_definition",
    "class_declaration",
    "interface_declaration",
];

fn go_config() -> LanguageConfig {
    LanguageConfig {
        name: "go",
        language: tree_sitter_go::LANGUAGE.into(),
        extensions: &["go"],
        unit_kinds: &["function_declaration", "method_declaration"],
    }
}

fn python_config() -> LanguageConfig {
    LanguageConfig {
        name: "python",
        language: tree_sitter_python::LANGUAGE.into(),
        extensions: &["py"],
        unit_kinds: &["function_definition", "class_definition"],
    }
}

fn typescript_config() -> LanguageConfig {
    LanguageConfig {
        name: "typescript",
        language: tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        extensions: &["ts"],
        unit_kinds: TS_UNITS,
    }
}

fn tsx_config() -> LanguageConfig {
    LanguageConfig {
        name: "tsx",
        language: tree_sitter_typescript::LANGUAGE_TSX.into(),
        extensions: &["tsx"],
        unit_kinds: TS_UNITS,
    }
}

fn javascript_config() -> LanguageConfig {
    LanguageConfig {
        name: "javascript",
        language: tree_sitter_javascript::LANGUAGE.into(),
        extensions: &["js", "jsx", "mjs", "cjs"],
        unit_kinds: JS_UNITS,
    }
}

fn rust_config() -> LanguageConfig {
    LanguageConfig {
        name: "rust",
        language: tree_sitter_rust::LANGUAGE.into(),
        extensions: &["rs"],
        unit_kinds: &["function_item", "impl_item", "trait_item"],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_extension() {
        assert_eq!(LanguageConfig::get_by_extension("py").unwrap().name, "python");
        assert_eq!(LanguageConfig::get_by_extension(".TSX").unwrap().name, "tsx");
        assert_eq!(LanguageConfig::get_by_extension("jsx").unwrap().name, "javascript");
        assert!(LanguageConfig::get_by_extension("java").is_none());
    }

    #[test]
    fn test_lookup_shares_one_table() {
        let a = LanguageConfig::get_by_extension("go").unwrap();
        let b = LanguageConfig::get_by_extension("go").unwrap();
        assert!(std::ptr::eq(a, b));
        assert_eq!(LanguageConfig::get_all().len(), 6);
    }

    #[test]
    fn test_language_for_path() {
        assert_eq!(language_for_path("src/lib.rs"), Some("rust"));
        assert_eq!(language_for_path("cmd/main.go"), Some("go"));
        assert_eq!(language_for_path("README.md"), None);
        assert_eq!(language_for_path("Makefile"), None);
    }

    #[test]
    fn test_detect_display_language() {
        assert_eq!(detect_display_language("a/b.py"), "python");
        assert_eq!(detect_display_language("a/b.yml"), "yaml");
        assert_eq!(detect_display_language("a/B.HPP"), "cpp");
        assert_eq!(detect_display_language("LICENSE"), "plaintext");
    }

    #[test]
    fn test_every_grammar_loads() {
        for config in LanguageConfig::get_all() {
            let mut parser = tree_sitter::Parser::new();
            assert!(
                parser.set_language(&config.language).is_ok(),
                "grammar for {} should load",
                config.name
            );
        }
    }
}
