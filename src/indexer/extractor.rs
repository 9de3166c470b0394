//! Syntax-aware unit extraction behind a capability interface.
//!
//! [`TreeSitterSupport`] walks a parsed tree with an explicit stack and
//! claims whole functions, methods and classes; a claimed node is never
//! descended into, so nested definitions are not duplicated.
//! [`NullSupport`] is the always-available fallback that claims nothing.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;
use tree_sitter::{Node, Parser};

use super::languages::LanguageConfig;
use crate::error::{Error, Result};

/// One syntactic unit, with a 0-indexed inclusive line range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxUnit {
    /// Grammar node kind, e.g. `function_definition`.
    pub kind: String,
    pub start_line: usize,
    pub end_line: usize,
}

/// Capability set for syntax-aware extraction, dispatched by file extension.
pub trait LanguageSupport: Send + Sync {
    /// Whether units can be extracted from files with this extension.
    fn can_extract(&self, ext: &str) -> bool;

    /// Extract pairwise disjoint units in line order.
    fn extract(&self, ext: &str, source: &str) -> Result<Vec<SyntaxUnit>>;
}

/// Claims nothing; every file goes straight to fallback windowing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSupport;

impl LanguageSupport for NullSupport {
    fn can_extract(&self, _ext: &str) -> bool {
        false
    }

    fn extract(&self, _ext: &str, _source: &str) -> Result<Vec<SyntaxUnit>> {
        Ok(Vec::new())
    }
}

/// Cache of idle tree-sitter parsers per language.
///
/// Parsers are checked out for one parse and returned afterwards, so
/// concurrent workers never share a parser. `clear` drops every idle parser.
#[derive(Default)]
pub struct ParserPool {
    idle: Mutex<HashMap<&'static str, Vec<Parser>>>,
}

impl ParserPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn checkout(&self, config: &LanguageConfig) -> Result<Parser> {
        let cached = self
            .idle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(config.name)
            .and_then(Vec::pop);
        if let Some(parser) = cached {
            return Ok(parser);
        }

        let mut parser = Parser::new();
        parser
            .set_language(&config.language)
            .map_err(|e| Error::Parse(format!("cannot load {} grammar: {e}", config.name)))?;
        Ok(parser)
    }

    fn checkin(&self, name: &'static str, parser: Parser) {
        self.idle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(name)
            .or_default()
            .push(parser);
    }

    /// Number of parsers currently idle in the pool.
    pub fn idle_count(&self) -> usize {
        self.idle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(Vec::len)
            .sum()
    }

    pub fn clear(&self) {
        self.idle.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// Tree-sitter backed extraction for every language in [`LanguageConfig`].
#[derive(Default)]
pub struct TreeSitterSupport {
    pool: ParserPool,
}

impl TreeSitterSupport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pool(&self) -> &ParserPool {
        &self.pool
    }
}

impl LanguageSupport for TreeSitterSupport {
    fn can_extract(&self, ext: &str) -> bool {
        LanguageConfig::get_by_extension(ext).is_some()
    }

    fn extract(&self, ext: &str, source: &str) -> Result<Vec<SyntaxUnit>> {
        let config = LanguageConfig::get_by_extension(ext)
            .ok_or_else(|| Error::Parse(format!("no grammar for extension '{ext}'")))?;

        let mut parser = self.pool.checkout(config)?;
        let tree = parser.parse(source, None);
        if tree.is_none() {
            parser.reset();
        }
        self.pool.checkin(config.name, parser);

        let tree = tree.ok_or_else(|| Error::Parse(format!("{} parser produced no tree", config.name)))?;
        let root = tree.root_node();
        if root.has_error() {
            debug!("{} source contains syntax errors; erroneous units are left to fallback", config.name);
        }

        Ok(UnitWalk::new(root, config, source.lines().count()).collect())
    }
}

/// Pre-order worklist traversal yielding claimed units lazily.
struct UnitWalk<'t, 'a> {
    stack: Vec<Node<'t>>,
    config: &'a LanguageConfig,
    line_count: usize,
    last_end: Option<usize>,
}

impl<'t, 'a> UnitWalk<'t, 'a> {
    fn new(root: Node<'t>, config: &'a LanguageConfig, line_count: usize) -> Self {
        Self {
            stack: vec![root],
            config,
            line_count,
            last_end: None,
        }
    }

    fn line_span(&self, node: &Node<'_>) -> Option<(usize, usize)> {
        let last_line = self.line_count.checked_sub(1)?;
        let start = node.start_position().row;
        let end_point = node.end_position();
        // A node that stops at column 0 ended on the previous line's newline.
        let end = if end_point.column == 0 && end_point.row > start {
            end_point.row - 1
        } else {
            end_point.row
        };
        if start > last_line {
            return None;
        }
        Some((start, end.min(last_line)))
    }
}

impl Iterator for UnitWalk<'_, '_> {
    type Item = SyntaxUnit;

    fn next(&mut self) -> Option<SyntaxUnit> {
        while let Some(node) = self.stack.pop() {
            if self.config.is_unit_kind(node.kind()) {
                // Claimed or rejected, a unit's subtree is never visited.
                if node.has_error() {
                    continue;
                }
                let Some((start, end)) = self.line_span(&node) else {
                    continue;
                };
                if self.last_end.is_some_and(|prev| start <= prev) {
                    debug!(
                        "dropping {} at line {start}: shares a line with the previous unit",
                        node.kind()
                    );
                    continue;
                }
                self.last_end = Some(end);
                return Some(SyntaxUnit {
                    kind: node.kind().to_string(),
                    start_line: start,
                    end_line: end,
                });
            }

            let mut cursor = node.walk();
            let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
            self.stack.extend(children.into_iter().rev());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans(units: &[SyntaxUnit]) -> Vec<(usize, usize, &str)> {
        units
            .iter()
            .map(|u| (u.start_line, u.end_line, u.kind.as_str()))
            .collect()
    }

    #[test]
    fn test_python_class_claims_its_methods() {
        let support = TreeSitterSupport::new();
        let source = "import os\n\nclass Greeter:\n    def hello(self):\n        def inner():\n            pass\n        return 1\n\ndef top():\n    return 2\n";

        let units = support.extract("py", source).unwrap();

        assert_eq!(
            spans(&units),
            vec![(2, 6, "class_definition"), (8, 9, "function_definition")]
        );
    }

    #[test]
    fn test_rust_impl_is_one_unit() {
        let support = TreeSitterSupport::new();
        let source = "struct S;\n\nimpl S {\n    fn a(&self) {}\n    fn b(&self) {}\n}\n\nfn free() {\n    let _ = 1;\n}\n";

        let units = support.extract("rs", source).unwrap();

        assert_eq!(
            spans(&units),
            vec![(2, 5, "impl_item"), (7, 9, "function_item")]
        );
    }

    #[test]
    fn test_javascript_units() {
        let support = TreeSitterSupport::new();
        let source = "const x = 1;\nfunction add(a, b) {\n  return a + b;\n}\nconst mul = (a, b) => {\n  return a * b;\n};\n";

        let units = support.extract("js", source).unwrap();

        assert_eq!(units.len(), 2);
        assert_eq!((units[0].start_line, units[0].end_line), (1, 3));
        assert_eq!(units[0].kind, "function_declaration");
        assert_eq!((units[1].start_line, units[1].end_line), (4, 6));
        assert_eq!(units[1].kind, "arrow_function");
    }

    #[test]
    fn test_units_sharing_a_line_are_not_both_claimed() {
        let support = TreeSitterSupport::new();
        let source = "const a = () => 1, b = () => 2;\n";

        let units = support.extract("js", source).unwrap();

        assert_eq!(units.len(), 1);
        assert_eq!((units[0].start_line, units[0].end_line), (0, 0));
    }

    #[test]
    fn test_units_are_disjoint_and_ordered() {
        let support = TreeSitterSupport::new();
        let source = "package main\n\nfunc a() {\n}\n\nfunc (s *S) b() {\n\tfunc() {}()\n}\n";

        let units = support.extract("go", source).unwrap();

        assert_eq!(units.len(), 2);
        for pair in units.windows(2) {
            assert!(pair[0].end_line < pair[1].start_line);
        }
    }

    #[test]
    fn test_erroneous_unit_is_not_claimed() {
        let support = TreeSitterSupport::new();
        let source = "def ok():\n    return 1\n\ndef broken(:\n    pass\n";

        let units = support.extract("py", source).unwrap();

        assert!(units.iter().all(|u| u.end_line < 3 || u.start_line > 3));
    }

    #[test]
    fn test_unknown_extension_is_parse_error() {
        let support = TreeSitterSupport::new();
        assert!(!support.can_extract("java"));
        assert!(matches!(support.extract("java", "class A {}"), Err(Error::Parse(_))));
    }

    #[test]
    fn test_empty_source_yields_nothing() {
        let support = TreeSitterSupport::new();
        assert!(support.extract("py", "").unwrap().is_empty());
    }

    #[test]
    fn test_parser_pool_reuses_parsers() {
        let support = TreeSitterSupport::new();
        assert_eq!(support.pool().idle_count(), 0);

        support.extract("py", "def f():\n    pass\n").unwrap();
        support.extract("py", "def g():\n    pass\n").unwrap();
        assert_eq!(support.pool().idle_count(), 1);

        support.extract("rs", "fn f() {}\n").unwrap();
        assert_eq!(support.pool().idle_count(), 2);

        support.pool().clear();
        assert_eq!(support.pool().idle_count(), 0);
    }

    #[test]
    fn test_null_support() {
        let support = NullSupport;
        assert!(!support.can_extract("py"));
        assert!(support.extract("py", "def f(): pass").unwrap().is_empty());
    }
}
