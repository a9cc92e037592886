//! tree-sitter front end for Java sources.

use std::path::Path;

use crate::errors::{CallGraphError, CgResult};
use crate::indexer::lower::lower_unit;
use crate::indexer::syntax::CompilationUnit;

/// Parse Java source text into a concrete syntax tree.
pub fn parse_java(path: &Path, source: &str) -> CgResult<tree_sitter::Tree> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&tree_sitter_java::LANGUAGE.into())
        .map_err(|e| CallGraphError::Parse(format!("Failed to set language: {e}")))?;

    parser
        .parse(source.as_bytes(), None)
        .ok_or_else(|| CallGraphError::Parse(format!("Failed to parse {}", path.display())))
}

/// Parse and lower one compilation unit.
///
/// Syntax errors do not fail the call; the unit comes back with
/// `has_errors` set and whatever declarations tree-sitter recovered.
pub fn parse_unit(path: &Path, source: &str) -> CgResult<CompilationUnit> {
    let tree = parse_java(path, source)?;
    Ok(lower_unit(path, source, &tree))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unit_reads_types() {
        let unit = parse_unit(Path::new("A.java"), "package x; class A { void f() {} }").unwrap();
        assert_eq!(unit.types.len(), 1);
        assert_eq!(unit.types[0].name, "x.A");
    }

    #[test]
    fn test_parse_unit_recovers_from_errors() {
        let unit = parse_unit(Path::new("B.java"), "class B { void f( }").unwrap();
        assert!(unit.has_errors);
    }
}
