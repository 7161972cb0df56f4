//! Parser module for j--
//!
//! This module handles lexical analysis and parsing of .java sources into an AST.

pub mod lexer;
pub mod parser;
pub mod scanner;
pub mod span;

pub use lexer::{Lexer, LexicalToken, Token};
pub use parser::Parser;
pub use scanner::LookaheadScanner;
pub use span::Location;

use crate::ast::{CompilationUnit, Expr};
use crate::config::Config;
use crate::diagnostics::Diagnostics;

/// Parse a compilation unit, returning the tree and every lexical or
/// syntax error found on the way
pub fn parse_source(source: &str, file_name: &str, config: &Config) -> (CompilationUnit, Diagnostics) {
    let mut diagnostics = Diagnostics::new(file_name, config.max_errors);
    let unit = Parser::new(source, &mut diagnostics, config).compilation_unit();
    log::debug!(
        "parsed {}: {} type declaration(s), {} error(s)",
        file_name,
        unit.type_decls.len(),
        diagnostics.error_count()
    );
    (unit, diagnostics)
}

/// Parse a single expression
pub fn parse_expression(source: &str, config: &Config) -> (Expr, Diagnostics) {
    let mut diagnostics = Diagnostics::new("<expression>", config.max_errors);
    let expr = Parser::new(source, &mut diagnostics, config).expression();
    (expr, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TypeDecl;

    #[test]
    fn test_parse_simple_class() {
        let source = r#"
package com.example;

public class HelloWorld {
    public static void main(String[] args) {
        System.out.println("Hello, World!");
    }
}
"#;

        let (unit, diags) = parse_source(source, "HelloWorld.java", &Config::default());
        assert!(!diags.error_has_occurred());
        assert_eq!(unit.type_decls.len(), 1);
        assert_eq!(unit.package.as_ref().map(|p| p.to_string()).as_deref(), Some("com.example"));
    }

    #[test]
    fn test_parse_with_imports() {
        let source = r#"
import java.lang.Integer;
import java.lang.System;

public interface Shape extends Comparable {
    double area();
}
"#;

        let (unit, diags) = parse_source(source, "Shape.java", &Config::default());
        assert!(!diags.error_has_occurred());
        assert_eq!(unit.imports.len(), 2);
        assert!(matches!(unit.type_decls[0], TypeDecl::Interface(_)));
    }
}
