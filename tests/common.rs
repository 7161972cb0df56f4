// Common test utilities
#![allow(dead_code)]

use jmmc::ast::*;
use jmmc::codegen::{ClassOutput, Code};
use jmmc::config::Config;
use jmmc::diagnostics::Diagnostics;
use jmmc::parser::parse_source;
use jmmc::wash::analyze;

/// Route `log` output through the test harness
pub fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

/// Parse and analyze a unit, asserting it parsed cleanly
pub fn analyze_source(source: &str) -> (CompilationUnit, Diagnostics) {
    let (unit, mut diags) = parse_source(source, "T.java", &Config::default());
    assert!(!diags.error_has_occurred(), "syntax errors: {:?}", diags.entries());
    let (unit, _) = analyze(unit, &mut diags);
    (unit, diags)
}

pub fn class_named<'u>(unit: &'u CompilationUnit, name: &str) -> &'u ClassDecl {
    unit.type_decls
        .iter()
        .find_map(|t| match t {
            TypeDecl::Class(c) if c.name == name => Some(c),
            _ => None,
        })
        .unwrap_or_else(|| panic!("class {} not found", name))
}

pub fn method_named<'u>(class: &'u ClassDecl, name: &str) -> &'u MethodDecl {
    class
        .members
        .iter()
        .find_map(|m| match m {
            Member::Method(m) if m.name == name => Some(m),
            _ => None,
        })
        .unwrap_or_else(|| panic!("method {} not found", name))
}

/// Expression of the first `return` in the body of `name`
pub fn returned_expr<'u>(class: &'u ClassDecl, name: &str) -> &'u Expr {
    let body = method_named(class, name).body.as_ref().expect("method body missing");
    body.statements
        .iter()
        .find_map(|s| match &s.kind {
            StmtKind::Return(Some(expr)) => Some(expr),
            _ => None,
        })
        .expect("no return with a value")
}

pub fn compile_source(source: &str) -> Vec<ClassOutput> {
    init_logging();
    match jmmc::compile(source, "T.java", &Config::default()) {
        Ok(classes) => classes,
        Err(err) => panic!("compilation failed: {:?}", err.diagnostics()),
    }
}

pub fn code_of<'c>(classes: &'c [ClassOutput], class: &str, method: &str) -> &'c Code {
    classes
        .iter()
        .find(|c| c.simple_name() == class)
        .unwrap_or_else(|| panic!("class {} not generated", class))
        .method(method)
        .unwrap_or_else(|| panic!("method {} not generated", method))
        .code
        .as_ref()
        .expect("method has no code")
}
