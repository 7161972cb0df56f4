use jmmc::ast::*;
use jmmc::config::Config;
use jmmc::consts::DEFAULT_MAX_DEPTH;
use jmmc::diagnostics::DiagnosticKind;
use jmmc::parser::{parse_expression, parse_source};

#[test]
fn parse_precedence_tree() {
    let (expr, diags) = parse_expression("3 + 4 * 2", &Config::default());
    assert!(!diags.error_has_occurred());
    let ExprKind::Binary { op: BinaryOp::Add, lhs, rhs } = expr.kind else {
        panic!("root should be +");
    };
    assert!(matches!(lhs.kind, ExprKind::Literal(Literal::Int(ref v)) if v == "3"));
    assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
}

#[test]
fn parse_simple_class_with_main() {
    let source = r#"
package com.example;

import java.lang.Math;

public class HelloWorld {
    public static void main(String[] args) {
        System.out.println("Hello, World!");
    }
}
"#;
    let (unit, diags) = parse_source(source, "HelloWorld.java", &Config::default());
    assert!(!diags.error_has_occurred(), "{:?}", diags.entries());
    assert_eq!(unit.package.as_ref().map(|p| p.internal_name()), Some("com/example".to_string()));
    assert_eq!(unit.imports.len(), 1);
    assert_eq!(unit.type_decls.len(), 1);
    assert_eq!(unit.type_decls[0].name(), "HelloWorld");
}

#[test]
fn missing_semicolon_reports_once_and_reaches_end() {
    let source = r#"
class A {
    void m() {
        int x;
        x = 1
        x = 2;
    }
    void n() { }
}
"#;
    let (unit, diags) = parse_source(source, "A.java", &Config::default());
    assert_eq!(diags.error_count(), 1, "{:?}", diags.entries());
    let entry = &diags.entries()[0];
    assert_eq!(entry.kind, DiagnosticKind::Syntax);
    assert_eq!(entry.line, 6);
    assert!(entry.to_string().starts_with("A.java:6: "));

    // The rest of the unit is still there
    let TypeDecl::Class(class) = &unit.type_decls[0] else {
        panic!("expected class");
    };
    assert_eq!(class.members.len(), 2);
}

#[test]
fn garbage_input_terminates() {
    let (_, diags) = parse_source("class { ) ( ; int int", "G.java", &Config::default());
    assert!(diags.error_has_occurred());
}

#[test]
fn error_cap_limits_stored_diagnostics() {
    let source = "class A { void m() { x = 1 y = 2; } void n() { a = 1 b = 2; } }";
    let config = Config::default().with_max_errors(1);
    let (_, diags) = parse_source(source, "A.java", &config);
    assert_eq!(diags.entries().len(), 1);
    assert!(diags.error_count() >= 2);
}

#[test]
fn switch_and_try_statements() {
    let source = r#"
class A {
    void m(int x) {
        switch (x) {
            case 1:
            case 2:
                x++;
            default:
                break;
        }
        try {
            x = 1;
        } catch (Exception e) {
            x = 2;
        } finally {
            x = 3;
        }
    }
}
"#;
    let (unit, diags) = parse_source(source, "A.java", &Config::default());
    assert!(!diags.error_has_occurred(), "{:?}", diags.entries());
    let TypeDecl::Class(class) = &unit.type_decls[0] else {
        panic!("expected class");
    };
    let Member::Method(method) = &class.members[0] else {
        panic!("expected method");
    };
    let body = method.body.as_ref().expect("body");
    assert!(matches!(&body.statements[0].kind, StmtKind::Switch { groups, .. } if groups.len() == 2));
    assert!(matches!(
        &body.statements[1].kind,
        StmtKind::Try { catches, finally: Some(_), .. } if catches.len() == 1
    ));
}

fn method_returning(expr: &str) -> String {
    format!("class T {{ int m() {{ return {}; }} }}", expr)
}

fn nested_parens(levels: usize) -> String {
    format!("{}1{}", "(".repeat(levels), ")".repeat(levels))
}

fn long_sum(terms: usize) -> String {
    vec!["1"; terms].join(" + ")
}

fn depth_errors(source: &str) -> Vec<jmmc::Diagnostic> {
    match jmmc::compile(source, "T.java", &Config::default()) {
        Ok(_) => Vec::new(),
        Err(err) => err.diagnostics().to_vec(),
    }
}

// A return operand sits two levels down (statement, expression) and each
// paren adds an expression and a unary level
#[test]
fn nested_parens_up_to_the_depth_bound_compile() {
    let fits = (DEFAULT_MAX_DEPTH - 3) / 2;
    let errors = depth_errors(&method_returning(&nested_parens(fits)));
    assert!(errors.is_empty(), "{:?}", errors);
}

#[test]
fn nested_parens_past_the_depth_bound_report_once() {
    let fits = (DEFAULT_MAX_DEPTH - 3) / 2;
    let errors = depth_errors(&method_returning(&nested_parens(fits + 1)));
    assert_eq!(errors.len(), 1, "{:?}", errors);
    assert_eq!(errors[0].kind, DiagnosticKind::Syntax);
    assert!(errors[0].message.contains("Nesting deeper"));
}

#[test]
fn long_sum_up_to_the_depth_bound_compiles() {
    let errors = depth_errors(&method_returning(&long_sum(DEFAULT_MAX_DEPTH - 2)));
    assert!(errors.is_empty(), "{:?}", errors);
}

#[test]
fn long_sum_past_the_depth_bound_reports_once() {
    let errors = depth_errors(&method_returning(&long_sum(DEFAULT_MAX_DEPTH - 1)));
    assert_eq!(errors.len(), 1, "{:?}", errors);
    assert!(errors[0].message.contains("Nesting deeper"));
}

#[test]
fn very_long_chains_stop_at_one_error() {
    let errors = depth_errors(&method_returning(&long_sum(5_000)));
    assert_eq!(errors.len(), 1, "{:?}", errors);

    let call_chain = format!("\"s\"{}", ".trim()".repeat(5_000));
    let (_, diags) = parse_expression(&call_chain, &Config::default());
    assert_eq!(diags.error_count(), 1);
}
