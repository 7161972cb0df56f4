mod common;

use common::{analyze_source, class_named, method_named, returned_expr};
use jmmc::ast::*;
use jmmc::diagnostics::DiagnosticKind;

#[test]
fn precedence_root_is_int() {
    let (unit, diags) = analyze_source("class T { int m() { return 3 + 4 * 2; } }");
    assert!(!diags.error_has_occurred(), "{:?}", diags.entries());
    let expr = returned_expr(class_named(&unit, "T"), "m");
    assert_eq!(expr.ty(), &Type::Int);
    let ExprKind::Binary { op: BinaryOp::Add, rhs, .. } = &expr.kind else {
        panic!("root should be +, got {:?}", expr.kind);
    };
    assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
    assert_eq!(rhs.ty(), &Type::Int);
}

#[test]
fn string_plus_becomes_concatenation() {
    let (unit, diags) = analyze_source("class T { String m(String s) { return s + 1; } }");
    assert!(!diags.error_has_occurred(), "{:?}", diags.entries());
    let expr = returned_expr(class_named(&unit, "T"), "m");
    assert!(matches!(expr.kind, ExprKind::StringConcat { .. }));
    assert_eq!(expr.ty(), &Type::String);
}

#[test]
fn int_plus_is_not_rewritten() {
    let (unit, diags) = analyze_source("class T { int m() { return 1 + 2; } }");
    assert!(!diags.error_has_occurred(), "{:?}", diags.entries());
    let expr = returned_expr(class_named(&unit, "T"), "m");
    assert!(matches!(expr.kind, ExprKind::Binary { op: BinaryOp::Add, .. }));
    assert_eq!(expr.ty(), &Type::Int);
}

#[test]
fn mixed_operand_types_report_once_and_yield_any() {
    let (unit, diags) = analyze_source("class T { double m(int i, double d) { return i - d; } }");
    assert_eq!(diags.error_count(), 1, "{:?}", diags.entries());
    assert_eq!(diags.count_of(DiagnosticKind::Semantic), 1);
    let expr = returned_expr(class_named(&unit, "T"), "m");
    assert_eq!(expr.ty(), &Type::Any);
}

#[test]
fn any_suppresses_cascading_errors() {
    let (_, diags) = analyze_source("class T { void m(int i, double d) { int r; r = (i - d) * 2 + undefined; } }");
    // The mismatch and the unknown name, nothing for the operators above them
    assert_eq!(diags.error_count(), 2, "{:?}", diags.entries());
}

#[test]
fn forward_references_resolve_across_members() {
    let source = r#"
class T {
    int first() { return second() + count; }
    int second() { return new Helper().value(); }
    int count;
}

class Helper {
    int value() { return 7; }
}
"#;
    let (unit, diags) = analyze_source(source);
    assert!(!diags.error_has_occurred(), "{:?}", diags.entries());
    let expr = returned_expr(class_named(&unit, "T"), "first");
    let ExprKind::Binary { lhs, rhs, .. } = &expr.kind else {
        panic!("expected +");
    };
    assert!(matches!(&lhs.kind, ExprKind::MessageSend { method: Some(_), .. }));
    assert!(matches!(&rhs.kind, ExprKind::FieldSelection { field: Some(_), .. }));
}

#[test]
fn names_resolve_to_locals_with_slots() {
    let (unit, diags) = analyze_source("class T { static long m(int a, long b) { long c = a; return b + c; } }");
    assert!(!diags.error_has_occurred(), "{:?}", diags.entries());
    let class = class_named(&unit, "T");
    let method = method_named(class, "m");
    assert_eq!(method.locals, 5);

    // `a` is widened to long explicitly
    let body = method.body.as_ref().expect("body");
    let StmtKind::LocalVariables(declarators) = &body.statements[0].kind else {
        panic!("expected a local declaration");
    };
    assert_eq!(declarators[0].slot, Some(3));
    let init = declarators[0].initializer.as_ref().expect("initializer");
    let ExprKind::Cast { target: Type::Long, expr: inner } = &init.kind else {
        panic!("expected a widening cast, got {:?}", init.kind);
    };
    assert!(matches!(inner.kind, ExprKind::Local { slot: 0, .. }));

    let expr = returned_expr(class, "m");
    let ExprKind::Binary { lhs, rhs, .. } = &expr.kind else {
        panic!("expected +");
    };
    assert!(matches!(lhs.kind, ExprKind::Local { slot: 1, .. }));
    assert!(matches!(rhs.kind, ExprKind::Local { slot: 3, .. }));
}

#[test]
fn mixed_width_arithmetic_is_rejected() {
    let (_, diags) = analyze_source("class T { long m(long b, int c) { return b + c; } }");
    assert_eq!(diags.error_count(), 1, "{:?}", diags.entries());
}

#[test]
fn incompatible_assignment_is_reported() {
    let (_, diags) = analyze_source("class T { void m() { int x; x = \"text\"; } }");
    assert_eq!(diags.error_count(), 1);
    assert!(diags.entries()[0].message.contains("doesn't match"));
}

#[test]
fn unknown_method_is_reported() {
    let (_, diags) = analyze_source("class T { void m() { nothing(1); } }");
    assert_eq!(diags.error_count(), 1, "{:?}", diags.entries());
}

#[test]
fn bitwise_operators_reject_booleans() {
    for op in ["&", "|", "^"] {
        let source = format!("class T {{ boolean m(boolean a, boolean b) {{ return a {} b; }} }}", op);
        let (unit, diags) = analyze_source(&source);
        assert_eq!(diags.error_count(), 1, "{}: {:?}", op, diags.entries());
        assert!(diags.entries()[0].message.starts_with("Invalid operand types"));
        let expr = returned_expr(class_named(&unit, "T"), "m");
        assert_eq!(expr.ty(), &Type::Any);
    }

    let (_, diags) = analyze_source("class T { void m(boolean a, boolean b) { a &= b; a |= b; a ^= b; } }");
    assert_eq!(diags.error_count(), 3, "{:?}", diags.entries());
}

#[test]
fn bitwise_operators_keep_integral_width() {
    let (unit, diags) = analyze_source(
        "class T { long wide(long a, long b) { return a & b | a ^ b; } int narrow(char c, int i) { return c & i; } }",
    );
    assert!(!diags.error_has_occurred(), "{:?}", diags.entries());
    let class = class_named(&unit, "T");
    assert_eq!(returned_expr(class, "wide").ty(), &Type::Long);
    assert_eq!(returned_expr(class, "narrow").ty(), &Type::Int);
}
