//! Semantic analysis pipeline
//!
//! Two phases run over the parsed unit:
//!
//! - Enter: registers every type of the unit, binds imports and records
//!   member headers, so bodies can refer to anything declared in the unit
//! - Attr: analyzes member bodies, resolving names and rewriting the tree
//!
//! Errors go to the unit's `Diagnostics`; analysis never stops early.

pub mod attr;
pub mod context;
pub mod enter;
pub mod registry;

pub use attr::Attr;
pub use context::Context;
pub use enter::Enter;
pub use registry::TypeRegistry;

use crate::ast::CompilationUnit;
use crate::diagnostics::Diagnostics;

/// Run Enter and Attr, returning the analyzed unit and the registry the
/// code generator resolves class headers against
pub fn analyze(unit: CompilationUnit, diagnostics: &mut Diagnostics) -> (CompilationUnit, TypeRegistry) {
    let mut ctx = Context::new(diagnostics);
    let unit = Enter::new().process(unit, &mut ctx);
    let unit = Attr::new(&mut ctx).process(unit);
    log::debug!(
        "analyzed {}: {} error(s)",
        unit.file_name,
        ctx.diagnostics.error_count()
    );
    (unit, ctx.registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::*;
    use crate::config::Config;
    use crate::parser::parse_source;

    fn analyze_source(source: &str) -> (CompilationUnit, Diagnostics) {
        let (unit, mut diags) = parse_source(source, "T.java", &Config::default());
        assert!(!diags.error_has_occurred(), "{:?}", diags.entries());
        let (unit, _) = analyze(unit, &mut diags);
        (unit, diags)
    }

    fn method_body<'u>(unit: &'u CompilationUnit, name: &str) -> &'u [Stmt] {
        let TypeDecl::Class(class) = &unit.type_decls[0] else {
            panic!("expected a class");
        };
        class
            .members
            .iter()
            .find_map(|m| match m {
                Member::Method(method) if method.name == name => method.body.as_ref(),
                _ => None,
            })
            .map(|b| b.statements.as_slice())
            .expect("method body")
    }

    #[test]
    fn test_forward_reference_to_later_member() {
        let (_, diags) = analyze_source(
            "class A { int f() { return g() + n; } int g() { return 1; } int n; }",
        );
        assert!(!diags.error_has_occurred(), "{:?}", diags.entries());
    }

    #[test]
    fn test_qualified_name_classification() {
        let (unit, diags) = analyze_source(
            "class A { static void m() { System.out.println(1); } }",
        );
        assert!(!diags.error_has_occurred(), "{:?}", diags.entries());
        let StmtKind::Expression(call) = &method_body(&unit, "m")[0].kind else {
            panic!("expected an expression statement");
        };
        let ExprKind::MessageSend { target: Some(target), method: Some(method), .. } = &call.kind else {
            panic!("expected a resolved message send");
        };
        assert_eq!(method.owner, "java/io/PrintStream");
        assert_eq!(method.descriptor, "(I)V");
        assert!(matches!(
            &target.kind,
            ExprKind::FieldSelection { field: Some(f), .. } if f.is_static && f.owner == "java/lang/System"
        ));
    }

    #[test]
    fn test_implicit_super_call_and_constructor() {
        let (unit, _) = analyze_source("class A { }");
        let TypeDecl::Class(class) = &unit.type_decls[0] else {
            panic!("expected a class");
        };
        let Some(Member::Constructor(ctor)) = class.members.first() else {
            panic!("expected an implicit constructor");
        };
        assert_eq!(ctor.locals, 1);
        assert!(matches!(
            &ctor.body.statements[0].kind,
            StmtKind::Expression(Expr { kind: ExprKind::SuperConstruction { ctor: Some(_), .. }, .. })
        ));
    }

    #[test]
    fn test_locals_count_includes_wide_slots() {
        let (unit, _) = analyze_source("class A { static void m(long a) { double d = a; int i = 0; } }");
        let TypeDecl::Class(class) = &unit.type_decls[0] else {
            panic!("expected a class");
        };
        let Some(Member::Method(method)) = class.members.first() else {
            panic!("expected a method");
        };
        assert_eq!(method.locals, 5);
    }

    #[test]
    fn test_semantic_errors_do_not_stop_analysis() {
        let (_, diags) = analyze_source(
            "class A { void m() { int x = true; y = 1; boolean b = 1 < 2.0; } }",
        );
        assert_eq!(diags.error_count(), 3, "{:?}", diags.entries());
    }

    #[test]
    fn test_break_outside_loop() {
        let (_, diags) = analyze_source("class A { void m() { break; } }");
        assert_eq!(diags.error_count(), 1);
        assert!(diags.entries()[0].message.contains("break"));
    }

    #[test]
    fn test_missing_return() {
        let (_, diags) = analyze_source("class A { int m(boolean b) { if (b) return 1; } }");
        assert_eq!(diags.error_count(), 1);
        assert!(diags.entries()[0].message.starts_with("Missing return"));
    }

    #[test]
    fn test_unimplemented_interface_method() {
        let (_, diags) = analyze_source("interface I { void run(); } class A implements I { }");
        assert_eq!(diags.error_count(), 1, "{:?}", diags.entries());
    }
}
