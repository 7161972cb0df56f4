//! Attr phase - type checking, name classification and tree rewriting
//!
//! Every `analyze` function consumes a node and returns its replacement:
//! names become locals, fields or type names, `+` on a String becomes
//! `StringConcat`, primitive widening shows up as explicit `Cast` nodes,
//! and message sends carry the method they resolved to. An expression whose
//! check fails gets type `Any`, which every later check accepts silently.

use std::collections::HashSet;

use crate::ast::*;
use crate::consts::{JAVA_LANG_OBJECT, JAVA_LANG_STRING};
use crate::wash::context::{Context, JumpTarget};
use crate::wash::registry::{type_list, Selection, TypeRegistry};

/// Body analyzer for one compilation unit
pub struct Attr<'c, 'd> {
    ctx: &'c mut Context<'d>,
    /// Set while the first statement of a constructor is analyzed
    construction_allowed: bool,
}

impl<'c, 'd> Attr<'c, 'd> {
    pub fn new(ctx: &'c mut Context<'d>) -> Self {
        Self {
            ctx,
            construction_allowed: false,
        }
    }

    pub fn process(&mut self, unit: CompilationUnit) -> CompilationUnit {
        let type_decls: Vec<TypeDecl> = unit
            .type_decls
            .into_iter()
            .map(|decl| match decl {
                TypeDecl::Class(class) => TypeDecl::Class(self.analyze_class(class)),
                TypeDecl::Interface(interface) => TypeDecl::Interface(self.analyze_interface(interface)),
            })
            .collect();
        log::debug!(
            "attr: {} type(s), {} error(s) so far",
            type_decls.len(),
            self.ctx.diagnostics.error_count()
        );
        CompilationUnit { type_decls, ..unit }
    }

    // Declarations

    fn analyze_class(&mut self, class: ClassDecl) -> ClassDecl {
        let name = self.ctx.qualify(&class.name);
        self.ctx.enter_class(&name);

        let is_abstract = class.modifiers.is_abstract();
        if !is_abstract {
            for member in &class.members {
                if let Member::Method(method) = member {
                    if method.modifiers.is_abstract() {
                        self.ctx.error(
                            method.line,
                            format!("Class {} is not abstract and cannot declare abstract method {}", class.name, method.name),
                        );
                    }
                }
            }
            for (owner, method) in self.ctx.registry.unimplemented_methods(&name) {
                if owner != name {
                    self.ctx.error(
                        class.line,
                        format!(
                            "Class {} must implement {} from {}",
                            class.name,
                            method.signature(),
                            owner.replace('/', ".")
                        ),
                    );
                }
            }
        }

        let mut members = class.members;
        if !members.iter().any(|m| matches!(m, Member::Constructor(_))) {
            members.push(Member::Constructor(implicit_constructor(&class.name, class.line)));
        }
        let members = members
            .into_iter()
            .map(|member| self.analyze_member(member, &class.name))
            .collect();

        self.ctx.leave_class();
        ClassDecl { members, ..class }
    }

    fn analyze_interface(&mut self, interface: InterfaceDecl) -> InterfaceDecl {
        let name = self.ctx.qualify(&interface.name);
        self.ctx.enter_class(&name);
        let members = interface
            .members
            .into_iter()
            .map(|member| self.analyze_member(member, &interface.name))
            .collect();
        self.ctx.leave_class();
        InterfaceDecl { members, ..interface }
    }

    fn analyze_member(&mut self, member: Member, class_name: &str) -> Member {
        match member {
            Member::Field(field) => Member::Field(self.analyze_field(field)),
            Member::Method(method) => Member::Method(self.analyze_method(method)),
            Member::Constructor(ctor) => Member::Constructor(self.analyze_constructor(ctor, class_name)),
        }
    }

    fn analyze_field(&mut self, field: FieldDecl) -> FieldDecl {
        let is_static = field.modifiers.is_static();
        let declarators = field
            .declarators
            .into_iter()
            .map(|declarator| {
                let Some(initializer) = declarator.initializer else {
                    return VariableDeclarator {
                        initializer: None,
                        ..declarator
                    };
                };
                self.ctx.enter_method(is_static, false, Type::Void);
                let initializer = self.analyze_initializer(initializer, &declarator.ty);
                self.ctx.leave_method();
                VariableDeclarator {
                    initializer: Some(initializer),
                    ..declarator
                }
            })
            .collect();
        FieldDecl { declarators, ..field }
    }

    fn analyze_method(&mut self, method: MethodDecl) -> MethodDecl {
        let is_abstract = method.modifiers.is_abstract();
        match (&method.body, is_abstract) {
            (Some(_), true) => self
                .ctx
                .error(method.line, format!("Abstract method {} cannot have a body", method.name)),
            (None, false) => self
                .ctx
                .error(method.line, format!("Method {} requires a body", method.name)),
            _ => {}
        }

        self.ctx
            .enter_method(method.modifiers.is_static(), false, method.return_type.clone());
        let params = self.declare_params(method.params);
        let body = method.body.map(|body| {
            let body = self.analyze_block(body);
            if method.return_type != Type::Void && can_complete_all(&body.statements) {
                self.ctx.error(method.line, format!("Missing return statement in method {}", method.name));
            }
            body
        });
        let locals = self.ctx.leave_method();
        MethodDecl {
            params,
            body,
            locals,
            ..method
        }
    }

    fn analyze_constructor(&mut self, ctor: ConstructorDecl, class_name: &str) -> ConstructorDecl {
        if ctor.name != class_name {
            self.ctx.error(
                ctor.line,
                format!("Invalid method declaration {}; return type required", ctor.name),
            );
        }
        self.ctx.enter_method(false, true, Type::Void);
        let params = self.declare_params(ctor.params);

        let mut statements = ctor.body.statements;
        let explicit = statements.first().map_or(false, |stmt| {
            matches!(
                &stmt.kind,
                StmtKind::Expression(Expr {
                    kind: ExprKind::SuperConstruction { .. } | ExprKind::ThisConstruction { .. },
                    ..
                })
            )
        });
        if !explicit {
            let mut call = Expr::new(
                ctor.body.line,
                ExprKind::SuperConstruction {
                    args: Vec::new(),
                    ctor: None,
                },
            );
            call.is_statement_expression = true;
            statements.insert(0, Stmt::new(ctor.body.line, StmtKind::Expression(call)));
        }

        self.ctx.push_scope();
        let statements = statements
            .into_iter()
            .enumerate()
            .map(|(i, stmt)| {
                self.construction_allowed = i == 0;
                self.analyze_stmt(stmt)
            })
            .collect();
        self.construction_allowed = false;
        self.ctx.pop_scope();

        let locals = self.ctx.leave_method();
        ConstructorDecl {
            params,
            body: Block {
                line: ctor.body.line,
                statements,
            },
            locals,
            ..ctor
        }
    }

    fn declare_params(&mut self, params: Vec<FormalParameter>) -> Vec<FormalParameter> {
        params
            .into_iter()
            .map(|param| {
                let slot = self.ctx.declare_local(&param.name, param.ty.clone(), param.line);
                FormalParameter {
                    slot: Some(slot),
                    ..param
                }
            })
            .collect()
    }

    // Statements

    fn analyze_block(&mut self, block: Block) -> Block {
        self.ctx.push_scope();
        let statements = block
            .statements
            .into_iter()
            .map(|stmt| self.analyze_stmt(stmt))
            .collect();
        self.ctx.pop_scope();
        Block {
            line: block.line,
            statements,
        }
    }

    pub fn analyze_stmt(&mut self, stmt: Stmt) -> Stmt {
        let line = stmt.line;
        let kind = match stmt.kind {
            StmtKind::Block(block) => StmtKind::Block(self.analyze_block(block)),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => StmtKind::If {
                condition: self.analyze_condition(condition),
                then_branch: Box::new(self.analyze_stmt(*then_branch)),
                else_branch: else_branch.map(|s| Box::new(self.analyze_stmt(*s))),
            },
            StmtKind::While { condition, body } => {
                let condition = self.analyze_condition(condition);
                let body = self.analyze_loop_body(*body);
                StmtKind::While { condition, body }
            }
            StmtKind::DoWhile { body, condition } => {
                let body = self.analyze_loop_body(*body);
                let condition = self.analyze_condition(condition);
                StmtKind::DoWhile { body, condition }
            }
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                self.ctx.push_scope();
                let init = init.into_iter().map(|s| self.analyze_stmt(s)).collect();
                let condition = condition.map(|c| self.analyze_condition(c));
                let update = update.into_iter().map(|s| self.analyze_stmt(s)).collect();
                let body = self.analyze_loop_body(*body);
                self.ctx.pop_scope();
                StmtKind::For {
                    init,
                    condition,
                    update,
                    body,
                }
            }
            StmtKind::Switch { selector, groups } => self.analyze_switch(selector, groups),
            StmtKind::Try {
                block,
                catches,
                finally,
            } => {
                let block = self.analyze_block(block);
                let catches = catches
                    .into_iter()
                    .map(|clause| self.analyze_catch(clause))
                    .collect();
                let finally = finally.map(|f| self.analyze_block(f));
                StmtKind::Try {
                    block,
                    catches,
                    finally,
                }
            }
            StmtKind::Throw(expr) => {
                let expr = self.analyze_expr(expr);
                if !expr.ty().is_reference() && !expr.ty().is_any() {
                    self.ctx
                        .error(line, format!("Cannot throw a value of type {}", expr.ty()));
                }
                StmtKind::Throw(expr)
            }
            StmtKind::Return(value) => StmtKind::Return(self.analyze_return(line, value)),
            StmtKind::Break => {
                if !self.ctx.can_break() {
                    self.ctx.error(line, "break outside switch or loop");
                }
                StmtKind::Break
            }
            StmtKind::Continue => {
                if !self.ctx.can_continue() {
                    self.ctx.error(line, "continue outside of a loop");
                }
                StmtKind::Continue
            }
            StmtKind::Empty => StmtKind::Empty,
            StmtKind::Expression(expr) => {
                let mut expr = self.analyze_expr(expr);
                expr.is_statement_expression = true;
                StmtKind::Expression(expr)
            }
            StmtKind::LocalVariables(declarators) => StmtKind::LocalVariables(
                declarators
                    .into_iter()
                    .map(|d| self.analyze_local(d))
                    .collect(),
            ),
        };
        Stmt::new(line, kind)
    }

    fn analyze_loop_body(&mut self, body: Stmt) -> Box<Stmt> {
        self.ctx.enter_jump_target(JumpTarget::Loop);
        let body = self.analyze_stmt(body);
        self.ctx.leave_jump_target();
        Box::new(body)
    }

    fn analyze_condition(&mut self, condition: Expr) -> Expr {
        let condition = self.analyze_expr(condition);
        if *condition.ty() != Type::Boolean && !condition.ty().is_any() {
            self.ctx.error(
                condition.line,
                format!("Type {} doesn't match type boolean", condition.ty()),
            );
        }
        condition
    }

    fn analyze_switch(&mut self, selector: Expr, groups: Vec<SwitchGroup>) -> StmtKind {
        let selector = self.analyze_expr(selector);
        if !matches!(selector.ty(), Type::Int | Type::Char | Type::Any) {
            self.ctx.error(
                selector.line,
                format!("Switch selector must be int or char, found {}", selector.ty()),
            );
        }

        let mut seen = HashSet::new();
        let mut has_default = false;
        self.ctx.enter_jump_target(JumpTarget::Switch);
        self.ctx.push_scope();
        let groups = groups
            .into_iter()
            .map(|group| {
                let labels = group
                    .labels
                    .into_iter()
                    .map(|label| match label {
                        SwitchLabel::Case(expr) => {
                            let expr = self.analyze_expr(expr);
                            match case_value(&expr) {
                                Some(value) => {
                                    if !seen.insert(value) {
                                        self.ctx.error(expr.line, format!("Duplicate case label: {}", value));
                                    }
                                }
                                None if expr.ty().is_any() => {}
                                None => self
                                    .ctx
                                    .error(expr.line, "Case label must be an int or char constant"),
                            }
                            SwitchLabel::Case(expr)
                        }
                        SwitchLabel::Default(line) => {
                            if has_default {
                                self.ctx.error(line, "Duplicate default label");
                            }
                            has_default = true;
                            SwitchLabel::Default(line)
                        }
                    })
                    .collect();
                let statements = group
                    .statements
                    .into_iter()
                    .map(|stmt| self.analyze_stmt(stmt))
                    .collect();
                SwitchGroup { labels, statements }
            })
            .collect();
        self.ctx.pop_scope();
        self.ctx.leave_jump_target();
        StmtKind::Switch { selector, groups }
    }

    fn analyze_catch(&mut self, clause: CatchClause) -> CatchClause {
        self.ctx.push_scope();
        let ty = self.ctx.resolve_type(&clause.param.ty, clause.param.line);
        let slot = self.ctx.declare_local(&clause.param.name, ty.clone(), clause.param.line);
        let block = self.analyze_block(clause.block);
        self.ctx.pop_scope();
        CatchClause {
            line: clause.line,
            param: FormalParameter {
                ty,
                slot: Some(slot),
                ..clause.param
            },
            block,
        }
    }

    fn analyze_return(&mut self, line: usize, value: Option<Expr>) -> Option<Expr> {
        let return_type = self
            .ctx
            .method()
            .map(|m| m.return_type.clone())
            .unwrap_or(Type::Void);
        match value {
            None => {
                if return_type != Type::Void {
                    self.ctx.error(line, format!("Missing return value of type {}", return_type));
                }
                None
            }
            Some(expr) => {
                let expr = self.analyze_expr(expr);
                if return_type == Type::Void {
                    self.ctx.error(line, "Cannot return a value from a void method");
                    return Some(expr);
                }
                Some(self.coerce(expr, &return_type))
            }
        }
    }

    fn analyze_local(&mut self, declarator: VariableDeclarator) -> VariableDeclarator {
        let ty = self.ctx.resolve_type(&declarator.ty, declarator.line);
        if ty == Type::Void {
            self.ctx
                .error(declarator.line, format!("Variable {} cannot be void", declarator.name));
        }
        let initializer = declarator
            .initializer
            .map(|init| self.analyze_initializer(init, &ty));
        let slot = self.ctx.declare_local(&declarator.name, ty.clone(), declarator.line);
        VariableDeclarator {
            ty,
            initializer,
            slot: Some(slot),
            ..declarator
        }
    }

    /// Analyze a variable initializer and convert it to `ty`
    fn analyze_initializer(&mut self, initializer: Expr, ty: &Type) -> Expr {
        let initializer = match initializer.kind {
            ExprKind::ArrayInitializer { elements, .. } => Expr::new(
                initializer.line,
                ExprKind::ArrayInitializer {
                    array_type: ty.clone(),
                    elements,
                },
            ),
            kind => Expr { kind, ..initializer },
        };
        let initializer = self.analyze_expr(initializer);
        self.coerce(initializer, ty)
    }

    // Expressions

    pub fn analyze_expr(&mut self, expr: Expr) -> Expr {
        let line = expr.line;
        match expr.kind {
            ExprKind::Literal(literal) => self.analyze_literal(line, literal),
            ExprKind::Name(segments) => self.classify_name(line, segments, false),
            ExprKind::Local { .. } | ExprKind::TypeName(_) | ExprKind::StringConcat { .. } => {
                // Already analyzed
                expr
            }
            ExprKind::This => {
                if self.ctx.is_static_context() {
                    self.ctx.error(line, "Cannot use this in a static context");
                }
                Expr::typed(line, ExprKind::This, self.ctx.current_class_type())
            }
            ExprKind::Super => self.analyze_super(line),
            ExprKind::FieldSelection { target, name, .. } => {
                let target = self.analyze_target(*target);
                self.select_field(line, target, &name)
            }
            ExprKind::ArrayLength(array) => {
                let array = self.analyze_expr(*array);
                Expr::typed(line, ExprKind::ArrayLength(Box::new(array)), Type::Int)
            }
            ExprKind::ArrayAccess { array, index } => self.analyze_array_access(line, *array, *index),
            ExprKind::MessageSend {
                target, name, args, ..
            } => self.analyze_message_send(line, target.map(|t| *t), name, args),
            ExprKind::SuperConstruction { args, .. } => self.analyze_construction(line, args, true),
            ExprKind::ThisConstruction { args, .. } => self.analyze_construction(line, args, false),
            ExprKind::New { class, args, .. } => self.analyze_new(line, class, args),
            ExprKind::NewArray { array_type, dims } => {
                let array_type = self.ctx.resolve_type(&array_type, line);
                let dims = dims
                    .into_iter()
                    .map(|dim| self.analyze_index(dim))
                    .collect();
                Expr::typed(
                    line,
                    ExprKind::NewArray {
                        array_type: array_type.clone(),
                        dims,
                    },
                    array_type,
                )
            }
            ExprKind::ArrayInitializer { array_type, elements } => {
                self.analyze_array_initializer(line, array_type, elements)
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.analyze_expr(*lhs);
                let rhs = self.analyze_expr(*rhs);
                self.analyze_binary(line, op, lhs, rhs)
            }
            ExprKind::InstanceOf { expr, target } => {
                let expr = self.analyze_expr(*expr);
                let target = self.ctx.resolve_type(&target, line);
                let valid = |ty: &Type| ty.is_reference() || ty.is_any();
                if !valid(expr.ty()) || !valid(&target) || *expr.ty() == Type::Null {
                    self.ctx.error(
                        line,
                        format!("Invalid instanceof operands: {} and {}", expr.ty(), target),
                    );
                }
                Expr::typed(
                    line,
                    ExprKind::InstanceOf {
                        expr: Box::new(expr),
                        target,
                    },
                    Type::Boolean,
                )
            }
            ExprKind::Unary { op, operand } => self.analyze_unary(line, op, *operand),
            ExprKind::IncDec { op, operand } => {
                let operand = self.analyze_expr(*operand);
                let ty = operand.ty().clone();
                if !is_lvalue(&operand) {
                    self.ctx.error(line, format!("Operand of {} must be a variable", op));
                } else if !matches!(ty, Type::Int | Type::Long | Type::Double | Type::Any) {
                    self.ctx.error(line, format!("Invalid operand type for {}: {}", op, ty));
                }
                Expr::typed(
                    line,
                    ExprKind::IncDec {
                        op,
                        operand: Box::new(operand),
                    },
                    ty,
                )
            }
            ExprKind::Cast { target, expr } => {
                let target = self.ctx.resolve_type(&target, line);
                let expr = self.analyze_expr(*expr);
                self.analyze_cast(line, target, expr)
            }
            ExprKind::Assign { op, lhs, rhs } => {
                let lhs = self.analyze_expr(*lhs);
                let rhs = self.analyze_expr(*rhs);
                self.analyze_assign(line, op, lhs, rhs)
            }
            ExprKind::Conditional {
                condition,
                then_expr,
                else_expr,
            } => self.analyze_conditional(line, *condition, *then_expr, *else_expr),
            ExprKind::Wild => Expr::typed(line, ExprKind::Wild, Type::Any),
        }
    }

    fn analyze_literal(&mut self, line: usize, literal: Literal) -> Expr {
        let valid = match &literal {
            Literal::Int(_) | Literal::Char(_) => literal.int_value().is_some(),
            Literal::Long(_) => literal.long_value().is_some(),
            Literal::Double(_) => literal.double_value().is_some(),
            Literal::String(_) => literal.string_value().is_some(),
            Literal::Boolean(_) | Literal::Null => true,
        };
        if !valid {
            self.ctx
                .error(line, format!("Invalid {} literal: {}", literal.ty(), literal));
        }
        let ty = literal.ty();
        Expr::typed(line, ExprKind::Literal(literal), ty)
    }

    /// Analyze the target of a selection, where a type name is allowed
    fn analyze_target(&mut self, target: Expr) -> Expr {
        match target.kind {
            ExprKind::Name(segments) => self.classify_name(target.line, segments, true),
            _ => self.analyze_expr(target),
        }
    }

    fn analyze_super(&mut self, line: usize) -> Expr {
        if self.ctx.is_static_context() {
            self.ctx.error(line, "Cannot use super in a static context");
        }
        let ty = self
            .ctx
            .super_class_name()
            .map(Type::class)
            .unwrap_or(Type::Any);
        Expr::typed(line, ExprKind::Super, ty)
    }

    /// Classify a dotted name: local, then field of the current class,
    /// then the longest prefix naming a type; the rest are field selections
    fn classify_name(&mut self, line: usize, segments: Vec<String>, allow_type: bool) -> Expr {
        let Some(first) = segments.first().cloned() else {
            return Expr::typed(line, ExprKind::Wild, Type::Any);
        };

        let (mut expr, consumed) = if let Some(local) = self.ctx.lookup_local(&first).cloned() {
            (
                Expr::typed(
                    line,
                    ExprKind::Local {
                        name: local.name,
                        slot: local.slot,
                    },
                    local.ty,
                ),
                1,
            )
        } else if let Some(expr) = self.implicit_field(line, &first) {
            (expr, 1)
        } else if let Some((ty, consumed)) = self.type_prefix(&segments) {
            if consumed == segments.len() && !allow_type {
                self.ctx
                    .error(line, format!("Type {} cannot be used as a value", ty));
                return Expr::typed(line, ExprKind::Wild, Type::Any);
            }
            (Expr::typed(line, ExprKind::TypeName(ty.clone()), ty), consumed)
        } else {
            self.ctx
                .error(line, format!("Cannot find name: {}", segments.join(".")));
            return Expr::typed(line, ExprKind::Wild, Type::Any);
        };

        for name in &segments[consumed..] {
            expr = self.select_field(line, expr, name);
        }
        expr
    }

    /// A field of the current class accessed without a target
    fn implicit_field(&mut self, line: usize, name: &str) -> Option<Expr> {
        let class = self.ctx.current_class()?.to_string();
        let (owner, info) = self.ctx.registry.find_field(&class, name)?;
        let target = if info.is_static {
            let owner_type = Type::class(owner.as_str());
            Expr::typed(line, ExprKind::TypeName(owner_type.clone()), owner_type)
        } else {
            if self.ctx.is_static_context() {
                self.ctx.error(
                    line,
                    format!("Cannot reference non-static field {} from a static context", name),
                );
            }
            Expr::typed(line, ExprKind::This, self.ctx.current_class_type())
        };
        let field = FieldRef {
            owner,
            name: name.to_string(),
            descriptor: info.ty.descriptor(),
            is_static: info.is_static,
        };
        Some(Expr::typed(
            line,
            ExprKind::FieldSelection {
                target: Box::new(target),
                name: name.to_string(),
                field: Some(field),
            },
            info.ty,
        ))
    }

    /// Longest leading run of segments that names a type
    fn type_prefix(&self, segments: &[String]) -> Option<(Type, usize)> {
        (1..=segments.len()).rev().find_map(|n| {
            let name = segments[..n].join(".");
            self.ctx
                .resolve_class_name(&name)
                .map(|internal| (Type::class(internal), n))
        })
    }

    fn select_field(&mut self, line: usize, target: Expr, name: &str) -> Expr {
        let target_type = target.ty().clone();
        let untyped = |target: Expr, field: Option<FieldRef>, ty: Type| {
            Expr::typed(
                line,
                ExprKind::FieldSelection {
                    target: Box::new(target),
                    name: name.to_string(),
                    field,
                },
                ty,
            )
        };
        if target_type.is_any() {
            return untyped(target, None, Type::Any);
        }
        if target_type.is_array() && name == "length" && !matches!(target.kind, ExprKind::TypeName(_)) {
            return Expr::typed(line, ExprKind::ArrayLength(Box::new(target)), Type::Int);
        }
        let Some(class) = class_name_of(&target_type) else {
            self.ctx.error(
                line,
                format!("Cannot select field {} from type {}", name, target_type),
            );
            return untyped(target, None, Type::Any);
        };
        let Some((owner, info)) = self.ctx.registry.find_field(&class, name) else {
            self.ctx.error(
                line,
                format!("Cannot find field: {} in {}", name, target_type),
            );
            return untyped(target, None, Type::Any);
        };
        if matches!(target.kind, ExprKind::TypeName(_)) && !info.is_static {
            self.ctx.error(
                line,
                format!("Non-static field {} cannot be referenced through type {}", name, target_type),
            );
        }
        let field = FieldRef {
            owner,
            name: name.to_string(),
            descriptor: info.ty.descriptor(),
            is_static: info.is_static,
        };
        untyped(target, Some(field), info.ty)
    }

    fn analyze_array_access(&mut self, line: usize, array: Expr, index: Expr) -> Expr {
        let array = self.analyze_expr(array);
        let index = self.analyze_index(index);
        let ty = match array.ty() {
            Type::Array(component) => (**component).clone(),
            Type::Any => Type::Any,
            other => {
                self.ctx
                    .error(line, format!("Array type required, found {}", other));
                Type::Any
            }
        };
        Expr::typed(
            line,
            ExprKind::ArrayAccess {
                array: Box::new(array),
                index: Box::new(index),
            },
            ty,
        )
    }

    /// Array indexes and dimensions: int, with char promoted
    fn analyze_index(&mut self, index: Expr) -> Expr {
        let index = self.analyze_expr(index);
        match index.ty() {
            Type::Int | Type::Any => index,
            Type::Char => self.coerce(index, &Type::Int),
            other => {
                self.ctx
                    .error(index.line, format!("Type {} doesn't match type int", other));
                index
            }
        }
    }

    fn analyze_args(&mut self, args: Vec<Expr>) -> (Vec<Expr>, Vec<Type>, bool) {
        let args: Vec<Expr> = args.into_iter().map(|a| self.analyze_expr(a)).collect();
        let types: Vec<Type> = args.iter().map(|a| a.ty().clone()).collect();
        let erroneous = types.iter().any(Type::is_any);
        (args, types, erroneous)
    }

    fn coerce_args(&mut self, args: Vec<Expr>, params: &[Type]) -> Vec<Expr> {
        args.into_iter()
            .zip(params)
            .map(|(arg, param)| self.coerce(arg, param))
            .collect()
    }

    fn analyze_message_send(&mut self, line: usize, target: Option<Expr>, name: String, args: Vec<Expr>) -> Expr {
        let target = target.map(|t| match t.kind {
            ExprKind::Super => self.analyze_super(t.line),
            _ => self.analyze_target(t),
        });
        let (args, arg_types, erroneous) = self.analyze_args(args);
        let failed = |target: Option<Expr>, args: Vec<Expr>| {
            Expr::typed(
                line,
                ExprKind::MessageSend {
                    target: target.map(Box::new),
                    name: name.clone(),
                    args,
                    method: None,
                },
                Type::Any,
            )
        };

        if target.as_ref().map_or(false, |t| t.ty().is_any()) {
            return failed(target, args);
        }
        let class = match &target {
            None => self.ctx.current_class().map(str::to_string),
            Some(t) => class_name_of(t.ty()),
        };
        let Some(class) = class else {
            let found = target.as_ref().map(|t| t.ty().to_string()).unwrap_or_default();
            self.ctx
                .error(line, format!("Cannot invoke {} on type {}", name, found));
            return failed(target, args);
        };
        if erroneous {
            return failed(target, args);
        }

        let signature = format!("{}({})", name, type_list(&arg_types));
        let (owner, info) = match self.ctx.registry.select_method(&class, &name, &arg_types) {
            Selection::Found(found) => found,
            Selection::NotFound => {
                self.ctx
                    .error(line, format!("Cannot find method: {}", signature));
                return failed(target, args);
            }
            Selection::Ambiguous => {
                self.ctx.error(line, format!("Ambiguous call: {}", signature));
                return failed(target, args);
            }
        };

        let is_super = matches!(target.as_ref().map(|t| &t.kind), Some(ExprKind::Super));
        let through_type = matches!(target.as_ref().map(|t| &t.kind), Some(ExprKind::TypeName(_)));
        if through_type && !info.is_static {
            self.ctx.error(
                line,
                format!("Non-static method {} cannot be referenced through a type", info.signature()),
            );
        }
        if is_super && info.is_abstract {
            self.ctx
                .error(line, format!("Abstract method {} cannot be accessed directly", info.signature()));
        }

        let target = match target {
            None if !info.is_static => {
                if self.ctx.is_static_context() {
                    self.ctx.error(
                        line,
                        format!("Cannot call non-static method {} from a static context", info.signature()),
                    );
                }
                Some(Expr::typed(line, ExprKind::This, self.ctx.current_class_type()))
            }
            other => other,
        };

        let kind = if info.is_static {
            InvokeKind::Static
        } else if is_super || info.is_private {
            InvokeKind::Special
        } else if self.ctx.registry.is_interface(&owner) {
            InvokeKind::Interface
        } else {
            InvokeKind::Virtual
        };
        let method = MethodRef {
            owner,
            name: name.clone(),
            descriptor: info.descriptor(),
            kind,
        };
        let args = self.coerce_args(args, &info.params);
        Expr::typed(
            line,
            ExprKind::MessageSend {
                target: target.map(Box::new),
                name,
                args,
                method: Some(method),
            },
            info.return_type,
        )
    }

    /// `super(...)` or `this(...)` at the start of a constructor
    fn analyze_construction(&mut self, line: usize, args: Vec<Expr>, is_super: bool) -> Expr {
        let keyword = if is_super { "super" } else { "this" };
        let allowed = std::mem::take(&mut self.construction_allowed);
        let in_constructor = self.ctx.method().map_or(false, |m| m.is_constructor);
        if !allowed || !in_constructor {
            self.ctx.error(
                line,
                format!("Call to {} must be first statement in constructor", keyword),
            );
        }

        let (args, arg_types, erroneous) = self.analyze_args(args);
        let class = if is_super {
            self.ctx.super_class_name()
        } else {
            self.ctx.current_class().map(str::to_string)
        };
        let mut selected = None;
        if let (Some(class), false) = (class, erroneous) {
            selected = self.find_constructor(line, &class, &arg_types);
        }
        let (args, ctor) = match selected {
            Some((ctor, params)) => (self.coerce_args(args, &params), Some(ctor)),
            None => (args, None),
        };
        let kind = if is_super {
            ExprKind::SuperConstruction { args, ctor }
        } else {
            ExprKind::ThisConstruction { args, ctor }
        };
        Expr::typed(line, kind, Type::Void)
    }

    fn find_constructor(&mut self, line: usize, class: &str, arg_types: &[Type]) -> Option<(MethodRef, Vec<Type>)> {
        let signature = format!("{}({})", class.replace('/', "."), type_list(arg_types));
        match self.ctx.registry.select_constructor(class, arg_types) {
            Selection::Found(found) => Some(found),
            Selection::NotFound => {
                self.ctx
                    .error(line, format!("Cannot find constructor: {}", signature));
                None
            }
            Selection::Ambiguous => {
                self.ctx
                    .error(line, format!("Ambiguous constructor call: {}", signature));
                None
            }
        }
    }

    fn analyze_new(&mut self, line: usize, class: Type, args: Vec<Expr>) -> Expr {
        let class = self.ctx.resolve_type(&class, line);
        let (args, arg_types, erroneous) = self.analyze_args(args);
        let mut selected = None;
        match class_name_of(&class) {
            Some(name) if !class.is_array() => {
                let is_abstract = self.ctx.registry.lookup(&name).map_or(false, |c| c.is_abstract);
                if is_abstract {
                    self.ctx
                        .error(line, format!("Cannot instantiate abstract type {}", class));
                } else if !erroneous {
                    selected = self.find_constructor(line, &name, &arg_types);
                }
            }
            _ if class.is_any() => {}
            _ => self.ctx.error(line, format!("Cannot instantiate type {}", class)),
        }
        let (args, ctor) = match selected {
            Some((ctor, params)) => (self.coerce_args(args, &params), Some(ctor)),
            None => (args, None),
        };
        let ty = if ctor.is_some() { class.clone() } else { Type::Any };
        Expr::typed(line, ExprKind::New { class, args, ctor }, ty)
    }

    fn analyze_array_initializer(&mut self, line: usize, array_type: Type, elements: Vec<Expr>) -> Expr {
        let array_type = self.ctx.resolve_type(&array_type, line);
        let component = match &array_type {
            Type::Array(component) => (**component).clone(),
            Type::Any => Type::Any,
            other => {
                self.ctx
                    .error(line, format!("Cannot initialize a {} with an array initializer", other));
                Type::Any
            }
        };
        let elements = elements
            .into_iter()
            .map(|element| self.analyze_initializer(element, &component))
            .collect();
        Expr::typed(
            line,
            ExprKind::ArrayInitializer {
                array_type: array_type.clone(),
                elements,
            },
            array_type,
        )
    }

    fn analyze_binary(&mut self, line: usize, op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        let lt = lhs.ty().clone();
        let rt = rhs.ty().clone();

        if op == BinaryOp::Add && (lt == Type::String || rt == Type::String) {
            if lt == Type::Void || rt == Type::Void {
                self.ctx
                    .error(line, format!("Invalid operand types for +: {} and {}", lt, rt));
            }
            return Expr::typed(
                line,
                ExprKind::StringConcat {
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                Type::String,
            );
        }

        let is_comparison = op.is_relational() || op.is_equality() || op.is_logical();
        if lt.is_any() || rt.is_any() {
            let ty = if is_comparison { Type::Boolean } else { Type::Any };
            return binary_node(line, op, lhs, rhs, ty);
        }

        // Promoted types are never char
        let lp = lt.promoted();
        let rp = rt.promoted();

        let result = if op.is_arithmetic() {
            (lp == rp && lp.is_numeric()).then(|| lp.clone())
        } else if op.is_shift() {
            (lp.is_integral() && rp.is_integral()).then(|| lp.clone())
        } else if op.is_bitwise() {
            (lp == rp && lp.is_integral()).then(|| lp.clone())
        } else if op.is_logical() {
            (lt == Type::Boolean && rt == Type::Boolean).then_some(Type::Boolean)
        } else if op.is_relational() {
            (lp == rp && lp.is_numeric()).then_some(Type::Boolean)
        } else {
            let same_primitive = lp == rp && (lp.is_numeric() || lp == Type::Boolean);
            let references = lt.is_reference() && rt.is_reference();
            (same_primitive || references).then_some(Type::Boolean)
        };

        match result {
            Some(ty) => {
                let rhs = if op.is_shift() && rp == Type::Long {
                    cast_node(Type::Int, rhs)
                } else {
                    rhs
                };
                binary_node(line, op, lhs, rhs, ty)
            }
            None => {
                self.ctx
                    .error(line, format!("Invalid operand types for {}: {} and {}", op, lt, rt));
                let ty = if is_comparison { Type::Boolean } else { Type::Any };
                binary_node(line, op, lhs, rhs, ty)
            }
        }
    }

    fn analyze_unary(&mut self, line: usize, op: UnaryOp, operand: Expr) -> Expr {
        if op == UnaryOp::Neg {
            if let ExprKind::Literal(literal) = &operand.kind {
                let negated = match literal {
                    Literal::Int(image) if !image.starts_with('-') => Some(Literal::Int(format!("-{}", image))),
                    Literal::Long(image) if !image.starts_with('-') => Some(Literal::Long(format!("-{}", image))),
                    Literal::Double(image) if !image.starts_with('-') => {
                        Some(Literal::Double(format!("-{}", image)))
                    }
                    _ => None,
                };
                if let Some(literal) = negated {
                    return self.analyze_literal(line, literal);
                }
            }
        }

        let operand = self.analyze_expr(operand);
        let ty = operand.ty().clone();
        let result = match op {
            _ if ty.is_any() => Some(Type::Any),
            UnaryOp::Neg | UnaryOp::Plus => {
                ty.promoted().is_numeric().then(|| ty.promoted())
            }
            UnaryOp::BitNot => ty.promoted().is_integral().then(|| ty.promoted()),
            UnaryOp::Not => (ty == Type::Boolean).then_some(Type::Boolean),
        };
        let ty = result.unwrap_or_else(|| {
            self.ctx
                .error(line, format!("Invalid operand type for {}: {}", op, ty));
            Type::Any
        });
        Expr::typed(
            line,
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            ty,
        )
    }

    fn analyze_cast(&mut self, line: usize, target: Type, expr: Expr) -> Expr {
        let from = expr.ty().clone();
        let valid = from == target
            || from.is_any()
            || target.is_any()
            || (from.is_numeric() && target.is_numeric())
            || (from.is_reference()
                && target.is_reference()
                && (self.ctx.registry.is_assignable(&from, &target)
                    || self.ctx.registry.is_assignable(&target, &from)
                    || is_interface_type(&self.ctx.registry, &from)
                    || is_interface_type(&self.ctx.registry, &target)));
        if !valid {
            self.ctx
                .error(line, format!("Invalid cast from {} to {}", from, target));
        }
        cast_node(target, expr)
    }

    fn analyze_assign(&mut self, line: usize, op: AssignOp, lhs: Expr, rhs: Expr) -> Expr {
        let lt = lhs.ty().clone();
        let rt = rhs.ty().clone();
        let node = |lhs: Expr, rhs: Expr, ty: Type| {
            Expr::typed(
                line,
                ExprKind::Assign {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                ty,
            )
        };

        if !is_lvalue(&lhs) {
            if !lt.is_any() {
                self.ctx.error(line, "Illegal lhs for assignment");
            }
            return node(lhs, rhs, Type::Any);
        }
        if lt.is_any() || rt.is_any() {
            return node(lhs, rhs, lt);
        }

        let Some(binary) = op.binary_op() else {
            let rhs = self.coerce(rhs, &lt);
            return node(lhs, rhs, lt);
        };

        // The target is stored back without narrowing, so it cannot be char
        let valid = if binary == BinaryOp::Add && lt == Type::String {
            rt != Type::Void
        } else if lt == Type::Char {
            false
        } else if binary.is_arithmetic() {
            lt.is_numeric() && self.ctx.registry.is_assignable(&rt, &lt)
        } else if binary.is_shift() {
            lt.is_integral() && rt.promoted().is_integral()
        } else {
            lt.is_integral() && self.ctx.registry.is_assignable(&rt, &lt)
        };
        if !valid {
            self.ctx
                .error(line, format!("Invalid operand types for {}: {} and {}", op, lt, rt));
            return node(lhs, rhs, Type::Any);
        }

        let rhs = if binary == BinaryOp::Add && lt == Type::String {
            rhs
        } else if binary.is_shift() {
            if rt == Type::Long {
                cast_node(Type::Int, rhs)
            } else {
                rhs
            }
        } else {
            self.coerce(rhs, &lt)
        };
        node(lhs, rhs, lt)
    }

    fn analyze_conditional(&mut self, line: usize, condition: Expr, then_expr: Expr, else_expr: Expr) -> Expr {
        let condition = self.analyze_condition(condition);
        let then_expr = self.analyze_expr(then_expr);
        let else_expr = self.analyze_expr(else_expr);
        let tt = then_expr.ty().clone();
        let et = else_expr.ty().clone();

        let ty = if tt.is_any() || et.is_any() {
            Type::Any
        } else if tt == et {
            tt.clone()
        } else if tt.is_primitive() && tt.promoted() == et.promoted() {
            tt.promoted()
        } else if self.ctx.registry.is_assignable(&tt, &et) {
            et.clone()
        } else if self.ctx.registry.is_assignable(&et, &tt) {
            tt.clone()
        } else {
            self.ctx.error(
                line,
                format!("Conditional branches have incompatible types: {} and {}", tt, et),
            );
            Type::Any
        };

        let (then_expr, else_expr) = if ty.is_any() {
            (then_expr, else_expr)
        } else {
            (self.coerce(then_expr, &ty), self.coerce(else_expr, &ty))
        };
        Expr::typed(
            line,
            ExprKind::Conditional {
                condition: Box::new(condition),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            ty,
        )
    }

    /// Check assignment compatibility, making primitive widening explicit
    fn coerce(&mut self, expr: Expr, to: &Type) -> Expr {
        let from = expr.ty().clone();
        if from == *to || from.is_any() || to.is_any() {
            return expr;
        }
        if !self.ctx.registry.is_assignable(&from, to) {
            self.ctx
                .error(expr.line, format!("Type {} doesn't match type {}", from, to));
            return expr;
        }
        if from.is_primitive() && to.is_primitive() {
            cast_node(to.clone(), expr)
        } else {
            expr
        }
    }
}

fn implicit_constructor(class_name: &str, line: usize) -> ConstructorDecl {
    ConstructorDecl {
        line,
        modifiers: Modifiers {
            list: vec![Modifier::Public],
        },
        name: class_name.to_string(),
        params: Vec::new(),
        throws: Vec::new(),
        body: Block {
            line,
            statements: Vec::new(),
        },
        locals: 0,
    }
}

fn binary_node(line: usize, op: BinaryOp, lhs: Expr, rhs: Expr, ty: Type) -> Expr {
    Expr::typed(
        line,
        ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        ty,
    )
}

fn cast_node(target: Type, expr: Expr) -> Expr {
    Expr::typed(
        expr.line,
        ExprKind::Cast {
            target: target.clone(),
            expr: Box::new(expr),
        },
        target,
    )
}

/// Internal name of the class whose members a value of `ty` has
fn class_name_of(ty: &Type) -> Option<String> {
    match ty {
        Type::String => Some(JAVA_LANG_STRING.to_string()),
        Type::Class(name) => Some(name.clone()),
        Type::Array(_) => Some(JAVA_LANG_OBJECT.to_string()),
        _ => None,
    }
}

fn is_interface_type(registry: &TypeRegistry, ty: &Type) -> bool {
    match ty {
        Type::Class(name) => registry.is_interface(name),
        _ => false,
    }
}

fn is_lvalue(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Local { .. } | ExprKind::ArrayAccess { .. } => true,
        ExprKind::FieldSelection { field, .. } => field.is_some() || expr.ty().is_any(),
        ExprKind::Wild => true,
        _ => false,
    }
}

/// Value of a constant case label
fn case_value(expr: &Expr) -> Option<i32> {
    match &expr.kind {
        ExprKind::Literal(literal @ (Literal::Int(_) | Literal::Char(_))) => literal.int_value(),
        _ => None,
    }
}

fn is_true_literal(expr: &Expr) -> bool {
    matches!(expr.kind, ExprKind::Literal(Literal::Boolean(true)))
}

fn can_complete_all(statements: &[Stmt]) -> bool {
    statements.iter().all(can_complete)
}

/// Conservative "can complete normally" used for missing-return detection
fn can_complete(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Return(_) | StmtKind::Throw(_) | StmtKind::Break | StmtKind::Continue => false,
        StmtKind::Block(block) => can_complete_all(&block.statements),
        StmtKind::If {
            then_branch,
            else_branch: Some(else_branch),
            ..
        } => can_complete(then_branch) || can_complete(else_branch),
        StmtKind::While { condition, body } => !is_true_literal(condition) || breaks_out(body),
        StmtKind::DoWhile { body, condition } => !is_true_literal(condition) || breaks_out(body),
        StmtKind::For { condition, body, .. } => {
            condition.as_ref().map_or(false, |c| !is_true_literal(c)) || breaks_out(body)
        }
        StmtKind::Switch { groups, .. } => {
            let has_default = groups
                .iter()
                .flat_map(|g| &g.labels)
                .any(|l| matches!(l, SwitchLabel::Default(_)));
            let any_break = groups.iter().flat_map(|g| &g.statements).any(breaks_out);
            let last_completes = groups.last().map_or(true, |g| can_complete_all(&g.statements));
            !has_default || any_break || last_completes
        }
        StmtKind::Try {
            block,
            catches,
            finally,
        } => {
            let body = can_complete_all(&block.statements)
                || catches.iter().any(|c| can_complete_all(&c.block.statements));
            body && finally.as_ref().map_or(true, |f| can_complete_all(&f.statements))
        }
        _ => true,
    }
}

/// Whether `stmt` contains a `break` that leaves the statement enclosing it
fn breaks_out(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Break => true,
        StmtKind::Block(block) => block.statements.iter().any(breaks_out),
        StmtKind::If {
            then_branch,
            else_branch,
            ..
        } => breaks_out(then_branch) || else_branch.as_deref().map_or(false, breaks_out),
        StmtKind::Try {
            block,
            catches,
            finally,
        } => {
            block.statements.iter().any(breaks_out)
                || catches.iter().any(|c| c.block.statements.iter().any(breaks_out))
                || finally.as_ref().map_or(false, |f| f.statements.iter().any(breaks_out))
        }
        // Nested loops and switches own their breaks
        _ => false,
    }
}
