//! Code generation for method bodies
//!
//! `MethodGen` walks an analyzed body and feeds an `InstructionSink`.
//! Conditions never materialize booleans when a branch will do: `gen_cond`
//! jumps to a label when the condition has a given sense and falls through
//! otherwise. Loops, switches and try statements push entries on a jump
//! stack so `break`, `continue` and `return` know where they go and which
//! `finally` blocks they must run on the way out.

use std::collections::BTreeMap;

use crate::ast::*;
use crate::codegen::code::{Code, Constant, InstructionSink, Label};
use crate::codegen::opcodes::*;
use crate::codegen::switch::{select_strategy, SwitchStrategy};
use crate::consts::{INIT, JAVA_LANG_OBJECT, JAVA_LANG_STRING, JAVA_LANG_STRING_BUILDER};
use crate::error::{Error, Result};
use crate::wash::registry::TypeRegistry;

/// Statement a `break`, `continue` or `return` may have to leave
enum Jump<'a> {
    Loop { break_label: Label, continue_label: Label },
    Switch { break_label: Label },
    Try {
        finally: Option<&'a Block>,
        /// Inlined exits, excluded from this statement's handler ranges
        gaps: Vec<(Label, Label)>,
    },
}

/// Storage an assignment or increment writes to
enum Place<'e> {
    Local { slot: u16, ty: &'e Type },
    Static { target: &'e Expr, field: &'e FieldRef },
    Field { target: &'e Expr, field: &'e FieldRef },
    Array { array: &'e Expr, index: &'e Expr, ty: &'e Type },
}

impl Place<'_> {
    /// Stack words taken by the place's address
    fn address_words(&self) -> u16 {
        match self {
            Place::Local { .. } | Place::Static { .. } => 0,
            Place::Field { .. } => 1,
            Place::Array { .. } => 2,
        }
    }
}

pub struct MethodGen<'a, S: InstructionSink> {
    registry: &'a TypeRegistry,
    sink: S,
    return_type: Type,
    jumps: Vec<Jump<'a>>,
    /// First slot above those assigned by analysis
    next_local: u16,
}

impl<'a, S: InstructionSink> MethodGen<'a, S> {
    pub fn new(registry: &'a TypeRegistry, mut sink: S, return_type: Type, locals: u16) -> Self {
        sink.reserve_locals(locals);
        Self {
            registry,
            sink,
            return_type,
            jumps: Vec::new(),
            next_local: locals,
        }
    }

    /// Lay out everything generated so far
    pub fn finish(self) -> Result<Code> {
        self.sink.write()
    }

    /// Append the implicit `return` of a void body that can fall off its end
    pub fn close_body(&mut self, statements: &[Stmt]) {
        if self.return_type == Type::Void && !ends_abruptly_all(statements) {
            self.emit(RETURN);
        }
    }

    fn temp_local(&mut self, ty: &Type) -> u16 {
        let slot = self.next_local;
        self.next_local += ty.word_size().max(1);
        slot
    }

    fn emit(&mut self, opcode: u8) {
        self.sink.add_no_arg_instruction(opcode);
    }

    fn branch(&mut self, opcode: u8, target: Label) {
        self.sink.add_branch_instruction(opcode, target);
    }

    fn label(&mut self) -> Label {
        self.sink.create_label()
    }

    fn place(&mut self, label: Label) {
        self.sink.add_label(label);
    }

    // Statements

    pub fn gen_block(&mut self, block: &'a Block) -> Result<()> {
        self.gen_stmts(&block.statements)
    }

    pub fn gen_stmts(&mut self, statements: &'a [Stmt]) -> Result<()> {
        statements.iter().try_for_each(|stmt| self.gen_stmt(stmt))
    }

    pub fn gen_stmt(&mut self, stmt: &'a Stmt) -> Result<()> {
        match &stmt.kind {
            StmtKind::Block(block) => self.gen_block(block),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => self.gen_if(condition, then_branch, else_branch.as_deref()),
            StmtKind::While { condition, body } => {
                let top = self.label();
                let end = self.label();
                self.place(top);
                self.gen_cond(condition, end, false)?;
                self.gen_loop_body(body, end, top)?;
                self.branch(GOTO, top);
                self.place(end);
                Ok(())
            }
            StmtKind::DoWhile { body, condition } => {
                let top = self.label();
                let next = self.label();
                let end = self.label();
                self.place(top);
                self.gen_loop_body(body, end, next)?;
                self.place(next);
                self.gen_cond(condition, top, true)?;
                self.place(end);
                Ok(())
            }
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                self.gen_stmts(init)?;
                let top = self.label();
                let next = self.label();
                let end = self.label();
                self.place(top);
                if let Some(condition) = condition {
                    self.gen_cond(condition, end, false)?;
                }
                self.gen_loop_body(body, end, next)?;
                self.place(next);
                self.gen_stmts(update)?;
                self.branch(GOTO, top);
                self.place(end);
                Ok(())
            }
            StmtKind::Switch { selector, groups } => self.gen_switch(selector, groups),
            StmtKind::Try {
                block,
                catches,
                finally,
            } => self.gen_try(block, catches, finally.as_ref()),
            StmtKind::Throw(expr) => {
                self.gen_expr(expr)?;
                self.emit(ATHROW);
                Ok(())
            }
            StmtKind::Return(value) => self.gen_return(value.as_ref()),
            StmtKind::Break => {
                let (depth, target) = self
                    .jumps
                    .iter()
                    .enumerate()
                    .rev()
                    .find_map(|(depth, jump)| match jump {
                        Jump::Loop { break_label, .. } | Jump::Switch { break_label } => Some((depth, *break_label)),
                        Jump::Try { .. } => None,
                    })
                    .ok_or_else(|| Error::internal_error(format!("line {}: break has no target", stmt.line)))?;
                self.exit_through(depth + 1, |gen| gen.branch(GOTO, target))
            }
            StmtKind::Continue => {
                let (depth, target) = self
                    .jumps
                    .iter()
                    .enumerate()
                    .rev()
                    .find_map(|(depth, jump)| match jump {
                        Jump::Loop { continue_label, .. } => Some((depth, *continue_label)),
                        _ => None,
                    })
                    .ok_or_else(|| Error::internal_error(format!("line {}: continue has no target", stmt.line)))?;
                self.exit_through(depth + 1, |gen| gen.branch(GOTO, target))
            }
            StmtKind::Empty => Ok(()),
            StmtKind::Expression(expr) => self.gen_statement_expr(expr),
            StmtKind::LocalVariables(declarators) => {
                for declarator in declarators {
                    let (Some(initializer), Some(slot)) = (&declarator.initializer, declarator.slot) else {
                        continue;
                    };
                    self.gen_expr(initializer)?;
                    self.sink.add_local_instruction(store_opcode(&declarator.ty), slot);
                }
                Ok(())
            }
        }
    }

    fn gen_if(&mut self, condition: &'a Expr, then_branch: &'a Stmt, else_branch: Option<&'a Stmt>) -> Result<()> {
        let end = self.label();
        match else_branch {
            None => {
                self.gen_cond(condition, end, false)?;
                self.gen_stmt(then_branch)?;
            }
            Some(else_branch) => {
                let otherwise = self.label();
                self.gen_cond(condition, otherwise, false)?;
                self.gen_stmt(then_branch)?;
                if !ends_abruptly(then_branch) {
                    self.branch(GOTO, end);
                }
                self.place(otherwise);
                self.gen_stmt(else_branch)?;
            }
        }
        self.place(end);
        Ok(())
    }

    fn gen_loop_body(&mut self, body: &'a Stmt, break_label: Label, continue_label: Label) -> Result<()> {
        self.jumps.push(Jump::Loop {
            break_label,
            continue_label,
        });
        let result = self.gen_stmt(body);
        self.jumps.pop();
        result
    }

    fn gen_return(&mut self, value: Option<&'a Expr>) -> Result<()> {
        let through_finally = self
            .jumps
            .iter()
            .any(|jump| matches!(jump, Jump::Try { finally: Some(_), .. }));
        let Some(value) = value else {
            return self.exit_through(0, |gen| gen.emit(RETURN));
        };
        self.gen_expr(value)?;
        let return_type = self.return_type.clone();
        let opcode = return_opcode(&return_type);
        if !through_finally {
            self.emit(opcode);
            return Ok(());
        }
        let slot = self.temp_local(&return_type);
        self.sink.add_local_instruction(store_opcode(&return_type), slot);
        self.exit_through(0, |gen| {
            gen.sink.add_local_instruction(load_opcode(&return_type), slot);
            gen.emit(opcode);
        })
    }

    /// Leave every jump scope above `keep`, running the `finally` blocks met
    /// on the way, then emit the jump itself
    fn exit_through(&mut self, keep: usize, jump: impl FnOnce(&mut Self)) -> Result<()> {
        let mut gap_starts = Vec::new();
        for depth in (keep..self.jumps.len()).rev() {
            let Jump::Try { finally, .. } = &self.jumps[depth] else {
                continue;
            };
            let finally = *finally;
            // Only scopes that get inlined code after them need a gap
            let runs_finally = self.jumps[keep..=depth]
                .iter()
                .any(|j| matches!(j, Jump::Try { finally: Some(_), .. }));
            if runs_finally {
                let start = self.label();
                self.place(start);
                gap_starts.push((depth, start));
            }
            if let Some(block) = finally {
                let inner = self.jumps.split_off(depth);
                let result = self.gen_block(block);
                self.jumps.extend(inner);
                result?;
            }
        }
        jump(self);
        if !gap_starts.is_empty() {
            let end = self.label();
            self.place(end);
            for (depth, start) in gap_starts {
                if let Some(Jump::Try { gaps, .. }) = self.jumps.get_mut(depth) {
                    gaps.push((start, end));
                }
            }
        }
        Ok(())
    }

    fn gen_switch(&mut self, selector: &'a Expr, groups: &'a [SwitchGroup]) -> Result<()> {
        self.gen_expr(selector)?;

        let end = self.label();
        let mut default = end;
        let mut cases = BTreeMap::new();
        let mut group_labels = Vec::with_capacity(groups.len());
        for group in groups {
            let label = self.label();
            for switch_label in &group.labels {
                match switch_label {
                    SwitchLabel::Default(_) => default = label,
                    SwitchLabel::Case(expr) => {
                        let value = case_constant(expr).ok_or_else(|| {
                            Error::internal_error(format!("line {}: case label is not a constant", expr.line))
                        })?;
                        cases.insert(value, label);
                    }
                }
            }
            group_labels.push(label);
        }

        let values: Vec<i32> = cases.keys().copied().collect();
        match select_strategy(&values) {
            SwitchStrategy::Table => {
                let (lo, hi) = (values[0], values[values.len() - 1]);
                let targets = (lo..=hi).map(|v| cases.get(&v).copied().unwrap_or(default)).collect();
                self.sink.add_tableswitch_instruction(default, lo, hi, targets);
            }
            SwitchStrategy::Lookup => {
                let count = cases.len();
                self.sink.add_lookupswitch_instruction(default, count, cases);
            }
        }

        self.jumps.push(Jump::Switch { break_label: end });
        let mut result = Ok(());
        for (group, label) in groups.iter().zip(group_labels) {
            self.place(label);
            result = self.gen_stmts(&group.statements);
            if result.is_err() {
                break;
            }
        }
        self.jumps.pop();
        result?;
        self.place(end);
        Ok(())
    }

    fn gen_try(&mut self, block: &'a Block, catches: &'a [CatchClause], finally: Option<&'a Block>) -> Result<()> {
        let start = self.label();
        let try_end = self.label();
        let done = self.label();

        self.place(start);
        let try_gaps = self.gen_protected(block, finally)?;
        self.place(try_end);
        if !ends_abruptly_all(&block.statements) {
            if let Some(finally) = finally {
                self.gen_block(finally)?;
            }
            self.branch(GOTO, done);
        }

        let try_ranges = segments(start, try_end, &try_gaps);
        let mut any_ranges = try_ranges.clone();
        for clause in catches {
            let handler = self.label();
            self.place(handler);
            let catch_type = clause.param.ty.internal_name();
            for &(from, to) in &try_ranges {
                self.sink.add_exception_handler(from, to, handler, Some(&catch_type));
            }
            let slot = clause
                .param
                .slot
                .ok_or_else(|| Error::internal_error(format!("line {}: catch parameter has no slot", clause.line)))?;
            self.sink.add_local_instruction(ASTORE, slot);

            let catch_start = self.label();
            let catch_end = self.label();
            self.place(catch_start);
            let catch_gaps = self.gen_protected(&clause.block, finally)?;
            self.place(catch_end);
            any_ranges.extend(segments(catch_start, catch_end, &catch_gaps));
            if !ends_abruptly_all(&clause.block.statements) {
                if let Some(finally) = finally {
                    self.gen_block(finally)?;
                }
                self.branch(GOTO, done);
            }
        }

        if let Some(finally) = finally {
            let handler = self.label();
            self.place(handler);
            for (from, to) in any_ranges {
                self.sink.add_exception_handler(from, to, handler, None);
            }
            let slot = self.temp_local(&Type::object());
            self.sink.add_local_instruction(ASTORE, slot);
            self.gen_block(finally)?;
            self.sink.add_local_instruction(ALOAD, slot);
            self.emit(ATHROW);
        }
        self.place(done);
        Ok(())
    }

    /// Generate a try or catch block inside its own jump scope, returning
    /// the ranges of inlined exits
    fn gen_protected(&mut self, block: &'a Block, finally: Option<&'a Block>) -> Result<Vec<(Label, Label)>> {
        self.jumps.push(Jump::Try {
            finally,
            gaps: Vec::new(),
        });
        let result = self.gen_block(block);
        let gaps = match self.jumps.pop() {
            Some(Jump::Try { gaps, .. }) => gaps,
            _ => Vec::new(),
        };
        result.map(|_| gaps)
    }

    fn gen_statement_expr(&mut self, expr: &'a Expr) -> Result<()> {
        match &expr.kind {
            ExprKind::Assign { op, lhs, rhs } => self.gen_assign(*op, lhs, rhs, false),
            ExprKind::IncDec { op, operand } => self.gen_inc_dec(*op, operand, expr.ty(), false),
            _ => {
                self.gen_expr(expr)?;
                match expr.ty().word_size() {
                    0 => {}
                    1 => self.emit(POP),
                    _ => self.emit(POP2),
                }
                Ok(())
            }
        }
    }

    // Field initializers

    /// `this.name = value` or `Owner.name = value` for a field declarator
    pub fn gen_field_initializer(&mut self, field: &FieldRef, value: &'a Expr) -> Result<()> {
        if field.is_static {
            self.gen_expr(value)?;
            self.sink
                .add_member_access_instruction(PUTSTATIC, &field.owner, &field.name, &field.descriptor);
        } else {
            self.sink.add_local_instruction(ALOAD, 0);
            self.gen_expr(value)?;
            self.sink
                .add_member_access_instruction(PUTFIELD, &field.owner, &field.name, &field.descriptor);
        }
        Ok(())
    }

    // Conditions

    /// Branch to `target` when `expr` evaluates to `on_true`, fall through otherwise
    pub fn gen_cond(&mut self, expr: &'a Expr, target: Label, on_true: bool) -> Result<()> {
        match &expr.kind {
            ExprKind::Literal(Literal::Boolean(value)) => {
                if *value == on_true {
                    self.branch(GOTO, target);
                }
                Ok(())
            }
            ExprKind::Unary {
                op: UnaryOp::Not,
                operand,
            } => self.gen_cond(operand, target, !on_true),
            ExprKind::Binary {
                op: BinaryOp::LogicalAnd,
                lhs,
                rhs,
            } => {
                if on_true {
                    let skip = self.label();
                    self.gen_cond(lhs, skip, false)?;
                    self.gen_cond(rhs, target, true)?;
                    self.place(skip);
                } else {
                    self.gen_cond(lhs, target, false)?;
                    self.gen_cond(rhs, target, false)?;
                }
                Ok(())
            }
            ExprKind::Binary {
                op: BinaryOp::LogicalOr,
                lhs,
                rhs,
            } => {
                if on_true {
                    self.gen_cond(lhs, target, true)?;
                    self.gen_cond(rhs, target, true)?;
                } else {
                    let skip = self.label();
                    self.gen_cond(lhs, skip, true)?;
                    self.gen_cond(rhs, target, false)?;
                    self.place(skip);
                }
                Ok(())
            }
            ExprKind::Binary { op, lhs, rhs } if op.is_relational() || op.is_equality() => {
                self.gen_comparison(*op, lhs, rhs, target, on_true)
            }
            _ => {
                self.gen_expr(expr)?;
                self.branch(if on_true { IFNE } else { IFEQ }, target);
                Ok(())
            }
        }
    }

    fn gen_comparison(&mut self, op: BinaryOp, lhs: &'a Expr, rhs: &'a Expr, target: Label, on_true: bool) -> Result<()> {
        let jump_op = if on_true {
            op
        } else {
            op.negate()
                .ok_or_else(|| Error::internal_error(format!("{} is not a comparison", op)))?
        };
        let operand_type = if *lhs.ty() == Type::Null { rhs.ty() } else { lhs.ty() };

        match operand_type.promoted() {
            Type::Long => {
                self.gen_expr(lhs)?;
                self.gen_expr(rhs)?;
                self.emit(LCMP);
                self.branch(if_zero_opcode(jump_op), target);
            }
            Type::Double => {
                self.gen_expr(lhs)?;
                self.gen_expr(rhs)?;
                // NaN must make `<` and `<=` false
                let compare = if matches!(op, BinaryOp::Lt | BinaryOp::Le) { DCMPG } else { DCMPL };
                self.emit(compare);
                self.branch(if_zero_opcode(jump_op), target);
            }
            ty if ty.is_reference() => {
                if is_null_literal(rhs) || is_null_literal(lhs) {
                    let value = if is_null_literal(rhs) { lhs } else { rhs };
                    self.gen_expr(value)?;
                    let opcode = if jump_op == BinaryOp::Eq { IFNULL } else { IFNONNULL };
                    self.branch(opcode, target);
                } else {
                    self.gen_expr(lhs)?;
                    self.gen_expr(rhs)?;
                    let opcode = if jump_op == BinaryOp::Eq { IF_ACMPEQ } else { IF_ACMPNE };
                    self.branch(opcode, target);
                }
            }
            _ => {
                self.gen_expr(lhs)?;
                if is_zero_literal(rhs) {
                    self.branch(if_zero_opcode(jump_op), target);
                } else {
                    self.gen_expr(rhs)?;
                    self.branch(if_icmp_opcode(jump_op), target);
                }
            }
        }
        Ok(())
    }

    /// Push 1 or 0 for a condition
    fn gen_boolean_value(&mut self, expr: &'a Expr) -> Result<()> {
        let otherwise = self.label();
        let end = self.label();
        self.gen_cond(expr, otherwise, false)?;
        self.emit(ICONST_1);
        self.branch(GOTO, end);
        self.place(otherwise);
        self.emit(ICONST_0);
        self.place(end);
        Ok(())
    }

    // Expressions

    pub fn gen_expr(&mut self, expr: &'a Expr) -> Result<()> {
        match &expr.kind {
            ExprKind::Literal(literal) => self.gen_literal(literal, expr.line),
            ExprKind::Local { slot, .. } => {
                self.sink.add_local_instruction(load_opcode(expr.ty()), *slot);
                Ok(())
            }
            ExprKind::This | ExprKind::Super => {
                self.sink.add_local_instruction(ALOAD, 0);
                Ok(())
            }
            ExprKind::FieldSelection { target, field, .. } => {
                let field = resolved(field.as_ref(), expr)?;
                if field.is_static {
                    self.gen_discarded_target(target)?;
                    self.sink
                        .add_member_access_instruction(GETSTATIC, &field.owner, &field.name, &field.descriptor);
                } else {
                    self.gen_expr(target)?;
                    self.sink
                        .add_member_access_instruction(GETFIELD, &field.owner, &field.name, &field.descriptor);
                }
                Ok(())
            }
            ExprKind::ArrayLength(array) => {
                self.gen_expr(array)?;
                self.emit(ARRAYLENGTH);
                Ok(())
            }
            ExprKind::ArrayAccess { array, index } => {
                self.gen_expr(array)?;
                self.gen_expr(index)?;
                self.emit(array_load_opcode(expr.ty()));
                Ok(())
            }
            ExprKind::MessageSend {
                target, args, method, ..
            } => {
                let method = resolved(method.as_ref(), expr)?;
                match (method.kind, target) {
                    (InvokeKind::Static, Some(target)) => self.gen_discarded_target(target)?,
                    (InvokeKind::Static, None) => {}
                    (_, Some(target)) => self.gen_expr(target)?,
                    (_, None) => self.sink.add_local_instruction(ALOAD, 0),
                }
                self.gen_args(args)?;
                let opcode = match method.kind {
                    InvokeKind::Static => INVOKESTATIC,
                    InvokeKind::Virtual => INVOKEVIRTUAL,
                    InvokeKind::Interface => INVOKEINTERFACE,
                    InvokeKind::Special => INVOKESPECIAL,
                };
                self.sink
                    .add_member_access_instruction(opcode, &method.owner, &method.name, &method.descriptor);
                Ok(())
            }
            ExprKind::SuperConstruction { args, ctor } | ExprKind::ThisConstruction { args, ctor } => {
                let ctor = resolved(ctor.as_ref(), expr)?;
                self.sink.add_local_instruction(ALOAD, 0);
                self.gen_args(args)?;
                self.sink
                    .add_member_access_instruction(INVOKESPECIAL, &ctor.owner, INIT, &ctor.descriptor);
                Ok(())
            }
            ExprKind::New { class, args, ctor } => {
                let ctor = resolved(ctor.as_ref(), expr)?;
                self.sink.add_reference_instruction(NEW, &class.internal_name());
                self.emit(DUP);
                self.gen_args(args)?;
                self.sink
                    .add_member_access_instruction(INVOKESPECIAL, &ctor.owner, INIT, &ctor.descriptor);
                Ok(())
            }
            ExprKind::NewArray { array_type, dims } => {
                self.gen_args(dims)?;
                if dims.len() > 1 {
                    let dims = u8::try_from(dims.len())
                        .map_err(|_| Error::internal_error(format!("line {}: too many array dimensions", expr.line)))?;
                    self.sink
                        .add_multianewarray_instruction(&array_type.descriptor(), dims);
                } else {
                    self.gen_new_array(array_type, expr.line)?;
                }
                Ok(())
            }
            ExprKind::ArrayInitializer { array_type, elements } => {
                let component = array_type.component().ok_or_else(|| {
                    Error::internal_error(format!("line {}: array initializer without an array type", expr.line))
                })?;
                self.push_int(elements.len() as i32);
                self.gen_new_array(array_type, expr.line)?;
                for (i, element) in elements.iter().enumerate() {
                    self.emit(DUP);
                    self.push_int(i as i32);
                    self.gen_expr(element)?;
                    self.emit(array_store_opcode(component));
                }
                Ok(())
            }
            ExprKind::Binary { op, lhs, rhs } => {
                if op.is_relational() || op.is_equality() || op.is_logical() {
                    return self.gen_boolean_value(expr);
                }
                self.gen_expr(lhs)?;
                self.gen_expr(rhs)?;
                self.emit(binary_opcode(*op, expr.ty()));
                Ok(())
            }
            ExprKind::StringConcat { .. } => {
                self.sink.add_reference_instruction(NEW, JAVA_LANG_STRING_BUILDER);
                self.emit(DUP);
                self.sink
                    .add_member_access_instruction(INVOKESPECIAL, JAVA_LANG_STRING_BUILDER, INIT, "()V");
                self.gen_appends(expr)?;
                self.invoke_to_string();
                Ok(())
            }
            ExprKind::InstanceOf { expr: operand, target } => {
                self.gen_expr(operand)?;
                self.sink.add_reference_instruction(INSTANCEOF, &target.internal_name());
                Ok(())
            }
            ExprKind::Unary { op, operand } => match op {
                UnaryOp::Not => self.gen_boolean_value(expr),
                UnaryOp::Plus => self.gen_expr(operand),
                UnaryOp::Neg => {
                    self.gen_expr(operand)?;
                    self.emit(match expr.ty() {
                        Type::Long => LNEG,
                        Type::Double => DNEG,
                        _ => INEG,
                    });
                    Ok(())
                }
                UnaryOp::BitNot => {
                    self.gen_expr(operand)?;
                    if *expr.ty() == Type::Long {
                        self.sink.add_ldc_instruction(Constant::Long(-1));
                        self.emit(LXOR);
                    } else {
                        self.emit(ICONST_M1);
                        self.emit(IXOR);
                    }
                    Ok(())
                }
            },
            ExprKind::IncDec { op, operand } => self.gen_inc_dec(*op, operand, expr.ty(), true),
            ExprKind::Cast { target, expr: operand } => {
                if let ExprKind::Literal(literal @ (Literal::Int(_) | Literal::Char(_))) = &operand.kind {
                    match (target, literal.int_value()) {
                        (Type::Long, Some(value)) => {
                            self.push_long(value as i64);
                            return Ok(());
                        }
                        (Type::Double, Some(value)) => {
                            self.push_double(value as f64);
                            return Ok(());
                        }
                        _ => {}
                    }
                }
                self.gen_expr(operand)?;
                self.gen_conversion(operand.ty(), target);
                Ok(())
            }
            ExprKind::Assign { op, lhs, rhs } => self.gen_assign(*op, lhs, rhs, true),
            ExprKind::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                let otherwise = self.label();
                let end = self.label();
                self.gen_cond(condition, otherwise, false)?;
                self.gen_expr(then_expr)?;
                self.branch(GOTO, end);
                self.place(otherwise);
                self.gen_expr(else_expr)?;
                self.place(end);
                Ok(())
            }
            ExprKind::TypeName(_) | ExprKind::Name(_) | ExprKind::Wild => Err(Error::internal_error(format!(
                "line {}: expression has no value to generate",
                expr.line
            ))),
        }
    }

    fn gen_args(&mut self, args: &'a [Expr]) -> Result<()> {
        args.iter().try_for_each(|arg| self.gen_expr(arg))
    }

    /// Evaluate the instance target of a static member for its side effects
    fn gen_discarded_target(&mut self, target: &'a Expr) -> Result<()> {
        if matches!(target.kind, ExprKind::TypeName(_)) {
            return Ok(());
        }
        self.gen_expr(target)?;
        self.emit(POP);
        Ok(())
    }

    /// One-dimensional array of `array_type` with the length on the stack
    fn gen_new_array(&mut self, array_type: &Type, line: usize) -> Result<()> {
        let component = array_type
            .component()
            .ok_or_else(|| Error::internal_error(format!("line {}: {} is not an array type", line, array_type)))?;
        let atype = match component {
            Type::Boolean => Some(atype::T_BOOLEAN),
            Type::Char => Some(atype::T_CHAR),
            Type::Double => Some(atype::T_DOUBLE),
            Type::Int => Some(atype::T_INT),
            Type::Long => Some(atype::T_LONG),
            _ => None,
        };
        match atype {
            Some(atype) => self.sink.add_one_arg_instruction(NEWARRAY, atype),
            None => self.sink.add_reference_instruction(ANEWARRAY, &component.internal_name()),
        }
        Ok(())
    }

    fn gen_literal(&mut self, literal: &Literal, line: usize) -> Result<()> {
        let invalid = || Error::internal_error(format!("line {}: invalid literal {}", line, literal));
        match literal {
            Literal::Int(_) | Literal::Char(_) => {
                let value = literal.int_value().ok_or_else(invalid)?;
                self.push_int(value);
            }
            Literal::Long(_) => {
                let value = literal.long_value().ok_or_else(invalid)?;
                self.push_long(value);
            }
            Literal::Double(_) => {
                let value = literal.double_value().ok_or_else(invalid)?;
                self.push_double(value);
            }
            Literal::String(_) => {
                let value = literal.string_value().ok_or_else(invalid)?;
                self.sink.add_ldc_instruction(Constant::String(value));
            }
            Literal::Boolean(value) => self.emit(if *value { ICONST_1 } else { ICONST_0 }),
            Literal::Null => self.emit(ACONST_NULL),
        }
        Ok(())
    }

    fn push_int(&mut self, value: i32) {
        match value {
            -1..=5 => self.emit((ICONST_0 as i32 + value) as u8),
            v if i8::try_from(v).is_ok() => self.sink.add_one_arg_instruction(BIPUSH, v),
            v if i16::try_from(v).is_ok() => self.sink.add_one_arg_instruction(SIPUSH, v),
            v => self.sink.add_ldc_instruction(Constant::Int(v)),
        }
    }

    fn push_long(&mut self, value: i64) {
        match value {
            0 => self.emit(LCONST_0),
            1 => self.emit(LCONST_1),
            v => self.sink.add_ldc_instruction(Constant::Long(v)),
        }
    }

    fn push_double(&mut self, value: f64) {
        if value == 0.0 && value.is_sign_positive() {
            self.emit(DCONST_0);
        } else if value == 1.0 {
            self.emit(DCONST_1);
        } else {
            self.sink.add_ldc_instruction(Constant::Double(value));
        }
    }

    /// Primitive conversions and reference casts
    fn gen_conversion(&mut self, from: &Type, to: &Type) {
        if from == to {
            return;
        }
        let opcodes: &[u8] = match (from, to) {
            (Type::Int | Type::Char, Type::Long) => &[I2L],
            (Type::Int | Type::Char, Type::Double) => &[I2D],
            (Type::Int, Type::Char) => &[I2C],
            (Type::Long, Type::Int) => &[L2I],
            (Type::Long, Type::Double) => &[L2D],
            (Type::Long, Type::Char) => &[L2I, I2C],
            (Type::Double, Type::Int) => &[D2I],
            (Type::Double, Type::Long) => &[D2L],
            (Type::Double, Type::Char) => &[D2I, I2C],
            (from, to) if to.is_reference() => {
                if !self.registry.is_assignable(from, to) {
                    self.sink.add_reference_instruction(CHECKCAST, &to.internal_name());
                }
                &[]
            }
            _ => &[],
        };
        for &opcode in opcodes {
            self.emit(opcode);
        }
    }

    // String concatenation

    /// Append every operand of a concatenation chain to the builder on the stack
    fn gen_appends(&mut self, expr: &'a Expr) -> Result<()> {
        match &expr.kind {
            ExprKind::StringConcat { lhs, rhs } => {
                self.gen_appends(lhs)?;
                self.gen_appends(rhs)
            }
            _ => {
                self.gen_expr(expr)?;
                self.invoke_append(expr.ty());
                Ok(())
            }
        }
    }

    fn invoke_append(&mut self, ty: &Type) {
        let argument = match ty {
            Type::Int | Type::Long | Type::Double | Type::Char | Type::Boolean | Type::String => ty.descriptor(),
            _ => format!("L{};", JAVA_LANG_OBJECT),
        };
        let descriptor = format!("({})L{};", argument, JAVA_LANG_STRING_BUILDER);
        self.sink
            .add_member_access_instruction(INVOKEVIRTUAL, JAVA_LANG_STRING_BUILDER, "append", &descriptor);
    }

    fn invoke_to_string(&mut self) {
        let descriptor = format!("()L{};", JAVA_LANG_STRING);
        self.sink
            .add_member_access_instruction(INVOKEVIRTUAL, JAVA_LANG_STRING_BUILDER, "toString", &descriptor);
    }

    // Assignment

    fn place_of(&self, expr: &'a Expr) -> Result<Place<'a>> {
        match &expr.kind {
            ExprKind::Local { slot, .. } => Ok(Place::Local {
                slot: *slot,
                ty: expr.ty(),
            }),
            ExprKind::FieldSelection { target, field, .. } => {
                let field = resolved(field.as_ref(), expr)?;
                if field.is_static {
                    Ok(Place::Static { target, field })
                } else {
                    Ok(Place::Field { target, field })
                }
            }
            ExprKind::ArrayAccess { array, index } => Ok(Place::Array {
                array,
                index,
                ty: expr.ty(),
            }),
            _ => Err(Error::internal_error(format!(
                "line {}: expression is not assignable",
                expr.line
            ))),
        }
    }

    fn gen_address(&mut self, place: &Place<'a>) -> Result<()> {
        match place {
            Place::Local { .. } => Ok(()),
            Place::Static { target, .. } => self.gen_discarded_target(target),
            Place::Field { target, .. } => self.gen_expr(target),
            Place::Array { array, index, .. } => {
                self.gen_expr(array)?;
                self.gen_expr(index)
            }
        }
    }

    fn dup_address(&mut self, place: &Place<'a>) {
        match place.address_words() {
            1 => self.emit(DUP),
            2 => self.emit(DUP2),
            _ => {}
        }
    }

    /// Load through an address already on the stack
    fn load_place(&mut self, place: &Place<'a>) {
        match place {
            Place::Local { slot, ty } => self.sink.add_local_instruction(load_opcode(ty), *slot),
            Place::Static { field, .. } => {
                self.sink
                    .add_member_access_instruction(GETSTATIC, &field.owner, &field.name, &field.descriptor)
            }
            Place::Field { field, .. } => {
                self.sink
                    .add_member_access_instruction(GETFIELD, &field.owner, &field.name, &field.descriptor)
            }
            Place::Array { ty, .. } => self.emit(array_load_opcode(ty)),
        }
    }

    fn store_place(&mut self, place: &Place<'a>) {
        match place {
            Place::Local { slot, ty } => self.sink.add_local_instruction(store_opcode(ty), *slot),
            Place::Static { field, .. } => {
                self.sink
                    .add_member_access_instruction(PUTSTATIC, &field.owner, &field.name, &field.descriptor)
            }
            Place::Field { field, .. } => {
                self.sink
                    .add_member_access_instruction(PUTFIELD, &field.owner, &field.name, &field.descriptor)
            }
            Place::Array { ty, .. } => self.emit(array_store_opcode(ty)),
        }
    }

    /// Copy the value on top of the stack below the place's address
    fn dup_value_under(&mut self, place: &Place<'a>, ty: &Type) {
        let opcode = match (place.address_words(), ty.word_size()) {
            (0, 2) => DUP2,
            (0, _) => DUP,
            (1, 2) => DUP2_X1,
            (1, _) => DUP_X1,
            (_, 2) => DUP2_X2,
            _ => DUP_X2,
        };
        self.emit(opcode);
    }

    fn gen_assign(&mut self, op: AssignOp, lhs: &'a Expr, rhs: &'a Expr, want_value: bool) -> Result<()> {
        let place = self.place_of(lhs)?;
        let ty = lhs.ty();

        let Some(binary) = op.binary_op() else {
            self.gen_address(&place)?;
            self.gen_expr(rhs)?;
            if want_value {
                self.dup_value_under(&place, ty);
            }
            self.store_place(&place);
            return Ok(());
        };

        if let (Place::Local { slot, ty: Type::Int }, Some(delta)) = (&place, iinc_delta(binary, rhs)) {
            self.sink.add_iinc_instruction(*slot, delta);
            if want_value {
                self.sink.add_local_instruction(ILOAD, *slot);
            }
            return Ok(());
        }

        self.gen_address(&place)?;
        self.dup_address(&place);
        self.load_place(&place);
        if binary == BinaryOp::Add && *ty == Type::String {
            let value_of = format!("(L{};)L{};", JAVA_LANG_OBJECT, JAVA_LANG_STRING);
            self.sink
                .add_member_access_instruction(INVOKESTATIC, JAVA_LANG_STRING, "valueOf", &value_of);
            self.sink.add_reference_instruction(NEW, JAVA_LANG_STRING_BUILDER);
            self.emit(DUP_X1);
            self.emit(SWAP);
            let init = format!("(L{};)V", JAVA_LANG_STRING);
            self.sink
                .add_member_access_instruction(INVOKESPECIAL, JAVA_LANG_STRING_BUILDER, INIT, &init);
            self.gen_appends(rhs)?;
            self.invoke_to_string();
        } else {
            self.gen_expr(rhs)?;
            self.emit(binary_opcode(binary, ty));
        }
        if want_value {
            self.dup_value_under(&place, ty);
        }
        self.store_place(&place);
        Ok(())
    }

    fn gen_inc_dec(&mut self, op: IncDecOp, operand: &'a Expr, ty: &Type, want_value: bool) -> Result<()> {
        let place = self.place_of(operand)?;

        if let Place::Local { slot, ty: Type::Int } = &place {
            if want_value && !op.is_prefix() {
                self.sink.add_local_instruction(ILOAD, *slot);
            }
            self.sink.add_iinc_instruction(*slot, op.delta());
            if want_value && op.is_prefix() {
                self.sink.add_local_instruction(ILOAD, *slot);
            }
            return Ok(());
        }

        self.gen_address(&place)?;
        self.dup_address(&place);
        self.load_place(&place);
        if want_value && !op.is_prefix() {
            self.dup_value_under(&place, ty);
        }
        let (one, binary) = match ty {
            Type::Long => (LCONST_1, if op.delta() > 0 { LADD } else { LSUB }),
            Type::Double => (DCONST_1, if op.delta() > 0 { DADD } else { DSUB }),
            _ => (ICONST_1, if op.delta() > 0 { IADD } else { ISUB }),
        };
        self.emit(one);
        self.emit(binary);
        if want_value && op.is_prefix() {
            self.dup_value_under(&place, ty);
        }
        self.store_place(&place);
        Ok(())
    }
}

fn resolved<'e, T>(value: Option<&'e T>, expr: &Expr) -> Result<&'e T> {
    value.ok_or_else(|| Error::internal_error(format!("line {}: unresolved member reference", expr.line)))
}

/// Remaining `[from, to)` ranges once the gaps are cut out
fn segments(from: Label, to: Label, gaps: &[(Label, Label)]) -> Vec<(Label, Label)> {
    let mut ranges = Vec::with_capacity(gaps.len() + 1);
    let mut start = from;
    for &(gap_start, gap_end) in gaps {
        ranges.push((start, gap_start));
        start = gap_end;
    }
    ranges.push((start, to));
    ranges
}

/// Integer constant of an analyzed case label
fn case_constant(expr: &Expr) -> Option<i32> {
    match &expr.kind {
        ExprKind::Literal(literal) => literal.int_value(),
        ExprKind::Cast { expr, .. } => case_constant(expr),
        _ => None,
    }
}

/// `IINC` operand for `x += c` / `x -= c` on an int local
fn iinc_delta(op: BinaryOp, rhs: &Expr) -> Option<i16> {
    let ExprKind::Literal(literal @ Literal::Int(_)) = &rhs.kind else {
        return None;
    };
    let value = literal.int_value()?;
    let delta = match op {
        BinaryOp::Add => value,
        BinaryOp::Sub => value.checked_neg()?,
        _ => return None,
    };
    i16::try_from(delta).ok()
}

fn is_null_literal(expr: &Expr) -> bool {
    matches!(expr.kind, ExprKind::Literal(Literal::Null))
}

fn is_zero_literal(expr: &Expr) -> bool {
    matches!(&expr.kind, ExprKind::Literal(literal @ (Literal::Int(_) | Literal::Char(_))) if literal.int_value() == Some(0))
}

/// Whether control cannot fall out of the end of `stmt`
pub fn ends_abruptly(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Return(_) | StmtKind::Throw(_) | StmtKind::Break | StmtKind::Continue => true,
        StmtKind::Block(block) => ends_abruptly_all(&block.statements),
        StmtKind::If {
            then_branch,
            else_branch: Some(else_branch),
            ..
        } => ends_abruptly(then_branch) && ends_abruptly(else_branch),
        _ => false,
    }
}

pub fn ends_abruptly_all(statements: &[Stmt]) -> bool {
    statements.last().map_or(false, ends_abruptly)
}

fn load_opcode(ty: &Type) -> u8 {
    match ty {
        Type::Int | Type::Char | Type::Boolean => ILOAD,
        Type::Long => LLOAD,
        Type::Double => DLOAD,
        _ => ALOAD,
    }
}

fn store_opcode(ty: &Type) -> u8 {
    match ty {
        Type::Int | Type::Char | Type::Boolean => ISTORE,
        Type::Long => LSTORE,
        Type::Double => DSTORE,
        _ => ASTORE,
    }
}

fn return_opcode(ty: &Type) -> u8 {
    match ty {
        Type::Void => RETURN,
        Type::Int | Type::Char | Type::Boolean => IRETURN,
        Type::Long => LRETURN,
        Type::Double => DRETURN,
        _ => ARETURN,
    }
}

fn array_load_opcode(element: &Type) -> u8 {
    match element {
        Type::Int => IALOAD,
        Type::Long => LALOAD,
        Type::Double => DALOAD,
        Type::Boolean => BALOAD,
        Type::Char => CALOAD,
        _ => AALOAD,
    }
}

fn array_store_opcode(element: &Type) -> u8 {
    match element {
        Type::Int => IASTORE,
        Type::Long => LASTORE,
        Type::Double => DASTORE,
        Type::Boolean => BASTORE,
        Type::Char => CASTORE,
        _ => AASTORE,
    }
}

/// Arithmetic, shift and bitwise opcodes by operand family
fn binary_opcode(op: BinaryOp, ty: &Type) -> u8 {
    let (int, long, double) = match op {
        BinaryOp::Add => (IADD, LADD, DADD),
        BinaryOp::Sub => (ISUB, LSUB, DSUB),
        BinaryOp::Mul => (IMUL, LMUL, DMUL),
        BinaryOp::Div => (IDIV, LDIV, DDIV),
        BinaryOp::Rem => (IREM, LREM, DREM),
        BinaryOp::Shl => (ISHL, LSHL, ISHL),
        BinaryOp::Shr => (ISHR, LSHR, ISHR),
        BinaryOp::Ushr => (IUSHR, LUSHR, IUSHR),
        BinaryOp::BitAnd => (IAND, LAND, IAND),
        BinaryOp::BitOr => (IOR, LOR, IOR),
        BinaryOp::BitXor => (IXOR, LXOR, IXOR),
        _ => (NOP, NOP, NOP),
    };
    match ty {
        Type::Long => long,
        Type::Double => double,
        _ => int,
    }
}

/// `IFxx` against zero, for the result of `LCMP`/`DCMPx` or an int
fn if_zero_opcode(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Eq => IFEQ,
        BinaryOp::Ne => IFNE,
        BinaryOp::Lt => IFLT,
        BinaryOp::Ge => IFGE,
        BinaryOp::Gt => IFGT,
        _ => IFLE,
    }
}

fn if_icmp_opcode(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Eq => IF_ICMPEQ,
        BinaryOp::Ne => IF_ICMPNE,
        BinaryOp::Lt => IF_ICMPLT,
        BinaryOp::Ge => IF_ICMPGE,
        BinaryOp::Gt => IF_ICMPGT,
        _ => IF_ICMPLE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::code::CodeBuffer;
    use crate::config::Config;
    use crate::parser::parse_source;
    use crate::wash::analyze;

    /// Analyze `class T { <member> }` and generate the body of method `m`
    fn method_code(member: &str) -> Code {
        let source = format!("class T {{ {} }}", member);
        let (unit, mut diags) = parse_source(&source, "T.java", &Config::default());
        let (unit, registry) = analyze(unit, &mut diags);
        assert!(!diags.error_has_occurred(), "{:?}", diags.entries());
        let TypeDecl::Class(class) = &unit.type_decls[0] else {
            panic!("expected a class");
        };
        let method = class
            .members
            .iter()
            .find_map(|m| match m {
                Member::Method(method) if method.name == "m" => Some(method),
                _ => None,
            })
            .expect("method m");
        let mut gen = MethodGen::new(&registry, CodeBuffer::new(0), method.return_type.clone(), method.locals);
        gen.gen_block(method.body.as_ref().expect("body")).expect("codegen");
        gen.finish().expect("layout")
    }

    #[test]
    fn test_small_constants() {
        let code = method_code("static int m() { return 5 + 100 + 1000 + 100000; }");
        assert_eq!(
            code.opcodes(),
            vec![ICONST_5, BIPUSH, IADD, SIPUSH, IADD, LDC, IADD, IRETURN]
        );
    }

    #[test]
    fn test_condition_branches_without_boolean() {
        let code = method_code("static void m(int a, int b) { while (a < b) { a++; } }");
        assert_eq!(code.count(IF_ICMPGE), 1);
        assert_eq!(code.count(ICONST_0), 0);
        assert_eq!(code.count(ICONST_1), 0);
        assert_eq!(code.count(IINC), 1);
    }

    #[test]
    fn test_compare_against_zero_and_null() {
        let code = method_code("static int m(int a, String s) { if (a > 0 && s != null) return 1; return 0; }");
        assert_eq!(code.count(IFLE), 1);
        assert_eq!(code.count(IFNULL), 1);
    }

    #[test]
    fn test_double_comparison_uses_nan_safe_compare() {
        let code = method_code("static boolean m(double a, double b) { return a < b; }");
        assert_eq!(code.count(DCMPG), 1);
        assert_eq!(code.count(IFGE), 1);
    }

    #[test]
    fn test_string_concatenation_uses_builder() {
        let code = method_code("static String m(int a) { return \"a\" + a + 'c'; }");
        assert_eq!(code.count(NEW), 1);
        assert_eq!(code.count(INVOKEVIRTUAL), 4);
    }

    #[test]
    fn test_field_compound_assignment_duplicates_value() {
        let code = method_code("long f; long m() { return f += 2; }");
        assert_eq!(
            code.opcodes(),
            vec![ALOAD_0, DUP, GETFIELD, LDC2_W, LADD, DUP2_X1, PUTFIELD, LRETURN]
        );
    }

    #[test]
    fn test_array_postfix_increment() {
        let code = method_code("static int m(int[] a) { return a[0]++; }");
        assert_eq!(
            code.opcodes(),
            vec![ALOAD_0, ICONST_0, DUP2, IALOAD, DUP_X2, ICONST_1, IADD, IASTORE, IRETURN]
        );
    }

    #[test]
    fn test_return_through_finally_saves_value() {
        let code = method_code("static int m(int a) { try { return a; } finally { a = 0; } }");
        // the normal path and the catch-any handler each run the finally code
        assert_eq!(code.count(ISTORE_0), 2);
        assert_eq!(code.exception_table.len(), 1);
        assert_eq!(code.exception_table[0].catch_type, None);
        assert_eq!(code.count(ATHROW), 1);
    }

    #[test]
    fn test_break_out_of_try_runs_finally_outside_handler_range() {
        let code = method_code(
            "static void m(int a) { while (true) { try { if (a > 0) break; a = 1; } finally { a = 2; } } }",
        );
        // try range is split around the inlined finally before the break
        let any: Vec<_> = code.exception_table.iter().filter(|e| e.catch_type.is_none()).collect();
        assert_eq!(any.len(), 2);
        assert!(any[0].end_pc <= any[1].start_pc);
    }

    #[test]
    fn test_exception_table_without_finally() {
        let code = method_code(
            "static void m() { try { m(); } catch (RuntimeException e) { } catch (Exception e) { } }",
        );
        assert_eq!(code.exception_table.len(), 2);
        let (a, b) = (&code.exception_table[0], &code.exception_table[1]);
        assert_eq!((a.start_pc, a.end_pc), (b.start_pc, b.end_pc));
        assert_ne!(a.handler_pc, b.handler_pc);
        assert_eq!(a.catch_type.as_deref(), Some("java/lang/RuntimeException"));
        assert_eq!(b.catch_type.as_deref(), Some("java/lang/Exception"));
    }
}
