//! Recursive descent parser for j--
//!
//! One method per grammar rule. Locally ambiguous alternatives are settled
//! by lookahead probes that record the scanner position, consume tokens,
//! and rewind before the real parse. Syntax errors follow a two-state
//! policy: the first mismatch in a run is reported, later ones silently
//! skip tokens until the parser resynchronizes.

use super::lexer::Token;
use super::scanner::LookaheadScanner;
use crate::ast::*;
use crate::config::Config;
use crate::diagnostics::Diagnostics;

/// Parser for j-- compilation units
pub struct Parser<'d> {
    scanner: LookaheadScanner,
    diagnostics: &'d mut Diagnostics,
    is_recovered: bool,
    max_depth: usize,
    depth: usize,
    depth_reported: bool,
}

impl<'d> Parser<'d> {
    /// Create a new parser from source code
    pub fn new(source: &str, diagnostics: &'d mut Diagnostics, config: &Config) -> Self {
        let scanner = LookaheadScanner::new(source, diagnostics);
        Self::with_scanner(scanner, diagnostics, config)
    }

    pub fn with_scanner(
        scanner: LookaheadScanner,
        diagnostics: &'d mut Diagnostics,
        config: &Config,
    ) -> Self {
        Self {
            scanner,
            diagnostics,
            is_recovered: true,
            max_depth: config.max_depth,
            depth: 0,
            depth_reported: false,
        }
    }

    // Matching primitives

    fn see(&self, sought: Token) -> bool {
        self.scanner.token().token == sought
    }

    fn have(&mut self, sought: Token) -> bool {
        if self.see(sought) {
            self.scanner.next();
            true
        } else {
            false
        }
    }

    fn must_be(&mut self, sought: Token) {
        if self.see(sought) {
            self.scanner.next();
            self.is_recovered = true;
        } else if self.is_recovered {
            let found = self.scanner.token().image().to_string();
            self.report_parser_error(format!("{} found where {} sought", found, sought.image()));
        } else {
            // Resynchronize without reporting the likely spurious follow-on error
            while !self.see(sought) && !self.see(Token::Eof) {
                self.scanner.next();
            }
            if self.see(sought) {
                self.scanner.next();
                self.is_recovered = true;
            }
        }
    }

    fn report_parser_error(&mut self, message: impl Into<String>) {
        self.is_recovered = false;
        let line = self.line();
        self.diagnostics.syntax_error(line, message);
    }

    fn line(&self) -> usize {
        self.scanner.token().line()
    }

    /// Consume an identifier and return its text
    fn identifier(&mut self) -> String {
        self.must_be(Token::Identifier);
        let previous = self.scanner.previous_token();
        if previous.token == Token::Identifier {
            previous.lexeme.clone()
        } else {
            String::new()
        }
    }

    /// Enter one nesting level; `false` once the depth bound is exceeded
    fn descend(&mut self) -> bool {
        self.depth += 1;
        if self.depth <= self.max_depth {
            return true;
        }
        if !self.depth_reported {
            self.depth_reported = true;
            self.report_parser_error(format!("Nesting deeper than {} levels", self.max_depth));
        }
        if !self.see(Token::Eof) {
            self.scanner.next();
        }
        false
    }

    fn ascend(&mut self) {
        self.depth -= 1;
    }

    /// One more level for a left-folded chain; the caller gives back
    /// `folds` levels once the chain is complete
    fn deepen(&mut self, folds: &mut usize) -> bool {
        *folds += 1;
        self.descend()
    }

    // Lookahead

    fn see_ident_lparen(&mut self) -> bool {
        self.scanner.record_position();
        let result = self.have(Token::Identifier) && self.see(Token::LParen);
        self.scanner.return_to_position();
        result
    }

    fn see_cast(&mut self) -> bool {
        self.scanner.record_position();
        let result = self.probe_cast();
        self.scanner.return_to_position();
        result
    }

    fn probe_cast(&mut self) -> bool {
        if !self.have(Token::LParen) {
            return false;
        }
        if self.see_basic_type() {
            return true;
        }
        if !self.have(Token::Identifier) {
            return false;
        }
        while self.have(Token::Dot) {
            if !self.have(Token::Identifier) {
                return false;
            }
        }
        while self.have(Token::LBracket) {
            if !self.have(Token::RBracket) {
                return false;
            }
        }
        self.have(Token::RParen)
    }

    fn see_local_variable_declaration(&mut self) -> bool {
        self.scanner.record_position();
        let result = self.probe_local_variable_declaration();
        self.scanner.return_to_position();
        result
    }

    fn probe_local_variable_declaration(&mut self) -> bool {
        if self.have(Token::Identifier) {
            while self.have(Token::Dot) {
                if !self.have(Token::Identifier) {
                    return false;
                }
            }
        } else if self.see_basic_type() {
            self.scanner.next();
        } else {
            return false;
        }
        while self.have(Token::LBracket) {
            if !self.have(Token::RBracket) {
                return false;
            }
        }
        if !self.have(Token::Identifier) {
            return false;
        }
        while self.have(Token::LBracket) {
            if !self.have(Token::RBracket) {
                return false;
            }
        }
        true
    }

    fn see_basic_type(&self) -> bool {
        self.scanner.token().token.is_basic_type()
    }

    fn see_reference_type(&mut self) -> bool {
        if self.see(Token::Identifier) {
            return true;
        }
        self.scanner.record_position();
        let result = self.see_basic_type() && {
            self.scanner.next();
            self.have(Token::LBracket) && self.see(Token::RBracket)
        };
        self.scanner.return_to_position();
        result
    }

    fn see_dims(&mut self) -> bool {
        self.scanner.record_position();
        let result = self.have(Token::LBracket) && self.see(Token::RBracket);
        self.scanner.return_to_position();
        result
    }

    // Compilation unit and declarations

    /// Parse a whole compilation unit; always reaches end of input
    pub fn compilation_unit(&mut self) -> CompilationUnit {
        let package = if self.have(Token::Package) {
            let name = self.qualified_identifier();
            self.must_be(Token::Semicolon);
            Some(name)
        } else {
            None
        };

        let mut imports = Vec::new();
        while self.have(Token::Import) {
            imports.push(self.qualified_identifier());
            self.must_be(Token::Semicolon);
        }

        let mut type_decls = Vec::new();
        while !self.see(Token::Eof) {
            let before = self.scanner.position();
            if let Some(decl) = self.type_declaration() {
                type_decls.push(decl);
            }
            self.ensure_progress(before);
        }
        self.must_be(Token::Eof);

        CompilationUnit {
            file_name: self.diagnostics.file_name().to_string(),
            package,
            imports,
            type_decls,
        }
    }

    /// Skip one token when a loop iteration consumed nothing
    fn ensure_progress(&mut self, before: usize) {
        if self.scanner.position() == before && !self.see(Token::Eof) {
            self.scanner.next();
        }
    }

    fn qualified_identifier(&mut self) -> QualifiedName {
        let line = self.line();
        let mut segments = vec![self.identifier()];
        while self.have(Token::Dot) {
            segments.push(self.identifier());
        }
        QualifiedName { line, segments }
    }

    fn qualified_type(&mut self) -> Type {
        Type::Class(self.qualified_identifier().to_string())
    }

    fn qualified_type_list(&mut self) -> Vec<Type> {
        let mut list = Vec::new();
        loop {
            list.push(self.qualified_type());
            if !self.have(Token::Comma) {
                break;
            }
        }
        list
    }

    fn type_declaration(&mut self) -> Option<TypeDecl> {
        let mods = self.modifiers();
        if self.see(Token::Class) {
            Some(TypeDecl::Class(self.class_declaration(mods)))
        } else if self.see(Token::Interface) {
            Some(TypeDecl::Interface(self.interface_declaration(mods)))
        } else {
            let found = self.scanner.token().image().to_string();
            self.report_parser_error(format!("class or interface sought where {} found", found));
            None
        }
    }

    fn modifiers(&mut self) -> Modifiers {
        let mut mods = Modifiers::default();
        loop {
            let modifier = match self.scanner.token().token {
                Token::Public => Modifier::Public,
                Token::Protected => Modifier::Protected,
                Token::Private => Modifier::Private,
                Token::Static => Modifier::Static,
                Token::Abstract => Modifier::Abstract,
                _ => break,
            };
            self.scanner.next();
            if mods.has(modifier) {
                self.report_parser_error(format!("Repeated modifier: {}", modifier));
            }
            let access = [Modifier::Public, Modifier::Protected, Modifier::Private];
            if access.contains(&modifier) && access.iter().any(|m| *m != modifier && mods.has(*m)) {
                self.report_parser_error("Access conflict in modifiers");
            }
            mods.add(modifier);
        }
        mods
    }

    fn class_declaration(&mut self, modifiers: Modifiers) -> ClassDecl {
        let line = self.line();
        self.must_be(Token::Class);
        let name = self.identifier();
        let super_class = if self.have(Token::Extends) {
            Some(self.qualified_type())
        } else {
            None
        };
        let interfaces = if self.have(Token::Implements) {
            self.qualified_type_list()
        } else {
            Vec::new()
        };
        let members = self.class_body();
        ClassDecl {
            line,
            modifiers,
            name,
            super_class,
            interfaces,
            members,
        }
    }

    fn interface_declaration(&mut self, modifiers: Modifiers) -> InterfaceDecl {
        let line = self.line();
        self.must_be(Token::Interface);
        let name = self.identifier();
        let extends = if self.have(Token::Extends) {
            self.qualified_type_list()
        } else {
            Vec::new()
        };

        let mut members = Vec::new();
        self.must_be(Token::LBrace);
        while !self.see(Token::RBrace) && !self.see(Token::Eof) {
            let before = self.scanner.position();
            let mods = self.modifiers();
            members.push(self.interface_member_decl(mods));
            self.ensure_progress(before);
        }
        self.must_be(Token::RBrace);

        InterfaceDecl {
            line,
            modifiers,
            name,
            extends,
            members,
        }
    }

    fn class_body(&mut self) -> Vec<Member> {
        let mut members = Vec::new();
        self.must_be(Token::LBrace);
        while !self.see(Token::RBrace) && !self.see(Token::Eof) {
            let before = self.scanner.position();
            let mods = self.modifiers();
            members.push(self.member_decl(mods));
            self.ensure_progress(before);
        }
        self.must_be(Token::RBrace);
        members
    }

    fn throws_clause(&mut self) -> Vec<Type> {
        if self.have(Token::Throws) {
            self.qualified_type_list()
        } else {
            Vec::new()
        }
    }

    fn member_decl(&mut self, modifiers: Modifiers) -> Member {
        let line = self.line();
        if self.see_ident_lparen() {
            let name = self.identifier();
            let params = self.formal_parameters();
            let throws = self.throws_clause();
            let body = self.block();
            return Member::Constructor(ConstructorDecl {
                line,
                modifiers,
                name,
                params,
                throws,
                body,
                locals: 0,
            });
        }

        let return_type = if self.have(Token::Void) {
            Type::Void
        } else {
            let ty = self.parse_type();
            if !self.see_ident_lparen() {
                let declarators = self.variable_declarators(&ty);
                self.must_be(Token::Semicolon);
                return Member::Field(FieldDecl {
                    line,
                    modifiers,
                    declarators,
                });
            }
            ty
        };

        let name = self.identifier();
        let params = self.formal_parameters();
        let throws = self.throws_clause();
        let body = if self.have(Token::Semicolon) {
            None
        } else {
            Some(self.block())
        };
        Member::Method(MethodDecl {
            line,
            modifiers,
            return_type,
            name,
            params,
            throws,
            body,
            locals: 0,
        })
    }

    /// Interface members are abstract method headers, implicitly public
    fn interface_member_decl(&mut self, mut modifiers: Modifiers) -> Member {
        let line = self.line();
        let return_type = if self.have(Token::Void) {
            Type::Void
        } else {
            self.parse_type()
        };
        let name = self.identifier();
        let params = self.formal_parameters();
        let throws = self.throws_clause();
        self.must_be(Token::Semicolon);
        modifiers.add(Modifier::Public);
        modifiers.add(Modifier::Abstract);
        Member::Method(MethodDecl {
            line,
            modifiers,
            return_type,
            name,
            params,
            throws,
            body: None,
            locals: 0,
        })
    }

    fn formal_parameters(&mut self) -> Vec<FormalParameter> {
        let mut params = Vec::new();
        self.must_be(Token::LParen);
        if self.have(Token::RParen) {
            return params;
        }
        loop {
            params.push(self.formal_parameter());
            if !self.have(Token::Comma) {
                break;
            }
        }
        self.must_be(Token::RParen);
        params
    }

    fn formal_parameter(&mut self) -> FormalParameter {
        let line = self.line();
        let ty = self.parse_type();
        let name = self.identifier();
        FormalParameter {
            line,
            name,
            ty,
            slot: None,
        }
    }

    // Statements

    fn block(&mut self) -> Block {
        let line = self.line();
        let mut statements = Vec::new();
        self.must_be(Token::LBrace);
        while !self.see(Token::RBrace) && !self.see(Token::Eof) {
            let before = self.scanner.position();
            statements.push(self.block_statement());
            self.ensure_progress(before);
        }
        self.must_be(Token::RBrace);
        Block { line, statements }
    }

    fn block_statement(&mut self) -> Stmt {
        if self.see_local_variable_declaration() {
            self.local_variable_declaration_statement()
        } else {
            self.statement()
        }
    }

    fn statement(&mut self) -> Stmt {
        let line = self.line();
        if !self.descend() {
            self.ascend();
            return Stmt::new(line, StmtKind::Empty);
        }
        let kind = self.statement_kind();
        self.ascend();
        Stmt::new(line, kind)
    }

    fn statement_kind(&mut self) -> StmtKind {
        if self.see(Token::LBrace) {
            StmtKind::Block(self.block())
        } else if self.have(Token::If) {
            let condition = self.par_expression();
            let then_branch = Box::new(self.statement());
            let else_branch = if self.have(Token::Else) {
                Some(Box::new(self.statement()))
            } else {
                None
            };
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            }
        } else if self.have(Token::While) {
            let condition = self.par_expression();
            let body = Box::new(self.statement());
            StmtKind::While { condition, body }
        } else if self.have(Token::Do) {
            let body = Box::new(self.statement());
            self.must_be(Token::While);
            let condition = self.par_expression();
            self.must_be(Token::Semicolon);
            StmtKind::DoWhile { body, condition }
        } else if self.have(Token::For) {
            self.for_statement()
        } else if self.have(Token::Switch) {
            self.switch_statement()
        } else if self.have(Token::Try) {
            self.try_statement()
        } else if self.have(Token::Return) {
            if self.have(Token::Semicolon) {
                StmtKind::Return(None)
            } else {
                let expr = self.expression();
                self.must_be(Token::Semicolon);
                StmtKind::Return(Some(expr))
            }
        } else if self.have(Token::Throw) {
            let expr = self.expression();
            self.must_be(Token::Semicolon);
            StmtKind::Throw(expr)
        } else if self.have(Token::Break) {
            self.skip_jump_labels();
            StmtKind::Break
        } else if self.have(Token::Continue) {
            self.skip_jump_labels();
            StmtKind::Continue
        } else if self.have(Token::Semicolon) {
            StmtKind::Empty
        } else {
            let expr = self.statement_expression();
            self.must_be(Token::Semicolon);
            StmtKind::Expression(expr)
        }
    }

    /// Labels after `break`/`continue` are consumed but not resolved
    fn skip_jump_labels(&mut self) {
        while !self.have(Token::Semicolon) {
            if self.see(Token::Eof) {
                self.must_be(Token::Semicolon);
                return;
            }
            let before = self.scanner.position();
            self.must_be(Token::Identifier);
            self.ensure_progress(before);
        }
    }

    fn for_statement(&mut self) -> StmtKind {
        self.must_be(Token::LParen);
        let init = if self.see(Token::Semicolon) {
            Vec::new()
        } else {
            self.for_init()
        };
        self.must_be(Token::Semicolon);
        let condition = if self.see(Token::Semicolon) {
            None
        } else {
            Some(self.expression())
        };
        self.must_be(Token::Semicolon);
        let update = if self.see(Token::RParen) {
            Vec::new()
        } else {
            self.statement_expression_list()
        };
        self.must_be(Token::RParen);
        let body = Box::new(self.statement());
        StmtKind::For {
            init,
            condition,
            update,
            body,
        }
    }

    fn for_init(&mut self) -> Vec<Stmt> {
        if self.see_local_variable_declaration() {
            let line = self.line();
            let ty = self.parse_type();
            let declarators = self.variable_declarators(&ty);
            vec![Stmt::new(line, StmtKind::LocalVariables(declarators))]
        } else {
            self.statement_expression_list()
        }
    }

    fn statement_expression_list(&mut self) -> Vec<Stmt> {
        let mut statements = Vec::new();
        loop {
            let line = self.line();
            let expr = self.statement_expression();
            statements.push(Stmt::new(line, StmtKind::Expression(expr)));
            if !self.have(Token::Comma) {
                break;
            }
        }
        statements
    }

    fn switch_statement(&mut self) -> StmtKind {
        let selector = self.par_expression();
        let mut groups = Vec::new();
        self.must_be(Token::LBrace);
        while !self.see(Token::RBrace) && !self.see(Token::Eof) {
            let before = self.scanner.position();
            groups.push(self.switch_block_statement_group());
            self.ensure_progress(before);
        }
        self.must_be(Token::RBrace);
        StmtKind::Switch { selector, groups }
    }

    fn switch_block_statement_group(&mut self) -> SwitchGroup {
        let mut labels = Vec::new();
        loop {
            labels.push(self.switch_label());
            if !self.see(Token::Case) && !self.see(Token::Default) {
                break;
            }
        }

        let mut statements = Vec::new();
        while !self.see(Token::Case)
            && !self.see(Token::Default)
            && !self.see(Token::RBrace)
            && !self.see(Token::Eof)
        {
            let before = self.scanner.position();
            statements.push(self.block_statement());
            self.ensure_progress(before);
        }
        SwitchGroup { labels, statements }
    }

    fn switch_label(&mut self) -> SwitchLabel {
        let line = self.line();
        if self.have(Token::Case) {
            let expr = self.expression();
            self.must_be(Token::Colon);
            SwitchLabel::Case(expr)
        } else {
            self.must_be(Token::Default);
            self.must_be(Token::Colon);
            SwitchLabel::Default(line)
        }
    }

    fn try_statement(&mut self) -> StmtKind {
        let block = self.block();
        let mut catches = Vec::new();
        while self.see(Token::Catch) {
            let line = self.line();
            self.scanner.next();
            self.must_be(Token::LParen);
            let param = self.formal_parameter();
            self.must_be(Token::RParen);
            let body = self.block();
            catches.push(CatchClause {
                line,
                param,
                block: body,
            });
        }
        let finally = if self.have(Token::Finally) {
            Some(self.block())
        } else {
            None
        };
        if catches.is_empty() && finally.is_none() {
            let found = self.scanner.token().image().to_string();
            self.report_parser_error(format!("catch or finally sought where {} found", found));
        }
        StmtKind::Try {
            block,
            catches,
            finally,
        }
    }

    fn par_expression(&mut self) -> Expr {
        self.must_be(Token::LParen);
        let expr = self.expression();
        self.must_be(Token::RParen);
        expr
    }

    fn local_variable_declaration_statement(&mut self) -> Stmt {
        let line = self.line();
        let ty = self.parse_type();
        let declarators = self.variable_declarators(&ty);
        self.must_be(Token::Semicolon);
        Stmt::new(line, StmtKind::LocalVariables(declarators))
    }

    fn variable_declarators(&mut self, ty: &Type) -> Vec<VariableDeclarator> {
        let mut declarators = Vec::new();
        loop {
            declarators.push(self.variable_declarator(ty));
            if !self.have(Token::Comma) {
                break;
            }
        }
        declarators
    }

    fn variable_declarator(&mut self, ty: &Type) -> VariableDeclarator {
        let line = self.line();
        let name = self.identifier();
        let mut ty = ty.clone();
        while self.see_dims() {
            self.must_be(Token::LBracket);
            self.must_be(Token::RBracket);
            ty = ty.array_of();
        }
        let initializer = if self.have(Token::Assign) {
            Some(self.variable_initializer(&ty))
        } else {
            None
        };
        VariableDeclarator {
            line,
            name,
            ty,
            initializer,
            slot: None,
        }
    }

    fn variable_initializer(&mut self, ty: &Type) -> Expr {
        if self.see(Token::LBrace) {
            self.array_initializer(ty)
        } else {
            self.expression()
        }
    }

    fn array_initializer(&mut self, array_type: &Type) -> Expr {
        let line = self.line();
        let component = array_type.component().cloned().unwrap_or(Type::Any);
        let mut elements = Vec::new();
        self.must_be(Token::LBrace);
        if !self.descend() {
            self.ascend();
            return Expr::wild(line);
        }
        if !self.have(Token::RBrace) {
            elements.push(self.variable_initializer(&component));
            while self.have(Token::Comma) {
                if self.see(Token::RBrace) {
                    break;
                }
                elements.push(self.variable_initializer(&component));
            }
            self.must_be(Token::RBrace);
        }
        self.ascend();
        Expr::new(
            line,
            ExprKind::ArrayInitializer {
                array_type: array_type.clone(),
                elements,
            },
        )
    }

    fn arguments(&mut self) -> Vec<Expr> {
        let mut args = Vec::new();
        self.must_be(Token::LParen);
        if self.have(Token::RParen) {
            return args;
        }
        loop {
            args.push(self.expression());
            if !self.have(Token::Comma) {
                break;
            }
        }
        self.must_be(Token::RParen);
        args
    }

    // Types

    fn parse_type(&mut self) -> Type {
        if self.see_reference_type() {
            self.reference_type()
        } else {
            self.basic_type()
        }
    }

    fn basic_type(&mut self) -> Type {
        let ty = match self.scanner.token().token {
            Token::Boolean => Type::Boolean,
            Token::Char => Type::Char,
            Token::Int => Type::Int,
            Token::Long => Type::Long,
            Token::Double => Type::Double,
            _ => {
                let found = self.scanner.token().image().to_string();
                self.report_parser_error(format!("Type sought where {} found", found));
                return Type::Any;
            }
        };
        self.scanner.next();
        ty
    }

    fn reference_type(&mut self) -> Type {
        let mut ty = if self.see(Token::Identifier) {
            self.qualified_type()
        } else {
            let basic = self.basic_type();
            self.must_be(Token::LBracket);
            self.must_be(Token::RBracket);
            basic.array_of()
        };
        while self.see_dims() {
            self.must_be(Token::LBracket);
            self.must_be(Token::RBracket);
            ty = ty.array_of();
        }
        ty
    }

    // Expressions

    fn statement_expression(&mut self) -> Expr {
        let mut expr = self.expression();
        let has_side_effect = matches!(
            expr.kind,
            ExprKind::Assign { .. }
                | ExprKind::IncDec { .. }
                | ExprKind::MessageSend { .. }
                | ExprKind::SuperConstruction { .. }
                | ExprKind::ThisConstruction { .. }
                | ExprKind::New { .. }
                | ExprKind::NewArray { .. }
        );
        if has_side_effect {
            expr.is_statement_expression = true;
        } else if !matches!(expr.kind, ExprKind::Wild) {
            self.report_parser_error("Invalid statement expression; it does not have a side-effect");
        }
        expr
    }

    /// Parse one expression
    pub fn expression(&mut self) -> Expr {
        let line = self.line();
        if !self.descend() {
            self.ascend();
            return Expr::wild(line);
        }
        let expr = self.assignment_expression();
        self.ascend();
        expr
    }

    fn assignment_expression(&mut self) -> Expr {
        let line = self.line();
        let lhs = self.conditional_expression();
        let op = match self.scanner.token().token {
            Token::Assign => AssignOp::Assign,
            Token::AddAssign => AssignOp::Add,
            Token::SubAssign => AssignOp::Sub,
            Token::MulAssign => AssignOp::Mul,
            Token::DivAssign => AssignOp::Div,
            Token::ModAssign => AssignOp::Rem,
            Token::LShiftAssign => AssignOp::Shl,
            Token::RShiftAssign => AssignOp::Shr,
            Token::URShiftAssign => AssignOp::Ushr,
            Token::AndAssign => AssignOp::And,
            Token::OrAssign => AssignOp::Or,
            Token::XorAssign => AssignOp::Xor,
            _ => return lhs,
        };
        self.scanner.next();
        let rhs = self.expression();
        Expr::new(
            line,
            ExprKind::Assign {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        )
    }

    fn conditional_expression(&mut self) -> Expr {
        let line = self.line();
        let condition = self.binary_level(0);
        if !self.have(Token::Question) {
            return condition;
        }
        let then_expr = self.expression();
        self.must_be(Token::Colon);
        let else_expr = if self.descend() {
            self.conditional_expression()
        } else {
            Expr::wild(line)
        };
        self.ascend();
        Expr::new(
            line,
            ExprKind::Conditional {
                condition: Box::new(condition),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
        )
    }

    /// Left-associative binary levels, loosest first; relational is
    /// handled apart since it is non-associative
    fn binary_level(&mut self, level: usize) -> Expr {
        const LEVELS: &[&[(Token, BinaryOp)]] = &[
            &[(Token::PipePipe, BinaryOp::LogicalOr)],
            &[(Token::AndAnd, BinaryOp::LogicalAnd)],
            &[(Token::Pipe, BinaryOp::BitOr)],
            &[(Token::Caret, BinaryOp::BitXor)],
            &[(Token::Amp, BinaryOp::BitAnd)],
            &[(Token::Eq, BinaryOp::Eq), (Token::Ne, BinaryOp::Ne)],
        ];
        if level == LEVELS.len() {
            return self.relational_expression();
        }
        let line = self.line();
        let mut lhs = self.binary_level(level + 1);
        let mut folds = 0;
        while let Some(op) = self.have_operator(LEVELS[level]) {
            if !self.deepen(&mut folds) {
                break;
            }
            let rhs = self.binary_level(level + 1);
            lhs = binary(line, op, lhs, rhs);
        }
        self.depth -= folds;
        lhs
    }

    fn have_operator(&mut self, ops: &[(Token, BinaryOp)]) -> Option<BinaryOp> {
        let current = self.scanner.token().token;
        let op = ops.iter().find(|(token, _)| *token == current).map(|(_, op)| *op)?;
        self.scanner.next();
        Some(op)
    }

    fn relational_expression(&mut self) -> Expr {
        let line = self.line();
        let lhs = self.shift_expression();
        if self.have(Token::InstanceOf) {
            let target = self.reference_type();
            return Expr::new(
                line,
                ExprKind::InstanceOf {
                    expr: Box::new(lhs),
                    target,
                },
            );
        }
        match self.have_operator(&[
            (Token::Gt, BinaryOp::Gt),
            (Token::Le, BinaryOp::Le),
            (Token::Ge, BinaryOp::Ge),
            (Token::Lt, BinaryOp::Lt),
        ]) {
            Some(op) => {
                let rhs = self.shift_expression();
                binary(line, op, lhs, rhs)
            }
            None => lhs,
        }
    }

    fn shift_expression(&mut self) -> Expr {
        let line = self.line();
        let mut lhs = self.additive_expression();
        let mut folds = 0;
        while let Some(op) = self.have_operator(&[
            (Token::LShift, BinaryOp::Shl),
            (Token::RShift, BinaryOp::Shr),
            (Token::URShift, BinaryOp::Ushr),
        ]) {
            if !self.deepen(&mut folds) {
                break;
            }
            let rhs = self.additive_expression();
            lhs = binary(line, op, lhs, rhs);
        }
        self.depth -= folds;
        lhs
    }

    fn additive_expression(&mut self) -> Expr {
        let line = self.line();
        let mut lhs = self.multiplicative_expression();
        let mut folds = 0;
        while let Some(op) =
            self.have_operator(&[(Token::Plus, BinaryOp::Add), (Token::Minus, BinaryOp::Sub)])
        {
            if !self.deepen(&mut folds) {
                break;
            }
            let rhs = self.multiplicative_expression();
            lhs = binary(line, op, lhs, rhs);
        }
        self.depth -= folds;
        lhs
    }

    fn multiplicative_expression(&mut self) -> Expr {
        let line = self.line();
        let mut lhs = self.unary_expression();
        let mut folds = 0;
        while let Some(op) = self.have_operator(&[
            (Token::Star, BinaryOp::Mul),
            (Token::Slash, BinaryOp::Div),
            (Token::Percent, BinaryOp::Rem),
        ]) {
            if !self.deepen(&mut folds) {
                break;
            }
            let rhs = self.unary_expression();
            lhs = binary(line, op, lhs, rhs);
        }
        self.depth -= folds;
        lhs
    }

    fn unary_expression(&mut self) -> Expr {
        let line = self.line();
        if !self.descend() {
            self.ascend();
            return Expr::wild(line);
        }
        let expr = if self.have(Token::Inc) {
            inc_dec(line, IncDecOp::PreInc, self.unary_expression())
        } else if self.have(Token::Dec) {
            inc_dec(line, IncDecOp::PreDec, self.unary_expression())
        } else if self.have(Token::Minus) {
            unary(line, UnaryOp::Neg, self.unary_expression())
        } else if self.have(Token::Plus) {
            unary(line, UnaryOp::Plus, self.unary_expression())
        } else {
            self.simple_unary_expression()
        };
        self.ascend();
        expr
    }

    fn simple_unary_expression(&mut self) -> Expr {
        let line = self.line();
        if self.have(Token::Tilde) {
            unary(line, UnaryOp::BitNot, self.unary_expression())
        } else if self.have(Token::Bang) {
            unary(line, UnaryOp::Not, self.unary_expression())
        } else if self.see_cast() {
            self.must_be(Token::LParen);
            let is_basic = self.see_basic_type();
            let target = self.parse_type();
            self.must_be(Token::RParen);
            let expr = if is_basic && !target.is_array() {
                self.unary_expression()
            } else if self.descend() {
                let operand = self.simple_unary_expression();
                self.ascend();
                operand
            } else {
                self.ascend();
                Expr::wild(line)
            };
            Expr::new(
                line,
                ExprKind::Cast {
                    target,
                    expr: Box::new(expr),
                },
            )
        } else {
            self.postfix_expression()
        }
    }

    fn postfix_expression(&mut self) -> Expr {
        let line = self.line();
        let mut expr = self.primary();
        let mut folds = 0;
        while (self.see(Token::Dot) || self.see(Token::LBracket)) && self.deepen(&mut folds) {
            expr = self.selector(expr);
        }
        while (self.see(Token::Dec) || self.see(Token::Inc)) && self.deepen(&mut folds) {
            let op = if self.have(Token::Dec) {
                IncDecOp::PostDec
            } else {
                self.scanner.next();
                IncDecOp::PostInc
            };
            expr = inc_dec(line, op, expr);
        }
        self.depth -= folds;
        expr
    }

    fn selector(&mut self, target: Expr) -> Expr {
        let line = self.line();
        if self.have(Token::Dot) {
            let name = self.identifier();
            if self.see(Token::LParen) {
                let args = self.arguments();
                Expr::new(
                    line,
                    ExprKind::MessageSend {
                        target: Some(Box::new(target)),
                        name,
                        args,
                        method: None,
                    },
                )
            } else {
                Expr::new(
                    line,
                    ExprKind::FieldSelection {
                        target: Box::new(target),
                        name,
                        field: None,
                    },
                )
            }
        } else {
            self.must_be(Token::LBracket);
            let index = self.expression();
            self.must_be(Token::RBracket);
            Expr::new(
                line,
                ExprKind::ArrayAccess {
                    array: Box::new(target),
                    index: Box::new(index),
                },
            )
        }
    }

    fn primary(&mut self) -> Expr {
        let line = self.line();
        if self.see(Token::LParen) {
            self.par_expression()
        } else if self.have(Token::This) {
            if self.see(Token::LParen) {
                let args = self.arguments();
                Expr::new(line, ExprKind::ThisConstruction { args, ctor: None })
            } else {
                Expr::new(line, ExprKind::This)
            }
        } else if self.have(Token::Super) {
            if !self.have(Token::Dot) {
                let args = self.arguments();
                return Expr::new(line, ExprKind::SuperConstruction { args, ctor: None });
            }
            let name = self.identifier();
            let target = Box::new(Expr::new(line, ExprKind::Super));
            if self.see(Token::LParen) {
                let args = self.arguments();
                Expr::new(
                    line,
                    ExprKind::MessageSend {
                        target: Some(target),
                        name,
                        args,
                        method: None,
                    },
                )
            } else {
                Expr::new(
                    line,
                    ExprKind::FieldSelection {
                        target,
                        name,
                        field: None,
                    },
                )
            }
        } else if self.have(Token::New) {
            self.creator()
        } else if self.see(Token::Identifier) {
            let mut segments = self.qualified_identifier().segments;
            if !self.see(Token::LParen) {
                return Expr::new(line, ExprKind::Name(segments));
            }
            let name = segments.pop().unwrap_or_default();
            let target = if segments.is_empty() {
                None
            } else {
                Some(Box::new(Expr::new(line, ExprKind::Name(segments))))
            };
            let args = self.arguments();
            Expr::new(
                line,
                ExprKind::MessageSend {
                    target,
                    name,
                    args,
                    method: None,
                },
            )
        } else {
            self.literal()
        }
    }

    fn creator(&mut self) -> Expr {
        let line = self.line();
        let ty = if self.see_basic_type() {
            self.basic_type()
        } else {
            self.qualified_type()
        };
        if self.see(Token::LParen) {
            let args = self.arguments();
            Expr::new(
                line,
                ExprKind::New {
                    class: ty,
                    args,
                    ctor: None,
                },
            )
        } else if self.see(Token::LBracket) {
            if self.see_dims() {
                let mut expected = ty;
                while self.have(Token::LBracket) {
                    self.must_be(Token::RBracket);
                    expected = expected.array_of();
                }
                self.array_initializer(&expected)
            } else {
                self.new_array_declarator(line, ty)
            }
        } else {
            let found = self.scanner.token().image().to_string();
            self.report_parser_error(format!("( or [ sought where {} found", found));
            Expr::wild(line)
        }
    }

    fn new_array_declarator(&mut self, line: usize, element: Type) -> Expr {
        let mut dims = Vec::new();
        self.must_be(Token::LBracket);
        dims.push(self.expression());
        self.must_be(Token::RBracket);
        let mut array_type = element.array_of();
        while self.have(Token::LBracket) {
            if self.have(Token::RBracket) {
                array_type = array_type.array_of();
                while self.have(Token::LBracket) {
                    self.must_be(Token::RBracket);
                    array_type = array_type.array_of();
                }
                break;
            }
            dims.push(self.expression());
            self.must_be(Token::RBracket);
            array_type = array_type.array_of();
        }
        Expr::new(line, ExprKind::NewArray { array_type, dims })
    }

    fn literal(&mut self) -> Expr {
        let line = self.line();
        let token = self.scanner.token();
        let literal = match token.token {
            Token::IntLiteral => Literal::Int(token.lexeme.clone()),
            Token::LongLiteral => Literal::Long(token.lexeme.clone()),
            Token::DoubleLiteral => Literal::Double(token.lexeme.clone()),
            Token::CharLiteral => Literal::Char(token.lexeme.clone()),
            Token::StringLiteral => Literal::String(token.lexeme.clone()),
            Token::True => Literal::Boolean(true),
            Token::False => Literal::Boolean(false),
            Token::Null => Literal::Null,
            _ => {
                let found = token.image().to_string();
                self.report_parser_error(format!("Literal sought where {} found", found));
                return Expr::wild(line);
            }
        };
        self.scanner.next();
        Expr::new(line, ExprKind::Literal(literal))
    }
}

fn binary(line: usize, op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::new(
        line,
        ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
    )
}

fn unary(line: usize, op: UnaryOp, operand: Expr) -> Expr {
    Expr::new(
        line,
        ExprKind::Unary {
            op,
            operand: Box::new(operand),
        },
    )
}

fn inc_dec(line: usize, op: IncDecOp, operand: Expr) -> Expr {
    Expr::new(
        line,
        ExprKind::IncDec {
            op,
            operand: Box::new(operand),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_expr(source: &str) -> (Expr, Diagnostics) {
        let mut diags = Diagnostics::new("E.java", 10);
        let expr = {
            let mut parser = Parser::new(source, &mut diags, &Config::default());
            parser.expression()
        };
        (expr, diags)
    }

    fn parse_unit(source: &str) -> (CompilationUnit, Diagnostics) {
        let mut diags = Diagnostics::new("U.java", 10);
        let unit = Parser::new(source, &mut diags, &Config::default()).compilation_unit();
        (unit, diags)
    }

    #[test]
    fn test_multiplication_binds_tighter() {
        let (expr, diags) = parse_expr("3 + 4 * 2");
        assert!(!diags.error_has_occurred());
        match expr.kind {
            ExprKind::Binary { op: BinaryOp::Add, rhs, .. } => {
                assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
            }
            other => panic!("expected +, got {:?}", other),
        }
    }

    #[test]
    fn test_assignment_is_right_associative() {
        let (expr, _) = parse_expr("a = b += 1");
        match expr.kind {
            ExprKind::Assign { op: AssignOp::Assign, rhs, .. } => {
                assert!(matches!(rhs.kind, ExprKind::Assign { op: AssignOp::Add, .. }));
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_cast_versus_parenthesized_expression() {
        let (cast, _) = parse_expr("(int) x");
        assert!(matches!(cast.kind, ExprKind::Cast { target: Type::Int, .. }));

        let (qualified, _) = parse_expr("(java.lang.Object) x");
        assert!(matches!(qualified.kind, ExprKind::Cast { .. }));

        let (paren, diags) = parse_expr("(x + 1) * 2");
        assert!(!diags.error_has_occurred(), "{:?}", diags.entries());
        let ExprKind::Binary { op: BinaryOp::Mul, lhs, .. } = paren.kind else {
            panic!("expected *, got {:?}", paren.kind);
        };
        assert!(matches!(lhs.kind, ExprKind::Binary { op: BinaryOp::Add, .. }));

        let (literal, diags) = parse_expr("(1) + 2");
        assert!(!diags.error_has_occurred(), "{:?}", diags.entries());
        let ExprKind::Binary { op: BinaryOp::Add, lhs, .. } = literal.kind else {
            panic!("expected +, got {:?}", literal.kind);
        };
        assert!(matches!(lhs.kind, ExprKind::Literal(Literal::Int(_))));
    }

    #[test]
    fn test_relational_is_non_associative() {
        let (_, diags) = parse_expr("a < b < c");
        assert!(!diags.error_has_occurred());
        let (expr, _) = parse_expr("a < b");
        assert!(matches!(expr.kind, ExprKind::Binary { op: BinaryOp::Lt, .. }));
    }

    #[test]
    fn test_qualified_call_target_is_a_name() {
        let (expr, _) = parse_expr("System.out.println(1)");
        match expr.kind {
            ExprKind::MessageSend { target: Some(target), name, args, .. } => {
                assert_eq!(name, "println");
                assert_eq!(args.len(), 1);
                assert!(matches!(target.kind, ExprKind::Name(ref s) if s == &["System", "out"]));
            }
            other => panic!("expected message send, got {:?}", other),
        }
    }

    #[test]
    fn test_local_declaration_lookahead() {
        let (unit, diags) = parse_unit(
            "class A { void m() { int[] a = {1, 2,}; String s; a[0] = 3; } }",
        );
        assert!(!diags.error_has_occurred(), "{:?}", diags.entries());
        let TypeDecl::Class(class) = &unit.type_decls[0] else {
            panic!("expected class");
        };
        let Member::Method(method) = &class.members[0] else {
            panic!("expected method");
        };
        let body = method.body.as_ref().expect("body");
        assert!(matches!(body.statements[0].kind, StmtKind::LocalVariables(_)));
        assert!(matches!(body.statements[1].kind, StmtKind::LocalVariables(_)));
        assert!(matches!(body.statements[2].kind, StmtKind::Expression(_)));
    }

    #[test]
    fn test_statement_without_side_effect_is_rejected() {
        let (_, diags) = parse_unit("class A { void m() { 1 + 2; } }");
        assert_eq!(diags.error_count(), 1);
        assert!(diags.entries()[0].message.contains("does not have a side-effect"));
    }

    #[test]
    fn test_switch_groups() {
        let (unit, diags) = parse_unit(
            "class A { void m(int x) { switch (x) { case 1: case 2: x++; default: break; } } }",
        );
        assert!(!diags.error_has_occurred());
        let TypeDecl::Class(class) = &unit.type_decls[0] else {
            panic!("expected class");
        };
        let Member::Method(method) = &class.members[0] else {
            panic!("expected method");
        };
        let StmtKind::Switch { groups, .. } = &method.body.as_ref().expect("body").statements[0].kind
        else {
            panic!("expected switch");
        };
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].labels.len(), 2);
        assert_eq!(groups[0].statements.len(), 1);
        assert!(matches!(groups[1].labels[0], SwitchLabel::Default(_)));
    }

    #[test]
    fn test_try_requires_catch_or_finally() {
        let (_, diags) = parse_unit("class A { void m() { try { } } }");
        assert_eq!(diags.error_count(), 1);
    }

    #[test]
    fn test_depth_guard_reports_once() {
        let mut diags = Diagnostics::new("D.java", 10);
        let config = Config::default().with_max_depth(8);
        let source = format!("{}1{}", "(".repeat(40), ")".repeat(40));
        let mut parser = Parser::new(&source, &mut diags, &config);
        parser.expression();
        drop(parser);
        assert!(diags.error_has_occurred());
        assert!(diags.entries()[0].message.contains("Nesting deeper"));
    }

    #[test]
    fn test_depth_guard_counts_chains() {
        let config = Config::default().with_max_depth(8);
        let sources = [
            "a = a = a = a = a = a = a = a = a = 1",
            "1 + 2 - 3 + 4 - 5 + 6 - 7 + 8 - 9",
            "s.f().g[0].h()",
        ];
        for source in sources {
            let mut diags = Diagnostics::new("D.java", 10);
            let mut parser = Parser::new(source, &mut diags, &config);
            parser.expression();
            assert_eq!(parser.depth, 0, "{}", source);
            drop(parser);
            let expected = usize::from(source.starts_with('a') || source.starts_with('1'));
            assert_eq!(diags.error_count(), expected, "{}: {:?}", source, diags.entries());
        }
    }

    #[test]
    fn test_unterminated_input_terminates() {
        let (_, diags) = parse_unit("class A { void m() { switch (x) { case");
        assert!(diags.error_has_occurred());
    }
}
