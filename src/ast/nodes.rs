use std::fmt;

use super::Type;

// Compilation unit

#[derive(Debug, Clone)]
pub struct CompilationUnit {
    pub file_name: String,
    pub package: Option<QualifiedName>,
    pub imports: Vec<QualifiedName>,
    pub type_decls: Vec<TypeDecl>,
}

/// Dotted name such as `java.lang.String`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    pub line: usize,
    pub segments: Vec<String>,
}

impl QualifiedName {
    pub fn simple_name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    /// Slash-separated form used for class file names
    pub fn internal_name(&self) -> String {
        self.segments.join("/")
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

// Declarations

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Public,
    Protected,
    Private,
    Static,
    Abstract,
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Modifier::Public => "public",
            Modifier::Protected => "protected",
            Modifier::Private => "private",
            Modifier::Static => "static",
            Modifier::Abstract => "abstract",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub list: Vec<Modifier>,
}

impl Modifiers {
    pub fn has(&self, modifier: Modifier) -> bool {
        self.list.contains(&modifier)
    }

    pub fn is_static(&self) -> bool {
        self.has(Modifier::Static)
    }

    pub fn is_abstract(&self) -> bool {
        self.has(Modifier::Abstract)
    }

    pub fn is_private(&self) -> bool {
        self.has(Modifier::Private)
    }

    pub fn add(&mut self, modifier: Modifier) {
        if !self.has(modifier) {
            self.list.push(modifier);
        }
    }
}

#[derive(Debug, Clone)]
pub enum TypeDecl {
    Class(ClassDecl),
    Interface(InterfaceDecl),
}

impl TypeDecl {
    pub fn name(&self) -> &str {
        match self {
            TypeDecl::Class(c) => &c.name,
            TypeDecl::Interface(i) => &i.name,
        }
    }

    pub fn line(&self) -> usize {
        match self {
            TypeDecl::Class(c) => c.line,
            TypeDecl::Interface(i) => i.line,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub line: usize,
    pub modifiers: Modifiers,
    pub name: String,
    /// `None` means `java.lang.Object`
    pub super_class: Option<Type>,
    pub interfaces: Vec<Type>,
    pub members: Vec<Member>,
}

#[derive(Debug, Clone)]
pub struct InterfaceDecl {
    pub line: usize,
    pub modifiers: Modifiers,
    pub name: String,
    pub extends: Vec<Type>,
    /// Only abstract method headers
    pub members: Vec<Member>,
}

#[derive(Debug, Clone)]
pub enum Member {
    Constructor(ConstructorDecl),
    Method(MethodDecl),
    Field(FieldDecl),
}

#[derive(Debug, Clone)]
pub struct ConstructorDecl {
    pub line: usize,
    pub modifiers: Modifiers,
    pub name: String,
    pub params: Vec<FormalParameter>,
    pub throws: Vec<Type>,
    pub body: Block,
    /// Local slots used by the body, including `this` and parameters
    pub locals: u16,
}

#[derive(Debug, Clone)]
pub struct MethodDecl {
    pub line: usize,
    pub modifiers: Modifiers,
    pub return_type: Type,
    pub name: String,
    pub params: Vec<FormalParameter>,
    pub throws: Vec<Type>,
    /// `None` for abstract and interface methods
    pub body: Option<Block>,
    pub locals: u16,
}

impl ConstructorDecl {
    pub fn descriptor(&self) -> String {
        let params: Vec<Type> = self.params.iter().map(|p| p.ty.clone()).collect();
        Type::method_descriptor(&params, &Type::Void)
    }
}

impl MethodDecl {
    pub fn descriptor(&self) -> String {
        let params: Vec<Type> = self.params.iter().map(|p| p.ty.clone()).collect();
        Type::method_descriptor(&params, &self.return_type)
    }
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub line: usize,
    pub modifiers: Modifiers,
    pub declarators: Vec<VariableDeclarator>,
}

#[derive(Debug, Clone)]
pub struct FormalParameter {
    pub line: usize,
    pub name: String,
    pub ty: Type,
    /// Local slot, assigned by analysis
    pub slot: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct VariableDeclarator {
    pub line: usize,
    pub name: String,
    pub ty: Type,
    pub initializer: Option<Expr>,
    /// Local slot, assigned by analysis; fields never get one
    pub slot: Option<u16>,
}

// Statements

#[derive(Debug, Clone)]
pub struct Block {
    pub line: usize,
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub line: usize,
    pub kind: StmtKind,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Block(Block),
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        condition: Expr,
    },
    For {
        init: Vec<Stmt>,
        condition: Option<Expr>,
        update: Vec<Stmt>,
        body: Box<Stmt>,
    },
    Switch {
        selector: Expr,
        groups: Vec<SwitchGroup>,
    },
    Try {
        block: Block,
        catches: Vec<CatchClause>,
        finally: Option<Block>,
    },
    Throw(Expr),
    Return(Option<Expr>),
    Break,
    Continue,
    Empty,
    Expression(Expr),
    LocalVariables(Vec<VariableDeclarator>),
}

impl Stmt {
    pub fn new(line: usize, kind: StmtKind) -> Self {
        Self { line, kind }
    }
}

/// A run of labels followed by the statements they select
#[derive(Debug, Clone)]
pub struct SwitchGroup {
    pub labels: Vec<SwitchLabel>,
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum SwitchLabel {
    Case(Expr),
    Default(usize),
}

impl SwitchLabel {
    pub fn line(&self) -> usize {
        match self {
            SwitchLabel::Case(expr) => expr.line,
            SwitchLabel::Default(line) => *line,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CatchClause {
    pub line: usize,
    pub param: FormalParameter,
    pub block: Block,
}

// Expressions

#[derive(Debug, Clone)]
pub struct Expr {
    pub line: usize,
    pub kind: ExprKind,
    /// Resolved type; `None` until analyzed
    pub ty: Option<Type>,
    /// Set by the parser on expressions used as statements
    pub is_statement_expression: bool,
}

impl Expr {
    pub fn new(line: usize, kind: ExprKind) -> Self {
        Self {
            line,
            kind,
            ty: None,
            is_statement_expression: false,
        }
    }

    /// An analyzed node carrying its type
    pub fn typed(line: usize, kind: ExprKind, ty: Type) -> Self {
        Self {
            line,
            kind,
            ty: Some(ty),
            is_statement_expression: false,
        }
    }

    /// Placeholder produced after a syntax error
    pub fn wild(line: usize) -> Self {
        Self::new(line, ExprKind::Wild)
    }

    /// Resolved type, `Any` while unanalyzed
    pub fn ty(&self) -> &Type {
        self.ty.as_ref().unwrap_or(&Type::Any)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Ushr,
    BitAnd,
    BitOr,
    BitXor,
    LogicalAnd,
    LogicalOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn is_arithmetic(&self) -> bool {
        matches!(self, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem)
    }

    pub fn is_shift(&self) -> bool {
        matches!(self, BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Ushr)
    }

    pub fn is_bitwise(&self) -> bool {
        matches!(self, BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor)
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::LogicalAnd | BinaryOp::LogicalOr)
    }

    pub fn is_equality(&self) -> bool {
        matches!(self, BinaryOp::Eq | BinaryOp::Ne)
    }

    pub fn is_relational(&self) -> bool {
        matches!(self, BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge)
    }

    /// Comparison with the opposite outcome
    pub fn negate(&self) -> Option<BinaryOp> {
        match self {
            BinaryOp::Eq => Some(BinaryOp::Ne),
            BinaryOp::Ne => Some(BinaryOp::Eq),
            BinaryOp::Lt => Some(BinaryOp::Ge),
            BinaryOp::Ge => Some(BinaryOp::Lt),
            BinaryOp::Gt => Some(BinaryOp::Le),
            BinaryOp::Le => Some(BinaryOp::Gt),
            _ => None,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Ushr => ">>>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::LogicalAnd => "&&",
            BinaryOp::LogicalOr => "||",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncDecOp {
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

impl IncDecOp {
    pub fn is_prefix(&self) -> bool {
        matches!(self, IncDecOp::PreInc | IncDecOp::PreDec)
    }

    pub fn delta(&self) -> i16 {
        match self {
            IncDecOp::PreInc | IncDecOp::PostInc => 1,
            IncDecOp::PreDec | IncDecOp::PostDec => -1,
        }
    }
}

impl fmt::Display for IncDecOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IncDecOp::PreInc | IncDecOp::PostInc => "++",
            IncDecOp::PreDec | IncDecOp::PostDec => "--",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Ushr,
    And,
    Or,
    Xor,
}

impl AssignOp {
    /// Binary operator a compound assignment applies
    pub fn binary_op(&self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Sub => Some(BinaryOp::Sub),
            AssignOp::Mul => Some(BinaryOp::Mul),
            AssignOp::Div => Some(BinaryOp::Div),
            AssignOp::Rem => Some(BinaryOp::Rem),
            AssignOp::Shl => Some(BinaryOp::Shl),
            AssignOp::Shr => Some(BinaryOp::Shr),
            AssignOp::Ushr => Some(BinaryOp::Ushr),
            AssignOp::And => Some(BinaryOp::BitAnd),
            AssignOp::Or => Some(BinaryOp::BitOr),
            AssignOp::Xor => Some(BinaryOp::BitXor),
        }
    }
}

impl fmt::Display for AssignOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.binary_op() {
            Some(op) => write!(f, "{}=", op),
            None => write!(f, "="),
        }
    }
}

/// Literal exactly as written; values are checked during analysis
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(String),
    Long(String),
    Double(String),
    Char(String),
    String(String),
    Boolean(bool),
    Null,
}

impl Literal {
    pub fn ty(&self) -> Type {
        match self {
            Literal::Int(_) => Type::Int,
            Literal::Long(_) => Type::Long,
            Literal::Double(_) => Type::Double,
            Literal::Char(_) => Type::Char,
            Literal::String(_) => Type::String,
            Literal::Boolean(_) => Type::Boolean,
            Literal::Null => Type::Null,
        }
    }

    pub fn int_value(&self) -> Option<i32> {
        match self {
            Literal::Int(image) => image.parse().ok(),
            Literal::Char(image) => self.char_of(image).map(|c| c as i32),
            _ => None,
        }
    }

    pub fn long_value(&self) -> Option<i64> {
        match self {
            Literal::Long(image) => image.trim_end_matches(['l', 'L']).parse().ok(),
            _ => None,
        }
    }

    pub fn double_value(&self) -> Option<f64> {
        match self {
            Literal::Double(image) => image.trim_end_matches(['d', 'D']).parse().ok(),
            _ => None,
        }
    }

    pub fn string_value(&self) -> Option<String> {
        match self {
            Literal::String(image) => unescape(strip_quotes(image)),
            _ => None,
        }
    }

    fn char_of(&self, image: &str) -> Option<u16> {
        let text = unescape(strip_quotes(image))?;
        let mut units = text.encode_utf16();
        let unit = units.next()?;
        if units.next().is_some() {
            return None;
        }
        Some(unit)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(s)
            | Literal::Long(s)
            | Literal::Double(s)
            | Literal::Char(s)
            | Literal::String(s) => write!(f, "{}", s),
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::Null => write!(f, "null"),
        }
    }
}

fn strip_quotes(image: &str) -> &str {
    if image.len() >= 2 {
        &image[1..image.len() - 1]
    } else {
        image
    }
}

/// Resolve Java escape sequences; `None` on a malformed escape
pub fn unescape(text: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'b' => out.push('\u{8}'),
            'r' => out.push('\r'),
            'f' => out.push('\u{c}'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            '\\' => out.push('\\'),
            d @ '0'..='7' => {
                let mut value = d.to_digit(8)?;
                while let Some(next) = chars.peek().and_then(|c| c.to_digit(8)) {
                    if value * 8 + next > 0o377 {
                        break;
                    }
                    value = value * 8 + next;
                    chars.next();
                }
                out.push(char::from_u32(value)?);
            }
            _ => return None,
        }
    }
    Some(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeKind {
    Static,
    Virtual,
    Interface,
    Special,
}

/// Method resolved against the type registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub kind: InvokeKind,
}

/// Field resolved against the type registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub is_static: bool,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(Literal),
    /// Unclassified (possibly qualified) name straight from the parser
    Name(Vec<String>),
    /// Local variable or parameter
    Local { name: String, slot: u16 },
    This,
    /// `super` as the target of a field selection or message send
    Super,
    /// Type name as the target of a static member access
    TypeName(Type),
    FieldSelection {
        target: Box<Expr>,
        name: String,
        field: Option<FieldRef>,
    },
    ArrayLength(Box<Expr>),
    ArrayAccess {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    MessageSend {
        /// `None` for an unqualified call on the current class
        target: Option<Box<Expr>>,
        name: String,
        args: Vec<Expr>,
        method: Option<MethodRef>,
    },
    SuperConstruction {
        args: Vec<Expr>,
        ctor: Option<MethodRef>,
    },
    ThisConstruction {
        args: Vec<Expr>,
        ctor: Option<MethodRef>,
    },
    New {
        class: Type,
        args: Vec<Expr>,
        ctor: Option<MethodRef>,
    },
    NewArray {
        /// Full array type, e.g. `int[][]`
        array_type: Type,
        dims: Vec<Expr>,
    },
    ArrayInitializer {
        array_type: Type,
        elements: Vec<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `+` with a String operand, produced by analysis
    StringConcat {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    InstanceOf {
        expr: Box<Expr>,
        target: Type,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    IncDec {
        op: IncDecOp,
        operand: Box<Expr>,
    },
    Cast {
        target: Type,
        expr: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Wild,
}
