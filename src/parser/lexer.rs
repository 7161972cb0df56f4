use logos::Logos;

use crate::diagnostics::Diagnostics;
use crate::parser::span::Location;

/// Token types for j--
#[derive(Logos, Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Token {
    // Keywords
    #[token("abstract")]
    Abstract,
    #[token("boolean")]
    Boolean,
    #[token("break")]
    Break,
    #[token("case")]
    Case,
    #[token("catch")]
    Catch,
    #[token("char")]
    Char,
    #[token("class")]
    Class,
    #[token("continue")]
    Continue,
    #[token("default")]
    Default,
    #[token("do")]
    Do,
    #[token("double")]
    Double,
    #[token("else")]
    Else,
    #[token("extends")]
    Extends,
    #[token("false")]
    False,
    #[token("finally")]
    Finally,
    #[token("for")]
    For,
    #[token("if")]
    If,
    #[token("implements")]
    Implements,
    #[token("import")]
    Import,
    #[token("instanceof")]
    InstanceOf,
    #[token("int")]
    Int,
    #[token("interface")]
    Interface,
    #[token("long")]
    Long,
    #[token("new")]
    New,
    #[token("null")]
    Null,
    #[token("package")]
    Package,
    #[token("private")]
    Private,
    #[token("protected")]
    Protected,
    #[token("public")]
    Public,
    #[token("return")]
    Return,
    #[token("static")]
    Static,
    #[token("super")]
    Super,
    #[token("switch")]
    Switch,
    #[token("this")]
    This,
    #[token("throw")]
    Throw,
    #[token("throws")]
    Throws,
    #[token("true")]
    True,
    #[token("try")]
    Try,
    #[token("void")]
    Void,
    #[token("while")]
    While,

    // Operators
    #[token("=")]
    Assign,
    #[token("+=")]
    AddAssign,
    #[token("-=")]
    SubAssign,
    #[token("*=")]
    MulAssign,
    #[token("/=")]
    DivAssign,
    #[token("%=")]
    ModAssign,
    #[token("&=")]
    AndAssign,
    #[token("|=")]
    OrAssign,
    #[token("^=")]
    XorAssign,
    #[token("<<=")]
    LShiftAssign,
    #[token(">>=")]
    RShiftAssign,
    #[token(">>>=")]
    URShiftAssign,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("++")]
    Inc,
    #[token("--")]
    Dec,
    #[token("!")]
    Bang,
    #[token("~")]
    Tilde,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("<<")]
    LShift,
    #[token(">>")]
    RShift,
    #[token(">>>")]
    URShift,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    PipePipe,
    #[token("==")]
    Eq,
    #[token("!=")]
    Ne,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("?")]
    Question,
    #[token(":")]
    Colon,

    // Separators
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,

    // Literals
    #[regex(r#""([^"\\\n]|\\.)*""#)]
    StringLiteral,
    #[regex(r"'([^'\\\n]|\\.)'")]
    CharLiteral,
    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?[dD]?")]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+[dD]?")]
    #[regex(r"[0-9]+[dD]")]
    DoubleLiteral,
    #[regex(r"[0-9]+[lL]")]
    LongLiteral,
    #[regex(r"[0-9]+")]
    IntLiteral,

    // Identifiers
    #[regex(r"[a-zA-Z_$][a-zA-Z0-9_$]*")]
    Identifier,

    // Comments and whitespace
    #[regex(r"//[^\n]*")]
    LineComment,
    #[regex(r"/\*[^*]*\*+([^/*][^*]*\*+)*/", priority = 2)]
    BlockComment,
    #[regex(r"[ \t\n\r\f]+", priority = 2)]
    Whitespace,

    /// End of input; appended by the scanner, never produced by logos
    Eof,
}

impl Token {
    /// Check if this token is a basic (primitive) type keyword
    pub fn is_basic_type(&self) -> bool {
        matches!(self, Token::Boolean | Token::Char | Token::Int | Token::Long | Token::Double)
    }

    /// Check if this token is trivia the parser never sees
    pub fn is_trivia(&self) -> bool {
        matches!(self, Token::Whitespace | Token::LineComment | Token::BlockComment)
    }

    /// Printable image used in "found where sought" messages
    pub fn image(&self) -> &'static str {
        match self {
            Token::Abstract => "abstract",
            Token::Boolean => "boolean",
            Token::Break => "break",
            Token::Case => "case",
            Token::Catch => "catch",
            Token::Char => "char",
            Token::Class => "class",
            Token::Continue => "continue",
            Token::Default => "default",
            Token::Do => "do",
            Token::Double => "double",
            Token::Else => "else",
            Token::Extends => "extends",
            Token::False => "false",
            Token::Finally => "finally",
            Token::For => "for",
            Token::If => "if",
            Token::Implements => "implements",
            Token::Import => "import",
            Token::InstanceOf => "instanceof",
            Token::Int => "int",
            Token::Interface => "interface",
            Token::Long => "long",
            Token::New => "new",
            Token::Null => "null",
            Token::Package => "package",
            Token::Private => "private",
            Token::Protected => "protected",
            Token::Public => "public",
            Token::Return => "return",
            Token::Static => "static",
            Token::Super => "super",
            Token::Switch => "switch",
            Token::This => "this",
            Token::Throw => "throw",
            Token::Throws => "throws",
            Token::True => "true",
            Token::Try => "try",
            Token::Void => "void",
            Token::While => "while",
            Token::Assign => "=",
            Token::AddAssign => "+=",
            Token::SubAssign => "-=",
            Token::MulAssign => "*=",
            Token::DivAssign => "/=",
            Token::ModAssign => "%=",
            Token::AndAssign => "&=",
            Token::OrAssign => "|=",
            Token::XorAssign => "^=",
            Token::LShiftAssign => "<<=",
            Token::RShiftAssign => ">>=",
            Token::URShiftAssign => ">>>=",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::Inc => "++",
            Token::Dec => "--",
            Token::Bang => "!",
            Token::Tilde => "~",
            Token::Amp => "&",
            Token::Pipe => "|",
            Token::Caret => "^",
            Token::LShift => "<<",
            Token::RShift => ">>",
            Token::URShift => ">>>",
            Token::AndAnd => "&&",
            Token::PipePipe => "||",
            Token::Eq => "==",
            Token::Ne => "!=",
            Token::Lt => "<",
            Token::Le => "<=",
            Token::Gt => ">",
            Token::Ge => ">=",
            Token::Question => "?",
            Token::Colon => ":",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Semicolon => ";",
            Token::Comma => ",",
            Token::Dot => ".",
            Token::StringLiteral => "<STRING_LITERAL>",
            Token::CharLiteral => "<CHAR_LITERAL>",
            Token::DoubleLiteral => "<DOUBLE_LITERAL>",
            Token::LongLiteral => "<LONG_LITERAL>",
            Token::IntLiteral => "<INT_LITERAL>",
            Token::Identifier => "<IDENTIFIER>",
            Token::LineComment | Token::BlockComment => "<COMMENT>",
            Token::Whitespace => "<WHITESPACE>",
            Token::Eof => "<EOF>",
        }
    }
}

/// Lexical token with location information
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalToken {
    pub token: Token,
    pub lexeme: String,
    pub location: Location,
}

impl LexicalToken {
    pub fn new(token: Token, lexeme: String, location: Location) -> Self {
        Self { token, lexeme, location }
    }

    /// Get the token kind
    pub fn kind(&self) -> Token {
        self.token
    }

    /// Get the lexeme (actual text); `<EOF>` for the end marker
    pub fn image(&self) -> &str {
        if self.token == Token::Eof {
            Token::Eof.image()
        } else {
            &self.lexeme
        }
    }

    pub fn line(&self) -> usize {
        self.location.line
    }
}

/// Lexer for j-- source text
pub struct Lexer<'a> {
    lexer: logos::Lexer<'a, Token>,
    current_line: usize,
    current_column: usize,
    current_offset: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            lexer: Token::lexer(source),
            current_line: 1,
            current_column: 1,
            current_offset: 0,
        }
    }

    /// Get the next token, or the offending text on a lexical error
    pub fn next_token(&mut self) -> Option<Result<LexicalToken, LexicalToken>> {
        let token = self.lexer.next()?;
        let lexeme = self.lexer.slice().to_string();
        let location = Location::new(self.current_line, self.current_column, self.current_offset);
        self.update_position(&lexeme);

        match token {
            Ok(token) => Some(Ok(LexicalToken::new(token, lexeme, location))),
            Err(()) => Some(Err(LexicalToken::new(Token::Eof, lexeme, location))),
        }
    }

    /// Update the current position based on the lexeme
    fn update_position(&mut self, lexeme: &str) {
        for ch in lexeme.chars() {
            match ch {
                '\n' => {
                    self.current_line += 1;
                    self.current_column = 1;
                }
                '\r' => {}
                _ => self.current_column += 1,
            }
            self.current_offset += ch.len_utf8();
        }
    }

    /// Tokenize the whole source, dropping trivia and reporting bad input.
    /// The returned vector always ends with an `Eof` token.
    pub fn tokenize(mut self, diagnostics: &mut Diagnostics) -> Vec<LexicalToken> {
        let mut tokens = Vec::new();

        while let Some(result) = self.next_token() {
            match result {
                Ok(token) if token.token.is_trivia() => {}
                Ok(token) => tokens.push(token),
                Err(bad) => diagnostics.report(
                    crate::diagnostics::DiagnosticKind::Lexical,
                    bad.location.line,
                    format!("Unidentified input token: '{}'", bad.lexeme),
                ),
            }
        }

        let end = Location::new(self.current_line, self.current_column, self.current_offset);
        tokens.push(LexicalToken::new(Token::Eof, String::new(), end));
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<LexicalToken> {
        let mut diags = Diagnostics::new("Test.java", 10);
        let tokens = Lexer::new(source).tokenize(&mut diags);
        assert!(!diags.error_has_occurred(), "unexpected lexical errors: {:?}", diags.entries());
        tokens
    }

    #[test]
    fn test_lexer_keywords() {
        let tokens = lex("public class Test extends Object implements Runnable");
        let kinds: Vec<Token> = tokens.iter().map(|t| t.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                Token::Public,
                Token::Class,
                Token::Identifier,
                Token::Extends,
                Token::Identifier,
                Token::Implements,
                Token::Identifier,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_lexer_literals() {
        let tokens = lex(r#"42 7L 3.14 2e10 5d "hello" 'a' true false null"#);
        let kinds: Vec<Token> = tokens.iter().map(|t| t.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                Token::IntLiteral,
                Token::LongLiteral,
                Token::DoubleLiteral,
                Token::DoubleLiteral,
                Token::DoubleLiteral,
                Token::StringLiteral,
                Token::CharLiteral,
                Token::True,
                Token::False,
                Token::Null,
                Token::Eof,
            ]
        );
        assert_eq!(tokens[1].image(), "7L");
    }

    #[test]
    fn test_lexer_shift_assignments_prefer_longest_match() {
        let tokens = lex(">>>= >>= <<= >>> >> <<");
        let kinds: Vec<Token> = tokens.iter().map(|t| t.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                Token::URShiftAssign,
                Token::RShiftAssign,
                Token::LShiftAssign,
                Token::URShift,
                Token::RShift,
                Token::LShift,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_lexer_tracks_lines_across_comments() {
        let tokens = lex("// header\n/* block\n comment */ x\ny");
        assert_eq!(tokens[0].line(), 3);
        assert_eq!(tokens[1].line(), 4);
    }

    #[test]
    fn test_unknown_input_is_reported_and_skipped() {
        let mut diags = Diagnostics::new("Bad.java", 10);
        let tokens = Lexer::new("int # x;").tokenize(&mut diags);
        assert_eq!(diags.error_count(), 1);
        assert_eq!(diags.entries()[0].to_string(), "Bad.java:1: Unidentified input token: '#'");
        assert_eq!(tokens.len(), 4);
    }
}
