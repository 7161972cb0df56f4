//! Token source with atomic lookahead
//!
//! Positions can be recorded and returned to in nested pairs; the parser
//! uses this to probe a grammar alternative and then rewind.

use crate::diagnostics::Diagnostics;
use crate::parser::lexer::{LexicalToken, Lexer, Token};

pub struct LookaheadScanner {
    tokens: Vec<LexicalToken>,
    position: usize,
    previous: usize,
    marks: Vec<(usize, usize)>,
}

impl LookaheadScanner {
    /// Tokenize `source`, reporting lexical errors into `diagnostics`
    pub fn new(source: &str, diagnostics: &mut Diagnostics) -> Self {
        Self::from_tokens(Lexer::new(source).tokenize(diagnostics))
    }

    /// Wrap an existing token vector; an `Eof` is appended when missing
    pub fn from_tokens(mut tokens: Vec<LexicalToken>) -> Self {
        if tokens.last().map(|t| t.token) != Some(Token::Eof) {
            let location = tokens.last().map(|t| t.location).unwrap_or_default();
            tokens.push(LexicalToken::new(Token::Eof, String::new(), location));
        }
        Self {
            tokens,
            position: 0,
            previous: 0,
            marks: Vec::new(),
        }
    }

    pub fn token(&self) -> &LexicalToken {
        &self.tokens[self.position]
    }

    /// Last consumed token; the first token before anything is consumed
    pub fn previous_token(&self) -> &LexicalToken {
        &self.tokens[self.previous]
    }

    /// Move to the next token; stays on `Eof`
    pub fn next(&mut self) {
        self.previous = self.position;
        if self.position + 1 < self.tokens.len() {
            self.position += 1;
        }
    }

    pub fn record_position(&mut self) {
        self.marks.push((self.position, self.previous));
    }

    pub fn return_to_position(&mut self) {
        if let Some((position, previous)) = self.marks.pop() {
            self.position = position;
            self.previous = previous;
        }
    }

    /// Index of the current token, used to detect loops that consume nothing
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_at_end(&self) -> bool {
        self.token().token == Token::Eof
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner(source: &str) -> LookaheadScanner {
        let mut diags = Diagnostics::new("T.java", 10);
        LookaheadScanner::new(source, &mut diags)
    }

    #[test]
    fn test_rewind_restores_current_and_previous() {
        let mut s = scanner("a b c d");
        s.next();
        assert_eq!(s.token().lexeme, "b");
        s.record_position();
        s.next();
        s.next();
        assert_eq!(s.token().lexeme, "d");
        s.return_to_position();
        assert_eq!(s.token().lexeme, "b");
        assert_eq!(s.previous_token().lexeme, "a");
    }

    #[test]
    fn test_nested_marks() {
        let mut s = scanner("x y z");
        s.record_position();
        s.next();
        s.record_position();
        s.next();
        s.return_to_position();
        assert_eq!(s.token().lexeme, "y");
        s.return_to_position();
        assert_eq!(s.token().lexeme, "x");
    }

    #[test]
    fn test_next_stops_at_eof() {
        let mut s = scanner("x");
        s.next();
        s.next();
        s.next();
        assert!(s.is_at_end());
        assert_eq!(s.previous_token().token, Token::Eof);
    }
}
