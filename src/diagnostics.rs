//! Diagnostics channel shared by the parser and the analyzer
//!
//! Every syntax or semantic error becomes one line `<file>:<line>: <message>`.
//! Any recorded error flips the unit-wide flag that gates code generation.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Lexical,
    Syntax,
    Semantic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub file: String,
    pub line: usize,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.file, self.line, self.message)
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostics {
    file: String,
    max_errors: usize,
    entries: Vec<Diagnostic>,
    /// Errors past `max_errors`, counted but not stored
    suppressed: usize,
}

impl Diagnostics {
    pub fn new(file: impl Into<String>, max_errors: usize) -> Self {
        Self {
            file: file.into(),
            max_errors,
            entries: Vec::new(),
            suppressed: 0,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file
    }

    pub fn report(&mut self, kind: DiagnosticKind, line: usize, message: impl Into<String>) {
        let diagnostic = Diagnostic {
            kind,
            file: self.file.clone(),
            line,
            message: message.into(),
        };
        log::trace!("diagnostic: {}", diagnostic);
        if self.entries.len() < self.max_errors {
            self.entries.push(diagnostic);
        } else {
            self.suppressed += 1;
        }
    }

    pub fn syntax_error(&mut self, line: usize, message: impl Into<String>) {
        self.report(DiagnosticKind::Syntax, line, message);
    }

    pub fn semantic_error(&mut self, line: usize, message: impl Into<String>) {
        self.report(DiagnosticKind::Semantic, line, message);
    }

    /// The unit-wide "error occurred" flag
    pub fn error_has_occurred(&self) -> bool {
        !self.entries.is_empty() || self.suppressed > 0
    }

    /// Total number of errors, stored or not
    pub fn error_count(&self) -> usize {
        self.entries.len() + self.suppressed
    }

    pub fn count_of(&self, kind: DiagnosticKind) -> usize {
        self.entries.iter().filter(|d| d.kind == kind).count()
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Diagnostic> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_file_line_message() {
        let mut diags = Diagnostics::new("Foo.java", 10);
        diags.syntax_error(7, "; found where ) sought");
        assert_eq!(diags.entries()[0].to_string(), "Foo.java:7: ; found where ) sought");
        assert!(diags.error_has_occurred());
    }

    #[test]
    fn errors_past_budget_are_counted_only() {
        let mut diags = Diagnostics::new("A.java", 2);
        for line in 1..=5 {
            diags.semantic_error(line, "bad");
        }
        assert_eq!(diags.entries().len(), 2);
        assert_eq!(diags.error_count(), 5);
    }
}
