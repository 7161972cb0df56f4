//! j-- Compiler (jmmc)
//!
//! Compiles j--, a subset of Java, to JVM bytecode.
//!
//! ## Architecture
//!
//! - **parser**: logos lexer, lookahead scanner and recursive-descent parser
//! - **wash**: semantic analysis (Enter → Attr) over a type registry
//! - **codegen**: instruction selection, labels, switch dispatch and exception tables
//! - **ast**: the tree the phases hand to each other
//! - **bin**: command-line interface
//!
//! ## Compilation Flow
//!
//! ```text
//! Source → Parser → AST → Enter → Attr → Code Generation → ClassOutput
//! ```
//!
//! Any syntax or semantic error stops the unit before code generation and
//! comes back as `Error::Compilation` carrying every diagnostic.

pub mod ast;
pub mod codegen;
pub mod config;
pub mod consts;
pub mod diagnostics;
pub mod error;
pub mod parser;
pub mod wash;

pub use codegen::ClassOutput;
pub use config::Config;
pub use diagnostics::{Diagnostic, Diagnostics};
pub use error::{Error, Result};

/// Compile one source file held in memory
pub fn compile(source: &str, file_name: &str, config: &Config) -> Result<Vec<ClassOutput>> {
    log::debug!("compiling {}", file_name);

    let (unit, mut diagnostics) = parser::parse_source(source, file_name, config);
    if diagnostics.error_has_occurred() {
        return Err(compilation_failed(file_name, diagnostics));
    }

    let (unit, registry) = wash::analyze(unit, &mut diagnostics);
    if diagnostics.error_has_occurred() {
        return Err(compilation_failed(file_name, diagnostics));
    }

    let classes = codegen::generate(&unit, &registry)?;
    log::debug!("compiled {}: {} class(es)", file_name, classes.len());
    Ok(classes)
}

/// Read and compile a source file
pub fn compile_file(path: &std::path::Path, config: &Config) -> Result<Vec<ClassOutput>> {
    let source = std::fs::read_to_string(path)?;
    compile(&source, &path.display().to_string(), config)
}

fn compilation_failed(file_name: &str, diagnostics: Diagnostics) -> Error {
    log::debug!("{}: {} error(s), skipping code generation", file_name, diagnostics.error_count());
    Error::Compilation {
        file: file_name.to_string(),
        diagnostics: diagnostics.into_entries(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_minimal_class() {
        let classes = compile("class A { }", "A.java", &Config::default()).expect("compiles");
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].name, "A");
        assert!(classes[0].method("<init>").is_some());
    }

    #[test]
    fn test_errors_skip_code_generation() {
        let err = compile("class A { void m() { int x = true; } }", "A.java", &Config::default()).unwrap_err();
        assert_eq!(err.diagnostics().len(), 1);
    }
}
