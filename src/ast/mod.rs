//! Abstract Syntax Tree (AST) representation for j--
//!
//! Expressions, statements and declarations are closed sum types. Analysis
//! consumes a tree and returns a new one with every expression typed; code
//! generation reads the analyzed tree.

mod nodes;
mod types;

pub use nodes::*;
pub use types::*;
