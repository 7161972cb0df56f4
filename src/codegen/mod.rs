//! Code generation for j--
//!
//! Turns an analyzed, error-free compilation unit into one `ClassOutput` per
//! declared type. Method bodies go through `MethodGen` into a `CodeBuffer`,
//! whose `write` lays out offsets, labels and the exception table.

pub mod class;
pub mod code;
pub mod gen;
pub mod opcodes;
pub mod switch;

pub use class::{ClassOutput, FieldOutput, MethodOutput};
pub use code::{Code, CodeBuffer, Constant, ExceptionTableEntry, Instruction, InstructionSink, Label};
pub use gen::MethodGen;
pub use switch::{select_strategy, SwitchStrategy};

use crate::ast::{CompilationUnit, TypeDecl};
use crate::error::Result;
use crate::wash::registry::TypeRegistry;

/// Generate every type of an analyzed unit
pub fn generate(unit: &CompilationUnit, registry: &TypeRegistry) -> Result<Vec<ClassOutput>> {
    let package = unit.package.as_ref().map(|p| p.internal_name());
    let classes = unit
        .type_decls
        .iter()
        .map(|decl| {
            let name = match &package {
                Some(package) => format!("{}/{}", package, decl.name()),
                None => decl.name().to_string(),
            };
            match decl {
                TypeDecl::Class(class) => class::generate_class(class, &name, registry),
                TypeDecl::Interface(interface) => class::generate_interface(interface, &name, registry),
            }
        })
        .collect::<Result<Vec<_>>>()?;
    log::debug!("codegen: {} class(es) for {}", classes.len(), unit.file_name);
    Ok(classes)
}
