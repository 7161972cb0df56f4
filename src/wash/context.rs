//! Analysis context: the compilation session threaded through Enter and Attr.
//!
//! Holds the type registry, name resolution tables for the unit, the class
//! and method being analyzed, and a stack of block scopes with local slots.

use std::collections::HashMap;

use crate::ast::Type;
use crate::diagnostics::Diagnostics;
use crate::wash::registry::TypeRegistry;

#[derive(Debug, Clone, PartialEq)]
pub struct LocalVariable {
    pub name: String,
    pub ty: Type,
    pub slot: u16,
}

#[derive(Debug, Clone)]
pub struct MethodContext {
    pub is_static: bool,
    pub is_constructor: bool,
    pub return_type: Type,
    next_slot: u16,
}

/// Statements a `break` or `continue` may leave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpTarget {
    Loop,
    Switch,
}

pub struct Context<'d> {
    pub registry: TypeRegistry,
    pub diagnostics: &'d mut Diagnostics,
    package: Option<String>,
    /// Simple name to internal name, for types of the unit and imports
    simple_names: HashMap<String, String>,
    class: Option<String>,
    method: Option<MethodContext>,
    scopes: Vec<HashMap<String, LocalVariable>>,
    jump_targets: Vec<JumpTarget>,
}

impl<'d> Context<'d> {
    pub fn new(diagnostics: &'d mut Diagnostics) -> Self {
        Self {
            registry: TypeRegistry::new(),
            diagnostics,
            package: None,
            simple_names: HashMap::new(),
            class: None,
            method: None,
            scopes: Vec::new(),
            jump_targets: Vec::new(),
        }
    }

    pub fn error(&mut self, line: usize, message: impl Into<String>) {
        self.diagnostics.semantic_error(line, message);
    }

    // Names and types

    pub fn set_package(&mut self, package: Option<String>) {
        self.package = package;
    }

    /// Internal name a type declared in this unit gets
    pub fn qualify(&self, simple_name: &str) -> String {
        match &self.package {
            Some(package) => format!("{}/{}", package.replace('.', "/"), simple_name),
            None => simple_name.to_string(),
        }
    }

    /// Bind a simple name; returns false when it is already bound elsewhere
    pub fn add_simple_name(&mut self, simple_name: &str, internal_name: &str) -> bool {
        match self.simple_names.get(simple_name) {
            Some(existing) => existing == internal_name,
            None => {
                self.simple_names
                    .insert(simple_name.to_string(), internal_name.to_string());
                true
            }
        }
    }

    /// Resolve a dotted or simple source name to an internal class name
    pub fn resolve_class_name(&self, name: &str) -> Option<String> {
        if name.contains('/') {
            return self.registry.contains(name).then(|| name.to_string());
        }
        if name.contains('.') {
            let internal = name.replace('.', "/");
            return self.registry.contains(&internal).then_some(internal);
        }
        if let Some(internal) = self.simple_names.get(name) {
            return Some(internal.clone());
        }
        let java_lang = format!("java/lang/{}", name);
        self.registry.contains(&java_lang).then_some(java_lang)
    }

    /// Resolve a parsed type; unknown names are reported and become `Any`
    pub fn resolve_type(&mut self, ty: &Type, line: usize) -> Type {
        match ty {
            Type::Class(name) => match self.resolve_class_name(name) {
                Some(internal) => Type::class(internal),
                None => {
                    self.error(line, format!("Unable to locate a type named {}", name));
                    Type::Any
                }
            },
            Type::Array(component) => match self.resolve_type(component, line) {
                Type::Any => Type::Any,
                resolved => resolved.array_of(),
            },
            other => other.clone(),
        }
    }

    // Class and method state

    pub fn enter_class(&mut self, internal_name: &str) {
        self.class = Some(internal_name.to_string());
    }

    pub fn leave_class(&mut self) {
        self.class = None;
    }

    pub fn current_class(&self) -> Option<&str> {
        self.class.as_deref()
    }

    pub fn current_class_type(&self) -> Type {
        self.class.as_deref().map(Type::class).unwrap_or(Type::Any)
    }

    pub fn super_class_name(&self) -> Option<String> {
        let class = self.class.as_deref()?;
        self.registry.lookup(class)?.super_name.clone()
    }

    /// Start a method body; slot 0 holds `this` unless static
    pub fn enter_method(&mut self, is_static: bool, is_constructor: bool, return_type: Type) {
        self.method = Some(MethodContext {
            is_static,
            is_constructor,
            return_type,
            next_slot: if is_static { 0 } else { 1 },
        });
        self.scopes = vec![HashMap::new()];
        self.jump_targets.clear();
    }

    /// Finish a method body, returning the number of local slots used
    pub fn leave_method(&mut self) -> u16 {
        self.scopes.clear();
        self.method.take().map_or(0, |m| m.next_slot)
    }

    pub fn method(&self) -> Option<&MethodContext> {
        self.method.as_ref()
    }

    pub fn is_static_context(&self) -> bool {
        self.method.as_ref().map_or(false, |m| m.is_static)
    }

    // Block scopes and locals

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Declare a local in the innermost scope and give it a slot
    pub fn declare_local(&mut self, name: &str, ty: Type, line: usize) -> u16 {
        if self.lookup_local(name).is_some() {
            self.error(line, format!("Redefining name: {}", name));
        }
        let Some(method) = self.method.as_mut() else {
            return 0;
        };
        let slot = method.next_slot;
        method.next_slot += ty.word_size().max(1);
        log::trace!("local {} : {} -> slot {}", name, ty, slot);
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(
                name.to_string(),
                LocalVariable {
                    name: name.to_string(),
                    ty,
                    slot,
                },
            );
        }
        slot
    }

    pub fn lookup_local(&self, name: &str) -> Option<&LocalVariable> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    // Jump targets

    pub fn enter_jump_target(&mut self, target: JumpTarget) {
        self.jump_targets.push(target);
    }

    pub fn leave_jump_target(&mut self) {
        self.jump_targets.pop();
    }

    pub fn can_break(&self) -> bool {
        !self.jump_targets.is_empty()
    }

    pub fn can_continue(&self) -> bool {
        self.jump_targets.contains(&JumpTarget::Loop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_account_for_wide_types() {
        let mut diags = Diagnostics::new("C.java", 10);
        let mut ctx = Context::new(&mut diags);
        ctx.enter_method(false, false, Type::Void);
        assert_eq!(ctx.declare_local("a", Type::Long, 1), 1);
        assert_eq!(ctx.declare_local("b", Type::Int, 1), 3);
        assert_eq!(ctx.declare_local("c", Type::Double, 1), 4);
        assert_eq!(ctx.leave_method(), 6);
    }

    #[test]
    fn test_redeclaration_in_nested_scope_is_reported() {
        let mut diags = Diagnostics::new("C.java", 10);
        {
            let mut ctx = Context::new(&mut diags);
            ctx.enter_method(true, false, Type::Void);
            ctx.declare_local("x", Type::Int, 1);
            ctx.push_scope();
            ctx.declare_local("x", Type::Int, 2);
            ctx.pop_scope();
            ctx.push_scope();
            ctx.declare_local("y", Type::Int, 3);
            ctx.pop_scope();
            ctx.declare_local("y", Type::Int, 4);
        }
        assert_eq!(diags.error_count(), 1);
        assert_eq!(diags.entries()[0].line, 2);
    }

    #[test]
    fn test_implicit_java_lang_resolution() {
        let mut diags = Diagnostics::new("C.java", 10);
        let mut ctx = Context::new(&mut diags);
        assert_eq!(ctx.resolve_type(&Type::Class("String".into()), 1), Type::String);
        assert_eq!(
            ctx.resolve_type(&Type::Class("java.lang.Object".into()), 1),
            Type::object()
        );
        assert_eq!(ctx.resolve_type(&Type::Class("Nope".into()), 7), Type::Any);
        assert!(ctx.diagnostics.error_has_occurred());
    }
}
