//! Enter phase - type declaration and member headers
//!
//! Runs before any method body is looked at:
//! 1. every type of the unit is registered under its name with an empty
//!    header, so declarations may refer to each other in any order;
//! 2. imports are bound to their simple names;
//! 3. member headers (field types, method and constructor signatures) are
//!    resolved and recorded in the registry.

use crate::ast::*;
use crate::consts::JAVA_LANG_OBJECT;
use crate::wash::context::Context;
use crate::wash::registry::{type_list, ClassInfo, FieldInfo, MethodInfo};

/// Enter phase processor
pub struct Enter;

impl Enter {
    pub fn new() -> Self {
        Self
    }

    /// Register the unit's types and return it with header types resolved
    pub fn process(&mut self, unit: CompilationUnit, ctx: &mut Context<'_>) -> CompilationUnit {
        ctx.set_package(unit.package.as_ref().map(|p| p.to_string()));

        for decl in &unit.type_decls {
            self.declare_this_type(decl, ctx);
        }
        for import in &unit.imports {
            self.process_import(import, ctx);
        }

        let type_decls: Vec<TypeDecl> = unit
            .type_decls
            .into_iter()
            .map(|decl| self.pre_analyze(decl, ctx))
            .collect();

        for decl in &type_decls {
            let name = ctx.qualify(decl.name());
            if ctx.registry.has_cyclic_inheritance(&name) {
                ctx.error(decl.line(), format!("Cyclic inheritance involving {}", decl.name()));
                if let Some(info) = ctx.registry.lookup_mut(&name) {
                    info.super_name = Some(JAVA_LANG_OBJECT.to_string());
                }
            }
        }

        log::debug!("enter: {} type(s), {} import(s)", type_decls.len(), unit.imports.len());
        CompilationUnit { type_decls, ..unit }
    }

    /// Register a placeholder header so the type can be named anywhere in the unit
    fn declare_this_type(&mut self, decl: &TypeDecl, ctx: &mut Context<'_>) {
        let name = ctx.qualify(decl.name());
        if ctx.registry.is_declared_in_unit(&name) {
            ctx.error(decl.line(), format!("Type {} already declared", decl.name()));
            return;
        }
        let mut info = ClassInfo::new(name.clone(), Some(JAVA_LANG_OBJECT));
        match decl {
            TypeDecl::Class(class) => info.is_abstract = class.modifiers.is_abstract(),
            TypeDecl::Interface(_) => {
                info.super_name = None;
                info.is_interface = true;
                info.is_abstract = true;
            }
        }
        ctx.add_simple_name(decl.name(), &name);
        ctx.registry.declare(info);
    }

    fn process_import(&mut self, import: &QualifiedName, ctx: &mut Context<'_>) {
        let internal = import.internal_name();
        if !ctx.registry.contains(&internal) {
            ctx.error(import.line, format!("Unable to find {}", import));
            return;
        }
        if !ctx.add_simple_name(import.simple_name(), &internal) {
            ctx.error(
                import.line,
                format!("Import {} conflicts with another type named {}", import, import.simple_name()),
            );
        }
    }

    /// Resolve member headers and complete the registry entry
    fn pre_analyze(&mut self, decl: TypeDecl, ctx: &mut Context<'_>) -> TypeDecl {
        match decl {
            TypeDecl::Class(class) => TypeDecl::Class(self.pre_analyze_class(class, ctx)),
            TypeDecl::Interface(interface) => {
                TypeDecl::Interface(self.pre_analyze_interface(interface, ctx))
            }
        }
    }

    fn pre_analyze_class(&mut self, class: ClassDecl, ctx: &mut Context<'_>) -> ClassDecl {
        let name = ctx.qualify(&class.name);
        let line = class.line;

        let super_class = class.super_class.as_ref().map(|ty| {
            let resolved = ctx.resolve_type(ty, line);
            if let Type::Class(super_name) = &resolved {
                if ctx.registry.is_interface(super_name) {
                    ctx.error(line, format!("Cannot extend interface {}", resolved));
                }
            } else if !resolved.is_any() {
                ctx.error(line, format!("Cannot extend {}", resolved));
            }
            resolved
        });
        let interfaces = self.resolve_interfaces(&class.interfaces, line, ctx);

        let mut info = ClassInfo::new(name.clone(), Some(JAVA_LANG_OBJECT));
        info.is_abstract = class.modifiers.is_abstract();
        if let Some(Type::Class(super_name)) = &super_class {
            info.super_name = Some(super_name.clone());
        }
        info.interfaces = internal_names(&interfaces);

        let members: Vec<Member> = class
            .members
            .into_iter()
            .map(|member| self.pre_analyze_member(member, &mut info, ctx))
            .collect();
        if info.constructors.is_empty() {
            info.constructors.push(Vec::new());
        }

        log::trace!(
            "enter: class {} ({} field(s), {} method(s))",
            name,
            info.fields.len(),
            info.methods.len()
        );
        ctx.registry.declare(info);
        ClassDecl {
            super_class,
            interfaces,
            members,
            ..class
        }
    }

    fn pre_analyze_interface(&mut self, interface: InterfaceDecl, ctx: &mut Context<'_>) -> InterfaceDecl {
        let name = ctx.qualify(&interface.name);
        let extends = self.resolve_interfaces(&interface.extends, interface.line, ctx);

        let mut info = ClassInfo::new(name.clone(), None);
        info.is_interface = true;
        info.is_abstract = true;
        info.interfaces = internal_names(&extends);

        let members: Vec<Member> = interface
            .members
            .into_iter()
            .map(|member| self.pre_analyze_member(member, &mut info, ctx))
            .collect();

        log::trace!("enter: interface {} ({} method(s))", name, info.methods.len());
        ctx.registry.declare(info);
        InterfaceDecl {
            extends,
            members,
            ..interface
        }
    }

    fn resolve_interfaces(&mut self, types: &[Type], line: usize, ctx: &mut Context<'_>) -> Vec<Type> {
        types
            .iter()
            .map(|ty| {
                let resolved = ctx.resolve_type(ty, line);
                let is_interface = match &resolved {
                    Type::Class(name) => ctx.registry.is_interface(name),
                    Type::Any => true,
                    _ => false,
                };
                if !is_interface {
                    ctx.error(line, format!("{} is not an interface", resolved));
                }
                resolved
            })
            .collect()
    }

    fn pre_analyze_member(&mut self, member: Member, info: &mut ClassInfo, ctx: &mut Context<'_>) -> Member {
        match member {
            Member::Field(field) => {
                let declarators = field
                    .declarators
                    .into_iter()
                    .map(|declarator| {
                        let ty = ctx.resolve_type(&declarator.ty, declarator.line);
                        if info.fields.iter().any(|f| f.name == declarator.name) {
                            ctx.error(declarator.line, format!("Field {} already declared", declarator.name));
                        } else {
                            info.fields.push(FieldInfo {
                                name: declarator.name.clone(),
                                ty: ty.clone(),
                                is_static: field.modifiers.is_static(),
                            });
                        }
                        VariableDeclarator { ty, ..declarator }
                    })
                    .collect();
                Member::Field(FieldDecl { declarators, ..field })
            }
            Member::Method(method) => {
                let return_type = ctx.resolve_type(&method.return_type, method.line);
                let params = self.resolve_params(method.params, ctx);
                let throws = method.throws.iter().map(|t| ctx.resolve_type(t, method.line)).collect();
                let param_types: Vec<Type> = params.iter().map(|p| p.ty.clone()).collect();
                if info
                    .methods
                    .iter()
                    .any(|m| m.name == method.name && m.params == param_types)
                {
                    ctx.error(
                        method.line,
                        format!("Method {}({}) already declared", method.name, type_list(&param_types)),
                    );
                } else {
                    info.methods.push(MethodInfo {
                        name: method.name.clone(),
                        params: param_types,
                        return_type: return_type.clone(),
                        is_static: method.modifiers.is_static(),
                        is_abstract: method.modifiers.is_abstract(),
                        is_private: method.modifiers.is_private(),
                    });
                }
                Member::Method(MethodDecl {
                    return_type,
                    params,
                    throws,
                    ..method
                })
            }
            Member::Constructor(ctor) => {
                let params = self.resolve_params(ctor.params, ctx);
                let throws = ctor.throws.iter().map(|t| ctx.resolve_type(t, ctor.line)).collect();
                let param_types: Vec<Type> = params.iter().map(|p| p.ty.clone()).collect();
                if info.constructors.contains(&param_types) {
                    ctx.error(
                        ctor.line,
                        format!("Constructor {}({}) already declared", ctor.name, type_list(&param_types)),
                    );
                } else {
                    info.constructors.push(param_types);
                }
                Member::Constructor(ConstructorDecl { params, throws, ..ctor })
            }
        }
    }

    fn resolve_params(&mut self, params: Vec<FormalParameter>, ctx: &mut Context<'_>) -> Vec<FormalParameter> {
        params
            .into_iter()
            .map(|param| {
                let ty = ctx.resolve_type(&param.ty, param.line);
                FormalParameter { ty, ..param }
            })
            .collect()
    }
}

impl Default for Enter {
    fn default() -> Self {
        Self::new()
    }
}

fn internal_names(types: &[Type]) -> Vec<String> {
    types
        .iter()
        .filter_map(|ty| match ty {
            Type::Class(name) => Some(name.clone()),
            _ => None,
        })
        .collect()
}
