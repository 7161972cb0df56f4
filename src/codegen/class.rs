//! Class output model: ClassOutput, FieldOutput, MethodOutput

use std::fmt::Write as _;

use crate::ast::*;
use crate::codegen::code::{Code, CodeBuffer};
use crate::codegen::gen::MethodGen;
use crate::consts::{CLINIT, INIT, JAVA_LANG_OBJECT};
use crate::error::Result;
use crate::wash::registry::TypeRegistry;

/// Access flags of classes, fields and methods
pub mod access {
    pub const PUBLIC: u16 = 0x0001;
    pub const PRIVATE: u16 = 0x0002;
    pub const PROTECTED: u16 = 0x0004;
    pub const STATIC: u16 = 0x0008;
    pub const SUPER: u16 = 0x0020;
    pub const INTERFACE: u16 = 0x0200;
    pub const ABSTRACT: u16 = 0x0400;

    /// Flag names in listing order
    pub(crate) const NAMES: &[(u16, &str)] = &[
        (PUBLIC, "public"),
        (PRIVATE, "private"),
        (PROTECTED, "protected"),
        (STATIC, "static"),
        (SUPER, "super"),
        (INTERFACE, "interface"),
        (ABSTRACT, "abstract"),
    ];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldOutput {
    pub name: String,
    pub descriptor: String,
    pub access_flags: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodOutput {
    pub name: String,
    pub descriptor: String,
    pub access_flags: u16,
    /// `None` for abstract methods
    pub code: Option<Code>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassOutput {
    /// Internal name, e.g. `pkg/Main`
    pub name: String,
    pub super_name: String,
    pub interfaces: Vec<String>,
    pub access_flags: u16,
    pub fields: Vec<FieldOutput>,
    pub methods: Vec<MethodOutput>,
}

impl ClassOutput {
    /// First method called `name`
    pub fn method(&self, name: &str) -> Option<&MethodOutput> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldOutput> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Simple name, used for output file names
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & access::INTERFACE != 0
    }

    /// Assembler-style text of the whole class
    pub fn listing(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, ".class {}{}", flag_text(self.access_flags), self.name);
        let _ = writeln!(out, ".super {}", self.super_name);
        for interface in &self.interfaces {
            let _ = writeln!(out, ".implements {}", interface);
        }
        if !self.fields.is_empty() {
            out.push('\n');
        }
        for field in &self.fields {
            let _ = writeln!(out, ".field {}{} {}", flag_text(field.access_flags), field.name, field.descriptor);
        }
        for method in &self.methods {
            out.push('\n');
            let _ = writeln!(
                out,
                ".method {}{} {}",
                flag_text(method.access_flags),
                method.name,
                method.descriptor
            );
            if let Some(code) = &method.code {
                let _ = writeln!(out, "  .limit locals {}", code.max_locals);
                out.push_str(&code.listing());
            }
            let _ = writeln!(out, ".end method");
        }
        out
    }
}

fn flag_text(flags: u16) -> String {
    access::NAMES
        .iter()
        .filter(|(flag, _)| flags & flag != 0)
        .map(|(_, name)| format!("{} ", name))
        .collect()
}

fn member_flags(modifiers: &Modifiers) -> u16 {
    modifiers.list.iter().fold(0, |flags, modifier| {
        flags
            | match modifier {
                Modifier::Public => access::PUBLIC,
                Modifier::Protected => access::PROTECTED,
                Modifier::Private => access::PRIVATE,
                Modifier::Static => access::STATIC,
                Modifier::Abstract => access::ABSTRACT,
            }
    })
}

/// Field store run by a constructor or `<clinit>`
struct FieldInit<'u> {
    field: FieldRef,
    value: &'u Expr,
}

pub fn generate_class(class: &ClassDecl, name: &str, registry: &TypeRegistry) -> Result<ClassOutput> {
    let info = registry.lookup(name);
    let super_name = info
        .and_then(|info| info.super_name.clone())
        .unwrap_or_else(|| JAVA_LANG_OBJECT.to_string());
    let interfaces = info.map(|info| info.interfaces.clone()).unwrap_or_default();

    let mut fields = Vec::new();
    let mut instance_inits = Vec::new();
    let mut static_inits = Vec::new();
    for member in &class.members {
        let Member::Field(field) = member else {
            continue;
        };
        let is_static = field.modifiers.is_static();
        for declarator in &field.declarators {
            fields.push(FieldOutput {
                name: declarator.name.clone(),
                descriptor: declarator.ty.descriptor(),
                access_flags: member_flags(&field.modifiers),
            });
            if let Some(value) = &declarator.initializer {
                let init = FieldInit {
                    field: FieldRef {
                        owner: name.to_string(),
                        name: declarator.name.clone(),
                        descriptor: declarator.ty.descriptor(),
                        is_static,
                    },
                    value,
                };
                if is_static {
                    static_inits.push(init);
                } else {
                    instance_inits.push(init);
                }
            }
        }
    }

    let mut methods = Vec::new();
    for member in &class.members {
        match member {
            Member::Constructor(ctor) => methods.push(generate_constructor(ctor, &instance_inits, registry)?),
            Member::Method(method) => methods.push(generate_method(method, registry)?),
            Member::Field(_) => {}
        }
    }
    if !static_inits.is_empty() {
        methods.push(generate_clinit(&static_inits, registry)?);
    }

    log::trace!("codegen: class {} ({} method(s))", name, methods.len());
    Ok(ClassOutput {
        name: name.to_string(),
        super_name,
        interfaces,
        access_flags: member_flags(&class.modifiers) | access::SUPER,
        fields,
        methods,
    })
}

pub fn generate_interface(interface: &InterfaceDecl, name: &str, registry: &TypeRegistry) -> Result<ClassOutput> {
    let interfaces = registry
        .lookup(name)
        .map(|info| info.interfaces.clone())
        .unwrap_or_default();
    let methods = interface
        .members
        .iter()
        .filter_map(|member| match member {
            Member::Method(method) => Some(MethodOutput {
                name: method.name.clone(),
                descriptor: method.descriptor(),
                access_flags: access::PUBLIC | access::ABSTRACT,
                code: None,
            }),
            _ => None,
        })
        .collect();
    Ok(ClassOutput {
        name: name.to_string(),
        super_name: JAVA_LANG_OBJECT.to_string(),
        interfaces,
        access_flags: member_flags(&interface.modifiers) | access::INTERFACE | access::ABSTRACT,
        fields: Vec::new(),
        methods,
    })
}

fn generate_method(method: &MethodDecl, registry: &TypeRegistry) -> Result<MethodOutput> {
    let code = match &method.body {
        Some(body) => {
            let mut gen = MethodGen::new(registry, CodeBuffer::default(), method.return_type.clone(), method.locals);
            gen.gen_block(body)?;
            gen.close_body(&body.statements);
            Some(gen.finish()?)
        }
        None => None,
    };
    log::trace!("codegen: method {}{}", method.name, method.descriptor());
    Ok(MethodOutput {
        name: method.name.clone(),
        descriptor: method.descriptor(),
        access_flags: member_flags(&method.modifiers),
        code,
    })
}

/// Constructor body; instance field initializers run right after the
/// superclass constructor returns
fn generate_constructor(ctor: &ConstructorDecl, inits: &[FieldInit<'_>], registry: &TypeRegistry) -> Result<MethodOutput> {
    let mut gen = MethodGen::new(registry, CodeBuffer::default(), Type::Void, ctor.locals);
    let statements = &ctor.body.statements;
    if let Some((first, rest)) = statements.split_first() {
        gen.gen_stmt(first)?;
        let calls_super = matches!(
            &first.kind,
            StmtKind::Expression(Expr {
                kind: ExprKind::SuperConstruction { .. },
                ..
            })
        );
        if calls_super {
            for init in inits {
                gen.gen_field_initializer(&init.field, init.value)?;
            }
        }
        gen.gen_stmts(rest)?;
    }
    gen.close_body(statements);
    Ok(MethodOutput {
        name: INIT.to_string(),
        descriptor: ctor.descriptor(),
        access_flags: member_flags(&ctor.modifiers),
        code: Some(gen.finish()?),
    })
}

fn generate_clinit(inits: &[FieldInit<'_>], registry: &TypeRegistry) -> Result<MethodOutput> {
    let mut gen = MethodGen::new(registry, CodeBuffer::default(), Type::Void, 0);
    for init in inits {
        gen.gen_field_initializer(&init.field, init.value)?;
    }
    gen.close_body(&[]);
    Ok(MethodOutput {
        name: CLINIT.to_string(),
        descriptor: "()V".to_string(),
        access_flags: access::STATIC,
        code: Some(gen.finish()?),
    })
}
