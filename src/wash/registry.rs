//! Type registry: class headers for the unit being compiled plus a small
//! built-in slice of `java.lang` and `java.io`.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;

use crate::ast::{InvokeKind, MethodRef, Type};
use crate::consts::{INIT, JAVA_LANG_OBJECT, JAVA_LANG_STRING};

#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub name: String,
    pub ty: Type,
    pub is_static: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodInfo {
    pub name: String,
    pub params: Vec<Type>,
    pub return_type: Type,
    pub is_static: bool,
    pub is_abstract: bool,
    pub is_private: bool,
}

impl MethodInfo {
    pub fn descriptor(&self) -> String {
        Type::method_descriptor(&self.params, &self.return_type)
    }

    /// `name(int, java.lang.String)` for messages
    pub fn signature(&self) -> String {
        format!("{}({})", self.name, type_list(&self.params))
    }
}

/// Class or interface header, without any code
#[derive(Debug, Clone, PartialEq)]
pub struct ClassInfo {
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub is_interface: bool,
    pub is_abstract: bool,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub constructors: Vec<Vec<Type>>,
}

impl ClassInfo {
    pub fn new(name: impl Into<String>, super_name: Option<&str>) -> Self {
        Self {
            name: name.into(),
            super_name: super_name.map(str::to_string),
            interfaces: Vec::new(),
            is_interface: false,
            is_abstract: false,
            fields: Vec::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
        }
    }

    fn interface(name: &str) -> Self {
        let mut info = Self::new(name, None);
        info.is_interface = true;
        info.is_abstract = true;
        info
    }

    fn ctor(mut self, params: &[Type]) -> Self {
        self.constructors.push(params.to_vec());
        self
    }

    fn method(mut self, name: &str, params: &[Type], return_type: Type) -> Self {
        self.methods.push(MethodInfo {
            name: name.to_string(),
            params: params.to_vec(),
            return_type,
            is_static: false,
            is_abstract: self.is_interface,
            is_private: false,
        });
        self
    }

    fn static_method(mut self, name: &str, params: &[Type], return_type: Type) -> Self {
        self.methods.push(MethodInfo {
            name: name.to_string(),
            params: params.to_vec(),
            return_type,
            is_static: true,
            is_abstract: false,
            is_private: false,
        });
        self
    }

    fn static_field(mut self, name: &str, ty: Type) -> Self {
        self.fields.push(FieldInfo {
            name: name.to_string(),
            ty,
            is_static: true,
        });
        self
    }
}

/// Outcome of overload resolution
#[derive(Debug, Clone, PartialEq)]
pub enum Selection<T> {
    Found(T),
    NotFound,
    Ambiguous,
}

fn class(name: &str) -> Type {
    Type::class(name)
}

fn throwable(name: &str, super_name: &str) -> ClassInfo {
    ClassInfo::new(name, Some(super_name))
        .ctor(&[])
        .ctor(&[Type::String])
}

static BUILTINS: Lazy<HashMap<String, ClassInfo>> = Lazy::new(|| {
    use Type::{Boolean as Z, Char as C, Double as D, Int as I, Long as J, String as S, Void as V};
    let object = Type::object();
    let print_stream = class("java/io/PrintStream");
    let builder = class("java/lang/StringBuilder");
    let printable = [I, J, D, C, Z, S, object.clone()];

    let mut out = ClassInfo::new("java/io/PrintStream", Some(JAVA_LANG_OBJECT)).method("println", &[], V);
    for ty in &printable {
        out = out
            .method("print", &[ty.clone()], V)
            .method("println", &[ty.clone()], V);
    }

    let mut sb = ClassInfo::new("java/lang/StringBuilder", Some(JAVA_LANG_OBJECT))
        .ctor(&[])
        .ctor(&[S])
        .method("toString", &[], S)
        .method("length", &[], I);
    for ty in &printable {
        sb = sb.method("append", &[ty.clone()], builder.clone());
    }

    let mut string = ClassInfo::new(JAVA_LANG_STRING, Some(JAVA_LANG_OBJECT))
        .ctor(&[])
        .ctor(&[S])
        .method("length", &[], I)
        .method("charAt", &[I], C)
        .method("equals", &[object.clone()], Z)
        .method("compareTo", &[S], I)
        .method("concat", &[S], S)
        .method("indexOf", &[S], I)
        .method("isEmpty", &[], Z)
        .method("substring", &[I], S)
        .method("substring", &[I, I], S)
        .method("toString", &[], S);
    string.interfaces.push("java/lang/Comparable".to_string());
    for ty in &printable[..5] {
        string = string.static_method("valueOf", &[ty.clone()], S);
    }
    string = string.static_method("valueOf", &[object.clone()], S);

    let classes = vec![
        ClassInfo::new(JAVA_LANG_OBJECT, None)
            .ctor(&[])
            .method("toString", &[], S)
            .method("equals", &[object.clone()], Z)
            .method("hashCode", &[], I),
        string,
        sb,
        out,
        ClassInfo::interface("java/lang/Comparable").method("compareTo", &[object.clone()], I),
        ClassInfo::interface("java/lang/Runnable").method("run", &[], V),
        ClassInfo::new("java/lang/System", Some(JAVA_LANG_OBJECT))
            .static_field("out", print_stream.clone())
            .static_field("err", print_stream)
            .static_method("exit", &[I], V)
            .static_method("currentTimeMillis", &[], J)
            .static_method("nanoTime", &[], J),
        ClassInfo::new("java/lang/Integer", Some(JAVA_LANG_OBJECT))
            .static_field("MAX_VALUE", I)
            .static_field("MIN_VALUE", I)
            .static_method("parseInt", &[S], I)
            .static_method("toString", &[I], S),
        ClassInfo::new("java/lang/Long", Some(JAVA_LANG_OBJECT))
            .static_field("MAX_VALUE", J)
            .static_field("MIN_VALUE", J)
            .static_method("parseLong", &[S], J)
            .static_method("toString", &[J], S),
        ClassInfo::new("java/lang/Double", Some(JAVA_LANG_OBJECT))
            .static_method("parseDouble", &[S], D)
            .static_method("toString", &[D], S),
        ClassInfo::new("java/lang/Character", Some(JAVA_LANG_OBJECT))
            .static_method("isDigit", &[C], Z)
            .static_method("isLetter", &[C], Z)
            .static_method("isWhitespace", &[C], Z)
            .static_method("toUpperCase", &[C], C)
            .static_method("toLowerCase", &[C], C),
        ClassInfo::new("java/lang/Math", Some(JAVA_LANG_OBJECT))
            .static_method("abs", &[I], I)
            .static_method("abs", &[J], J)
            .static_method("abs", &[D], D)
            .static_method("max", &[I, I], I)
            .static_method("max", &[J, J], J)
            .static_method("max", &[D, D], D)
            .static_method("min", &[I, I], I)
            .static_method("min", &[J, J], J)
            .static_method("min", &[D, D], D)
            .static_method("sqrt", &[D], D)
            .static_method("pow", &[D, D], D),
        throwable("java/lang/Throwable", JAVA_LANG_OBJECT)
            .method("getMessage", &[], S)
            .method("printStackTrace", &[], V)
            .method("toString", &[], S),
        throwable("java/lang/Exception", "java/lang/Throwable"),
        throwable("java/lang/RuntimeException", "java/lang/Exception"),
        throwable("java/lang/ArithmeticException", "java/lang/RuntimeException"),
        throwable("java/lang/IllegalArgumentException", "java/lang/RuntimeException"),
        throwable("java/lang/IllegalStateException", "java/lang/RuntimeException"),
    ];

    classes.into_iter().map(|info| (info.name.clone(), info)).collect()
});

/// Registry of every class header visible to the unit
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    declared: HashMap<String, ClassInfo>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a class declared in the unit
    pub fn declare(&mut self, info: ClassInfo) {
        log::trace!("registry: declare {}", info.name);
        self.declared.insert(info.name.clone(), info);
    }

    pub fn lookup(&self, name: &str) -> Option<&ClassInfo> {
        self.declared.get(name).or_else(|| BUILTINS.get(name))
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut ClassInfo> {
        self.declared.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn is_declared_in_unit(&self, name: &str) -> bool {
        self.declared.contains_key(name)
    }

    /// `name` followed by every superclass and superinterface, each once.
    /// Interfaces end with `java/lang/Object`.
    pub fn ancestors(&self, name: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue = vec![name.to_string()];
        while !queue.is_empty() {
            let current = queue.remove(0);
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(info) = self.lookup(&current) {
                if let Some(super_name) = &info.super_name {
                    queue.push(super_name.clone());
                }
                queue.extend(info.interfaces.iter().cloned());
            }
            order.push(current);
        }
        if !seen.contains(JAVA_LANG_OBJECT) {
            order.push(JAVA_LANG_OBJECT.to_string());
        }
        order
    }

    /// True when the superclass chain of `name` leads back to itself
    pub fn has_cyclic_inheritance(&self, name: &str) -> bool {
        let mut seen = HashSet::new();
        let mut current = self.lookup(name).and_then(|info| info.super_name.clone());
        while let Some(next) = current {
            if next == name {
                return true;
            }
            if !seen.insert(next.clone()) {
                return false;
            }
            current = self.lookup(&next).and_then(|info| info.super_name.clone());
        }
        false
    }

    pub fn is_subclass(&self, sub: &str, sup: &str) -> bool {
        sub == sup || self.ancestors(sub).iter().any(|a| a == sup)
    }

    pub fn is_interface(&self, name: &str) -> bool {
        self.lookup(name).map_or(false, |info| info.is_interface)
    }

    /// Whether a value of type `from` may be stored where `to` is expected
    pub fn is_assignable(&self, from: &Type, to: &Type) -> bool {
        if from == to || from.is_any() || to.is_any() {
            return true;
        }
        match (from, to) {
            (Type::Char, Type::Int | Type::Long | Type::Double) => true,
            (Type::Int, Type::Long | Type::Double) => true,
            (Type::Long, Type::Double) => true,
            (Type::Null, to) => to.is_reference(),
            (from, Type::Class(name)) if name == JAVA_LANG_OBJECT => from.is_reference(),
            (Type::String, Type::Class(name)) => self.is_subclass(JAVA_LANG_STRING, name),
            (Type::Class(sub), Type::Class(sup)) => self.is_subclass(sub, sup),
            (Type::Array(a), Type::Array(b)) => {
                if a.is_primitive() || b.is_primitive() {
                    a == b
                } else {
                    self.is_assignable(a, b)
                }
            }
            _ => false,
        }
    }

    /// Find a field in `class` or its ancestors, returning the declaring class
    pub fn find_field(&self, class: &str, name: &str) -> Option<(String, FieldInfo)> {
        self.ancestors(class).into_iter().find_map(|owner| {
            let field = self.lookup(&owner)?.fields.iter().find(|f| f.name == name)?.clone();
            Some((owner, field))
        })
    }

    /// Every visible method named `name`; overridden ones are hidden
    pub fn find_methods(&self, class: &str, name: &str) -> Vec<(String, MethodInfo)> {
        let mut found: Vec<(String, MethodInfo)> = Vec::new();
        for owner in self.ancestors(class) {
            let Some(info) = self.lookup(&owner) else {
                continue;
            };
            for method in info.methods.iter().filter(|m| m.name == name) {
                if !found.iter().any(|(_, m)| m.params == method.params) {
                    found.push((owner.clone(), method.clone()));
                }
            }
        }
        found
    }

    /// Pick the overload for `args`: an exact match, else the single most
    /// specific applicable candidate
    pub fn select<'a>(&self, candidates: &'a [Vec<Type>], args: &[Type]) -> Selection<&'a Vec<Type>> {
        if let Some(exact) = candidates.iter().find(|params| params.as_slice() == args) {
            return Selection::Found(exact);
        }
        let applicable: Vec<&Vec<Type>> = candidates
            .iter()
            .filter(|params| {
                params.len() == args.len()
                    && params.iter().zip(args).all(|(p, a)| self.is_assignable(a, p))
            })
            .collect();
        match applicable.len() {
            0 => Selection::NotFound,
            1 => Selection::Found(applicable[0]),
            _ => {
                let most_specific: Vec<&Vec<Type>> = applicable
                    .iter()
                    .filter(|m| {
                        applicable.iter().all(|n| {
                            m.iter().zip(n.iter()).all(|(mp, np)| self.is_assignable(mp, np))
                        })
                    })
                    .copied()
                    .collect();
                if most_specific.len() == 1 {
                    Selection::Found(most_specific[0])
                } else {
                    Selection::Ambiguous
                }
            }
        }
    }

    /// Resolve a call on `class` to a method reference
    pub fn select_method(&self, class: &str, name: &str, args: &[Type]) -> Selection<(String, MethodInfo)> {
        let methods = self.find_methods(class, name);
        let signatures: Vec<Vec<Type>> = methods.iter().map(|(_, m)| m.params.clone()).collect();
        match self.select(&signatures, args) {
            Selection::Found(params) => methods
                .into_iter()
                .find(|(_, m)| &m.params == params)
                .map_or(Selection::NotFound, Selection::Found),
            Selection::NotFound => Selection::NotFound,
            Selection::Ambiguous => Selection::Ambiguous,
        }
    }

    /// Resolve `new class(args)` to a constructor reference and its parameters
    pub fn select_constructor(&self, class: &str, args: &[Type]) -> Selection<(MethodRef, Vec<Type>)> {
        let Some(info) = self.lookup(class) else {
            return Selection::NotFound;
        };
        match self.select(&info.constructors, args) {
            Selection::Found(params) => Selection::Found((
                MethodRef {
                    owner: class.to_string(),
                    name: INIT.to_string(),
                    descriptor: Type::method_descriptor(params, &Type::Void),
                    kind: InvokeKind::Special,
                },
                params.clone(),
            )),
            Selection::NotFound => Selection::NotFound,
            Selection::Ambiguous => Selection::Ambiguous,
        }
    }

    /// Abstract methods reachable from `class` with no concrete override
    pub fn unimplemented_methods(&self, class: &str) -> Vec<(String, MethodInfo)> {
        let ancestors = self.ancestors(class);
        let mut concrete: Vec<(String, String)> = Vec::new();
        let mut missing = Vec::new();
        for owner in &ancestors {
            let Some(info) = self.lookup(owner) else {
                continue;
            };
            for method in &info.methods {
                let key = (method.name.clone(), method.descriptor());
                if !method.is_abstract {
                    concrete.push(key);
                } else if !concrete.contains(&key)
                    && !missing.iter().any(|(_, m): &(String, MethodInfo)| m.descriptor() == key.1 && m.name == key.0)
                {
                    missing.push((owner.clone(), method.clone()));
                }
            }
        }
        missing
            .into_iter()
            .filter(|(_, m)| !concrete.contains(&(m.name.clone(), m.descriptor())))
            .collect()
    }
}

/// `int, java.lang.String` for messages
pub fn type_list(types: &[Type]) -> String {
    types.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        let registry = TypeRegistry::new();
        assert!(registry.contains("java/lang/System"));
        let (owner, field) = registry.find_field("java/lang/System", "out").expect("System.out");
        assert_eq!(owner, "java/lang/System");
        assert_eq!(field.ty, Type::class("java/io/PrintStream"));
    }

    #[test]
    fn test_widening_assignability() {
        let registry = TypeRegistry::new();
        assert!(registry.is_assignable(&Type::Char, &Type::Int));
        assert!(registry.is_assignable(&Type::Int, &Type::Double));
        assert!(!registry.is_assignable(&Type::Double, &Type::Int));
        assert!(registry.is_assignable(&Type::Null, &Type::String));
        assert!(registry.is_assignable(&Type::String, &Type::object()));
        assert!(registry.is_assignable(
            &Type::class("java/lang/ArithmeticException"),
            &Type::class("java/lang/Exception")
        ));
        assert!(!registry.is_assignable(&Type::Int.array_of(), &Type::Long.array_of()));
    }

    #[test]
    fn test_println_overloads_prefer_exact_match() {
        let registry = TypeRegistry::new();
        let Selection::Found((_, method)) =
            registry.select_method("java/io/PrintStream", "println", &[Type::Char])
        else {
            panic!("println(char) should resolve");
        };
        assert_eq!(method.descriptor(), "(C)V");
    }

    #[test]
    fn test_most_specific_overload_wins() {
        let registry = TypeRegistry::new();
        let Selection::Found((_, method)) = registry.select_method("java/lang/Math", "abs", &[Type::Char])
        else {
            panic!("abs(char) should resolve");
        };
        assert_eq!(method.descriptor(), "(I)I");
    }

    #[test]
    fn test_null_argument_prefers_string_over_object() {
        let registry = TypeRegistry::new();
        let Selection::Found((_, method)) =
            registry.select_method("java/io/PrintStream", "println", &[Type::Null])
        else {
            panic!("println(null) should resolve");
        };
        assert_eq!(method.descriptor(), "(Ljava/lang/String;)V");
    }

    #[test]
    fn test_crossed_widening_is_ambiguous() {
        let mut registry = TypeRegistry::new();
        registry.declare(
            ClassInfo::new("Pair", Some(JAVA_LANG_OBJECT))
                .static_method("m", &[Type::Int, Type::Long], Type::Void)
                .static_method("m", &[Type::Long, Type::Int], Type::Void),
        );
        let result = registry.select_method("Pair", "m", &[Type::Int, Type::Int]);
        assert_eq!(result, Selection::Ambiguous);
    }

    #[test]
    fn test_constructor_selection() {
        let registry = TypeRegistry::new();
        let Selection::Found((ctor, params)) =
            registry.select_constructor("java/lang/Exception", &[Type::String])
        else {
            panic!("Exception(String) should resolve");
        };
        assert_eq!(ctor.descriptor, "(Ljava/lang/String;)V");
        assert_eq!(params, vec![Type::String]);
    }
}
