use std::fmt;

use crate::consts::{JAVA_LANG_OBJECT, JAVA_LANG_STRING};

/// Type of a j-- expression or declaration.
///
/// `Class` names are dotted source names straight out of the parser and
/// slash-separated internal names (`java/lang/Object`) once resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Long,
    Double,
    Boolean,
    Char,
    String,
    Void,
    /// Type of the `null` literal
    Null,
    /// Assigned after a type error; matches anything so errors do not cascade
    Any,
    Class(String),
    Array(Box<Type>),
}

impl Type {
    /// Build a class type, folding `java/lang/String` into `Type::String`
    pub fn class(internal_name: impl Into<String>) -> Type {
        let name = internal_name.into();
        if name == JAVA_LANG_STRING {
            Type::String
        } else {
            Type::Class(name)
        }
    }

    pub fn object() -> Type {
        Type::Class(JAVA_LANG_OBJECT.to_string())
    }

    pub fn array_of(self) -> Type {
        Type::Array(Box::new(self))
    }

    /// Wrap `self` in `dims` array levels
    pub fn with_dims(self, dims: usize) -> Type {
        (0..dims).fold(self, |ty, _| ty.array_of())
    }

    pub fn component(&self) -> Option<&Type> {
        match self {
            Type::Array(component) => Some(component),
            _ => None,
        }
    }

    /// Number of array levels
    pub fn dims(&self) -> usize {
        match self {
            Type::Array(component) => 1 + component.dims(),
            _ => 0,
        }
    }

    /// Innermost non-array type
    pub fn element(&self) -> &Type {
        match self {
            Type::Array(component) => component.element(),
            other => other,
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::Int | Type::Long | Type::Double | Type::Boolean | Type::Char)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Long | Type::Double | Type::Char)
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, Type::Int | Type::Long | Type::Char)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Type::String | Type::Null | Type::Class(_) | Type::Array(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array(_))
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Type::Any)
    }

    /// Stack words taken by a value of this type
    pub fn word_size(&self) -> u16 {
        match self {
            Type::Void => 0,
            Type::Long | Type::Double => 2,
            _ => 1,
        }
    }

    /// Unary numeric promotion: `char` computes as `int`
    pub fn promoted(&self) -> Type {
        match self {
            Type::Char => Type::Int,
            other => other.clone(),
        }
    }

    /// JVM field descriptor
    pub fn descriptor(&self) -> String {
        match self {
            Type::Int => "I".to_string(),
            Type::Long => "J".to_string(),
            Type::Double => "D".to_string(),
            Type::Boolean => "Z".to_string(),
            Type::Char => "C".to_string(),
            Type::Void => "V".to_string(),
            Type::String => format!("L{};", JAVA_LANG_STRING),
            Type::Class(name) => format!("L{};", name),
            Type::Array(component) => format!("[{}", component.descriptor()),
            Type::Null | Type::Any => format!("L{};", JAVA_LANG_OBJECT),
        }
    }

    /// Operand of NEW/ANEWARRAY/CHECKCAST/INSTANCEOF
    pub fn internal_name(&self) -> String {
        match self {
            Type::String => JAVA_LANG_STRING.to_string(),
            Type::Class(name) => name.clone(),
            Type::Array(_) => self.descriptor(),
            Type::Null | Type::Any => JAVA_LANG_OBJECT.to_string(),
            primitive => primitive.descriptor(),
        }
    }

    /// `(params)ret` method descriptor
    pub fn method_descriptor(params: &[Type], ret: &Type) -> String {
        let params: String = params.iter().map(Type::descriptor).collect();
        format!("({}){}", params, ret.descriptor())
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Long => write!(f, "long"),
            Type::Double => write!(f, "double"),
            Type::Boolean => write!(f, "boolean"),
            Type::Char => write!(f, "char"),
            Type::String => write!(f, "java.lang.String"),
            Type::Void => write!(f, "void"),
            Type::Null => write!(f, "null"),
            Type::Any => write!(f, "any"),
            Type::Class(name) => write!(f, "{}", name.replace('/', ".")),
            Type::Array(component) => write!(f, "{}[]", component),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptors() {
        assert_eq!(Type::Int.descriptor(), "I");
        assert_eq!(Type::String.array_of().descriptor(), "[Ljava/lang/String;");
        assert_eq!(Type::Double.with_dims(2).descriptor(), "[[D");
        assert_eq!(
            Type::method_descriptor(&[Type::Int, Type::Long], &Type::Void),
            "(IJ)V"
        );
    }

    #[test]
    fn string_class_is_normalized() {
        assert_eq!(Type::class("java/lang/String"), Type::String);
        assert_eq!(Type::class("java/lang/Object"), Type::object());
    }

    #[test]
    fn word_sizes() {
        assert_eq!(Type::Long.word_size(), 2);
        assert_eq!(Type::Double.word_size(), 2);
        assert_eq!(Type::Int.word_size(), 1);
        assert_eq!(Type::Void.word_size(), 0);
    }
}
