//! Resolved types of the Cube language.

use std::fmt;

/// A fully resolved type, as produced by the type checker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    I8,
    I16,
    I32,
    I64,
    Char,
    /// Untyped 8-byte value, used for `any*` parameters.
    Any,
    Pointer(Box<Type>),
    Array(Box<Type>, u32),
    Struct(String),
    /// The result type of procedures without a return value.
    None,
}

impl Type {
    pub fn pointer_to(inner: Type) -> Self {
        Type::Pointer(Box::new(inner))
    }

    pub fn array_of(element: Type, count: u32) -> Self {
        Type::Array(Box::new(element), count)
    }

    /// Byte width of a scalar type, `None` for aggregates and `None`.
    pub fn scalar_width(&self) -> Option<u8> {
        match self {
            Type::I8 | Type::Char => Some(1),
            Type::I16 => Some(2),
            Type::I32 => Some(4),
            Type::I64 | Type::Any | Type::Pointer(_) => Some(8),
            Type::Array(..) | Type::Struct(_) | Type::None => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        self.scalar_width().is_some()
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, Type::Struct(_))
    }

    /// Type a pointer points to.
    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Pointer(inner) => Some(inner),
            _ => None,
        }
    }

    /// Element type of an array or pointer, the result type of indexing.
    pub fn element(&self) -> Option<&Type> {
        match self {
            Type::Array(inner, _) | Type::Pointer(inner) => Some(inner),
            _ => None,
        }
    }

    /// Integer type with the given byte width.
    pub fn int_of_width(width: u32) -> Option<Type> {
        match width {
            1 => Some(Type::I8),
            2 => Some(Type::I16),
            4 => Some(Type::I32),
            8 => Some(Type::I64),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::I8 => write!(f, "i8"),
            Type::I16 => write!(f, "i16"),
            Type::I32 => write!(f, "i32"),
            Type::I64 => write!(f, "i64"),
            Type::Char => write!(f, "char"),
            Type::Any => write!(f, "any"),
            Type::Pointer(inner) => write!(f, "{}*", inner),
            Type::Array(inner, count) => write!(f, "{}[{}]", inner, count),
            Type::Struct(name) => write!(f, "{}", name),
            Type::None => write!(f, "None"),
        }
    }
}
