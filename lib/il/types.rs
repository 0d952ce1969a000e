//! Value types of the IL.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The type of an IL value.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Type {
    Void,
    Boolean,
    Char,
    SByte,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Single,
    Double,
    String,
    /// A reference type, by full name.
    Object(String),
    /// A value type with fields, by full name.
    Struct(String),
    /// An enumeration, by full name. Enumerations are stored as `Int32`.
    Enum(String),
    Array(Box<Type>),
}

impl Type {
    pub fn object<S: Into<String>>(name: S) -> Type {
        Type::Object(name.into())
    }

    pub fn structure<S: Into<String>>(name: S) -> Type {
        Type::Struct(name.into())
    }

    pub fn enumeration<S: Into<String>>(name: S) -> Type {
        Type::Enum(name.into())
    }

    pub fn array(element: Type) -> Type {
        Type::Array(Box::new(element))
    }

    /// The full name of this type, as used in method signatures.
    pub fn full_name(&self) -> String {
        match self {
            Type::Void => "System.Void".to_string(),
            Type::Boolean => "System.Boolean".to_string(),
            Type::Char => "System.Char".to_string(),
            Type::SByte => "System.SByte".to_string(),
            Type::Byte => "System.Byte".to_string(),
            Type::Int16 => "System.Int16".to_string(),
            Type::UInt16 => "System.UInt16".to_string(),
            Type::Int32 => "System.Int32".to_string(),
            Type::UInt32 => "System.UInt32".to_string(),
            Type::Int64 => "System.Int64".to_string(),
            Type::UInt64 => "System.UInt64".to_string(),
            Type::Single => "System.Single".to_string(),
            Type::Double => "System.Double".to_string(),
            Type::String => "System.String".to_string(),
            Type::Object(name) | Type::Struct(name) | Type::Enum(name) => name.clone(),
            Type::Array(element) => format!("{}[]", element.full_name()),
        }
    }

    /// The width in bits of integral types, `None` for everything else.
    pub fn bits(&self) -> Option<usize> {
        match self {
            Type::Boolean | Type::SByte | Type::Byte => Some(8),
            Type::Char | Type::Int16 | Type::UInt16 => Some(16),
            Type::Int32 | Type::UInt32 | Type::Enum(_) => Some(32),
            Type::Int64 | Type::UInt64 => Some(64),
            _ => None,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            Type::SByte | Type::Int16 | Type::Int32 | Type::Int64 | Type::Enum(_)
        )
    }

    pub fn is_integral(&self) -> bool {
        self.bits().is_some()
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Single | Type::Double)
    }

    /// Reference types are represented by object identities.
    pub fn is_reference(&self) -> bool {
        matches!(self, Type::Object(_) | Type::Array(_))
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, Type::Struct(_))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let short = match self {
            Type::Void => "void",
            Type::Boolean => "bool",
            Type::Char => "char",
            Type::SByte => "i1",
            Type::Byte => "u1",
            Type::Int16 => "i2",
            Type::UInt16 => "u2",
            Type::Int32 => "i4",
            Type::UInt32 => "u4",
            Type::Int64 => "i8",
            Type::UInt64 => "u8",
            Type::Single => "f4",
            Type::Double => "f8",
            Type::String => "string",
            _ => return write!(f, "{}", self.full_name()),
        };
        write!(f, "{}", short)
    }
}
