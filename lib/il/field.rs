use crate::il::Type;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A reference to a field.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct FieldRef {
    declaring_type: String,
    name: String,
    type_: Type,
    is_static: bool,
}

impl FieldRef {
    pub fn new<S: Into<String>, T: Into<String>>(
        declaring_type: S,
        name: T,
        type_: Type,
        is_static: bool,
    ) -> FieldRef {
        FieldRef {
            declaring_type: declaring_type.into(),
            name: name.into(),
            type_,
            is_static,
        }
    }

    pub fn instance<S: Into<String>, T: Into<String>>(
        declaring_type: S,
        name: T,
        type_: Type,
    ) -> FieldRef {
        FieldRef::new(declaring_type, name, type_, false)
    }

    pub fn static_<S: Into<String>, T: Into<String>>(
        declaring_type: S,
        name: T,
        type_: Type,
    ) -> FieldRef {
        FieldRef::new(declaring_type, name, type_, true)
    }

    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_(&self) -> &Type {
        &self.type_
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// `DeclaringType.Name`, the key taint sets and accessor registries use.
    pub fn signature(&self) -> String {
        format!("{}.{}", self.declaring_type, self.name)
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.signature())
    }
}
