use crate::il::Type;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a variable lives in a method frame.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum VariableKind {
    Local,
    /// A formal parameter, indexed from 0 without counting `this`.
    Parameter(usize),
    This,
    StackSlot,
}

/// A named IL variable.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Variable {
    name: String,
    kind: VariableKind,
    type_: Type,
}

impl Variable {
    pub fn new<S: Into<String>>(name: S, kind: VariableKind, type_: Type) -> Variable {
        Variable {
            name: name.into(),
            kind,
            type_,
        }
    }

    pub fn local<S: Into<String>>(name: S, type_: Type) -> Variable {
        Variable::new(name, VariableKind::Local, type_)
    }

    pub fn parameter<S: Into<String>>(name: S, index: usize, type_: Type) -> Variable {
        Variable::new(name, VariableKind::Parameter(index), type_)
    }

    pub fn this(type_: Type) -> Variable {
        Variable::new("this", VariableKind::This, type_)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> VariableKind {
        self.kind
    }

    pub fn type_(&self) -> &Type {
        &self.type_
    }

    pub fn is_parameter(&self) -> bool {
        matches!(self.kind, VariableKind::Parameter(_) | VariableKind::This)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
