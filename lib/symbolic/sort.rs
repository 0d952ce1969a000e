//! Sorts of formulas, and the mapping from IL types to sorts.

use crate::il;
use crate::Error;
use crate::RC;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// An algebraic datatype with a single constructor, one per struct type.
///
/// The constructor is named `mk-<name>` and every accessor `<name>.<field>`.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct DatatypeSort {
    name: String,
    fields: Vec<(String, Sort)>,
}

impl DatatypeSort {
    pub fn new<S: Into<String>>(name: S, fields: Vec<(String, Sort)>) -> DatatypeSort {
        DatatypeSort {
            name: name.into(),
            fields,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[(String, Sort)] {
        &self.fields
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|(field, _)| field == name)
    }

    pub fn field_sort(&self, index: usize) -> Option<&Sort> {
        self.fields.get(index).map(|(_, sort)| sort)
    }

    pub fn constructor_name(&self) -> String {
        format!("mk-{}", self.name)
    }

    pub fn accessor_name(&self, index: usize) -> Option<String> {
        self.fields
            .get(index)
            .map(|(field, _)| format!("{}.{}", self.name, field))
    }
}

/// The sort of a formula.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Sort {
    Bool,
    BitVec(usize),
    /// Object identities. `0` is null.
    Int,
    Real,
    String,
    Datatype(RC<DatatypeSort>),
}

impl Sort {
    pub fn bits(&self) -> Option<usize> {
        match self {
            Sort::BitVec(bits) => Some(*bits),
            _ => None,
        }
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Sort::Bool)
    }

    pub fn is_bitvec(&self) -> bool {
        matches!(self, Sort::BitVec(_))
    }

    pub fn is_real(&self) -> bool {
        matches!(self, Sort::Real)
    }

    /// Int and Real, the sorts ordered with `<`.
    pub fn is_arith(&self) -> bool {
        matches!(self, Sort::Int | Sort::Real)
    }

    pub fn datatype(&self) -> Option<&RC<DatatypeSort>> {
        match self {
            Sort::Datatype(datatype) => Some(datatype),
            _ => None,
        }
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Sort::Bool => write!(f, "Bool"),
            Sort::BitVec(bits) => write!(f, "(_ BitVec {})", bits),
            Sort::Int => write!(f, "Int"),
            Sort::Real => write!(f, "Real"),
            Sort::String => write!(f, "String"),
            Sort::Datatype(datatype) => write!(f, "|{}|", datatype.name()),
        }
    }
}

/// Maps IL types to sorts.
///
/// Integral types are bitvectors of their width, floats are reals, strings
/// are strings, references are object identities, and structs are datatypes
/// over their instance fields. Struct sorts are built once, when the pool is
/// created.
#[derive(Clone, Debug, Default)]
pub struct SortPool {
    datatypes: BTreeMap<String, RC<DatatypeSort>>,
}

impl SortPool {
    pub fn new(program: &il::Program) -> Result<SortPool, Error> {
        let mut pool = SortPool::default();
        let structs: Vec<String> = program
            .types()
            .filter(|definition| definition.kind() == il::TypeKind::Struct)
            .map(|definition| definition.name().to_string())
            .collect();
        for name in structs {
            pool.build_datatype(program, &name, 0)?;
        }
        Ok(pool)
    }

    fn build_datatype(
        &mut self,
        program: &il::Program,
        name: &str,
        depth: usize,
    ) -> Result<RC<DatatypeSort>, Error> {
        if let Some(datatype) = self.datatypes.get(name) {
            return Ok(datatype.clone());
        }
        if depth > program.types().count() {
            return Err(Error::Unsupported(format!("recursive value type {}", name)));
        }

        let definition = program.require_type(name)?;
        let mut fields = Vec::new();
        for field in definition.instance_fields() {
            let sort = match &field.type_ {
                il::Type::Struct(inner) => {
                    Sort::Datatype(self.build_datatype(program, inner, depth + 1)?)
                }
                type_ => self.sort(type_)?,
            };
            fields.push((field.name.clone(), sort));
        }

        let datatype = RC::new(DatatypeSort::new(name, fields));
        self.datatypes.insert(name.to_string(), datatype.clone());
        Ok(datatype)
    }

    pub fn datatypes(&self) -> impl Iterator<Item = &RC<DatatypeSort>> {
        self.datatypes.values()
    }

    /// The sort values of `type_` take.
    pub fn sort(&self, type_: &il::Type) -> Result<Sort, Error> {
        Ok(match type_ {
            il::Type::Void => return Err(Error::Sort("void has no sort".to_string())),
            il::Type::Single | il::Type::Double => Sort::Real,
            il::Type::String => Sort::String,
            il::Type::Object(_) | il::Type::Array(_) => Sort::Int,
            il::Type::Struct(name) => match self.datatypes.get(name) {
                Some(datatype) => Sort::Datatype(datatype.clone()),
                None => return Err(Error::TypeNotFound(name.clone())),
            },
            type_ => match type_.bits() {
                Some(bits) => Sort::BitVec(bits),
                None => return Err(Error::Sort(format!("no sort for {}", type_))),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_sorts_nest() {
        let mut program = il::Program::new("Game");
        program.add_type(
            il::TypeDefinition::new("UnityEngine.Vector2", il::TypeKind::Struct)
                .with_field(il::FieldDefinition::new("x", il::Type::Single, false))
                .with_field(il::FieldDefinition::new("y", il::Type::Single, false))
                .with_field(il::FieldDefinition::new("zero", il::Type::structure("UnityEngine.Vector2"), true)),
        );
        program.add_type(
            il::TypeDefinition::new("Game.Box", il::TypeKind::Struct)
                .with_field(il::FieldDefinition::new("min", il::Type::structure("UnityEngine.Vector2"), false))
                .with_field(il::FieldDefinition::new("count", il::Type::Int32, false)),
        );

        let pool = SortPool::new(&program).unwrap();
        let sort = pool.sort(&il::Type::structure("Game.Box")).unwrap();
        let datatype = sort.datatype().unwrap();
        assert_eq!(datatype.fields().len(), 2);
        assert_eq!(datatype.field_index("count"), Some(1));
        assert_eq!(datatype.field_sort(1), Some(&Sort::BitVec(32)));
        assert_eq!(
            datatype.field_sort(0).unwrap().datatype().unwrap().fields().len(),
            2
        );
        assert_eq!(pool.sort(&il::Type::Boolean).unwrap(), Sort::BitVec(8));
        assert_eq!(pool.sort(&il::Type::object("Game.Player")).unwrap(), Sort::Int);
        assert!(pool.sort(&il::Type::Void).is_err());
    }
}
