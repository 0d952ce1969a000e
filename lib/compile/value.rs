//! Runtime values a compiled precondition reads from the live game.

use crate::symbolic::{to_signed, Expr, Sort};
use crate::Error;
use std::collections::BTreeMap;
use std::fmt;

/// A reference type instance. `id` is its identity, never zero.
#[derive(Clone, Debug, PartialEq)]
pub struct Object {
    pub id: u64,
    pub type_name: String,
    pub fields: BTreeMap<String, Value>,
}

impl Object {
    pub fn new<S: Into<String>>(id: u64, type_name: S) -> Object {
        Object {
            id,
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field<S: Into<String>>(mut self, name: S, value: Value) -> Object {
        self.fields.insert(name.into(), value);
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    /// Any integral value, enums included.
    Integer(i64),
    Float(f64),
    Str(String),
    Object(Object),
    Struct(BTreeMap<String, Value>),
    Array(Vec<Value>),
}

impl Value {
    pub fn object(object: Object) -> Value {
        Value::Object(object)
    }

    /// The value of field `name`.
    pub fn field(&self, name: &str) -> Result<Value, Error> {
        let fields = match self {
            Value::Object(object) => &object.fields,
            Value::Struct(fields) => fields,
            Value::Null => {
                return Err(Error::Resolution(format!(
                    "null dereference reading field {}",
                    name
                )))
            }
            value => {
                return Err(Error::Resolution(format!(
                    "{} has no field {}",
                    value, name
                )))
            }
        };
        fields
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Resolution(format!("no field {}", name)))
    }

    pub fn length(&self) -> Result<Value, Error> {
        match self {
            Value::Array(elements) => Ok(Value::Integer(elements.len() as i64)),
            Value::Null => Err(Error::Resolution("null dereference reading length".to_string())),
            value => Err(Error::Resolution(format!("{} is not an array", value))),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            Value::Integer(value) => Some(*value != 0),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(value) => Some(*value as i64),
            Value::Integer(value) => Some(*value),
            Value::Float(value) => Some(value.trunc() as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(value) => Some(*value as f64),
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }

    /// This value as a constant formula of `sort`.
    pub fn to_expr(&self, sort: &Sort) -> Result<Expr, Error> {
        let mismatch = || Error::Resolution(format!("{} is not a value of sort {}", self, sort));
        Ok(match sort {
            Sort::Bool => Expr::bool(self.as_bool().ok_or_else(mismatch)?),
            Sort::BitVec(bits) => Expr::bitvec(self.as_i64().ok_or_else(mismatch)? as u64, *bits),
            Sort::Real => Expr::real(self.as_f64().ok_or_else(mismatch)?),
            Sort::Int => match self {
                Value::Null => Expr::int(0),
                Value::Object(object) => Expr::int(object.id as i64),
                _ => return Err(mismatch()),
            },
            Sort::String => Expr::string(self.as_str().ok_or_else(mismatch)?),
            Sort::Datatype(datatype) => {
                let mut fields = Vec::new();
                for (name, sort) in datatype.fields() {
                    fields.push(self.field(name)?.to_expr(sort)?);
                }
                Expr::construct(datatype.clone(), fields)?
            }
        })
    }

    /// The runtime value of a constant formula.
    pub fn from_expr(expr: &Expr) -> Result<Value, Error> {
        Ok(match expr {
            Expr::Bool(value) => Value::Bool(*value),
            Expr::BitVec { value, bits } => Value::Integer(to_signed(*value, *bits)),
            Expr::Int(0) => Value::Null,
            Expr::Int(value) => Value::Integer(*value),
            Expr::Real(value) => Value::Float(value.value()),
            Expr::Str(value) => Value::Str(value.clone()),
            Expr::Construct(datatype, fields) => {
                let mut values = BTreeMap::new();
                for ((name, _), field) in datatype.fields().iter().zip(fields) {
                    values.insert(name.clone(), Value::from_expr(field)?);
                }
                Value::Struct(values)
            }
            expr => {
                return Err(Error::Resolution(format!(
                    "{} is not a constant",
                    expr
                )))
            }
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(value) => write!(f, "{}", value),
            Value::Integer(value) => write!(f, "{}", value),
            Value::Float(value) => write!(f, "{}", value),
            Value::Str(value) => write!(f, "{:?}", value),
            Value::Object(object) => write!(f, "{}#{}", object.type_name, object.id),
            Value::Struct(fields) => {
                let fields = fields
                    .iter()
                    .map(|(name, value)| format!("{} = {}", name, value))
                    .collect::<Vec<String>>();
                write!(f, "{{ {} }}", fields.join(", "))
            }
            Value::Array(elements) => write!(f, "[{} elements]", elements.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::DatatypeSort;
    use crate::RC;

    #[test]
    fn fields_and_nulls() {
        let player = Value::object(
            Object::new(3, "Game.Player")
                .with_field("health", Value::Integer(10))
                .with_field("target", Value::Null),
        );
        assert_eq!(player.field("health").unwrap(), Value::Integer(10));
        let target = player.field("target").unwrap();
        assert!(matches!(target.field("health"), Err(Error::Resolution(_))));
        assert!(matches!(player.field("speed"), Err(Error::Resolution(_))));
        assert_eq!(player.to_expr(&Sort::Int).unwrap(), Expr::int(3));
    }

    #[test]
    fn formulas_and_values() {
        assert_eq!(
            Value::Integer(-1).to_expr(&Sort::BitVec(8)).unwrap(),
            Expr::bitvec(0xff, 8)
        );
        assert_eq!(
            Value::from_expr(&Expr::bitvec(0xff, 8)).unwrap(),
            Value::Integer(-1)
        );
        assert_eq!(Value::Bool(true).to_expr(&Sort::BitVec(8)).unwrap(), Expr::bitvec(1, 8));

        let vector = RC::new(DatatypeSort::new(
            "UnityEngine.Vector2",
            vec![("x".to_string(), Sort::Real), ("y".to_string(), Sort::Real)],
        ));
        let mut fields = BTreeMap::new();
        fields.insert("x".to_string(), Value::Float(0.5));
        fields.insert("y".to_string(), Value::Integer(2));
        let value = Value::Struct(fields);
        let expr = value.to_expr(&Sort::Datatype(vector)).unwrap();
        let mut expected = BTreeMap::new();
        expected.insert("x".to_string(), Value::Float(0.5));
        expected.insert("y".to_string(), Value::Float(2.0));
        assert_eq!(Value::from_expr(&expr).unwrap(), Value::Struct(expected));
        assert!(Value::Str("a".to_string()).to_expr(&Sort::Real).is_err());
    }
}
