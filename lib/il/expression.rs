use crate::il::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Binary numeric operators.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
}

/// Signedness of an integer operation. Floating point operations carry
/// `None`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Sign {
    None,
    Signed,
    Unsigned,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum ComparisonKind {
    Equality,
    Inequality,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl ComparisonKind {
    /// The comparison which holds exactly when this one does not.
    pub fn negate(&self) -> ComparisonKind {
        match self {
            ComparisonKind::Equality => ComparisonKind::Inequality,
            ComparisonKind::Inequality => ComparisonKind::Equality,
            ComparisonKind::LessThan => ComparisonKind::GreaterThanOrEqual,
            ComparisonKind::LessThanOrEqual => ComparisonKind::GreaterThan,
            ComparisonKind::GreaterThan => ComparisonKind::LessThanOrEqual,
            ComparisonKind::GreaterThanOrEqual => ComparisonKind::LessThan,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            ComparisonKind::Equality => "==",
            ComparisonKind::Inequality => "!=",
            ComparisonKind::LessThan => "<",
            ComparisonKind::LessThanOrEqual => "<=",
            ComparisonKind::GreaterThan => ">",
            ComparisonKind::GreaterThanOrEqual => ">=",
        }
    }
}

/// A call to a method. For instance methods, the first argument is the
/// receiver.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Call {
    method: MethodRef,
    arguments: Vec<Expression>,
}

impl Call {
    pub fn new(method: MethodRef, arguments: Vec<Expression>) -> Call {
        Call { method, arguments }
    }

    pub fn method(&self) -> &MethodRef {
        &self.method
    }

    pub fn arguments(&self) -> &[Expression] {
        &self.arguments
    }

    /// The name of the callee parameter bound by the argument at `index`.
    /// The receiver of an instance call binds `this`.
    pub fn parameter_name(&self, index: usize, callee: Option<&Method>) -> Option<String> {
        let formal = if self.method.is_static() {
            index
        } else if index == 0 {
            return Some("this".to_string());
        } else {
            index - 1
        };
        callee
            .and_then(|callee| callee.parameters().get(formal))
            .map(|parameter| parameter.name().to_string())
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}(", self.method.full_name())?;
        for (i, argument) in self.arguments.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", argument)?;
        }
        write!(f, ")")
    }
}

/// A value computing IL expression.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Expression {
    LdLoc(Variable),
    LdLoca(Variable),
    LdcI4(i32),
    LdcI8(i64),
    LdcF4(Float),
    LdcF8(Float),
    LdStr(String),
    LdNull,
    Binary {
        op: BinaryOp,
        sign: Sign,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Comp {
        kind: ComparisonKind,
        sign: Sign,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    LogicNot(Box<Expression>),
    Conv {
        input: Box<Expression>,
        target: Type,
    },
    Call(Call),
    NewObj(Call),
    LdFld {
        target: Box<Expression>,
        field: FieldRef,
    },
    LdsFld(FieldRef),
    LdLen(Box<Expression>),
}

impl Expression {
    /// The immediate child expressions, in evaluation order.
    pub fn children(&self) -> Vec<&Expression> {
        match self {
            Expression::LdLoc(_)
            | Expression::LdLoca(_)
            | Expression::LdcI4(_)
            | Expression::LdcI8(_)
            | Expression::LdcF4(_)
            | Expression::LdcF8(_)
            | Expression::LdStr(_)
            | Expression::LdNull
            | Expression::LdsFld(_) => Vec::new(),
            Expression::Binary { lhs, rhs, .. } | Expression::Comp { lhs, rhs, .. } => {
                vec![lhs, rhs]
            }
            Expression::LogicNot(expr) | Expression::LdLen(expr) => vec![expr],
            Expression::Conv { input, .. } => vec![input],
            Expression::Call(call) | Expression::NewObj(call) => call.arguments().iter().collect(),
            Expression::LdFld { target, .. } => vec![target],
        }
    }

    /// The type of the value this expression computes.
    pub fn result_type(&self) -> Type {
        match self {
            Expression::LdLoc(variable) => variable.type_().clone(),
            Expression::LdLoca(variable) => variable.type_().clone(),
            Expression::LdcI4(_) => Type::Int32,
            Expression::LdcI8(_) => Type::Int64,
            Expression::LdcF4(_) => Type::Single,
            Expression::LdcF8(_) => Type::Double,
            Expression::LdStr(_) => Type::String,
            Expression::LdNull => Type::object("System.Object"),
            Expression::Binary { lhs, .. } => lhs.result_type(),
            Expression::Comp { .. } | Expression::LogicNot(_) => Type::Boolean,
            Expression::Conv { target, .. } => target.clone(),
            Expression::Call(call) => call.method().return_type().clone(),
            Expression::NewObj(call) => call.method().declaring_type_as_type(),
            Expression::LdFld { field, .. } | Expression::LdsFld(field) => field.type_().clone(),
            Expression::LdLen(_) => Type::Int32,
        }
    }

    /// Every call in this expression, in post-order. Arguments are visited
    /// before the call consuming them, which is the order calls execute in.
    pub fn calls(&self) -> Vec<&Call> {
        let mut calls = Vec::new();
        self.collect_calls(&mut calls);
        calls
    }

    fn collect_calls<'e>(&'e self, calls: &mut Vec<&'e Call>) {
        for child in self.children() {
            child.collect_calls(calls);
        }
        match self {
            Expression::Call(call) | Expression::NewObj(call) => calls.push(call),
            _ => {}
        }
    }

    /// The first call found in a pre-order walk of this expression.
    pub fn find_call(&self) -> Option<&Call> {
        match self {
            Expression::Call(call) | Expression::NewObj(call) => Some(call),
            _ => self.children().into_iter().find_map(|child| child.find_call()),
        }
    }

    /// Names of every variable loaded, or whose address is taken.
    pub fn variables(&self) -> BTreeSet<&str> {
        let mut variables = BTreeSet::new();
        self.walk(&mut |expr| match expr {
            Expression::LdLoc(variable) | Expression::LdLoca(variable) => {
                variables.insert(variable.name());
            }
            _ => {}
        });
        variables
    }

    pub fn contains_variable_in(&self, names: &BTreeSet<String>) -> bool {
        self.any(&|expr| match expr {
            Expression::LdLoc(variable) | Expression::LdLoca(variable) => {
                names.contains(variable.name())
            }
            _ => false,
        })
    }

    pub fn contains_field_in(&self, signatures: &BTreeSet<String>) -> bool {
        self.any(&|expr| match expr {
            Expression::LdFld { field, .. } | Expression::LdsFld(field) => {
                signatures.contains(&field.signature())
            }
            _ => false,
        })
    }

    pub fn contains_method_in(&self, signatures: &BTreeSet<String>) -> bool {
        self.any(&|expr| match expr {
            Expression::Call(call) | Expression::NewObj(call) => {
                signatures.contains(&call.method().signature())
            }
            _ => false,
        })
    }

    pub fn contains_any_field(&self) -> bool {
        self.any(&|expr| matches!(expr, Expression::LdFld { .. } | Expression::LdsFld(_)))
    }

    /// True if any sub-expression, including this one, satisfies `predicate`.
    pub fn any<F>(&self, predicate: &F) -> bool
    where
        F: Fn(&Expression) -> bool,
    {
        predicate(self) || self.children().into_iter().any(|child| child.any(predicate))
    }

    /// Visit this expression and every sub-expression in pre-order.
    pub fn walk<'e, F>(&'e self, visitor: &mut F)
    where
        F: FnMut(&'e Expression),
    {
        visitor(self);
        for child in self.children() {
            child.walk(visitor);
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expression::LdLoc(variable) => write!(f, "ldloc {}", variable),
            Expression::LdLoca(variable) => write!(f, "ldloca {}", variable),
            Expression::LdcI4(value) => write!(f, "ldc.i4 {}", value),
            Expression::LdcI8(value) => write!(f, "ldc.i8 {}", value),
            Expression::LdcF4(value) => write!(f, "ldc.f4 {}", value),
            Expression::LdcF8(value) => write!(f, "ldc.f8 {}", value),
            Expression::LdStr(value) => write!(f, "ldstr {:?}", value),
            Expression::LdNull => write!(f, "ldnull"),
            Expression::Binary { op, sign, lhs, rhs } => {
                let op = match op {
                    BinaryOp::Add => "add",
                    BinaryOp::Sub => "sub",
                    BinaryOp::Mul => "mul",
                    BinaryOp::Div => "div",
                    BinaryOp::Rem => "rem",
                    BinaryOp::BitAnd => "bit.and",
                    BinaryOp::BitOr => "bit.or",
                    BinaryOp::BitXor => "bit.xor",
                    BinaryOp::ShiftLeft => "bit.shl",
                    BinaryOp::ShiftRight => "bit.shr",
                };
                let sign = match sign {
                    Sign::None => "",
                    Sign::Signed => ".signed",
                    Sign::Unsigned => ".unsigned",
                };
                write!(f, "{}.{}{}({}, {})", op, lhs.result_type(), sign, lhs, rhs)
            }
            Expression::Comp {
                kind,
                sign,
                lhs,
                rhs,
            } => {
                let sign = match sign {
                    Sign::Unsigned => ".unsigned",
                    _ => "",
                };
                write!(
                    f,
                    "comp.{}{}({} {} {})",
                    lhs.result_type(),
                    sign,
                    lhs,
                    kind.symbol(),
                    rhs
                )
            }
            Expression::LogicNot(expr) => write!(f, "logic.not({})", expr),
            Expression::Conv { input, target } => {
                write!(f, "conv {}->{}({})", input.result_type(), target, input)
            }
            Expression::Call(call) => write!(f, "call {}", call),
            Expression::NewObj(call) => write!(f, "newobj {}", call),
            Expression::LdFld { target, field } => write!(f, "ldfld {}({})", field, target),
            Expression::LdsFld(field) => write!(f, "ldsfld {}", field),
            Expression::LdLen(expr) => write!(f, "ldlen({})", expr),
        }
    }
}
