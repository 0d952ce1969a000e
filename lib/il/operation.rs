use crate::il::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One case of a `Switch`.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct SwitchCase {
    pub values: Vec<i64>,
    pub target: usize,
}

/// A statement in a block.
///
/// This is the closed set of statement shapes the analyses and the symbolic
/// executor understand. Branch targets are block indices within the method
/// body.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Operation {
    Nop,
    StLoc {
        variable: Variable,
        value: Expression,
    },
    StFld {
        target: Expression,
        field: FieldRef,
        value: Expression,
    },
    StsFld {
        field: FieldRef,
        value: Expression,
    },
    Call(Call),
    /// Branch to `target` when `condition` holds, otherwise fall through.
    If {
        condition: Expression,
        target: usize,
    },
    Branch {
        target: usize,
    },
    Switch {
        value: Expression,
        cases: Vec<SwitchCase>,
        default: usize,
    },
    /// Return from the method, with a value for non-void methods.
    Leave {
        value: Option<Expression>,
    },
    Throw {
        value: Expression,
    },
    /// Ends a finally handler.
    EndFinally,
}

impl Operation {
    pub fn stloc(variable: &Variable, value: Expression) -> Operation {
        Operation::StLoc {
            variable: variable.clone(),
            value,
        }
    }

    pub fn stfld(target: Expression, field: FieldRef, value: Expression) -> Operation {
        Operation::StFld {
            target,
            field,
            value,
        }
    }

    pub fn stsfld(field: FieldRef, value: Expression) -> Operation {
        Operation::StsFld { field, value }
    }

    pub fn call(method: MethodRef, arguments: Vec<Expression>) -> Operation {
        Operation::Call(Call::new(method, arguments))
    }

    pub fn if_(condition: Expression, target: usize) -> Operation {
        Operation::If { condition, target }
    }

    pub fn branch(target: usize) -> Operation {
        Operation::Branch { target }
    }

    pub fn leave(value: Option<Expression>) -> Operation {
        Operation::Leave { value }
    }

    pub fn ret() -> Operation {
        Operation::Leave { value: None }
    }

    pub fn throw(value: Expression) -> Operation {
        Operation::Throw { value }
    }

    /// The expressions this operation evaluates, in evaluation order.
    pub fn expressions(&self) -> Vec<&Expression> {
        match self {
            Operation::Nop | Operation::Branch { .. } | Operation::EndFinally => Vec::new(),
            Operation::StLoc { value, .. } | Operation::StsFld { value, .. } => vec![value],
            Operation::StFld { target, value, .. } => vec![target, value],
            Operation::Call(call) => call.arguments().iter().collect(),
            Operation::If { condition, .. } => vec![condition],
            Operation::Switch { value, .. } => vec![value],
            Operation::Leave { value } => value.iter().collect(),
            Operation::Throw { value } => vec![value],
        }
    }

    /// Every call made by this operation, in execution order.
    pub fn calls(&self) -> Vec<&Call> {
        let mut calls: Vec<&Call> = self
            .expressions()
            .into_iter()
            .flat_map(|expr| expr.calls())
            .collect();
        if let Operation::Call(call) = self {
            calls.push(call);
        }
        calls
    }

    /// True if any expression of this operation satisfies `predicate`.
    pub fn any_expression<F>(&self, predicate: &F) -> bool
    where
        F: Fn(&Expression) -> bool,
    {
        self.expressions()
            .into_iter()
            .any(|expr| expr.any(predicate))
    }

    /// Transfers control out of the method.
    pub fn is_unwind(&self) -> bool {
        matches!(self, Operation::Leave { .. } | Operation::Throw { .. })
    }

    /// Never falls through to the next instruction.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Operation::Branch { .. }
                | Operation::Switch { .. }
                | Operation::Leave { .. }
                | Operation::Throw { .. }
                | Operation::EndFinally
        )
    }

    pub fn is_branch(&self) -> bool {
        matches!(self, Operation::Branch { .. })
    }

    /// Block indices this operation may transfer control to.
    pub fn branch_targets(&self) -> Vec<usize> {
        match self {
            Operation::If { target, .. } | Operation::Branch { target } => vec![*target],
            Operation::Switch { cases, default, .. } => {
                let mut targets: Vec<usize> = cases.iter().map(|case| case.target).collect();
                targets.push(*default);
                targets
            }
            _ => Vec::new(),
        }
    }

    /// Rewrite every branch target through `f`.
    pub fn map_targets<F>(&mut self, f: F)
    where
        F: Fn(usize) -> usize,
    {
        match self {
            Operation::If { target, .. } | Operation::Branch { target } => *target = f(*target),
            Operation::Switch { cases, default, .. } => {
                for case in cases.iter_mut() {
                    case.target = f(case.target);
                }
                *default = f(*default);
            }
            _ => {}
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operation::Nop => write!(f, "nop"),
            Operation::StLoc { variable, value } => write!(f, "stloc {}({})", variable, value),
            Operation::StFld {
                target,
                field,
                value,
            } => write!(f, "stfld {}({}, {})", field, target, value),
            Operation::StsFld { field, value } => write!(f, "stsfld {}({})", field, value),
            Operation::Call(call) => write!(f, "call {}", call),
            Operation::If { condition, target } => write!(f, "if ({}) br B{}", condition, target),
            Operation::Branch { target } => write!(f, "br B{}", target),
            Operation::Switch {
                value,
                cases,
                default,
            } => {
                write!(f, "switch ({}) {{", value)?;
                for case in cases {
                    let values = case
                        .values
                        .iter()
                        .map(|v| v.to_string())
                        .collect::<Vec<String>>();
                    write!(f, " case {}: br B{};", values.join(","), case.target)?;
                }
                write!(f, " default: br B{} }}", default)
            }
            Operation::Leave { value: Some(value) } => write!(f, "leave({})", value),
            Operation::Leave { value: None } => write!(f, "leave"),
            Operation::Throw { value } => write!(f, "throw({})", value),
            Operation::EndFinally => write!(f, "endfinally"),
        }
    }
}
