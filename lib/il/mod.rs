//! Structured method IL.
//!
//! The IL is what a decompiler produces from method bytecode: blocks of
//! statements (`Operation`) over expression trees (`Expression`). Inputpath
//! does not load bytecode itself. An IL provider fills in a `Program`, and
//! every analysis reads it.
//!
//! # Components
//!
//! * `Type`, `Variable`, `FieldRef`, `MethodRef`: the terminals.
//! * `Expression`: loads, constants, arithmetic, comparisons, conversions,
//! calls and field reads. Expressions are pure apart from the calls they
//! contain.
//! * `Operation`: stores, calls, conditional and unconditional branches,
//! switches, returns (`Leave`) and throws.
//! * `Instruction`: an `Operation` plus the bytecode offsets it was decompiled
//! from. Instructions without offsets are synthetic.
//! * `Block`, `Body`, `Method`: the containers. Branch targets are block
//! indices.
//! * `Program`: every method by signature, and the type definitions.
//!
//! Locations are index based (`InstructionLocation`), so nothing in the IL
//! points back to its parent.
//!
//! The functions in this module build expressions with little ceremony.
//!
//! ```
//! # use inputpath::il;
//! let x = il::Variable::local("x", il::Type::Int32);
//! let expr = il::add(il::ldloc(&x), il::ldc_i4(1));
//! assert_eq!(expr.to_string(), "add.i4(ldloc x, ldc.i4 1)");
//! ```

mod block;
mod constant;
mod expression;
mod field;
mod instruction;
mod location;
mod method;
mod operation;
mod program;
mod types;
mod variable;

pub use self::block::*;
pub use self::constant::*;
pub use self::expression::*;
pub use self::field::*;
pub use self::instruction::*;
pub use self::location::*;
pub use self::method::*;
pub use self::operation::*;
pub use self::program::*;
pub use self::types::*;
pub use self::variable::*;

pub fn ldloc(variable: &Variable) -> Expression {
    Expression::LdLoc(variable.clone())
}

pub fn ldloca(variable: &Variable) -> Expression {
    Expression::LdLoca(variable.clone())
}

pub fn ldc_i4(value: i32) -> Expression {
    Expression::LdcI4(value)
}

pub fn ldc_i8(value: i64) -> Expression {
    Expression::LdcI8(value)
}

pub fn ldc_f4(value: f32) -> Expression {
    Expression::LdcF4(Float::from(value))
}

pub fn ldc_f8(value: f64) -> Expression {
    Expression::LdcF8(Float::from(value))
}

pub fn ldstr<S: Into<String>>(value: S) -> Expression {
    Expression::LdStr(value.into())
}

pub fn ldnull() -> Expression {
    Expression::LdNull
}

pub fn binary(op: BinaryOp, sign: Sign, lhs: Expression, rhs: Expression) -> Expression {
    Expression::Binary {
        op,
        sign,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

pub fn add(lhs: Expression, rhs: Expression) -> Expression {
    binary(BinaryOp::Add, Sign::None, lhs, rhs)
}

pub fn sub(lhs: Expression, rhs: Expression) -> Expression {
    binary(BinaryOp::Sub, Sign::None, lhs, rhs)
}

pub fn mul(lhs: Expression, rhs: Expression) -> Expression {
    binary(BinaryOp::Mul, Sign::None, lhs, rhs)
}

/// A comparison. Integer operands compare signed.
pub fn comp(kind: ComparisonKind, lhs: Expression, rhs: Expression) -> Expression {
    let sign = if lhs.result_type().is_float() {
        Sign::None
    } else {
        Sign::Signed
    };
    Expression::Comp {
        kind,
        sign,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

pub fn comp_unsigned(kind: ComparisonKind, lhs: Expression, rhs: Expression) -> Expression {
    Expression::Comp {
        kind,
        sign: Sign::Unsigned,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

pub fn not(expr: Expression) -> Expression {
    Expression::LogicNot(Box::new(expr))
}

pub fn conv(input: Expression, target: Type) -> Expression {
    Expression::Conv {
        input: Box::new(input),
        target,
    }
}

pub fn call(method: MethodRef, arguments: Vec<Expression>) -> Expression {
    Expression::Call(Call::new(method, arguments))
}

pub fn newobj(constructor: MethodRef, arguments: Vec<Expression>) -> Expression {
    Expression::NewObj(Call::new(constructor, arguments))
}

pub fn ldfld(target: Expression, field: FieldRef) -> Expression {
    Expression::LdFld {
        target: Box::new(target),
        field,
    }
}

pub fn ldsfld(field: FieldRef) -> Expression {
    Expression::LdsFld(field)
}

pub fn ldlen(array: Expression) -> Expression {
    Expression::LdLen(Box::new(array))
}
