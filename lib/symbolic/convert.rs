//! Numeric conversions between formula sorts.
//!
//! Integral values are bitvectors whose signedness lives in the IL type,
//! not in the formula, so every conversion takes the source type along.

use crate::il;
use crate::symbolic::{ArithCmp, ArithOp, BvCmp, Expr, Sort, SortPool};
use crate::Error;

/// `value` as a boolean formula. Integers are true when non-zero, and
/// references when non-null.
pub fn to_bool(value: Expr) -> Result<Expr, Error> {
    match value.sort() {
        Sort::Bool => Ok(value),
        Sort::BitVec(bits) => Expr::ne(value, Expr::bitvec(0, bits)),
        Sort::Int => Expr::ne(value, Expr::int(0)),
        sort => Err(Error::Unsupported(format!("{} used as a condition", sort))),
    }
}

/// Widen or narrow a bitvector to `bits`.
pub fn resize(value: Expr, bits: usize, signed: bool) -> Result<Expr, Error> {
    let width = match value.sort() {
        Sort::BitVec(width) => width,
        sort => return Err(Error::Sort(format!("cannot resize {}", sort))),
    };
    if width == bits {
        Ok(value)
    } else if width < bits {
        if signed {
            Expr::sign_extend(bits - width, value)
        } else {
            Expr::zero_extend(bits - width, value)
        }
    } else {
        Expr::extract(bits - 1, 0, value)
    }
}

/// The real number a bitvector stands for.
pub fn bitvec_to_real(value: Expr, signed: bool) -> Result<Expr, Error> {
    let bits = match value.sort() {
        Sort::BitVec(bits) => bits,
        sort => return Err(Error::Sort(format!("{} is not a bitvector", sort))),
    };
    let unsigned = Expr::to_real(Expr::bv2nat(value.clone())?)?;
    if !signed {
        return Ok(unsigned);
    }
    let negative = Expr::bv_cmp(BvCmp::Slt, value, Expr::bitvec(0, bits))?;
    let modulus = Expr::real(2f64.powi(bits as i32));
    let wrapped = Expr::arith(ArithOp::Sub, unsigned.clone(), modulus)?;
    Expr::ite(negative, wrapped, unsigned)
}

/// A real truncated towards zero, as a bitvector of `bits`.
pub fn real_to_bitvec(value: Expr, bits: usize) -> Result<Expr, Error> {
    let non_negative = Expr::arith_cmp(ArithCmp::Ge, value.clone(), Expr::real(0.0))?;
    let down = Expr::to_int(value.clone())?;
    let up = Expr::neg(Expr::to_int(Expr::neg(value)?)?)?;
    Expr::nat2bv(bits, Expr::ite(non_negative, down, up)?)
}

/// Convert `value`, computed with IL type `from`, to IL type `to`.
pub fn convert(value: Expr, from: &il::Type, to: &il::Type, sorts: &SortPool) -> Result<Expr, Error> {
    let target = sorts.sort(to)?;
    let signed = from.is_signed();
    match (value.sort(), &target) {
        (source, target) if source == *target => Ok(value),
        (Sort::Bool, Sort::BitVec(bits)) => {
            Expr::ite(value, Expr::bitvec(1, *bits), Expr::bitvec(0, *bits))
        }
        (Sort::Bool, Sort::Real) => Expr::ite(value, Expr::real(1.0), Expr::real(0.0)),
        (Sort::BitVec(_), Sort::BitVec(bits)) => resize(value, *bits, signed),
        (Sort::BitVec(_), Sort::Real) => bitvec_to_real(value, signed),
        (Sort::Real, Sort::BitVec(bits)) => real_to_bitvec(value, *bits),
        (source, target) => Err(Error::Unsupported(format!(
            "conversion from {} ({}) to {} ({})",
            from, source, to, target
        ))),
    }
}

/// Fit `value`, computed with IL type `from`, into a slot of IL type
/// `type_`. This is the implicit conversion of a store, an argument or a
/// return.
pub fn coerce(
    value: Expr,
    from: &il::Type,
    type_: &il::Type,
    sorts: &SortPool,
) -> Result<Expr, Error> {
    let target = sorts.sort(type_)?;
    let signed = from.is_signed();
    match (value.sort(), &target) {
        (source, target) if source == *target => Ok(value),
        (Sort::Bool, Sort::BitVec(bits)) => {
            Expr::ite(value, Expr::bitvec(1, *bits), Expr::bitvec(0, *bits))
        }
        (Sort::BitVec(_), Sort::BitVec(bits)) => resize(value, *bits, signed),
        (Sort::BitVec(_), Sort::Real) => bitvec_to_real(value, signed),
        (source, target) => Err(Error::Unsupported(format!(
            "{} value stored as {} ({})",
            source, type_, target
        ))),
    }
}

/// Bring two operands to a common sort. Booleans become bitvectors, and
/// the narrower bitvector is widened.
pub fn unify(lhs: Expr, rhs: Expr, signed: bool) -> Result<(Expr, Expr), Error> {
    let as_bitvec = |value: Expr, bits: usize| -> Result<Expr, Error> {
        match value.sort() {
            Sort::Bool => Expr::ite(value, Expr::bitvec(1, bits), Expr::bitvec(0, bits)),
            _ => Ok(value),
        }
    };
    match (lhs.sort(), rhs.sort()) {
        (Sort::Bool, Sort::BitVec(bits)) => Ok((as_bitvec(lhs, bits)?, rhs)),
        (Sort::BitVec(bits), Sort::Bool) => Ok((lhs, as_bitvec(rhs, bits)?)),
        (Sort::BitVec(lbits), Sort::BitVec(rbits)) if lbits < rbits => {
            Ok((resize(lhs, rbits, signed)?, rhs))
        }
        (Sort::BitVec(lbits), Sort::BitVec(rbits)) if lbits > rbits => {
            Ok((lhs, resize(rhs, lbits, signed)?))
        }
        (Sort::BitVec(_), Sort::Real) => Ok((bitvec_to_real(lhs, signed)?, rhs)),
        (Sort::Real, Sort::BitVec(_)) => Ok((lhs, bitvec_to_real(rhs, signed)?)),
        _ => Ok((lhs, rhs)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(expr: &Expr) -> Expr {
        expr.eval(&|_: &str| None).unwrap()
    }

    #[test]
    fn integer_conversions() {
        let sorts = SortPool::default();
        let minus_two = Expr::bitvec((-2i64) as u64, 8);

        let widened = convert(minus_two.clone(), &il::Type::SByte, &il::Type::Int32, &sorts).unwrap();
        assert_eq!(eval(&widened), Expr::bitvec((-2i64) as u64, 32));
        let widened = convert(minus_two.clone(), &il::Type::Byte, &il::Type::Int32, &sorts).unwrap();
        assert_eq!(eval(&widened), Expr::bitvec(254, 32));

        let narrowed = convert(Expr::bitvec(0x1ff, 32), &il::Type::Int32, &il::Type::Byte, &sorts).unwrap();
        assert_eq!(eval(&narrowed), Expr::bitvec(0xff, 8));

        let real = convert(minus_two, &il::Type::SByte, &il::Type::Single, &sorts).unwrap();
        assert_eq!(eval(&real), Expr::real(-2.0));
    }

    #[test]
    fn reals_truncate_towards_zero() {
        let sorts = SortPool::default();
        let down = convert(Expr::real(2.75), &il::Type::Single, &il::Type::Int32, &sorts).unwrap();
        assert_eq!(eval(&down), Expr::bitvec(2, 32));
        let up = convert(Expr::real(-2.75), &il::Type::Single, &il::Type::Int32, &sorts).unwrap();
        assert_eq!(eval(&up), Expr::bitvec((-2i64) as u64, 32));
    }

    #[test]
    fn conditions_and_stores() {
        let sorts = SortPool::default();
        let flag = Expr::var("frame:0:local:flag", Sort::BitVec(8));
        assert_eq!(
            to_bool(flag.clone()).unwrap(),
            Expr::ne(flag, Expr::bitvec(0, 8)).unwrap()
        );
        let stored = coerce(Expr::bool(true), &il::Type::Boolean, &il::Type::Boolean, &sorts).unwrap();
        assert_eq!(eval(&stored), Expr::bitvec(1, 8));
        let stored = coerce(Expr::bitvec(1, 32), &il::Type::Int32, &il::Type::Boolean, &sorts).unwrap();
        assert_eq!(eval(&stored), Expr::bitvec(1, 8));
        assert!(coerce(Expr::string("a"), &il::Type::String, &il::Type::Int32, &sorts).is_err());
    }

    #[test]
    fn stores_keep_the_signedness_of_the_value() {
        let sorts = SortPool::default();
        let all_ones = Expr::bitvec(0xffff_ffff, 32);

        let stored = coerce(all_ones.clone(), &il::Type::UInt32, &il::Type::Single, &sorts).unwrap();
        assert_eq!(eval(&stored), Expr::real(4294967295.0));
        let stored = coerce(all_ones.clone(), &il::Type::Int32, &il::Type::Double, &sorts).unwrap();
        assert_eq!(eval(&stored), Expr::real(-1.0));

        let stored = coerce(all_ones.clone(), &il::Type::UInt32, &il::Type::Int64, &sorts).unwrap();
        assert_eq!(eval(&stored), Expr::bitvec(0xffff_ffff, 64));
        let stored = coerce(all_ones, &il::Type::Int32, &il::Type::UInt64, &sorts).unwrap();
        assert_eq!(eval(&stored), Expr::bitvec(u64::MAX, 64));
    }
}
