//! Solver formulas.
//!
//! `Expr` is a small, sorted term language covering exactly what the symbolic
//! executor emits: booleans, fixed width bitvectors, integers (object
//! identities), reals (floating point values), strings, and single
//! constructor datatypes (value types). Every node maps one to one onto an
//! SMT-LIB2 function, so printing and parsing are inverses.
//!
//! The checked constructors (`Expr::eq`, `Expr::bv`, ...) verify sorts and
//! return `Error::Sort` on mismatch. Building variants directly skips the
//! check.

use crate::il::Float;
use crate::symbolic::{smtlib, DatatypeSort, Sort};
use crate::Error;
use crate::RC;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum BvOp {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum BvCmp {
    Ult,
    Ule,
    Ugt,
    Uge,
    Slt,
    Sle,
    Sgt,
    Sge,
}

impl BvCmp {
    pub fn is_signed(&self) -> bool {
        matches!(self, BvCmp::Slt | BvCmp::Sle | BvCmp::Sgt | BvCmp::Sge)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum ArithCmp {
    Lt,
    Le,
    Gt,
    Ge,
}

/// A formula.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Expr {
    /// A free variable. The name encodes where the value came from.
    Var(String, Sort),
    Bool(bool),
    BitVec {
        value: u64,
        bits: usize,
    },
    Int(i64),
    Real(Float),
    Str(String),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Ite(Box<Expr>, Box<Expr>, Box<Expr>),
    Bv(BvOp, Box<Expr>, Box<Expr>),
    BvCmp(BvCmp, Box<Expr>, Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    ArithCmp(ArithCmp, Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    Concat(Box<Expr>, Box<Expr>),
    Extract {
        high: usize,
        low: usize,
        expr: Box<Expr>,
    },
    /// Extend by the given number of bits.
    ZeroExtend(usize, Box<Expr>),
    SignExtend(usize, Box<Expr>),
    Bv2Nat(Box<Expr>),
    Nat2Bv(usize, Box<Expr>),
    ToReal(Box<Expr>),
    ToInt(Box<Expr>),
    Construct(RC<DatatypeSort>, Vec<Expr>),
    Access(RC<DatatypeSort>, usize, Box<Expr>),
}

fn mask(bits: usize) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// `value`, a `bits` wide bitvector, read as two's complement.
pub(crate) fn to_signed(value: u64, bits: usize) -> i64 {
    if bits == 0 || bits >= 64 {
        return value as i64;
    }
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

fn ensure_bool(expr: &Expr) -> Result<(), Error> {
    match expr.sort() {
        Sort::Bool => Ok(()),
        sort => Err(Error::Sort(format!("expected Bool, found {} in {}", sort, expr))),
    }
}

fn ensure_same(lhs: &Expr, rhs: &Expr) -> Result<Sort, Error> {
    let sort = lhs.sort();
    if sort != rhs.sort() {
        return Err(Error::Sort(format!(
            "{} and {} differ in sort ({} and {})",
            lhs,
            rhs,
            sort,
            rhs.sort()
        )));
    }
    Ok(sort)
}

fn ensure_bitvec(expr: &Expr) -> Result<usize, Error> {
    expr.sort()
        .bits()
        .ok_or_else(|| Error::Sort(format!("expected a bitvector, found {}", expr)))
}

impl Expr {
    pub fn var<S: Into<String>>(name: S, sort: Sort) -> Expr {
        Expr::Var(name.into(), sort)
    }

    pub fn bool(value: bool) -> Expr {
        Expr::Bool(value)
    }

    pub fn bitvec(value: u64, bits: usize) -> Expr {
        Expr::BitVec {
            value: value & mask(bits),
            bits,
        }
    }

    pub fn int(value: i64) -> Expr {
        Expr::Int(value)
    }

    pub fn real(value: f64) -> Expr {
        Expr::Real(Float::new(value))
    }

    pub fn string<S: Into<String>>(value: S) -> Expr {
        Expr::Str(value.into())
    }

    /// The zero, or default, value of `sort`.
    pub fn zero(sort: &Sort) -> Expr {
        match sort {
            Sort::Bool => Expr::Bool(false),
            Sort::BitVec(bits) => Expr::bitvec(0, *bits),
            Sort::Int => Expr::Int(0),
            Sort::Real => Expr::real(0.0),
            Sort::String => Expr::Str(String::new()),
            Sort::Datatype(datatype) => Expr::Construct(
                datatype.clone(),
                datatype
                    .fields()
                    .iter()
                    .map(|(_, sort)| Expr::zero(sort))
                    .collect(),
            ),
        }
    }

    /// The constant `value` in a numeric sort.
    pub fn numeral(value: i64, sort: &Sort) -> Result<Expr, Error> {
        match sort {
            Sort::BitVec(bits) => Ok(Expr::bitvec(value as u64, *bits)),
            Sort::Int => Ok(Expr::Int(value)),
            Sort::Real => Ok(Expr::real(value as f64)),
            sort => Err(Error::Sort(format!("no numerals of sort {}", sort))),
        }
    }

    pub fn not(expr: Expr) -> Result<Expr, Error> {
        ensure_bool(&expr)?;
        Ok(Expr::Not(Box::new(expr)))
    }

    pub fn and(exprs: Vec<Expr>) -> Result<Expr, Error> {
        for expr in &exprs {
            ensure_bool(expr)?;
        }
        Ok(Expr::And(exprs))
    }

    pub fn or(exprs: Vec<Expr>) -> Result<Expr, Error> {
        for expr in &exprs {
            ensure_bool(expr)?;
        }
        Ok(Expr::Or(exprs))
    }

    pub fn eq(lhs: Expr, rhs: Expr) -> Result<Expr, Error> {
        ensure_same(&lhs, &rhs)?;
        Ok(Expr::Eq(Box::new(lhs), Box::new(rhs)))
    }

    pub fn ne(lhs: Expr, rhs: Expr) -> Result<Expr, Error> {
        Expr::not(Expr::eq(lhs, rhs)?)
    }

    pub fn ite(condition: Expr, then: Expr, else_: Expr) -> Result<Expr, Error> {
        ensure_bool(&condition)?;
        ensure_same(&then, &else_)?;
        Ok(Expr::Ite(Box::new(condition), Box::new(then), Box::new(else_)))
    }

    pub fn bv(op: BvOp, lhs: Expr, rhs: Expr) -> Result<Expr, Error> {
        ensure_bitvec(&lhs)?;
        ensure_same(&lhs, &rhs)?;
        Ok(Expr::Bv(op, Box::new(lhs), Box::new(rhs)))
    }

    pub fn bv_cmp(cmp: BvCmp, lhs: Expr, rhs: Expr) -> Result<Expr, Error> {
        ensure_bitvec(&lhs)?;
        ensure_same(&lhs, &rhs)?;
        Ok(Expr::BvCmp(cmp, Box::new(lhs), Box::new(rhs)))
    }

    pub fn arith(op: ArithOp, lhs: Expr, rhs: Expr) -> Result<Expr, Error> {
        let sort = ensure_same(&lhs, &rhs)?;
        if !sort.is_arith() {
            return Err(Error::Sort(format!("{} is not arithmetic", lhs)));
        }
        Ok(Expr::Arith(op, Box::new(lhs), Box::new(rhs)))
    }

    pub fn arith_cmp(cmp: ArithCmp, lhs: Expr, rhs: Expr) -> Result<Expr, Error> {
        let sort = ensure_same(&lhs, &rhs)?;
        if !sort.is_arith() {
            return Err(Error::Sort(format!("{} is not arithmetic", lhs)));
        }
        Ok(Expr::ArithCmp(cmp, Box::new(lhs), Box::new(rhs)))
    }

    pub fn neg(expr: Expr) -> Result<Expr, Error> {
        if !expr.sort().is_arith() {
            return Err(Error::Sort(format!("{} is not arithmetic", expr)));
        }
        Ok(Expr::Neg(Box::new(expr)))
    }

    pub fn concat(high: Expr, low: Expr) -> Result<Expr, Error> {
        let bits = ensure_bitvec(&high)? + ensure_bitvec(&low)?;
        if bits > 64 {
            return Err(Error::Sort(format!("{} bit bitvectors are unsupported", bits)));
        }
        Ok(Expr::Concat(Box::new(high), Box::new(low)))
    }

    pub fn extract(high: usize, low: usize, expr: Expr) -> Result<Expr, Error> {
        let bits = ensure_bitvec(&expr)?;
        if low > high || high >= bits {
            return Err(Error::Sort(format!(
                "cannot extract [{}:{}] from {} bits",
                high, low, bits
            )));
        }
        Ok(Expr::Extract {
            high,
            low,
            expr: Box::new(expr),
        })
    }

    pub fn zero_extend(extra: usize, expr: Expr) -> Result<Expr, Error> {
        if ensure_bitvec(&expr)? + extra > 64 {
            return Err(Error::Sort("bitvectors wider than 64 bits".to_string()));
        }
        Ok(Expr::ZeroExtend(extra, Box::new(expr)))
    }

    pub fn sign_extend(extra: usize, expr: Expr) -> Result<Expr, Error> {
        if ensure_bitvec(&expr)? + extra > 64 {
            return Err(Error::Sort("bitvectors wider than 64 bits".to_string()));
        }
        Ok(Expr::SignExtend(extra, Box::new(expr)))
    }

    pub fn bv2nat(expr: Expr) -> Result<Expr, Error> {
        ensure_bitvec(&expr)?;
        Ok(Expr::Bv2Nat(Box::new(expr)))
    }

    pub fn nat2bv(bits: usize, expr: Expr) -> Result<Expr, Error> {
        if expr.sort() != Sort::Int {
            return Err(Error::Sort(format!("expected Int, found {}", expr)));
        }
        Ok(Expr::Nat2Bv(bits, Box::new(expr)))
    }

    pub fn to_real(expr: Expr) -> Result<Expr, Error> {
        if expr.sort() != Sort::Int {
            return Err(Error::Sort(format!("expected Int, found {}", expr)));
        }
        Ok(Expr::ToReal(Box::new(expr)))
    }

    pub fn to_int(expr: Expr) -> Result<Expr, Error> {
        if expr.sort() != Sort::Real {
            return Err(Error::Sort(format!("expected Real, found {}", expr)));
        }
        Ok(Expr::ToInt(Box::new(expr)))
    }

    pub fn construct(datatype: RC<DatatypeSort>, fields: Vec<Expr>) -> Result<Expr, Error> {
        if fields.len() != datatype.fields().len() {
            return Err(Error::Sort(format!(
                "{} has {} fields, {} given",
                datatype.name(),
                datatype.fields().len(),
                fields.len()
            )));
        }
        for (field, (_, sort)) in fields.iter().zip(datatype.fields()) {
            if &field.sort() != sort {
                return Err(Error::Sort(format!("{} is not of sort {}", field, sort)));
            }
        }
        Ok(Expr::Construct(datatype, fields))
    }

    /// Read field `name` of a datatype value.
    pub fn access(expr: Expr, name: &str) -> Result<Expr, Error> {
        let datatype = match expr.sort() {
            Sort::Datatype(datatype) => datatype,
            sort => return Err(Error::Sort(format!("{} has no fields", sort))),
        };
        let index = datatype
            .field_index(name)
            .ok_or_else(|| Error::Sort(format!("{} has no field {}", datatype.name(), name)))?;
        Ok(Expr::Access(datatype, index, Box::new(expr)))
    }

    /// Replace field `name` of a datatype value.
    pub fn update(expr: Expr, name: &str, value: Expr) -> Result<Expr, Error> {
        let datatype = match expr.sort() {
            Sort::Datatype(datatype) => datatype,
            sort => return Err(Error::Sort(format!("{} has no fields", sort))),
        };
        let mut fields = Vec::new();
        for (field, _) in datatype.fields() {
            if field == name {
                fields.push(value.clone());
            } else {
                fields.push(Expr::access(expr.clone(), field)?);
            }
        }
        Expr::construct(datatype, fields)
    }

    pub fn sort(&self) -> Sort {
        match self {
            Expr::Var(_, sort) => sort.clone(),
            Expr::Bool(_)
            | Expr::Not(_)
            | Expr::And(_)
            | Expr::Or(_)
            | Expr::Eq(..)
            | Expr::BvCmp(..)
            | Expr::ArithCmp(..) => Sort::Bool,
            Expr::BitVec { bits, .. } => Sort::BitVec(*bits),
            Expr::Int(_) | Expr::Bv2Nat(_) | Expr::ToInt(_) => Sort::Int,
            Expr::Real(_) | Expr::ToReal(_) => Sort::Real,
            Expr::Str(_) => Sort::String,
            Expr::Ite(_, then, _) => then.sort(),
            Expr::Bv(_, lhs, _) | Expr::Arith(_, lhs, _) => lhs.sort(),
            Expr::Neg(expr) => expr.sort(),
            Expr::Concat(high, low) => {
                Sort::BitVec(high.sort().bits().unwrap_or(0) + low.sort().bits().unwrap_or(0))
            }
            Expr::Extract { high, low, .. } => Sort::BitVec(high - low + 1),
            Expr::ZeroExtend(extra, expr) | Expr::SignExtend(extra, expr) => {
                Sort::BitVec(expr.sort().bits().unwrap_or(0) + extra)
            }
            Expr::Nat2Bv(bits, _) => Sort::BitVec(*bits),
            Expr::Construct(datatype, _) => Sort::Datatype(datatype.clone()),
            Expr::Access(datatype, index, _) => datatype
                .field_sort(*index)
                .cloned()
                .unwrap_or(Sort::Bool),
        }
    }

    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Var(..)
            | Expr::Bool(_)
            | Expr::BitVec { .. }
            | Expr::Int(_)
            | Expr::Real(_)
            | Expr::Str(_) => Vec::new(),
            Expr::And(exprs) | Expr::Or(exprs) | Expr::Construct(_, exprs) => exprs.iter().collect(),
            Expr::Eq(lhs, rhs)
            | Expr::Bv(_, lhs, rhs)
            | Expr::BvCmp(_, lhs, rhs)
            | Expr::Arith(_, lhs, rhs)
            | Expr::ArithCmp(_, lhs, rhs)
            | Expr::Concat(lhs, rhs) => vec![lhs, rhs],
            Expr::Ite(condition, then, else_) => vec![condition, then, else_],
            Expr::Not(expr)
            | Expr::Neg(expr)
            | Expr::Extract { expr, .. }
            | Expr::ZeroExtend(_, expr)
            | Expr::SignExtend(_, expr)
            | Expr::Bv2Nat(expr)
            | Expr::Nat2Bv(_, expr)
            | Expr::ToReal(expr)
            | Expr::ToInt(expr)
            | Expr::Access(_, _, expr) => vec![expr],
        }
    }

    /// This node with its children replaced, in `children` order.
    pub fn with_children(&self, mut children: Vec<Expr>) -> Expr {
        match self {
            Expr::And(_) => return Expr::And(children),
            Expr::Or(_) => return Expr::Or(children),
            Expr::Construct(datatype, _) => return Expr::Construct(datatype.clone(), children),
            _ => {}
        }
        let mut next = || Box::new(children.remove(0));
        match self {
            Expr::Var(..)
            | Expr::Bool(_)
            | Expr::BitVec { .. }
            | Expr::Int(_)
            | Expr::Real(_)
            | Expr::Str(_) => self.clone(),
            Expr::Not(_) => Expr::Not(next()),
            Expr::Neg(_) => Expr::Neg(next()),
            Expr::Eq(..) => Expr::Eq(next(), next()),
            Expr::Ite(..) => Expr::Ite(next(), next(), next()),
            Expr::Bv(op, ..) => Expr::Bv(*op, next(), next()),
            Expr::BvCmp(cmp, ..) => Expr::BvCmp(*cmp, next(), next()),
            Expr::Arith(op, ..) => Expr::Arith(*op, next(), next()),
            Expr::ArithCmp(cmp, ..) => Expr::ArithCmp(*cmp, next(), next()),
            Expr::Concat(..) => Expr::Concat(next(), next()),
            Expr::Extract { high, low, .. } => Expr::Extract {
                high: *high,
                low: *low,
                expr: next(),
            },
            Expr::ZeroExtend(extra, _) => Expr::ZeroExtend(*extra, next()),
            Expr::SignExtend(extra, _) => Expr::SignExtend(*extra, next()),
            Expr::Bv2Nat(_) => Expr::Bv2Nat(next()),
            Expr::Nat2Bv(bits, _) => Expr::Nat2Bv(*bits, next()),
            Expr::ToReal(_) => Expr::ToReal(next()),
            Expr::ToInt(_) => Expr::ToInt(next()),
            Expr::Access(datatype, index, _) => Expr::Access(datatype.clone(), *index, next()),
            Expr::And(_) | Expr::Or(_) | Expr::Construct(..) => self.clone(),
        }
    }

    /// A value: a literal, or a constructor applied to values.
    pub fn is_constant(&self) -> bool {
        match self {
            Expr::Bool(_) | Expr::BitVec { .. } | Expr::Int(_) | Expr::Real(_) | Expr::Str(_) => {
                true
            }
            Expr::Construct(_, fields) => fields.iter().all(|field| field.is_constant()),
            _ => false,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Expr::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bitvec(&self) -> Option<(u64, usize)> {
        match self {
            Expr::BitVec { value, bits } => Some((*value, *bits)),
            _ => None,
        }
    }

    /// Numeric constants as a float, for comparisons and reporting.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Expr::Int(value) => Some(*value as f64),
            Expr::Real(value) => Some(value.value()),
            Expr::BitVec { value, .. } => Some(*value as f64),
            _ => None,
        }
    }

    pub fn var_name(&self) -> Option<&str> {
        match self {
            Expr::Var(name, _) => Some(name),
            _ => None,
        }
    }

    /// Every free variable, with its sort.
    pub fn variables(&self) -> BTreeMap<String, Sort> {
        let mut variables = BTreeMap::new();
        self.collect_variables(&mut variables);
        variables
    }

    fn collect_variables(&self, variables: &mut BTreeMap<String, Sort>) {
        match self {
            Expr::Var(name, sort) => {
                variables.insert(name.clone(), sort.clone());
            }
            _ => {
                for child in self.children() {
                    child.collect_variables(variables);
                }
            }
        }
    }

    pub fn any<F>(&self, predicate: &F) -> bool
    where
        F: Fn(&Expr) -> bool,
    {
        predicate(self) || self.children().into_iter().any(|child| child.any(predicate))
    }

    /// Evaluate under an assignment of the free variables. `None` when a
    /// variable is unassigned or the value is undefined, such as a real
    /// division by zero.
    pub fn eval<F>(&self, lookup: &F) -> Option<Expr>
    where
        F: Fn(&str) -> Option<Expr>,
    {
        match self {
            Expr::Var(name, _) => lookup(name),
            Expr::Ite(condition, then, else_) => {
                if condition.eval(lookup)?.as_bool()? {
                    then.eval(lookup)
                } else {
                    else_.eval(lookup)
                }
            }
            _ => {
                let mut values = Vec::new();
                for child in self.children() {
                    values.push(child.eval(lookup)?);
                }
                self.fold(&values)
            }
        }
    }

    /// Compute this node from the values of its children.
    fn fold(&self, values: &[Expr]) -> Option<Expr> {
        match self {
            Expr::Var(..) => None,
            Expr::Bool(_) | Expr::BitVec { .. } | Expr::Int(_) | Expr::Real(_) | Expr::Str(_) => {
                Some(self.clone())
            }
            Expr::Not(_) => Some(Expr::Bool(!values[0].as_bool()?)),
            Expr::And(_) => {
                let mut result = true;
                for value in values {
                    result &= value.as_bool()?;
                }
                Some(Expr::Bool(result))
            }
            Expr::Or(_) => {
                let mut result = false;
                for value in values {
                    result |= value.as_bool()?;
                }
                Some(Expr::Bool(result))
            }
            Expr::Eq(..) => Some(Expr::Bool(values[0] == values[1])),
            Expr::Ite(..) => {
                if values[0].as_bool()? {
                    Some(values[1].clone())
                } else {
                    Some(values[2].clone())
                }
            }
            Expr::Bv(op, ..) => {
                let (lhs, bits) = values[0].as_bitvec()?;
                let (rhs, _) = values[1].as_bitvec()?;
                Some(Expr::bitvec(fold_bv(*op, lhs, rhs, bits), bits))
            }
            Expr::BvCmp(cmp, ..) => {
                let (lhs, bits) = values[0].as_bitvec()?;
                let (rhs, _) = values[1].as_bitvec()?;
                let (slhs, srhs) = (to_signed(lhs, bits), to_signed(rhs, bits));
                Some(Expr::Bool(match cmp {
                    BvCmp::Ult => lhs < rhs,
                    BvCmp::Ule => lhs <= rhs,
                    BvCmp::Ugt => lhs > rhs,
                    BvCmp::Uge => lhs >= rhs,
                    BvCmp::Slt => slhs < srhs,
                    BvCmp::Sle => slhs <= srhs,
                    BvCmp::Sgt => slhs > srhs,
                    BvCmp::Sge => slhs >= srhs,
                }))
            }
            Expr::Arith(op, ..) => match (&values[0], &values[1]) {
                (Expr::Int(lhs), Expr::Int(rhs)) => Some(Expr::Int(match op {
                    ArithOp::Add => lhs.checked_add(*rhs)?,
                    ArithOp::Sub => lhs.checked_sub(*rhs)?,
                    ArithOp::Mul => lhs.checked_mul(*rhs)?,
                    ArithOp::Div => {
                        if *rhs == 0 {
                            return None;
                        }
                        lhs.div_euclid(*rhs)
                    }
                })),
                (Expr::Real(lhs), Expr::Real(rhs)) => {
                    let (lhs, rhs) = (lhs.value(), rhs.value());
                    Some(Expr::real(match op {
                        ArithOp::Add => lhs + rhs,
                        ArithOp::Sub => lhs - rhs,
                        ArithOp::Mul => lhs * rhs,
                        ArithOp::Div => {
                            if rhs == 0.0 {
                                return None;
                            }
                            lhs / rhs
                        }
                    }))
                }
                _ => None,
            },
            Expr::ArithCmp(cmp, ..) => {
                let lhs = values[0].as_f64()?;
                let rhs = values[1].as_f64()?;
                Some(Expr::Bool(match cmp {
                    ArithCmp::Lt => lhs < rhs,
                    ArithCmp::Le => lhs <= rhs,
                    ArithCmp::Gt => lhs > rhs,
                    ArithCmp::Ge => lhs >= rhs,
                }))
            }
            Expr::Neg(_) => match &values[0] {
                Expr::Int(value) => Some(Expr::Int(value.checked_neg()?)),
                Expr::Real(value) => Some(Expr::real(-value.value())),
                _ => None,
            },
            Expr::Concat(..) => {
                let (high, high_bits) = values[0].as_bitvec()?;
                let (low, low_bits) = values[1].as_bitvec()?;
                if high_bits + low_bits > 64 {
                    return None;
                }
                let shifted = if low_bits >= 64 { 0 } else { high << low_bits };
                Some(Expr::bitvec(shifted | low, high_bits + low_bits))
            }
            Expr::Extract { high, low, .. } => {
                let (value, _) = values[0].as_bitvec()?;
                Some(Expr::bitvec(value >> low, high - low + 1))
            }
            Expr::ZeroExtend(extra, _) => {
                let (value, bits) = values[0].as_bitvec()?;
                Some(Expr::bitvec(value, bits + extra))
            }
            Expr::SignExtend(extra, _) => {
                let (value, bits) = values[0].as_bitvec()?;
                Some(Expr::bitvec(to_signed(value, bits) as u64, bits + extra))
            }
            Expr::Bv2Nat(_) => {
                let (value, _) = values[0].as_bitvec()?;
                i64::try_from(value).ok().map(Expr::Int)
            }
            Expr::Nat2Bv(bits, _) => match values[0] {
                Expr::Int(value) => Some(Expr::bitvec(value as u64, *bits)),
                _ => None,
            },
            Expr::ToReal(_) => match values[0] {
                Expr::Int(value) => Some(Expr::real(value as f64)),
                _ => None,
            },
            Expr::ToInt(_) => match &values[0] {
                Expr::Real(value) => {
                    let floor = value.value().floor();
                    if floor.is_finite() && floor.abs() < 9.0e18 {
                        Some(Expr::Int(floor as i64))
                    } else {
                        None
                    }
                }
                _ => None,
            },
            Expr::Construct(datatype, _) => Some(Expr::Construct(datatype.clone(), values.to_vec())),
            Expr::Access(_, index, _) => match &values[0] {
                Expr::Construct(_, fields) => fields.get(*index).cloned(),
                _ => None,
            },
        }
    }

    /// Fold constants and apply a few structural identities.
    pub fn simplify(&self) -> Expr {
        if let Expr::Var(..) = self {
            return self.clone();
        }
        let children: Vec<Expr> = self.children().into_iter().map(|child| child.simplify()).collect();

        if children.iter().all(|child| child.is_constant()) {
            if let Some(value) = self.fold(&children) {
                return value;
            }
        }

        match self.with_children(children) {
            Expr::Not(expr) => match *expr {
                Expr::Not(inner) => *inner,
                expr => Expr::Not(Box::new(expr)),
            },
            Expr::And(exprs) => simplify_junction(exprs, true),
            Expr::Or(exprs) => simplify_junction(exprs, false),
            Expr::Eq(lhs, rhs) => {
                if lhs == rhs {
                    return Expr::Bool(true);
                }
                match (*lhs, *rhs) {
                    (Expr::Construct(_, lhs), Expr::Construct(_, rhs)) => {
                        let fields = lhs
                            .into_iter()
                            .zip(rhs)
                            .map(|(lhs, rhs)| Expr::Eq(Box::new(lhs), Box::new(rhs)))
                            .collect();
                        Expr::And(fields).simplify()
                    }
                    (lhs, rhs) => Expr::Eq(Box::new(lhs), Box::new(rhs)),
                }
            }
            Expr::Ite(condition, then, else_) => match condition.as_bool() {
                Some(true) => *then,
                Some(false) => *else_,
                None if then == else_ => *then,
                None => Expr::Ite(condition, then, else_),
            },
            Expr::Access(datatype, index, expr) => match *expr {
                Expr::Construct(_, mut fields) if index < fields.len() => fields.swap_remove(index),
                expr => Expr::Access(datatype, index, Box::new(expr)),
            },
            expr => expr,
        }
    }
}

fn simplify_junction(exprs: Vec<Expr>, conjunction: bool) -> Expr {
    let mut result: Vec<Expr> = Vec::new();
    let mut pending = exprs;
    pending.reverse();
    while let Some(expr) = pending.pop() {
        match expr {
            Expr::And(inner) if conjunction => pending.extend(inner.into_iter().rev()),
            Expr::Or(inner) if !conjunction => pending.extend(inner.into_iter().rev()),
            Expr::Bool(value) if value == conjunction => {}
            Expr::Bool(value) => return Expr::Bool(value),
            expr => {
                if !result.contains(&expr) {
                    result.push(expr);
                }
            }
        }
    }
    match result.len() {
        0 => Expr::Bool(conjunction),
        1 => result.remove(0),
        _ if conjunction => Expr::And(result),
        _ => Expr::Or(result),
    }
}

fn fold_bv(op: BvOp, lhs: u64, rhs: u64, bits: usize) -> u64 {
    let (slhs, srhs) = (to_signed(lhs, bits), to_signed(rhs, bits));
    match op {
        BvOp::Add => lhs.wrapping_add(rhs),
        BvOp::Sub => lhs.wrapping_sub(rhs),
        BvOp::Mul => lhs.wrapping_mul(rhs),
        BvOp::UDiv => {
            if rhs == 0 {
                u64::MAX
            } else {
                lhs / rhs
            }
        }
        BvOp::URem => {
            if rhs == 0 {
                lhs
            } else {
                lhs % rhs
            }
        }
        BvOp::SDiv => {
            if srhs == 0 {
                if slhs < 0 {
                    1
                } else {
                    u64::MAX
                }
            } else {
                slhs.wrapping_div(srhs) as u64
            }
        }
        BvOp::SRem => {
            if srhs == 0 {
                lhs
            } else {
                slhs.wrapping_rem(srhs) as u64
            }
        }
        BvOp::And => lhs & rhs,
        BvOp::Or => lhs | rhs,
        BvOp::Xor => lhs ^ rhs,
        BvOp::Shl => {
            if rhs >= bits as u64 {
                0
            } else {
                lhs << rhs
            }
        }
        BvOp::LShr => {
            if rhs >= bits as u64 {
                0
            } else {
                lhs >> rhs
            }
        }
        BvOp::AShr => {
            if rhs >= bits as u64 {
                if slhs < 0 {
                    u64::MAX
                } else {
                    0
                }
            } else {
                (slhs >> rhs) as u64
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", smtlib::term(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_are_checked() {
        let x = Expr::var("x", Sort::BitVec(32));
        let y = Expr::var("y", Sort::Real);
        assert!(Expr::eq(x.clone(), y.clone()).is_err());
        assert!(Expr::bv(BvOp::Add, x.clone(), Expr::bitvec(1, 32)).is_ok());
        assert!(Expr::arith(ArithOp::Add, x.clone(), x.clone()).is_err());
        assert!(Expr::not(y).is_err());
        assert!(Expr::extract(32, 0, x.clone()).is_err());
        assert_eq!(Expr::zero_extend(32, x).unwrap().sort(), Sort::BitVec(64));
    }

    #[test]
    fn bitvector_folding() {
        let minus_one = Expr::bitvec(u64::MAX, 8);
        assert_eq!(minus_one, Expr::bitvec(0xff, 8));

        let sum = Expr::bv(BvOp::Add, minus_one.clone(), Expr::bitvec(2, 8)).unwrap();
        assert_eq!(sum.simplify(), Expr::bitvec(1, 8));

        let signed = Expr::bv_cmp(BvCmp::Slt, minus_one.clone(), Expr::bitvec(0, 8)).unwrap();
        assert_eq!(signed.simplify(), Expr::Bool(true));
        let unsigned = Expr::bv_cmp(BvCmp::Ult, minus_one.clone(), Expr::bitvec(0, 8)).unwrap();
        assert_eq!(unsigned.simplify(), Expr::Bool(false));

        let widened = Expr::sign_extend(8, minus_one).unwrap();
        assert_eq!(widened.simplify(), Expr::bitvec(0xffff, 16));

        let shifted = Expr::bv(BvOp::AShr, Expr::bitvec(0x80, 8), Expr::bitvec(9, 8)).unwrap();
        assert_eq!(shifted.simplify(), Expr::bitvec(0xff, 8));
    }

    #[test]
    fn structural_simplification() {
        let datatype = RC::new(DatatypeSort::new(
            "UnityEngine.Vector3",
            vec![
                ("x".to_string(), Sort::Real),
                ("y".to_string(), Sort::Real),
            ],
        ));
        let x = Expr::var("x", Sort::Real);
        let point = Expr::construct(datatype, vec![x.clone(), Expr::real(0.5)]).unwrap();
        assert_eq!(Expr::access(point.clone(), "x").unwrap().simplify(), x);
        assert_eq!(
            Expr::access(point, "y").unwrap().simplify(),
            Expr::real(0.5)
        );

        let condition = Expr::arith_cmp(ArithCmp::Gt, x.clone(), Expr::real(0.0)).unwrap();
        let conjunction = Expr::and(vec![
            Expr::Bool(true),
            Expr::and(vec![condition.clone(), condition.clone()]).unwrap(),
        ])
        .unwrap();
        assert_eq!(conjunction.simplify(), condition);
        assert_eq!(
            Expr::not(Expr::not(condition.clone()).unwrap()).unwrap().simplify(),
            condition
        );
        assert_eq!(
            Expr::or(vec![condition, Expr::Bool(true)]).unwrap().simplify(),
            Expr::Bool(true)
        );
        assert_eq!(Expr::eq(x.clone(), x).unwrap().simplify(), Expr::Bool(true));
    }

    #[test]
    fn evaluation_under_an_assignment() {
        let x = Expr::var("x", Sort::Real);
        let expr = Expr::arith_cmp(
            ArithCmp::Ge,
            Expr::arith(ArithOp::Mul, x, Expr::real(2.0)).unwrap(),
            Expr::real(1.0),
        )
        .unwrap();
        let lookup = |name: &str| {
            if name == "x" {
                Some(Expr::real(0.5))
            } else {
                None
            }
        };
        assert_eq!(expr.eval(&lookup), Some(Expr::Bool(true)));
        assert_eq!(expr.eval(&|_: &str| None), None);
    }
}
