//! Translation of IL expressions into formulas over a state.

use crate::il;
use crate::symbolic::convert;
use crate::symbolic::{Address, ArithCmp, ArithOp, BvCmp, BvOp, Expr, Sort, SortPool, SymexState};
use crate::Error;

/// A call made by an instruction.
#[derive(Clone, Copy, Debug)]
pub struct CallSite<'i> {
    pub call: &'i il::Call,
    /// A `newobj`, whose value is the constructed object.
    pub is_newobj: bool,
}

/// Every call `operation` makes, in the order they execute.
pub fn call_sites(operation: &il::Operation) -> Vec<CallSite> {
    fn collect<'i>(expression: &'i il::Expression, sites: &mut Vec<CallSite<'i>>) {
        for child in expression.children() {
            collect(child, sites);
        }
        match expression {
            il::Expression::Call(call) => sites.push(CallSite {
                call,
                is_newobj: false,
            }),
            il::Expression::NewObj(call) => sites.push(CallSite {
                call,
                is_newobj: true,
            }),
            _ => {}
        }
    }

    let mut sites = Vec::new();
    for expression in operation.expressions() {
        collect(expression, &mut sites);
    }
    if let il::Operation::Call(call) = operation {
        sites.push(CallSite {
            call,
            is_newobj: false,
        });
    }
    sites
}

/// A storage location an expression designates.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Place {
    /// A memory slot.
    Slot(Address, il::Type),
    /// A field of the struct stored at a place.
    Member(Box<Place>, String),
}

/// Evaluates the expressions of the current instruction of a state, once
/// every call the instruction makes has a result.
pub struct Evaluator<'a, D: Clone> {
    state: &'a SymexState<D>,
    sorts: &'a SortPool,
    sites: &'a [CallSite<'a>],
    depth: usize,
}

impl<'a, D: Clone> Evaluator<'a, D> {
    pub fn new(
        state: &'a SymexState<D>,
        sorts: &'a SortPool,
        sites: &'a [CallSite<'a>],
    ) -> Result<Evaluator<'a, D>, Error> {
        let depth = state.frame()?.depth();
        Ok(Evaluator {
            state,
            sorts,
            sites,
            depth,
        })
    }

    fn call_result(&self, call: &il::Call) -> Result<Expr, Error> {
        let index = self
            .sites
            .iter()
            .position(|site| std::ptr::eq(site.call, call))
            .ok_or_else(|| Error::Custom(format!("call {} is not part of the instruction", call)))?;
        match self.state.frame()?.call_results.get(&index) {
            Some(Some(value)) => Ok(value.clone()),
            Some(None) => Err(Error::Unsupported(format!(
                "value of void call {}",
                call.method()
            ))),
            None => Err(Error::Custom(format!("call {} has not been made", call))),
        }
    }

    /// The object a reference value points to.
    fn object(&self, reference: &Expr) -> Result<Address, Error> {
        match reference {
            Expr::Var(name, Sort::Int) => Address::parse(name)?
                .object()
                .ok_or_else(|| Error::Unsupported(format!("{} is not an object", name))),
            Expr::Int(0) => Err(Error::Unsupported("null dereference".to_string())),
            Expr::Int(id) if *id > 0 => Ok(Address::heap(*id as usize)),
            reference => Err(Error::Unsupported(format!(
                "dereference of symbolic reference {}",
                reference
            ))),
        }
    }

    pub fn read_place(&self, place: &Place) -> Result<Expr, Error> {
        match place {
            Place::Slot(address, type_) => self.state.read(address, type_, self.sorts),
            Place::Member(inner, field) => Expr::access(self.read_place(inner)?, field),
        }
    }

    /// The slot a store of `value` to `place` writes, and what it writes
    /// there. Storing to a struct member rebuilds the enclosing struct.
    pub fn assign(&self, place: &Place, value: Expr) -> Result<(Address, Expr), Error> {
        match place {
            Place::Slot(address, type_) => {
                Ok((address.clone(), convert::coerce(value, type_, type_, self.sorts)?))
            }
            Place::Member(inner, field) => {
                let updated = Expr::update(self.read_place(inner)?, field, value)?;
                self.assign(inner, updated)
            }
        }
    }

    /// The place `expression` designates, for a field store.
    pub fn place(&self, expression: &il::Expression) -> Result<Place, Error> {
        match expression {
            il::Expression::LdLoc(variable) | il::Expression::LdLoca(variable) => Ok(Place::Slot(
                Address::variable(self.depth, variable),
                variable.type_().clone(),
            )),
            il::Expression::LdsFld(field) => Ok(Place::Slot(
                Address::static_field(field),
                field.type_().clone(),
            )),
            il::Expression::LdFld { target, field } => self.field_place(target, field),
            expression => Err(Error::Unsupported(format!(
                "store through {}",
                expression
            ))),
        }
    }

    /// The place of field `field` of the object or struct `target`
    /// designates.
    pub fn field_place(&self, target: &il::Expression, field: &il::FieldRef) -> Result<Place, Error> {
        let value = self.eval(target)?;
        match value.sort() {
            Sort::Datatype(_) => Ok(Place::Member(
                Box::new(self.place(target)?),
                field.name().to_string(),
            )),
            _ => Ok(Place::Slot(
                self.object(&value)?.instance_field(field.name()),
                field.type_().clone(),
            )),
        }
    }

    /// `expression` as a boolean formula.
    pub fn condition(&self, expression: &il::Expression) -> Result<Expr, Error> {
        convert::to_bool(self.eval(expression)?)
    }

    pub fn eval(&self, expression: &il::Expression) -> Result<Expr, Error> {
        match expression {
            il::Expression::LdLoc(variable) | il::Expression::LdLoca(variable) => self.state.read(
                &Address::variable(self.depth, variable),
                variable.type_(),
                self.sorts,
            ),
            il::Expression::LdcI4(value) => Ok(Expr::bitvec(*value as u32 as u64, 32)),
            il::Expression::LdcI8(value) => Ok(Expr::bitvec(*value as u64, 64)),
            il::Expression::LdcF4(value) | il::Expression::LdcF8(value) => {
                Ok(Expr::real(value.value()))
            }
            il::Expression::LdStr(value) => Ok(Expr::string(value.clone())),
            il::Expression::LdNull => Ok(Expr::int(0)),
            il::Expression::Binary { op, sign, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                binary(*op, *sign, lhs, rhs)
            }
            il::Expression::Comp {
                kind,
                sign,
                lhs,
                rhs,
            } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                compare(*kind, *sign, lhs, rhs)
            }
            il::Expression::LogicNot(expr) => Expr::not(self.condition(expr)?),
            il::Expression::Conv { input, target } => {
                let value = self.eval(input)?;
                convert::convert(value, &input.result_type(), target, self.sorts)
            }
            il::Expression::Call(call) | il::Expression::NewObj(call) => self.call_result(call),
            il::Expression::LdFld { target, field } => {
                let place = self.field_place(target, field)?;
                self.read_place(&place)
            }
            il::Expression::LdsFld(field) => {
                self.state
                    .read(&Address::static_field(field), field.type_(), self.sorts)
            }
            il::Expression::LdLen(array) => {
                let array = self.eval(array)?;
                self.state.read(
                    &self.object(&array)?.length(),
                    &il::Type::Int32,
                    self.sorts,
                )
            }
        }
    }
}

fn binary(op: il::BinaryOp, sign: il::Sign, lhs: Expr, rhs: Expr) -> Result<Expr, Error> {
    let signed = sign != il::Sign::Unsigned;
    let (lhs, rhs) = match op {
        // The shift amount does not take part in the result type.
        il::BinaryOp::ShiftLeft | il::BinaryOp::ShiftRight => (lhs, rhs),
        _ => convert::unify(lhs, rhs, signed)?,
    };
    match lhs.sort() {
        Sort::Real => {
            let op = match op {
                il::BinaryOp::Add => ArithOp::Add,
                il::BinaryOp::Sub => ArithOp::Sub,
                il::BinaryOp::Mul => ArithOp::Mul,
                il::BinaryOp::Div => ArithOp::Div,
                op => {
                    return Err(Error::Unsupported(format!(
                        "floating point operator {:?}",
                        op
                    )))
                }
            };
            Expr::arith(op, lhs, rhs)
        }
        Sort::BitVec(bits) => {
            let op = match op {
                il::BinaryOp::Add => BvOp::Add,
                il::BinaryOp::Sub => BvOp::Sub,
                il::BinaryOp::Mul => BvOp::Mul,
                il::BinaryOp::Div if signed => BvOp::SDiv,
                il::BinaryOp::Div => BvOp::UDiv,
                il::BinaryOp::Rem if signed => BvOp::SRem,
                il::BinaryOp::Rem => BvOp::URem,
                il::BinaryOp::BitAnd => BvOp::And,
                il::BinaryOp::BitOr => BvOp::Or,
                il::BinaryOp::BitXor => BvOp::Xor,
                il::BinaryOp::ShiftLeft | il::BinaryOp::ShiftRight => {
                    // Shift counts are masked to the width of the shifted value.
                    let amount = convert::resize(rhs, bits, false)?;
                    let amount = Expr::bv(BvOp::And, amount, Expr::bitvec(bits as u64 - 1, bits))?;
                    let op = match op {
                        il::BinaryOp::ShiftLeft => BvOp::Shl,
                        _ if sign == il::Sign::Signed => BvOp::AShr,
                        _ => BvOp::LShr,
                    };
                    return Expr::bv(op, lhs, amount);
                }
            };
            Expr::bv(op, lhs, rhs)
        }
        sort => Err(Error::Unsupported(format!("arithmetic on {}", sort))),
    }
}

fn compare(kind: il::ComparisonKind, sign: il::Sign, lhs: Expr, rhs: Expr) -> Result<Expr, Error> {
    let unsigned = sign == il::Sign::Unsigned;
    let (lhs, rhs) = convert::unify(lhs, rhs, !unsigned)?;
    if lhs.sort() != rhs.sort() {
        return Err(Error::Unsupported(format!(
            "comparison of {} with {}",
            lhs.sort(),
            rhs.sort()
        )));
    }
    match kind {
        il::ComparisonKind::Equality => return Expr::eq(lhs, rhs),
        il::ComparisonKind::Inequality => return Expr::ne(lhs, rhs),
        _ => {}
    }
    match lhs.sort() {
        Sort::BitVec(_) => {
            let cmp = match (kind, unsigned) {
                (il::ComparisonKind::LessThan, false) => BvCmp::Slt,
                (il::ComparisonKind::LessThanOrEqual, false) => BvCmp::Sle,
                (il::ComparisonKind::GreaterThan, false) => BvCmp::Sgt,
                (il::ComparisonKind::GreaterThanOrEqual, false) => BvCmp::Sge,
                (il::ComparisonKind::LessThan, true) => BvCmp::Ult,
                (il::ComparisonKind::LessThanOrEqual, true) => BvCmp::Ule,
                (il::ComparisonKind::GreaterThan, true) => BvCmp::Ugt,
                (_, true) => BvCmp::Uge,
                (_, false) => BvCmp::Sge,
            };
            Expr::bv_cmp(cmp, lhs, rhs)
        }
        Sort::Real | Sort::Int => {
            let cmp = match kind {
                il::ComparisonKind::LessThan => ArithCmp::Lt,
                il::ComparisonKind::LessThanOrEqual => ArithCmp::Le,
                il::ComparisonKind::GreaterThan => ArithCmp::Gt,
                _ => ArithCmp::Ge,
            };
            Expr::arith_cmp(cmp, lhs, rhs)
        }
        sort => Err(Error::Unsupported(format!("ordering of {}", sort))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RC;

    fn state() -> SymexState<()> {
        let mut body = il::Body::new();
        let block = body.new_block();
        body.emit(block, il::Operation::ret()).unwrap();
        let method = il::Method::builder("Game.Player", "Update")
            .module("Game")
            .body(body)
            .build();
        SymexState::new(RC::new(method), il::InstructionLocation::new(0, 0), ())
    }

    #[test]
    fn call_sites_follow_execution_order() {
        let log = il::MethodRef::static_("UnityEngine.Debug", "Log", vec![il::Type::Single], il::Type::Void);
        let get_axis = il::MethodRef::static_(
            "UnityEngine.Input",
            "GetAxis",
            vec![il::Type::String],
            il::Type::Single,
        );
        let operation = il::Operation::call(
            log,
            vec![il::call(get_axis, vec![il::ldstr("Horizontal")])],
        );
        let sites = call_sites(&operation);
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].call.method().name(), "GetAxis");
        assert_eq!(sites[1].call.method().name(), "Log");
        assert!(!sites[1].is_newobj);
    }

    #[test]
    fn fields_of_this() {
        let state = state();
        let sorts = SortPool::default();
        let this = il::Variable::this(il::Type::object("Game.Player"));
        let speed = il::FieldRef::instance("Game.Player", "speed", il::Type::Single);
        let expression = il::comp(
            il::ComparisonKind::GreaterThan,
            il::ldfld(il::ldloc(&this), speed),
            il::ldc_f4(1.5),
        );
        let evaluator = Evaluator::new(&state, &sorts, &[]).unwrap();
        assert_eq!(
            evaluator.eval(&expression).unwrap(),
            Expr::arith_cmp(
                ArithCmp::Gt,
                Expr::var("frame:0:this:instancefield:speed", Sort::Real),
                Expr::real(1.5)
            )
            .unwrap()
        );
    }

    #[test]
    fn null_dereference_is_unsupported() {
        let state = state();
        let sorts = SortPool::default();
        let field = il::FieldRef::instance("Game.Player", "speed", il::Type::Single);
        let evaluator = Evaluator::new(&state, &sorts, &[]).unwrap();
        let error = evaluator
            .eval(&il::ldfld(il::ldnull(), field))
            .unwrap_err();
        assert!(error.is_recoverable());
    }

    #[test]
    fn strings_compared_with_null_are_unsupported() {
        let state = state();
        let sorts = SortPool::default();
        let this = il::Variable::this(il::Type::object("Game.Player"));
        let name = il::FieldRef::instance("Game.Player", "name", il::Type::String);
        let evaluator = Evaluator::new(&state, &sorts, &[]).unwrap();
        let error = evaluator
            .eval(&il::comp(
                il::ComparisonKind::Equality,
                il::ldfld(il::ldloc(&this), name),
                il::ldnull(),
            ))
            .unwrap_err();
        assert!(matches!(error, Error::Unsupported(_)));
    }

    #[test]
    fn integer_arithmetic() {
        let state = state();
        let sorts = SortPool::default();
        let count = il::Variable::local("count", il::Type::Int32);
        let evaluator = Evaluator::new(&state, &sorts, &[]).unwrap();
        let shifted = evaluator
            .eval(&il::binary(
                il::BinaryOp::ShiftLeft,
                il::Sign::None,
                il::ldc_i4(1),
                il::ldc_i4(33),
            ))
            .unwrap();
        assert_eq!(shifted.simplify(), Expr::bitvec(2, 32));

        let sum = evaluator.eval(&il::add(il::ldloc(&count), il::ldc_i4(1))).unwrap();
        assert_eq!(sum.sort(), Sort::BitVec(32));
        assert_eq!(
            sum.variables().keys().cloned().collect::<Vec<String>>(),
            vec!["frame:0:local:count".to_string()]
        );
    }
}
