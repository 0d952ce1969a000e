use crate::compile::{CompileEnv, EvalContext, Term};
use crate::symbolic::Expr;
use crate::Error;

/// A boolean formula compiled against the running game.
///
/// Connectives stay structural so evaluation short-circuits, and an operand
/// that fails to resolve is never read when the other operand decides.
#[derive(Clone, Debug)]
pub enum Predicate {
    Const(bool),
    Not(Box<Predicate>),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Atom(Term),
}

impl Predicate {
    pub fn compile(expr: &Expr, env: &CompileEnv) -> Result<Predicate, Error> {
        Ok(match expr {
            Expr::Bool(value) => Predicate::Const(*value),
            Expr::Not(inner) => Predicate::Not(Box::new(Predicate::compile(inner, env)?)),
            Expr::And(operands) => {
                let (lhs, rhs) = Predicate::operands(operands, true, "and", env)?;
                Predicate::And(lhs, rhs)
            }
            Expr::Or(operands) => {
                let (lhs, rhs) = Predicate::operands(operands, false, "or", env)?;
                Predicate::Or(lhs, rhs)
            }
            expr => Predicate::Atom(Term::compile(expr, env)?),
        })
    }

    fn operands(
        operands: &[Expr],
        unit: bool,
        connective: &str,
        env: &CompileEnv,
    ) -> Result<(Box<Predicate>, Box<Predicate>), Error> {
        match operands {
            [] => Ok((
                Box::new(Predicate::Const(unit)),
                Box::new(Predicate::Const(unit)),
            )),
            [only] => Ok((
                Box::new(Predicate::compile(only, env)?),
                Box::new(Predicate::Const(unit)),
            )),
            [lhs, rhs] => Ok((
                Box::new(Predicate::compile(lhs, env)?),
                Box::new(Predicate::compile(rhs, env)?),
            )),
            _ => Err(Error::Resolution(format!(
                "more than 2 args not supported in {} expression",
                connective
            ))),
        }
    }

    pub fn try_evaluate(&self, ctx: &EvalContext) -> Result<bool, Error> {
        Ok(match self {
            Predicate::Const(value) => *value,
            Predicate::Not(inner) => !inner.try_evaluate(ctx)?,
            Predicate::And(lhs, rhs) => lhs.try_evaluate(ctx)? && rhs.try_evaluate(ctx)?,
            Predicate::Or(lhs, rhs) => lhs.try_evaluate(ctx)? || rhs.try_evaluate(ctx)?,
            Predicate::Atom(term) => {
                let value = term.evaluate(ctx)?;
                value
                    .as_bool()
                    .ok_or_else(|| Error::Resolution(format!("{} is not a boolean", value)))?
            }
        })
    }

    /// Evaluate, treating a failure to resolve anything as false.
    pub fn evaluate(&self, ctx: &EvalContext) -> bool {
        match self.try_evaluate(ctx) {
            Ok(value) => value,
            Err(error) => {
                debug!("precondition does not hold: {}", error);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{AccessorRegistry, Object, Value};
    use crate::config::InputApi;
    use crate::symbolic::{BvCmp, Sort};
    use std::collections::BTreeMap;

    fn score_at_least(threshold: u64) -> Expr {
        Expr::BvCmp(
            BvCmp::Sge,
            Box::new(Expr::Var(
                "frame:0:this:instancefield:score".to_string(),
                Sort::BitVec(32),
            )),
            Box::new(Expr::bitvec(threshold, 32)),
        )
    }

    #[test]
    fn connectives_short_circuit() {
        let registry = AccessorRegistry::new();
        let symcalls = BTreeMap::new();
        let api = InputApi::default();
        let env = CompileEnv {
            symcalls: &symcalls,
            registry: &registry,
            input_api: &api,
        };
        let player = |target: Value| {
            EvalContext::new(Value::object(
                Object::new(1, "Game.Player")
                    .with_field("score", Value::Integer(40))
                    .with_field("target", target),
            ))
        };
        let target_alive = Expr::Var(
            "frame:0:this:instancefield:target:instancefield:alive".to_string(),
            Sort::BitVec(8),
        );
        let target_alive = Expr::BvCmp(
            BvCmp::Ugt,
            Box::new(target_alive),
            Box::new(Expr::bitvec(0, 8)),
        );

        let guarded = Predicate::compile(
            &Expr::And(vec![score_at_least(50), target_alive.clone()]),
            &env,
        )
        .unwrap();
        // The null target is never dereferenced.
        assert_eq!(guarded.try_evaluate(&player(Value::Null)).unwrap(), false);

        let either = Predicate::compile(
            &Expr::Or(vec![score_at_least(50), target_alive]),
            &env,
        )
        .unwrap();
        assert!(either.try_evaluate(&player(Value::Null)).is_err());
        assert!(!either.evaluate(&player(Value::Null)));
        let alive = Value::object(Object::new(2, "Game.Enemy").with_field("alive", Value::Bool(true)));
        assert!(either.evaluate(&player(alive)));

        assert!(Predicate::compile(&score_at_least(30), &env)
            .unwrap()
            .evaluate(&player(Value::Null)));
        let wide = Expr::And(vec![score_at_least(1), score_at_least(2), score_at_least(3)]);
        assert!(matches!(
            Predicate::compile(&wide, &env),
            Err(Error::Resolution(_))
        ));
    }
}
