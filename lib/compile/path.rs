//! Mapping symbolic variables back to the runtime values they stand for.

use crate::compile::{AccessorRegistry, EvalContext, Invoker, SpecialGetter, StaticGetter, Value};
use crate::config::InputApi;
use crate::symbolic::{Address, Expr, FrameSlot, Root, Sort, Suffix, SymbolicMethodCall};
use crate::Error;
use std::collections::BTreeMap;
use std::fmt;

/// What variable names of one path refer to.
pub struct CompileEnv<'a> {
    pub symcalls: &'a BTreeMap<usize, SymbolicMethodCall>,
    pub registry: &'a AccessorRegistry,
    pub input_api: &'a InputApi,
}

impl<'a> CompileEnv<'a> {
    /// The symcall a variable name reads from, if any.
    pub fn symcall_of(&self, name: &str) -> Option<(usize, &'a SymbolicMethodCall)> {
        match Address::parse(name).ok()?.root() {
            Root::Symcall(id) => self.symcalls.get(id).map(|call| (*id, call)),
            _ => None,
        }
    }

    /// True for results of the input API, which the player controls.
    pub fn is_input_variable(&self, name: &str) -> bool {
        self.symcall_of(name)
            .map(|(_, call)| call.method().declaring_type() == self.input_api.input_type)
            .unwrap_or(false)
    }

    pub fn contains_input_variable(&self, expr: &Expr) -> bool {
        expr.variables()
            .keys()
            .any(|name| self.is_input_variable(name))
    }
}

#[derive(Clone)]
enum Source {
    StaticField(String, StaticGetter),
    Instance,
    Symcall {
        signature: String,
        invoker: Invoker,
        arguments: Vec<Term>,
    },
    Special(String, SpecialGetter),
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Access {
    Field(String),
    Length,
}

/// How to fetch the runtime value of one symbolic variable.
#[derive(Clone)]
pub struct VariablePath {
    source: Source,
    accesses: Vec<Access>,
}

impl VariablePath {
    pub fn compile(name: &str, env: &CompileEnv) -> Result<VariablePath, Error> {
        let address = Address::parse(name)
            .map_err(|_| Error::Resolution(format!("cannot resolve variable {}", name)))?;
        let source = match address.root() {
            Root::StaticField(signature) => {
                Source::StaticField(signature.clone(), env.registry.static_field(signature)?)
            }
            Root::Frame {
                depth: 0,
                slot: FrameSlot::This,
            } => Source::Instance,
            Root::Symcall(id) => {
                let call = env
                    .symcalls
                    .get(id)
                    .ok_or_else(|| Error::Resolution(format!("no symcall {} on the path", id)))?;
                let signature = call.method().signature();
                let invoker = env.registry.method(&signature)?;
                let arguments = call
                    .arguments()
                    .iter()
                    .map(|argument| Term::compile(argument, env))
                    .collect::<Result<Vec<Term>, Error>>()?;
                Source::Symcall {
                    signature,
                    invoker,
                    arguments,
                }
            }
            Root::Special(special) => {
                Source::Special(special.clone(), env.registry.special(special)?)
            }
            Root::Heap(_) => {
                return Err(Error::Resolution(format!(
                    "object allocated on the path in {}",
                    name
                )))
            }
            Root::Frame { .. } => {
                return Err(Error::Resolution(format!("cannot resolve variable {}", name)))
            }
        };

        let mut accesses = Vec::new();
        for suffix in address.suffixes() {
            match suffix {
                Suffix::InstanceField(field) => accesses.push(Access::Field(field.clone())),
                Suffix::Length => accesses.push(Access::Length),
                // A reference stands for the object itself.
                Suffix::HeapId => {}
            }
        }
        Ok(VariablePath { source, accesses })
    }

    pub fn resolve(&self, ctx: &EvalContext) -> Result<Value, Error> {
        let mut value = match &self.source {
            Source::StaticField(_, getter) => getter(ctx)?,
            Source::Instance => ctx.instance.clone(),
            Source::Symcall {
                invoker, arguments, ..
            } => {
                let arguments = arguments
                    .iter()
                    .map(|argument| argument.value(ctx))
                    .collect::<Result<Vec<Value>, Error>>()?;
                invoker(ctx, &arguments)?
            }
            Source::Special(_, getter) => getter(ctx)?,
        };
        for access in &self.accesses {
            value = match access {
                Access::Field(name) => value.field(name)?,
                Access::Length => value.length()?,
            };
        }
        Ok(value)
    }
}

impl fmt::Debug for VariablePath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Source::StaticField(signature, _) => write!(f, "{}", signature)?,
            Source::Instance => write!(f, "this")?,
            Source::Symcall {
                signature,
                arguments,
                ..
            } => write!(f, "{}[{} args]", signature, arguments.len())?,
            Source::Special(name, _) => write!(f, "special {}", name)?,
        }
        for access in &self.accesses {
            match access {
                Access::Field(name) => write!(f, ".{}", name)?,
                Access::Length => write!(f, ".Length")?,
            }
        }
        Ok(())
    }
}

/// A formula whose free variables all resolve to runtime values.
#[derive(Clone, Debug)]
pub struct Term {
    expr: Expr,
    variables: BTreeMap<String, (Sort, VariablePath)>,
}

impl Term {
    pub fn compile(expr: &Expr, env: &CompileEnv) -> Result<Term, Error> {
        let wide = |expr: &Expr| match expr {
            Expr::And(operands) | Expr::Or(operands) => operands.len() > 2,
            _ => false,
        };
        if expr.any(&wide) {
            return Err(Error::Resolution(format!(
                "more than 2 args not supported in {}",
                expr
            )));
        }
        let mut variables = BTreeMap::new();
        for (name, sort) in expr.variables() {
            let path = VariablePath::compile(&name, env)?;
            variables.insert(name, (sort, path));
        }
        Ok(Term {
            expr: expr.clone(),
            variables,
        })
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// The formula with every variable replaced by its runtime value,
    /// folded to a constant.
    pub fn evaluate(&self, ctx: &EvalContext) -> Result<Expr, Error> {
        let mut bindings = BTreeMap::new();
        for (name, (sort, path)) in &self.variables {
            bindings.insert(name.as_str(), path.resolve(ctx)?.to_expr(sort)?);
        }
        self.expr
            .eval(&|name: &str| bindings.get(name).cloned())
            .ok_or_else(|| Error::Resolution(format!("cannot evaluate {}", self.expr)))
    }

    pub fn value(&self, ctx: &EvalContext) -> Result<Value, Error> {
        Value::from_expr(&self.evaluate(ctx)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::Object;
    use crate::il;

    #[test]
    fn variables_resolve_through_the_registry() {
        let mut registry = AccessorRegistry::new();
        registry.register_static_field("Game.Settings.instance", |_| {
            Ok(Value::object(
                Object::new(7, "Game.Settings").with_field("lives", Value::Integer(3)),
            ))
        });
        registry.register_method("Game.Inventory.Count(System.String)", |_, arguments| {
            match arguments[0].as_str() {
                Some("coin") => Ok(Value::Integer(12)),
                _ => Ok(Value::Integer(0)),
            }
        });
        let mut symcalls = BTreeMap::new();
        symcalls.insert(
            0,
            SymbolicMethodCall::new(
                il::MethodRef::static_(
                    "Game.Inventory",
                    "Count",
                    vec![il::Type::String],
                    il::Type::Int32,
                ),
                vec![Expr::string("coin")],
            ),
        );
        let api = InputApi::default();
        let env = CompileEnv {
            symcalls: &symcalls,
            registry: &registry,
            input_api: &api,
        };
        let ctx = EvalContext::new(Value::object(
            Object::new(1, "Game.Player").with_field("score", Value::Integer(40)),
        ));

        let lives = VariablePath::compile("staticfield:Game.Settings.instance:instancefield:lives", &env)
            .unwrap();
        assert_eq!(lives.resolve(&ctx).unwrap(), Value::Integer(3));
        let score = VariablePath::compile("frame:0:this:instancefield:score", &env).unwrap();
        assert_eq!(score.resolve(&ctx).unwrap(), Value::Integer(40));
        let coins = VariablePath::compile("symcall:0", &env).unwrap();
        assert_eq!(coins.resolve(&ctx).unwrap(), Value::Integer(12));
        let this = VariablePath::compile("frame:0:this:heapid", &env).unwrap();
        assert!(matches!(this.resolve(&ctx).unwrap(), Value::Object(_)));

        assert!(matches!(
            VariablePath::compile("frame:0:local:x", &env),
            Err(Error::Resolution(_))
        ));
        assert!(matches!(
            VariablePath::compile("special:instancemousewasdown", &env),
            Err(Error::Resolution(_))
        ));
    }
}
