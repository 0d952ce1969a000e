//! Turning path conditions into checks against the running game.
//!
//! A path condition mentions two kinds of variables. Input variables are
//! results of the input API, which the player controls. Everything else
//! (fields, results of other methods, engine state) is fixed at the moment
//! the entry point runs and can be read from the live game through an
//! [`AccessorRegistry`].
//!
//! [`compile_path`] resolves the non-input variables once, ahead of time. At
//! runtime, [`CompiledPath::is_feasible`] evaluates the conjuncts without
//! input variables, and [`CompiledPath::solve_for_inputs`] pins the non-input
//! variables to their live values and asks a solver for the
//! [`InputCondition`]s that drive the game down the path.
//!
//! Anything that cannot be resolved at compile time is reported as a warning
//! and left out. Anything that cannot be resolved at runtime makes the path
//! infeasible.

mod input_condition;
mod path;
mod predicate;
mod registry;
mod value;

pub use self::input_condition::{InputCondition, Key, VectorAxis};
pub use self::path::{CompileEnv, Term, VariablePath};
pub use self::predicate::Predicate;
pub use self::registry::{AccessorRegistry, EvalContext, Invoker, SpecialGetter, StaticGetter};
pub use self::value::{Object, Value};

use crate::config::InputApi;
use crate::symbolic::{smtlib, Expr, SatResult, Solver, Sort, SymbolicMethodCall};
use crate::Error;
use std::collections::BTreeMap;

/// Mouse buttons are reported as keys `Mouse0` to `Mouse6`.
const MOUSE_BUTTONS: i64 = 7;

/// A read of the input API on the path.
#[derive(Clone, Debug)]
struct InputRead {
    id: usize,
    method: String,
    sort: Sort,
    /// `None` if an argument could not be compiled.
    arguments: Option<Vec<Term>>,
}

/// A path condition, ready to be checked against the running game.
#[derive(Clone, Debug)]
pub struct CompiledPath {
    condition: Vec<Expr>,
    precondition: Vec<Predicate>,
    pins: Vec<(String, Sort, VariablePath)>,
    inputs: Vec<InputRead>,
    warnings: Vec<String>,
}

/// Compile the path condition of one path. `symcalls` are the symbolic
/// method calls of the state the condition was taken from.
pub fn compile_path(
    condition: &[Expr],
    symcalls: &BTreeMap<usize, SymbolicMethodCall>,
    registry: &AccessorRegistry,
    input_api: &InputApi,
) -> Result<CompiledPath, Error> {
    let env = CompileEnv {
        symcalls,
        registry,
        input_api,
    };
    let mut warnings = Vec::new();

    let mut precondition = Vec::new();
    for conjunct in condition {
        if env.contains_input_variable(conjunct) {
            continue;
        }
        match Predicate::compile(conjunct, &env) {
            Ok(predicate) => precondition.push(predicate),
            Err(error) if error.is_recoverable() => {
                let warning = format!("failed to compile '{}': {}", smtlib::term(conjunct), error);
                warn!("{}", warning);
                warnings.push(warning);
            }
            Err(error) => return Err(error),
        }
    }

    let mut variables = BTreeMap::new();
    for conjunct in condition {
        variables.extend(conjunct.variables());
    }
    let mut pins = Vec::new();
    let mut inputs = Vec::new();
    for (name, sort) in variables {
        if env.is_input_variable(&name) {
            if let Some((id, call)) = env.symcall_of(&name) {
                let arguments = call
                    .arguments()
                    .iter()
                    .map(|argument| Term::compile(argument, &env))
                    .collect::<Result<Vec<Term>, Error>>();
                let arguments = match arguments {
                    Ok(arguments) => Some(arguments),
                    Err(error) if error.is_recoverable() => {
                        warnings.push(format!("arguments of {}: {}", call.method(), error));
                        None
                    }
                    Err(error) => return Err(error),
                };
                inputs.push(InputRead {
                    id,
                    method: call.method().name().to_string(),
                    sort,
                    arguments,
                });
            }
            continue;
        }
        match VariablePath::compile(&name, &env) {
            Ok(path) => pins.push((name, sort, path)),
            Err(error) if error.is_recoverable() => {
                debug!("{} stays free: {}", name, error);
                warnings.push(format!("failed to resolve {}: {}", name, error));
            }
            Err(error) => return Err(error),
        }
    }

    Ok(CompiledPath {
        condition: condition.to_vec(),
        precondition,
        pins,
        inputs,
        warnings,
    })
}

impl CompiledPath {
    pub fn condition(&self) -> &[Expr] {
        &self.condition
    }

    pub fn precondition(&self) -> &[Predicate] {
        &self.precondition
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// True if every compiled conjunct without input variables holds now.
    pub fn is_feasible(&self, ctx: &EvalContext) -> bool {
        self.precondition
            .iter()
            .all(|predicate| predicate.evaluate(ctx))
    }

    /// The inputs which drive the game down this path now, or `None` if no
    /// input does.
    pub fn solve_for_inputs(
        &self,
        ctx: &EvalContext,
        solver: &dyn Solver,
    ) -> Result<Option<Vec<InputCondition>>, Error> {
        let mut assertions = self.condition.clone();
        for (name, sort, path) in &self.pins {
            let value = match path.resolve(ctx).and_then(|value| value.to_expr(sort)) {
                Ok(value) => value,
                Err(error) => {
                    debug!("path infeasible, {} does not resolve: {}", name, error);
                    return Ok(None);
                }
            };
            assertions.push(Expr::eq(Expr::var(name.clone(), sort.clone()), value)?);
        }

        let model = match solver.check(&assertions)? {
            SatResult::Sat(model) => model,
            SatResult::Unsat => return Ok(None),
            SatResult::Unknown => {
                debug!("no model for the path, treating it as infeasible");
                return Ok(None);
            }
        };

        let mut conditions = Vec::new();
        for input in &self.inputs {
            let name = format!("symcall:{}", input.id);
            let value = Expr::var(name.clone(), input.sort.clone());
            let arguments = match &input.arguments {
                Some(arguments) => arguments
                    .iter()
                    .map(|argument| argument.value(ctx))
                    .collect::<Result<Vec<Value>, Error>>(),
                None => Err(Error::Resolution(format!(
                    "arguments of {} were not compiled",
                    name
                ))),
            };
            let arguments = match arguments {
                Ok(arguments) => arguments,
                Err(error) => {
                    debug!("path infeasible: {}", error);
                    return Ok(None);
                }
            };
            let solved = |expr: &Expr| {
                model
                    .eval(expr)
                    .ok_or_else(|| Error::Resolution(format!("no value for {} in the model", expr)))
            };
            let is_set = |expr: &Expr| -> Result<bool, Error> {
                let value = solved(expr)?;
                value
                    .as_bool()
                    .or_else(|| value.as_bitvec().map(|(value, _)| value != 0))
                    .ok_or_else(|| Error::Resolution(format!("{} is not a flag", value)))
            };

            match input.method.as_str() {
                "GetAxis" | "GetAxisRaw" => {
                    let axis = string_argument(&input.method, &arguments)?;
                    let value = solved(&value)?
                        .as_f64()
                        .ok_or_else(|| Error::Resolution(format!("{} is not a number", name)))?;
                    let value = if value > 0.0 {
                        1.0
                    } else if value < 0.0 {
                        -1.0
                    } else {
                        0.0
                    };
                    conditions.push(InputCondition::Axis { name: axis, value });
                }
                "GetButton" => conditions.push(InputCondition::Button {
                    name: string_argument(&input.method, &arguments)?,
                    down: is_set(&value)?,
                }),
                "GetKey" => {
                    let key = match arguments.first() {
                        Some(Value::Str(name)) => Key::Named(name.clone()),
                        Some(Value::Integer(code)) => Key::Code(*code),
                        _ => {
                            return Err(Error::Resolution(
                                "GetKey expects a key name or a key code".to_string(),
                            ))
                        }
                    };
                    conditions.push(InputCondition::Key {
                        key,
                        down: is_set(&value)?,
                    });
                }
                "GetMouseButton" => {
                    let button = match arguments.first().and_then(Value::as_i64) {
                        Some(button) if (0..MOUSE_BUTTONS).contains(&button) => button as u8,
                        _ => {
                            return Err(Error::Resolution(
                                "unexpected mouse button".to_string(),
                            ))
                        }
                    };
                    conditions.push(InputCondition::Key {
                        key: Key::Mouse(button),
                        down: is_set(&value)?,
                    });
                }
                "get_mousePosition" => {
                    for (axis, field) in [(VectorAxis::X, "x"), (VectorAxis::Y, "y")] {
                        let coordinate = solved(&Expr::access(value.clone(), field)?)?;
                        let coordinate = coordinate.as_f64().ok_or_else(|| {
                            Error::Resolution(format!("{} is not a number", coordinate))
                        })?;
                        conditions.push(InputCondition::MousePosition {
                            axis,
                            value: coordinate,
                        });
                    }
                }
                method => {
                    return Err(Error::Resolution(format!(
                        "unsupported input method {}",
                        method
                    )))
                }
            }
        }
        Ok(Some(conditions))
    }
}

fn string_argument(method: &str, arguments: &[Value]) -> Result<String, Error> {
    match arguments.first() {
        Some(Value::Str(value)) => Ok(value.clone()),
        _ => Err(Error::Resolution(format!(
            "{} expects a string argument",
            method
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il;
    use crate::symbolic::{ArithCmp, BoundsSolver, BvCmp, DatatypeSort};
    use crate::RC;

    fn get_axis() -> il::MethodRef {
        il::MethodRef::static_(
            "UnityEngine.Input",
            "GetAxis",
            vec![il::Type::String],
            il::Type::Single,
        )
    }

    fn speed() -> Expr {
        Expr::var("frame:0:this:instancefield:speed", Sort::BitVec(32))
    }

    fn player(speed: i64) -> EvalContext {
        EvalContext::new(Value::object(
            Object::new(1, "Game.Player").with_field("speed", Value::Integer(speed)),
        ))
    }

    #[test]
    fn inputs_for_an_axis_path() {
        // GetAxis("Horizontal") < 0 && this.speed > 2
        let mut symcalls = BTreeMap::new();
        symcalls.insert(
            0,
            SymbolicMethodCall::new(get_axis(), vec![Expr::string("Horizontal")]),
        );
        let axis = Expr::var("symcall:0", Sort::Real);
        let condition = vec![
            Expr::arith_cmp(ArithCmp::Lt, axis, Expr::real(0.0)).unwrap(),
            Expr::BvCmp(BvCmp::Sgt, Box::new(speed()), Box::new(Expr::bitvec(2, 32))),
        ];
        let registry = AccessorRegistry::new();
        let compiled =
            compile_path(&condition, &symcalls, &registry, &InputApi::default()).unwrap();
        assert_eq!(compiled.precondition().len(), 1);
        assert!(compiled.warnings().is_empty());

        let solver = BoundsSolver::new();
        assert!(compiled.is_feasible(&player(5)));
        assert_eq!(
            compiled.solve_for_inputs(&player(5), &solver).unwrap(),
            Some(vec![InputCondition::Axis {
                name: "Horizontal".to_string(),
                value: -1.0,
            }])
        );
        assert!(!compiled.is_feasible(&player(1)));
        assert_eq!(compiled.solve_for_inputs(&player(1), &solver).unwrap(), None);
    }

    #[test]
    fn unresolvable_conjuncts_become_warnings() {
        let get_mouse_position = il::MethodRef::static_(
            "UnityEngine.Input",
            "get_mousePosition",
            vec![],
            il::Type::Struct("UnityEngine.Vector3".to_string()),
        );
        let mut symcalls = BTreeMap::new();
        symcalls.insert(0, SymbolicMethodCall::new(get_mouse_position, vec![]));
        let vector = RC::new(DatatypeSort::new(
            "UnityEngine.Vector3",
            vec![
                ("x".to_string(), Sort::Real),
                ("y".to_string(), Sort::Real),
                ("z".to_string(), Sort::Real),
            ],
        ));
        let position = Expr::var("symcall:0", Sort::Datatype(vector));
        let x = Expr::access(position.clone(), "x").unwrap();
        let y = Expr::access(position, "y").unwrap();
        let min_x = Expr::var("special:instancemouseboundsminx", Sort::Real);
        let condition = vec![
            Expr::arith_cmp(ArithCmp::Ge, x.clone(), min_x).unwrap(),
            Expr::arith_cmp(ArithCmp::Ge, x, Expr::real(0.5)).unwrap(),
            Expr::arith_cmp(ArithCmp::Lt, y, Expr::real(0.25)).unwrap(),
            Expr::var("frame:0:local:grounded", Sort::Bool),
        ];

        let mut registry = AccessorRegistry::new();
        registry.register_special("instancemouseboundsminx", |_| Ok(Value::Float(0.75)));
        let compiled =
            compile_path(&condition, &symcalls, &registry, &InputApi::default()).unwrap();
        assert!(compiled.precondition().is_empty());
        assert_eq!(compiled.warnings().len(), 2);
        assert!(compiled.warnings()[0].starts_with("failed to compile"));

        let solver = BoundsSolver::new();
        let inputs = compiled
            .solve_for_inputs(&player(0), &solver)
            .unwrap()
            .unwrap();
        assert_eq!(inputs.len(), 2);
        match &inputs[0] {
            InputCondition::MousePosition {
                axis: VectorAxis::X,
                value,
            } => assert!(*value >= 0.75),
            input => panic!("unexpected {}", input),
        }
        match &inputs[1] {
            InputCondition::MousePosition {
                axis: VectorAxis::Y,
                value,
            } => assert!(*value < 0.25),
            input => panic!("unexpected {}", input),
        }
    }

    #[test]
    fn mouse_buttons_are_keys() {
        let get_mouse_button = il::MethodRef::static_(
            "UnityEngine.Input",
            "GetMouseButton",
            vec![il::Type::Int32],
            il::Type::Boolean,
        );
        let mut symcalls = BTreeMap::new();
        symcalls.insert(
            0,
            SymbolicMethodCall::new(get_mouse_button.clone(), vec![Expr::bitvec(1, 32)]),
        );
        symcalls.insert(
            1,
            SymbolicMethodCall::new(get_mouse_button, vec![Expr::bitvec(9, 32)]),
        );
        let pressed = |id: usize| {
            Expr::not(Expr::eq(
                Expr::var(format!("symcall:{}", id), Sort::BitVec(8)),
                Expr::bitvec(0, 8),
            )
            .unwrap())
            .unwrap()
        };
        let registry = AccessorRegistry::new();
        let solver = BoundsSolver::new();

        let compiled =
            compile_path(&[pressed(0)], &symcalls, &registry, &InputApi::default()).unwrap();
        assert_eq!(
            compiled.solve_for_inputs(&player(0), &solver).unwrap(),
            Some(vec![InputCondition::Key {
                key: Key::Mouse(1),
                down: true,
            }])
        );

        let compiled =
            compile_path(&[pressed(1)], &symcalls, &registry, &InputApi::default()).unwrap();
        assert!(matches!(
            compiled.solve_for_inputs(&player(0), &solver),
            Err(Error::Resolution(_))
        ));
    }
}
