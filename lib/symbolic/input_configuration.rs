//! Execution policy for input handling code.
//!
//! Reads of the input API become symcalls which are split into the cases a
//! player can bring about: the sign of an axis, a cell of the screen for the
//! mouse position, and pressed or released for buttons and keys. Branches
//! which cannot lead to an input read are not explored.

use crate::analysis::LeadsToInputResult;
use crate::il;
use crate::symbolic::{
    fresh_value, make_symcall, smtlib, Address, ArithCmp, Configuration, ExecutionStatus, Expr,
    MachineContext, Sort, Summarized, SymexState,
};
use crate::config::AxisCase;
use crate::Error;
use std::collections::BTreeMap;

/// Type of the mouse position.
pub const VECTOR3_TYPE: &str = "UnityEngine.Vector3";

/// Per state data of [`InputConfiguration`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InputData {
    /// Symcall ids of input reads, by method signature and arguments. A
    /// repeated read within a frame returns the same value.
    pub symcall_ids: BTreeMap<(String, String), usize>,
    /// Index of the path this state was exported as.
    pub path_id: Option<usize>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Edge {
    Down,
    Up,
}

type InputState = SymexState<InputData>;

pub struct InputConfiguration<'a> {
    leads_to: &'a LeadsToInputResult,
}

impl<'a> InputConfiguration<'a> {
    pub fn new(leads_to: &'a LeadsToInputResult) -> InputConfiguration<'a> {
        InputConfiguration { leads_to }
    }

    /// The value of an input read, and whether this is its first read in
    /// the state.
    fn input_symcall(
        &self,
        ctx: &MachineContext,
        state: &mut InputState,
        method: &il::MethodRef,
        arguments: Vec<Expr>,
    ) -> Result<(Expr, bool), Error> {
        let key = (
            method.signature(),
            arguments
                .iter()
                .map(smtlib::term)
                .collect::<Vec<String>>()
                .join(";"),
        );
        let (id, first_call) = match state.data().symcall_ids.get(&key) {
            Some(id) => (*id, false),
            None => {
                let id = state.next_symcall_id();
                state.data_mut().symcall_ids.insert(key, id);
                (id, true)
            }
        };
        let value = make_symcall(ctx, state, method, arguments, id, first_call)?
            .ok_or_else(|| Error::Unsupported(format!("input API {} has no value", method)))?;
        Ok((value, first_call))
    }

    /// Facts about the input API which hold in every state: axes lie in
    /// `[-1, 1]`, and the mouse position lies on the screen.
    pub fn assumptions(&self, ctx: &MachineContext, state: &InputState) -> Result<Vec<Expr>, Error> {
        let api = &ctx.options.input_api;
        let mut assumptions = Vec::new();
        for (id, call) in state.symbolic_method_calls() {
            let method = call.method();
            if method.declaring_type() != api.input_type {
                continue;
            }
            let value = match fresh_value(&Address::symcall(*id), method.return_type(), &ctx.sorts)? {
                Some(value) => value,
                None => continue,
            };
            if method.name().starts_with("GetAxis") {
                assumptions.push(within(value, -1.0, 1.0)?);
            } else if method.name() == "get_mousePosition" {
                assumptions.push(within(Expr::access(value.clone(), "x")?, 0.0, 1.0)?);
                assumptions.push(within(Expr::access(value, "y")?, 0.0, 1.0)?);
            }
        }
        Ok(assumptions)
    }

    fn feasible(&self, ctx: &MachineContext, state: &InputState, extra: &[Expr]) -> Result<bool, Error> {
        let mut conditions = extra.to_vec();
        conditions.extend(self.assumptions(ctx, state)?);
        ctx.feasible(state, &conditions)
    }

    /// One fork of `state` per feasible case. When no case is feasible the
    /// state is aborted.
    fn split(
        &self,
        ctx: &MachineContext,
        state: InputState,
        cases: Vec<Expr>,
        value: Expr,
    ) -> Result<Vec<Summarized<InputData>>, Error> {
        let mut satisfiable = Vec::new();
        for case in cases {
            if self.feasible(ctx, &state, &[case.clone()])? {
                satisfiable.push(case);
            }
        }
        if satisfiable.is_empty() {
            debug!("no feasible case for {}", value);
            let mut state = state;
            state.set_status(ExecutionStatus::Aborted);
            return Ok(vec![(state, Some(value))]);
        }
        Ok(satisfiable
            .into_iter()
            .map(|case| {
                let mut fork = state.fork();
                fork.add_condition(case);
                (fork, Some(value.clone()))
            })
            .collect())
    }

    fn axis(
        &self,
        ctx: &MachineContext,
        mut state: InputState,
        method: &il::MethodRef,
        arguments: Vec<Expr>,
    ) -> Result<Vec<Summarized<InputData>>, Error> {
        let (value, first_call) = self.input_symcall(ctx, &mut state, method, arguments)?;
        if !first_call {
            return Ok(vec![(state, Some(value))]);
        }
        let zero = Expr::real(0.0);
        let mut cases = Vec::new();
        for case in &ctx.options.axis_partition {
            cases.push(match case {
                AxisCase::Positive => Expr::arith_cmp(ArithCmp::Gt, value.clone(), zero.clone())?,
                AxisCase::Negative => Expr::arith_cmp(ArithCmp::Lt, value.clone(), zero.clone())?,
                AxisCase::Zero => Expr::eq(value.clone(), zero.clone())?,
            });
        }
        self.split(ctx, state, cases, value)
    }

    fn mouse_position(
        &self,
        ctx: &MachineContext,
        mut state: InputState,
        method: &il::MethodRef,
        arguments: Vec<Expr>,
    ) -> Result<Vec<Summarized<InputData>>, Error> {
        let (value, first_call) = self.input_symcall(ctx, &mut state, method, arguments)?;
        if !first_call {
            return Ok(vec![(state, Some(value))]);
        }
        let x = Expr::access(value.clone(), "x")?;
        let y = Expr::access(value.clone(), "y")?;
        let width = ctx.options.grid_width;
        let height = ctx.options.grid_height;
        let mut cells = Vec::new();
        for i in 0..width {
            for j in 0..height {
                cells.push(Expr::and(vec![
                    Expr::arith_cmp(ArithCmp::Ge, x.clone(), fraction(i, width))?,
                    Expr::arith_cmp(ArithCmp::Lt, x.clone(), fraction(i + 1, width))?,
                    Expr::arith_cmp(ArithCmp::Ge, y.clone(), fraction(j, height))?,
                    Expr::arith_cmp(ArithCmp::Lt, y.clone(), fraction(j + 1, height))?,
                ])?);
            }
        }
        self.split(ctx, state, cells, value)
    }

    /// `GetButton`, `GetKey`, `GetMouseButton` and their `Down` and `Up`
    /// variants. The edge variants compare the current state against the
    /// previous frame's.
    fn button(
        &self,
        ctx: &MachineContext,
        mut state: InputState,
        method: &il::MethodRef,
        arguments: Vec<Expr>,
    ) -> Result<Vec<Summarized<InputData>>, Error> {
        let api = &ctx.options.input_api;
        let (base, edge) = match method.name() {
            "GetButton" => ("GetButton", None),
            "GetButtonDown" => ("GetButton", Some(Edge::Down)),
            "GetButtonUp" => ("GetButton", Some(Edge::Up)),
            "GetKey" => ("GetKey", None),
            "GetKeyDown" => ("GetKey", Some(Edge::Down)),
            "GetKeyUp" => ("GetKey", Some(Edge::Up)),
            "GetMouseButton" => ("GetMouseButton", None),
            "GetMouseButtonDown" => ("GetMouseButton", Some(Edge::Down)),
            "GetMouseButtonUp" => ("GetMouseButton", Some(Edge::Up)),
            _ => {
                return Err(Error::Unsupported(format!("input API {}", method)));
            }
        };
        let current = il::MethodRef::static_(
            api.input_type.clone(),
            base,
            method.parameter_types().to_vec(),
            method.return_type().clone(),
        );
        let previous = il::MethodRef::static_(
            api.previous_input_type.clone(),
            base,
            method.parameter_types().to_vec(),
            method.return_type().clone(),
        );
        let (pressed, first_call) = self.input_symcall(ctx, &mut state, &current, arguments.clone())?;
        let (was_pressed, _) = self.input_symcall(ctx, &mut state, &previous, arguments)?;
        let bits = match ctx.sorts.sort(method.return_type())? {
            Sort::BitVec(bits) => bits,
            sort => return Err(Error::Sort(format!("{} returns {}", method, sort))),
        };
        let zero = Expr::bitvec(0, bits);

        let edge = match edge {
            Some(edge) => edge,
            None => {
                if !first_call {
                    return Ok(vec![(state, Some(pressed))]);
                }
                let cases = vec![
                    Expr::eq(pressed.clone(), zero.clone())?,
                    Expr::ne(pressed.clone(), zero)?,
                ];
                return self.split(ctx, state, cases, pressed);
            }
        };

        let down = (
            Expr::eq(was_pressed.clone(), zero.clone())?,
            Expr::ne(pressed.clone(), zero.clone())?,
        );
        let up = (Expr::ne(was_pressed, zero.clone())?, Expr::eq(pressed, zero)?);
        let ((inverse_previous, inverse_current), (op_previous, op_current)) = match edge {
            Edge::Down => (up, down),
            Edge::Up => (down, up),
        };

        let mut results = Vec::new();
        let not_op = Expr::not(Expr::and(vec![op_previous.clone(), op_current.clone()])?)?;
        if self.feasible(ctx, &state, &[not_op.clone()])? {
            let mut fork = state.fork();
            fork.add_condition(not_op);
            results.push((fork, Some(Expr::bitvec(0, bits))));
        }
        if self.feasible(ctx, &state, &[op_previous.clone(), op_current.clone()])? {
            let mut fork = state.fork();
            fork.add_condition(op_previous);
            fork.add_condition(op_current);
            results.push((fork, Some(Expr::bitvec(1, bits))));
        }
        if self.feasible(ctx, &state, &[inverse_previous.clone(), inverse_current.clone()])? {
            let mut fork = state.fork();
            fork.add_condition(inverse_previous);
            fork.add_condition(inverse_current);
            fork.set_status(ExecutionStatus::Aborted);
            results.push((fork, None));
        }
        if results.is_empty() {
            state.set_status(ExecutionStatus::Aborted);
            results.push((state, None));
        }
        Ok(results)
    }

    fn special(ctx: &MachineContext, name: &str, type_: &il::Type) -> Result<Expr, Error> {
        fresh_value(&Address::special(name), type_, &ctx.sorts)?
            .ok_or_else(|| Error::Unsupported(format!("special {} has no value", name)))
    }

    /// The mouse button 0 read of the current or the previous frame.
    fn mouse_button(
        &self,
        ctx: &MachineContext,
        state: &mut InputState,
        declaring_type: &str,
    ) -> Result<Expr, Error> {
        let method = il::MethodRef::static_(
            declaring_type,
            "GetMouseButton",
            vec![il::Type::Int32],
            il::Type::Boolean,
        );
        Ok(self
            .input_symcall(ctx, state, &method, vec![Expr::bitvec(0, 32)])?
            .0)
    }
}

fn within(value: Expr, low: f64, high: f64) -> Result<Expr, Error> {
    Expr::and(vec![
        Expr::arith_cmp(ArithCmp::Ge, value.clone(), Expr::real(low))?,
        Expr::arith_cmp(ArithCmp::Le, value, Expr::real(high))?,
    ])
}

fn fraction(numerator: u32, denominator: u32) -> Expr {
    Expr::real(f64::from(numerator) / f64::from(denominator))
}

fn is_zero(value: &Expr) -> Result<Expr, Error> {
    match value.sort() {
        Sort::BitVec(bits) => Expr::eq(value.clone(), Expr::bitvec(0, bits)),
        sort => Err(Error::Sort(format!("{} is not a flag", sort))),
    }
}

fn is_set(value: &Expr) -> Result<Expr, Error> {
    Expr::not(is_zero(value)?)
}

impl<'a> Configuration for InputConfiguration<'a> {
    type Data = InputData;

    /// Mouse callbacks run only under the mouse state which triggers them.
    /// The states where the callback would not run are kept, aborted.
    fn initialize_states(
        &self,
        ctx: &MachineContext,
        mut state: InputState,
    ) -> Result<Vec<InputState>, Error> {
        let api = &ctx.options.input_api;
        let entry = ctx.entry.name().to_string();
        match entry.as_str() {
            "Update" | "FixedUpdate" | "LateUpdate" => return Ok(vec![state]),
            "OnMouseUp" | "OnMouseDrag" => {
                let pressed = self.mouse_button(ctx, &mut state, &api.input_type)?;
                let was_down = Self::special(ctx, "instancemousewasdown", &il::Type::Boolean)?;
                let mut outside = state.fork();
                outside.set_status(ExecutionStatus::Aborted);
                if entry == "OnMouseUp" {
                    outside.add_condition(is_set(&pressed)?);
                    state.add_condition(is_set(&was_down)?);
                    state.add_condition(is_zero(&pressed)?);
                } else {
                    outside.add_condition(is_zero(&pressed)?);
                    state.add_condition(is_set(&was_down)?);
                }
                return Ok(vec![state, outside]);
            }
            "OnMouseOver" | "OnMouseDown" | "OnMouseEnter" | "OnMouseExit" | "OnMouseUpAsButton" => {}
            _ => {
                return Err(Error::Unsupported(format!(
                    "entry point {}",
                    ctx.entry.full_name()
                )))
            }
        }

        let vector = ctx.program.type_of(VECTOR3_TYPE);
        if !vector.is_struct() {
            return Err(Error::Unsupported(format!("{} is not a value type", VECTOR3_TYPE)));
        }
        let get_mouse_position =
            il::MethodRef::static_(api.input_type.clone(), "get_mousePosition", vec![], vector);
        let (position, _) = self.input_symcall(ctx, &mut state, &get_mouse_position, vec![])?;
        let x = Expr::access(position.clone(), "x")?;
        let y = Expr::access(position, "y")?;
        let bound = |name: &str| Self::special(ctx, name, &il::Type::Single);
        let in_bounds = Expr::and(vec![
            Expr::arith_cmp(ArithCmp::Ge, x.clone(), bound("instancemouseboundsminx")?)?,
            Expr::arith_cmp(ArithCmp::Le, x.clone(), bound("instancemouseboundsmaxx")?)?,
            Expr::arith_cmp(ArithCmp::Ge, y.clone(), bound("instancemouseboundsminy")?)?,
            Expr::arith_cmp(ArithCmp::Le, y.clone(), bound("instancemouseboundsmaxy")?)?,
        ])?;
        let on_screen = Expr::and(vec![within(x, 0.0, 1.0)?, within(y, 0.0, 1.0)?])?;
        let out_of_bounds = Expr::not(in_bounds.clone())?;

        let mut outside;
        match entry.as_str() {
            "OnMouseOver" => {
                outside = state.fork();
                outside.add_condition(out_of_bounds);
                outside.add_condition(on_screen);
                state.add_condition(in_bounds);
            }
            "OnMouseDown" => {
                let pressed = self.mouse_button(ctx, &mut state, &api.input_type)?;
                let was_pressed = self.mouse_button(ctx, &mut state, &api.previous_input_type)?;
                outside = state.fork();
                outside.add_condition(is_zero(&pressed)?);
                state.add_condition(is_zero(&was_pressed)?);
                state.add_condition(is_set(&pressed)?);
                state.add_condition(in_bounds);
            }
            "OnMouseEnter" => {
                let did_enter = Self::special(ctx, "instancemousedidenter", &il::Type::Boolean)?;
                outside = state.fork();
                outside.add_condition(out_of_bounds);
                outside.add_condition(on_screen);
                state.add_condition(is_zero(&did_enter)?);
                state.add_condition(in_bounds);
            }
            "OnMouseExit" => {
                let did_enter = Self::special(ctx, "instancemousedidenter", &il::Type::Boolean)?;
                outside = state.fork();
                outside.add_condition(in_bounds);
                state.add_condition(is_set(&did_enter)?);
                state.add_condition(out_of_bounds);
                state.add_condition(on_screen);
            }
            _ => {
                let pressed = self.mouse_button(ctx, &mut state, &api.input_type)?;
                let was_down = Self::special(ctx, "instancemousewasdown", &il::Type::Boolean)?;
                outside = state.fork();
                outside.add_condition(out_of_bounds);
                outside.add_condition(on_screen);
                state.add_condition(is_set(&was_down)?);
                state.add_condition(is_zero(&pressed)?);
                state.add_condition(in_bounds);
            }
        }
        outside.set_status(ExecutionStatus::Aborted);
        Ok(vec![state, outside])
    }

    fn is_method_summarized(&self, ctx: &MachineContext, method: &il::MethodRef) -> bool {
        if ctx.options.input_api.is_input_api(method) {
            return true;
        }
        match ctx.program.resolve(method) {
            Some(definition) => {
                !definition.has_body()
                    || !ctx.program.is_main_module(definition)
                    || !self.leads_to.method_leads_to_input(&method.signature())
            }
            None => true,
        }
    }

    fn apply_method_summary(
        &self,
        ctx: &MachineContext,
        mut state: InputState,
        method: &il::MethodRef,
        arguments: Vec<Expr>,
    ) -> Result<Vec<Summarized<InputData>>, Error> {
        if !ctx.options.input_api.is_input_api(method) {
            let id = state.next_symcall_id();
            let value = make_symcall(ctx, &mut state, method, arguments, id, true)?;
            return Ok(vec![(state, value)]);
        }
        debug!("input read {}", method);
        if method.name().starts_with("GetAxis") {
            self.axis(ctx, state, method, arguments)
        } else if method.name() == "get_mousePosition" {
            self.mouse_position(ctx, state, method, arguments)
        } else {
            self.button(ctx, state, method, arguments)
        }
    }

    /// Cases which cannot reach an input read are aborted, unless the
    /// branch itself, or a call the state is inside of, leads to input.
    fn should_abort_branch_case(
        &self,
        _ctx: &MachineContext,
        state: &InputState,
        branch: il::InstructionLocation,
        target: Option<il::InstructionLocation>,
    ) -> bool {
        let frames = state.frames();
        let current = match frames.last() {
            Some(frame) => frame,
            None => return false,
        };
        let signature = current.method().signature();
        if self.leads_to.leads_to_input(&signature, branch) {
            return false;
        }
        let callers = &frames[..frames.len() - 1];
        if callers
            .iter()
            .any(|frame| self.leads_to.leads_to_input(&frame.method().signature(), frame.location()))
        {
            return false;
        }
        match target {
            Some(target) => !self.leads_to.leads_to_input(&signature, target),
            None => true,
        }
    }
}
