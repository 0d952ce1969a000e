//! The symbolic execution machine.
//!
//! The machine owns a work list of running states. A step executes the
//! instruction under a state's instruction pointer and yields the states it
//! turns into: the same state moved forward, forks at a branch or a
//! summarized call, or a halted or aborted state.
//!
//! An instruction may make several calls. They are made one step at a time,
//! in execution order, and their values are kept in the frame until the
//! instruction itself executes. A call into a method with a body pushes a
//! frame, and the callee's return fills in the value.

use crate::analysis::resolve;
use crate::config::AnalysisOptions;
use crate::il;
use crate::symbolic::convert;
use crate::symbolic::eval::{call_sites, CallSite, Evaluator};
use crate::symbolic::state::ReturnSlot;
use crate::symbolic::{Address, Configuration, ExecutionStatus, Expr, MachineContext, Solver, SymexState};
use crate::Error;
use crate::RC;

/// One way out of a branch.
#[derive(Clone, Debug)]
struct BranchCase {
    condition: Expr,
    /// `None` when the case falls off the end of the method.
    target: Option<il::InstructionLocation>,
}

pub struct SymexMachine<'c, C: Configuration> {
    ctx: MachineContext<'c>,
    configuration: &'c C,
    states: Vec<SymexState<C::Data>>,
}

impl<'c, C: Configuration> SymexMachine<'c, C> {
    pub fn new(
        program: &'c il::Program,
        entry: RC<il::Method>,
        options: &'c AnalysisOptions,
        solver: &'c dyn Solver,
        configuration: &'c C,
    ) -> Result<SymexMachine<'c, C>, Error> {
        Ok(SymexMachine {
            ctx: MachineContext::new(program, entry, options, solver)?,
            configuration,
            states: Vec::new(),
        })
    }

    pub fn context(&self) -> &MachineContext<'c> {
        &self.ctx
    }

    /// Every state which stopped running, halted or aborted.
    pub fn states(&self) -> &[SymexState<C::Data>] {
        &self.states
    }

    pub fn states_mut(&mut self) -> &mut [SymexState<C::Data>] {
        &mut self.states
    }

    pub fn into_states(self) -> Vec<SymexState<C::Data>> {
        self.states
    }

    /// The states which returned from the entry point.
    pub fn halted(&self) -> impl Iterator<Item = &SymexState<C::Data>> {
        self.states
            .iter()
            .filter(|state| state.status() == ExecutionStatus::Halted)
    }

    /// Drive every state to completion.
    pub fn run(&mut self) -> Result<(), Error> {
        let entry = self.ctx.entry.clone();
        info!("symbolically executing {}", entry.signature());

        let first = resolve(entry.require_body()?, il::InstructionLocation::new(0, 0));
        let mut initial = SymexState::new(
            entry.clone(),
            first.unwrap_or_else(|| il::InstructionLocation::new(0, 0)),
            C::Data::default(),
        );
        if first.is_none() {
            initial.set_status(ExecutionStatus::Halted);
        }

        let mut pending = Vec::new();
        let initial_states = self.configuration.initialize_states(&self.ctx, initial)?;
        self.admit(initial_states, &mut pending)?;

        while let Some(state) = pending.pop() {
            let successors = self.step(state)?;
            self.admit(successors, &mut pending)?;
        }

        debug!(
            "{}: {} states, {} halted",
            entry.signature(),
            self.states.len(),
            self.halted().count()
        );
        Ok(())
    }

    fn admit(
        &mut self,
        states: Vec<SymexState<C::Data>>,
        pending: &mut Vec<SymexState<C::Data>>,
    ) -> Result<(), Error> {
        // The first successor is explored first.
        for state in states.into_iter().rev() {
            if state.is_running() {
                pending.push(state);
            } else {
                self.states.push(state);
            }
        }
        if pending.len() + self.states.len() > self.ctx.options.max_states {
            return Err(Error::Unsupported(format!(
                "more than {} states in {}",
                self.ctx.options.max_states,
                self.ctx.entry.signature()
            )));
        }
        Ok(())
    }

    /// Execute one instruction, or make one call, of `state`.
    pub fn step(&self, mut state: SymexState<C::Data>) -> Result<Vec<SymexState<C::Data>>, Error> {
        if state.tick() > self.ctx.options.max_steps_per_state {
            return Err(Error::Unsupported(format!(
                "more than {} steps in {}",
                self.ctx.options.max_steps_per_state,
                self.ctx.entry.signature()
            )));
        }

        let (method, location) = {
            let frame = state.frame()?;
            (frame.method().clone(), frame.location())
        };
        let instruction = method.instruction(location)?;
        trace!("{} {}: {}", method.full_name(), location, instruction);

        let sites = call_sites(instruction.operation());
        let unmade = {
            let frame = state.frame()?;
            (0..sites.len()).find(|index| !frame.call_results.contains_key(index))
        };
        match unmade {
            Some(index) => self.call(state, &sites, index),
            None => self.execute(state, &method, location, instruction.operation(), &sites),
        }
    }

    fn call(
        &self,
        mut state: SymexState<C::Data>,
        sites: &[CallSite],
        index: usize,
    ) -> Result<Vec<SymexState<C::Data>>, Error> {
        let site = sites[index];
        let method = site.call.method();
        let has_receiver = !method.is_static() && !site.is_newobj;

        let mut arguments = Vec::new();
        {
            let evaluator = Evaluator::new(&state, &self.ctx.sorts, sites)?;
            for (i, argument) in site.call.arguments().iter().enumerate() {
                let value = evaluator.eval(argument)?;
                let from = argument.result_type();
                let formal = if has_receiver {
                    i.checked_sub(1)
                        .and_then(|i| method.parameter_types().get(i))
                } else {
                    method.parameter_types().get(i)
                };
                arguments.push(match formal {
                    Some(type_) => convert::coerce(value, &from, type_, &self.ctx.sorts)?,
                    None => value,
                });
            }
        }

        if self.configuration.is_method_summarized(&self.ctx, method) {
            debug!("summarizing {}", method);
            let mut successors = Vec::new();
            for (mut successor, value) in
                self.configuration
                    .apply_method_summary(&self.ctx, state, method, arguments)?
            {
                successor.frame_mut()?.call_results.insert(index, value);
                successors.push(successor);
            }
            return Ok(successors);
        }

        if site.is_newobj {
            if self.ctx.program.type_of(method.declaring_type()).is_struct() {
                return Err(Error::Unsupported(format!(
                    "constructor of value type {}",
                    method.declaring_type()
                )));
            }
            let object = state.allocate();
            let slot = ReturnSlot {
                call: index,
                constructed: Some(object.clone()),
            };
            return self.enter(state, method, Some(object), arguments, slot);
        }

        let receiver = if has_receiver {
            if arguments.is_empty() {
                return Err(Error::Custom(format!("call to {} without a receiver", method)));
            }
            Some(arguments.remove(0))
        } else {
            None
        };
        let slot = ReturnSlot {
            call: index,
            constructed: None,
        };
        self.enter(state, method, receiver, arguments, slot)
    }

    /// Push a frame for `method`.
    fn enter(
        &self,
        mut state: SymexState<C::Data>,
        method: &il::MethodRef,
        receiver: Option<Expr>,
        arguments: Vec<Expr>,
        slot: ReturnSlot,
    ) -> Result<Vec<SymexState<C::Data>>, Error> {
        let callee = self
            .ctx
            .program
            .resolve(method)
            .ok_or_else(|| Error::MethodNotFound(method.signature()))?
            .clone();
        let first = resolve(callee.require_body()?, il::InstructionLocation::new(0, 0));
        let first = match first {
            Some(first) => first,
            None => {
                state.frame_mut()?.call_results.insert(slot.call, slot.constructed);
                return Ok(vec![state]);
            }
        };

        let depth = state.next_depth();
        state.push_frame(callee, first, slot);
        if let Some(receiver) = receiver {
            state.write(&Address::this(depth), receiver);
        }
        for (index, argument) in arguments.into_iter().enumerate() {
            state.write(&Address::argument(depth, index), argument);
        }
        Ok(vec![state])
    }

    /// Return from the current frame with `value`.
    fn ret(
        &self,
        mut state: SymexState<C::Data>,
        value: Option<Expr>,
    ) -> Result<Vec<SymexState<C::Data>>, Error> {
        if state.frames().len() == 1 {
            state.set_status(ExecutionStatus::Halted);
            return Ok(vec![state]);
        }
        let frame = state
            .pop_frame()
            .ok_or_else(|| Error::Custom("return without a frame".to_string()))?;
        let slot = frame
            .return_slot
            .ok_or_else(|| Error::Custom("callee frame without a return slot".to_string()))?;
        state
            .frame_mut()?
            .call_results
            .insert(slot.call, slot.constructed.or(value));
        Ok(vec![state])
    }

    /// Continue at `target`, or return when control leaves the method.
    fn goto(
        &self,
        mut state: SymexState<C::Data>,
        target: Option<il::InstructionLocation>,
    ) -> Result<Vec<SymexState<C::Data>>, Error> {
        match target {
            Some(location) => {
                state.jump(location)?;
                Ok(vec![state])
            }
            None => self.ret(state, None),
        }
    }

    fn execute(
        &self,
        mut state: SymexState<C::Data>,
        method: &il::Method,
        location: il::InstructionLocation,
        operation: &il::Operation,
        sites: &[CallSite],
    ) -> Result<Vec<SymexState<C::Data>>, Error> {
        let body = method.require_body()?;
        let sorts = &self.ctx.sorts;
        let block_start = |block: usize| resolve(body, il::InstructionLocation::new(block, 0));
        let next = resolve(body, location.next());
        let evaluator = Evaluator::new(&state, sorts, sites)?;
        let depth = state.frame()?.depth();

        match operation {
            il::Operation::Nop | il::Operation::Call(_) => self.goto(state, next),
            il::Operation::StLoc { variable, value } => {
                let value = convert::coerce(
                    evaluator.eval(value)?,
                    &value.result_type(),
                    variable.type_(),
                    sorts,
                )?;
                state.write(&Address::variable(depth, variable), value);
                self.goto(state, next)
            }
            il::Operation::StFld {
                target,
                field,
                value,
            } => {
                let value = convert::coerce(
                    evaluator.eval(value)?,
                    &value.result_type(),
                    field.type_(),
                    sorts,
                )?;
                let place = evaluator.field_place(target, field)?;
                let (address, value) = evaluator.assign(&place, value)?;
                state.write(&address, value);
                self.goto(state, next)
            }
            il::Operation::StsFld { field, value } => {
                let value = convert::coerce(
                    evaluator.eval(value)?,
                    &value.result_type(),
                    field.type_(),
                    sorts,
                )?;
                state.write(&Address::static_field(field), value);
                self.goto(state, next)
            }
            il::Operation::If { condition, target } => {
                let condition = evaluator.condition(condition)?;
                let cases = vec![
                    BranchCase {
                        condition: condition.clone(),
                        target: block_start(*target),
                    },
                    BranchCase {
                        condition: Expr::not(condition)?,
                        target: next,
                    },
                ];
                self.branch(state, location, cases)
            }
            il::Operation::Branch { target } => self.goto(state, block_start(*target)),
            il::Operation::Switch {
                value,
                cases,
                default,
            } => {
                let value = evaluator.eval(value)?;
                let sort = value.sort();
                let mut branch_cases = Vec::new();
                let mut misses = Vec::new();
                for case in cases {
                    let mut hits = Vec::new();
                    for constant in &case.values {
                        let constant = Expr::numeral(*constant, &sort)?;
                        hits.push(Expr::eq(value.clone(), constant.clone())?);
                        misses.push(Expr::ne(value.clone(), constant)?);
                    }
                    branch_cases.push(BranchCase {
                        condition: Expr::or(hits)?,
                        target: block_start(case.target),
                    });
                }
                branch_cases.push(BranchCase {
                    condition: Expr::and(misses)?,
                    target: block_start(*default),
                });
                self.branch(state, location, branch_cases)
            }
            il::Operation::Leave { value } => {
                let value = match value {
                    Some(value) if !method.return_type().is_void() => Some(convert::coerce(
                        evaluator.eval(value)?,
                        &value.result_type(),
                        method.return_type(),
                        sorts,
                    )?),
                    _ => None,
                };
                self.ret(state, value)
            }
            il::Operation::Throw { .. } => {
                debug!("{} throws at {}", method.full_name(), location);
                state.set_status(ExecutionStatus::Aborted);
                Ok(vec![state])
            }
            il::Operation::EndFinally => Err(Error::Unsupported(format!(
                "exception handler in {}",
                method.full_name()
            ))),
        }
    }

    /// Fork `state` over the feasible cases of the branch at `location`.
    fn branch(
        &self,
        state: SymexState<C::Data>,
        location: il::InstructionLocation,
        cases: Vec<BranchCase>,
    ) -> Result<Vec<SymexState<C::Data>>, Error> {
        let mut feasible = Vec::new();
        for case in cases {
            let condition = case.condition.simplify();
            if condition == Expr::Bool(false) {
                continue;
            }
            if condition != Expr::Bool(true)
                && !self.ctx.feasible(&state, &[condition.clone()])?
            {
                continue;
            }
            feasible.push(BranchCase {
                condition,
                target: case.target,
            });
        }

        if feasible.is_empty() {
            debug!("no feasible case at {}", location);
            let mut state = state;
            state.set_status(ExecutionStatus::Aborted);
            return Ok(vec![state]);
        }

        let (kept, vetoed): (Vec<BranchCase>, Vec<BranchCase>) =
            feasible.iter().cloned().partition(|case| {
                !self
                    .configuration
                    .should_abort_branch_case(&self.ctx, &state, location, case.target)
            });

        if kept.is_empty() {
            debug!("following the first case of the branch at {}", location);
            return self.goto(state, feasible[0].target);
        }

        let mut successors = Vec::new();
        for case in kept {
            let mut fork = state.fork();
            fork.add_condition(case.condition);
            successors.extend(self.goto(fork, case.target)?);
        }
        for case in vetoed {
            let mut fork = state.fork();
            fork.add_condition(case.condition);
            fork.set_status(ExecutionStatus::Aborted);
            successors.push(fork);
        }
        Ok(successors)
    }
}
