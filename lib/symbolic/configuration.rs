use crate::config::AnalysisOptions;
use crate::il;
use crate::symbolic::{fresh_value, Address, Expr, SatResult, Solver, SortPool, SymbolicMethodCall, SymexState};
use crate::Error;
use crate::RC;
use std::fmt;

/// Everything the machine and its configuration share for one entry point.
pub struct MachineContext<'c> {
    pub program: &'c il::Program,
    pub entry: RC<il::Method>,
    pub options: &'c AnalysisOptions,
    pub solver: &'c dyn Solver,
    pub sorts: SortPool,
}

impl<'c> MachineContext<'c> {
    pub fn new(
        program: &'c il::Program,
        entry: RC<il::Method>,
        options: &'c AnalysisOptions,
        solver: &'c dyn Solver,
    ) -> Result<MachineContext<'c>, Error> {
        Ok(MachineContext {
            program,
            entry,
            options,
            solver,
            sorts: SortPool::new(program)?,
        })
    }

    /// True unless the path condition of `state` conjoined with `extra` is
    /// known to be unsatisfiable.
    pub fn feasible<D: Clone>(&self, state: &SymexState<D>, extra: &[Expr]) -> Result<bool, Error> {
        let mut conditions = state.path_condition().to_vec();
        conditions.extend(extra.iter().cloned());
        Ok(match self.solver.check(&conditions)? {
            SatResult::Unsat => false,
            SatResult::Sat(_) => true,
            SatResult::Unknown => {
                debug!("solver answered unknown, treating the query as feasible");
                true
            }
        })
    }
}

/// Record a summarized call and produce its value, the variable
/// `symcall:<id>` of the result type. Constructors produce an instance of
/// their declaring type. A repeated call, `first_call` false, must reuse an
/// id which was already recorded.
pub fn make_symcall<D: Clone>(
    ctx: &MachineContext,
    state: &mut SymexState<D>,
    method: &il::MethodRef,
    arguments: Vec<Expr>,
    id: usize,
    first_call: bool,
) -> Result<Option<Expr>, Error> {
    let type_ = if method.is_constructor() {
        ctx.program.type_of(method.declaring_type())
    } else {
        method.return_type().clone()
    };
    let value = fresh_value(&Address::symcall(id), &type_, &ctx.sorts)?;
    if first_call {
        state.record_symcall(id, SymbolicMethodCall::new(method.clone(), arguments));
    } else if !state.symbolic_method_calls().contains_key(&id) {
        return Err(Error::Custom(format!("no symcall {} to reuse", id)));
    }
    Ok(value)
}

/// A state forked by a summary, and the value of the summarized call in it.
pub type Summarized<D> = (SymexState<D>, Option<Expr>);

/// The policy the machine consults at calls and branches.
pub trait Configuration {
    /// Per state data, forked along with the state.
    type Data: Clone + fmt::Debug + Default;

    /// Constrain or fork the initial state before execution starts.
    fn initialize_states(
        &self,
        _ctx: &MachineContext,
        state: SymexState<Self::Data>,
    ) -> Result<Vec<SymexState<Self::Data>>, Error> {
        Ok(vec![state])
    }

    /// True to give `method` a fresh value instead of executing it.
    fn is_method_summarized(&self, ctx: &MachineContext, method: &il::MethodRef) -> bool;

    /// Give a summarized call its value. The default is one fresh symcall.
    fn apply_method_summary(
        &self,
        ctx: &MachineContext,
        mut state: SymexState<Self::Data>,
        method: &il::MethodRef,
        arguments: Vec<Expr>,
    ) -> Result<Vec<Summarized<Self::Data>>, Error> {
        let id = state.next_symcall_id();
        let value = make_symcall(ctx, &mut state, method, arguments, id, true)?;
        Ok(vec![(state, value)])
    }

    /// True to abort the case of the branch at `branch` which continues at
    /// `target`, `None` when the case leaves the method.
    fn should_abort_branch_case(
        &self,
        _ctx: &MachineContext,
        _state: &SymexState<Self::Data>,
        _branch: il::InstructionLocation,
        _target: Option<il::InstructionLocation>,
    ) -> bool {
        false
    }
}

/// Executes everything with a body in the main module, and summarizes the
/// rest.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultConfiguration;

impl Configuration for DefaultConfiguration {
    type Data = ();

    fn is_method_summarized(&self, ctx: &MachineContext, method: &il::MethodRef) -> bool {
        match ctx.program.resolve(method) {
            Some(definition) => !definition.has_body() || !ctx.program.is_main_module(definition),
            None => true,
        }
    }
}
