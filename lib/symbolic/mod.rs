//! Symbolic execution of entry points.
//!
//! Values are [`Expr`] formulas over free variables, whose names are
//! [`Address`]es. A [`SymexMachine`] forks [`SymexState`]s at branches and
//! at summarized calls, asking its [`Configuration`] what to summarize and
//! which branch cases to drop, and a [`Solver`] which cases are feasible.

mod address;
mod configuration;
mod convert;
mod eval;
mod expr;
mod input_configuration;
mod machine;
pub mod smtlib;
mod solver;
mod sort;
mod state;

pub use self::address::{Address, FrameSlot, Root, Suffix};
pub use self::configuration::{
    make_symcall, Configuration, DefaultConfiguration, MachineContext, Summarized,
};
pub use self::convert::{coerce, convert, to_bool};
pub use self::eval::{call_sites, CallSite, Evaluator, Place};
pub use self::expr::{ArithCmp, ArithOp, BvCmp, BvOp, Expr};
pub(crate) use self::expr::to_signed;
pub use self::input_configuration::{InputConfiguration, InputData, VECTOR3_TYPE};
pub use self::machine::SymexMachine;
pub use self::solver::{BoundsSolver, Model, SatResult, Solver, Z3Process};
pub use self::sort::{DatatypeSort, Sort, SortPool};
pub use self::state::{fresh_value, ExecutionStatus, Frame, SymbolicMethodCall, SymexState};
