//! Inputpath: finding the program paths that only player input can reach.
//!
//! Inputpath analyzes the structured IL of compiled methods. Given an entry
//! point, it works out which instructions depend on an input API, which
//! instructions can still reach such a dependency, and then symbolically
//! executes the entry point to produce, for every feasible path, a
//! precondition formula over fields, parameters and external call results.
//!
//! The crate is laid out bottom-up:
//!
//! * [`il`] is the method IL the engine consumes.
//! * [`graph`] is a generic directed graph used by the analyses.
//! * [`analysis`] holds the control-flow graph, dominators, reaching
//!   definitions, the dependence graph, the input taint and leads-to-input
//!   analyses, and the program slicer.
//! * [`symbolic`] holds formulas, sorts, solvers and the symbolic execution
//!   machine.
//! * [`compile`] turns solved path conditions back into predicates and input
//!   conditions.
//! * [`driver`] ties all of it together per entry point.

#![deny(unused_must_use)]

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate log;

pub mod analysis;
pub mod compile;
pub mod config;
pub mod driver;
mod error;
pub mod graph;
pub mod il;
pub mod model;
pub mod symbolic;
#[cfg(test)]
mod tests;
pub mod transformation;

pub use error::Error;

#[cfg(not(feature = "thread_safe"))]
use std::rc::Rc;
#[cfg(not(feature = "thread_safe"))]
pub type RC<T> = Rc<T>;

#[cfg(feature = "thread_safe")]
use std::sync::Arc;
#[cfg(feature = "thread_safe")]
pub type RC<T> = Arc<T>;
