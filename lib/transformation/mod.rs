//! Rewrites of method IL.
//!
//! These mirror, at the IL level, what a bytecode patcher does to a game
//! before it is instrumented: dropping exception handlers, and keeping only
//! the instructions of a slice.

mod exception_handlers;
mod slice;

pub use self::exception_handlers::remove_exception_handlers;
pub use self::slice::apply_slice;
