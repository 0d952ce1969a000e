use crate::il::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An inclusive range of bytecode offsets an instruction was decompiled from.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct IlRange {
    pub start: u32,
    pub end: u32,
}

impl IlRange {
    pub fn new(start: u32, end: u32) -> IlRange {
        IlRange { start, end }
    }

    pub fn offsets(&self) -> impl Iterator<Item = u32> {
        self.start..=self.end
    }
}

/// An `Operation` placed in a `Block`, with the bytecode it came from.
///
/// Instructions without any IL range are synthetic. The decompiler emits
/// them as glue, most commonly an unconditional branch closing a structured
/// block.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Instruction {
    operation: Operation,
    il_ranges: Vec<IlRange>,
}

impl Instruction {
    pub fn new(operation: Operation, il_ranges: Vec<IlRange>) -> Instruction {
        Instruction {
            operation,
            il_ranges,
        }
    }

    pub fn synthetic(operation: Operation) -> Instruction {
        Instruction::new(operation, Vec::new())
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn operation_mut(&mut self) -> &mut Operation {
        &mut self.operation
    }

    pub fn il_ranges(&self) -> &[IlRange] {
        &self.il_ranges
    }

    pub fn is_synthetic(&self) -> bool {
        self.il_ranges.is_empty()
    }

    /// A synthetic unconditional branch, elided from instruction graphs.
    pub fn is_synthetic_branch(&self) -> bool {
        self.is_synthetic() && self.operation.is_branch()
    }

    /// The first bytecode offset of this instruction.
    pub fn offset(&self) -> Option<u32> {
        self.il_ranges.iter().map(|range| range.start).min()
    }

    /// Every bytecode offset covered by this instruction.
    pub fn offsets(&self) -> Vec<u32> {
        self.il_ranges
            .iter()
            .flat_map(|range| range.offsets())
            .collect()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.offset() {
            Some(offset) => write!(f, "IL_{:04x}: {}", offset, self.operation),
            None => write!(f, "{}", self.operation),
        }
    }
}
