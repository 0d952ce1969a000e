//! Locations of instructions within a method body.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The position of an instruction: a block index and an index into that
/// block. Locations are plain indices into the method body, so they can be
/// copied freely and never keep the body alive.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct InstructionLocation {
    block: usize,
    index: usize,
}

impl InstructionLocation {
    pub fn new(block: usize, index: usize) -> InstructionLocation {
        InstructionLocation { block, index }
    }

    pub fn block(&self) -> usize {
        self.block
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// The location immediately following this one in the same block.
    pub fn next(&self) -> InstructionLocation {
        InstructionLocation::new(self.block, self.index + 1)
    }
}

impl fmt::Display for InstructionLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "B{}[{}]", self.block, self.index)
    }
}
