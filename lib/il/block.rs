use crate::il::*;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A sequence of instructions. Control enters at the first instruction.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Block {
    index: usize,
    instructions: Vec<Instruction>,
}

impl Block {
    pub fn new(index: usize) -> Block {
        Block {
            index,
            instructions: Vec::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn instructions_mut(&mut self) -> &mut Vec<Instruction> {
        &mut self.instructions
    }

    pub fn instruction(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    pub(crate) fn set_index(&mut self, index: usize) {
        self.index = index;
    }
}

/// Kinds of exception handler regions.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum HandlerKind {
    Catch,
    Filter,
    Fault,
    Finally,
}

/// A protected region and its handler, as inclusive ranges of block indices.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct ExceptionHandler {
    pub kind: HandlerKind,
    pub try_blocks: (usize, usize),
    pub handler_blocks: (usize, usize),
}

/// The body of a method.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Body {
    blocks: Vec<Block>,
    exception_handlers: Vec<ExceptionHandler>,
    next_offset: u32,
}

impl Body {
    pub fn new() -> Body {
        Body::default()
    }

    /// Append an empty block and return its index.
    pub fn new_block(&mut self) -> usize {
        let index = self.blocks.len();
        self.blocks.push(Block::new(index));
        index
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, index: usize) -> Result<&Block, Error> {
        self.blocks.get(index).ok_or(Error::BlockNotFound(index))
    }

    pub fn block_mut(&mut self, index: usize) -> Result<&mut Block, Error> {
        self.blocks.get_mut(index).ok_or(Error::BlockNotFound(index))
    }

    /// Append `operation` to `block`, assigning it the next bytecode offset.
    pub fn emit(&mut self, block: usize, operation: Operation) -> Result<(), Error> {
        let offset = self.next_offset;
        self.block_mut(block)?
            .push(Instruction::new(operation, vec![IlRange::new(offset, offset)]));
        self.next_offset += 1;
        Ok(())
    }

    /// Append a synthetic unconditional branch to `block`.
    pub fn emit_glue(&mut self, block: usize, target: usize) -> Result<(), Error> {
        self.block_mut(block)?
            .push(Instruction::synthetic(Operation::branch(target)));
        Ok(())
    }

    pub fn exception_handlers(&self) -> &[ExceptionHandler] {
        &self.exception_handlers
    }

    pub fn add_exception_handler(&mut self, handler: ExceptionHandler) {
        self.exception_handlers.push(handler);
    }

    pub(crate) fn clear_exception_handlers(&mut self) {
        self.exception_handlers.clear();
    }

    /// Remove the blocks with the given indices, renumbering the remaining
    /// blocks and every branch target pointing at them. Targets pointing at a
    /// removed block move to the next surviving block.
    pub(crate) fn remove_blocks(&mut self, removed: &[usize]) {
        let old_len = self.blocks.len();
        let mut mapping = vec![0; old_len + 1];
        let mut next = 0;
        for (old, slot) in mapping.iter_mut().enumerate().take(old_len) {
            *slot = next;
            if !removed.contains(&old) {
                next += 1;
            }
        }
        mapping[old_len] = next;

        let blocks = std::mem::take(&mut self.blocks);
        self.blocks = blocks
            .into_iter()
            .filter(|block| !removed.contains(&block.index()))
            .collect();
        for (index, block) in self.blocks.iter_mut().enumerate() {
            block.set_index(index);
            for instruction in block.instructions_mut() {
                instruction
                    .operation_mut()
                    .map_targets(|target| mapping[target.min(old_len)]);
            }
        }
    }

    /// Every instruction with its location, in block order.
    pub fn locations(&self) -> Vec<(InstructionLocation, &Instruction)> {
        self.blocks
            .iter()
            .flat_map(|block| {
                block
                    .instructions()
                    .iter()
                    .enumerate()
                    .map(move |(i, instruction)| {
                        (InstructionLocation::new(block.index(), i), instruction)
                    })
            })
            .collect()
    }
}

impl fmt::Display for Body {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for block in &self.blocks {
            writeln!(f, "  B{}:", block.index())?;
            for instruction in block.instructions() {
                writeln!(f, "    {}", instruction)?;
            }
        }
        Ok(())
    }
}
