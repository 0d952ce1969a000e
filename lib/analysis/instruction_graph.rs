//! Instruction level navigation of a method body.
//!
//! Decompiled bodies end structured blocks with synthetic unconditional
//! branches. These carry no bytecode and would show up as spurious join
//! points, so the graph steps over them: the successors of an instruction
//! followed by such a branch are the successors of the branch.

use crate::il;
use crate::il::InstructionLocation;
use crate::Error;
use rustc_hash::{FxHashMap, FxHashSet};

/// Successor and predecessor queries over the instructions of one method.
#[derive(Clone, Debug)]
pub struct InstructionGraph<'m> {
    method: &'m il::Method,
    body: &'m il::Body,
    locations: Vec<InstructionLocation>,
    first: Option<InstructionLocation>,
    successors: FxHashMap<InstructionLocation, Vec<InstructionLocation>>,
    predecessors: FxHashMap<InstructionLocation, Vec<InstructionLocation>>,
}

impl<'m> InstructionGraph<'m> {
    pub fn new(method: &'m il::Method) -> Result<InstructionGraph<'m>, Error> {
        let body = method.require_body()?;

        let locations: Vec<InstructionLocation> = body
            .locations()
            .into_iter()
            .filter(|(_, instruction)| !instruction.is_synthetic_branch())
            .map(|(location, _)| location)
            .collect();

        let mut successors = FxHashMap::default();
        let mut predecessors: FxHashMap<InstructionLocation, Vec<InstructionLocation>> =
            FxHashMap::default();

        for location in &locations {
            predecessors.entry(*location).or_default();
        }

        for location in &locations {
            let succs = compute_successors(body, *location)?;
            for successor in &succs {
                let preds = predecessors.entry(*successor).or_default();
                if !preds.contains(location) {
                    preds.push(*location);
                }
            }
            successors.insert(*location, succs);
        }

        let first = resolve(body, InstructionLocation::new(0, 0));

        Ok(InstructionGraph {
            method,
            body,
            locations,
            first,
            successors,
            predecessors,
        })
    }

    pub fn method(&self) -> &'m il::Method {
        self.method
    }

    /// Every instruction which is not elided, in emission order.
    pub fn locations(&self) -> &[InstructionLocation] {
        &self.locations
    }

    pub fn instructions(&self) -> impl Iterator<Item = (InstructionLocation, &'m il::Instruction)> + '_ {
        let body = self.body;
        self.locations.iter().filter_map(move |location| {
            body.block(location.block())
                .ok()
                .and_then(|block| block.instruction(location.index()))
                .map(|instruction| (*location, instruction))
        })
    }

    /// The instruction control enters the method at, `None` for an empty body.
    pub fn first(&self) -> Option<InstructionLocation> {
        self.first
    }

    pub fn instruction(&self, location: InstructionLocation) -> Result<&'m il::Instruction, Error> {
        self.body
            .block(location.block())?
            .instruction(location.index())
            .ok_or(Error::InstructionNotFound(location.block(), location.index()))
    }

    pub fn successors(&self, location: InstructionLocation) -> &[InstructionLocation] {
        self.successors
            .get(&location)
            .map(|successors| successors.as_slice())
            .unwrap_or(&[])
    }

    pub fn predecessors(&self, location: InstructionLocation) -> &[InstructionLocation] {
        self.predecessors
            .get(&location)
            .map(|predecessors| predecessors.as_slice())
            .unwrap_or(&[])
    }
}

/// The first real instruction control reaches when it arrives at `location`.
/// Falls off the end of a block into the next one, and steps over synthetic
/// branches.
pub(crate) fn resolve(body: &il::Body, location: InstructionLocation) -> Option<InstructionLocation> {
    let mut visited = FxHashSet::default();
    let mut location = location;
    loop {
        if !visited.insert(location) {
            return None;
        }
        let block = body.block(location.block()).ok()?;
        match block.instruction(location.index()) {
            None => location = InstructionLocation::new(location.block() + 1, 0),
            Some(instruction) => {
                if instruction.is_synthetic_branch() {
                    let target = instruction.operation().branch_targets()[0];
                    location = InstructionLocation::new(target, 0);
                } else {
                    return Some(location);
                }
            }
        }
    }
}

fn compute_successors(
    body: &il::Body,
    location: InstructionLocation,
) -> Result<Vec<InstructionLocation>, Error> {
    let instruction = body
        .block(location.block())?
        .instruction(location.index())
        .ok_or(Error::InstructionNotFound(location.block(), location.index()))?;
    let operation = instruction.operation();

    let mut successors = Vec::new();

    if !operation.is_terminator() {
        if let Some(next) = resolve(body, location.next()) {
            successors.push(next);
        }
    }

    for target in operation.branch_targets() {
        if let Some(target) = resolve(body, InstructionLocation::new(target, 0)) {
            if !successors.contains(&target) {
                successors.push(target);
            }
        }
    }

    Ok(successors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::*;

    #[test]
    fn synthetic_branches_are_elided() {
        // B0: if (x > 0) br B2
        // B1: stloc y(1); br B3 (synthetic)
        // B2: stloc y(2)
        // B3: leave
        let x = Variable::local("x", Type::Int32);
        let y = Variable::local("y", Type::Int32);
        let mut body = Body::new();
        let b0 = body.new_block();
        let b1 = body.new_block();
        let b2 = body.new_block();
        let b3 = body.new_block();
        body.emit(
            b0,
            Operation::if_(
                comp(ComparisonKind::GreaterThan, ldloc(&x), ldc_i4(0)),
                b2,
            ),
        )
        .unwrap();
        body.emit(b1, Operation::stloc(&y, ldc_i4(1))).unwrap();
        body.emit_glue(b1, b3).unwrap();
        body.emit(b2, Operation::stloc(&y, ldc_i4(2))).unwrap();
        body.emit(b3, Operation::ret()).unwrap();

        let method = Method::builder("Game.Player", "Update").body(body).build();
        let graph = InstructionGraph::new(&method).unwrap();

        assert_eq!(graph.locations().len(), 4);
        assert_eq!(graph.first(), Some(InstructionLocation::new(0, 0)));
        assert_eq!(
            graph.successors(InstructionLocation::new(0, 0)),
            &[InstructionLocation::new(1, 0), InstructionLocation::new(2, 0)]
        );
        assert_eq!(
            graph.successors(InstructionLocation::new(1, 0)),
            &[InstructionLocation::new(3, 0)]
        );
        assert_eq!(
            graph.successors(InstructionLocation::new(2, 0)),
            &[InstructionLocation::new(3, 0)]
        );
        assert!(graph.successors(InstructionLocation::new(3, 0)).is_empty());
        assert_eq!(graph.predecessors(InstructionLocation::new(3, 0)).len(), 2);
    }
}
