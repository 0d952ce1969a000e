use crate::il;
use crate::symbolic::{Address, Expr, Root, SortPool};
use crate::Error;
use crate::RC;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a state is in its life.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum ExecutionStatus {
    Running,
    /// Returned from the entry point.
    Halted,
    /// Infeasible, vetoed by the configuration, or ended by a throw.
    Aborted,
}

/// A summarized call, with the arguments it was made with.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SymbolicMethodCall {
    method: il::MethodRef,
    arguments: Vec<Expr>,
}

impl SymbolicMethodCall {
    pub fn new(method: il::MethodRef, arguments: Vec<Expr>) -> SymbolicMethodCall {
        SymbolicMethodCall { method, arguments }
    }

    pub fn method(&self) -> &il::MethodRef {
        &self.method
    }

    pub fn arguments(&self) -> &[Expr] {
        &self.arguments
    }
}

/// Where the value of a returning frame goes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct ReturnSlot {
    /// Index of the call in the caller's current instruction.
    pub(crate) call: usize,
    /// For constructors, the object under construction, which is the value
    /// of the `newobj`.
    pub(crate) constructed: Option<Expr>,
}

/// One activation of a method.
#[derive(Clone, Debug)]
pub struct Frame {
    method: RC<il::Method>,
    depth: usize,
    location: il::InstructionLocation,
    /// Results of the calls of the current instruction made so far, by
    /// post-order index. `None` for void calls.
    pub(crate) call_results: BTreeMap<usize, Option<Expr>>,
    pub(crate) return_slot: Option<ReturnSlot>,
}

impl Frame {
    pub fn method(&self) -> &RC<il::Method> {
        &self.method
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn location(&self) -> il::InstructionLocation {
        self.location
    }
}

/// One path through the entry point.
///
/// Forking is cloning: a state owns all of its memory, frames and custom
/// data, so a fork evolves independently of its parent.
#[derive(Clone, Debug)]
pub struct SymexState<D: Clone> {
    path_condition: Vec<Expr>,
    memory: BTreeMap<String, Expr>,
    frames: Vec<Frame>,
    symbolic_method_calls: BTreeMap<usize, SymbolicMethodCall>,
    symcall_counter: usize,
    heap_counter: usize,
    status: ExecutionStatus,
    steps: usize,
    data: D,
}

impl<D: Clone> SymexState<D> {
    /// A running state about to execute `location` of `entry`.
    pub fn new(entry: RC<il::Method>, location: il::InstructionLocation, data: D) -> SymexState<D> {
        SymexState {
            path_condition: Vec::new(),
            memory: BTreeMap::new(),
            frames: vec![Frame {
                method: entry,
                depth: 0,
                location,
                call_results: BTreeMap::new(),
                return_slot: None,
            }],
            symbolic_method_calls: BTreeMap::new(),
            symcall_counter: 0,
            heap_counter: 0,
            status: ExecutionStatus::Running,
            steps: 0,
            data,
        }
    }

    pub fn fork(&self) -> SymexState<D> {
        self.clone()
    }

    pub fn path_condition(&self) -> &[Expr] {
        &self.path_condition
    }

    /// Conjoin `condition` to the path condition. Trivially true conditions
    /// are dropped.
    pub fn add_condition(&mut self, condition: Expr) {
        let condition = condition.simplify();
        if condition != Expr::Bool(true) {
            self.path_condition.push(condition);
        }
    }

    pub fn memory(&self) -> &BTreeMap<String, Expr> {
        &self.memory
    }

    /// The value at `address`, or the free variable standing for the
    /// unknown initial value of the slot. Slots of objects allocated during
    /// the run start out zeroed.
    pub fn read(&self, address: &Address, type_: &il::Type, sorts: &SortPool) -> Result<Expr, Error> {
        match self.memory.get(&address.to_string()) {
            Some(value) => Ok(value.clone()),
            None if type_.is_void() => {
                Err(Error::Unsupported(format!("read of void value at {}", address)))
            }
            None if matches!(address.root(), Root::Heap(_)) => Ok(Expr::zero(&sorts.sort(type_)?)),
            None => fresh_value(address, type_, sorts)?.ok_or_else(|| {
                Error::Unsupported(format!("read of void value at {}", address))
            }),
        }
    }

    pub fn write(&mut self, address: &Address, value: Expr) {
        self.memory.insert(address.to_string(), value);
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frame(&self) -> Result<&Frame, Error> {
        self.frames
            .last()
            .ok_or_else(|| Error::Custom("state has no frames".to_string()))
    }

    pub(crate) fn frame_mut(&mut self) -> Result<&mut Frame, Error> {
        self.frames
            .last_mut()
            .ok_or_else(|| Error::Custom("state has no frames".to_string()))
    }

    /// Depth of the frame a push would create.
    pub fn next_depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn push_frame(
        &mut self,
        method: RC<il::Method>,
        location: il::InstructionLocation,
        return_slot: ReturnSlot,
    ) {
        let depth = self.frames.len();
        self.frames.push(Frame {
            method,
            depth,
            location,
            call_results: BTreeMap::new(),
            return_slot: Some(return_slot),
        });
    }

    /// Pop the current frame and forget its slots.
    pub(crate) fn pop_frame(&mut self) -> Option<Frame> {
        let frame = self.frames.pop()?;
        let prefix = Address::frame_prefix(frame.depth);
        self.memory.retain(|address, _| !address.starts_with(&prefix));
        Some(frame)
    }

    /// Continue the current frame at `location`.
    pub(crate) fn jump(&mut self, location: il::InstructionLocation) -> Result<(), Error> {
        let frame = self.frame_mut()?;
        frame.location = location;
        frame.call_results.clear();
        Ok(())
    }

    pub fn symbolic_method_calls(&self) -> &BTreeMap<usize, SymbolicMethodCall> {
        &self.symbolic_method_calls
    }

    pub fn record_symcall(&mut self, id: usize, call: SymbolicMethodCall) {
        self.symbolic_method_calls.insert(id, call);
    }

    pub fn next_symcall_id(&mut self) -> usize {
        let id = self.symcall_counter;
        self.symcall_counter += 1;
        id
    }

    /// A fresh object identity. Zero is null, so identities start at one.
    pub fn allocate(&mut self) -> Expr {
        self.heap_counter += 1;
        Expr::int(self.heap_counter as i64)
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub fn set_status(&mut self, status: ExecutionStatus) {
        self.status = status;
    }

    pub fn is_running(&self) -> bool {
        self.status == ExecutionStatus::Running
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub(crate) fn tick(&mut self) -> usize {
        self.steps += 1;
        self.steps
    }

    pub fn data(&self) -> &D {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut D {
        &mut self.data
    }
}

/// The free variable for the unknown value of type `type_` at `address`.
/// References are object identities named `<address>:heapid`. `None` for
/// void.
pub fn fresh_value(address: &Address, type_: &il::Type, sorts: &SortPool) -> Result<Option<Expr>, Error> {
    if type_.is_void() {
        return Ok(None);
    }
    if type_.is_reference() {
        return Ok(Some(Expr::var(address.heap_id().to_string(), sorts.sort(type_)?)));
    }
    Ok(Some(Expr::var(address.to_string(), sorts.sort(type_)?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::{ArithCmp, Sort};

    fn entry() -> RC<il::Method> {
        let mut body = il::Body::new();
        let block = body.new_block();
        body.emit(block, il::Operation::ret()).unwrap();
        RC::new(
            il::Method::builder("Game.Player", "Update")
                .module("Game")
                .body(body)
                .build(),
        )
    }

    #[test]
    fn forks_are_independent() {
        let sorts = SortPool::default();
        let speed = Address::this(0).instance_field("speed");
        let mut parent: SymexState<()> = SymexState::new(entry(), il::InstructionLocation::new(0, 0), ());
        parent.write(&speed, Expr::real(1.0));

        let mut child = parent.fork();
        child.write(&speed, Expr::real(2.0));
        child.add_condition(
            Expr::arith_cmp(
                ArithCmp::Gt,
                Expr::var("symcall:0", Sort::Real),
                Expr::real(0.0),
            )
            .unwrap(),
        );
        child.next_symcall_id();
        child.set_status(ExecutionStatus::Aborted);

        assert_eq!(
            parent.read(&speed, &il::Type::Single, &sorts).unwrap(),
            Expr::real(1.0)
        );
        assert!(parent.path_condition().is_empty());
        assert!(parent.is_running());
        assert_eq!(parent.next_symcall_id(), 0);
        assert_eq!(
            child.read(&speed, &il::Type::Single, &sorts).unwrap(),
            Expr::real(2.0)
        );
        assert_eq!(child.path_condition().len(), 1);
    }

    #[test]
    fn unwritten_slots_read_as_variables() {
        let sorts = SortPool::default();
        let state: SymexState<()> = SymexState::new(entry(), il::InstructionLocation::new(0, 0), ());
        assert_eq!(
            state
                .read(&Address::this(0), &il::Type::object("Game.Player"), &sorts)
                .unwrap(),
            Expr::var("frame:0:this:heapid", Sort::Int)
        );
        assert_eq!(
            state
                .read(&Address::argument(0, 1), &il::Type::Int32, &sorts)
                .unwrap(),
            Expr::var("frame:0:arg:1", Sort::BitVec(32))
        );
        assert!(state.read(&Address::symcall(0), &il::Type::Void, &sorts).is_err());
    }

    #[test]
    fn popping_a_frame_forgets_its_slots() {
        let mut state: SymexState<()> = SymexState::new(entry(), il::InstructionLocation::new(0, 0), ());
        state.push_frame(
            entry(),
            il::InstructionLocation::new(0, 0),
            ReturnSlot {
                call: 0,
                constructed: None,
            },
        );
        state.write(&Address::argument(1, 0), Expr::bitvec(3, 32));
        state.write(&Address::argument(0, 0), Expr::bitvec(4, 32));
        state.pop_frame();
        assert_eq!(state.memory().len(), 1);
        assert_eq!(state.frames().len(), 1);
    }
}
