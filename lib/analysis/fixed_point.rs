//! A generic worklist solver for monotone data flow analyses over a `Cfg`.

use crate::analysis::{Cfg, CfgNode};
use crate::Error;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::fmt::Debug;

/// A forward or backward data flow problem.
pub trait FixedPointAnalysis<State: Clone + Debug + PartialEq> {
    /// Given the joined state flowing into `node`, produce the state flowing
    /// out of it. `None` means nothing has flowed in yet.
    fn trans(&self, node: &CfgNode, state: Option<State>) -> Result<State, Error>;

    /// Given two states, join them into one state.
    fn join(&self, state0: State, state1: &State) -> Result<State, Error>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Direction {
    Forward,
    Backward,
}

/// Join the states of `sources`, skipping sources with no state yet.
fn join_states<Analysis, State>(
    analysis: &Analysis,
    states: &FxHashMap<CfgNode, State>,
    sources: Vec<&CfgNode>,
) -> Result<Option<State>, Error>
where
    Analysis: FixedPointAnalysis<State>,
    State: Clone + Debug + PartialEq,
{
    let mut joined: Option<State> = None;
    for source in sources {
        if let Some(state) = states.get(source) {
            joined = Some(match joined {
                Some(joined) => analysis.join(joined, state)?,
                None => state.clone(),
            });
        }
    }
    Ok(joined)
}

fn fixed_point<Analysis, State>(
    analysis: &Analysis,
    cfg: &Cfg,
    direction: Direction,
) -> Result<FxHashMap<CfgNode, State>, Error>
where
    Analysis: FixedPointAnalysis<State>,
    State: Clone + Debug + PartialEq,
{
    let mut states: FxHashMap<CfgNode, State> = FxHashMap::default();
    let mut queue: VecDeque<CfgNode> = VecDeque::new();

    // Seed in pre-order from the head, reversed for backward problems, then
    // anything the head cannot reach.
    let mut order: Vec<CfgNode> = cfg
        .pre_order(cfg.find_head())?
        .into_iter()
        .cloned()
        .collect();
    if direction == Direction::Backward {
        order.reverse();
    }
    for node in cfg.nodes() {
        if !order.contains(node) {
            order.push(node.clone());
        }
    }
    queue.extend(order);

    let mut iterations = 0;
    while let Some(node) = queue.pop_front() {
        iterations += 1;

        let (sources, sinks) = match direction {
            Direction::Forward => (cfg.predecessors(&node), cfg.successors(&node)),
            Direction::Backward => (cfg.successors(&node), cfg.predecessors(&node)),
        };

        let in_state = join_states(analysis, &states, sources)?;
        let out_state = analysis.trans(&node, in_state)?;

        if states.get(&node) == Some(&out_state) {
            continue;
        }

        for sink in sinks {
            if !queue.contains(sink) {
                queue.push_back(sink.clone());
            }
        }

        states.insert(node, out_state);
    }

    debug!("fixed point reached after {} iterations", iterations);

    Ok(states)
}

/// Solve a forward problem. The result maps every node to the state flowing
/// out of it.
pub fn fixed_point_forward<Analysis, State>(
    analysis: &Analysis,
    cfg: &Cfg,
) -> Result<FxHashMap<CfgNode, State>, Error>
where
    Analysis: FixedPointAnalysis<State>,
    State: Clone + Debug + PartialEq,
{
    fixed_point(analysis, cfg, Direction::Forward)
}

/// Solve a backward problem. States flow from successors to predecessors.
pub fn fixed_point_backward<Analysis, State>(
    analysis: &Analysis,
    cfg: &Cfg,
) -> Result<FxHashMap<CfgNode, State>, Error>
where
    Analysis: FixedPointAnalysis<State>,
    State: Clone + Debug + PartialEq,
{
    fixed_point(analysis, cfg, Direction::Backward)
}

/// The state flowing into `node` of a solved forward problem: the join of
/// the out states of its predecessors.
pub fn in_state<Analysis, State>(
    analysis: &Analysis,
    cfg: &Cfg,
    states: &FxHashMap<CfgNode, State>,
    node: &CfgNode,
) -> Result<Option<State>, Error>
where
    Analysis: FixedPointAnalysis<State>,
    State: Clone + Debug + PartialEq,
{
    join_states(analysis, states, cfg.predecessors(node))
}
