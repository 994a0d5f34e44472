//! Control flow structuring: fixed-point reduction of a CFG into a tree of
//! structured regions

use crate::analysis::blocks::{LeafBlock, NestedBlock, StructureBlock};
use crate::analysis::cfg::ControlFlowGraph;
use fnv::{FnvHashMap, FnvHashSet};
use std::fmt::Write as _;
use std::path::Path;
use std::rc::Rc;
use tracing::trace;

/// Reduction of a finalized [`ControlFlowGraph`] into structured regions
///
/// [`build`](ControlFlowStructure::build) deep-copies the graph and then
/// repeatedly rewrites subgraphs matching a structured pattern (sequence,
/// self-loop, if-then, if-else, while, do-while) into composite blocks,
/// until either a single root remains or nothing matches. The input CFG is
/// never modified.
///
/// # Example
/// ```
/// use cfstruct::analysis::{BlockKind, ControlFlowGraph, ControlFlowStructure};
///
/// let mut cfg = ControlFlowGraph::new(5);
/// cfg.finalize();
/// let mut cfs = ControlFlowStructure::new();
/// assert!(cfs.build(&cfg));
/// assert_eq!(cfs.root().unwrap().kind(), BlockKind::Sequence);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ControlFlowStructure {
    // every node ever created, indexed by id: CFG copies first, then
    // composites in creation order
    nodes: Vec<StructureBlock>,
    // top-level nodes surviving the last build; a single entry on success
    forest: Vec<StructureBlock>,
    reduced: bool,
}

impl ControlFlowStructure {
    pub fn new() -> ControlFlowStructure {
        ControlFlowStructure::default()
    }

    /// Runs the reduction. Returns `true` exactly when the graph collapsed
    /// to a single root; on `false` the partially reduced forest is kept
    /// for inspection and rendering.
    ///
    /// The CFG must be finalized first (single exit, dense reachable ids).
    pub fn build(&mut self, cfg: &ControlFlowGraph) -> bool {
        self.nodes.clear();
        self.forest.clear();
        self.reduced = false;
        if cfg.nodes_no() == 0 {
            return false;
        }

        let mut graph = WorkGraph::from_cfg(cfg);
        self.nodes = graph.blocks.values().cloned().collect();
        self.nodes.sort_unstable_by_key(|b| b.id());
        let mut next_id = cfg.nodes_no();

        // every iteration removes at least one node, so this runs at most
        // nodes_no - 1 times
        while graph.blocks.len() > 1 {
            let order = graph.postorder();
            let mut applied = false;
            'scan: for &id in &order {
                for matcher in MATCHERS {
                    if let Some(reduction) = matcher(&graph, id, next_id) {
                        trace!(
                            node = id,
                            composite = next_id,
                            kind = %reduction.block.kind(),
                            "reduction applied"
                        );
                        let composite = graph.apply(reduction);
                        self.nodes.push(composite);
                        next_id += 1;
                        applied = true;
                        break 'scan;
                    }
                }
            }
            if !applied {
                break;
            }
        }

        let mut remaining: Vec<u32> = graph.blocks.keys().copied().collect();
        remaining.sort_unstable();
        self.forest = remaining
            .into_iter()
            .map(|id| graph.blocks[&id].clone())
            .collect();
        self.reduced = self.forest.len() == 1;
        self.reduced
    }

    /// Root of the reduction tree; `None` before a successful build.
    pub fn root(&self) -> Option<&StructureBlock> {
        if self.reduced {
            self.forest.first()
        } else {
            None
        }
    }

    /// Total node count after reduction: CFG copies plus composites.
    pub fn nodes_no(&self) -> u32 {
        self.nodes.len() as u32
    }

    /// Node with id `id`, whether still top-level or absorbed.
    pub fn get_node(&self, id: u32) -> Option<&StructureBlock> {
        self.nodes.get(id as usize)
    }

    /// Every created node in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &StructureBlock> {
        self.nodes.iter()
    }

    /// Graphviz rendering: composites become clusters grouping their
    /// children, edges are those of the CFG the structure was built from.
    /// Passing a different CFG produces an inconsistent picture.
    pub fn to_dot(&self, cfg: &ControlFlowGraph) -> String {
        let mut dot = String::from("digraph {\n");
        for block in &self.forest {
            block.write_dot(&mut dot);
        }
        for block in cfg.blocks() {
            if let Some(next) = block.next() {
                let _ = writeln!(dot, "{}->{}", block.id(), next);
            }
            if let Some(cond) = block.cond() {
                let _ = writeln!(dot, "{}->{}[arrowhead=\"empty\"];", block.id(), cond);
            }
        }
        dot.push('}');
        dot
    }

    /// Writes the Graphviz rendering to `path`.
    pub fn to_file<P: AsRef<Path>>(&self, path: P, cfg: &ControlFlowGraph) -> std::io::Result<()> {
        std::fs::write(path, self.to_dot(cfg))
    }
}

/// Working graph of the reducer: non-owning handles plus edge tables.
///
/// Successor lists keep the fall-through edge first so the post-order is
/// the same one [`ControlFlowGraph::dfst`] produces; predecessor sets make
/// the single-entry checks of the matchers O(1).
struct WorkGraph {
    blocks: FnvHashMap<u32, StructureBlock>,
    succs: FnvHashMap<u32, Vec<u32>>,
    preds: FnvHashMap<u32, FnvHashSet<u32>>,
    root: u32,
}

impl WorkGraph {
    /// Deep-copies a finalized CFG: fresh leaves with the original ids,
    /// edge tables computed in the same pass.
    fn from_cfg(cfg: &ControlFlowGraph) -> WorkGraph {
        let capacity = cfg.nodes_no() as usize;
        let mut blocks = FnvHashMap::with_capacity_and_hasher(capacity, Default::default());
        let mut succs = FnvHashMap::with_capacity_and_hasher(capacity, Default::default());
        let mut preds: FnvHashMap<u32, FnvHashSet<u32>> =
            FnvHashMap::with_capacity_and_hasher(capacity, Default::default());
        for block in cfg.blocks() {
            let leaf = StructureBlock::from(Rc::new(LeafBlock::new(
                block.id(),
                block.offset_start(),
                block.offset_end(),
            )));
            blocks.insert(block.id(), leaf);
            let targets: Vec<u32> = [block.next(), block.cond()].into_iter().flatten().collect();
            preds.entry(block.id()).or_default();
            for &target in &targets {
                preds.entry(target).or_default().insert(block.id());
            }
            succs.insert(block.id(), targets);
        }
        WorkGraph {
            blocks,
            succs,
            preds,
            root: 0,
        }
    }

    fn node(&self, id: u32) -> &StructureBlock {
        &self.blocks[&id]
    }

    fn successors(&self, id: u32) -> &[u32] {
        self.succs.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True when `id` has exactly one predecessor and it is `pred`.
    fn single_pred_is(&self, id: u32, pred: u32) -> bool {
        self.preds
            .get(&id)
            .map_or(false, |set| set.len() == 1 && set.contains(&pred))
    }

    /// Depth-first post-order over the current graph, fall-through edges
    /// first; deterministic for a fixed graph.
    fn postorder(&self) -> Vec<u32> {
        let mut order = Vec::with_capacity(self.blocks.len());
        let mut visited = FnvHashSet::default();
        visited.insert(self.root);
        let mut stack: Vec<(u32, usize)> = vec![(self.root, 0)];
        while let Some((id, slot)) = stack.pop() {
            let succs = self.successors(id);
            if slot < succs.len() {
                stack.push((id, slot + 1));
                let target = succs[slot];
                if visited.insert(target) {
                    stack.push((target, 0));
                }
            } else {
                order.push(id);
            }
        }
        order
    }

    /// Replaces the matched subgraph with its composite: predecessors of
    /// the pattern entry are rewired onto the composite, interior nodes
    /// vanish from every table, and the composite gets the pattern's single
    /// successor.
    fn apply(&mut self, reduction: Reduction) -> StructureBlock {
        let Reduction {
            block,
            absorbed,
            entry,
            successor,
        } = reduction;
        let new_id = block.id();
        let composite = StructureBlock::from(Rc::new(block));
        let absorbed_set: FnvHashSet<u32> = absorbed.iter().copied().collect();

        let mut new_preds = FnvHashSet::default();
        if let Some(entry_preds) = self.preds.remove(&entry) {
            for pred in entry_preds {
                if absorbed_set.contains(&pred) {
                    continue;
                }
                if let Some(slots) = self.succs.get_mut(&pred) {
                    for slot in slots.iter_mut() {
                        if *slot == entry {
                            *slot = new_id;
                        }
                    }
                }
                new_preds.insert(pred);
            }
        }

        for id in &absorbed {
            if let Some(targets) = self.succs.remove(id) {
                for target in targets {
                    if let Some(preds) = self.preds.get_mut(&target) {
                        preds.remove(id);
                    }
                }
            }
            self.blocks.remove(id);
            self.preds.remove(id);
        }

        self.blocks.insert(new_id, composite.clone());
        self.preds.insert(new_id, new_preds);
        if let Some(successor) = successor {
            self.preds.entry(successor).or_default().insert(new_id);
        }
        self.succs
            .insert(new_id, successor.into_iter().collect());

        if absorbed_set.contains(&self.root) {
            self.root = new_id;
        }
        composite
    }
}

/// One successful pattern match, ready to be applied.
struct Reduction {
    /// The composite, already holding its children.
    block: NestedBlock,
    /// Every node consumed by the composite.
    absorbed: Vec<u32>,
    /// Pattern entry: its external predecessors become the composite's.
    entry: u32,
    /// The single outgoing edge of the composite.
    successor: Option<u32>,
}

type Matcher = fn(&WorkGraph, u32, u32) -> Option<Reduction>;

// tie-breaking order: first matching pattern at the first post-order node
const MATCHERS: [Matcher; 6] = [
    match_sequence,
    match_self_loop,
    match_if_then,
    match_if_else,
    match_while,
    match_do_while,
];

/// `cur` has a single edge to `next`, and `next` is entered only from
/// `cur`. `next` must not branch (the sequence keeps a single successor)
/// and must not point back at `cur`.
fn match_sequence(graph: &WorkGraph, cur: u32, new_id: u32) -> Option<Reduction> {
    let succs = graph.successors(cur);
    if succs.len() != 1 {
        return None;
    }
    let next = succs[0];
    if next == cur || !graph.single_pred_is(next, cur) {
        return None;
    }
    let next_succs = graph.successors(next);
    if next_succs.len() > 1 || next_succs.first() == Some(&cur) {
        return None;
    }
    let block = NestedBlock::sequence(new_id, graph.node(cur).clone(), graph.node(next).clone());
    Some(Reduction {
        block,
        absorbed: vec![cur, next],
        entry: cur,
        successor: next_succs.first().copied(),
    })
}

/// A basic block with one edge to itself and one escape edge.
fn match_self_loop(graph: &WorkGraph, cur: u32, new_id: u32) -> Option<Reduction> {
    let succs = graph.successors(cur);
    if succs.len() != 2 || !succs.contains(&cur) {
        return None;
    }
    let node = graph.node(cur);
    if !node.is_basic() {
        return None;
    }
    let exit = if succs[0] == cur { succs[1] } else { succs[0] };
    let block = NestedBlock::self_loop(new_id, node.clone());
    Some(Reduction {
        block,
        absorbed: vec![cur],
        entry: cur,
        successor: Some(exit),
    })
}

/// Walks predecessor edges upward from `head` collecting cascaded
/// short-circuit condition heads: each candidate must be the sole
/// predecessor of the current chain top, carry exactly two outgoing edges,
/// and point at both the chain top and `cont`. Returned innermost-first.
fn ascend_chain(graph: &WorkGraph, head: u32, cont: u32, taken: &[u32]) -> Vec<u32> {
    let mut chain = Vec::new();
    let mut seen: FnvHashSet<u32> = taken.iter().copied().collect();
    seen.insert(head);
    seen.insert(cont);
    let mut current = head;
    loop {
        let candidate = match graph.preds.get(&current) {
            Some(set) if set.len() == 1 => match set.iter().next() {
                Some(&pred) => pred,
                None => break,
            },
            _ => break,
        };
        if seen.contains(&candidate) {
            break;
        }
        let succs = graph.successors(candidate);
        // current and cont are always distinct, so this pins both edges
        if succs.len() != 2 || !succs.contains(&current) || !succs.contains(&cont) {
            break;
        }
        seen.insert(candidate);
        chain.push(candidate);
        current = candidate;
    }
    chain
}

/// A branch where one successor (`then`) is private to the head and flows
/// into the other successor (the join). Cascaded condition heads above the
/// head are absorbed into the same composite.
fn match_if_then(graph: &WorkGraph, cur: u32, new_id: u32) -> Option<Reduction> {
    let succs = graph.successors(cur);
    if succs.len() != 2 || succs.contains(&cur) {
        return None;
    }
    // the fall-through successor is preferred when both would qualify
    for (then, join) in [(succs[0], succs[1]), (succs[1], succs[0])] {
        let then_succs = graph.successors(then);
        if graph.single_pred_is(then, cur) && then_succs.len() == 1 && then_succs[0] == join {
            let chain_ids = ascend_chain(graph, cur, join, &[then]);
            let chain: Vec<StructureBlock> = chain_ids
                .iter()
                .rev()
                .map(|&id| graph.node(id).clone())
                .collect();
            let entry = chain_ids.last().copied().unwrap_or(cur);
            let mut absorbed = vec![cur, then];
            absorbed.extend(&chain_ids);
            let block = NestedBlock::if_then(
                new_id,
                graph.node(cur).clone(),
                graph.node(then).clone(),
                chain,
            );
            return Some(Reduction {
                block,
                absorbed,
                entry,
                successor: Some(join),
            });
        }
    }
    None
}

/// A branch whose two successors each have a single edge converging on the
/// same join. The then branch must be private to the head; the else branch
/// may additionally be targeted by chained condition heads, and every one
/// of its predecessors must belong to the absorbed pattern.
fn match_if_else(graph: &WorkGraph, cur: u32, new_id: u32) -> Option<Reduction> {
    let succs = graph.successors(cur);
    if succs.len() != 2 || succs.contains(&cur) {
        return None;
    }
    let (mut then, mut els) = (succs[0], succs[1]);
    if !graph.single_pred_is(then, cur) {
        if graph.single_pred_is(els, cur) {
            std::mem::swap(&mut then, &mut els);
        } else {
            return None;
        }
    }
    let then_succs = graph.successors(then);
    let els_succs = graph.successors(els);
    if then_succs.len() != 1 || els_succs.len() != 1 || then_succs[0] != els_succs[0] {
        return None;
    }
    let join = then_succs[0];
    if join == cur || join == then || join == els {
        return None;
    }
    let chain_ids = ascend_chain(graph, cur, els, &[then, els]);
    let pattern_member = |id: u32| id == cur || chain_ids.contains(&id);
    if !graph
        .preds
        .get(&els)
        .map_or(false, |set| set.iter().all(|&p| pattern_member(p)))
    {
        return None;
    }
    let chain: Vec<StructureBlock> = chain_ids
        .iter()
        .rev()
        .map(|&id| graph.node(id).clone())
        .collect();
    let entry = chain_ids.last().copied().unwrap_or(cur);
    let mut absorbed = vec![cur, then, els];
    absorbed.extend(&chain_ids);
    let block = NestedBlock::if_else(
        new_id,
        graph.node(cur).clone(),
        graph.node(then).clone(),
        graph.node(els).clone(),
        chain,
    );
    Some(Reduction {
        block,
        absorbed,
        entry,
        successor: Some(join),
    })
}

/// Pre-test loop: one successor of the head is a body entered only from
/// the head and pointing only back at it; the other successor is the exit.
fn match_while(graph: &WorkGraph, cur: u32, new_id: u32) -> Option<Reduction> {
    let succs = graph.successors(cur);
    if succs.len() != 2 || succs.contains(&cur) {
        return None;
    }
    for (body, exit) in [(succs[0], succs[1]), (succs[1], succs[0])] {
        let body_succs = graph.successors(body);
        if graph.single_pred_is(body, cur) && body_succs.len() == 1 && body_succs[0] == cur {
            let block =
                NestedBlock::while_loop(new_id, graph.node(cur).clone(), graph.node(body).clone());
            return Some(Reduction {
                block,
                absorbed: vec![cur, body],
                entry: cur,
                successor: Some(exit),
            });
        }
    }
    None
}

/// Post-test loop: the head's sole successor is a two-exit tail entered
/// only from the head, with one edge back to the head.
fn match_do_while(graph: &WorkGraph, cur: u32, new_id: u32) -> Option<Reduction> {
    let succs = graph.successors(cur);
    if succs.len() != 1 {
        return None;
    }
    let tail = succs[0];
    if tail == cur || !graph.single_pred_is(tail, cur) {
        return None;
    }
    let tail_succs = graph.successors(tail);
    if tail_succs.len() != 2 || !tail_succs.contains(&cur) {
        return None;
    }
    let exit = if tail_succs[0] == cur {
        tail_succs[1]
    } else {
        tail_succs[0]
    };
    let block = NestedBlock::do_while(new_id, graph.node(cur).clone(), graph.node(tail).clone());
    Some(Reduction {
        block,
        absorbed: vec![cur, tail],
        entry: cur,
        successor: Some(exit),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::blocks::BlockKind;

    fn child_kinds(block: &StructureBlock) -> Vec<BlockKind> {
        block.children().iter().map(|c| c.kind()).collect()
    }

    #[test]
    fn test_root_is_none_before_build() {
        let cfs = ControlFlowStructure::new();
        assert!(cfs.root().is_none());
        assert_eq!(cfs.nodes_no(), 0);
    }

    #[test]
    fn test_empty_graph_does_not_reduce() {
        let mut cfg = ControlFlowGraph::new(0);
        cfg.finalize();
        let mut cfs = ControlFlowStructure::new();
        assert!(!cfs.build(&cfg));
        assert!(cfs.root().is_none());
    }

    #[test]
    fn test_single_block_is_already_reduced() {
        let mut cfg = ControlFlowGraph::new(1);
        cfg.finalize();
        let mut cfs = ControlFlowStructure::new();
        assert!(cfs.build(&cfg));
        let root = cfs.root().unwrap();
        assert_eq!(root.kind(), BlockKind::Basic);
        assert_eq!(cfs.nodes_no(), 1);
    }

    #[test]
    fn test_linear_chain_becomes_sequence() {
        // 0 -> 1 -> 2 -> 3 -> 4
        let mut cfg = ControlFlowGraph::new(5);
        cfg.finalize();

        let mut cfs = ControlFlowStructure::new();
        assert!(cfs.build(&cfg));

        let root = cfs.root().unwrap();
        assert_eq!(root.kind(), BlockKind::Sequence);
        assert_eq!(root.len(), 5);
        let ids: Vec<_> = root.children().iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_self_loop() {
        // 0 -> 1 -> 2 with a conditional back-edge 1 -> 1
        let mut cfg = ControlFlowGraph::new(3);
        cfg.set_conditional(1, 1);
        cfg.finalize();

        let mut cfs = ControlFlowStructure::new();
        assert!(cfs.build(&cfg));

        let root = cfs.root().unwrap();
        assert_eq!(root.kind(), BlockKind::Sequence);
        assert_eq!(
            child_kinds(root),
            vec![BlockKind::Basic, BlockKind::SelfLoop, BlockKind::Basic]
        );
        let looped = &root.children()[1];
        assert_eq!(looped.children()[0].id(), 1);
        assert_eq!(cfs.nodes_no(), 6);
    }

    #[test]
    fn test_self_loop_on_fall_through_edge() {
        // the back-edge sits in the fall-through slot instead
        let mut cfg = ControlFlowGraph::new(3);
        cfg.set_next(1, 1);
        cfg.set_conditional(1, 2);
        cfg.finalize();

        let mut cfs = ControlFlowStructure::new();
        assert!(cfs.build(&cfg));
        assert_eq!(
            child_kinds(cfs.root().unwrap()),
            vec![BlockKind::Basic, BlockKind::SelfLoop, BlockKind::Basic]
        );
    }

    #[test]
    fn test_if_else_diamond() {
        // 0 branches to 1 and 2, both rejoin at 3
        let mut cfg = ControlFlowGraph::new(4);
        cfg.set_conditional(0, 2);
        cfg.set_next(1, 3);
        cfg.finalize();

        let mut cfs = ControlFlowStructure::new();
        assert!(cfs.build(&cfg));

        let root = cfs.root().unwrap();
        assert_eq!(root.kind(), BlockKind::Sequence);
        assert_eq!(child_kinds(root), vec![BlockKind::IfElse, BlockKind::Basic]);
        let if_else = &root.children()[0];
        let ids: Vec<_> = if_else.children().iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_if_then_triangle() {
        // 0 -> 1 (fall) and 0 -> 2 (cond); 1 -> 2
        let mut cfg = ControlFlowGraph::new(3);
        cfg.set_conditional(0, 2);
        cfg.finalize();

        let mut cfs = ControlFlowStructure::new();
        assert!(cfs.build(&cfg));

        let root = cfs.root().unwrap();
        assert_eq!(root.kind(), BlockKind::Sequence);
        assert_eq!(child_kinds(root), vec![BlockKind::IfThen, BlockKind::Basic]);
        let if_then = &root.children()[0];
        assert_eq!(if_then.children()[0].id(), 0);
        assert_eq!(if_then.children()[1].id(), 1);
        assert_eq!(root.children()[1].id(), 2);
    }

    #[test]
    fn test_while_loop() {
        // 1 tests: exits to 2 or runs body 3, which returns to 1
        let mut cfg = ControlFlowGraph::new(4);
        cfg.set_next_null(2);
        cfg.set_conditional(1, 3);
        cfg.set_next(3, 1);
        cfg.finalize();

        let mut cfs = ControlFlowStructure::new();
        assert!(cfs.build(&cfg));

        let root = cfs.root().unwrap();
        assert_eq!(root.kind(), BlockKind::Sequence);
        assert_eq!(
            child_kinds(root),
            vec![BlockKind::Basic, BlockKind::While, BlockKind::Basic]
        );
        let while_block = &root.children()[1];
        assert_eq!(while_block.children()[0].id(), 1);
        assert_eq!(while_block.children()[1].id(), 3);
    }

    #[test]
    fn test_do_while_loop() {
        // body 1 runs, tail 2 tests and either loops to 1 or exits to 3
        let mut cfg = ControlFlowGraph::new(4);
        cfg.set_conditional(2, 1);
        cfg.finalize();

        let mut cfs = ControlFlowStructure::new();
        assert!(cfs.build(&cfg));

        let root = cfs.root().unwrap();
        assert_eq!(
            child_kinds(root),
            vec![BlockKind::Basic, BlockKind::DoWhile, BlockKind::Basic]
        );
        let do_while = &root.children()[1];
        assert_eq!(do_while.children()[0].id(), 1);
        assert_eq!(do_while.children()[1].id(), 2);
    }

    #[test]
    fn test_if_then_chain() {
        // short-circuit `a && b`: 0 and 1 both bail to the join 3,
        // 2 is the taken branch
        let mut cfg = ControlFlowGraph::new(4);
        cfg.set_conditional(0, 3);
        cfg.set_conditional(1, 3);
        cfg.finalize();

        let mut cfs = ControlFlowStructure::new();
        assert!(cfs.build(&cfg));

        let root = cfs.root().unwrap();
        assert_eq!(child_kinds(root), vec![BlockKind::IfThen, BlockKind::Basic]);
        let if_then = &root.children()[0];
        // [head, then, chained head]
        assert_eq!(if_then.len(), 3);
        assert_eq!(if_then.children()[0].id(), 1);
        assert_eq!(if_then.children()[1].id(), 2);
        assert_eq!(if_then.children()[2].id(), 0);
    }

    #[test]
    fn test_if_else_chain() {
        // `a && b` guarding then-block 2 against else-block 3
        let mut cfg = ControlFlowGraph::new(5);
        cfg.set_conditional(0, 3);
        cfg.set_conditional(1, 3);
        cfg.set_next(2, 4);
        cfg.finalize();

        let mut cfs = ControlFlowStructure::new();
        assert!(cfs.build(&cfg));

        let root = cfs.root().unwrap();
        assert_eq!(child_kinds(root), vec![BlockKind::IfElse, BlockKind::Basic]);
        let if_else = &root.children()[0];
        // [head, then, else, chained head]
        assert_eq!(if_else.len(), 4);
        assert_eq!(if_else.children()[0].id(), 1);
        assert_eq!(if_else.children()[1].id(), 2);
        assert_eq!(if_else.children()[2].id(), 3);
        assert_eq!(if_else.children()[3].id(), 0);
    }

    #[test]
    fn test_loop_nested_in_branch_arm() {
        // 0 branches to a self-looping arm 1 and a plain arm 2, join 3
        let mut cfg = ControlFlowGraph::new(4);
        cfg.set_conditional(0, 2);
        cfg.set_next(1, 3);
        cfg.set_conditional(1, 1);
        cfg.finalize();

        let mut cfs = ControlFlowStructure::new();
        assert!(cfs.build(&cfg));

        let root = cfs.root().unwrap();
        assert_eq!(child_kinds(root), vec![BlockKind::IfElse, BlockKind::Basic]);
        let if_else = &root.children()[0];
        assert_eq!(if_else.children()[0].id(), 0);
        assert_eq!(if_else.children()[1].kind(), BlockKind::SelfLoop);
        assert_eq!(if_else.children()[2].id(), 2);
    }

    #[test]
    fn test_do_while_wrapping_if_else() {
        // diamond 1/{2,3}/4 re-entered from 4: do { if-else } while
        let mut cfg = ControlFlowGraph::new(6);
        cfg.set_conditional(1, 3);
        cfg.set_next(2, 4);
        cfg.set_conditional(4, 1);
        cfg.finalize();

        let mut cfs = ControlFlowStructure::new();
        assert!(cfs.build(&cfg));

        let root = cfs.root().unwrap();
        assert_eq!(
            child_kinds(root),
            vec![BlockKind::Basic, BlockKind::DoWhile, BlockKind::Basic]
        );
        let do_while = &root.children()[1];
        assert_eq!(do_while.children()[0].kind(), BlockKind::IfElse);
        assert_eq!(do_while.children()[1].id(), 4);
    }

    #[test]
    fn test_irreducible_graph() {
        // loop {1, 2} entered both at 1 (from 0) and at 2 (from 0)
        let mut cfg = ControlFlowGraph::new(4);
        cfg.set_conditional(0, 2);
        cfg.set_conditional(2, 1);
        cfg.finalize();

        let mut cfs = ControlFlowStructure::new();
        assert!(!cfs.build(&cfg));
        assert!(cfs.root().is_none());

        // the residual is still renderable
        let dot = cfs.to_dot(&cfg);
        assert!(dot.starts_with("digraph {\n"));
        assert!(dot.ends_with('}'));
        assert!(dot.contains("0->1"));
        assert!(dot.contains("2->1[arrowhead=\"empty\"];"));
    }

    #[test]
    fn test_reduction_preserves_leaves() {
        let mut cfg = ControlFlowGraph::new(6);
        cfg.set_conditional(1, 3);
        cfg.set_next(2, 4);
        cfg.set_conditional(4, 1);
        cfg.finalize();

        let mut cfs = ControlFlowStructure::new();
        cfs.build(&cfg);

        // the leaves of the reduction tree are exactly the CFG blocks
        let mut leaf_ids: Vec<u32> = cfs
            .nodes()
            .filter(|n| n.is_basic())
            .map(|n| n.id())
            .collect();
        leaf_ids.sort_unstable();
        let cfg_ids: Vec<u32> = cfg.blocks().map(|b| b.id()).collect();
        assert_eq!(leaf_ids, cfg_ids);
    }

    #[test]
    fn test_composite_ids_are_dense() {
        let mut cfg = ControlFlowGraph::new(5);
        cfg.finalize();
        let mut cfs = ControlFlowStructure::new();
        assert!(cfs.build(&cfg));

        for (index, node) in cfs.nodes().enumerate() {
            assert_eq!(node.id() as usize, index);
        }
        assert_eq!(cfs.get_node(cfs.nodes_no() - 1).unwrap().id(), cfs.nodes_no() - 1);
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let mut cfg = ControlFlowGraph::new(4);
        cfg.set_conditional(0, 2);
        cfg.set_next(1, 3);
        cfg.finalize();

        let mut cfs = ControlFlowStructure::new();
        assert!(cfs.build(&cfg));
        let first = cfs.root().unwrap().structural_hash();
        let first_nodes = cfs.nodes_no();
        assert!(cfs.build(&cfg));
        assert_eq!(cfs.root().unwrap().structural_hash(), first);
        assert_eq!(cfs.nodes_no(), first_nodes);
    }

    #[test]
    fn test_cluster_rendering() {
        let mut cfg = ControlFlowGraph::new(3);
        cfg.set_conditional(1, 1);
        cfg.finalize();

        let mut cfs = ControlFlowStructure::new();
        assert!(cfs.build(&cfg));

        let dot = cfs.to_dot(&cfg);
        assert!(dot.contains("subgraph cluster_"));
        assert!(dot.contains("label=\"self-loop\";"));
        assert!(dot.contains("label=\"sequence\";"));
        assert!(dot.contains("1->1[arrowhead=\"empty\"];"));
    }

    #[test]
    fn test_structural_hash_invariant_under_renumbering() {
        // same shape, blocks laid out in a different order
        let mut a = ControlFlowGraph::new(3);
        a.set_conditional(0, 2);
        a.finalize();

        // 0 -> 2 (fall), 0 -> 1 (cond), 2 -> 1: the triangle again with
        // the roles of 1 and 2 swapped
        let mut b = ControlFlowGraph::new(3);
        b.set_next(0, 2);
        b.set_conditional(0, 1);
        b.set_next(2, 1);
        b.set_next_null(1);
        b.finalize();

        let mut cfs_a = ControlFlowStructure::new();
        let mut cfs_b = ControlFlowStructure::new();
        assert!(cfs_a.build(&a));
        assert!(cfs_b.build(&b));
        assert_eq!(
            cfs_a.root().unwrap().structural_hash(),
            cfs_b.root().unwrap().structural_hash()
        );
    }
}
