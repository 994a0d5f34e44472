//! Dense control flow graph with single-exit normalization

use std::fmt::Write as _;
use std::path::Path;

/// Basic block of a [`ControlFlowGraph`]
///
/// A block carries at most two outgoing edges: the fall-through successor
/// (`next`) and the optional conditional successor (`cond`). Targets are
/// block ids into the owning graph, which keeps ownership entirely inside
/// the graph's arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    id: u32,
    next: Option<u32>,
    cond: Option<u32>,
    offset_start: u64,
    offset_end: u64,
}

impl BasicBlock {
    fn new(id: u32) -> BasicBlock {
        BasicBlock {
            id,
            next: None,
            cond: None,
            offset_start: 0,
            offset_end: 0,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Fall-through successor, `None` for the exit block.
    pub fn next(&self) -> Option<u32> {
        self.next
    }

    /// Conditional successor, `None` when the block does not branch.
    pub fn cond(&self) -> Option<u32> {
        self.cond
    }

    pub fn offset_start(&self) -> u64 {
        self.offset_start
    }

    pub fn offset_end(&self) -> u64 {
        self.offset_end
    }

    fn out_degree(&self) -> u32 {
        self.next.is_some() as u32 + self.cond.is_some() as u32
    }
}

/// Control flow graph of a single function
///
/// Blocks live in a dense arena indexed by id. A freshly constructed graph
/// of `size` blocks is a linear chain `0 -> 1 -> ... -> size-1`; edges are
/// then shaped with [`set_next`](ControlFlowGraph::set_next) /
/// [`set_conditional`](ControlFlowGraph::set_conditional) and their
/// `_null` counterparts. Every mutator is total: out-of-range ids are
/// ignored.
///
/// Call [`finalize`](ControlFlowGraph::finalize) once construction is done
/// and before handing the graph to the reducer.
#[derive(Debug, Clone, Default)]
pub struct ControlFlowGraph {
    blocks: Vec<BasicBlock>,
    edges: u32,
}

impl ControlFlowGraph {
    /// Allocates `size` blocks linked as a fall-through chain.
    pub fn new(size: u32) -> ControlFlowGraph {
        let mut blocks: Vec<BasicBlock> = (0..size).map(BasicBlock::new).collect();
        for block in blocks.iter_mut().take(size.saturating_sub(1) as usize) {
            block.next = Some(block.id + 1);
        }
        ControlFlowGraph {
            blocks,
            edges: size.saturating_sub(1),
        }
    }

    pub fn nodes_no(&self) -> u32 {
        self.blocks.len() as u32
    }

    pub fn edges_no(&self) -> u32 {
        self.edges
    }

    /// Entry block, `None` for an empty graph.
    pub fn root(&self) -> Option<&BasicBlock> {
        self.blocks.first()
    }

    pub fn get_node(&self, id: u32) -> Option<&BasicBlock> {
        self.blocks.get(id as usize)
    }

    /// Blocks in id order.
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter()
    }

    /// Installs the fall-through edge `src -> dst`.
    pub fn set_next(&mut self, src: u32, dst: u32) {
        if (src as usize) < self.blocks.len() && (dst as usize) < self.blocks.len() {
            let slot = &mut self.blocks[src as usize].next;
            self.edges += slot.is_none() as u32;
            *slot = Some(dst);
        }
    }

    /// Clears the fall-through edge of `src`.
    pub fn set_next_null(&mut self, src: u32) {
        if let Some(block) = self.blocks.get_mut(src as usize) {
            self.edges -= block.next.is_some() as u32;
            block.next = None;
        }
    }

    /// Installs the conditional edge `src -> dst`.
    pub fn set_conditional(&mut self, src: u32, dst: u32) {
        if (src as usize) < self.blocks.len() && (dst as usize) < self.blocks.len() {
            let slot = &mut self.blocks[src as usize].cond;
            self.edges += slot.is_none() as u32;
            *slot = Some(dst);
        }
    }

    /// Clears the conditional edge of `src`.
    pub fn set_conditional_null(&mut self, src: u32) {
        if let Some(block) = self.blocks.get_mut(src as usize) {
            self.edges -= block.cond.is_some() as u32;
            block.cond = None;
        }
    }

    /// Records the instruction address range carried by block `id`.
    pub fn set_offsets(&mut self, id: u32, start: u64, end: u64) {
        if let Some(block) = self.blocks.get_mut(id as usize) {
            block.offset_start = start;
            block.offset_end = end;
        }
    }

    /// Depth-first post-order enumeration of reachable block ids.
    ///
    /// The fall-through successor is visited before the conditional one and
    /// a block is emitted after both, so the ordering is deterministic for
    /// a fixed graph.
    pub fn dfst(&self) -> Vec<u32> {
        let mut order = Vec::with_capacity(self.blocks.len());
        if self.blocks.is_empty() {
            return order;
        }
        let mut visited = vec![false; self.blocks.len()];
        visited[0] = true;
        // frame: (block, next edge slot to follow); 0 = next, 1 = cond
        let mut stack: Vec<(u32, u8)> = vec![(0, 0)];
        while let Some((id, slot)) = stack.pop() {
            let block = &self.blocks[id as usize];
            let target = match slot {
                0 => {
                    stack.push((id, 1));
                    block.next
                }
                1 => {
                    stack.push((id, 2));
                    block.cond
                }
                _ => {
                    order.push(id);
                    None
                }
            };
            if let Some(target) = target {
                if !visited[target as usize] {
                    visited[target as usize] = true;
                    stack.push((target, 0));
                }
            }
        }
        order
    }

    /// Normalizes the graph so it satisfies the reducer's preconditions:
    ///
    /// 1. blocks with a conditional successor but no fall-through get the
    ///    two swapped;
    /// 2. a conditional edge equal to the fall-through is dropped;
    /// 3. if more than one block has no successors, a synthetic exit block
    ///    is appended and every former exit falls through to it;
    /// 4. blocks unreachable from the root are removed and the survivors
    ///    are renumbered so ids stay dense.
    ///
    /// Running `finalize` a second time is a no-op.
    pub fn finalize(&mut self) {
        if self.blocks.is_empty() {
            return;
        }

        let mut exits = Vec::new();
        let mut duplicates = 0;
        for block in &mut self.blocks {
            match (block.next, block.cond) {
                (None, None) => exits.push(block.id),
                (None, Some(cond)) => {
                    block.next = Some(cond);
                    block.cond = None;
                }
                (Some(next), Some(cond)) if next == cond => {
                    block.cond = None;
                    duplicates += 1;
                }
                _ => {}
            }
        }
        self.edges -= duplicates;

        if exits.len() > 1 {
            let exit_id = self.blocks.len() as u32;
            self.blocks.push(BasicBlock::new(exit_id));
            for id in exits {
                self.set_next(id, exit_id);
            }
        }

        self.prune_unreachable();
    }

    /// Drops blocks not reachable from the root and renumbers the rest.
    fn prune_unreachable(&mut self) {
        let mut marked = vec![false; self.blocks.len()];
        let mut stack = vec![0u32];
        marked[0] = true;
        while let Some(id) = stack.pop() {
            let block = &self.blocks[id as usize];
            for target in [block.next, block.cond].into_iter().flatten() {
                if !marked[target as usize] {
                    marked[target as usize] = true;
                    stack.push(target);
                }
            }
        }
        if marked.iter().all(|&m| m) {
            return;
        }

        // skipped[i] = pruned blocks with id <= i, giving the renumbering
        let mut skipped = vec![0u32; self.blocks.len()];
        let mut pruned = 0;
        for (id, keep) in marked.iter().enumerate() {
            pruned += !keep as u32;
            skipped[id] = pruned;
        }

        let old_blocks = std::mem::take(&mut self.blocks);
        self.edges = 0;
        for (old_id, mut block) in old_blocks.into_iter().enumerate() {
            if !marked[old_id] {
                continue;
            }
            block.id = old_id as u32 - skipped[old_id];
            // reachable blocks only ever point at reachable blocks
            block.next = block.next.map(|t| t - skipped[t as usize]);
            block.cond = block.cond.map(|t| t - skipped[t as usize]);
            self.edges += block.out_degree();
            self.blocks.push(block);
        }
    }

    /// Graphviz rendering; conditional edges are drawn with an empty
    /// arrowhead.
    pub fn to_dot(&self) -> String {
        let mut dot = String::from("digraph {\n");
        if !self.blocks.is_empty() {
            let mut visited = vec![false; self.blocks.len()];
            visited[0] = true;
            let mut stack = vec![0u32];
            while let Some(id) = stack.pop() {
                let block = &self.blocks[id as usize];
                if let Some(next) = block.next {
                    let _ = writeln!(dot, "{}->{}", id, next);
                    if !visited[next as usize] {
                        visited[next as usize] = true;
                        stack.push(next);
                    }
                }
                if let Some(cond) = block.cond {
                    let _ = writeln!(dot, "{}->{}[arrowhead=\"empty\"];", id, cond);
                    if !visited[cond as usize] {
                        visited[cond as usize] = true;
                        stack.push(cond);
                    }
                }
            }
        }
        dot.push('}');
        dot
    }

    /// Writes the Graphviz rendering to `path`.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, self.to_dot())
    }
}
