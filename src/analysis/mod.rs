//! Analysis core: CFG construction, structuring, clone comparison

pub mod blocks;
pub mod cfg;
pub mod cfs;
pub mod comparison;

pub use blocks::{BlockKind, LeafBlock, NestedBlock, StructureBlock};
pub use cfg::{BasicBlock, ControlFlowGraph};
pub use cfs::ControlFlowStructure;
pub use comparison::Comparison;

use crate::arch::{Architecture, JumpKind};
use crate::disassembler::Statement;
use anyhow::{Context, Result};
use fnv::{FnvHashMap, FnvHashSet};
use tracing::debug;

/// Statement list of a single function, ready for CFG construction
///
/// Wraps the statements of one disassembled function with an offset index
/// and derives the control flow graph from them given an architecture's
/// jump classification.
pub struct FunctionAnalysis {
    statements: Vec<Statement>,
    by_offset: FnvHashMap<u64, usize>,
}

impl FunctionAnalysis {
    pub fn new(statements: Vec<Statement>) -> FunctionAnalysis {
        let by_offset = statements
            .iter()
            .enumerate()
            .map(|(index, stmt)| (stmt.offset(), index))
            .collect();
        FunctionAnalysis {
            statements,
            by_offset,
        }
    }

    /// Parses a textual function listing.
    ///
    /// The first line is skipped (it carries the function name); every
    /// following line is `<offset> <instruction>` with the offset in
    /// decimal or `0x`-prefixed hexadecimal form.
    pub fn from_listing(listing: &str) -> Result<FunctionAnalysis> {
        let mut statements = Vec::new();
        for line in listing.lines().skip(1) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (offset_str, instruction) = line
                .split_once(' ')
                .with_context(|| format!("malformed listing line: {line:?}"))?;
            let offset = parse_int(offset_str)
                .with_context(|| format!("bad statement offset: {offset_str:?}"))?;
            statements.push(Statement::new(offset, instruction));
        }
        Ok(FunctionAnalysis::new(statements))
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Statement at `index`, in listing order.
    pub fn statement(&self, index: usize) -> Option<&Statement> {
        self.statements.get(index)
    }

    /// Statement located at instruction offset `offset`.
    pub fn at_offset(&self, offset: u64) -> Option<&Statement> {
        self.by_offset
            .get(&offset)
            .and_then(|&index| self.statements.get(index))
    }

    /// Derives the finalized control flow graph of this function.
    ///
    /// Block boundaries are the entry statement, every in-function jump
    /// target and every statement following a jump or return; edges follow
    /// the architecture's classification of the closing statement of each
    /// block. Jumps out of the function (tail calls, indirect targets) end
    /// their block like a return does.
    pub fn build_cfg(&self, arch: &dyn Architecture) -> ControlFlowGraph {
        if self.statements.is_empty() {
            return ControlFlowGraph::new(0);
        }
        let kinds: Vec<JumpKind> = self
            .statements
            .iter()
            .map(|stmt| arch.jump_kind(stmt.mnemonic()))
            .collect();

        // block leaders: function entry, jump targets, post-jump statements
        let mut leaders: FnvHashSet<u64> = FnvHashSet::default();
        leaders.insert(self.statements[0].offset());
        for (index, stmt) in self.statements.iter().enumerate() {
            let kind = kinds[index];
            if kind.is_jump() {
                if let Some(target) = jump_target(stmt) {
                    if self.by_offset.contains_key(&target) {
                        leaders.insert(target);
                    }
                }
            }
            if kind.is_jump() || kind.is_return() {
                if let Some(following) = self.statements.get(index + 1) {
                    leaders.insert(following.offset());
                }
            }
        }

        // group statements into blocks, in listing order
        let mut block_of: FnvHashMap<u64, u32> = FnvHashMap::default();
        // (start offset, end offset, index of the closing statement)
        let mut blocks: Vec<(u64, u64, usize)> = Vec::new();
        for (index, stmt) in self.statements.iter().enumerate() {
            if leaders.contains(&stmt.offset()) {
                block_of.insert(stmt.offset(), blocks.len() as u32);
                blocks.push((stmt.offset(), stmt.offset(), index));
            } else if let Some(last) = blocks.last_mut() {
                last.1 = stmt.offset();
                last.2 = index;
            }
        }

        let mut cfg = ControlFlowGraph::new(blocks.len() as u32);
        for (id, &(start, end, closing)) in blocks.iter().enumerate() {
            let id = id as u32;
            cfg.set_offsets(id, start, end);
            let target = jump_target(&self.statements[closing])
                .and_then(|offset| block_of.get(&offset).copied());
            match kinds[closing] {
                JumpKind::RetUnconditional => cfg.set_next_null(id),
                JumpKind::Unconditional => match target {
                    Some(target) => cfg.set_next(id, target),
                    None => cfg.set_next_null(id),
                },
                JumpKind::Conditional => {
                    // the fall-through edge to the following block is
                    // already in place
                    if let Some(target) = target {
                        cfg.set_conditional(id, target);
                    }
                }
                // a conditional return keeps only its fall-through edge
                JumpKind::RetConditional | JumpKind::None => {}
            }
        }
        debug!(
            statements = self.statements.len(),
            blocks = cfg.nodes_no(),
            "control flow graph built"
        );
        cfg.finalize();
        cfg
    }
}

/// Parses a decimal or `0x`-prefixed hexadecimal integer.
fn parse_int(token: &str) -> Option<u64> {
    let token = token.trim();
    if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        token.parse().ok()
    }
}

/// Direct jump target of a statement, when its first argument is a plain
/// address. Register and memory operands yield `None`.
fn jump_target(stmt: &Statement) -> Option<u64> {
    parse_int(stmt.args().split_whitespace().next()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::ArchX86;

    const DIAMOND: &str = "\
fn_choose
0x610 push rbp
0x611 test edi, edi
0x613 je 0x61c
0x615 mov eax, 1
0x61a jmp 0x621
0x61c mov eax, 2
0x621 pop rbp
0x622 ret";

    #[test]
    fn test_listing_parsing() {
        let analysis = FunctionAnalysis::from_listing(DIAMOND).unwrap();
        assert_eq!(analysis.len(), 8);
        assert_eq!(analysis.statement(0).unwrap().mnemonic(), "push");
        assert_eq!(analysis.at_offset(0x61c).unwrap().args(), "eax, 2");
        assert!(analysis.at_offset(0x999).is_none());
    }

    #[test]
    fn test_listing_rejects_garbage() {
        assert!(FunctionAnalysis::from_listing("name\nnot-a-number nop").is_err());
        assert!(FunctionAnalysis::from_listing("name\n0x10").is_err());
    }

    #[test]
    fn test_empty_listing() {
        let analysis = FunctionAnalysis::from_listing("only_a_name").unwrap();
        assert!(analysis.is_empty());
        assert_eq!(analysis.build_cfg(&ArchX86).nodes_no(), 0);
    }

    #[test]
    fn test_build_cfg_diamond() {
        let analysis = FunctionAnalysis::from_listing(DIAMOND).unwrap();
        let cfg = analysis.build_cfg(&ArchX86);

        // entry, two branch arms, join
        assert_eq!(cfg.nodes_no(), 4);
        assert_eq!(cfg.edges_no(), 4);
        let entry = cfg.root().unwrap();
        assert_eq!(entry.next(), Some(1));
        assert_eq!(entry.cond(), Some(2));
        assert_eq!(cfg.get_node(1).unwrap().next(), Some(3));
        assert_eq!(cfg.get_node(2).unwrap().next(), Some(3));
        assert_eq!(entry.offset_start(), 0x610);
        assert_eq!(entry.offset_end(), 0x613);
    }

    #[test]
    fn test_build_cfg_straight_line() {
        let listing = "f\n0x0 push rbp\n0x1 mov eax, 0\n0x6 pop rbp\n0x7 ret";
        let analysis = FunctionAnalysis::from_listing(listing).unwrap();
        let cfg = analysis.build_cfg(&ArchX86);
        assert_eq!(cfg.nodes_no(), 1);
        assert_eq!(cfg.edges_no(), 0);
    }

    #[test]
    fn test_build_cfg_loop() {
        // dec/jne back-edge over the loop body
        let listing = "\
fn_count
0x100 mov ecx, 10
0x105 add eax, ecx
0x107 dec ecx
0x109 jne 0x105
0x10b ret";
        let analysis = FunctionAnalysis::from_listing(listing).unwrap();
        let cfg = analysis.build_cfg(&ArchX86);

        assert_eq!(cfg.nodes_no(), 3);
        let body = cfg.get_node(1).unwrap();
        assert_eq!(body.next(), Some(2));
        assert_eq!(body.cond(), Some(1));
    }

    #[test]
    fn test_jump_out_of_function_ends_block() {
        // tail call: the jump leaves the function, so its block exits
        let listing = "\
fn_tail
0x10 test edi, edi
0x12 je 0x20
0x14 jmp 0x9999
0x20 ret";
        let analysis = FunctionAnalysis::from_listing(listing).unwrap();
        let cfg = analysis.build_cfg(&ArchX86);

        // two exits are coerced into a synthetic one by finalize
        let exits = cfg
            .blocks()
            .filter(|b| b.next().is_none() && b.cond().is_none())
            .count();
        assert_eq!(exits, 1);
    }
}
