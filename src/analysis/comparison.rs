//! Structural clone detection between two reduced trees

use crate::analysis::cfs::ControlFlowStructure;
use fnv::FnvHashSet;

/// Clone query over two reduction trees
///
/// Construction precomputes the structural hash of every node of both
/// structures; [`cloned`](Comparison::cloned) then intersects them. The
/// structures themselves are not retained.
pub struct Comparison {
    hash_a: Vec<u64>,
    hash_b: Vec<u64>,
}

impl Comparison {
    pub fn new(a: &ControlFlowStructure, b: &ControlFlowStructure) -> Comparison {
        Comparison {
            hash_a: a.nodes().map(|n| n.structural_hash()).collect(),
            hash_b: b.nodes().map(|n| n.structural_hash()).collect(),
        }
    }

    /// Looks for a subtree of `a` that is a structural clone of a subtree
    /// of `b` and returns their node ids as `(id_a, id_b)`.
    ///
    /// `b` is scanned root-most first (composites carry higher ids than
    /// anything they contain), so the reported clone is the largest one;
    /// among equal hashes in `a` the smallest id wins. Returns `None` when
    /// either structure is empty or the hash sets do not intersect.
    pub fn cloned(&self) -> Option<(u32, u32)> {
        if self.hash_a.is_empty() || self.hash_b.is_empty() {
            return None;
        }
        let values: FnvHashSet<u64> = self.hash_a.iter().copied().collect();
        for idx_b in (0..self.hash_b.len()).rev() {
            if values.contains(&self.hash_b[idx_b]) {
                let idx_a = self
                    .hash_a
                    .iter()
                    .position(|&hash| hash == self.hash_b[idx_b])?;
                return Some((idx_a as u32, idx_b as u32));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::cfg::ControlFlowGraph;

    fn reduced(cfg: &ControlFlowGraph) -> ControlFlowStructure {
        let mut cfs = ControlFlowStructure::new();
        assert!(cfs.build(cfg));
        cfs
    }

    fn triangle_with_tail() -> ControlFlowGraph {
        // if-then at 1 guarding 2, join 3, straight tail to 4
        let mut cfg = ControlFlowGraph::new(5);
        cfg.set_conditional(1, 3);
        cfg.finalize();
        cfg
    }

    #[test]
    fn test_self_comparison_finds_root() {
        let cfg = triangle_with_tail();
        let cfs = reduced(&cfg);
        let root_id = cfs.nodes_no() - 1;

        let (id_a, id_b) = Comparison::new(&cfs, &cfs).cloned().unwrap();
        assert_eq!(id_b, root_id);
        assert_eq!(id_a, root_id);
    }

    #[test]
    fn test_clone_across_distinct_graphs() {
        let cfg_a = triangle_with_tail();

        // same structure, different layout and offsets
        let mut cfg_b = ControlFlowGraph::new(5);
        cfg_b.set_conditional(1, 3);
        for id in 0..5 {
            cfg_b.set_offsets(id, 0x4000 + u64::from(id) * 0x20, 0x4000 + u64::from(id) * 0x20 + 0x1c);
        }
        cfg_b.finalize();

        let cfs_a = reduced(&cfg_a);
        let cfs_b = reduced(&cfg_b);

        let (id_a, id_b) = Comparison::new(&cfs_a, &cfs_b).cloned().unwrap();
        assert_eq!(id_a, cfs_a.nodes_no() - 1);
        assert_eq!(id_b, cfs_b.nodes_no() - 1);
    }

    #[test]
    fn test_subtree_clone() {
        let cfg_a = triangle_with_tail();

        // a self-loop graph shares no pattern with the triangle beyond
        // bare basic blocks
        let mut cfg_b = ControlFlowGraph::new(3);
        cfg_b.set_conditional(1, 1);
        cfg_b.finalize();

        let cfs_a = reduced(&cfg_a);
        let cfs_b = reduced(&cfg_b);

        let (id_a, id_b) = Comparison::new(&cfs_a, &cfs_b).cloned().unwrap();
        // the largest shared subtree is a single basic block
        let node_b = cfs_b.get_node(id_b).unwrap();
        assert!(node_b.is_basic());
        assert_eq!(id_a, 0); // smallest matching id in a
    }

    #[test]
    fn test_empty_input() {
        let empty = ControlFlowStructure::new();
        let cfg = triangle_with_tail();
        let cfs = reduced(&cfg);

        assert!(Comparison::new(&empty, &cfs).cloned().is_none());
        assert!(Comparison::new(&cfs, &empty).cloned().is_none());
        assert!(Comparison::new(&empty, &empty).cloned().is_none());
    }
}
