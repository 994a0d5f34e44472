//! Block taxonomy for reduced control flow and the structural hash

use fnv::FnvHasher;
use std::fmt;
use std::hash::Hasher;
use std::rc::Rc;

/// Classification of a node in a reduction tree
///
/// `Basic` is the only leaf variant; every other variant is a composite
/// synthesized by the reducer and carries exactly one outgoing edge in the
/// working graph, which is what makes reductions compose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// Straight-line instruction range with at most two successors
    Basic,
    /// Linear chain of blocks; nested sequences are flattened at build time
    Sequence,
    /// Conditional where one branch falls directly to the join
    IfThen,
    /// Conditional with two branches converging on the same join
    IfElse,
    /// Basic block whose conditional edge targets itself
    SelfLoop,
    /// Pre-test loop: head tests, body runs, back-edge to head
    While,
    /// Post-test loop: tail tests, back-edge to head
    DoWhile,
}

impl BlockKind {
    /// 8-bit variant tag fed to the structural hash
    pub fn tag(self) -> u8 {
        match self {
            BlockKind::Basic => 0,
            BlockKind::Sequence => 1,
            BlockKind::IfThen => 2,
            BlockKind::IfElse => 3,
            BlockKind::SelfLoop => 4,
            BlockKind::While => 5,
            BlockKind::DoWhile => 6,
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BlockKind::Basic => "basic",
            BlockKind::Sequence => "sequence",
            BlockKind::IfThen => "if-then",
            BlockKind::IfElse => "if-else",
            BlockKind::SelfLoop => "self-loop",
            BlockKind::While => "while",
            BlockKind::DoWhile => "do-while",
        };
        write!(f, "{}", name)
    }
}

/// Leaf of a reduction tree: a copy of one CFG basic block
///
/// Leaves are created by the reducer's deep-copy step and never mutated
/// afterwards. The offsets are carried for presentation only; they do not
/// participate in the structural hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafBlock {
    id: u32,
    offset_start: u64,
    offset_end: u64,
}

impl LeafBlock {
    pub fn new(id: u32, offset_start: u64, offset_end: u64) -> LeafBlock {
        LeafBlock {
            id,
            offset_start,
            offset_end,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn offset_start(&self) -> u64 {
        self.offset_start
    }

    pub fn offset_end(&self) -> u64 {
        self.offset_end
    }
}

/// Composite node of a reduction tree
///
/// Children are stored in the order fixed by the variant:
/// - sequence: components first to last
/// - if-then: `[head, then, chained heads top-down...]`
/// - if-else: `[head, then, else, chained heads top-down...]`
/// - self-loop: `[body]`
/// - while: `[head, body]`
/// - do-while: `[head, tail]`
#[derive(Debug, Clone)]
pub struct NestedBlock {
    id: u32,
    kind: BlockKind,
    children: Vec<StructureBlock>,
}

impl NestedBlock {
    /// Builds a sequence from two operands, splicing in the components of
    /// any operand that is itself a sequence so nesting never accumulates.
    pub fn sequence(id: u32, first: StructureBlock, second: StructureBlock) -> NestedBlock {
        let mut children = Vec::new();
        for operand in [first, second] {
            match operand {
                StructureBlock::Nested(nested) if nested.kind == BlockKind::Sequence => {
                    children.extend(nested.children.iter().cloned());
                }
                other => children.push(other),
            }
        }
        NestedBlock {
            id,
            kind: BlockKind::Sequence,
            children,
        }
    }

    /// Conditional with a single taken branch; `chain` holds any cascaded
    /// short-circuit heads in their natural top-down order.
    pub fn if_then(
        id: u32,
        head: StructureBlock,
        then: StructureBlock,
        chain: Vec<StructureBlock>,
    ) -> NestedBlock {
        let mut children = vec![head, then];
        children.extend(chain);
        NestedBlock {
            id,
            kind: BlockKind::IfThen,
            children,
        }
    }

    /// Conditional with two branches joining afterward; chain as in
    /// [`NestedBlock::if_then`].
    pub fn if_else(
        id: u32,
        head: StructureBlock,
        then: StructureBlock,
        els: StructureBlock,
        chain: Vec<StructureBlock>,
    ) -> NestedBlock {
        let mut children = vec![head, then, els];
        children.extend(chain);
        NestedBlock {
            id,
            kind: BlockKind::IfElse,
            children,
        }
    }

    /// Wraps a basic block whose conditional edge targets itself.
    pub fn self_loop(id: u32, body: StructureBlock) -> NestedBlock {
        NestedBlock {
            id,
            kind: BlockKind::SelfLoop,
            children: vec![body],
        }
    }

    /// Pre-test loop: `head` both enters and exits the loop, `body` points
    /// only back at `head`.
    pub fn while_loop(id: u32, head: StructureBlock, body: StructureBlock) -> NestedBlock {
        NestedBlock {
            id,
            kind: BlockKind::While,
            children: vec![head, body],
        }
    }

    /// Post-test loop: `tail` carries the back-edge to `head` and the exit.
    pub fn do_while(id: u32, head: StructureBlock, tail: StructureBlock) -> NestedBlock {
        NestedBlock {
            id,
            kind: BlockKind::DoWhile,
            children: vec![head, tail],
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    pub fn children(&self) -> &[StructureBlock] {
        &self.children
    }
}

/// Handle to a node of a reduction tree
///
/// Cloning a handle is cheap and shares the underlying node. A composite
/// keeps its children alive; dropping the last handle to a root releases
/// the whole subtree.
#[derive(Debug, Clone)]
pub enum StructureBlock {
    Basic(Rc<LeafBlock>),
    Nested(Rc<NestedBlock>),
}

impl StructureBlock {
    pub fn id(&self) -> u32 {
        match self {
            StructureBlock::Basic(leaf) => leaf.id(),
            StructureBlock::Nested(nested) => nested.id(),
        }
    }

    pub fn kind(&self) -> BlockKind {
        match self {
            StructureBlock::Basic(_) => BlockKind::Basic,
            StructureBlock::Nested(nested) => nested.kind(),
        }
    }

    pub fn is_basic(&self) -> bool {
        matches!(self, StructureBlock::Basic(_))
    }

    /// Ordered children; empty for a leaf.
    pub fn children(&self) -> &[StructureBlock] {
        match self {
            StructureBlock::Basic(_) => &[],
            StructureBlock::Nested(nested) => nested.children(),
        }
    }

    /// Number of direct children.
    pub fn len(&self) -> usize {
        self.children().len()
    }

    pub fn is_empty(&self) -> bool {
        self.children().is_empty()
    }

    /// 64-bit fingerprint of the subtree rooted here.
    ///
    /// The hash covers variant tags and child arity in preorder, nothing
    /// else: ids and instruction offsets do not contribute, and swapping
    /// two distinct children changes the result. Two subtrees hash equal
    /// exactly when they are isomorphic as ordered labeled trees, up to
    /// 64-bit collisions.
    pub fn structural_hash(&self) -> u64 {
        let mut hasher = FnvHasher::default();
        self.hash_structure(&mut hasher);
        hasher.finish()
    }

    fn hash_structure(&self, hasher: &mut FnvHasher) {
        // tag + arity in preorder encodes the ordered tree unambiguously
        hasher.write_u8(self.kind().tag());
        let children = self.children();
        hasher.write_u32(children.len() as u32);
        for child in children {
            child.hash_structure(hasher);
        }
    }

    /// Appends the Graphviz rendering of this subtree: a bare node line for
    /// a leaf, a (possibly nested) cluster for a composite.
    pub fn write_dot(&self, dot: &mut String) {
        use std::fmt::Write as _;
        match self {
            StructureBlock::Basic(leaf) => {
                let _ = writeln!(dot, "{};", leaf.id());
            }
            StructureBlock::Nested(nested) => {
                let _ = writeln!(dot, "subgraph cluster_{} {{", nested.id());
                let _ = writeln!(dot, "label=\"{}\";", nested.kind());
                for child in nested.children() {
                    child.write_dot(dot);
                }
                dot.push_str("}\n");
            }
        }
    }
}

impl From<Rc<LeafBlock>> for StructureBlock {
    fn from(leaf: Rc<LeafBlock>) -> StructureBlock {
        StructureBlock::Basic(leaf)
    }
}

impl From<Rc<NestedBlock>> for StructureBlock {
    fn from(nested: Rc<NestedBlock>) -> StructureBlock {
        StructureBlock::Nested(nested)
    }
}
