//! Architecture-specific jump classification

/// How a mnemonic transfers control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpKind {
    /// Not a control transfer
    None,
    /// Conditional jump
    Conditional,
    /// Unconditional jump
    Unconditional,
    /// Conditional return (ARM-style predicated returns)
    RetConditional,
    /// Unconditional return
    RetUnconditional,
}

impl JumpKind {
    /// True for jumps carrying a target, false for returns and ordinary
    /// statements.
    pub fn is_jump(self) -> bool {
        matches!(self, JumpKind::Conditional | JumpKind::Unconditional)
    }

    pub fn is_return(self) -> bool {
        matches!(self, JumpKind::RetConditional | JumpKind::RetUnconditional)
    }
}

/// Architecture-specific knowledge needed to seed CFG construction
///
/// A return counts as a jump for classification purposes and must be
/// reported by `jump_kind`.
pub trait Architecture {
    /// Name of the architecture family (`"x86"`, `"arm"`, ...).
    fn name(&self) -> &'static str;

    /// Classifies a lowercase mnemonic.
    fn jump_kind(&self, mnemonic: &str) -> JumpKind;
}

/// Picks the architecture implementation for a disassembler-reported name.
///
/// Unrecognized names fall back to [`ArchUnknown`], under which every
/// function degenerates to a single block.
pub fn from_name(name: &str) -> Box<dyn Architecture> {
    match name {
        "x86" => Box::new(ArchX86),
        "arm" => Box::new(ArchArm),
        _ => Box::new(ArchUnknown),
    }
}

/// x86 / x86_64 classification
pub struct ArchX86;

impl Architecture for ArchX86 {
    fn name(&self) -> &'static str {
        "x86"
    }

    fn jump_kind(&self, mnemonic: &str) -> JumpKind {
        match mnemonic {
            "ret" | "retn" | "retf" => JumpKind::RetUnconditional,
            "jmp" => JumpKind::Unconditional,
            _ if mnemonic.starts_with('j') => JumpKind::Conditional,
            _ => JumpKind::None,
        }
    }
}

/// ARM (A32) classification: branches are `b`/`bx` with an optional
/// two-letter condition suffix.
pub struct ArchArm;

impl ArchArm {
    /// Strips a trailing condition code, returning the bare mnemonic.
    fn strip_condition(mnemonic: &str) -> &str {
        const CONDITIONS: [&str; 16] = [
            "eq", "ne", "cs", "hs", "cc", "lo", "mi", "pl", "vs", "vc", "hi", "ls", "ge", "gt",
            "lt", "le",
        ];
        if mnemonic.len() >= 3 {
            let (base, suffix) = mnemonic.split_at(mnemonic.len() - 2);
            if CONDITIONS.contains(&suffix) {
                return base;
            }
        }
        mnemonic
    }
}

impl Architecture for ArchArm {
    fn name(&self) -> &'static str {
        "arm"
    }

    fn jump_kind(&self, mnemonic: &str) -> JumpKind {
        let base = ArchArm::strip_condition(mnemonic);
        let conditional = base != mnemonic;
        match base {
            "b" if conditional => JumpKind::Conditional,
            "b" => JumpKind::Unconditional,
            "bx" if conditional => JumpKind::RetConditional,
            "bx" => JumpKind::RetUnconditional,
            _ => JumpKind::None,
        }
    }
}

/// Fallback for unrecognized architectures: nothing is a jump, so the
/// analysis degrades instead of guessing.
pub struct ArchUnknown;

impl Architecture for ArchUnknown {
    fn name(&self) -> &'static str {
        "unknown"
    }

    fn jump_kind(&self, _mnemonic: &str) -> JumpKind {
        JumpKind::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_x86_classification() {
        let arch = ArchX86;
        assert_eq!(arch.jump_kind("jmp"), JumpKind::Unconditional);
        assert_eq!(arch.jump_kind("je"), JumpKind::Conditional);
        assert_eq!(arch.jump_kind("jne"), JumpKind::Conditional);
        assert_eq!(arch.jump_kind("jbe"), JumpKind::Conditional);
        assert_eq!(arch.jump_kind("ret"), JumpKind::RetUnconditional);
        assert_eq!(arch.jump_kind("mov"), JumpKind::None);
        assert_eq!(arch.jump_kind("xor"), JumpKind::None);
    }

    #[test]
    fn test_arm_classification() {
        let arch = ArchArm;
        assert_eq!(arch.jump_kind("b"), JumpKind::Unconditional);
        assert_eq!(arch.jump_kind("beq"), JumpKind::Conditional);
        assert_eq!(arch.jump_kind("bne"), JumpKind::Conditional);
        assert_eq!(arch.jump_kind("bx"), JumpKind::RetUnconditional);
        assert_eq!(arch.jump_kind("bxls"), JumpKind::RetConditional);
        assert_eq!(arch.jump_kind("mov"), JumpKind::None);
        // "ble" is a conditional branch, not a misparsed "b" + "le" + junk
        assert_eq!(arch.jump_kind("ble"), JumpKind::Conditional);
    }

    #[test]
    fn test_arm_condition_stripping_needs_room() {
        // two-letter mnemonics never lose their tail
        assert_eq!(ArchArm::strip_condition("b"), "b");
        assert_eq!(ArchArm::strip_condition("bx"), "bx");
        assert_eq!(ArchArm::strip_condition("ble"), "b");
    }

    #[test]
    fn test_unknown_classifies_nothing() {
        let arch = ArchUnknown;
        assert_eq!(arch.jump_kind("jmp"), JumpKind::None);
        assert_eq!(arch.jump_kind("ret"), JumpKind::None);
    }

    #[test]
    fn test_from_name() {
        assert_eq!(from_name("x86").name(), "x86");
        assert_eq!(from_name("arm").name(), "arm");
        assert_eq!(from_name("riscv").name(), "unknown");
    }

    #[test]
    fn test_kind_predicates() {
        assert!(JumpKind::Conditional.is_jump());
        assert!(!JumpKind::RetUnconditional.is_jump());
        assert!(JumpKind::RetConditional.is_return());
        assert!(!JumpKind::None.is_jump());
        assert!(!JumpKind::None.is_return());
    }
}
