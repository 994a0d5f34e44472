//! Single disassembled statement

/// One statement of a disassembled function
///
/// The instruction text is normalized to lowercase at construction so
/// mnemonic comparisons never have to care about the disassembler's
/// casing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    offset: u64,
    instruction: String,
}

impl Statement {
    pub fn new(offset: u64, instruction: &str) -> Statement {
        Statement {
            offset,
            instruction: instruction.trim().to_lowercase(),
        }
    }

    /// Offset of the statement inside the binary.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Full instruction text, e.g. `xor eax, eax`.
    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// Mnemonic alone, e.g. `xor`.
    pub fn mnemonic(&self) -> &str {
        self.instruction
            .split_whitespace()
            .next()
            .unwrap_or_default()
    }

    /// Argument text after the mnemonic, e.g. `eax, eax`; empty when the
    /// instruction takes none.
    pub fn args(&self) -> &str {
        match self.instruction.split_once(' ') {
            Some((_, args)) => args,
            None => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        let stmt = Statement::new(0x610, "MOV EAX, 5");
        assert_eq!(stmt.offset(), 0x610);
        assert_eq!(stmt.instruction(), "mov eax, 5");
        assert_eq!(stmt.mnemonic(), "mov");
        assert_eq!(stmt.args(), "eax, 5");
    }

    #[test]
    fn test_no_arguments() {
        let stmt = Statement::new(0x4, "ret");
        assert_eq!(stmt.mnemonic(), "ret");
        assert_eq!(stmt.args(), "");
    }

    #[test]
    fn test_whitespace_is_trimmed() {
        let stmt = Statement::new(0, "  nop \n");
        assert_eq!(stmt.instruction(), "nop");
    }
}
