//! Function discovered by the disassembler

use std::cmp::Ordering;

/// Name and location of one function of the analysed binary
///
/// Ordering and equality follow the offset alone: the offset is what makes
/// a function unique inside a binary, names are frequently synthesized.
#[derive(Debug, Clone, Eq)]
pub struct FunctionEntry {
    offset: u64,
    name: String,
}

impl FunctionEntry {
    pub fn new(offset: u64, name: impl Into<String>) -> FunctionEntry {
        FunctionEntry {
            offset,
            name: name.into(),
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for FunctionEntry {
    fn eq(&self, other: &FunctionEntry) -> bool {
        self.offset == other.offset
    }
}

impl PartialOrd for FunctionEntry {
    fn partial_cmp(&self, other: &FunctionEntry) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FunctionEntry {
    fn cmp(&self, other: &FunctionEntry) -> Ordering {
        self.offset.cmp(&other.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_by_offset() {
        let mut entries = vec![
            FunctionEntry::new(0x2000, "main"),
            FunctionEntry::new(0x1000, "entry0"),
            FunctionEntry::new(0x1800, "helper"),
        ];
        entries.sort();
        let names: Vec<_> = entries.iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["entry0", "helper", "main"]);
    }

    #[test]
    fn test_equality_ignores_name() {
        let a = FunctionEntry::new(0x100, "sym.foo");
        let b = FunctionEntry::new(0x100, "fcn.00000100");
        assert_eq!(a, b);
    }
}
