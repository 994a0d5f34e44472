//! Upstream disassembler contract and its value types

pub mod function;
pub mod info;
pub mod radare2;
pub mod statement;

pub use function::FunctionEntry;
pub use info::BinaryInfo;
pub use radare2::R2Disassembler;
pub use statement::Statement;

use std::path::PathBuf;
use thiserror::Error;

/// Failures of the disassembler boundary
///
/// The structuring core never sees these: a CFG only reaches it after the
/// driver succeeded.
#[derive(Debug, Error)]
pub enum DisassemblerError {
    #[error("input file {0} does not exist or is not readable")]
    UnreadableInput(PathBuf),

    #[error("disassembler executable {0} cannot be launched")]
    MissingExecutable(PathBuf),

    #[error("disassembler i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("disassembler pipe closed before completing a response")]
    PipeClosed,

    #[error("malformed response to `{command}`: {source}")]
    MalformedResponse {
        command: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Black-box disassembly service
///
/// One instance is bound to one binary file. [`analyse`](Disassembler::analyse)
/// populates the remaining accessors; before it runs they return defaults
/// (empty function list, default [`BinaryInfo`]).
pub trait Disassembler {
    /// Runs the external analysis and caches its results.
    fn analyse(&mut self) -> Result<(), DisassemblerError>;

    /// Facts about the binary (architecture, endianness, protections).
    fn info(&self) -> &BinaryInfo;

    /// Discovered functions, ordered by offset.
    fn functions(&self) -> &[FunctionEntry];

    /// Statements of the named function, in address order.
    fn function_statements(&self, name: &str) -> Option<&[Statement]>;
}
