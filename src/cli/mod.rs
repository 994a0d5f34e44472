// CLI surface: one positional binary, analysis envelope on stdout

use crate::analysis::{ControlFlowStructure, FunctionAnalysis};
use crate::arch;
use crate::disassembler::{Disassembler, R2Disassembler};
use crate::output;
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;

/// cfstruct - control-flow structuring for binary clone detection
///
/// Disassembles a binary, rebuilds the control flow graph of every
/// discovered function and reduces it to a tree of structured regions.
#[derive(Parser, Debug, Clone)]
#[command(name = "cfstruct")]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the binary to analyse
    pub binary: PathBuf,

    /// Directory where per-function Graphviz files are written
    #[arg(long, value_name = "DIR")]
    pub graphviz_dir: Option<PathBuf>,

    /// radare2 executable used for disassembly
    #[arg(long, default_value = "r2", env = "CFSTRUCT_R2")]
    pub disassembler: PathBuf,
}

/// Runs the analysis described by the arguments.
pub fn run(cli: &Cli) -> Result<()> {
    if !cli.binary.is_file() {
        bail!(
            "input file {} does not exist or is not readable",
            cli.binary.display()
        );
    }
    if let Some(dir) = &cli.graphviz_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("cannot create output directory {}", dir.display()))?;
    }

    let mut disasm = R2Disassembler::with_executable(&cli.binary, &cli.disassembler)?;
    disasm.analyse()?;

    let arch = arch::from_name(disasm.info().arch_name());
    if arch.name() == "unknown" {
        output::warn(&format!(
            "unsupported architecture {:?}: jump classification is disabled",
            disasm.info().arch_name()
        ));
    }

    for function in disasm.functions() {
        println!("{}", function.name());
        let statements = match disasm.function_statements(function.name()) {
            Some(statements) => statements,
            None => continue,
        };
        for stmt in statements {
            println!("    0x{:x} {}", stmt.offset(), stmt.instruction());
        }
        println!();

        if let Some(dir) = &cli.graphviz_dir {
            let analysis = FunctionAnalysis::new(statements.to_vec());
            let cfg = analysis.build_cfg(arch.as_ref());
            if cfg.nodes_no() == 0 {
                continue;
            }
            let stem = sanitize(function.name());
            cfg.to_file(dir.join(format!("{stem}.cfg.dot")))
                .with_context(|| format!("cannot write CFG for {}", function.name()))?;

            let mut cfs = ControlFlowStructure::new();
            if !cfs.build(&cfg) {
                output::warn(&format!(
                    "{} is irreducible, writing the partial structure",
                    function.name()
                ));
            }
            cfs.to_file(dir.join(format!("{stem}.cfs.dot")), &cfg)
                .with_context(|| format!("cannot write structure for {}", function.name()))?;
        }
    }
    if let Some(dir) = &cli.graphviz_dir {
        output::info(&format!("graph files written to {}", dir.display()));
    }
    Ok(())
}

/// Maps a function name onto something safe as a file stem.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
