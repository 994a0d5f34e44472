// Cfstruct: Control-Flow Structuring Engine
//
// Disassembles a binary, rebuilds per-function CFGs, reduces them into
// structured region trees and renders both as Graphviz.

#![allow(dead_code)]

use clap::Parser;

mod analysis;
mod arch;
mod cli;
mod disassembler;
mod output;
mod sync;

use cli::Cli;

fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    if let Err(err) = cli::run(&cli) {
        output::error(&format!("{err:#}"));
        std::process::exit(1);
    }
}
