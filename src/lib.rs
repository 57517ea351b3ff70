//! `zbuild`: an incremental build tool with a small declarative build-script
//! language, automatic C/C++ header-dependency tracking via compiler-emitted
//! `.d` files, and single-threaded, mtime-driven rule execution.

pub mod depfile;
pub mod depget;
pub mod depresolve;
pub mod fs;
pub mod graph;
pub mod paramstr;
pub mod parser;
pub mod prehook;
pub mod runner;
pub mod stmt;
pub mod vars;

use thiserror::Error;

pub use depget::{Depget, DepgetError, DepgetKind, DepgetSet};
pub use fs::{Fs, LocalFs};
pub use graph::{BuildGraph, ExecOptions, GraphError, Rule};
pub use paramstr::{ParamStr, ParamStrError};
pub use parser::inline::InlineError;
pub use parser::ParseError;
pub use runner::ExecError;
pub use stmt::StatementTree;
pub use vars::{VarEnv, VarError};

/// The top-level error type spanning every phase from script text to
/// executed commands.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Inline(#[from] InlineError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Parses, fixes up rule-name forward references, inlines `call`
/// statements, and lowers a complete script into a [`BuildGraph`] — the
/// pipeline every caller (CLI or test) drives the same way.
pub fn load_graph<F: Fs>(fs: &F, script: &str) -> Result<BuildGraph, Error> {
    let mut tree = parser::parse(script)?;
    parser::fixup::fixup_rule_names(&mut tree);
    parser::inline::inline_calls(&mut tree)?;
    Ok(graph::build(fs, &tree)?)
}

/// Loads and runs a script against `target` (or its `default` rule) in one
/// call.
pub fn build_and_run<F: Fs>(
    fs: &F,
    script: &str,
    target: Option<&str>,
    opts: &ExecOptions,
) -> Result<(), Error> {
    let mut g = load_graph(fs, script)?;
    runner::run(fs, &mut g, target, opts)?;
    Ok(())
}
