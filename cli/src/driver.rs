use std::path::Path;

use thiserror::Error;
use tracing::error;
use zbuild::{BuildGraph, Error as ZbuildError, ExecOptions, LocalFs};

use crate::cli::Args;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("reading '{path}': {source}")]
    ReadScript {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("changing directory to '{dir}': {source}")]
    Chdir {
        dir: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Zbuild(#[from] ZbuildError),
}

/// Wires script text -> statement tree -> graph -> executor, the way the
/// teacher's `run_ninja` wires its own parse/convert/run pipeline.
pub fn run(args: &Args) -> Result<(), DriverError> {
    if let Some(dir) = &args.chdir {
        std::env::set_current_dir(dir).map_err(|source| DriverError::Chdir {
            dir: dir.display().to_string(),
            source,
        })?;
    }

    let script = std::fs::read_to_string(&args.file).map_err(|source| DriverError::ReadScript {
        path: args.file.display().to_string(),
        source,
    })?;

    let fs = LocalFs;
    let mut graph = zbuild::load_graph(&fs, &script)?;

    if args.verbose {
        eprint!("{}", format_graph(&graph));
    }

    let opts = ExecOptions {
        verbose: args.verbose,
        dry_run: args.dry_run,
    };

    zbuild::runner::run(&fs, &mut graph, args.target.as_deref(), &opts)
        .map_err(ZbuildError::from)?;
    Ok(())
}

/// A plain-text dump of the parsed tree and constructed graph, used behind
/// `-v` for debugging; mirrors the teacher's `write_human_readable` escape
/// hatch rather than being part of the normal build path.
pub fn dump(path: &Path) -> Result<String, DriverError> {
    let script = std::fs::read_to_string(path).map_err(|source| DriverError::ReadScript {
        path: path.display().to_string(),
        source,
    })?;
    let fs = LocalFs;
    let g = zbuild::load_graph(&fs, &script)?;
    Ok(format_graph(&g))
}

fn format_graph(g: &BuildGraph) -> String {
    let mut out = String::new();
    out.push_str(&format!("default: {:?}\n", g.vars.specials.default));
    for (name, rule) in &g.rules {
        out.push_str(&format!(
            "rule {name}: deps={:?} file_deps={:?} multi={}\n",
            rule.rule_deps, rule.file_deps, rule.is_multi
        ));
        for cmd in &rule.shell_commands {
            out.push_str(&format!("  $ {cmd}\n"));
        }
    }
    out
}

pub fn report(err: &DriverError) {
    error!("{err}");
}
