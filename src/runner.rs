//! The executor: walks the rule dependency graph from a chosen target,
//! running unconditional pre-hooks once up front, conditional pre-hooks as
//! changed files are observed, and each stale rule's shell commands in
//! dependency order.

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, info, warn};

pub use crate::graph::ExecOptions;
use crate::depfile;
use crate::fs::Fs;
use crate::graph::{BuildGraph, GraphError};

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("unknown target '{0}'")]
    UnknownTarget(String),
    #[error("rule '{rule}' command '{command}' exited with status {code}")]
    CommandFailed {
        rule: String,
        command: String,
        code: i32,
    },
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("i/o error: {0}")]
    Io(String),
}

/// Runs the build rooted at `target` (falling back to `graph.vars.specials.default`
/// when `target` is `None`), returning once every reachable rule has executed
/// at most once.
pub fn run<F: Fs>(fs: &F, graph: &mut BuildGraph, target: Option<&str>, opts: &ExecOptions) -> Result<(), ExecError> {
    run_unconditional_prehooks(fs, graph, opts)?;

    let root = match target {
        Some(t) => t.to_string(),
        None => graph
            .vars
            .specials
            .default
            .clone()
            .ok_or_else(|| ExecError::UnknownTarget("<default>".to_string()))?,
    };

    if !graph.rules.contains_key(&root) {
        return Err(ExecError::UnknownTarget(root));
    }

    let mut done = HashSet::new();
    run_build(fs, graph, &root, &mut done, opts)?;
    Ok(())
}

fn run_unconditional_prehooks<F: Fs>(
    fs: &F,
    graph: &BuildGraph,
    opts: &ExecOptions,
) -> Result<(), ExecError> {
    for hook in &graph.unconditional_prehooks {
        for cmd in &hook.shell_commands {
            execute(fs, cmd, None, opts).map_err(|(cmd, code)| ExecError::CommandFailed {
                rule: "prehook".to_string(),
                command: cmd,
                code,
            })?;
        }
    }
    Ok(())
}

/// Fires every conditional pre-hook matching `filename` that hasn't fired
/// yet this run, sharing `graph`'s `seen_files` dedup state with whatever
/// already fired during `foreach` gating at graph-construction time.
fn check_and_maybe_fire<F: Fs>(
    fs: &F,
    graph: &mut BuildGraph,
    filename: &str,
) -> Result<(), ExecError> {
    graph
        .fire_conditional_prehooks(fs, filename)
        .map_err(ExecError::Graph)
}

/// Depth-first walk with a non-rejecting cycle guard: a rule already marked
/// done is simply skipped rather than treated as an error, so cyclic
/// dependency graphs degrade to "run once" instead of failing the build.
fn run_build<F: Fs>(
    fs: &F,
    graph: &mut BuildGraph,
    name: &str,
    done: &mut HashSet<String>,
    opts: &ExecOptions,
) -> Result<bool, ExecError> {
    if done.contains(name) {
        return Ok(false);
    }
    done.insert(name.to_string());

    let rule_deps = graph
        .rules
        .get(name)
        .ok_or_else(|| ExecError::UnknownTarget(name.to_string()))?
        .rule_deps
        .clone();

    let mut any_dep_ran = false;
    for dep in &rule_deps {
        if run_build(fs, graph, dep, done, opts)? {
            any_dep_ran = true;
        }
    }

    let rule = graph.rules.get(name).unwrap().clone();

    let target_for_staleness = if rule.is_multi {
        format!(".zbuild.{}", rule.name)
    } else {
        rule.target.clone()
    };

    let mut stale = any_dep_ran || rule.is_phony;
    for dep in &rule.file_deps {
        if depfile::is_newer(fs, dep, &target_for_staleness) {
            stale = true;
            check_and_maybe_fire(fs, graph, dep)?;
        }
        if graph.options.contains("compute_dependencies") {
            for transitive in depfile::parse_depfile(fs, dep) {
                if depfile::is_newer(fs, &transitive, &target_for_staleness) {
                    stale = true;
                    check_and_maybe_fire(fs, graph, &transitive)?;
                }
            }
        }
    }
    for g in &graph.vars.specials.global_file_deps.clone() {
        if depfile::is_newer(fs, g, &target_for_staleness) {
            stale = true;
            check_and_maybe_fire(fs, graph, g)?;
        }
    }

    if !stale {
        debug!(rule = name, "up to date");
        return Ok(false);
    }

    info!(rule = name, "running");
    for cmd in &rule.shell_commands {
        execute(fs, cmd, rule.dir.as_deref().map(std::path::Path::new), opts).map_err(
            |(cmd, code)| ExecError::CommandFailed {
                rule: name.to_string(),
                command: cmd,
                code,
            },
        )?;
    }

    if rule.is_multi {
        fs.touch(std::path::Path::new(&target_for_staleness))
            .map_err(|e| ExecError::Io(e.to_string()))?;
    } else if rule.shell_commands.is_empty() && !rule.is_phony {
        warn!(rule = name, "no commands ran for a stale target");
    }

    Ok(true)
}

fn execute<F: Fs>(
    fs: &F,
    cmd: &str,
    dir: Option<&std::path::Path>,
    opts: &ExecOptions,
) -> Result<(), (String, i32)> {
    if opts.verbose || opts.dry_run {
        println!("{cmd}");
    }
    if opts.dry_run {
        return Ok(());
    }
    let code = fs.run_shell(cmd, dir).map_err(|_| (cmd.to_string(), -1i32))?;
    if code != 0 {
        return Err((cmd.to_string(), code));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::io;
    use std::path::{Path, PathBuf};
    use std::time::SystemTime;

    #[derive(Default)]
    struct FakeFs {
        mtimes: RefCell<HashMap<String, SystemTime>>,
        ran: RefCell<Vec<String>>,
    }

    impl Fs for FakeFs {
        fn exists(&self, path: &Path) -> bool {
            self.mtimes.borrow().contains_key(&path.to_string_lossy().to_string())
        }
        fn mtime(&self, path: &Path) -> io::Result<SystemTime> {
            self.mtimes
                .borrow()
                .get(&path.to_string_lossy().to_string())
                .copied()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "missing"))
        }
        fn glob(&self, _pattern: &str) -> io::Result<Vec<PathBuf>> {
            Ok(Vec::new())
        }
        fn read_text(&self, _path: &Path) -> io::Result<String> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no .d here"))
        }
        fn touch(&self, path: &Path) -> io::Result<()> {
            self.mtimes
                .borrow_mut()
                .insert(path.to_string_lossy().to_string(), SystemTime::now());
            Ok(())
        }
        fn mkfile(&self, path: &Path, _contents: &str) -> io::Result<()> {
            self.touch(path)
        }
        fn run_shell(&self, command: &str, _dir: Option<&Path>) -> io::Result<i32> {
            self.ran.borrow_mut().push(command.to_string());
            Ok(0)
        }
    }

    fn graph_from(script: &str, fs: &FakeFs) -> BuildGraph {
        let mut tree = parser::parse(script).unwrap();
        crate::parser::fixup::fixup_rule_names(&mut tree);
        crate::parser::inline::inline_calls(&mut tree).unwrap();
        crate::graph::build(fs, &tree).unwrap()
    }

    #[test]
    fn default_target_runs_once() {
        let fs = FakeFs::default();
        let mut g = graph_from(
            "set special default = hello\ncommand hello {\n  shell echo hi\n}\n",
            &fs,
        );
        let opts = ExecOptions::default();
        run(&fs, &mut g, None, &opts).unwrap();
        assert_eq!(fs.ran.borrow().as_slice(), &["echo hi".to_string()]);
    }

    #[test]
    fn dependency_chain_runs_in_order() {
        let fs = FakeFs::default();
        let mut g = graph_from(
            "set special default = top\ncommand bottom {\n  shell echo bottom\n}\ncommand top needs bottom {\n  shell echo top\n}\n",
            &fs,
        );
        let opts = ExecOptions::default();
        run(&fs, &mut g, None, &opts).unwrap();
        assert_eq!(
            fs.ran.borrow().as_slice(),
            &["echo bottom".to_string(), "echo top".to_string()]
        );
    }

    #[test]
    fn unknown_target_errors() {
        let fs = FakeFs::default();
        let mut g = graph_from(
            "set special default = hello\ncommand hello {\n  shell echo hi\n}\n",
            &fs,
        );
        let opts = ExecOptions::default();
        let err = run(&fs, &mut g, Some("ghost"), &opts).unwrap_err();
        assert!(matches!(err, ExecError::UnknownTarget(_)));
    }

    #[test]
    fn dry_run_does_not_invoke_shell() {
        let fs = FakeFs::default();
        let mut g = graph_from(
            "set special default = hello\ncommand hello {\n  shell echo hi\n}\n",
            &fs,
        );
        let opts = ExecOptions { dry_run: true, verbose: false };
        run(&fs, &mut g, None, &opts).unwrap();
        assert!(fs.ran.borrow().is_empty());
    }
}
