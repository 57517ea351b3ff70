//! File-dependency resolution: turns a [`DepgetSet`] into a deduplicated
//! list of existing file paths (skipping `RULE`s, which are collected
//! separately), expanding `GLOB` patterns against an enclosing directory.

use std::path::Path;

use thiserror::Error;

use crate::depget::{DepgetKind, DepgetSet};
use crate::fs::Fs;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DepResolveError {
    #[error("dependency '{0}' does not exist")]
    MissingFile(String),
    #[error("glob '{0}' could not be read")]
    GlobFailed(String),
    #[error("recursive glob '{0}' is not permitted in a rule context")]
    RecursiveGlobInRuleContext(String),
}

fn join_dir(dir: Option<&str>, name: &str) -> String {
    match dir {
        Some(d) if !d.is_empty() => format!("{d}/{name}"),
        _ => name.to_string(),
    }
}

fn push_unique(out: &mut Vec<String>, path: String) {
    if !out.contains(&path) {
        out.push(path);
    }
}

/// Expands a `GLOB` depget against `dir`, re-rooting each match using the
/// pattern's own directory component and the match's basename so the
/// caller's chosen relative style is preserved.
fn expand_glob<F: Fs>(fs: &F, dir: Option<&str>, pattern: &str) -> Result<Vec<String>, DepResolveError> {
    let full_pattern = join_dir(dir, pattern);
    let pattern_dir = Path::new(pattern)
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .filter(|p| !p.is_empty());

    let matches = fs
        .glob(&full_pattern)
        .map_err(|_| DepResolveError::GlobFailed(full_pattern.clone()))?;

    let mut out = Vec::new();
    for m in matches {
        let basename = m
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let rerooted = match &pattern_dir {
            Some(d) => format!("{d}/{basename}"),
            None => basename,
        };
        push_unique(&mut out, rerooted);
    }
    Ok(out)
}

/// Resolves every `FILE`/`GLOB` depget in `set` against `dir` into a
/// deduplicated file list. `RULE` depgets are skipped; callers collect
/// those separately via [`resolve_rule_deps`]. Fails if a `FILE` doesn't
/// exist, or a `RECURSIVE_GLOB` appears (only legal for prehook selectors).
pub fn resolve_file_deps<F: Fs>(
    fs: &F,
    set: &DepgetSet,
    dir: Option<&str>,
) -> Result<Vec<String>, DepResolveError> {
    let mut out = Vec::new();
    for item in &set.items {
        match item.kind {
            DepgetKind::Rule => continue,
            DepgetKind::RecursiveGlob => {
                return Err(DepResolveError::RecursiveGlobInRuleContext(item.name.to_string()));
            }
            DepgetKind::File => {
                let full = join_dir(dir, &item.name);
                if !fs.exists(Path::new(&full)) {
                    return Err(DepResolveError::MissingFile(full));
                }
                push_unique(&mut out, full);
            }
            DepgetKind::Glob => {
                for path in expand_glob(fs, dir, &item.name)? {
                    push_unique(&mut out, path);
                }
            }
        }
    }
    Ok(out)
}

/// Collects the `RULE` depgets of a set, in order, deduplicated.
pub fn resolve_rule_deps(set: &DepgetSet) -> Vec<String> {
    let mut out = Vec::new();
    for item in &set.items {
        if item.kind == DepgetKind::Rule {
            let name = item.name.to_string();
            if !out.contains(&name) {
                out.push(name);
            }
        }
    }
    out
}

/// Replaces a path's extension with `ext` and returns just the basename,
/// matching `path.Base(replace_ext(source, ext))` in the tool this was
/// ported from.
pub fn basename_with_ext(source: &str, ext: &str) -> String {
    let ext = ext.trim_start_matches('.');
    let base = Path::new(source)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| source.to_string());
    if ext.is_empty() {
        base
    } else {
        format!("{base}.{ext}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depget::Depget;

    struct FakeFs {
        files: Vec<&'static str>,
    }

    impl Fs for FakeFs {
        fn exists(&self, path: &Path) -> bool {
            self.files.contains(&path.to_string_lossy().as_ref())
        }
        fn mtime(&self, _path: &Path) -> std::io::Result<std::time::SystemTime> {
            unimplemented!()
        }
        fn glob(&self, pattern: &str) -> std::io::Result<Vec<std::path::PathBuf>> {
            let prefix = pattern.trim_end_matches("*.c");
            Ok(self
                .files
                .iter()
                .filter(|f| f.starts_with(prefix) && f.ends_with(".c"))
                .map(std::path::PathBuf::from)
                .collect())
        }
        fn read_text(&self, _path: &Path) -> std::io::Result<String> {
            unimplemented!()
        }
        fn touch(&self, _path: &Path) -> std::io::Result<()> {
            unimplemented!()
        }
        fn mkfile(&self, _path: &Path, _contents: &str) -> std::io::Result<()> {
            unimplemented!()
        }
        fn run_shell(&self, _command: &str, _dir: Option<&Path>) -> std::io::Result<i32> {
            unimplemented!()
        }
    }

    #[test]
    fn missing_file_is_fatal() {
        let fs = FakeFs { files: vec![] };
        let set = DepgetSet {
            label: None,
            items: vec![Depget::classify("missing.c")],
        };
        let err = resolve_file_deps(&fs, &set, None).unwrap_err();
        assert!(matches!(err, DepResolveError::MissingFile(_)));
    }

    #[test]
    fn glob_expands_and_dedupes() {
        let fs = FakeFs {
            files: vec!["a.c", "b.c"],
        };
        let set = DepgetSet {
            label: None,
            items: vec![Depget::classify("*.c")],
        };
        let mut files = resolve_file_deps(&fs, &set, None).unwrap();
        files.sort();
        assert_eq!(files, vec!["a.c".to_string(), "b.c".to_string()]);
    }

    #[test]
    fn recursive_glob_rejected_in_rule_context() {
        let fs = FakeFs { files: vec![] };
        let set = DepgetSet {
            label: None,
            items: vec![Depget::classify("**.c")],
        };
        let err = resolve_file_deps(&fs, &set, None).unwrap_err();
        assert!(matches!(err, DepResolveError::RecursiveGlobInRuleContext(_)));
    }

    #[test]
    fn basename_replaces_extension() {
        assert_eq!(basename_with_ext("src/foo.c", "o"), "foo.o");
        assert_eq!(basename_with_ext("foo.c", ".o"), "foo.o");
    }
}
