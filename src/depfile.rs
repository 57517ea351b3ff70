//! Compiler-generated `.d` sidecar parsing, and the mtime comparison
//! staleness primitive both graph construction (`foreach` gating) and the
//! executor (rule staleness + prehook triggering) build on.

use std::path::Path;

use crate::fs::Fs;

/// Reads and parses the `.d` sidecar for `source` (sought at
/// `basename(source, ".d")` in the current working directory, regardless
/// of any rule `dir`). Returns an empty list if no such file exists.
///
/// Format: `target: dep dep \` newline-continued; strips every `\` from
/// the whole joined body *before* splitting on the first `:`, then
/// whitespace-tokenizes the tail and drops absolute paths.
pub fn parse_depfile<F: Fs>(fs: &F, source: &str) -> Vec<String> {
    let base = Path::new(source)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| source.to_string());
    let depfile_path = Path::new(&format!("{base}.d")).to_path_buf();

    if !fs.exists(&depfile_path) {
        return Vec::new();
    }
    let Ok(body) = fs.read_text(&depfile_path) else {
        return Vec::new();
    };

    let joined: String = body.lines().collect::<Vec<_>>().join(" ");
    let stripped = joined.replace('\\', "");
    let Some((_, rest)) = stripped.split_once(':') else {
        return Vec::new();
    };

    rest.split_whitespace()
        .filter(|tok| !tok.starts_with('/'))
        .map(str::to_string)
        .collect()
}

/// True if `filename` is newer than `target`, or `target` doesn't exist
/// yet (in which case the rule is always considered stale).
pub fn is_newer<F: Fs>(fs: &F, filename: &str, target: &str) -> bool {
    let target_path = Path::new(target);
    if !fs.exists(target_path) {
        return true;
    }
    match (fs.mtime(Path::new(filename)), fs.mtime(target_path)) {
        (Ok(fm), Ok(tm)) => fm > tm,
        _ => false,
    }
}
