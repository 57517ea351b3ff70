//! Pre-hook data types: unconditional hooks (run once before any rule) and
//! conditional hooks (run once per distinct changed filename whose
//! extension matches, across the whole run).

use std::collections::HashSet;
use std::path::Path;

use crate::stmt::NestedStmt;

#[derive(Debug, Clone)]
pub struct UnconditionalPrehook {
    pub shell_commands: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ConditionalPrehook {
    pub exts: Vec<String>,
    pub body: Vec<NestedStmt>,
    pub seen_files: HashSet<String>,
}

impl ConditionalPrehook {
    fn extension_matches(&self, filename: &str) -> bool {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        self.exts.iter().any(|e| e == ext)
    }

    /// Returns `true` (and marks `filename` seen) the first time this hook
    /// observes a matching-extension filename; `false` on every
    /// subsequent call for the same filename, enforcing "once per file".
    pub fn should_fire(&mut self, filename: &str) -> bool {
        if self.seen_files.contains(filename) {
            return false;
        }
        if self.extension_matches(filename) {
            self.seen_files.insert(filename.to_string());
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_per_filename() {
        let mut hook = ConditionalPrehook {
            exts: vec!["py".to_string()],
            body: Vec::new(),
            seen_files: HashSet::new(),
        };
        assert!(hook.should_fire("foo.py"));
        assert!(!hook.should_fire("foo.py"));
    }

    #[test]
    fn ignores_non_matching_extension() {
        let mut hook = ConditionalPrehook {
            exts: vec!["py".to_string()],
            body: Vec::new(),
            seen_files: HashSet::new(),
        };
        assert!(!hook.should_fire("foo.c"));
    }
}
