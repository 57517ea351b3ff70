//! Rule-name fixup: the single post-parse pass that lets the script refer
//! to rules before they're declared.

use std::collections::HashSet;

use smol_str::SmolStr;

use crate::depget::{DepgetKind, DepgetSet};
use crate::stmt::{StatementTree, TopStmt};

/// Collects every name a rule could be looked up by: every command's name,
/// plus every build's alias (multi-target) or single `FILE` target
/// (non-multi).
pub fn extract_rule_names(tree: &StatementTree) -> HashSet<SmolStr> {
    let mut names = HashSet::new();
    for stmt in &tree.stmts {
        match stmt {
            TopStmt::Command(c) => {
                names.insert(c.name.clone());
            }
            TopStmt::Build(b) => {
                if let Some(alias) = &b.alias {
                    names.insert(alias.clone());
                } else if let Some(first) = b.target.items.first() {
                    if first.kind == DepgetKind::File {
                        names.insert(first.name.clone());
                    }
                }
            }
            _ => {}
        }
    }
    names
}

fn promote(set: &mut DepgetSet, names: &HashSet<SmolStr>) {
    for item in &mut set.items {
        if item.kind == DepgetKind::File && names.contains(&item.name) {
            item.kind = DepgetKind::Rule;
        }
    }
}

/// Promotes every `FILE` depget in every prehook/build/command dependency
/// set whose name matches a known rule name to `RULE`, in place.
pub fn fixup_rule_names(tree: &mut StatementTree) {
    let names = extract_rule_names(tree);
    for stmt in &mut tree.stmts {
        match stmt {
            TopStmt::Prehook(p) => promote(&mut p.deps, &names),
            TopStmt::Build(b) => promote(&mut b.deps, &names),
            TopStmt::Command(c) => promote(&mut c.deps, &names),
            TopStmt::Set(_) | TopStmt::Option(_) => {}
        }
    }
}
