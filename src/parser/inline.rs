//! Nested-call inlining: rewrites `call NAME` statements into a copy of the
//! referenced rule's own body, one level deep.
//!
//! This runs on the statement tree, before variable substitution, rather
//! than on fully materialised shell strings: a called rule's `Shell`/`Cc`/
//! `Cpp`/`Ld` statements carry the same `ParamStr` content either way, and
//! the graph constructor resolves them identically once inlined, so
//! operating here keeps the whole pass a single pre-graph rewrite.

use std::collections::HashMap;

use thiserror::Error;

use crate::stmt::{NestedStmt, StatementTree, TopStmt};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InlineError {
    #[error("call to unknown rule '{0}'")]
    UnknownRule(String),
    #[error("call to '{0}' which itself contains uninlined calls")]
    NestingTooDeep(String),
}

fn contains_call(body: &[NestedStmt]) -> bool {
    body.iter().any(|s| matches!(s, NestedStmt::Call(_)))
}

/// Rewrites every `call` in every command with `has_nested_calls` set,
/// processing call-free commands and builds first so that a referenced
/// body never itself contains an unresolved call.
pub fn inline_calls(tree: &mut StatementTree) -> Result<(), InlineError> {
    // Every named rule's body is indexed regardless of call content, so an
    // unresolved name and a too-deeply-nested name can be told apart below.
    let mut bodies: HashMap<String, Vec<NestedStmt>> = HashMap::new();
    for stmt in &tree.stmts {
        match stmt {
            TopStmt::Command(c) => {
                bodies.insert(c.name.to_string(), c.body.clone());
            }
            TopStmt::Build(b) => {
                if let Some(alias) = &b.alias {
                    bodies.insert(alias.to_string(), b.body.clone());
                } else if let Some(first) = b.target.items.first() {
                    bodies.insert(first.name.to_string(), b.body.clone());
                }
            }
            _ => {}
        }
    }

    for stmt in &mut tree.stmts {
        if let TopStmt::Command(c) = stmt {
            if c.has_nested_calls {
                c.body = inline_body(&c.body, &bodies)?;
                c.has_nested_calls = false;
            }
        }
    }

    Ok(())
}

fn inline_body(
    body: &[NestedStmt],
    bodies: &HashMap<String, Vec<NestedStmt>>,
) -> Result<Vec<NestedStmt>, InlineError> {
    let mut out = Vec::with_capacity(body.len());
    for stmt in body {
        match stmt {
            NestedStmt::Call(name) => {
                let referenced = bodies
                    .get(name.as_str())
                    .ok_or_else(|| InlineError::UnknownRule(name.to_string()))?;
                if contains_call(referenced) {
                    return Err(InlineError::NestingTooDeep(name.to_string()));
                }
                out.extend(referenced.iter().cloned());
            }
            other => out.push(other.clone()),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn call_inlines_referenced_body() {
        let mut tree = parse(
            "command all {\n  shell echo building\n  shell echo done\n}\ncommand clean {\n  call all\n  shell echo cleaned\n}\n",
        )
        .unwrap();
        inline_calls(&mut tree).unwrap();
        match &tree.stmts[1] {
            TopStmt::Command(c) => {
                assert_eq!(c.body.len(), 3);
                assert!(!c.has_nested_calls);
                assert!(!c.body.iter().any(|s| matches!(s, NestedStmt::Call(_))));
            }
            _ => panic!("expected command"),
        }
    }

    #[test]
    fn call_to_unknown_rule_errors() {
        let mut tree = parse("command clean {\n  call nope\n}\n").unwrap();
        let err = inline_calls(&mut tree).unwrap_err();
        assert!(matches!(err, InlineError::UnknownRule(_)));
    }

    #[test]
    fn double_nesting_is_rejected() {
        let mut tree = parse(
            "command a {\n  call b\n}\ncommand b {\n  call c\n}\ncommand c {\n  shell echo c\n}\n",
        )
        .unwrap();
        let err = inline_calls(&mut tree).unwrap_err();
        assert!(matches!(err, InlineError::NestingTooDeep(_)));
    }
}
