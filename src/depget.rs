//! Dependency getters: the atoms that make up a rule's or prehook's
//! dependency list, plus the optionally labelled set they're parsed into.

use smol_str::SmolStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepgetKind {
    File,
    Glob,
    RecursiveGlob,
    Rule,
}

/// A single dependency atom. `kind` starts as `File` or `Glob`/`RecursiveGlob`
/// based on lexical shape and may later be promoted `File` -> `Rule` by the
/// rule-name fixup pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Depget {
    pub kind: DepgetKind,
    pub name: SmolStr,
}

impl Depget {
    /// Classifies one dependency token.
    pub fn classify(token: &str) -> Depget {
        if let Some(rest) = token.strip_prefix("**") {
            Depget {
                kind: DepgetKind::RecursiveGlob,
                name: SmolStr::new(format!("*{rest}")),
            }
        } else if token.contains('*') {
            Depget {
                kind: DepgetKind::Glob,
                name: SmolStr::new(token),
            }
        } else {
            Depget {
                kind: DepgetKind::File,
                name: SmolStr::new(token),
            }
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == DepgetKind::File
    }
}

/// An optionally labelled, unordered collection of [`Depget`]s. The label,
/// if present, names a variable later bound to the space-joined list of
/// resolved file dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DepgetSet {
    pub label: Option<SmolStr>,
    pub items: Vec<Depget>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DepgetError {
    #[error("depget token contains more than one '=': {0}")]
    MultipleEquals(String),
    #[error("unterminated '[' in depget list: {0}")]
    UnterminatedBracket(String),
    #[error("empty depget token")]
    Empty,
}

impl DepgetSet {
    /// Parses one `DEPGETS` header fragment: a bracketless token or a
    /// `[a, b, ...]` list, optionally prefixed `LABEL=`.
    pub fn parse(input: &str) -> Result<DepgetSet, DepgetError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(DepgetError::Empty);
        }

        let eq_count = trimmed.matches('=').count();
        if eq_count > 1 {
            return Err(DepgetError::MultipleEquals(trimmed.to_string()));
        }

        let (label, rest) = if eq_count == 1 {
            let (l, r) = trimmed.split_once('=').unwrap();
            (Some(SmolStr::new(l.trim())), r.trim())
        } else {
            (None, trimmed)
        };

        let items = if let Some(inner) = rest.strip_prefix('[') {
            let inner = inner
                .strip_suffix(']')
                .ok_or_else(|| DepgetError::UnterminatedBracket(trimmed.to_string()))?;
            inner
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(Depget::classify)
                .collect()
        } else {
            vec![Depget::classify(rest)]
        };

        Ok(DepgetSet { label, items })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_file() {
        let d = Depget::classify("foo");
        assert_eq!(d.kind, DepgetKind::File);
        assert_eq!(d.name, "foo");
    }

    #[test]
    fn glob() {
        let d = Depget::classify("*.c");
        assert_eq!(d.kind, DepgetKind::Glob);
        assert_eq!(d.name, "*.c");
    }

    #[test]
    fn recursive_glob_strips_one_star() {
        let d = Depget::classify("**.c");
        assert_eq!(d.kind, DepgetKind::RecursiveGlob);
        assert_eq!(d.name, "*.c");
    }

    #[test]
    fn bracket_list() {
        let set = DepgetSet::parse("[a.c, b.c]").unwrap();
        assert_eq!(set.label, None);
        assert_eq!(set.items.len(), 2);
        assert_eq!(set.items[0].name, "a.c");
        assert_eq!(set.items[1].name, "b.c");
    }

    #[test]
    fn labelled_set() {
        let set = DepgetSet::parse("srcs=[a.c, b.c]").unwrap();
        assert_eq!(set.label.as_deref(), Some("srcs"));
        assert_eq!(set.items.len(), 2);
    }

    #[test]
    fn labelled_single_token() {
        let set = DepgetSet::parse("x=foo").unwrap();
        assert_eq!(set.label.as_deref(), Some("x"));
        assert_eq!(set.items, vec![Depget::classify("foo")]);
    }

    #[test]
    fn multiple_equals_rejected() {
        let err = DepgetSet::parse("a=b=c").unwrap_err();
        assert!(matches!(err, DepgetError::MultipleEquals(_)));
    }
}
