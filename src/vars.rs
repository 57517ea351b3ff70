//! Variable resolution: the layered (user vars / loop-and-label vars /
//! special vars) substitution context described in the data model, plus the
//! typed setters special variables route through on `set special`.

use indexmap::IndexMap;
use thiserror::Error;

use crate::paramstr::{Elem, ParamStr, ParamStrError};
use crate::stmt::SetStmt;

pub const RESERVED_NAMES: [&str; 2] = ["source", "output"];
pub const SPECIAL_NAMES: [&str; 5] = [
    "build_dir",
    "default",
    "includes",
    "default_cflags",
    "global_file_deps",
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VarError {
    #[error("unresolved variable '{name}' in {context}")]
    Unresolved { name: String, context: String },
    #[error("append to unset variable '{0}'")]
    AppendToUnset(String),
    #[error("'{0}' is a reserved variable name and may not be set")]
    Reserved(String),
    #[error("unknown special variable '{0}'")]
    UnknownSpecial(String),
    #[error("malformed value for '{key}': {source}")]
    BadValue {
        key: String,
        #[source]
        source: ParamStrError,
    },
}

/// The five special variables named in the script-file interface, each
/// with its own typed storage and setter semantics.
#[derive(Debug, Clone, Default)]
pub struct Specials {
    pub build_dir: Option<String>,
    pub default: Option<String>,
    /// Stored already prefixed: `-Ia -Ib`.
    pub includes: Option<String>,
    pub default_cflags: String,
    pub global_file_deps: Vec<String>,
}

/// Rewrites a whitespace-separated directory list into `-I`-prefixed,
/// single-space-joined tokens.
pub fn prefix_includes(s: &str) -> String {
    s.split_whitespace()
        .map(|t| format!("-I{t}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// The live variable environment for one build graph: user-defined `vars`
/// overlaid by per-context `additional_vars` overlaid by the specials,
/// which override everything.
#[derive(Debug, Clone, Default)]
pub struct VarEnv {
    pub vars: IndexMap<String, String>,
    pub specials: Specials,
}

impl VarEnv {
    /// Looks a name up through the overlay: specials first (they override
    /// everything), then the caller-supplied `additional` layer (loop
    /// variables, depgetset labels), then user `vars`.
    pub fn resolve(&self, name: &str, additional: &IndexMap<String, String>) -> Option<String> {
        match name {
            "build_dir" => return Some(self.specials.build_dir.clone().unwrap_or_default()),
            "default" => return Some(self.specials.default.clone().unwrap_or_default()),
            "includes" => return Some(self.specials.includes.clone().unwrap_or_default()),
            "default_cflags" => return Some(self.specials.default_cflags.clone()),
            "global_file_deps" => return Some(self.specials.global_file_deps.join(" ")),
            _ => {}
        }
        additional
            .get(name)
            .cloned()
            .or_else(|| self.vars.get(name).cloned())
    }

    /// Substitutes every `Var`/`Shell` element of a parameterised string
    /// against this environment. `Shell` elements pass through verbatim as
    /// `$(expr)` for the invoked shell to evaluate.
    pub fn substitute(
        &self,
        ps: &ParamStr,
        additional: &IndexMap<String, String>,
        context: &str,
    ) -> Result<String, VarError> {
        let mut out = String::new();
        for elem in ps.elems() {
            match elem {
                Elem::Literal(s) => out.push_str(s),
                Elem::Var(name) => {
                    let val = self.resolve(name, additional).ok_or_else(|| VarError::Unresolved {
                        name: name.clone(),
                        context: context.to_string(),
                    })?;
                    out.push_str(&val);
                }
                Elem::Shell(expr) => {
                    out.push_str("$(");
                    out.push_str(expr);
                    out.push(')');
                }
            }
        }
        Ok(out)
    }

    fn substitute_raw(
        &self,
        raw: &str,
        additional: &IndexMap<String, String>,
        key: &str,
        context: &str,
    ) -> Result<String, VarError> {
        let ps = ParamStr::parse(raw).map_err(|source| VarError::BadValue {
            key: key.to_string(),
            source,
        })?;
        self.substitute(&ps, additional, context)
    }

    /// Applies a `set` statement: the right-hand side is substituted
    /// against the environment as it stands *before* this assignment, so
    /// later `set`s see the expanded value, never the raw text.
    pub fn apply_set(
        &mut self,
        stmt: &SetStmt,
        additional: &IndexMap<String, String>,
        context: &str,
    ) -> Result<(), VarError> {
        let resolved = self.substitute_raw(&stmt.val, additional, stmt.key.as_str(), context)?;

        if !stmt.is_special {
            if RESERVED_NAMES.contains(&stmt.key.as_str()) {
                return Err(VarError::Reserved(stmt.key.to_string()));
            }
            if stmt.is_append {
                let existing = self
                    .vars
                    .get(stmt.key.as_str())
                    .cloned()
                    .ok_or_else(|| VarError::AppendToUnset(stmt.key.to_string()))?;
                self.vars
                    .insert(stmt.key.to_string(), format!("{existing} {resolved}"));
            } else {
                self.vars.insert(stmt.key.to_string(), resolved);
            }
            return Ok(());
        }

        match stmt.key.as_str() {
            "build_dir" => self.specials.build_dir = Some(resolved),
            "default" => self.specials.default = Some(resolved),
            "includes" => self.specials.includes = Some(prefix_includes(&resolved)),
            "default_cflags" => {
                if stmt.is_append {
                    self.append_default_cflags(&resolved);
                } else {
                    self.specials.default_cflags = resolved;
                }
            }
            "global_file_deps" => {
                self.specials.global_file_deps =
                    resolved.split_whitespace().map(str::to_string).collect();
            }
            other => return Err(VarError::UnknownSpecial(other.to_string())),
        }
        Ok(())
    }

    /// Appends one space-separated token to `default_cflags`; used both by
    /// `set special default_cflags += ...` and by the `compute_dependencies`
    /// option handler.
    pub fn append_default_cflags(&mut self, token: &str) {
        if self.specials.default_cflags.is_empty() {
            self.specials.default_cflags = token.to_string();
        } else {
            self.specials.default_cflags = format!("{} {token}", self.specials.default_cflags);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stmt::SetStmt;
    use smol_str::SmolStr;

    fn set(is_special: bool, is_append: bool, key: &str, val: &str) -> SetStmt {
        SetStmt {
            is_special,
            is_append,
            key: SmolStr::new(key),
            val: val.to_string(),
        }
    }

    #[test]
    fn var_set_and_append() {
        let mut env = VarEnv::default();
        let additional = IndexMap::new();
        env.apply_set(&set(false, false, "x", "1"), &additional, "test").unwrap();
        env.apply_set(&set(false, true, "x", "2"), &additional, "test").unwrap();
        assert_eq!(env.resolve("x", &additional).as_deref(), Some("1 2"));
    }

    #[test]
    fn append_to_unset_fails() {
        let mut env = VarEnv::default();
        let additional = IndexMap::new();
        let err = env
            .apply_set(&set(false, true, "x", "2"), &additional, "test")
            .unwrap_err();
        assert!(matches!(err, VarError::AppendToUnset(_)));
    }

    #[test]
    fn reserved_name_rejected() {
        let mut env = VarEnv::default();
        let additional = IndexMap::new();
        let err = env
            .apply_set(&set(false, false, "source", "x"), &additional, "test")
            .unwrap_err();
        assert!(matches!(err, VarError::Reserved(_)));
    }

    #[test]
    fn includes_special_prefixes_tokens() {
        let mut env = VarEnv::default();
        let additional = IndexMap::new();
        env.apply_set(&set(true, false, "includes", "a b"), &additional, "test")
            .unwrap();
        assert_eq!(env.resolve("includes", &additional).as_deref(), Some("-Ia -Ib"));
    }

    #[test]
    fn specials_override_user_vars() {
        let mut env = VarEnv::default();
        let additional = IndexMap::new();
        env.specials.default = Some("real-default".to_string());
        env.vars.insert("default".to_string(), "user-shadow".to_string());
        assert_eq!(env.resolve("default", &additional).as_deref(), Some("real-default"));
    }

    #[test]
    fn later_set_sees_expanded_value() {
        let mut env = VarEnv::default();
        let additional = IndexMap::new();
        env.apply_set(&set(false, false, "a", "1"), &additional, "test").unwrap();
        env.apply_set(&set(false, false, "b", "$(a)2"), &additional, "test").unwrap();
        assert_eq!(env.resolve("b", &additional).as_deref(), Some("12"));
    }

    #[test]
    fn unresolved_variable_errors() {
        let env = VarEnv::default();
        let additional = IndexMap::new();
        let ps = ParamStr::parse("$(nope)").unwrap();
        let err = env.substitute(&ps, &additional, "rule x").unwrap_err();
        assert!(matches!(err, VarError::Unresolved { .. }));
    }
}
