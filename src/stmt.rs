//! The typed statement tree produced by [`crate::parser::parse`].

use smol_str::SmolStr;

use crate::depget::DepgetSet;
use crate::paramstr::ParamStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrehookWhen {
    Always,
    OnChange,
}

/// Statements permitted inside a `build`, `command`, `prehook`, or `foreach`
/// body. Which variants are legal in which parent is enforced by the parser
/// (see the scope table in `parser.rs`), not by this type.
#[derive(Debug, Clone, PartialEq)]
pub enum NestedStmt {
    Shell(ParamStr),
    Call(SmolStr),
    Cc(ParamStr),
    Cpp(ParamStr),
    Ld(ParamStr),
    Foreach(ForeachStmt),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeachStmt {
    /// Always `source` -> `output`; validated at parse time, not stored.
    pub excluding: Option<DepgetSet>,
    pub body: Vec<NestedStmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrehookStmt {
    pub deps: DepgetSet,
    pub when: PrehookWhen,
    pub body: Vec<NestedStmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildStmt {
    pub target: DepgetSet,
    pub deps: DepgetSet,
    pub local_dir: Option<SmolStr>,
    pub alias: Option<SmolStr>,
    pub body: Vec<NestedStmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandStmt {
    pub name: SmolStr,
    pub local_dir: Option<SmolStr>,
    pub deps: DepgetSet,
    pub body: Vec<NestedStmt>,
    pub has_nested_calls: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetStmt {
    pub is_special: bool,
    pub is_append: bool,
    pub key: SmolStr,
    /// Raw right-hand side, substituted against current variables at graph
    /// construction time (not here).
    pub val: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TopStmt {
    Set(SetStmt),
    Option(SmolStr),
    Prehook(PrehookStmt),
    Build(BuildStmt),
    Command(CommandStmt),
}

/// The whole parsed script, in script order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementTree {
    pub stmts: Vec<TopStmt>,
}
