//! Line-oriented script parser: a brace-scope stack turning the script text
//! into a [`StatementTree`]. See `parser/fixup.rs` for the rule-name
//! promotion pass and `parser/inline.rs` for `call` inlining, both of which
//! run on the tree this module produces.

pub mod fixup;
pub mod inline;

use smol_str::SmolStr;
use thiserror::Error;

use crate::depget::{DepgetError, DepgetSet};
use crate::paramstr::{ParamStr, ParamStrError};
use crate::stmt::{
    BuildStmt, CommandStmt, ForeachStmt, NestedStmt, PrehookStmt, PrehookWhen, SetStmt,
    StatementTree, TopStmt,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("line {line}: unknown keyword or malformed statement: {text}")]
    UnknownKeyword { line: usize, text: String },
    #[error("line {line}: malformed header: {text}")]
    MalformedHeader { line: usize, text: String },
    #[error("line {line}: mismatched brace")]
    MismatchedBrace { line: usize },
    #[error("unbalanced braces: {0} block(s) still open at end of file")]
    UnbalancedBraces(usize),
    #[error("line {line}: '{what}' is not permitted in this context")]
    DisallowedNested { line: usize, what: String },
    #[error("line {line}: foreach must map source to output, found '{from}' to '{to}'")]
    BadForeachMapping {
        line: usize,
        from: String,
        to: String,
    },
    #[error("line {line}: {source}")]
    ParamStr {
        line: usize,
        #[source]
        source: ParamStrError,
    },
    #[error("line {line}: {source}")]
    Depget {
        line: usize,
        #[source]
        source: DepgetError,
    },
}

impl ParseError {
    fn malformed(line: usize, text: &str) -> ParseError {
        ParseError::MalformedHeader {
            line,
            text: text.to_string(),
        }
    }
}

/// One still-open block on the parser's scope stack.
enum Frame {
    Build {
        target: DepgetSet,
        deps: DepgetSet,
        local_dir: Option<SmolStr>,
        alias: Option<SmolStr>,
        body: Vec<NestedStmt>,
    },
    Command {
        name: SmolStr,
        local_dir: Option<SmolStr>,
        deps: DepgetSet,
        body: Vec<NestedStmt>,
        has_nested_calls: bool,
    },
    Prehook {
        deps: DepgetSet,
        when: PrehookWhen,
        body: Vec<NestedStmt>,
    },
    Foreach {
        excluding: Option<DepgetSet>,
        body: Vec<NestedStmt>,
    },
}

/// Splits a header line on whitespace, treating a balanced `[...]` run
/// (which may itself contain whitespace, e.g. `[a, b]`) as a single token.
fn split_header_tokens(s: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let bytes = s.as_bytes();
    let mut i = 0usize;
    let n = s.len();
    while i < n {
        while i < n && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= n {
            break;
        }
        let start = i;
        let mut depth = 0i32;
        while i < n {
            match bytes[i] {
                b'[' => depth += 1,
                b']' => depth -= 1,
                c if c.is_ascii_whitespace() && depth <= 0 => break,
                _ => {}
            }
            i += 1;
        }
        tokens.push(&s[start..i]);
    }
    tokens
}

fn parse_depgets(tok: &str, line: usize) -> Result<DepgetSet, ParseError> {
    if tok == "*" {
        return Ok(DepgetSet::default());
    }
    DepgetSet::parse(tok).map_err(|source| ParseError::Depget { line, source })
}

fn parse_set_line(line_text: &str, line: usize) -> Result<SetStmt, ParseError> {
    let fields: Vec<&str> = line_text.split_whitespace().collect();
    if fields.len() < 5 {
        return Err(ParseError::malformed(line, line_text));
    }
    let is_special = match fields[1] {
        "var" => false,
        "special" => true,
        _ => return Err(ParseError::malformed(line, line_text)),
    };
    let key = SmolStr::new(fields[2]);
    let is_append = match fields[3] {
        "=" => false,
        "+=" => true,
        _ => return Err(ParseError::malformed(line, line_text)),
    };
    let val = fields[4..].join(" ");
    Ok(SetStmt {
        is_special,
        is_append,
        key,
        val,
    })
}

fn parse_build_header(
    tokens: &[&str],
    line: usize,
    text: &str,
) -> Result<Frame, ParseError> {
    let mut i = 1usize;
    let target_tok = *tokens.get(i).ok_or_else(|| ParseError::malformed(line, text))?;
    i += 1;
    let mut local_dir = None;
    if tokens.get(i) == Some(&"in") {
        i += 1;
        local_dir = Some(SmolStr::new(
            *tokens.get(i).ok_or_else(|| ParseError::malformed(line, text))?,
        ));
        i += 1;
    }
    if tokens.get(i) != Some(&"from") {
        return Err(ParseError::malformed(line, text));
    }
    i += 1;
    let deps_tok = *tokens.get(i).ok_or_else(|| ParseError::malformed(line, text))?;
    i += 1;
    let mut alias = None;
    if tokens.get(i) == Some(&"as") {
        i += 1;
        alias = Some(SmolStr::new(
            *tokens.get(i).ok_or_else(|| ParseError::malformed(line, text))?,
        ));
        i += 1;
    }
    if tokens.get(i) != Some(&"{") || i + 1 != tokens.len() {
        return Err(ParseError::malformed(line, text));
    }

    Ok(Frame::Build {
        target: parse_depgets(target_tok, line)?,
        deps: parse_depgets(deps_tok, line)?,
        local_dir,
        alias,
        body: Vec::new(),
    })
}

fn parse_command_header(
    tokens: &[&str],
    line: usize,
    text: &str,
) -> Result<Frame, ParseError> {
    let mut i = 1usize;
    let name = SmolStr::new(*tokens.get(i).ok_or_else(|| ParseError::malformed(line, text))?);
    i += 1;
    let mut local_dir = None;
    if tokens.get(i) == Some(&"in") {
        i += 1;
        local_dir = Some(SmolStr::new(
            *tokens.get(i).ok_or_else(|| ParseError::malformed(line, text))?,
        ));
        i += 1;
    }
    let mut deps = DepgetSet::default();
    if tokens.get(i) == Some(&"needs") {
        i += 1;
        let tok = *tokens.get(i).ok_or_else(|| ParseError::malformed(line, text))?;
        i += 1;
        deps = parse_depgets(tok, line)?;
    }
    if tokens.get(i) != Some(&"{") || i + 1 != tokens.len() {
        return Err(ParseError::malformed(line, text));
    }
    Ok(Frame::Command {
        name,
        local_dir,
        deps,
        body: Vec::new(),
        has_nested_calls: false,
    })
}

fn parse_prehook_header(
    tokens: &[&str],
    line: usize,
    text: &str,
) -> Result<Frame, ParseError> {
    if tokens.len() < 3 {
        return Err(ParseError::malformed(line, text));
    }
    let deps = parse_depgets(tokens[1], line)?;
    let (when, rest) = if tokens[2] == "always" {
        (PrehookWhen::Always, &tokens[3..])
    } else if tokens.len() >= 4 && tokens[2] == "on" && tokens[3] == "change" {
        (PrehookWhen::OnChange, &tokens[4..])
    } else {
        return Err(ParseError::malformed(line, text));
    };
    if rest != ["{"] {
        return Err(ParseError::malformed(line, text));
    }
    Ok(Frame::Prehook {
        deps,
        when,
        body: Vec::new(),
    })
}

fn parse_foreach_header(
    tokens: &[&str],
    line: usize,
    text: &str,
) -> Result<Frame, ParseError> {
    if tokens.len() < 4 {
        return Err(ParseError::malformed(line, text));
    }
    let from = tokens[1];
    if tokens[2] != "to" {
        return Err(ParseError::malformed(line, text));
    }
    let to = tokens[3];
    if from != "source" || to != "output" {
        return Err(ParseError::BadForeachMapping {
            line,
            from: from.to_string(),
            to: to.to_string(),
        });
    }
    let mut i = 4usize;
    let mut excluding = None;
    if tokens.get(i) == Some(&"excluding") {
        i += 1;
        let tok = *tokens.get(i).ok_or_else(|| ParseError::malformed(line, text))?;
        i += 1;
        excluding = Some(parse_depgets(tok, line)?);
    }
    if tokens.get(i) != Some(&"{") || i + 1 != tokens.len() {
        return Err(ParseError::malformed(line, text));
    }
    Ok(Frame::Foreach {
        excluding,
        body: Vec::new(),
    })
}

fn parse_nested_line(line_text: &str, line: usize) -> Result<NestedStmt, ParseError> {
    let (kw, rest) = match line_text.split_once(char::is_whitespace) {
        Some((kw, rest)) => (kw, rest.trim()),
        None => (line_text, ""),
    };
    let ps = |s: &str| ParamStr::parse(s).map_err(|source| ParseError::ParamStr { line, source });
    match kw {
        "shell" => Ok(NestedStmt::Shell(ps(rest)?)),
        "call" => Ok(NestedStmt::Call(SmolStr::new(rest))),
        "cc" => Ok(NestedStmt::Cc(ps(rest)?)),
        "c++" => Ok(NestedStmt::Cpp(ps(rest)?)),
        "ld" => Ok(NestedStmt::Ld(ps(rest)?)),
        _ => Err(ParseError::UnknownKeyword {
            line,
            text: line_text.to_string(),
        }),
    }
}

fn parse_top_level_line(
    line_text: &str,
    line: usize,
    stack: &mut Vec<Frame>,
    top: &mut Vec<TopStmt>,
) -> Result<(), ParseError> {
    let kw = line_text.split_whitespace().next().unwrap_or("");
    match kw {
        "set" => top.push(TopStmt::Set(parse_set_line(line_text, line)?)),
        "option" => {
            let name = line_text
                .split_whitespace()
                .nth(1)
                .ok_or_else(|| ParseError::malformed(line, line_text))?;
            top.push(TopStmt::Option(SmolStr::new(name)));
        }
        "prehook" => {
            if !line_text.ends_with('{') {
                return Err(ParseError::malformed(line, line_text));
            }
            let tokens = split_header_tokens(line_text);
            stack.push(parse_prehook_header(&tokens, line, line_text)?);
        }
        "build" => {
            if !line_text.ends_with('{') {
                return Err(ParseError::malformed(line, line_text));
            }
            let tokens = split_header_tokens(line_text);
            stack.push(parse_build_header(&tokens, line, line_text)?);
        }
        "command" => {
            if !line_text.ends_with('{') {
                return Err(ParseError::malformed(line, line_text));
            }
            let tokens = split_header_tokens(line_text);
            stack.push(parse_command_header(&tokens, line, line_text)?);
        }
        _ => {
            return Err(ParseError::UnknownKeyword {
                line,
                text: line_text.to_string(),
            });
        }
    }
    Ok(())
}

fn handle_body_line(stack: &mut Vec<Frame>, line_text: &str, line: usize) -> Result<(), ParseError> {
    let in_build = matches!(stack.last(), Some(Frame::Build { .. }));

    if line_text.starts_with("foreach") {
        if !in_build {
            return Err(ParseError::DisallowedNested {
                line,
                what: "foreach".to_string(),
            });
        }
        if !line_text.ends_with('{') {
            return Err(ParseError::malformed(line, line_text));
        }
        let tokens = split_header_tokens(line_text);
        stack.push(parse_foreach_header(&tokens, line, line_text)?);
        return Ok(());
    }

    let kw = line_text.split_whitespace().next().unwrap_or("");
    let allowed = match stack.last() {
        Some(Frame::Build { .. }) => matches!(kw, "shell" | "call" | "cc" | "c++" | "ld"),
        Some(Frame::Command { .. }) => matches!(kw, "shell" | "call" | "cc" | "c++" | "ld"),
        Some(Frame::Prehook { .. }) => matches!(kw, "shell" | "call"),
        Some(Frame::Foreach { .. }) => matches!(kw, "shell" | "call" | "cc" | "c++" | "ld"),
        None => false,
    };
    if !allowed {
        return Err(ParseError::DisallowedNested {
            line,
            what: kw.to_string(),
        });
    }

    let stmt = parse_nested_line(line_text, line)?;
    if matches!(stmt, NestedStmt::Call(_)) {
        if let Some(Frame::Command {
            has_nested_calls, ..
        }) = stack.last_mut()
        {
            *has_nested_calls = true;
        }
    }
    match stack.last_mut().expect("checked above") {
        Frame::Build { body, .. }
        | Frame::Command { body, .. }
        | Frame::Prehook { body, .. }
        | Frame::Foreach { body, .. } => body.push(stmt),
    }
    Ok(())
}

fn pop_frame(stack: &mut Vec<Frame>, top: &mut Vec<TopStmt>, line: usize) -> Result<(), ParseError> {
    let frame = stack.pop().ok_or(ParseError::MismatchedBrace { line })?;
    match frame {
        Frame::Foreach { excluding, body } => match stack.last_mut() {
            Some(Frame::Build { body: parent, .. }) => {
                parent.push(NestedStmt::Foreach(ForeachStmt { excluding, body }));
            }
            _ => return Err(ParseError::MismatchedBrace { line }),
        },
        Frame::Build {
            target,
            deps,
            local_dir,
            alias,
            body,
        } => top.push(TopStmt::Build(BuildStmt {
            target,
            deps,
            local_dir,
            alias,
            body,
        })),
        Frame::Command {
            name,
            local_dir,
            deps,
            body,
            has_nested_calls,
        } => top.push(TopStmt::Command(CommandStmt {
            name,
            local_dir,
            deps,
            body,
            has_nested_calls,
        })),
        Frame::Prehook { deps, when, body } => {
            top.push(TopStmt::Prehook(PrehookStmt { deps, when, body }))
        }
    }
    Ok(())
}

/// Parses a complete script into a [`StatementTree`], in script order.
pub fn parse(src: &str) -> Result<StatementTree, ParseError> {
    let mut top: Vec<TopStmt> = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();

    for (idx, raw_line) in src.lines().enumerate() {
        let line_no = idx + 1;
        let line_text = raw_line.trim();
        if line_text.is_empty() || line_text.starts_with('#') {
            continue;
        }
        if line_text == "}" {
            pop_frame(&mut stack, &mut top, line_no)?;
            continue;
        }
        if stack.is_empty() {
            parse_top_level_line(line_text, line_no, &mut stack, &mut top)?;
        } else {
            handle_body_line(&mut stack, line_text, line_no)?;
        }
    }

    if !stack.is_empty() {
        return Err(ParseError::UnbalancedBraces(stack.len()));
    }

    Ok(StatementTree { stmts: top })
}
