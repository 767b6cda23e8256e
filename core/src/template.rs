//! Template expansion for `labelsTemplate` / `varsTemplate`
//!
//! A subset of Go's `text/template`, evaluated over the matched-feature data of
//! a rule (`domain → feature → [element]`):
//!
//! ```text
//! {{range .pci.device}}vendor-{{.vendor}}-{{.class}}=true
//! {{end}}
//! ```
//!
//! # Supported syntax
//!
//! - text, `{{ pipeline }}`, trim markers `{{- ` / ` -}}`, `{{/* comments */}}`
//! - `if` / `else if` / `else`, `range` (with `$v :=` or `$k, $v :=`, and `else`),
//!   `with` / `else`, `end`
//! - `.`, field chains (`.Name`, `.d.feat`), variables (`$`, `$x`, `$x.Name`),
//!   parenthesized pipelines, `|` chaining
//! - string (`"..."`, `` `...` ``), integer, `true`, `false`, `nil` literals
//! - functions: `and or not len index eq ne lt le gt ge print printf println`
//!
//! # INV: strict missing keys
//!
//! Field access on a map without that key is an error
//! ([`TemplateError::MissingKey`]), never an empty substitution. `index` keeps
//! Go's behavior and yields `nil` for a missing key.
//!
//! # Output
//!
//! [`TemplateSource::expand`] splits the output into `key=value` lines. Blank
//! lines are skipped; a non-blank line without `=` is an error.

use crate::RuleError;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

// ═══════════════════════════════════════════════════════════════════════════════
// Values and errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Data a template operates on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Value {
    /// Absent value.
    #[default]
    Nil,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// String.
    Str(String),
    /// Ordered list.
    List(Vec<Value>),
    /// String-keyed map, iterated in key order.
    Map(BTreeMap<String, Value>),
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Self::Nil => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Str(s) => !s.is_empty(),
            Self::List(l) => !l.is_empty(),
            Self::Map(m) => !m.is_empty(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Str(_) => "string",
            Self::List(_) => "slice",
            Self::Map(_) => "map",
        }
    }
}

/// `%v` formatting.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("<nil>"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => f.write_str(s),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Map(map) => {
                f.write_str("map[")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{k}:{v}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Template parse and execution errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    /// The template source is malformed.
    #[error("template parse error at byte {pos}: {message}")]
    Parse {
        /// Byte offset of the offending action.
        pos: usize,
        /// What went wrong.
        message: String,
    },
    /// A field was accessed on a map that has no such key.
    #[error("map has no entry for key \"{key}\"")]
    MissingKey {
        /// The missing key.
        key: String,
    },
    /// Any other execution failure.
    #[error("template execution error: {message}")]
    Exec {
        /// What went wrong.
        message: String,
    },
}

fn exec_err(message: impl Into<String>) -> TemplateError {
    TemplateError::Exec {
        message: message.into(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// AST
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
enum Node {
    Text(String),
    Action(Pipeline),
    If {
        branches: Vec<(Pipeline, Vec<Node>)>,
        otherwise: Vec<Node>,
    },
    Range {
        decl: Vec<String>,
        pipe: Pipeline,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
    With {
        pipe: Pipeline,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

#[derive(Debug, Clone, Default)]
struct Pipeline {
    decl: Vec<String>,
    cmds: Vec<Vec<Arg>>,
}

#[derive(Debug, Clone)]
enum Term {
    Dot,
    Var(String),
    Lit(Value),
    Func(String),
    Sub(Box<Pipeline>),
}

#[derive(Debug, Clone)]
struct Arg {
    term: Term,
    chain: Vec<String>,
}

const FUNCS: [&str; 14] = [
    "and", "or", "not", "len", "index", "eq", "ne", "lt", "le", "gt", "ge", "print", "printf",
    "println",
];

// ═══════════════════════════════════════════════════════════════════════════════
// Lexing
// ═══════════════════════════════════════════════════════════════════════════════

enum Segment {
    Text(String),
    Action { pos: usize, body: String },
}

fn parse_err(pos: usize, message: impl Into<String>) -> TemplateError {
    TemplateError::Parse {
        pos,
        message: message.into(),
    }
}

/// Split source into text and `{{ }}` actions, applying trim markers and
/// dropping comments.
fn segment(src: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut pos = 0;
    let mut trim_next = false;

    while let Some(rel) = src[pos..].find("{{") {
        let open = pos + rel;
        let mut text = &src[pos..open];
        if trim_next {
            text = text.trim_start();
        }
        let mut inner_start = open + 2;
        let trim_left = src[inner_start..].starts_with('-')
            && src[inner_start + 1..].starts_with(char::is_whitespace);
        if trim_left {
            text = text.trim_end();
            inner_start += 1;
        }
        if !text.is_empty() {
            segments.push(Segment::Text(text.to_owned()));
        }

        let close = find_close(src, inner_start).ok_or_else(|| parse_err(open, "unclosed action"))?;
        let mut inner = &src[inner_start..close];
        trim_next = inner.ends_with('-') && inner[..inner.len() - 1].ends_with(char::is_whitespace);
        if trim_next {
            inner = &inner[..inner.len() - 1];
        }
        let body = inner.trim();
        if body.starts_with("/*") {
            if !body.ends_with("*/") {
                return Err(parse_err(open, "unclosed comment"));
            }
        } else {
            segments.push(Segment::Action {
                pos: open,
                body: body.to_owned(),
            });
        }
        pos = close + 2;
    }

    let mut rest = &src[pos..];
    if trim_next {
        rest = rest.trim_start();
    }
    if !rest.is_empty() {
        segments.push(Segment::Text(rest.to_owned()));
    }
    Ok(segments)
}

/// Find the `}}` closing an action, skipping over quoted strings.
fn find_close(src: &str, from: usize) -> Option<usize> {
    let bytes = src.as_bytes();
    let mut i = from;
    while i + 1 < bytes.len() {
        match bytes[i] {
            b'"' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'`' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'`' {
                    i += 1;
                }
            }
            b'}' if bytes[i + 1] == b'}' => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Dot,
    Field(String),
    Var(String),
    Ident(String),
    Str(String),
    Int(i64),
    LParen,
    RParen,
    Pipe,
    Declare,
    Comma,
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    spaced: bool,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn tokenize(body: &str, pos: usize) -> Result<Vec<Token>, TemplateError> {
    let chars: Vec<char> = body.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut spaced = true;

    let ident_at = |start: usize| -> (String, usize) {
        let mut end = start;
        while end < chars.len() && is_ident_char(chars[end]) {
            end += 1;
        }
        (chars[start..end].iter().collect(), end)
    };

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            spaced = true;
            i += 1;
            continue;
        }
        let tok = match c {
            '.' if chars.get(i + 1).copied().is_some_and(is_ident_start) => {
                let (name, end) = ident_at(i + 1);
                i = end;
                Tok::Field(name)
            }
            '.' => {
                i += 1;
                Tok::Dot
            }
            '$' => {
                let (name, end) = ident_at(i + 1);
                i = end;
                Tok::Var(name)
            }
            '(' => {
                i += 1;
                Tok::LParen
            }
            ')' => {
                i += 1;
                Tok::RParen
            }
            '|' => {
                i += 1;
                Tok::Pipe
            }
            ',' => {
                i += 1;
                Tok::Comma
            }
            ':' if chars.get(i + 1) == Some(&'=') => {
                i += 2;
                Tok::Declare
            }
            '"' => {
                let mut s = String::new();
                i += 1;
                loop {
                    let Some(&ch) = chars.get(i) else {
                        return Err(parse_err(pos, "unterminated quoted string"));
                    };
                    i += 1;
                    match ch {
                        '"' => break,
                        '\\' => {
                            let esc = chars
                                .get(i)
                                .copied()
                                .ok_or_else(|| parse_err(pos, "unterminated quoted string"))?;
                            i += 1;
                            s.push(match esc {
                                'n' => '\n',
                                't' => '\t',
                                'r' => '\r',
                                '\\' => '\\',
                                '"' => '"',
                                other => {
                                    return Err(parse_err(
                                        pos,
                                        format!("unknown escape sequence \\{other}"),
                                    ))
                                }
                            });
                        }
                        other => s.push(other),
                    }
                }
                Tok::Str(s)
            }
            '`' => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&ch| ch == '`')
                    .map(|p| start + p)
                    .ok_or_else(|| parse_err(pos, "unterminated raw string"))?;
                i = end + 1;
                Tok::Str(chars[start..end].iter().collect())
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) => {
                let start = i;
                i += 1;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                if chars.get(i) == Some(&'.') {
                    return Err(parse_err(pos, "floating-point numbers are not supported"));
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<i64>()
                    .map_err(|_| parse_err(pos, format!("bad number syntax: {text}")))?;
                Tok::Int(n)
            }
            c if is_ident_start(c) => {
                let (name, end) = ident_at(i);
                i = end;
                Tok::Ident(name)
            }
            other => {
                return Err(parse_err(pos, format!("unexpected character {other:?} in action")))
            }
        };
        tokens.push(Token { tok, spaced });
        spaced = false;
    }
    Ok(tokens)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Parsing
// ═══════════════════════════════════════════════════════════════════════════════

enum Terminator {
    End,
    Else { pos: usize, rest: Vec<Token> },
    Eof,
}

struct Parser {
    segments: Vec<Segment>,
    next: usize,
}

impl Parser {
    fn parse_list(&mut self) -> Result<(Vec<Node>, Terminator), TemplateError> {
        let mut nodes = Vec::new();
        while self.next < self.segments.len() {
            let idx = self.next;
            self.next += 1;
            let (pos, tokens) = match &self.segments[idx] {
                Segment::Text(t) => {
                    nodes.push(Node::Text(t.clone()));
                    continue;
                }
                Segment::Action { pos, body } => (*pos, tokenize(body, *pos)?),
            };
            let keyword = match tokens.first().map(|t| &t.tok) {
                Some(Tok::Ident(k)) => k.as_str(),
                None => return Err(parse_err(pos, "missing value for command")),
                _ => "",
            };
            match keyword {
                "end" => {
                    if tokens.len() > 1 {
                        return Err(parse_err(pos, "unexpected tokens after end"));
                    }
                    return Ok((nodes, Terminator::End));
                }
                "else" => {
                    return Ok((
                        nodes,
                        Terminator::Else {
                            pos,
                            rest: tokens[1..].to_vec(),
                        },
                    ))
                }
                "if" => nodes.push(self.parse_if(pos, &tokens[1..])?),
                "range" => {
                    let mut pipe = parse_pipeline(&tokens[1..], pos, true)?;
                    let decl = std::mem::take(&mut pipe.decl);
                    let (body, otherwise) = self.parse_body(pos, "range")?;
                    nodes.push(Node::Range {
                        decl,
                        pipe,
                        body,
                        otherwise,
                    });
                }
                "with" => {
                    let pipe = parse_pipeline(&tokens[1..], pos, false)?;
                    let (body, otherwise) = self.parse_body(pos, "with")?;
                    nodes.push(Node::With {
                        pipe,
                        body,
                        otherwise,
                    });
                }
                "define" | "template" | "block" | "break" | "continue" => {
                    return Err(parse_err(pos, format!("unsupported action \"{keyword}\"")));
                }
                _ => nodes.push(Node::Action(parse_pipeline(&tokens, pos, false)?)),
            }
        }
        Ok((nodes, Terminator::Eof))
    }

    /// Body of `range` / `with`: list, optional `else` list, then `end`.
    fn parse_body(&mut self, pos: usize, what: &str) -> Result<(Vec<Node>, Vec<Node>), TemplateError> {
        let (body, term) = self.parse_list()?;
        match term {
            Terminator::End => Ok((body, Vec::new())),
            Terminator::Else { pos: else_pos, rest } => {
                if !rest.is_empty() {
                    return Err(parse_err(else_pos, format!("unexpected tokens after else in {what}")));
                }
                let (otherwise, term) = self.parse_list()?;
                match term {
                    Terminator::End => Ok((body, otherwise)),
                    _ => Err(parse_err(pos, format!("missing end for {what}"))),
                }
            }
            Terminator::Eof => Err(parse_err(pos, format!("missing end for {what}"))),
        }
    }

    fn parse_if(&mut self, pos: usize, cond: &[Token]) -> Result<Node, TemplateError> {
        let mut branches = Vec::new();
        let mut cond = parse_pipeline(cond, pos, false)?;
        loop {
            let (body, term) = self.parse_list()?;
            branches.push((cond, body));
            match term {
                Terminator::End => {
                    return Ok(Node::If {
                        branches,
                        otherwise: Vec::new(),
                    })
                }
                Terminator::Else { pos: else_pos, rest } => {
                    if rest.is_empty() {
                        let (otherwise, term) = self.parse_list()?;
                        if !matches!(term, Terminator::End) {
                            return Err(parse_err(pos, "missing end for if"));
                        }
                        return Ok(Node::If {
                            branches,
                            otherwise,
                        });
                    }
                    if rest[0].tok != Tok::Ident("if".into()) {
                        return Err(parse_err(else_pos, "expected \"if\" after else"));
                    }
                    cond = parse_pipeline(&rest[1..], else_pos, false)?;
                }
                Terminator::Eof => return Err(parse_err(pos, "missing end for if")),
            }
        }
    }
}

fn parse_pipeline(tokens: &[Token], pos: usize, allow_pair: bool) -> Result<Pipeline, TemplateError> {
    let mut decl = Vec::new();
    let mut rest = tokens;
    match tokens {
        [Token { tok: Tok::Var(v), .. }, Token { tok: Tok::Declare, .. }, tail @ ..] => {
            decl.push(v.clone());
            rest = tail;
        }
        [Token { tok: Tok::Var(k), .. }, Token { tok: Tok::Comma, .. }, Token { tok: Tok::Var(v), .. }, Token { tok: Tok::Declare, .. }, tail @ ..] =>
        {
            if !allow_pair {
                return Err(parse_err(pos, "too many declarations in command"));
            }
            decl.push(k.clone());
            decl.push(v.clone());
            rest = tail;
        }
        _ => {}
    }

    let mut cursor = 0;
    let pipe = parse_commands(rest, &mut cursor, pos)?;
    if cursor != rest.len() {
        return Err(parse_err(pos, "unexpected \")\""));
    }
    if pipe.cmds.is_empty() {
        return Err(parse_err(pos, "missing value for command"));
    }
    Ok(Pipeline {
        decl,
        cmds: pipe.cmds,
    })
}

/// Parse `cmd | cmd | ...` until end of tokens or an unmatched `)`.
fn parse_commands(tokens: &[Token], cursor: &mut usize, pos: usize) -> Result<Pipeline, TemplateError> {
    let mut cmds = Vec::new();
    let mut args: Vec<Arg> = Vec::new();
    while *cursor < tokens.len() {
        let token = &tokens[*cursor];
        match &token.tok {
            Tok::RParen => break,
            Tok::Pipe => {
                if args.is_empty() {
                    return Err(parse_err(pos, "missing command before |"));
                }
                cmds.push(std::mem::take(&mut args));
                *cursor += 1;
                continue;
            }
            Tok::Field(name) if !token.spaced && !args.is_empty() => {
                // Chained field on the previous operand: `$x.Name`, `(...).Name`.
                if let Some(last) = args.last_mut() {
                    last.chain.push(name.clone());
                }
                *cursor += 1;
                continue;
            }
            _ => {}
        }
        let term = match &token.tok {
            Tok::Dot => Term::Dot,
            Tok::Field(name) => {
                *cursor += 1;
                args.push(Arg {
                    term: Term::Dot,
                    chain: vec![name.clone()],
                });
                continue;
            }
            Tok::Var(name) => Term::Var(name.clone()),
            Tok::Str(s) => Term::Lit(Value::Str(s.clone())),
            Tok::Int(n) => Term::Lit(Value::Int(*n)),
            Tok::Ident(id) => match id.as_str() {
                "true" => Term::Lit(Value::Bool(true)),
                "false" => Term::Lit(Value::Bool(false)),
                "nil" => Term::Lit(Value::Nil),
                f if FUNCS.contains(&f) => Term::Func(f.to_owned()),
                other => return Err(parse_err(pos, format!("function \"{other}\" not defined"))),
            },
            Tok::LParen => {
                *cursor += 1;
                let inner = parse_commands(tokens, cursor, pos)?;
                if tokens.get(*cursor).map(|t| &t.tok) != Some(&Tok::RParen) {
                    return Err(parse_err(pos, "unclosed left paren"));
                }
                if inner.cmds.is_empty() {
                    return Err(parse_err(pos, "missing value in parenthesized pipeline"));
                }
                Term::Sub(Box::new(inner))
            }
            Tok::Declare | Tok::Comma => {
                return Err(parse_err(pos, "unexpected declaration"));
            }
            Tok::RParen | Tok::Pipe => unreachable_token(pos)?,
        };
        *cursor += 1;
        args.push(Arg {
            term,
            chain: Vec::new(),
        });
    }
    if !args.is_empty() {
        cmds.push(args);
    } else if !cmds.is_empty() {
        return Err(parse_err(pos, "missing command after |"));
    }
    Ok(Pipeline {
        decl: Vec::new(),
        cmds,
    })
}

fn unreachable_token(pos: usize) -> Result<Term, TemplateError> {
    Err(parse_err(pos, "unexpected token"))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Template
// ═══════════════════════════════════════════════════════════════════════════════

/// A parsed template.
#[derive(Debug, Clone)]
pub struct Template {
    root: Vec<Node>,
}

impl Template {
    /// Parse template source.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Parse`] for malformed source.
    pub fn parse(src: &str) -> Result<Self, TemplateError> {
        let mut parser = Parser {
            segments: segment(src)?,
            next: 0,
        };
        let (root, term) = parser.parse_list()?;
        match term {
            Terminator::Eof => Ok(Self { root }),
            Terminator::End => Err(parse_err(0, "unexpected {{end}}")),
            Terminator::Else { pos, .. } => Err(parse_err(pos, "unexpected {{else}}")),
        }
    }

    /// Execute against `data`, returning the rendered text.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::MissingKey`] or [`TemplateError::Exec`].
    pub fn execute(&self, data: &Value) -> Result<String, TemplateError> {
        let mut exec = Exec {
            vars: vec![(String::new(), data.clone())],
            out: String::new(),
        };
        exec.list(&self.root, data)?;
        Ok(exec.out)
    }
}

struct Exec {
    vars: Vec<(String, Value)>,
    out: String,
}

impl Exec {
    fn list(&mut self, nodes: &[Node], dot: &Value) -> Result<(), TemplateError> {
        for node in nodes {
            self.node(node, dot)?;
        }
        Ok(())
    }

    fn scoped(&mut self, nodes: &[Node], dot: &Value) -> Result<(), TemplateError> {
        let mark = self.vars.len();
        let res = self.list(nodes, dot);
        self.vars.truncate(mark);
        res
    }

    /// Run one range iteration with `decl` bound to `key` and `item`.
    fn range_step(
        &mut self,
        decl: &[String],
        body: &[Node],
        key: Value,
        item: Value,
    ) -> Result<(), TemplateError> {
        let mark = self.vars.len();
        match decl {
            [v] => self.vars.push((v.clone(), item.clone())),
            [k, v] => {
                self.vars.push((k.clone(), key));
                self.vars.push((v.clone(), item.clone()));
            }
            _ => {}
        }
        let res = self.list(body, &item);
        self.vars.truncate(mark);
        res
    }

    fn node(&mut self, node: &Node, dot: &Value) -> Result<(), TemplateError> {
        match node {
            Node::Text(t) => self.out.push_str(t),
            Node::Action(pipe) => {
                let v = self.pipeline(pipe, dot)?;
                if let Some(name) = pipe.decl.first() {
                    self.vars.push((name.clone(), v));
                } else {
                    match v {
                        Value::Nil => self.out.push_str("<no value>"),
                        other => {
                            let _ = write!(self.out, "{other}");
                        }
                    }
                }
            }
            Node::If {
                branches,
                otherwise,
            } => {
                for (cond, body) in branches {
                    if self.pipeline(cond, dot)?.truthy() {
                        return self.scoped(body, dot);
                    }
                }
                self.scoped(otherwise, dot)?;
            }
            Node::With {
                pipe,
                body,
                otherwise,
            } => {
                let v = self.pipeline(pipe, dot)?;
                if v.truthy() {
                    self.scoped(body, &v)?;
                } else {
                    self.scoped(otherwise, dot)?;
                }
            }
            Node::Range {
                decl,
                pipe,
                body,
                otherwise,
            } => {
                let v = self.pipeline(pipe, dot)?;
                match v {
                    Value::List(items) if !items.is_empty() => {
                        for (i, item) in items.into_iter().enumerate() {
                            let key = Value::Int(i64::try_from(i).unwrap_or(i64::MAX));
                            self.range_step(decl, body, key, item)?;
                        }
                    }
                    Value::Map(map) if !map.is_empty() => {
                        for (k, item) in map {
                            self.range_step(decl, body, Value::Str(k), item)?;
                        }
                    }
                    // Counts are stepped lazily; nothing proportional to `n` is allocated.
                    Value::Int(n) if n > 0 => {
                        for i in 0..n {
                            self.range_step(decl, body, Value::Int(i), Value::Int(i))?;
                        }
                    }
                    Value::List(_) | Value::Map(_) | Value::Int(_) | Value::Nil => {
                        self.scoped(otherwise, dot)?;
                    }
                    other => {
                        return Err(exec_err(format!(
                            "range can't iterate over {}",
                            other.kind()
                        )))
                    }
                }
            }
        }
        Ok(())
    }

    fn pipeline(&mut self, pipe: &Pipeline, dot: &Value) -> Result<Value, TemplateError> {
        let mut piped: Option<Value> = None;
        for cmd in &pipe.cmds {
            piped = Some(self.command(cmd, dot, piped)?);
        }
        Ok(piped.unwrap_or_default())
    }

    fn command(
        &mut self,
        args: &[Arg],
        dot: &Value,
        piped: Option<Value>,
    ) -> Result<Value, TemplateError> {
        let Some(first) = args.first() else {
            return Err(exec_err("empty command"));
        };
        if let Term::Func(name) = &first.term {
            if first.chain.is_empty() {
                return self.call(name, &args[1..], dot, piped);
            }
        }
        if args.len() > 1 || piped.is_some() {
            return Err(exec_err("can't give argument to non-function"));
        }
        self.arg(first, dot)
    }

    fn arg(&mut self, arg: &Arg, dot: &Value) -> Result<Value, TemplateError> {
        let mut v = match &arg.term {
            Term::Dot => dot.clone(),
            Term::Var(name) => self
                .vars
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| exec_err(format!("undefined variable \"${name}\"")))?,
            Term::Lit(v) => v.clone(),
            Term::Func(name) => self.call(name, &[], dot, None)?,
            Term::Sub(pipe) => self.pipeline(pipe, dot)?,
        };
        for field in &arg.chain {
            v = field_of(&v, field)?;
        }
        Ok(v)
    }

    fn call(
        &mut self,
        name: &str,
        args: &[Arg],
        dot: &Value,
        piped: Option<Value>,
    ) -> Result<Value, TemplateError> {
        // `and` / `or` evaluate lazily.
        if name == "and" || name == "or" {
            let total = args.len() + usize::from(piped.is_some());
            if total == 0 {
                return Err(exec_err(format!("wrong number of args for {name}: want at least 1 got 0")));
            }
            let want = name == "or";
            let mut last = Value::Nil;
            for arg in args {
                last = self.arg(arg, dot)?;
                if last.truthy() == want {
                    return Ok(last);
                }
            }
            if let Some(p) = piped {
                last = p;
            }
            return Ok(last);
        }

        let mut vals = args
            .iter()
            .map(|a| self.arg(a, dot))
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(p) = piped {
            vals.push(p);
        }
        builtin(name, vals)
    }
}

fn field_of(v: &Value, name: &str) -> Result<Value, TemplateError> {
    match v {
        Value::Map(map) => map.get(name).cloned().ok_or_else(|| TemplateError::MissingKey {
            key: name.to_owned(),
        }),
        Value::Nil => Err(exec_err(format!("nil pointer evaluating .{name}"))),
        other => Err(exec_err(format!(
            "can't evaluate field {name} in type {}",
            other.kind()
        ))),
    }
}

fn want_args(name: &str, vals: &[Value], n: usize) -> Result<(), TemplateError> {
    if vals.len() == n {
        Ok(())
    } else {
        Err(exec_err(format!(
            "wrong number of args for {name}: want {n} got {}",
            vals.len()
        )))
    }
}

fn builtin(name: &str, vals: Vec<Value>) -> Result<Value, TemplateError> {
    match name {
        "not" => {
            want_args(name, &vals, 1)?;
            Ok(Value::Bool(!vals[0].truthy()))
        }
        "len" => {
            want_args(name, &vals, 1)?;
            let n = match &vals[0] {
                Value::Str(s) => s.len(),
                Value::List(l) => l.len(),
                Value::Map(m) => m.len(),
                other => return Err(exec_err(format!("len of type {}", other.kind()))),
            };
            Ok(Value::Int(i64::try_from(n).unwrap_or(i64::MAX)))
        }
        "index" => {
            let mut it = vals.into_iter();
            let mut cur = it
                .next()
                .ok_or_else(|| exec_err("wrong number of args for index: want at least 1 got 0"))?;
            for key in it {
                cur = index_of(&cur, &key)?;
            }
            Ok(cur)
        }
        "eq" => {
            if vals.len() < 2 {
                return Err(exec_err("missing argument for comparison"));
            }
            for other in &vals[1..] {
                if compare(&vals[0], other)? == std::cmp::Ordering::Equal {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        "ne" | "lt" | "le" | "gt" | "ge" => {
            want_args(name, &vals, 2)?;
            if name != "ne" && !matches!(vals[0], Value::Int(_) | Value::Str(_)) {
                return Err(exec_err(format!("invalid type for comparison: {}", vals[0].kind())));
            }
            let ord = compare(&vals[0], &vals[1])?;
            Ok(Value::Bool(match name {
                "ne" => ord.is_ne(),
                "lt" => ord.is_lt(),
                "le" => ord.is_le(),
                "gt" => ord.is_gt(),
                _ => ord.is_ge(),
            }))
        }
        "print" => Ok(Value::Str(sprint(&vals))),
        "println" => {
            let parts: Vec<String> = vals.iter().map(ToString::to_string).collect();
            Ok(Value::Str(format!("{}\n", parts.join(" "))))
        }
        "printf" => {
            let mut it = vals.into_iter();
            let Some(Value::Str(format)) = it.next() else {
                return Err(exec_err("printf requires a format string"));
            };
            Ok(Value::Str(sprintf(&format, &it.collect::<Vec<_>>())))
        }
        other => Err(exec_err(format!("function \"{other}\" not defined"))),
    }
}

fn index_of(item: &Value, key: &Value) -> Result<Value, TemplateError> {
    match (item, key) {
        (Value::Map(map), Value::Str(k)) => Ok(map.get(k).cloned().unwrap_or_default()),
        (Value::List(list), Value::Int(i)) => usize::try_from(*i)
            .ok()
            .and_then(|i| list.get(i))
            .cloned()
            .ok_or_else(|| exec_err(format!("index out of range: {i}"))),
        (Value::Nil, _) => Err(exec_err("index of untyped nil")),
        (item, key) => Err(exec_err(format!(
            "can't index item of type {} with {}",
            item.kind(),
            key.kind()
        ))),
    }
}

fn compare(a: &Value, b: &Value) -> Result<std::cmp::Ordering, TemplateError> {
    use std::cmp::Ordering;
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        (Value::Int(x), Value::Int(y)) => Ok(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Ok(x.cmp(y)),
        (Value::Nil, Value::Nil) => Ok(Ordering::Equal),
        (Value::List(_) | Value::Map(_), _) | (_, Value::List(_) | Value::Map(_)) => Err(exec_err(
            format!("non-comparable types {} and {}", a.kind(), b.kind()),
        )),
        _ => Err(exec_err(format!(
            "incompatible types for comparison: {} and {}",
            a.kind(),
            b.kind()
        ))),
    }
}

/// `fmt.Sprint`: a space between operands when neither side is a string.
fn sprint(vals: &[Value]) -> String {
    let mut out = String::new();
    for (i, v) in vals.iter().enumerate() {
        if i > 0 && !matches!(v, Value::Str(_)) && !matches!(vals[i - 1], Value::Str(_)) {
            out.push(' ');
        }
        let _ = write!(out, "{v}");
    }
    out
}

/// `fmt.Sprintf` for `%s %v %d %q %t %%`.
fn sprintf(format: &str, args: &[Value]) -> String {
    let mut out = String::new();
    let mut args = args.iter();
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }
        let Some(arg) = args.next() else {
            let _ = write!(out, "%!{verb}(MISSING)");
            continue;
        };
        let _ = match (verb, arg) {
            ('q', Value::Str(s)) => write!(out, "{s:?}"),
            ('d', Value::Int(_)) | ('t', Value::Bool(_)) | ('s' | 'v', _) => write!(out, "{arg}"),
            (verb, arg) => write!(out, "%!{verb}({}={arg})", arg.kind()),
        };
    }
    let extra: Vec<String> = args.map(|a| format!("{}={a}", a.kind())).collect();
    if !extra.is_empty() {
        let _ = write!(out, "%!(EXTRA {})", extra.join(", "));
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════════════
// Rule-facing source wrapper
// ═══════════════════════════════════════════════════════════════════════════════

/// Template source as written in a rule, parsed once on first use.
#[derive(Clone, Default)]
pub struct TemplateSource {
    source: String,
    parsed: OnceCell<Template>,
}

impl TemplateSource {
    /// Wrap template source.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            parsed: OnceCell::new(),
        }
    }

    /// The source text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns `true` for an empty template (nothing to expand).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// The parsed template, parsing on first call.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Parse`] for malformed source.
    pub fn template(&self) -> Result<&Template, TemplateError> {
        self.parsed.get_or_try_init(|| Template::parse(&self.source))
    }

    /// Execute and parse the output into `key=value` pairs.
    ///
    /// # Errors
    ///
    /// - [`RuleError::Template`] — parse or execution failure
    /// - [`RuleError::MissingTemplateValue`] — a non-blank output line has no `=`
    pub fn expand(&self, data: &Value) -> Result<BTreeMap<String, String>, RuleError> {
        let rendered = self.template()?.execute(data)?;
        parse_key_values(&rendered)
    }
}

/// Split rendered output into `key=value` records.
///
/// # Errors
///
/// Returns [`RuleError::MissingTemplateValue`] for a non-blank line without `=`.
pub fn parse_key_values(rendered: &str) -> Result<BTreeMap<String, String>, RuleError> {
    let mut out = BTreeMap::new();
    for line in rendered.split('\n') {
        if line.trim().is_empty() {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| RuleError::MissingTemplateValue {
                line: line.to_owned(),
            })?;
        out.insert(key.to_owned(), value.to_owned());
    }
    Ok(out)
}

impl PartialEq for TemplateSource {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for TemplateSource {}

impl fmt::Debug for TemplateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TemplateSource").field(&self.source).finish()
    }
}

impl From<&str> for TemplateSource {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TemplateSource {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl Serialize for TemplateSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for TemplateSource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}
