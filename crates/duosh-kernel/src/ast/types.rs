//! AST type definitions.
//!
//! Every type round-trips through serde so chunks can cross a process
//! boundary as JSON. Enum variants are `snake_case` and externally tagged:
//!
//! ```json
//! {"pipelines": [{"forms": [{"body": {"command": {
//!     "head": {"bareword": "echo"},
//!     "args": [{"quoted": "hello"}]
//! }}}]}]}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Byte range in the source text the chunk was parsed from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// A code chunk: pipelines run in order, stopping at the first failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(default)]
    pub pipelines: Vec<Pipeline>,
}

/// Forms connected by `|`, optionally backgrounded with `&`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub forms: Vec<Form>,
    #[serde(default)]
    pub background: bool,
    #[serde(default)]
    pub span: Span,
}

/// One pipeline component: `a=x b=y cmd args > file`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form {
    /// Temporary assignments in effect for the duration of `body`.
    #[serde(default)]
    pub temp_assigns: Vec<Assignment>,
    pub body: FormBody,
    #[serde(default)]
    pub redirs: Vec<Redir>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormBody {
    /// `x y = a b`
    Assign(Assignment),
    /// `head args... &opt=value`
    Command(Command),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub head: Expr,
    #[serde(default)]
    pub args: Vec<Expr>,
    #[serde(default)]
    pub opts: Vec<Opt>,
}

/// `&name=value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opt {
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub targets: Vec<Target>,
    pub values: Vec<Expr>,
}

/// Left-hand side of an assignment: `name`, `name[k1][k2]`, or `@name`.
///
/// `name` keeps its namespace prefix (`local:x`, `up:x`, `E:HOME`, `mod:x`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    #[serde(default)]
    pub indices: Vec<Expr>,
    #[serde(default)]
    pub rest: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Redir {
    pub fd: u32,
    pub mode: RedirMode,
    pub target: RedirTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirMode {
    /// `<`
    Read,
    /// `>`
    Write,
    /// `>>`
    Append,
    /// `<>`
    ReadWrite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirTarget {
    /// A file path expression.
    Path(Expr),
    /// `>&2`
    Fd(u32),
    /// `>&-`
    Close,
}

/// Lambda parameter; `rest` marks `@name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(default)]
    pub rest: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Bareword(String),
    Quoted(String),
    /// `$name`, or `$@name` when `explode` is set.
    Variable {
        name: String,
        #[serde(default)]
        explode: bool,
    },
    /// `base[i][j]`
    Index { base: Box<Expr>, indices: Vec<Expr> },
    /// `[a b c]`
    List(Vec<Expr>),
    /// `[&k=v]`
    Map(Vec<(Expr, Expr)>),
    /// `{|a @rest| body }`
    Lambda {
        #[serde(default)]
        params: Vec<Param>,
        body: Chunk,
    },
    /// `(chunk)`
    OutputCapture(Chunk),
    /// `?(chunk)`
    ExceptionCapture(Chunk),
    /// Adjacent parts concatenated: `a$x'b'`
    Compound(Vec<Expr>),
    /// A word the parser marked as a wildcard pattern.
    Wildcard {
        pattern: String,
        #[serde(default)]
        nomatch_ok: bool,
    },
}

impl Expr {
    /// The literal text of a bareword or quoted string.
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Expr::Bareword(s) | Expr::Quoted(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Bareword(s) => write!(f, "{s}"),
            Expr::Quoted(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Expr::Variable { name, explode } => {
                write!(f, "${}{name}", if *explode { "@" } else { "" })
            }
            Expr::Index { base, indices } => {
                write!(f, "{base}")?;
                for i in indices {
                    write!(f, "[{i}]")?;
                }
                Ok(())
            }
            Expr::List(items) => {
                write!(f, "[")?;
                write_spaced(f, items)?;
                write!(f, "]")
            }
            Expr::Map(pairs) => {
                write!(f, "[")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "&{k}={v}")?;
                }
                if pairs.is_empty() {
                    write!(f, "&")?;
                }
                write!(f, "]")
            }
            Expr::Lambda { params, body } => {
                write!(f, "{{")?;
                if !params.is_empty() {
                    write!(f, "|")?;
                    for (i, p) in params.iter().enumerate() {
                        if i > 0 {
                            write!(f, " ")?;
                        }
                        write!(f, "{}{}", if p.rest { "@" } else { "" }, p.name)?;
                    }
                    write!(f, "|")?;
                }
                write!(f, " {body} }}")
            }
            Expr::OutputCapture(c) => write!(f, "({c})"),
            Expr::ExceptionCapture(c) => write!(f, "?({c})"),
            Expr::Compound(parts) => parts.iter().try_for_each(|p| write!(f, "{p}")),
            Expr::Wildcard { pattern, .. } => write!(f, "{pattern}"),
        }
    }
}

fn write_spaced<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, t) in self.targets.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}{}", if t.rest { "@" } else { "" }, t.name)?;
            for idx in &t.indices {
                write!(f, "[{idx}]")?;
            }
        }
        write!(f, " = ")?;
        write_spaced(f, &self.values)
    }
}

impl fmt::Display for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for t in &self.temp_assigns {
            // Temporary assignments render compactly: `x=v`
            let lhs: Vec<String> = t.targets.iter().map(|t| t.name.clone()).collect();
            write!(f, "{}=", lhs.join(" "))?;
            write_spaced(f, &t.values)?;
            write!(f, " ")?;
        }
        match &self.body {
            FormBody::Assign(a) => write!(f, "{a}")?,
            FormBody::Command(c) => {
                write!(f, "{}", c.head)?;
                for a in &c.args {
                    write!(f, " {a}")?;
                }
                for o in &c.opts {
                    write!(f, " &{}={}", o.name, o.value)?;
                }
            }
        }
        for r in &self.redirs {
            let op = match r.mode {
                RedirMode::Read => "<",
                RedirMode::Write => ">",
                RedirMode::Append => ">>",
                RedirMode::ReadWrite => "<>",
            };
            match &r.target {
                RedirTarget::Path(p) => write!(f, " {}{op}{p}", r.fd)?,
                RedirTarget::Fd(n) => write!(f, " {}{op}&{n}", r.fd)?,
                RedirTarget::Close => write!(f, " {}{op}&-", r.fd)?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, form) in self.forms.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{form}")?;
        }
        if self.background {
            write!(f, " &")?;
        }
        Ok(())
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, p) in self.pipelines.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{p}")?;
        }
        Ok(())
    }
}
