//! Exceptions and flow-control signals.
//!
//! Errors, `break`/`continue`/`return`, and concurrent pipeline failures all
//! travel through the same `Err(Exception)` channel. Code that handles them
//! matches on [`ExceptionKind`]; a flow signal is never mistaken for an
//! error because it is a different variant, not a different message.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::ast::Span;

use super::value::Value;

/// Result type for everything that evaluates.
pub type EvalResult<T = ()> = Result<T, Exception>;

/// Why an evaluation failed.
#[derive(Debug, Clone, Error)]
pub enum ErrorCause {
    /// Raised by `fail`.
    #[error("{0}")]
    Fail(Value),

    #[error("arity mismatch: {what} wants {expected} values, got {got}")]
    ArityMismatch {
        what: String,
        expected: String,
        got: usize,
    },

    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("{cmd} exited with status {status}")]
    ExternalExit { cmd: String, status: i32 },

    #[error("wildcard has no match: {0}")]
    NoMatch(String),

    /// The reading end of an output port went away.
    #[error("reader gone")]
    ReaderGone,

    #[error("{0}")]
    Type(String),

    #[error("{0}")]
    Index(String),

    #[error("no such variable: {0}")]
    NoSuchVariable(String),

    #[error("module: {0}")]
    Module(String),

    #[error("compilation error: {0}")]
    Compilation(String),

    #[error("i/o error: {0}")]
    Io(String),
}

impl ErrorCause {
    /// Stable tag exposed as `$e[kind]`.
    pub fn tag(&self) -> &'static str {
        match self {
            ErrorCause::Fail(_) => "fail",
            ErrorCause::ArityMismatch { .. } => "arity-mismatch",
            ErrorCause::CommandNotFound(_) => "command-not-found",
            ErrorCause::ExternalExit { .. } => "external-exit",
            ErrorCause::NoMatch(_) => "no-match",
            ErrorCause::ReaderGone => "reader-gone",
            ErrorCause::Type(_) => "type",
            ErrorCause::Index(_) => "index",
            ErrorCause::NoSuchVariable(_) => "no-such-variable",
            ErrorCause::Module(_) => "module",
            ErrorCause::Compilation(_) => "compilation",
            ErrorCause::Io(_) => "io",
        }
    }
}

impl From<std::io::Error> for ErrorCause {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::BrokenPipe {
            ErrorCause::ReaderGone
        } else {
            ErrorCause::Io(e.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Break,
    Continue,
    Return,
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flow::Break => write!(f, "break"),
            Flow::Continue => write!(f, "continue"),
            Flow::Return => write!(f, "return"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ExceptionKind {
    Error(ErrorCause),
    /// Two or more failures from one pipeline, in command-position order.
    Composite(Vec<Exception>),
    Flow(Flow),
}

/// Where in which chunk a failure passed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub source: Arc<str>,
    pub span: Span,
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.source, self.span.start, self.span.end)
    }
}

#[derive(Debug, Clone)]
pub struct Exception {
    pub kind: ExceptionKind,
    /// Innermost position first.
    pub traceback: Vec<TraceEntry>,
}

impl Exception {
    pub fn new(cause: ErrorCause) -> Self {
        Self {
            kind: ExceptionKind::Error(cause),
            traceback: Vec::new(),
        }
    }

    pub fn flow(flow: Flow) -> Self {
        Self {
            kind: ExceptionKind::Flow(flow),
            traceback: Vec::new(),
        }
    }

    /// Callers pass at least two failures; one failure is never wrapped.
    pub fn composite(causes: Vec<Exception>) -> Self {
        Self {
            kind: ExceptionKind::Composite(causes),
            traceback: Vec::new(),
        }
    }

    pub fn fail(reason: impl Into<Value>) -> Self {
        Self::new(ErrorCause::Fail(reason.into()))
    }

    pub fn cause(&self) -> Option<&ErrorCause> {
        match &self.kind {
            ExceptionKind::Error(c) => Some(c),
            _ => None,
        }
    }

    /// Constituents of a composite exception, empty otherwise.
    pub fn causes(&self) -> &[Exception] {
        match &self.kind {
            ExceptionKind::Composite(causes) => causes,
            _ => &[],
        }
    }

    pub fn flow_kind(&self) -> Option<Flow> {
        match &self.kind {
            ExceptionKind::Flow(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_flow(&self) -> bool {
        self.flow_kind().is_some()
    }

    pub fn is_reader_gone(&self) -> bool {
        matches!(self.kind, ExceptionKind::Error(ErrorCause::ReaderGone))
    }

    /// Record that the failure passed through `entry`. Flow signals carry no
    /// traceback.
    pub fn push_trace(&mut self, entry: &TraceEntry) {
        if self.is_flow() || self.traceback.last() == Some(entry) {
            return;
        }
        self.traceback.push(entry.clone());
    }

    pub fn with_trace(mut self, entry: &TraceEntry) -> Self {
        self.push_trace(entry);
        self
    }

    /// The payload shown as `$e[reason]`: the value given to `fail`, or the
    /// error message for everything else.
    pub fn reason(&self) -> Value {
        match &self.kind {
            ExceptionKind::Error(ErrorCause::Fail(v)) => v.clone(),
            _ => Value::String(self.to_string()),
        }
    }

    /// Field access for exception values: `reason`, `kind`, `causes`,
    /// `status` (external exits) and `traceback`.
    pub fn field(&self, key: &str) -> Option<Value> {
        match key {
            "reason" => Some(self.reason()),
            "kind" => Some(Value::from(match &self.kind {
                ExceptionKind::Error(c) => c.tag(),
                ExceptionKind::Composite(_) => "composite",
                ExceptionKind::Flow(_) => "flow",
            })),
            "causes" => Some(Value::list(
                self.causes().iter().cloned().map(Value::exception),
            )),
            "status" => match &self.kind {
                ExceptionKind::Error(ErrorCause::ExternalExit { status, .. }) => {
                    Some(Value::String(status.to_string()))
                }
                _ => None,
            },
            "traceback" => Some(Value::list(
                self.traceback.iter().map(|t| Value::String(t.to_string())),
            )),
            _ => None,
        }
    }

    /// Multi-line rendering for front ends: message, then traceback.
    pub fn report(&self) -> String {
        let mut out = format!("Exception: {self}\n");
        for entry in &self.traceback {
            out.push_str(&format!("  at {entry}\n"));
        }
        for (i, cause) in self.causes().iter().enumerate() {
            for line in cause.report().lines() {
                let prefix = if line.starts_with("Exception") {
                    format!("  [{i}] ")
                } else {
                    "    ".to_string()
                };
                out.push_str(&format!("{prefix}{}\n", line.trim_start()));
            }
        }
        out
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExceptionKind::Error(c) => write!(f, "{c}"),
            ExceptionKind::Composite(causes) => {
                write!(f, "{} exceptions:", causes.len())?;
                for c in causes {
                    write!(f, " [{c}]")?;
                }
                Ok(())
            }
            ExceptionKind::Flow(flow) => write!(f, "{flow} outside of its construct"),
        }
    }
}

impl std::error::Error for Exception {}

impl From<ErrorCause> for Exception {
    fn from(cause: ErrorCause) -> Self {
        Exception::new(cause)
    }
}

impl From<std::io::Error> for Exception {
    fn from(e: std::io::Error) -> Self {
        Exception::new(e.into())
    }
}
