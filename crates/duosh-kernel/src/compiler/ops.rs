//! Compiled operations.
//!
//! The compiler lowers a [`Chunk`](crate::ast::Chunk) into these. Every
//! decision that can be made statically is already made: which frame a
//! variable lives in, whether a command head is a special form, a function
//! binding, a builtin, or an external program.

use std::fmt;
use std::sync::Arc;

use crate::ast::RedirMode;
use crate::builtins::Builtin;
use crate::interpreter::{TraceEntry, Value};

use super::scope::Capture;

/// How a variable reference reaches its cell at run time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarRef {
    /// The current activation's frame.
    Local(String),
    /// A cell the current closure captured.
    Captured(String),
    /// Read-only builtin variable (`$true`, `$ok`, ...).
    Builtin(String),
    /// `E:NAME`, the process environment.
    Env(String),
    /// Member of an imported namespace.
    Ns { ns: Box<VarRef>, member: String },
}

impl VarRef {
    /// Source-level name, for messages.
    pub fn display_name(&self) -> String {
        match self {
            VarRef::Local(n) | VarRef::Captured(n) | VarRef::Builtin(n) => n.clone(),
            VarRef::Env(n) => format!("E:{n}"),
            VarRef::Ns { ns, member } => format!("{}{member}", ns.display_name()),
        }
    }
}

#[derive(Debug, Default)]
pub struct ChunkOp {
    pub pipelines: Vec<PipelineOp>,
}

#[derive(Debug, Clone)]
pub struct PipelineOp {
    pub forms: Vec<Arc<FormOp>>,
    pub background: bool,
    pub pos: TraceEntry,
    /// Source rendering, used to describe background jobs.
    pub text: Arc<str>,
}

#[derive(Debug)]
pub struct FormOp {
    pub temp_assigns: Vec<AssignOp>,
    pub kind: FormKind,
    pub redirs: Vec<RedirOp>,
    pub pos: TraceEntry,
}

#[derive(Debug)]
pub enum FormKind {
    Assign(AssignOp),
    Special(SpecialOp),
    Call(CallOp),
}

#[derive(Debug)]
pub struct AssignOp {
    pub targets: Vec<TargetOp>,
    pub values: Vec<ValueOp>,
}

#[derive(Debug)]
pub struct TargetOp {
    pub var: VarRef,
    pub indices: Vec<ValueOp>,
    pub rest: bool,
}

#[derive(Debug)]
pub struct CallOp {
    pub head: HeadOp,
    pub args: Vec<ValueOp>,
    pub opts: Vec<(String, ValueOp)>,
}

/// The statically resolved kind of a command head.
pub enum HeadOp {
    /// A `name~` binding holding a closure.
    Function { name: String, var: VarRef },
    Builtin(Arc<dyn Builtin>),
    /// Searched on `PATH` when the form runs.
    External(String),
    /// Head computed at run time (`$f args`).
    Dynamic(ValueOp),
}

impl fmt::Debug for HeadOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeadOp::Function { name, var } => {
                f.debug_struct("Function").field("name", name).field("var", var).finish()
            }
            HeadOp::Builtin(b) => f.debug_tuple("Builtin").field(&b.name()).finish(),
            HeadOp::External(name) => f.debug_tuple("External").field(name).finish(),
            HeadOp::Dynamic(v) => f.debug_tuple("Dynamic").field(v).finish(),
        }
    }
}

#[derive(Debug)]
pub enum ValueOp {
    Literal(Value),
    Var { var: VarRef, explode: bool },
    Index { base: Box<ValueOp>, indices: Vec<ValueOp> },
    List(Vec<ValueOp>),
    Map(Vec<(ValueOp, ValueOp)>),
    Lambda(Arc<LambdaOp>),
    OutputCapture(Arc<ChunkOp>),
    ExceptionCapture(Arc<ChunkOp>),
    Compound(Vec<ValueOp>),
    Wildcard { pattern: String, nomatch_ok: bool },
}

#[derive(Debug)]
pub struct LambdaOp {
    pub params: Vec<String>,
    pub rest: Option<String>,
    pub captures: Vec<Capture>,
    pub body: Arc<ChunkOp>,
    pub pos: TraceEntry,
}

impl LambdaOp {
    /// Human-readable arity, as reported by `ArityMismatch`.
    pub fn arity(&self) -> String {
        match self.rest {
            Some(_) => format!("{} or more", self.params.len()),
            None => self.params.len().to_string(),
        }
    }
}

#[derive(Debug)]
pub struct RedirOp {
    pub fd: u32,
    pub mode: RedirMode,
    pub target: RedirTargetOp,
}

#[derive(Debug)]
pub enum RedirTargetOp {
    Path(ValueOp),
    Fd(u32),
    Close,
}

/// Special forms after compilation. Bodies are inline chunks that run in
/// the enclosing frame.
#[derive(Debug)]
pub enum SpecialOp {
    If {
        branches: Vec<(ValueOp, Arc<ChunkOp>)>,
        else_body: Option<Arc<ChunkOp>>,
    },
    While {
        cond: ValueOp,
        body: Arc<ChunkOp>,
        else_body: Option<Arc<ChunkOp>>,
    },
    For {
        var: VarRef,
        container: ValueOp,
        body: Arc<ChunkOp>,
        else_body: Option<Arc<ChunkOp>>,
    },
    Try {
        body: Arc<ChunkOp>,
        except: Option<ExceptClause>,
        else_body: Option<Arc<ChunkOp>>,
        finally: Option<Arc<ChunkOp>>,
    },
    Fn {
        var: VarRef,
        lambda: Arc<LambdaOp>,
    },
    And(Vec<ValueOp>),
    Or(Vec<ValueOp>),
    Del(Vec<DelTarget>),
    Use {
        spec: String,
        var: VarRef,
    },
}

#[derive(Debug)]
pub struct ExceptClause {
    pub var: Option<VarRef>,
    pub body: Arc<ChunkOp>,
}

#[derive(Debug)]
pub struct DelTarget {
    pub var: VarRef,
    pub indices: Vec<ValueOp>,
}
