//! Interpreter module for duosh.
//!
//! Runs the ops the compiler produced against live cells and ports.
//!
//! # Architecture
//!
//! The interpreter is built in layers:
//!
//! - **Value**: strings, booleans, lists, maps, closures, exceptions and
//!   namespaces, all immutable and cheap to clone
//! - **Exception**: one failure channel for errors, composite pipeline
//!   failures and `break`/`continue`/`return`
//! - **Scope**: shared cells, activation frames and module namespaces
//! - **ExecContext**: the frame, captures and descriptor table a form runs
//!   with
//! - **Eval / control flow**: forms, value expressions and special forms
//!
//! Pipelines themselves live in [`crate::scheduler`]; this layer hands each
//! pipeline over and gets one outcome back.

mod closure;
mod context;
mod control_flow;
mod eval;
mod exception;
mod result;
mod scope;
mod value;

pub use closure::Closure;
pub use context::{EnvVars, EvalEnv, ExecContext};
pub use control_flow::{loop_step, LoopStep};
pub use eval::{
    assign_values, call_value, capture_output, eval_all, eval_chunk, eval_form, eval_single,
    eval_value,
};
pub use exception::{
    ErrorCause, EvalResult, Exception, ExceptionKind, Flow, TraceEntry,
};
pub use result::ExecResult;
pub use scope::{Cell, Frame, Namespace};
pub use value::Value;
