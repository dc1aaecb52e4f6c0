//! Static resolution: turns parsed chunks into executable ops.
//!
//! The compiler decides, before anything runs:
//!
//! - **Variables**: which frame (or captured cell, builtin, environment
//!   entry, or namespace member) every `$name` refers to. An unresolvable
//!   name is a [`CompileError`], even on a branch that never executes.
//! - **Command heads**: special form, then `name~` function binding, then
//!   builtin, else external. Only the external *path* is left to run time.
//! - **Closures**: which outer cells each lambda captures.
//!
//! ```text
//!   Chunk ──▶ Compiler ──▶ ChunkOp
//!              │  StaticScope (frames, captures)
//!              │  BuiltinRegistry (builtin heads)
//!              └─ SpecialForm table (if, while, for, try, fn, ...)
//! ```

mod compile;
mod error;
mod ops;
mod scope;
mod special;

pub use compile::{compile, MAX_FD};
pub use error::{CompileError, CompileErrorKind};
pub use ops::{
    AssignOp, CallOp, ChunkOp, DelTarget, ExceptClause, FormKind, FormOp, HeadOp, LambdaOp,
    PipelineOp, RedirOp, RedirTargetOp, SpecialOp, TargetOp, ValueOp, VarRef,
};
pub use scope::{Capture, CaptureSource, StaticScope};
pub use special::SpecialForm;
