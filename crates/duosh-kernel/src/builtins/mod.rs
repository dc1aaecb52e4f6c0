//! Builtin commands and variables for duosh.
//!
//! Builtins are commands implemented inside the kernel. They receive
//! evaluated arguments and the caller's context, so they read and write the
//! same ports a closure body would.
//!
//! # Architecture
//!
//! ```text
//! BuiltinRegistry
//! ├── I/O        (echo, print, put, all, slurp, from-lines, to-lines)
//! ├── Logic      (not, bool, eq, not-eq)
//! ├── Flow       (fail, nop, break, continue, return, each)
//! ├── JSON       (to-json, from-json)
//! └── Jobs       (jobs, wait)
//! ```

mod each;
mod flow;
mod inputs;
mod io;
mod jobs;
mod json;
mod logic;
mod registry;
mod traits;
mod vars;

use crate::interpreter::Flow;

pub use inputs::Inputs;
pub use registry::BuiltinRegistry;
pub use traits::{invoke, Builtin, BuiltinArgs, BuiltinSchema, OptSchema, ParamSchema};
pub use vars::{builtin_var, is_builtin_var, BUILTIN_VARS};

/// Register all builtins with the registry.
pub fn register_builtins(registry: &mut BuiltinRegistry) {
    registry.register(io::Echo);
    registry.register(io::Print);
    registry.register(io::Put);
    registry.register(io::All);
    registry.register(io::Slurp);
    registry.register(io::FromLines);
    registry.register(io::ToLines);
    registry.register(logic::Not);
    registry.register(logic::Bool);
    registry.register(logic::Eq);
    registry.register(logic::NotEq);
    registry.register(flow::Fail);
    registry.register(flow::Nop);
    registry.register(flow::FlowCommand(Flow::Break));
    registry.register(flow::FlowCommand(Flow::Continue));
    registry.register(flow::FlowCommand(Flow::Return));
    registry.register(each::Each);
    registry.register(json::ToJson);
    registry.register(json::FromJson);
    registry.register(jobs::Jobs);
    registry.register(jobs::Wait);
}
