//! duosh-kernel: the interpreter core of duosh.
//!
//! This crate provides:
//!
//! - **AST**: Parsed-chunk types, accepted as JSON from an external parser
//! - **Compiler**: Static name resolution and special forms, producing ops
//! - **Interpreter**: Values, exceptions, closures and op evaluation
//! - **Scheduler**: Dual-stream ports, pipelines and background jobs
//! - **Builtins**: Builtin trait, registry, and the core commands
//! - **Modules**: `use` resolution, loading and caching
//! - **Kernel**: The facade tying it all together
//! - **Paths**: XDG-compliant path helpers

pub mod ast;
pub mod builtins;
pub mod compiler;
pub mod config;
pub mod external;
pub mod glob;
pub mod interpreter;
pub mod kernel;
pub mod modules;
pub mod paths;
pub mod scheduler;

pub use compiler::{CompileError, CompileErrorKind};
pub use config::{ConfigError, KernelConfig};
pub use interpreter::{ErrorCause, ExecResult, Exception, Value};
pub use kernel::Kernel;

// XDG path primitives (embedders compose their own paths)
pub use paths::{home_dir, xdg_config_home, xdg_data_home};
