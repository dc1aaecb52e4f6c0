//! Execution context threaded through evaluation.
//!
//! An [`ExecContext`] is cheap to clone: every field is an `Arc` or a table
//! of `Arc`s. Pipeline commands each get their own clone with their own
//! [`Ports`], while sharing the frame, captures, and environment.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use crate::builtins::{builtin_var, BuiltinRegistry};
use crate::compiler::VarRef;
use crate::glob::Globber;
use crate::modules::ModuleLoader;
use crate::scheduler::{InPort, JobManager, OutPort, Ports};

use super::exception::{ErrorCause, EvalResult};
use super::scope::{Cell, Frame};
use super::value::Value;

/// The process environment as seen by evaluated code.
///
/// Seeded from the host environment once and then owned by the kernel, so
/// `E:` assignments never race with other threads through `std::env`.
/// External commands receive a snapshot.
#[derive(Debug, Default)]
pub struct EnvVars {
    vars: RwLock<BTreeMap<String, String>>,
}

impl EnvVars {
    pub fn from_host() -> Self {
        Self {
            vars: RwLock::new(std::env::vars().collect()),
        }
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.vars
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    pub fn set(&self, name: &str, value: impl Into<String>) {
        self.vars
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), value.into());
    }

    pub fn remove(&self, name: &str) {
        self.vars
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name);
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.vars.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Services shared by everything a kernel evaluates.
pub struct EvalEnv {
    pub builtins: Arc<BuiltinRegistry>,
    pub modules: ModuleLoader,
    pub jobs: Arc<JobManager>,
    pub globber: Arc<dyn Globber>,
    pub env_vars: EnvVars,
    pub pipe_buffer: usize,
    pub value_buffer: usize,
}

#[derive(Clone)]
pub struct ExecContext {
    pub frame: Arc<Frame>,
    pub captures: Arc<HashMap<String, Cell>>,
    pub ports: Ports,
    pub env: Arc<EvalEnv>,
    /// Module keys currently being loaded, outermost first.
    pub imports: Arc<Vec<String>>,
}

impl ExecContext {
    pub fn new(frame: Arc<Frame>, ports: Ports, env: Arc<EvalEnv>) -> Self {
        Self {
            frame,
            captures: Arc::new(HashMap::new()),
            ports,
            env,
            imports: Arc::new(Vec::new()),
        }
    }

    pub fn with_ports(&self, ports: Ports) -> Self {
        Self {
            ports,
            ..self.clone()
        }
    }

    /// Context for a lambda activation.
    pub fn enter(&self, frame: Arc<Frame>, captures: Arc<HashMap<String, Cell>>) -> Self {
        Self {
            frame,
            captures,
            ..self.clone()
        }
    }

    /// The cell behind a frame, capture, or namespace reference.
    pub fn cell(&self, var: &VarRef) -> EvalResult<Cell> {
        match var {
            VarRef::Local(name) => Ok(self.frame.get_or_create(name)),
            VarRef::Captured(name) => self
                .captures
                .get(name)
                .cloned()
                .ok_or_else(|| ErrorCause::NoSuchVariable(name.clone()).into()),
            VarRef::Ns { ns, member } => match self.read_var(ns)? {
                Value::Namespace(namespace) => namespace.get(member).ok_or_else(|| {
                    ErrorCause::NoSuchVariable(format!("{}{member}", ns.display_name())).into()
                }),
                other => Err(ErrorCause::Type(format!(
                    "{} is a {}, not a namespace",
                    ns.display_name(),
                    other.kind()
                ))
                .into()),
            },
            VarRef::Builtin(name) | VarRef::Env(name) => Err(ErrorCause::Type(format!(
                "${name} has no cell"
            ))
            .into()),
        }
    }

    pub fn read_var(&self, var: &VarRef) -> EvalResult<Value> {
        match var {
            VarRef::Builtin(name) => {
                builtin_var(name).ok_or_else(|| ErrorCause::NoSuchVariable(name.clone()).into())
            }
            VarRef::Env(name) => Ok(Value::String(self.env.env_vars.get(name).unwrap_or_default())),
            other => Ok(self.cell(other)?.get()),
        }
    }

    pub fn write_var(&self, var: &VarRef, value: Value) -> EvalResult {
        match var {
            VarRef::Env(name) => {
                let s = value.expect_string("environment variable")?;
                self.env.env_vars.set(name, s);
                Ok(())
            }
            other => {
                self.cell(other)?.set(value);
                Ok(())
            }
        }
    }

    /// Current value, or `None` when the variable has never been set.
    pub fn peek_var(&self, var: &VarRef) -> EvalResult<Option<Value>> {
        match var {
            VarRef::Local(name) => Ok(self.frame.get(name).map(|c| c.get())),
            VarRef::Env(name) => Ok(self.env.env_vars.get(name).map(Value::String)),
            other => self.read_var(other).map(Some),
        }
    }

    pub fn stdin(&self) -> Option<&InPort> {
        self.ports.input(0)
    }

    pub fn stdout(&self) -> Result<&OutPort, ErrorCause> {
        self.ports.expect_output(1)
    }

    /// Emit a value on fd 1.
    pub async fn put(&self, value: Value) -> EvalResult {
        self.stdout()?.put(value).await
    }

    /// Write text to fd 1.
    pub async fn write_out(&self, text: &str) -> EvalResult {
        self.stdout()?.write_str(text).await
    }

    /// Write text to fd 2.
    pub async fn write_err(&self, text: &str) -> EvalResult {
        self.ports.expect_output(2)?.write_str(text).await
    }
}
