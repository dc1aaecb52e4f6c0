//! The Kernel: the heart of duosh.
//!
//! The Kernel owns and coordinates all core components:
//! - The global frame and the names compiled against it
//! - Builtin registry
//! - Module loader and its cache
//! - Job manager (background pipelines)
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                          Kernel                            │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────┐  │
//! │  │ global Frame │  │   Builtin    │  │  ModuleLoader    │  │
//! │  │ + static     │  │   Registry   │  │  (source+cache)  │  │
//! │  │   names      │  │              │  │                  │  │
//! │  └──────────────┘  └──────────────┘  └──────────────────┘  │
//! │  ┌──────────────────────────────┐  ┌──────────────────┐    │
//! │  │  JobManager (background)     │  │  EnvVars (E:)    │    │
//! │  └──────────────────────────────┘  └──────────────────┘    │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each `execute` compiles a chunk against the names earlier chunks left in
//! the global frame, runs it with collected stdout and stderr, and returns
//! everything in one [`ExecResult`].

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tracing::debug;

use crate::ast::Chunk;
use crate::builtins::BuiltinRegistry;
use crate::compiler::{compile, ChunkOp, CompileError, StaticScope};
use crate::config::KernelConfig;
use crate::glob::{FsGlobber, Globber};
use crate::interpreter::{
    eval_chunk, EnvVars, EvalEnv, ExecContext, ExecResult, Frame, Value,
};
use crate::modules::{FsModuleSource, ModuleCache, ModuleLoader, ModuleSource};
use crate::scheduler::{drain, port_pair, InPort, JobId, JobManager, Ports};

/// Source name used in tracebacks when the caller gives none.
pub const DEFAULT_SOURCE_NAME: &str = "<chunk>";

/// The Kernel: executes duosh chunks.
pub struct Kernel {
    config: KernelConfig,
    env: Arc<EvalEnv>,
    globals: Arc<Frame>,
    /// Names the global frame is known to bind, for compiling later chunks.
    global_names: Mutex<HashSet<String>>,
}

impl Kernel {
    /// Create a kernel whose modules load from `config.module_root`.
    pub fn new(config: KernelConfig) -> Result<Self> {
        let source = Arc::new(FsModuleSource::new(config.module_root.clone()));
        Ok(Self::with_parts(
            config,
            source,
            Arc::new(FsGlobber),
            Arc::new(ModuleCache::new()),
        ))
    }

    /// Create a transient kernel with default settings.
    pub fn transient() -> Result<Self> {
        Self::new(KernelConfig::transient())
    }

    /// Create a kernel with a custom module source.
    pub fn with_module_source(config: KernelConfig, source: Arc<dyn ModuleSource>) -> Self {
        Self::with_parts(config, source, Arc::new(FsGlobber), Arc::new(ModuleCache::new()))
    }

    /// Full assembly. A shared `cache` lets several kernels evaluate each
    /// module once between them.
    pub fn with_parts(
        config: KernelConfig,
        source: Arc<dyn ModuleSource>,
        globber: Arc<dyn Globber>,
        cache: Arc<ModuleCache>,
    ) -> Self {
        let env = EvalEnv {
            builtins: Arc::new(BuiltinRegistry::with_defaults()),
            modules: ModuleLoader::new(source, cache, config.module_extension.clone()),
            jobs: Arc::new(JobManager::new()),
            globber,
            env_vars: EnvVars::from_host(),
            pipe_buffer: config.pipe_buffer,
            value_buffer: config.value_buffer,
        };
        debug!(kernel = %config.name, "kernel created");
        Self {
            config,
            env: Arc::new(env),
            globals: Arc::new(Frame::new()),
            global_names: Mutex::new(HashSet::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Compile against the current global names. On success the names the
    /// chunk declares at top level are remembered for later chunks.
    pub fn compile(&self, chunk: &Chunk, source_name: &str) -> Result<ChunkOp, CompileError> {
        let mut names = self
            .global_names
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let mut scope = StaticScope::with_globals(names.iter().cloned());
        let op = compile(chunk, &mut scope, &self.env.builtins, source_name)?;
        *names = scope.global_names();
        Ok(op)
    }

    /// Execute a chunk with empty stdin.
    ///
    /// A compile error is returned as `Err` (recover it with
    /// `downcast_ref::<CompileError>()`); a runtime failure is reported in
    /// [`ExecResult::exception`].
    pub async fn execute(&self, chunk: &Chunk) -> Result<ExecResult> {
        self.execute_with_stdin(chunk, DEFAULT_SOURCE_NAME, InPort::empty())
            .await
    }

    /// Execute a chunk named `source_name` in tracebacks.
    pub async fn execute_named(&self, chunk: &Chunk, source_name: &str) -> Result<ExecResult> {
        self.execute_with_stdin(chunk, source_name, InPort::empty())
            .await
    }

    /// Execute a chunk that arrives as JSON.
    pub async fn execute_json(&self, json: &str, source_name: &str) -> Result<ExecResult> {
        let chunk: Chunk = serde_json::from_str(json).context("decoding chunk json")?;
        self.execute_named(&chunk, source_name).await
    }

    #[tracing::instrument(level = "info", skip(self, chunk, stdin), fields(kernel = %self.config.name))]
    pub async fn execute_with_stdin(
        &self,
        chunk: &Chunk,
        source_name: &str,
        stdin: InPort,
    ) -> Result<ExecResult> {
        let op = self.compile(chunk, source_name)?;

        let (out, out_reader) = port_pair(self.env.pipe_buffer, self.env.value_buffer);
        let (err, err_reader) = port_pair(self.env.pipe_buffer, self.env.value_buffer);
        let ctx = ExecContext::new(
            self.globals.clone(),
            Ports::standard(stdin, out, err),
            self.env.clone(),
        );

        let run = async move {
            let result = eval_chunk(&op, &ctx).await;
            drop(ctx);
            result
        };
        let (result, (out, values), (err, _)) =
            tokio::join!(run, drain(out_reader), drain(err_reader));

        if let Err(e) = &result {
            debug!(error = %e, "chunk failed");
        }
        Ok(ExecResult {
            out: String::from_utf8_lossy(&out).into_owned(),
            err: String::from_utf8_lossy(&err).into_owned(),
            values,
            exception: result.err(),
        })
    }

    /// Current value of a global variable.
    pub fn get_var(&self, name: &str) -> Option<Value> {
        self.globals.get(name).map(|cell| cell.get())
    }

    /// Bind a global variable; later chunks can refer to it.
    pub fn set_var(&self, name: &str, value: Value) {
        self.globals.set(name, value);
        self.global_names
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string());
    }

    /// Set a variable in this kernel's environment overlay (`E:name`).
    pub fn set_env(&self, name: &str, value: &str) {
        self.env.env_vars.set(name, value);
    }

    pub fn jobs(&self) -> &Arc<JobManager> {
        &self.env.jobs
    }

    /// Wait for every background job started so far.
    pub async fn wait_jobs(&self) -> Vec<(JobId, ExecResult)> {
        self.env.jobs.wait_all().await
    }

    pub fn module_cache(&self) -> &Arc<ModuleCache> {
        self.env.modules.cache()
    }

    pub fn builtins(&self) -> &Arc<BuiltinRegistry> {
        &self.env.builtins
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Chunk, Expr, Form, FormBody, Pipeline, Span};

    fn echo(word: &str) -> Chunk {
        Chunk {
            pipelines: vec![Pipeline {
                forms: vec![Form {
                    temp_assigns: vec![],
                    body: FormBody::Command(crate::ast::Command {
                        head: Expr::Bareword("echo".into()),
                        args: vec![Expr::Bareword(word.into())],
                        opts: vec![],
                    }),
                    redirs: vec![],
                    span: Span::default(),
                }],
                background: false,
                span: Span::default(),
            }],
        }
    }

    #[tokio::test]
    async fn executes_and_collects_output() {
        let kernel = Kernel::transient().unwrap();
        let result = kernel.execute(&echo("hi")).await.unwrap();
        assert!(result.ok());
        assert_eq!(result.out, "hi\n");
    }

    #[tokio::test]
    async fn set_var_is_visible_to_later_chunks() {
        let kernel = Kernel::transient().unwrap();
        kernel.set_var("greeting", Value::from("hello"));
        let names = kernel.global_names.lock().unwrap().clone();
        assert!(names.contains("greeting"));
        assert_eq!(kernel.get_var("greeting"), Some(Value::from("hello")));
    }

    #[tokio::test]
    async fn json_chunks() {
        let kernel = Kernel::transient().unwrap();
        let json = serde_json::to_string(&echo("from-json")).unwrap();
        let result = kernel.execute_json(&json, "test.json").await.unwrap();
        assert_eq!(result.out, "from-json\n");
        assert!(kernel.execute_json("{", "bad.json").await.is_err());
    }
}
