//! duosh CLI: run pre-parsed chunks non-interactively.
//!
//! The parser lives outside this workspace, so the CLI takes chunks as
//! JSON (a file or a `-c` argument), runs them on a fresh kernel, and maps
//! the outcome to an exit status:
//!
//! - `0`: the chunk completed
//! - `1`: it raised an exception (or a background job did)
//! - `2`: it did not compile, or the JSON did not decode

pub mod format;

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::debug;

use duosh_kernel::{CompileError, ExecResult, Kernel, KernelConfig};

pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_COMPILE: u8 = 2;

/// Captured output of one CLI run, before it is printed.
#[derive(Debug, Default)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub code: u8,
}

impl RunOutput {
    /// Print to the process streams and turn into an exit code.
    pub fn emit(self) -> Result<ExitCode> {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(self.stdout.as_bytes())?;
        stdout.flush()?;
        let mut stderr = std::io::stderr().lock();
        stderr.write_all(self.stderr.as_bytes())?;
        Ok(ExitCode::from(self.code))
    }

    fn absorb(&mut self, result: &ExecResult) {
        self.stdout.push_str(&format::format_stdout(result));
        self.stderr.push_str(&result.err);
        if let Some(e) = &result.exception {
            self.stderr.push_str(&format::format_exception(e));
            self.code = EXIT_FAILURE;
        }
    }
}

/// Run a chunk file.
pub async fn run_file(kernel: &Kernel, path: &Path) -> Result<RunOutput> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read chunk: {}", path.display()))?;
    run_json(kernel, &json, &path.display().to_string()).await
}

/// Run a JSON chunk, then wait for any background jobs it started.
pub async fn run_json(kernel: &Kernel, json: &str, source_name: &str) -> Result<RunOutput> {
    let mut output = RunOutput::default();
    let result = match kernel.execute_json(json, source_name).await {
        Ok(result) => result,
        Err(e) => {
            output.code = EXIT_COMPILE;
            output.stderr = match e.downcast_ref::<CompileError>() {
                Some(ce) => format::format_compile_error(ce),
                None => format!("Error: {e:#}\n"),
            };
            return Ok(output);
        }
    };
    output.absorb(&result);

    for (id, job) in kernel.wait_jobs().await {
        debug!(%id, ok = job.ok(), "background job finished");
        output.absorb(&job);
    }
    Ok(output)
}

/// Kernel for a CLI run: configuration file, then environment overrides.
pub fn make_kernel() -> Result<Kernel> {
    let config = KernelConfig::load().context("Failed to load configuration")?;
    Kernel::new(config).context("Failed to create kernel")
}

#[cfg(test)]
mod tests {
    use super::*;
    use duosh_testutil::*;

    #[tokio::test]
    async fn success_exits_zero() {
        let kernel = Kernel::transient().unwrap();
        let c = chunk([call("put").arg(word("v")), call("echo").arg(word("hi"))]);
        let out = run_json(&kernel, &to_json(&c), "t").await.unwrap();
        assert_eq!(out.code, 0);
        assert_eq!(out.stdout, "hi\n▶ v\n");
    }

    #[tokio::test]
    async fn exception_exits_one() {
        let kernel = Kernel::transient().unwrap();
        let c = chunk([call("fail").arg(quoted("boom"))]);
        let out = run_json(&kernel, &to_json(&c), "t").await.unwrap();
        assert_eq!(out.code, EXIT_FAILURE);
        assert!(out.stderr.contains("boom"), "stderr: {}", out.stderr);
    }

    #[tokio::test]
    async fn compile_error_exits_two() {
        let kernel = Kernel::transient().unwrap();
        let c = chunk([call("echo").arg(var("undefined"))]);
        let out = run_json(&kernel, &to_json(&c), "t").await.unwrap();
        assert_eq!(out.code, EXIT_COMPILE);
        assert!(out.stderr.starts_with("compilation error"));
    }

    #[tokio::test]
    async fn bad_json_exits_two() {
        let kernel = Kernel::transient().unwrap();
        let out = run_json(&kernel, "not json", "t").await.unwrap();
        assert_eq!(out.code, EXIT_COMPILE);
    }
}
