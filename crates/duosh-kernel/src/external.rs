//! External commands: `PATH` lookup at run time and process spawning.
//!
//! The child's stdio is bridged to the form's ports: fd 0 bytes are pumped
//! into its stdin, its stdout and stderr into fds 1 and 2. Values on fd 0
//! are invisible to external programs.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tracing::debug;

use crate::interpreter::{ErrorCause, EvalResult, ExecContext, Value};
use crate::scheduler::{InPort, OutPort};

#[cfg(unix)]
const SIGPIPE: i32 = 13;

/// Resolve a command name in PATH.
///
/// Searches each directory in `path_var` (colon-separated) for an executable
/// named `name`. Returns the full path if found.
pub fn resolve_in_path(name: &str, path_var: &str) -> Option<PathBuf> {
    path_var
        .split(':')
        .filter(|dir| !dir.is_empty())
        .map(|dir| Path::new(dir).join(name))
        .find(|path| is_executable(path))
}

fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = path.metadata() else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Run `name` with `args` and wait for it.
pub async fn run_external(name: &str, args: &[Value], ctx: &ExecContext) -> EvalResult {
    let argv = args
        .iter()
        .map(|a| a.expect_string("external command argument").map(str::to_string))
        .collect::<Result<Vec<_>, _>>()?;

    let program = if name.contains('/') {
        PathBuf::from(name)
    } else {
        let path_var = ctx.env.env_vars.get("PATH").unwrap_or_default();
        resolve_in_path(name, &path_var)
            .ok_or_else(|| ErrorCause::CommandNotFound(name.to_string()))?
    };
    debug!(command = %name, path = %program.display(), "running external command");

    let stdin = ctx.stdin().cloned();
    let stdout = ctx.ports.output(1).cloned();
    let stderr = ctx.ports.output(2).cloned();

    let mut cmd = Command::new(&program);
    cmd.args(&argv)
        .env_clear()
        .envs(ctx.env.env_vars.snapshot())
        .stdin(piped_if(stdin.is_some()))
        .stdout(piped_if(stdout.is_some()))
        .stderr(piped_if(stderr.is_some()))
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ErrorCause::CommandNotFound(name.to_string()),
        _ => ErrorCause::Io(format!("{name}: {e}")),
    })?;

    let feeder = match (child.stdin.take(), stdin) {
        (Some(child_stdin), Some(port)) => Some(tokio::spawn(feed_stdin(port, child_stdin))),
        _ => None,
    };
    let child_stdout = child.stdout.take();
    let child_stderr = child.stderr.take();

    let (status, out, err) = tokio::join!(
        child.wait(),
        pump(child_stdout, stdout.as_ref()),
        pump(child_stderr, stderr.as_ref()),
    );
    // Whatever the child did not read stays in the port for the next reader.
    if let Some(feeder) = feeder {
        feeder.abort();
    }

    let status = status.map_err(ErrorCause::from)?;
    if status.success() {
        out?;
        err?;
        return Ok(());
    }
    Err(exit_failure(name, status).into())
}

fn piped_if(open: bool) -> Stdio {
    if open {
        Stdio::piped()
    } else {
        Stdio::null()
    }
}

async fn feed_stdin(port: InPort, mut child_stdin: ChildStdin) {
    let mut buf = vec![0u8; 8192];
    loop {
        match port.read_some(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if child_stdin.write_all(&buf[..n]).await.is_err() {
                    break;
                }
            }
        }
    }
    // Dropping the handle closes the child's stdin.
}

async fn pump<R: AsyncRead + Unpin>(reader: Option<R>, port: Option<&OutPort>) -> EvalResult {
    let (Some(mut reader), Some(port)) = (reader, port) else {
        return Ok(());
    };
    let mut buf = vec![0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await.map_err(ErrorCause::from)?;
        if n == 0 {
            return Ok(());
        }
        port.write_bytes(&buf[..n]).await?;
    }
}

fn exit_failure(name: &str, status: ExitStatus) -> ErrorCause {
    if let Some(code) = status.code() {
        return ErrorCause::ExternalExit {
            cmd: name.to_string(),
            status: code,
        };
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            if signal == SIGPIPE {
                return ErrorCause::ReaderGone;
            }
            return ErrorCause::ExternalExit {
                cmd: name.to_string(),
                status: 128 + signal,
            };
        }
    }
    ErrorCause::ExternalExit {
        cmd: name.to_string(),
        status: -1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_first_executable_in_path() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        std::fs::create_dir(&first).unwrap();
        std::fs::create_dir(&second).unwrap();
        std::fs::write(second.join("tool"), "#!/bin/sh\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o755);
            std::fs::set_permissions(second.join("tool"), perms).unwrap();
        }

        let path_var = format!("{}::{}", first.display(), second.display());
        assert_eq!(resolve_in_path("tool", &path_var), Some(second.join("tool")));
        assert_eq!(resolve_in_path("missing", &path_var), None);
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data"), "").unwrap();
        let path_var = dir.path().display().to_string();
        assert_eq!(resolve_in_path("data", &path_var), None);
    }
}
