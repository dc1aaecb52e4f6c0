//! Tests for external command execution via PATH lookup.
//!
//! These assume a Unix host with `sh`, `true`, `false`, `cat` and `printf`
//! on PATH.
#![cfg(unix)]

use duosh_kernel::ast::Chunk;
use duosh_kernel::{ExecResult, Kernel, Value};
use duosh_testutil::*;

async fn run(c: Chunk) -> ExecResult {
    let kernel = Kernel::transient().expect("kernel");
    kernel.execute(&c).await.expect("chunk should compile")
}

fn sh(script_text: &str) -> FormBuilder {
    call("sh").args([word("-c"), quoted(script_text)])
}

// ============================================================================
// Exit status
// ============================================================================

#[tokio::test]
async fn external_command_success() {
    let result = run(chunk([call("true")])).await;
    assert!(result.ok(), "true should succeed: {:?}", result.exception);
}

#[tokio::test]
async fn external_command_failure_carries_status() {
    let result = run(chunk([sh("exit 3")])).await;
    let e = result.exception.expect("non-zero exit fails");
    assert_eq!(e.field("kind"), Some(Value::from("external-exit")));
    assert_eq!(e.field("status"), Some(Value::from("3")));
}

#[tokio::test]
async fn external_failure_is_catchable() {
    // put ?(false)
    let result = run(chunk([call("put").arg(catch(chunk([call("false")])))])).await;
    assert!(result.ok());
    assert!(!result.values[0].truthy());
}

#[tokio::test]
async fn e_prefix_skips_builtins() {
    // e:echo goes to /bin/echo, which prints its arguments the same way
    let result = run(chunk([call("e:echo").args([word("from"), word("path")])])).await;
    assert!(result.ok(), "{:?}", result.exception);
    assert_eq!(result.out, "from path\n");
}

#[tokio::test]
async fn command_not_found_at_run_time() {
    let result = run(chunk([call("duosh-no-such-program-xyz")])).await;
    let e = result.exception.expect("should fail");
    assert_eq!(e.field("kind"), Some(Value::from("command-not-found")));
}

#[tokio::test]
async fn options_are_rejected_for_externals() {
    let result = run(chunk([call("true").opt("flag", word("x"))])).await;
    assert!(!result.ok());
}

// ============================================================================
// Streams
// ============================================================================

#[tokio::test]
async fn external_reads_pipeline_bytes() {
    // echo hello | cat | slurp
    let result = run(chunk([pipe([
        call("echo").arg(word("hello")),
        call("cat"),
        call("slurp"),
    ])]))
    .await;
    assert!(result.ok(), "{:?}", result.exception);
    assert_eq!(result.values, vec![Value::from("hello\n")]);
}

#[tokio::test]
async fn stderr_dup_onto_pipe() {
    // sh -c 'echo oops >&2' 2>&1 | slurp
    let result = run(chunk([pipe([sh("echo oops >&2").dup(2, 1), call("slurp")])])).await;
    assert!(result.ok(), "{:?}", result.exception);
    assert_eq!(result.values, vec![Value::from("oops\n")]);
    assert_eq!(result.err, "");
}

#[tokio::test]
async fn stderr_is_collected() {
    let result = run(chunk([sh("echo warn >&2")])).await;
    assert!(result.ok());
    assert_eq!(result.err, "warn\n");
}

#[tokio::test]
async fn sigpipe_upstream_is_not_a_failure() {
    // sh -c 'while true; do echo y; done' | nop
    let result = run(chunk([pipe([sh("while true; do echo y; done"), call("nop")])])).await;
    assert!(result.ok(), "{:?}", result.exception);
}

// ============================================================================
// Environment
// ============================================================================

#[tokio::test]
async fn environment_assignments_reach_children() {
    let c = script([
        assign(["E:DUOSH_CHILD_VAR"], [word("visible")]),
        sh("printf %s \"$DUOSH_CHILD_VAR\""),
    ]);
    let result = run(c).await;
    assert_eq!(result.out, "visible");
}

#[tokio::test]
async fn temporary_environment_assignment() {
    let c = script([
        sh("printf %s \"$DUOSH_TEMP_VAR\"").temp("E:DUOSH_TEMP_VAR", word("tmp")),
        call("put").arg(var("E:DUOSH_TEMP_VAR")),
    ]);
    let result = run(c).await;
    assert_eq!(result.out, "tmp");
    assert_eq!(result.values, vec![Value::from("")]);
}

#[tokio::test]
async fn wildcard_expands_to_sorted_paths() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["b.txt", "a.txt", "c.log"] {
        std::fs::write(dir.path().join(name), "").unwrap();
    }
    let pattern = format!("{}/*.txt", dir.path().display());
    let result = run(chunk([call("put").arg(wildcard(&pattern))])).await;
    let names: Vec<String> = result
        .values
        .iter()
        .map(|v| v.to_string().rsplit('/').next().unwrap_or_default().to_string())
        .collect();
    assert_eq!(names, ["a.txt", "b.txt"]);

    let none = format!("{}/*.none", dir.path().display());
    let e = run(chunk([call("put").arg(wildcard(&none))]))
        .await
        .exception
        .expect("no match");
    assert_eq!(e.field("kind"), Some(Value::from("no-match")));
}
