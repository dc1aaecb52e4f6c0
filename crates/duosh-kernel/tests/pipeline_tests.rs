//! Pipeline engine tests: failure composition, redirections, dual streams.

use duosh_kernel::ast::RedirMode;
use duosh_kernel::interpreter::ExceptionKind;
use duosh_kernel::{CompileError, CompileErrorKind, ExecResult, Kernel, Value};
use duosh_testutil::*;
use rstest::rstest;

async fn run(c: duosh_kernel::ast::Chunk) -> ExecResult {
    let kernel = Kernel::transient().expect("kernel");
    kernel.execute(&c).await.expect("chunk should compile")
}

fn strings(values: &[Value]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

// ============================================================================
// Failure composition
// ============================================================================

#[rstest]
#[case::first(&[true, false, false])]
#[case::middle(&[false, true, false])]
#[case::last(&[false, false, true])]
#[case::two(&[true, false, true])]
#[case::all(&[true, true, true])]
#[tokio::test]
async fn failures_compose_in_position_order(#[case] failing: &[bool]) {
    let forms = failing.iter().enumerate().map(|(i, fails)| {
        if *fails {
            call("fail").arg(word(&format!("f{i}")))
        } else {
            call("nop")
        }
    });
    let result = run(chunk([pipe(forms)])).await;
    let e = result.exception.expect("pipeline should fail");

    let expected: Vec<String> = failing
        .iter()
        .enumerate()
        .filter(|(_, f)| **f)
        .map(|(i, _)| format!("f{i}"))
        .collect();

    if expected.len() == 1 {
        assert!(e.causes().is_empty(), "single failure must not be wrapped");
        assert_eq!(e.reason(), Value::from(expected[0].as_str()));
    } else {
        assert!(matches!(e.kind, ExceptionKind::Composite(_)));
        let reasons: Vec<String> = e.causes().iter().map(|c| c.reason().to_string()).collect();
        assert_eq!(reasons, expected);
    }
}

#[tokio::test]
async fn successful_pipeline() {
    let result = run(chunk([pipe([call("put").args([word("a"), word("b")]), call("all")])])).await;
    assert!(result.ok(), "{:?}", result.exception);
    assert_eq!(strings(&result.values), ["a", "b"]);
}

#[tokio::test]
async fn sole_flow_signal_keeps_its_kind() {
    // for i [a b] { put $i | break }
    let body = chunk([pipe([call("put").arg(var("i")), call("break")])]);
    let c = script([
        call("for").args([word("i"), list([word("a"), word("b")]), block(body)]),
        call("echo").arg(word("after")),
    ]);
    let result = run(c).await;
    assert!(result.ok(), "{:?}", result.exception);
    assert_eq!(result.out, "after\n");
}

#[tokio::test]
async fn stopped_reader_is_not_a_failure() {
    // while $true { echo y } | nop
    let producer = call("while").args([
        var("true"),
        block(chunk([call("echo").arg(word("y"))])),
    ]);
    let result = run(chunk([pipe([producer, call("nop")])])).await;
    assert!(result.ok(), "{:?}", result.exception);
}

// ============================================================================
// Redirections
// ============================================================================

#[tokio::test]
async fn redirection_wins_over_pipe() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("file.txt");
    let path = quoted(file.to_str().unwrap());

    // echo foo > file.txt | slurp
    let result = run(chunk([pipe([
        call("echo").arg(word("foo")).redir(1, RedirMode::Write, path),
        call("slurp"),
    ])]))
    .await;

    assert!(result.ok(), "{:?}", result.exception);
    assert_eq!(std::fs::read_to_string(&file).unwrap(), "foo\n");
    assert_eq!(result.values, vec![Value::from("")]);
    assert_eq!(result.out, "");
}

#[tokio::test]
async fn out_of_range_fd_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = quoted(dir.path().join("f").to_str().unwrap());

    // echo x 3000000000> f
    let c = chunk([call("echo").arg(word("x")).redir(3_000_000_000, RedirMode::Write, path)]);
    let kernel = Kernel::transient().expect("kernel");
    let err = kernel.execute(&c).await.expect_err("fd should be rejected");
    assert_eq!(
        err.downcast_ref::<CompileError>().map(|e| e.kind),
        Some(CompileErrorKind::BadRedirection)
    );
}

#[tokio::test]
async fn append_and_read_redirections() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("log");
    let path = || quoted(file.to_str().unwrap());

    let result = run(script([
        call("echo").arg(word("one")).redir(1, RedirMode::Write, path()),
        call("echo").arg(word("two")).redir(1, RedirMode::Append, path()),
        call("from-lines").redir(0, RedirMode::Read, path()),
    ]))
    .await;

    assert!(result.ok(), "{:?}", result.exception);
    assert_eq!(strings(&result.values), ["one", "two"]);
}

#[tokio::test]
async fn closed_stdout_fails_the_writer() {
    let result = run(chunk([call("echo").arg(word("x")).close(1)])).await;
    assert!(!result.ok());
}

#[tokio::test]
async fn missing_input_file_fails() {
    let result = run(chunk([
        call("slurp").redir(0, RedirMode::Read, quoted("/nonexistent/duosh/input")),
    ]))
    .await;
    assert!(!result.ok());
}

// ============================================================================
// Dual streams
// ============================================================================

#[tokio::test]
async fn bytes_and_values_travel_separately() {
    // { echo bytes; put value } | all
    let producer = call_expr(lambda(
        std::iter::empty(),
        script([call("echo").arg(word("bytes")), call("put").arg(word("value"))]),
    ));
    let result = run(chunk([pipe([producer, call("all")])])).await;
    assert!(result.ok(), "{:?}", result.exception);
    let mut got = strings(&result.values);
    got.sort();
    assert_eq!(got, ["bytes", "value"]);
}

#[tokio::test]
async fn lines_round_trip_through_bytes() {
    let result = run(chunk([pipe([
        call("put").args([word("a"), word("b")]),
        call("to-lines"),
        call("from-lines"),
    ])]))
    .await;
    assert_eq!(strings(&result.values), ["a", "b"]);
}

#[tokio::test]
async fn output_capture_collects_both_streams() {
    // x = (echo line; put v)
    let c = script([
        assign(
            ["@x"],
            [capture(script([
                call("echo").arg(word("line")),
                call("put").arg(word("v")),
            ]))],
        ),
        call("put").arg(explode("x")),
    ]);
    let result = run(c).await;
    let mut got = strings(&result.values);
    got.sort();
    assert_eq!(got, ["line", "v"]);
}

#[tokio::test]
async fn each_consumes_upstream_values() {
    // put a b c | each {|v| put $v$v }
    let f = lambda(["v"], chunk([call("put").arg(compound([var("v"), var("v")]))]));
    let result = run(chunk([pipe([
        call("put").args([word("a"), word("b"), word("c")]),
        call("each").arg(f),
    ])]))
    .await;
    assert_eq!(strings(&result.values), ["aa", "bb", "cc"]);
}

#[tokio::test]
async fn early_break_leaves_the_rest_of_stdin() {
    // print "a\nb\nc\n" | { each {|x| put $x; break }; slurp }
    let body = lambda(["x"], script([call("put").arg(var("x")), call("break")]));
    let consumer = call_expr(block(script([call("each").arg(body), call("slurp")])));
    let result = run(chunk([pipe([call("print").arg(quoted("a\nb\nc\n")), consumer])])).await;

    assert!(result.ok(), "{:?}", result.exception);
    assert_eq!(strings(&result.values), ["a", "b\nc\n"]);
}

#[tokio::test]
async fn json_conversion_in_a_pipeline() {
    let result = run(chunk([pipe([
        call("put").arg(map([(word("k"), list([word("a")]))])),
        call("to-json"),
        call("from-json"),
    ])]))
    .await;
    assert!(result.ok(), "{:?}", result.exception);
    assert_eq!(
        result.values,
        vec![Value::map([(Value::from("k"), Value::list([Value::from("a")]))])]
    );
}
