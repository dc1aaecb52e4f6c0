//! Background pipelines and the `jobs`/`wait` builtins.

use duosh_kernel::scheduler::JobStatus;
use duosh_kernel::{Kernel, Value};
use duosh_testutil::*;

#[tokio::test]
async fn background_failure_does_not_reach_foreground() {
    let kernel = Kernel::transient().unwrap();
    let c = chunk([
        background([call("fail").arg(word("in-bg"))]),
        pipe([call("echo").arg(word("fg"))]),
    ]);
    let result = kernel.execute(&c).await.unwrap();
    assert!(result.ok(), "{:?}", result.exception);
    assert_eq!(result.out, "fg\n");

    let jobs = kernel.wait_jobs().await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(
        jobs[0].1.exception.as_ref().map(|e| e.reason()),
        Some(Value::from("in-bg"))
    );
    assert_eq!(kernel.jobs().list()[0].status, JobStatus::Failed);
}

#[tokio::test]
async fn background_output_is_captured_per_job() {
    let kernel = Kernel::transient().unwrap();
    let c = chunk([background([
        call("put").args([word("a"), word("b")]),
        call("all"),
    ])]);
    let result = kernel.execute(&c).await.unwrap();
    assert!(result.values.is_empty());

    let jobs = kernel.wait_jobs().await;
    assert_eq!(jobs[0].1.values, vec![Value::from("a"), Value::from("b")]);
}

#[tokio::test]
async fn wait_replays_and_reaps() {
    let kernel = Kernel::transient().unwrap();
    let c = chunk([
        background([call("echo").arg(word("from-job"))]),
        pipe([call("wait")]),
    ]);
    let result = kernel.execute(&c).await.unwrap();
    assert!(result.ok(), "{:?}", result.exception);
    assert_eq!(result.out, "from-job\n");
    assert!(kernel.jobs().list().is_empty());
    assert!(kernel.wait_jobs().await.is_empty());
}

#[tokio::test]
async fn wait_raises_job_failure() {
    let kernel = Kernel::transient().unwrap();
    let c = chunk([
        background([call("fail").arg(word("late"))]),
        pipe([call("wait").arg(word("%1"))]),
    ]);
    let result = kernel.execute(&c).await.unwrap();
    assert_eq!(result.exception.expect("raised").reason(), Value::from("late"));
}

#[tokio::test]
async fn jobs_lists_tracked_pipelines() {
    let kernel = Kernel::transient().unwrap();
    kernel
        .execute(&chunk([background([call("nop")])]))
        .await
        .unwrap();
    kernel.wait_jobs().await;

    let result = kernel.execute(&chunk([call("jobs")])).await.unwrap();
    assert_eq!(result.values.len(), 1);
    let job = &result.values[0];
    assert_eq!(job.index(&Value::from("status")).unwrap(), Value::from("done"));
    assert_eq!(job.index(&Value::from("command")).unwrap(), Value::from("nop &"));

    let cleaned = kernel
        .execute(&chunk([call("jobs").opt("cleanup", var("true"))]))
        .await
        .unwrap();
    assert!(cleaned.values.is_empty());
}
