//! jobs and wait: inspect and join background pipelines.

use async_trait::async_trait;

use crate::interpreter::{ErrorCause, EvalResult, Exception, ExecContext, ExecResult, Value};
use crate::scheduler::JobId;

use super::traits::{Builtin, BuiltinArgs, BuiltinSchema, ParamSchema};

/// jobs: output one map per tracked job.
pub struct Jobs;

#[async_trait]
impl Builtin for Jobs {
    fn name(&self) -> &str {
        "jobs"
    }

    fn schema(&self) -> BuiltinSchema {
        BuiltinSchema::new("jobs", "List background jobs")
            .opt("cleanup", false, "Forget finished jobs first")
    }

    async fn call(&self, args: BuiltinArgs, ctx: &ExecContext) -> EvalResult {
        if args.opt("cleanup").is_some_and(Value::truthy) {
            ctx.env.jobs.cleanup();
        }
        for job in ctx.env.jobs.list() {
            ctx.put(Value::map([
                (Value::from("id"), Value::String(job.id.to_string())),
                (Value::from("command"), Value::String(job.command)),
                (Value::from("status"), Value::String(job.status.to_string())),
            ]))
            .await?;
        }
        Ok(())
    }
}

/// wait: join one job, or all of them, replaying their captured output.
/// Waited jobs are reaped. A failed job's exception is raised here.
pub struct Wait;

#[async_trait]
impl Builtin for Wait {
    fn name(&self) -> &str {
        "wait"
    }

    fn schema(&self) -> BuiltinSchema {
        BuiltinSchema::new("wait", "Wait for background jobs and forward their output")
            .param(ParamSchema::optional("id", "Job to wait for; all jobs if omitted"))
    }

    async fn call(&self, args: BuiltinArgs, ctx: &ExecContext) -> EvalResult {
        let results = match args.get(0) {
            Some(id) => {
                let id = parse_job_id(id)?;
                let result = ctx
                    .env
                    .jobs
                    .wait(id)
                    .await
                    .ok_or_else(|| ErrorCause::Index(format!("no such job: {id}")))?;
                vec![(id, result)]
            }
            None => ctx.env.jobs.wait_all().await,
        };

        let mut failures = Vec::new();
        for (id, result) in results {
            ctx.env.jobs.remove(id);
            if let Some(e) = replay(result, ctx).await? {
                failures.push(e);
            }
        }
        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(Exception::composite(failures)),
        }
    }
}

fn parse_job_id(v: &Value) -> Result<JobId, ErrorCause> {
    let s = v.expect_string("job id")?;
    s.trim_start_matches('%')
        .parse()
        .map(JobId)
        .map_err(|_| ErrorCause::Type(format!("bad job id: {s}")))
}

async fn replay(result: ExecResult, ctx: &ExecContext) -> EvalResult<Option<Exception>> {
    if !result.out.is_empty() {
        ctx.write_out(&result.out).await?;
    }
    if !result.err.is_empty() {
        ctx.write_err(&result.err).await?;
    }
    for v in result.values {
        ctx.put(v).await?;
    }
    Ok(result.exception)
}
