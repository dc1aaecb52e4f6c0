//! Pipeline execution for duosh.
//!
//! Every form of a multi-form pipeline runs on its own task. Adjacent forms
//! are joined by a port pair carrying both sub-streams; the pipeline is done
//! when every task is done, and only then are the outcomes combined.

use futures::future::join_all;
use tracing::{debug, warn};

use crate::compiler::PipelineOp;
use crate::interpreter::{
    eval_form, ErrorCause, EvalResult, ExecContext, ExecResult, Exception, TraceEntry,
};

use super::ports::{drain, port_pair, InPort, OutPort, Port, Ports};

/// Pipe ends the engine hands to one form. `None` leaves the inherited
/// port in place.
#[derive(Default)]
pub struct Wiring {
    pub stdin: Option<InPort>,
    pub stdout: Option<OutPort>,
}

impl Wiring {
    /// Install the pipe ends, except on descriptors the form redirects
    /// itself. Skipped ends are dropped here, which closes them.
    pub fn install(self, ports: &mut Ports, redirected: &[u32]) {
        if let Some(stdin) = self.stdin {
            if !redirected.contains(&0) {
                ports.set(0, Some(Port::input(stdin)));
            }
        }
        if let Some(stdout) = self.stdout {
            if !redirected.contains(&1) {
                ports.set(1, Some(Port::output(stdout)));
            }
        }
    }
}

/// Run one pipeline. Background pipelines are handed to the job manager
/// and succeed immediately.
#[tracing::instrument(level = "debug", skip_all, fields(pipeline = %op.text))]
pub async fn run_pipeline(op: &PipelineOp, ctx: &ExecContext) -> EvalResult {
    if op.background {
        spawn_background(op, ctx);
        return Ok(());
    }
    run_foreground(op, ctx).await
}

async fn run_foreground(op: &PipelineOp, ctx: &ExecContext) -> EvalResult {
    let n = op.forms.len();
    match n {
        0 => Ok(()),
        1 => eval_form(op.forms[0].clone(), ctx.clone(), Wiring::default()).await,
        _ => {
            let mut tasks = Vec::with_capacity(n);
            let mut next_stdin: Option<InPort> = None;
            for (i, form) in op.forms.iter().enumerate() {
                let (stdout, downstream) = if i + 1 < n {
                    let (out, input) = port_pair(ctx.env.pipe_buffer, ctx.env.value_buffer);
                    (Some(out), Some(input))
                } else {
                    (None, None)
                };
                let wiring = Wiring {
                    stdin: next_stdin.take(),
                    stdout,
                };
                next_stdin = downstream;
                tasks.push(tokio::spawn(eval_form(form.clone(), ctx.clone(), wiring)));
            }
            debug!(forms = n, "pipeline started");

            let outcomes = join_all(tasks)
                .await
                .into_iter()
                .map(|joined| {
                    joined.unwrap_or_else(|e| {
                        Err(ErrorCause::Io(format!("pipeline task failed: {e}")).into())
                    })
                })
                .collect();
            compose_outcomes(outcomes, &op.pos)
        }
    }
}

/// Combine per-form outcomes, in position order.
///
/// A `ReaderGone` from any form but the last only means its reader finished
/// first, so it is not counted. One failure is returned as is; two or more
/// become a composite.
pub fn compose_outcomes(outcomes: Vec<EvalResult>, pos: &TraceEntry) -> EvalResult {
    let last = outcomes.len().saturating_sub(1);
    let mut failures: Vec<Exception> = outcomes
        .into_iter()
        .enumerate()
        .filter_map(|(i, outcome)| match outcome {
            Err(e) if i < last && e.is_reader_gone() => None,
            Err(e) => Some(e),
            Ok(()) => None,
        })
        .collect();
    match failures.len() {
        0 => Ok(()),
        1 => Err(failures.remove(0)),
        _ => Err(Exception::composite(failures).with_trace(pos)),
    }
}

/// Start `op` as a job with its own captured output and an empty stdin.
fn spawn_background(op: &PipelineOp, ctx: &ExecContext) {
    let (out, out_reader) = port_pair(ctx.env.pipe_buffer, ctx.env.value_buffer);
    let (err, err_reader) = port_pair(ctx.env.pipe_buffer, ctx.env.value_buffer);
    let job_ctx = ctx.with_ports(Ports::standard(InPort::empty(), out, err));
    let foreground = PipelineOp {
        background: false,
        ..op.clone()
    };
    let text = op.text.to_string();

    let job = async move {
        let run = async move {
            let result = run_foreground(&foreground, &job_ctx).await;
            drop(job_ctx);
            result
        };
        let (result, (out, values), (err, _)) =
            tokio::join!(run, drain(out_reader), drain(err_reader));
        if let Err(e) = &result {
            warn!(job = %text, error = %e, "background job failed");
        }
        ExecResult {
            out: String::from_utf8_lossy(&out).into_owned(),
            err: String::from_utf8_lossy(&err).into_owned(),
            values,
            exception: result.err(),
        }
    };
    let id = ctx.env.jobs.spawn(op.text.to_string(), job);
    debug!(job = %id, "background job started");
}
