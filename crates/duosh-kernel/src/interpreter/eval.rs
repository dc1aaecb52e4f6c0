//! Evaluation of compiled ops.
//!
//! Async recursion goes through [`BoxFuture`]: chunks, forms and value
//! expressions all nest, and a form may also be spawned onto its own task by
//! the pipeline engine, so [`eval_form`] owns its arguments.

use std::path::Path;
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt};

use crate::builtins::{invoke, BuiltinArgs};
use crate::compiler::{
    AssignOp, CallOp, ChunkOp, FormKind, FormOp, HeadOp, RedirOp, RedirTargetOp, TargetOp,
    ValueOp, VarRef,
};
use crate::external::run_external;
use crate::scheduler::{open_redirect, port_pair, run_pipeline, Port, Ports, Wiring};

use super::closure::Closure;
use super::context::ExecContext;
use super::control_flow::eval_special;
use super::exception::{ErrorCause, EvalResult};
use super::value::Value;

/// Run a chunk's pipelines in order, stopping at the first failure.
pub fn eval_chunk<'a>(chunk: &'a ChunkOp, ctx: &'a ExecContext) -> BoxFuture<'a, EvalResult> {
    async move {
        for pipeline in &chunk.pipelines {
            run_pipeline(pipeline, ctx).await?;
        }
        Ok(())
    }
    .boxed()
}

/// Run one form with its own descriptor table.
///
/// `wiring` carries the pipe ends the pipeline engine allocated for this
/// position. Descriptors named by a redirection keep the redirection; the
/// pipe end meant for them is dropped unused.
pub fn eval_form(form: Arc<FormOp>, ctx: ExecContext, wiring: Wiring) -> BoxFuture<'static, EvalResult> {
    async move {
        eval_form_inner(&form, &ctx, wiring)
            .await
            .map_err(|e| e.with_trace(&form.pos))
    }
    .boxed()
}

async fn eval_form_inner(form: &FormOp, ctx: &ExecContext, wiring: Wiring) -> EvalResult {
    let mut ports = ctx.ports.clone();
    let redirected: Vec<u32> = form.redirs.iter().map(|r| r.fd).collect();
    wiring.install(&mut ports, &redirected);
    for redir in &form.redirs {
        apply_redir(redir, &mut ports, ctx).await?;
    }
    let ctx = ctx.with_ports(ports);

    if form.temp_assigns.is_empty() {
        return eval_body(&form.kind, &ctx).await;
    }

    let mut saved = Vec::new();
    let setup = apply_temp_assigns(&form.temp_assigns, &ctx, &mut saved).await;
    let result = match setup {
        Ok(()) => eval_body(&form.kind, &ctx).await,
        Err(e) => Err(e),
    };
    let restored = restore_temp_assigns(saved, &ctx);
    result.and(restored)
}

async fn eval_body(kind: &FormKind, ctx: &ExecContext) -> EvalResult {
    match kind {
        FormKind::Assign(op) => eval_assign(op, ctx).await,
        FormKind::Special(op) => eval_special(op, ctx).await,
        FormKind::Call(op) => eval_call(op, ctx).await,
    }
}

async fn apply_redir(redir: &RedirOp, ports: &mut Ports, ctx: &ExecContext) -> EvalResult {
    match &redir.target {
        RedirTargetOp::Close => ports.set(redir.fd, None),
        RedirTargetOp::Fd(src) => ports.dup(*src, redir.fd)?,
        RedirTargetOp::Path(target) => {
            let target = eval_single(target, ctx, "redirection target").await?;
            let path = target.expect_string("redirection target")?;
            let port = open_redirect(Path::new(path), redir.mode).await?;
            ports.set(redir.fd, Some(port));
        }
    }
    Ok(())
}

/// Set each temporary, remembering what it held. `None` means the variable
/// did not exist yet.
async fn apply_temp_assigns(
    assigns: &[AssignOp],
    ctx: &ExecContext,
    saved: &mut Vec<(VarRef, Option<Value>)>,
) -> EvalResult {
    for assign in assigns {
        let values = eval_all(&assign.values, ctx).await?;
        check_assign_arity(&assign.targets, values.len())?;
        for (target, value) in assign.targets.iter().zip(values) {
            saved.push((target.var.clone(), ctx.peek_var(&target.var)?));
            ctx.write_var(&target.var, value)?;
        }
    }
    Ok(())
}

/// Put every temporary back, latest first. A variable that did not exist
/// before is reset to the empty string rather than removed.
fn restore_temp_assigns(saved: Vec<(VarRef, Option<Value>)>, ctx: &ExecContext) -> EvalResult {
    let mut first_err = None;
    for (var, prior) in saved.into_iter().rev() {
        if let Err(e) = ctx.write_var(&var, prior.unwrap_or_else(Value::empty)) {
            first_err.get_or_insert(e);
        }
    }
    first_err.map_or(Ok(()), Err)
}

async fn eval_assign(op: &AssignOp, ctx: &ExecContext) -> EvalResult {
    let values = eval_all(&op.values, ctx).await?;
    assign_values(&op.targets, values, ctx).await
}

fn check_assign_arity(targets: &[TargetOp], got: usize) -> EvalResult {
    let fixed = targets.iter().filter(|t| !t.rest).count();
    let has_rest = targets.len() > fixed;
    let fits = if has_rest { got >= fixed } else { got == fixed };
    if fits {
        return Ok(());
    }
    Err(ErrorCause::ArityMismatch {
        what: "assignment right-hand side".into(),
        expected: if has_rest {
            format!("{fixed} or more")
        } else {
            fixed.to_string()
        },
        got,
    }
    .into())
}

/// Bind `values` to `targets`; a trailing rest target takes the surplus as
/// a list.
pub async fn assign_values(targets: &[TargetOp], values: Vec<Value>, ctx: &ExecContext) -> EvalResult {
    check_assign_arity(targets, values.len())?;
    let mut values = values.into_iter();
    for target in targets {
        let value = if target.rest {
            Value::list(values.by_ref())
        } else {
            values.next().unwrap_or_else(Value::empty)
        };
        set_target(target, value, ctx).await?;
    }
    Ok(())
}

async fn set_target(target: &TargetOp, value: Value, ctx: &ExecContext) -> EvalResult {
    if target.indices.is_empty() {
        return ctx.write_var(&target.var, value);
    }
    let keys = eval_keys(&target.indices, ctx).await?;
    ctx.cell(&target.var)?
        .update(|root| assoc_path(root, &keys, value))?;
    Ok(())
}

pub(crate) async fn eval_keys(indices: &[ValueOp], ctx: &ExecContext) -> EvalResult<Vec<Value>> {
    let mut keys = Vec::with_capacity(indices.len());
    for idx in indices {
        keys.push(eval_single(idx, ctx, "index").await?);
    }
    Ok(keys)
}

fn assoc_path(root: &mut Value, keys: &[Value], value: Value) -> Result<(), ErrorCause> {
    match keys {
        [] => {
            *root = value;
            Ok(())
        }
        [key] => root.assoc(key, value),
        [key, rest @ ..] => {
            let mut child = root.index(key)?;
            assoc_path(&mut child, rest, value)?;
            root.assoc(key, child)
        }
    }
}

pub(crate) fn dissoc_path(root: &mut Value, keys: &[Value]) -> Result<(), ErrorCause> {
    match keys {
        [] => Ok(()),
        [key] => root.dissoc(key),
        [key, rest @ ..] => {
            let mut child = root.index(key)?;
            dissoc_path(&mut child, rest)?;
            root.assoc(key, child)
        }
    }
}

async fn eval_call(op: &CallOp, ctx: &ExecContext) -> EvalResult {
    let callee = match &op.head {
        HeadOp::Function { name, var } => match ctx.read_var(var)? {
            f @ Value::Closure(_) => Some(f),
            other => {
                return Err(ErrorCause::Type(format!(
                    "{name} is bound to a {}, not a function",
                    other.kind()
                ))
                .into())
            }
        },
        HeadOp::Dynamic(head) => Some(eval_single(head, ctx, "command head").await?),
        HeadOp::Builtin(_) | HeadOp::External(_) => None,
    };

    let args = eval_all(&op.args, ctx).await?;
    let mut opts = Vec::with_capacity(op.opts.len());
    for (name, value) in &op.opts {
        opts.push((name.clone(), eval_single(value, ctx, "option value").await?));
    }

    match (&op.head, callee) {
        (HeadOp::Builtin(builtin), _) => {
            invoke(builtin.as_ref(), BuiltinArgs::new(args, opts), ctx).await
        }
        (HeadOp::External(name), _) => {
            reject_opts(name, &opts)?;
            run_external(name, &args, ctx).await
        }
        (_, Some(callee)) => call_value(&callee, args, opts, ctx).await,
        (_, None) => Ok(()),
    }
}

fn reject_opts(name: &str, opts: &[(String, Value)]) -> EvalResult {
    match opts.first() {
        Some((opt, _)) => Err(ErrorCause::Type(format!(
            "external command {name} does not take option &{opt}"
        ))
        .into()),
        None => Ok(()),
    }
}

/// Call a value as a command: closures run, strings name a builtin or an
/// external program.
pub async fn call_value(
    callee: &Value,
    args: Vec<Value>,
    opts: Vec<(String, Value)>,
    ctx: &ExecContext,
) -> EvalResult {
    match callee {
        Value::Closure(closure) => closure.call(args, opts, ctx).await,
        Value::String(name) => match ctx.env.builtins.get(name) {
            Some(builtin) => {
                invoke(builtin.as_ref(), BuiltinArgs::new(args, opts), ctx).await
            }
            None => {
                reject_opts(name, &opts)?;
                run_external(name, &args, ctx).await
            }
        },
        other => Err(ErrorCause::Type(format!("cannot call a {}", other.kind())).into()),
    }
}

/// Evaluate each op and concatenate the results.
pub async fn eval_all(ops: &[ValueOp], ctx: &ExecContext) -> EvalResult<Vec<Value>> {
    let mut out = Vec::with_capacity(ops.len());
    for op in ops {
        out.extend(eval_value(op, ctx).await?);
    }
    Ok(out)
}

/// Evaluate an op that must produce exactly one value.
pub async fn eval_single(op: &ValueOp, ctx: &ExecContext, what: &str) -> EvalResult<Value> {
    let mut values = eval_value(op, ctx).await?;
    if values.len() != 1 {
        return Err(ErrorCause::ArityMismatch {
            what: what.to_string(),
            expected: "1".into(),
            got: values.len(),
        }
        .into());
    }
    Ok(values.remove(0))
}

pub fn eval_value<'a>(op: &'a ValueOp, ctx: &'a ExecContext) -> BoxFuture<'a, EvalResult<Vec<Value>>> {
    async move {
        Ok(match op {
            ValueOp::Literal(v) => vec![v.clone()],
            ValueOp::Var { var, explode } => {
                let v = ctx.read_var(var)?;
                if !*explode {
                    vec![v]
                } else {
                    match v {
                        Value::List(items) => items.as_ref().clone(),
                        other => {
                            return Err(ErrorCause::Type(format!(
                                "cannot explode a {}",
                                other.kind()
                            ))
                            .into())
                        }
                    }
                }
            }
            ValueOp::Index { base, indices } => {
                let mut v = eval_single(base, ctx, "indexee").await?;
                for key in eval_keys(indices, ctx).await? {
                    v = v.index(&key)?;
                }
                vec![v]
            }
            ValueOp::List(items) => vec![Value::list(eval_all(items, ctx).await?)],
            ValueOp::Map(pairs) => {
                let mut out = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    out.push((
                        eval_single(k, ctx, "map key").await?,
                        eval_single(v, ctx, "map value").await?,
                    ));
                }
                vec![Value::map(out)]
            }
            ValueOp::Lambda(lambda) => {
                vec![Value::Closure(Arc::new(Closure::new(lambda.clone(), ctx, false)?))]
            }
            ValueOp::OutputCapture(chunk) => capture_output(chunk, ctx).await?,
            ValueOp::ExceptionCapture(chunk) => match eval_chunk(chunk, ctx).await {
                Ok(()) => vec![Value::ok()],
                Err(e) if e.is_flow() => return Err(e),
                Err(e) => vec![Value::exception(e)],
            },
            ValueOp::Compound(parts) => compound(parts, ctx).await?,
            ValueOp::Wildcard {
                pattern,
                nomatch_ok,
            } => {
                let matches = ctx
                    .env
                    .globber
                    .glob(pattern)
                    .map_err(|e| ErrorCause::Io(e.to_string()))?;
                if matches.is_empty() && !nomatch_ok {
                    return Err(ErrorCause::NoMatch(pattern.clone()).into());
                }
                matches.into_iter().map(Value::String).collect()
            }
        })
    }
    .boxed()
}

/// Cartesian concatenation of string parts.
async fn compound(parts: &[ValueOp], ctx: &ExecContext) -> EvalResult<Vec<Value>> {
    let mut acc = vec![String::new()];
    for part in parts {
        let values = eval_value(part, ctx).await?;
        let mut next = Vec::with_capacity(acc.len() * values.len());
        for prefix in &acc {
            for v in &values {
                let s = v.as_str().ok_or_else(|| {
                    ErrorCause::Type(format!("cannot concatenate a {}", v.kind()))
                })?;
                next.push(format!("{prefix}{s}"));
            }
        }
        acc = next;
    }
    Ok(acc.into_iter().map(Value::String).collect())
}

/// `(chunk)`: run with fd 1 redirected into a fresh pair and collect both
/// sub-streams. Byte output becomes one string per line.
pub async fn capture_output(chunk: &ChunkOp, ctx: &ExecContext) -> EvalResult<Vec<Value>> {
    let (out, input) = port_pair(ctx.env.pipe_buffer, ctx.env.value_buffer);
    let mut ports = ctx.ports.clone();
    ports.set(1, Some(Port::output(out)));
    let inner = ctx.with_ports(ports);

    let collected = Mutex::new(Vec::new());
    let push = |v: Value| collected.lock().unwrap_or_else(|e| e.into_inner()).push(v);

    let run = async move {
        let result = eval_chunk(chunk, &inner).await;
        drop(inner);
        result
    };
    let values = async {
        while let Some(v) = input.recv().await {
            push(v);
        }
    };
    let lines = async {
        while let Some(line) = input.read_line().await? {
            push(Value::String(line));
        }
        EvalResult::Ok(())
    };

    let (result, (), lines) = tokio::join!(run, values, lines);
    result?;
    lines?;
    Ok(collected.into_inner().unwrap_or_else(|e| e.into_inner()))
}
