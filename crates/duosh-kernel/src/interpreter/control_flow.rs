//! Special forms at run time.
//!
//! Bodies are inline chunks, so they run in the enclosing context and see
//! its frame directly. Loops catch `break` and `continue` raised by their
//! own body; everything else keeps unwinding.

use std::sync::Arc;

use crate::compiler::{ChunkOp, ExceptClause, SpecialOp, ValueOp, VarRef};

use super::closure::Closure;
use super::context::ExecContext;
use super::eval::{dissoc_path, eval_chunk, eval_keys, eval_single, eval_value};
use super::exception::{EvalResult, Exception, Flow};
use super::value::Value;

/// What a loop does after one run of its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStep {
    Next,
    Stop,
}

/// Absorb `break` and `continue` from one iteration.
pub fn loop_step(result: EvalResult) -> EvalResult<LoopStep> {
    match result {
        Ok(()) => Ok(LoopStep::Next),
        Err(e) => match e.flow_kind() {
            Some(Flow::Break) => Ok(LoopStep::Stop),
            Some(Flow::Continue) => Ok(LoopStep::Next),
            _ => Err(e),
        },
    }
}

pub async fn eval_special(op: &SpecialOp, ctx: &ExecContext) -> EvalResult {
    match op {
        SpecialOp::If {
            branches,
            else_body,
        } => {
            for (cond, body) in branches {
                if condition_holds(cond, ctx).await? {
                    return eval_chunk(body, ctx).await;
                }
            }
            run_optional(else_body.as_deref(), ctx).await
        }
        SpecialOp::While {
            cond,
            body,
            else_body,
        } => {
            let mut iterations = 0usize;
            while condition_holds(cond, ctx).await? {
                iterations += 1;
                if loop_step(eval_chunk(body, ctx).await)? == LoopStep::Stop {
                    break;
                }
            }
            if iterations == 0 {
                run_optional(else_body.as_deref(), ctx).await?;
            }
            Ok(())
        }
        SpecialOp::For {
            var,
            container,
            body,
            else_body,
        } => {
            let items = eval_single(container, ctx, "for container").await?.iterate()?;
            if items.is_empty() {
                return run_optional(else_body.as_deref(), ctx).await;
            }
            for item in items {
                ctx.write_var(var, item)?;
                if loop_step(eval_chunk(body, ctx).await)? == LoopStep::Stop {
                    break;
                }
            }
            Ok(())
        }
        SpecialOp::Try {
            body,
            except,
            else_body,
            finally,
        } => {
            eval_try(
                body,
                except.as_ref(),
                else_body.as_deref(),
                finally.as_deref(),
                ctx,
            )
            .await
        }
        SpecialOp::Fn { var, lambda } => {
            let closure = Closure::new(lambda.clone(), ctx, true)?;
            ctx.write_var(var, Value::Closure(Arc::new(closure)))
        }
        SpecialOp::And(ops) => short_circuit(ops, false, ctx).await,
        SpecialOp::Or(ops) => short_circuit(ops, true, ctx).await,
        SpecialOp::Del(targets) => {
            for target in targets {
                if target.indices.is_empty() {
                    if let VarRef::Local(name) = &target.var {
                        ctx.frame.remove(name);
                    }
                    continue;
                }
                let keys = eval_keys(&target.indices, ctx).await?;
                ctx.cell(&target.var)?
                    .update(|root| dissoc_path(root, &keys))?;
            }
            Ok(())
        }
        SpecialOp::Use { spec, var } => {
            let ns = ctx.env.modules.load(spec, ctx).await?;
            ctx.write_var(var, Value::Namespace(ns))
        }
    }
}

async fn condition_holds(cond: &ValueOp, ctx: &ExecContext) -> EvalResult<bool> {
    Ok(eval_value(cond, ctx).await?.iter().all(Value::truthy))
}

async fn run_optional(body: Option<&ChunkOp>, ctx: &ExecContext) -> EvalResult {
    match body {
        Some(body) => eval_chunk(body, ctx).await,
        None => Ok(()),
    }
}

/// `and` stops at the first false value, `or` at the first true one. The
/// deciding value is output; with no operands the identity is output.
async fn short_circuit(ops: &[ValueOp], stop_on: bool, ctx: &ExecContext) -> EvalResult {
    let mut last = Value::Bool(!stop_on);
    for op in ops {
        for v in eval_value(op, ctx).await? {
            if v.truthy() == stop_on {
                return ctx.put(v).await;
            }
            last = v;
        }
    }
    ctx.put(last).await
}

async fn eval_try(
    body: &ChunkOp,
    except: Option<&ExceptClause>,
    else_body: Option<&ChunkOp>,
    finally: Option<&ChunkOp>,
    ctx: &ExecContext,
) -> EvalResult {
    let mut pending: Option<Exception> = None;
    let outcome = match (eval_chunk(body, ctx).await, except) {
        (Ok(()), _) => run_optional(else_body, ctx).await,
        (Err(e), Some(clause)) if !e.is_flow() => run_except(clause, e, ctx).await,
        (Err(e), _) => {
            pending = Some(e);
            Ok(())
        }
    };

    if let Some(finally) = finally {
        // A failing finally replaces whatever happened before it.
        eval_chunk(finally, ctx).await?;
    }
    match pending {
        Some(e) => Err(e),
        None => outcome,
    }
}

async fn run_except(clause: &ExceptClause, e: Exception, ctx: &ExecContext) -> EvalResult {
    if let Some(var) = &clause.var {
        ctx.write_var(var, Value::exception(e))?;
    }
    eval_chunk(&clause.body, ctx).await
}
