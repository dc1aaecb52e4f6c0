//! Closures: a compiled lambda plus the cells it captured.

use std::collections::HashMap;
use std::sync::Arc;

use crate::compiler::{CaptureSource, LambdaOp};

use super::context::ExecContext;
use super::eval::eval_chunk;
use super::exception::{ErrorCause, EvalResult, Flow};
use super::scope::{Cell, Frame};
use super::value::Value;

pub struct Closure {
    pub op: Arc<LambdaOp>,
    pub captures: Arc<HashMap<String, Cell>>,
    /// Set for `fn` definitions: a `return` from the body ends this call.
    pub catches_return: bool,
}

impl Closure {
    /// Instantiate `op` in `ctx`, sharing (not copying) every captured cell.
    pub fn new(op: Arc<LambdaOp>, ctx: &ExecContext, catches_return: bool) -> EvalResult<Self> {
        let mut captures = HashMap::with_capacity(op.captures.len());
        for capture in &op.captures {
            let cell = match capture.source {
                CaptureSource::Local => ctx.frame.get_or_create(&capture.name),
                CaptureSource::Captured => ctx
                    .captures
                    .get(&capture.name)
                    .cloned()
                    .ok_or_else(|| ErrorCause::NoSuchVariable(capture.name.clone()))?,
            };
            captures.insert(capture.name.clone(), cell);
        }
        Ok(Self {
            op,
            captures: Arc::new(captures),
            catches_return,
        })
    }

    /// Run the body in a fresh frame with `args` bound to the parameters.
    ///
    /// Output goes to `ctx`'s ports. Only the caller's ports are used; the
    /// caller's variables are invisible to the body.
    pub async fn call(
        &self,
        args: Vec<Value>,
        opts: Vec<(String, Value)>,
        ctx: &ExecContext,
    ) -> EvalResult {
        let op = &self.op;
        let fits = match op.rest {
            Some(_) => args.len() >= op.params.len(),
            None => args.len() == op.params.len(),
        };
        if !fits {
            return Err(ErrorCause::ArityMismatch {
                what: "arguments".into(),
                expected: op.arity(),
                got: args.len(),
            }
            .into());
        }
        if let Some((name, _)) = opts.first() {
            return Err(ErrorCause::Type(format!("closure does not take option &{name}")).into());
        }

        let frame = Arc::new(Frame::new());
        let mut args = args.into_iter();
        for name in &op.params {
            if let Some(v) = args.next() {
                frame.set(name, v);
            }
        }
        if let Some(rest) = &op.rest {
            frame.set(rest, Value::list(args));
        }

        let inner = ctx.enter(frame, self.captures.clone());
        match eval_chunk(&op.body, &inner).await {
            Err(e) if self.catches_return && e.flow_kind() == Some(Flow::Return) => Ok(()),
            other => other,
        }
    }
}

impl std::fmt::Debug for Closure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.captures.keys().collect();
        names.sort();
        f.debug_struct("Closure")
            .field("params", &self.op.params)
            .field("rest", &self.op.rest)
            .field("captures", &names)
            .field("catches_return", &self.catches_return)
            .finish()
    }
}
