//! fail, nop and the flow-control commands.

use async_trait::async_trait;

use crate::interpreter::{EvalResult, Exception, ExecContext, Flow, Value};

use super::traits::{Builtin, BuiltinArgs, BuiltinSchema, ParamSchema};

/// fail: raise an exception. An exception value is re-raised as is.
pub struct Fail;

#[async_trait]
impl Builtin for Fail {
    fn name(&self) -> &str {
        "fail"
    }

    fn schema(&self) -> BuiltinSchema {
        BuiltinSchema::new("fail", "Raise an exception with the given reason")
            .param(ParamSchema::required("reason", "Exception value or reason"))
    }

    async fn call(&self, mut args: BuiltinArgs, _ctx: &ExecContext) -> EvalResult {
        match args.positional.remove(0) {
            Value::Exception(Some(e)) => Err(Exception::clone(&e)),
            reason => Err(Exception::fail(reason)),
        }
    }
}

/// nop: accept anything, do nothing.
pub struct Nop;

#[async_trait]
impl Builtin for Nop {
    fn name(&self) -> &str {
        "nop"
    }

    fn schema(&self) -> BuiltinSchema {
        BuiltinSchema::new("nop", "Do nothing")
            .param(ParamSchema::variadic("args", "Ignored"))
            .any_opts()
    }

    async fn call(&self, _args: BuiltinArgs, _ctx: &ExecContext) -> EvalResult {
        Ok(())
    }
}

/// `break`, `continue` and `return`: raise the matching flow signal.
pub struct FlowCommand(pub Flow);

#[async_trait]
impl Builtin for FlowCommand {
    fn name(&self) -> &str {
        match self.0 {
            Flow::Break => "break",
            Flow::Continue => "continue",
            Flow::Return => "return",
        }
    }

    fn schema(&self) -> BuiltinSchema {
        let description = match self.0 {
            Flow::Break => "Leave the innermost loop",
            Flow::Continue => "Start the next iteration of the innermost loop",
            Flow::Return => "Return from the innermost function",
        };
        BuiltinSchema::new(self.name(), description)
    }

    async fn call(&self, _args: BuiltinArgs, _ctx: &ExecContext) -> EvalResult {
        Err(Exception::flow(self.0))
    }
}
