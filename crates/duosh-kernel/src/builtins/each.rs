//! each: call a function on every input.

use async_trait::async_trait;

use crate::interpreter::{call_value, loop_step, EvalResult, ExecContext, LoopStep};

use super::inputs::Inputs;
use super::traits::{Builtin, BuiltinArgs, BuiltinSchema, ParamSchema};

/// `each $f [inputs]`. The callback may `break` or `continue`.
pub struct Each;

#[async_trait]
impl Builtin for Each {
    fn name(&self) -> &str {
        "each"
    }

    fn schema(&self) -> BuiltinSchema {
        BuiltinSchema::new("each", "Call a function with each input")
            .param(ParamSchema::required("f", "Function taking one argument"))
            .param(ParamSchema::optional("inputs", "List to iterate instead of stdin"))
    }

    async fn call(&self, args: BuiltinArgs, ctx: &ExecContext) -> EvalResult {
        let f = &args.positional[0];
        let mut inputs = Inputs::new(args.get(1), ctx)?;
        while let Some(v) = inputs.next().await? {
            let step = loop_step(call_value(f, vec![v], Vec::new(), ctx).await)?;
            if step == LoopStep::Stop {
                break;
            }
        }
        Ok(())
    }
}
