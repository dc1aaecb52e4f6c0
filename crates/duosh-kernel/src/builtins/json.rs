//! to-json and from-json.

use async_trait::async_trait;

use crate::interpreter::{ErrorCause, EvalResult, ExecContext, Value};

use super::inputs::Inputs;
use super::traits::{Builtin, BuiltinArgs, BuiltinSchema, ParamSchema};

/// to-json: write each input as one line of JSON.
pub struct ToJson;

#[async_trait]
impl Builtin for ToJson {
    fn name(&self) -> &str {
        "to-json"
    }

    fn schema(&self) -> BuiltinSchema {
        BuiltinSchema::new("to-json", "Write each input as a line of JSON")
            .param(ParamSchema::optional("inputs", "List to iterate instead of stdin"))
    }

    async fn call(&self, args: BuiltinArgs, ctx: &ExecContext) -> EvalResult {
        let mut inputs = Inputs::new(args.get(0), ctx)?;
        while let Some(v) = inputs.next().await? {
            let line = serde_json::to_string(&v.to_json()?)
                .map_err(|e| ErrorCause::Type(e.to_string()))?;
            ctx.write_out(&format!("{line}\n")).await?;
        }
        Ok(())
    }
}

/// from-json: parse the byte input as a stream of JSON documents.
pub struct FromJson;

#[async_trait]
impl Builtin for FromJson {
    fn name(&self) -> &str {
        "from-json"
    }

    fn schema(&self) -> BuiltinSchema {
        BuiltinSchema::new("from-json", "Output each JSON document in the byte input")
    }

    async fn call(&self, _args: BuiltinArgs, ctx: &ExecContext) -> EvalResult {
        let bytes = match ctx.stdin() {
            Some(port) => port.read_to_end().await?,
            None => return Ok(()),
        };
        for doc in serde_json::Deserializer::from_slice(&bytes).into_iter::<serde_json::Value>() {
            let doc = doc.map_err(|e| ErrorCause::Type(format!("bad json input: {e}")))?;
            ctx.put(Value::from_json(&doc)).await?;
        }
        Ok(())
    }
}
