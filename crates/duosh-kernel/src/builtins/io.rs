//! Builtins that move data between the two sub-streams.

use async_trait::async_trait;

use crate::interpreter::{ErrorCause, EvalResult, ExecContext, Value};

use super::inputs::Inputs;
use super::traits::{Builtin, BuiltinArgs, BuiltinSchema, ParamSchema};

fn joined(args: &BuiltinArgs) -> Result<String, ErrorCause> {
    let sep = args.opt_str("sep")?;
    Ok(args
        .positional
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(sep))
}

/// echo: write arguments to the byte side, followed by a newline.
pub struct Echo;

#[async_trait]
impl Builtin for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn schema(&self) -> BuiltinSchema {
        BuiltinSchema::new("echo", "Write arguments as text, then a newline")
            .param(ParamSchema::variadic("args", "Values to write"))
            .opt("sep", " ", "Separator between arguments")
    }

    async fn call(&self, args: BuiltinArgs, ctx: &ExecContext) -> EvalResult {
        let mut text = joined(&args)?;
        text.push('\n');
        ctx.write_out(&text).await
    }
}

/// print: like echo without the newline.
pub struct Print;

#[async_trait]
impl Builtin for Print {
    fn name(&self) -> &str {
        "print"
    }

    fn schema(&self) -> BuiltinSchema {
        BuiltinSchema::new("print", "Write arguments as text")
            .param(ParamSchema::variadic("args", "Values to write"))
            .opt("sep", " ", "Separator between arguments")
    }

    async fn call(&self, args: BuiltinArgs, ctx: &ExecContext) -> EvalResult {
        ctx.write_out(&joined(&args)?).await
    }
}

/// put: emit each argument on the value side.
pub struct Put;

#[async_trait]
impl Builtin for Put {
    fn name(&self) -> &str {
        "put"
    }

    fn schema(&self) -> BuiltinSchema {
        BuiltinSchema::new("put", "Output arguments as values")
            .param(ParamSchema::variadic("values", "Values to output"))
    }

    async fn call(&self, args: BuiltinArgs, ctx: &ExecContext) -> EvalResult {
        for v in args.positional {
            ctx.put(v).await?;
        }
        Ok(())
    }
}

/// all: pass inputs through as values.
pub struct All;

#[async_trait]
impl Builtin for All {
    fn name(&self) -> &str {
        "all"
    }

    fn schema(&self) -> BuiltinSchema {
        BuiltinSchema::new("all", "Output every input as a value")
            .param(ParamSchema::optional("inputs", "List to iterate instead of stdin"))
    }

    async fn call(&self, args: BuiltinArgs, ctx: &ExecContext) -> EvalResult {
        let mut inputs = Inputs::new(args.get(0), ctx)?;
        while let Some(v) = inputs.next().await? {
            ctx.put(v).await?;
        }
        Ok(())
    }
}

/// slurp: read all byte input into one string value.
pub struct Slurp;

#[async_trait]
impl Builtin for Slurp {
    fn name(&self) -> &str {
        "slurp"
    }

    fn schema(&self) -> BuiltinSchema {
        BuiltinSchema::new("slurp", "Output the whole byte input as one string")
    }

    async fn call(&self, _args: BuiltinArgs, ctx: &ExecContext) -> EvalResult {
        let bytes = match ctx.stdin() {
            Some(port) => port.read_to_end().await?,
            None => Vec::new(),
        };
        let text = String::from_utf8(bytes)
            .map_err(|e| ErrorCause::Type(format!("input is not utf-8: {e}")))?;
        ctx.put(Value::String(text)).await
    }
}

/// from-lines: each byte line becomes a string value.
pub struct FromLines;

#[async_trait]
impl Builtin for FromLines {
    fn name(&self) -> &str {
        "from-lines"
    }

    fn schema(&self) -> BuiltinSchema {
        BuiltinSchema::new("from-lines", "Output each line of byte input as a string")
    }

    async fn call(&self, _args: BuiltinArgs, ctx: &ExecContext) -> EvalResult {
        let Some(port) = ctx.stdin() else {
            return Ok(());
        };
        while let Some(line) = port.read_line().await? {
            ctx.put(Value::String(line)).await?;
        }
        Ok(())
    }
}

/// to-lines: write each input on its own byte line.
pub struct ToLines;

#[async_trait]
impl Builtin for ToLines {
    fn name(&self) -> &str {
        "to-lines"
    }

    fn schema(&self) -> BuiltinSchema {
        BuiltinSchema::new("to-lines", "Write each input as a line of text")
            .param(ParamSchema::optional("inputs", "List to iterate instead of stdin"))
    }

    async fn call(&self, args: BuiltinArgs, ctx: &ExecContext) -> EvalResult {
        let mut inputs = Inputs::new(args.get(0), ctx)?;
        while let Some(v) = inputs.next().await? {
            ctx.write_out(&format!("{v}\n")).await?;
        }
        Ok(())
    }
}
