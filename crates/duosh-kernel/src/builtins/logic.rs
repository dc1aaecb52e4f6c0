//! Boolean and comparison builtins.

use async_trait::async_trait;

use crate::interpreter::{EvalResult, ExecContext, Value};

use super::traits::{Builtin, BuiltinArgs, BuiltinSchema, ParamSchema};

pub struct Not;

#[async_trait]
impl Builtin for Not {
    fn name(&self) -> &str {
        "not"
    }

    fn schema(&self) -> BuiltinSchema {
        BuiltinSchema::new("not", "Output the boolean negation of a value")
            .param(ParamSchema::required("value", "Value to negate"))
    }

    async fn call(&self, args: BuiltinArgs, ctx: &ExecContext) -> EvalResult {
        ctx.put(Value::Bool(!args.positional[0].truthy())).await
    }
}

pub struct Bool;

#[async_trait]
impl Builtin for Bool {
    fn name(&self) -> &str {
        "bool"
    }

    fn schema(&self) -> BuiltinSchema {
        BuiltinSchema::new("bool", "Output the truthiness of a value")
            .param(ParamSchema::required("value", "Value to convert"))
    }

    async fn call(&self, args: BuiltinArgs, ctx: &ExecContext) -> EvalResult {
        ctx.put(Value::Bool(args.positional[0].truthy())).await
    }
}

/// eq: true when every adjacent pair of arguments is equal.
pub struct Eq;

#[async_trait]
impl Builtin for Eq {
    fn name(&self) -> &str {
        "eq"
    }

    fn schema(&self) -> BuiltinSchema {
        BuiltinSchema::new("eq", "Whether all arguments are equal")
            .param(ParamSchema::variadic("values", "Values to compare"))
    }

    async fn call(&self, args: BuiltinArgs, ctx: &ExecContext) -> EvalResult {
        let all_equal = args.positional.windows(2).all(|w| w[0] == w[1]);
        ctx.put(Value::Bool(all_equal)).await
    }
}

/// not-eq: true when every adjacent pair of arguments differs.
pub struct NotEq;

#[async_trait]
impl Builtin for NotEq {
    fn name(&self) -> &str {
        "not-eq"
    }

    fn schema(&self) -> BuiltinSchema {
        BuiltinSchema::new("not-eq", "Whether adjacent arguments all differ")
            .param(ParamSchema::variadic("values", "Values to compare"))
    }

    async fn call(&self, args: BuiltinArgs, ctx: &ExecContext) -> EvalResult {
        let all_differ = args.positional.windows(2).all(|w| w[0] != w[1]);
        ctx.put(Value::Bool(all_differ)).await
    }
}
