//! Core builtin traits and types.

use async_trait::async_trait;

use crate::interpreter::{ErrorCause, EvalResult, ExecContext, Value};

/// Schema for a positional parameter.
#[derive(Debug, Clone)]
pub struct ParamSchema {
    pub name: String,
    /// Whether this parameter must be given.
    pub required: bool,
    /// Takes every remaining argument. Only valid last.
    pub variadic: bool,
    pub description: String,
}

impl ParamSchema {
    pub fn required(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
            variadic: false,
            description: description.into(),
        }
    }

    pub fn optional(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name, description)
        }
    }

    pub fn variadic(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            required: false,
            variadic: true,
            ..Self::required(name, description)
        }
    }
}

/// Schema for an `&name=value` option.
#[derive(Debug, Clone)]
pub struct OptSchema {
    pub name: String,
    pub default: Value,
    pub description: String,
}

/// Schema describing a builtin's interface.
#[derive(Debug, Clone)]
pub struct BuiltinSchema {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSchema>,
    pub opts: Vec<OptSchema>,
    /// Accept options not listed in `opts` (`nop`).
    pub any_opts: bool,
}

impl BuiltinSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
            opts: Vec::new(),
            any_opts: false,
        }
    }

    pub fn param(mut self, param: ParamSchema) -> Self {
        self.params.push(param);
        self
    }

    pub fn opt(
        mut self,
        name: impl Into<String>,
        default: impl Into<Value>,
        description: impl Into<String>,
    ) -> Self {
        self.opts.push(OptSchema {
            name: name.into(),
            default: default.into(),
            description: description.into(),
        });
        self
    }

    pub fn any_opts(mut self) -> Self {
        self.any_opts = true;
        self
    }

    /// Minimum and maximum positional count; `None` is unbounded.
    pub fn arity(&self) -> (usize, Option<usize>) {
        let min = self.params.iter().filter(|p| p.required).count();
        let max = if self.params.iter().any(|p| p.variadic) {
            None
        } else {
            Some(self.params.len())
        };
        (min, max)
    }

    /// Check `args` against this schema and fill in option defaults.
    pub fn apply(&self, args: &mut BuiltinArgs) -> Result<(), ErrorCause> {
        let got = args.positional.len();
        let (min, max) = self.arity();
        if got < min || max.is_some_and(|max| got > max) {
            let expected = match max {
                None => format!("{min} or more"),
                Some(max) if max == min => min.to_string(),
                Some(max) => format!("{min} to {max}"),
            };
            return Err(ErrorCause::ArityMismatch {
                what: format!("arguments to {}", self.name),
                expected,
                got,
            });
        }

        if !self.any_opts {
            if let Some((name, _)) = args
                .opts
                .iter()
                .find(|(name, _)| !self.opts.iter().any(|o| &o.name == name))
            {
                return Err(ErrorCause::Type(format!(
                    "{} does not take option &{name}",
                    self.name
                )));
            }
        }
        for opt in &self.opts {
            if args.opt(&opt.name).is_none() {
                args.opts.push((opt.name.clone(), opt.default.clone()));
            }
        }
        Ok(())
    }
}

/// Evaluated arguments ready for a builtin.
#[derive(Debug, Clone, Default)]
pub struct BuiltinArgs {
    /// Positional arguments in order.
    pub positional: Vec<Value>,
    /// Options in source order.
    pub opts: Vec<(String, Value)>,
}

impl BuiltinArgs {
    pub fn new(positional: Vec<Value>, opts: Vec<(String, Value)>) -> Self {
        Self { positional, opts }
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    /// Last occurrence wins.
    pub fn opt(&self, name: &str) -> Option<&Value> {
        self.opts
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn opt_str(&self, name: &str) -> Result<&str, ErrorCause> {
        match self.opt(name) {
            Some(v) => v.expect_string(name),
            None => Ok(""),
        }
    }
}

/// A command implemented inside the kernel.
#[async_trait]
pub trait Builtin: Send + Sync {
    /// The builtin's name (used for lookup).
    fn name(&self) -> &str;

    fn schema(&self) -> BuiltinSchema;

    /// Run with already validated arguments.
    async fn call(&self, args: BuiltinArgs, ctx: &ExecContext) -> EvalResult;
}

/// Validate `args` against the builtin's schema, then run it.
pub async fn invoke(builtin: &dyn Builtin, mut args: BuiltinArgs, ctx: &ExecContext) -> EvalResult {
    builtin.schema().apply(&mut args)?;
    builtin.call(args, ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> BuiltinSchema {
        BuiltinSchema::new("demo", "test")
            .param(ParamSchema::required("a", ""))
            .param(ParamSchema::optional("b", ""))
            .opt("sep", " ", "")
    }

    #[test]
    fn arity_range() {
        assert_eq!(schema().arity(), (1, Some(2)));
        let variadic = BuiltinSchema::new("v", "").param(ParamSchema::variadic("xs", ""));
        assert_eq!(variadic.arity(), (0, None));
    }

    #[test]
    fn too_many_arguments() {
        let mut args = BuiltinArgs::new(vec!["1".into(), "2".into(), "3".into()], vec![]);
        let err = schema().apply(&mut args).unwrap_err();
        assert!(matches!(
            err,
            ErrorCause::ArityMismatch { ref expected, got: 3, .. } if expected == "1 to 2"
        ));
    }

    #[test]
    fn defaults_fill_missing_options() {
        let mut args = BuiltinArgs::new(vec!["1".into()], vec![]);
        schema().apply(&mut args).unwrap();
        assert_eq!(args.opt("sep"), Some(&Value::from(" ")));
    }

    #[test]
    fn unknown_option_is_rejected() {
        let mut args = BuiltinArgs::new(vec!["1".into()], vec![("nope".into(), "x".into())]);
        assert!(matches!(schema().apply(&mut args), Err(ErrorCause::Type(_))));
    }
}
