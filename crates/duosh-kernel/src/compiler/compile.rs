//! AST → ops lowering.
//!
//! The compiler walks a chunk in evaluation order, so a name must be
//! assigned (textually) before it is read. Every variable reference is
//! resolved here, including references on branches that never run.

use std::sync::Arc;

use crate::ast::{
    Assignment, Chunk, Command, Expr, Form, FormBody, Param, Pipeline, Redir, RedirMode,
    RedirTarget, Span,
};
use crate::builtins::{is_builtin_var, BuiltinRegistry};
use crate::interpreter::{TraceEntry, Value};

use super::error::{CompileError, CompileErrorKind};
use super::ops::{
    AssignOp, CallOp, ChunkOp, FormKind, FormOp, HeadOp, LambdaOp, PipelineOp, RedirOp,
    RedirTargetOp, TargetOp, ValueOp, VarRef,
};
use super::scope::StaticScope;
use super::special::SpecialForm;

/// Compile `chunk` against `scope`, which is updated with every name the
/// chunk declares at its top level.
pub fn compile(
    chunk: &Chunk,
    scope: &mut StaticScope,
    builtins: &BuiltinRegistry,
    source_name: &str,
) -> Result<ChunkOp, CompileError> {
    let mut compiler = Compiler {
        scope,
        builtins,
        source: Arc::from(source_name),
    };
    compiler.chunk(chunk)
}

/// Highest descriptor a redirection may name.
pub const MAX_FD: u32 = 1024;

/// Split `ns:rest`. A trailing colon (`mod:`) names the namespace variable
/// itself and is not split.
fn split_ns(name: &str) -> Option<(&str, &str)> {
    match name.split_once(':') {
        Some((ns, rest)) if !ns.is_empty() && !rest.is_empty() => Some((ns, rest)),
        _ => None,
    }
}

pub struct Compiler<'a> {
    pub(super) scope: &'a mut StaticScope,
    builtins: &'a BuiltinRegistry,
    source: Arc<str>,
}

impl Compiler<'_> {
    pub(super) fn error(
        &self,
        kind: CompileErrorKind,
        message: impl Into<String>,
        span: Span,
    ) -> CompileError {
        CompileError::new(kind, message, span, self.source.clone())
    }

    fn pos(&self, span: Span) -> TraceEntry {
        TraceEntry {
            source: self.source.clone(),
            span,
        }
    }

    pub(super) fn chunk(&mut self, chunk: &Chunk) -> Result<ChunkOp, CompileError> {
        let pipelines = chunk
            .pipelines
            .iter()
            .map(|p| self.pipeline(p))
            .collect::<Result<_, _>>()?;
        Ok(ChunkOp { pipelines })
    }

    fn pipeline(&mut self, pipeline: &Pipeline) -> Result<PipelineOp, CompileError> {
        let forms = pipeline
            .forms
            .iter()
            .map(|f| self.form(f).map(Arc::new))
            .collect::<Result<_, _>>()?;
        Ok(PipelineOp {
            forms,
            background: pipeline.background,
            pos: self.pos(pipeline.span),
            text: Arc::from(pipeline.to_string()),
        })
    }

    fn form(&mut self, form: &Form) -> Result<FormOp, CompileError> {
        let redirs = form
            .redirs
            .iter()
            .map(|r| self.redir(r, form.span))
            .collect::<Result<_, _>>()?;
        let temp_assigns = form
            .temp_assigns
            .iter()
            .map(|a| self.temp_assign(a, form.span))
            .collect::<Result<_, _>>()?;
        let kind = match &form.body {
            FormBody::Assign(a) => FormKind::Assign(self.assign(a, form.span)?),
            FormBody::Command(c) => self.command(c, form.span)?,
        };
        Ok(FormOp {
            temp_assigns,
            kind,
            redirs,
            pos: self.pos(form.span),
        })
    }

    fn redir(&mut self, redir: &Redir, span: Span) -> Result<RedirOp, CompileError> {
        self.check_fd(redir.fd, span)?;
        let target = match &redir.target {
            RedirTarget::Path(expr) => RedirTargetOp::Path(self.value(expr, span)?),
            RedirTarget::Fd(fd) => {
                self.check_fd(*fd, span)?;
                if matches!(redir.mode, RedirMode::Append | RedirMode::ReadWrite) {
                    return Err(self.error(
                        CompileErrorKind::BadRedirection,
                        format!("cannot duplicate fd {fd} in this mode"),
                        span,
                    ));
                }
                RedirTargetOp::Fd(*fd)
            }
            RedirTarget::Close => RedirTargetOp::Close,
        };
        Ok(RedirOp {
            fd: redir.fd,
            mode: redir.mode,
            target,
        })
    }

    fn check_fd(&self, fd: u32, span: Span) -> Result<(), CompileError> {
        if fd > MAX_FD {
            return Err(self.error(
                CompileErrorKind::BadRedirection,
                format!("fd {fd} is out of range (max {MAX_FD})"),
                span,
            ));
        }
        Ok(())
    }

    fn temp_assign(&mut self, assign: &Assignment, span: Span) -> Result<AssignOp, CompileError> {
        if let Some(t) = assign.targets.iter().find(|t| t.rest || !t.indices.is_empty()) {
            return Err(self.error(
                CompileErrorKind::MalformedTarget,
                format!("temporary assignment to {} must be a plain variable", t.name),
                span,
            ));
        }
        self.assign(assign, span)
    }

    /// Values compile before targets, so `x = $x` needs an earlier `x`.
    fn assign(&mut self, assign: &Assignment, span: Span) -> Result<AssignOp, CompileError> {
        let values = self.values(&assign.values, span)?;

        let rest_count = assign.targets.iter().filter(|t| t.rest).count();
        let rest_last = assign.targets.last().is_some_and(|t| t.rest);
        if rest_count > 1 || (rest_count == 1 && !rest_last) {
            return Err(self.error(
                CompileErrorKind::MalformedTarget,
                "only the last target may collect the rest",
                span,
            ));
        }
        if assign.targets.is_empty() {
            return Err(self.error(CompileErrorKind::MalformedTarget, "no targets", span));
        }

        let mut targets = Vec::with_capacity(assign.targets.len());
        for t in &assign.targets {
            let (var, indices) = if t.indices.is_empty() {
                (self.resolve_target(&t.name, span)?, Vec::new())
            } else {
                let var = self.resolve_var(&t.name, span)?;
                self.check_writable(&var, span)?;
                if matches!(var, VarRef::Env(_)) {
                    return Err(self.error(
                        CompileErrorKind::MalformedTarget,
                        format!("cannot index environment variable {}", t.name),
                        span,
                    ));
                }
                (var, self.values(&t.indices, span)?)
            };
            targets.push(TargetOp {
                var,
                indices,
                rest: t.rest,
            });
        }
        Ok(AssignOp { targets, values })
    }

    fn command(&mut self, cmd: &Command, span: Span) -> Result<FormKind, CompileError> {
        if let Expr::Bareword(name) = &cmd.head {
            if let Some((form, compile_form)) = SpecialForm::lookup(name) {
                if !cmd.opts.is_empty() {
                    return Err(self.error(
                        CompileErrorKind::BadSpecialForm,
                        format!("{} takes no options", form.name()),
                        span,
                    ));
                }
                return Ok(FormKind::Special(compile_form(self, &cmd.args, span)?));
            }
        }

        let head = match &cmd.head {
            Expr::Bareword(name) | Expr::Quoted(name) => self.resolve_head(name, span)?,
            other => HeadOp::Dynamic(self.value(other, span)?),
        };
        let args = self.values(&cmd.args, span)?;
        let opts = cmd
            .opts
            .iter()
            .map(|o| Ok((o.name.clone(), self.value(&o.value, span)?)))
            .collect::<Result<_, CompileError>>()?;
        Ok(FormKind::Call(CallOp { head, args, opts }))
    }

    /// Special form, then `name~` binding, then builtin, else external.
    fn resolve_head(&mut self, name: &str, span: Span) -> Result<HeadOp, CompileError> {
        if let Some(program) = name.strip_prefix("e:") {
            return Ok(HeadOp::External(program.to_string()));
        }
        if name.contains('/') {
            return Ok(HeadOp::External(name.to_string()));
        }
        let fn_var = format!("{name}~");
        if split_ns(name).is_some() {
            let var = self.resolve_var(&fn_var, span)?;
            return Ok(HeadOp::Function {
                name: name.to_string(),
                var,
            });
        }
        if let Some(var) = self.scope.resolve(&fn_var) {
            return Ok(HeadOp::Function {
                name: name.to_string(),
                var,
            });
        }
        if let Some(builtin) = self.builtins.get(name) {
            return Ok(HeadOp::Builtin(builtin));
        }
        Ok(HeadOp::External(name.to_string()))
    }

    /// Resolve a name for reading.
    pub(super) fn resolve_var(&mut self, name: &str, span: Span) -> Result<VarRef, CompileError> {
        let unresolved = |c: &Self| {
            c.error(
                CompileErrorKind::UnresolvedVariable,
                format!("${name}"),
                span,
            )
        };
        match split_ns(name) {
            Some(("local", rest)) => {
                if self.scope.is_local(rest) {
                    Ok(VarRef::Local(rest.to_string()))
                } else {
                    Err(unresolved(self))
                }
            }
            Some(("up", rest)) => self.scope.resolve_up(rest).ok_or_else(|| unresolved(self)),
            Some(("E", rest)) => Ok(VarRef::Env(rest.to_string())),
            Some(("builtin", rest)) if is_builtin_var(rest) => Ok(VarRef::Builtin(rest.to_string())),
            Some((ns, member)) => {
                let ns_name = format!("{ns}:");
                let ns_var = self.scope.resolve(&ns_name).ok_or_else(|| {
                    self.error(CompileErrorKind::UnresolvedNamespace, ns_name.clone(), span)
                })?;
                Ok(VarRef::Ns {
                    ns: Box::new(ns_var),
                    member: member.to_string(),
                })
            }
            None => match self.scope.resolve(name) {
                Some(var) => Ok(var),
                None if is_builtin_var(name) => Ok(VarRef::Builtin(name.to_string())),
                None => Err(unresolved(self)),
            },
        }
    }

    /// Resolve a name for assignment: an existing binding found by the walk,
    /// else a new binding in the innermost frame.
    pub(super) fn resolve_target(&mut self, name: &str, span: Span) -> Result<VarRef, CompileError> {
        if name.is_empty() || name == "~" {
            return Err(self.error(CompileErrorKind::MalformedTarget, "empty variable name", span));
        }
        match split_ns(name) {
            Some(("local", rest)) => {
                self.scope.declare(rest);
                Ok(VarRef::Local(rest.to_string()))
            }
            Some(("E", rest)) => Ok(VarRef::Env(rest.to_string())),
            Some(_) => {
                let var = self.resolve_var(name, span)?;
                self.check_writable(&var, span)?;
                Ok(var)
            }
            None => match self.scope.resolve(name) {
                Some(var) => Ok(var),
                None if is_builtin_var(name) => Err(self.error(
                    CompileErrorKind::ReadOnlyVariable,
                    format!("${name}"),
                    span,
                )),
                None => {
                    self.scope.declare(name);
                    Ok(VarRef::Local(name.to_string()))
                }
            },
        }
    }

    pub(super) fn check_writable(&self, var: &VarRef, span: Span) -> Result<(), CompileError> {
        match var {
            VarRef::Builtin(_) | VarRef::Ns { .. } => Err(self.error(
                CompileErrorKind::ReadOnlyVariable,
                format!("${}", var.display_name()),
                span,
            )),
            _ => Ok(()),
        }
    }

    pub(super) fn values(&mut self, exprs: &[Expr], span: Span) -> Result<Vec<ValueOp>, CompileError> {
        exprs.iter().map(|e| self.value(e, span)).collect()
    }

    pub(super) fn value(&mut self, expr: &Expr, span: Span) -> Result<ValueOp, CompileError> {
        Ok(match expr {
            Expr::Bareword(s) | Expr::Quoted(s) => ValueOp::Literal(Value::String(s.clone())),
            Expr::Variable { name, explode } => ValueOp::Var {
                var: self.resolve_var(name, span)?,
                explode: *explode,
            },
            Expr::Index { base, indices } => ValueOp::Index {
                base: Box::new(self.value(base, span)?),
                indices: self.values(indices, span)?,
            },
            Expr::List(items) => ValueOp::List(self.values(items, span)?),
            Expr::Map(pairs) => ValueOp::Map(
                pairs
                    .iter()
                    .map(|(k, v)| Ok((self.value(k, span)?, self.value(v, span)?)))
                    .collect::<Result<_, CompileError>>()?,
            ),
            Expr::Lambda { params, body } => ValueOp::Lambda(self.lambda(params, body, span)?),
            Expr::OutputCapture(chunk) => ValueOp::OutputCapture(Arc::new(self.chunk(chunk)?)),
            Expr::ExceptionCapture(chunk) => {
                ValueOp::ExceptionCapture(Arc::new(self.chunk(chunk)?))
            }
            Expr::Compound(parts) if parts.len() == 1 => self.value(&parts[0], span)?,
            Expr::Compound(parts) => ValueOp::Compound(self.values(parts, span)?),
            Expr::Wildcard {
                pattern,
                nomatch_ok,
            } => ValueOp::Wildcard {
                pattern: pattern.clone(),
                nomatch_ok: *nomatch_ok,
            },
        })
    }

    pub(super) fn lambda(
        &mut self,
        params: &[Param],
        body: &Chunk,
        span: Span,
    ) -> Result<Arc<LambdaOp>, CompileError> {
        let mut names: Vec<String> = Vec::new();
        let mut rest = None;
        for (i, p) in params.iter().enumerate() {
            if p.name.is_empty() || p.name.contains(':') {
                return Err(self.error(
                    CompileErrorKind::BadSignature,
                    format!("invalid parameter name {:?}", p.name),
                    span,
                ));
            }
            if names.contains(&p.name) || rest.as_ref() == Some(&p.name) {
                return Err(self.error(
                    CompileErrorKind::BadSignature,
                    format!("duplicate parameter {}", p.name),
                    span,
                ));
            }
            if p.rest {
                if i != params.len() - 1 {
                    return Err(self.error(
                        CompileErrorKind::BadSignature,
                        "rest parameter must be last",
                        span,
                    ));
                }
                rest = Some(p.name.clone());
            } else {
                names.push(p.name.clone());
            }
        }

        self.scope.push();
        for name in names.iter().chain(rest.iter()) {
            self.scope.declare(name);
        }
        let body = self.chunk(body);
        let captures = self.scope.pop();

        Ok(Arc::new(LambdaOp {
            params: names,
            rest,
            captures,
            body: Arc::new(body?),
            pos: self.pos(span),
        }))
    }

    /// A special-form body: a parameterless lambda literal compiled into the
    /// current frame.
    pub(super) fn inline_body(
        &mut self,
        expr: Option<&Expr>,
        what: &str,
        span: Span,
    ) -> Result<Arc<ChunkOp>, CompileError> {
        match expr {
            Some(Expr::Lambda { params, body }) if params.is_empty() => {
                Ok(Arc::new(self.chunk(body)?))
            }
            _ => Err(self.error(
                CompileErrorKind::BadSpecialForm,
                format!("{what} must be a lambda literal without parameters"),
                span,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Chunk, Pipeline, Target};

    fn cmd(head: &str, args: Vec<Expr>) -> Form {
        Form {
            temp_assigns: vec![],
            body: FormBody::Command(Command {
                head: Expr::Bareword(head.into()),
                args,
                opts: vec![],
            }),
            redirs: vec![],
            span: Span::default(),
        }
    }

    fn assign(name: &str, value: &str) -> Form {
        Form {
            temp_assigns: vec![],
            body: FormBody::Assign(Assignment {
                targets: vec![Target { name: name.into(), indices: vec![], rest: false }],
                values: vec![Expr::Bareword(value.into())],
            }),
            redirs: vec![],
            span: Span::default(),
        }
    }

    fn chunk(forms: Vec<Form>) -> Chunk {
        Chunk {
            pipelines: forms
                .into_iter()
                .map(|f| Pipeline { forms: vec![f], background: false, span: Span::default() })
                .collect(),
        }
    }

    fn var(name: &str) -> Expr {
        Expr::Variable { name: name.into(), explode: false }
    }

    fn compile_err(c: &Chunk) -> CompileErrorKind {
        let registry = BuiltinRegistry::with_defaults();
        let mut scope = StaticScope::new();
        compile(c, &mut scope, &registry, "[test]").unwrap_err().kind
    }

    fn compile_ok(c: &Chunk) -> ChunkOp {
        let registry = BuiltinRegistry::with_defaults();
        let mut scope = StaticScope::new();
        compile(c, &mut scope, &registry, "[test]").unwrap()
    }

    #[test]
    fn use_before_assignment_is_a_compile_error() {
        let c = chunk(vec![cmd("echo", vec![var("x")]), assign("x", "1")]);
        assert_eq!(compile_err(&c), CompileErrorKind::UnresolvedVariable);
    }

    #[test]
    fn redirection_fd_is_bounded() {
        let mut form = cmd("echo", vec![]);
        form.redirs.push(Redir {
            fd: 3_000_000_000,
            mode: RedirMode::Write,
            target: RedirTarget::Path(Expr::Bareword("f".into())),
        });
        assert_eq!(compile_err(&chunk(vec![form])), CompileErrorKind::BadRedirection);

        let mut form = cmd("echo", vec![]);
        form.redirs.push(Redir {
            fd: 2,
            mode: RedirMode::Write,
            target: RedirTarget::Fd(MAX_FD + 1),
        });
        assert_eq!(compile_err(&chunk(vec![form])), CompileErrorKind::BadRedirection);

        let mut form = cmd("echo", vec![]);
        form.redirs.push(Redir {
            fd: MAX_FD,
            mode: RedirMode::Write,
            target: RedirTarget::Fd(1),
        });
        compile_ok(&chunk(vec![form]));
    }

    #[test]
    fn builtin_variables_resolve() {
        compile_ok(&chunk(vec![cmd("put", vec![var("true"), var("ok")])]));
    }

    #[test]
    fn builtin_variables_are_read_only() {
        let c = chunk(vec![assign("true", "no")]);
        assert_eq!(compile_err(&c), CompileErrorKind::ReadOnlyVariable);
    }

    #[test]
    fn unknown_head_is_external() {
        let op = compile_ok(&chunk(vec![cmd("definitely-not-a-builtin", vec![])]));
        match &op.pipelines[0].forms[0].kind {
            FormKind::Call(CallOp { head: HeadOp::External(name), .. }) => {
                assert_eq!(name, "definitely-not-a-builtin")
            }
            other => panic!("expected external call, got {other:?}"),
        }
    }

    #[test]
    fn e_prefix_forces_external() {
        let op = compile_ok(&chunk(vec![cmd("e:echo", vec![])]));
        assert!(matches!(
            &op.pipelines[0].forms[0].kind,
            FormKind::Call(CallOp { head: HeadOp::External(name), .. }) if name == "echo"
        ));
    }

    #[test]
    fn unknown_namespace_is_reported() {
        let c = chunk(vec![cmd("put", vec![var("nomod:x")])]);
        assert_eq!(compile_err(&c), CompileErrorKind::UnresolvedNamespace);
    }

    #[test]
    fn rest_target_must_be_last() {
        let c = chunk(vec![Form {
            temp_assigns: vec![],
            body: FormBody::Assign(Assignment {
                targets: vec![
                    Target { name: "a".into(), indices: vec![], rest: true },
                    Target { name: "b".into(), indices: vec![], rest: false },
                ],
                values: vec![],
            }),
            redirs: vec![],
            span: Span::default(),
        }]);
        assert_eq!(compile_err(&c), CompileErrorKind::MalformedTarget);
    }

    #[test]
    fn lambda_rest_param_must_be_last() {
        let lambda = Expr::Lambda {
            params: vec![
                Param { name: "a".into(), rest: true },
                Param { name: "b".into(), rest: false },
            ],
            body: Chunk::default(),
        };
        let c = chunk(vec![cmd("put", vec![lambda])]);
        assert_eq!(compile_err(&c), CompileErrorKind::BadSignature);
    }

    #[test]
    fn top_level_names_flow_back_into_scope() {
        let registry = BuiltinRegistry::with_defaults();
        let mut scope = StaticScope::new();
        compile(&chunk(vec![assign("x", "1")]), &mut scope, &registry, "[test]").unwrap();
        assert!(scope.global_names().contains("x"));
    }
}
