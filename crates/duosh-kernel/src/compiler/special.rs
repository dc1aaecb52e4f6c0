//! The special-form table.
//!
//! Special forms are looked up by literal head name before anything else.
//! Each entry pairs the form with its compile function; the resulting
//! [`SpecialOp`] is evaluated by the interpreter's control-flow module.

use crate::ast::{Expr, Span};

use super::compile::Compiler;
use super::error::{CompileError, CompileErrorKind};
use super::ops::{DelTarget, ExceptClause, SpecialOp, VarRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialForm {
    If,
    While,
    For,
    Try,
    Fn,
    And,
    Or,
    Del,
    Use,
}

pub type FormCompiler = fn(&mut Compiler<'_>, &[Expr], Span) -> Result<SpecialOp, CompileError>;

const TABLE: &[(&str, SpecialForm, FormCompiler)] = &[
    ("if", SpecialForm::If, compile_if),
    ("while", SpecialForm::While, compile_while),
    ("for", SpecialForm::For, compile_for),
    ("try", SpecialForm::Try, compile_try),
    ("fn", SpecialForm::Fn, compile_fn),
    ("and", SpecialForm::And, compile_and),
    ("or", SpecialForm::Or, compile_or),
    ("del", SpecialForm::Del, compile_del),
    ("use", SpecialForm::Use, compile_use),
];

impl SpecialForm {
    pub fn lookup(name: &str) -> Option<(SpecialForm, FormCompiler)> {
        TABLE
            .iter()
            .find(|(n, _, _)| *n == name)
            .map(|(_, form, compile)| (*form, *compile))
    }

    pub fn name(&self) -> &'static str {
        TABLE
            .iter()
            .find(|(_, form, _)| form == self)
            .map_or("?", |(n, _, _)| n)
    }
}

fn bad(c: &Compiler<'_>, message: impl Into<String>, span: Span) -> CompileError {
    c.error(CompileErrorKind::BadSpecialForm, message, span)
}

fn keyword(expr: Option<&Expr>) -> Option<&str> {
    match expr {
        Some(Expr::Bareword(s)) => Some(s),
        _ => None,
    }
}

/// `if cond { } elif cond { } else { }`
fn compile_if(c: &mut Compiler<'_>, args: &[Expr], span: Span) -> Result<SpecialOp, CompileError> {
    let mut branches = Vec::new();
    let mut else_body = None;
    let mut i = 0;
    loop {
        let cond = args
            .get(i)
            .ok_or_else(|| bad(c, "if: missing condition", span))?;
        let cond = c.value(cond, span)?;
        let body = c.inline_body(args.get(i + 1), "if body", span)?;
        branches.push((cond, body));
        i += 2;
        match keyword(args.get(i)) {
            Some("elif") => i += 1,
            Some("else") => {
                else_body = Some(c.inline_body(args.get(i + 1), "else body", span)?);
                i += 2;
                break;
            }
            _ => break,
        }
    }
    if i != args.len() {
        return Err(bad(c, "if: unexpected trailing arguments", span));
    }
    Ok(SpecialOp::If {
        branches,
        else_body,
    })
}

/// `while cond { } else { }`
fn compile_while(c: &mut Compiler<'_>, args: &[Expr], span: Span) -> Result<SpecialOp, CompileError> {
    let cond = args
        .first()
        .ok_or_else(|| bad(c, "while: missing condition", span))?;
    let cond = c.value(cond, span)?;
    let body = c.inline_body(args.get(1), "while body", span)?;
    let else_body = trailing_else(c, args, 2, "while", span)?;
    Ok(SpecialOp::While {
        cond,
        body,
        else_body,
    })
}

/// `for var container { } else { }`
fn compile_for(c: &mut Compiler<'_>, args: &[Expr], span: Span) -> Result<SpecialOp, CompileError> {
    let name = match args.first() {
        Some(Expr::Bareword(name)) => name,
        _ => return Err(bad(c, "for: expected a variable name", span)),
    };
    let container = args
        .get(1)
        .ok_or_else(|| bad(c, "for: missing container", span))?;
    let container = c.value(container, span)?;
    let var = c.resolve_target(name, span)?;
    let body = c.inline_body(args.get(2), "for body", span)?;
    let else_body = trailing_else(c, args, 3, "for", span)?;
    Ok(SpecialOp::For {
        var,
        container,
        body,
        else_body,
    })
}

fn trailing_else(
    c: &mut Compiler<'_>,
    args: &[Expr],
    at: usize,
    form: &str,
    span: Span,
) -> Result<Option<std::sync::Arc<super::ops::ChunkOp>>, CompileError> {
    match (args.len() - at.min(args.len()), keyword(args.get(at))) {
        (0, _) => Ok(None),
        (2, Some("else")) => Ok(Some(c.inline_body(args.get(at + 1), "else body", span)?)),
        _ => Err(bad(c, format!("{form}: unexpected trailing arguments"), span)),
    }
}

/// `try { } except e { } else { } finally { }`
///
/// `catch` is accepted as a synonym for `except`. Clauses must appear in
/// this order and at least one is required.
fn compile_try(c: &mut Compiler<'_>, args: &[Expr], span: Span) -> Result<SpecialOp, CompileError> {
    let body = c.inline_body(args.first(), "try body", span)?;
    let mut except = None;
    let mut else_body = None;
    let mut finally = None;
    let mut stage = 0;
    let mut i = 1;

    while i < args.len() {
        match keyword(args.get(i)) {
            Some("except" | "catch") if stage < 1 => {
                stage = 1;
                i += 1;
                let var = match args.get(i) {
                    Some(Expr::Bareword(name)) => {
                        i += 1;
                        Some(c.resolve_target(name, span)?)
                    }
                    _ => None,
                };
                let body = c.inline_body(args.get(i), "except body", span)?;
                except = Some(ExceptClause { var, body });
                i += 1;
            }
            Some("else") if stage < 2 => {
                stage = 2;
                else_body = Some(c.inline_body(args.get(i + 1), "else body", span)?);
                i += 2;
            }
            Some("finally") if stage < 3 => {
                stage = 3;
                finally = Some(c.inline_body(args.get(i + 1), "finally body", span)?);
                i += 2;
            }
            _ => return Err(bad(c, "try: unexpected argument", span)),
        }
    }

    if stage == 0 {
        return Err(bad(c, "try needs except, else or finally", span));
    }
    Ok(SpecialOp::Try {
        body,
        except,
        else_body,
        finally,
    })
}

/// `fn name {|params| body }` binds `name~` in the current frame. The
/// binding is declared before the body compiles so the body can recurse.
fn compile_fn(c: &mut Compiler<'_>, args: &[Expr], span: Span) -> Result<SpecialOp, CompileError> {
    let (name, params, body) = match args {
        [Expr::Bareword(name), Expr::Lambda { params, body }] => (name, params, body),
        _ => return Err(bad(c, "fn: expected a name and a lambda", span)),
    };
    if name.contains(':') {
        return Err(bad(c, format!("fn: invalid function name {name}"), span));
    }
    let var_name = format!("{name}~");
    c.scope.declare(&var_name);
    let lambda = c.lambda(params, body, span)?;
    Ok(SpecialOp::Fn {
        var: VarRef::Local(var_name),
        lambda,
    })
}

fn compile_and(c: &mut Compiler<'_>, args: &[Expr], span: Span) -> Result<SpecialOp, CompileError> {
    Ok(SpecialOp::And(c.values(args, span)?))
}

fn compile_or(c: &mut Compiler<'_>, args: &[Expr], span: Span) -> Result<SpecialOp, CompileError> {
    Ok(SpecialOp::Or(c.values(args, span)?))
}

/// `del x` removes a local variable; `del x[k]` removes an element.
fn compile_del(c: &mut Compiler<'_>, args: &[Expr], span: Span) -> Result<SpecialOp, CompileError> {
    let mut targets = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            Expr::Bareword(name) => {
                let plain = name.strip_prefix("local:").unwrap_or(name);
                if !c.scope.undeclare(plain) {
                    return Err(bad(c, format!("del: {name} is not a local variable"), span));
                }
                targets.push(DelTarget {
                    var: VarRef::Local(plain.to_string()),
                    indices: Vec::new(),
                });
            }
            Expr::Index { base, indices } => {
                let name = match base.as_ref() {
                    Expr::Bareword(name) => name,
                    _ => return Err(bad(c, "del: expected a variable name", span)),
                };
                let var = c.resolve_var(name, span)?;
                c.check_writable(&var, span)?;
                let indices = c.values(indices, span)?;
                targets.push(DelTarget { var, indices });
            }
            _ => return Err(bad(c, "del: expected a variable or element", span)),
        }
    }
    Ok(SpecialOp::Del(targets))
}

/// `use a:b [alias]` binds `alias:` in the current frame.
fn compile_use(c: &mut Compiler<'_>, args: &[Expr], span: Span) -> Result<SpecialOp, CompileError> {
    let (spec, alias) = match args {
        [spec] => (spec.as_literal(), None),
        [spec, Expr::Bareword(alias)] => (spec.as_literal(), Some(alias.as_str())),
        _ => return Err(bad(c, "use: expected a module spec and optional alias", span)),
    };
    let spec = spec.ok_or_else(|| bad(c, "use: module spec must be literal", span))?;
    let alias = alias
        .or_else(|| spec.rsplit([':', '/']).next())
        .filter(|a| !a.is_empty())
        .ok_or_else(|| bad(c, format!("use: cannot derive an alias from {spec:?}"), span))?;
    let var_name = format!("{alias}:");
    c.scope.declare(&var_name);
    Ok(SpecialOp::Use {
        spec: spec.to_string(),
        var: VarRef::Local(var_name),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_round_trips_names() {
        for name in ["if", "while", "for", "try", "fn", "and", "or", "del", "use"] {
            let (form, _) = SpecialForm::lookup(name).unwrap();
            assert_eq!(form.name(), name);
        }
        assert!(SpecialForm::lookup("echo").is_none());
    }
}
