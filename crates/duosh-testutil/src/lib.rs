//! Test helpers for duosh.
//!
//! The core takes parsed chunks, so tests build them directly. These
//! builders keep test bodies close to how the code would read as source:
//!
//! ```
//! use duosh_testutil::*;
//!
//! // x = (put a b | all)
//! let c = chunk([assign(["x"], [capture(chunk([pipe([
//!     call("put").args([word("a"), word("b")]),
//!     call("all"),
//! ])]))])]);
//! assert_eq!(c.to_string(), "x = (put a b | all)");
//! ```

pub mod sexpr;

use duosh_kernel::ast::{
    Assignment, Chunk, Command, Expr, Form, FormBody, Opt, Param, Pipeline, Redir, RedirMode,
    RedirTarget, Span, Target,
};

// ═══════════════════════════════════════════════════════════════════════════
// Expressions
// ═══════════════════════════════════════════════════════════════════════════

pub fn word(s: &str) -> Expr {
    Expr::Bareword(s.to_string())
}

pub fn quoted(s: &str) -> Expr {
    Expr::Quoted(s.to_string())
}

/// `$name`
pub fn var(name: &str) -> Expr {
    Expr::Variable {
        name: name.to_string(),
        explode: false,
    }
}

/// `$@name`
pub fn explode(name: &str) -> Expr {
    Expr::Variable {
        name: name.to_string(),
        explode: true,
    }
}

/// `base[i]...`
pub fn index(base: Expr, indices: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Index {
        base: Box::new(base),
        indices: indices.into_iter().collect(),
    }
}

pub fn list(items: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::List(items.into_iter().collect())
}

pub fn map(pairs: impl IntoIterator<Item = (Expr, Expr)>) -> Expr {
    Expr::Map(pairs.into_iter().collect())
}

/// `{|params| body }`; a parameter spelled `@name` collects the rest.
pub fn lambda<'a>(params: impl IntoIterator<Item = &'a str>, body: Chunk) -> Expr {
    let params = params
        .into_iter()
        .map(|p| match p.strip_prefix('@') {
            Some(name) => Param {
                name: name.to_string(),
                rest: true,
            },
            None => Param {
                name: p.to_string(),
                rest: false,
            },
        })
        .collect();
    Expr::Lambda { params, body }
}

/// `{ body }`, the parameterless lambda special forms take as bodies.
pub fn block(body: Chunk) -> Expr {
    lambda(std::iter::empty(), body)
}

/// `(chunk)`
pub fn capture(chunk: Chunk) -> Expr {
    Expr::OutputCapture(chunk)
}

/// `?(chunk)`
pub fn catch(chunk: Chunk) -> Expr {
    Expr::ExceptionCapture(chunk)
}

pub fn compound(parts: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Compound(parts.into_iter().collect())
}

pub fn wildcard(pattern: &str) -> Expr {
    Expr::Wildcard {
        pattern: pattern.to_string(),
        nomatch_ok: false,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Forms
// ═══════════════════════════════════════════════════════════════════════════

/// Builder for a single form. Converts into [`Form`] wherever one is taken.
#[derive(Debug, Clone)]
pub struct FormBuilder {
    form: Form,
}

impl FormBuilder {
    fn command(&mut self) -> &mut Command {
        match &mut self.form.body {
            FormBody::Command(c) => c,
            FormBody::Assign(_) => panic!("arguments only apply to command forms"),
        }
    }

    pub fn arg(mut self, arg: Expr) -> Self {
        self.command().args.push(arg);
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = Expr>) -> Self {
        self.command().args.extend(args);
        self
    }

    /// `&name=value`
    pub fn opt(mut self, name: &str, value: Expr) -> Self {
        self.command().opts.push(Opt {
            name: name.to_string(),
            value,
        });
        self
    }

    /// `name=value` before the command, undone when it finishes.
    pub fn temp(mut self, name: &str, value: Expr) -> Self {
        self.form.temp_assigns.push(Assignment {
            targets: vec![target(name)],
            values: vec![value],
        });
        self
    }

    /// `fd> path` style redirection.
    pub fn redir(mut self, fd: u32, mode: RedirMode, path: Expr) -> Self {
        self.form.redirs.push(Redir {
            fd,
            mode,
            target: RedirTarget::Path(path),
        });
        self
    }

    /// `dst>&src`
    pub fn dup(mut self, dst: u32, src: u32) -> Self {
        self.form.redirs.push(Redir {
            fd: dst,
            mode: RedirMode::Write,
            target: RedirTarget::Fd(src),
        });
        self
    }

    /// `fd>&-`
    pub fn close(mut self, fd: u32) -> Self {
        self.form.redirs.push(Redir {
            fd,
            mode: RedirMode::Write,
            target: RedirTarget::Close,
        });
        self
    }

    pub fn span(mut self, start: usize, end: usize) -> Self {
        self.form.span = Span::new(start, end);
        self
    }

    pub fn build(self) -> Form {
        self.form
    }
}

impl From<FormBuilder> for Form {
    fn from(b: FormBuilder) -> Self {
        b.form
    }
}

/// A command form with a bareword head.
pub fn call(head: &str) -> FormBuilder {
    call_expr(word(head))
}

/// A command form with any head expression (`$f`, `(get-fn)`, ...).
pub fn call_expr(head: Expr) -> FormBuilder {
    FormBuilder {
        form: Form {
            temp_assigns: Vec::new(),
            body: FormBody::Command(Command {
                head,
                args: Vec::new(),
                opts: Vec::new(),
            }),
            redirs: Vec::new(),
            span: Span::default(),
        },
    }
}

/// A plain assignment target; `@name` collects the rest.
pub fn target(name: &str) -> Target {
    match name.strip_prefix('@') {
        Some(rest) => Target {
            name: rest.to_string(),
            indices: Vec::new(),
            rest: true,
        },
        None => Target {
            name: name.to_string(),
            indices: Vec::new(),
            rest: false,
        },
    }
}

/// `name[i]... = ...` target.
pub fn indexed(name: &str, indices: impl IntoIterator<Item = Expr>) -> Target {
    Target {
        name: name.to_string(),
        indices: indices.into_iter().collect(),
        rest: false,
    }
}

/// `a b @rest = values...`
pub fn assign<'a>(
    targets: impl IntoIterator<Item = &'a str>,
    values: impl IntoIterator<Item = Expr>,
) -> FormBuilder {
    assign_to(targets.into_iter().map(target), values)
}

pub fn assign_to(
    targets: impl IntoIterator<Item = Target>,
    values: impl IntoIterator<Item = Expr>,
) -> FormBuilder {
    FormBuilder {
        form: Form {
            temp_assigns: Vec::new(),
            body: FormBody::Assign(Assignment {
                targets: targets.into_iter().collect(),
                values: values.into_iter().collect(),
            }),
            redirs: Vec::new(),
            span: Span::default(),
        },
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Pipelines and chunks
// ═══════════════════════════════════════════════════════════════════════════

/// `a | b | c`
pub fn pipe<F: Into<Form>>(forms: impl IntoIterator<Item = F>) -> Pipeline {
    Pipeline {
        forms: forms.into_iter().map(Into::into).collect(),
        background: false,
        span: Span::default(),
    }
}

/// `a | b &`
pub fn background<F: Into<Form>>(forms: impl IntoIterator<Item = F>) -> Pipeline {
    Pipeline {
        background: true,
        ..pipe(forms)
    }
}

/// Anything that can stand as one pipeline of a chunk.
pub trait IntoPipeline {
    fn into_pipeline(self) -> Pipeline;
}

impl IntoPipeline for Pipeline {
    fn into_pipeline(self) -> Pipeline {
        self
    }
}

impl IntoPipeline for FormBuilder {
    fn into_pipeline(self) -> Pipeline {
        pipe([self])
    }
}

impl IntoPipeline for Form {
    fn into_pipeline(self) -> Pipeline {
        pipe([self])
    }
}

/// A chunk of pipelines; a lone form stands for a one-form pipeline.
pub fn chunk<P: IntoPipeline>(pipelines: impl IntoIterator<Item = P>) -> Chunk {
    Chunk {
        pipelines: pipelines.into_iter().map(IntoPipeline::into_pipeline).collect(),
    }
}

/// Chunk of forms that are each their own pipeline, in order.
pub fn script(forms: impl IntoIterator<Item = FormBuilder>) -> Chunk {
    chunk(forms)
}

/// `fn name {|params| body }`
pub fn def_fn<'a>(name: &str, params: impl IntoIterator<Item = &'a str>, body: Chunk) -> FormBuilder {
    call("fn").args([word(name), lambda(params, body)])
}

/// Chunk encoded the way a parser would hand it over.
pub fn to_json(chunk: &Chunk) -> String {
    serde_json::to_string(chunk).unwrap_or_else(|e| panic!("chunk should serialize: {e}"))
}
