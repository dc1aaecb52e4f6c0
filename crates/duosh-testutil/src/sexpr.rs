//! S-expression rendering of duosh chunks.
//!
//! Display on AST types renders source text, which hides structure such as
//! where a compound word splits or which words are wildcards. Tests that
//! care about shape compare against this form instead.

use duosh_kernel::ast::*;

pub fn format_chunk(chunk: &Chunk) -> String {
    match chunk.pipelines.as_slice() {
        [] => "(chunk)".to_string(),
        [one] => format_pipeline(one),
        many => {
            let parts: Vec<String> = many.iter().map(format_pipeline).collect();
            format!("(chunk {})", parts.join(" "))
        }
    }
}

pub fn format_pipeline(pipeline: &Pipeline) -> String {
    let forms: Vec<String> = pipeline.forms.iter().map(format_form).collect();
    let inner = match forms.as_slice() {
        [one] => one.clone(),
        _ => format!("(pipe {})", forms.join(" ")),
    };
    if pipeline.background {
        format!("(bg {inner})")
    } else {
        inner
    }
}

pub fn format_form(form: &Form) -> String {
    let mut out = match &form.body {
        FormBody::Assign(a) => format_assignment(a),
        FormBody::Command(c) => {
            let mut parts = vec![format_expr(&c.head)];
            parts.extend(c.args.iter().map(format_expr));
            parts.extend(
                c.opts
                    .iter()
                    .map(|o| format!("(opt {} {})", o.name, format_expr(&o.value))),
            );
            format!("(cmd {})", parts.join(" "))
        }
    };
    for t in &form.temp_assigns {
        out = format!("(with {} {out})", format_assignment(t));
    }
    for r in &form.redirs {
        let target = match &r.target {
            RedirTarget::Path(p) => format_expr(p),
            RedirTarget::Fd(fd) => format!("&{fd}"),
            RedirTarget::Close => "&-".to_string(),
        };
        let mode = match r.mode {
            RedirMode::Read => "<",
            RedirMode::Write => ">",
            RedirMode::Append => ">>",
            RedirMode::ReadWrite => "<>",
        };
        out = format!("(redir {}{mode} {target} {out})", r.fd);
    }
    out
}

fn format_assignment(a: &Assignment) -> String {
    let targets: Vec<String> = a
        .targets
        .iter()
        .map(|t| {
            let name = if t.rest {
                format!("@{}", t.name)
            } else {
                t.name.clone()
            };
            if t.indices.is_empty() {
                name
            } else {
                let idx: Vec<String> = t.indices.iter().map(format_expr).collect();
                format!("(index {name} {})", idx.join(" "))
            }
        })
        .collect();
    let values: Vec<String> = a.values.iter().map(format_expr).collect();
    format!("(assign ({}) ({}))", targets.join(" "), values.join(" "))
}

pub fn format_expr(expr: &Expr) -> String {
    match expr {
        Expr::Bareword(s) => s.clone(),
        Expr::Quoted(s) => format!("{s:?}"),
        Expr::Variable { name, explode: false } => format!("${name}"),
        Expr::Variable { name, explode: true } => format!("$@{name}"),
        Expr::Index { base, indices } => {
            let idx: Vec<String> = indices.iter().map(format_expr).collect();
            format!("(index {} {})", format_expr(base), idx.join(" "))
        }
        Expr::List(items) => {
            sexp("list", items.iter().map(format_expr))
        }
        Expr::Map(pairs) => {
            sexp(
                "map",
                pairs
                    .iter()
                    .map(|(k, v)| format!("({} {})", format_expr(k), format_expr(v))),
            )
        }
        Expr::Lambda { params, body } => {
            let params: Vec<String> = params
                .iter()
                .map(|p| if p.rest { format!("@{}", p.name) } else { p.name.clone() })
                .collect();
            format!("(lambda ({}) {})", params.join(" "), format_chunk(body))
        }
        Expr::OutputCapture(c) => format!("(capture {})", format_chunk(c)),
        Expr::ExceptionCapture(c) => format!("(catch {})", format_chunk(c)),
        Expr::Compound(parts) => {
            let parts: Vec<String> = parts.iter().map(format_expr).collect();
            format!("(concat {})", parts.join(" "))
        }
        Expr::Wildcard { pattern, nomatch_ok } => {
            if *nomatch_ok {
                format!("(glob? {pattern})")
            } else {
                format!("(glob {pattern})")
            }
        }
    }
}

/// `(head a b ...)`, or `(head)` with no parts.
fn sexp(head: &str, parts: impl Iterator<Item = String>) -> String {
    let mut out = format!("({head}");
    for part in parts {
        out.push(' ');
        out.push_str(&part);
    }
    out.push(')');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::*;

    #[test]
    fn pipeline_shape() {
        let c = chunk([pipe([call("put").arg(quoted("a b")), call("all")])]);
        assert_eq!(format_chunk(&c), r#"(pipe (cmd put "a b") (cmd all))"#);
    }

    #[test]
    fn redirections_wrap_the_form() {
        let f = call("echo").arg(word("x")).dup(2, 1).build();
        assert_eq!(format_form(&f), "(redir 2> &1 (cmd echo x))");
    }

    #[test]
    fn compound_words_keep_their_parts() {
        let e = compound([word("a"), var("x"), quoted("b")]);
        assert_eq!(format_expr(&e), r#"(concat a $x "b")"#);
    }
}
