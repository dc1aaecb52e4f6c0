//! Compilation errors.
//!
//! These are raised before anything in the chunk runs and are never
//! recoverable at run time.

use std::fmt;
use std::sync::Arc;

use crate::ast::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    /// Variable not bound in any enclosing frame nor the builtin namespace.
    UnresolvedVariable,
    /// `mod:name` where no `mod:` import is in scope.
    UnresolvedNamespace,
    /// Assignment to a builtin variable or a module member.
    ReadOnlyVariable,
    /// Bad assignment target: empty name, misplaced rest, indexed temporary.
    MalformedTarget,
    /// Lambda parameter list is invalid.
    BadSignature,
    /// A special form used with the wrong shape.
    BadSpecialForm,
    BadRedirection,
}

impl CompileErrorKind {
    /// Returns a short code string for the error.
    pub fn code(&self) -> &'static str {
        match self {
            CompileErrorKind::UnresolvedVariable => "E001",
            CompileErrorKind::UnresolvedNamespace => "E002",
            CompileErrorKind::ReadOnlyVariable => "E003",
            CompileErrorKind::MalformedTarget => "E004",
            CompileErrorKind::BadSignature => "E005",
            CompileErrorKind::BadSpecialForm => "E006",
            CompileErrorKind::BadRedirection => "E007",
        }
    }
}

impl fmt::Display for CompileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompileErrorKind::UnresolvedVariable => "unresolved variable",
            CompileErrorKind::UnresolvedNamespace => "unresolved namespace",
            CompileErrorKind::ReadOnlyVariable => "read-only variable",
            CompileErrorKind::MalformedTarget => "malformed assignment target",
            CompileErrorKind::BadSignature => "bad lambda signature",
            CompileErrorKind::BadSpecialForm => "bad special form",
            CompileErrorKind::BadRedirection => "bad redirection",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub message: String,
    pub span: Span,
    /// Name of the chunk being compiled (`[eval]`, a module path, ...).
    pub source_name: Arc<str>,
}

impl CompileError {
    pub fn new(
        kind: CompileErrorKind,
        message: impl Into<String>,
        span: Span,
        source_name: Arc<str>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
            source_name,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}: {}: {} [{}]",
            self.source_name,
            self.span.start,
            self.span.end,
            self.kind,
            self.message,
            self.kind.code()
        )
    }
}

impl std::error::Error for CompileError {}
