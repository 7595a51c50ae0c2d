//! Compiler error taxonomy.
//!
//! All semantic failures are tagged values with a kind, a message, and a
//! source span. The top-level compile functions are the only place these
//! become user-facing diagnostics.

use crate::ast::Span;
use crate::diag::Diag;
use std::fmt;
use thiserror::Error;

/// The kind of a compilation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    /// Parser or lexer failure surfaced through the compile API.
    Syntax,
    /// Unresolved name, pointer, or function signature.
    Reference,
    /// Invalid expression: bad operand, invalid cast, non-object subject.
    Expression,
    /// Type inference failure or incompatible types.
    Type,
    /// Singleton context receiving a possibly-multi set.
    Cardinality,
    /// Pointer-target and other schema-invariant violations.
    Pointer,
    /// Compiler invariant violation.
    Internal,
}

impl CompileErrorKind {
    fn code(self) -> &'static str {
        match self {
            CompileErrorKind::Syntax => "E001",
            CompileErrorKind::Reference => "E002",
            CompileErrorKind::Expression => "E003",
            CompileErrorKind::Type => "E004",
            CompileErrorKind::Cardinality => "E005",
            CompileErrorKind::Pointer => "E006",
            CompileErrorKind::Internal => "E999",
        }
    }
}

impl fmt::Display for CompileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompileErrorKind::Syntax => "syntax error",
            CompileErrorKind::Reference => "reference error",
            CompileErrorKind::Expression => "expression error",
            CompileErrorKind::Type => "type error",
            CompileErrorKind::Cardinality => "cardinality error",
            CompileErrorKind::Pointer => "pointer error",
            CompileErrorKind::Internal => "internal error",
        };
        write!(f, "{name}")
    }
}

/// A compilation failure with its source context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub message: String,
    pub span: Option<Span>,
    pub hint: Option<String>,
}

impl CompileError {
    pub fn new(kind: CompileErrorKind, message: impl Into<String>, span: Option<Span>) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
            hint: None,
        }
    }

    pub fn reference(message: impl Into<String>, span: Option<Span>) -> Self {
        Self::new(CompileErrorKind::Reference, message, span)
    }

    pub fn expression(message: impl Into<String>, span: Option<Span>) -> Self {
        Self::new(CompileErrorKind::Expression, message, span)
    }

    pub fn type_error(message: impl Into<String>, span: Option<Span>) -> Self {
        Self::new(CompileErrorKind::Type, message, span)
    }

    pub fn cardinality(message: impl Into<String>, span: Option<Span>) -> Self {
        Self::new(CompileErrorKind::Cardinality, message, span)
    }

    pub fn pointer(message: impl Into<String>, span: Option<Span>) -> Self {
        Self::new(CompileErrorKind::Pointer, message, span)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(CompileErrorKind::Internal, message, None)
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attaches a span when the error does not carry one yet; the compile
    /// boundary uses this to contextualize deep failures.
    pub fn or_span(mut self, span: Span) -> Self {
        if self.span.is_none() {
            self.span = Some(span);
        }
        self
    }

    /// Converts into the shared diagnostic model for rendering.
    pub fn to_diag(&self) -> Diag {
        let mut diag = Diag::error(self.message.clone()).with_code(self.kind.code());
        if let Some(span) = &self.span {
            diag = diag.with_primary_label(span.clone(), self.kind.to_string());
        }
        if let Some(hint) = &self.hint {
            diag = diag.with_help(hint.clone());
        }
        diag
    }
}

/// Result type threaded through all compilation routines.
pub type CompileResult<T> = Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind() {
        let err = CompileError::reference("name 'Foo' does not exist", Some(3..6));
        assert_eq!(err.to_string(), "reference error: name 'Foo' does not exist");
    }

    #[test]
    fn or_span_only_fills_missing() {
        let err = CompileError::internal("boom").or_span(1..2);
        assert_eq!(err.span, Some(1..2));
        let err = CompileError::reference("x", Some(5..6)).or_span(1..2);
        assert_eq!(err.span, Some(5..6));
    }

    #[test]
    fn to_diag_carries_code_and_hint() {
        let diag = CompileError::cardinality("more than one element", Some(0..4))
            .with_hint("wrap the expression in an aggregate")
            .to_diag();
        assert_eq!(diag.code.as_deref(), Some("E005"));
        assert!(diag.help.is_some());
        assert_eq!(diag.primary_span(), Some(0..4));
    }
}
