//! Diagnostic model shared by the lexer, parser, and compiler.
//!
//! All phases report problems as [`Diag`] values carrying labeled source
//! spans. At the API boundary diagnostics are converted into
//! [`miette::Report`]s with attached source context for rendering.

use crate::ast::Span;
use miette::{Diagnostic, LabeledSpan, Report, Severity};
use std::fmt;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagSeverity {
    /// Fatal problem; compilation of the current unit stops.
    Error,
    /// Suspicious but not fatal.
    Warning,
    /// Informational.
    Note,
}

impl fmt::Display for DiagSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagSeverity::Error => write!(f, "error"),
            DiagSeverity::Warning => write!(f, "warning"),
            DiagSeverity::Note => write!(f, "note"),
        }
    }
}

/// Whether a label marks the main location or supporting context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelRole {
    Primary,
    Secondary,
}

/// A labeled source span inside a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagLabel {
    pub span: Span,
    pub message: String,
    pub role: LabelRole,
}

impl DiagLabel {
    pub fn primary(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
            role: LabelRole::Primary,
        }
    }

    pub fn secondary(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
            role: LabelRole::Secondary,
        }
    }
}

/// A structured diagnostic: severity, message, labeled spans, optional help
/// text, notes, and a machine-readable code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diag {
    pub severity: DiagSeverity,
    pub message: String,
    pub labels: Vec<DiagLabel>,
    pub help: Option<String>,
    pub notes: Vec<String>,
    pub code: Option<String>,
}

impl Diag {
    pub fn new(severity: DiagSeverity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            labels: Vec::new(),
            help: None,
            notes: Vec::new(),
            code: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(DiagSeverity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(DiagSeverity::Warning, message)
    }

    pub fn note(message: impl Into<String>) -> Self {
        Self::new(DiagSeverity::Note, message)
    }

    pub fn with_primary_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(DiagLabel::primary(span, message));
        self
    }

    pub fn with_secondary_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(DiagLabel::secondary(span, message));
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Span of the first primary label, if any.
    pub fn primary_span(&self) -> Option<Span> {
        self.labels
            .iter()
            .find(|l| l.role == LabelRole::Primary)
            .map(|l| l.span.clone())
    }
}

/// Owned source text used when rendering diagnostics.
///
/// Keeps label spans honest: out-of-bounds spans are clamped rather than
/// panicking inside the renderer.
#[derive(Debug, Clone)]
pub struct SourceFile {
    content: String,
    name: Option<String>,
}

impl SourceFile {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            name: None,
        }
    }

    pub fn with_name(content: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            name: Some(name.into()),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn clamp_span(&self, span: &Span) -> Span {
        let len = self.content.len();
        let start = span.start.min(len);
        let end = span.end.min(len).max(start);
        start..end
    }
}

/// Converts a batch of diagnostics into rendered reports.
pub fn reports_from_diags(diagnostics: &[Diag], source: &SourceFile) -> Vec<Report> {
    diagnostics
        .iter()
        .map(|diag| report_from_diag(diag, source))
        .collect()
}

/// Converts one diagnostic into a [`miette::Report`] with source context.
pub fn report_from_diag(diag: &Diag, source: &SourceFile) -> Report {
    let rendered = RenderedDiag::build(diag, source);
    let report = Report::new(rendered);
    match source.name() {
        Some(name) => {
            report.with_source_code(miette::NamedSource::new(name, source.content().to_string()))
        }
        None => report.with_source_code(source.content().to_string()),
    }
}

/// Backing type implementing miette's `Diagnostic` trait.
#[derive(Debug)]
struct RenderedDiag {
    message: String,
    severity: Severity,
    code: Option<String>,
    help: Option<String>,
    labels: Vec<LabeledSpan>,
    notes: Vec<RenderedNote>,
}

impl RenderedDiag {
    fn build(diag: &Diag, source: &SourceFile) -> Self {
        let labels = diag
            .labels
            .iter()
            .map(|label| {
                let clamped = source.clamp_span(&label.span);
                let at = (clamped.start, clamped.end - clamped.start);
                match label.role {
                    LabelRole::Primary => {
                        LabeledSpan::new_primary_with_span(Some(label.message.clone()), at)
                    }
                    LabelRole::Secondary => {
                        LabeledSpan::new_with_span(Some(label.message.clone()), at)
                    }
                }
            })
            .collect();

        Self {
            message: diag.message.clone(),
            severity: match diag.severity {
                DiagSeverity::Error => Severity::Error,
                DiagSeverity::Warning => Severity::Warning,
                DiagSeverity::Note => Severity::Advice,
            },
            code: diag.code.clone(),
            help: diag.help.clone(),
            labels,
            notes: diag
                .notes
                .iter()
                .cloned()
                .map(|message| RenderedNote { message })
                .collect(),
        }
    }
}

#[derive(Debug)]
struct RenderedNote {
    message: String,
}

impl fmt::Display for RenderedDiag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for RenderedNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RenderedDiag {}
impl std::error::Error for RenderedNote {}

impl Diagnostic for RenderedDiag {
    fn severity(&self) -> Option<Severity> {
        Some(self.severity)
    }

    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.code
            .as_ref()
            .map(|c| Box::new(c) as Box<dyn fmt::Display>)
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.help
            .as_ref()
            .map(|h| Box::new(h) as Box<dyn fmt::Display>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        if self.labels.is_empty() {
            None
        } else {
            Some(Box::new(self.labels.clone().into_iter()))
        }
    }

    fn related<'a>(&'a self) -> Option<Box<dyn Iterator<Item = &'a dyn Diagnostic> + 'a>> {
        if self.notes.is_empty() {
            None
        } else {
            Some(Box::new(self.notes.iter().map(|n| n as &dyn Diagnostic)))
        }
    }
}

impl Diagnostic for RenderedNote {
    fn severity(&self) -> Option<Severity> {
        Some(Severity::Advice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_display() {
        assert_eq!(DiagSeverity::Error.to_string(), "error");
        assert_eq!(DiagSeverity::Warning.to_string(), "warning");
        assert_eq!(DiagSeverity::Note.to_string(), "note");
    }

    #[test]
    fn builder_accumulates_fields() {
        let diag = Diag::error("unexpected token")
            .with_primary_label(3..7, "here")
            .with_secondary_label(0..2, "statement starts here")
            .with_help("remove the trailing comma")
            .with_note("statements are separated by ';'")
            .with_code("P001");

        assert_eq!(diag.severity, DiagSeverity::Error);
        assert_eq!(diag.labels.len(), 2);
        assert_eq!(diag.labels[0].role, LabelRole::Primary);
        assert_eq!(diag.labels[1].role, LabelRole::Secondary);
        assert_eq!(diag.help.as_deref(), Some("remove the trailing comma"));
        assert_eq!(diag.notes.len(), 1);
        assert_eq!(diag.code.as_deref(), Some("P001"));
        assert_eq!(diag.primary_span(), Some(3..7));
    }

    #[test]
    fn primary_span_skips_secondary_labels() {
        let diag = Diag::error("x").with_secondary_label(0..1, "ctx");
        assert_eq!(diag.primary_span(), None);
    }

    #[test]
    fn source_file_clamps_spans() {
        let src = SourceFile::new("SELECT 1");
        assert_eq!(src.clamp_span(&(0..100)), 0..8);
        assert_eq!(src.clamp_span(&(3..5)), 3..5);
        let inverted = std::ops::Range { start: 6, end: 2 };
        assert_eq!(src.clamp_span(&inverted), 6..6);
    }

    #[test]
    fn report_carries_message() {
        let src = SourceFile::with_name("SELECT ;", "query.eql");
        let diag = Diag::error("expected expression")
            .with_primary_label(7..8, "found ';'")
            .with_code("P002");
        let report = report_from_diag(&diag, &src);
        assert_eq!(report.to_string(), "expected expression");
    }

    #[test]
    fn out_of_bounds_label_does_not_panic() {
        let src = SourceFile::new("x");
        let diag = Diag::error("boom").with_primary_label(0..400, "here");
        let report = report_from_diag(&diag, &src);
        assert_eq!(report.to_string(), "boom");
    }

    #[test]
    fn batch_conversion_preserves_order() {
        let src = SourceFile::new("a b");
        let diags = vec![
            Diag::error("first").with_primary_label(0..1, "here"),
            Diag::warning("second").with_primary_label(2..3, "there"),
        ];
        let reports = reports_from_diags(&diags, &src);
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].to_string(), "first");
        assert_eq!(reports[1].to_string(), "second");
    }
}
