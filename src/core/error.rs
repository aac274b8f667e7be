// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Error types, diagnostics, and reporting for the compiler.

use std::fmt;
use std::sync::Arc;

use crate::core::ast::NodeSpan;

/// Categories of compiler errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodegenErrorKind {
    /// No visitor exists for the AST node variant.
    UnimplementedNode,
    /// A recognized variant with an unsupported shape.
    UnimplementedFeature,
    /// Same name declared twice in one function.
    DuplicateDeclaration,
    /// `this` with no register-variables context.
    ThisOutsideFunction,
    /// Initializer on a global variable.
    GlobalsUnsupported,
    /// An intrinsic the target VM cannot express (`trace`).
    UnsupportedIntrinsic,
    /// Wrong argument count for a special form.
    WrongArity,
    /// The register file is exhausted.
    OutOfRegisters,
    /// A specific register id is already held.
    RegisterConflict,
    /// `break` with no enclosing loop context.
    BreakOutsideLoop,
    /// A directive with bad arguments.
    DirectiveMalformed,
    /// A directive in the wrong context.
    DirectiveMisplaced,
    /// The simulator saw a `return` with more than one value on the stack.
    StackInvariantViolation,
    /// A compiler-internal inconsistency.
    Internal,
    Cli,
    Io,
}

/// A compiler error with a kind, message, and the offending node's span.
#[derive(Debug, Clone)]
pub struct CodegenError {
    kind: CodegenErrorKind,
    message: String,
    span: Option<NodeSpan>,
}

impl CodegenError {
    pub fn new(kind: CodegenErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: None,
        }
    }

    pub fn with_span(mut self, span: NodeSpan) -> Self {
        self.span = Some(span);
        self
    }

    /// Attach a span only if none is present yet. Inner visitors win.
    pub fn or_span(mut self, span: NodeSpan) -> Self {
        if self.span.is_none() {
            self.span = Some(span);
        }
        self
    }

    pub fn kind(&self) -> CodegenErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn span(&self) -> Option<NodeSpan> {
        self.span
    }
}

impl fmt::Display for CodegenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CodegenError {}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A diagnostic message with location and context.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    line: u32,
    column: Option<usize>,
    code: String,
    severity: Severity,
    error: CodegenError,
    file: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, error: CodegenError) -> Self {
        let (line, column) = match error.span() {
            Some(span) => (span.line, Some(span.column as usize + 1)),
            None => (0, None),
        };
        Self {
            line,
            column,
            code: default_diagnostic_code(error.kind()).to_string(),
            severity,
            error,
            file: None,
        }
    }

    pub fn with_file(mut self, file: Option<String>) -> Self {
        self.file = file;
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn message(&self) -> &str {
        self.error.message()
    }

    pub fn format(&self) -> String {
        let sev = match self.severity {
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        };
        format!("{}: {} [{}] - {}", self.line, sev, self.code, self.error.message())
    }

    /// Render the diagnostic with a framed source snippet.
    pub fn format_with_context(&self, lines: Option<&[String]>, use_color: bool) -> String {
        let sev = match self.severity {
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        };
        let header = match &self.file {
            Some(file) => format!("{file}:{}: {sev} [{}]", self.line, self.code),
            None => format!("{}: {sev} [{}]", self.line, self.code),
        };

        let mut out = String::new();
        out.push_str(&header);
        out.push('\n');

        for line in build_context_lines(self.line, self.column, lines, use_color) {
            out.push_str(&line);
            out.push('\n');
        }

        out.push_str(&format!("{sev}: {}", self.error.message()));
        out
    }
}

/// Report from a successful compilation run.
pub struct RunReport {
    diagnostics: Vec<Diagnostic>,
    source_lines: Arc<Vec<String>>,
}

impl RunReport {
    pub fn new(diagnostics: Vec<Diagnostic>, source_lines: impl Into<Arc<Vec<String>>>) -> Self {
        Self {
            diagnostics,
            source_lines: source_lines.into(),
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn source_lines(&self) -> &[String] {
        &self.source_lines
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }
}

/// Error from a failed compilation run.
///
/// Carries the instructions emitted before the failure so the CLI's
/// debug-output mode can dump the partial state.
#[derive(Debug)]
pub struct RunError {
    error: CodegenError,
    diagnostics: Vec<Diagnostic>,
    source_lines: Arc<Vec<String>>,
    partial_lines: Vec<String>,
}

impl RunError {
    pub fn new(
        error: CodegenError,
        diagnostics: Vec<Diagnostic>,
        source_lines: impl Into<Arc<Vec<String>>>,
    ) -> Self {
        Self {
            error,
            diagnostics,
            source_lines: source_lines.into(),
            partial_lines: Vec::new(),
        }
    }

    pub fn with_partial_lines(mut self, lines: Vec<String>) -> Self {
        self.partial_lines = lines;
        self
    }

    pub fn error(&self) -> &CodegenError {
        &self.error
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn source_lines(&self) -> &[String] {
        &self.source_lines
    }

    pub fn partial_lines(&self) -> &[String] {
        &self.partial_lines
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for RunError {}

/// Build context lines for error display.
fn build_context_lines(
    line_num: u32,
    column: Option<usize>,
    lines: Option<&[String]>,
    use_color: bool,
) -> Vec<String> {
    let mut out = Vec::new();
    if line_num == 0 {
        return out;
    }
    let line_idx = line_num as usize - 1;

    let lines = match lines {
        Some(lines) if !lines.is_empty() => lines,
        _ => {
            out.push(format!("{:>5} | <source unavailable>", line_num));
            return out;
        }
    };

    if line_idx >= lines.len() {
        out.push(format!("{:>5} | <source unavailable>", line_num));
        return out;
    }

    let display = highlight_line(&lines[line_idx], column, use_color);
    out.push(format!("{:>5} | {}", line_num, display));
    out
}

/// Highlight the character at `column` (1-based) in red when color is on.
fn highlight_line(line: &str, column: Option<usize>, use_color: bool) -> String {
    match column {
        Some(col) if col > 0 => {
            let idx = col - 1;
            if idx >= line.len() {
                if use_color {
                    return format!("{line}\x1b[31m^\x1b[0m");
                }
                return format!("{line}^");
            }
            let (head, tail) = line.split_at(idx);
            let ch = tail.chars().next().unwrap_or(' ');
            let rest = &tail[ch.len_utf8()..];
            if use_color {
                format!("{head}\x1b[31m{ch}\x1b[0m{rest}")
            } else {
                format!("{head}{ch}{rest}")
            }
        }
        _ => line.to_string(),
    }
}

fn default_diagnostic_code(kind: CodegenErrorKind) -> &'static str {
    match kind {
        CodegenErrorKind::UnimplementedNode => "j2f001",
        CodegenErrorKind::UnimplementedFeature => "j2f002",
        CodegenErrorKind::DuplicateDeclaration => "j2f003",
        CodegenErrorKind::ThisOutsideFunction => "j2f004",
        CodegenErrorKind::GlobalsUnsupported => "j2f005",
        CodegenErrorKind::UnsupportedIntrinsic => "j2f006",
        CodegenErrorKind::WrongArity => "j2f007",
        CodegenErrorKind::OutOfRegisters => "j2f008",
        CodegenErrorKind::RegisterConflict => "j2f009",
        CodegenErrorKind::BreakOutsideLoop => "j2f010",
        CodegenErrorKind::DirectiveMalformed => "j2f011",
        CodegenErrorKind::DirectiveMisplaced => "j2f012",
        CodegenErrorKind::StackInvariantViolation => "j2f013",
        CodegenErrorKind::Internal => "j2f090",
        CodegenErrorKind::Cli => "j2f101",
        CodegenErrorKind::Io => "j2f102",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(line: u32, column: u32) -> NodeSpan {
        NodeSpan {
            start: 0,
            end: 0,
            line,
            column,
        }
    }

    #[test]
    fn diagnostic_format_includes_line_and_severity() {
        let err = CodegenError::new(CodegenErrorKind::BreakOutsideLoop, "Break outside of a loop")
            .with_span(span(12, 0));
        let diag = Diagnostic::new(Severity::Error, err);
        assert_eq!(diag.format(), "12: ERROR [j2f010] - Break outside of a loop");
    }

    #[test]
    fn format_with_context_frames_the_offending_line() {
        let err = CodegenError::new(CodegenErrorKind::UnsupportedIntrinsic, "trace is not supported")
            .with_span(span(2, 4));
        let diag = Diagnostic::new(Severity::Error, err).with_file(Some("game.js".to_string()));

        let lines = vec!["var a;".to_string(), "    trace(a);".to_string()];
        let rendered = diag.format_with_context(Some(&lines), false);

        assert!(rendered.starts_with("game.js:2: ERROR [j2f006]"));
        assert!(rendered.contains("    2 |     trace(a);"));
        assert!(rendered.ends_with("ERROR: trace is not supported"));
    }

    #[test]
    fn format_with_context_handles_missing_source() {
        let err = CodegenError::new(CodegenErrorKind::Internal, "bad state").with_span(span(3, 0));
        let diag = Diagnostic::new(Severity::Error, err);
        let rendered = diag.format_with_context(None, false);
        assert!(rendered.contains("<source unavailable>"));
    }

    #[test]
    fn or_span_keeps_the_inner_span() {
        let err = CodegenError::new(CodegenErrorKind::Internal, "x")
            .with_span(span(1, 1))
            .or_span(span(9, 9));
        assert_eq!(err.span().map(|s| s.line), Some(1));
    }
}
