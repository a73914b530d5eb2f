// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Error types, diagnostics, and reporting for the assembler.

use std::fmt;

/// Line processing status.
///
/// `Error` lets the pass continue; `Fatal` stops it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LineStatus {
    Ok = 0,
    Error = 1,
    Fatal = 2,
}

/// Categories of assembler errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsmErrorKind {
    Assembler,
    Cli,
    Conditional,
    Consistency,
    Directive,
    Expression,
    Instruction,
    Io,
    Macro,
    Resource,
    Segment,
    Symbol,
}

/// An assembler error with a kind and message.
#[derive(Debug, Clone)]
pub struct AsmError {
    kind: AsmErrorKind,
    message: String,
}

impl AsmError {
    pub fn new(kind: AsmErrorKind, msg: &str, param: Option<&str>) -> Self {
        Self {
            kind,
            message: format_error(msg, param),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> AsmErrorKind {
        self.kind
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AsmError {}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Note,
    Warning,
    Error,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::Note => "Message",
            Severity::Warning => "Warning",
            Severity::Error => "Error",
        }
    }
}

/// A diagnostic message with location and context.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub(crate) line: u32,
    pub(crate) severity: Severity,
    pub(crate) error: AsmError,
    pub(crate) file: Option<String>,
    pub(crate) source: Option<String>,
    pub(crate) macro_site: Option<(String, u32)>,
}

impl Diagnostic {
    pub fn new(line: u32, severity: Severity, error: AsmError) -> Self {
        Self {
            line,
            severity,
            error,
            file: None,
            source: None,
            macro_site: None,
        }
    }

    pub fn with_file(mut self, file: Option<String>) -> Self {
        self.file = file;
        self
    }

    pub fn with_source(mut self, source: Option<String>) -> Self {
        self.source = source;
        self
    }

    /// Annotate with the macro body line being expanded.
    pub fn with_macro_site(mut self, site: Option<(String, u32)>) -> Self {
        self.macro_site = site;
        self
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    pub fn error(&self) -> &AsmError {
        &self.error
    }

    fn location(&self) -> String {
        match &self.file {
            Some(file) if self.line > 0 => format!("{file}({})", self.line),
            Some(file) => file.clone(),
            None => format!("({})", self.line),
        }
    }

    fn body(&self) -> String {
        match &self.macro_site {
            Some((file, line)) => format!("[Macro: {file}: {line}] {}", self.error.message()),
            None => self.error.message().to_string(),
        }
    }

    pub fn format(&self) -> String {
        format!(
            "{}: {}: {}",
            self.location(),
            self.severity.label(),
            self.body()
        )
    }

    pub fn format_with_context(&self, use_color: bool) -> String {
        let sev = self.severity.label();
        let mut out = format!("{}: {}", self.location(), paint(sev, self.severity, use_color));
        out.push('\n');
        if let Some(source) = &self.source {
            out.push_str(&format!("{:>5} | {}", self.line, source.trim_end()));
            out.push('\n');
        }
        out.push_str(&format!("{sev}: {}", self.body()));
        out
    }
}

fn paint(text: &str, severity: Severity, use_color: bool) -> String {
    if !use_color {
        return text.to_string();
    }
    let code = match severity {
        Severity::Note => "36",
        Severity::Warning => "33",
        Severity::Error => "31",
    };
    format!("\x1b[1;{code}m{text}\x1b[0m")
}

/// Report from a successful assembly run.
#[derive(Debug)]
pub struct AsmRunReport {
    diagnostics: Vec<Diagnostic>,
    counts: PassCounts,
}

impl AsmRunReport {
    pub fn new(diagnostics: Vec<Diagnostic>, counts: PassCounts) -> Self {
        Self {
            diagnostics,
            counts,
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn counts(&self) -> PassCounts {
        self.counts
    }

    pub fn error_count(&self) -> u32 {
        self.counts.errors
    }
}

/// Error from a failed assembly run.
#[derive(Debug)]
pub struct AsmRunError {
    error: AsmError,
    diagnostics: Vec<Diagnostic>,
    counts: PassCounts,
}

impl AsmRunError {
    pub fn new(error: AsmError, diagnostics: Vec<Diagnostic>, counts: PassCounts) -> Self {
        Self {
            error,
            diagnostics,
            counts,
        }
    }

    pub fn error(&self) -> &AsmError {
        &self.error
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn counts(&self) -> PassCounts {
        self.counts
    }
}

impl fmt::Display for AsmRunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for AsmRunError {}

/// Pass statistics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassCounts {
    pub lines: u32,
    pub errors: u32,
    pub warnings: u32,
}

impl PassCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Error => self.errors += 1,
            Severity::Warning => self.warnings += 1,
            Severity::Note => {}
        }
    }
}

/// Format an error message with an optional parameter.
pub fn format_error(msg: &str, param: Option<&str>) -> String {
    match param {
        Some(p) => format!("{msg}: {p}"),
        None => msg.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_format_includes_location_and_severity() {
        let err = AsmError::new(AsmErrorKind::Assembler, "Bad thing", None);
        let diag = Diagnostic::new(12, Severity::Error, err).with_file(Some("main.asm".into()));
        assert_eq!(diag.format(), "main.asm(12): Error: Bad thing");
    }

    #[test]
    fn diagnostic_format_carries_macro_site() {
        let err = AsmError::new(AsmErrorKind::Macro, "Found no label", Some("x"));
        let diag = Diagnostic::new(3, Severity::Warning, err)
            .with_file(Some("a.asm".into()))
            .with_macro_site(Some(("m.inc".into(), 7)));
        assert_eq!(
            diag.format(),
            "a.asm(3): Warning: [Macro: m.inc: 7] Found no label: x"
        );
    }

    #[test]
    fn context_format_without_color_is_plain() {
        let err = AsmError::new(AsmErrorKind::Directive, "Unknown directive", Some(".FOO"));
        let diag = Diagnostic::new(4, Severity::Error, err)
            .with_file(Some("a.asm".into()))
            .with_source(Some(".foo 1\n".into()));
        assert_eq!(
            diag.format_with_context(false),
            "a.asm(4): Error\n    4 | .foo 1\nError: Unknown directive: .FOO"
        );
    }

    #[test]
    fn pass_counts_ignore_notes() {
        let mut counts = PassCounts::new();
        counts.record(Severity::Note);
        counts.record(Severity::Warning);
        counts.record(Severity::Error);
        assert_eq!((counts.errors, counts.warnings), (1, 1));
    }
}
