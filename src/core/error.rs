// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Error types, diagnostics, and reporting for the assembler.

use std::fmt;

/// Categories of assembler errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsmErrorKind {
    Lexical,
    Syntax,
    Expression,
    Symbol,
    Duplicate,
    Phase,
    Range,
    Overwrite,
    Instruction,
    Directive,
    Conditional,
    Macro,
    Structural,
    Io,
    Cli,
}

/// An assembler error with a kind, message and optional column.
///
/// The column is a byte offset into the offending source line and drives the
/// caret in diagnostic output.
#[derive(Debug, Clone)]
pub struct AsmError {
    kind: AsmErrorKind,
    message: String,
    column: Option<usize>,
}

impl AsmError {
    pub fn new(kind: AsmErrorKind, msg: &str, param: Option<&str>) -> Self {
        Self {
            kind,
            message: format_error(msg, param),
            column: None,
        }
    }

    pub fn with_column(mut self, column: Option<usize>) -> Self {
        self.column = column;
        self
    }

    pub fn kind(&self) -> AsmErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn column(&self) -> Option<usize> {
        self.column
    }

    /// Fatal errors abort the run immediately instead of counting toward the
    /// error cap. Overwrites and phase errors leave the ROM image untrustworthy
    /// and structural overflows leave the parser state untrustworthy.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            AsmErrorKind::Overwrite | AsmErrorKind::Phase | AsmErrorKind::Structural
        )
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AsmError {}

/// A diagnostic message with source location and context.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub file: String,
    pub line: u32,
    pub source: String,
    pub error: AsmError,
}

impl Diagnostic {
    pub fn new(file: &str, line: u32, source: &str, error: AsmError) -> Self {
        Self {
            file: file.to_string(),
            line,
            source: source.to_string(),
            error,
        }
    }

    /// Render the diagnostic: header, offending line, caret, message.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "\n*** Error in file {} line {}:\n",
            self.file, self.line
        ));
        out.push_str(&self.source);
        out.push('\n');
        if let Some(col) = self.error.column() {
            if col < 80 {
                out.push_str(&" ".repeat(col));
                out.push_str("^\n");
            }
        }
        out.push_str(self.error.message());
        if !self.error.message().ends_with('\n') {
            out.push('\n');
        }
        out
    }
}

/// Pass statistics.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassCounts {
    pub lines: u32,
    pub errors: u32,
}

impl PassCounts {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Format an error message with an optional parameter.
pub fn format_error(msg: &str, param: Option<&str>) -> String {
    match param {
        Some(p) => format!("{msg}: {p}"),
        None => msg.to_string(),
    }
}
